//! Text output parsers, one per manager output shape.

use std::sync::OnceLock;

use regex::Regex;

use crate::data::{KnownManagers, SearchRow, EMPTY_DESCRIPTION};

/// Parses search output from `manager` into rows.
pub fn parse_search(manager: &KnownManagers, out: &str) -> Vec<SearchRow> {
    match manager {
        KnownManagers::Apt => parse_dash_separated(out),
        KnownManagers::Dnf => parse_dnf(out),
        KnownManagers::Pacman => parse_pacman(out),
        KnownManagers::Zypper => parse_zypper(out),
        KnownManagers::Emerge => parse_emerge(out),
        KnownManagers::Brew => parse_names_only(out),
        KnownManagers::Winget => parse_winget(out),
        KnownManagers::Choco => parse_choco(out),
        KnownManagers::Scoop => parse_columns(out, false),
        KnownManagers::Snap | KnownManagers::Flatpak | KnownManagers::Bun => parse_columns(out, true),
        KnownManagers::Npm => parse_tab_separated(out),
        KnownManagers::Unknown(_) => Vec::new(),
    }
}

/// Parses installed-package output from `manager` into names.
pub fn parse_installed(manager: &KnownManagers, out: &str) -> Vec<String> {
    let names: Vec<String> = match manager {
        KnownManagers::Apt | KnownManagers::Brew | KnownManagers::Pacman => {
            first_fields(out.lines())
        }
        KnownManagers::Dnf => out
            .lines()
            .map(str::trim)
            .filter(|line| !is_dnf_header(line))
            .filter_map(|line| line.split_whitespace().next())
            .map(strip_arch)
            .collect(),
        KnownManagers::Zypper => parse_zypper(out).into_iter().map(|row| row.name).collect(),
        KnownManagers::Emerge => out
            .lines()
            .filter_map(|line| line.split_whitespace().next())
            .map(strip_version_suffix)
            .collect(),
        KnownManagers::Winget => parse_winget(out).into_iter().map(|row| row.name).collect(),
        KnownManagers::Choco => out
            .lines()
            .filter_map(|line| line.split('|').next())
            .map(str::trim)
            .map(str::to_string)
            .collect(),
        KnownManagers::Scoop => {
            let mut in_table = false;
            let mut names = Vec::new();
            for line in out.lines() {
                if line.starts_with("Name") || line.starts_with("---") {
                    in_table = true;
                    continue;
                }
                if in_table {
                    if let Some(name) = line.split_whitespace().next() {
                        names.push(name.to_string());
                    }
                }
            }
            names
        }
        KnownManagers::Snap | KnownManagers::Flatpak => first_fields(out.lines().skip(1)),
        KnownManagers::Npm => parse_npm_installed(out),
        KnownManagers::Bun => parse_bun_installed(out),
        KnownManagers::Unknown(_) => Vec::new(),
    };
    names.into_iter().filter(|name| !name.is_empty()).collect()
}

fn describe(desc: &str) -> String {
    let desc = desc.trim();
    if desc.is_empty() {
        EMPTY_DESCRIPTION.to_string()
    } else {
        desc.to_string()
    }
}

fn first_fields<'a, I: Iterator<Item = &'a str>>(lines: I) -> Vec<String> {
    lines
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_string)
        .collect()
}

/// `name - description`
fn parse_dash_separated(out: &str) -> Vec<SearchRow> {
    out.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| match line.split_once(" - ") {
            Some((name, desc)) => SearchRow::new(name.trim(), describe(desc)),
            None => SearchRow::new(line, EMPTY_DESCRIPTION),
        })
        .collect()
}

/// `name\tdescription\t...`
fn parse_tab_separated(out: &str) -> Vec<SearchRow> {
    out.lines()
        .filter_map(|line| {
            let mut parts = line.split('\t');
            let name = parts.next()?.trim();
            let desc = parts.next()?;
            (!name.is_empty()).then(|| SearchRow::new(name, describe(desc)))
        })
        .collect()
}

fn parse_names_only(out: &str) -> Vec<SearchRow> {
    out.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("==>"))
        .map(|name| SearchRow::new(name, EMPTY_DESCRIPTION))
        .collect()
}

/// Whitespace columns: first column is the name, the rest the description.
fn parse_columns(out: &str, skip_header: bool) -> Vec<SearchRow> {
    out.lines()
        .enumerate()
        .filter(|(index, _)| !(skip_header && *index == 0))
        .map(|(_, line)| line.trim())
        .filter(|line| !line.is_empty() && !line.starts_with("Name") && !line.starts_with('-'))
        .filter_map(|line| {
            let name = line.split_whitespace().next()?;
            Some(SearchRow::new(name, describe(&line[name.len()..])))
        })
        .collect()
}

fn is_dnf_header(line: &str) -> bool {
    line.is_empty()
        || line.starts_with("Available")
        || line.starts_with("Last")
        || line.starts_with("Installed")
}

fn strip_arch(name: &str) -> String {
    match name.rfind('.') {
        Some(idx) if idx > 0 => name[..idx].to_string(),
        _ => name.to_string(),
    }
}

/// `category/name-1.2.3` → `category/name`
fn strip_version_suffix(atom: &str) -> String {
    let bytes = atom.as_bytes();
    for (idx, window) in bytes.windows(2).enumerate() {
        if window[0] == b'-' && window[1].is_ascii_digit() {
            return atom[..idx].to_string();
        }
    }
    atom.to_string()
}

fn parse_dnf(out: &str) -> Vec<SearchRow> {
    out.lines()
        .map(str::trim)
        .filter(|line| !is_dnf_header(line))
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let name = fields.next()?;
            let version = fields.next()?;
            Some(SearchRow::new(strip_arch(name), version))
        })
        .collect()
}

/// Two lines per package: `repo/name version` then an indented description.
fn parse_pacman(out: &str) -> Vec<SearchRow> {
    let lines: Vec<&str> = out.lines().collect();
    lines
        .chunks(2)
        .filter(|pair| pair.len() == 2)
        .filter_map(|pair| {
            let head = pair[0].split_whitespace().next()?;
            let name = head.split_once('/').map_or(head, |(_, name)| name);
            Some(SearchRow::new(name, describe(pair[1])))
        })
        .collect()
}

fn parse_zypper(out: &str) -> Vec<SearchRow> {
    out.lines()
        .filter_map(|line| {
            let cols: Vec<&str> = line.split('|').map(str::trim).collect();
            if cols.len() < 7 || cols[2].is_empty() || cols[2] == "Name" {
                return None;
            }
            Some(SearchRow::new(
                cols[2],
                format!("version {} from {}", cols[4], cols[6]),
            ))
        })
        .collect()
}

fn parse_emerge(out: &str) -> Vec<SearchRow> {
    let mut rows = Vec::new();
    let mut atom: Option<String> = None;
    for line in out.lines() {
        if line.starts_with("*  ") {
            atom = line.split_whitespace().nth(1).map(str::to_string);
            continue;
        }
        if let Some(desc) = line.trim().strip_prefix("Description:") {
            if let Some(name) = atom.take() {
                rows.push(SearchRow::new(name, describe(desc)));
            }
        }
    }
    rows
}

fn winget_columns() -> &'static Regex {
    static COLUMNS: OnceLock<Regex> = OnceLock::new();
    COLUMNS.get_or_init(|| Regex::new(r"\s{2,}").expect("static pattern"))
}

/// Column-aligned table whose second column is the package id.
fn parse_winget(out: &str) -> Vec<SearchRow> {
    out.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("Name") && !line.starts_with('-'))
        .filter_map(|line| {
            let cols: Vec<&str> = winget_columns().split(line).collect();
            let id = cols.get(1)?;
            Some(SearchRow::new(*id, describe(cols[0])))
        })
        .collect()
}

fn parse_choco(out: &str) -> Vec<SearchRow> {
    out.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let (name, version) = line.split_once('|').unwrap_or((line, ""));
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            let version = if version.trim().is_empty() {
                EMPTY_DESCRIPTION
            } else {
                version.trim()
            };
            Some(SearchRow::new(name, format!("version {version}")))
        })
        .collect()
}

/// `npm ls --parseable`: one install path per line after the global root.
fn parse_npm_installed(out: &str) -> Vec<String> {
    out.lines()
        .skip(1)
        .filter_map(|line| {
            let line = line.replace('\r', "").replace('\\', "/");
            let segments: Vec<&str> = line
                .split('/')
                .map(str::trim)
                .filter(|seg| !seg.is_empty())
                .collect();
            let (last, rest) = segments.split_last()?;
            match rest.last() {
                Some(scope) if scope.starts_with('@') => Some(format!("{scope}/{last}")),
                _ => Some(last.to_string()),
            }
        })
        .collect()
}

/// `bun pm ls --global`: tree lines like `├── typescript@5.4.0`.
fn parse_bun_installed(out: &str) -> Vec<String> {
    out.lines()
        .skip(1)
        .filter_map(|line| {
            let line = line
                .trim()
                .trim_start_matches(|c: char| "+-|` ├└─│".contains(c))
                .trim();
            if line.is_empty() || line.contains("node_modules") {
                return None;
            }
            let pkg = line.split_whitespace().next()?;
            let at_count = pkg.matches('@').count();
            let versioned = if pkg.starts_with('@') {
                at_count >= 2
            } else {
                at_count >= 1
            };
            match pkg.rfind('@') {
                Some(idx) if versioned && idx > 0 => Some(pkg[..idx].to_string()),
                _ => Some(pkg.to_string()),
            }
        })
        .collect()
}
