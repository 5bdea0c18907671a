//! Relevance ranking of merged candidates.
//!
//! Each candidate gets a tier from how the query matches its package name and
//! description (lower is better), plus fixed penalties for near-duplicate names
//! and scaffolding-style descriptions. Ties are broken by manager bias, token
//! hit counts, name length, and finally name and manager so the order is total.
//!
//! | tier | condition                                            |
//! |------|------------------------------------------------------|
//! | 0    | exact match, or equal once reduced to alphanumerics  |
//! | 1    | normalized name starts with the normalized query     |
//! | 2    | multi-word query, every token hits the name          |
//! | 3    | normalized name contains the normalized query        |
//! | 4    | some token hits the name                             |
//! | 5    | every token hits the description                     |
//! | 6    | some token hits the description                      |
//! | 12   | no match                                             |

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use regex::Regex;

use crate::data::{Candidate, KnownManagers};

const NO_MATCH: u32 = 12;
const NEAR_DUPLICATE_PENALTY: u32 = 5;
const NOISE_PENALTY: u32 = 2;
const TOKEN_GAP_BASE: usize = 99;

fn noise_terms() -> &'static Regex {
    static NOISE: OnceLock<Regex> = OnceLock::new();
    NOISE.get_or_init(|| {
        Regex::new(r"(plugin|template|starter|boilerplate|router|hooks?|mcp|integration)")
            .expect("static pattern")
    })
}

/// Lowercase ASCII letters and digits of an already-lowercased string.
pub fn normalize_alphanumeric(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .collect()
}

/// Maximal runs of lowercase ASCII letters and digits.
pub fn alphanumeric_tokens(value: &str) -> Vec<String> {
    value
        .split(|c: char| !(c.is_ascii_lowercase() || c.is_ascii_digit()))
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

/// Spellings of the query that count as an exact package name.
///
/// ```
/// use pkgsift::rank::exact_query_candidates;
///
/// assert_eq!(
///     exact_query_candidates("foo  bar"),
///     vec!["foo bar", "foo-bar", "foo_bar", "foobar"]
/// );
/// assert!(exact_query_candidates("   ").is_empty());
/// ```
pub fn exact_query_candidates(query: &str) -> Vec<String> {
    let fields: Vec<&str> = query.split_whitespace().collect();
    if fields.is_empty() {
        return Vec::new();
    }

    let compact = fields.join(" ");
    let mut variants = vec![compact.clone()];
    if fields.len() > 1 {
        variants.push(fields.join("-"));
        variants.push(fields.join("_"));
        variants.push(fields.concat());
    }

    let mut seen = HashSet::new();
    variants
        .into_iter()
        .filter(|variant| !variant.is_empty() && seen.insert(variant.clone()))
        .collect()
}

/// Sort key for one candidate; fields compare in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct RankKey {
    score: u32,
    bias: u8,
    package_gap: usize,
    description_gap: usize,
    package_len: usize,
    package_lowered: String,
    manager: String,
}

struct QueryShape {
    lowered: String,
    normalized: String,
    tokens: Vec<String>,
    has_exact: bool,
}

impl QueryShape {
    fn new(query: &str, rows: &[Candidate]) -> Self {
        let lowered = query.trim().to_lowercase();
        let exact: Vec<String> = exact_query_candidates(query)
            .into_iter()
            .map(|candidate| candidate.to_lowercase())
            .collect();
        let has_exact = rows
            .iter()
            .any(|row| exact.contains(&row.package.to_lowercase()));

        Self {
            normalized: normalize_alphanumeric(&lowered),
            tokens: alphanumeric_tokens(&lowered),
            lowered,
            has_exact,
        }
    }

    fn key(&self, row: &Candidate) -> RankKey {
        let package_lowered = row.package.to_lowercase();
        let description_lowered = row.description.to_lowercase();
        let package_normalized = normalize_alphanumeric(&package_lowered);
        let description_normalized = normalize_alphanumeric(&description_lowered);

        let hits = |raw: &str, normalized: &str| {
            self.tokens
                .iter()
                .filter(|token| raw.contains(token.as_str()) || normalized.contains(token.as_str()))
                .count()
        };
        let package_hits = hits(&package_lowered, &package_normalized);
        let description_hits = hits(&description_lowered, &description_normalized);
        let token_count = self.tokens.len();
        let has_norm = !self.normalized.is_empty();

        let mut score = if package_lowered == self.lowered
            || (has_norm && package_normalized == self.normalized)
        {
            0
        } else if has_norm && package_normalized.starts_with(&self.normalized) {
            1
        } else if token_count > 1 && package_hits == token_count {
            2
        } else if has_norm && package_normalized.contains(&self.normalized) {
            3
        } else if token_count > 0 && package_hits > 0 {
            4
        } else if token_count > 0 && description_hits == token_count {
            5
        } else if token_count > 0 && description_hits > 0 {
            6
        } else {
            NO_MATCH
        };

        if self.has_exact
            && token_count > 0
            && package_hits == token_count
            && alphanumeric_tokens(&package_lowered).len() > token_count
        {
            score += NEAR_DUPLICATE_PENALTY;
        }
        if noise_terms().is_match(&description_lowered) {
            score += NOISE_PENALTY;
        }

        RankKey {
            score,
            bias: row.manager.ranking_bias(),
            package_gap: TOKEN_GAP_BASE.saturating_sub(package_hits),
            description_gap: TOKEN_GAP_BASE.saturating_sub(description_hits),
            package_len: row.package.len(),
            package_lowered,
            manager: row.manager.as_str().to_string(),
        }
    }
}

/// Orders `rows` by relevance to `query`; a blank query leaves them untouched.
pub fn rank(query: &str, rows: Vec<Candidate>) -> Vec<Candidate> {
    if query.trim().is_empty() || rows.is_empty() {
        return rows;
    }

    let shape = QueryShape::new(query, &rows);
    let mut keyed: Vec<(RankKey, Candidate)> = rows
        .into_iter()
        .map(|row| (shape.key(&row), row))
        .collect();
    keyed.sort_by(|(a, _), (b, _)| a.cmp(b));
    keyed.into_iter().map(|(_, row)| row).collect()
}

/// Caps `rows` at `budget` by taking one row per manager in turn.
///
/// Managers rotate in order of first appearance and each keeps its own row
/// order. Inputs within budget, or a zero budget, pass through unchanged.
pub fn round_robin_cap(rows: Vec<Candidate>, budget: usize) -> Vec<Candidate> {
    if budget == 0 || rows.len() <= budget {
        return rows;
    }

    let mut order: Vec<KnownManagers> = Vec::new();
    let mut queues: HashMap<KnownManagers, std::collections::VecDeque<Candidate>> = HashMap::new();
    for row in rows {
        if !queues.contains_key(&row.manager) {
            order.push(row.manager.clone());
        }
        queues.entry(row.manager.clone()).or_default().push_back(row);
    }

    let mut out = Vec::with_capacity(budget);
    while out.len() < budget {
        let mut took_any = false;
        for manager in &order {
            if out.len() == budget {
                break;
            }
            if let Some(row) = queues.get_mut(manager).and_then(|queue| queue.pop_front()) {
                out.push(row);
                took_any = true;
            }
        }
        if !took_any {
            break;
        }
    }
    out
}

/// Keeps the first `limit` ranked rows for a non-blank query.
pub fn apply_result_limit(query: &str, mut rows: Vec<Candidate>, limit: usize) -> Vec<Candidate> {
    if query.trim().is_empty() || limit == 0 {
        return rows;
    }
    rows.truncate(limit);
    rows
}
