//! Core data model: package manager identifiers, search rows, and candidates.

use std::fmt;
use std::time::Duration;

use serde_enum_str::{Deserialize_enum_str, Serialize_enum_str};
use tracing::trace;

use crate::sources::CommandLocator;

/// Placeholder written when a backend supplies no description.
pub const EMPTY_DESCRIPTION: &str = "-";

/// Package managers pkgsift knows how to query.
#[derive(Serialize_enum_str, Deserialize_enum_str, Debug, Clone, Eq, PartialEq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum KnownManagers {
    Apt,
    Dnf,
    Pacman,
    Zypper,
    Emerge,
    Brew,
    Winget,
    Choco,
    Scoop,
    Snap,
    Flatpak,
    Npm,
    Bun,
    #[serde(other)]
    Unknown(String),
}

impl KnownManagers {
    /// Every supported manager, in default detection order.
    pub fn all() -> Vec<KnownManagers> {
        vec![
            KnownManagers::Apt,
            KnownManagers::Dnf,
            KnownManagers::Pacman,
            KnownManagers::Zypper,
            KnownManagers::Emerge,
            KnownManagers::Brew,
            KnownManagers::Winget,
            KnownManagers::Choco,
            KnownManagers::Scoop,
            KnownManagers::Snap,
            KnownManagers::Flatpak,
            KnownManagers::Bun,
            KnownManagers::Npm,
        ]
    }

    /// Parses a user-supplied manager name, accepting common aliases.
    ///
    /// Unrecognized names come back as [`KnownManagers::Unknown`] holding the
    /// normalized (trimmed, lowercased, whitespace-collapsed) input.
    pub fn from_name(value: &str) -> KnownManagers {
        let normalized = value
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();

        match normalized.as_str() {
            "apt" => KnownManagers::Apt,
            "dnf" => KnownManagers::Dnf,
            "pacman" => KnownManagers::Pacman,
            "zypper" => KnownManagers::Zypper,
            "emerge" | "portage" | "portage-emerge" | "portage (emerge)" => KnownManagers::Emerge,
            "brew" | "homebrew" => KnownManagers::Brew,
            "winget" | "win-get" => KnownManagers::Winget,
            "choco" | "chocolatey" | "chocolate" => KnownManagers::Choco,
            "scoop" => KnownManagers::Scoop,
            "snap" => KnownManagers::Snap,
            "flatpak" => KnownManagers::Flatpak,
            "npm" => KnownManagers::Npm,
            "bun" => KnownManagers::Bun,
            _ => KnownManagers::Unknown(normalized),
        }
    }

    /// Parses a comma-separated manager list, dropping blanks and duplicates.
    pub fn parse_list(csv: &str) -> Vec<KnownManagers> {
        let mut managers: Vec<KnownManagers> = Vec::new();
        for name in csv.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let manager = KnownManagers::from_name(name);
            if !managers.contains(&manager) {
                managers.push(manager);
            }
        }
        managers
    }

    /// Canonical identifier used in output rows, cache paths, and env keys.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            KnownManagers::Apt => "apt",
            KnownManagers::Dnf => "dnf",
            KnownManagers::Pacman => "pacman",
            KnownManagers::Zypper => "zypper",
            KnownManagers::Emerge => "emerge",
            KnownManagers::Brew => "brew",
            KnownManagers::Winget => "winget",
            KnownManagers::Choco => "choco",
            KnownManagers::Scoop => "scoop",
            KnownManagers::Snap => "snap",
            KnownManagers::Flatpak => "flatpak",
            KnownManagers::Npm => "npm",
            KnownManagers::Bun => "bun",
            KnownManagers::Unknown(name) => name,
        }
    }

    /// Human-facing label used in headers and messages.
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            KnownManagers::Apt => "APT",
            KnownManagers::Dnf => "DNF",
            KnownManagers::Pacman => "Pacman",
            KnownManagers::Zypper => "Zypper",
            KnownManagers::Emerge => "Portage (emerge)",
            KnownManagers::Brew => "Homebrew",
            KnownManagers::Winget => "WinGet",
            KnownManagers::Choco => "Chocolatey",
            KnownManagers::Scoop => "Scoop",
            KnownManagers::Snap => "Snap",
            KnownManagers::Flatpak => "Flatpak",
            KnownManagers::Npm => "npm",
            KnownManagers::Bun => "bun",
            KnownManagers::Unknown(name) => name,
        }
    }

    /// Uppercase form used to build per-manager env keys (`PKGSIFT_APT_...`).
    #[must_use]
    pub fn env_key(&self) -> String {
        self.as_str().to_uppercase().replace('-', "_")
    }

    #[must_use]
    pub fn is_supported(&self) -> bool {
        !matches!(self, KnownManagers::Unknown(_))
    }

    /// The JS ecosystem managers get a larger per-query budget and sort last on ties.
    #[must_use]
    pub fn is_js_ecosystem(&self) -> bool {
        matches!(self, KnownManagers::Npm | KnownManagers::Bun)
    }

    /// Binaries that must all resolve on `PATH` before the manager is usable.
    #[must_use]
    pub fn required_binaries(&self) -> Vec<&str> {
        match self {
            KnownManagers::Apt => vec!["apt-cache", "apt-get", "dpkg-query"],
            KnownManagers::Unknown(_) => Vec::new(),
            other => vec![other.as_str()],
        }
    }

    /// The executable whose resolved path is baked into cache fingerprints.
    #[must_use]
    pub fn fingerprint_command(&self) -> &str {
        match self {
            KnownManagers::Apt => "apt-cache",
            other => other.as_str(),
        }
    }

    /// Whether every required binary resolves through `locator`.
    pub fn is_ready(&self, locator: &dyn CommandLocator) -> bool {
        if !self.is_supported() {
            return false;
        }
        let ready = self
            .required_binaries()
            .iter()
            .all(|bin| locator.locate(bin).is_some());
        trace!("manager {} ready: {}", self.as_str(), ready);
        ready
    }

    /// Query sent instead of an empty one, so listing without a query still
    /// returns a representative slice of the catalog.
    #[must_use]
    pub fn empty_query_probe(&self) -> &'static str {
        match self {
            KnownManagers::Apt
            | KnownManagers::Dnf
            | KnownManagers::Pacman
            | KnownManagers::Zypper
            | KnownManagers::Emerge
            | KnownManagers::Choco
            | KnownManagers::Scoop
            | KnownManagers::Snap => "a",
            KnownManagers::Brew | KnownManagers::Npm | KnownManagers::Bun | KnownManagers::Winget => {
                "aa"
            }
            KnownManagers::Flatpak | KnownManagers::Unknown(_) => "",
        }
    }

    /// Ranking tie-break bias; higher sorts later.
    #[must_use]
    pub fn ranking_bias(&self) -> u8 {
        match self {
            KnownManagers::Npm => 4,
            KnownManagers::Bun => 3,
            _ => 0,
        }
    }

    /// Default search-cache TTL; `None` means the manager is not cached by default.
    #[must_use]
    pub fn default_query_cache_ttl(&self) -> Option<Duration> {
        match self {
            KnownManagers::Apt | KnownManagers::Pacman => Some(Duration::from_secs(180)),
            KnownManagers::Brew => Some(Duration::from_secs(120)),
            KnownManagers::Bun => Some(Duration::from_secs(300)),
            _ => None,
        }
    }

    /// Per-call budget during live reload with several managers active.
    #[must_use]
    pub fn default_reload_timeout(&self) -> Duration {
        let millis = match self {
            KnownManagers::Apt | KnownManagers::Pacman => 1500,
            KnownManagers::Bun => 2000,
            KnownManagers::Brew
            | KnownManagers::Scoop
            | KnownManagers::Snap
            | KnownManagers::Flatpak
            | KnownManagers::Npm => 2500,
            KnownManagers::Dnf
            | KnownManagers::Zypper
            | KnownManagers::Winget
            | KnownManagers::Choco => 3000,
            KnownManagers::Emerge => 4000,
            KnownManagers::Unknown(_) => 2000,
        };
        Duration::from_millis(millis)
    }

    /// Slower sibling tried when this manager's own search fails.
    #[must_use]
    pub fn fallback_sibling(&self) -> Option<KnownManagers> {
        match self {
            KnownManagers::Bun => Some(KnownManagers::Npm),
            _ => None,
        }
    }
}

/// Which managers are usable on this machine, primary first.
///
/// When `prefer_bun` is set and bun is ready, npm is left out since both
/// search the same registry.
pub fn detect_available_managers(locator: &dyn CommandLocator, prefer_bun: bool) -> Vec<KnownManagers> {
    let mut out: Vec<KnownManagers> = Vec::new();
    let mut add = |manager: KnownManagers| {
        if !out.contains(&manager) && manager.is_ready(locator) {
            out.push(manager);
        }
    };

    if let Some(primary) = detect_primary_manager(locator) {
        add(primary);
    }

    let skip_npm = prefer_bun && KnownManagers::Bun.is_ready(locator);
    for manager in KnownManagers::all() {
        if skip_npm && manager == KnownManagers::Npm {
            continue;
        }
        add(manager);
    }
    out
}

fn detect_primary_manager(locator: &dyn CommandLocator) -> Option<KnownManagers> {
    use KnownManagers::*;

    let candidates: Vec<KnownManagers> = if cfg!(target_os = "macos") {
        vec![Brew, Bun, Npm]
    } else if cfg!(target_os = "windows") {
        vec![Winget, Choco, Scoop, Bun, Npm]
    } else if cfg!(target_os = "linux") {
        vec![Apt, Dnf, Pacman, Zypper, Emerge, Snap, Flatpak, Bun, Npm]
    } else {
        vec![Brew, Winget, Choco, Scoop, Bun, Npm]
    };

    candidates.into_iter().find(|m| m.is_ready(locator))
}

/// A `(name, description)` pair as parsed from one manager's output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRow {
    pub name: String,
    pub description: String,
}

impl SearchRow {
    pub fn new<S1: Into<String>, S2: Into<String>>(name: S1, description: S2) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// One search result attributed to the manager that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub manager: KnownManagers,
    pub package: String,
    pub description: String,
}

impl Candidate {
    pub fn new<S1: Into<String>, S2: Into<String>>(
        manager: KnownManagers,
        package: S1,
        description: S2,
    ) -> Self {
        Self {
            manager,
            package: package.into(),
            description: description.into(),
        }
    }

    /// A blank description becomes [`EMPTY_DESCRIPTION`].
    pub fn from_row(manager: &KnownManagers, row: SearchRow) -> Self {
        let description = if row.description.trim().is_empty() {
            EMPTY_DESCRIPTION.to_string()
        } else {
            row.description
        };
        Self {
            manager: manager.clone(),
            package: row.name,
            description,
        }
    }

    /// Parses a `manager\tpackage\tdescription` line; returns `None` when the
    /// manager or package column is missing.
    pub fn parse_line(line: &str) -> Option<Self> {
        let mut parts = line.splitn(3, '\t');
        let manager = parts.next()?.trim();
        let package = parts.next()?.trim();
        if manager.is_empty() || package.is_empty() {
            return None;
        }
        let description = parts.next().unwrap_or(EMPTY_DESCRIPTION);
        Some(Self::new(KnownManagers::from_name(manager), package, description))
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}",
            self.manager.as_str(),
            self.package,
            self.description
        )
    }
}
