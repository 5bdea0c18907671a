//! Driving fzf as the interactive selector.

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, trace};

use crate::data::KnownManagers;
use crate::errors::{PkgsiftError, Result};
use crate::ipc::{shell_quote, LOADING_PROMPT, SEARCH_PROMPT};
use crate::perf;

/// fzf exits 1 when nothing matched and 130 when interrupted.
const CANCEL_EXIT_CODES: [i32; 2] = [1, 130];

/// Optional fzf features, probed once per session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SelectorCapabilities {
    /// `--listen` control endpoint
    pub listen: bool,
    /// `result` event, used to restore the prompt after a reload
    pub result_bind: bool,
}

impl SelectorCapabilities {
    pub async fn probe(program: &Path) -> Self {
        let listen = match Command::new(program).arg("--help").output().await {
            Ok(out) => {
                let mut text = String::from_utf8_lossy(&out.stdout).into_owned();
                text.push_str(&String::from_utf8_lossy(&out.stderr));
                text.contains("--listen")
            }
            Err(err) => {
                debug!("fzf --help failed: {}", err);
                false
            }
        };
        let result_bind = probe_result_bind(program).await;
        let caps = Self {
            listen,
            result_bind,
        };
        debug!("selector capabilities: {:?}", caps);
        caps
    }
}

async fn probe_result_bind(program: &Path) -> bool {
    let child = Command::new(program)
        .args(["--bind=result:abort", "--filter", "probe"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn();
    let mut child = match child {
        Ok(child) => child,
        Err(_) => return false,
    };
    if let Some(mut stdin) = child.stdin.take() {
        let _ = stdin.write_all(b"probe\n").await;
    }
    match child.wait_with_output().await {
        Ok(out) => {
            let mut text = String::from_utf8_lossy(&out.stdout).into_owned();
            text.push_str(&String::from_utf8_lossy(&out.stderr));
            !text.contains("unsupported key: result")
        }
        Err(_) => false,
    }
}

/// How list reloads reach the selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadBinding {
    /// No reload; the initial list is final
    None,
    /// fzf runs the reload command itself on every keystroke
    Sync { reload: String },
    /// Keystrokes fire `notify`, which pushes the reload through `--listen`;
    /// the refresh key still runs `reload` directly
    Push { reload: String, notify: String },
}

/// Everything fzf needs besides the input file.
#[derive(Debug, Clone)]
pub struct SelectorOptions {
    pub query: String,
    pub header: String,
    pub help_file: PathBuf,
    pub keybind_file: PathBuf,
    pub binding: ReloadBinding,
}

/// Full fzf argument list.
pub fn selector_args(options: &SelectorOptions, caps: &SelectorCapabilities) -> Vec<String> {
    let mut args = vec![
        "-q".to_string(),
        options.query.clone(),
        "-m".to_string(),
        "-e".to_string(),
        "--delimiter=\t".to_string(),
        "--with-nth=1,2,3".to_string(),
        "--preview-window=55%:wrap:border-sharp:hidden".to_string(),
        "--layout=reverse".to_string(),
        "--marker=>>".to_string(),
        format!("--prompt={SEARCH_PROMPT}"),
        format!("--header={}", options.header),
        "--info=inline".to_string(),
        "--margin=2%,1%,2%,1%".to_string(),
        "--cycle".to_string(),
        "--tiebreak=begin,chunk,length".to_string(),
        format!(
            "--bind=ctrl-k:preview:cat {}",
            shell_quote(&options.keybind_file.display().to_string())
        ),
        format!(
            "--bind=ctrl-h:preview:cat {}",
            shell_quote(&options.help_file.display().to_string())
        ),
        "--bind=ctrl-/:change-preview-window(hidden|)".to_string(),
        "--bind=ctrl-n:next-selected,ctrl-b:prev-selected".to_string(),
    ];

    let loading = |reload: &str| {
        if caps.result_bind {
            format!("change-prompt({LOADING_PROMPT})+reload:{reload}")
        } else {
            format!("reload:{reload}")
        }
    };

    match &options.binding {
        ReloadBinding::None => {}
        ReloadBinding::Sync { reload } => {
            args.push(format!("--bind=change:{}", loading(reload)));
            args.push(format!("--bind=ctrl-r:{}", loading(reload)));
        }
        ReloadBinding::Push { reload, notify } => {
            args.push("--listen=0".to_string());
            args.push(format!("--bind=change:execute-silent:{notify}"));
            args.push(format!("--bind=ctrl-r:{}", loading(reload)));
        }
    }
    if caps.result_bind && options.binding != ReloadBinding::None {
        args.push(format!("--bind=result:change-prompt({SEARCH_PROMPT})"));
    }
    args
}

/// Runs fzf over `input`; `Ok(None)` when the user cancelled.
pub async fn run_selector(program: &Path, args: &[String], input: &Path) -> Result<Option<String>> {
    let started = Instant::now();
    let stdin = std::fs::File::open(input)?;
    let direct_stderr = std::io::stderr().is_terminal();
    trace!("fzf args: {:?}", args);

    let output = Command::new(program)
        .args(args)
        .env("SHELL", "sh")
        .stdin(Stdio::from(stdin))
        .stdout(Stdio::piped())
        .stderr(if direct_stderr {
            Stdio::inherit()
        } else {
            Stdio::piped()
        })
        .output()
        .await
        .map_err(|e| PkgsiftError::Selector(format!("could not start fzf: {e}")))?;
    perf::stage("fzf", started);

    if output.status.success() {
        return Ok(Some(String::from_utf8_lossy(&output.stdout).into_owned()));
    }
    match output.status.code() {
        Some(code) if CANCEL_EXIT_CODES.contains(&code) => Ok(None),
        code => {
            let detail = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let code = code.map_or_else(|| "signal".to_string(), |c| c.to_string());
            Err(PkgsiftError::Selector(if detail.is_empty() {
                format!("fzf exited with code {code}")
            } else {
                format!("fzf exited with code {code}: {detail}")
            }))
        }
    }
}

/// Header line above the list.
pub fn header_text(managers: &[KnownManagers]) -> String {
    format!(
        "Select package(s) from {} (TAB to multi-select, * = installed)",
        join_labels(managers)
    )
}

pub fn join_labels(managers: &[KnownManagers]) -> String {
    managers
        .iter()
        .map(|manager| manager.label().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn help_text(managers: &[KnownManagers]) -> String {
    let detected = if managers.is_empty() {
        "None".to_string()
    } else {
        join_labels(managers)
    };
    format!(
        "pkgsift - fuzzy package finder\n\n\
         Syntax:\n  pkgsift [-m manager[,manager...]] search [query]\n\n\
         Active manager(s):\n  {detected}\n\n\
         Commands:\n  search    pick packages interactively\n  feed      print ranked rows\n  \
         cache     inspect or reset the result cache\n  env       list environment settings\n"
    )
}

pub fn keybind_text() -> String {
    "Keybinds:\n\n\
     \x20 ctrl-h  Show help in preview pane\n\
     \x20 ctrl-k  Show keybinds in preview pane\n\
     \x20 ctrl-/  Toggle preview pane\n\
     \x20 ctrl-r  Reload results for the current query\n\
     \x20 ctrl-n  Move to next selected package\n\
     \x20 ctrl-b  Move to previous selected package\n"
        .to_string()
}
