//! Push delivery of reload actions to a running selector.
//!
//! When fzf runs with `--listen`, it exports `FZF_PORT` to the commands it
//! spawns and accepts action strings POSTed to `http://127.0.0.1:$FZF_PORT`.
//! A keystroke handler can then return immediately while the list change is
//! delivered out of band.

use std::borrow::Cow;
use std::time::Duration;

use tracing::debug;

use crate::errors::{PkgsiftError, Result};

/// Prompt shown while the selector is idle.
pub const SEARCH_PROMPT: &str = "Search> ";
/// Prompt shown while a reload is in flight.
pub const LOADING_PROMPT: &str = "Loading> ";

const DEFAULT_HOST: &str = "127.0.0.1";
const POST_TIMEOUT: Duration = Duration::from_secs(2);

/// Single-quotes `value` for a POSIX shell when it needs it.
pub fn shell_quote(value: &str) -> String {
    shell_escape::unix::escape(Cow::from(value)).into_owned()
}

/// Action that resets the prompt and replaces the list with `reload_command`'s output.
pub fn change_list_action(reload_command: &str) -> String {
    format!("change-prompt({SEARCH_PROMPT})+reload({reload_command})")
}

/// Control endpoint URL from an `FZF_PORT` value (`port` or `host:port`).
pub fn endpoint_url(fzf_port: &str) -> Result<String> {
    let value = fzf_port.trim();
    if value.is_empty() {
        return Err(PkgsiftError::Ipc("FZF_PORT is not set".to_string()));
    }

    let (host, port) = match value.split_once(':') {
        Some((host, port)) => {
            let host = host.trim();
            (if host.is_empty() { DEFAULT_HOST } else { host }, port.trim())
        }
        None => (DEFAULT_HOST, value),
    };
    if port.is_empty() || !port.chars().all(|c| c.is_ascii_digit()) {
        return Err(PkgsiftError::Ipc(format!("invalid FZF_PORT '{value}'")));
    }
    Ok(format!("http://{host}:{port}"))
}

/// Posts actions to one selector's listen endpoint.
#[derive(Debug, Clone)]
pub struct ListenClient {
    url: String,
}

impl ListenClient {
    pub fn new(fzf_port: &str) -> Result<Self> {
        Ok(Self {
            url: endpoint_url(fzf_port)?,
        })
    }

    /// Sends `action`; any non-2xx answer is an error.
    pub fn send(&self, action: &str) -> Result<()> {
        debug!("posting {} byte action to {}", action.len(), self.url);
        let response = minreq::post(&self.url)
            .with_header("Content-Type", "text/plain")
            .with_body(action)
            .with_timeout(POST_TIMEOUT.as_secs())
            .send()?;

        if (200..300).contains(&response.status_code) {
            Ok(())
        } else {
            Err(PkgsiftError::Ipc(format!(
                "selector answered {} {}",
                response.status_code, response.reason_phrase
            )))
        }
    }
}
