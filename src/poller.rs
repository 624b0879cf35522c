use log::debug;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tokio::time::Instant;

use crate::error::{Error, Result};
use crate::session::SessionManager;

/// Handle returned immediately when an asynchronous printer command is
/// issued; consumed by [`wait_for_command`]. Ephemeral, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandHandle {
    pub command: String,
    pub task_id: String,
}

/// The result of one command-status poll. Terminal when `progress >= 1.0`
/// or `is_error` is set. Service-defined fields beyond the known ones are
/// retained in `extra` so progress callbacks see the whole payload.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandStatus {
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub is_error: bool,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Polling knobs for [`wait_for_command`].
pub struct WaitOptions {
    pub poll_interval: Duration,
    pub timeout: Duration,
    /// Invoked with every non-error status payload, including the final
    /// completed one.
    pub on_progress: Option<Box<dyn FnMut(&CommandStatus) + Send>>,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1000),
            timeout: Duration::from_millis(10_000),
            on_progress: None,
        }
    }
}

impl std::fmt::Debug for WaitOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaitOptions")
            .field("poll_interval", &self.poll_interval)
            .field("timeout", &self.timeout)
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

/// Poll a printer command until it completes, fails or times out.
///
/// Every `poll_interval` the command status is queried; the outcomes are
/// mutually exclusive and final:
/// - a transport/API failure of the query itself fails the wait with that
///   error;
/// - a status carrying `is_error` fails the wait with the service-reported
///   message ([`Error::Command`]);
/// - `progress >= 1.0` completes the wait with the status payload;
/// - the deadline expiring fails the wait with [`Error::Timeout`].
///
/// The timeout is measured from poll-loop start, not from the last
/// successful poll, so a slow first response still counts against the
/// deadline. Polls are strictly sequential: the next interval only starts
/// after the previous response was handled.
pub async fn wait_for_command(
    session: &SessionManager,
    printer_id: &str,
    handle: &CommandHandle,
    mut options: WaitOptions,
) -> Result<CommandStatus> {
    let start = Instant::now();
    let endpoint = format!("/print/printers/{}/{}", printer_id, handle.command);
    let query = json!({ "task_id": handle.task_id });

    loop {
        tokio::time::sleep(options.poll_interval).await;

        let payload = session
            .authorized_api_request(&endpoint)
            .get(Some(&query))
            .await?;
        let status: CommandStatus = serde_json::from_value(payload)?;

        if status.is_error {
            let message = status
                .error_message
                .unwrap_or_else(|| format!("command {} failed", handle.command));
            return Err(Error::Command(message));
        }

        if let Some(on_progress) = options.on_progress.as_mut() {
            on_progress(&status);
        }

        if status.progress >= 1.0 {
            debug!("Command {} task {} completed", handle.command, handle.task_id);
            return Ok(status);
        }

        let elapsed = start.elapsed();
        if elapsed >= options.timeout {
            return Err(Error::Timeout { elapsed });
        }
    }
}
