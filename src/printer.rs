use log::debug;
use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::job::Job;
use crate::paginated::{ListParams, Paginated};
use crate::poller::{self, CommandHandle, CommandStatus, WaitOptions};
use crate::session::SessionManager;

/// States the service reports while a printer is actively building a part.
const PRINTING_STATES: [&str; 4] = ["Exposing", "Printing", "Printing Layer", "Separating"];

/// A registered printer.
///
/// `data` is the raw resource payload the printer was built from; `status`
/// is the last health snapshot fetched via [`get_status`](Printer::get_status),
/// `None` until first fetched and never refreshed implicitly.
#[derive(Debug, Clone)]
pub struct Printer {
    pub id: String,
    pub name: Option<String>,
    pub firmware: Option<String>,
    pub type_id: Option<String>,
    pub is_primary: bool,
    pub data: Value,
    pub status: Option<Value>,
}

/// Printer ids arrive as strings or numbers depending on the endpoint.
fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl Printer {
    pub fn from_payload(data: Value) -> Result<Self> {
        let id = data
            .get("printer_id")
            .and_then(id_string)
            .ok_or_else(|| Error::MalformedResponse {
                message: "printer payload missing printer_id".to_string(),
                payload: data.clone(),
            })?;

        Ok(Self {
            id,
            name: data
                .get("printer_name")
                .and_then(Value::as_str)
                .map(str::to_string),
            firmware: data
                .get("firmware")
                .and_then(Value::as_str)
                .map(str::to_string),
            type_id: data.get("type_id").and_then(id_string),
            is_primary: data
                .get("is_primary")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            data,
            status: None,
        })
    }

    /// Register a printer to the current member.
    pub async fn register(session: &SessionManager, code: &str, name: &str) -> Result<Value> {
        session
            .authorized_api_request("/print/printers/register")
            .post(
                None,
                Some(&json!({ "registration_code": code, "printer_name": name })),
            )
            .await
    }

    /// Fetch a registered printer by id.
    pub async fn get_by_id(session: &SessionManager, id: &str) -> Result<Self> {
        let data = session
            .authorized_api_request(&format!("/print/printers/{}", id))
            .get(None)
            .await?;
        Self::from_payload(data)
    }

    /// Fetch the printer's health payload and cache it as the current
    /// status snapshot. On failure the stale snapshot is dropped before the
    /// error propagates.
    pub async fn get_status(&mut self, session: &SessionManager) -> Result<Value> {
        let result = session
            .authorized_api_request(&format!("/print/printers/{}", self.id))
            .get(None)
            .await;

        match result {
            Ok(data) => {
                self.status = Some(data.clone());
                Ok(data)
            }
            Err(err) => {
                self.status = None;
                Err(err)
            }
        }
    }

    /// Whether the printer is reachable, judged from the freshest health
    /// evidence available: the cached status snapshot when one was fetched,
    /// the registration payload otherwise. Only an explicit `"Offline"`
    /// counts as offline; the service omits the field for healthy printers.
    pub fn is_online(&self) -> bool {
        let health = self
            .status
            .as_ref()
            .and_then(|status| status.get("printer_last_health"))
            .or_else(|| self.data.get("printer_last_health"))
            .and_then(Value::as_str);
        health != Some("Offline")
    }

    /// Whether the printer is actively printing, per the last status
    /// snapshot.
    pub fn is_printing(&self) -> bool {
        self.status
            .as_ref()
            .and_then(|status| status.pointer("/last_reported_state/data/state"))
            .and_then(Value::as_str)
            .map(|state| PRINTING_STATES.contains(&state))
            .unwrap_or(false)
    }

    /// Pause a running print job.
    pub async fn pause(&self, session: &SessionManager, job_id: &str) -> Result<CommandHandle> {
        self.send_command(session, "pause", Some(json!({ "job_id": job_id })))
            .await
    }

    /// Resume a paused print job.
    pub async fn resume(&self, session: &SessionManager, job_id: &str) -> Result<CommandHandle> {
        self.send_command(session, "resume", Some(json!({ "job_id": job_id })))
            .await
    }

    /// Cancel a running print job.
    pub async fn cancel(&self, session: &SessionManager, job_id: &str) -> Result<CommandHandle> {
        self.send_command(session, "cancel", Some(json!({ "job_id": job_id })))
            .await
    }

    /// Reboot the printer.
    pub async fn reset(&self, session: &SessionManager) -> Result<CommandHandle> {
        self.send_command(session, "reset", None).await
    }

    /// Run the printer's calibration routine.
    pub async fn calibrate(&self, session: &SessionManager) -> Result<CommandHandle> {
        self.send_command(session, "calibrate", None).await
    }

    /// Update the printer firmware from a hosted package.
    pub async fn firmware_upgrade(
        &self,
        session: &SessionManager,
        package_url: &str,
    ) -> Result<CommandHandle> {
        self.send_command(
            session,
            "firmware_upgrade",
            Some(json!({ "package_url": package_url })),
        )
        .await
    }

    /// Ask the printer to upload its logs; the command status carries a
    /// public URL when it completes.
    pub async fn log(&self, session: &SessionManager) -> Result<CommandHandle> {
        self.send_command(session, "log", None).await
    }

    /// Move all actuators to their home configuration.
    pub async fn home(&self, session: &SessionManager) -> Result<CommandHandle> {
        self.send_command(session, "home", None).await
    }

    /// Move all actuators to their park configuration.
    pub async fn park(&self, session: &SessionManager) -> Result<CommandHandle> {
        self.send_command(session, "park", None).await
    }

    /// Issue an asynchronous command and return its task handle extracted
    /// from the immediate response (not the final result).
    pub async fn send_command(
        &self,
        session: &SessionManager,
        command: &str,
        params: Option<Value>,
    ) -> Result<CommandHandle> {
        let data = session
            .authorized_api_request(&format!("/print/printers/{}/{}", self.id, command))
            .post(params.as_ref(), None)
            .await?;

        let task_id =
            data.get("task_id")
                .and_then(id_string)
                .ok_or_else(|| Error::MalformedResponse {
                    message: format!("command {} response missing task_id", command),
                    payload: data.clone(),
                })?;

        debug!("Printer {} accepted command {} as task {}", self.id, command, task_id);
        Ok(CommandHandle {
            command: command.to_string(),
            task_id,
        })
    }

    /// Issue a command and poll it to a terminal status.
    pub async fn send_command_and_wait(
        &self,
        session: &SessionManager,
        command: &str,
        params: Option<Value>,
        options: WaitOptions,
    ) -> Result<CommandStatus> {
        let handle = self.send_command(session, command, params).await?;
        self.wait_for_command(session, &handle, options).await
    }

    /// Poll a previously issued command until it completes, fails or times
    /// out. See [`poller::wait_for_command`].
    pub async fn wait_for_command(
        &self,
        session: &SessionManager,
        handle: &CommandHandle,
        options: WaitOptions,
    ) -> Result<CommandStatus> {
        poller::wait_for_command(session, &self.id, handle, options).await
    }

    /// Set a secondary member's role on this printer. Only the primary
    /// member may do this; anyone else is rejected before any network call.
    pub async fn set_member_role(
        &self,
        session: &SessionManager,
        secondary_member_id: &str,
        is_printer_scoped: bool,
        is_job_scoped: bool,
    ) -> Result<Value> {
        if !self.is_primary {
            return Err(Error::Auth("not printer owner".to_string()));
        }
        session
            .authorized_api_request(&format!("/print/printers/{}/member_role", self.id))
            .post(
                Some(&json!({
                    "secondary_member_id": secondary_member_id,
                    "is_printer_scoped": is_printer_scoped,
                    "is_job_scoped": is_job_scoped
                })),
                None,
            )
            .await
    }

    /// Generate a registration code a secondary member can use to register
    /// this printer. Primary member only.
    pub async fn generate_registration_code(
        &self,
        session: &SessionManager,
        secondary_member_email: &str,
    ) -> Result<Value> {
        if !self.is_primary {
            return Err(Error::Auth("not printer owner".to_string()));
        }
        session
            .authorized_api_request(&format!("/print/printers/{}/secondary_registration", self.id))
            .post(
                Some(&json!({ "secondary_member_email": secondary_member_email })),
                None,
            )
            .await
    }

    /// The members registered to this printer.
    pub async fn get_members(
        &self,
        session: &SessionManager,
        params: &ListParams,
    ) -> Result<Paginated<Value>> {
        let data = session
            .authorized_api_request(&format!("/print/printers/{}/members", self.id))
            .get(Some(&params.to_query()))
            .await?;

        Paginated::from_payload(data, |raw| {
            Ok(raw
                .get("members")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default())
        })
    }

    /// Unregister this printer, or (primary member only) revoke a secondary
    /// member's registration by passing their id.
    pub async fn unregister(
        &self,
        session: &SessionManager,
        member_id: Option<&str>,
    ) -> Result<Value> {
        let query = member_id.map(|id| json!({ "secondary_member_id": id }));
        session
            .authorized_api_request(&format!("/print/printers/{}", self.id))
            .delete(query.as_ref())
            .await
    }

    /// Jobs queued or running on this printer.
    pub async fn get_jobs(
        &self,
        session: &SessionManager,
        params: &ListParams,
    ) -> Result<Paginated<Job>> {
        let data = session
            .authorized_api_request(&format!("/print/printers/{}/jobs", self.id))
            .get(Some(&params.to_query()))
            .await?;

        Paginated::from_payload(data, |raw| {
            raw.get("jobs")
                .and_then(Value::as_array)
                .map(|jobs| jobs.iter().cloned().map(Job::from_payload).collect())
                .unwrap_or_else(|| Ok(Vec::new()))
        })
    }

    /// Create a print job for a printable file.
    pub async fn create_job(
        &self,
        session: &SessionManager,
        printable_id: &str,
        printable_url: &str,
        settings: Option<Value>,
        callback_url: Option<&str>,
    ) -> Result<Value> {
        session
            .authorized_api_request(&format!("/print/printers/{}/jobs", self.id))
            .post(
                Some(&json!({
                    "printable_id": printable_id,
                    "printable_url": printable_url,
                    "settings": settings,
                    "callback_url": callback_url
                })),
                None,
            )
            .await
    }

    /// Start a queued print job.
    pub async fn start_job(&self, session: &SessionManager, job_id: &str) -> Result<Value> {
        session
            .authorized_api_request(&format!("/print/printers/{}/jobs", self.id))
            .put(Some(&json!({ "job_id": job_id })))
            .await
    }
}

/// The `/print/printers` collection.
pub struct Printers;

impl Printers {
    /// Printers registered to the current member.
    pub async fn get(session: &SessionManager, params: &ListParams) -> Result<Paginated<Printer>> {
        let data = session
            .authorized_api_request("/print/printers")
            .get(Some(&params.to_query()))
            .await?;

        Paginated::from_payload(data, |raw| {
            raw.get("printers")
                .and_then(Value::as_array)
                .map(|printers| {
                    printers
                        .iter()
                        .cloned()
                        .map(Printer::from_payload)
                        .collect()
                })
                .unwrap_or_else(|| Ok(Vec::new()))
        })
    }
}
