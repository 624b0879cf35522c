use serde_json::Value;

use crate::error::{Error, Result};
use crate::session::SessionManager;

/// A print job. Thin by design: the id plus the raw resource payload,
/// which carries whatever state the service chooses to report.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub data: Value,
}

impl Job {
    pub fn from_payload(data: Value) -> Result<Self> {
        let id = match data.get("job_id") {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
        .ok_or_else(|| Error::MalformedResponse {
            message: "job payload missing job_id".to_string(),
            payload: data.clone(),
        })?;

        Ok(Self { id, data })
    }

    /// Fetch a job by id.
    pub async fn get_by_id(session: &SessionManager, id: &str) -> Result<Self> {
        let data = session
            .authorized_api_request(&format!("/print/jobs/{}", id))
            .get(None)
            .await?;
        Self::from_payload(data)
    }

    /// The job status string, when the service has reported one.
    pub fn status(&self) -> Option<&str> {
        self.data.get("job_status").and_then(Value::as_str)
    }
}
