use std::fmt;
use std::time::Duration;

#[derive(Debug)]
pub enum Error {
    /// Transport-level failure (connection, TLS, request build).
    Http(reqwest::Error),
    /// The service answered with a non-success HTTP status.
    Api { status: u16, body: String },
    /// A response arrived but lacks required fields; carries the raw payload.
    MalformedResponse {
        message: String,
        payload: serde_json::Value,
    },
    /// Authorization-state error raised before any I/O (e.g. refresh while
    /// logged out, member operation on a non-primary printer).
    Auth(String),
    /// The service reported a command failure while polling.
    Command(String),
    /// The polling deadline was exceeded before the command finished.
    Timeout { elapsed: Duration },
    Io(std::io::Error),
    Json(serde_json::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Http(err) => write!(f, "HTTP error: {}", err),
            Error::Api { status, body } => write!(f, "API error ({}): {}", status, body),
            Error::MalformedResponse { message, .. } => {
                write!(f, "Malformed response: {}", message)
            }
            Error::Auth(msg) => write!(f, "Authorization error: {}", msg),
            Error::Command(msg) => write!(f, "Command error: {}", msg),
            Error::Timeout { elapsed } => {
                write!(f, "Command timed out after {:.1}s", elapsed.as_secs_f64())
            }
            Error::Io(err) => write!(f, "IO error: {}", err),
            Error::Json(err) => write!(f, "JSON parsing error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Http(err) => Some(err),
            Error::Io(err) => Some(err),
            Error::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Http(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
