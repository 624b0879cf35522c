pub mod config;
pub mod error;
pub mod job;
pub mod paginated;
pub mod poller;
pub mod printer;
pub mod request;
pub mod session;
pub mod token;

pub use config::ClientConfig;
pub use error::{Error, Result};
pub use job::Job;
pub use paginated::{ListParams, Paginated};
pub use poller::{CommandHandle, CommandStatus, WaitOptions};
pub use printer::{Printer, Printers};
pub use request::ApiRequest;
pub use session::SessionManager;
pub use token::{FileTokenStore, MemoryTokenStore, TokenKind, TokenRecord, TokenStore};
