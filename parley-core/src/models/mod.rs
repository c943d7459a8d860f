pub mod log;
pub mod session;

pub use log::LogEntry;
pub use session::UserSession;
