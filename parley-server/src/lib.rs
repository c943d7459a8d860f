pub mod commands;
pub mod dispatch;
pub mod http;
pub mod scheduler;
pub mod session;
pub mod telegram;
pub mod transport;
