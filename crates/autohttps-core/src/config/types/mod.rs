mod auto_https;
mod config;
mod log_level;
mod server;

pub use auto_https::*;
pub use config::*;
pub use log_level::*;
pub use server::*;
