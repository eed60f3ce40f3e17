pub mod address;
pub mod app;
pub mod automatic;
pub mod config;
pub mod error;
pub mod http;
pub mod placeholder;
pub mod serve;
pub mod tls;

pub use app::App;
