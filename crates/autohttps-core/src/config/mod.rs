mod format;
#[cfg(feature = "toml")]
pub mod toml;

mod types;

pub use format::Format;
pub use types::*;
