use crate::error::AutoHttpsError;

use super::Config;

/// A configuration document format
pub trait Format<'a> {
    /// Set the input document
    fn set_input(&mut self, input: &'a str);

    /// Parse the input document into a config; servers and TLS settings are validated later,
    /// during provisioning
    fn parse(&self) -> Result<Config, AutoHttpsError>;

    /// Render a config in this format
    fn to_format_string(&self, config: &Config) -> Result<String, AutoHttpsError>;

    /// Get the file extension for the format
    fn extension(&self) -> &'static str;
}
