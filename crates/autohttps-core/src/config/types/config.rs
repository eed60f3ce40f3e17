use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, path::Path};

use crate::{
    automatic::REDIRECT_SERVER_NAME, config::Format, error::AutoHttpsError, tls::TlsConfig,
};

use super::{LogLevel, Server};

/// The standard plain HTTP port
pub const DEFAULT_HTTP_PORT: u16 = 80;

/// The standard HTTPS port
pub const DEFAULT_HTTPS_PORT: u16 = 443;

/// The core configuration options available
#[derive(Debug, Default, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    /// The port plain HTTP is served on (default: 80)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_port: Option<u16>,

    /// The port HTTPS is served on (default: 443)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub https_port: Option<u16>,

    /// The log level to use (default: "info")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<LogLevel>,

    /// The servers, keyed by name
    #[serde(default)]
    pub servers: BTreeMap<String, Server>,

    /// The TLS settings shared by every server
    #[serde(default)]
    pub tls: TlsConfig,
}

impl Config {
    /// The effective plain HTTP port
    pub fn http_port(&self) -> u16 {
        self.http_port.unwrap_or(DEFAULT_HTTP_PORT)
    }

    /// The effective HTTPS port
    pub fn https_port(&self) -> u16 {
        self.https_port.unwrap_or(DEFAULT_HTTPS_PORT)
    }

    /// Gets a server by name
    pub fn get_server(&self, name: &str) -> Option<&Server> {
        self.servers.get(name)
    }

    /// Adds a server to the config
    pub fn add_server(
        &mut self,
        name: impl Into<String>,
        server: Server,
    ) -> Result<(), AutoHttpsError> {
        let name = name.into();
        if self.servers.contains_key(&name) {
            return Err(AutoHttpsError::ConfigError {
                field: format!("servers.{name}"),
                message: "Server with this name already exists".to_string(),
            });
        }

        self.servers.insert(name, server);
        Ok(())
    }

    /// Removes a server from the config
    pub fn remove_server(&mut self, name: &str) -> Result<Server, AutoHttpsError> {
        self.servers
            .remove(name)
            .ok_or_else(|| AutoHttpsError::ConfigError {
                field: format!("servers.{name}"),
                message: "Server with this name does not exist".to_string(),
            })
    }

    /// Checks the configuration for problems that would only surface later during provisioning
    pub fn validate(&self) -> Result<(), AutoHttpsError> {
        if self.http_port() == self.https_port() {
            return Err(AutoHttpsError::ConfigError {
                field: "https_port".to_string(),
                message: "HTTP and HTTPS ports must differ".to_string(),
            });
        }

        if self.servers.contains_key(REDIRECT_SERVER_NAME) {
            return Err(AutoHttpsError::ConfigError {
                field: format!("servers.{REDIRECT_SERVER_NAME}"),
                message: "This server name is reserved for automatic HTTPS redirects".to_string(),
            });
        }

        for (name, server) in &self.servers {
            if server.listen.is_empty() {
                return Err(AutoHttpsError::ConfigError {
                    field: format!("servers.{name}.listen"),
                    message: "Server must listen on at least one address".to_string(),
                });
            }

            let mut seen = Vec::with_capacity(server.listen.len());
            for address in server.listener_addresses(name)? {
                let canonical = address.to_string();
                if seen.contains(&canonical) {
                    return Err(AutoHttpsError::ConfigError {
                        field: format!("servers.{name}.listen"),
                        message: format!("Listener address '{canonical}' is repeated"),
                    });
                }
                seen.push(canonical);
            }
        }

        Ok(())
    }

    /// Writes the configuration to a file in the specified format
    pub fn write_to_file<P: AsRef<Path>>(
        &self,
        path: P,
        format: Box<dyn Format<'_> + '_>,
    ) -> Result<(), AutoHttpsError> {
        let config_str = format.to_format_string(self)?;
        std::fs::write(path, config_str).map_err(AutoHttpsError::IOError)?;

        Ok(())
    }
}
