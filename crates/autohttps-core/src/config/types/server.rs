use serde::{Deserialize, Serialize};

use crate::{
    address::{ParsedAddress, parse_network_address},
    error::AutoHttpsError,
    http::Route,
};

use super::AutoHttpsConfig;

/// A TLS connection policy; a server with at least one policy serves TLS
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionPolicy {
    /// The SNI values this policy applies to (empty means all)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sni: Vec<String>,

    /// The ALPN protocols to advertise
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alpn: Vec<String>,

    /// The SNI to assume when a client sends none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_sni: Option<String>,

    /// The minimum TLS protocol version, e.g. "tls1.2"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol_min: Option<String>,
}

/// Represents a virtual server: a set of listener addresses and the routes served on them
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Server {
    /// The addresses to listen on, e.g. `:443` or `tcp/0.0.0.0:8080-8090`
    #[serde(default)]
    pub listen: Vec<String>,

    /// The routes, evaluated in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<Route>,

    /// The TLS connection policies; `None` means the server serves plain HTTP
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_connection_policies: Option<Vec<ConnectionPolicy>>,

    /// Automatic HTTPS options
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub automatic_https: Option<AutoHttpsConfig>,
}

impl Server {
    /// Creates a server listening on the given addresses
    pub fn new<I, S>(listen: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            listen: listen.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Appends a route
    pub fn with_route(mut self, route: Route) -> Self {
        self.routes.push(route);
        self
    }

    /// Sets the automatic HTTPS options
    pub fn with_automatic_https(mut self, config: AutoHttpsConfig) -> Self {
        self.automatic_https = Some(config);
        self
    }

    /// Returns the automatic HTTPS options, creating the defaults if absent
    pub fn automatic_https_mut(&mut self) -> &mut AutoHttpsConfig {
        self.automatic_https
            .get_or_insert_with(AutoHttpsConfig::default)
    }

    /// The automatic HTTPS options, or the defaults if none are set
    pub fn automatic_https_or_default(&self) -> AutoHttpsConfig {
        self.automatic_https.clone().unwrap_or_default()
    }

    /// Whether the server has at least one TLS connection policy
    pub fn serves_tls(&self) -> bool {
        self.tls_connection_policies
            .as_ref()
            .is_some_and(|policies| !policies.is_empty())
    }

    /// Makes sure the server has at least one TLS connection policy
    pub fn ensure_tls_connection_policy(&mut self) {
        if self.tls_connection_policies.is_none() {
            self.tls_connection_policies = Some(vec![ConnectionPolicy::default()]);
        }
    }

    /// Parses every listener address; `server_name` is used for error context
    pub fn listener_addresses(
        &self,
        server_name: &str,
    ) -> Result<Vec<ParsedAddress>, AutoHttpsError> {
        self.listen
            .iter()
            .map(|address| {
                parse_network_address(address).map_err(|e| {
                    AutoHttpsError::InvalidListenerAddress {
                        server: server_name.to_string(),
                        address: address.clone(),
                        message: e.to_string(),
                    }
                })
            })
            .collect()
    }

    /// Returns true if any listener covers a port other than `port`. Addresses that fail to
    /// parse are ignored.
    pub fn listeners_use_any_port_other_than(&self, port: u16) -> bool {
        self.listen
            .iter()
            .filter_map(|address| parse_network_address(address).ok())
            .any(|addr| port < addr.start_port || port > addr.end_port)
    }

    /// Returns true if one of the listeners is exactly `address` once both are in their
    /// canonical form
    pub fn has_listener_address(&self, address: &str) -> bool {
        let Ok(wanted) = parse_network_address(address) else {
            return false;
        };

        self.listen
            .iter()
            .filter_map(|listener| parse_network_address(listener).ok())
            .any(|listener| listener.to_string() == wanted.to_string())
    }
}
