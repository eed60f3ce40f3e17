use serde::{Deserialize, Serialize};

/// Per-server switches for automatic HTTPS.
///
/// HTTPS is enabled automatically when qualifying hostnames are found in a server's routes;
/// these options turn all or parts of that off.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoHttpsConfig {
    /// Disables automatic HTTPS entirely for the server
    #[serde(default, rename = "disable")]
    pub disabled: bool,

    /// Disables only the automatic HTTP->HTTPS redirects
    #[serde(default)]
    pub disable_redirects: bool,

    /// Names that are left out of automatic HTTPS completely (no certificates, no redirects)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skip: Vec<String>,

    /// Names that still get redirects but for which no certificate is managed
    #[serde(default, rename = "skip_certificates", skip_serializing_if = "Vec::is_empty")]
    pub skip_certs: Vec<String>,

    /// Manage certificates even for names already covered by a loaded certificate
    #[serde(default, rename = "ignore_loaded_certificates")]
    pub ignore_loaded_certs: bool,
}

impl AutoHttpsConfig {
    /// Returns true if `name` is listed in `list`, which should be either `skip` or
    /// `skip_certs`. Only exact matches count.
    pub fn skipped(name: &str, list: &[String]) -> bool {
        list.iter().any(|n| n == name)
    }

    /// Whether `name` is excluded from automatic HTTPS for this server
    pub fn skips(&self, name: &str) -> bool {
        Self::skipped(name, &self.skip)
    }

    /// Whether certificate management is skipped for `name` on this server
    pub fn skips_certs(&self, name: &str) -> bool {
        Self::skipped(name, &self.skip_certs)
    }
}
