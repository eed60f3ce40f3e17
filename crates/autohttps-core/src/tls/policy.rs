// Automation policies and certificate issuers

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::AutoHttpsError;

/// Default Let's Encrypt production directory URL
pub const LETS_ENCRYPT_PRODUCTION_URL: &str = "https://acme-v02.api.letsencrypt.org/directory";

/// Let's Encrypt staging directory URL (for testing)
pub const LETS_ENCRYPT_STAGING_URL: &str = "https://acme-staging-v02.api.letsencrypt.org/directory";

/// Name of the CA used by the internal issuer when none is configured
pub const DEFAULT_INTERNAL_CA: &str = "local";

/// Binds a set of subject names to the issuer responsible for their certificates.
///
/// A policy without subjects is a catch-all: it covers every name not claimed by a more
/// specific policy.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationPolicy {
    /// The names this policy applies to
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subjects: Vec<String>,

    /// The issuer used to obtain certificates (default: ACME)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<Issuer>,

    /// Whether certificates are obtained on the first TLS handshake instead of at startup
    #[serde(default)]
    pub on_demand: bool,

    /// The type of key to generate, e.g. `p256` or `rsa2048`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_type: Option<String>,

    /// Fraction of the certificate lifetime remaining at which renewal starts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renewal_window_ratio: Option<f64>,
}

impl AutomationPolicy {
    /// Creates a policy for the given subjects and issuer
    pub fn new(subjects: Vec<String>, issuer: Issuer) -> Self {
        Self {
            subjects,
            issuer: Some(issuer),
            ..Default::default()
        }
    }

    /// Whether the policy has no subject filter
    pub fn is_catch_all(&self) -> bool {
        self.subjects.is_empty()
    }

    /// Derives a new policy from this one, keeping every inherited default and replacing the
    /// issuer and subjects. The template itself is left untouched.
    pub fn derive(&self, issuer: Issuer, subjects: Vec<String>) -> Self {
        let mut policy = self.clone();
        policy.issuer = Some(issuer);
        policy.subjects = subjects;
        policy
    }

    /// Returns the issuer, falling back to a default ACME issuer
    pub fn issuer_or_default(&self) -> Issuer {
        self.issuer
            .clone()
            .unwrap_or_else(|| Issuer::Acme(AcmeIssuer::default()))
    }

    /// Provisions the configured issuer, if any
    pub fn provision(&mut self) -> Result<(), AutoHttpsError> {
        if let Some(issuer) = self.issuer.as_mut() {
            issuer.provision()?;
        }

        if let Some(ratio) = self.renewal_window_ratio {
            if ratio <= 0.0 || ratio >= 1.0 {
                return Err(AutoHttpsError::ConfigError {
                    field: "tls.automation.policies.renewal_window_ratio".to_string(),
                    message: format!("must be between 0 and 1 (exclusive), got {ratio}"),
                });
            }
        }

        Ok(())
    }
}

/// The available certificate issuers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "module", rename_all = "snake_case")]
pub enum Issuer {
    /// Certificates from an ACME CA (e.g. Let's Encrypt)
    Acme(AcmeIssuer),

    /// Certificates signed by a locally managed CA
    Internal(InternalIssuer),

    /// An issuer provided by the embedding application
    Custom(CustomIssuer),
}

impl Issuer {
    /// A short name of the issuer kind, used in logs and errors
    pub fn kind(&self) -> &'static str {
        match self {
            Issuer::Acme(_) => "acme",
            Issuer::Internal(_) => "internal",
            Issuer::Custom(_) => "custom",
        }
    }

    /// Returns the ACME issuer if this is one
    pub fn as_acme(&self) -> Option<&AcmeIssuer> {
        match self {
            Issuer::Acme(acme) => Some(acme),
            _ => None,
        }
    }

    /// Fills in defaults and validates the issuer; must be called before the issuer is used
    pub fn provision(&mut self) -> Result<(), AutoHttpsError> {
        match self {
            Issuer::Acme(acme) => acme.provision(),
            Issuer::Internal(internal) => internal.provision(),
            Issuer::Custom(custom) => {
                if custom.name.trim().is_empty() {
                    return Err(AutoHttpsError::InvalidIssuer(
                        "custom issuer requires a name".to_string(),
                    ));
                }
                Ok(())
            }
        }
    }
}

/// ACME issuer settings
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcmeIssuer {
    /// ACME directory URL (default: Let's Encrypt production)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca: Option<String>,

    /// Contact email address for the ACME account
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Challenge settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub challenges: Option<ChallengesConfig>,
}

impl AcmeIssuer {
    /// The directory URL, falling back to Let's Encrypt production
    pub fn directory_url(&self) -> &str {
        self.ca.as_deref().unwrap_or(LETS_ENCRYPT_PRODUCTION_URL)
    }

    /// Sets the HTTP-01 alternate port unless one is already configured
    pub fn set_http_alternate_port(&mut self, port: u16) {
        let http = self
            .challenges
            .get_or_insert_with(ChallengesConfig::default)
            .http
            .get_or_insert_with(ChallengeConfig::default);
        if http.alternate_port.is_none() {
            http.alternate_port = Some(port);
        }
    }

    /// Sets the TLS-ALPN-01 alternate port unless one is already configured
    pub fn set_tls_alpn_alternate_port(&mut self, port: u16) {
        let tls_alpn = self
            .challenges
            .get_or_insert_with(ChallengesConfig::default)
            .tls_alpn
            .get_or_insert_with(ChallengeConfig::default);
        if tls_alpn.alternate_port.is_none() {
            tls_alpn.alternate_port = Some(port);
        }
    }

    /// The configured HTTP-01 alternate port, if any
    pub fn http_alternate_port(&self) -> Option<u16> {
        self.challenges.as_ref()?.http.as_ref()?.alternate_port
    }

    /// The configured TLS-ALPN-01 alternate port, if any
    pub fn tls_alpn_alternate_port(&self) -> Option<u16> {
        self.challenges.as_ref()?.tls_alpn.as_ref()?.alternate_port
    }

    fn provision(&mut self) -> Result<(), AutoHttpsError> {
        let ca = self
            .ca
            .get_or_insert_with(|| LETS_ENCRYPT_PRODUCTION_URL.to_string());

        let url = Url::parse(ca).map_err(|e| {
            AutoHttpsError::InvalidIssuer(format!("invalid ACME directory URL '{ca}': {e}"))
        })?;
        if url.scheme() != "https" && url.scheme() != "http" {
            return Err(AutoHttpsError::InvalidIssuer(format!(
                "ACME directory URL '{ca}' must use http or https"
            )));
        }

        if let Some(email) = &self.email {
            if !email.contains('@') {
                return Err(AutoHttpsError::InvalidIssuer(format!(
                    "invalid ACME contact email '{email}'"
                )));
            }
        }

        Ok(())
    }
}

/// Settings for the ACME challenge types
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengesConfig {
    /// HTTP-01 challenge settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<ChallengeConfig>,

    /// TLS-ALPN-01 challenge settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_alpn: Option<ChallengeConfig>,
}

/// Settings for a single challenge type
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeConfig {
    /// Whether the challenge type is disabled
    #[serde(default)]
    pub disabled: bool,

    /// The port the challenge solver listens on instead of the standard one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternate_port: Option<u16>,
}

/// Settings for the internal (self-managed CA) issuer
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct InternalIssuer {
    /// The name of the local CA (default: "local")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca: Option<String>,

    /// Whether to sign leaf certificates with the root directly
    #[serde(default)]
    pub sign_with_root: bool,
}

impl InternalIssuer {
    fn provision(&mut self) -> Result<(), AutoHttpsError> {
        let ca = self.ca.get_or_insert_with(|| DEFAULT_INTERNAL_CA.to_string());
        if ca.trim().is_empty() {
            return Err(AutoHttpsError::InvalidIssuer(
                "internal issuer CA name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// An issuer implemented outside of this crate; its options are passed through untouched
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomIssuer {
    /// Name of the issuer implementation
    pub name: String,

    /// Free-form options for the issuer
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, String>,
}
