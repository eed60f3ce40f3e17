use std::path::Path;

use serde::{Deserialize, Serialize};

use super::qualify::match_wildcard;

/// A certificate loaded from disk by the operator rather than managed automatically.
///
/// The subjects it covers are declared alongside the files; names matched by a loaded
/// certificate are left out of automatic management unless the server asks to ignore
/// loaded certificates.
///
/// # Example
/// ```
/// use autohttps::tls::Certificate;
///
/// let cert = Certificate::new("./certs/cert.pem", "./certs/key.pem")
///     .with_ca("./certs/ca.pem")
///     .with_subjects(["example.com", "*.example.com"]);
///
/// assert!(cert.covers("www.example.com"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    /// Path to the certificate PEM file
    pub cert: String,
    /// Path to the private key PEM file
    pub key: String,
    /// Path to the CA bundle PEM file (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca: Option<String>,
    /// Names the certificate is valid for
    #[serde(default)]
    pub subjects: Vec<String>,
}

impl Certificate {
    /// Creates a new certificate with the given cert and key paths.
    pub fn new(cert: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            cert: cert.into(),
            key: key.into(),
            ca: None,
            subjects: Vec::new(),
        }
    }

    /// Adds a CA bundle path to the certificate.
    pub fn with_ca(mut self, ca: impl Into<String>) -> Self {
        self.ca = Some(ca.into());
        self
    }

    /// Declares the names covered by the certificate.
    pub fn with_subjects<I, S>(mut self, subjects: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subjects.extend(subjects.into_iter().map(Into::into));
        self
    }

    /// Whether the certificate covers `name`, either exactly or through a wildcard subject.
    pub fn covers(&self, name: &str) -> bool {
        self.subjects
            .iter()
            .any(|subject| match_wildcard(name, subject))
    }

    /// Returns the certificate path as a `Path`.
    pub fn cert_path(&self) -> &Path {
        Path::new(&self.cert)
    }

    /// Returns the key path as a `Path`.
    pub fn key_path(&self) -> &Path {
        Path::new(&self.key)
    }

    /// Returns the CA path as an `Option<&Path>`.
    pub fn ca_path(&self) -> Option<&Path> {
        self.ca.as_ref().map(|s| Path::new(s.as_str()))
    }
}
