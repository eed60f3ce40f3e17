use thiserror::Error;

#[derive(Error, Debug)]
pub enum AutoHttpsError {
    #[error("Error in `{field}`: {message}")]
    ConfigError { field: String, message: String },

    #[error("Failed to parse `{field}`: {message}")]
    ParseError { field: String, message: String },

    #[error("Invalid network address '{address}': {message}")]
    InvalidAddress { address: String, message: String },

    #[error("server {server}: invalid listener address '{address}': {message}")]
    InvalidListenerAddress {
        server: String,
        address: String,
        message: String,
    },

    #[error("server {server}: setting up route matchers: {message}")]
    MatcherProvisioning { server: String, message: String },

    #[error(
        "{server}: route {route}, matcher set {matcher_set}, matcher {matcher}, host matcher {host}: {message}"
    )]
    Placeholder {
        server: String,
        route: usize,
        matcher_set: usize,
        matcher: usize,
        host: usize,
        message: String,
    },

    #[error("Failed to replace placeholders in '{input}': {message}")]
    Replacement { input: String, message: String },

    #[error("Automation policy conflict: {0}")]
    PolicyConflict(String),

    #[error("Invalid issuer configuration: {0}")]
    InvalidIssuer(String),

    #[error("Issuer `{issuer}` is not supported by this certificate backend")]
    UnsupportedIssuer { issuer: String },

    #[error("managing certificates for {domains:?}: {message}")]
    Activation {
        domains: Vec<String>,
        message: String,
    },

    #[error("Invalid lifecycle transition: {0}")]
    Lifecycle(String),

    #[error("Failed to create certificate directory `{path}`: {message}")]
    CertificateDirectoryCreationFailed { path: String, message: String },

    #[error("Failed to bind listener `{address}`, reason: {source}")]
    FailedToBind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    IOError(#[from] std::io::Error),

    #[error("{0}")]
    GenericError(String),
}
