// ACME certificate management backed by tokio-rustls-acme
//
// Each group of names handed over by the automation store gets its own ACME state, cached in
// a directory of its own. Validation uses TLS-ALPN-01, so HTTPS listeners must terminate TLS
// with the backend's shared resolver.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use futures_util::StreamExt;
use log::{debug, error, info, warn};
use rustls::{
    ServerConfig,
    server::{ClientHello, ResolvesServerCert},
    sign::CertifiedKey,
};
use tokio_rustls::TlsAcceptor;
use tokio_rustls_acme::AcmeConfig;
use tokio_rustls_acme::acme::ACME_TLS_ALPN_NAME;
use tokio_rustls_acme::caches::DirCache;

use crate::error::AutoHttpsError;

use super::{
    AutomationPolicy, Issuer, ManagementBackend, TlsConfig,
    cache::{create_cert_directory, entry_name_for},
    policy::AcmeIssuer,
    qualify::match_wildcard,
};

/// Manages issuance and renewal for one group of names
pub struct AcmeManager {
    name: String,
    domains: Vec<String>,
    resolver: Arc<dyn ResolvesServerCert>,
}

impl AcmeManager {
    /// Starts managing `domains` with the given issuer.
    ///
    /// Must be called from within a tokio runtime: ACME events are driven by a spawned task.
    pub fn start(
        domains: Vec<String>,
        issuer: &AcmeIssuer,
        cache_dir: &Path,
    ) -> Result<Self, AutoHttpsError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            AutoHttpsError::GenericError(format!(
                "ACME certificate management requires a running tokio runtime: {e}"
            ))
        })?;

        let name = entry_name_for(&domains);
        let entry_dir = create_cert_directory(&name, cache_dir)?;

        info!(
            "Initializing ACME for '{}' with domains: {:?}",
            name, domains
        );
        info!("Using ACME directory: {}", issuer.directory_url());

        if issuer.http_alternate_port().is_some() {
            warn!(
                "HTTP-01 alternate port is configured for '{}' but only TLS-ALPN-01 validation is performed",
                name
            );
        }

        install_crypto_provider();

        let mut config = AcmeConfig::new(domains.clone()).directory(issuer.directory_url());
        if let Some(email) = &issuer.email {
            config = config.contact_push(format!("mailto:{email}"));
        }
        let config = config.cache(DirCache::new(entry_dir));

        let mut state = config.state();
        let resolver = state.resolver();

        // Drive certificate issuance/renewal in the background
        let task_name = name.clone();
        runtime.spawn(async move {
            loop {
                match state.next().await {
                    Some(Ok(event)) => {
                        info!("ACME event for '{}': {:?}", task_name, event);
                    }
                    Some(Err(err)) => {
                        error!("ACME error for '{}': {:?}", task_name, err);
                    }
                    None => {
                        info!("ACME state stream ended for '{}'", task_name);
                        break;
                    }
                }
            }
        });

        Ok(Self {
            name,
            domains,
            resolver,
        })
    }

    /// Get the ACME resolver for certificate resolution
    pub fn resolver(&self) -> Arc<dyn ResolvesServerCert> {
        self.resolver.clone()
    }

    /// Get the domains managed by this ACME manager
    pub fn domains(&self) -> &[String] {
        &self.domains
    }

    /// Get the cache entry name
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Install the default crypto provider if none is installed yet
fn install_crypto_provider() {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
}

/// Picks the certificate of the manager responsible for the requested server name.
///
/// Cloning shares the underlying managers, so a handle taken before the backend is handed
/// to the automation store sees every manager started later.
#[derive(Debug, Clone, Default)]
pub struct AcmeResolver {
    entries: Arc<RwLock<Vec<(Vec<String>, Arc<dyn ResolvesServerCert>)>>>,
}

impl AcmeResolver {
    fn register(&self, manager: &AcmeManager) {
        if let Ok(mut entries) = self.entries.write() {
            entries.push((manager.domains().to_vec(), manager.resolver()));
        }
    }

    /// Whether a manager has been started for `name`
    pub fn manages(&self, name: &str) -> bool {
        self.entries.read().is_ok_and(|entries| {
            entries
                .iter()
                .any(|(domains, _)| domains.iter().any(|domain| match_wildcard(name, domain)))
        })
    }

    /// Builds a TLS acceptor resolving certificates through this resolver. It also negotiates
    /// `acme-tls/1`, so TLS-ALPN-01 challenges are answered on the same listeners.
    pub fn tls_acceptor(&self) -> TlsAcceptor {
        install_crypto_provider();

        let mut config = ServerConfig::builder()
            .with_no_client_auth()
            .with_cert_resolver(Arc::new(self.clone()));
        config.alpn_protocols = vec![b"http/1.1".to_vec(), ACME_TLS_ALPN_NAME.to_vec()];

        TlsAcceptor::from(Arc::new(config))
    }
}

impl ResolvesServerCert for AcmeResolver {
    fn resolve(&self, client_hello: ClientHello) -> Option<Arc<CertifiedKey>> {
        let name = client_hello.server_name()?.to_lowercase();
        let resolver = {
            let entries = self.entries.read().ok()?;
            entries
                .iter()
                .find(|(domains, _)| domains.iter().any(|domain| match_wildcard(&name, domain)))
                .map(|(_, resolver)| resolver.clone())
        };

        match resolver {
            Some(resolver) => resolver.resolve(client_hello),
            None => {
                debug!("No managed certificate for '{name}'");
                None
            }
        }
    }
}

/// A [`ManagementBackend`] that obtains certificates from ACME CAs
pub struct AcmeBackend {
    cache_dir: PathBuf,
    managers: Vec<AcmeManager>,
    resolver: AcmeResolver,
}

impl AcmeBackend {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            managers: Vec::new(),
            resolver: AcmeResolver::default(),
        }
    }

    /// A handle on the certificates of every manager this backend starts
    pub fn resolver(&self) -> AcmeResolver {
        self.resolver.clone()
    }

    /// Creates a backend caching into the configured directory
    pub fn from_config(config: &TlsConfig) -> Self {
        Self::new(config.cache_directory.clone())
    }

    /// The managers started so far
    pub fn managers(&self) -> &[AcmeManager] {
        &self.managers
    }
}

impl ManagementBackend for AcmeBackend {
    fn manage(
        &mut self,
        policy: &AutomationPolicy,
        names: &[String],
    ) -> Result<(), AutoHttpsError> {
        let issuer = match policy.issuer_or_default() {
            Issuer::Acme(acme) => acme,
            other => {
                return Err(AutoHttpsError::UnsupportedIssuer {
                    issuer: other.kind().to_string(),
                });
            }
        };

        if policy.on_demand {
            info!(
                "Policy for {:?} is on-demand; certificates are obtained during handshakes",
                names
            );
        }

        let manager = AcmeManager::start(names.to_vec(), &issuer, &self.cache_dir)?;
        self.resolver.register(&manager);
        self.managers.push(manager);

        Ok(())
    }
}
