use std::{collections::BTreeMap, sync::Arc};

use log::{debug, info};
use tokio::{net::TcpListener, sync::Notify, task::JoinSet};
use tokio_rustls::TlsAcceptor;

use crate::{
    automatic::{self, Ports},
    config::{Config, LogLevel, Server},
    error::AutoHttpsError,
    placeholder::Replacer,
    serve::Listener,
    tls::{ManagementBackend, TlsApp},
};

/// Where the app is in its startup sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Configuration loaded, nothing provisioned yet
    Configured,

    /// Automatic HTTPS has rewritten the servers and registered automation policies
    Provisioned,

    /// Every listener is bound
    Listening,

    /// Certificate management has started
    Running,
}

/// The HTTP app: owns the servers and the certificate automation store and drives automatic
/// HTTPS through its two phases
#[derive(Debug)]
pub struct App {
    servers: BTreeMap<String, Server>,
    tls: TlsApp,
    ports: Ports,
    state: State,
    log_level: Option<LogLevel>,

    /// Names waiting for certificate management to start
    pending_domains: Vec<String>,
}

impl App {
    /// Validates the configuration and builds the app
    pub fn new(config: Config) -> Result<Self, AutoHttpsError> {
        config.validate()?;

        let ports = Ports::from_config(&config);
        let tls = TlsApp::new(config.tls)?;

        Ok(Self {
            servers: config.servers,
            tls,
            ports,
            state: State::Configured,
            log_level: config.log_level,
            pending_domains: Vec::new(),
        })
    }

    /// Sets the backend certificate management is handed to
    pub fn with_backend(mut self, backend: Box<dyn ManagementBackend>) -> Self {
        self.tls.set_backend(backend);
        self
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn ports(&self) -> Ports {
        self.ports
    }

    pub fn servers(&self) -> &BTreeMap<String, Server> {
        &self.servers
    }

    pub fn tls(&self) -> &TlsApp {
        &self.tls
    }

    /// The names certificate management will be started for
    pub fn pending_domains(&self) -> &[String] {
        &self.pending_domains
    }

    /// Reassembles the (possibly provisioned) configuration
    pub fn into_config(self) -> Config {
        Config {
            http_port: Some(self.ports.http),
            https_port: Some(self.ports.https),
            log_level: self.log_level,
            servers: self.servers,
            tls: self.tls.config().clone(),
        }
    }

    fn expect_state(&self, expected: State, operation: &str) -> Result<(), AutoHttpsError> {
        if self.state != expected {
            return Err(AutoHttpsError::Lifecycle(format!(
                "cannot {operation} while {:?}, expected {:?}",
                self.state, expected
            )));
        }
        Ok(())
    }

    /// Runs automatic HTTPS provisioning: discovery, policy assignment and redirects
    pub fn run_phase1(&mut self, replacer: &Replacer) -> Result<&[String], AutoHttpsError> {
        self.expect_state(State::Configured, "provision automatic HTTPS")?;

        self.pending_domains =
            automatic::run_phase1(&mut self.servers, self.ports, replacer, &mut self.tls)?;
        self.state = State::Provisioned;

        Ok(&self.pending_domains)
    }

    /// Records that every listener is bound, which allows certificate management to start
    pub fn confirm_listening(&mut self) -> Result<(), AutoHttpsError> {
        self.expect_state(State::Provisioned, "confirm listeners")?;
        self.state = State::Listening;
        Ok(())
    }

    /// Starts certificate management for every discovered name
    pub fn run_phase2(&mut self) -> Result<(), AutoHttpsError> {
        self.expect_state(State::Listening, "start certificate management")?;

        automatic::activate(&mut self.tls, self.pending_domains.clone())?;
        self.pending_domains.clear();
        self.state = State::Running;

        Ok(())
    }

    /// Provisions if needed, binds every TCP listener and then starts certificate management.
    ///
    /// Returns the bound listeners keyed by server name.
    pub async fn start(&mut self) -> Result<Vec<(String, TcpListener)>, AutoHttpsError> {
        if self.state == State::Configured {
            self.run_phase1(&Replacer::new())?;
        }
        self.expect_state(State::Provisioned, "start listeners")?;

        let mut listeners = Vec::new();
        for (name, server) in &self.servers {
            for address in server.listener_addresses(name)? {
                if !address.is_tcp_network() {
                    debug!(
                        "Skipping non-TCP listener '{}' on server '{}'",
                        address, name
                    );
                    continue;
                }

                for bind_address in address.expand() {
                    let bind_address = bindable(&bind_address, &address.network);
                    let listener = TcpListener::bind(&bind_address).await.map_err(|e| {
                        AutoHttpsError::FailedToBind {
                            address: bind_address.clone(),
                            source: e,
                        }
                    })?;

                    info!(
                        "Server '{}' listening on {}",
                        name,
                        listener.local_addr()?
                    );
                    listeners.push((name.clone(), listener));
                }
            }
        }

        self.confirm_listening()?;
        self.run_phase2()?;

        Ok(listeners)
    }

    /// Serves every server's routes on the listeners returned by [`App::start`] until
    /// `shutdown` is notified.
    ///
    /// Listeners of servers with TLS connection policies terminate TLS with `tls`, except on
    /// the HTTP port, which always serves plain HTTP.
    pub async fn serve(
        &self,
        listeners: Vec<(String, TcpListener)>,
        tls: Option<TlsAcceptor>,
        shutdown: Arc<Notify>,
    ) -> Result<(), AutoHttpsError> {
        self.expect_state(State::Running, "serve")?;

        let mut tasks = JoinSet::new();
        for (name, listener) in listeners {
            let server = self.servers.get(&name).ok_or_else(|| {
                AutoHttpsError::GenericError(format!("no server named '{name}'"))
            })?;

            let port = listener.local_addr()?.port();
            let acceptor = match (server.serves_tls() && port != self.ports.http, &tls) {
                (false, _) => None,
                (true, Some(acceptor)) => Some(acceptor.clone()),
                (true, None) => {
                    return Err(AutoHttpsError::ConfigError {
                        field: format!("servers.{name}.tls_connection_policies"),
                        message: "Server serves TLS but no TLS acceptor was provided".to_string(),
                    });
                }
            };

            let listener = Listener {
                server: name,
                listener,
                routes: server.routes.clone().into(),
                tls: acceptor,
            };
            tasks.spawn(listener.run(Arc::clone(&shutdown)));
        }

        while let Some(result) = tasks.join_next().await {
            result.map_err(|e| {
                AutoHttpsError::GenericError(format!("listener task failed: {e}"))
            })??;
        }

        Ok(())
    }
}

/// Fills in the wildcard interface for addresses that leave the host empty
fn bindable(address: &str, network: &str) -> String {
    if !address.starts_with(':') {
        return address.to_string();
    }

    match network {
        "tcp6" => format!("[::]{address}"),
        _ => format!("0.0.0.0{address}"),
    }
}
