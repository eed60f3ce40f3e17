//! Automatic HTTPS: discovers the names servers are configured for, registers certificate
//! automation policies for them and adds HTTP->HTTPS redirects.
//!
//! Provisioning runs in [`run_phase1`] before any listener is bound. Certificate management
//! is started separately by [`activate::activate`] once the listeners are up.

pub mod activate;
pub mod discovery;
pub mod policy;
pub mod redirect;

use std::collections::BTreeMap;

use crate::{
    config::{Config, Server},
    error::AutoHttpsError,
    placeholder::Replacer,
    tls::AutomationStore,
};

pub use activate::activate;
pub use discovery::{Discovery, discover};
pub use policy::{assign_policies, is_already_covered};
pub use redirect::synthesize_redirects;

/// The name of the server created to hold redirects no user server listens for
pub const REDIRECT_SERVER_NAME: &str = "remaining_auto_https_redirects";

/// The app-wide plain HTTP and HTTPS ports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ports {
    pub http: u16,
    pub https: u16,
}

impl Ports {
    pub fn new(http: u16, https: u16) -> Self {
        Self { http, https }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.http_port(), config.https_port())
    }
}

impl Default for Ports {
    fn default() -> Self {
        Self::new(
            crate::config::DEFAULT_HTTP_PORT,
            crate::config::DEFAULT_HTTPS_PORT,
        )
    }
}

/// Runs discovery, policy assignment and redirect synthesis, in that order.
///
/// Returns the names certificate management must be started for once the listeners are
/// bound.
pub fn run_phase1<S>(
    servers: &mut BTreeMap<String, Server>,
    ports: Ports,
    replacer: &Replacer,
    store: &mut S,
) -> Result<Vec<String>, AutoHttpsError>
where
    S: AutomationStore + ?Sized,
{
    let Discovery {
        cert_domains,
        redirect_domains,
    } = discover(servers, ports, replacer, &*store)?;

    let all_cert_domains = assign_policies(store, cert_domains, ports)?;
    synthesize_redirects(servers, redirect_domains, ports)?;

    Ok(all_cert_domains)
}
