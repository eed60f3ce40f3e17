// Phase 2: begin certificate management

use log::info;

use crate::{error::AutoHttpsError, tls::AutomationStore};

/// Hands every discovered name to the certificate manager.
///
/// Must only run once all listeners are bound: ACME challenge solvers may bind the HTTP and
/// HTTPS ports themselves, and their temporary listeners would win the race against the
/// server's own.
pub fn activate<S>(store: &mut S, domains: Vec<String>) -> Result<(), AutoHttpsError>
where
    S: AutomationStore + ?Sized,
{
    if domains.is_empty() {
        return Ok(());
    }

    info!("Enabling automatic TLS certificate management for {domains:?}");

    store
        .manage(&domains)
        .map_err(|e| AutoHttpsError::Activation {
            message: e.to_string(),
            domains,
        })
}
