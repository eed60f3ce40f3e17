// Phase 1a: find the names each server needs certificates and redirects for

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, info, warn};

use crate::{
    address::ParsedAddress,
    config::{AutoHttpsConfig, Server},
    error::AutoHttpsError,
    placeholder::Replacer,
    tls::{
        AutomationStore,
        qualify::{is_second_level_wildcard, subject_qualifies_for_cert},
    },
};

use super::Ports;

/// The result of domain discovery across all servers
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Discovery {
    /// Every name a certificate should be managed for
    pub cert_domains: BTreeSet<String>,

    /// Every name that gets an HTTP->HTTPS redirect, with the address it redirects to
    pub redirect_domains: BTreeMap<String, ParsedAddress>,
}

/// Walks every server's routes and collects the names that qualify for automatic HTTPS.
///
/// Servers are updated in place: auto HTTPS settings are defaulted, servers listening only
/// on the HTTP port get auto HTTPS disabled, and servers with qualifying names get a TLS
/// connection policy.
pub fn discover<S>(
    servers: &mut BTreeMap<String, Server>,
    ports: Ports,
    replacer: &Replacer,
    store: &S,
) -> Result<Discovery, AutoHttpsError>
where
    S: AutomationStore + ?Sized,
{
    let mut discovery = Discovery::default();

    for (name, server) in servers.iter_mut() {
        // matchers must be usable before their hosts are read
        for route in &server.routes {
            route
                .provision_matchers()
                .map_err(|message| AutoHttpsError::MatcherProvisioning {
                    server: name.clone(),
                    message,
                })?;
        }

        if server.automatic_https_mut().disabled {
            debug!("Automatic HTTPS is disabled for server '{name}'");
            continue;
        }

        if !server.listeners_use_any_port_other_than(ports.http) {
            info!(
                "Server '{}' is listening only on the HTTP port {}, so no automatic HTTPS will be applied to this server",
                name, ports.http
            );
            server.automatic_https_mut().disabled = true;
            continue;
        }

        // listening only on the HTTPS port is enough to say TLS is wanted
        if server.tls_connection_policies.is_none()
            && !server.listeners_use_any_port_other_than(ports.https)
        {
            info!(
                "Server '{}' is listening only on the HTTPS port {} but has no TLS connection policies; adding one to enable TLS",
                name, ports.https
            );
            server.ensure_tls_connection_policy();
        }

        let config = server.automatic_https_or_default();
        let server_domains = collect_server_domains(name, server, &config, replacer)?;

        if server_domains.is_empty() {
            debug!("No qualifying domains found for server '{name}'");
            continue;
        }

        for domain in &server_domains {
            if !subject_qualifies_for_cert(domain) || config.skips_certs(domain) {
                continue;
            }

            if !config.ignore_loaded_certs && !store.matching_certificates(domain).is_empty() {
                info!(
                    "Skipping automatic certificate management for '{}' on server '{}' because one or more matching certificates are already loaded",
                    domain, name
                );
                continue;
            }

            if is_second_level_wildcard(domain) {
                warn!(
                    "Most clients do not trust second-level wildcard certificates (*.tld): '{domain}'"
                );
            }

            discovery.cert_domains.insert(domain.clone());
        }

        server.ensure_tls_connection_policy();

        if config.disable_redirects {
            debug!("Automatic HTTP->HTTPS redirects are disabled for server '{name}'");
            continue;
        }

        info!("Enabling automatic HTTP->HTTPS redirects for server '{name}'");

        for address in server.listener_addresses(name)? {
            for domain in &server_domains {
                associate_redirect(
                    &mut discovery.redirect_domains,
                    domain,
                    &address,
                    ports,
                );
            }
        }
    }

    Ok(discovery)
}

/// Collects the deduplicated host names of a server's host matchers, with placeholders
/// replaced and skipped names removed
fn collect_server_domains(
    name: &str,
    server: &Server,
    config: &AutoHttpsConfig,
    replacer: &Replacer,
) -> Result<BTreeSet<String>, AutoHttpsError> {
    let mut domains = BTreeSet::new();

    for (route_idx, route) in server.routes.iter().enumerate() {
        for (set_idx, matcher_idx, host_idx, pattern) in route.host_patterns() {
            let domain = replacer.replace_or_err(pattern, true, false).map_err(|e| {
                AutoHttpsError::Placeholder {
                    server: name.to_string(),
                    route: route_idx,
                    matcher_set: set_idx,
                    matcher: matcher_idx,
                    host: host_idx,
                    message: e.to_string(),
                }
            })?;

            if !config.skips(&domain) {
                domains.insert(domain);
            }
        }
    }

    Ok(domains)
}

/// Records `address` as the redirect destination of `domain` if it beats the current one.
pub fn associate_redirect(
    redirects: &mut BTreeMap<String, ParsedAddress>,
    domain: &str,
    address: &ParsedAddress,
    ports: Ports,
) {
    match redirects.get(domain) {
        Some(existing) if !prefer_destination(existing, address, ports) => {}
        _ => {
            redirects.insert(domain.to_string(), address.clone());
        }
    }
}

/// Whether `candidate` should replace `existing` as a redirect destination. An address
/// covering the HTTP port always loses and one on the HTTPS port always wins; among the
/// rest the lower port wins, then the lower canonical form.
pub fn prefer_destination(
    existing: &ParsedAddress,
    candidate: &ParsedAddress,
    ports: Ports,
) -> bool {
    let rank = |addr: &ParsedAddress| {
        (
            addr.covers_port(ports.http),
            addr.start_port != ports.https,
            addr.start_port,
            addr.to_string(),
        )
    };
    rank(candidate) < rank(existing)
}
