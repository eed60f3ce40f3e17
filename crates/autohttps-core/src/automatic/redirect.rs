// Phase 1c: HTTP->HTTPS redirect routes

use std::collections::BTreeMap;

use log::{info, warn};

use crate::{
    address::ParsedAddress,
    config::{AutoHttpsConfig, DEFAULT_HTTPS_PORT, Server},
    error::AutoHttpsError,
    http::{Handler, Matcher, Route, StaticResponse},
};

use super::{Ports, REDIRECT_SERVER_NAME};

/// The `Location` template for a redirect to `port`, which is omitted when it is the HTTPS
/// port clients assume
fn redirect_location(port: Option<u16>) -> String {
    match port {
        Some(port) => format!("https://{{http.request.host}}:{port}{{http.request.uri}}"),
        None => "https://{http.request.host}{http.request.uri}".to_string(),
    }
}

fn redirect_handler(location: String) -> Handler {
    Handler::StaticResponse(StaticResponse::permanent_redirect(location))
}

/// Builds the route redirecting plain HTTP requests for `domains` to `destination`
pub fn redirect_route(domains: Vec<String>, destination: &ParsedAddress, ports: Ports) -> Route {
    let port = (destination.start_port != ports.https).then_some(destination.start_port);

    Route::new()
        .with_matcher_set(vec![Matcher::protocol("http"), Matcher::Host(domains)])
        .with_handler(redirect_handler(redirect_location(port)))
}

/// Builds the route redirecting every plain HTTP request, whatever its host. Names obtained
/// on demand are never listed in the config, so they rely on this route.
pub fn catch_all_redirect_route(ports: Ports) -> Route {
    let port = (ports.https != DEFAULT_HTTPS_PORT).then_some(ports.https);

    Route::new()
        .with_matcher_set(vec![Matcher::protocol("http")])
        .with_handler(redirect_handler(redirect_location(port)))
}

/// Groups redirect destinations by address and builds one route per destination, keyed by
/// the plain HTTP address the redirect is served from
pub fn routes_by_source_address(
    redirect_domains: BTreeMap<String, ParsedAddress>,
    ports: Ports,
) -> BTreeMap<String, Vec<Route>> {
    let mut domains_by_addr: BTreeMap<String, (ParsedAddress, Vec<String>)> = BTreeMap::new();
    for (domain, addr) in redirect_domains {
        domains_by_addr
            .entry(addr.to_string())
            .or_insert_with(|| (addr, Vec::new()))
            .1
            .push(domain);
    }

    let mut routes: BTreeMap<String, Vec<Route>> = BTreeMap::new();
    for (_, (addr, domains)) in domains_by_addr {
        let route = redirect_route(domains, &addr, ports);
        let source = addr.with_port(ports.http).to_string();
        routes.entry(source).or_default().push(route);
    }

    routes
}

/// Adds redirect routes to the servers already listening on the redirect addresses and
/// creates a dedicated server for the remaining addresses.
pub fn synthesize_redirects(
    servers: &mut BTreeMap<String, Server>,
    redirect_domains: BTreeMap<String, ParsedAddress>,
    ports: Ports,
) -> Result<(), AutoHttpsError> {
    if redirect_domains.is_empty() {
        return Ok(());
    }

    let mut claimed: BTreeMap<String, Vec<Route>> = BTreeMap::new();
    let mut remaining_addrs = Vec::new();
    let mut remaining_routes = Vec::new();

    for (source, routes) in routes_by_source_address(redirect_domains, ports) {
        let owner = servers
            .iter()
            .find(|(_, server)| server.has_listener_address(&source))
            .map(|(name, _)| name.clone());

        match owner {
            Some(name) => {
                warn!(
                    "User server '{}' is listening on the same interface as automatic HTTP->HTTPS redirects ({}); user-configured routes might override these redirects",
                    name, source
                );
                claimed.entry(name).or_default().extend(routes);
            }
            None => {
                remaining_addrs.push(source);
                remaining_routes.extend(routes);
            }
        }
    }

    for (name, mut routes) in claimed {
        if let Some(server) = servers.get_mut(&name) {
            warn!(
                "Appending a catch-all HTTP->HTTPS redirect to server '{name}'; requests it does not route itself will be redirected"
            );
            routes.push(catch_all_redirect_route(ports));
            server.routes.extend(routes);
        }
    }

    if remaining_addrs.is_empty() {
        return Ok(());
    }

    if servers.contains_key(REDIRECT_SERVER_NAME) {
        return Err(AutoHttpsError::ConfigError {
            field: format!("servers.{REDIRECT_SERVER_NAME}"),
            message: "This server name is reserved for automatic HTTPS redirects".to_string(),
        });
    }

    info!(
        "Creating server '{}' for HTTP->HTTPS redirects on {:?}",
        REDIRECT_SERVER_NAME, remaining_addrs
    );

    remaining_routes.push(catch_all_redirect_route(ports));
    let server = Server {
        listen: remaining_addrs,
        routes: remaining_routes,
        tls_connection_policies: None,
        automatic_https: Some(AutoHttpsConfig {
            disabled: true,
            ..Default::default()
        }),
    };
    servers.insert(REDIRECT_SERVER_NAME.to_string(), server);

    Ok(())
}
