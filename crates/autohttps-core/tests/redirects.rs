use std::collections::BTreeMap;

use autohttps::{
    address::{ParsedAddress, parse_network_address},
    automatic::{
        Ports, REDIRECT_SERVER_NAME, run_phase1,
        redirect::{catch_all_redirect_route, redirect_route, routes_by_source_address},
        synthesize_redirects,
    },
    config::{AutoHttpsConfig, Server},
    error::AutoHttpsError,
    http::{Handler, Matcher, Route, StaticResponse},
    placeholder::Replacer,
    tls::{AutomationStore, Issuer, TlsApp, TlsConfig},
};

fn host_route(hosts: &[&str]) -> Route {
    Route::new().with_matcher_set(vec![Matcher::host(hosts.iter().copied())])
}

fn servers(entries: Vec<(&str, Server)>) -> BTreeMap<String, Server> {
    entries
        .into_iter()
        .map(|(name, server)| (name.to_string(), server))
        .collect()
}

fn redirect_map(entries: &[(&str, &str)]) -> BTreeMap<String, ParsedAddress> {
    entries
        .iter()
        .map(|(domain, addr)| {
            (
                domain.to_string(),
                parse_network_address(addr).expect("Failed to parse address"),
            )
        })
        .collect()
}

fn static_response(route: &Route) -> &StaticResponse {
    match route.handlers.first() {
        Some(Handler::StaticResponse(response)) => response,
        other => panic!("Expected a static response handler, got {other:?}"),
    }
}

fn location(route: &Route) -> &str {
    static_response(route)
        .header("Location")
        .expect("Expected a Location header")
}

#[test]
fn https_only_server_end_to_end() {
    let mut servers = servers(vec![(
        "b",
        Server::new(["0.0.0.0:443"]).with_route(host_route(&["example.com"])),
    )]);
    let mut store = TlsApp::new(TlsConfig::default()).expect("Failed to create TLS app");

    let all = run_phase1(&mut servers, Ports::default(), &Replacer::new(), &mut store)
        .expect("Provisioning should succeed");

    assert_eq!(all, vec!["example.com"]);
    assert!(servers["b"].serves_tls());

    let policies = store.automation_policies();
    assert_eq!(policies.len(), 1);
    assert_eq!(policies[0].subjects, vec!["example.com"]);
    assert!(matches!(policies[0].issuer, Some(Issuer::Acme(_))));

    let redirect_server = &servers[REDIRECT_SERVER_NAME];
    assert_eq!(redirect_server.listen, vec!["tcp/0.0.0.0:80"]);
    assert_eq!(redirect_server.routes.len(), 2);

    let route = &redirect_server.routes[0];
    assert_eq!(
        route.matchers,
        vec![vec![
            Matcher::protocol("http"),
            Matcher::host(["example.com"])
        ]]
    );

    let response = static_response(route);
    assert_eq!(response.status_code, 308);
    assert!(response.close);
    assert_eq!(response.header("Connection"), Some("close"));
    assert_eq!(location(route), "https://{http.request.host}{http.request.uri}");

    let catch_all = &redirect_server.routes[1];
    assert_eq!(catch_all.matchers, vec![vec![Matcher::protocol("http")]]);
    assert_eq!(
        location(catch_all),
        "https://{http.request.host}{http.request.uri}"
    );
}

#[test]
fn http_only_server_end_to_end() {
    let mut servers = servers(vec![(
        "a",
        Server::new(["0.0.0.0:80"]).with_route(host_route(&["example.com"])),
    )]);
    let mut store = TlsApp::new(TlsConfig::default()).expect("Failed to create TLS app");

    let all = run_phase1(&mut servers, Ports::default(), &Replacer::new(), &mut store)
        .expect("Provisioning should succeed");

    assert!(all.is_empty());
    assert_eq!(servers.len(), 1);
    assert!(servers["a"].automatic_https.as_ref().is_some_and(|c| c.disabled));
    assert!(store.automation_policies().is_empty());
}

#[test]
fn disabled_redirects_create_no_server() {
    let mut servers = servers(vec![(
        "site",
        Server::new([":443"])
            .with_route(host_route(&["example.com"]))
            .with_automatic_https(AutoHttpsConfig {
                disable_redirects: true,
                ..Default::default()
            }),
    )]);
    let mut store = TlsApp::new(TlsConfig::default()).expect("Failed to create TLS app");

    let all = run_phase1(&mut servers, Ports::default(), &Replacer::new(), &mut store)
        .expect("Provisioning should succeed");

    assert_eq!(all, vec!["example.com"]);
    assert!(!servers.contains_key(REDIRECT_SERVER_NAME));
}

#[test]
fn non_https_destination_port_is_kept() {
    let route = redirect_route(
        vec!["example.com".to_string()],
        &parse_network_address(":8443").unwrap(),
        Ports::default(),
    );

    assert_eq!(
        location(&route),
        "https://{http.request.host}:8443{http.request.uri}"
    );
}

#[test]
fn catch_all_keeps_non_default_https_port() {
    let default = catch_all_redirect_route(Ports::default());
    assert_eq!(
        location(&default),
        "https://{http.request.host}{http.request.uri}"
    );

    let custom = catch_all_redirect_route(Ports::new(8080, 8443));
    assert_eq!(
        location(&custom),
        "https://{http.request.host}:8443{http.request.uri}"
    );

    // the destination is the app's HTTPS port, so no port is needed on the host route
    let route = redirect_route(
        vec!["example.com".to_string()],
        &parse_network_address(":8443").unwrap(),
        Ports::new(8080, 8443),
    );
    assert_eq!(location(&route), "https://{http.request.host}{http.request.uri}");
}

#[test]
fn domains_are_grouped_by_destination() {
    let routes = routes_by_source_address(
        redirect_map(&[
            ("b.example.com", ":443"),
            ("a.example.com", ":443"),
            ("local.example.com", "127.0.0.1:443"),
        ]),
        Ports::default(),
    );

    assert_eq!(
        routes.keys().collect::<Vec<_>>(),
        vec!["tcp/127.0.0.1:80", "tcp/:80"]
    );

    let wildcard = &routes["tcp/:80"];
    assert_eq!(wildcard.len(), 1);
    assert_eq!(
        wildcard[0].matchers[0][1],
        Matcher::host(["a.example.com", "b.example.com"])
    );
}

#[test]
fn port_ranges_collapse_to_http_port() {
    let routes = routes_by_source_address(
        redirect_map(&[("example.com", "localhost:8443-8445")]),
        Ports::new(8080, 443),
    );

    assert!(routes.contains_key("tcp/localhost:8080"));
    assert_eq!(
        location(&routes["tcp/localhost:8080"][0]),
        "https://{http.request.host}:8443{http.request.uri}"
    );
}

#[test]
fn existing_server_claims_its_redirects() {
    let mut servers = servers(vec![
        ("web", Server::new([":80"]).with_route(host_route(&["static.example.com"]))),
        (
            "site",
            Server::new([":443"]).with_route(host_route(&["example.com"])),
        ),
    ]);
    let mut store = TlsApp::new(TlsConfig::default()).expect("Failed to create TLS app");

    run_phase1(&mut servers, Ports::default(), &Replacer::new(), &mut store)
        .expect("Provisioning should succeed");

    assert!(!servers.contains_key(REDIRECT_SERVER_NAME));

    let web = &servers["web"];
    assert_eq!(web.routes.len(), 3);
    assert_eq!(web.routes[0], host_route(&["static.example.com"]));
    assert_eq!(
        web.routes[1].matchers,
        vec![vec![
            Matcher::protocol("http"),
            Matcher::host(["example.com"])
        ]]
    );
    assert_eq!(web.routes[2], catch_all_redirect_route(Ports::default()));
}

#[test]
fn claimed_and_remaining_addresses_are_split() {
    let mut servers = servers(vec![(
        "web",
        Server::new(["127.0.0.1:80"]),
    )]);

    synthesize_redirects(
        &mut servers,
        redirect_map(&[("a.example.com", "127.0.0.1:443"), ("b.example.com", ":443")]),
        Ports::default(),
    )
    .expect("Redirect synthesis should succeed");

    assert_eq!(servers["web"].routes.len(), 2);

    let remaining = &servers[REDIRECT_SERVER_NAME];
    assert_eq!(remaining.listen, vec!["tcp/:80"]);
    assert_eq!(remaining.routes.len(), 2);
    assert!(
        remaining
            .automatic_https
            .as_ref()
            .is_some_and(|c| c.disabled)
    );
}

#[test]
fn one_catch_all_per_claiming_server() {
    let mut servers = servers(vec![(
        "web",
        Server::new(["127.0.0.1:80", "10.0.0.1:80"]),
    )]);

    synthesize_redirects(
        &mut servers,
        redirect_map(&[
            ("a.example.com", "127.0.0.1:443"),
            ("b.example.com", "10.0.0.1:443"),
        ]),
        Ports::default(),
    )
    .expect("Redirect synthesis should succeed");

    let routes = &servers["web"].routes;
    assert_eq!(routes.len(), 3);
    assert_eq!(routes[2], catch_all_redirect_route(Ports::default()));
}

#[test]
fn empty_redirect_map_is_a_no_op() {
    let mut servers = servers(vec![("web", Server::new([":80"]))]);
    let before = servers.clone();

    synthesize_redirects(&mut servers, BTreeMap::new(), Ports::default())
        .expect("Redirect synthesis should succeed");

    assert_eq!(servers, before);
}

#[test]
fn reserved_server_name_is_not_overwritten() {
    let mut servers = servers(vec![(REDIRECT_SERVER_NAME, Server::new([":8080"]))]);

    let result = synthesize_redirects(
        &mut servers,
        redirect_map(&[("example.com", ":443")]),
        Ports::default(),
    );

    assert!(matches!(result, Err(AutoHttpsError::ConfigError { .. })));
}
