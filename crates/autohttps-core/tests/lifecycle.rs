use std::sync::{Arc, Mutex};

use autohttps::{
    App,
    app::State,
    automatic::{REDIRECT_SERVER_NAME, activate},
    config::{AutoHttpsConfig, Config, Server},
    error::AutoHttpsError,
    http::{Matcher, Route},
    placeholder::Replacer,
    tls::{AutomationPolicy, ManagementBackend, TlsApp, TlsConfig},
};

/// Records every group of names it is asked to manage
#[derive(Clone, Default)]
struct RecordingBackend {
    calls: Arc<Mutex<Vec<Vec<String>>>>,
    fail_with: Option<String>,
}

impl RecordingBackend {
    fn failing(message: &str) -> Self {
        Self {
            fail_with: Some(message.to_string()),
            ..Default::default()
        }
    }

    fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }
}

impl ManagementBackend for RecordingBackend {
    fn manage(
        &mut self,
        _policy: &AutomationPolicy,
        names: &[String],
    ) -> Result<(), AutoHttpsError> {
        if let Some(message) = &self.fail_with {
            return Err(AutoHttpsError::GenericError(message.clone()));
        }
        self.calls.lock().unwrap().push(names.to_vec());
        Ok(())
    }
}

fn site_config(listen: &str, hosts: &[&str]) -> Config {
    let mut config = Config::default();
    config
        .add_server(
            "site",
            Server::new([listen]).with_route(
                Route::new().with_matcher_set(vec![Matcher::host(hosts.iter().copied())]),
            ),
        )
        .expect("Failed to add server");
    config
}

#[test]
fn phases_run_in_order() {
    let backend = RecordingBackend::default();
    let mut app = App::new(site_config(":443", &["example.com"]))
        .expect("Failed to create app")
        .with_backend(Box::new(backend.clone()));

    assert_eq!(app.state(), State::Configured);

    let domains = app.run_phase1(&Replacer::new()).expect("Phase 1 should succeed");
    assert_eq!(domains, ["example.com"]);
    assert_eq!(app.state(), State::Provisioned);

    // nothing is managed before the listeners are up
    assert!(backend.calls().is_empty());

    app.confirm_listening().expect("Confirming listeners should succeed");
    app.run_phase2().expect("Phase 2 should succeed");

    assert_eq!(app.state(), State::Running);
    assert_eq!(backend.calls(), vec![vec!["example.com".to_string()]]);
    assert!(app.pending_domains().is_empty());
}

#[test]
fn phase_two_requires_listeners() {
    let mut app = App::new(site_config(":443", &["example.com"])).expect("Failed to create app");
    app.run_phase1(&Replacer::new()).expect("Phase 1 should succeed");

    let result = app.run_phase2();
    assert!(matches!(result, Err(AutoHttpsError::Lifecycle(_))));
    assert_eq!(app.state(), State::Provisioned);
}

#[test]
fn phase_one_runs_once() {
    let mut app = App::new(site_config(":443", &["example.com"])).expect("Failed to create app");
    app.run_phase1(&Replacer::new()).expect("Phase 1 should succeed");

    let result = app.run_phase1(&Replacer::new());
    assert!(matches!(result, Err(AutoHttpsError::Lifecycle(_))));
}

#[test]
fn listeners_cannot_be_confirmed_before_provisioning() {
    let mut app = App::new(site_config(":443", &["example.com"])).expect("Failed to create app");

    assert!(matches!(
        app.confirm_listening(),
        Err(AutoHttpsError::Lifecycle(_))
    ));
}

#[test]
fn activation_failure_carries_domains() {
    let mut app = App::new(site_config(":443", &["example.com", "www.example.com"]))
        .expect("Failed to create app")
        .with_backend(Box::new(RecordingBackend::failing("rate limited")));

    app.run_phase1(&Replacer::new()).expect("Phase 1 should succeed");
    app.confirm_listening().expect("Confirming listeners should succeed");

    let error = app.run_phase2().expect_err("Phase 2 should fail");
    match &error {
        AutoHttpsError::Activation { domains, message } => {
            assert_eq!(domains, &["example.com", "www.example.com"]);
            assert!(message.contains("rate limited"));
        }
        other => panic!("Expected activation error, got {other:?}"),
    }
    assert!(
        error
            .to_string()
            .starts_with("managing certificates for [\"example.com\", \"www.example.com\"]")
    );
}

#[test]
fn failed_activation_can_be_retried() {
    let mut app = App::new(site_config(":443", &["example.com"]))
        .expect("Failed to create app")
        .with_backend(Box::new(RecordingBackend::failing("rate limited")));

    app.run_phase1(&Replacer::new()).expect("Phase 1 should succeed");
    app.confirm_listening().expect("Confirming listeners should succeed");

    assert!(app.run_phase2().is_err());
    assert_eq!(app.state(), State::Listening);
    assert_eq!(app.pending_domains(), ["example.com"]);

    // the names are still pending, so a second attempt reaches the backend again
    match app.run_phase2() {
        Err(AutoHttpsError::Activation { domains, .. }) => assert_eq!(domains, ["example.com"]),
        other => panic!("Expected activation error, got {other:?}"),
    }
}

#[test]
fn activation_without_backend_fails() {
    let mut app = App::new(site_config(":443", &["example.com"])).expect("Failed to create app");
    app.run_phase1(&Replacer::new()).expect("Phase 1 should succeed");
    app.confirm_listening().expect("Confirming listeners should succeed");

    assert!(matches!(
        app.run_phase2(),
        Err(AutoHttpsError::Activation { .. })
    ));
}

#[test]
fn activation_with_no_domains_is_a_no_op() {
    let mut store = TlsApp::new(TlsConfig::default()).expect("Failed to create TLS app");

    // no backend is configured, so any call to manage would fail
    activate(&mut store, Vec::new()).expect("Empty activation should succeed");
    assert_eq!(store.managed_names().count(), 0);
}

#[test]
fn reserved_server_name_is_rejected() {
    let mut config = Config::default();
    config
        .add_server(REDIRECT_SERVER_NAME, Server::new([":8080"]))
        .expect("Failed to add server");

    assert!(matches!(
        App::new(config),
        Err(AutoHttpsError::ConfigError { .. })
    ));
}

#[test]
fn provisioned_config_includes_redirect_server() {
    let mut app = App::new(site_config(":443", &["example.com"])).expect("Failed to create app");
    app.run_phase1(&Replacer::new()).expect("Phase 1 should succeed");

    let config = app.into_config();
    assert!(config.get_server(REDIRECT_SERVER_NAME).is_some());
    assert_eq!(config.https_port(), 443);

    let policies = &config.tls.automation.expect("Expected automation policies").policies;
    assert_eq!(policies[0].subjects, vec!["example.com"]);
}

#[tokio::test]
async fn start_binds_then_activates() {
    let backend = RecordingBackend::default();

    let mut config = site_config("127.0.0.1:0", &["example.com"]);
    if let Some(server) = config.servers.get_mut("site") {
        server.automatic_https = Some(AutoHttpsConfig {
            disable_redirects: true,
            ..Default::default()
        });
    }

    let mut app = App::new(config)
        .expect("Failed to create app")
        .with_backend(Box::new(backend.clone()));

    let listeners = app.start().await.expect("Startup should succeed");

    assert_eq!(listeners.len(), 1);
    assert_eq!(listeners[0].0, "site");
    assert!(listeners[0].1.local_addr().unwrap().port() > 0);

    assert_eq!(app.state(), State::Running);
    assert_eq!(backend.calls(), vec![vec!["example.com".to_string()]]);
}

#[tokio::test]
async fn start_skips_non_tcp_listeners() {
    let mut config = Config::default();
    config
        .add_server(
            "mixed",
            Server::new(["127.0.0.1:0", "udp/127.0.0.1:0"]),
        )
        .expect("Failed to add server");

    let mut app = App::new(config).expect("Failed to create app");
    let listeners = app.start().await.expect("Startup should succeed");

    assert_eq!(listeners.len(), 1);
    assert_eq!(app.state(), State::Running);
}
