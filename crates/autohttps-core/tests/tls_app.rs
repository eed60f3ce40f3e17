use std::sync::{Arc, Mutex};

use autohttps::{
    error::AutoHttpsError,
    tls::{
        AcmeIssuer, AutomationConfig, AutomationPolicy, AutomationStore, Certificate,
        InternalIssuer, Issuer, ManagementBackend, TlsApp, TlsConfig,
    },
};

type Calls = Arc<Mutex<Vec<(&'static str, Vec<String>)>>>;

#[derive(Clone, Default)]
struct RecordingBackend {
    calls: Calls,
}

impl ManagementBackend for RecordingBackend {
    fn manage(
        &mut self,
        policy: &AutomationPolicy,
        names: &[String],
    ) -> Result<(), AutoHttpsError> {
        let kind = policy.issuer_or_default().kind();
        self.calls.lock().unwrap().push((kind, names.to_vec()));
        Ok(())
    }
}

fn subjects(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

fn internal_policy(names: &[&str]) -> AutomationPolicy {
    AutomationPolicy::new(subjects(names), Issuer::Internal(InternalIssuer::default()))
}

fn store_with(policies: Vec<AutomationPolicy>) -> TlsApp {
    TlsApp::new(TlsConfig {
        automation: Some(AutomationConfig { policies }),
        ..Default::default()
    })
    .expect("Failed to create TLS app")
}

fn policy_subjects(store: &TlsApp) -> Vec<Vec<String>> {
    store
        .automation_policies()
        .iter()
        .map(|policy| policy.subjects.clone())
        .collect()
}

#[test]
fn added_policies_go_before_catch_all() {
    let mut store = store_with(vec![AutomationPolicy::default()]);

    store
        .add_automation_policy(internal_policy(&["a.example.com"]))
        .unwrap();
    store
        .add_automation_policy(internal_policy(&["b.example.com", "c.example.com"]))
        .unwrap();

    assert_eq!(
        policy_subjects(&store),
        vec![
            subjects(&["b.example.com", "c.example.com"]),
            subjects(&["a.example.com"]),
            vec![],
        ]
    );
}

#[test]
fn added_policies_go_before_wildcards_covering_them() {
    let mut store = store_with(vec![internal_policy(&["*.example.com"])]);

    store
        .add_automation_policy(internal_policy(&["www.example.com"]))
        .unwrap();

    assert_eq!(
        policy_subjects(&store),
        vec![subjects(&["www.example.com"]), subjects(&["*.example.com"])]
    );
}

#[test]
fn added_policies_are_provisioned() {
    let mut store = store_with(vec![]);

    store
        .add_automation_policy(AutomationPolicy::new(
            subjects(&["example.com"]),
            Issuer::Acme(AcmeIssuer::default()),
        ))
        .unwrap();

    let acme = store.automation_policies()[0]
        .issuer
        .as_ref()
        .and_then(Issuer::as_acme)
        .unwrap();
    assert_eq!(acme.directory_url(), acme.ca.as_deref().unwrap());
}

#[test]
fn invalid_issuers_are_rejected() {
    let mut store = store_with(vec![]);

    let bad_email = AutomationPolicy::new(
        subjects(&["example.com"]),
        Issuer::Acme(AcmeIssuer {
            email: Some("not-an-email".to_string()),
            ..Default::default()
        }),
    );
    assert!(matches!(
        store.add_automation_policy(bad_email),
        Err(AutoHttpsError::InvalidIssuer(_))
    ));

    let bad_url = AutomationPolicy::new(
        subjects(&["example.com"]),
        Issuer::Acme(AcmeIssuer {
            ca: Some("not a url".to_string()),
            ..Default::default()
        }),
    );
    assert!(matches!(
        store.add_automation_policy(bad_url),
        Err(AutoHttpsError::InvalidIssuer(_))
    ));

    assert!(store.automation_policies().is_empty());
}

#[test]
fn renewal_window_must_be_a_fraction() {
    let policy = AutomationPolicy {
        renewal_window_ratio: Some(1.5),
        ..Default::default()
    };

    let result = TlsApp::new(TlsConfig {
        automation: Some(AutomationConfig {
            policies: vec![policy],
        }),
        ..Default::default()
    });

    assert!(matches!(result, Err(AutoHttpsError::ConfigError { .. })));
}

#[test]
fn validate_rejects_shared_subjects() {
    let store = store_with(vec![
        internal_policy(&["example.com"]),
        internal_policy(&["www.example.com", "example.com"]),
    ]);

    assert!(matches!(
        store.validate(),
        Err(AutoHttpsError::PolicyConflict(_))
    ));
}

#[test]
fn validate_rejects_two_catch_alls() {
    let store = store_with(vec![AutomationPolicy::default(), AutomationPolicy::default()]);

    assert!(matches!(
        store.validate(),
        Err(AutoHttpsError::PolicyConflict(_))
    ));
}

#[test]
fn validate_accepts_ordered_policies() {
    let store = store_with(vec![
        internal_policy(&["a.example.com"]),
        internal_policy(&["b.example.com"]),
        AutomationPolicy::default(),
    ]);

    store.validate().expect("Policies should be valid");
}

#[test]
fn loaded_certificates_match_exact_and_wildcard() {
    let store = TlsApp::new(TlsConfig {
        certificates: vec![
            Certificate::new("a.pem", "a.key").with_subjects(["example.com"]),
            Certificate::new("b.pem", "b.key").with_subjects(["*.example.com"]),
        ],
        ..Default::default()
    })
    .unwrap();

    assert_eq!(store.matching_certificates("example.com").len(), 1);
    assert_eq!(store.matching_certificates("WWW.example.com").len(), 1);
    assert!(store.matching_certificates("a.b.example.com").is_empty());
    assert!(store.matching_certificates("example.org").is_empty());
}

#[test]
fn policy_lookup_falls_back_to_catch_all() {
    let catch_all = AutomationPolicy {
        issuer: Some(Issuer::Internal(InternalIssuer::default())),
        ..Default::default()
    };
    let store = store_with(vec![internal_policy(&["*.example.com"]), catch_all]);

    assert_eq!(store.policy_for("www.example.com").subjects, subjects(&["*.example.com"]));
    assert!(store.policy_for("example.org").is_catch_all());

    let empty = store_with(vec![]);
    assert_eq!(empty.policy_for("example.org"), AutomationPolicy::default());
}

#[test]
fn manage_groups_names_by_policy() {
    let backend = RecordingBackend::default();
    let mut store = store_with(vec![internal_policy(&["localhost"])])
        .with_backend(Box::new(backend.clone()));

    store
        .manage(&subjects(&["example.com", "localhost", "www.example.com"]))
        .expect("Management should start");

    let calls = backend.calls.lock().unwrap().clone();
    assert_eq!(
        calls,
        vec![
            ("acme", subjects(&["example.com", "www.example.com"])),
            ("internal", subjects(&["localhost"])),
        ]
    );

    let managed: Vec<&String> = store.managed_names().collect();
    assert_eq!(managed, vec!["example.com", "localhost", "www.example.com"]);
}

#[test]
fn manage_skips_names_already_managed() {
    let backend = RecordingBackend::default();
    let mut store = store_with(vec![]).with_backend(Box::new(backend.clone()));

    store.manage(&subjects(&["example.com"])).unwrap();
    store.manage(&subjects(&["example.com"])).unwrap();
    store
        .manage(&subjects(&["example.com", "example.org"]))
        .unwrap();

    let calls = backend.calls.lock().unwrap().clone();
    assert_eq!(
        calls,
        vec![
            ("acme", subjects(&["example.com"])),
            ("acme", subjects(&["example.org"])),
        ]
    );
}

#[test]
fn manage_requires_a_backend() {
    let mut store = store_with(vec![]);

    assert!(matches!(
        store.manage(&subjects(&["example.com"])),
        Err(AutoHttpsError::GenericError(_))
    ));
    assert_eq!(store.managed_names().count(), 0);
}
