// TLS automation: policies, loaded certificates and certificate management

pub mod acme;
pub mod cache;
pub mod certificate;
pub mod policy;
pub mod qualify;

use std::{
    collections::{BTreeSet, HashMap},
    path::PathBuf,
};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::AutoHttpsError;

pub use certificate::Certificate;
pub use policy::{
    AcmeIssuer, AutomationPolicy, ChallengeConfig, ChallengesConfig, CustomIssuer,
    InternalIssuer, Issuer,
};

use qualify::match_wildcard;

/// The TLS section of the configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TlsConfig {
    /// Certificates loaded from disk
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub certificates: Vec<Certificate>,

    /// Certificate automation settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub automation: Option<AutomationConfig>,

    /// Where managed certificates and ACME account data are cached
    #[serde(default = "TlsConfig::default_cache_directory")]
    pub cache_directory: PathBuf,
}

impl TlsConfig {
    pub fn default_cache_directory() -> PathBuf {
        PathBuf::from(".autohttps/certs")
    }
}

/// Automation policies in priority order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AutomationConfig {
    #[serde(default)]
    pub policies: Vec<AutomationPolicy>,
}

/// The certificate automation store consumed by automatic HTTPS.
pub trait AutomationStore {
    /// The registered automation policies, in priority order
    fn automation_policies(&self) -> &[AutomationPolicy];

    /// Registers a new automation policy
    fn add_automation_policy(&mut self, policy: AutomationPolicy) -> Result<(), AutoHttpsError>;

    /// Loaded certificates that cover `name`
    fn matching_certificates(&self, name: &str) -> Vec<&Certificate>;

    /// Validates the store as a whole
    fn validate(&self) -> Result<(), AutoHttpsError>;

    /// Begins certificate management (issuance and renewal) for `names`
    fn manage(&mut self, names: &[String]) -> Result<(), AutoHttpsError>;
}

/// Obtains and renews certificates for a group of names governed by one policy.
pub trait ManagementBackend: Send {
    fn manage(&mut self, policy: &AutomationPolicy, names: &[String])
        -> Result<(), AutoHttpsError>;
}

/// The default automation store backed by the configuration.
pub struct TlsApp {
    config: TlsConfig,
    backend: Option<Box<dyn ManagementBackend>>,
    managed: BTreeSet<String>,
}

impl std::fmt::Debug for TlsApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsApp")
            .field("config", &self.config)
            .field("has_backend", &self.backend.is_some())
            .field("managed", &self.managed)
            .finish()
    }
}

impl TlsApp {
    /// Creates the store from configuration, provisioning every configured policy
    pub fn new(mut config: TlsConfig) -> Result<Self, AutoHttpsError> {
        if let Some(automation) = config.automation.as_mut() {
            for policy in automation.policies.iter_mut() {
                policy.provision()?;
            }
        }

        Ok(Self {
            config,
            backend: None,
            managed: BTreeSet::new(),
        })
    }

    /// Sets the backend used by [`AutomationStore::manage`]
    pub fn with_backend(mut self, backend: Box<dyn ManagementBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Replaces the backend used by [`AutomationStore::manage`]
    pub fn set_backend(&mut self, backend: Box<dyn ManagementBackend>) {
        self.backend = Some(backend);
    }

    /// The TLS configuration including any policies added since creation
    pub fn config(&self) -> &TlsConfig {
        &self.config
    }

    /// Names currently under management
    pub fn managed_names(&self) -> impl Iterator<Item = &String> {
        self.managed.iter()
    }

    /// Returns the policy governing `name`: the first policy that lists it (exactly or by
    /// wildcard), then the first catch-all, then a default ACME policy
    pub fn policy_for(&self, name: &str) -> AutomationPolicy {
        let policies = self.automation_policies();

        policies
            .iter()
            .find(|policy| {
                policy
                    .subjects
                    .iter()
                    .any(|subject| match_wildcard(name, subject))
            })
            .or_else(|| policies.iter().find(|policy| policy.is_catch_all()))
            .cloned()
            .unwrap_or_default()
    }
}

impl AutomationStore for TlsApp {
    fn automation_policies(&self) -> &[AutomationPolicy] {
        self.config
            .automation
            .as_ref()
            .map(|automation| automation.policies.as_slice())
            .unwrap_or(&[])
    }

    fn add_automation_policy(
        &mut self,
        mut policy: AutomationPolicy,
    ) -> Result<(), AutoHttpsError> {
        policy.provision()?;

        let policies = &mut self
            .config
            .automation
            .get_or_insert_with(AutomationConfig::default)
            .policies;

        // insert before the first policy that is more general than this one, otherwise the
        // new policy would never be reached
        let position = policies.iter().position(|existing| {
            let existing_is_superset = policy.subjects.iter().any(|subject| {
                existing
                    .subjects
                    .iter()
                    .any(|other| match_wildcard(subject, other))
            });
            existing_is_superset || existing.subjects.len() < policy.subjects.len()
        });

        debug!(
            "Registering automation policy for subjects {:?} at position {:?}",
            policy.subjects, position
        );

        match position {
            Some(idx) => policies.insert(idx, policy),
            None => policies.push(policy),
        }

        Ok(())
    }

    fn matching_certificates(&self, name: &str) -> Vec<&Certificate> {
        self.config
            .certificates
            .iter()
            .filter(|cert| cert.covers(name))
            .collect()
    }

    fn validate(&self) -> Result<(), AutoHttpsError> {
        let policies = self.automation_policies();
        let mut seen: HashMap<&str, usize> = HashMap::new();

        // a catch-all shadows every policy after it
        let catch_all = policies.iter().position(AutomationPolicy::is_catch_all);
        if let Some(idx) = catch_all.filter(|idx| *idx != policies.len() - 1) {
            return Err(AutoHttpsError::PolicyConflict(format!(
                "automation policy {idx} has no subjects and must be the last policy"
            )));
        }

        for (idx, policy) in policies.iter().enumerate() {
            for subject in &policy.subjects {
                if let Some(first) = seen.insert(subject.as_str(), idx) {
                    return Err(AutoHttpsError::PolicyConflict(format!(
                        "hostname '{subject}' appears in automation policies {first} and {idx}, making certificate management ambiguous"
                    )));
                }
            }

            if let Some(issuer) = &policy.issuer {
                issuer.clone().provision()?;
            }
        }

        Ok(())
    }

    fn manage(&mut self, names: &[String]) -> Result<(), AutoHttpsError> {
        let pending: Vec<&String> = names
            .iter()
            .filter(|name| !self.managed.contains(name.as_str()))
            .collect();

        if pending.is_empty() {
            debug!("All names are already under management");
            return Ok(());
        }

        // group names by governing policy, preserving the order they were given in
        let mut groups: Vec<(AutomationPolicy, Vec<String>)> = Vec::new();
        for name in pending {
            let policy = self.policy_for(name);
            match groups.iter_mut().find(|(existing, _)| *existing == policy) {
                Some((_, group)) => group.push(name.clone()),
                None => groups.push((policy, vec![name.clone()])),
            }
        }

        let backend = self.backend.as_mut().ok_or_else(|| {
            AutoHttpsError::GenericError(
                "no certificate management backend configured".to_string(),
            )
        })?;

        for (policy, group) in &groups {
            info!(
                "Managing certificates for {:?} with the {} issuer",
                group,
                policy.issuer_or_default().kind()
            );
            backend.manage(policy, group)?;
        }

        self.managed
            .extend(groups.into_iter().flat_map(|(_, group)| group));

        Ok(())
    }
}
