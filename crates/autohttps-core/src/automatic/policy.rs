// Phase 1b: put every discovered name under exactly one automation policy

use std::collections::BTreeSet;

use log::{debug, info};

use crate::{
    config::{DEFAULT_HTTP_PORT, DEFAULT_HTTPS_PORT},
    error::AutoHttpsError,
    tls::{
        AcmeIssuer, AutomationPolicy, AutomationStore, InternalIssuer, Issuer,
        qualify::subject_qualifies_for_public_cert,
    },
};

use super::Ports;

/// Names without an explicit automation policy, split by who can issue for them
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Partition {
    /// Names a public CA can issue for
    pub external: Vec<String>,

    /// Names only an internal CA can issue for
    pub internal: Vec<String>,
}

/// Returns true if a policy already lists `domain` as a subject. Only exact matches count;
/// wildcard subjects are not expanded.
pub fn is_already_covered(domain: &str, policies: &[AutomationPolicy]) -> bool {
    policies
        .iter()
        .any(|policy| policy.subjects.iter().any(|subject| subject == domain))
}

/// Splits the names that have no explicit policy into public and internal ones
pub fn partition_domains(domains: &[String], policies: &[AutomationPolicy]) -> Partition {
    let mut partition = Partition::default();

    for domain in domains {
        if is_already_covered(domain, policies) {
            debug!("'{domain}' is covered by an explicit automation policy");
            continue;
        }

        if subject_qualifies_for_public_cert(domain) {
            partition.external.push(domain.clone());
        } else {
            partition.internal.push(domain.clone());
        }
    }

    partition
}

/// Returns a copy of the first catch-all policy, or an empty policy if there is none. The
/// copy is a template: changing it never affects the registered policy.
pub fn base_policy(policies: &[AutomationPolicy]) -> AutomationPolicy {
    policies
        .iter()
        .find(|policy| policy.is_catch_all())
        .cloned()
        .unwrap_or_default()
}

/// Builds the ACME issuer for implicit public names: the template's ACME issuer if it has
/// one, with challenge ports pointed at the app's non-default ports unless already set
pub fn implicit_acme_issuer(base: &AutomationPolicy, ports: Ports) -> AcmeIssuer {
    let mut issuer = base
        .issuer
        .as_ref()
        .and_then(Issuer::as_acme)
        .cloned()
        .unwrap_or_default();

    if ports.http != DEFAULT_HTTP_PORT {
        issuer.set_http_alternate_port(ports.http);
    }
    if ports.https != DEFAULT_HTTPS_PORT {
        issuer.set_tls_alpn_alternate_port(ports.https);
    }

    issuer
}

/// Orders the discovered names for certificate management and registers implicit policies
/// for the names no explicit policy covers. Returns the full list of names to manage.
pub fn assign_policies<S>(
    store: &mut S,
    cert_domains: BTreeSet<String>,
    ports: Ports,
) -> Result<Vec<String>, AutoHttpsError>
where
    S: AutomationStore + ?Sized,
{
    // names with an explicit policy are still managed, just not by an implicit policy
    let all_cert_domains: Vec<String> = cert_domains.into_iter().collect();

    let partition = partition_domains(&all_cert_domains, store.automation_policies());
    create_automation_policies(store, partition, ports)?;

    Ok(all_cert_domains)
}

/// Registers at most two policies: one with an ACME issuer for public names and one with an
/// internal issuer for the rest. Both inherit from the catch-all policy if there is one.
pub fn create_automation_policies<S>(
    store: &mut S,
    partition: Partition,
    ports: Ports,
) -> Result<(), AutoHttpsError>
where
    S: AutomationStore + ?Sized,
{
    if partition.external.is_empty() && partition.internal.is_empty() {
        return Ok(());
    }

    let base = base_policy(store.automation_policies());

    if !partition.external.is_empty() {
        let mut issuer = Issuer::Acme(implicit_acme_issuer(&base, ports));
        issuer.provision()?;

        info!(
            "Adding implicit ACME automation policy for {:?}",
            partition.external
        );
        store.add_automation_policy(base.derive(issuer, partition.external))?;
    }

    if !partition.internal.is_empty() {
        let mut issuer = Issuer::Internal(InternalIssuer::default());
        issuer.provision()?;

        info!(
            "Adding implicit internal automation policy for {:?}",
            partition.internal
        );
        store.add_automation_policy(base.derive(issuer, partition.internal))?;
    }

    store.validate()
}
