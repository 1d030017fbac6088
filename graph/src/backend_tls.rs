//! BackendTlsPolicy processing.
//!
//! Policies are validated up front and reduced to a per-service selection
//! so that backend resolution is a plain map lookup. Invalid policies never
//! match a backend.

use crate::conditions::{self, Condition};
use crate::resource_id::{creation_timestamp, winner_precedence, ResourceId};
use ahash::{AHashMap, AHashSet};
use stategraph_k8s_api::{policy, ConfigMap, Service};

const CA_CERT_KEY: &str = "ca.crt";

#[derive(Clone, Debug)]
pub struct BackendTlsPolicy {
    pub source: policy::BackendTlsPolicy,
    pub conditions: Vec<Condition>,
    pub valid: bool,
}

/// All processed policies plus the winning policy per target service.
pub(crate) struct ProcessedBackendTls {
    pub policies: AHashMap<ResourceId, BackendTlsPolicy>,
    pub by_service: AHashMap<ResourceId, ResourceId>,
    /// Every ConfigMap a policy referenced, resolved or not.
    pub referenced_config_maps: AHashSet<ResourceId>,
}

pub(crate) fn process_backend_tls_policies(
    policies: &AHashMap<ResourceId, policy::BackendTlsPolicy>,
    config_maps: &AHashMap<ResourceId, ConfigMap>,
) -> ProcessedBackendTls {
    let mut processed = AHashMap::default();
    let mut referenced_config_maps = AHashSet::default();
    let mut by_service: AHashMap<ResourceId, ResourceId> = AHashMap::default();

    for (id, source) in policies {
        let (conditions, valid) =
            validate_policy(id, source, config_maps, &mut referenced_config_maps);

        if valid {
            for target in &source.spec.target_refs {
                if !target.targets_kind::<Service>() {
                    continue;
                }
                let service = ResourceId::new(id.namespace.clone(), target.name.clone());
                match by_service.get(&service) {
                    Some(current) if !beats(id, current, policies) => {}
                    _ => {
                        by_service.insert(service, id.clone());
                    }
                }
            }
        }

        processed.insert(
            id.clone(),
            BackendTlsPolicy {
                source: source.clone(),
                conditions,
                valid,
            },
        );
    }

    ProcessedBackendTls {
        policies: processed,
        by_service,
        referenced_config_maps,
    }
}

/// Whether `challenger` takes precedence over `current`: oldest creation
/// timestamp wins, ties break alphabetically by name.
fn beats(
    challenger: &ResourceId,
    current: &ResourceId,
    policies: &AHashMap<ResourceId, policy::BackendTlsPolicy>,
) -> bool {
    let ts = |id: &ResourceId| {
        policies
            .get(id)
            .and_then(|p| creation_timestamp(&p.metadata))
    };
    winner_precedence((&ts(challenger), challenger), (&ts(current), current))
        == std::cmp::Ordering::Less
}

fn validate_policy(
    id: &ResourceId,
    source: &policy::BackendTlsPolicy,
    config_maps: &AHashMap<ResourceId, ConfigMap>,
    referenced_config_maps: &mut AHashSet<ResourceId>,
) -> (Vec<Condition>, bool) {
    let validation = &source.spec.validation;

    if validation.hostname.is_empty() || validation.hostname.contains('*') {
        return invalid(format!(
            "validation.hostname must be a precise hostname, got {:?}",
            validation.hostname,
        ));
    }
    if let Err(e) = crate::hostname::validate(&validation.hostname) {
        return invalid(format!(
            "invalid validation.hostname {:?}: {e}",
            validation.hostname,
        ));
    }

    if !source
        .spec
        .target_refs
        .iter()
        .any(|t| t.targets_kind::<Service>())
    {
        return invalid("policy must target at least one Service".to_string());
    }

    let ca_cert_refs = validation
        .ca_cert_refs
        .as_deref()
        .unwrap_or_default();
    match (ca_cert_refs.is_empty(), validation.well_known_ca_certs) {
        (true, None) => {
            return invalid(
                "exactly one of caCertRefs and wellKnownCACerts must be set; got neither"
                    .to_string(),
            );
        }
        (false, Some(_)) => {
            return invalid(
                "exactly one of caCertRefs and wellKnownCACerts must be set; got both".to_string(),
            );
        }
        (true, Some(policy::WellKnownCaCerts::System)) => {}
        (false, None) => {
            for cert_ref in ca_cert_refs {
                if let Err(message) =
                    resolve_ca_cert_ref(id, cert_ref, config_maps, referenced_config_maps)
                {
                    return invalid(message);
                }
            }
        }
    }

    (vec![conditions::policy_accepted()], true)
}

fn invalid(message: String) -> (Vec<Condition>, bool) {
    (vec![conditions::policy_invalid(message)], false)
}

fn resolve_ca_cert_ref(
    policy_id: &ResourceId,
    cert_ref: &policy::CaCertRef,
    config_maps: &AHashMap<ResourceId, ConfigMap>,
    referenced_config_maps: &mut AHashSet<ResourceId>,
) -> Result<(), String> {
    if cert_ref.kind.as_deref().map_or(false, |k| k != "ConfigMap")
        || cert_ref
            .group
            .as_deref()
            .map_or(false, |g| !g.is_empty() && g != "core")
    {
        return Err(format!(
            "caCertRefs entry {:?} must reference a core ConfigMap",
            cert_ref.name,
        ));
    }

    let id = ResourceId::new(policy_id.namespace.clone(), cert_ref.name.clone());
    referenced_config_maps.insert(id.clone());

    let config_map = config_maps
        .get(&id)
        .ok_or_else(|| format!("ConfigMap {id} does not exist"))?;

    let has_cert = config_map
        .data
        .as_ref()
        .map_or(false, |data| data.contains_key(CA_CERT_KEY))
        || config_map
            .binary_data
            .as_ref()
            .map_or(false, |data| data.contains_key(CA_CERT_KEY));
    if !has_cert {
        return Err(format!("ConfigMap {id} is missing the {CA_CERT_KEY} entry"));
    }

    Ok(())
}
