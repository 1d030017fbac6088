//! GatewayClass resolution.
//!
//! Exactly one class is processed per build: the configured name, provided
//! its controller name matches ours. Classes referencing our controller
//! under another name are tracked as ignored so that policies targeting
//! their gateways can be answered with a meaningful condition.

use crate::conditions::{self, Condition};
use crate::resource_id::ResourceId;
use ahash::{AHashMap, AHashSet};
use stategraph_k8s_api::{gateway, policy};

/// The newest Gateway API release this controller fully supports.
const SUPPORTED_BUNDLE_VERSION: &str = "1.1";

const BUNDLE_VERSION_ANNOTATION: &str = "gateway.networking.k8s.io/bundle-version";

/// The processed GatewayClass, valid or not.
#[derive(Clone, Debug)]
pub struct GatewayClass {
    pub name: String,
    pub source: gateway::GatewayClass,
    pub proxy_config: Option<policy::ProxyConfig>,
    pub conditions: Vec<Condition>,
    pub valid: bool,
}

pub(crate) struct ProcessedClasses {
    pub winner: Option<GatewayClass>,
    /// Names of classes owned by this controller under another name.
    pub ignored: AHashSet<String>,
}

pub(crate) fn process_gateway_classes(
    classes: &AHashMap<String, gateway::GatewayClass>,
    crd_bundle_versions: &AHashMap<String, Option<String>>,
    proxy_configs: &AHashMap<ResourceId, policy::ProxyConfig>,
    class_name: &str,
    controller_name: &str,
) -> ProcessedClasses {
    let mut winner = None;
    let mut ignored = AHashSet::default();

    for (name, class) in classes {
        if class.spec.controller_name != controller_name {
            continue;
        }
        if name == class_name {
            winner = Some(build_gateway_class(
                name.clone(),
                class.clone(),
                crd_bundle_versions,
                proxy_configs,
            ));
        } else {
            ignored.insert(name.clone());
        }
    }

    ProcessedClasses { winner, ignored }
}

fn build_gateway_class(
    name: String,
    source: gateway::GatewayClass,
    crd_bundle_versions: &AHashMap<String, Option<String>>,
    proxy_configs: &AHashMap<ResourceId, policy::ProxyConfig>,
) -> GatewayClass {
    let mut conditions = vec![conditions::class_accepted()];
    let mut valid = true;

    conditions.push(match check_crd_versions(crd_bundle_versions) {
        CrdVersions::Supported => conditions::class_supported_version(SUPPORTED_BUNDLE_VERSION),
        CrdVersions::BestEffort(message) => conditions::class_version_best_effort(message),
        CrdVersions::Unsupported(message) => {
            valid = false;
            conditions::class_unsupported_version(message)
        }
    });

    let mut proxy_config = None;
    // `paramters_ref` spelling comes from the upstream crate.
    if let Some(params) = &source.spec.paramters_ref {
        match resolve_parameters_ref(params, proxy_configs) {
            Ok(config) => {
                conditions.push(conditions::class_resolved_refs());
                proxy_config = Some(config);
            }
            Err(message) => {
                tracing::debug!(class = %name, %message, "parametersRef did not resolve");
                conditions.push(conditions::class_invalid_parameters(message));
            }
        }
    }

    GatewayClass {
        name,
        source,
        proxy_config,
        conditions,
        valid,
    }
}

enum CrdVersions {
    Supported,
    BestEffort(String),
    Unsupported(String),
}

/// Compares each Gateway API CRD's bundle-version annotation against the
/// supported release. A missing annotation or a newer minor release only
/// degrades support to best-effort; a different major release (or an
/// unparsable version) invalidates the class.
fn check_crd_versions(crd_bundle_versions: &AHashMap<String, Option<String>>) -> CrdVersions {
    let (supported_major, supported_minor) = match split_version(SUPPORTED_BUNDLE_VERSION) {
        Some(v) => v,
        None => return CrdVersions::Supported,
    };

    let mut crds: Vec<_> = crd_bundle_versions.iter().collect();
    crds.sort_by_key(|(name, _)| name.as_str());

    let mut best_effort = Vec::new();
    for (crd, version) in crds {
        let version = match version {
            Some(v) => v,
            None => {
                best_effort.push(format!(
                    "CRD {crd} is missing the {BUNDLE_VERSION_ANNOTATION} annotation; \
                     unable to determine its version"
                ));
                continue;
            }
        };
        match split_version(version) {
            Some((major, _)) if major != supported_major => {
                return CrdVersions::Unsupported(format!(
                    "CRD {crd} has unsupported version {version}; \
                     supported version is {SUPPORTED_BUNDLE_VERSION}"
                ));
            }
            Some((_, minor)) if minor != supported_minor => {
                best_effort.push(format!(
                    "CRD {crd} has version {version}; \
                     full support is limited to {SUPPORTED_BUNDLE_VERSION}"
                ));
            }
            Some(_) => {}
            None => {
                return CrdVersions::Unsupported(format!(
                    "CRD {crd} has malformed version annotation {version:?}"
                ));
            }
        }
    }

    if best_effort.is_empty() {
        CrdVersions::Supported
    } else {
        CrdVersions::BestEffort(best_effort.join("; "))
    }
}

fn split_version(version: &str) -> Option<(u64, u64)> {
    let mut parts = version.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    Some((major, minor))
}

fn resolve_parameters_ref(
    params: &gateway::ParametersReference,
    proxy_configs: &AHashMap<ResourceId, policy::ProxyConfig>,
) -> Result<policy::ProxyConfig, String> {
    if params.group != policy::GROUP || params.kind != "ProxyConfig" {
        return Err(format!(
            "parametersRef must reference a {}/ProxyConfig, got {}/{}",
            policy::GROUP,
            params.group,
            params.kind,
        ));
    }
    let namespace = params
        .namespace
        .clone()
        .ok_or_else(|| "parametersRef must carry a namespace".to_string())?;

    let id = ResourceId::new(namespace, params.name.clone());
    proxy_configs
        .get(&id)
        .cloned()
        .ok_or_else(|| format!("ProxyConfig {id} does not exist"))
}
