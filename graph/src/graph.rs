//! Graph assembly.
//!
//! `build_graph` is the engine entry point: it consumes one immutable
//! cluster snapshot and produces the resolved graph for the winning
//! gateway, or an `InvariantViolation` when the snapshot breaches the
//! admission-layer contract. The build is synchronous and keeps no state
//! between invocations.

use crate::backend_tls::{process_backend_tls_policies, BackendTlsPolicy};
use crate::backends::BackendResolver;
use crate::bind::bind_routes;
use crate::error::InvariantViolation;
use crate::filters::ExtensionRefResolver;
use crate::gateway::{build_gateway, process_gateways, Gateway, ProcessedGateways};
use crate::gatewayclass::{process_gateway_classes, GatewayClass};
use crate::listener::{AllowedRouteNamespaces, ListenerValidationCtx};
use crate::policies::{process_policies, Policy, PolicyKey, PolicyValidator};
use crate::reference_grant::ReferenceGrantResolver;
use crate::resource_id::ResourceId;
use crate::routes::{
    grpc::build_grpc_route, http::build_http_route, tls::build_tls_route, L4Route, L7Route,
    RouteKey, RouteKind,
};
use crate::secrets::SecretResolver;
use ahash::{AHashMap, AHashSet};
use stategraph_k8s_api::{gateway, policy, ConfigMap, Labels, Namespace, Secret, Service};

/// One observed snapshot of the cluster, keyed by namespaced name (or by
/// plain name for cluster-scoped objects).
#[derive(Clone, Debug, Default)]
pub struct ClusterState {
    pub gateway_classes: AHashMap<String, gateway::GatewayClass>,
    pub gateways: AHashMap<ResourceId, gateway::Gateway>,
    pub http_routes: AHashMap<ResourceId, gateway::HttpRoute>,
    pub grpc_routes: AHashMap<ResourceId, gateway::GrpcRoute>,
    pub tls_routes: AHashMap<ResourceId, gateway::TlsRoute>,
    pub services: AHashMap<ResourceId, Service>,
    pub namespaces: AHashMap<String, Namespace>,
    pub reference_grants: AHashMap<ResourceId, gateway::ReferenceGrant>,
    pub secrets: AHashMap<ResourceId, Secret>,
    pub config_maps: AHashMap<ResourceId, ConfigMap>,
    pub backend_tls_policies: AHashMap<ResourceId, policy::BackendTlsPolicy>,
    pub proxy_configs: AHashMap<ResourceId, policy::ProxyConfig>,
    pub client_settings_policies: AHashMap<ResourceId, policy::ClientSettingsPolicy>,
    pub observability_policies: AHashMap<ResourceId, policy::ObservabilityPolicy>,
    pub extension_filters: AHashMap<ResourceId, policy::ExtensionFilter>,
    /// Gateway API CRD name to its bundle-version annotation.
    pub crd_bundle_versions: AHashMap<String, Option<String>>,
}

/// Static controller configuration.
#[derive(Clone, Debug)]
pub struct ControllerConfig {
    pub controller_name: String,
    pub gateway_class_name: String,
    /// Ports the data plane reserves, keyed to the consumer name.
    pub protected_ports: AHashMap<u16, String>,
    /// Secrets the control plane itself depends on; changes to them must
    /// trigger a rebuild even though no listener references them.
    pub credential_secrets: Vec<ResourceId>,
}

/// The resolved routing configuration for one winning gateway.
#[derive(Debug)]
pub struct Graph {
    pub gateway_class: Option<GatewayClass>,
    pub ignored_gateway_classes: AHashSet<String>,
    pub gateway: Option<Gateway>,
    pub ignored_gateways: AHashSet<ResourceId>,
    pub routes: AHashMap<RouteKey, L7Route>,
    pub l4_routes: AHashMap<ResourceId, L4Route>,
    pub backend_tls_policies: AHashMap<ResourceId, BackendTlsPolicy>,
    pub policies: AHashMap<PolicyKey, Policy>,
    pub referenced_namespaces: AHashSet<String>,
    pub referenced_services: AHashSet<ResourceId>,
    pub referenced_secrets: AHashSet<ResourceId>,
    pub referenced_config_maps: AHashSet<ResourceId>,
}

// === impl Graph ===

impl Graph {
    pub fn is_referenced_namespace(&self, name: &str) -> bool {
        self.referenced_namespaces.contains(name)
    }

    pub fn is_referenced_service(&self, id: &ResourceId) -> bool {
        self.referenced_services.contains(id)
    }

    pub fn is_referenced_secret(&self, id: &ResourceId) -> bool {
        self.referenced_secrets.contains(id)
    }

    pub fn is_referenced_config_map(&self, id: &ResourceId) -> bool {
        self.referenced_config_maps.contains(id)
    }
}

pub fn build_graph(
    state: &ClusterState,
    config: &ControllerConfig,
    validator: &dyn PolicyValidator,
) -> Result<Graph, InvariantViolation> {
    let grants = ReferenceGrantResolver::new(&state.reference_grants);
    let mut secrets = SecretResolver::new(&state.secrets);

    let classes = process_gateway_classes(
        &state.gateway_classes,
        &state.crd_bundle_versions,
        &state.proxy_configs,
        &config.gateway_class_name,
        &config.controller_name,
    );

    // Without the configured class, no gateway exists for this engine.
    let processed_gateways = if classes.winner.is_some() {
        process_gateways(&state.gateways, &config.gateway_class_name)
    } else {
        ProcessedGateways {
            winner: None,
            ignored: AHashSet::default(),
        }
    };

    let mut gateway = match &processed_gateways.winner {
        Some(id) => match state.gateways.get(id) {
            Some(source) => Some(build_gateway(
                id.clone(),
                source.clone(),
                classes.winner.as_ref().map_or(false, |c| c.valid),
                &ListenerValidationCtx {
                    protected_ports: &config.protected_ports,
                },
                &mut secrets,
                &grants,
            )?),
            None => None,
        },
        None => None,
    };

    let ext = ExtensionRefResolver::new(&state.extension_filters);

    let mut routes: AHashMap<RouteKey, L7Route> = AHashMap::default();
    for (id, route) in &state.http_routes {
        if let Some(built) = build_http_route(id.clone(), route.clone(), &processed_gateways, &ext)
        {
            routes.insert(
                RouteKey {
                    kind: RouteKind::Http,
                    id: id.clone(),
                },
                built,
            );
        }
    }
    for (id, route) in &state.grpc_routes {
        if let Some(built) = build_grpc_route(id.clone(), route.clone(), &processed_gateways) {
            routes.insert(
                RouteKey {
                    kind: RouteKind::Grpc,
                    id: id.clone(),
                },
                built,
            );
        }
    }

    let mut l4_routes: AHashMap<ResourceId, L4Route> = AHashMap::default();
    for (id, route) in &state.tls_routes {
        if let Some(built) = build_tls_route(id.clone(), route.clone(), &processed_gateways) {
            l4_routes.insert(id.clone(), built);
        }
    }

    let backend_tls =
        process_backend_tls_policies(&state.backend_tls_policies, &state.config_maps);

    bind_routes(
        &mut gateway,
        &processed_gateways.ignored,
        &mut routes,
        &mut l4_routes,
        &state.namespaces,
    )?;

    BackendResolver {
        services: &state.services,
        grants: &grants,
        backend_tls: &backend_tls,
    }
    .resolve_routes(&mut routes, &mut l4_routes);

    let policies = process_policies(
        &state.client_settings_policies,
        &state.observability_policies,
        validator,
        &processed_gateways,
        &routes,
        &config.controller_name,
    );

    let referenced_namespaces = referenced_namespaces(gateway.as_ref(), &state.namespaces);
    let referenced_services = referenced_services(&routes, &l4_routes);
    let mut referenced_secrets: AHashSet<ResourceId> = secrets.referenced().collect();
    for credential in &config.credential_secrets {
        if state.secrets.contains_key(credential) {
            referenced_secrets.insert(credential.clone());
        }
    }

    Ok(Graph {
        gateway_class: classes.winner,
        ignored_gateway_classes: classes.ignored,
        gateway,
        ignored_gateways: processed_gateways.ignored,
        routes,
        l4_routes,
        backend_tls_policies: backend_tls.policies,
        policies,
        referenced_namespaces,
        referenced_services,
        referenced_secrets,
        referenced_config_maps: backend_tls.referenced_config_maps,
    })
}

/// Namespaces whose labels match any valid listener's namespace selector.
fn referenced_namespaces(
    gateway: Option<&Gateway>,
    namespaces: &AHashMap<String, Namespace>,
) -> AHashSet<String> {
    let selectors: Vec<_> = gateway
        .iter()
        .flat_map(|gw| gw.listeners.iter())
        .filter(|l| l.valid)
        .filter_map(|l| match &l.allowed_namespaces {
            AllowedRouteNamespaces::Selector(selector) => Some(selector),
            _ => None,
        })
        .collect();
    if selectors.is_empty() {
        return AHashSet::default();
    }

    namespaces
        .iter()
        .filter(|(_, ns)| {
            let labels = Labels::from(ns.metadata.labels.clone());
            selectors.iter().any(|s| s.matches(&labels))
        })
        .map(|(name, _)| name.clone())
        .collect()
}

/// Services reachable through the valid backends of attached valid routes.
fn referenced_services(
    routes: &AHashMap<RouteKey, L7Route>,
    l4_routes: &AHashMap<ResourceId, L4Route>,
) -> AHashSet<ResourceId> {
    let mut services = AHashSet::default();

    for route in routes.values() {
        if !route.valid || !is_attached(&route.parent_refs) {
            continue;
        }
        for rule in &route.rules {
            services.extend(
                rule.backend_refs
                    .iter()
                    .filter(|r| r.valid)
                    .filter_map(|r| r.service.clone()),
            );
        }
    }

    for route in l4_routes.values() {
        if !route.valid || !is_attached(&route.parent_refs) {
            continue;
        }
        services.extend(
            route
                .backend_refs
                .iter()
                .filter(|r| r.valid)
                .filter_map(|r| r.service.clone()),
        );
    }

    services
}

fn is_attached(parent_refs: &[crate::routes::ParentRef]) -> bool {
    parent_refs
        .iter()
        .any(|p| p.attachment.as_ref().map_or(false, |a| a.attached))
}
