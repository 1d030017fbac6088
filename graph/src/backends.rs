//! BackendRef resolution.
//!
//! A `RouteBackendRef` is emitted for every source reference, valid or not,
//! so the data plane can answer authoritatively for broken backends instead
//! of silently dropping traffic shares.

use crate::backend_tls::ProcessedBackendTls;
use crate::conditions::{self, Condition};
use crate::reference_grant::{FromResource, ReferenceGrantResolver, ToResource};
use crate::resource_id::ResourceId;
use crate::routes::{L4Route, L7Route, RouteBackendRef, RouteKey, RouteKind};
use ahash::AHashMap;
use stategraph_k8s_api::{gateway, Service};

pub const WEIGHT_MIN: i32 = 0;
pub const WEIGHT_MAX: i32 = 1_000_000;
pub const DEFAULT_WEIGHT: i32 = 1;

pub(crate) struct BackendResolver<'a> {
    pub services: &'a AHashMap<ResourceId, Service>,
    pub grants: &'a ReferenceGrantResolver,
    pub backend_tls: &'a ProcessedBackendTls,
}

impl BackendResolver<'_> {
    pub(crate) fn resolve_routes(
        &self,
        routes: &mut AHashMap<RouteKey, L7Route>,
        l4_routes: &mut AHashMap<ResourceId, L4Route>,
    ) {
        for (key, route) in routes.iter_mut() {
            if !route.valid {
                continue;
            }
            let mut conditions = Vec::new();
            for rule in &mut route.rules {
                rule.backend_refs = rule
                    .backend_sources
                    .iter()
                    .map(|r| self.resolve_http_ref(key.kind, &key.id, r, &mut conditions))
                    .collect();
                check_rule_tls_consistency(&rule.backend_refs, &mut conditions);
            }
            merge_conditions(&mut route.conditions, conditions);
        }

        for (id, route) in l4_routes.iter_mut() {
            if !route.valid {
                continue;
            }
            let mut conditions = Vec::new();
            route.backend_refs = route
                .backend_sources
                .iter()
                .map(|r| self.resolve_ref(RouteKind::Tls, id, r, None, &mut conditions))
                .collect();
            merge_conditions(&mut route.conditions, conditions);
        }
    }

    fn resolve_http_ref(
        &self,
        kind: RouteKind,
        route_id: &ResourceId,
        source: &gateway::HttpBackendRef,
        conditions: &mut Vec<Condition>,
    ) -> RouteBackendRef {
        let backend_ref = match &source.backend_ref {
            Some(backend_ref) => backend_ref,
            None => {
                conditions.push(conditions::route_backend_ref_unsupported_value(
                    "backendRef must be specified".to_string(),
                ));
                return RouteBackendRef::invalid(0);
            }
        };
        let filters = source.filters.as_ref().map_or(0, Vec::len);
        self.resolve_ref(kind, route_id, backend_ref, Some(filters), conditions)
    }

    fn resolve_ref(
        &self,
        kind: RouteKind,
        route_id: &ResourceId,
        source: &gateway::BackendRef,
        filters: Option<usize>,
        conditions: &mut Vec<Condition>,
    ) -> RouteBackendRef {
        let declared = source.weight.map(i32::from).unwrap_or(DEFAULT_WEIGHT);
        let weight = match validate_weight(declared) {
            Ok(weight) => weight,
            Err(message) => {
                conditions.push(conditions::route_backend_ref_unsupported_value(message));
                return RouteBackendRef::invalid(0);
            }
        };

        if filters.unwrap_or(0) > 0 {
            conditions.push(conditions::route_backend_ref_unsupported_value(
                "backendRef filters are not supported".to_string(),
            ));
            return RouteBackendRef::invalid(weight);
        }

        let inner = &source.inner;
        if inner.kind.as_deref().map_or(false, |k| k != "Service")
            || inner
                .group
                .as_deref()
                .map_or(false, |g| !g.is_empty() && g != "core")
        {
            conditions.push(conditions::route_backend_ref_invalid_kind(format!(
                "backendRef {:?} has an unsupported kind; only core Services are supported",
                inner.name,
            )));
            return RouteBackendRef::invalid(weight);
        }

        let service_id = ResourceId::new(
            inner
                .namespace
                .clone()
                .unwrap_or_else(|| route_id.namespace.clone()),
            inner.name.clone(),
        );

        if service_id.namespace != route_id.namespace
            && !self.grants.is_allowed(
                &ToResource::service(&service_id),
                &FromResource::route(kind, &route_id.namespace),
            )
        {
            conditions.push(conditions::route_backend_ref_not_permitted(format!(
                "reference to service {service_id} is not permitted by any ReferenceGrant"
            )));
            return RouteBackendRef::invalid(weight);
        }

        let service = match self.services.get(&service_id) {
            Some(service) => service,
            None => {
                conditions.push(conditions::route_backend_not_found(format!(
                    "service {service_id} does not exist"
                )));
                return RouteBackendRef::invalid(weight);
            }
        };

        let port = match inner.port {
            Some(port) if service_has_port(service, port) => port,
            Some(port) => {
                conditions.push(conditions::route_backend_not_found(format!(
                    "service {service_id} does not expose port {port}"
                )));
                return RouteBackendRef::invalid(weight);
            }
            None => {
                conditions.push(conditions::route_backend_ref_unsupported_value(format!(
                    "backendRef to service {service_id} must specify a port"
                )));
                return RouteBackendRef::invalid(weight);
            }
        };

        RouteBackendRef {
            backend_tls_policy: self.backend_tls.by_service.get(&service_id).cloned(),
            service: Some(service_id),
            port: Some(port),
            weight,
            valid: true,
        }
    }
}

// === impl RouteBackendRef ===

impl RouteBackendRef {
    fn invalid(weight: i32) -> Self {
        Self {
            service: None,
            port: None,
            weight,
            valid: false,
            backend_tls_policy: None,
        }
    }
}

/// Bounds-checks a declared weight. An out-of-range weight is reported and
/// the resolved weight collapses to zero so the backend receives no traffic.
pub(crate) fn validate_weight(weight: i32) -> Result<i32, String> {
    if (WEIGHT_MIN..=WEIGHT_MAX).contains(&weight) {
        Ok(weight)
    } else {
        Err(format!(
            "weight must be in [{WEIGHT_MIN}, {WEIGHT_MAX}], got {weight}"
        ))
    }
}

fn service_has_port(service: &Service, port: u16) -> bool {
    service
        .spec
        .iter()
        .flat_map(|spec| spec.ports.iter().flatten())
        .any(|p| p.port == i32::from(port))
}

/// All valid backends of one rule must agree on the effective TLS policy.
fn check_rule_tls_consistency(refs: &[RouteBackendRef], conditions: &mut Vec<Condition>) {
    let mut policies = refs
        .iter()
        .filter(|r| r.valid)
        .map(|r| r.backend_tls_policy.as_ref());
    let first = match policies.next() {
        Some(first) => first,
        None => return,
    };
    if policies.any(|p| p != first) {
        conditions.push(conditions::route_backend_ref_unsupported_value(
            "backend TLS policies do not match for all backends".to_string(),
        ));
    }
}

fn merge_conditions(existing: &mut Vec<Condition>, new: Vec<Condition>) {
    for condition in new {
        if !existing.contains(&condition) {
            existing.push(condition);
        }
    }
}
