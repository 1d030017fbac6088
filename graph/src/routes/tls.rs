//! TLSRoute construction.
//!
//! TLS passthrough routes carry no matches or filters, only backend refs,
//! so the builder is mostly hostname and shape validation.

use super::{build_section_name_refs, validate_hostnames, L4Route, ParentRef};
use crate::conditions;
use crate::gateway::ProcessedGateways;
use crate::resource_id::{creation_timestamp, ResourceId};
use chrono::{DateTime, Utc};
use stategraph_k8s_api::gateway;

/// Builds the graph's representation of a TLSRoute. Returns `None` when
/// no parent ref resolves to a known gateway.
pub(crate) fn build_tls_route(
    id: ResourceId,
    route: gateway::TlsRoute,
    gateways: &ProcessedGateways,
) -> Option<L4Route> {
    let creation_timestamp = creation_timestamp(&route.metadata);
    let hostnames: Vec<String> = route.spec.hostnames.into_iter().flatten().collect();

    let parent_refs =
        match build_section_name_refs(route.spec.inner.parent_refs, &id.namespace, gateways) {
            Ok(refs) => refs,
            Err(e) => {
                return Some(rejected(
                    id,
                    creation_timestamp,
                    hostnames,
                    Vec::new(),
                    e.to_string(),
                ));
            }
        };
    if parent_refs.is_empty() {
        return None;
    }

    if let Err(e) = validate_hostnames(&hostnames) {
        return Some(rejected(
            id,
            creation_timestamp,
            hostnames,
            parent_refs,
            e.to_string(),
        ));
    }

    let mut rules = route.spec.rules;
    if rules.len() != 1 {
        let message = format!("must have exactly one rule, got {}", rules.len());
        return Some(rejected(
            id,
            creation_timestamp,
            hostnames,
            parent_refs,
            message,
        ));
    }
    let backend_sources = rules.remove(0).backend_refs;

    Some(L4Route {
        id,
        creation_timestamp,
        hostnames,
        parent_refs,
        backend_sources,
        backend_refs: Vec::new(),
        conditions: Vec::new(),
        valid: true,
        attachable: true,
    })
}

fn rejected(
    id: ResourceId,
    creation_timestamp: Option<DateTime<Utc>>,
    hostnames: Vec<String>,
    parent_refs: Vec<ParentRef>,
    message: String,
) -> L4Route {
    L4Route {
        id,
        creation_timestamp,
        hostnames,
        parent_refs,
        backend_sources: Vec::new(),
        backend_refs: Vec::new(),
        conditions: vec![conditions::route_unsupported_value(message)],
        valid: false,
        attachable: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ahash::AHashSet;
    use stategraph_k8s_api::ObjectMeta;

    fn gateways() -> ProcessedGateways {
        ProcessedGateways {
            winner: Some(ResourceId::new("apps".to_string(), "gateway".to_string())),
            ignored: AHashSet::default(),
        }
    }

    fn backend(name: &str) -> gateway::BackendRef {
        gateway::BackendRef {
            weight: None,
            inner: gateway::BackendObjectReference {
                group: None,
                kind: None,
                name: name.to_string(),
                namespace: None,
                port: Some(5432),
            },
        }
    }

    fn route(rules: Vec<gateway::TlsRouteRule>) -> gateway::TlsRoute {
        gateway::TlsRoute {
            metadata: ObjectMeta {
                namespace: Some("apps".to_string()),
                name: Some("route".to_string()),
                ..Default::default()
            },
            spec: gateway::TlsRouteSpec {
                inner: gateway::CommonRouteSpec {
                    parent_refs: Some(vec![gateway::ParentReference {
                        group: None,
                        kind: None,
                        namespace: None,
                        name: "gateway".to_string(),
                        section_name: None,
                        port: None,
                    }]),
                },
                hostnames: Some(vec!["db.example.com".to_string()]),
                rules,
            },
            status: None,
        }
    }

    fn build(route: gateway::TlsRoute) -> Option<L4Route> {
        build_tls_route(
            ResourceId::new("apps".to_string(), "route".to_string()),
            route,
            &gateways(),
        )
    }

    #[test]
    fn builds_valid_route() {
        let built = build(route(vec![gateway::TlsRouteRule {
            backend_refs: vec![backend("db")],
        }]))
        .expect("route is kept");
        assert!(built.valid);
        assert!(built.attachable);
        assert_eq!(built.backend_sources.len(), 1);
    }

    #[test]
    fn multiple_rules_reject_route() {
        let built = build(route(vec![
            gateway::TlsRouteRule {
                backend_refs: vec![backend("db")],
            },
            gateway::TlsRouteRule {
                backend_refs: vec![backend("db-canary")],
            },
        ]))
        .expect("route is kept");
        assert!(!built.valid);
        assert!(!built.attachable);
        assert_eq!(built.conditions[0].reason, "UnsupportedValue");
    }

    #[test]
    fn zero_rules_reject_route() {
        let built = build(route(Vec::new())).expect("route is kept");
        assert!(!built.valid);
    }

    #[test]
    fn invalid_hostname_rejects_route() {
        let mut source = route(vec![gateway::TlsRouteRule {
            backend_refs: vec![backend("db")],
        }]);
        source.spec.hostnames = Some(vec!["db..example.com".to_string()]);
        let built = build(source).expect("route is kept");
        assert!(!built.valid);
    }
}
