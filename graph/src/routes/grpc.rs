//! GRPCRoute construction.
//!
//! gRPC rules are normalized onto the HTTP rule model at build time: a
//! method match becomes an exact path match of `/service/method`, header
//! matches carry over, and a rule with no method match falls back to a `/`
//! prefix. Everything downstream treats the result as an ordinary L7 rule.

use super::http::header_match;
use super::{
    build_section_name_refs, finish_l7_route, rejected_l7_route, validate_hostnames, L7Parts,
    L7Route, PathMatch, RouteKind, RouteMatch, RouteRule,
};
use crate::filters::convert_grpc_filter;
use crate::gateway::ProcessedGateways;
use crate::resource_id::{creation_timestamp, ResourceId};
use anyhow::{bail, Result};
use stategraph_k8s_api::gateway;

/// Builds the graph's representation of a GRPCRoute. Returns `None` when
/// no parent ref resolves to a known gateway.
pub(crate) fn build_grpc_route(
    id: ResourceId,
    route: gateway::GrpcRoute,
    gateways: &ProcessedGateways,
) -> Option<L7Route> {
    let creation_timestamp = creation_timestamp(&route.metadata);
    let hostnames: Vec<String> = route.spec.hostnames.into_iter().flatten().collect();

    let parent_refs =
        match build_section_name_refs(route.spec.inner.parent_refs, &id.namespace, gateways) {
            Ok(refs) => refs,
            Err(e) => {
                let parts = L7Parts {
                    kind: RouteKind::Grpc,
                    id,
                    creation_timestamp,
                    hostnames,
                    parent_refs: Vec::new(),
                };
                return Some(rejected_l7_route(parts, e.to_string()));
            }
        };
    if parent_refs.is_empty() {
        return None;
    }

    let parts = L7Parts {
        kind: RouteKind::Grpc,
        id,
        creation_timestamp,
        hostnames,
        parent_refs,
    };

    if let Err(e) = validate_hostnames(&parts.hostnames) {
        return Some(rejected_l7_route(parts, e.to_string()));
    }

    let mut rules = Vec::new();
    let mut errors = Vec::new();
    for (idx, rule) in route.spec.rules.into_iter().flatten().enumerate() {
        rules.push(build_rule(idx, rule, &mut errors));
    }

    Some(finish_l7_route(parts, rules, errors))
}

fn build_rule(idx: usize, rule: gateway::GrpcRouteRule, errors: &mut Vec<String>) -> RouteRule {
    let mut valid_matches = true;
    let mut valid_filters = true;

    let mut matches = Vec::new();
    for m in rule.matches.into_iter().flatten() {
        match convert_grpc_match(m) {
            Ok(m) => matches.push(m),
            Err(e) => {
                valid_matches = false;
                errors.push(format!("rule {idx}: {e}"));
            }
        }
    }

    let mut filters = Vec::new();
    for f in rule.filters.into_iter().flatten() {
        match convert_grpc_filter(f) {
            Ok(f) => filters.push(f),
            Err(e) => {
                valid_filters = false;
                errors.push(format!("rule {idx}: {e}"));
            }
        }
    }

    let backend_sources = rule
        .backend_refs
        .into_iter()
        .flatten()
        .map(Into::into)
        .collect();

    RouteRule {
        matches,
        filters,
        valid_matches,
        valid_filters,
        backend_sources,
        backend_refs: Vec::new(),
    }
}

fn convert_grpc_match(
    gateway::GrpcRouteMatch { headers, method }: gateway::GrpcRouteMatch,
) -> Result<RouteMatch> {
    let headers = headers
        .into_iter()
        .flatten()
        .map(header_match)
        .collect::<Result<_>>()?;

    let path = match method {
        Some(gateway::GrpcMethodMatch::Exact { method, service }) => {
            match (service, method) {
                (Some(service), Some(method)) => {
                    PathMatch::Exact(format!("/{service}/{method}"))
                }
                _ => bail!("method matches must carry both service and method"),
            }
        }
        Some(gateway::GrpcMethodMatch::RegularExpression { .. }) => {
            bail!("regular expression method matches are not supported")
        }
        None => PathMatch::Prefix("/".to_string()),
    };

    Ok(RouteMatch {
        path: Some(path),
        headers,
        query_params: Vec::new(),
        method: None,
    })
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

    fn route(rules: Vec<gateway::GrpcRouteRule>) -> gateway::GrpcRoute {
        gateway::GrpcRoute {
            metadata: ObjectMeta {
                namespace: Some("apps".to_string()),
                name: Some("route".to_string()),
                ..Default::default()
            },
            spec: gateway::GrpcRouteSpec {
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
                hostnames: None,
                rules: Some(rules),
            },
            status: None,
        }
    }

    fn method_rule(service: Option<&str>, method: Option<&str>) -> gateway::GrpcRouteRule {
        gateway::GrpcRouteRule {
            matches: Some(vec![gateway::GrpcRouteMatch {
                headers: None,
                method: Some(gateway::GrpcMethodMatch::Exact {
                    method: method.map(|m| m.to_string()),
                    service: service.map(|s| s.to_string()),
                }),
            }]),
            filters: None,
            backend_refs: None,
        }
    }

    fn build(route: gateway::GrpcRoute) -> Option<L7Route> {
        build_grpc_route(
            ResourceId::new("apps".to_string(), "route".to_string()),
            route,
            &gateways(),
        )
    }

    #[test]
    fn method_match_becomes_exact_path() {
        let built =
            build(route(vec![method_rule(Some("helloworld.Greeter"), Some("SayHello"))]))
                .expect("route is kept");
        assert!(built.valid);
        assert_eq!(built.rules.len(), 1);
        assert_eq!(
            built.rules[0].matches[0].path,
            Some(PathMatch::Exact("/helloworld.Greeter/SayHello".to_string()))
        );
    }

    #[test]
    fn method_match_requires_both_fields() {
        let built = build(route(vec![method_rule(Some("helloworld.Greeter"), None)]))
            .expect("route is kept");
        assert!(!built.valid);
    }

    #[test]
    fn headers_only_match_falls_back_to_root_prefix() {
        let built = build(route(vec![gateway::GrpcRouteRule {
            matches: Some(vec![gateway::GrpcRouteMatch {
                headers: Some(vec![gateway::HttpHeaderMatch::Exact {
                    name: "x-version".to_string(),
                    value: "v2".to_string(),
                }]),
                method: None,
            }]),
            filters: None,
            backend_refs: None,
        }]))
        .expect("route is kept");

        assert!(built.valid);
        assert_eq!(
            built.rules[0].matches[0].path,
            Some(PathMatch::Prefix("/".to_string()))
        );
        assert_eq!(built.rules[0].matches[0].headers.len(), 1);
    }

    #[test]
    fn mirror_filter_invalidates_rule() {
        let built = build(route(vec![gateway::GrpcRouteRule {
            matches: None,
            filters: Some(vec![gateway::GrpcRouteFilter::RequestMirror {
                request_mirror: gateway::HttpRequestMirrorFilter {
                    backend_ref: gateway::BackendObjectReference {
                        group: None,
                        kind: None,
                        name: "mirror".to_string(),
                        namespace: None,
                        port: None,
                    },
                },
            }]),
            backend_refs: None,
        }]))
        .expect("route is kept");
        assert!(!built.valid);
    }
}
