//! HTTPRoute construction.

use super::{
    build_section_name_refs, finish_l7_route, rejected_l7_route, validate_hostnames, HeaderMatch,
    L7Parts, L7Route, PathMatch, QueryParamMatch, RouteKind, RouteMatch, RouteRule,
};
use crate::filters::{convert_http_filter, ExtensionRefResolver};
use crate::gateway::ProcessedGateways;
use crate::resource_id::{creation_timestamp, ResourceId};
use anyhow::{bail, Result};
use stategraph_k8s_api::gateway;

const SUPPORTED_METHODS: &[&str] = &[
    "GET", "HEAD", "POST", "PUT", "DELETE", "CONNECT", "OPTIONS", "TRACE", "PATCH",
];

/// Builds the graph's representation of an HTTPRoute. Returns `None` when
/// no parent ref resolves to a known gateway.
pub(crate) fn build_http_route(
    id: ResourceId,
    route: gateway::HttpRoute,
    gateways: &ProcessedGateways,
    ext: &ExtensionRefResolver<'_>,
) -> Option<L7Route> {
    let creation_timestamp = creation_timestamp(&route.metadata);
    let hostnames: Vec<String> = route.spec.hostnames.into_iter().flatten().collect();

    let parent_refs =
        match build_section_name_refs(route.spec.inner.parent_refs, &id.namespace, gateways) {
            Ok(refs) => refs,
            Err(e) => {
                let parts = L7Parts {
                    kind: RouteKind::Http,
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
        kind: RouteKind::Http,
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
        rules.push(build_rule(&parts.id.namespace, idx, rule, ext, &mut errors));
    }

    Some(finish_l7_route(parts, rules, errors))
}

fn build_rule(
    ns: &str,
    idx: usize,
    rule: gateway::HttpRouteRule,
    ext: &ExtensionRefResolver<'_>,
    errors: &mut Vec<String>,
) -> RouteRule {
    let mut valid_matches = true;
    let mut valid_filters = true;

    let mut matches = Vec::new();
    for m in rule.matches.into_iter().flatten() {
        match convert_match(m) {
            Ok(m) => matches.push(m),
            Err(e) => {
                valid_matches = false;
                errors.push(format!("rule {idx}: {e}"));
            }
        }
    }

    let mut filters = Vec::new();
    for f in rule.filters.into_iter().flatten() {
        match convert_http_filter(ns, ext, f) {
            Ok(f) => filters.push(f),
            Err(e) => {
                valid_filters = false;
                errors.push(format!("rule {idx}: {e}"));
            }
        }
    }

    RouteRule {
        matches,
        filters,
        valid_matches,
        valid_filters,
        backend_sources: rule.backend_refs.unwrap_or_default(),
        backend_refs: Vec::new(),
    }
}

pub(crate) fn convert_match(
    gateway::HttpRouteMatch {
        path,
        headers,
        query_params,
        method,
    }: gateway::HttpRouteMatch,
) -> Result<RouteMatch> {
    let path = path.map(path_match).transpose()?;

    let headers = headers
        .into_iter()
        .flatten()
        .map(header_match)
        .collect::<Result<_>>()?;

    let query_params = query_params
        .into_iter()
        .flatten()
        .map(query_param_match)
        .collect::<Result<_>>()?;

    if let Some(method) = method.as_deref() {
        if !SUPPORTED_METHODS.contains(&method) {
            bail!("unsupported method {method:?}");
        }
    }

    Ok(RouteMatch {
        path,
        headers,
        query_params,
        method,
    })
}

fn path_match(path: gateway::HttpPathMatch) -> Result<PathMatch> {
    match path {
        gateway::HttpPathMatch::Exact { value } | gateway::HttpPathMatch::PathPrefix { value }
            if !value.starts_with('/') =>
        {
            bail!("path matches must be absolute; {value:?} is not")
        }
        gateway::HttpPathMatch::Exact { value } => Ok(PathMatch::Exact(value)),
        gateway::HttpPathMatch::PathPrefix { value } => Ok(PathMatch::Prefix(value)),
        gateway::HttpPathMatch::RegularExpression { value } => Ok(PathMatch::Regex(value)),
    }
}

pub(crate) fn header_match(header: gateway::HttpHeaderMatch) -> Result<HeaderMatch> {
    let (name, value, regex) = match header {
        gateway::HttpHeaderMatch::Exact { name, value } => (name, value, false),
        gateway::HttpHeaderMatch::RegularExpression { name, value } => (name, value, true),
    };
    if name.is_empty() {
        bail!("header match name cannot be empty");
    }
    Ok(if regex {
        HeaderMatch::Regex { name, value }
    } else {
        HeaderMatch::Exact { name, value }
    })
}

fn query_param_match(query: gateway::HttpQueryParamMatch) -> Result<QueryParamMatch> {
    let m = match query {
        gateway::HttpQueryParamMatch::Exact { name, value } => {
            if name.is_empty() {
                bail!("query param match name cannot be empty");
            }
            QueryParamMatch::Exact { name, value }
        }
        gateway::HttpQueryParamMatch::RegularExpression { name, value } => {
            if name.is_empty() {
                bail!("query param match name cannot be empty");
            }
            QueryParamMatch::Regex { name, value }
        }
    };
    Ok(m)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditions;
    use ahash::AHashSet;
    use stategraph_k8s_api::ObjectMeta;

    fn gateways() -> ProcessedGateways {
        ProcessedGateways {
            winner: Some(ResourceId::new("apps".to_string(), "gateway".to_string())),
            ignored: AHashSet::default(),
        }
    }

    fn parent_ref() -> gateway::ParentReference {
        gateway::ParentReference {
            group: None,
            kind: None,
            namespace: None,
            name: "gateway".to_string(),
            section_name: None,
            port: None,
        }
    }

    fn route(rules: Vec<gateway::HttpRouteRule>) -> gateway::HttpRoute {
        gateway::HttpRoute {
            metadata: ObjectMeta {
                namespace: Some("apps".to_string()),
                name: Some("route".to_string()),
                ..Default::default()
            },
            spec: gateway::HttpRouteSpec {
                inner: gateway::CommonRouteSpec {
                    parent_refs: Some(vec![parent_ref()]),
                },
                hostnames: Some(vec!["cafe.example.com".to_string()]),
                rules: Some(rules),
            },
            status: None,
        }
    }

    fn rule_with_path(path: &str) -> gateway::HttpRouteRule {
        gateway::HttpRouteRule {
            matches: Some(vec![gateway::HttpRouteMatch {
                path: Some(gateway::HttpPathMatch::PathPrefix {
                    value: path.to_string(),
                }),
                headers: None,
                query_params: None,
                method: None,
            }]),
            filters: None,
            backend_refs: None,
        }
    }

    fn build(route: gateway::HttpRoute) -> Option<L7Route> {
        let filters = Default::default();
        let ext = ExtensionRefResolver::new(&filters);
        build_http_route(
            ResourceId::new("apps".to_string(), "route".to_string()),
            route,
            &gateways(),
            &ext,
        )
    }

    #[test]
    fn builds_valid_route() {
        let built = build(route(vec![rule_with_path("/tea")])).expect("route is kept");
        assert!(built.valid);
        assert!(built.attachable);
        assert!(built.conditions.is_empty());
        assert_eq!(built.rules.len(), 1);
        assert_eq!(
            built.rules[0].matches[0].path,
            Some(PathMatch::Prefix("/tea".to_string()))
        );
    }

    #[test]
    fn all_rules_invalid_rejects_route() {
        let built = build(route(vec![rule_with_path("tea")])).expect("route is kept");
        assert!(!built.valid);
        assert!(!built.attachable);
        assert_eq!(built.conditions.len(), 1);
        assert_eq!(built.conditions[0].reason, "UnsupportedValue");
    }

    #[test]
    fn partially_invalid_route_stays_valid() {
        let built =
            build(route(vec![rule_with_path("/tea"), rule_with_path("coffee")]))
                .expect("route is kept");
        assert!(built.valid);
        assert!(built.attachable);
        assert_eq!(built.conditions, vec![conditions::route_partially_invalid(
            "rule 1: path matches must be absolute; \"coffee\" is not".to_string(),
        )]);
        assert!(!built.rules[1].valid_matches);
        assert!(built.rules[1].valid_filters);
    }

    #[test]
    fn invalid_hostname_rejects_route() {
        let mut source = route(vec![rule_with_path("/tea")]);
        source.spec.hostnames = Some(vec!["*".to_string()]);
        let built = build(source).expect("route is kept");
        assert!(!built.valid);
        assert_eq!(built.conditions[0].reason, "UnsupportedValue");
    }

    #[test]
    fn route_without_known_parents_is_dropped() {
        let mut source = route(vec![rule_with_path("/tea")]);
        source.spec.inner.parent_refs = Some(vec![gateway::ParentReference {
            namespace: Some("elsewhere".to_string()),
            ..parent_ref()
        }]);
        assert!(build(source).is_none());
    }

    #[test]
    fn unsupported_method_invalidates_match() {
        let mut source = route(vec![rule_with_path("/tea")]);
        source.spec.rules.as_mut().unwrap()[0]
            .matches
            .as_mut()
            .unwrap()[0]
            .method = Some("BREW".to_string());
        let built = build(source).expect("route is kept");
        assert!(!built.valid);
    }
}
