//! Common route model shared by the HTTP, gRPC and TLS builders.
//!
//! gRPC routes are normalized onto the HTTP rule model during construction,
//! so everything downstream of the builders (binding, backend resolution,
//! policy attachment) sees exactly two shapes: `L7Route` and `L4Route`.

pub mod grpc;
pub mod http;
pub mod tls;

use crate::conditions::Condition;
use crate::filters::Filter;
use crate::gateway::ProcessedGateways;
use crate::resource_id::ResourceId;
use ahash::AHashSet;
use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use stategraph_k8s_api::gateway;

const GATEWAY_GROUP: &str = "gateway.networking.k8s.io";

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub enum RouteKind {
    Http,
    Grpc,
    Tls,
}

impl RouteKind {
    pub fn kind_str(&self) -> &'static str {
        match self {
            Self::Http => "HTTPRoute",
            Self::Grpc => "GRPCRoute",
            Self::Tls => "TLSRoute",
        }
    }
}

/// Keys a route in the graph; distinct kinds may share a namespaced name.
#[derive(Clone, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct RouteKey {
    pub kind: RouteKind,
    pub id: ResourceId,
}

/// A parent reference resolved to a known Gateway.
#[derive(Clone, Debug)]
pub struct ParentRef {
    /// Index of this reference in the source `parentRefs` list.
    pub idx: usize,
    pub gateway: ResourceId,
    pub section_name: Option<String>,
    /// Filled during binding; `None` until then.
    pub attachment: Option<ParentRefAttachment>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParentRefAttachment {
    pub attached: bool,
    /// Accepted hostnames per bound listener name.
    pub accepted_hostnames: BTreeMap<String, Vec<String>>,
    pub failed_conditions: Vec<Condition>,
}

/// An HTTP or gRPC route after construction.
#[derive(Clone, Debug)]
pub struct L7Route {
    pub kind: RouteKind,
    pub id: ResourceId,
    pub creation_timestamp: Option<DateTime<Utc>>,
    pub hostnames: Vec<String>,
    pub parent_refs: Vec<ParentRef>,
    pub rules: Vec<RouteRule>,
    pub conditions: Vec<Condition>,
    pub valid: bool,
    pub attachable: bool,
}

#[derive(Clone, Debug)]
pub struct RouteRule {
    pub matches: Vec<RouteMatch>,
    pub filters: Vec<Filter>,
    /// Matches and filters are validated independently; an invalid half
    /// keeps the rule in place but excludes it from generated config.
    pub valid_matches: bool,
    pub valid_filters: bool,
    /// Source backend references, resolved into `backend_refs` after
    /// binding. The two lists always have equal length.
    pub backend_sources: Vec<gateway::HttpBackendRef>,
    pub backend_refs: Vec<RouteBackendRef>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RouteMatch {
    pub path: Option<PathMatch>,
    pub headers: Vec<HeaderMatch>,
    pub query_params: Vec<QueryParamMatch>,
    pub method: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum PathMatch {
    Exact(String),
    Prefix(String),
    Regex(String),
}

#[derive(Clone, Debug, PartialEq)]
pub enum HeaderMatch {
    Exact { name: String, value: String },
    Regex { name: String, value: String },
}

#[derive(Clone, Debug, PartialEq)]
pub enum QueryParamMatch {
    Exact { name: String, value: String },
    Regex { name: String, value: String },
}

/// A resolved backend reference. Always emitted, valid or not, so the data
/// plane can answer authoritatively for broken backends.
#[derive(Clone, Debug, PartialEq)]
pub struct RouteBackendRef {
    pub service: Option<ResourceId>,
    pub port: Option<u16>,
    pub weight: i32,
    pub valid: bool,
    pub backend_tls_policy: Option<ResourceId>,
}

/// A TLS passthrough route.
#[derive(Clone, Debug)]
pub struct L4Route {
    pub id: ResourceId,
    pub creation_timestamp: Option<DateTime<Utc>>,
    pub hostnames: Vec<String>,
    pub parent_refs: Vec<ParentRef>,
    pub backend_sources: Vec<gateway::BackendRef>,
    pub backend_refs: Vec<RouteBackendRef>,
    pub conditions: Vec<Condition>,
    pub valid: bool,
    pub attachable: bool,
}

/// The capability surface binding needs from a route, implemented per
/// variant.
pub(crate) trait BindableRoute {
    fn kind(&self) -> RouteKind;
    fn id(&self) -> &ResourceId;
    fn hostnames(&self) -> &[String];
    fn is_attachable(&self) -> bool;
    fn parent_refs_mut(&mut self) -> &mut [ParentRef];
}

// === impl L7Route ===

impl BindableRoute for L7Route {
    fn kind(&self) -> RouteKind {
        self.kind
    }
    fn id(&self) -> &ResourceId {
        &self.id
    }
    fn hostnames(&self) -> &[String] {
        &self.hostnames
    }
    fn is_attachable(&self) -> bool {
        self.attachable
    }
    fn parent_refs_mut(&mut self) -> &mut [ParentRef] {
        &mut self.parent_refs
    }
}

// === impl L4Route ===

impl BindableRoute for L4Route {
    fn kind(&self) -> RouteKind {
        RouteKind::Tls
    }
    fn id(&self) -> &ResourceId {
        &self.id
    }
    fn hostnames(&self) -> &[String] {
        &self.hostnames
    }
    fn is_attachable(&self) -> bool {
        self.attachable
    }
    fn parent_refs_mut(&mut self) -> &mut [ParentRef] {
        &mut self.parent_refs
    }
}

/// Resolves a route's parent references against the known gateways.
///
/// References to unknown gateways are dropped without a trace; a pair of
/// references naming the same (gateway, sectionName) rejects the whole
/// route, treating an absent section name and an empty one as equal.
pub(crate) fn build_section_name_refs(
    parent_refs: Option<Vec<gateway::ParentReference>>,
    route_ns: &str,
    gateways: &ProcessedGateways,
) -> Result<Vec<ParentRef>> {
    let mut seen: AHashSet<(ResourceId, String)> = AHashSet::default();
    let mut refs = Vec::new();

    for (idx, parent_ref) in parent_refs.into_iter().flatten().enumerate() {
        if !references_gateway(&parent_ref) {
            continue;
        }

        let gateway_id = ResourceId::new(
            parent_ref
                .namespace
                .clone()
                .unwrap_or_else(|| route_ns.to_string()),
            parent_ref.name.clone(),
        );
        let section_name = parent_ref.section_name.filter(|s| !s.is_empty());

        let key = (
            gateway_id.clone(),
            section_name.clone().unwrap_or_default(),
        );
        if !seen.insert(key) {
            bail!(
                "duplicate parent ref to gateway {gateway_id} with section name {:?}",
                section_name.as_deref().unwrap_or(""),
            );
        }

        if !gateways.knows(&gateway_id) {
            continue;
        }

        refs.push(ParentRef {
            idx,
            gateway: gateway_id,
            section_name,
            attachment: None,
        });
    }

    Ok(refs)
}

fn references_gateway(parent_ref: &gateway::ParentReference) -> bool {
    let kind_ok = parent_ref.kind.as_deref().map_or(true, |k| k == "Gateway");
    let group_ok = parent_ref
        .group
        .as_deref()
        .map_or(true, |g| g.is_empty() || g == GATEWAY_GROUP);
    kind_ok && group_ok && !parent_ref.name.is_empty()
}

/// Validates route hostnames; any invalid hostname rejects the route.
pub(crate) fn validate_hostnames(hostnames: &[String]) -> Result<()> {
    for hostname in hostnames {
        crate::hostname::validate(hostname)
            .map_err(|e| anyhow::anyhow!("invalid hostname {hostname:?}: {e}"))?;
    }
    Ok(())
}

pub(crate) struct L7Parts {
    pub kind: RouteKind,
    pub id: ResourceId,
    pub creation_timestamp: Option<DateTime<Utc>>,
    pub hostnames: Vec<String>,
    pub parent_refs: Vec<ParentRef>,
}

/// Builds a route rejected before rule construction (duplicate parent
/// refs, invalid hostnames).
pub(crate) fn rejected_l7_route(parts: L7Parts, message: String) -> L7Route {
    L7Route {
        kind: parts.kind,
        id: parts.id,
        creation_timestamp: parts.creation_timestamp,
        hostnames: parts.hostnames,
        parent_refs: parts.parent_refs,
        rules: Vec::new(),
        conditions: vec![crate::conditions::route_unsupported_value(message)],
        valid: false,
        attachable: false,
    }
}

/// Assembles an `L7Route` from converted rules, computing the
/// all-invalid/partially-invalid split.
pub(crate) fn finish_l7_route(
    parts: L7Parts,
    rules: Vec<RouteRule>,
    errors: Vec<String>,
) -> L7Route {
    let mut conditions = Vec::new();
    let mut valid = true;
    let mut attachable = true;

    let at_least_one_valid = rules.iter().any(|r| r.valid_matches && r.valid_filters);
    if !rules.is_empty() && !at_least_one_valid {
        valid = false;
        attachable = false;
        conditions.push(crate::conditions::route_unsupported_value(format!(
            "All rules are invalid: {}",
            errors.join("; "),
        )));
    } else if !errors.is_empty() {
        conditions.push(crate::conditions::route_partially_invalid(
            errors.join("; "),
        ));
    }

    L7Route {
        kind: parts.kind,
        id: parts.id,
        creation_timestamp: parts.creation_timestamp,
        hostnames: parts.hostnames,
        parent_refs: parts.parent_refs,
        rules,
        conditions,
        valid,
        attachable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn known_gateways(winner: ResourceId) -> ProcessedGateways {
        ProcessedGateways {
            winner: Some(winner),
            ignored: AHashSet::default(),
        }
    }

    fn parent_ref(
        ns: Option<&str>,
        name: &str,
        section_name: Option<&str>,
    ) -> gateway::ParentReference {
        gateway::ParentReference {
            group: None,
            kind: None,
            namespace: ns.map(|n| n.to_string()),
            name: name.to_string(),
            section_name: section_name.map(|s| s.to_string()),
            port: None,
        }
    }

    #[test]
    fn defaults_namespace_to_route() {
        let winner = ResourceId::new("apps".to_string(), "gateway".to_string());
        let refs = build_section_name_refs(
            Some(vec![parent_ref(None, "gateway", Some("http"))]),
            "apps",
            &known_gateways(winner.clone()),
        )
        .expect("valid refs");

        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].gateway, winner);
        assert_eq!(refs[0].section_name.as_deref(), Some("http"));
    }

    #[test]
    fn drops_refs_to_unknown_gateways() {
        let winner = ResourceId::new("apps".to_string(), "gateway".to_string());
        let refs = build_section_name_refs(
            Some(vec![parent_ref(Some("elsewhere"), "gateway", None)]),
            "apps",
            &known_gateways(winner),
        )
        .expect("valid refs");
        assert!(refs.is_empty());
    }

    #[test]
    fn drops_non_gateway_refs() {
        let winner = ResourceId::new("apps".to_string(), "gateway".to_string());
        let mut service_ref = parent_ref(None, "gateway", None);
        service_ref.kind = Some("Service".to_string());
        let refs = build_section_name_refs(
            Some(vec![service_ref]),
            "apps",
            &known_gateways(winner),
        )
        .expect("valid refs");
        assert!(refs.is_empty());
    }

    #[test]
    fn duplicate_section_names_reject_route() {
        let winner = ResourceId::new("apps".to_string(), "gateway".to_string());
        let result = build_section_name_refs(
            Some(vec![
                parent_ref(None, "gateway", Some("http")),
                parent_ref(None, "gateway", Some("http")),
            ]),
            "apps",
            &known_gateways(winner),
        );
        assert!(result.is_err());
    }

    #[test]
    fn absent_and_empty_section_names_collide() {
        let winner = ResourceId::new("apps".to_string(), "gateway".to_string());
        let result = build_section_name_refs(
            Some(vec![
                parent_ref(None, "gateway", None),
                parent_ref(None, "gateway", Some("")),
            ]),
            "apps",
            &known_gateways(winner),
        );
        assert!(result.is_err());
    }

    #[test]
    fn keeps_source_index() {
        let winner = ResourceId::new("apps".to_string(), "gateway".to_string());
        let refs = build_section_name_refs(
            Some(vec![
                parent_ref(Some("elsewhere"), "other", None),
                parent_ref(None, "gateway", None),
            ]),
            "apps",
            &known_gateways(winner),
        )
        .expect("valid refs");
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].idx, 1);
    }
}
