//! Attached-policy processing.
//!
//! Semantic validation and the conflict predicate are injected through
//! `PolicyValidator`, keeping this engine decoupled from the meaning of any
//! particular policy. The engine owns target resolution, precedence
//! arbitration and ancestor accounting.

use crate::conditions::{self, Condition};
use crate::gateway::ProcessedGateways;
use crate::resource_id::{creation_timestamp, winner_precedence, ResourceId};
use crate::routes::{L7Route, RouteKey, RouteKind};
use ahash::AHashMap;
use chrono::{DateTime, Utc};
use stategraph_k8s_api::{gateway, policy};

/// Status arrays are bounded; a policy never carries more ancestors.
pub const POLICY_ANCESTOR_LIMIT: usize = 16;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub enum PolicyKind {
    ClientSettings,
    Observability,
}

#[derive(Clone, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct PolicyKey {
    pub kind: PolicyKind,
    pub id: ResourceId,
}

#[derive(Clone, Debug)]
pub enum PolicySource {
    ClientSettings(policy::ClientSettingsPolicy),
    Observability(policy::ObservabilityPolicy),
}

#[derive(Clone, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct PolicyTargetRef {
    pub kind: TargetKind,
    pub id: ResourceId,
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub enum TargetKind {
    Gateway,
    Route(RouteKind),
}

/// A processed policy with its resolved targets and ancestor entries.
#[derive(Clone, Debug)]
pub struct Policy {
    pub source: PolicySource,
    pub target_refs: Vec<PolicyTargetRef>,
    pub ancestors: Vec<PolicyAncestor>,
    pub conditions: Vec<Condition>,
    pub valid: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PolicyAncestor {
    pub gateway: ResourceId,
    pub conditions: Vec<Condition>,
}

/// Semantic validation and conflict detection, supplied by the caller.
pub trait PolicyValidator {
    /// Conditions invalidating the policy; empty means valid.
    fn validate(&self, policy: &PolicySource) -> Vec<Condition>;

    /// Whether two same-kind policies on one target clash.
    fn conflicts(&self, a: &PolicySource, b: &PolicySource) -> bool;
}

// === impl PolicySource ===

impl PolicySource {
    pub fn kind(&self) -> PolicyKind {
        match self {
            Self::ClientSettings(_) => PolicyKind::ClientSettings,
            Self::Observability(_) => PolicyKind::Observability,
        }
    }

    fn target_refs(&self) -> &[policy::LocalTargetRef] {
        match self {
            Self::ClientSettings(p) => &p.spec.target_refs,
            Self::Observability(p) => &p.spec.target_refs,
        }
    }

    fn creation_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::ClientSettings(p) => creation_timestamp(&p.metadata),
            Self::Observability(p) => creation_timestamp(&p.metadata),
        }
    }

    fn status_ancestors(&self) -> &[policy::PolicyAncestorStatus] {
        let status = match self {
            Self::ClientSettings(p) => p.status.as_ref(),
            Self::Observability(p) => p.status.as_ref(),
        };
        status.map_or(&[], |s| &s.ancestors)
    }
}

pub(crate) fn process_policies(
    client_settings: &AHashMap<ResourceId, policy::ClientSettingsPolicy>,
    observability: &AHashMap<ResourceId, policy::ObservabilityPolicy>,
    validator: &dyn PolicyValidator,
    gateways: &ProcessedGateways,
    routes: &AHashMap<RouteKey, L7Route>,
    controller_name: &str,
) -> AHashMap<PolicyKey, Policy> {
    let mut policies: AHashMap<PolicyKey, Policy> = AHashMap::default();

    let sources = client_settings
        .iter()
        .map(|(id, p)| (id.clone(), PolicySource::ClientSettings(p.clone())))
        .chain(
            observability
                .iter()
                .map(|(id, p)| (id.clone(), PolicySource::Observability(p.clone()))),
        );

    for (id, source) in sources {
        let target_refs = resolve_targets(&source, &id.namespace, gateways, routes);
        if target_refs.is_empty() {
            continue;
        }

        let conditions = validator.validate(&source);
        let valid = conditions.is_empty();
        policies.insert(
            PolicyKey {
                kind: source.kind(),
                id,
            },
            Policy {
                source,
                target_refs,
                ancestors: Vec::new(),
                conditions,
                valid,
            },
        );
    }

    mark_conflicted(&mut policies, validator);
    attach_ancestors(&mut policies, gateways, routes, controller_name);
    policies
}

/// Targets resolving to nothing this graph knows are dropped; a policy with
/// no remaining target does not exist for this build.
fn resolve_targets(
    source: &PolicySource,
    policy_ns: &str,
    gateways: &ProcessedGateways,
    routes: &AHashMap<RouteKey, L7Route>,
) -> Vec<PolicyTargetRef> {
    let mut refs = Vec::new();
    for target in source.target_refs() {
        let id = ResourceId::new(policy_ns.to_string(), target.name.clone());
        let kind = if target.targets_kind::<gateway::Gateway>() {
            TargetKind::Gateway
        } else if target.targets_kind::<gateway::HttpRoute>() {
            TargetKind::Route(RouteKind::Http)
        } else if target.targets_kind::<gateway::GrpcRoute>() {
            TargetKind::Route(RouteKind::Grpc)
        } else {
            continue;
        };

        let known = match kind {
            TargetKind::Gateway => gateways.knows(&id),
            TargetKind::Route(route_kind) => routes.contains_key(&RouteKey {
                kind: route_kind,
                id: id.clone(),
            }),
        };
        if !known {
            continue;
        }

        let target_ref = PolicyTargetRef { kind, id };
        if !refs.contains(&target_ref) {
            refs.push(target_ref);
        }
    }
    refs
}

/// Resolves same-target conflicts: within each (kind, target) group, walk
/// in precedence order and invalidate any policy clashing with any
/// still-valid earlier policy in the group.
fn mark_conflicted(policies: &mut AHashMap<PolicyKey, Policy>, validator: &dyn PolicyValidator) {
    let mut groups: AHashMap<(PolicyKind, PolicyTargetRef), Vec<PolicyKey>> = AHashMap::default();
    for (key, policy) in policies.iter() {
        if !policy.valid {
            continue;
        }
        for target in &policy.target_refs {
            groups
                .entry((key.kind, target.clone()))
                .or_default()
                .push(key.clone());
        }
    }

    // Invalidating a multi-target policy in one group changes the outcome
    // in its remaining groups, so the walk order over groups must be fixed.
    let mut groups: Vec<_> = groups.into_iter().collect();
    groups.sort_by(|(a, _), (b, _)| a.cmp(b));

    for (_, mut group) in groups {
        group.sort_by(|a, b| {
            winner_precedence(
                (&policies[a].source.creation_timestamp(), &a.id),
                (&policies[b].source.creation_timestamp(), &b.id),
            )
        });

        for later in 1..group.len() {
            if !policies[&group[later]].valid {
                continue;
            }
            let clash = group[..later].iter().any(|earlier| {
                policies[earlier].valid
                    && validator.conflicts(
                        &policies[earlier].source,
                        &policies[&group[later]].source,
                    )
            });
            if clash {
                if let Some(policy) = policies.get_mut(&group[later]) {
                    policy.valid = false;
                    policy.conditions.push(conditions::policy_conflicted(
                        "conflicts with another policy targeting the same resource".to_string(),
                    ));
                }
            }
        }
    }
}

fn attach_ancestors(
    policies: &mut AHashMap<PolicyKey, Policy>,
    gateways: &ProcessedGateways,
    routes: &AHashMap<RouteKey, L7Route>,
    controller_name: &str,
) {
    for (key, policy) in policies.iter_mut() {
        let foreign_ancestors = policy
            .source
            .status_ancestors()
            .iter()
            .filter(|a| a.controller_name != controller_name)
            .count();
        let has_own = foreign_ancestors < policy.source.status_ancestors().len();
        if policy.source.status_ancestors().len() >= POLICY_ANCESTOR_LIMIT && !has_own {
            tracing::warn!(
                policy = %key.id,
                limit = POLICY_ANCESTOR_LIMIT,
                "policy ancestor status is full; refusing attachment",
            );
            continue;
        }
        let budget = POLICY_ANCESTOR_LIMIT.saturating_sub(foreign_ancestors);

        let mut ancestors = Vec::new();
        for target in &policy.target_refs {
            match target.kind {
                TargetKind::Gateway => {
                    let conditions = if gateways.ignored.contains(&target.id) {
                        vec![conditions::policy_gateway_ignored()]
                    } else if policy.valid {
                        vec![conditions::policy_accepted()]
                    } else {
                        policy.conditions.clone()
                    };
                    push_ancestor(&mut ancestors, target.id.clone(), conditions, budget, key);
                }
                TargetKind::Route(route_kind) => {
                    let route = match routes.get(&RouteKey {
                        kind: route_kind,
                        id: target.id.clone(),
                    }) {
                        Some(route) => route,
                        None => continue,
                    };
                    for parent_ref in &route.parent_refs {
                        let attached = parent_ref
                            .attachment
                            .as_ref()
                            .map_or(false, |a| a.attached);
                        if !attached {
                            continue;
                        }
                        let conditions = if policy.valid {
                            vec![conditions::policy_accepted()]
                        } else {
                            policy.conditions.clone()
                        };
                        push_ancestor(
                            &mut ancestors,
                            parent_ref.gateway.clone(),
                            conditions,
                            budget,
                            key,
                        );
                    }
                }
            }
        }
        policy.ancestors = ancestors;
    }
}

fn push_ancestor(
    ancestors: &mut Vec<PolicyAncestor>,
    gateway: ResourceId,
    conditions: Vec<Condition>,
    budget: usize,
    key: &PolicyKey,
) {
    if ancestors.iter().any(|a| a.gateway == gateway) {
        return;
    }
    if ancestors.len() >= budget {
        tracing::warn!(
            policy = %key.id,
            %gateway,
            limit = POLICY_ANCESTOR_LIMIT,
            "policy ancestor status is full; skipping ancestor",
        );
        return;
    }
    ancestors.push(PolicyAncestor {
        gateway,
        conditions,
    });
}

/// The validation rules this controller ships for its own policy kinds.
pub struct StandardPolicyValidator;

impl PolicyValidator for StandardPolicyValidator {
    fn validate(&self, source: &PolicySource) -> Vec<Condition> {
        let mut conditions = Vec::new();
        match source {
            PolicySource::ClientSettings(p) => {
                if let Some(size) = &p.spec.max_body_size {
                    if !valid_size(size) {
                        conditions.push(conditions::policy_invalid(format!(
                            "maxBodySize must be a number with an optional k/m/g suffix, \
                             got {size:?}"
                        )));
                    }
                }
                if let Some(requests) = p.spec.keepalive_requests {
                    if requests <= 0 {
                        conditions.push(conditions::policy_invalid(format!(
                            "keepaliveRequests must be positive, got {requests}"
                        )));
                    }
                }
            }
            PolicySource::Observability(p) => {
                if let Some(ratio) = p.spec.tracing.as_ref().and_then(|t| t.ratio) {
                    if !(0..=100).contains(&ratio) {
                        conditions.push(conditions::policy_invalid(format!(
                            "tracing.ratio must be in [0, 100], got {ratio}"
                        )));
                    }
                }
                if p.spec
                    .target_refs
                    .iter()
                    .any(|t| t.targets_kind::<gateway::Gateway>())
                {
                    conditions.push(conditions::policy_invalid(
                        "ObservabilityPolicy cannot target a Gateway".to_string(),
                    ));
                }
            }
        }
        conditions
    }

    fn conflicts(&self, a: &PolicySource, b: &PolicySource) -> bool {
        a.kind() == b.kind()
    }
}

fn valid_size(size: &str) -> bool {
    let digits = size.trim_end_matches(['k', 'K', 'm', 'M', 'g', 'G']);
    !digits.is_empty()
        && size.len() - digits.len() <= 1
        && digits.chars().all(|c| c.is_ascii_digit())
}
