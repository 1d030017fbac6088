//! Route-to-listener binding.
//!
//! Binding runs in two phases: attachment results are computed for every
//! parent reference without touching any listener, then accepted bindings
//! are merged into the listeners' route sets in one pass. Listener state is
//! never mutated while routes are being traversed.

use crate::conditions;
use crate::error::InvariantViolation;
use crate::gateway::Gateway;
use crate::hostname;
use crate::listener::{AllowedRouteNamespaces, Listener};
use crate::resource_id::ResourceId;
use crate::routes::{BindableRoute, L4Route, L7Route, ParentRefAttachment, RouteKey};
use ahash::{AHashMap, AHashSet};
use stategraph_k8s_api::{Labels, Namespace};

pub(crate) fn bind_routes(
    gateway: &mut Option<Gateway>,
    ignored_gateways: &AHashSet<ResourceId>,
    routes: &mut AHashMap<RouteKey, L7Route>,
    l4_routes: &mut AHashMap<ResourceId, L4Route>,
    namespaces: &AHashMap<String, Namespace>,
) -> Result<(), InvariantViolation> {
    let mut bindings: Vec<(String, RouteKey)> = Vec::new();

    for route in routes.values_mut() {
        bind_route(route, gateway.as_ref(), ignored_gateways, namespaces, &mut bindings)?;
    }
    for route in l4_routes.values_mut() {
        bind_route(route, gateway.as_ref(), ignored_gateways, namespaces, &mut bindings)?;
    }

    // Merge phase: the only point where listener route sets change.
    if let Some(gateway) = gateway {
        let mut by_listener: AHashMap<String, Vec<RouteKey>> = AHashMap::default();
        for (listener_name, key) in bindings {
            by_listener.entry(listener_name).or_default().push(key);
        }
        for listener in &mut gateway.listeners {
            if let Some(mut keys) = by_listener.remove(&listener.name) {
                keys.sort();
                keys.dedup();
                listener.routes = keys;
            }
        }
    }

    Ok(())
}

fn bind_route<R: BindableRoute>(
    route: &mut R,
    gateway: Option<&Gateway>,
    ignored_gateways: &AHashSet<ResourceId>,
    namespaces: &AHashMap<String, Namespace>,
    bindings: &mut Vec<(String, RouteKey)>,
) -> Result<(), InvariantViolation> {
    if !route.is_attachable() {
        return Ok(());
    }

    let key = RouteKey {
        kind: route.kind(),
        id: route.id().clone(),
    };
    let kind = route.kind();
    let route_ns = route.id().namespace.clone();
    let route_hostnames = route.hostnames().to_vec();

    for parent_ref in route.parent_refs_mut() {
        let winner = match gateway {
            Some(gateway) if gateway.id == parent_ref.gateway => gateway,
            _ => {
                if ignored_gateways.contains(&parent_ref.gateway) {
                    parent_ref.attachment = Some(ParentRefAttachment {
                        attached: false,
                        accepted_hostnames: Default::default(),
                        failed_conditions: vec![conditions::route_gateway_ignored()],
                    });
                }
                continue;
            }
        };

        if !winner.valid {
            parent_ref.attachment = Some(ParentRefAttachment {
                attached: false,
                accepted_hostnames: Default::default(),
                failed_conditions: vec![conditions::route_invalid_gateway()],
            });
            continue;
        }

        let mut attachment = ParentRefAttachment::default();

        let candidates: Vec<&Listener> = match &parent_ref.section_name {
            Some(section) => winner
                .listeners
                .iter()
                .filter(|l| &l.name == section && l.attachable)
                .collect(),
            None => winner.listeners.iter().filter(|l| l.attachable).collect(),
        };

        if candidates.is_empty() {
            attachment
                .failed_conditions
                .push(conditions::route_no_matching_parent());
            parent_ref.attachment = Some(attachment);
            continue;
        }

        let mut bound_to_valid = false;
        for listener in candidates {
            if !listener.supported_kinds.contains(&kind) {
                push_unique(
                    &mut attachment.failed_conditions,
                    conditions::route_not_allowed_by_listeners(),
                );
                continue;
            }

            if !namespace_allowed(listener, &winner.id, &route_ns, namespaces)? {
                push_unique(
                    &mut attachment.failed_conditions,
                    conditions::route_not_allowed_by_listeners(),
                );
                continue;
            }

            let accepted =
                find_accepted_hostnames(listener.source.hostname.as_deref(), &route_hostnames);
            if accepted.is_empty() {
                push_unique(
                    &mut attachment.failed_conditions,
                    conditions::route_no_matching_listener_hostname(),
                );
                continue;
            }

            attachment.attached = true;
            bound_to_valid = bound_to_valid || listener.valid;
            attachment
                .accepted_hostnames
                .insert(listener.name.clone(), accepted);
            bindings.push((listener.name.clone(), key.clone()));
        }

        if attachment.attached {
            attachment.failed_conditions.clear();
            if !bound_to_valid {
                attachment
                    .failed_conditions
                    .push(conditions::route_invalid_listener());
            }
        }
        parent_ref.attachment = Some(attachment);
    }

    Ok(())
}

fn namespace_allowed(
    listener: &Listener,
    gateway_id: &ResourceId,
    route_ns: &str,
    namespaces: &AHashMap<String, Namespace>,
) -> Result<bool, InvariantViolation> {
    match &listener.allowed_namespaces {
        AllowedRouteNamespaces::All => Ok(true),
        AllowedRouteNamespaces::Same => Ok(route_ns == gateway_id.namespace),
        AllowedRouteNamespaces::Selector(selector) => {
            let namespace = namespaces.get(route_ns).ok_or_else(|| {
                InvariantViolation::NamespaceNotFound {
                    namespace: route_ns.to_string(),
                }
            })?;
            let labels = Labels::from(namespace.metadata.labels.clone());
            Ok(selector.matches(&labels))
        }
    }
}

/// Intersects a listener hostname with a route's hostnames.
///
/// Two hostname-less sides meet at the global wildcard marker; a
/// hostname-less route inherits the listener hostname; otherwise each
/// matching route hostname is narrowed to the more specific side.
fn find_accepted_hostnames(listener: Option<&str>, route_hostnames: &[String]) -> Vec<String> {
    match listener {
        None if route_hostnames.is_empty() => vec![hostname::WILDCARD.to_string()],
        None => route_hostnames.to_vec(),
        Some(listener) if route_hostnames.is_empty() => vec![listener.to_string()],
        Some(listener) => route_hostnames
            .iter()
            .filter(|route| hostname::matches(listener, route))
            .map(|route| hostname::more_specific(route, listener).to_string())
            .collect(),
    }
}

fn push_unique(conditions: &mut Vec<conditions::Condition>, condition: conditions::Condition) {
    if !conditions.contains(&condition) {
        conditions.push(condition);
    }
}
