//! Listener validation and conflict resolution.
//!
//! Validators are plain functions over the listener spec and read-only
//! config, so their outcome cannot depend on evaluation order. Conflict
//! detection, which is inherently stateful across the listeners of one
//! gateway, lives in an explicit resolver object instead.

use crate::conditions::{self, Condition};
use crate::error::InvariantViolation;
use crate::reference_grant::{FromResource, ReferenceGrantResolver, ToResource};
use crate::resource_id::ResourceId;
use crate::routes::{RouteKey, RouteKind};
use crate::secrets::SecretResolver;
use ahash::{AHashMap, AHashSet};
use stategraph_k8s_api::{gateway, Selector};

const PROTOCOL_HTTP: &str = "HTTP";
const PROTOCOL_HTTPS: &str = "HTTPS";
const PROTOCOL_TLS: &str = "TLS";

const GATEWAY_GROUP: &str = "gateway.networking.k8s.io";

/// A validated listener of the winning gateway.
#[derive(Clone, Debug)]
pub struct Listener {
    pub name: String,
    pub source: gateway::Listener,
    pub supported_kinds: Vec<RouteKind>,
    pub allowed_namespaces: AllowedRouteNamespaces,
    /// The TLS secret this listener terminates with, once resolved.
    pub resolved_secret: Option<ResourceId>,
    /// Routes bound to this listener; filled during binding, sorted.
    pub routes: Vec<RouteKey>,
    pub conditions: Vec<Condition>,
    pub valid: bool,
    pub attachable: bool,
}

#[derive(Clone, Debug)]
pub enum AllowedRouteNamespaces {
    All,
    Same,
    Selector(Selector),
}

/// Read-only configuration the stateless validators run against.
pub(crate) struct ListenerValidationCtx<'a> {
    /// Ports the data plane reserves for itself, keyed to the consumer name.
    pub protected_ports: &'a AHashMap<u16, String>,
}

type Validator = fn(&ListenerValidationCtx<'_>, &gateway::Listener) -> Vec<Condition>;

const VALIDATORS: &[Validator] = &[
    validate_protocol,
    validate_port,
    validate_hostname,
    validate_route_kinds,
    validate_namespace_policy,
];

pub(crate) fn build_listeners(
    gateway_id: &ResourceId,
    listeners: Vec<gateway::Listener>,
    ctx: &ListenerValidationCtx<'_>,
    secrets: &mut SecretResolver<'_>,
    grants: &ReferenceGrantResolver,
) -> Result<Vec<Listener>, InvariantViolation> {
    let mut built = Vec::with_capacity(listeners.len());
    for source in listeners {
        ensure_tls_invariants(&source)?;

        let mut conditions = Vec::new();
        for validator in VALIDATORS {
            conditions.extend(validator(ctx, &source));
        }

        let supported_kinds = supported_route_kinds(&source);
        let allowed_namespaces = allowed_route_namespaces(&source);

        built.push(Listener {
            name: source.name.clone(),
            source,
            supported_kinds,
            allowed_namespaces,
            resolved_secret: None,
            routes: Vec::new(),
            conditions,
            valid: true,
            attachable: true,
        });
    }

    resolve_port_protocol_conflicts(&mut built);
    resolve_hostname_conflicts(&mut built);
    resolve_certificate_refs(gateway_id, &mut built, secrets, grants);

    for listener in &mut built {
        listener.valid = !listener.conditions.iter().any(Condition::is_negative);
        listener.attachable = !listener.conditions.iter().any(|c| {
            (c.type_ == conditions::ACCEPTED && !c.status)
                || (c.type_ == conditions::CONFLICTED && c.status)
        });
        if listener.valid {
            listener.conditions = conditions::listener_defaults();
        }
    }

    Ok(built)
}

/// Contract the admission layer owes us; a breach aborts the build.
fn ensure_tls_invariants(listener: &gateway::Listener) -> Result<(), InvariantViolation> {
    match listener.protocol.as_str() {
        PROTOCOL_HTTPS | PROTOCOL_TLS => {
            let tls = listener
                .tls
                .as_ref()
                .ok_or_else(|| InvariantViolation::MissingTlsConfig {
                    listener: listener.name.clone(),
                    protocol: listener.protocol.clone(),
                })?;
            if listener.protocol == PROTOCOL_HTTPS
                && tls.certificate_refs.as_ref().map_or(true, Vec::is_empty)
            {
                return Err(InvariantViolation::MissingCertificateRefs {
                    listener: listener.name.clone(),
                });
            }
        }
        PROTOCOL_HTTP if listener.tls.is_some() => {
            return Err(InvariantViolation::UnexpectedTlsConfig {
                listener: listener.name.clone(),
            });
        }
        _ => {}
    }
    Ok(())
}

// === Stateless validators ===

fn validate_protocol(
    _ctx: &ListenerValidationCtx<'_>,
    listener: &gateway::Listener,
) -> Vec<Condition> {
    match listener.protocol.as_str() {
        PROTOCOL_HTTP => Vec::new(),
        PROTOCOL_HTTPS => match tls_mode(listener) {
            Some("Terminate") | None => Vec::new(),
            Some(mode) => conditions::listener_unsupported_value(format!(
                "HTTPS listeners must terminate TLS, got mode {mode:?}"
            )),
        },
        PROTOCOL_TLS => match tls_mode(listener) {
            Some("Passthrough") | None => Vec::new(),
            Some(mode) => conditions::listener_unsupported_value(format!(
                "TLS listeners must use Passthrough mode, got mode {mode:?}"
            )),
        },
        protocol => conditions::listener_unsupported_protocol(format!(
            "unsupported protocol {protocol:?}"
        )),
    }
}

fn validate_port(ctx: &ListenerValidationCtx<'_>, listener: &gateway::Listener) -> Vec<Condition> {
    match ctx.protected_ports.get(&listener.port) {
        Some(owner) => conditions::listener_unsupported_value(format!(
            "port {} is reserved for {owner}",
            listener.port,
        )),
        None => Vec::new(),
    }
}

fn validate_hostname(
    _ctx: &ListenerValidationCtx<'_>,
    listener: &gateway::Listener,
) -> Vec<Condition> {
    match &listener.hostname {
        Some(hostname) => match crate::hostname::validate(hostname) {
            Ok(()) => Vec::new(),
            Err(e) => conditions::listener_unsupported_value(format!(
                "invalid hostname {hostname:?}: {e}"
            )),
        },
        None => Vec::new(),
    }
}

fn validate_route_kinds(
    _ctx: &ListenerValidationCtx<'_>,
    listener: &gateway::Listener,
) -> Vec<Condition> {
    let invalid: Vec<String> = declared_kinds(listener)
        .filter(|gk| kind_for(listener, gk).is_none())
        .map(|gk| gk.kind.clone())
        .collect();

    if invalid.is_empty() {
        Vec::new()
    } else {
        conditions::listener_invalid_route_kinds(format!(
            "unsupported route kinds for protocol {}: {}",
            listener.protocol,
            invalid.join(", "),
        ))
    }
}

fn validate_namespace_policy(
    _ctx: &ListenerValidationCtx<'_>,
    listener: &gateway::Listener,
) -> Vec<Condition> {
    let namespaces = match listener
        .allowed_routes
        .as_ref()
        .and_then(|ar| ar.namespaces.as_ref())
    {
        Some(ns) => ns,
        None => return Vec::new(),
    };

    match namespaces.from.as_deref() {
        Some("All") | Some("Same") | None => Vec::new(),
        Some("Selector") => match &namespaces.selector {
            None => conditions::listener_unsupported_value(
                "allowedRoutes.namespaces.from is Selector but no selector is given".to_string(),
            ),
            Some(selector) => match Selector::try_from(selector.clone()) {
                Ok(_) => Vec::new(),
                Err(e) => conditions::listener_unsupported_value(format!(
                    "invalid allowedRoutes namespace selector: {e}"
                )),
            },
        },
        Some(from) => conditions::listener_unsupported_value(format!(
            "unsupported allowedRoutes.namespaces.from value {from:?}"
        )),
    }
}

// === Derived listener attributes ===

fn default_kinds(protocol: &str) -> &'static [RouteKind] {
    match protocol {
        PROTOCOL_HTTP | PROTOCOL_HTTPS => &[RouteKind::Http, RouteKind::Grpc],
        PROTOCOL_TLS => &[RouteKind::Tls],
        _ => &[],
    }
}

fn declared_kinds(listener: &gateway::Listener) -> impl Iterator<Item = &gateway::RouteGroupKind> {
    listener
        .allowed_routes
        .iter()
        .flat_map(|ar| ar.kinds.iter().flatten())
}

fn kind_for(listener: &gateway::Listener, gk: &gateway::RouteGroupKind) -> Option<RouteKind> {
    if gk.group.as_deref().map_or(false, |g| g != GATEWAY_GROUP) {
        return None;
    }
    default_kinds(&listener.protocol)
        .iter()
        .copied()
        .find(|kind| kind.kind_str() == gk.kind)
}

fn supported_route_kinds(listener: &gateway::Listener) -> Vec<RouteKind> {
    let declared: Vec<RouteKind> = declared_kinds(listener)
        .filter_map(|gk| kind_for(listener, gk))
        .collect();
    if declared.is_empty() && declared_kinds(listener).next().is_none() {
        default_kinds(&listener.protocol).to_vec()
    } else {
        declared
    }
}

fn allowed_route_namespaces(listener: &gateway::Listener) -> AllowedRouteNamespaces {
    let namespaces = match listener
        .allowed_routes
        .as_ref()
        .and_then(|ar| ar.namespaces.as_ref())
    {
        Some(ns) => ns,
        None => return AllowedRouteNamespaces::Same,
    };
    match namespaces.from.as_deref() {
        Some("All") => AllowedRouteNamespaces::All,
        Some("Selector") => namespaces
            .selector
            .clone()
            .and_then(|s| Selector::try_from(s).ok())
            .map(AllowedRouteNamespaces::Selector)
            // The validator has already recorded the condition.
            .unwrap_or(AllowedRouteNamespaces::Same),
        _ => AllowedRouteNamespaces::Same,
    }
}

fn tls_mode(listener: &gateway::Listener) -> Option<&str> {
    listener.tls.as_ref().and_then(|tls| tls.mode.as_deref())
}

fn is_secure(protocol: &str) -> bool {
    matches!(protocol, PROTOCOL_HTTPS | PROTOCOL_TLS)
}

// === Conflict resolution ===

/// Tracks port usage across the listeners of one gateway.
///
/// The first pair of listeners sharing a port across the secure/insecure
/// protocol split conflicts that port retroactively; every later listener
/// on a conflicted port is rejected without re-inspecting earlier ones.
#[derive(Default)]
struct PortProtocolConflicts {
    port_secure: AHashMap<u16, bool>,
    conflicted_ports: AHashSet<u16>,
    listeners_by_port: AHashMap<u16, Vec<usize>>,
}

impl PortProtocolConflicts {
    /// Records a listener and returns the indices newly in conflict.
    fn observe(&mut self, idx: usize, port: u16, secure: bool) -> Vec<usize> {
        if self.conflicted_ports.contains(&port) {
            return vec![idx];
        }

        let newly_conflicted = match self.port_secure.get(&port) {
            None => {
                self.port_secure.insert(port, secure);
                Vec::new()
            }
            Some(&existing) if existing == secure => Vec::new(),
            Some(_) => {
                self.conflicted_ports.insert(port);
                let mut all = self.listeners_by_port.remove(&port).unwrap_or_default();
                all.push(idx);
                all
            }
        };

        if newly_conflicted.is_empty() {
            self.listeners_by_port.entry(port).or_default().push(idx);
        }
        newly_conflicted
    }
}

fn resolve_port_protocol_conflicts(listeners: &mut [Listener]) {
    let mut conflicts = PortProtocolConflicts::default();
    let mut conflicted = Vec::new();

    for (idx, listener) in listeners.iter().enumerate() {
        if !listener.conditions.is_empty() {
            continue;
        }
        conflicted.extend(conflicts.observe(
            idx,
            listener.source.port,
            is_secure(&listener.source.protocol),
        ));
    }

    for idx in conflicted {
        let port = listeners[idx].source.port;
        listeners[idx]
            .conditions
            .extend(conditions::listener_protocol_conflict(format!(
                "listeners on port {port} use conflicting protocols"
            )));
    }
}

/// Where an HTTPS and a TLS listener share a port, overlapping hostnames
/// invalidate both sides. Same-protocol listeners may overlap; route
/// matching disambiguates them.
fn resolve_hostname_conflicts(listeners: &mut [Listener]) {
    let candidates: Vec<usize> = listeners
        .iter()
        .enumerate()
        .filter(|(_, l)| l.conditions.is_empty() && is_secure(&l.source.protocol))
        .map(|(idx, _)| idx)
        .collect();

    let mut conflicted = AHashSet::default();
    for (i, &a) in candidates.iter().enumerate() {
        for &b in &candidates[i + 1..] {
            if listeners[a].source.port != listeners[b].source.port
                || listeners[a].source.protocol == listeners[b].source.protocol
            {
                continue;
            }
            if crate::hostname::overlap(
                listeners[a].source.hostname.as_deref(),
                listeners[b].source.hostname.as_deref(),
            ) {
                conflicted.insert(a);
                conflicted.insert(b);
            }
        }
    }

    for idx in conflicted {
        let hostname = listeners[idx].source.hostname.clone().unwrap_or_default();
        let port = listeners[idx].source.port;
        listeners[idx]
            .conditions
            .extend(conditions::listener_hostname_conflict(format!(
                "hostname {hostname:?} overlaps another listener on port {port}"
            )));
    }
}

fn resolve_certificate_refs(
    gateway_id: &ResourceId,
    listeners: &mut [Listener],
    secrets: &mut SecretResolver<'_>,
    grants: &ReferenceGrantResolver,
) {
    for listener in listeners {
        if !listener.conditions.is_empty() || listener.source.protocol != PROTOCOL_HTTPS {
            continue;
        }
        // Non-empty per the admission invariant checked up front.
        let cert_ref = match listener
            .source
            .tls
            .as_ref()
            .and_then(|tls| tls.certificate_refs.as_ref())
            .and_then(|refs| refs.first())
        {
            Some(cert_ref) => cert_ref,
            None => continue,
        };

        if cert_ref.kind.as_deref().map_or(false, |k| k != "Secret")
            || cert_ref
                .group
                .as_deref()
                .map_or(false, |g| !g.is_empty() && g != "core")
        {
            listener
                .conditions
                .extend(conditions::listener_invalid_certificate_ref(format!(
                    "certificate ref {:?} must reference a core Secret",
                    cert_ref.name,
                )));
            continue;
        }

        let secret_id = ResourceId::new(
            cert_ref
                .namespace
                .clone()
                .unwrap_or_else(|| gateway_id.namespace.clone()),
            cert_ref.name.clone(),
        );

        if secret_id.namespace != gateway_id.namespace
            && !grants.is_allowed(
                &ToResource::secret(&secret_id),
                &FromResource::gateway(&gateway_id.namespace),
            )
        {
            listener
                .conditions
                .extend(conditions::listener_ref_not_permitted(format!(
                    "reference to secret {secret_id} is not permitted by any ReferenceGrant"
                )));
            continue;
        }

        match secrets.resolve(&secret_id) {
            Ok(()) => listener.resolved_secret = Some(secret_id),
            Err(e) => {
                listener
                    .conditions
                    .extend(conditions::listener_invalid_certificate_ref(e));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stategraph_k8s_api::{ByteString, LabelSelector, Secret};

    fn listener(name: &str, port: u16, protocol: &str) -> gateway::Listener {
        let tls = match protocol {
            PROTOCOL_HTTPS => Some(gateway::GatewayTlsConfig {
                mode: Some("Terminate".to_string()),
                certificate_refs: Some(vec![gateway::SecretObjectReference {
                    group: None,
                    kind: None,
                    name: "cert".to_string(),
                    namespace: None,
                }]),
                options: None,
            }),
            PROTOCOL_TLS => Some(gateway::GatewayTlsConfig {
                mode: Some("Passthrough".to_string()),
                certificate_refs: None,
                options: None,
            }),
            _ => None,
        };
        gateway::Listener {
            name: name.to_string(),
            hostname: None,
            port,
            protocol: protocol.to_string(),
            tls,
            allowed_routes: None,
        }
    }

    fn tls_secret(ns: &str) -> (ResourceId, Secret) {
        let data = ["tls.crt", "tls.key"]
            .iter()
            .map(|k| (k.to_string(), ByteString(b"pem".to_vec())))
            .collect();
        (
            ResourceId::new(ns.to_string(), "cert".to_string()),
            Secret {
                type_: Some("kubernetes.io/tls".to_string()),
                data: Some(data),
                ..Default::default()
            },
        )
    }

    fn build(
        listeners: Vec<gateway::Listener>,
        protected_ports: AHashMap<u16, String>,
    ) -> Vec<Listener> {
        let gateway_id = ResourceId::new("apps".to_string(), "gateway".to_string());
        let mut secrets = AHashMap::default();
        let (id, secret) = tls_secret("apps");
        secrets.insert(id, secret);
        let mut resolver = SecretResolver::new(&secrets);
        let grants = ReferenceGrantResolver::new(&AHashMap::default());
        build_listeners(
            &gateway_id,
            listeners,
            &ListenerValidationCtx {
                protected_ports: &protected_ports,
            },
            &mut resolver,
            &grants,
        )
        .expect("invariants hold")
    }

    #[test]
    fn valid_listeners_get_default_conditions() {
        let built = build(
            vec![listener("http", 80, PROTOCOL_HTTP), listener("https", 443, PROTOCOL_HTTPS)],
            AHashMap::default(),
        );
        for l in &built {
            assert!(l.valid, "{}", l.name);
            assert!(l.attachable, "{}", l.name);
            assert_eq!(l.conditions, conditions::listener_defaults(), "{}", l.name);
        }
        assert_eq!(
            built[1].resolved_secret,
            Some(ResourceId::new("apps".to_string(), "cert".to_string())),
        );
    }

    #[test]
    fn port_conflict_invalidates_both_sides_and_later_listeners() {
        let built = build(
            vec![
                listener("a", 80, PROTOCOL_HTTP),
                listener("b", 80, PROTOCOL_HTTPS),
                listener("c", 80, PROTOCOL_HTTP),
            ],
            AHashMap::default(),
        );
        for l in &built {
            assert!(!l.valid, "{}", l.name);
            assert!(!l.attachable, "{}", l.name);
            assert!(
                l.conditions.iter().any(|c| c.reason == "ProtocolConflict"),
                "{}",
                l.name,
            );
        }
    }

    #[test]
    fn same_group_listeners_share_a_port() {
        let mut https_alt = listener("https-alt", 443, PROTOCOL_HTTPS);
        https_alt.hostname = Some("alt.example.com".to_string());
        let mut https = listener("https", 443, PROTOCOL_HTTPS);
        https.hostname = Some("main.example.com".to_string());
        let built = build(vec![https, https_alt], AHashMap::default());
        assert!(built.iter().all(|l| l.valid));
    }

    #[test]
    fn overlapping_hostnames_across_protocols_conflict() {
        let mut a = listener("a", 443, PROTOCOL_HTTPS);
        a.hostname = Some("*.example.com".to_string());
        let mut b = listener("b", 443, PROTOCOL_TLS);
        b.hostname = Some("cafe.example.com".to_string());
        let built = build(vec![a, b], AHashMap::default());
        for l in &built {
            assert!(!l.valid, "{}", l.name);
            assert!(
                l.conditions.iter().any(|c| c.reason == "HostnameConflict"),
                "{}",
                l.name,
            );
        }
    }

    #[test]
    fn overlapping_hostnames_within_one_protocol_are_valid() {
        let mut a = listener("a", 443, PROTOCOL_HTTPS);
        a.hostname = Some("*.example.com".to_string());
        let mut b = listener("b", 443, PROTOCOL_HTTPS);
        b.hostname = Some("cafe.example.com".to_string());
        let built = build(vec![a, b], AHashMap::default());
        for l in &built {
            assert!(l.valid, "{}", l.name);
            assert!(l.attachable, "{}", l.name);
        }
    }

    #[test]
    fn protected_port_is_rejected() {
        let protected = [(9113u16, "metrics".to_string())].into_iter().collect();
        let built = build(vec![listener("http", 9113, PROTOCOL_HTTP)], protected);
        assert!(!built[0].valid);
        assert!(!built[0].attachable);
        assert!(built[0].conditions.iter().any(|c| c.message.contains("metrics")));
    }

    #[test]
    fn invalid_route_kind_keeps_listener_attachable() {
        let mut l = listener("http", 80, PROTOCOL_HTTP);
        l.allowed_routes = Some(gateway::AllowedRoutes {
            namespaces: None,
            kinds: Some(vec![gateway::RouteGroupKind {
                group: None,
                kind: "TLSRoute".to_string(),
            }]),
        });
        let built = build(vec![l], AHashMap::default());
        assert!(!built[0].valid);
        assert!(built[0].attachable);
        assert!(built[0].supported_kinds.is_empty());
    }

    #[test]
    fn cross_namespace_cert_requires_grant() {
        let mut l = listener("https", 443, PROTOCOL_HTTPS);
        l.tls.as_mut().unwrap().certificate_refs.as_mut().unwrap()[0].namespace =
            Some("certs".to_string());
        let built = build(vec![l], AHashMap::default());
        assert!(!built[0].valid);
        assert!(built[0].attachable);
        assert!(built[0].conditions.iter().any(|c| c.reason == "RefNotPermitted"));
    }

    #[test]
    fn selector_policy_parses() {
        let mut l = listener("http", 80, PROTOCOL_HTTP);
        l.allowed_routes = Some(gateway::AllowedRoutes {
            namespaces: Some(gateway::RouteNamespaces {
                from: Some("Selector".to_string()),
                selector: Some(LabelSelector {
                    match_labels: Some(
                        [("team".to_string(), "cafe".to_string())].into_iter().collect(),
                    ),
                    match_expressions: None,
                }),
            }),
            kinds: None,
        });
        let built = build(vec![l], AHashMap::default());
        assert!(built[0].valid);
        assert!(matches!(
            built[0].allowed_namespaces,
            AllowedRouteNamespaces::Selector(_)
        ));
    }

    #[test]
    fn missing_tls_config_is_an_invariant_breach() {
        let mut l = listener("https", 443, PROTOCOL_HTTPS);
        l.tls = None;
        let gateway_id = ResourceId::new("apps".to_string(), "gateway".to_string());
        let secrets = AHashMap::default();
        let mut resolver = SecretResolver::new(&secrets);
        let grants = ReferenceGrantResolver::new(&AHashMap::default());
        let err = build_listeners(
            &gateway_id,
            vec![l],
            &ListenerValidationCtx {
                protected_ports: &AHashMap::default(),
            },
            &mut resolver,
            &grants,
        )
        .unwrap_err();
        assert_eq!(
            err,
            InvariantViolation::MissingTlsConfig {
                listener: "https".to_string(),
                protocol: "HTTPS".to_string(),
            },
        );
    }

    #[test]
    fn validator_outcome_is_order_independent() {
        let mut l = listener("bad", 9113, "WS");
        l.hostname = Some("*".to_string());
        let ctx = ListenerValidationCtx {
            protected_ports: &[(9113u16, "metrics".to_string())].into_iter().collect(),
        };

        let forward: Vec<Condition> = VALIDATORS.iter().flat_map(|v| v(&ctx, &l)).collect();
        let mut reversed: Vec<Condition> =
            VALIDATORS.iter().rev().flat_map(|v| v(&ctx, &l)).collect();

        let key = |c: &Condition| (c.type_, c.reason, c.message.clone());
        let mut forward_sorted = forward;
        forward_sorted.sort_by_key(key);
        reversed.sort_by_key(key);
        assert_eq!(forward_sorted, reversed);
    }
}
