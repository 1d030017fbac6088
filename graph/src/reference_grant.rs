//! Authorization index over ReferenceGrant objects.

use crate::resource_id::ResourceId;
use crate::routes::RouteKind;
use ahash::{AHashMap, AHashSet};
use stategraph_k8s_api::gateway;

const GATEWAY_GROUP: &str = "gateway.networking.k8s.io";

/// Answers whether a cross-namespace reference is permitted. Purely a set
/// lookup; building the index swallows nothing and errors nothing.
pub struct ReferenceGrantResolver {
    allowed: AHashSet<(ToResource, FromResource)>,
}

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct ToResource {
    group: String,
    kind: String,
    /// Empty means the grant covers every resource of this kind in the
    /// target namespace.
    name: String,
    namespace: String,
}

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct FromResource {
    group: String,
    kind: String,
    namespace: String,
}

// === impl ToResource ===

impl ToResource {
    pub fn secret(id: &ResourceId) -> Self {
        Self {
            group: String::new(),
            kind: "Secret".to_string(),
            name: id.name.clone(),
            namespace: id.namespace.clone(),
        }
    }

    pub fn service(id: &ResourceId) -> Self {
        Self {
            group: String::new(),
            kind: "Service".to_string(),
            name: id.name.clone(),
            namespace: id.namespace.clone(),
        }
    }

    fn namespace_wide(&self) -> Self {
        Self {
            name: String::new(),
            ..self.clone()
        }
    }
}

// === impl FromResource ===

impl FromResource {
    pub fn gateway(namespace: &str) -> Self {
        Self {
            group: GATEWAY_GROUP.to_string(),
            kind: "Gateway".to_string(),
            namespace: namespace.to_string(),
        }
    }

    pub fn route(kind: RouteKind, namespace: &str) -> Self {
        Self {
            group: GATEWAY_GROUP.to_string(),
            kind: kind.kind_str().to_string(),
            namespace: namespace.to_string(),
        }
    }
}

// === impl ReferenceGrantResolver ===

impl ReferenceGrantResolver {
    pub fn new(grants: &AHashMap<ResourceId, gateway::ReferenceGrant>) -> Self {
        let mut allowed = AHashSet::default();

        for (id, grant) in grants {
            for to in &grant.spec.to {
                let to = ToResource {
                    group: normalize_group(&to.group),
                    kind: to.kind.clone(),
                    name: to.name.clone().unwrap_or_default(),
                    namespace: id.namespace.clone(),
                };
                for from in &grant.spec.from {
                    let from = FromResource {
                        group: normalize_group(&from.group),
                        kind: from.kind.clone(),
                        namespace: from.namespace.clone(),
                    };
                    allowed.insert((to.clone(), from));
                }
            }
        }

        Self { allowed }
    }

    /// Checks whether the reference from `from` to `to` is allowed, either
    /// by a grant naming the resource or by a namespace-wide grant.
    pub fn is_allowed(&self, to: &ToResource, from: &FromResource) -> bool {
        self.allowed.contains(&(to.clone(), from.clone()))
            || self
                .allowed
                .contains(&(to.namespace_wide(), from.clone()))
    }
}

fn normalize_group(group: &str) -> String {
    if group.eq_ignore_ascii_case("core") {
        String::new()
    } else {
        group.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stategraph_k8s_api::ObjectMeta;

    fn grant(
        ns: &str,
        name: &str,
        to: Vec<gateway::ReferenceGrantTo>,
        from: Vec<gateway::ReferenceGrantFrom>,
    ) -> (ResourceId, gateway::ReferenceGrant) {
        (
            ResourceId::new(ns.to_string(), name.to_string()),
            gateway::ReferenceGrant {
                metadata: ObjectMeta {
                    namespace: Some(ns.to_string()),
                    name: Some(name.to_string()),
                    ..Default::default()
                },
                spec: gateway::ReferenceGrantSpec { to, from },
            },
        )
    }

    fn to_secret(name: Option<&str>) -> gateway::ReferenceGrantTo {
        gateway::ReferenceGrantTo {
            group: "core".to_string(),
            kind: "Secret".to_string(),
            name: name.map(|n| n.to_string()),
        }
    }

    fn from_gateway(ns: &str) -> gateway::ReferenceGrantFrom {
        gateway::ReferenceGrantFrom {
            group: "gateway.networking.k8s.io".to_string(),
            kind: "Gateway".to_string(),
            namespace: ns.to_string(),
        }
    }

    #[test]
    fn name_specific_grant() {
        let mut grants = AHashMap::default();
        let (id, g) = grant(
            "certs",
            "grant",
            vec![to_secret(Some("wildcard-cert"))],
            vec![from_gateway("gw-ns")],
        );
        grants.insert(id, g);
        let resolver = ReferenceGrantResolver::new(&grants);

        let from = FromResource::gateway("gw-ns");
        let allowed = ResourceId::new("certs".to_string(), "wildcard-cert".to_string());
        let denied = ResourceId::new("certs".to_string(), "other-cert".to_string());

        assert!(resolver.is_allowed(&ToResource::secret(&allowed), &from));
        assert!(!resolver.is_allowed(&ToResource::secret(&denied), &from));
        assert!(!resolver.is_allowed(
            &ToResource::secret(&allowed),
            &FromResource::gateway("other-ns")
        ));
    }

    #[test]
    fn namespace_wide_grant() {
        let mut grants = AHashMap::default();
        let (id, g) = grant(
            "certs",
            "grant",
            vec![to_secret(None)],
            vec![from_gateway("gw-ns")],
        );
        grants.insert(id, g);
        let resolver = ReferenceGrantResolver::new(&grants);

        let from = FromResource::gateway("gw-ns");
        for name in ["a", "b", "c"] {
            let id = ResourceId::new("certs".to_string(), name.to_string());
            assert!(resolver.is_allowed(&ToResource::secret(&id), &from), "{name}");
        }
    }

    #[test]
    fn core_group_normalized() {
        let mut grants = AHashMap::default();
        let (id, mut g) = grant(
            "backends",
            "grant",
            vec![gateway::ReferenceGrantTo {
                group: String::new(),
                kind: "Service".to_string(),
                name: None,
            }],
            vec![gateway::ReferenceGrantFrom {
                group: "gateway.networking.k8s.io".to_string(),
                kind: "HTTPRoute".to_string(),
                namespace: "apps".to_string(),
            }],
        );
        g.spec.to[0].group = "core".to_string();
        grants.insert(id, g);
        let resolver = ReferenceGrantResolver::new(&grants);

        let svc = ResourceId::new("backends".to_string(), "svc".to_string());
        assert!(resolver.is_allowed(
            &ToResource::service(&svc),
            &FromResource::route(RouteKind::Http, "apps")
        ));
    }
}
