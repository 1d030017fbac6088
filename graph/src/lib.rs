//! Gateway API state resolution.
//!
//! This crate turns one snapshot of watched cluster resources into a
//! resolved routing graph: the winning GatewayClass and Gateway, validated
//! listeners, bound routes with resolved backends, and attached policies.
//! Every acceptance decision is recorded as a status condition on the
//! object it concerns; only broken admission-layer invariants abort a
//! build.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod backend_tls;
mod backends;
mod bind;
pub mod conditions;
mod error;
mod filters;
mod gateway;
mod gatewayclass;
mod graph;
mod hostname;
mod listener;
mod policies;
mod reference_grant;
mod resource_id;
mod routes;
mod secrets;

pub use self::backend_tls::BackendTlsPolicy;
pub use self::backends::{DEFAULT_WEIGHT, WEIGHT_MAX, WEIGHT_MIN};
pub use self::error::InvariantViolation;
pub use self::filters::{
    Filter, Header, HeaderModifier, PathModifier, RequestMirror, RequestRedirect,
    ResolvedExtensionFilter, UrlRewrite,
};
pub use self::gateway::Gateway;
pub use self::gatewayclass::GatewayClass;
pub use self::graph::{build_graph, ClusterState, ControllerConfig, Graph};
pub use self::listener::{AllowedRouteNamespaces, Listener};
pub use self::policies::{
    Policy, PolicyAncestor, PolicyKey, PolicyKind, PolicySource, PolicyTargetRef, PolicyValidator,
    StandardPolicyValidator, TargetKind, POLICY_ANCESTOR_LIMIT,
};
pub use self::resource_id::ResourceId;
pub use self::routes::{
    HeaderMatch, L4Route, L7Route, ParentRef, ParentRefAttachment, PathMatch, QueryParamMatch,
    RouteBackendRef, RouteKey, RouteKind, RouteMatch, RouteRule,
};
