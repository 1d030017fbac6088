//! Gateway API types.
//!
//! Re-exports the `k8s-gateway-api` surface and fills in the kinds the
//! crate does not ship as full resources: `GRPCRoute`, and `ReferenceGrant`
//! (the crate models only the from/to halves, without metadata).

pub use k8s_gateway_api::*;

/// GRPCRoute provides a way to route gRPC requests, matching them by
/// hostname, service, method, or header. Shaped after the crate's other
/// route kinds so rules normalize onto the HTTP model.
#[derive(
    Clone, Debug, kube::CustomResource, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[kube(
    group = "gateway.networking.k8s.io",
    version = "v1alpha2",
    kind = "GRPCRoute",
    root = "GrpcRoute",
    status = "RouteStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct GrpcRouteSpec {
    /// Common route information.
    #[serde(flatten)]
    pub inner: CommonRouteSpec,

    /// Hostnames matched against the `:authority` of the gRPC request.
    pub hostnames: Option<Vec<String>>,

    /// Rules are a list of gRPC matchers, filters and actions.
    pub rules: Option<Vec<GrpcRouteRule>>,
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GrpcRouteRule {
    pub matches: Option<Vec<GrpcRouteMatch>>,
    pub filters: Option<Vec<GrpcRouteFilter>>,
    pub backend_refs: Option<Vec<GrpcRouteBackendRef>>,
}

/// Predicates for matching a gRPC request. A request matches when both the
/// method and header predicates hold.
#[derive(Clone, Debug, Default, serde::Deserialize, serde::Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GrpcRouteMatch {
    pub method: Option<GrpcMethodMatch>,
    pub headers: Option<Vec<HttpHeaderMatch>>,
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize, schemars::JsonSchema)]
#[serde(tag = "type")]
pub enum GrpcMethodMatch {
    Exact {
        method: Option<String>,
        service: Option<String>,
    },
    RegularExpression {
        method: Option<String>,
        service: Option<String>,
    },
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize, schemars::JsonSchema)]
#[serde(tag = "type", rename_all = "PascalCase")]
pub enum GrpcRouteFilter {
    #[serde(rename_all = "camelCase")]
    RequestHeaderModifier {
        request_header_modifier: HttpRequestHeaderFilter,
    },
    #[serde(rename_all = "camelCase")]
    ResponseHeaderModifier {
        response_header_modifier: HttpRequestHeaderFilter,
    },
    #[serde(rename_all = "camelCase")]
    RequestMirror {
        request_mirror: HttpRequestMirrorFilter,
    },
    #[serde(rename_all = "camelCase")]
    ExtensionRef {
        extension_ref: LocalObjectReference,
    },
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GrpcRouteBackendRef {
    #[serde(flatten)]
    pub inner: Option<BackendRef>,
    pub filters: Option<Vec<GrpcRouteFilter>>,
}

impl From<GrpcRouteFilter> for HttpRouteFilter {
    fn from(filter: GrpcRouteFilter) -> Self {
        match filter {
            GrpcRouteFilter::RequestHeaderModifier {
                request_header_modifier,
            } => Self::RequestHeaderModifier {
                request_header_modifier,
            },
            GrpcRouteFilter::ResponseHeaderModifier {
                response_header_modifier,
            } => Self::ResponseHeaderModifier {
                response_header_modifier,
            },
            GrpcRouteFilter::RequestMirror { request_mirror } => {
                Self::RequestMirror { request_mirror }
            }
            GrpcRouteFilter::ExtensionRef { extension_ref } => {
                Self::ExtensionRef { extension_ref }
            }
        }
    }
}

impl From<GrpcRouteBackendRef> for HttpBackendRef {
    fn from(GrpcRouteBackendRef { inner, filters }: GrpcRouteBackendRef) -> Self {
        Self {
            backend_ref: inner,
            filters: filters.map(|filters| filters.into_iter().map(Into::into).collect()),
        }
    }
}

/// ReferenceGrant permits references from resources in its `from` list to
/// resources of the kinds in its `to` list within the grant's namespace.
#[derive(
    Clone, Debug, kube::CustomResource, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[kube(
    group = "gateway.networking.k8s.io",
    version = "v1beta1",
    kind = "ReferenceGrant",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceGrantSpec {
    pub from: Vec<ReferenceGrantFrom>,
    pub to: Vec<ReferenceGrantTo>,
}

#[derive(
    Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
pub struct ReferenceGrantFrom {
    pub group: String,
    pub kind: String,
    pub namespace: String,
}

#[derive(
    Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
pub struct ReferenceGrantTo {
    pub group: String,
    pub kind: String,
    /// Absent means every resource of this kind in the grant's namespace.
    pub name: Option<String>,
}
