use super::{LocalTargetRef, PolicyStatus};

/// Tracing controls attached to an HTTP or gRPC Route.
#[derive(
    Clone, Debug, kube::CustomResource, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[kube(
    group = "gateway.stategraph.dev",
    version = "v1alpha1",
    kind = "ObservabilityPolicy",
    status = "PolicyStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ObservabilityPolicySpec {
    pub target_refs: Vec<LocalTargetRef>,
    pub tracing: Option<Tracing>,
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize, schemars::JsonSchema)]
pub struct Tracing {
    /// Percentage of traffic sampled, 0 through 100.
    pub ratio: Option<i32>,
}
