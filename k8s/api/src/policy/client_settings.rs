use super::{LocalTargetRef, PolicyStatus};

/// Per-client connection tuning attached to a Gateway or Route.
#[derive(
    Clone, Debug, kube::CustomResource, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[kube(
    group = "gateway.stategraph.dev",
    version = "v1alpha1",
    kind = "ClientSettingsPolicy",
    status = "PolicyStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ClientSettingsPolicySpec {
    pub target_refs: Vec<LocalTargetRef>,

    /// Maximum allowed request body size, e.g. "8m".
    pub max_body_size: Option<String>,

    /// Number of requests served over one keepalive connection.
    pub keepalive_requests: Option<i32>,
}
