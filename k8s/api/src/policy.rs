pub mod backend_tls;
pub mod client_settings;
pub mod extension_filter;
pub mod observability;
pub mod proxy_config;
pub mod target_ref;

pub use self::{
    backend_tls::{
        BackendTlsPolicy, BackendTlsPolicySpec, CaCertRef, TlsValidation, WellKnownCaCerts,
    },
    client_settings::{ClientSettingsPolicy, ClientSettingsPolicySpec},
    extension_filter::{Directive, DirectiveContext, ExtensionFilter, ExtensionFilterSpec},
    observability::{ObservabilityPolicy, ObservabilityPolicySpec, Tracing},
    proxy_config::{IpFamily, ProxyConfig, ProxyConfigSpec, Telemetry},
    target_ref::LocalTargetRef,
};

/// The API group of this project's CRDs.
pub const GROUP: &str = "gateway.stategraph.dev";

/// Ancestor status entries recorded against an attached policy.
///
/// Kept structurally close to the Gateway API `PolicyStatus` so multiple
/// controllers can share one status array.
#[derive(
    Clone, Debug, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
pub struct PolicyStatus {
    pub ancestors: Vec<PolicyAncestorStatus>,
}

#[derive(
    Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct PolicyAncestorStatus {
    pub ancestor_ref: AncestorRef,
    pub controller_name: String,
}

#[derive(
    Clone, Debug, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
pub struct AncestorRef {
    pub group: Option<String>,
    pub kind: Option<String>,
    pub namespace: Option<String>,
    pub name: String,
}

pub(crate) fn targets_kind<T>(group: Option<&str>, kind: &str) -> bool
where
    T: kube::Resource,
    T::DynamicType: Default,
{
    let dt = Default::default();

    let mut t_group = &*T::group(&dt);
    if t_group.is_empty() {
        t_group = "core";
    }

    group.unwrap_or("core").eq_ignore_ascii_case(t_group)
        && kind.eq_ignore_ascii_case(&T::kind(&dt))
}
