use super::{LocalTargetRef, PolicyStatus};

/// TLS verification settings for connections from the data plane to a
/// backend Service.
#[derive(
    Clone, Debug, kube::CustomResource, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[kube(
    group = "gateway.stategraph.dev",
    version = "v1alpha1",
    kind = "BackendTlsPolicy",
    status = "PolicyStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct BackendTlsPolicySpec {
    pub target_refs: Vec<LocalTargetRef>,
    pub validation: TlsValidation,
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TlsValidation {
    /// Server name used for SNI and certificate verification.
    pub hostname: String,

    /// ConfigMap references holding the verification bundle in `ca.crt`.
    pub ca_cert_refs: Option<Vec<CaCertRef>>,

    pub well_known_ca_certs: Option<WellKnownCaCerts>,
}

#[derive(
    Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
pub struct CaCertRef {
    pub group: Option<String>,
    pub kind: Option<String>,
    pub name: String,
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum WellKnownCaCerts {
    System,
}
