/// Proxy-level settings referenced by a GatewayClass `parametersRef`.
#[derive(
    Clone, Debug, kube::CustomResource, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[kube(
    group = "gateway.stategraph.dev",
    version = "v1alpha1",
    kind = "ProxyConfig",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ProxyConfigSpec {
    pub ip_family: Option<IpFamily>,
    pub disable_http2: Option<bool>,
    pub telemetry: Option<Telemetry>,
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum IpFamily {
    Dual,
    Ipv4,
    Ipv6,
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize, schemars::JsonSchema)]
pub struct Telemetry {
    pub enabled: Option<bool>,
}
