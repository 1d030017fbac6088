/// A route filter referenced via `extensionRef`, carrying raw proxy
/// configuration directives.
#[derive(
    Clone, Debug, kube::CustomResource, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[kube(
    group = "gateway.stategraph.dev",
    version = "v1alpha1",
    kind = "ExtensionFilter",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionFilterSpec {
    pub directives: Vec<Directive>,
}

#[derive(
    Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
pub struct Directive {
    pub context: DirectiveContext,
    pub value: String,
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum DirectiveContext {
    Http,
    Route,
}
