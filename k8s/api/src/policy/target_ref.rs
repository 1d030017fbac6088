use super::targets_kind;

/// Targets a resource in the same namespace as the policy itself.
#[derive(
    Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
pub struct LocalTargetRef {
    pub group: Option<String>,
    pub kind: String,
    pub name: String,
}

// === impl LocalTargetRef ===

impl LocalTargetRef {
    /// Returns the target ref kind, qualified by its group, if necessary.
    pub fn canonical_kind(&self) -> String {
        if let Some(group) = self.group.as_deref().filter(|g| !g.is_empty()) {
            format!("{}.{}", self.kind, group)
        } else {
            self.kind.to_string()
        }
    }

    /// Checks whether the target references the given resource type.
    pub fn targets_kind<T>(&self) -> bool
    where
        T: kube::Resource,
        T::DynamicType: Default,
    {
        targets_kind::<T>(self.group.as_deref(), &self.kind)
    }
}
