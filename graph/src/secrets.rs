//! Build-scoped TLS secret resolution.

use crate::resource_id::ResourceId;
use ahash::AHashMap;
use stategraph_k8s_api::Secret;

const TLS_SECRET_TYPE: &str = "kubernetes.io/tls";
const TLS_CERT_KEY: &str = "tls.crt";
const TLS_KEY_KEY: &str = "tls.key";

/// Resolves and validates TLS secrets, caching the outcome per secret for
/// the duration of one build. The set of ids it was asked about feeds the
/// referenced-secret closure.
pub(crate) struct SecretResolver<'a> {
    secrets: &'a AHashMap<ResourceId, Secret>,
    resolved: AHashMap<ResourceId, Result<(), String>>,
}

// === impl SecretResolver ===

impl<'a> SecretResolver<'a> {
    pub(crate) fn new(secrets: &'a AHashMap<ResourceId, Secret>) -> Self {
        Self {
            secrets,
            resolved: Default::default(),
        }
    }

    pub(crate) fn resolve(&mut self, id: &ResourceId) -> Result<(), String> {
        if let Some(outcome) = self.resolved.get(id) {
            return outcome.clone();
        }

        let outcome = validate_tls_secret(id, self.secrets.get(id));
        self.resolved.insert(id.clone(), outcome.clone());
        outcome
    }

    /// Every secret this resolver was asked about, found or not.
    pub(crate) fn referenced(self) -> impl Iterator<Item = ResourceId> {
        self.resolved.into_keys()
    }
}

fn validate_tls_secret(id: &ResourceId, secret: Option<&Secret>) -> Result<(), String> {
    let secret = secret.ok_or_else(|| format!("secret {id} does not exist"))?;

    if secret.type_.as_deref() != Some(TLS_SECRET_TYPE) {
        return Err(format!("secret {id} must be of type {TLS_SECRET_TYPE}"));
    }

    for key in [TLS_CERT_KEY, TLS_KEY_KEY] {
        let present = secret
            .data
            .as_ref()
            .map_or(false, |data| data.contains_key(key));
        if !present {
            return Err(format!("secret {id} is missing the {key} entry"));
        }
    }

    Ok(())
}
