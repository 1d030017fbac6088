//! Gateway selection and construction.

use crate::conditions::{self, Condition};
use crate::error::InvariantViolation;
use crate::listener::{build_listeners, Listener, ListenerValidationCtx};
use crate::reference_grant::ReferenceGrantResolver;
use crate::resource_id::{creation_timestamp, winner_precedence, ResourceId};
use crate::secrets::SecretResolver;
use ahash::{AHashMap, AHashSet};
use stategraph_k8s_api::gateway;

/// The winning gateway and the other gateways of the winning class.
///
/// Ignored gateways stay tracked so that routes and policies referencing
/// them can be answered with a condition instead of silence.
pub(crate) struct ProcessedGateways {
    pub winner: Option<ResourceId>,
    pub ignored: AHashSet<ResourceId>,
}

impl ProcessedGateways {
    pub(crate) fn knows(&self, id: &ResourceId) -> bool {
        self.winner.as_ref() == Some(id) || self.ignored.contains(id)
    }
}

/// Selects the winning gateway among those referencing the winning class:
/// oldest creation timestamp first, ties broken by name.
pub(crate) fn process_gateways(
    gateways: &AHashMap<ResourceId, gateway::Gateway>,
    class_name: &str,
) -> ProcessedGateways {
    let mut referencing: Vec<(ResourceId, _)> = gateways
        .iter()
        .filter(|(_, gw)| gw.spec.gateway_class_name == class_name)
        .map(|(id, gw)| (id.clone(), creation_timestamp(&gw.metadata)))
        .collect();

    referencing.sort_by(|(a_id, a_ts), (b_id, b_ts)| {
        winner_precedence((a_ts, a_id), (b_ts, b_id))
    });

    let mut iter = referencing.into_iter().map(|(id, _)| id);
    let winner = iter.next();
    let ignored = iter.collect();

    if let Some(winner) = &winner {
        tracing::debug!(gateway = %winner, "selected winning gateway");
    }
    ProcessedGateways { winner, ignored }
}

/// The winning gateway after listener validation.
#[derive(Clone, Debug)]
pub struct Gateway {
    pub id: ResourceId,
    pub source: gateway::Gateway,
    pub listeners: Vec<Listener>,
    pub conditions: Vec<Condition>,
    pub valid: bool,
}

/// Builds the winning gateway. A gateway under an invalid class is marked
/// invalid wholesale; its listeners are not processed.
pub(crate) fn build_gateway(
    id: ResourceId,
    source: gateway::Gateway,
    class_valid: bool,
    ctx: &ListenerValidationCtx<'_>,
    secrets: &mut SecretResolver<'_>,
    grants: &ReferenceGrantResolver,
) -> Result<Gateway, InvariantViolation> {
    if !class_valid {
        return Ok(Gateway {
            id,
            source,
            listeners: Vec::new(),
            conditions: conditions::gateway_invalid(
                "the referenced gateway class is invalid".to_string(),
            ),
            valid: false,
        });
    }

    let listeners = build_listeners(&id, source.spec.listeners.clone(), ctx, secrets, grants)?;

    Ok(Gateway {
        id,
        source,
        listeners,
        conditions: vec![conditions::gateway_accepted()],
        valid: true,
    })
}
