//! Typed condition outcomes recorded against graph entities.
//!
//! Conditions never abort a build; they are collected onto the owning
//! entity and written back to object status by the status collaborator.

/// A single condition outcome.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Condition {
    pub type_: &'static str,
    pub status: bool,
    pub reason: &'static str,
    pub message: String,
}

impl Condition {
    fn new(type_: &'static str, status: bool, reason: &'static str, message: String) -> Self {
        Self {
            type_,
            status,
            reason,
            message,
        }
    }

    /// Whether this condition marks its owner invalid. `Conflicted` is the
    /// one type whose negative polarity is `true`.
    pub(crate) fn is_negative(&self) -> bool {
        if self.type_ == CONFLICTED {
            self.status
        } else {
            !self.status
        }
    }
}

pub const ACCEPTED: &str = "Accepted";
pub const PROGRAMMED: &str = "Programmed";
pub const RESOLVED_REFS: &str = "ResolvedRefs";
pub const CONFLICTED: &str = "Conflicted";
pub const PARTIALLY_INVALID: &str = "PartiallyInvalid";
pub const SUPPORTED_VERSION: &str = "SupportedVersion";

// === Route conditions ===

pub fn route_not_allowed_by_listeners() -> Condition {
    Condition::new(
        ACCEPTED,
        false,
        "NotAllowedByListeners",
        "The route is not allowed by the listeners".to_string(),
    )
}

pub fn route_no_matching_listener_hostname() -> Condition {
    Condition::new(
        ACCEPTED,
        false,
        "NoMatchingListenerHostname",
        "The listener hostname does not match the route hostnames".to_string(),
    )
}

pub fn route_no_matching_parent() -> Condition {
    Condition::new(
        ACCEPTED,
        false,
        "NoMatchingParent",
        "The listener is not found for the parent ref".to_string(),
    )
}

pub fn route_invalid_listener() -> Condition {
    Condition::new(
        ACCEPTED,
        false,
        "InvalidListener",
        "The referenced listener is invalid for this parent ref".to_string(),
    )
}

pub fn route_invalid_gateway() -> Condition {
    Condition::new(
        ACCEPTED,
        false,
        "InvalidGateway",
        "The referenced gateway is invalid".to_string(),
    )
}

pub fn route_gateway_ignored() -> Condition {
    Condition::new(
        ACCEPTED,
        false,
        "GatewayIgnored",
        "The gateway is ignored; only one gateway can be used".to_string(),
    )
}

pub fn route_unsupported_value(message: String) -> Condition {
    Condition::new(ACCEPTED, false, "UnsupportedValue", message)
}

pub fn route_partially_invalid(message: String) -> Condition {
    Condition::new(
        PARTIALLY_INVALID,
        true,
        "UnsupportedValue",
        format!("Dropped rules(s): {message}"),
    )
}

pub fn route_backend_ref_invalid_kind(message: String) -> Condition {
    Condition::new(RESOLVED_REFS, false, "InvalidKind", message)
}

pub fn route_backend_ref_not_permitted(message: String) -> Condition {
    Condition::new(RESOLVED_REFS, false, "RefNotPermitted", message)
}

pub fn route_backend_not_found(message: String) -> Condition {
    Condition::new(RESOLVED_REFS, false, "BackendNotFound", message)
}

pub fn route_backend_ref_unsupported_value(message: String) -> Condition {
    Condition::new(RESOLVED_REFS, false, "UnsupportedValue", message)
}

// === Listener conditions ===

pub fn listener_accepted() -> Condition {
    Condition::new(ACCEPTED, true, "Accepted", "The listener is accepted".to_string())
}

pub fn listener_programmed() -> Condition {
    Condition::new(
        PROGRAMMED,
        true,
        "Programmed",
        "The listener is programmed".to_string(),
    )
}

pub fn listener_resolved_refs() -> Condition {
    Condition::new(
        RESOLVED_REFS,
        true,
        "ResolvedRefs",
        "All references are resolved".to_string(),
    )
}

pub fn listener_no_conflicts() -> Condition {
    Condition::new(CONFLICTED, false, "NoConflicts", "No conflicts".to_string())
}

/// The positive conditions every fully valid listener carries.
pub fn listener_defaults() -> Vec<Condition> {
    vec![
        listener_accepted(),
        listener_programmed(),
        listener_resolved_refs(),
        listener_no_conflicts(),
    ]
}

fn listener_not_programmed(message: String) -> Condition {
    Condition::new(PROGRAMMED, false, "Invalid", message)
}

pub fn listener_unsupported_value(message: String) -> Vec<Condition> {
    vec![
        Condition::new(ACCEPTED, false, "UnsupportedValue", message.clone()),
        listener_not_programmed(message),
    ]
}

pub fn listener_unsupported_protocol(message: String) -> Vec<Condition> {
    vec![
        Condition::new(ACCEPTED, false, "UnsupportedProtocol", message.clone()),
        listener_not_programmed(message),
    ]
}

pub fn listener_invalid_certificate_ref(message: String) -> Vec<Condition> {
    vec![
        Condition::new(RESOLVED_REFS, false, "InvalidCertificateRef", message.clone()),
        listener_not_programmed(message),
    ]
}

pub fn listener_invalid_route_kinds(message: String) -> Vec<Condition> {
    vec![Condition::new(
        RESOLVED_REFS,
        false,
        "InvalidRouteKinds",
        message,
    )]
}

pub fn listener_ref_not_permitted(message: String) -> Vec<Condition> {
    vec![
        Condition::new(RESOLVED_REFS, false, "RefNotPermitted", message.clone()),
        listener_not_programmed(message),
    ]
}

pub fn listener_protocol_conflict(message: String) -> Vec<Condition> {
    vec![
        Condition::new(CONFLICTED, true, "ProtocolConflict", message.clone()),
        listener_not_programmed(message),
    ]
}

pub fn listener_hostname_conflict(message: String) -> Vec<Condition> {
    vec![
        Condition::new(CONFLICTED, true, "HostnameConflict", message.clone()),
        listener_not_programmed(message),
    ]
}

// === GatewayClass conditions ===

pub fn class_accepted() -> Condition {
    Condition::new(
        ACCEPTED,
        true,
        "Accepted",
        "The gateway class is accepted".to_string(),
    )
}

pub fn class_resolved_refs() -> Condition {
    Condition::new(
        RESOLVED_REFS,
        true,
        "ResolvedRefs",
        "parametersRef is resolved".to_string(),
    )
}

pub fn class_invalid_parameters(message: String) -> Condition {
    Condition::new(RESOLVED_REFS, false, "InvalidParameters", message)
}

pub fn class_supported_version(version: &str) -> Condition {
    Condition::new(
        SUPPORTED_VERSION,
        true,
        "SupportedVersion",
        format!("Gateway API CRD versions are supported ({version})"),
    )
}

pub fn class_unsupported_version(message: String) -> Condition {
    Condition::new(SUPPORTED_VERSION, false, "UnsupportedVersion", message)
}

pub fn class_version_best_effort(message: String) -> Condition {
    Condition::new(SUPPORTED_VERSION, false, "BestEffortSupport", message)
}

// === Gateway conditions ===

pub fn gateway_accepted() -> Condition {
    Condition::new(ACCEPTED, true, "Accepted", "The gateway is accepted".to_string())
}

pub fn gateway_invalid(message: String) -> Vec<Condition> {
    vec![
        Condition::new(ACCEPTED, false, "Invalid", message.clone()),
        Condition::new(PROGRAMMED, false, "Invalid", message),
    ]
}

// === Policy conditions ===

pub fn policy_accepted() -> Condition {
    Condition::new(ACCEPTED, true, "Accepted", "The policy is accepted".to_string())
}

pub fn policy_invalid(message: String) -> Condition {
    Condition::new(ACCEPTED, false, "Invalid", message)
}

pub fn policy_conflicted(message: String) -> Condition {
    Condition::new(ACCEPTED, false, "Conflicted", message)
}

pub fn policy_gateway_ignored() -> Condition {
    Condition::new(
        ACCEPTED,
        false,
        "GatewayIgnored",
        "The targeted gateway is ignored; only one gateway can be used".to_string(),
    )
}
