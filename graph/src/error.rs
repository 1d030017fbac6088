/// A breach of the contract the admission layer is expected to enforce.
///
/// These are distinct from validation outcomes: the build aborts and the
/// caller must not retry, since the cluster state cannot become consistent
/// without external intervention.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum InvariantViolation {
    #[error("listener {listener} uses protocol {protocol} but carries no TLS configuration")]
    MissingTlsConfig { listener: String, protocol: String },

    #[error("listener {listener} terminates TLS but carries no certificate refs")]
    MissingCertificateRefs { listener: String },

    #[error("listener {listener} uses protocol HTTP but carries TLS configuration")]
    UnexpectedTlsConfig { listener: String },

    #[error("namespace {namespace} is selected by a listener but absent from the snapshot")]
    NamespaceNotFound { namespace: String },
}
