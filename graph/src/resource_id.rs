use chrono::{DateTime, Utc};
use stategraph_k8s_api::{ObjectMeta, Time};

/// Identifies a namespaced resource.
#[derive(Clone, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct ResourceId {
    pub namespace: String,
    pub name: String,
}

// === impl ResourceId ===

impl ResourceId {
    pub fn new(namespace: String, name: String) -> Self {
        Self { namespace, name }
    }

    /// Creates a `ResourceId` from an object's metadata, defaulting the
    /// namespace when the object does not carry one.
    pub fn from_meta(meta: &ObjectMeta, default_ns: &str) -> Option<Self> {
        let name = meta.name.clone()?;
        let namespace = meta
            .namespace
            .clone()
            .unwrap_or_else(|| default_ns.to_string());
        Some(Self { namespace, name })
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

pub(crate) fn creation_timestamp(meta: &ObjectMeta) -> Option<DateTime<Utc>> {
    meta.creation_timestamp.clone().map(|Time(t)| t)
}

/// Orders objects for winner selection: oldest creation timestamp first,
/// missing timestamps last, ties broken by id.
pub(crate) fn winner_precedence(
    a: (&Option<DateTime<Utc>>, &ResourceId),
    b: (&Option<DateTime<Utc>>, &ResourceId),
) -> std::cmp::Ordering {
    let key = |ts: &Option<DateTime<Utc>>| (ts.is_none(), *ts);
    key(a.0).cmp(&key(b.0)).then_with(|| a.1.cmp(b.1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn id(ns: &str, name: &str) -> ResourceId {
        ResourceId::new(ns.to_string(), name.to_string())
    }

    #[test]
    fn display() {
        assert_eq!(id("default", "gateway").to_string(), "default/gateway");
    }

    #[test]
    fn precedence_prefers_older() {
        let older = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let newer = Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap();

        let a = id("ns", "b");
        let b = id("ns", "a");
        assert_eq!(
            winner_precedence((&Some(older), &a), (&Some(newer), &b)),
            std::cmp::Ordering::Less
        );
    }

    #[test]
    fn precedence_breaks_ties_by_name() {
        let ts = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let a = id("ns", "alpha");
        let b = id("ns", "beta");
        assert_eq!(
            winner_precedence((&Some(ts), &a), (&Some(ts), &b)),
            std::cmp::Ordering::Less
        );
    }

    #[test]
    fn precedence_sorts_missing_timestamps_last() {
        let ts = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let a = id("ns", "a");
        let b = id("ns", "b");
        assert_eq!(
            winner_precedence((&None, &a), (&Some(ts), &b)),
            std::cmp::Ordering::Greater
        );
    }
}
