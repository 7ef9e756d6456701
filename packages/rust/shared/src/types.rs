//! Core domain types shared across mailsift crates.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one pipeline run (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// AddressCluster
// ---------------------------------------------------------------------------

/// A set of raw addresses judged to denote one identity.
///
/// Derived data: recomputed on every run, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressCluster {
    /// Cluster label, dense from zero in ascending order of the representative's feature.
    pub label: usize,
    /// Mean scalar feature of the members.
    pub feature: f64,
    /// Member addresses, sorted.
    pub members: Vec<String>,
    /// The address standing in for the whole cluster.
    pub representative: String,
}

impl AddressCluster {
    /// Number of raw addresses merged into this cluster.
    pub fn size(&self) -> usize {
        self.members.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_roundtrip() {
        let id = RunId::new();
        let s = id.to_string();
        let parsed: RunId = s.parse().expect("parse RunId");
        assert_eq!(id, parsed);
    }

    #[test]
    fn cluster_serialization() {
        let cluster = AddressCluster {
            label: 0,
            feature: 3923.0,
            members: vec!["alice.smith@company.com".into(), "alice@company.com".into()],
            representative: "alice.smith@company.com".into(),
        };

        let json = serde_json::to_string(&cluster).expect("serialize");
        let parsed: AddressCluster = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, cluster);
        assert_eq!(parsed.size(), 2);
    }
}
