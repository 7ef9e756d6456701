//! Identity resolution: collapse recipient addresses that probably belong to
//! the same person.
//!
//! The pipeline is deliberately explainable:
//! 1. exact duplicates are dropped,
//! 2. each address is [`normalize`]d to its local part,
//! 3. the normalized name becomes a one-dimensional [`feature`],
//! 4. features are clustered bottom-up with average linkage,
//! 5. each cluster is represented by its lexicographically smallest address,
//! 6. steps 4 and 5 repeat over the representatives until none merge.
//!
//! Known limitations, accepted as approximation costs:
//! - domains are ignored, so `alice@company.com` and `alice@other.org` merge;
//! - only the first `stem_len` characters (3 by default) feed the feature, so
//!   different people whose names share that prefix always merge:
//!   `mark@a.com`, `mary@b.com`, `martin@c.com` and `maria@d.com` resolve to
//!   the single identity `maria@d.com`;
//! - the feature is a hash, so unrelated stems that land within the threshold
//!   of each other merge as well.

mod cluster;
mod normalize;

use std::collections::BTreeSet;

use tracing::{debug, info, instrument, warn};

use mailsift_events::{EventBus, EventStatus};
use mailsift_shared::{AddressCluster, IdentityConfig, MailsiftError, Result, RunContext};

pub use cluster::average_linkage;
pub use normalize::{feature, normalize};

/// Tool name reported on resolver events.
pub const TOOL_NAME: &str = "Identity Resolver";

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Tunable clustering policy. Not derived from data.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentityPolicy {
    /// Clusters merge while their average feature distance is below this.
    pub distance_threshold: f64,
    /// Leading characters of the normalized name that feed the feature.
    pub stem_len: usize,
    /// Features fall in `0..feature_range`.
    pub feature_range: u64,
}

impl Default for IdentityPolicy {
    fn default() -> Self {
        Self::from(&IdentityConfig::default())
    }
}

impl IdentityPolicy {
    /// Reject policies the clustering cannot work with.
    pub fn validate(&self) -> Result<()> {
        if !self.distance_threshold.is_finite() || self.distance_threshold < 0.0 {
            return Err(MailsiftError::invalid_input(format!(
                "distance threshold must be a finite, non-negative number, got {}",
                self.distance_threshold
            )));
        }
        if self.stem_len == 0 {
            return Err(MailsiftError::invalid_input("stem length must be positive"));
        }
        if self.feature_range == 0 {
            return Err(MailsiftError::invalid_input("feature range must be positive"));
        }
        Ok(())
    }
}

impl From<&IdentityConfig> for IdentityPolicy {
    fn from(config: &IdentityConfig) -> Self {
        Self {
            distance_threshold: config.distance_threshold,
            stem_len: config.stem_len,
            feature_range: config.feature_range,
        }
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Outcome of [`resolve`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    /// One address per identity, sorted.
    pub representatives: Vec<String>,
    /// Full clustering, ordered by label. Empty when fewer than two distinct
    /// addresses were given and clustering was skipped.
    pub clusters: Vec<AddressCluster>,
}

impl Resolution {
    pub fn identity_count(&self) -> usize {
        self.representatives.len()
    }
}

/// Merge near-duplicate identities in `addresses`.
///
/// Blank entries are skipped. Empty and single-address input is returned as
/// is. Fails with [`MailsiftError::InvalidInput`] only when the policy itself
/// is unusable.
///
/// Clustering repeats over the representatives until none of them merge, so
/// resolving the returned representatives again yields the same list.
#[instrument(skip_all, fields(input = addresses.len()))]
pub fn resolve(addresses: &[String], policy: &IdentityPolicy) -> Result<Resolution> {
    policy.validate()?;

    let blank = addresses.iter().filter(|a| a.trim().is_empty()).count();
    if blank > 0 {
        warn!(blank, "skipping blank recipient addresses");
    }

    let unique: Vec<String> = addresses
        .iter()
        .filter(|a| !a.trim().is_empty())
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    if unique.len() <= 1 {
        debug!(unique = unique.len(), "nothing to cluster");
        return Ok(Resolution {
            representatives: unique,
            clusters: Vec::new(),
        });
    }

    let unique_count = unique.len();
    let mut groups: Vec<Vec<String>> = unique.into_iter().map(|a| vec![a]).collect();
    let mut rounds = 0usize;
    let labels = loop {
        rounds += 1;
        let features: Vec<f64> = groups
            .iter()
            .map(|members| address_feature(&members[0], policy))
            .collect();
        let labels = average_linkage(&features, policy.distance_threshold);
        let cluster_count = labels.iter().copied().max().map_or(0, |max| max + 1);
        if cluster_count == groups.len() {
            break labels;
        }
        groups = merge_groups(groups, &labels, cluster_count);
    };

    let mut clusters: Vec<AddressCluster> = groups
        .into_iter()
        .zip(labels)
        .map(|(members, label)| {
            let sum: f64 = members.iter().map(|m| address_feature(m, policy)).sum();
            AddressCluster {
                label,
                feature: sum / members.len() as f64,
                representative: members[0].clone(),
                members,
            }
        })
        .collect();
    clusters.sort_by_key(|c| c.label);

    let mut representatives: Vec<String> =
        clusters.iter().map(|c| c.representative.clone()).collect();
    representatives.sort();

    info!(
        unique = unique_count,
        identities = representatives.len(),
        rounds,
        "identities resolved"
    );

    Ok(Resolution {
        representatives,
        clusters,
    })
}

fn address_feature(address: &str, policy: &IdentityPolicy) -> f64 {
    feature(&normalize(address), policy) as f64
}

/// Fold groups sharing a label into one sorted member list per label.
fn merge_groups(groups: Vec<Vec<String>>, labels: &[usize], count: usize) -> Vec<Vec<String>> {
    let mut merged: Vec<Vec<String>> = vec![Vec::new(); count];
    for (members, &label) in groups.into_iter().zip(labels) {
        merged[label].extend(members);
    }
    for members in &mut merged {
        members.sort();
    }
    merged
}

// ---------------------------------------------------------------------------
// Pipeline step
// ---------------------------------------------------------------------------

/// Resolver bound to a bus, used as the body of the pipeline's resolve step.
///
/// Reads and overwrites `recipient_addresses`; writes `resolved_count` and
/// `clusters`.
#[derive(Debug, Clone)]
pub struct IdentityResolver {
    policy: IdentityPolicy,
    bus: EventBus,
    order: u32,
}

impl IdentityResolver {
    /// `order` labels the sub-progress events this resolver emits.
    pub fn new(policy: IdentityPolicy, bus: EventBus, order: u32) -> Self {
        Self { policy, bus, order }
    }

    pub fn policy(&self) -> &IdentityPolicy {
        &self.policy
    }

    /// Resolve the context's addresses in place.
    pub fn apply(&self, ctx: &mut RunContext) -> Result<()> {
        self.bus.emit(
            self.order,
            "Resolving identities - feature extraction",
            TOOL_NAME,
            EventStatus::Started,
        );

        let resolution = match resolve(&ctx.recipient_addresses, &self.policy) {
            Ok(resolution) => resolution,
            Err(err) => {
                self.bus.emit(
                    self.order,
                    "Resolving identities - failed",
                    TOOL_NAME,
                    EventStatus::Failed(err.to_string()),
                );
                return Err(err);
            }
        };
        let skipped = resolution.clusters.is_empty();

        ctx.resolved_count = Some(resolution.identity_count());
        ctx.recipient_addresses = resolution.representatives;
        ctx.clusters = resolution.clusters;

        let step_name = if skipped {
            "Resolving identities - nothing to do"
        } else {
            "Resolving identities - completed"
        };
        self.bus
            .emit(self.order, step_name, TOOL_NAME, EventStatus::Success);
        Ok(())
    }
}
