//! Cluster artifacts and the deterministic clustering rule.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use fieldscope_core::{DomainError, DomainResult, TenantId};

use crate::site::{FieldSite, SiteId};

/// Deterministic digest of the inputs that produced an artifact.
///
/// SHA-256 over the tenant's `(site_id, updated_at)` pairs ordered by site
/// id, stored as 64 lowercase hex characters. Timestamps are reduced to
/// microsecond precision to match the `timestamptz` column, so a digest
/// computed from in-memory records agrees with one computed after a database
/// round-trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Digest a set of fingerprint inputs. Ordering of the input iterator is
    /// irrelevant; the digest sorts by site id internally.
    pub fn digest(inputs: impl IntoIterator<Item = (SiteId, DateTime<Utc>)>) -> Self {
        let mut rows: Vec<(SiteId, DateTime<Utc>)> = inputs.into_iter().collect();
        rows.sort_by_key(|(id, _)| *id);

        let mut hasher = Sha256::new();
        for (id, updated_at) in rows {
            // Fixed-width fields (16-byte uuid, 8-byte micros); no separator needed.
            hasher.update(id.as_uuid().as_bytes());
            hasher.update(updated_at.timestamp_micros().to_be_bytes());
        }

        let mut out = String::with_capacity(64);
        for byte in hasher.finalize() {
            use core::fmt::Write;
            let _ = write!(out, "{byte:02x}");
        }
        Self(out)
    }

    /// Parse a digest previously produced by [`Fingerprint::digest`].
    pub fn from_hex(s: &str) -> DomainResult<Self> {
        if s.len() != 64 || !s.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()) {
            return Err(DomainError::validation(format!(
                "fingerprint must be 64 lowercase hex characters, got {:?}",
                s
            )));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One cluster within an artifact: the sites sharing a
/// `(region, organization)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteCluster {
    /// Display key, `"{region}/{organization}"`.
    pub key: String,
    pub region: String,
    pub organization: String,
    /// Member sites, ordered by id.
    pub site_ids: Vec<SiteId>,
}

/// Persistent, tenant-scoped output of the cluster computation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterArtifact {
    pub tenant_id: TenantId,
    pub clusters: Vec<SiteCluster>,
    pub computed_at: DateTime<Utc>,
    pub source_fingerprint: Fingerprint,
}

impl ClusterArtifact {
    /// Assemble an artifact from input records.
    ///
    /// The caller supplies the fingerprint it computed *before* loading the
    /// records, so a concurrent upstream mutation is detected on the next
    /// run rather than silently absorbed.
    pub fn build(
        tenant_id: TenantId,
        sites: &[FieldSite],
        source_fingerprint: Fingerprint,
        computed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            tenant_id,
            clusters: build_clusters(sites),
            computed_at,
            source_fingerprint,
        }
    }
}

/// Group sites by their `(region, organization)` pair.
///
/// Deterministic given the same input set: clusters come out ordered by
/// `(region, organization)` and members within a cluster ordered by site id,
/// regardless of input order.
pub fn build_clusters(sites: &[FieldSite]) -> Vec<SiteCluster> {
    let mut groups: BTreeMap<(&str, &str), Vec<SiteId>> = BTreeMap::new();
    for site in sites {
        groups
            .entry((site.region.as_str(), site.organization.as_str()))
            .or_default()
            .push(site.id);
    }

    groups
        .into_iter()
        .map(|((region, organization), mut site_ids)| {
            site_ids.sort();
            SiteCluster {
                key: format!("{region}/{organization}"),
                region: region.to_string(),
                organization: organization.to_string(),
                site_ids,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use uuid::Uuid;

    fn test_tenant() -> TenantId {
        TenantId::new()
    }

    fn site_n(n: u128, region: &str, organization: &str) -> FieldSite {
        FieldSite {
            id: SiteId::from_uuid(Uuid::from_u128(n)),
            tenant_id: TenantId::from_uuid(Uuid::from_u128(1)),
            name: format!("site-{n}"),
            region: region.to_string(),
            organization: organization.to_string(),
            updated_at: chrono::DateTime::from_timestamp_micros(1_700_000_000_000_000 + n as i64)
                .unwrap(),
        }
    }

    #[test]
    fn groups_by_region_and_organization() {
        let sites = vec![
            site_n(3, "north", "acme"),
            site_n(1, "north", "acme"),
            site_n(2, "south", "acme"),
            site_n(4, "north", "globex"),
        ];

        let clusters = build_clusters(&sites);

        assert_eq!(clusters.len(), 3);
        assert_eq!(clusters[0].key, "north/acme");
        assert_eq!(
            clusters[0].site_ids,
            vec![
                SiteId::from_uuid(Uuid::from_u128(1)),
                SiteId::from_uuid(Uuid::from_u128(3))
            ]
        );
        assert_eq!(clusters[1].key, "north/globex");
        assert_eq!(clusters[2].key, "south/acme");
    }

    #[test]
    fn empty_input_yields_no_clusters() {
        assert!(build_clusters(&[]).is_empty());
    }

    #[test]
    fn artifact_build_carries_fingerprint_and_timestamp() {
        let sites = vec![site_n(1, "north", "acme"), site_n(2, "north", "acme")];
        let fp = Fingerprint::digest(sites.iter().map(FieldSite::fingerprint_input));
        let now = chrono::Utc::now();

        let artifact = ClusterArtifact::build(test_tenant(), &sites, fp.clone(), now);

        assert_eq!(artifact.source_fingerprint, fp);
        assert_eq!(artifact.computed_at, now);
        assert_eq!(artifact.clusters.len(), 1);
        assert_eq!(artifact.clusters[0].site_ids.len(), 2);
    }

    #[test]
    fn fingerprint_ignores_input_order() {
        let a = site_n(1, "north", "acme");
        let b = site_n(2, "south", "acme");

        let forward = Fingerprint::digest([a.fingerprint_input(), b.fingerprint_input()]);
        let reversed = Fingerprint::digest([b.fingerprint_input(), a.fingerprint_input()]);

        assert_eq!(forward, reversed);
    }

    #[test]
    fn fingerprint_changes_when_a_site_is_touched() {
        let a = site_n(1, "north", "acme");
        let mut touched = a.clone();
        touched.updated_at += chrono::Duration::microseconds(1);

        let before = Fingerprint::digest([a.fingerprint_input()]);
        let after = Fingerprint::digest([touched.fingerprint_input()]);

        assert_ne!(before, after);
    }

    #[test]
    fn fingerprint_hex_round_trip() {
        let fp = Fingerprint::digest([site_n(1, "north", "acme").fingerprint_input()]);
        let parsed = Fingerprint::from_hex(fp.as_str()).unwrap();
        assert_eq!(parsed, fp);
    }

    #[test]
    fn fingerprint_rejects_malformed_hex() {
        assert!(Fingerprint::from_hex("abc").is_err());
        assert!(Fingerprint::from_hex(&"Z".repeat(64)).is_err());
        assert!(Fingerprint::from_hex(&"AB".repeat(32)).is_err());
    }

    #[test]
    fn clusters_serialize_stably() {
        let clusters = build_clusters(&[site_n(1, "north", "acme")]);
        let json = serde_json::to_string(&clusters).unwrap();
        let back: Vec<SiteCluster> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, clusters);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            ..ProptestConfig::default()
        })]

        /// Property: clustering output is invariant under permutation of the
        /// input records.
        #[test]
        fn clustering_is_order_independent(
            pairs in prop::collection::vec((0u8..4, 0u8..4), 0..32).prop_shuffle()
        ) {
            let regions = ["north", "south", "east", "west"];
            let orgs = ["acme", "globex", "initech", "umbrella"];

            let sites: Vec<FieldSite> = pairs
                .iter()
                .enumerate()
                .map(|(i, (r, o))| site_n(i as u128, regions[*r as usize], orgs[*o as usize]))
                .collect();

            let mut sorted = sites.clone();
            sorted.sort_by_key(|s| s.id);

            prop_assert_eq!(build_clusters(&sites), build_clusters(&sorted));
        }

        /// Property: the fingerprint is a pure function of the input set.
        #[test]
        fn fingerprint_is_order_independent(
            count in 0usize..24
        ) {
            let sites: Vec<FieldSite> = (0..count)
                .map(|i| site_n(i as u128, "north", "acme"))
                .collect();

            let forward = Fingerprint::digest(sites.iter().map(FieldSite::fingerprint_input));
            let reversed = Fingerprint::digest(sites.iter().rev().map(FieldSite::fingerprint_input));

            prop_assert_eq!(forward, reversed);
        }
    }
}
