//! Field sites: the input records of the cluster computation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use fieldscope_core::TenantId;

/// Field site identifier (tenant-scoped via the `tenant_id` field on the record).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SiteId(pub Uuid);

impl SiteId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SiteId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for SiteId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// A tenant's field site with the geographic and organizational attributes
/// the clustering rule groups on.
///
/// Sites are produced upstream (ingestion is outside this system); the worker
/// only reads them. `updated_at` participates in the input fingerprint, so any
/// upstream mutation invalidates previously computed artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSite {
    pub id: SiteId,
    pub tenant_id: TenantId,
    pub name: String,
    pub region: String,
    pub organization: String,
    pub updated_at: DateTime<Utc>,
}

impl FieldSite {
    /// The pair that feeds the input fingerprint for this site.
    pub fn fingerprint_input(&self) -> (SiteId, DateTime<Utc>) {
        (self.id, self.updated_at)
    }
}
