//! Postgres-backed cluster store.
//!
//! Artifacts live in `cluster_artifacts`, one row per tenant, with the
//! cluster payload as jsonb. The fingerprint is digested from the
//! `(id, updated_at)` pairs of the tenant's `field_sites` rows.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Row};
use tracing::instrument;

use fieldscope_clusters::{ClusterArtifact, FieldSite, Fingerprint, SiteCluster, SiteId};
use fieldscope_core::TenantId;

use super::store::{ClusterStore, ClusterStoreError};

/// Postgres-backed artifact and site storage.
#[derive(Debug, Clone)]
pub struct PostgresClusterStore {
    pool: Arc<PgPool>,
}

impl PostgresClusterStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait::async_trait]
impl ClusterStore for PostgresClusterStore {
    #[instrument(skip(self), fields(tenant_id = %tenant_id), err)]
    async fn get(
        &self,
        tenant_id: TenantId,
    ) -> Result<Option<ClusterArtifact>, ClusterStoreError> {
        let row = sqlx::query(
            r#"
            SELECT tenant_id, payload, computed_at, source_fingerprint
            FROM cluster_artifacts
            WHERE tenant_id = $1
            "#,
        )
        .bind(tenant_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_artifact", e))?;

        match row {
            Some(row) => {
                let artifact_row =
                    ArtifactRow::from_row(&row).map_err(|e| map_sqlx_error("get_artifact", e))?;
                Ok(Some(artifact_row.into_artifact()?))
            }
            None => Ok(None),
        }
    }

    #[instrument(
        skip(self, artifact),
        fields(
            tenant_id = %artifact.tenant_id,
            fingerprint = %artifact.source_fingerprint
        ),
        err
    )]
    async fn upsert(&self, artifact: &ClusterArtifact) -> Result<(), ClusterStoreError> {
        let payload =
            serde_json::to_value(&artifact.clusters).map_err(|e| ClusterStoreError::InvalidData {
                tenant_id: artifact.tenant_id,
                message: format!("failed to serialize payload: {e}"),
            })?;

        sqlx::query(
            r#"
            INSERT INTO cluster_artifacts (tenant_id, payload, computed_at, source_fingerprint)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (tenant_id)
            DO UPDATE SET
                payload = EXCLUDED.payload,
                computed_at = EXCLUDED.computed_at,
                source_fingerprint = EXCLUDED.source_fingerprint
            "#,
        )
        .bind(artifact.tenant_id.as_uuid())
        .bind(&payload)
        .bind(artifact.computed_at)
        .bind(artifact.source_fingerprint.as_str())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("upsert_artifact", e))?;

        Ok(())
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id), err)]
    async fn compute_fingerprint(
        &self,
        tenant_id: TenantId,
    ) -> Result<Fingerprint, ClusterStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, updated_at
            FROM field_sites
            WHERE tenant_id = $1
            "#,
        )
        .bind(tenant_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("compute_fingerprint", e))?;

        let mut inputs = Vec::with_capacity(rows.len());
        for row in rows {
            let id: uuid::Uuid = row
                .try_get("id")
                .map_err(|e| map_sqlx_error("compute_fingerprint", e))?;
            let updated_at: DateTime<Utc> = row
                .try_get("updated_at")
                .map_err(|e| map_sqlx_error("compute_fingerprint", e))?;
            inputs.push((SiteId::from_uuid(id), updated_at));
        }

        Ok(Fingerprint::digest(inputs))
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id), err)]
    async fn load_sites(&self, tenant_id: TenantId) -> Result<Vec<FieldSite>, ClusterStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, tenant_id, name, region, organization, updated_at
            FROM field_sites
            WHERE tenant_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(tenant_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_sites", e))?;

        let mut sites = Vec::with_capacity(rows.len());
        for row in rows {
            let site_row =
                FieldSiteRow::from_row(&row).map_err(|e| map_sqlx_error("load_sites", e))?;
            sites.push(site_row.into());
        }
        Ok(sites)
    }
}

/// Map SQLx errors to ClusterStoreError, keeping the SQLSTATE when present.
fn map_sqlx_error(operation: &'static str, err: sqlx::Error) -> ClusterStoreError {
    let message = match &err {
        sqlx::Error::Database(db_err) => match db_err.code() {
            Some(code) => format!("{} (SQLSTATE {})", db_err.message(), code),
            None => db_err.message().to_string(),
        },
        other => other.to_string(),
    };
    ClusterStoreError::Storage { operation, message }
}

// SQLx row types

#[derive(Debug)]
struct ArtifactRow {
    tenant_id: uuid::Uuid,
    payload: serde_json::Value,
    computed_at: DateTime<Utc>,
    source_fingerprint: String,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for ArtifactRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(ArtifactRow {
            tenant_id: row.try_get("tenant_id")?,
            payload: row.try_get("payload")?,
            computed_at: row.try_get("computed_at")?,
            source_fingerprint: row.try_get("source_fingerprint")?,
        })
    }
}

impl ArtifactRow {
    fn into_artifact(self) -> Result<ClusterArtifact, ClusterStoreError> {
        let tenant_id = TenantId::from_uuid(self.tenant_id);

        let clusters: Vec<SiteCluster> =
            serde_json::from_value(self.payload).map_err(|e| ClusterStoreError::InvalidData {
                tenant_id,
                message: format!("undecodable payload: {e}"),
            })?;
        let source_fingerprint = Fingerprint::from_hex(&self.source_fingerprint).map_err(|e| {
            ClusterStoreError::InvalidData {
                tenant_id,
                message: e.to_string(),
            }
        })?;

        Ok(ClusterArtifact {
            tenant_id,
            clusters,
            computed_at: self.computed_at,
            source_fingerprint,
        })
    }
}

#[derive(Debug)]
struct FieldSiteRow {
    id: uuid::Uuid,
    tenant_id: uuid::Uuid,
    name: String,
    region: String,
    organization: String,
    updated_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for FieldSiteRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(FieldSiteRow {
            id: row.try_get("id")?,
            tenant_id: row.try_get("tenant_id")?,
            name: row.try_get("name")?,
            region: row.try_get("region")?,
            organization: row.try_get("organization")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl From<FieldSiteRow> for FieldSite {
    fn from(row: FieldSiteRow) -> Self {
        FieldSite {
            id: SiteId::from_uuid(row.id),
            tenant_id: TenantId::from_uuid(row.tenant_id),
            name: row.name,
            region: row.region,
            organization: row.organization,
            updated_at: row.updated_at,
        }
    }
}
