//! Partition catalog
//!
//! The fact table is partitioned three levels deep: LIST(year) →
//! LIST(category) → LIST(subcategory). Only the subcategory leaves store
//! rows; the levels above route.
//!
//! `PartitionCatalog` is the only component that creates partitions and the
//! exclusive owner of the key→existence cache, so existence is checked once
//! per key per run instead of being re-queried ad hoc. Creation is
//! idempotent: `IF NOT EXISTS` DDL plus tolerance for a concurrent
//! duplicate-table outcome, which makes repeated runs over overlapping data
//! safe.

use sqlx::PgPool;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{IngestError, IngestResult};

/// PostgreSQL error code for "relation already exists"
const DUPLICATE_TABLE: &str = "42P07";

/// Ensures the year → category → subcategory partition chain exists
pub struct PartitionCatalog {
    pool: Arc<PgPool>,
    fact_table: String,
    ddl_timeout: Duration,
    /// Relations known to exist, either verified or created by this run
    known: HashSet<String>,
}

impl PartitionCatalog {
    pub fn new(pool: Arc<PgPool>, fact_table: impl Into<String>, ddl_timeout: Duration) -> Self {
        Self {
            pool,
            fact_table: sanitize_ident(&fact_table.into()),
            ddl_timeout,
            known: HashSet::new(),
        }
    }

    /// Ensure the whole partition chain for `(year, category, subcategory)`
    /// exists, creating missing levels top-down. Returns the leaf relation
    /// name rows for this key must land in.
    ///
    /// Calling this twice for the same key creates the chain once; the
    /// second call is a cache hit and touches nothing.
    pub async fn ensure_chain(
        &mut self,
        year: i32,
        category: &str,
        subcategory: &str,
    ) -> IngestResult<String> {
        let year_rel = self.year_partition(year);
        let category_rel = self.category_partition(year, category);
        let leaf_rel = self.leaf_partition(year, category, subcategory);

        let levels = [
            (year_rel.clone(), year_partition_ddl(&self.fact_table, &year_rel, year)),
            (
                category_rel.clone(),
                category_partition_ddl(&year_rel, &category_rel, category),
            ),
            (
                leaf_rel.clone(),
                leaf_partition_ddl(&category_rel, &leaf_rel, subcategory),
            ),
        ];

        for (relation, ddl) in levels {
            if self.known.contains(&relation) {
                continue;
            }

            if self.relation_exists(&relation).await? {
                debug!(relation = %relation, "Partition already present");
            } else {
                self.create_partition(&relation, &ddl).await?;
                info!(relation = %relation, "Created partition");
            }

            self.known.insert(relation);
        }

        Ok(leaf_rel)
    }

    /// Leaf relation name for a key, without touching the store.
    pub fn leaf_partition(&self, year: i32, category: &str, subcategory: &str) -> String {
        format!(
            "{}_{}",
            self.category_partition(year, category),
            sanitize_ident(subcategory)
        )
    }

    fn year_partition(&self, year: i32) -> String {
        format!("{}_y{}", self.fact_table, year)
    }

    fn category_partition(&self, year: i32, category: &str) -> String {
        format!("{}_{}", self.year_partition(year), sanitize_ident(category))
    }

    /// Bounded-timeout existence check. A deadline breach fails the current
    /// file only.
    async fn relation_exists(&self, relation: &str) -> IngestResult<bool> {
        let probe = sqlx::query_scalar::<_, bool>("SELECT to_regclass($1) IS NOT NULL")
            .bind(relation)
            .fetch_one(&*self.pool);

        match tokio::time::timeout(self.ddl_timeout, probe).await {
            Ok(Ok(exists)) => Ok(exists),
            Ok(Err(e)) => Err(IngestError::PartitionCreation {
                relation: relation.to_string(),
                reason: format!("existence check failed: {e}"),
            }),
            Err(_) => Err(IngestError::PartitionCreation {
                relation: relation.to_string(),
                reason: format!(
                    "existence check timed out after {}s",
                    self.ddl_timeout.as_secs()
                ),
            }),
        }
    }

    /// Bounded-timeout DDL. A duplicate-table outcome means a prior or
    /// concurrent run got there first and counts as success.
    async fn create_partition(&self, relation: &str, ddl: &str) -> IngestResult<()> {
        let create = sqlx::query(ddl).execute(&*self.pool);

        match tokio::time::timeout(self.ddl_timeout, create).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) if is_duplicate_table(&e) => {
                debug!(relation = %relation, "Partition created concurrently");
                Ok(())
            }
            Ok(Err(e)) => Err(IngestError::PartitionCreation {
                relation: relation.to_string(),
                reason: e.to_string(),
            }),
            Err(_) => Err(IngestError::PartitionCreation {
                relation: relation.to_string(),
                reason: format!("DDL timed out after {}s", self.ddl_timeout.as_secs()),
            }),
        }
    }
}

fn is_duplicate_table(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .and_then(|db| db.code())
        .map(|code| code == DUPLICATE_TABLE)
        .unwrap_or(false)
}

/// Restrict a token to a safe relation identifier fragment.
fn sanitize_ident(token: &str) -> String {
    token
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn year_partition_ddl(parent: &str, relation: &str, year: i32) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {relation} PARTITION OF {parent} \
         FOR VALUES IN ({year}) PARTITION BY LIST (category)"
    )
}

fn category_partition_ddl(parent: &str, relation: &str, category: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {relation} PARTITION OF {parent} \
         FOR VALUES IN ('{}') PARTITION BY LIST (subcategory)",
        sanitize_ident(category)
    )
}

fn leaf_partition_ddl(parent: &str, relation: &str, subcategory: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {relation} PARTITION OF {parent} FOR VALUES IN ('{}')",
        sanitize_ident(subcategory)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lazy_pool() -> Arc<PgPool> {
        // Never connects; catalog tests must not touch a live store
        Arc::new(PgPool::connect_lazy("postgresql://localhost/emgrid_test").unwrap())
    }

    fn catalog() -> PartitionCatalog {
        PartitionCatalog::new(lazy_pool(), "emission_raster", Duration::from_secs(30))
    }

    #[tokio::test]
    async fn test_partition_names() {
        let catalog = catalog();
        assert_eq!(catalog.year_partition(2020), "emission_raster_y2020");
        assert_eq!(
            catalog.category_partition(2020, "point"),
            "emission_raster_y2020_point"
        );
        assert_eq!(
            catalog.leaf_partition(2020, "point", "co"),
            "emission_raster_y2020_point_co"
        );
    }

    #[test]
    fn test_sanitize_ident() {
        assert_eq!(sanitize_ident("pm10"), "pm10");
        assert_eq!(sanitize_ident("PM10"), "pm10");
        assert_eq!(sanitize_ident("co;drop table"), "co_drop_table");
    }

    #[test]
    fn test_year_partition_ddl() {
        let ddl = year_partition_ddl("emission_raster", "emission_raster_y2020", 2020);
        assert_eq!(
            ddl,
            "CREATE TABLE IF NOT EXISTS emission_raster_y2020 PARTITION OF emission_raster \
             FOR VALUES IN (2020) PARTITION BY LIST (category)"
        );
    }

    #[test]
    fn test_category_partition_ddl() {
        let ddl = category_partition_ddl(
            "emission_raster_y2020",
            "emission_raster_y2020_area",
            "area",
        );
        assert_eq!(
            ddl,
            "CREATE TABLE IF NOT EXISTS emission_raster_y2020_area PARTITION OF \
             emission_raster_y2020 FOR VALUES IN ('area') PARTITION BY LIST (subcategory)"
        );
    }

    #[test]
    fn test_leaf_partition_ddl_declares_no_further_partitioning() {
        let ddl = leaf_partition_ddl(
            "emission_raster_y2020_area",
            "emission_raster_y2020_area_nh3",
            "nh3",
        );
        assert_eq!(
            ddl,
            "CREATE TABLE IF NOT EXISTS emission_raster_y2020_area_nh3 PARTITION OF \
             emission_raster_y2020_area FOR VALUES IN ('nh3')"
        );
    }

    #[tokio::test]
    async fn test_ensure_chain_is_a_noop_for_known_keys() {
        let mut catalog = catalog();

        // Simulate a completed first call for the same key; the second call
        // must resolve entirely from the cache without any store round trip
        // (the lazy pool would fail loudly if one were attempted).
        for relation in [
            "emission_raster_y2020",
            "emission_raster_y2020_point",
            "emission_raster_y2020_point_co",
        ] {
            catalog.known.insert(relation.to_string());
        }

        let leaf = catalog.ensure_chain(2020, "point", "co").await.unwrap();
        assert_eq!(leaf, "emission_raster_y2020_point_co");
    }
}
