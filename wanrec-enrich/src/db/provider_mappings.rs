//! Provider alias table

use sqlx::{Row, SqlitePool};
use tracing::warn;
use wanrec_common::Result;

use crate::models::{MappingType, ProviderMapping};

/// All mapping rows, including `ignore` rows
pub async fn load_mappings(pool: &SqlitePool) -> Result<Vec<ProviderMapping>> {
    let rows = sqlx::query(
        r#"
        SELECT source_provider, canonical_provider, mapping_type, confidence_score
        FROM provider_mappings
        ORDER BY id
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut mappings = Vec::with_capacity(rows.len());
    for row in rows {
        let mapping_type: String = row.get("mapping_type");
        let mapping_type = match mapping_type.parse::<MappingType>() {
            Ok(t) => t,
            Err(e) => {
                warn!("Skipping provider mapping: {}", e);
                continue;
            }
        };
        let confidence: i64 = row.get("confidence_score");

        mappings.push(ProviderMapping {
            source_provider: row.get("source_provider"),
            canonical_provider: row.get("canonical_provider"),
            mapping_type,
            confidence_score: confidence.clamp(0, 100) as u8,
        });
    }

    Ok(mappings)
}

pub async fn upsert_mapping(pool: &SqlitePool, mapping: &ProviderMapping) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO provider_mappings (source_provider, canonical_provider, mapping_type, confidence_score)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(source_provider, canonical_provider) DO UPDATE SET
            mapping_type = excluded.mapping_type,
            confidence_score = excluded.confidence_score
        "#,
    )
    .bind(&mapping.source_provider)
    .bind(&mapping.canonical_provider)
    .bind(mapping.mapping_type.as_str())
    .bind(mapping.confidence_score as i64)
    .execute(pool)
    .await?;

    Ok(())
}
