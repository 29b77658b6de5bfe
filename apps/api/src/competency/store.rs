use anyhow::Result;
use serde::Deserialize;
use sqlx::{PgConnection, PgPool};
use tracing::info;
use uuid::Uuid;

use crate::db::group_by_parent;
use crate::models::competency::{Competency, CompetencyLevel, CompetencyRow};

#[derive(Debug, Clone, Deserialize)]
pub struct CompetencyInput {
    pub competency: String,
    pub description: Option<String>,
    #[serde(default)]
    pub levels: Vec<LevelInput>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LevelInput {
    pub id: Option<Uuid>,
    pub level: String,
    #[serde(default)]
    pub description: String,
}

pub async fn create_competency(pool: &PgPool, input: &CompetencyInput) -> Result<Competency> {
    let id = Uuid::new_v4();
    let mut tx = pool.begin().await?;

    sqlx::query("INSERT INTO competencies (id, competency, description) VALUES ($1, $2, $3)")
        .bind(id)
        .bind(input.competency.trim())
        .bind(input.description.as_deref())
        .execute(&mut *tx)
        .await?;

    let mut levels = Vec::with_capacity(input.levels.len());
    for (position, level) in input.levels.iter().enumerate() {
        let level_id = Uuid::new_v4();
        upsert_level(&mut *tx, level_id, id, level, position as i32).await?;
        levels.push(CompetencyLevel {
            id: level_id,
            competency_id: id,
            level: level.level.trim().to_string(),
            description: level.description.clone(),
        });
    }

    tx.commit().await?;
    info!("Created competency {id} with {} levels", levels.len());

    Ok(Competency {
        id,
        competency: input.competency.trim().to_string(),
        description: input.description.clone(),
        levels,
    })
}

/// Competency names without their levels.
pub async fn list_competency_rows(pool: &PgPool) -> Result<Vec<CompetencyRow>> {
    Ok(sqlx::query_as::<_, CompetencyRow>(
        "SELECT id, competency, description FROM competencies WHERE deleted = FALSE ORDER BY competency, id",
    )
    .fetch_all(pool)
    .await?)
}

pub async fn list_competencies(pool: &PgPool) -> Result<Vec<Competency>> {
    let rows = list_competency_rows(pool).await?;
    let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
    Ok(stitch(rows, levels_for(pool, &ids).await?))
}

pub async fn get_competency(pool: &PgPool, id: Uuid) -> Result<Option<Competency>> {
    let row = sqlx::query_as::<_, CompetencyRow>(
        "SELECT id, competency, description FROM competencies WHERE id = $1 AND deleted = FALSE",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => {
            let levels = levels_for(pool, &[id]).await?;
            Ok(Some(Competency::from_parts(row, levels)))
        }
        None => Ok(None),
    }
}

/// Competencies with levels for the given ids, in the order of `ids`.
pub async fn get_competencies(pool: &PgPool, ids: &[Uuid]) -> Result<Vec<Competency>> {
    let rows = sqlx::query_as::<_, CompetencyRow>(
        "SELECT id, competency, description FROM competencies WHERE id = ANY($1) AND deleted = FALSE",
    )
    .bind(ids)
    .fetch_all(pool)
    .await?;
    let mut competencies = stitch(rows, levels_for(pool, ids).await?);
    competencies.sort_by_key(|c| ids.iter().position(|id| *id == c.id));
    Ok(competencies)
}

/// Updates a competency and reconciles its levels. Returns `None` if it does not exist.
pub async fn update_competency(
    pool: &PgPool,
    id: Uuid,
    input: &CompetencyInput,
) -> Result<Option<Competency>> {
    let mut tx = pool.begin().await?;

    let updated = sqlx::query(
        r#"
        UPDATE competencies
        SET competency = $2, description = $3, updated_at = NOW()
        WHERE id = $1 AND deleted = FALSE
        "#,
    )
    .bind(id)
    .bind(input.competency.trim())
    .bind(input.description.as_deref())
    .execute(&mut *tx)
    .await?;
    if updated.rows_affected() == 0 {
        return Ok(None);
    }

    let mut kept = Vec::with_capacity(input.levels.len());
    for (position, level) in input.levels.iter().enumerate() {
        let level_id = level.id.unwrap_or_else(Uuid::new_v4);
        upsert_level(&mut *tx, level_id, id, level, position as i32).await?;
        kept.push(level_id);
    }

    sqlx::query(
        r#"
        UPDATE competency_levels
        SET deleted = TRUE, deleted_at = NOW()
        WHERE competency_id = $1 AND deleted = FALSE AND NOT (id = ANY($2))
        "#,
    )
    .bind(id)
    .bind(&kept)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    info!("Updated competency {id}");

    get_competency(pool, id).await
}

/// Soft-deletes a competency and its levels. Returns `false` if it did not exist.
pub async fn delete_competency(pool: &PgPool, id: Uuid) -> Result<bool> {
    let mut tx = pool.begin().await?;

    let deleted = sqlx::query(
        "UPDATE competencies SET deleted = TRUE, deleted_at = NOW() WHERE id = $1 AND deleted = FALSE",
    )
    .bind(id)
    .execute(&mut *tx)
    .await?;
    if deleted.rows_affected() == 0 {
        return Ok(false);
    }

    sqlx::query(
        "UPDATE competency_levels SET deleted = TRUE, deleted_at = NOW() WHERE competency_id = $1 AND deleted = FALSE",
    )
    .bind(id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    info!("Deleted competency {id}");
    Ok(true)
}

async fn levels_for(pool: &PgPool, competency_ids: &[Uuid]) -> Result<Vec<CompetencyLevel>> {
    Ok(sqlx::query_as::<_, CompetencyLevel>(
        r#"
        SELECT id, competency_id, level, description
        FROM competency_levels
        WHERE competency_id = ANY($1) AND deleted = FALSE
        ORDER BY position, created_at
        "#,
    )
    .bind(competency_ids)
    .fetch_all(pool)
    .await?)
}

fn stitch(rows: Vec<CompetencyRow>, levels: Vec<CompetencyLevel>) -> Vec<Competency> {
    let mut levels = group_by_parent(levels, |l| l.competency_id);
    rows.into_iter()
        .map(|row| {
            let own = levels.remove(&row.id).unwrap_or_default();
            Competency::from_parts(row, own)
        })
        .collect()
}

async fn upsert_level(
    conn: &mut PgConnection,
    level_id: Uuid,
    competency_id: Uuid,
    level: &LevelInput,
    position: i32,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO competency_levels (id, competency_id, level, description, position)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (id) DO UPDATE
        SET level = EXCLUDED.level,
            description = EXCLUDED.description,
            position = EXCLUDED.position,
            deleted = FALSE,
            deleted_at = NULL,
            updated_at = NOW()
        WHERE competency_levels.competency_id = EXCLUDED.competency_id
        "#,
    )
    .bind(level_id)
    .bind(competency_id)
    .bind(level.level.trim())
    .bind(&level.description)
    .bind(position)
    .execute(conn)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(competency_id: Uuid, name: &str) -> CompetencyLevel {
        CompetencyLevel {
            id: Uuid::new_v4(),
            competency_id,
            level: name.to_string(),
            description: String::new(),
        }
    }

    #[test]
    fn test_stitch_attaches_levels_to_owner() {
        let a = CompetencyRow {
            id: Uuid::new_v4(),
            competency: "Teamwork".into(),
            description: None,
        };
        let b = CompetencyRow {
            id: Uuid::new_v4(),
            competency: "Integrity".into(),
            description: None,
        };
        let levels = vec![level(a.id, "Low"), level(b.id, "Low"), level(a.id, "High")];

        let stitched = stitch(vec![a.clone(), b.clone()], levels);
        assert_eq!(stitched.len(), 2);
        let names: Vec<_> = stitched[0].levels.iter().map(|l| l.level.as_str()).collect();
        assert_eq!(names, ["Low", "High"]);
        assert_eq!(stitched[1].levels.len(), 1);
    }

    #[test]
    fn test_stitch_keeps_competency_without_levels() {
        let row = CompetencyRow {
            id: Uuid::new_v4(),
            competency: "Empty".into(),
            description: None,
        };
        let stitched = stitch(vec![row], vec![]);
        assert!(stitched[0].levels.is_empty());
    }
}
