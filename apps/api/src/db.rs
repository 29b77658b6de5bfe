use std::collections::HashMap;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

/// Creates a PostgreSQL connection pool and brings the schema up to date.
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    info!("Connecting to PostgreSQL...");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;

    info!("PostgreSQL connection pool established");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to apply database migrations")?;

    info!("Database migrations applied");
    Ok(pool)
}

/// Groups child rows by their parent id, preserving row order within each parent.
pub fn group_by_parent<T, F>(children: Vec<T>, parent_id: F) -> HashMap<Uuid, Vec<T>>
where
    F: Fn(&T) -> Uuid,
{
    let mut grouped: HashMap<Uuid, Vec<T>> = HashMap::new();
    for child in children {
        grouped.entry(parent_id(&child)).or_default().push(child);
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_by_parent_keeps_order() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let rows = vec![(a, 1), (b, 2), (a, 3)];
        let grouped = group_by_parent(rows, |(parent, _)| *parent);
        assert_eq!(grouped[&a], vec![(a, 1), (a, 3)]);
        assert_eq!(grouped[&b], vec![(b, 2)]);
        assert!(!grouped.contains_key(&Uuid::new_v4()));
    }
}
