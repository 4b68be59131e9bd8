//! Direct database access for schema provisioning.
//!
//! The application itself talks to the platform over REST, but the tables behind
//! that API are defined here as `SeaORM` entities. This module connects straight to
//! the database (`DATABASE_URL`, Postgres in production, `SQLite` locally) and
//! creates every table from those entity definitions with
//! `Schema::create_table_from_entity`, so the schema always matches the row types
//! the client deserializes.

use crate::entities::{
    Asset, Document, FamilyMember, Goal, InsurancePolicy, Liability, MutualFund, Stock,
    Transaction,
};
use crate::errors::Result;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, EntityTrait, Schema};
use tracing::info;

/// Fallback used when `DATABASE_URL` is not set
pub const DEFAULT_DATABASE_URL: &str = "sqlite://data/family_office.sqlite?mode=rwc";

/// Gets the database URL from environment variable or returns the default `SQLite` path.
#[must_use]
pub fn get_database_url() -> String {
    std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string())
}

/// Establishes a connection using `DATABASE_URL`.
pub async fn create_connection() -> Result<DatabaseConnection> {
    Database::connect(&get_database_url()).await.map_err(Into::into)
}

async fn create_table_for<E, C>(db: &C, schema: &Schema, entity: E) -> Result<()>
where
    E: EntityTrait,
    C: ConnectionTrait,
{
    let builder = db.get_database_backend();
    let mut statement = schema.create_table_from_entity(entity);
    statement.if_not_exists();
    db.execute(builder.build(&statement)).await?;
    Ok(())
}

/// Creates all tables from the entity definitions. Existing tables are left alone.
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    let schema = Schema::new(db.get_database_backend());

    create_table_for(db, &schema, Transaction).await?;
    create_table_for(db, &schema, Asset).await?;
    create_table_for(db, &schema, Stock).await?;
    create_table_for(db, &schema, MutualFund).await?;
    create_table_for(db, &schema, Liability).await?;
    create_table_for(db, &schema, Goal).await?;
    create_table_for(db, &schema, InsurancePolicy).await?;
    create_table_for(db, &schema, FamilyMember).await?;
    create_table_for(db, &schema, Document).await?;

    info!("Schema provisioned ({} tables)", crate::entities::TABLES.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::test_utils::setup_test_db;
    use crate::entities::{GoalPriority, goal, stock};
    use sea_orm::{ActiveModelTrait, QuerySelect, Set};
    use uuid::Uuid;

    #[tokio::test]
    async fn test_create_tables() -> Result<()> {
        let db = setup_test_db().await?;

        let _: Vec<stock::Model> = Stock::find().limit(1).all(&db).await?;
        let _: Vec<goal::Model> = Goal::find().limit(1).all(&db).await?;
        let _ = Transaction::find().limit(1).all(&db).await?;
        let _ = Asset::find().limit(1).all(&db).await?;
        let _ = MutualFund::find().limit(1).all(&db).await?;
        let _ = Liability::find().limit(1).all(&db).await?;
        let _ = InsurancePolicy::find().limit(1).all(&db).await?;
        let _ = FamilyMember::find().limit(1).all(&db).await?;
        let _ = Document::find().limit(1).all(&db).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_create_tables_is_repeatable() -> Result<()> {
        let db = setup_test_db().await?;
        create_tables(&db).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_entities_round_trip_through_schema() -> Result<()> {
        let db = setup_test_db().await?;
        let owner = Uuid::new_v4();
        let now = chrono::Utc::now();

        let inserted = goal::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(owner),
            title: Set("Retirement".to_string()),
            target_amount: Set(5_000_000.0),
            current_amount: Set(250_000.0),
            target_year: Set(2045),
            priority: Set(GoalPriority::High),
            is_completed: Set(false),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&db)
        .await?;

        let found = Goal::find_by_id(inserted.id).one(&db).await?.unwrap();
        assert_eq!(found.title, "Retirement");
        assert_eq!(found.priority, GoalPriority::High);
        assert_eq!(found.target_amount, 5_000_000.0);
        Ok(())
    }
}
