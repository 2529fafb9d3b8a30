use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use surrealdb::Surreal;
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::Root;
use tracing::debug;

use crate::db::schema::SCHEMA;
use crate::model::seed_roles;

pub type Db = Surreal<Any>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub namespace: String,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: env::var("SURREALDB_URL").unwrap_or_else(|_| "memory".to_string()),
            namespace: env::var("SURREALDB_NAMESPACE").unwrap_or_else(|_| "social".to_string()),
            database: env::var("SURREALDB_DATABASE").unwrap_or_else(|_| "api".to_string()),
            username: env::var("SURREALDB_USERNAME").ok(),
            password: env::var("SURREALDB_PASSWORD").ok(),
        }
    }
}

pub async fn create_connection(config: DatabaseConfig) -> Result<Db> {
    let db = surrealdb::engine::any::connect(config.url).await?;

    // Sign in if credentials are provided
    if let (Some(username), Some(password)) = (config.username, config.password) {
        db.signin(Root {
            username: &username,
            password: &password,
        })
        .await?;
    }

    db.use_ns(config.namespace).use_db(config.database).await?;

    Ok(db)
}

/// Apply table definitions and seed the reference roles.
///
/// Safe to run repeatedly: every definition is `IF NOT EXISTS` and roles are
/// upserted by name.
pub async fn ensure_schema(db: &Db) -> Result<()> {
    for statement in SCHEMA {
        db.query(*statement).await?.check()?;
    }

    for role in seed_roles() {
        debug!(role = %role.name, level = role.level, "seeding role");
        db.query(
            r#"
            UPSERT type::thing('role', $name) CONTENT {
                name: $name,
                description: $description,
                level: $level
            }
            "#,
        )
        .bind(("name", role.name))
        .bind(("description", role.description))
        .bind(("level", role.level))
        .await?
        .check()?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_test_db() -> Db {
        let config = DatabaseConfig {
            url: "memory".to_string(),
            ..Default::default()
        };
        let db = create_connection(config).await.unwrap();
        ensure_schema(&db).await.unwrap();
        db
    }

    #[tokio::test]
    async fn test_roles_are_seeded() {
        let db = setup_test_db().await;

        let mut res = db
            .query("SELECT VALUE level FROM role ORDER BY level")
            .await
            .unwrap();
        let levels: Vec<i64> = res.take(0).unwrap();
        assert_eq!(levels, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_ensure_schema_is_idempotent() {
        let db = setup_test_db().await;
        ensure_schema(&db).await.unwrap();

        let mut res = db.query("SELECT VALUE name FROM role").await.unwrap();
        let names: Vec<String> = res.take(0).unwrap();
        assert_eq!(names.len(), 3);
    }
}
