use super::{StoreError, bounded};
use crate::db::Db;
use crate::model::Role;

pub struct RoleStore {
    db: Db,
}

impl RoleStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn get_by_name(&self, name: &str) -> Result<Role, StoreError> {
        let query = "SELECT name, description, level FROM role WHERE name = $name LIMIT 1";

        let mut res = bounded(self.db.query(query).bind(("name", name.to_string()))).await?;
        let roles: Vec<Role> = res.take(0)?;
        roles.into_iter().next().ok_or(StoreError::NotFound)
    }
}
