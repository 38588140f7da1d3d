//! Postgres storage for policy rules.
//!
//! ```sql
//! CREATE TABLE casbin_rule (
//!     id     BIGSERIAL PRIMARY KEY,
//!     p_type VARCHAR(32)  NOT NULL DEFAULT '',
//!     v0     VARCHAR(255) NOT NULL DEFAULT '',
//!     ...
//!     v5     VARCHAR(255) NOT NULL DEFAULT ''
//! );
//! ```

use crate::domain::{CasbinRule, RowFilter};
use crate::ports::outbound::Adapter;
use async_trait::async_trait;
use policy_types::StorageError;
use sqlx::{PgPool, Postgres, Row};
use std::sync::Arc;

const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS casbin_rule (
        id BIGSERIAL PRIMARY KEY,
        p_type VARCHAR(32) NOT NULL DEFAULT '',
        v0 VARCHAR(255) NOT NULL DEFAULT '',
        v1 VARCHAR(255) NOT NULL DEFAULT '',
        v2 VARCHAR(255) NOT NULL DEFAULT '',
        v3 VARCHAR(255) NOT NULL DEFAULT '',
        v4 VARCHAR(255) NOT NULL DEFAULT '',
        v5 VARCHAR(255) NOT NULL DEFAULT ''
    )
"#;

const INSERT_ROW: &str = r#"
    INSERT INTO casbin_rule (p_type, v0, v1, v2, v3, v4, v5)
    VALUES ($1, $2, $3, $4, $5, $6, $7)
"#;

const EXACT_MATCH: &str =
    "p_type = $1 AND v0 = $2 AND v1 = $3 AND v2 = $4 AND v3 = $5 AND v4 = $6 AND v5 = $7";

/// Rule storage in the `casbin_rule` table.
#[derive(Clone)]
pub struct PgAdapter {
    pool: Arc<PgPool>,
}

impl PgAdapter {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Create the `casbin_rule` table if it is missing.
    pub async fn ensure_table(&self) -> Result<(), StorageError> {
        sqlx::query(CREATE_TABLE)
            .execute(self.pool.as_ref())
            .await
            .map_err(db_error)?;
        Ok(())
    }
}

fn db_error(err: sqlx::Error) -> StorageError {
    StorageError::Database(err.to_string())
}

/// Bind a row's type and six values, in column order.
fn bind_row<'q>(
    query: sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments>,
    row: &'q CasbinRule,
) -> sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments> {
    row.values()
        .into_iter()
        .fold(query.bind(row.ptype.as_str()), |q, v| q.bind(v))
}

#[async_trait]
impl Adapter for PgAdapter {
    async fn load_policy(&self) -> Result<Vec<CasbinRule>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT id, p_type, v0, v1, v2, v3, v4, v5
            FROM casbin_rule
            ORDER BY id
            "#,
        )
        .fetch_all(self.pool.as_ref())
        .await
        .map_err(db_error)?;

        Ok(rows
            .into_iter()
            .map(|row| CasbinRule {
                id: row.get("id"),
                ptype: row.get("p_type"),
                v0: row.get("v0"),
                v1: row.get("v1"),
                v2: row.get("v2"),
                v3: row.get("v3"),
                v4: row.get("v4"),
                v5: row.get("v5"),
            })
            .collect())
    }

    async fn save_policy(&self, rows: Vec<CasbinRule>) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        sqlx::query("DELETE FROM casbin_rule")
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
        for row in &rows {
            bind_row(sqlx::query(INSERT_ROW), row)
                .execute(&mut *tx)
                .await
                .map_err(db_error)?;
        }

        tx.commit().await.map_err(db_error)
    }

    async fn add_policy(
        &self,
        _sec: &str,
        ptype: &str,
        rule: &[String],
    ) -> Result<(), StorageError> {
        let row = CasbinRule::from_rule(ptype, rule)?;

        let sql = format!("SELECT COUNT(*) AS count FROM casbin_rule WHERE {EXACT_MATCH}");
        let existing: i64 = bind_row(sqlx::query(&sql), &row)
            .fetch_one(self.pool.as_ref())
            .await
            .map_err(db_error)?
            .get("count");
        if existing > 0 {
            return Ok(());
        }

        bind_row(sqlx::query(INSERT_ROW), &row)
            .execute(self.pool.as_ref())
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn remove_policy(
        &self,
        _sec: &str,
        ptype: &str,
        rule: &[String],
    ) -> Result<(), StorageError> {
        let row = CasbinRule::from_rule(ptype, rule)?;

        let sql = format!("DELETE FROM casbin_rule WHERE {EXACT_MATCH}");
        bind_row(sqlx::query(&sql), &row)
            .execute(self.pool.as_ref())
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn remove_filtered_policy(
        &self,
        _sec: &str,
        ptype: &str,
        field_index: usize,
        field_values: &[String],
    ) -> Result<(), StorageError> {
        let filter = RowFilter::new(ptype, field_index, field_values);
        if filter.is_unsatisfiable() {
            return Ok(());
        }

        let mut sql = String::from("DELETE FROM casbin_rule WHERE p_type = $1");
        let mut values = Vec::new();
        for (column, value) in filter.constraints() {
            values.push(value);
            sql.push_str(&format!(" AND {column} = ${}", values.len() + 1));
        }

        let query = values
            .into_iter()
            .fold(sqlx::query(&sql).bind(filter.ptype.as_str()), |q, v| q.bind(v));
        query
            .execute(self.pool.as_ref())
            .await
            .map_err(db_error)?;
        Ok(())
    }
}
