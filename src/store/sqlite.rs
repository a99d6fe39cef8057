//! SQLite implementation of both store traits.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::info;

use super::schema;
use super::{
    NewUser, StoreError, Subscription, SubscriptionStatus, SubscriptionStore, Unit, UnitCatalog,
    UnitKey, UnitRecord, User,
};

pub type DbPool = Pool<SqliteConnectionManager>;

const UNIT_COLUMNS: &str =
    "id, city, storage_name, size, dimension, price, available, description, created_at, updated_at";
const USER_COLUMNS: &str =
    "id, telegram_id, username, first_name, last_name, created_at, updated_at, last_notified";
const SUBSCRIPTION_COLUMNS: &str =
    "id, user_id, city, storage_name, unit_size, status, created_at, updated_at";

fn unit_from_row(row: &Row<'_>) -> rusqlite::Result<Unit> {
    Ok(Unit {
        id: row.get(0)?,
        key: UnitKey {
            city: row.get(1)?,
            storage_name: row.get(2)?,
            size: row.get(3)?,
        },
        dimension: row.get(4)?,
        price: row.get(5)?,
        available: row.get(6)?,
        description: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        telegram_id: row.get(1)?,
        username: row.get(2)?,
        first_name: row.get(3)?,
        last_name: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
        last_notified: row.get(7)?,
    })
}

fn subscription_from_row(row: &Row<'_>) -> rusqlite::Result<Subscription> {
    let status: String = row.get(5)?;
    let status = status
        .parse::<SubscriptionStatus>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?;

    Ok(Subscription {
        id: row.get(0)?,
        user_id: row.get(1)?,
        criteria: UnitKey {
            city: row.get(2)?,
            storage_name: row.get(3)?,
            size: row.get(4)?,
        },
        status,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn query_strings<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> Result<Vec<String>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, |row| row.get(0))?;
    Ok(rows.collect::<Result<Vec<String>, _>>()?)
}

/// Store backed by a pooled SQLite database.
#[derive(Clone)]
pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    /// Opens (or creates) the database file and applies the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let manager = SqliteConnectionManager::file(path.as_ref()).with_init(configure_connection);
        let pool = Pool::builder().max_size(8).build(manager)?;
        let store = Self::from_pool(pool)?;
        info!("Opened SQLite database at {}", path.as_ref().display());
        Ok(store)
    }

    /// Opens a private in-memory database.
    ///
    /// The pool holds a single connection so every query sees the same data.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let manager = SqliteConnectionManager::memory().with_init(configure_connection);
        let pool = Pool::builder().max_size(1).build(manager)?;
        Self::from_pool(pool)
    }

    fn from_pool(pool: DbPool) -> Result<Self, StoreError> {
        let conn = pool.get()?;
        schema::migrate(&conn)?;
        drop(conn);
        Ok(Self { pool })
    }

    /// Runs a blocking database closure on the blocking thread pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            f(&conn)
        })
        .await?
    }
}

fn configure_connection(conn: &mut Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("connections", &self.pool.state().connections)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl UnitCatalog for SqliteStore {
    async fn upsert_unit(&self, record: UnitRecord) -> Result<Unit, StoreError> {
        self.with_conn(move |conn| {
            let now = Utc::now();
            let sql = format!(
                "INSERT INTO units (city, storage_name, size, dimension, price, available, description, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
                 ON CONFLICT(city, storage_name, size) DO UPDATE SET
                   dimension = excluded.dimension,
                   price = excluded.price,
                   available = excluded.available,
                   description = excluded.description,
                   updated_at = excluded.updated_at
                 RETURNING {UNIT_COLUMNS}"
            );
            let unit = conn.query_row(
                &sql,
                params![
                    record.key.city,
                    record.key.storage_name,
                    record.key.size,
                    record.dimension,
                    record.price,
                    record.available,
                    record.description,
                    now,
                ],
                unit_from_row,
            )?;
            Ok(unit)
        })
        .await
    }

    async fn find_unit(&self, key: &UnitKey) -> Result<Option<Unit>, StoreError> {
        let key = key.clone();
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {UNIT_COLUMNS} FROM units WHERE city = ?1 AND storage_name = ?2 AND size = ?3"
            );
            Ok(conn
                .query_row(
                    &sql,
                    params![key.city, key.storage_name, key.size],
                    unit_from_row,
                )
                .optional()?)
        })
        .await
    }

    async fn all_units(&self) -> Result<Vec<Unit>, StoreError> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {UNIT_COLUMNS} FROM units ORDER BY id");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], unit_from_row)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }

    async fn cities(&self) -> Result<Vec<String>, StoreError> {
        self.with_conn(|conn| {
            query_strings(conn, "SELECT DISTINCT city FROM units ORDER BY city", [])
        })
        .await
    }

    async fn storages_in(&self, city: &str) -> Result<Vec<String>, StoreError> {
        let city = city.to_owned();
        self.with_conn(move |conn| {
            query_strings(
                conn,
                "SELECT DISTINCT storage_name FROM units WHERE city = ?1 ORDER BY storage_name",
                params![city],
            )
        })
        .await
    }

    async fn sizes_in(&self, city: &str, storage_name: &str) -> Result<Vec<String>, StoreError> {
        let city = city.to_owned();
        let storage_name = storage_name.to_owned();
        self.with_conn(move |conn| {
            query_strings(
                conn,
                "SELECT DISTINCT size FROM units WHERE city = ?1 AND storage_name = ?2 ORDER BY size",
                params![city, storage_name],
            )
        })
        .await
    }
}

#[async_trait]
impl SubscriptionStore for SqliteStore {
    async fn active_subscriptions(&self) -> Result<Vec<Subscription>, StoreError> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE status = ?1 ORDER BY id"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(
                params![SubscriptionStatus::Active.as_str()],
                subscription_from_row,
            )?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }

    async fn get_user(&self, id: i64) -> Result<User, StoreError> {
        self.with_conn(move |conn| {
            let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
            conn.query_row(&sql, params![id], user_from_row)
                .optional()?
                .ok_or(StoreError::NotFound { entity: "user", id })
        })
        .await
    }

    async fn update_user_last_notified(
        &self,
        id: i64,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE users SET last_notified = ?1, updated_at = ?2 WHERE id = ?3",
                params![at, Utc::now(), id],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound { entity: "user", id });
            }
            Ok(())
        })
        .await
    }

    async fn find_user_by_telegram_id(
        &self,
        telegram_id: i64,
    ) -> Result<Option<User>, StoreError> {
        self.with_conn(move |conn| {
            let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE telegram_id = ?1");
            Ok(conn
                .query_row(&sql, params![telegram_id], user_from_row)
                .optional()?)
        })
        .await
    }

    async fn register_user(&self, user: NewUser) -> Result<User, StoreError> {
        self.with_conn(move |conn| {
            let sql = format!(
                "INSERT INTO users (telegram_id, username, first_name, last_name, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)
                 ON CONFLICT(telegram_id) DO UPDATE SET
                   username = excluded.username,
                   first_name = excluded.first_name,
                   last_name = excluded.last_name,
                   updated_at = excluded.updated_at
                 RETURNING {USER_COLUMNS}"
            );
            Ok(conn.query_row(
                &sql,
                params![
                    user.telegram_id,
                    user.username,
                    user.first_name,
                    user.last_name,
                    Utc::now(),
                ],
                user_from_row,
            )?)
        })
        .await
    }

    async fn subscribe(
        &self,
        user_id: i64,
        criteria: UnitKey,
    ) -> Result<Subscription, StoreError> {
        self.with_conn(move |conn| {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1)",
                params![user_id],
                |row| row.get(0),
            )?;
            if !exists {
                return Err(StoreError::NotFound {
                    entity: "user",
                    id: user_id,
                });
            }

            let sql = format!(
                "INSERT INTO subscriptions (user_id, city, storage_name, unit_size, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                 ON CONFLICT(user_id, city, storage_name, unit_size) DO UPDATE SET
                   status = excluded.status,
                   updated_at = excluded.updated_at
                 RETURNING {SUBSCRIPTION_COLUMNS}"
            );
            Ok(conn.query_row(
                &sql,
                params![
                    user_id,
                    criteria.city,
                    criteria.storage_name,
                    criteria.size,
                    SubscriptionStatus::Active.as_str(),
                    Utc::now(),
                ],
                subscription_from_row,
            )?)
        })
        .await
    }

    async fn subscriptions_for_user(&self, user_id: i64) -> Result<Vec<Subscription>, StoreError> {
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions
                 WHERE user_id = ?1 AND status = ?2
                 ORDER BY created_at, id"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(
                params![user_id, SubscriptionStatus::Active.as_str()],
                subscription_from_row,
            )?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }

    async fn deactivate_subscription(
        &self,
        user_id: i64,
        subscription_id: i64,
    ) -> Result<bool, StoreError> {
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE subscriptions SET status = ?1, updated_at = ?2
                 WHERE id = ?3 AND user_id = ?4 AND status = ?5",
                params![
                    SubscriptionStatus::Inactive.as_str(),
                    Utc::now(),
                    subscription_id,
                    user_id,
                    SubscriptionStatus::Active.as_str(),
                ],
            )?;
            Ok(changed > 0)
        })
        .await
    }
}
