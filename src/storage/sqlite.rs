use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use super::order_for;
use crate::app::ports::{CollectionRepo, TokenRepo};
use crate::constants::{COLLECTION_ORDER_FIELDS, TOKEN_ORDER_FIELDS};
use crate::domain::{Collection, ListOptions, MintSignatureRecord, OrderBy, SignaturePolicy, Token};
use crate::error::{IndexerError, Result};

const SCHEMA: &str = r#"
    PRAGMA journal_mode=WAL;
    CREATE TABLE IF NOT EXISTS collections (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        p                TEXT NOT NULL,
        tick             TEXT NOT NULL,
        max              INTEGER NOT NULL,
        supply           INTEGER NOT NULL DEFAULT 0,
        base_uri         TEXT,
        name             TEXT,
        description      TEXT,
        image            TEXT,
        attributes       TEXT,
        tx_hash          TEXT NOT NULL,
        block_height     INTEGER NOT NULL,
        block_time       TEXT NOT NULL,
        address          TEXT NOT NULL,
        inscription_id   INTEGER NOT NULL UNIQUE,
        inscription_uid  TEXT NOT NULL UNIQUE,
        signature        TEXT,
        created_at       TEXT NOT NULL,
        updated_at       TEXT NOT NULL,
        UNIQUE (p, tick)
    );
    CREATE TABLE IF NOT EXISTS tokens (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        p                TEXT NOT NULL,
        tick             TEXT NOT NULL,
        token_id         INTEGER NOT NULL,
        tx_hash          TEXT NOT NULL,
        block_height     INTEGER NOT NULL,
        block_time       TEXT NOT NULL,
        address          TEXT NOT NULL,
        inscription_id   INTEGER NOT NULL UNIQUE,
        inscription_uid  TEXT NOT NULL UNIQUE,
        collection_id    INTEGER NOT NULL REFERENCES collections(id),
        sig_uid          TEXT,
        signature        TEXT,
        created_at       TEXT NOT NULL,
        updated_at       TEXT NOT NULL,
        UNIQUE (p, tick, token_id)
    );
    CREATE INDEX IF NOT EXISTS tokens_sig_uid ON tokens (p, tick, sig_uid);
"#;

const COLLECTION_COLUMNS: &str = "id, p, tick, max, supply, base_uri, name, description, image, \
     attributes, tx_hash, block_height, block_time, address, inscription_id, inscription_uid, \
     signature, created_at, updated_at";

const TOKEN_COLUMNS: &str = "id, p, tick, token_id, tx_hash, block_height, block_time, address, \
     inscription_id, inscription_uid, collection_id, signature, created_at, updated_at";

/// Collections and tokens in a local SQLite database.
///
/// Statements run on tokio's blocking pool so a slow query never stalls the
/// executor threads shared by the indexer and the read API.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        conn.execute_batch(SCHEMA)?;
        info!("Opened SQLite store at {}", db_path.display());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `op` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap_or_else(|e| e.into_inner());
            op(&conn)
        })
        .await?
    }
}

fn conflict(entity: &'static str, key: String) -> impl FnOnce(rusqlite::Error) -> IndexerError {
    move |e| {
        if let rusqlite::Error::SqliteFailure(f, _) = &e {
            if f.code == ErrorCode::ConstraintViolation {
                return IndexerError::Conflict { entity, key };
            }
        }
        IndexerError::Database(e)
    }
}

fn time_from_sql(column: &str, value: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            debug!("bad timestamp in column {}: {}", column, value);
            rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e))
        })
}

fn json_from_sql<T: DeserializeOwned>(value: Option<String>) -> rusqlite::Result<Option<T>> {
    value
        .map(|v| serde_json::from_str(&v))
        .transpose()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))
}

fn json_to_sql<T: serde::Serialize>(value: &Option<T>) -> Result<Option<String>> {
    Ok(value.as_ref().map(serde_json::to_string).transpose()?)
}

fn collection_from_row(row: &Row<'_>) -> rusqlite::Result<Collection> {
    Ok(Collection {
        id: Some(row.get("id")?),
        p: row.get("p")?,
        tick: row.get("tick")?,
        max: row.get::<_, i64>("max")? as u64,
        supply: row.get::<_, i64>("supply")? as u64,
        base_uri: row.get("base_uri")?,
        name: row.get("name")?,
        description: row.get("description")?,
        image: row.get("image")?,
        attributes: json_from_sql(row.get("attributes")?)?,
        tx_hash: row.get("tx_hash")?,
        block_height: row.get::<_, i64>("block_height")? as u64,
        block_time: time_from_sql("block_time", row.get("block_time")?)?,
        address: row.get("address")?,
        inscription_id: row.get("inscription_id")?,
        inscription_uid: row.get("inscription_uid")?,
        signature: json_from_sql::<SignaturePolicy>(row.get("signature")?)?,
        created_at: time_from_sql("created_at", row.get("created_at")?)?,
        updated_at: time_from_sql("updated_at", row.get("updated_at")?)?,
    })
}

fn token_from_row(row: &Row<'_>) -> rusqlite::Result<Token> {
    Ok(Token {
        id: Some(row.get("id")?),
        p: row.get("p")?,
        tick: row.get("tick")?,
        token_id: row.get::<_, i64>("token_id")? as u64,
        tx_hash: row.get("tx_hash")?,
        block_height: row.get::<_, i64>("block_height")? as u64,
        block_time: time_from_sql("block_time", row.get("block_time")?)?,
        address: row.get("address")?,
        inscription_id: row.get("inscription_id")?,
        inscription_uid: row.get("inscription_uid")?,
        collection_id: row.get("collection_id")?,
        signature: json_from_sql::<MintSignatureRecord>(row.get("signature")?)?,
        created_at: time_from_sql("created_at", row.get("created_at")?)?,
        updated_at: time_from_sql("updated_at", row.get("updated_at")?)?,
    })
}

/// WHERE clause and bound values for the p/tick filters.
fn filter_clause(opts: &ListOptions) -> (String, Vec<Value>) {
    let mut clauses = Vec::new();
    let mut values = Vec::new();
    if let Some(p) = &opts.p {
        clauses.push("p = ?");
        values.push(Value::Text(p.clone()));
    }
    if let Some(tick) = &opts.tick {
        clauses.push("tick = ?");
        values.push(Value::Text(tick.clone()));
    }
    if clauses.is_empty() {
        (String::new(), values)
    } else {
        (format!(" WHERE {}", clauses.join(" AND ")), values)
    }
}

fn order_clause(order: &[OrderBy]) -> String {
    if order.is_empty() {
        return " ORDER BY id".to_string();
    }
    let fields: Vec<String> = order
        .iter()
        .map(|o| format!("{} {}", o.field, if o.descending { "DESC" } else { "ASC" }))
        .collect();
    format!(" ORDER BY {}", fields.join(", "))
}

fn list_sql(table: &str, columns: &str, opts: &ListOptions, order: &[OrderBy]) -> (String, Vec<Value>) {
    let (filter, mut values) = filter_clause(opts);
    let limit = if opts.limit == 0 { -1 } else { opts.limit as i64 };
    values.push(Value::Integer(limit));
    values.push(Value::Integer(opts.offset as i64));
    (
        format!(
            "SELECT {columns} FROM {table}{filter}{} LIMIT ? OFFSET ?",
            order_clause(order)
        ),
        values,
    )
}

fn count_sql(table: &str, opts: &ListOptions) -> (String, Vec<Value>) {
    let (filter, values) = filter_clause(opts);
    (format!("SELECT COUNT(*) FROM {table}{filter}"), values)
}

fn not_found(entity: &'static str, id: i64) -> IndexerError {
    IndexerError::NotFound {
        entity,
        key: id.to_string(),
    }
}

#[async_trait]
impl CollectionRepo for SqliteStore {
    async fn create(&self, collection: &mut Collection) -> Result<()> {
        let now = Utc::now();
        let attributes = json_to_sql(&collection.attributes)?;
        let signature = json_to_sql(&collection.signature)?;
        let row = collection.clone();
        let id = self
            .with_conn(move |conn| {
                conn.execute(
                    "INSERT INTO collections (p, tick, max, supply, base_uri, name, description, image,
                        attributes, tx_hash, block_height, block_time, address, inscription_id,
                        inscription_uid, signature, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?17)",
                    params![
                        row.p,
                        row.tick,
                        row.max as i64,
                        row.supply as i64,
                        row.base_uri,
                        row.name,
                        row.description,
                        row.image,
                        attributes,
                        row.tx_hash,
                        row.block_height as i64,
                        row.block_time.to_rfc3339(),
                        row.address,
                        row.inscription_id,
                        row.inscription_uid,
                        signature,
                        now.to_rfc3339(),
                    ],
                )
                .map_err(conflict(
                    "collection",
                    format!("{}/{} ({})", row.p, row.tick, row.inscription_id),
                ))?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        collection.id = Some(id);
        collection.created_at = now;
        collection.updated_at = now;
        debug!("Created collection: {} with id {}", collection.tick, id);
        Ok(())
    }

    async fn update(&self, collection: &Collection) -> Result<()> {
        let id = collection.id.ok_or_else(|| IndexerError::MissingField("collection.id".into()))?;
        let attributes = json_to_sql(&collection.attributes)?;
        let signature = json_to_sql(&collection.signature)?;
        let row = collection.clone();
        let changed = self
            .with_conn(move |conn| {
                Ok(conn.execute(
                    "UPDATE collections SET max = ?1, supply = ?2, base_uri = ?3, name = ?4,
                        description = ?5, image = ?6, attributes = ?7, signature = ?8, updated_at = ?9
                     WHERE id = ?10",
                    params![
                        row.max as i64,
                        row.supply as i64,
                        row.base_uri,
                        row.name,
                        row.description,
                        row.image,
                        attributes,
                        signature,
                        Utc::now().to_rfc3339(),
                        id,
                    ],
                )?)
            })
            .await?;
        if changed == 0 {
            return Err(not_found("collection", id));
        }
        debug!("Updated collection: {} with id {}", collection.tick, id);
        Ok(())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Collection>> {
        self.with_conn(move |conn| {
            let sql = format!("SELECT {COLLECTION_COLUMNS} FROM collections WHERE id = ?1");
            Ok(conn.query_row(&sql, params![id], collection_from_row).optional()?)
        })
        .await
    }

    async fn find_by_tick(&self, p: &str, tick: &str) -> Result<Option<Collection>> {
        let (p, tick) = (p.to_string(), tick.to_string());
        self.with_conn(move |conn| {
            let sql = format!("SELECT {COLLECTION_COLUMNS} FROM collections WHERE p = ?1 AND tick = ?2");
            Ok(conn.query_row(&sql, params![p, tick], collection_from_row).optional()?)
        })
        .await
    }

    async fn find_by_inscription_id(&self, inscription_id: i64) -> Result<Option<Collection>> {
        self.with_conn(move |conn| {
            let sql = format!("SELECT {COLLECTION_COLUMNS} FROM collections WHERE inscription_id = ?1");
            Ok(conn
                .query_row(&sql, params![inscription_id], collection_from_row)
                .optional()?)
        })
        .await
    }

    async fn list(&self, opts: &ListOptions) -> Result<Vec<Collection>> {
        let order = order_for(opts, COLLECTION_ORDER_FIELDS);
        let (sql, values) = list_sql("collections", COLLECTION_COLUMNS, opts, &order);
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(values), collection_from_row)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
    }

    async fn count(&self, opts: &ListOptions) -> Result<usize> {
        let (sql, values) = count_sql("collections", opts);
        self.with_conn(move |conn| {
            let count: i64 = conn.query_row(&sql, params_from_iter(values), |row| row.get(0))?;
            Ok(count as usize)
        })
        .await
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let changed = self
            .with_conn(move |conn| Ok(conn.execute("DELETE FROM collections WHERE id = ?1", params![id])?))
            .await?;
        if changed == 0 {
            return Err(not_found("collection", id));
        }
        Ok(())
    }
}

#[async_trait]
impl TokenRepo for SqliteStore {
    async fn create(&self, token: &mut Token) -> Result<()> {
        let now = Utc::now();
        let sig_uid = token.signature.as_ref().and_then(|s| s.uid.clone());
        let signature = json_to_sql(&token.signature)?;
        let row = token.clone();
        let id = self
            .with_conn(move |conn| {
                conn.execute(
                    "INSERT INTO tokens (p, tick, token_id, tx_hash, block_height, block_time, address,
                        inscription_id, inscription_uid, collection_id, sig_uid, signature, created_at,
                        updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)",
                    params![
                        row.p,
                        row.tick,
                        row.token_id as i64,
                        row.tx_hash,
                        row.block_height as i64,
                        row.block_time.to_rfc3339(),
                        row.address,
                        row.inscription_id,
                        row.inscription_uid,
                        row.collection_id,
                        sig_uid,
                        signature,
                        now.to_rfc3339(),
                    ],
                )
                .map_err(conflict(
                    "token",
                    format!("{}/{}#{} ({})", row.p, row.tick, row.token_id, row.inscription_id),
                ))?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        token.id = Some(id);
        token.created_at = now;
        token.updated_at = now;
        debug!("Created token: {}#{} with id {}", token.tick, token.token_id, id);
        Ok(())
    }

    async fn update(&self, token: &Token) -> Result<()> {
        let id = token.id.ok_or_else(|| IndexerError::MissingField("token.id".into()))?;
        let sig_uid = token.signature.as_ref().and_then(|s| s.uid.clone());
        let signature = json_to_sql(&token.signature)?;
        let address = token.address.clone();
        let changed = self
            .with_conn(move |conn| {
                Ok(conn.execute(
                    "UPDATE tokens SET address = ?1, sig_uid = ?2, signature = ?3, updated_at = ?4
                     WHERE id = ?5",
                    params![address, sig_uid, signature, Utc::now().to_rfc3339(), id],
                )?)
            })
            .await?;
        if changed == 0 {
            return Err(not_found("token", id));
        }
        Ok(())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Token>> {
        self.with_conn(move |conn| {
            let sql = format!("SELECT {TOKEN_COLUMNS} FROM tokens WHERE id = ?1");
            Ok(conn.query_row(&sql, params![id], token_from_row).optional()?)
        })
        .await
    }

    async fn find_by_tick_token_id(&self, p: &str, tick: &str, token_id: u64) -> Result<Option<Token>> {
        let (p, tick) = (p.to_string(), tick.to_string());
        self.with_conn(move |conn| {
            let sql = format!("SELECT {TOKEN_COLUMNS} FROM tokens WHERE p = ?1 AND tick = ?2 AND token_id = ?3");
            Ok(conn
                .query_row(&sql, params![p, tick, token_id as i64], token_from_row)
                .optional()?)
        })
        .await
    }

    async fn find_by_inscription_id(&self, inscription_id: i64) -> Result<Option<Token>> {
        self.with_conn(move |conn| {
            let sql = format!("SELECT {TOKEN_COLUMNS} FROM tokens WHERE inscription_id = ?1");
            Ok(conn
                .query_row(&sql, params![inscription_id], token_from_row)
                .optional()?)
        })
        .await
    }

    async fn find_by_sig_uid(&self, p: &str, tick: &str, uid: &str) -> Result<Option<Token>> {
        let (p, tick, uid) = (p.to_string(), tick.to_string(), uid.to_string());
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {TOKEN_COLUMNS} FROM tokens WHERE p = ?1 AND tick = ?2 AND sig_uid = ?3 LIMIT 1"
            );
            Ok(conn
                .query_row(&sql, params![p, tick, uid], token_from_row)
                .optional()?)
        })
        .await
    }

    async fn list(&self, opts: &ListOptions) -> Result<Vec<Token>> {
        let order = order_for(opts, TOKEN_ORDER_FIELDS);
        let (sql, values) = list_sql("tokens", TOKEN_COLUMNS, opts, &order);
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(values), token_from_row)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
    }

    async fn count(&self, opts: &ListOptions) -> Result<usize> {
        let (sql, values) = count_sql("tokens", opts);
        self.with_conn(move |conn| {
            let count: i64 = conn.query_row(&sql, params_from_iter(values), |row| row.get(0))?;
            Ok(count as usize)
        })
        .await
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let changed = self
            .with_conn(move |conn| Ok(conn.execute("DELETE FROM tokens WHERE id = ?1", params![id])?))
            .await?;
        if changed == 0 {
            return Err(not_found("token", id));
        }
        Ok(())
    }
}
