use crate::errors::ApiError;
use crate::models::{EventRecord, OutboxRecord};
use chrono::{DateTime, Utc};
use shielded_pool::{Address, Envelope, PoolEvent};
use sqlx::{sqlite::SqlitePoolOptions, Pool, Row, Sqlite};

pub type Db = Pool<Sqlite>;

pub async fn connect(db_url: &str) -> Result<Db, ApiError> {
    SqlitePoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
        .map_err(|_| ApiError::Internal)
}

pub async fn init_schema(db: &Db) -> Result<(), ApiError> {
    // Append-only: indexers read `events`, relayers read `outbox`.
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS events (
  pool TEXT NOT NULL,
  seq INTEGER NOT NULL,
  kind TEXT NOT NULL,
  payload_json TEXT NOT NULL,
  created_at TEXT NOT NULL,
  PRIMARY KEY(pool, seq)
);

CREATE TABLE IF NOT EXISTS outbox (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  pool TEXT NOT NULL,
  envelope_id TEXT NOT NULL UNIQUE,
  destination_domain INTEGER NOT NULL,
  envelope_json TEXT NOT NULL,
  created_at TEXT NOT NULL
);
"#,
    )
    .execute(db)
    .await
    .map_err(|_| ApiError::Internal)?;

    Ok(())
}

/// Drop rows left by an earlier process for `pool`; its state does not survive restarts.
pub async fn reset_pool(db: &Db, pool: &Address) -> Result<(), ApiError> {
    for table in ["events", "outbox"] {
        sqlx::query(&format!("DELETE FROM {table} WHERE pool = ?"))
            .bind(pool.to_string())
            .execute(db)
            .await
            .map_err(|_| ApiError::Internal)?;
    }
    Ok(())
}

pub async fn append_events(db: &Db, pool: &Address, events: &[(u64, PoolEvent)]) -> Result<(), ApiError> {
    let created_at = Utc::now().to_rfc3339();

    for (seq, event) in events {
        let payload = serde_json::to_string(event).map_err(|_| ApiError::Internal)?;
        sqlx::query(
            r#"INSERT OR IGNORE INTO events (pool, seq, kind, payload_json, created_at)
               VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(pool.to_string())
        .bind(*seq as i64)
        .bind(event.kind())
        .bind(payload)
        .bind(created_at.as_str())
        .execute(db)
        .await
        .map_err(|_| ApiError::Internal)?;
    }

    Ok(())
}

pub async fn list_events(db: &Db, pool: &Address, offset: u64, limit: u64) -> Result<Vec<EventRecord>, ApiError> {
    let rows = sqlx::query(
        r#"SELECT seq, kind, payload_json, created_at
           FROM events
           WHERE pool = ?
           ORDER BY seq
           LIMIT ? OFFSET ?"#,
    )
    .bind(pool.to_string())
    .bind(limit as i64)
    .bind(offset as i64)
    .fetch_all(db)
    .await
    .map_err(|_| ApiError::Internal)?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let seq: i64 = row.get(0);
        let kind: String = row.get(1);
        let payload_json: String = row.get(2);
        let created_at: String = row.get(3);

        out.push(EventRecord {
            seq: seq as u64,
            kind,
            payload: serde_json::from_str(&payload_json).map_err(|_| ApiError::Internal)?,
            created_at: parse_time(&created_at)?,
        });
    }

    Ok(out)
}

pub async fn enqueue_envelopes(db: &Db, pool: &Address, envelopes: &[Envelope]) -> Result<(), ApiError> {
    let created_at = Utc::now().to_rfc3339();

    for envelope in envelopes {
        let json = serde_json::to_string(envelope).map_err(|_| ApiError::Internal)?;
        sqlx::query(
            r#"INSERT OR IGNORE INTO outbox (pool, envelope_id, destination_domain, envelope_json, created_at)
               VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(pool.to_string())
        .bind(format!("0x{}", hex::encode(envelope.id())))
        .bind(i64::from(envelope.destination_domain))
        .bind(json)
        .bind(created_at.as_str())
        .execute(db)
        .await
        .map_err(|_| ApiError::Internal)?;
    }

    Ok(())
}

pub async fn list_outbox(db: &Db, pool: &Address, offset: u64, limit: u64) -> Result<Vec<OutboxRecord>, ApiError> {
    let rows = sqlx::query(
        r#"SELECT id, envelope_id, envelope_json, created_at
           FROM outbox
           WHERE pool = ?
           ORDER BY id
           LIMIT ? OFFSET ?"#,
    )
    .bind(pool.to_string())
    .bind(limit as i64)
    .bind(offset as i64)
    .fetch_all(db)
    .await
    .map_err(|_| ApiError::Internal)?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let id: i64 = row.get(0);
        let envelope_id: String = row.get(1);
        let envelope_json: String = row.get(2);
        let created_at: String = row.get(3);

        out.push(OutboxRecord {
            id: id as u64,
            envelope_id,
            envelope: serde_json::from_str(&envelope_json).map_err(|_| ApiError::Internal)?,
            created_at: parse_time(&created_at)?,
        });
    }

    Ok(out)
}

fn parse_time(s: &str) -> Result<DateTime<Utc>, ApiError> {
    Ok(DateTime::parse_from_rfc3339(s)
        .map_err(|_| ApiError::Internal)?
        .with_timezone(&Utc))
}
