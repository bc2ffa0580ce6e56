//! Database layer — migrations and the ledger call journal.

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

use crate::errors::Result;

/// A journaled ledger call as stored in / read from the database.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct JournalEntry {
    pub seq: i64,
    pub tx_hash: String,
    pub actor: String,
    pub operation: String,
    pub call_json: String,
    pub applied_at: i64,
}

/// Establish a SQLite connection pool and run pending migrations.
pub async fn init_pool(database_url: &str) -> Result<SqlitePool> {
    let url = if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        format!("sqlite:{database_url}")
    };

    // Every connection to `:memory:` opens its own database.
    let max_connections = if url.contains(":memory:") { 1 } else { 5 };

    let options = SqliteConnectOptions::from_str(&url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database migrations applied successfully");
    Ok(pool)
}

// ─────────────────────────────────────────────────────────
// Journal writes
// ─────────────────────────────────────────────────────────

/// Append one call to the journal.
pub async fn append_entry(pool: &SqlitePool, entry: &JournalEntry) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO ledger_journal (seq, tx_hash, actor, operation, call_json, applied_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )
    .bind(entry.seq)
    .bind(&entry.tx_hash)
    .bind(&entry.actor)
    .bind(&entry.operation)
    .bind(&entry.call_json)
    .bind(entry.applied_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Drop a journaled call the ledger rejected.
pub async fn delete_entry(pool: &SqlitePool, tx_hash: &str) -> Result<()> {
    sqlx::query("DELETE FROM ledger_journal WHERE tx_hash = ?1")
        .bind(tx_hash)
        .execute(pool)
        .await?;
    Ok(())
}

// ─────────────────────────────────────────────────────────
// Journal reads
// ─────────────────────────────────────────────────────────

/// Fetch the whole journal in application order.
pub async fn load_entries(pool: &SqlitePool) -> Result<Vec<JournalEntry>> {
    let rows = sqlx::query_as::<_, JournalEntry>(
        r#"
        SELECT seq, tx_hash, actor, operation, call_json, applied_at
        FROM   ledger_journal
        ORDER  BY seq ASC
        "#,
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Highest sequence number journaled so far, or `0` for an empty journal.
pub async fn last_seq(pool: &SqlitePool) -> Result<i64> {
    let row: Option<(Option<i64>,)> = sqlx::query_as("SELECT MAX(seq) FROM ledger_journal")
        .fetch_optional(pool)
        .await?;
    Ok(row.and_then(|(v,)| v).unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(seq: i64, tx: &str) -> JournalEntry {
        JournalEntry {
            seq,
            tx_hash: tx.to_string(),
            actor: "0xowner".to_string(),
            operation: "withdraw_funds".to_string(),
            call_json: r#"{"call":"withdraw","asset_id":0}"#.to_string(),
            applied_at: 1_700_000_000,
        }
    }

    #[tokio::test]
    async fn journal_roundtrip_in_order() {
        let pool = init_pool("sqlite::memory:").await.unwrap();
        assert_eq!(last_seq(&pool).await.unwrap(), 0);

        append_entry(&pool, &entry(2, "0xb")).await.unwrap();
        append_entry(&pool, &entry(1, "0xa")).await.unwrap();
        append_entry(&pool, &entry(3, "0xc")).await.unwrap();
        delete_entry(&pool, "0xb").await.unwrap();

        let rows = load_entries(&pool).await.unwrap();
        let hashes: Vec<_> = rows.iter().map(|r| r.tx_hash.as_str()).collect();
        assert_eq!(hashes, vec!["0xa", "0xc"]);
        assert_eq!(last_seq(&pool).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn duplicate_tx_hash_rejected() {
        let pool = init_pool("sqlite::memory:").await.unwrap();
        append_entry(&pool, &entry(1, "0xa")).await.unwrap();
        assert!(append_entry(&pool, &entry(2, "0xa")).await.is_err());
    }
}
