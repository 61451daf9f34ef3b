use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context as _, Result};
use rusqlite::{Connection, OptionalExtension as _, params};

use super::{PaymentAttempt, SwapRecord};
use crate::swap::keys;

/// Legacy probing scheme: payers may look a swap up under
/// sha256("probing-01:" || payment_hash) to test without funding.
const PROBING_PREFIX: &[u8] = b"probing-01:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutSwap {
    Inserted,
    Duplicate,
}

#[derive(Debug)]
pub struct SwapStore {
    conn: Connection,
    path: PathBuf,
}

impl SwapStore {
    pub fn open(path: PathBuf) -> Result<Self> {
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create store dir {}", dir.display()))?;
        }

        let conn =
            Connection::open(&path).with_context(|| format!("open sqlite {}", path.display()))?;
        conn.busy_timeout(Duration::from_secs(5))
            .context("set sqlite busy_timeout")?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")
            .context("configure sqlite pragmas")?;

        migrate(&conn).context("migrate sqlite schema")?;

        Ok(Self { conn, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn put_swap(&mut self, record: &SwapRecord) -> Result<PutSwap> {
        let rows = self
            .conn
            .execute(
                r#"
INSERT INTO submarineswap (network_id, payment_hash, lock_height, swapper_key, script)
VALUES (?1, ?2, ?3, ?4, ?5)
ON CONFLICT DO NOTHING
"#,
                params![
                    record.network_id,
                    &record.payment_hash[..],
                    record.lock_height,
                    &record.swapper_key[..],
                    &record.script,
                ],
            )
            .with_context(|| format!("insert swap {}", hex::encode(record.payment_hash)))?;

        Ok(if rows == 0 {
            PutSwap::Duplicate
        } else {
            PutSwap::Inserted
        })
    }

    pub fn get_swap(&self, payment_hash: &[u8; 32]) -> Result<Option<SwapRecord>> {
        let exact = self
            .conn
            .query_row(
                r#"
SELECT network_id, payment_hash, lock_height, swapper_key, script
FROM submarineswap
WHERE payment_hash = ?1
"#,
                params![&payment_hash[..]],
                row_to_swap_record,
            )
            .optional()
            .with_context(|| format!("get swap {}", hex::encode(payment_hash)))?;
        if exact.is_some() {
            return Ok(exact);
        }

        let mut stmt = self
            .conn
            .prepare(
                "SELECT network_id, payment_hash, lock_height, swapper_key, script FROM submarineswap",
            )
            .context("prepare probing scan")?;
        let rows = stmt
            .query_map([], row_to_swap_record)
            .context("query probing scan")?;

        for row in rows {
            let record = row.context("read swap row")?;
            let mut probe = Vec::with_capacity(PROBING_PREFIX.len() + record.payment_hash.len());
            probe.extend_from_slice(PROBING_PREFIX);
            probe.extend_from_slice(&record.payment_hash);
            if keys::sha256(&probe) == *payment_hash {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    pub fn put_payment(&mut self, payment_hash: &str, payment_request: &str) -> Result<()> {
        self.conn
            .execute(
                r#"
INSERT INTO swap_payments (payment_hash, payment_request, txid)
VALUES (?1, ?2, '[]')
ON CONFLICT DO NOTHING
"#,
                params![payment_hash, payment_request],
            )
            .with_context(|| format!("insert payment {payment_hash}"))?;
        Ok(())
    }

    pub fn append_txid(&mut self, payment_hash: &str, txid: &str) -> Result<()> {
        let tx = self.conn.transaction().context("begin append_txid")?;

        let stored: String = tx
            .query_row(
                "SELECT txid FROM swap_payments WHERE payment_hash = ?1",
                params![payment_hash],
                |row| row.get(0),
            )
            .with_context(|| format!("payment attempt not found: {payment_hash}"))?;
        let mut txids: Vec<String> =
            serde_json::from_str(&stored).with_context(|| format!("decode txid list {stored:?}"))?;
        txids.push(txid.to_string());

        tx.execute(
            "UPDATE swap_payments SET txid = ?2 WHERE payment_hash = ?1",
            params![payment_hash, serde_json::to_string(&txids)?],
        )
        .with_context(|| format!("update txid list {payment_hash}"))?;

        tx.commit().context("commit append_txid")
    }

    pub fn get_payment(&self, payment_hash: &str) -> Result<Option<PaymentAttempt>> {
        self.conn
            .query_row(
                "SELECT payment_hash, payment_request, txid FROM swap_payments WHERE payment_hash = ?1",
                params![payment_hash],
                |row| {
                    let stored: String = row.get(2)?;
                    let txids = serde_json::from_str(&stored).map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(
                            2,
                            rusqlite::types::Type::Text,
                            format!("invalid txid list: {e}").into(),
                        )
                    })?;
                    Ok(PaymentAttempt {
                        payment_hash: row.get(0)?,
                        payment_request: row.get(1)?,
                        txids,
                    })
                },
            )
            .optional()
            .with_context(|| format!("get payment {payment_hash}"))
    }
}

fn row_to_swap_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<SwapRecord> {
    let network_id: i64 = row.get(0)?;
    let payment_hash: Vec<u8> = row.get(1)?;
    let swapper_key: Vec<u8> = row.get(3)?;

    Ok(SwapRecord {
        network_id: u8::try_from(network_id).map_err(|_| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Integer,
                format!("invalid network_id {network_id}").into(),
            )
        })?,
        payment_hash: payment_hash.as_slice().try_into().map_err(|_| {
            rusqlite::Error::FromSqlConversionFailure(
                1,
                rusqlite::types::Type::Blob,
                format!("payment_hash must be 32 bytes, got {}", payment_hash.len()).into(),
            )
        })?,
        lock_height: row.get(2)?,
        swapper_key: swapper_key.as_slice().try_into().map_err(|_| {
            rusqlite::Error::FromSqlConversionFailure(
                3,
                rusqlite::types::Type::Blob,
                format!("swapper_key must be 32 bytes, got {}", swapper_key.len()).into(),
            )
        })?,
        script: row.get(4)?,
    })
}

fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS submarineswap (
  network_id INTEGER NOT NULL,
  payment_hash BLOB PRIMARY KEY,
  lock_height INTEGER NOT NULL,
  swapper_key BLOB NOT NULL,
  script BLOB NOT NULL
);

CREATE TABLE IF NOT EXISTS swap_payments (
  payment_hash TEXT PRIMARY KEY,
  payment_request TEXT NOT NULL,
  txid TEXT NOT NULL DEFAULT '[]'
);
"#,
    )
    .context("create tables")
}
