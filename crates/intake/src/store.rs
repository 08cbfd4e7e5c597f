//! SQLite 레코드 저장소
//!
//! 배치는 `(client_id, content_hash)`를 기본 키로 기록합니다. 같은 봉투가
//! 다시 도착하면 `INSERT OR IGNORE`가 아무 행도 만들지 않으므로 레코드를 다시
//! 쓰지 않고 [`StoreOutcome::Duplicate`]를 반환합니다. 배치 행과 레코드 행은
//! 같은 트랜잭션에서 커밋됩니다.

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::{Connection, TransactionBehavior, params};
use tracing::debug;

use logpost_core::event::LogBatch;

use crate::error::IntakeError;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS ingested_batches (
    client_id    TEXT    NOT NULL,
    content_hash TEXT    NOT NULL,
    record_count INTEGER NOT NULL,
    received_at  INTEGER NOT NULL,
    PRIMARY KEY (client_id, content_hash)
);
CREATE TABLE IF NOT EXISTS log_records (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    client_id    TEXT    NOT NULL,
    content_hash TEXT    NOT NULL,
    record_index INTEGER NOT NULL,
    timestamp    INTEGER NOT NULL,
    severity     TEXT    NOT NULL,
    severity_num INTEGER NOT NULL,
    body         TEXT    NOT NULL,
    attributes   TEXT    NOT NULL,
    resource     TEXT    NOT NULL,
    trace_id     TEXT,
    span_id      TEXT,
    UNIQUE (client_id, content_hash, record_index)
);
CREATE INDEX IF NOT EXISTS log_records_client_ts_idx ON log_records(client_id, timestamp);
";

/// 저장 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    /// 새 배치를 저장함 (레코드 수)
    Stored(usize),
    /// 이미 저장된 배치 (아무것도 쓰지 않음)
    Duplicate,
}

/// 인테이크 레코드 저장소
///
/// `Clone`은 같은 연결을 공유합니다.
#[derive(Clone)]
pub struct RecordStore {
    conn: Arc<Mutex<Connection>>,
}

impl RecordStore {
    /// 데이터베이스를 열고 스키마를 준비합니다.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, IntakeError> {
        let path = path.as_ref().to_path_buf();
        let conn = tokio::task::spawn_blocking(move || open_connection(&path))
            .await
            .map_err(|e| IntakeError::Storage(format!("blocking task failed: {e}")))??;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 배치를 멱등하게 저장합니다.
    pub async fn persist(
        &self,
        client_id: &str,
        content_hash: &str,
        batch: &LogBatch,
    ) -> Result<StoreOutcome, IntakeError> {
        let client_id = client_id.to_owned();
        let content_hash = content_hash.to_owned();
        let rows = batch
            .records
            .iter()
            .map(|r| {
                Ok(RecordRow {
                    timestamp: r.timestamp,
                    severity: r.severity.clone(),
                    severity_num: r.severity_num,
                    body: r.body.clone(),
                    attributes: serde_json::to_string(&r.attributes)?,
                    resource: serde_json::to_string(&r.resource)?,
                    trace_id: r.trace_id.clone(),
                    span_id: r.span_id.clone(),
                })
            })
            .collect::<Result<Vec<_>, serde_json::Error>>()
            .map_err(|e| IntakeError::Storage(format!("attribute encoding failed: {e}")))?;
        let received_at = chrono::Utc::now().timestamp_millis();

        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO ingested_batches (client_id, content_hash, record_count, received_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![client_id, content_hash, rows.len() as i64, received_at],
            )?;
            if inserted == 0 {
                debug!(client_id = %client_id, content_hash = %content_hash, "duplicate batch ignored");
                return Ok(StoreOutcome::Duplicate);
            }
            {
                let mut stmt = tx.prepare(
                    "INSERT OR IGNORE INTO log_records
                     (client_id, content_hash, record_index, timestamp, severity, severity_num,
                      body, attributes, resource, trace_id, span_id)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                )?;
                for (index, row) in rows.iter().enumerate() {
                    stmt.execute(params![
                        client_id,
                        content_hash,
                        index as i64,
                        row.timestamp,
                        row.severity,
                        row.severity_num,
                        row.body,
                        row.attributes,
                        row.resource,
                        row.trace_id,
                        row.span_id,
                    ])?;
                }
            }
            tx.commit()?;
            Ok(StoreOutcome::Stored(rows.len()))
        })
        .await
    }

    /// 클라이언트의 저장된 레코드 수
    pub async fn record_count(&self, client_id: &str) -> Result<u64, IntakeError> {
        let client_id = client_id.to_owned();
        self.run(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM log_records WHERE client_id = ?1",
                params![client_id],
                |row| row.get(0),
            )?;
            Ok(u64::try_from(count).unwrap_or(0))
        })
        .await
    }

    /// 저장된 배치 수
    pub async fn batch_count(&self) -> Result<u64, IntakeError> {
        self.run(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM ingested_batches", [], |row| row.get(0))?;
            Ok(u64::try_from(count).unwrap_or(0))
        })
        .await
    }

    /// 클라이언트의 레코드 body를 저장 순서대로 반환합니다.
    pub async fn bodies(&self, client_id: &str, limit: usize) -> Result<Vec<String>, IntakeError> {
        let client_id = client_id.to_owned();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT body FROM log_records WHERE client_id = ?1 ORDER BY id ASC LIMIT ?2",
            )?;
            let bodies = stmt
                .query_map(params![client_id, limit], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            Ok(bodies)
        })
        .await
    }

    async fn run<T, F>(&self, f: F) -> Result<T, IntakeError>
    where
        F: FnOnce(&mut Connection) -> Result<T, IntakeError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| IntakeError::Storage("record store lock poisoned".to_owned()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| IntakeError::Storage(format!("blocking task failed: {e}")))?
    }
}

struct RecordRow {
    timestamp: i64,
    severity: String,
    severity_num: i32,
    body: String,
    attributes: String,
    resource: String,
    trace_id: Option<String>,
    span_id: Option<String>,
}

fn open_connection(path: &Path) -> Result<Connection, IntakeError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(path)?;
    let _mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    conn.pragma_update(None, "synchronous", "FULL")?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    conn.execute_batch(SCHEMA)?;
    debug!(path = %path.display(), "intake record store opened");
    Ok(conn)
}
