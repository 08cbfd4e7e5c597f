//! SQLite 기반 내구성 버퍼
//!
//! 봉인 엔진이 적재한 봉투를 원격 인테이크가 확인(ack)할 때까지 보관합니다.
//!
//! # 상태 전이
//! ```text
//! enqueue → Pending ──peek_ready──→ InFlight ──mark_delivered──→ (삭제)
//!              ↑                       │
//!              └─mark_failed / release / 임대 만료 / 재시작─┘
//!                                      └──mark_expired──→ (삭제, 카운터 증가)
//! ```
//!
//! 모든 상태 변경은 트랜잭션 안에서 일어나며, `peek_ready`는 `BEGIN IMMEDIATE`로
//! 쓰기 잠금을 잡은 뒤 항목을 임대하므로 두 drain 루프가 같은 항목을 가져갈 수 없습니다.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{Connection, OpenFlags, OptionalExtension, TransactionBehavior, params};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use logpost_core::config::BufferConfig;
use logpost_core::envelope::Envelope;
use logpost_core::metrics as m;

use crate::error::SpoolError;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS envelopes (
    sequence_id       INTEGER PRIMARY KEY AUTOINCREMENT,
    client_id         TEXT    NOT NULL,
    envelope          BLOB    NOT NULL,
    status            TEXT    NOT NULL,
    attempt_count     INTEGER NOT NULL DEFAULT 0,
    first_enqueued_at INTEGER NOT NULL,
    last_attempt_at   INTEGER,
    lease_expires_at  INTEGER
);
CREATE INDEX IF NOT EXISTS envelopes_status_idx ON envelopes(status, sequence_id);
CREATE TABLE IF NOT EXISTS buffer_counters (
    name  TEXT PRIMARY KEY,
    value INTEGER NOT NULL
);
";

const STATUS_PENDING: &str = "pending";
const STATUS_IN_FLIGHT: &str = "in_flight";

const COUNTER_DELIVERED: &str = "delivered";
const COUNTER_EXPIRED: &str = "expired";
const COUNTER_EVICTED: &str = "evicted";

/// 버퍼 항목 상태
///
/// `Delivered`와 `Expired`는 종료 상태로, 해당 전이와 동시에 행이 삭제됩니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferStatus {
    /// 전송 대기
    Pending,
    /// 임대되어 전송 중
    InFlight,
    /// 전송 완료
    Delivered,
    /// 영구 실패 또는 보존 정책으로 만료
    Expired,
}

impl BufferStatus {
    fn from_column(value: &str) -> Self {
        match value {
            STATUS_IN_FLIGHT => Self::InFlight,
            _ => Self::Pending,
        }
    }
}

/// 전송 메타데이터가 붙은 봉투
#[derive(Debug, Clone)]
pub struct BufferedEnvelope {
    /// 로컬 단조 증가 시퀀스
    pub sequence_id: i64,
    /// 봉투
    pub envelope: Envelope,
    /// 실패한 전송 사이클 수
    pub attempt_count: u32,
    /// 최초 적재 시각
    pub first_enqueued_at: DateTime<Utc>,
    /// 마지막 전송 시도 시각
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// 상태
    pub status: BufferStatus,
}

/// 보존 정책
#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    /// 최대 보관 기간
    pub max_age: Duration,
    /// 최대 항목 수 (초과분은 오래된 것부터 만료)
    pub max_entries: u64,
}

impl RetentionPolicy {
    /// 버퍼 설정에서 정책을 만듭니다.
    pub fn from_config(config: &BufferConfig) -> Self {
        Self {
            max_age: Duration::from_secs(config.max_age_secs),
            max_entries: config.max_entries,
        }
    }
}

/// 버퍼 통계
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BufferStats {
    /// 대기 항목 수
    pub pending: u64,
    /// 임대 중 항목 수
    pub in_flight: u64,
    /// 가장 오래된 항목의 적재 시각
    pub oldest_enqueued_at: Option<DateTime<Utc>>,
    /// 누적 전송 완료 수
    pub delivered_total: u64,
    /// 누적 영구 실패 만료 수
    pub expired_total: u64,
    /// 누적 보존 정책 만료 수
    pub evicted_total: u64,
}

impl BufferStats {
    /// 전송 대기 중인 전체 항목 수
    pub fn backlog(&self) -> u64 {
        self.pending + self.in_flight
    }
}

/// SQLite 내구성 버퍼
///
/// `Clone`은 같은 연결을 공유합니다. 모든 작업은 `spawn_blocking`에서 실행됩니다.
#[derive(Clone)]
pub struct DurableBuffer {
    conn: Arc<Mutex<Connection>>,
    lease: Duration,
}

impl DurableBuffer {
    /// 버퍼를 열고, 이전 실행에서 InFlight로 남은 항목을 Pending으로 되돌립니다.
    pub async fn open(path: impl AsRef<Path>, lease: Duration) -> Result<Self, SpoolError> {
        let path = path.as_ref().to_path_buf();
        let conn = tokio::task::spawn_blocking(move || open_connection(&path))
            .await
            .map_err(|e| SpoolError::Join(e.to_string()))??;

        let buffer = Self {
            conn: Arc::new(Mutex::new(conn)),
            lease,
        };
        let reclaimed = buffer.reclaim_in_flight().await?;
        if reclaimed > 0 {
            info!(reclaimed, "in-flight envelopes returned to pending after restart");
            metrics::counter!(m::BUFFER_RECLAIMED_TOTAL).increment(reclaimed);
        }
        Ok(buffer)
    }

    /// 기존 버퍼를 읽기 전용으로 엽니다 (운영 CLI 조회용).
    ///
    /// 스키마를 만들거나 InFlight 항목을 되돌리지 않으므로 실행 중인 데몬과
    /// 함께 사용해도 임대 상태가 바뀌지 않습니다.
    pub async fn open_read_only(path: impl AsRef<Path>) -> Result<Self, SpoolError> {
        let path = path.as_ref().to_path_buf();
        let conn = tokio::task::spawn_blocking(move || {
            let conn = Connection::open_with_flags(
                &path,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?;
            conn.busy_timeout(Duration::from_secs(5))?;
            Ok::<_, SpoolError>(conn)
        })
        .await
        .map_err(|e| SpoolError::Join(e.to_string()))??;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            lease: Duration::ZERO,
        })
    }

    /// 설정의 임대 기간으로 버퍼를 엽니다.
    pub async fn open_with_config(
        path: impl AsRef<Path>,
        config: &BufferConfig,
    ) -> Result<Self, SpoolError> {
        Self::open(path, Duration::from_secs(config.lease_secs)).await
    }

    /// 봉투를 적재하고 시퀀스 ID를 반환합니다.
    pub async fn enqueue(&self, envelope: &Envelope) -> Result<i64, SpoolError> {
        let client_id = envelope.client_id.clone();
        let encoded = envelope.to_json()?;
        let now = now_ms();
        let sequence_id = self
            .run(move |conn| {
                conn.execute(
                    "INSERT INTO envelopes (client_id, envelope, status, attempt_count, first_enqueued_at)
                     VALUES (?1, ?2, ?3, 0, ?4)",
                    params![client_id, encoded, STATUS_PENDING, now],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;

        metrics::counter!(m::BUFFER_ENQUEUED_TOTAL).increment(1);
        debug!(sequence_id, "envelope enqueued");
        Ok(sequence_id)
    }

    /// 전송 가능한 항목을 시퀀스 오름차순으로 최대 `max_n`개 임대합니다.
    ///
    /// Pending 항목과 임대가 만료된 InFlight 항목이 대상입니다. 디코딩할 수 없는
    /// 행은 임대하지 않고 같은 트랜잭션에서 만료(삭제)시킵니다.
    pub async fn peek_ready(&self, max_n: usize) -> Result<Vec<BufferedEnvelope>, SpoolError> {
        if max_n == 0 {
            return Ok(Vec::new());
        }
        let now = now_ms();
        let lease_until = now.saturating_add(duration_ms(self.lease));
        let limit = i64::try_from(max_n).unwrap_or(i64::MAX);

        let (ready, reclaimed, corrupt) = self
            .run(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let rows = {
                    let mut stmt = tx.prepare(
                        "SELECT sequence_id, envelope, attempt_count, first_enqueued_at, status
                         FROM envelopes
                         WHERE status = ?1 OR (status = ?2 AND lease_expires_at <= ?3)
                         ORDER BY sequence_id ASC
                         LIMIT ?4",
                    )?;
                    let mapped = stmt.query_map(
                        params![STATUS_PENDING, STATUS_IN_FLIGHT, now, limit],
                        |row| {
                            Ok(RawRow {
                                sequence_id: row.get(0)?,
                                envelope: row.get(1)?,
                                attempt_count: row.get(2)?,
                                first_enqueued_at: row.get(3)?,
                                status: row.get(4)?,
                            })
                        },
                    )?;
                    mapped.collect::<Result<Vec<_>, _>>()?
                };

                let mut ready = Vec::with_capacity(rows.len());
                let mut reclaimed = 0u64;
                let mut corrupt = Vec::new();
                for row in rows {
                    let envelope = match Envelope::from_json(&row.envelope) {
                        Ok(envelope) => envelope,
                        Err(e) => {
                            tx.execute(
                                "DELETE FROM envelopes WHERE sequence_id = ?1",
                                params![row.sequence_id],
                            )?;
                            corrupt.push((row.sequence_id, e.to_string()));
                            continue;
                        }
                    };
                    if BufferStatus::from_column(&row.status) == BufferStatus::InFlight {
                        reclaimed += 1;
                    }
                    tx.execute(
                        "UPDATE envelopes SET status = ?1, lease_expires_at = ?2, last_attempt_at = ?3
                         WHERE sequence_id = ?4",
                        params![STATUS_IN_FLIGHT, lease_until, now, row.sequence_id],
                    )?;
                    ready.push(BufferedEnvelope {
                        sequence_id: row.sequence_id,
                        envelope,
                        attempt_count: u32::try_from(row.attempt_count).unwrap_or(u32::MAX),
                        first_enqueued_at: from_ms(row.first_enqueued_at),
                        last_attempt_at: Some(from_ms(now)),
                        status: BufferStatus::InFlight,
                    });
                }
                if !corrupt.is_empty() {
                    bump_counter(&tx, COUNTER_EXPIRED, corrupt.len() as u64)?;
                }
                tx.commit()?;
                Ok((ready, reclaimed, corrupt))
            })
            .await?;

        if reclaimed > 0 {
            debug!(reclaimed, "expired leases reclaimed");
            metrics::counter!(m::BUFFER_RECLAIMED_TOTAL).increment(reclaimed);
        }
        for (sequence_id, reason) in &corrupt {
            error!(sequence_id, reason = %reason, "undecodable buffered envelope removed");
        }
        if !corrupt.is_empty() {
            metrics::counter!(m::BUFFER_CORRUPT_TOTAL).increment(corrupt.len() as u64);
        }
        Ok(ready)
    }

    /// 임대 중인 항목들의 임대를 현재 시각 기준으로 연장합니다.
    ///
    /// 여전히 InFlight로 남아 있는(삭제되지 않은) 시퀀스만 반환합니다.
    pub async fn renew_leases(&self, sequence_ids: &[i64]) -> Result<Vec<i64>, SpoolError> {
        if sequence_ids.is_empty() {
            return Ok(Vec::new());
        }
        let lease_until = now_ms().saturating_add(duration_ms(self.lease));
        let ids = sequence_ids.to_vec();
        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let mut held = Vec::with_capacity(ids.len());
            for id in ids {
                let updated = tx.execute(
                    "UPDATE envelopes SET lease_expires_at = ?1
                     WHERE sequence_id = ?2 AND status = ?3",
                    params![lease_until, id, STATUS_IN_FLIGHT],
                )?;
                if updated > 0 {
                    held.push(id);
                }
            }
            tx.commit()?;
            Ok(held)
        })
        .await
    }

    /// 전송 완료 처리 (항목 삭제)
    pub async fn mark_delivered(&self, sequence_id: i64) -> Result<(), SpoolError> {
        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let deleted = tx.execute(
                "DELETE FROM envelopes WHERE sequence_id = ?1",
                params![sequence_id],
            )?;
            if deleted == 0 {
                return Err(SpoolError::UnknownSequence(sequence_id));
            }
            bump_counter(&tx, COUNTER_DELIVERED, 1)?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    /// 일시 실패 처리: Pending으로 되돌리고 시도 횟수를 증가시킵니다.
    pub async fn mark_failed(&self, sequence_id: i64) -> Result<(), SpoolError> {
        let now = now_ms();
        self.run(move |conn| {
            let updated = conn.execute(
                "UPDATE envelopes
                 SET status = ?1, attempt_count = attempt_count + 1,
                     last_attempt_at = ?2, lease_expires_at = NULL
                 WHERE sequence_id = ?3",
                params![STATUS_PENDING, now, sequence_id],
            )?;
            if updated == 0 {
                return Err(SpoolError::UnknownSequence(sequence_id));
            }
            Ok(())
        })
        .await
    }

    /// 시도하지 않은 임대를 반납합니다. 시도 횟수는 그대로 둡니다.
    pub async fn release(&self, sequence_id: i64) -> Result<(), SpoolError> {
        self.run(move |conn| {
            let updated = conn.execute(
                "UPDATE envelopes SET status = ?1, lease_expires_at = NULL
                 WHERE sequence_id = ?2",
                params![STATUS_PENDING, sequence_id],
            )?;
            if updated == 0 {
                return Err(SpoolError::UnknownSequence(sequence_id));
            }
            Ok(())
        })
        .await
    }

    /// 영구 실패 처리: 항목을 만료(삭제)하고 카운터를 증가시킵니다.
    pub async fn mark_expired(&self, sequence_id: i64, reason: &str) -> Result<(), SpoolError> {
        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let deleted = tx.execute(
                "DELETE FROM envelopes WHERE sequence_id = ?1",
                params![sequence_id],
            )?;
            if deleted == 0 {
                return Err(SpoolError::UnknownSequence(sequence_id));
            }
            bump_counter(&tx, COUNTER_EXPIRED, 1)?;
            tx.commit()?;
            Ok(())
        })
        .await?;

        warn!(sequence_id, reason, "envelope expired after permanent delivery failure");
        Ok(())
    }

    /// 보존 정책을 초과한 항목을 오래된 것부터 만료시키고 개수를 반환합니다.
    ///
    /// 임대가 유효한 InFlight 항목은 건너뜁니다.
    pub async fn evict_expired(&self, policy: &RetentionPolicy) -> Result<u64, SpoolError> {
        let now = now_ms();
        let cutoff = now.saturating_sub(duration_ms(policy.max_age));
        let max_entries = i64::try_from(policy.max_entries).unwrap_or(i64::MAX);

        let evicted = self
            .run(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let by_age = tx.execute(
                    "DELETE FROM envelopes
                     WHERE first_enqueued_at < ?1
                       AND NOT (status = ?2 AND lease_expires_at > ?3)",
                    params![cutoff, STATUS_IN_FLIGHT, now],
                )?;

                let total: i64 =
                    tx.query_row("SELECT COUNT(*) FROM envelopes", [], |row| row.get(0))?;
                let overflow = total.saturating_sub(max_entries);
                let by_size = if overflow > 0 {
                    tx.execute(
                        "DELETE FROM envelopes WHERE sequence_id IN (
                             SELECT sequence_id FROM envelopes
                             WHERE NOT (status = ?1 AND lease_expires_at > ?2)
                             ORDER BY sequence_id ASC
                             LIMIT ?3
                         )",
                        params![STATUS_IN_FLIGHT, now, overflow],
                    )?
                } else {
                    0
                };

                let evicted = (by_age + by_size) as u64;
                if evicted > 0 {
                    bump_counter(&tx, COUNTER_EVICTED, evicted)?;
                }
                tx.commit()?;
                Ok(evicted)
            })
            .await?;

        if evicted > 0 {
            warn!(
                evicted,
                max_entries = policy.max_entries,
                max_age_secs = policy.max_age.as_secs(),
                "buffered envelopes evicted by retention policy"
            );
            metrics::counter!(m::BUFFER_EVICTED_TOTAL).increment(evicted);
        }
        Ok(evicted)
    }

    /// 버퍼 통계를 조회하고 백로그 게이지를 갱신합니다.
    pub async fn stats(&self) -> Result<BufferStats, SpoolError> {
        let stats = self
            .run(|conn| {
                let count_status = |status: &str| -> Result<u64, rusqlite::Error> {
                    conn.query_row(
                        "SELECT COUNT(*) FROM envelopes WHERE status = ?1",
                        params![status],
                        |row| row.get::<_, i64>(0),
                    )
                    .map(|n| n as u64)
                };
                let oldest: Option<i64> = conn.query_row(
                    "SELECT MIN(first_enqueued_at) FROM envelopes",
                    [],
                    |row| row.get(0),
                )?;
                Ok(BufferStats {
                    pending: count_status(STATUS_PENDING)?,
                    in_flight: count_status(STATUS_IN_FLIGHT)?,
                    oldest_enqueued_at: oldest.map(from_ms),
                    delivered_total: read_counter(conn, COUNTER_DELIVERED)?,
                    expired_total: read_counter(conn, COUNTER_EXPIRED)?,
                    evicted_total: read_counter(conn, COUNTER_EVICTED)?,
                })
            })
            .await?;

        metrics::gauge!(m::BUFFER_BACKLOG).set(stats.backlog() as f64);
        Ok(stats)
    }

    async fn reclaim_in_flight(&self) -> Result<u64, SpoolError> {
        self.run(|conn| {
            let updated = conn.execute(
                "UPDATE envelopes SET status = ?1, lease_expires_at = NULL WHERE status = ?2",
                params![STATUS_PENDING, STATUS_IN_FLIGHT],
            )?;
            Ok(updated as u64)
        })
        .await
    }

    async fn run<T, F>(&self, f: F) -> Result<T, SpoolError>
    where
        F: FnOnce(&mut Connection) -> Result<T, SpoolError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| SpoolError::Poisoned)?;
            f(&mut guard)
        })
        .await
        .map_err(|e| SpoolError::Join(e.to_string()))?
    }
}

struct RawRow {
    sequence_id: i64,
    envelope: Vec<u8>,
    attempt_count: i64,
    first_enqueued_at: i64,
    status: String,
}

fn open_connection(path: &Path) -> Result<Connection, SpoolError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(path)?;
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    conn.pragma_update(None, "synchronous", "FULL")?;
    conn.busy_timeout(Duration::from_secs(5))?;
    conn.execute_batch(SCHEMA)?;
    debug!(path = %path.display(), journal_mode = %mode, "durable buffer opened");
    Ok(conn)
}

fn bump_counter(conn: &Connection, name: &str, by: u64) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO buffer_counters (name, value) VALUES (?1, ?2)
         ON CONFLICT(name) DO UPDATE SET value = value + excluded.value",
        params![name, by as i64],
    )?;
    Ok(())
}

fn read_counter(conn: &Connection, name: &str) -> Result<u64, rusqlite::Error> {
    let value: Option<i64> = conn
        .query_row(
            "SELECT value FROM buffer_counters WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value.unwrap_or(0) as u64)
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn duration_ms(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

fn from_ms(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or_default()
}
