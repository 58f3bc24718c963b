use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tokio::sync::Mutex;

use crate::context::ConnectionInfo;
use crate::enrich::AnonymizationFlags;
use crate::error::AppError;
use crate::record::{DraftRecord, TrackingRecord};

/// Append-only history of tracking records. The sole identity and time
/// authority: `append` assigns `id` and `timestamp`, and is internally
/// serialized so id order and timestamp order can never invert.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn append(&self, draft: DraftRecord) -> Result<TrackingRecord, AppError>;

    /// Snapshot of all records, most-recent-first (descending id).
    async fn list(&self) -> Result<Vec<TrackingRecord>, AppError>;
}

// --- Postgres-backed store ---

pub struct PgHistoryStore {
    pool: PgPool,
    // Serializes appends so sequence order matches timestamp order.
    append_gate: Mutex<()>,
}

impl PgHistoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            append_gate: Mutex::new(()),
        }
    }
}

type LogRow = (
    i64,
    String,
    String,
    Option<String>,
    Option<String>,
    String,
    Option<String>,
    bool,
    bool,
    bool,
    DateTime<Utc>,
);

fn row_to_record(row: LogRow) -> Result<TrackingRecord, AppError> {
    let (id, ip, location, isp, asn, device_summary, connection_info, proxy, vpn, tor, timestamp) =
        row;
    let connection_info = connection_info
        .map(|raw| serde_json::from_str::<ConnectionInfo>(&raw))
        .transpose()
        .map_err(|e| AppError::Internal(format!("corrupt connection_info column: {e}")))?;

    Ok(TrackingRecord {
        id,
        ip,
        location,
        isp,
        asn,
        device_summary,
        connection_info,
        flags: AnonymizationFlags { proxy, vpn, tor },
        timestamp,
    })
}

#[async_trait]
impl HistoryStore for PgHistoryStore {
    async fn append(&self, draft: DraftRecord) -> Result<TrackingRecord, AppError> {
        let connection_info = draft
            .connection_info
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| AppError::Internal(format!("serialize connection_info: {e}")))?;

        let _gate = self.append_gate.lock().await;

        // Clamp against the stored maximum so a clock step backwards cannot
        // give a later id an earlier timestamp.
        let (id, timestamp) = sqlx::query_as::<_, (i64, DateTime<Utc>)>(
            "INSERT INTO tracking_logs \
             (ip, location, isp, asn, device_summary, connection_info, proxy, vpn, tor, timestamp) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, \
                 GREATEST(NOW(), COALESCE((SELECT MAX(timestamp) FROM tracking_logs), NOW()))) \
             RETURNING id, timestamp",
        )
        .bind(&draft.ip)
        .bind(&draft.location)
        .bind(&draft.isp)
        .bind(&draft.asn)
        .bind(&draft.device_summary)
        .bind(&connection_info)
        .bind(draft.flags.proxy)
        .bind(draft.flags.vpn)
        .bind(draft.flags.tor)
        .fetch_one(&self.pool)
        .await?;

        Ok(draft.finalize(id, timestamp))
    }

    async fn list(&self) -> Result<Vec<TrackingRecord>, AppError> {
        let rows = sqlx::query_as::<_, LogRow>(
            "SELECT id, ip, location, isp, asn, device_summary, connection_info, \
             proxy, vpn, tor, timestamp FROM tracking_logs ORDER BY id DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_record).collect()
    }
}

// --- In-memory store ---

/// Mutex-guarded in-process store. Used by the test suite and suitable for
/// ephemeral deployments; upholds the same id/timestamp invariants as the
/// Postgres store.
#[derive(Default)]
pub struct MemoryHistoryStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    next_id: i64,
    records: Vec<TrackingRecord>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn append(&self, draft: DraftRecord) -> Result<TrackingRecord, AppError> {
        let mut inner = self.inner.lock().await;

        let mut timestamp = Utc::now();
        if let Some(last) = inner.records.last() {
            if timestamp < last.timestamp {
                timestamp = last.timestamp;
            }
        }

        inner.next_id += 1;
        let record = draft.finalize(inner.next_id, timestamp);
        inner.records.push(record.clone());
        Ok(record)
    }

    async fn list(&self) -> Result<Vec<TrackingRecord>, AppError> {
        let inner = self.inner.lock().await;
        Ok(inner.records.iter().rev().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn draft(ip: &str) -> DraftRecord {
        DraftRecord {
            ip: ip.to_string(),
            location: "unknown".to_string(),
            isp: None,
            asn: None,
            device_summary: "test-agent".to_string(),
            connection_info: None,
            flags: AnonymizationFlags::default(),
        }
    }

    #[tokio::test]
    async fn test_append_assigns_increasing_ids() {
        let store = MemoryHistoryStore::new();
        let r1 = store.append(draft("8.8.8.8")).await.unwrap();
        let r2 = store.append(draft("1.1.1.1")).await.unwrap();
        assert_ne!(r1.id, r2.id);
        assert!(r2.id > r1.id);
    }

    #[tokio::test]
    async fn test_append_timestamps_non_decreasing() {
        let store = MemoryHistoryStore::new();
        let r1 = store.append(draft("8.8.8.8")).await.unwrap();
        let r2 = store.append(draft("1.1.1.1")).await.unwrap();
        assert!(r1.timestamp <= r2.timestamp);
    }

    #[tokio::test]
    async fn test_list_most_recent_first() {
        let store = MemoryHistoryStore::new();
        store.append(draft("8.8.8.8")).await.unwrap();
        store.append(draft("1.1.1.1")).await.unwrap();
        store.append(draft("9.9.9.9")).await.unwrap();

        let records = store.list().await.unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].ip, "9.9.9.9");
        assert_eq!(records[2].ip, "8.8.8.8");
        assert!(records[0].id > records[1].id);
        assert!(records[1].id > records[2].id);
    }

    #[tokio::test]
    async fn test_list_length_grows_by_one_per_append() {
        let store = MemoryHistoryStore::new();
        assert_eq!(store.list().await.unwrap().len(), 0);
        store.append(draft("8.8.8.8")).await.unwrap();
        assert_eq!(store.list().await.unwrap().len(), 1);
        store.append(draft("1.1.1.1")).await.unwrap();
        assert_eq!(store.list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_append_returns_finalized_copy() {
        let store = MemoryHistoryStore::new();
        let record = store.append(draft("8.8.8.8")).await.unwrap();
        let listed = store.list().await.unwrap();
        assert_eq!(listed[0], record);
    }

    #[tokio::test]
    async fn test_concurrent_appends_distinct_ids() {
        let store = Arc::new(MemoryHistoryStore::new());

        let mut handles = Vec::new();
        for i in 0..32 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.append(draft(&format!("10.0.0.{i}"))).await.unwrap()
            }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().id);
        }
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 32);

        // Ordering invariant holds across all concurrently appended records.
        let records = store.list().await.unwrap();
        for pair in records.windows(2) {
            assert!(pair[0].id > pair[1].id);
            assert!(pair[0].timestamp >= pair[1].timestamp);
        }
    }
}
