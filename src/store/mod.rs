//! Persistence adapter for food consumption entries.
//!
//! Handlers only ever see the [`FoodStore`] trait; the process builds one
//! concrete store at startup and injects it.  [`SqliteFoodStore`] is the
//! default backend (`food.db` under the nutri home).

pub mod window;

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

pub use window::{DayWindow, DayZone};

/// Optional macro-nutrient values.  `None` means unknown, not zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Nutrients {
    pub calories: Option<f64>,
    pub protein: Option<f64>,
    pub carbs: Option<f64>,
    pub fats: Option<f64>,
}

/// An entry as requested by a handler, before the store stamps it.
#[derive(Debug, Clone)]
pub struct NewConsumption {
    pub food_name: String,
    pub participant_identity: String,
    pub nutrients: Nutrients,
}

/// A stored, immutable consumption entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumptionEntry {
    pub id: String,
    pub food_name: String,
    pub participant_identity: String,
    #[serde(flatten)]
    pub nutrients: Nutrients,
    pub consumed_at: DateTime<Utc>,
}

impl ConsumptionEntry {
    /// Stamp a new entry with a fresh id and the current instant.
    pub fn stamp(new: NewConsumption) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            food_name: new.food_name,
            participant_identity: new.participant_identity,
            nutrients: new.nutrients,
            consumed_at: Utc::now(),
        }
    }
}

/// Sums over a day window.  Absent nutrient values contribute zero.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DailyTotals {
    /// Number of entries in the window.
    pub entries: u64,
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fats: f64,
}

/// Boundary to the persistent store.
///
/// Implementations must tolerate concurrent `append` / `aggregate_daily`
/// calls; no locking is imposed by callers.
#[async_trait]
pub trait FoodStore: Send + Sync {
    /// Append an entry.  The store assigns `id` and `consumed_at`.
    async fn append(&self, entry: NewConsumption) -> anyhow::Result<ConsumptionEntry>;

    /// Aggregate one participant's entries with `day_start <= consumed_at < day_end`.
    async fn aggregate_daily(
        &self,
        participant_identity: &str,
        day_start: DateTime<Utc>,
        day_end: DateTime<Utc>,
    ) -> anyhow::Result<DailyTotals>;
}

// ── SQLite backend ───────────────────────────────────────────

/// SQLite-backed [`FoodStore`].
pub struct SqliteFoodStore {
    conn: Mutex<Connection>,
}

impl SqliteFoodStore {
    /// Open (or create) the database at an explicit path.
    pub fn open(db_path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        Self::init(conn)
    }

    /// Open a private in-memory database (tests and dry runs).
    pub fn open_in_memory() -> anyhow::Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> anyhow::Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS food_consumption (
                id                   TEXT PRIMARY KEY,
                food_name            TEXT NOT NULL,
                participant_identity TEXT NOT NULL,
                calories             REAL,
                protein              REAL,
                carbs                REAL,
                fats                 REAL,
                consumed_at          INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS food_consumption_by_participant
                ON food_consumption (participant_identity, consumed_at);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> anyhow::Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("food db poisoned"))
    }

    /// Most recent entries for a participant, newest first.
    pub fn entries_for(
        &self,
        participant_identity: &str,
        limit: usize,
    ) -> anyhow::Result<Vec<ConsumptionEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, food_name, participant_identity, calories, protein, carbs, fats, consumed_at
             FROM food_consumption
             WHERE participant_identity = ?1
             ORDER BY consumed_at DESC, rowid DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![participant_identity, limit as i64], |row| {
            let millis: i64 = row.get(7)?;
            Ok(ConsumptionEntry {
                id: row.get(0)?,
                food_name: row.get(1)?,
                participant_identity: row.get(2)?,
                nutrients: Nutrients {
                    calories: row.get(3)?,
                    protein: row.get(4)?,
                    carbs: row.get(5)?,
                    fats: row.get(6)?,
                },
                consumed_at: Utc
                    .timestamp_millis_opt(millis)
                    .single()
                    .unwrap_or_default(),
            })
        })?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    /// Total number of stored entries.
    pub fn count(&self) -> anyhow::Result<usize> {
        let conn = self.lock()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM food_consumption", [], |r| r.get(0))?;
        Ok(count as usize)
    }
}

#[async_trait]
impl FoodStore for SqliteFoodStore {
    async fn append(&self, entry: NewConsumption) -> anyhow::Result<ConsumptionEntry> {
        let entry = ConsumptionEntry::stamp(entry);
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO food_consumption
                (id, food_name, participant_identity, calories, protein, carbs, fats, consumed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                entry.id,
                entry.food_name,
                entry.participant_identity,
                entry.nutrients.calories,
                entry.nutrients.protein,
                entry.nutrients.carbs,
                entry.nutrients.fats,
                entry.consumed_at.timestamp_millis(),
            ],
        )?;
        tracing::debug!(id = %entry.id, participant = %entry.participant_identity, "food entry appended");
        Ok(entry)
    }

    async fn aggregate_daily(
        &self,
        participant_identity: &str,
        day_start: DateTime<Utc>,
        day_end: DateTime<Utc>,
    ) -> anyhow::Result<DailyTotals> {
        let conn = self.lock()?;
        let totals = conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(calories), 0.0),
                    COALESCE(SUM(protein), 0.0),
                    COALESCE(SUM(carbs), 0.0),
                    COALESCE(SUM(fats), 0.0)
             FROM food_consumption
             WHERE participant_identity = ?1
               AND consumed_at >= ?2
               AND consumed_at < ?3",
            params![
                participant_identity,
                day_start.timestamp_millis(),
                day_end.timestamp_millis()
            ],
            |row| {
                Ok(DailyTotals {
                    entries: row.get::<_, i64>(0)? as u64,
                    calories: row.get(1)?,
                    protein: row.get(2)?,
                    carbs: row.get(3)?,
                    fats: row.get(4)?,
                })
            },
        )?;
        Ok(totals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn new_entry(participant: &str, food: &str, nutrients: Nutrients) -> NewConsumption {
        NewConsumption {
            food_name: food.into(),
            participant_identity: participant.into(),
            nutrients,
        }
    }

    #[tokio::test]
    async fn append_assigns_id_and_timestamp() {
        let store = SqliteFoodStore::open_in_memory().unwrap();
        let before = Utc::now();
        let entry = store
            .append(new_entry("alice", "egg", Nutrients::default()))
            .await
            .unwrap();
        let after = Utc::now();

        assert!(!entry.id.is_empty());
        assert!(entry.consumed_at >= before && entry.consumed_at <= after);

        let stored = store.entries_for("alice", 10).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, entry.id);
        assert_eq!(stored[0].nutrients, Nutrients::default());
    }

    #[tokio::test]
    async fn aggregate_treats_null_as_zero() {
        let store = SqliteFoodStore::open_in_memory().unwrap();
        store
            .append(new_entry(
                "alice",
                "toast",
                Nutrients {
                    calories: Some(70.0),
                    ..Default::default()
                },
            ))
            .await
            .unwrap();
        store
            .append(new_entry(
                "alice",
                "yogurt",
                Nutrients {
                    calories: Some(200.0),
                    protein: Some(10.25),
                    ..Default::default()
                },
            ))
            .await
            .unwrap();

        let now = Utc::now();
        let totals = store
            .aggregate_daily("alice", now - Duration::hours(1), now + Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(totals.entries, 2);
        assert_eq!(totals.calories, 270.0);
        assert_eq!(totals.protein, 10.25);
        assert_eq!(totals.carbs, 0.0);
        assert_eq!(totals.fats, 0.0);
    }

    #[tokio::test]
    async fn aggregate_excludes_other_participants_and_window() {
        let store = SqliteFoodStore::open_in_memory().unwrap();
        store
            .append(new_entry(
                "bob",
                "pizza",
                Nutrients {
                    calories: Some(800.0),
                    ..Default::default()
                },
            ))
            .await
            .unwrap();

        let now = Utc::now();
        let alice = store
            .aggregate_daily("alice", now - Duration::hours(1), now + Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(alice, DailyTotals::default());

        // Window entirely in the past.
        let bob_yesterday = store
            .aggregate_daily("bob", now - Duration::days(2), now - Duration::days(1))
            .await
            .unwrap();
        assert_eq!(bob_yesterday.entries, 0);
    }

    #[test]
    fn open_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("food.db");
        let store = SqliteFoodStore::open(&path).unwrap();
        assert_eq!(store.count().unwrap(), 0);
        assert!(path.exists());
    }
}
