//! One-shot job scheduler built on the loopback queue
//!
//! Jobs are persisted as `(timestamp, fabricated_event, requesting_user,
//! result)`. Only the earliest pending job is armed at any time.

use crate::application::errors::{ConversionError, PluginError, StorageError};
use crate::application::loopback::LoopbackHandle;
use crate::domain::entities::{Event, PlatformEvent};
use crate::infrastructure::database::{Database, Storage};
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use std::fmt;
use tracing::{debug, error, info, warn};

const CANONICAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";
const NAIVE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"];

/// Parse a user supplied timestamp. Naive forms are read as local time.
pub fn parse_timestamp(input: &str) -> Result<DateTime<Utc>, ConversionError> {
    let input = input.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(input) {
        return Ok(ts.with_timezone(&Utc));
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, format) {
            return Local
                .from_local_datetime(&naive)
                .earliest()
                .map(|ts| ts.with_timezone(&Utc))
                .ok_or_else(|| ConversionError::new(input, "time does not exist in the local time zone"));
        }
    }
    Err(ConversionError::new(input, "expected an ISO 8601 timestamp"))
}

/// Stored form; lexical order equals chronological order.
pub fn canonical_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(CANONICAL_FORMAT).to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobResult {
    Pending,
    Sent,
    Missed,
    Failed(&'static str),
}

impl JobResult {
    pub const INVALID_TIMESTAMP: JobResult = JobResult::Failed("invalid timestamp");
    pub const INVALID_EVENT: JobResult = JobResult::Failed("invalid event");
}

impl fmt::Display for JobResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobResult::Pending => write!(f, "pending"),
            JobResult::Sent => write!(f, "sent"),
            JobResult::Missed => write!(f, "missed: time over"),
            JobResult::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// A persisted job row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub timestamp: String,
    pub fabricated_event: String,
    pub requesting_user: i64,
    pub result: String,
}

/// The Jobs table
pub struct JobStore {
    db: Database,
}

impl JobStore {
    const TABLE: &'static str = "Jobs";
    const SCHEMA: &'static str = "timestamp TEXT PRIMARY KEY, fabricated_event TEXT NOT NULL, \
                                  requesting_user INTEGER NOT NULL, result TEXT NOT NULL";

    pub fn new(storage: &Storage) -> Result<Self, StorageError> {
        let db = storage.connect()?;
        db.checkout_table(Self::TABLE, Self::SCHEMA)?;
        Ok(Self { db })
    }

    /// Insert a pending job; an existing timestamp is a conflict.
    pub fn insert(&self, timestamp: &str, fabricated_event: &str, requesting_user: i64) -> Result<(), StorageError> {
        let result = self.db.execute(
            "INSERT INTO Jobs (timestamp, fabricated_event, requesting_user, result) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![timestamp, fabricated_event, requesting_user, JobResult::Pending.to_string()],
        );
        match result {
            Ok(_) => Ok(()),
            Err(e) if e.is_constraint_violation() => {
                Err(StorageError::Conflict(format!("a job is already scheduled at {}", timestamp)))
            }
            Err(e) => Err(e),
        }
    }

    pub fn remove(&self, timestamp: &str) -> Result<bool, StorageError> {
        Ok(self.db.execute("DELETE FROM Jobs WHERE timestamp = ?1", [timestamp])? > 0)
    }

    pub fn list(&self) -> Result<Vec<Job>, StorageError> {
        self.db.query(
            "SELECT timestamp, fabricated_event, requesting_user, result FROM Jobs ORDER BY timestamp",
            [],
            |row| {
                Ok(Job {
                    timestamp: row.get(0)?,
                    fabricated_event: row.get(1)?,
                    requesting_user: row.get(2)?,
                    result: row.get(3)?,
                })
            },
        )
    }

    pub fn get(&self, timestamp: &str) -> Result<Option<Job>, StorageError> {
        self.db.query_opt(
            "SELECT timestamp, fabricated_event, requesting_user, result FROM Jobs WHERE timestamp = ?1",
            [timestamp],
            |row| {
                Ok(Job {
                    timestamp: row.get(0)?,
                    fabricated_event: row.get(1)?,
                    requesting_user: row.get(2)?,
                    result: row.get(3)?,
                })
            },
        )
    }

    /// Every pending job as `(timestamp, fabricated_event)`.
    pub fn pending(&self) -> Result<Vec<(String, String)>, StorageError> {
        self.db.query(
            "SELECT timestamp, fabricated_event FROM Jobs WHERE result = ?1 ORDER BY timestamp",
            [JobResult::Pending.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
    }

    pub fn set_result(&self, timestamp: &str, result: &JobResult) -> Result<(), StorageError> {
        self.db.execute(
            "UPDATE Jobs SET result = ?1 WHERE timestamp = ?2",
            [result.to_string().as_str(), timestamp],
        )?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct Armed {
    timestamp: String,
    at: DateTime<Utc>,
    fabricated_event: String,
}

/// Keeps the single pending wake-up in sync with the Jobs table
pub struct Scheduler {
    store: JobStore,
    loopback: LoopbackHandle,
    sender: String,
    armed: Option<Armed>,
}

impl Scheduler {
    /// `sender` is used as the sender of fired events.
    pub fn new(store: JobStore, loopback: LoopbackHandle, sender: impl Into<String>) -> Self {
        Self {
            store,
            loopback,
            sender: sender.into(),
            armed: None,
        }
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    /// Persist a job firing `event` at `at` and re-arm.
    pub fn add(
        &mut self,
        at: DateTime<Utc>,
        event: &PlatformEvent,
        requesting_user: i64,
        now: DateTime<Utc>,
    ) -> Result<String, StorageError> {
        let timestamp = canonical_timestamp(at);
        let fabricated = serde_json::to_string(event)?;
        self.store.insert(&timestamp, &fabricated, requesting_user)?;
        info!(timestamp = %timestamp, user = requesting_user, "Job scheduled");
        self.reload(now)?;
        Ok(timestamp)
    }

    pub fn remove(&mut self, timestamp: &str, now: DateTime<Utc>) -> Result<bool, StorageError> {
        let removed = self.store.remove(timestamp)?;
        self.reload(now)?;
        Ok(removed)
    }

    /// Recompute the wake-up from the table.
    ///
    /// Every pending job is checked: an unparsable timestamp is marked
    /// failed and a time that already passed is marked missed. The
    /// chronologically earliest of the remaining jobs is armed.
    pub fn reload(&mut self, now: DateTime<Utc>) -> Result<(), StorageError> {
        self.armed = None;
        let mut earliest: Option<Armed> = None;
        for (timestamp, fabricated_event) in self.store.pending()? {
            let at = match parse_timestamp(&timestamp) {
                Ok(at) => at,
                Err(e) => {
                    warn!(timestamp = %timestamp, error = %e, "Job has an invalid timestamp");
                    self.store.set_result(&timestamp, &JobResult::INVALID_TIMESTAMP)?;
                    continue;
                }
            };
            if at < now {
                info!(timestamp = %timestamp, "Job missed its time");
                self.store.set_result(&timestamp, &JobResult::Missed)?;
                continue;
            }
            if earliest.as_ref().map_or(true, |e| at < e.at) {
                earliest = Some(Armed {
                    timestamp,
                    at,
                    fabricated_event,
                });
            }
        }
        match &earliest {
            Some(armed) => debug!(timestamp = %armed.timestamp, "Job armed"),
            None => debug!("No pending job"),
        }
        self.armed = earliest;
        Ok(())
    }

    pub fn next_wakeup(&self) -> Option<DateTime<Utc>> {
        self.armed.as_ref().map(|a| a.at)
    }

    /// Fire the armed job if it is due, then re-arm. Returns the fired event.
    ///
    /// The job is disarmed before anything else happens, so a failure below
    /// never fires it twice; it stays in the table for the next reload.
    pub fn fire(&mut self, now: DateTime<Utc>) -> Result<Option<Event>, PluginError> {
        let Some(armed) = self.armed.take() else {
            return Ok(None);
        };
        if armed.at > now {
            self.armed = Some(armed);
            return Ok(None);
        }
        let fired = match serde_json::from_str::<PlatformEvent>(&armed.fabricated_event) {
            Ok(platform) => {
                let event = Event::loopback(self.sender.clone(), platform);
                self.store.set_result(&armed.timestamp, &JobResult::Sent)?;
                if let Err(e) = self.loopback.push(event.clone()) {
                    error!(timestamp = %armed.timestamp, error = %e, "Job could not be queued");
                    self.store.set_result(&armed.timestamp, &JobResult::Pending)?;
                    return Err(e);
                }
                info!(timestamp = %armed.timestamp, event_id = %event.id, "Job fired");
                Some(event)
            }
            Err(e) => {
                error!(timestamp = %armed.timestamp, error = %e, "Job carries an unreadable event");
                self.store.set_result(&armed.timestamp, &JobResult::INVALID_EVENT)?;
                None
            }
        };
        self.reload(now)?;
        Ok(fired)
    }
}
