use chrono::{Local, NaiveDate};
use std::{
    io::Write,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
};
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;

use crate::models::{QuotaRecord, QuotaStatus};

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("failed to read quota record: {0}")]
    Read(#[source] std::io::Error),

    #[error("quota record is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("failed to persist quota record: {0}")]
    Persist(String),
}

/// Source of the local calendar date used to key the ledger.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// Clock pinned to a date that can be moved by hand.
pub struct FixedClock {
    date: Mutex<NaiveDate>,
}

impl FixedClock {
    pub fn new(date: NaiveDate) -> Self {
        Self { date: Mutex::new(date) }
    }

    pub fn set(&self, date: NaiveDate) {
        *lock(&self.date) = date;
    }
}

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        *lock(&self.date)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A slot against the cap held while a generation is running.
///
/// Dropping it without [`QuotaLedger::commit`] gives the slot back, so a
/// failed generation never consumes quota. Until then it counts against
/// whichever day is current, including one that starts while it is held.
#[derive(Debug)]
pub struct QuotaReservation {
    in_flight: Arc<Mutex<u32>>,
    settled: bool,
}

impl QuotaReservation {
    fn settle(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !self.settled {
            self.settled = true;
            let mut pending = lock(&self.in_flight);
            *pending = pending.saturating_sub(1);
        }
    }
}

impl Drop for QuotaReservation {
    fn drop(&mut self) {
        self.release();
    }
}

#[derive(Debug)]
pub enum QuotaDecision {
    Allowed(QuotaReservation),
    Denied { used: u32, cap: u32 },
}

pub struct QuotaLedger {
    path: PathBuf,
    cap: u32,
    clock: Arc<dyn Clock>,
    io_lock: AsyncMutex<()>,
    in_flight: Arc<Mutex<u32>>,
}

impl QuotaLedger {
    pub fn new(path: impl Into<PathBuf>, cap: u32, clock: Arc<dyn Clock>) -> Self {
        Self {
            path: path.into(),
            cap,
            clock,
            io_lock: AsyncMutex::new(()),
            in_flight: Arc::new(Mutex::new(0)),
        }
    }

    pub async fn check_and_reserve(&self) -> Result<QuotaDecision, LedgerError> {
        let _io = self.io_lock.lock().await;
        let today = self.clock.today();
        let record = self.load(today).await?;

        let mut in_flight = lock(&self.in_flight);
        let pending = *in_flight;

        if record.count + pending >= self.cap {
            tracing::info!(
                used = record.count,
                in_flight = pending,
                cap = self.cap,
                "Daily generation quota exhausted"
            );
            return Ok(QuotaDecision::Denied {
                used: record.count,
                cap: self.cap,
            });
        }

        *in_flight += 1;
        tracing::debug!(used = record.count, in_flight = pending + 1, "Quota reserved");

        Ok(QuotaDecision::Allowed(QuotaReservation {
            in_flight: Arc::clone(&self.in_flight),
            settled: false,
        }))
    }

    /// Records one successful generation against today's count.
    pub async fn commit(&self, reservation: QuotaReservation) -> Result<QuotaRecord, LedgerError> {
        let _io = self.io_lock.lock().await;
        let today = self.clock.today();
        let mut record = self.load(today).await?;

        // A reservation carried over midnight was counted in the new day's
        // checks, so it is charged to the new day's record
        record.count += 1;
        self.persist(record).await?;
        reservation.settle();

        tracing::info!(date = %record.date, count = record.count, cap = self.cap, "Quota committed");
        Ok(record)
    }

    pub async fn status(&self) -> Result<QuotaStatus, LedgerError> {
        let _io = self.io_lock.lock().await;
        let today = self.clock.today();
        let record = self.load(today).await?;
        let in_flight = *lock(&self.in_flight);

        Ok(QuotaStatus {
            date: today,
            used: record.count,
            in_flight,
            cap: self.cap,
            remaining: self.cap.saturating_sub(record.count + in_flight),
        })
    }

    async fn load(&self, today: NaiveDate) -> Result<QuotaRecord, LedgerError> {
        match tokio::fs::read(&self.path).await {
            Ok(raw) => {
                let record: QuotaRecord = serde_json::from_slice(&raw)?;
                Ok(record.for_day(today))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(QuotaRecord::fresh(today)),
            Err(e) => Err(LedgerError::Read(e)),
        }
    }

    async fn persist(&self, record: QuotaRecord) -> Result<(), LedgerError> {
        let path = self.path.clone();
        let payload = serde_json::to_vec_pretty(&record)?;

        tokio::task::spawn_blocking(move || write_atomically(&path, &payload))
            .await
            .map_err(|e| LedgerError::Persist(format!("persist task failed: {}", e)))?
    }
}

fn write_atomically(path: &Path, payload: &[u8]) -> Result<(), LedgerError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    std::fs::create_dir_all(&parent)
        .map_err(|e| LedgerError::Persist(format!("failed to create {}: {}", parent.display(), e)))?;

    let mut temp = tempfile::NamedTempFile::new_in(&parent)
        .map_err(|e| LedgerError::Persist(format!("failed to create temp file: {}", e)))?;
    temp.write_all(payload)
        .and_then(|_| temp.as_file().sync_all())
        .map_err(|e| LedgerError::Persist(format!("failed to write temp file: {}", e)))?;
    temp.persist(path)
        .map_err(|e| LedgerError::Persist(format!("failed to replace record: {}", e.error)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 11, d).unwrap()
    }

    fn ledger_at(dir: &Path, clock: Arc<FixedClock>) -> QuotaLedger {
        QuotaLedger::new(dir.join("state/quota.json"), 2, clock)
    }

    async fn reserve(ledger: &QuotaLedger) -> Option<QuotaReservation> {
        match ledger.check_and_reserve().await.unwrap() {
            QuotaDecision::Allowed(reservation) => Some(reservation),
            QuotaDecision::Denied { .. } => None,
        }
    }

    #[tokio::test]
    async fn test_cap_reached_after_two_commits() {
        let dir = tempdir().unwrap();
        let ledger = ledger_at(dir.path(), Arc::new(FixedClock::new(day(1))));

        for expected in 1..=2 {
            let reservation = reserve(&ledger).await.expect("should be allowed");
            let record = ledger.commit(reservation).await.unwrap();
            assert_eq!(record.count, expected);
        }

        match ledger.check_and_reserve().await.unwrap() {
            QuotaDecision::Denied { used, cap } => {
                assert_eq!(used, 2);
                assert_eq!(cap, 2);
            }
            QuotaDecision::Allowed(_) => panic!("third generation must be denied"),
        }
    }

    #[tokio::test]
    async fn test_rollover_allows_again() {
        let dir = tempdir().unwrap();
        let clock = Arc::new(FixedClock::new(day(1)));
        let ledger = ledger_at(dir.path(), clock.clone());

        for _ in 0..2 {
            let reservation = reserve(&ledger).await.unwrap();
            ledger.commit(reservation).await.unwrap();
        }
        assert!(reserve(&ledger).await.is_none());

        clock.set(day(2));
        let status = ledger.status().await.unwrap();
        assert_eq!(status.used, 0);
        assert_eq!(status.remaining, 2);
        assert!(reserve(&ledger).await.is_some());
    }

    #[tokio::test]
    async fn test_reservation_held_over_midnight_counts_against_new_day() {
        let dir = tempdir().unwrap();
        let clock = Arc::new(FixedClock::new(day(1)));
        let ledger = ledger_at(dir.path(), clock.clone());

        let carried = reserve(&ledger).await.unwrap();
        clock.set(day(2));

        let second = reserve(&ledger).await.expect("one slot left on the new day");
        assert!(reserve(&ledger).await.is_none());
        assert_eq!(ledger.status().await.unwrap().in_flight, 2);

        ledger.commit(carried).await.unwrap();
        let record = ledger.commit(second).await.unwrap();
        assert_eq!(record, QuotaRecord { date: day(2), count: 2 });
        assert!(reserve(&ledger).await.is_none());

        let status = ledger.status().await.unwrap();
        assert_eq!(status.used, 2);
        assert_eq!(status.in_flight, 0);
    }

    #[tokio::test]
    async fn test_dropped_reservation_does_not_consume_quota() {
        let dir = tempdir().unwrap();
        let ledger = ledger_at(dir.path(), Arc::new(FixedClock::new(day(1))));

        {
            let _first = reserve(&ledger).await.unwrap();
            let _second = reserve(&ledger).await.unwrap();
            // Both slots are held, a third request is turned away
            assert!(reserve(&ledger).await.is_none());
        }

        let status = ledger.status().await.unwrap();
        assert_eq!(status.used, 0);
        assert_eq!(status.in_flight, 0);
        assert!(!dir.path().join("state/quota.json").exists());
    }

    #[tokio::test]
    async fn test_concurrent_reservations_never_exceed_cap() {
        let dir = tempdir().unwrap();
        let ledger = Arc::new(ledger_at(dir.path(), Arc::new(FixedClock::new(day(1)))));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let ledger = Arc::clone(&ledger);
            handles.push(tokio::spawn(async move {
                match ledger.check_and_reserve().await.unwrap() {
                    QuotaDecision::Allowed(reservation) => {
                        tokio::task::yield_now().await;
                        ledger.commit(reservation).await.unwrap();
                        true
                    }
                    QuotaDecision::Denied { .. } => false,
                }
            }));
        }

        let mut allowed = 0;
        for handle in handles {
            if handle.await.unwrap() {
                allowed += 1;
            }
        }

        assert_eq!(allowed, 2);
        assert_eq!(ledger.status().await.unwrap().used, 2);
    }

    #[tokio::test]
    async fn test_record_survives_restart() {
        let dir = tempdir().unwrap();
        let clock = Arc::new(FixedClock::new(day(3)));

        let ledger = ledger_at(dir.path(), clock.clone());
        let reservation = reserve(&ledger).await.unwrap();
        ledger.commit(reservation).await.unwrap();
        drop(ledger);

        let raw = std::fs::read(dir.path().join("state/quota.json")).unwrap();
        let record: QuotaRecord = serde_json::from_slice(&raw).unwrap();
        assert_eq!(record, QuotaRecord { date: day(3), count: 1 });

        let reopened = ledger_at(dir.path(), clock);
        assert_eq!(reopened.status().await.unwrap().used, 1);
    }

    #[tokio::test]
    async fn test_corrupt_record_fails_closed() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("state")).unwrap();
        std::fs::write(dir.path().join("state/quota.json"), b"{not json").unwrap();

        let ledger = ledger_at(dir.path(), Arc::new(FixedClock::new(day(1))));
        assert!(matches!(
            ledger.check_and_reserve().await,
            Err(LedgerError::Corrupt(_))
        ));
    }
}
