//! The active timer. At most one entry is running at a time and [TimerMachine] is the one place
//! that enforces it.
//!
//! Every transition that writes goes to storage first and only then changes in-memory state, so
//! a failed write leaves the machine exactly where it was.

pub mod manual;
pub mod ticker;

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use chrono::NaiveDateTime;
use tracing::{error, info, instrument, warn};

use crate::{
    model::entities::{EntityId, NewTimeEntry, TimeEntry, TimeEntryUpdate},
    storage::{Store, StoreError},
    utils::{clock::Clock, time::diff_seconds},
};

use ticker::Ticker;

#[derive(Debug, thiserror::Error)]
pub enum TimerError {
    #[error("Entry {0} is already running, stop it first")]
    AlreadyRunning(EntityId),
    #[error("Several entries are running at once: {0:?}")]
    MultipleRunning(Vec<EntityId>),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningTimer {
    pub entry_id: EntityId,
    pub description: String,
    pub project_id: Option<EntityId>,
    pub tag_ids: Vec<EntityId>,
    pub started_at: NaiveDateTime,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TimerState {
    #[default]
    Idle,
    Running(RunningTimer),
}

/// Flat view of the machine for display.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimerSnapshot {
    pub is_running: bool,
    pub active_entry_id: Option<EntityId>,
    pub description: String,
    pub project_id: Option<EntityId>,
    pub tag_ids: Vec<EntityId>,
    pub started_at: Option<NaiveDateTime>,
    pub elapsed_seconds: u64,
}

#[derive(Debug, Clone, Default)]
pub struct StartTimer {
    pub description: String,
    pub project_id: Option<EntityId>,
    pub tag_ids: Vec<EntityId>,
    pub billable: bool,
}

/// `None` leaves a field alone. `tag_ids` is the complete new tag set.
#[derive(Debug, Clone, Default)]
pub struct RunningUpdate {
    pub description: Option<String>,
    pub project_id: Option<Option<EntityId>>,
    pub tag_ids: Option<Vec<EntityId>>,
}

pub struct TimerMachine {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    state: TimerState,
    elapsed: Arc<AtomicU64>,
    ticker: Option<Ticker>,
    live_ticks: bool,
}

impl TimerMachine {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            state: TimerState::Idle,
            elapsed: Arc::new(AtomicU64::new(0)),
            ticker: None,
            live_ticks: false,
        }
    }

    /// Runs a [Ticker] whenever the machine is running. Requires a tokio runtime.
    pub fn with_live_ticks(self) -> Self {
        Self {
            live_ticks: true,
            ..self
        }
    }

    pub fn state(&self) -> &TimerState {
        &self.state
    }

    pub fn running(&self) -> Option<&RunningTimer> {
        match &self.state {
            TimerState::Idle => None,
            TimerState::Running(running) => Some(running),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running().is_some()
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.elapsed.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        let elapsed_seconds = self.elapsed_seconds();
        match self.running() {
            None => TimerSnapshot {
                elapsed_seconds,
                ..Default::default()
            },
            Some(running) => TimerSnapshot {
                is_running: true,
                active_entry_id: Some(running.entry_id),
                description: running.description.clone(),
                project_id: running.project_id,
                tag_ids: running.tag_ids.clone(),
                started_at: Some(running.started_at),
                elapsed_seconds,
            },
        }
    }

    /// Rebuilds the state from storage. Called on start up and whenever storage is the truth.
    #[instrument(skip(self))]
    pub async fn resume(&mut self) -> Result<&TimerState, TimerError> {
        let active = self.store.active_entries().await?;
        match active.as_slice() {
            [] => self.enter_idle(),
            [entry] => {
                let tag_ids = self.store.tags_for_entry(entry.id).await?;
                let elapsed = diff_seconds(entry.start_time, self.clock.now());
                info!("Resumed entry {} running for {elapsed}s", entry.id);
                self.enter_running(
                    RunningTimer {
                        entry_id: entry.id,
                        description: entry.description.clone(),
                        project_id: entry.project_id,
                        tag_ids,
                        started_at: entry.start_time,
                    },
                    elapsed as u64,
                );
            }
            many => return Err(multiple_running(many)),
        }
        Ok(&self.state)
    }

    #[instrument(skip(self))]
    pub async fn start(&mut self, request: StartTimer) -> Result<RunningTimer, TimerError> {
        match self.store.active_entries().await?.as_slice() {
            [] => (),
            [entry] => return Err(TimerError::AlreadyRunning(entry.id)),
            many => return Err(multiple_running(many)),
        }

        let tag_ids = dedup(request.tag_ids);
        let entry = self
            .store
            .create_entry(NewTimeEntry {
                description: request.description,
                project_id: request.project_id,
                start_time: self.clock.now(),
                stop_time: None,
                billable: request.billable,
                tag_ids: vec![],
            })
            .await?;

        if !tag_ids.is_empty() {
            if let Err(e) = self.store.add_tags(entry.id, &tag_ids).await {
                // A running entry without its tags would be picked up by the next resume.
                if let Err(cleanup) = self.store.delete_entry(entry.id).await {
                    error!("Failed to remove half started entry {}: {cleanup:?}", entry.id);
                }
                return Err(e.into());
            }
        }

        info!("Started entry {}", entry.id);
        let running = RunningTimer {
            entry_id: entry.id,
            description: entry.description,
            project_id: entry.project_id,
            tag_ids,
            started_at: entry.start_time,
        };
        self.enter_running(running.clone(), 0);
        Ok(running)
    }

    /// Returns the stopped entry. Stopping an idle machine does nothing.
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> Result<Option<TimeEntry>, TimerError> {
        let Some(running) = self.running() else {
            return Ok(None);
        };
        let entry_id = running.entry_id;
        let stopped = self
            .store
            .stop_entry(entry_id, Some(self.clock.now()))
            .await?;
        match &stopped {
            Some(entry) => info!(
                "Stopped entry {entry_id} after {}s",
                entry.tracked_seconds()
            ),
            None => warn!("Running entry {entry_id} disappeared from storage"),
        }
        self.enter_idle();
        Ok(stopped)
    }

    /// One second passed. Purely local, ignored while idle.
    pub fn tick(&self) {
        if self.is_running() {
            self.elapsed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Changes the live entry. Tags are written as a diff against the current set. Returns `None`
    /// while idle.
    ///
    /// The in-memory state changes only after every write succeeded. A failure midway can leave
    /// storage partially updated; [Self::resume] brings the two back together.
    #[instrument(skip(self))]
    pub async fn update_running(
        &mut self,
        update: RunningUpdate,
    ) -> Result<Option<&RunningTimer>, TimerError> {
        let Some(running) = self.running() else {
            return Ok(None);
        };
        let mut next = running.clone();

        let entry_update = TimeEntryUpdate {
            description: update.description.clone(),
            project_id: update.project_id,
            ..Default::default()
        };
        if !entry_update.is_empty() {
            self.store.update_entry(next.entry_id, entry_update).await?;
        }
        if let Some(description) = update.description {
            next.description = description;
        }
        if let Some(project_id) = update.project_id {
            next.project_id = project_id;
        }

        if let Some(tag_ids) = update.tag_ids {
            let tag_ids = dedup(tag_ids);
            let (added, removed) = tag_diff(&next.tag_ids, &tag_ids);
            if !added.is_empty() {
                self.store.add_tags(next.entry_id, &added).await?;
            }
            if !removed.is_empty() {
                self.store.remove_tags(next.entry_id, &removed).await?;
            }
            next.tag_ids = tag_ids;
        }

        self.state = TimerState::Running(next);
        Ok(self.running())
    }

    /// Forgets the running entry without touching storage.
    pub fn reset(&mut self) {
        self.enter_idle();
    }

    fn enter_running(&mut self, running: RunningTimer, elapsed: u64) {
        // A fresh counter, so a ticker that has not noticed cancellation yet counts into nothing.
        self.ticker = None;
        self.elapsed = Arc::new(AtomicU64::new(elapsed));
        if self.live_ticks {
            self.ticker = Some(Ticker::spawn(self.elapsed.clone(), self.clock.clone()));
        }
        self.state = TimerState::Running(running);
    }

    fn enter_idle(&mut self) {
        self.ticker = None;
        self.elapsed = Arc::new(AtomicU64::new(0));
        self.state = TimerState::Idle;
    }
}

fn multiple_running(entries: &[TimeEntry]) -> TimerError {
    let ids = entries.iter().map(|e| e.id).collect::<Vec<_>>();
    error!("Found several running entries {ids:?}");
    TimerError::MultipleRunning(ids)
}

fn dedup(ids: Vec<EntityId>) -> Vec<EntityId> {
    let mut result = Vec::with_capacity(ids.len());
    for id in ids {
        if !result.contains(&id) {
            result.push(id);
        }
    }
    result
}

/// `(added, removed)` going from `old` to `new`. Tags in both sets appear in neither.
pub fn tag_diff(old: &[EntityId], new: &[EntityId]) -> (Vec<EntityId>, Vec<EntityId>) {
    let added = new.iter().filter(|id| !old.contains(id)).copied().collect();
    let removed = old.iter().filter(|id| !new.contains(id)).copied().collect();
    (added, removed)
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::NaiveDateTime;
    use tempfile::tempdir;
    use tokio::time::Instant;

    use super::*;
    use crate::{
        model::entities::NewTimeEntry,
        storage::{local::LocalStore, TagRepository, TimeEntryRepository},
        utils::{clock::Clock, logging::TEST_LOGGING, time::parse_timestamp},
    };

    /// Wall clock that only moves when told to.
    #[derive(Clone)]
    struct TestClock {
        now: Arc<Mutex<NaiveDateTime>>,
    }

    impl TestClock {
        fn at(value: &str) -> Self {
            Self {
                now: Arc::new(Mutex::new(parse_timestamp(value).unwrap())),
            }
        }

        fn advance(&self, seconds: i64) {
            *self.now.lock().unwrap() += chrono::Duration::seconds(seconds);
        }
    }

    #[async_trait]
    impl Clock for TestClock {
        fn now(&self) -> NaiveDateTime {
            *self.now.lock().unwrap()
        }

        fn instant(&self) -> Instant {
            Instant::now()
        }

        async fn sleep_until(&self, instant: Instant) {
            tokio::time::sleep_until(instant).await;
        }
    }

    fn machine(store: &Arc<LocalStore>, clock: &TestClock) -> TimerMachine {
        TimerMachine::new(store.clone(), Arc::new(clock.clone()))
    }

    fn memory_store(clock: &TestClock) -> Arc<LocalStore> {
        Arc::new(LocalStore::in_memory().with_clock(clock.clone()))
    }

    #[tokio::test]
    async fn test_start_survives_restart() -> Result<()> {
        *TEST_LOGGING;
        let clock = TestClock::at("2024-01-08T09:00:00");
        let store = memory_store(&clock);
        let a = store.create_tag("a").await?;
        let b = store.create_tag("b").await?;

        let mut timer = machine(&store, &clock);
        let started = timer
            .start(StartTimer {
                description: "Writing".into(),
                tag_ids: vec![b.id, a.id, b.id],
                ..Default::default()
            })
            .await?;
        assert_eq!(timer.elapsed_seconds(), 0);

        clock.advance(95);
        let mut restarted = machine(&store, &clock);
        restarted.resume().await?;
        assert!(restarted.is_running());
        assert_eq!(restarted.running(), Some(&started));
        assert_eq!(started.tag_ids, vec![b.id, a.id]);
        assert_eq!(restarted.elapsed_seconds(), 95);
        Ok(())
    }

    #[tokio::test]
    async fn test_stop_persists_duration() -> Result<()> {
        let clock = TestClock::at("2024-01-08T09:00:00");
        let store = memory_store(&clock);
        let mut timer = machine(&store, &clock);

        assert!(timer.stop().await?.is_none());

        let entry_id = timer.start(StartTimer::default()).await?.entry_id;
        clock.advance(3600);
        let stopped = timer.stop().await?.unwrap();

        assert_eq!(stopped.id, entry_id);
        assert_eq!(stopped.duration_seconds, Some(3600));
        assert!(stopped.stop_time.is_some());
        assert_eq!(timer.snapshot(), TimerSnapshot::default());
        assert!(store.active_entries().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_start_refuses_second_entry() -> Result<()> {
        let clock = TestClock::at("2024-01-08T09:00:00");
        let store = memory_store(&clock);
        let mut first = machine(&store, &clock);
        let entry_id = first.start(StartTimer::default()).await?.entry_id;

        let mut second = machine(&store, &clock);
        assert!(matches!(
            second.start(StartTimer::default()).await,
            Err(TimerError::AlreadyRunning(id)) if id == entry_id
        ));
        assert!(!second.is_running());
        assert_eq!(store.entries().await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_multiple_running_is_an_error() -> Result<()> {
        let clock = TestClock::at("2024-01-08T09:00:00");
        let store = memory_store(&clock);
        let first = store.create_entry(NewTimeEntry::running(clock.now())).await?;
        let second = store.create_entry(NewTimeEntry::running(clock.now())).await?;

        let mut timer = machine(&store, &clock);
        match timer.resume().await {
            Err(TimerError::MultipleRunning(mut ids)) => {
                ids.sort();
                assert_eq!(ids, vec![first.id, second.id]);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            timer.start(StartTimer::default()).await,
            Err(TimerError::MultipleRunning(_))
        ));
        assert!(!timer.is_running());
        Ok(())
    }

    #[tokio::test]
    async fn test_resume_without_running_entry_forces_idle() -> Result<()> {
        let clock = TestClock::at("2024-01-08T09:00:00");
        let store = memory_store(&clock);
        let mut timer = machine(&store, &clock);
        timer.start(StartTimer::default()).await?;

        // Someone else stopped the entry.
        let mut other = machine(&store, &clock);
        other.resume().await?;
        other.stop().await?;

        assert_eq!(timer.resume().await?, &TimerState::Idle);
        Ok(())
    }

    #[tokio::test]
    async fn test_tick() -> Result<()> {
        let clock = TestClock::at("2024-01-08T09:00:00");
        let store = memory_store(&clock);
        let mut timer = machine(&store, &clock);

        timer.tick();
        assert_eq!(timer.elapsed_seconds(), 0);

        timer.start(StartTimer::default()).await?;
        let before = timer.snapshot();
        timer.tick();
        timer.tick();
        let after = timer.snapshot();
        assert_eq!(after.elapsed_seconds, 2);
        assert_eq!(
            after,
            TimerSnapshot {
                elapsed_seconds: 2,
                ..before
            }
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_update_running_writes_tag_diff() -> Result<()> {
        let clock = TestClock::at("2024-01-08T09:00:00");
        let store = memory_store(&clock);
        let a = store.create_tag("a").await?;
        let b = store.create_tag("b").await?;
        let c = store.create_tag("c").await?;
        let mut timer = machine(&store, &clock);

        assert!(timer.update_running(RunningUpdate::default()).await?.is_none());

        let entry_id = timer
            .start(StartTimer {
                tag_ids: vec![a.id, b.id],
                ..Default::default()
            })
            .await?
            .entry_id;

        let updated = timer
            .update_running(RunningUpdate {
                description: Some("Planning".into()),
                tag_ids: Some(vec![b.id, c.id]),
                ..Default::default()
            })
            .await?
            .cloned()
            .unwrap();
        assert_eq!(updated.description, "Planning");
        assert_eq!(updated.tag_ids, vec![b.id, c.id]);

        // b was never touched, so it keeps its place in front of c.
        assert_eq!(store.tags_for_entry(entry_id).await?, vec![b.id, c.id]);
        let entry = store.entry(entry_id).await?.unwrap();
        assert_eq!(entry.description, "Planning");
        assert!(entry.is_running());
        Ok(())
    }

    #[test]
    fn test_tag_diff() {
        assert_eq!(tag_diff(&[1, 2], &[2, 3]), (vec![3], vec![1]));
        assert_eq!(tag_diff(&[1, 2], &[1, 2]), (vec![], vec![]));
        assert_eq!(tag_diff(&[], &[4]), (vec![4], vec![]));
    }

    #[tokio::test]
    async fn test_reset_keeps_storage() -> Result<()> {
        let clock = TestClock::at("2024-01-08T09:00:00");
        let store = memory_store(&clock);
        let mut timer = machine(&store, &clock);
        timer.start(StartTimer::default()).await?;
        timer.reset();
        assert!(!timer.is_running());
        assert_eq!(store.active_entries().await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_writes_keep_state() -> Result<()> {
        let clock = TestClock::at("2024-01-08T09:00:00");
        let dir = tempdir()?;
        let path = dir.path().join("timeflow.json");
        let store = Arc::new(LocalStore::open(path.clone()).await?.with_clock(clock.clone()));

        let mut timer = machine(&store, &clock);
        timer.start(StartTimer::default()).await?;
        let running = timer.snapshot();

        std::fs::remove_file(&path)?;
        std::fs::create_dir(&path)?;

        clock.advance(60);
        assert!(matches!(timer.stop().await, Err(TimerError::Store(_))));
        assert_eq!(timer.snapshot(), running);

        assert!(timer
            .update_running(RunningUpdate {
                description: Some("lost".into()),
                ..Default::default()
            })
            .await
            .is_err());
        assert_eq!(timer.snapshot(), running);

        assert_eq!(store.active_entries().await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_start_stays_idle() -> Result<()> {
        let clock = TestClock::at("2024-01-08T09:00:00");
        let dir = tempdir()?;
        let path = dir.path().join("timeflow.json");
        let store = Arc::new(LocalStore::open(path.clone()).await?.with_clock(clock.clone()));
        std::fs::create_dir(&path)?;

        let mut timer = machine(&store, &clock);
        assert!(matches!(
            timer.start(StartTimer::default()).await,
            Err(TimerError::Store(StoreError::Io(_)))
        ));
        assert_eq!(timer.state(), &TimerState::Idle);
        assert!(store.entries().await?.is_empty());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_ticks_follow_state() -> Result<()> {
        let clock = TestClock::at("2024-01-08T09:00:00");
        let store = memory_store(&clock);
        let mut timer = machine(&store, &clock).with_live_ticks();

        timer.start(StartTimer::default()).await?;
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(timer.elapsed_seconds(), 2);

        timer.stop().await?;
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(timer.elapsed_seconds(), 0);
        assert!(!timer.is_running());
        Ok(())
    }
}
