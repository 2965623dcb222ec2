//! Edge-triggered wake and sleep around the companion process lifetime

use std::sync::Arc;
use std::time::Duration;

use lighthouse_ble_controller::Shutdown;
use lighthouse_proto::{BaseStationAddress, PowerState};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::commander::PowerCommander;
use crate::config::{ConfigError, MIN_INTERVAL_MS};
use crate::probe::ProcessProbe;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Idle,
    /// Stations were told to wake for the process `pid`
    Active { pid: u32 },
}

struct Tracked {
    state: WatcherState,
    /// The last wake or sleep command
    pending: Option<JoinHandle<()>>,
    exit_waiter: Option<JoinHandle<()>>,
}

/// Wakes the stations when the companion process starts and puts them to
/// sleep when it exits
///
/// State transitions from the polling tick and from the exit waiter happen
/// under one lock, so a start is acted on exactly once.
pub struct ProcessWatcher<P: ProcessProbe, C: PowerCommander> {
    process_name: Arc<str>,
    addresses: Arc<[BaseStationAddress]>,
    probe: Arc<P>,
    commander: Arc<C>,
    tracked: Arc<Mutex<Tracked>>,
}

impl<P: ProcessProbe, C: PowerCommander> Clone for ProcessWatcher<P, C> {
    fn clone(&self) -> Self {
        Self {
            process_name: self.process_name.clone(),
            addresses: self.addresses.clone(),
            probe: self.probe.clone(),
            commander: self.commander.clone(),
            tracked: self.tracked.clone(),
        }
    }
}

impl<P: ProcessProbe, C: PowerCommander> ProcessWatcher<P, C> {
    pub fn new(
        process_name: &str,
        addresses: Vec<BaseStationAddress>,
        probe: Arc<P>,
        commander: Arc<C>,
    ) -> Self {
        Self {
            process_name: process_name.into(),
            addresses: addresses.into(),
            probe,
            commander,
            tracked: Arc::new(Mutex::new(Tracked {
                state: WatcherState::Idle,
                pending: None,
                exit_waiter: None,
            })),
        }
    }

    pub fn state(&self) -> WatcherState {
        self.tracked.lock().state
    }

    /// Poll every `interval` until `shutdown` fires, then abort pending work
    ///
    /// Intervals below [`MIN_INTERVAL_MS`] are refused.
    pub async fn run(
        &self,
        interval: Duration,
        mut shutdown: Shutdown,
    ) -> Result<(), ConfigError> {
        let millis = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        if millis < MIN_INTERVAL_MS {
            return Err(ConfigError::IntervalTooShort(millis));
        }

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(process = %self.process_name, ?interval, "watching");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                _ = shutdown.triggered() => break,
            }
        }
        self.shutdown();
        Ok(())
    }

    /// One poll. Returns whether a start was detected.
    ///
    /// The process table is scanned on the blocking pool without holding the
    /// state lock; the state is checked again before acting on the result.
    pub async fn tick(&self) -> bool {
        if self.state() != WatcherState::Idle {
            return false;
        }

        let probe = self.probe.clone();
        let name = self.process_name.clone();
        let found = match tokio::task::spawn_blocking(move || probe.find_running(&name)).await {
            Ok(found) => found,
            Err(error) => {
                warn!(%error, "process lookup failed");
                return false;
            }
        };
        let Some(pid) = found else {
            return false;
        };

        let mut tracked = self.tracked.lock();
        if tracked.state != WatcherState::Idle {
            return false;
        }

        info!(process = %self.process_name, pid, "companion process started, waking base stations");
        tracked.state = WatcherState::Active { pid };
        if let Some(previous) = tracked.pending.take() {
            previous.abort();
        }
        tracked.pending = Some(self.spawn_command(PowerState::Wake));

        let watcher = self.clone();
        tracked.exit_waiter = Some(tokio::spawn(async move {
            watcher.probe.wait_for_exit(pid).await;
            watcher.handle_exit(pid);
        }));
        true
    }

    /// Abort pending commands and exit tracking
    pub fn shutdown(&self) {
        let mut tracked = self.tracked.lock();
        if let Some(pending) = tracked.pending.take() {
            pending.abort();
        }
        if let Some(waiter) = tracked.exit_waiter.take() {
            waiter.abort();
        }
        tracked.state = WatcherState::Idle;
    }

    fn handle_exit(&self, pid: u32) {
        let mut tracked = self.tracked.lock();
        if tracked.state != (WatcherState::Active { pid }) {
            debug!(pid, "exit of an untracked process");
            return;
        }

        if let Some(pending) = tracked.pending.take()
            && !pending.is_finished()
        {
            debug!(pid, "aborting unfinished wake");
            pending.abort();
        }

        info!(process = %self.process_name, pid, "companion process exited, putting base stations to sleep");
        tracked.pending = Some(self.spawn_command(PowerState::Sleep));
        tracked.exit_waiter = None;
        tracked.state = WatcherState::Idle;
    }

    fn spawn_command(&self, state: PowerState) -> JoinHandle<()> {
        let commander = self.commander.clone();
        let addresses = self.addresses.clone();

        tokio::spawn(async move {
            match commander.set_power_state(&addresses, state).await {
                Ok(()) => info!(%state, count = addresses.len(), "base stations switched"),
                Err(error) => warn!(%state, %error, "switching base stations failed"),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commander::CommandError;
    use async_trait::async_trait;
    use tokio::sync::watch;

    struct FakeProbe {
        running: watch::Sender<Option<u32>>,
    }

    impl FakeProbe {
        fn new() -> Self {
            Self { running: watch::Sender::new(None) }
        }

        fn start(&self, pid: u32) {
            self.running.send_replace(Some(pid));
        }

        fn stop(&self) {
            self.running.send_replace(None);
        }
    }

    #[async_trait]
    impl ProcessProbe for FakeProbe {
        fn find_running(&self, _name: &str) -> Option<u32> {
            *self.running.borrow()
        }

        async fn wait_for_exit(&self, pid: u32) {
            let mut rx = self.running.subscribe();
            let _ = rx.wait_for(|running| *running != Some(pid)).await;
        }
    }

    #[derive(Default)]
    struct RecordingCommander {
        started: Mutex<Vec<PowerState>>,
        completed: Mutex<Vec<PowerState>>,
        /// Commands for this state never finish
        hang_on: Option<PowerState>,
    }

    #[async_trait]
    impl PowerCommander for RecordingCommander {
        async fn set_power_state(
            &self,
            addresses: &[BaseStationAddress],
            state: PowerState,
        ) -> Result<(), CommandError> {
            assert_eq!(addresses.len(), 2);
            self.started.lock().push(state);
            if self.hang_on == Some(state) {
                std::future::pending::<()>().await;
            }
            self.completed.lock().push(state);
            Ok(())
        }
    }

    type Watcher = ProcessWatcher<FakeProbe, RecordingCommander>;

    fn watcher(commander: RecordingCommander) -> (Watcher, Arc<FakeProbe>, Arc<RecordingCommander>) {
        let probe = Arc::new(FakeProbe::new());
        let commander = Arc::new(commander);
        let addresses = vec![
            "00:11:22:33:FF:EE".parse().unwrap(),
            "00:11:22:33:FF:EF".parse().unwrap(),
        ];
        let watcher = ProcessWatcher::new("vrserver", addresses, probe.clone(), commander.clone());
        (watcher, probe, commander)
    }

    async fn settle() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn nothing_happens_without_the_process() {
        let (watcher, _probe, commander) = watcher(RecordingCommander::default());

        assert!(!watcher.tick().await);
        settle().await;

        assert_eq!(watcher.state(), WatcherState::Idle);
        assert!(commander.started.lock().is_empty());
    }

    #[tokio::test]
    async fn repeated_ticks_wake_once() {
        let (watcher, probe, commander) = watcher(RecordingCommander::default());
        probe.start(42);

        assert!(watcher.tick().await);
        settle().await;
        assert!(!watcher.tick().await);
        settle().await;

        assert_eq!(watcher.state(), WatcherState::Active { pid: 42 });
        assert_eq!(*commander.completed.lock(), vec![PowerState::Wake]);
    }

    #[tokio::test]
    async fn start_exit_start() {
        let (watcher, probe, commander) = watcher(RecordingCommander::default());

        probe.start(42);
        watcher.tick().await;
        settle().await;
        probe.stop();
        settle().await;
        assert_eq!(watcher.state(), WatcherState::Idle);

        probe.start(43);
        watcher.tick().await;
        settle().await;

        let completed = commander.completed.lock().clone();
        let count = |state| completed.iter().filter(|&&s| s == state).count();
        assert_eq!(count(PowerState::Wake), 2);
        assert_eq!(count(PowerState::Sleep), 1);
        assert_eq!(watcher.state(), WatcherState::Active { pid: 43 });
    }

    #[tokio::test]
    async fn exit_aborts_an_unfinished_wake() {
        let (watcher, probe, commander) = watcher(RecordingCommander {
            hang_on: Some(PowerState::Wake),
            ..Default::default()
        });

        probe.start(42);
        watcher.tick().await;
        settle().await;
        assert_eq!(*commander.started.lock(), vec![PowerState::Wake]);

        probe.stop();
        settle().await;

        assert_eq!(*commander.started.lock(), vec![PowerState::Wake, PowerState::Sleep]);
        assert_eq!(*commander.completed.lock(), vec![PowerState::Sleep]);
    }

    #[tokio::test]
    async fn exit_of_another_process_is_ignored() {
        let (watcher, probe, commander) = watcher(RecordingCommander::default());
        probe.start(42);
        watcher.tick().await;
        settle().await;

        watcher.handle_exit(7);
        settle().await;

        assert_eq!(watcher.state(), WatcherState::Active { pid: 42 });
        assert_eq!(*commander.completed.lock(), vec![PowerState::Wake]);
    }

    #[tokio::test(start_paused = true)]
    async fn run_polls_until_shutdown() {
        let (watcher, probe, commander) = watcher(RecordingCommander::default());
        let (handle, shutdown) = lighthouse_ble_controller::shutdown::channel();

        let script = async {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            probe.start(42);
            tokio::time::sleep(Duration::from_millis(2000)).await;
            handle.trigger();
        };
        let (result, ()) = tokio::join!(watcher.run(Duration::from_secs(1), shutdown), script);

        result.unwrap();

        assert_eq!(*commander.completed.lock(), vec![PowerState::Wake]);
        assert_eq!(watcher.state(), WatcherState::Idle);

        // Exit tracking stopped with the loop
        probe.stop();
        settle().await;
        assert_eq!(commander.started.lock().len(), 1);
    }

    #[tokio::test]
    async fn short_intervals_are_refused() {
        let (watcher, probe, commander) = watcher(RecordingCommander::default());
        probe.start(42);

        for interval in [Duration::ZERO, Duration::from_millis(999)] {
            let result = watcher.run(interval, Shutdown::never()).await;
            assert!(matches!(result, Err(ConfigError::IntervalTooShort(_))), "{interval:?}");
        }

        settle().await;
        assert_eq!(watcher.state(), WatcherState::Idle);
        assert!(commander.started.lock().is_empty());
    }

    /// Reports whether the state lock was free while the process table was scanned
    struct LockCheckingProbe {
        tracked: std::sync::OnceLock<Arc<Mutex<Tracked>>>,
        lock_was_free: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl ProcessProbe for LockCheckingProbe {
        fn find_running(&self, _name: &str) -> Option<u32> {
            let free = self.tracked.get().is_some_and(|t| t.try_lock().is_some());
            self.lock_was_free.store(free, std::sync::atomic::Ordering::SeqCst);
            Some(42)
        }

        async fn wait_for_exit(&self, _pid: u32) {
            std::future::pending::<()>().await;
        }
    }

    #[tokio::test]
    async fn process_scan_runs_without_the_state_lock() {
        let probe = Arc::new(LockCheckingProbe {
            tracked: std::sync::OnceLock::new(),
            lock_was_free: std::sync::atomic::AtomicBool::new(false),
        });
        let addresses = vec![
            "00:11:22:33:FF:EE".parse().unwrap(),
            "00:11:22:33:FF:EF".parse().unwrap(),
        ];
        let commander = Arc::new(RecordingCommander::default());
        let watcher = ProcessWatcher::new("vrserver", addresses, probe.clone(), commander.clone());
        assert!(probe.tracked.set(watcher.tracked.clone()).is_ok());

        assert!(watcher.tick().await);
        settle().await;

        assert!(probe.lock_was_free.load(std::sync::atomic::Ordering::SeqCst));
        assert_eq!(watcher.state(), WatcherState::Active { pid: 42 });
        assert_eq!(*commander.completed.lock(), vec![PowerState::Wake]);
        watcher.shutdown();
    }
}
