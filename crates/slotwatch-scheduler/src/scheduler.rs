//! The periodic scheduler.
//!
//! A timer task sleeps for a jittered delay and then spawns the routine as a
//! separate task. The two are decoupled so that the timer keeps firing while
//! a long invocation runs; the in-flight flag then turns the firing into a
//! reschedule instead of a second concurrent invocation.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::{validate_interval, SchedulerConfig};
use crate::error::{Result, SchedulerError};

/// Lifecycle phase of a [`Scheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Created, not yet started.
    Idle,
    /// Timer armed.
    Running,
    /// Stopped for good.
    Stopped,
}

impl Phase {
    /// Returns the phase as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
struct Control {
    phase: Phase,
    timer: Option<JoinHandle<()>>,
    interval_tx: Option<watch::Sender<Duration>>,
}

#[derive(Debug)]
struct Shared {
    config: Mutex<SchedulerConfig>,
    control: Mutex<Control>,
    in_flight: AtomicBool,
}

impl Shared {
    fn phase(&self) -> Phase {
        self.control.lock().phase
    }

    fn next_delay(&self) -> Duration {
        self.config.lock().next_delay()
    }

    fn try_begin(&self) -> bool {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Runs a routine periodically with jitter, never twice at once.
#[derive(Debug)]
pub struct Scheduler {
    shared: Arc<Shared>,
}

impl Scheduler {
    /// Creates an idle scheduler.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: SchedulerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            shared: Arc::new(Shared {
                config: Mutex::new(config),
                control: Mutex::new(Control {
                    phase: Phase::Idle,
                    timer: None,
                    interval_tx: None,
                }),
                in_flight: AtomicBool::new(false),
            }),
        })
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.shared.phase()
    }

    /// Whether an invocation is currently running.
    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        self.shared.in_flight.load(Ordering::Acquire)
    }

    /// Current base interval.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.shared.config.lock().base_interval
    }

    /// Starts the scheduler. The first invocation happens after one
    /// jittered delay.
    ///
    /// Errors returned by `routine` and panics inside it are logged; the
    /// schedule continues either way.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::InvalidTransition` unless the scheduler is
    /// idle, and `SchedulerError::NoRuntime` outside a tokio runtime.
    pub fn start<F, Fut, E>(&self, routine: F) -> Result<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), E>> + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| SchedulerError::NoRuntime)?;

        let mut control = self.shared.control.lock();
        if control.phase != Phase::Idle {
            return Err(SchedulerError::InvalidTransition {
                from: control.phase,
                action: "start",
            });
        }

        let base = self.interval();
        let (interval_tx, interval_rx) = watch::channel(base);
        let timer = runtime.spawn(run_timer(
            Arc::clone(&self.shared),
            Arc::new(routine),
            interval_rx,
        ));

        control.phase = Phase::Running;
        control.timer = Some(timer);
        control.interval_tx = Some(interval_tx);
        drop(control);

        info!(interval_ms = base.as_millis() as u64, "scheduler started");
        Ok(())
    }

    /// Stops the scheduler. The pending timer is cancelled; an invocation
    /// that is already running finishes on its own.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::InvalidTransition` unless the scheduler is
    /// running.
    pub fn stop(&self) -> Result<()> {
        let mut control = self.shared.control.lock();
        if control.phase != Phase::Running {
            return Err(SchedulerError::InvalidTransition {
                from: control.phase,
                action: "stop",
            });
        }

        control.phase = Phase::Stopped;
        control.interval_tx = None;
        if let Some(timer) = control.timer.take() {
            timer.abort();
        }
        drop(control);

        info!(in_flight = self.is_in_flight(), "scheduler stopped");
        Ok(())
    }

    /// Replaces the base interval used for future delays.
    ///
    /// Between invocations the pending timer is re-armed with a delay drawn
    /// from the new interval. While an invocation runs the pending timer is
    /// left alone and the new interval applies from the next decision.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::InvalidConfig` for a zero interval.
    pub fn update_interval(&self, base: Duration) -> Result<()> {
        validate_interval(base)?;
        self.shared.config.lock().base_interval = base;

        if let Some(tx) = &self.shared.control.lock().interval_tx {
            tx.send_replace(base);
        }
        info!(interval_ms = base.as_millis() as u64, "scheduler interval updated");
        Ok(())
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Some(timer) = self.shared.control.lock().timer.take() {
            timer.abort();
        }
    }
}

async fn run_timer<F, Fut, E>(
    shared: Arc<Shared>,
    routine: Arc<F>,
    mut interval_rx: watch::Receiver<Duration>,
) where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<(), E>> + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    let sleep = tokio::time::sleep(shared.next_delay());
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            () = &mut sleep => {}
            changed = interval_rx.changed() => {
                if changed.is_err() {
                    return;
                }
                if !shared.in_flight.load(Ordering::Acquire) {
                    let delay = shared.next_delay();
                    debug!(delay_ms = delay.as_millis() as u64, "timer re-armed");
                    sleep.as_mut().reset(Instant::now() + delay);
                }
                continue;
            }
        }

        if shared.phase() != Phase::Running {
            return;
        }

        if shared.try_begin() {
            tokio::spawn(invoke(Arc::clone(&shared), Arc::clone(&routine)));
        } else {
            debug!("previous run still in flight, rescheduling");
        }

        sleep.as_mut().reset(Instant::now() + shared.next_delay());
    }
}

async fn invoke<F, Fut, E>(shared: Arc<Shared>, routine: Arc<F>)
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<(), E>> + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    // Run in its own task so a panic surfaces as a JoinError here.
    let started = Instant::now();
    let outcome = tokio::spawn(routine()).await;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    match outcome {
        Ok(Ok(())) => debug!(elapsed_ms, "scheduled run finished"),
        Ok(Err(e)) => warn!(elapsed_ms, error = %e, "scheduled run failed"),
        Err(e) if e.is_panic() => error!(elapsed_ms, "scheduled run panicked"),
        Err(e) => warn!(elapsed_ms, error = %e, "scheduled run was cancelled"),
    }

    shared.in_flight.store(false, Ordering::Release);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn every(secs: u64) -> SchedulerConfig {
        SchedulerConfig::new(Duration::from_secs(secs)).with_jitter(0.0)
    }

    fn counting(
        counter: Arc<AtomicUsize>,
    ) -> impl Fn() -> std::future::Ready<std::result::Result<(), String>> + Send + Sync + 'static
    {
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Ok(()))
        }
    }

    #[test]
    fn phase_display() {
        assert_eq!(Phase::Idle.to_string(), "idle");
        assert_eq!(Phase::Running.to_string(), "running");
    }

    #[test]
    fn new_rejects_invalid_config() {
        let config = SchedulerConfig::new(Duration::ZERO);
        assert!(Scheduler::new(config).is_err());
    }

    #[test]
    fn start_outside_runtime_fails() {
        let scheduler = Scheduler::new(every(10)).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        assert_eq!(
            scheduler.start(counting(Arc::clone(&counter))),
            Err(SchedulerError::NoRuntime)
        );
        assert_eq!(scheduler.phase(), Phase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn runs_after_each_delay() {
        let scheduler = Scheduler::new(every(10)).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        scheduler.start(counting(Arc::clone(&counter))).unwrap();
        assert_eq!(scheduler.phase(), Phase::Running);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_transitions_are_rejected() {
        let scheduler = Scheduler::new(every(10)).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        assert!(matches!(
            scheduler.stop(),
            Err(SchedulerError::InvalidTransition { from: Phase::Idle, .. })
        ));

        scheduler.start(counting(Arc::clone(&counter))).unwrap();
        assert!(matches!(
            scheduler.start(counting(Arc::clone(&counter))),
            Err(SchedulerError::InvalidTransition { from: Phase::Running, .. })
        ));

        scheduler.stop().unwrap();
        assert!(matches!(
            scheduler.start(counting(Arc::clone(&counter))),
            Err(SchedulerError::InvalidTransition { from: Phase::Stopped, .. })
        ));
        assert!(scheduler.stop().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn never_runs_two_invocations_at_once() {
        let scheduler = Scheduler::new(every(10)).unwrap();
        let active = Arc::new(AtomicUsize::new(0));
        let max_active = Arc::new(AtomicUsize::new(0));
        let runs = Arc::new(AtomicUsize::new(0));

        {
            let (active, max_active, runs) =
                (Arc::clone(&active), Arc::clone(&max_active), Arc::clone(&runs));
            scheduler
                .start(move || {
                    let (active, max_active, runs) =
                        (Arc::clone(&active), Arc::clone(&max_active), Arc::clone(&runs));
                    async move {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        max_active.fetch_max(now, Ordering::SeqCst);
                        runs.fetch_add(1, Ordering::SeqCst);
                        // Outlasts two timer periods.
                        tokio::time::sleep(Duration::from_secs(25)).await;
                        active.fetch_sub(1, Ordering::SeqCst);
                        Ok::<(), String>(())
                    }
                })
                .unwrap();
        }

        tokio::time::sleep(Duration::from_secs(12)).await;
        assert!(scheduler.is_in_flight());

        tokio::time::sleep(Duration::from_secs(88)).await;
        assert_eq!(max_active.load(Ordering::SeqCst), 1);
        assert!(runs.load(Ordering::SeqCst) >= 2);
        assert!(runs.load(Ordering::SeqCst) <= 4);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_lets_in_flight_run_finish() {
        let scheduler = Scheduler::new(every(10)).unwrap();
        let runs = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicBool::new(false));

        {
            let (runs, finished) = (Arc::clone(&runs), Arc::clone(&finished));
            scheduler
                .start(move || {
                    let (runs, finished) = (Arc::clone(&runs), Arc::clone(&finished));
                    async move {
                        runs.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_secs(5)).await;
                        finished.store(true, Ordering::SeqCst);
                        Ok::<(), String>(())
                    }
                })
                .unwrap();
        }

        tokio::time::sleep(Duration::from_secs(12)).await;
        assert!(scheduler.is_in_flight());
        scheduler.stop().unwrap();

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(finished.load(Ordering::SeqCst));
        assert!(!scheduler.is_in_flight());
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.phase(), Phase::Stopped);
    }

    #[allow(clippy::panic)]
    #[tokio::test(start_paused = true)]
    async fn errors_and_panics_do_not_stop_the_schedule() {
        let scheduler = Scheduler::new(every(10)).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));

        {
            let calls = Arc::clone(&calls);
            scheduler
                .start(move || {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        match n {
                            0 => Err("render service down".to_string()),
                            1 => panic!("boom"),
                            _ => Ok(()),
                        }
                    }
                })
                .unwrap();
        }

        tokio::time::sleep(Duration::from_secs(45)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert!(!scheduler.is_in_flight());
    }

    #[tokio::test(start_paused = true)]
    async fn update_interval_rearms_idle_timer() {
        let scheduler = Scheduler::new(every(100)).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        scheduler.start(counting(Arc::clone(&counter))).unwrap();

        tokio::time::sleep(Duration::from_secs(1)).await;
        scheduler.update_interval(Duration::from_secs(5)).unwrap();
        assert_eq!(scheduler.interval(), Duration::from_secs(5));

        tokio::time::sleep(Duration::from_secs(8)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn update_interval_during_run_keeps_pending_timer() {
        let scheduler = Scheduler::new(every(10)).unwrap();
        let release = Arc::new(tokio::sync::Notify::new());
        let calls = Arc::new(Mutex::new(Vec::new()));
        let origin = Instant::now();

        {
            let (release, calls) = (Arc::clone(&release), Arc::clone(&calls));
            scheduler
                .start(move || {
                    let (release, calls) = (Arc::clone(&release), Arc::clone(&calls));
                    async move {
                        let first = {
                            let mut calls = calls.lock();
                            calls.push(Instant::now());
                            calls.len() == 1
                        };
                        if first {
                            release.notified().await;
                        }
                        Ok::<(), String>(())
                    }
                })
                .unwrap();
        }

        // First run starts at 10s and blocks; the next fire is armed for 20s.
        tokio::time::sleep(Duration::from_secs(12)).await;
        assert!(scheduler.is_in_flight());
        scheduler.update_interval(Duration::from_secs(30)).unwrap();

        tokio::time::sleep(Duration::from_secs(3)).await;
        release.notify_one();

        tokio::time::sleep(Duration::from_secs(40)).await;
        let offsets: Vec<u64> = calls
            .lock()
            .iter()
            .map(|at| (*at - origin).as_secs())
            .collect();
        // 20s: the old delay still applied; 50s: the new base from then on.
        assert_eq!(offsets, vec![10, 20, 50]);
    }

    #[tokio::test(start_paused = true)]
    async fn update_interval_rejects_zero() {
        let scheduler = Scheduler::new(every(10)).unwrap();
        assert!(matches!(
            scheduler.update_interval(Duration::ZERO),
            Err(SchedulerError::InvalidConfig(_))
        ));
        assert_eq!(scheduler.interval(), Duration::from_secs(10));
    }
}
