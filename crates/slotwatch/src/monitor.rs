//! The check pipeline run on every scheduler tick.
//!
//! Targets are processed one after another. For each enabled target the page
//! is rendered and classified, the observation is logged, the final URL is
//! recorded, the notification decision is made against the previous status
//! and finally the new status is stored. A failure while processing one
//! target is logged and counted; the next target is processed regardless.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use slotwatch_detect::{classify, Classification, RuleId, Status};
use slotwatch_notify::{DispatchOutcome, Dispatcher, PushGateway};
use slotwatch_store::{Target, TargetId, TargetStore, TargetUpdate};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::render::Renderer;

/// Result of rendering and classifying one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    /// When the check started.
    pub checked_at: DateTime<Utc>,
    /// Status and evidence.
    pub classification: Classification,
    /// URL the page ended on, if it rendered.
    pub final_url: Option<String>,
    /// Why the page could not be rendered.
    pub error: Option<String>,
}

/// What happened to one target during a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetOutcome {
    /// Target checked.
    pub target_id: TargetId,
    /// Status before the check.
    pub previous: Option<Status>,
    /// Status observed.
    pub status: Status,
    /// Rules that matched.
    pub evidence: Vec<RuleId>,
    /// Render error, if any.
    pub error: Option<String>,
    /// Notification result.
    pub notification: DispatchOutcome,
}

/// Summary of one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Targets whose pipeline completed.
    pub outcomes: Vec<TargetOutcome>,
    /// Targets whose pipeline failed, with the error.
    pub failures: Vec<(TargetId, String)>,
}

impl TickReport {
    /// Number of enabled targets visited.
    #[must_use]
    pub fn checked(&self) -> usize {
        self.outcomes.len() + self.failures.len()
    }

    /// Number of completed checks with the given status.
    #[must_use]
    pub fn count(&self, status: Status) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }

    /// Number of notifications the gateway accepted.
    #[must_use]
    pub fn notified(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.notification == DispatchOutcome::Delivered)
            .count()
    }
}

/// Drives render → classify → log → notify → store for every enabled target.
#[derive(Debug)]
pub struct Monitor<R, G> {
    store: Arc<TargetStore>,
    renderer: R,
    dispatcher: Dispatcher<G>,
    render_timeout: Duration,
}

impl<R: Renderer, G: PushGateway> Monitor<R, G> {
    /// Creates a monitor.
    pub fn new(
        store: Arc<TargetStore>,
        renderer: R,
        dispatcher: Dispatcher<G>,
        render_timeout: Duration,
    ) -> Self {
        Self {
            store,
            renderer,
            dispatcher,
            render_timeout,
        }
    }

    /// The target store.
    pub fn store(&self) -> &Arc<TargetStore> {
        &self.store
    }

    /// The dispatcher.
    pub const fn dispatcher(&self) -> &Dispatcher<G> {
        &self.dispatcher
    }

    /// Runs one tick over all enabled targets.
    pub async fn tick(&self) -> TickReport {
        let targets = self.store.list_enabled();
        debug!(targets = targets.len(), "tick started");

        let mut report = TickReport::default();
        for target in &targets {
            match self.check_target(target).await {
                Ok(outcome) => report.outcomes.push(outcome),
                Err(e) => {
                    warn!(target_id = %target.id, error = %e, "target check failed");
                    report.failures.push((target.id, e.to_string()));
                }
            }
        }

        info!(
            checked = report.checked(),
            open = report.count(Status::Open),
            closed = report.count(Status::Closed),
            unknown = report.count(Status::Unknown),
            notified = report.notified(),
            failed = report.failures.len(),
            "tick finished"
        );
        report
    }

    /// Renders and classifies a target without touching any state.
    pub async fn observe(&self, target: &Target) -> Observation {
        let checked_at = Utc::now();
        match self.renderer.render(&target.url, self.render_timeout).await {
            Ok(page) => {
                let classification = classify(&page, &target.policy);
                Observation {
                    checked_at,
                    classification,
                    final_url: Some(page.final_url).filter(|u| !u.is_empty()),
                    error: None,
                }
            }
            Err(e) => {
                warn!(target_id = %target.id, url = %target.url, error = %e, "render failed");
                Observation {
                    checked_at,
                    classification: Classification::unknown(),
                    final_url: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Runs the full pipeline for one target.
    ///
    /// # Errors
    ///
    /// Returns an error if the target or its state cannot be written. The
    /// observation log entry and any notification sent before the failure
    /// stay in place.
    pub async fn check_target(&self, target: &Target) -> Result<TargetOutcome> {
        let observation = self.observe(target).await;
        let status = observation.classification.status;

        if let Err(e) = self.store.observations().append(
            target.id,
            observation.checked_at,
            status,
            observation.classification.evidence.clone(),
            observation.error.clone(),
        ) {
            warn!(target_id = %target.id, error = %e, "failed to append observation");
        }

        if let Some(final_url) = &observation.final_url {
            if target.final_url.as_ref() != Some(final_url) {
                self.store
                    .update(target.id, TargetUpdate::final_url(final_url.clone()))?;
                debug!(target_id = %target.id, final_url = %final_url, "final url changed");
            }
        }

        let previous = self.store.get_state(target.id).map(|s| s.status);
        let notification = self.dispatcher.dispatch(target, previous, status).await;
        self.store.set_state(target.id, status)?;

        debug!(
            target_id = %target.id,
            previous = ?previous,
            status = %status,
            evidence = ?observation.classification.evidence_names(),
            "target checked"
        );

        Ok(TargetOutcome {
            target_id: target.id,
            previous,
            status,
            evidence: observation.classification.evidence,
            error: observation.error,
            notification,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RenderError;
    use parking_lot::Mutex;
    use slotwatch_detect::{Element, RulePolicy, Snapshot};
    use slotwatch_notify::{Notification, NotifyError};
    use slotwatch_store::{NewTarget, ObservationLog};
    use std::collections::HashMap;

    #[derive(Debug, Default)]
    struct FakeRenderer {
        pages: Mutex<HashMap<String, std::result::Result<Snapshot, RenderError>>>,
    }

    impl FakeRenderer {
        fn set(&self, url: &str, page: std::result::Result<Snapshot, RenderError>) {
            self.pages.lock().insert(url.to_string(), page);
        }
    }

    impl Renderer for FakeRenderer {
        async fn render(
            &self,
            url: &str,
            _timeout: Duration,
        ) -> std::result::Result<Snapshot, RenderError> {
            self.pages
                .lock()
                .get(url)
                .cloned()
                .unwrap_or_else(|| Err(RenderError::Navigation("no such page".into())))
        }
    }

    #[derive(Debug, Default)]
    struct RecordingGateway {
        sent: Mutex<Vec<Notification>>,
    }

    impl PushGateway for RecordingGateway {
        fn name(&self) -> &str {
            "recording"
        }

        async fn deliver(&self, notification: &Notification) -> slotwatch_notify::Result<()> {
            if notification.title.starts_with("broken") {
                return Err(NotifyError::Transport("connection reset".into()));
            }
            self.sent.lock().push(notification.clone());
            Ok(())
        }
    }

    fn monitor(dir: &std::path::Path) -> Monitor<FakeRenderer, RecordingGateway> {
        let log = Arc::new(ObservationLog::open(dir.join("observations")));
        let store = Arc::new(TargetStore::open(dir, log).unwrap());
        Monitor::new(
            store,
            FakeRenderer::default(),
            Dispatcher::new(RecordingGateway::default()),
            Duration::from_secs(5),
        )
    }

    fn open_page(final_url: &str) -> Snapshot {
        Snapshot::new(final_url, vec![Element::new("a", "예약하기")])
    }

    #[tokio::test]
    async fn disabled_targets_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let monitor = monitor(dir.path());
        monitor
            .store()
            .add(NewTarget::new("off", "https://off.test").enabled(false))
            .unwrap();

        let report = monitor.tick().await;
        assert_eq!(report.checked(), 0);
    }

    #[tokio::test]
    async fn final_url_is_recorded_but_click_url_stays_input() {
        let dir = tempfile::tempdir().unwrap();
        let monitor = monitor(dir.path());
        let id = monitor
            .store()
            .add(NewTarget::new("clinic", "https://clinic.test/r"))
            .unwrap();
        monitor
            .renderer
            .set("https://clinic.test/r", Ok(open_page("https://clinic.test/landing")));

        let report = monitor.tick().await;
        assert_eq!(report.notified(), 1);

        let target = monitor.store().get(id).unwrap();
        assert_eq!(target.final_url.as_deref(), Some("https://clinic.test/landing"));

        let sent = monitor.dispatcher().gateway().sent.lock().clone();
        assert_eq!(sent[0].click_url, "https://clinic.test/r");
    }

    #[tokio::test]
    async fn render_failure_keeps_stored_final_url() {
        let dir = tempfile::tempdir().unwrap();
        let monitor = monitor(dir.path());
        let id = monitor
            .store()
            .add(NewTarget::new("clinic", "https://clinic.test/r"))
            .unwrap();
        monitor
            .store()
            .update(id, TargetUpdate::final_url("https://clinic.test/old"))
            .unwrap();

        let report = monitor.tick().await;
        assert_eq!(report.count(Status::Unknown), 1);
        assert_eq!(
            monitor.store().get(id).unwrap().final_url.as_deref(),
            Some("https://clinic.test/old")
        );
    }

    #[tokio::test]
    async fn failing_target_does_not_affect_others() {
        let dir = tempfile::tempdir().unwrap();
        let monitor = monitor(dir.path());
        let broken = monitor
            .store()
            .add(NewTarget::new("broken", "https://broken.test"))
            .unwrap();
        let fine = monitor
            .store()
            .add(NewTarget::new("fine", "https://fine.test"))
            .unwrap();
        monitor.renderer.set("https://broken.test", Ok(open_page("https://broken.test")));
        monitor.renderer.set("https://fine.test", Ok(open_page("https://fine.test")));

        let report = monitor.tick().await;

        assert_eq!(report.checked(), 2);
        let by_id: HashMap<_, _> = report
            .outcomes
            .iter()
            .map(|o| (o.target_id, o.notification.clone()))
            .collect();
        assert!(matches!(by_id[&broken], DispatchOutcome::Failed(_)));
        assert_eq!(by_id[&fine], DispatchOutcome::Delivered);

        // A failed delivery still commits the transition.
        assert_eq!(monitor.store().get_state(broken).unwrap().status, Status::Open);
        assert_eq!(monitor.store().get_state(fine).unwrap().status, Status::Open);
    }

    #[tokio::test]
    async fn observe_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let monitor = monitor(dir.path());
        let id = monitor
            .store()
            .add(NewTarget::new("clinic", "https://clinic.test/r").with_policy(RulePolicy::parse("A").unwrap()))
            .unwrap();
        monitor
            .renderer
            .set("https://clinic.test/r", Ok(open_page("https://clinic.test/r")));

        let target = monitor.store().get(id).unwrap();
        let observation = monitor.observe(&target).await;

        assert_eq!(observation.classification.status, Status::Open);
        assert_eq!(monitor.store().get_state(id).unwrap().status, Status::Unknown);
        assert!(monitor.store().observations().recent(id, 10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn staying_open_notifies_once() {
        let dir = tempfile::tempdir().unwrap();
        let monitor = monitor(dir.path());
        monitor
            .store()
            .add(NewTarget::new("clinic", "https://clinic.test/r"))
            .unwrap();
        monitor
            .renderer
            .set("https://clinic.test/r", Ok(open_page("https://clinic.test/r")));

        for _ in 0..3 {
            monitor.tick().await;
        }
        assert_eq!(monitor.dispatcher().gateway().sent.lock().len(), 1);
    }
}
