//! Status relay - folds step transitions into commit status updates.
//!
//! The relay owns the build state. It applies transitions as they arrive,
//! publishes after a short quiet period, refreshes on a slow cadence, and
//! stops once the build fails or the event source is exhausted.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use super::debounce::PublishTimer;
use crate::api::{ApiError, StatusSink};
use crate::docker::SourceError;
use crate::error::RelayError;
use crate::status::{now_nanos, CommitState, CommitStatusUpdate, StatusSynthesizer};
use crate::steps::{Applied, BuildSteps, Transition};

/// Capacity of the transition channel between reader and relay
pub const TRANSITION_BUFFER: usize = 10;

/// What woke the relay loop
enum Wakeup {
    Transition(Transition),
    Exhausted,
    SourceFinished,
    SourceFailed(SourceError),
    Timer,
}

/// Result of one publish attempt
struct Published {
    update: CommitStatusUpdate,
    result: Result<(), ApiError>,
}

pub struct StatusRelay {
    sink: Arc<dyn StatusSink>,
    synthesizer: StatusSynthesizer,
    steps: BuildSteps,
    expected_steps: usize,
    timer: PublishTimer,
}

impl StatusRelay {
    /// `expected_steps` is the manifest's step count, 0 when unknown.
    pub fn new(
        sink: Arc<dyn StatusSink>,
        synthesizer: StatusSynthesizer,
        expected_steps: usize,
    ) -> Self {
        Self {
            sink,
            synthesizer,
            steps: BuildSteps::new(),
            expected_steps,
            timer: PublishTimer::default(),
        }
    }

    /// Override the quiet period and refresh interval
    pub fn with_timing(mut self, quiet: Duration, refresh: Duration) -> Self {
        self.timer = PublishTimer::new(quiet, refresh);
        self
    }

    /// Run until the build fails or the source is exhausted.
    ///
    /// `source` carries the reader's final result and must be resolved before
    /// the reader drops its transition sender. A source error ends the run
    /// immediately, without a final publish. Otherwise the run ends with the
    /// result of the last publish.
    #[instrument(skip_all, fields(sink = self.sink.name(), expected_steps = self.expected_steps))]
    pub async fn run(
        mut self,
        mut transitions: mpsc::Receiver<Transition>,
        mut source: oneshot::Receiver<Result<(), SourceError>>,
    ) -> Result<(), RelayError> {
        info!("Status relay started");
        let mut source_pending = true;
        let mut exhausted = false;

        loop {
            let wakeup = tokio::select! {
                biased;
                res = &mut source, if source_pending => match res {
                    Ok(Ok(())) => Wakeup::SourceFinished,
                    Ok(Err(e)) => Wakeup::SourceFailed(e),
                    Err(_) => Wakeup::SourceFailed(SourceError::Cancelled),
                },
                t = transitions.recv(), if !exhausted => match t {
                    Some(t) => Wakeup::Transition(t),
                    None => Wakeup::Exhausted,
                },
                () = self.timer.expired() => Wakeup::Timer,
            };

            match wakeup {
                Wakeup::Transition(t) => {
                    if let Applied::Updated { cancelled } = self.steps.apply(t) {
                        if !cancelled.is_empty() {
                            info!(steps = ?cancelled, "Marked running steps cancelled");
                        }
                        self.timer.on_change(Instant::now());
                    }
                    continue;
                }
                Wakeup::SourceFinished => {
                    debug!("Event source finished cleanly");
                    source_pending = false;
                    continue;
                }
                Wakeup::SourceFailed(e) => {
                    warn!(error = %e, "Event source failed");
                    return Err(e.into());
                }
                Wakeup::Exhausted => {
                    info!(steps = self.steps.len(), "Event source exhausted, publishing final status");
                    exhausted = true;
                }
                Wakeup::Timer => {}
            }

            self.timer.on_publish(Instant::now());
            let Some(published) = self.publish().await else {
                if exhausted {
                    info!("No steps observed, nothing to report");
                    return Ok(());
                }
                continue;
            };

            if published.update.state == CommitState::Error {
                info!("Build failed, final status published");
                return published.result.map_err(Into::into);
            }
            if exhausted {
                return published.result.map_err(Into::into);
            }
        }
    }

    /// Synthesize and publish the current status, if any step has been seen.
    async fn publish(&self) -> Option<Published> {
        let snapshot = self.steps.snapshot(self.expected_steps);
        let Some(update) = self.synthesizer.synthesize(&snapshot, now_nanos()) else {
            debug!("No steps observed yet");
            return None;
        };

        info!(
            state = %update.state,
            description = %update.description,
            target_url = %update.target_url,
            "Publishing commit status"
        );
        let result = self.sink.publish(&update).await;
        if let Err(e) = &result {
            warn!(sink = self.sink.name(), error = %e, "Failed to publish commit status");
        }
        Some(Published { update, result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::debounce::DEFAULT_REFRESH;
    use crate::status::BuildLink;
    use crate::steps::StepStatus;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use url::Url;

    /// In-memory sink recording every update it receives
    #[derive(Default)]
    struct RecordingSink {
        updates: Mutex<Vec<CommitStatusUpdate>>,
        fail_with: Option<ApiError>,
    }

    impl RecordingSink {
        fn failing(err: ApiError) -> Self {
            Self {
                updates: Mutex::new(Vec::new()),
                fail_with: Some(err),
            }
        }

        fn updates(&self) -> Vec<CommitStatusUpdate> {
            self.updates.lock().unwrap().clone()
        }

        fn descriptions(&self) -> Vec<String> {
            self.updates().into_iter().map(|u| u.description).collect()
        }
    }

    #[async_trait]
    impl StatusSink for RecordingSink {
        fn name(&self) -> &str {
            "recording"
        }

        async fn publish(&self, update: &CommitStatusUpdate) -> Result<(), ApiError> {
            self.updates.lock().unwrap().push(update.clone());
            match &self.fail_with {
                Some(e) => Err(e.clone()),
                None => Ok(()),
            }
        }
    }

    fn relay(sink: Arc<RecordingSink>, expected: usize) -> StatusRelay {
        let link = BuildLink::new(
            Url::parse("https://console.cloud.google.com/cloud-build/builds").unwrap(),
            "build-123",
            "gcb-project",
        );
        StatusRelay::new(sink, StatusSynthesizer::new("gcb", link), expected)
    }

    /// Event time for step `num`, so later steps sort as more recent.
    fn at(num: u32) -> i64 {
        now_nanos() + i64::from(num) * 1_000
    }

    fn start(num: u32) -> Transition {
        Transition {
            num,
            id: format!("step_{num}"),
            status: StepStatus::Running,
            started_at: Some(at(num)),
            ended_at: None,
            exit_code: None,
        }
    }

    fn die(num: u32, exit_code: i32) -> Transition {
        Transition {
            num,
            id: format!("step_{num}"),
            status: if exit_code == 0 {
                StepStatus::Done
            } else {
                StepStatus::Error
            },
            started_at: None,
            ended_at: Some(at(num)),
            exit_code: Some(exit_code),
        }
    }

    fn kill(num: u32) -> Transition {
        Transition {
            num,
            id: format!("step_{num}"),
            status: StepStatus::Cancelled,
            started_at: None,
            ended_at: Some(at(num)),
            exit_code: None,
        }
    }

    struct Harness {
        tx: mpsc::Sender<Transition>,
        done: oneshot::Sender<Result<(), SourceError>>,
        handle: tokio::task::JoinHandle<Result<(), RelayError>>,
    }

    fn spawn(relay: StatusRelay) -> Harness {
        let (tx, rx) = mpsc::channel(TRANSITION_BUFFER);
        let (done, done_rx) = oneshot::channel();
        let handle = tokio::spawn(relay.run(rx, done_rx));
        Harness { tx, done, handle }
    }

    impl Harness {
        /// End the source cleanly, in the order the reader does.
        async fn finish(self) -> Result<(), RelayError> {
            self.done.send(Ok(())).unwrap();
            drop(self.tx);
            self.handle.await.unwrap()
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_is_published_once() {
        let sink = Arc::new(RecordingSink::default());
        let h = spawn(relay(sink.clone(), 0));

        h.tx.send(start(0)).await.unwrap();
        h.tx.send(start(1)).await.unwrap();
        h.tx.send(start(2)).await.unwrap();
        settle().await;

        assert_eq!(sink.descriptions(), vec!["Running: step_2, step_1, step_0"]);
        assert_eq!(sink.updates()[0].state, CommitState::Pending);
        assert_eq!(sink.updates()[0].context, "gcb");
    }

    #[tokio::test(start_paused = true)]
    async fn test_refreshes_without_changes() {
        let sink = Arc::new(RecordingSink::default());
        let h = spawn(relay(sink.clone(), 0));

        h.tx.send(start(0)).await.unwrap();
        settle().await;
        assert_eq!(sink.updates().len(), 1);

        tokio::time::sleep(DEFAULT_REFRESH).await;
        assert_eq!(sink.updates().len(), 2);
        assert_eq!(sink.updates()[0], sink.updates()[1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_source_publishes_final_status() {
        let sink = Arc::new(RecordingSink::default());
        let h = spawn(relay(sink.clone(), 2));

        h.tx.send(start(0)).await.unwrap();
        h.tx.send(die(0, 0)).await.unwrap();
        h.tx.send(start(1)).await.unwrap();
        h.tx.send(die(1, 0)).await.unwrap();

        h.finish().await.unwrap();

        let updates = sink.updates();
        let last = updates.last().unwrap();
        assert_eq!(last.state, CommitState::Success);
        assert_eq!(last.description, "Done: step_1, step_0");
    }

    #[tokio::test(start_paused = true)]
    async fn test_incomplete_build_stays_pending() {
        let sink = Arc::new(RecordingSink::default());
        let h = spawn(relay(sink.clone(), 3));

        h.tx.send(start(0)).await.unwrap();
        h.tx.send(die(0, 0)).await.unwrap();
        h.finish().await.unwrap();

        assert_eq!(sink.updates().last().unwrap().state, CommitState::Pending);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_cancels_siblings_and_stops() {
        let sink = Arc::new(RecordingSink::default());
        let h = spawn(relay(sink.clone(), 0));

        h.tx.send(start(0)).await.unwrap();
        h.tx.send(start(1)).await.unwrap();
        h.tx.send(die(1, 1)).await.unwrap();

        // The relay stops on its own, without the source ending
        h.handle.await.unwrap().unwrap();

        let updates = sink.updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].state, CommitState::Error);
        assert_eq!(updates[0].description, "Error: step_1; Cancelled: step_0");
        assert!(updates[0].target_url.contains("build-123;step=1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_is_sticky() {
        let sink = Arc::new(RecordingSink::default());
        let h = spawn(relay(sink.clone(), 0));

        h.tx.send(start(0)).await.unwrap();
        h.tx.send(kill(0)).await.unwrap();
        h.tx.send(die(0, 137)).await.unwrap();
        h.tx.send(start(1)).await.unwrap();

        // A cancelled step outranks the running one, so the build is reported
        // as errored and the relay stops
        h.handle.await.unwrap().unwrap();
        assert_eq!(sink.descriptions(), vec!["Cancelled: step_0; Running: step_1"]);
        assert_eq!(sink.updates()[0].state, CommitState::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_final_publish_is_an_error() {
        let sink = Arc::new(RecordingSink::failing(ApiError::unauthorized("Bad credentials")));
        let h = spawn(relay(sink.clone(), 0));

        h.tx.send(start(0)).await.unwrap();
        h.tx.send(die(0, 0)).await.unwrap();
        let err = h.finish().await.unwrap_err();

        assert!(matches!(err, RelayError::Publish(ApiError::Unauthorized { .. })));
        assert_eq!(err.exit_code(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_interim_publish_keeps_running() {
        let sink = Arc::new(RecordingSink::failing(ApiError::network("connection reset")));
        let h = spawn(relay(sink.clone(), 0));

        h.tx.send(start(0)).await.unwrap();
        settle().await;
        assert_eq!(sink.updates().len(), 1);
        assert!(!h.handle.is_finished());

        h.tx.send(start(1)).await.unwrap();
        settle().await;
        assert_eq!(sink.updates().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_source_error_stops_without_publishing() {
        let sink = Arc::new(RecordingSink::default());
        let h = spawn(relay(sink.clone(), 0));

        h.tx.send(start(0)).await.unwrap();
        h.done
            .send(Err(SourceError::Read("connection reset".into())))
            .unwrap();
        drop(h.tx);

        let err = h.handle.await.unwrap().unwrap_err();
        assert!(matches!(err, RelayError::Source(SourceError::Read(_))));
        assert!(sink.updates().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_source_publishes_nothing() {
        let sink = Arc::new(RecordingSink::default());
        let h = spawn(relay(sink.clone(), 0));

        h.finish().await.unwrap();
        assert!(sink.updates().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_timing() {
        let sink = Arc::new(RecordingSink::default());
        let relay = relay(sink.clone(), 0)
            .with_timing(Duration::from_secs(1), Duration::from_secs(60));
        let h = spawn(relay);

        h.tx.send(start(0)).await.unwrap();
        settle().await;
        assert!(sink.updates().is_empty());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(sink.updates().len(), 1);
    }
}
