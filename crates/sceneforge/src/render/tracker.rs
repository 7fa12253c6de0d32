//! Render job tracker — a cancellable polling loop per submitted job.
//!
//! Each tracked job runs as its own tokio task, detached from the
//! request that submitted it. States: PENDING → POLLING → one of
//! SUCCEEDED, FAILED, CANCELLED. Cancellation lands between polls; an
//! in-flight status request is never interrupted.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::TrackerSettings;
use crate::db::{prompt_repo, Database};

use super::client::{RemoteStatus, RenderApi};

/// Capacity of the tracker event channel. Slow subscribers lag rather
/// than block the polling loop.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Tracker lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackState {
    /// Task id known, first check not yet scheduled.
    Pending,
    /// Actively polling the render service.
    Polling,
    /// Artifact URL obtained and written to the prompt record.
    Succeeded,
    /// The render failed, polling timed out, or transient errors persisted.
    Failed,
    /// The caller stopped tracking; no record was mutated.
    Cancelled,
}

impl TrackState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TrackState::Succeeded | TrackState::Failed | TrackState::Cancelled
        )
    }
}

/// Event emitted on every tracker state transition.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackEvent {
    pub task_id: String,
    /// Id of the prompt row this job writes its result to.
    pub prompt_id: String,
    pub state: TrackState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Final result of tracking one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackOutcome {
    Succeeded { video_url: String },
    Failed { detail: String },
    Cancelled,
}

/// Handle to a running tracker task.
pub struct TrackerHandle {
    cancel: broadcast::Sender<()>,
    handle: JoinHandle<TrackOutcome>,
}

impl TrackerHandle {
    /// Requests cancellation. Takes effect before the next scheduled poll.
    pub fn cancel(&self) {
        let _ = self.cancel.send(());
    }

    /// Waits for the tracker to reach a terminal state.
    pub async fn wait(self) -> TrackOutcome {
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(e) => TrackOutcome::Failed {
                detail: format!("tracker task aborted: {e}"),
            },
        }
    }
}

/// Spawns and observes polling loops for submitted render jobs.
///
/// Jobs for different prompts are independent; each loop writes only to
/// its own prompt record, so any number may run concurrently.
pub struct RenderJobTracker {
    db: Database,
    render: Arc<dyn RenderApi>,
    settings: TrackerSettings,
    events: broadcast::Sender<TrackEvent>,
}

impl RenderJobTracker {
    pub fn new(db: Database, render: Arc<dyn RenderApi>, settings: TrackerSettings) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            db,
            render,
            settings,
            events,
        }
    }

    /// Subscribes to state transition events for all tracked jobs.
    pub fn subscribe(&self) -> broadcast::Receiver<TrackEvent> {
        self.events.subscribe()
    }

    /// Starts tracking a job in a background task and returns immediately.
    pub fn track(&self, prompt_id: &str, task_id: &str) -> TrackerHandle {
        let (cancel, cancel_rx) = broadcast::channel(1);
        let job = TrackedJob {
            db: self.db.clone(),
            render: Arc::clone(&self.render),
            settings: self.settings.clone(),
            events: self.events.clone(),
            prompt_id: prompt_id.to_string(),
            task_id: task_id.to_string(),
        };
        let handle = tokio::spawn(job.run(cancel_rx));
        TrackerHandle { cancel, handle }
    }
}

struct TrackedJob {
    db: Database,
    render: Arc<dyn RenderApi>,
    settings: TrackerSettings,
    events: broadcast::Sender<TrackEvent>,
    prompt_id: String,
    task_id: String,
}

impl TrackedJob {
    async fn run(self, mut cancel_rx: broadcast::Receiver<()>) -> TrackOutcome {
        self.emit(TrackState::Pending, None, None);

        let deadline = Instant::now() + self.settings.max_duration;
        let mut transient_failures: u32 = 0;
        // First check is immediate; subsequent ones wait the fixed interval.
        let mut delay = Duration::ZERO;

        loop {
            tokio::select! {
                biased;
                Ok(()) = cancel_rx.recv() => {
                    info!("Tracking cancelled for task {}", self.task_id);
                    self.emit(TrackState::Cancelled, None, None);
                    return TrackOutcome::Cancelled;
                }
                _ = tokio::time::sleep(delay) => {}
            }
            delay = self.settings.poll_interval;

            match self.render.poll(&self.task_id).await {
                Ok(snapshot) => {
                    transient_failures = 0;
                    match snapshot.status {
                        RemoteStatus::Pending | RemoteStatus::Processing => {
                            debug!(
                                "Task {} still in progress ({:?})",
                                self.task_id, snapshot.status
                            );
                            self.emit(
                                TrackState::Polling,
                                None,
                                Some(format!("{:?}", snapshot.status).to_lowercase()),
                            );
                        }
                        RemoteStatus::Succeeded => {
                            match snapshot.result_url.filter(|u| !u.is_empty()) {
                                Some(url) => return self.succeed(url),
                                None => {
                                    return self.fail(
                                        "renderer reported success without a result URL"
                                            .to_string(),
                                    )
                                }
                            }
                        }
                        RemoteStatus::Failed => {
                            let detail = snapshot
                                .error
                                .unwrap_or_else(|| "render job failed".to_string());
                            return self.fail(detail);
                        }
                    }
                }
                Err(e) if e.is_transient() => {
                    transient_failures += 1;
                    warn!(
                        "Transient poll failure {}/{} for task {}: {}",
                        transient_failures,
                        self.settings.max_transient_failures,
                        self.task_id,
                        e
                    );
                    if transient_failures >= self.settings.max_transient_failures {
                        return self.fail(format!(
                            "gave up after {} consecutive transient poll failures, last: {}",
                            transient_failures, e
                        ));
                    }
                }
                Err(e) => {
                    return self.fail(e.to_string());
                }
            }

            if Instant::now() >= deadline {
                return self.fail(format!(
                    "polling timed out after {}s",
                    self.settings.max_duration.as_secs()
                ));
            }
        }
    }

    fn succeed(&self, video_url: String) -> TrackOutcome {
        info!(
            "Task {} succeeded, artifact at {}",
            self.task_id, video_url
        );
        if let Err(e) = prompt_repo::set_video_url(&self.db, &self.prompt_id, &video_url) {
            // The artifact is real even if recording it failed; surface the
            // URL to subscribers and log the storage problem loudly.
            log::error!(
                "Failed to record artifact URL on prompt {}: {}",
                self.prompt_id,
                e
            );
        }
        self.emit(TrackState::Succeeded, Some(video_url.clone()), None);
        TrackOutcome::Succeeded { video_url }
    }

    fn fail(&self, detail: String) -> TrackOutcome {
        warn!("Task {} failed: {}", self.task_id, detail);
        // The attempt stays in history; only its failure detail is recorded.
        if let Err(e) = prompt_repo::set_render_error(&self.db, &self.prompt_id, &detail) {
            log::error!(
                "Failed to record render error on prompt {}: {}",
                self.prompt_id,
                e
            );
        }
        self.emit(TrackState::Failed, None, Some(detail.clone()));
        TrackOutcome::Failed { detail }
    }

    fn emit(&self, state: TrackState, video_url: Option<String>, detail: Option<String>) {
        let _ = self.events.send(TrackEvent {
            task_id: self.task_id.clone(),
            prompt_id: self.prompt_id.clone(),
            state,
            video_url,
            detail,
            timestamp: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{prompt_repo, PromptKind, PromptRow};
    use crate::render::client::StatusSnapshot;
    use crate::render::error::RenderError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Fake render service returning a scripted sequence of poll results.
    struct ScriptedRender {
        polls: Mutex<Vec<Result<StatusSnapshot, RenderError>>>,
        poll_count: AtomicUsize,
    }

    impl ScriptedRender {
        fn new(polls: Vec<Result<StatusSnapshot, RenderError>>) -> Self {
            Self {
                polls: Mutex::new(polls),
                poll_count: AtomicUsize::new(0),
            }
        }

        fn polls_made(&self) -> usize {
            self.poll_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RenderApi for ScriptedRender {
        async fn submit(&self, _code: &str) -> Result<String, RenderError> {
            Ok("task-1".to_string())
        }

        async fn poll(&self, _task_id: &str) -> Result<StatusSnapshot, RenderError> {
            self.poll_count.fetch_add(1, Ordering::SeqCst);
            let mut polls = self.polls.lock().unwrap();
            if polls.is_empty() {
                // Keep reporting in-progress once the script runs out.
                return Ok(StatusSnapshot {
                    status: RemoteStatus::Processing,
                    result_url: None,
                    error: None,
                });
            }
            polls.remove(0)
        }
    }

    fn processing() -> Result<StatusSnapshot, RenderError> {
        Ok(StatusSnapshot {
            status: RemoteStatus::Processing,
            result_url: None,
            error: None,
        })
    }

    fn fast_settings() -> TrackerSettings {
        TrackerSettings {
            poll_interval: Duration::from_millis(10),
            max_duration: Duration::from_secs(5),
            max_transient_failures: 3,
        }
    }

    fn setup_prompt(db: &Database) -> PromptRow {
        let prompt = PromptRow::new("proj-1", "the model reply", PromptKind::System);
        prompt_repo::insert(db, &prompt).unwrap();
        prompt
    }

    #[tokio::test]
    async fn test_tracker_reaches_succeeded_and_records_url() {
        let db = Database::open_in_memory().unwrap();
        let prompt = setup_prompt(&db);
        let render = Arc::new(ScriptedRender::new(vec![
            processing(),
            processing(),
            Ok(StatusSnapshot {
                status: RemoteStatus::Succeeded,
                result_url: Some("https://x/video.mp4".to_string()),
                error: None,
            }),
        ]));

        let tracker = RenderJobTracker::new(db.clone(), render.clone(), fast_settings());
        let outcome = tracker.track(&prompt.id, "task-1").wait().await;

        assert_eq!(
            outcome,
            TrackOutcome::Succeeded {
                video_url: "https://x/video.mp4".to_string()
            }
        );
        assert_eq!(render.polls_made(), 3);

        let row = prompt_repo::find_by_id(&db, &prompt.id).unwrap().unwrap();
        assert_eq!(row.video_url.as_deref(), Some("https://x/video.mp4"));
    }

    #[tokio::test]
    async fn test_tracker_records_render_failure_without_deleting() {
        let db = Database::open_in_memory().unwrap();
        let prompt = setup_prompt(&db);
        let render = Arc::new(ScriptedRender::new(vec![Ok(StatusSnapshot {
            status: RemoteStatus::Failed,
            result_url: None,
            error: Some("scene raised an exception".to_string()),
        })]));

        let tracker = RenderJobTracker::new(db.clone(), render, fast_settings());
        let outcome = tracker.track(&prompt.id, "task-1").wait().await;

        assert_eq!(
            outcome,
            TrackOutcome::Failed {
                detail: "scene raised an exception".to_string()
            }
        );

        let row = prompt_repo::find_by_id(&db, &prompt.id).unwrap().unwrap();
        assert_eq!(row.error.as_deref(), Some("scene raised an exception"));
        assert!(row.video_url.is_none());
    }

    #[tokio::test]
    async fn test_cancellation_between_polls_stops_network_calls() {
        let db = Database::open_in_memory().unwrap();
        let prompt = setup_prompt(&db);
        let render = Arc::new(ScriptedRender::new(vec![]));

        let settings = TrackerSettings {
            poll_interval: Duration::from_secs(60),
            ..fast_settings()
        };
        let tracker = RenderJobTracker::new(db.clone(), render.clone(), settings);
        let handle = tracker.track(&prompt.id, "task-1");

        // Let the immediate first poll happen, then cancel during the wait.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let polls_before_cancel = render.polls_made();
        handle.cancel();
        let outcome = handle.wait().await;

        assert_eq!(outcome, TrackOutcome::Cancelled);
        assert_eq!(render.polls_made(), polls_before_cancel);

        // No record mutation on cancellation.
        let row = prompt_repo::find_by_id(&db, &prompt.id).unwrap().unwrap();
        assert!(row.video_url.is_none());
        assert!(row.error.is_none());
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried_then_escalated() {
        let db = Database::open_in_memory().unwrap();
        let prompt = setup_prompt(&db);
        let render = Arc::new(ScriptedRender::new(vec![
            Err(RenderError::Unreachable("connection refused".to_string())),
            Err(RenderError::Unreachable("connection refused".to_string())),
            Err(RenderError::Unreachable("connection refused".to_string())),
        ]));

        let tracker = RenderJobTracker::new(db.clone(), render.clone(), fast_settings());
        let outcome = tracker.track(&prompt.id, "task-1").wait().await;

        match outcome {
            TrackOutcome::Failed { detail } => {
                assert!(detail.contains("transient"), "detail: {detail}");
            }
            other => panic!("expected Failed, got {other:?}"),
        }
        assert_eq!(render.polls_made(), 3);
    }

    #[tokio::test]
    async fn test_single_transient_error_recovers() {
        let db = Database::open_in_memory().unwrap();
        let prompt = setup_prompt(&db);
        let render = Arc::new(ScriptedRender::new(vec![
            Err(RenderError::Unreachable("blip".to_string())),
            Ok(StatusSnapshot {
                status: RemoteStatus::Succeeded,
                result_url: Some("https://x/v.mp4".to_string()),
                error: None,
            }),
        ]));

        let tracker = RenderJobTracker::new(db.clone(), render, fast_settings());
        let outcome = tracker.track(&prompt.id, "task-1").wait().await;
        assert!(matches!(outcome, TrackOutcome::Succeeded { .. }));
    }

    #[tokio::test]
    async fn test_rejected_poll_fails_immediately() {
        let db = Database::open_in_memory().unwrap();
        let prompt = setup_prompt(&db);
        let render = Arc::new(ScriptedRender::new(vec![Err(RenderError::Rejected {
            status: 404,
            detail: "Task not found".to_string(),
        })]));

        let tracker = RenderJobTracker::new(db.clone(), render.clone(), fast_settings());
        let outcome = tracker.track(&prompt.id, "task-1").wait().await;

        assert!(matches!(outcome, TrackOutcome::Failed { .. }));
        assert_eq!(render.polls_made(), 1);
    }

    #[tokio::test]
    async fn test_overall_timeout_fails_the_job() {
        let db = Database::open_in_memory().unwrap();
        let prompt = setup_prompt(&db);
        let render = Arc::new(ScriptedRender::new(vec![]));

        let settings = TrackerSettings {
            poll_interval: Duration::from_millis(10),
            max_duration: Duration::from_millis(30),
            max_transient_failures: 3,
        };
        let tracker = RenderJobTracker::new(db.clone(), render, settings);
        let outcome = tracker.track(&prompt.id, "task-1").wait().await;

        match outcome {
            TrackOutcome::Failed { detail } => {
                assert!(detail.contains("timed out"), "detail: {detail}");
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_success_without_url_is_a_failure() {
        let db = Database::open_in_memory().unwrap();
        let prompt = setup_prompt(&db);
        let render = Arc::new(ScriptedRender::new(vec![Ok(StatusSnapshot {
            status: RemoteStatus::Succeeded,
            result_url: None,
            error: None,
        })]));

        let tracker = RenderJobTracker::new(db.clone(), render, fast_settings());
        let outcome = tracker.track(&prompt.id, "task-1").wait().await;
        assert!(matches!(outcome, TrackOutcome::Failed { .. }));
    }

    #[tokio::test]
    async fn test_events_trace_the_state_machine() {
        let db = Database::open_in_memory().unwrap();
        let prompt = setup_prompt(&db);
        let render = Arc::new(ScriptedRender::new(vec![
            processing(),
            Ok(StatusSnapshot {
                status: RemoteStatus::Succeeded,
                result_url: Some("https://x/v.mp4".to_string()),
                error: None,
            }),
        ]));

        let tracker = RenderJobTracker::new(db.clone(), render, fast_settings());
        let mut events = tracker.subscribe();
        let outcome = tracker.track(&prompt.id, "task-1").wait().await;
        assert!(matches!(outcome, TrackOutcome::Succeeded { .. }));

        let mut states = Vec::new();
        while let Ok(event) = events.try_recv() {
            states.push(event.state);
        }
        assert_eq!(
            states,
            vec![TrackState::Pending, TrackState::Polling, TrackState::Succeeded]
        );
    }
}
