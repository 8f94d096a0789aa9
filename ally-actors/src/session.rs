//! One browser session at a time, its screenshot stream and its agent task.
use crate::events::{publish, SessionEvent, TaskStatus, EVENT_BUFFER};
use crate::page::{spawn_page, PageHandle};
use crate::sampling::{sampling_loop, LoopOutcome, LoopStatus, SamplingOptions};
use crate::streaming::{spawn_stream, StreamHandle};
use ally_common::{AllyError, Result, FRAME_RATE_RANGE};
use ally_drivers::{BrowserDriver, BrowserLauncher, BrowserOptions};
use ally_llm::traits::ModelClient;
use ally_llm::types::{Message, Role};
use ally_tools::{Toolbox, ToolboxOptions};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

/// How long `stop` waits for a cancelled task before aborting it.
const TASK_STOP_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub browser: BrowserOptions,
    pub start_url: String,
    pub use_cursor: bool,
    pub screenshot_wait_until: Option<ally_common::WaitUntil>,
    pub sampling: SamplingOptions,
    pub fps: u32,
    pub stream_on_start: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            browser: BrowserOptions::default(),
            start_url: "https://www.google.com".to_string(),
            use_cursor: true,
            screenshot_wait_until: None,
            sampling: SamplingOptions::default(),
            fps: 5,
            stream_on_start: true,
        }
    }
}

struct RunningTask {
    id: Uuid,
    cancel: CancellationToken,
    /// Set before the outcome is delivered.
    finished: Arc<AtomicBool>,
    join: JoinHandle<()>,
}

struct ActiveSession {
    page: PageHandle,
    page_task: JoinHandle<anyhow::Result<()>>,
    page_shutdown: CancellationToken,
    toolbox: Arc<Mutex<Toolbox>>,
    stream: Option<StreamHandle>,
    task: Option<RunningTask>,
}

impl ActiveSession {
    fn running_task(&self) -> Option<&RunningTask> {
        self.task
            .as_ref()
            .filter(|t| !t.finished.load(Ordering::SeqCst))
    }
}

struct State {
    session: Option<ActiveSession>,
    fps: u32,
}

/// A submitted agent task. Await [`TaskHandle::outcome`] for the final history.
pub struct TaskHandle {
    pub id: Uuid,
    outcome: oneshot::Receiver<Result<LoopOutcome>>,
}

impl TaskHandle {
    pub async fn outcome(self) -> Result<LoopOutcome> {
        self.outcome
            .await
            .map_err(|_| AllyError::Agent(format!("task {} ended without an outcome", self.id)))?
    }
}

/// Owns the active browser session.
///
/// All methods take `&self`; share the coordinator behind an `Arc`.
pub struct SessionCoordinator {
    launcher: Arc<dyn BrowserLauncher>,
    model: Arc<dyn ModelClient>,
    config: SessionConfig,
    events: broadcast::Sender<SessionEvent>,
    state: Mutex<State>,
}

impl SessionCoordinator {
    pub fn new(
        launcher: Arc<dyn BrowserLauncher>,
        model: Arc<dyn ModelClient>,
        config: SessionConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let fps = config.fps;
        Self {
            launcher,
            model,
            config,
            events,
            state: Mutex::new(State { session: None, fps }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn is_started(&self) -> bool {
        self.state.lock().await.session.is_some()
    }

    pub async fn is_streaming(&self) -> bool {
        let state = self.state.lock().await;
        state
            .session
            .as_ref()
            .and_then(|s| s.stream.as_ref())
            .is_some_and(StreamHandle::is_running)
    }

    pub async fn frame_rate(&self) -> u32 {
        self.state.lock().await.fps
    }

    /// Launch the browser and open the start page. Returns `false` when a
    /// session is already running.
    pub async fn start(&self) -> Result<bool> {
        let mut state = self.state.lock().await;
        if state.session.is_some() {
            return Ok(false);
        }

        let driver = self.launcher.launch(&self.config.browser).await?;
        let page_shutdown = CancellationToken::new();
        let (page, page_task) = spawn_page(driver, page_shutdown.clone());

        if let Err(e) = page.goto(&self.config.start_url).await {
            warn!(target: "session", url = %self.config.start_url, error = %e, "start page failed; closing browser");
            let _ = page.close().await;
            page_shutdown.cancel();
            return Err(e.into());
        }

        let toolbox = Toolbox::new(
            Arc::new(page.clone()),
            ToolboxOptions {
                viewport: self.config.browser.viewport,
                use_cursor: self.config.use_cursor,
                screenshot_wait_until: self.config.screenshot_wait_until,
            },
        );
        let stream = self
            .config
            .stream_on_start
            .then(|| spawn_stream(page.clone(), state.fps, self.events.clone()));

        state.session = Some(ActiveSession {
            page,
            page_task,
            page_shutdown,
            toolbox: Arc::new(Mutex::new(toolbox)),
            stream,
            task: None,
        });
        info!(target: "session", url = %self.config.start_url, "browser session started");
        Ok(true)
    }

    /// Stop streaming, cancel any task and close the browser. Returns `false`
    /// when no session was running.
    pub async fn stop(&self) -> Result<bool> {
        let Some(session) = self.state.lock().await.session.take() else {
            return Ok(false);
        };

        if let Some(stream) = session.stream {
            stream.stop().await;
        }
        if let Some(task) = session.task {
            task.cancel.cancel();
            let mut join = task.join;
            if tokio::time::timeout(TASK_STOP_GRACE, &mut join).await.is_err() {
                warn!(target: "session", task_id = %task.id, "task ignored cancellation; aborting");
                join.abort();
            }
        }

        let closed = session.page.close().await;
        session.page_shutdown.cancel();
        match session.page_task.await {
            Ok(Err(e)) => warn!(target: "session", error = %e, "page actor ended with error"),
            Err(e) => warn!(target: "session", error = %e, "page actor panicked"),
            Ok(Ok(())) => {}
        }
        info!(target: "session", "browser session stopped");
        closed.map(|_| true).map_err(AllyError::from)
    }

    pub async fn navigate(&self, url: &str) -> Result<()> {
        let page = self.page().await?;
        page.goto(url).await?;
        Ok(())
    }

    async fn page(&self) -> Result<PageHandle> {
        let state = self.state.lock().await;
        state
            .session
            .as_ref()
            .map(|s| s.page.clone())
            .ok_or(AllyError::SessionNotStarted)
    }

    /// Start an agent run for `prompt` against the session page.
    ///
    /// Progress is published as [`SessionEvent`]s tagged with the returned id.
    pub async fn run_task(&self, prompt: &str) -> Result<TaskHandle> {
        let mut state = self.state.lock().await;
        let session = state.session.as_mut().ok_or(AllyError::SessionNotStarted)?;
        if session.running_task().is_some() {
            return Err(AllyError::TaskInProgress);
        }

        let id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        let (tx, rx) = oneshot::channel();
        let run = TaskRun {
            id,
            prompt: prompt.to_string(),
            model: self.model.clone(),
            toolbox: session.toolbox.clone(),
            options: self.config.sampling.clone(),
            cancel: cancel.clone(),
            events: self.events.clone(),
        };
        let finished = Arc::new(AtomicBool::new(false));
        let done = finished.clone();
        let join = tokio::spawn(async move {
            let outcome = run.execute().await;
            done.store(true, Ordering::SeqCst);
            let _ = tx.send(outcome);
        });
        session.task = Some(RunningTask {
            id,
            cancel,
            finished,
            join,
        });
        info!(target: "session", task_id = %id, "agent task started");
        Ok(TaskHandle { id, outcome: rx })
    }

    /// Ask the running task to stop at its next step. Returns `false` when
    /// nothing is running.
    pub async fn cancel_task(&self) -> bool {
        let state = self.state.lock().await;
        match state.session.as_ref().and_then(ActiveSession::running_task) {
            Some(task) => {
                info!(target: "session", task_id = %task.id, "cancelling agent task");
                task.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Returns `false` when already streaming.
    pub async fn start_streaming(&self) -> Result<bool> {
        let mut state = self.state.lock().await;
        let fps = state.fps;
        let session = state.session.as_mut().ok_or(AllyError::SessionNotStarted)?;
        if session.stream.as_ref().is_some_and(StreamHandle::is_running) {
            return Ok(false);
        }
        session.stream = Some(spawn_stream(session.page.clone(), fps, self.events.clone()));
        Ok(true)
    }

    /// Returns `false` when nothing was streaming.
    ///
    /// The state lock is held until the frame loop has exited, so no other
    /// stream operation can interleave with the stop.
    pub async fn stop_streaming(&self) -> bool {
        let mut state = self.state.lock().await;
        match state.session.as_mut().and_then(|s| s.stream.take()) {
            Some(stream) => {
                let was_running = stream.is_running();
                stream.stop().await;
                was_running
            }
            None => false,
        }
    }

    /// Change the stream rate; a running stream restarts at the new rate.
    pub async fn set_frame_rate(&self, fps: u32) -> Result<()> {
        if !FRAME_RATE_RANGE.contains(&fps) {
            return Err(AllyError::InvalidFrameRate(fps));
        }
        let mut state = self.state.lock().await;
        state.fps = fps;
        if let Some(session) = state.session.as_mut() {
            if let Some(stream) = session.stream.take().filter(StreamHandle::is_running) {
                stream.stop().await;
                session.stream = Some(spawn_stream(session.page.clone(), fps, self.events.clone()));
            }
        }
        info!(target: "session.stream", fps, "frame rate set");
        Ok(())
    }
}

struct TaskRun {
    id: Uuid,
    prompt: String,
    model: Arc<dyn ModelClient>,
    toolbox: Arc<Mutex<Toolbox>>,
    options: SamplingOptions,
    cancel: CancellationToken,
    events: broadcast::Sender<SessionEvent>,
}

impl TaskRun {
    fn update(&self, status: TaskStatus, payload: Value) {
        publish(
            &self.events,
            SessionEvent::TaskUpdate {
                status,
                task_id: self.id,
                payload,
            },
        );
    }

    async fn execute(self) -> Result<LoopOutcome> {
        publish(
            &self.events,
            SessionEvent::Message {
                text: format!("Running agent with prompt: {}", self.prompt),
            },
        );

        let result = {
            let mut toolbox = self.toolbox.lock().await;
            sampling_loop(
                self.model.as_ref(),
                &mut toolbox,
                vec![Message::user_text(self.prompt.clone())],
                &self.options,
                &self.cancel,
            )
            .await
        };

        match result {
            Ok(outcome) => {
                self.report(&outcome);
                Ok(outcome)
            }
            Err(e) => {
                let err = AllyError::from(e);
                warn!(target: "session", task_id = %self.id, error = %err, "agent task failed");
                publish(
                    &self.events,
                    SessionEvent::Message {
                        text: format!("Error running agent: {err}"),
                    },
                );
                self.update(TaskStatus::Failed, Value::Null);
                Err(err)
            }
        }
    }

    fn report(&self, outcome: &LoopOutcome) {
        for message in outcome.history.iter().filter(|m| m.role == Role::Assistant) {
            for call in message.tool_uses() {
                self.update(
                    TaskStatus::Step,
                    json!({"type": "tool_use", "system": call.name, "action": call.input}),
                );
            }
        }

        let final_text = outcome.final_text().unwrap_or_default();
        let (status, payload) = match outcome.status {
            LoopStatus::Completed | LoopStatus::Interrupted => {
                (TaskStatus::Completed, json!({"message": final_text}))
            }
            LoopStatus::Truncated => (TaskStatus::Truncated, json!({"message": final_text})),
            LoopStatus::Cancelled => (TaskStatus::Cancelled, Value::Null),
        };
        info!(target: "session", task_id = %self.id, status = ?outcome.status, "agent task finished");
        self.update(status, payload);
    }
}
