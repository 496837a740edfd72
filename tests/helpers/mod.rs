//! Shared fixtures for the scheduler and pipeline integration tests.
//!
//! `ScriptedModel` is a syntax model whose behavior (latency, failures) is
//! driven through a shared `ModelControl`; `Recorder` captures everything the
//! pipeline publishes. Both count how many task bodies are active at once.

#![allow(dead_code)]

use std::ops::Range;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use reparse_scheduler::document::{EditEvent, TextSupplier};
use reparse_scheduler::error::{ModelError, RenderError};
use reparse_scheduler::pipeline::{OutlineRenderer, PresentationRenderer, SyntaxModel};
use reparse_scheduler::{SchedulerConfig, UpdateSession};

/// Knobs and counters shared by the model and the renderers of one session.
#[derive(Debug, Default)]
pub struct ModelControl {
    /// Number of upcoming updates that fail.
    pub fail_next: AtomicUsize,
    /// Time each update spends "parsing".
    pub update_latency_ms: AtomicU64,
    /// Event sequence numbers handed to each update attempt.
    pub batches: Mutex<Vec<Vec<u64>>>,
    /// Threads task bodies ran on.
    pub threads: Mutex<Vec<ThreadId>>,
    pub active: AtomicUsize,
    pub max_active: AtomicUsize,
    pub bodies_entered: AtomicUsize,
}

impl ModelControl {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Mark a task body as running until the guard drops.
    pub fn enter(&self) -> ActiveGuard<'_> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        self.bodies_entered.fetch_add(1, Ordering::SeqCst);
        self.threads.lock().unwrap().push(thread::current().id());
        ActiveGuard { control: self }
    }

    pub fn batches(&self) -> Vec<Vec<u64>> {
        self.batches.lock().unwrap().clone()
    }

    pub fn threads(&self) -> Vec<ThreadId> {
        self.threads.lock().unwrap().clone()
    }

    pub fn set_latency(&self, latency: Duration) {
        self.update_latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }
}

pub struct ActiveGuard<'a> {
    control: &'a ModelControl,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.control.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Model that mirrors the text by replaying events.
#[derive(Debug)]
pub struct ScriptedModel {
    pub text: String,
    pub version: u64,
    control: Arc<ModelControl>,
}

impl ScriptedModel {
    pub fn new(text: &str, control: &Arc<ModelControl>) -> Self {
        Self {
            text: text.to_string(),
            version: 0,
            control: Arc::clone(control),
        }
    }
}

impl SyntaxModel for ScriptedModel {
    type Styling = String;
    type Outline = u64;

    fn update_model(
        &self,
        events: &[Arc<EditEvent>],
        text: &dyn TextSupplier,
    ) -> Result<Self, ModelError> {
        let _active = self.control.enter();
        self.control
            .batches
            .lock()
            .unwrap()
            .push(events.iter().map(|event| event.seq()).collect());

        let latency = self.control.update_latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            thread::sleep(Duration::from_millis(latency));
        }

        let failing = self
            .control
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ModelError::rejected("scripted failure"));
        }

        let mut replayed = self.text.clone();
        for event in events {
            event
                .apply_to(&mut replayed)
                .map_err(|err| ModelError::rejected(err.to_string()))?;
        }
        if replayed != text.full_text() {
            return Err(ModelError::rejected("replayed text diverged"));
        }
        Ok(Self {
            text: replayed,
            version: self.version + 1,
            control: Arc::clone(&self.control),
        })
    }

    fn document_len(&self) -> usize {
        self.text.len()
    }

    fn styling(&self) -> String {
        self.text.clone()
    }

    fn outline(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Published {
    Styling { range: Range<usize>, text: String },
    Outline { version: u64, cursor: Option<usize> },
}

/// Records every publication; can be told to fail styling.
#[derive(Debug)]
pub struct Recorder {
    control: Arc<ModelControl>,
    pub fail_styling: AtomicBool,
    published: Mutex<Vec<Published>>,
}

impl Recorder {
    pub fn new(control: &Arc<ModelControl>) -> Arc<Self> {
        Arc::new(Self {
            control: Arc::clone(control),
            fail_styling: AtomicBool::new(false),
            published: Mutex::new(Vec::new()),
        })
    }

    pub fn published(&self) -> Vec<Published> {
        self.published.lock().unwrap().clone()
    }

    pub fn stylings(&self) -> Vec<String> {
        self.published()
            .into_iter()
            .filter_map(|p| match p {
                Published::Styling { text, .. } => Some(text),
                Published::Outline { .. } => None,
            })
            .collect()
    }

    pub fn outlines(&self) -> Vec<(u64, Option<usize>)> {
        self.published()
            .into_iter()
            .filter_map(|p| match p {
                Published::Outline { version, cursor } => Some((version, cursor)),
                Published::Styling { .. } => None,
            })
            .collect()
    }
}

/// Renderer handle handed to the session.
pub struct RecordingRenderer(pub Arc<Recorder>);

impl PresentationRenderer<String> for RecordingRenderer {
    fn publish_styling(&self, range: Range<usize>, styling: String) -> Result<(), RenderError> {
        let _active = self.0.control.enter();
        if self.0.fail_styling.load(Ordering::SeqCst) {
            return Err(RenderError::new("styling target unavailable"));
        }
        self.0.published.lock().unwrap().push(Published::Styling {
            range,
            text: styling,
        });
        Ok(())
    }
}

impl OutlineRenderer<u64> for RecordingRenderer {
    fn publish_outline(&self, version: u64, cursor: Option<usize>) -> Result<(), RenderError> {
        let _active = self.0.control.enter();
        self.0
            .published
            .lock()
            .unwrap()
            .push(Published::Outline { version, cursor });
        Ok(())
    }
}

pub struct Fixture {
    pub session: UpdateSession<ScriptedModel>,
    pub control: Arc<ModelControl>,
    pub recorder: Arc<Recorder>,
}

/// Config with a `debounce_ms` model delay and short resync delays.
pub fn test_config(debounce_ms: u64) -> SchedulerConfig {
    SchedulerConfig {
        model_update_delay_ms: debounce_ms,
        post_update_delay_ms: 0,
        presentation_resync_delay_ms: 10,
        outline_resync_delay_ms: 10,
        ..SchedulerConfig::default()
    }
}

pub fn open_session(text: &str, config: SchedulerConfig) -> Fixture {
    let control = ModelControl::new();
    let recorder = Recorder::new(&control);
    let session = UpdateSession::new(
        config,
        text,
        ScriptedModel::new(text, &control),
        RecordingRenderer(Arc::clone(&recorder)),
        RecordingRenderer(Arc::clone(&recorder)),
    )
    .expect("session should start");
    Fixture {
        session,
        control,
        recorder,
    }
}

/// Poll `condition` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(5));
    }
}

pub const PATIENCE: Duration = Duration::from_secs(5);
