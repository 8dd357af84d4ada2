//! Progress sequences and cooperative cancellation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use mibridge_config::ProgressConfig;
use mibridge_dap::{ProgressEndEventBody, ProgressStartEventBody, ProgressUpdateEventBody};
use tokio::task::JoinHandle;

use crate::events::{BridgeEvent, EventSink};

/// End message of a sequence that ran to completion.
pub const COMPLETED_MESSAGE: &str = "Completed";
/// End message of a sequence stopped by a cancel request.
pub const CANCELLED_MESSAGE: &str = "Cancelled";

/// How a simulated sequence finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressEnd {
    /// Every tick ran.
    Completed,
    /// A cancel request was observed.
    Cancelled,
}

/// One user-visible progress sequence.
#[derive(Debug)]
pub struct ProgressSession {
    id: String,
    cancellable: bool,
    events: EventSink,
    live: LiveSequences,
}

impl ProgressSession {
    /// Sequence id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether the frontend may cancel it.
    pub fn cancellable(&self) -> bool {
        self.cancellable
    }

    /// Report intermediate progress.
    pub fn update(&self, message: Option<String>, percentage: Option<u32>) {
        self.events.emit(BridgeEvent::ProgressUpdate(ProgressUpdateEventBody {
            progress_id: self.id.clone(),
            message,
            percentage,
        }));
    }

    /// Consume a pending cancel request for this sequence.
    pub fn cancel_requested(&self) -> bool {
        self.live
            .lock()
            .get_mut(&self.id)
            .is_some_and(|requested| std::mem::take(requested))
    }

    /// End the sequence.
    pub fn finish(self, message: impl Into<String>) {
        self.live.lock().remove(&self.id);
        self.events.emit(BridgeEvent::ProgressEnd(ProgressEndEventBody {
            progress_id: self.id,
            message: Some(message.into()),
        }));
    }
}

/// Starts progress sequences and records cancel requests.
#[derive(Debug, Clone)]
pub struct ProgressManager {
    shared: Arc<Shared>,
}

/// Open sequences and whether a cancel is pending for each.
#[derive(Debug, Clone, Default)]
struct LiveSequences(Arc<Mutex<HashMap<String, bool>>>);

impl LiveSequences {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, bool>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug)]
struct Shared {
    next_id: AtomicU64,
    next_cancellable: AtomicBool,
    live: LiveSequences,
    events: EventSink,
    config: ProgressConfig,
}

impl ProgressManager {
    /// A manager emitting on `events`, paced by `config`.
    pub fn new(events: EventSink, config: ProgressConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                next_id: AtomicU64::new(1),
                next_cancellable: AtomicBool::new(true),
                live: LiveSequences::default(),
                events,
                config,
            }),
        }
    }

    /// Open a sequence and emit its start event.
    pub fn begin(&self, title: impl Into<String>, cancellable: bool) -> ProgressSession {
        let id = format!(
            "progress-{}",
            self.shared.next_id.fetch_add(1, Ordering::Relaxed)
        );
        self.shared.live.lock().insert(id.clone(), false);
        self.shared
            .events
            .emit(BridgeEvent::ProgressStart(ProgressStartEventBody {
                progress_id: id.clone(),
                title: title.into(),
                cancellable,
                message: None,
                percentage: Some(0),
            }));
        ProgressSession {
            id,
            cancellable,
            events: self.shared.events.clone(),
            live: self.shared.live.clone(),
        }
    }

    /// Start a simulated long-running operation in the background.
    ///
    /// Successive calls alternate between cancellable and non-cancellable
    /// sequences, starting with a cancellable one. Returns the sequence id
    /// and the task driving it.
    pub fn run_progress(&self) -> (String, JoinHandle<ProgressEnd>) {
        let cancellable = self.shared.next_cancellable.fetch_xor(true, Ordering::Relaxed);
        let title = if cancellable {
            "Cancellable operation"
        } else {
            "Long running operation"
        };
        let session = self.begin(title, cancellable);
        let id = session.id().to_string();
        let ticks = self.shared.config.ticks.max(1);
        let interval = self.shared.config.interval();
        tracing::debug!("{id}: started, cancellable={cancellable}");

        let handle = tokio::spawn(async move {
            for tick in 1..=ticks {
                tokio::time::sleep(interval).await;
                if session.cancel_requested() {
                    tracing::debug!("{}: cancelled after {} tick(s)", session.id(), tick - 1);
                    session.finish(CANCELLED_MESSAGE);
                    return ProgressEnd::Cancelled;
                }
                session.update(
                    Some(format!("step {tick} of {ticks}")),
                    Some(tick * 100 / ticks),
                );
            }
            session.finish(COMPLETED_MESSAGE);
            ProgressEnd::Completed
        });
        (id, handle)
    }

    /// Record a cancel request for `progress_id`. Returns false, and
    /// records nothing, when no such sequence is open.
    pub fn cancel(&self, progress_id: &str) -> bool {
        match self.shared.live.lock().get_mut(progress_id) {
            Some(requested) => {
                *requested = true;
                true
            }
            None => {
                tracing::debug!("cancel of unknown progress {progress_id} ignored");
                false
            }
        }
    }
}
