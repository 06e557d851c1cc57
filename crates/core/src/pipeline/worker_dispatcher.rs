use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::classification::domain::emotion_classifier::EmotionClassifier;
use crate::pipeline::admission_controller::Permit;
use crate::pipeline::slot_table::PendingDispatch;
use crate::pipeline::stream_error::StreamError;
use crate::shared::frame::Frame;

const IDLE_POLL: Duration = Duration::from_millis(1);

/// Runs one classification per admitted face on its own thread.
///
/// Workers talk back only through the slot table. A worker owns its
/// [`PendingDispatch`] and [`Permit`], so the slot completes and the
/// budget is released on every exit path, including a classifier panic.
pub struct WorkerDispatcher {
    classifier: Arc<dyn EmotionClassifier>,
    live: Arc<AtomicUsize>,
}

struct LiveGuard(Arc<AtomicUsize>);

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl WorkerDispatcher {
    pub fn new(classifier: Arc<dyn EmotionClassifier>) -> Self {
        Self {
            classifier,
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Workers that have not yet finished.
    pub fn live_workers(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    /// Classifies `crop` in the background and completes `pending` with the
    /// outcome. If no thread can be started both guards are released here.
    pub fn dispatch(
        &self,
        pending: PendingDispatch,
        permit: Permit,
        crop: Frame,
    ) -> Result<(), StreamError> {
        let slot = pending.index();
        let classifier = Arc::clone(&self.classifier);
        self.live.fetch_add(1, Ordering::AcqRel);
        let live = LiveGuard(Arc::clone(&self.live));

        std::thread::Builder::new()
            .name(format!("classify-{slot}"))
            .spawn(move || {
                let _live = live;
                let result = run_classifier(classifier.as_ref(), &crop, slot);
                pending.complete(result);
                drop(permit);
            })
            .map(|_| ())
            .map_err(|e| StreamError::Classifier(format!("cannot start worker for slot {slot}: {e}")))
    }

    /// Blocks until every worker has finished or `timeout` elapses.
    /// Returns whether the dispatcher went idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.live_workers() > 0 {
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(IDLE_POLL);
        }
        true
    }
}

fn run_classifier(
    classifier: &dyn EmotionClassifier,
    crop: &Frame,
    slot: usize,
) -> Option<crate::classification::domain::ranked_result::RankedResult> {
    match panic::catch_unwind(AssertUnwindSafe(|| classifier.classify(crop))) {
        Ok(Ok(result)) => {
            log::trace!("Slot {slot}: {} ({:.3})", result.best().0, result.best().1);
            Some(result)
        }
        Ok(Err(e)) => {
            log::warn!("Classifier failed for slot {slot}: {e}");
            None
        }
        Err(payload) => {
            log::warn!(
                "Classifier panicked for slot {slot}: {}",
                panic_message(payload.as_ref())
            );
            None
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}
