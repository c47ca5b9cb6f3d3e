use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use crate::models::PipelineEvent;

/// Producer half of a run's event stream plus the run's cancel flag.
///
/// Clones share the same channel and flags; the channel closes once every
/// clone is dropped.
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<PipelineEvent>,
    cancelled: Arc<AtomicBool>,
    terminated: Arc<AtomicBool>,
}

impl EventSink {
    pub fn new(tx: mpsc::UnboundedSender<PipelineEvent>, cancelled: Arc<AtomicBool>) -> Self {
        Self {
            tx,
            cancelled,
            terminated: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Sends `event` unless a terminal event already went out. Returns false
    /// when the event was not delivered.
    pub fn emit(&self, event: PipelineEvent) -> bool {
        if self.terminated.load(Ordering::SeqCst) {
            return false;
        }
        if event.is_terminal() {
            self.terminated.store(true, Ordering::SeqCst);
        }
        let delivered = self.tx.send(event).is_ok();
        if !delivered {
            debug!("event receiver dropped");
        }
        delivered
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn has_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use super::EventSink;
    use crate::models::PipelineEvent;
    use tokio::sync::mpsc;

    #[test]
    fn nothing_follows_a_terminal_event() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = EventSink::new(tx, Arc::new(AtomicBool::new(false)));
        assert!(sink.emit(PipelineEvent::Start));
        assert!(sink.emit(PipelineEvent::Stopped(None)));
        assert!(!sink.emit(PipelineEvent::Stopped(Some("late".into()))));
        assert!(sink.has_terminated());

        assert_eq!(rx.try_recv().unwrap(), PipelineEvent::Start);
        assert_eq!(rx.try_recv().unwrap(), PipelineEvent::Stopped(None));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn cancel_flag_is_shared() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let flag = Arc::new(AtomicBool::new(false));
        let sink = EventSink::new(tx, flag.clone());
        let clone = sink.clone();
        flag.store(true, Ordering::SeqCst);
        assert!(clone.is_cancelled());
    }

    #[test]
    fn dropped_receiver_is_reported() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let sink = EventSink::new(tx, Arc::new(AtomicBool::new(false)));
        assert!(!sink.emit(PipelineEvent::Start));
    }
}
