//! Events delivered to the consumer of a tail.

use std::time::Duration;

use tokio::sync::oneshot;

use crate::error::Error;

/// Acknowledgement handle carried by [`TailEvent::Drain`].
///
/// The tail reads nothing further until the consumer replies. Dropping
/// the handle without replying counts as the consumer going away and
/// halts that tail.
#[derive(Debug)]
pub struct BatchAck {
    reply: oneshot::Sender<Option<Duration>>,
}

impl BatchAck {
    pub(crate) fn channel() -> (Self, oneshot::Receiver<Option<Duration>>) {
        let (reply, receiver) = oneshot::channel();
        (Self { reply }, receiver)
    }

    /// Confirms the batch; the tail resumes after its configured
    /// default delay.
    pub fn ack(self) {
        let _ = self.reply.send(None);
    }

    /// Confirms the batch and asks the tail to pause for `delay`
    /// before reading further lines.
    pub fn ack_after(self, delay: Duration) {
        let _ = self.reply.send(Some(delay));
    }
}

/// Notifications emitted while tailing one file.
#[derive(Debug)]
pub enum TailEvent {
    /// A newly read line with its 1-based number within the file.
    Line { text: String, number: u64 },

    /// The batch limit was reached, or the file drained with lines
    /// still unconfirmed. The consumer must acknowledge before the
    /// position is checkpointed and reading continues.
    Drain(BatchAck),

    /// The current file has been read through at least once. For plain
    /// files, watching for further changes begins now.
    End,

    /// A change notification for some other file while watching a
    /// shared parent directory; named by its file name.
    IrrelevantFile(String),

    /// A non-fatal diagnostic, or a fatal failure (a checkpoint save
    /// that stayed broken, a dropped acknowledgement) that precedes
    /// this tail shutting down.
    Error(Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready, task};

    #[test]
    fn test_ack_wakes_the_parked_reply() {
        let (ack, receiver) = BatchAck::channel();
        let mut reply = task::spawn(receiver);
        assert_pending!(reply.poll());

        ack.ack();

        assert!(reply.is_woken());
        assert_eq!(assert_ready!(reply.poll()).unwrap(), None);
    }

    #[test]
    fn test_ack_after_carries_the_requested_delay() {
        let (ack, receiver) = BatchAck::channel();
        let mut reply = task::spawn(receiver);

        ack.ack_after(Duration::from_secs(3));

        assert_eq!(
            assert_ready!(reply.poll()).unwrap(),
            Some(Duration::from_secs(3))
        );
    }

    #[test]
    fn test_dropped_ack_wakes_with_an_error() {
        let (ack, receiver) = BatchAck::channel();
        let mut reply = task::spawn(receiver);
        assert_pending!(reply.poll());

        drop(ack);

        assert!(reply.is_woken());
        assert!(assert_ready!(reply.poll()).is_err());
    }

    #[test]
    fn test_line_event_shape() {
        let event = TailEvent::Line {
            text: "hello".to_string(),
            number: 7,
        };

        match event {
            TailEvent::Line { text, number } => {
                assert_eq!(text, "hello");
                assert_eq!(number, 7);
            }
            _ => panic!("Expected Line event"),
        }
    }
}
