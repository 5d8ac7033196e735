//! Event delivery over crossbeam-channel.
//!
//! A run reports to an [`EventSender`]; a front end drains the paired
//! [`EventReceiver`] on its own thread. Delivery is best effort: events sent
//! after the receiver is gone, or through a detached sender, are dropped.

use super::Event;
use crossbeam_channel::{unbounded, Receiver, Sender};

/// Where a run reports its progress
#[derive(Clone, Default)]
pub struct EventSender {
    /// `None` when nobody listens
    inner: Option<Sender<Event>>,
}

impl EventSender {
    pub fn send(&self, event: Event) {
        if let Some(sender) = &self.inner {
            // A front end that stopped listening does not stop the run
            let _ = sender.send(event);
        }
    }
}

/// The listening end of [`event_channel`]
pub struct EventReceiver {
    inner: Receiver<Event>,
}

impl EventReceiver {
    /// Events in send order; ends once every sender is dropped
    pub fn iter(&self) -> impl Iterator<Item = Event> + '_ {
        self.inner.iter()
    }
}

/// A connected sender and receiver. The queue is unbounded so a slow front
/// end never stalls a run.
pub fn event_channel() -> (EventSender, EventReceiver) {
    let (sender, receiver) = unbounded();
    (
        EventSender {
            inner: Some(sender),
        },
        EventReceiver { inner: receiver },
    )
}

/// A sender that discards everything
pub fn null_sender() -> EventSender {
    EventSender::default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{SyncEvent, SyncState, SyncSummary};
    use std::path::PathBuf;
    use std::thread;

    #[test]
    fn events_arrive_in_order_across_threads() {
        let (sender, receiver) = event_channel();

        let handle = thread::spawn(move || {
            sender.send(Event::Sync(SyncEvent::Started {
                root: PathBuf::from("/photos"),
            }));
            sender.send(Event::Sync(SyncEvent::StateChanged {
                state: SyncState::Idle,
            }));
            sender.send(Event::Sync(SyncEvent::Completed(SyncSummary::default())));
        });
        handle.join().unwrap();

        let events: Vec<Event> = receiver.iter().collect();
        assert_eq!(events.len(), 3);
        assert!(matches!(&events[0], Event::Sync(SyncEvent::Started { root }) if root == &PathBuf::from("/photos")));
        assert!(matches!(events[2], Event::Sync(SyncEvent::Completed(_))));
    }

    #[test]
    fn null_sender_discards_events() {
        let sender = null_sender();
        let copy = sender.clone();
        sender.send(Event::Sync(SyncEvent::Started {
            root: PathBuf::from("/photos"),
        }));
        copy.send(Event::Sync(SyncEvent::Failed {
            message: "ignored".to_string(),
        }));
    }

    #[test]
    fn dropped_receiver_does_not_block_senders() {
        let (sender, receiver) = event_channel();
        drop(receiver);

        for _ in 0..1_000 {
            sender.send(Event::Sync(SyncEvent::StateChanged {
                state: SyncState::Idle,
            }));
        }
    }
}
