//! Sequence guard: last-initiated-wins publication.
//!
//! Every fetch takes a [`Ticket`] before its first read. When it completes it
//! offers its result together with the ticket; the result is published only
//! if no fetch with a later ticket has published already. A slow, older
//! fetch can therefore never overwrite the result of a newer one, whatever
//! order the ledger answers in.
//!
//! Published values are shared through a `tokio::sync::watch` channel so
//! observers can await the next publication.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// Issue-order token of one fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ticket(u64);

impl Ticket {
    pub fn sequence(&self) -> u64 {
        self.0
    }
}

/// The current publication: `(sequence, value)`.
pub type Published<T> = Option<(u64, Arc<T>)>;

/// Outcome of offering a result to the guard.
#[derive(Debug, Clone)]
pub enum Publication<T> {
    /// The offered value is now current.
    Published(Arc<T>),
    /// A later fetch published first; the offered value was discarded.
    Superseded { current: Arc<T> },
}

impl<T> Publication<T> {
    pub fn was_published(&self) -> bool {
        matches!(self, Publication::Published(_))
    }

    /// Whatever is current after the offer.
    pub fn into_current(self) -> Arc<T> {
        match self {
            Publication::Published(value) => value,
            Publication::Superseded { current } => current,
        }
    }
}

pub struct SequenceGuard<T> {
    issued: AtomicU64,
    current: watch::Sender<Published<T>>,
}

impl<T> SequenceGuard<T> {
    pub fn new() -> Self {
        let (current, _) = watch::channel(None);
        Self {
            issued: AtomicU64::new(0),
            current,
        }
    }

    /// Take the next ticket. Tickets are strictly increasing.
    pub fn begin(&self) -> Ticket {
        Ticket(self.issued.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Offer `value`, produced under `ticket`.
    pub fn publish(&self, ticket: Ticket, value: T) -> Publication<T> {
        let value = Arc::new(value);
        let mut newer = None;
        let published = self.current.send_if_modified(|current| match current {
            Some((sequence, existing)) if *sequence > ticket.0 => {
                newer = Some(Arc::clone(existing));
                false
            }
            _ => {
                *current = Some((ticket.0, Arc::clone(&value)));
                true
            }
        });

        match newer {
            Some(current) if !published => Publication::Superseded { current },
            _ => Publication::Published(value),
        }
    }

    pub fn latest(&self) -> Option<Arc<T>> {
        match &*self.current.borrow() {
            Some((_, value)) => Some(Arc::clone(value)),
            None => None,
        }
    }

    /// Sequence of the current publication, 0 before the first one.
    pub fn latest_sequence(&self) -> u64 {
        match &*self.current.borrow() {
            Some((sequence, _)) => *sequence,
            None => 0,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Published<T>> {
        self.current.subscribe()
    }
}

impl<T> Default for SequenceGuard<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tickets_increase() {
        let guard = SequenceGuard::<u32>::new();
        let a = guard.begin();
        let b = guard.begin();
        assert!(b > a);
        assert_eq!(a.sequence(), 1);
    }

    #[test]
    fn in_order_completion_publishes_both() {
        let guard = SequenceGuard::new();
        let a = guard.begin();
        let b = guard.begin();
        assert!(guard.publish(a, "a").was_published());
        assert!(guard.publish(b, "b").was_published());
        assert_eq!(*guard.latest().unwrap(), "b");
        assert_eq!(guard.latest_sequence(), 2);
    }

    #[test]
    fn older_result_is_discarded_after_newer_publishes() {
        let guard = SequenceGuard::new();
        let a = guard.begin();
        let b = guard.begin();
        guard.publish(b, "b");

        let outcome = guard.publish(a, "a");
        assert!(!outcome.was_published());
        assert_eq!(*outcome.into_current(), "b");
        assert_eq!(*guard.latest().unwrap(), "b");
    }

    #[tokio::test]
    async fn subscribers_see_only_accepted_publications() {
        let guard = SequenceGuard::new();
        let mut rx = guard.subscribe();
        let a = guard.begin();
        let b = guard.begin();

        guard.publish(b, 2u8);
        rx.changed().await.unwrap();
        let seen = (*rx.borrow_and_update()).clone();
        assert_eq!(seen.map(|(sequence, _)| sequence), Some(2));

        guard.publish(a, 1u8);
        assert!(!rx.has_changed().unwrap());
    }
}
