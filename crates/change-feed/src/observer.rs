//! Observer trait and the events delivered to observers.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::ObserverError;

/// A full, ordered view of one collection at a point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedSnapshot<T> {
    /// Delivery counter within one subscription: 0 for the initial
    /// snapshot, then increasing by one with every update.
    pub generation: u64,

    /// The collection in feed order.
    pub items: Vec<T>,
}

impl<T> FeedSnapshot<T> {
    pub fn new(generation: u64, items: Vec<T>) -> Self {
        Self { generation, items }
    }

    /// Returns true for the snapshot delivered on subscription.
    pub fn is_initial(&self) -> bool {
        self.generation == 0
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// An event delivered to an observer.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent<T> {
    /// A new snapshot superseding every earlier one.
    Snapshot(FeedSnapshot<T>),

    /// The subscription failed and will deliver nothing further.
    Terminated(String),
}

impl<T> FeedEvent<T> {
    /// Returns the snapshot, if this is one.
    pub fn into_snapshot(self) -> Option<FeedSnapshot<T>> {
        match self {
            FeedEvent::Snapshot(snapshot) => Some(snapshot),
            FeedEvent::Terminated(_) => None,
        }
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self, FeedEvent::Terminated(_))
    }
}

/// Something that receives feed events.
///
/// Returning an error ends the subscription and releases its store watch.
#[async_trait]
pub trait Observer<T>: Send + Sync + 'static {
    async fn notify(&self, event: FeedEvent<T>) -> Result<(), ObserverError>;
}

#[async_trait]
impl<T: Send + 'static> Observer<T> for mpsc::Sender<FeedEvent<T>> {
    async fn notify(&self, event: FeedEvent<T>) -> Result<(), ObserverError> {
        self.send(event).await.map_err(|_| ObserverError::Closed)
    }
}

#[async_trait]
impl<T: Send + 'static> Observer<T> for mpsc::UnboundedSender<FeedEvent<T>> {
    async fn notify(&self, event: FeedEvent<T>) -> Result<(), ObserverError> {
        self.send(event).map_err(|_| ObserverError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_snapshot_is_generation_zero() {
        let snapshot = FeedSnapshot::new(0, vec![1, 2, 3]);
        assert!(snapshot.is_initial());
        assert_eq!(snapshot.len(), 3);
        assert!(!FeedSnapshot::<u8>::new(1, vec![]).is_initial());
    }

    #[test]
    fn terminated_event_has_no_snapshot() {
        let event: FeedEvent<u8> = FeedEvent::Terminated("gone".to_string());
        assert!(event.is_terminated());
        assert!(event.into_snapshot().is_none());
    }

    #[tokio::test]
    async fn channel_observer_reports_closed_receiver() {
        let (tx, rx) = mpsc::channel::<FeedEvent<u8>>(1);
        drop(rx);

        let result = tx.notify(FeedEvent::Terminated("x".to_string())).await;
        assert!(matches!(result, Err(ObserverError::Closed)));
    }
}
