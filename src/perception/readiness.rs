use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use crate::dom::{Document, ElementRef, MutationBatch};
use crate::errors::{InjectorError, InjectorResult};
use crate::perception::locator::LocatorList;

/// Capability that tells the waiter when the page changed.
/// Picked once per document with [`select_observer`].
pub trait MutationObserver: Send + Sync {
    fn name(&self) -> &'static str;

    /// Starts a subscription. Dropping it unsubscribes.
    fn observe(&self) -> MutationSubscription;
}

/// Observer backed by the document's own mutation feed.
pub struct FeedObserver {
    feed: broadcast::Sender<MutationBatch>,
}

impl FeedObserver {
    pub fn new(feed: broadcast::Sender<MutationBatch>) -> Self {
        Self { feed }
    }
}

impl MutationObserver for FeedObserver {
    fn name(&self) -> &'static str {
        "feed"
    }

    fn observe(&self) -> MutationSubscription {
        MutationSubscription {
            rx: Some(self.feed.subscribe()),
        }
    }
}

/// Fallback for hosts without mutation notifications: never reports a change,
/// so a wait can only succeed on its initial check.
pub struct NoopObserver;

impl MutationObserver for NoopObserver {
    fn name(&self) -> &'static str {
        "noop"
    }

    fn observe(&self) -> MutationSubscription {
        MutationSubscription { rx: None }
    }
}

pub fn select_observer(doc: &dyn Document) -> Arc<dyn MutationObserver> {
    match doc.mutation_feed() {
        Some(feed) => Arc::new(FeedObserver::new(feed)),
        None => {
            tracing::warn!("document has no mutation feed; readiness waits degrade to a single check");
            Arc::new(NoopObserver)
        }
    }
}

pub struct MutationSubscription {
    rx: Option<broadcast::Receiver<MutationBatch>>,
}

impl MutationSubscription {
    /// Resolves on the next mutation batch. Pending forever once the feed is gone.
    pub async fn changed(&mut self) {
        let closed = match self.rx.as_mut() {
            Some(rx) => match rx.recv().await {
                Ok(_) => return,
                // Missed batches still mean the page changed.
                Err(RecvError::Lagged(skipped)) => {
                    tracing::trace!(skipped, "mutation feed lagged");
                    return;
                }
                Err(RecvError::Closed) => true,
            },
            None => false,
        };
        if closed {
            tracing::debug!("mutation feed closed");
            self.rx = None;
        }
        std::future::pending::<()>().await
    }
}

/// Waits for an element without polling: one check up front, then one check
/// per mutation batch, bounded by a timeout.
pub struct ReadinessWaiter {
    observer: Arc<dyn MutationObserver>,
}

impl ReadinessWaiter {
    pub fn new(observer: Arc<dyn MutationObserver>) -> Self {
        Self { observer }
    }

    pub fn for_document(doc: &dyn Document) -> Self {
        Self::new(select_observer(doc))
    }

    pub fn observer_name(&self) -> &'static str {
        self.observer.name()
    }

    pub async fn wait_for(
        &self,
        doc: &dyn Document,
        locators: &LocatorList,
        timeout: Duration,
    ) -> InjectorResult<ElementRef> {
        // Subscribe before the first check so nothing lands in between.
        let mut subscription = self.observer.observe();

        if let Some(el) = locators.resolve(doc, None) {
            tracing::debug!(locators = %locators, "element already present");
            return Ok(el);
        }

        let started = tokio::time::Instant::now();
        let watch = async {
            loop {
                subscription.changed().await;
                if let Some(el) = locators.resolve(doc, None) {
                    return el;
                }
            }
        };

        match tokio::time::timeout(timeout, watch).await {
            Ok(el) => {
                tracing::debug!(
                    locators = %locators,
                    waited_ms = started.elapsed().as_millis() as u64,
                    "element appeared"
                );
                Ok(el)
            }
            Err(_) => {
                tracing::warn!(
                    locators = %locators,
                    timeout_ms = timeout.as_millis() as u64,
                    observer = self.observer.name(),
                    "element not found within timeout"
                );
                Err(InjectorError::ElementTimeout {
                    locators: locators.as_slice().to_vec(),
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }
}
