use futures::future::{BoxFuture, FutureExt};
use std::cmp::Ordering;
use std::fmt::Debug;
use std::future::Future;
use tokio::sync::Mutex;

use super::filter::DispatchFilter;
use crate::error::DispatchError;
use crate::order::QueuedOrder;

/// Callback that takes ownership of every dispatched order.
pub type OrderProcessor<O> = Box<dyn FnMut(O) -> BoxFuture<'static, anyhow::Result<()>> + Send>;

/// Order in which a batch of newly eligible orders is handed to the processor.
/// Ties always fall back to ascending sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchPriority {
    Fifo,
    LowestPriceFirst,
    HighestPriceFirst,
}

impl DispatchPriority {
    pub fn compare<O: QueuedOrder>(&self, a: &O, b: &O) -> Ordering {
        let (a, b) = (a.details(), b.details());
        let by_price = match self {
            DispatchPriority::Fifo => Ordering::Equal,
            DispatchPriority::LowestPriceFirst => a.price().cmp(&b.price()),
            DispatchPriority::HighestPriceFirst => b.price().cmp(&a.price()),
        };
        by_price.then_with(|| a.sequence().cmp(&b.sequence()))
    }
}

struct QueueState<T, O> {
    threshold: T,
    pending: Vec<O>,
    processor: Option<OrderProcessor<O>>,
}

/// Holds orders until the dispatch filter accepts them at the current threshold.
///
/// After every `enqueue` or `set_threshold` returns, no pending order satisfies the
/// filter. Processors run inline on the caller's task while the queue lock is held,
/// so deliveries from one queue never interleave.
pub struct OrderQueue<T, O> {
    name: String,
    filter: Box<dyn DispatchFilter<T, O>>,
    priority: DispatchPriority,
    state: Mutex<QueueState<T, O>>,
}

impl<T, O> OrderQueue<T, O>
where
    T: Clone + Debug + Send + 'static,
    O: QueuedOrder,
{
    pub fn new<F>(
        name: impl Into<String>,
        threshold: T,
        filter: F,
        priority: DispatchPriority,
    ) -> Self
    where
        F: DispatchFilter<T, O> + 'static,
    {
        Self {
            name: name.into(),
            filter: Box::new(filter),
            priority,
            state: Mutex::new(QueueState {
                threshold,
                pending: Vec::new(),
                processor: None,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Installs the processor, replacing any previous one.
    pub async fn set_order_processor<P, Fut>(&self, mut processor: P)
    where
        P: FnMut(O) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let boxed: OrderProcessor<O> = Box::new(move |order| processor(order).boxed());
        self.state.lock().await.processor = Some(boxed);
        tracing::debug!(queue = %self.name, "order processor registered");
    }

    /// Adds an order and immediately dispatches it if it is already eligible.
    pub async fn enqueue(&self, order: O) -> Result<(), DispatchError> {
        let mut state = self.state.lock().await;
        if state.processor.is_none() {
            return Err(DispatchError::NoProcessor {
                queue: self.name.clone(),
            });
        }

        tracing::debug!(
            queue = %self.name,
            sequence = order.details().sequence(),
            price = order.details().price(),
            "order enqueued"
        );
        state.pending.push(order);
        self.dispatch_eligible(&mut state).await
    }

    /// Moves the threshold and dispatches every order it makes eligible.
    pub async fn set_threshold(&self, threshold: T) -> Result<(), DispatchError> {
        let mut state = self.state.lock().await;
        tracing::debug!(queue = %self.name, threshold = ?threshold, "threshold updated");
        state.threshold = threshold;
        self.dispatch_eligible(&mut state).await
    }

    pub async fn threshold(&self) -> T {
        self.state.lock().await.threshold.clone()
    }

    pub async fn pending_count(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.pending_count().await == 0
    }

    async fn dispatch_eligible(&self, state: &mut QueueState<T, O>) -> Result<(), DispatchError> {
        let QueueState {
            threshold,
            pending,
            processor,
        } = state;

        let (mut ready, waiting): (Vec<O>, Vec<O>) = std::mem::take(pending)
            .into_iter()
            .partition(|order| self.filter.test(&*threshold, order));
        *pending = waiting;

        if ready.is_empty() {
            return Ok(());
        }

        let Some(processor) = processor.as_mut() else {
            pending.append(&mut ready);
            return Err(DispatchError::NoProcessor {
                queue: self.name.clone(),
            });
        };

        ready.sort_by(|a, b| self.priority.compare(a, b));
        tracing::debug!(queue = %self.name, count = ready.len(), "dispatching orders");

        // Keep delivering after a failure so nothing eligible is left behind.
        let mut first_error = None;
        for order in ready {
            if let Err(err) = processor(order).await {
                tracing::warn!(queue = %self.name, "order processor failed: {:#}", err);
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            Some(err) => Err(DispatchError::Processor(err)),
            None => Ok(()),
        }
    }
}
