use crate::admin::{AdminError, RabbitAdmin};
use crate::dtos::{GetMessagesRequest, Message};
use log::debug;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, Instant};

/// Tuning knobs for [`Drainer`]. The wait window is per-instance so one
/// test's tight deadline never leaks into another's.
#[derive(Clone, Copy, Debug)]
pub struct DrainOptions {
    /// Messages requested per management-api call.
    pub batch_size: u32,
    /// Pause between polling rounds in [`Drainer::await_messages`].
    pub poll_interval: Duration,
    /// Overall wall-clock window for [`Drainer::await_messages`], measured
    /// from the start of the call.
    pub wait_for: Duration,
}

impl Default for DrainOptions {
    fn default() -> Self {
        Self {
            batch_size: 100,
            poll_interval: Duration::from_secs(1),
            wait_for: Duration::from_secs(10),
        }
    }
}

/// A fetch call failed mid-drain. Whatever was collected before the failure
/// is carried along; treat the drain as inconclusive, not as "queue empty".
#[derive(Error, Debug)]
#[error("queue drain aborted after {} messages: {source}", .collected.len())]
pub struct DrainError {
    pub collected: Vec<Message>,
    #[source]
    pub source: AdminError,
}

/// Where the drain protocol gets its batches from. [`RabbitAdmin`] is the
/// real implementation; tests script their own.
#[allow(async_fn_in_trait)]
pub trait MessageSource {
    async fn get_messages(
        &self,
        queue: &str,
        request: &GetMessagesRequest,
    ) -> Result<Vec<Message>, AdminError>;
}

impl MessageSource for RabbitAdmin {
    async fn get_messages(
        &self,
        queue: &str,
        request: &GetMessagesRequest,
    ) -> Result<Vec<Message>, AdminError> {
        RabbitAdmin::get_messages(self, queue, request).await
    }
}

/// Drains a queue through repeated bounded fetches and, one level up, waits
/// for messages that have not arrived yet. The management api is pull-only,
/// so bounded polling is the only way to synchronize a test assertion with
/// asynchronous delivery.
pub struct Drainer<'a, S> {
    source: &'a S,
    options: DrainOptions,
}

impl<'a, S: MessageSource> Drainer<'a, S> {
    pub fn new(source: &'a S) -> Self {
        Self::with_options(source, DrainOptions::default())
    }

    pub fn with_options(source: &'a S, options: DrainOptions) -> Self {
        Self { source, options }
    }

    /// Fetches batches until a short batch signals the queue has nothing
    /// more ready. Exact only while no new deliveries race into the batch
    /// window; good enough for a harness, not a guarantee.
    pub async fn drain_all(&self, queue: &str) -> Result<Vec<Message>, DrainError> {
        let request = GetMessagesRequest {
            count: self.options.batch_size,
            ..GetMessagesRequest::default()
        };

        let mut collected = Vec::new();
        loop {
            let batch = match self.source.get_messages(queue, &request).await {
                Ok(batch) => batch,
                Err(source) => return Err(DrainError { collected, source }),
            };

            let received = batch.len();
            collected.extend(batch);
            debug!(
                "drained {} messages from '{}' ({} total)",
                received,
                queue,
                collected.len()
            );

            if received < self.options.batch_size as usize {
                return Ok(collected);
            }
        }
    }

    /// Polls [`Self::drain_all`] until at least `count` messages have been
    /// accumulated or the wait window closes. A timeout is not an error:
    /// the short accumulation is returned and the caller asserts on its
    /// length, which keeps "zero matched" distinguishable from "some but
    /// not enough". Fetch failures are not retried; they propagate at once
    /// with everything accumulated so far.
    pub async fn await_messages(
        &self,
        queue: &str,
        count: usize,
    ) -> Result<Vec<Message>, DrainError> {
        let deadline = Instant::now() + self.options.wait_for;
        let mut collected: Vec<Message> = Vec::new();

        loop {
            match self.drain_all(queue).await {
                Ok(batch) => collected.extend(batch),
                Err(e) => {
                    collected.extend(e.collected);
                    return Err(DrainError {
                        collected,
                        source: e.source,
                    });
                }
            }

            if collected.len() >= count {
                return Ok(collected);
            }
            if Instant::now() >= deadline {
                debug!(
                    "wait window closed with {} of {} messages from '{}'",
                    collected.len(),
                    count,
                    queue
                );
                return Ok(collected);
            }
            sleep(self.options.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admin::BrokerError;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;

    struct ScriptedSource {
        batches: RefCell<VecDeque<Result<Vec<Message>, AdminError>>>,
        calls: Cell<usize>,
        seen: RefCell<Vec<GetMessagesRequest>>,
    }

    impl ScriptedSource {
        fn new(
            batches: impl IntoIterator<Item = Result<Vec<Message>, AdminError>>,
        ) -> Self {
            Self {
                batches: RefCell::new(batches.into_iter().collect()),
                calls: Cell::new(0),
                seen: RefCell::new(Vec::new()),
            }
        }
    }

    impl MessageSource for ScriptedSource {
        async fn get_messages(
            &self,
            _queue: &str,
            request: &GetMessagesRequest,
        ) -> Result<Vec<Message>, AdminError> {
            self.calls.set(self.calls.get() + 1);
            self.seen.borrow_mut().push(request.clone());
            self.batches
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    fn message(body: &str) -> Message {
        let mut m = Message::new();
        m.insert("payload".to_string(), serde_json::json!(body));
        m
    }

    fn batch(n: usize) -> Vec<Message> {
        (0..n).map(|i| message(&format!("m{i}"))).collect()
    }

    fn broker_error() -> AdminError {
        AdminError::Broker(BrokerError {
            status: 500,
            code: "internal".to_string(),
            reason: "boom".to_string(),
        })
    }

    #[tokio::test]
    async fn drain_all_on_an_empty_queue_makes_exactly_one_call() {
        let source = ScriptedSource::new([Ok(Vec::new())]);
        let drained = Drainer::new(&source).drain_all("q").await.unwrap();
        assert!(drained.is_empty());
        assert_eq!(source.calls.get(), 1);
    }

    #[tokio::test]
    async fn drain_all_stops_at_the_first_short_batch() {
        let source = ScriptedSource::new([Ok(batch(100)), Ok(batch(100)), Ok(batch(50))]);
        let drained = Drainer::new(&source).drain_all("q").await.unwrap();
        assert_eq!(drained.len(), 250);
        assert_eq!(source.calls.get(), 3);
    }

    #[tokio::test]
    async fn drain_all_needs_one_extra_call_when_the_queue_holds_an_exact_multiple() {
        let source = ScriptedSource::new([Ok(batch(100)), Ok(batch(100)), Ok(Vec::new())]);
        let drained = Drainer::new(&source).drain_all("q").await.unwrap();
        assert_eq!(drained.len(), 200);
        assert_eq!(source.calls.get(), 3);
    }

    #[tokio::test]
    async fn drain_all_requests_the_configured_batch_size() {
        let source = ScriptedSource::new([Ok(batch(2)), Ok(batch(1))]);
        let options = DrainOptions {
            batch_size: 2,
            ..DrainOptions::default()
        };
        let drained = Drainer::with_options(&source, options)
            .drain_all("q")
            .await
            .unwrap();
        assert_eq!(drained.len(), 3);
        assert_eq!(source.calls.get(), 2);
        assert!(source.seen.borrow().iter().all(|r| r.count == 2));
    }

    #[tokio::test]
    async fn drain_all_surfaces_a_failure_with_the_partial_result() {
        let source = ScriptedSource::new([Ok(batch(100)), Err(broker_error())]);
        let err = Drainer::new(&source).drain_all("q").await.unwrap_err();
        assert_eq!(err.collected.len(), 100);
        assert!(matches!(err.source, AdminError::Broker(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn await_messages_with_target_zero_returns_after_one_drain() {
        let source = ScriptedSource::new([Ok(Vec::new())]);
        let start = Instant::now();
        let got = Drainer::new(&source).await_messages("q", 0).await.unwrap();
        assert!(got.is_empty());
        assert_eq!(source.calls.get(), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn await_messages_returns_without_sleeping_when_enough_are_ready() {
        let source = ScriptedSource::new([Ok(batch(5))]);
        let start = Instant::now();
        let got = Drainer::new(&source).await_messages("q", 5).await.unwrap();
        assert_eq!(got.len(), 5);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn await_messages_accumulates_across_polling_rounds() {
        let source = ScriptedSource::new([Ok(batch(2)), Ok(batch(3))]);
        let drainer = Drainer::new(&source);
        let got = drainer.await_messages("q", 5).await.unwrap();
        assert_eq!(got.len(), 5);
        assert_eq!(source.calls.get(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn await_messages_returns_a_short_result_once_the_window_closes() {
        let source = ScriptedSource::new([Ok(batch(1))]);
        let start = Instant::now();
        let got = Drainer::new(&source).await_messages("q", 5).await.unwrap();
        assert_eq!(got.len(), 1);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(10), "returned at {elapsed:?}");
        assert!(elapsed <= Duration::from_secs(11), "returned at {elapsed:?}");
        // one drain per second across the ten-second window, plus the first
        assert_eq!(source.calls.get(), 11);
    }

    #[tokio::test(start_paused = true)]
    async fn await_messages_propagates_a_failure_with_everything_collected_so_far() {
        let source = ScriptedSource::new([Ok(batch(3)), Err(broker_error())]);
        let err = Drainer::new(&source)
            .await_messages("q", 10)
            .await
            .unwrap_err();
        assert_eq!(err.collected.len(), 3);
        assert!(matches!(err.source, AdminError::Broker(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn await_messages_honors_a_custom_wait_window() {
        let source = ScriptedSource::new([]);
        let options = DrainOptions {
            poll_interval: Duration::from_millis(100),
            wait_for: Duration::from_millis(250),
            ..DrainOptions::default()
        };
        let start = Instant::now();
        let got = Drainer::with_options(&source, options)
            .await_messages("q", 1)
            .await
            .unwrap();
        assert!(got.is_empty());
        assert!(start.elapsed() >= Duration::from_millis(250));
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
