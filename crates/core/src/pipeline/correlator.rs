//! # Prompt Correlator
//!
//! Multiplexes outstanding user questions over one message channel and
//! routes each answer to the question with the same correlation id,
//! regardless of arrival order.
//!
//! ```text
//! ask ──▶ register waiter ──▶ send question ──▶ await (answer | timeout)
//!                                                   ▲
//! inbound answer ──▶ resolve(id) ──▶ remove waiter ─┘
//! ```
//!
//! The waiter table lock is never held across an `.await`, so channel I/O
//! always happens unlocked.

use crate::channel::{MessageSink, OutboundMessage};
use crate::error::ChannelError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::oneshot;

/// Owner tag for waiters registered outside any scope
const UNSCOPED: u64 = 0;

struct Waiter {
    /// Distinguishes a live waiter from a later one reusing its id
    ticket: u64,
    owner: u64,
    answer_tx: oneshot::Sender<String>,
}

/// Outstanding questions for one channel connection
pub struct PromptCorrelator {
    sink: Arc<dyn MessageSink>,
    waiters: Mutex<HashMap<String, Waiter>>,
    next_ticket: AtomicU64,
}

impl PromptCorrelator {
    pub fn new(sink: Arc<dyn MessageSink>) -> Self {
        Self {
            sink,
            waiters: Mutex::new(HashMap::new()),
            next_ticket: AtomicU64::new(UNSCOPED + 1),
        }
    }

    /// Outbound half of the channel this correlator asks on
    pub fn sink(&self) -> Arc<dyn MessageSink> {
        Arc::clone(&self.sink)
    }

    fn table(&self) -> MutexGuard<'_, HashMap<String, Waiter>> {
        self.waiters.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn ticket(&self) -> u64 {
        self.next_ticket.fetch_add(1, Ordering::Relaxed)
    }

    /// Ask a question and wait for its answer.
    ///
    /// Returns `Ok(None)` when `timeout` elapses first. The waiter is gone
    /// from the table when this returns, or if the future is dropped.
    pub async fn ask(
        &self,
        question: &str,
        id: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Option<String>, ChannelError> {
        self.ask_as(UNSCOPED, question, id, timeout).await
    }

    async fn ask_as(
        &self,
        owner: u64,
        question: &str,
        id: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Option<String>, ChannelError> {
        let id = id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let ticket = self.ticket();
        let (answer_tx, mut answer_rx) = oneshot::channel();

        let replaced = self.table().insert(
            id.clone(),
            Waiter {
                ticket,
                owner,
                answer_tx,
            },
        );
        if replaced.is_some() {
            tracing::warn!(question_id = %id, "question id reused while still pending");
        }
        let _guard = WaiterGuard {
            correlator: self,
            id: &id,
            ticket,
        };

        self.sink
            .send(OutboundMessage::Question {
                id: id.clone(),
                text: question.to_string(),
            })
            .await?;

        let answer = match timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut answer_rx).await {
                Ok(received) => received.ok(),
                // An answer may have landed between the deadline and now
                Err(_) => answer_rx.try_recv().ok(),
            },
            None => (&mut answer_rx).await.ok(),
        };

        if answer.is_none() {
            tracing::warn!(question_id = %id, "question went unanswered");
        }
        Ok(answer)
    }

    /// Deliver an answer. Returns `false` for unknown or settled ids.
    pub fn resolve(&self, id: &str, answer: &str) -> bool {
        let waiter = self.table().remove(id);
        match waiter {
            Some(waiter) => {
                let delivered = waiter.answer_tx.send(answer.to_string()).is_ok();
                if !delivered {
                    tracing::warn!(question_id = %id, "answer arrived after asker left");
                }
                delivered
            }
            None => {
                tracing::warn!(question_id = %id, "no pending question for answer");
                false
            }
        }
    }

    /// Number of questions still waiting for an answer
    pub fn outstanding(&self) -> usize {
        self.table().len()
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.table().contains_key(id)
    }

    /// Drop every waiter; their askers observe `None`.
    pub fn purge(&self) -> usize {
        let drained: Vec<Waiter> = self.table().drain().map(|(_, w)| w).collect();
        drained.len()
    }

    fn purge_owner(&self, owner: u64) -> usize {
        let mut table = self.table();
        let before = table.len();
        table.retain(|_, w| w.owner != owner);
        before - table.len()
    }

    /// Open a scope whose waiters can be purged without touching others
    pub fn scope(self: &Arc<Self>) -> PromptScope {
        PromptScope {
            correlator: Arc::clone(self),
            owner: self.ticket(),
        }
    }
}

/// Removes a waiter when its `ask` finishes or is cancelled
struct WaiterGuard<'a> {
    correlator: &'a PromptCorrelator,
    id: &'a str,
    ticket: u64,
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        let mut table = self.correlator.table();
        if table.get(self.id).is_some_and(|w| w.ticket == self.ticket) {
            table.remove(self.id);
        }
    }
}

/// Questions asked on behalf of one run.
///
/// The run purges its own waiters on every failure path; dropping the
/// scope does the same for cancelled runs.
pub struct PromptScope {
    correlator: Arc<PromptCorrelator>,
    owner: u64,
}

impl PromptScope {
    pub async fn ask(
        &self,
        question: &str,
        id: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Option<String>, ChannelError> {
        self.correlator.ask_as(self.owner, question, id, timeout).await
    }

    /// Remove this scope's outstanding waiters
    pub fn purge(&self) -> usize {
        let purged = self.correlator.purge_owner(self.owner);
        if purged > 0 {
            tracing::debug!(purged, "purged outstanding questions");
        }
        purged
    }

    pub fn outstanding(&self) -> usize {
        self.correlator
            .table()
            .values()
            .filter(|w| w.owner == self.owner)
            .count()
    }
}

impl Drop for PromptScope {
    fn drop(&mut self) {
        self.purge();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn correlator() -> (Arc<PromptCorrelator>, mpsc::UnboundedReceiver<OutboundMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(PromptCorrelator::new(Arc::new(tx))), rx)
    }

    async fn next_question(rx: &mut mpsc::UnboundedReceiver<OutboundMessage>) -> (String, String) {
        match rx.recv().await {
            Some(OutboundMessage::Question { id, text }) => (id, text),
            other => panic!("expected question, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_answer_resolves_matching_question() {
        let (correlator, mut rx) = correlator();
        let asker = {
            let c = correlator.clone();
            tokio::spawn(async move { c.ask("Which colour?", Some("q-1".into()), None).await })
        };

        let (id, text) = next_question(&mut rx).await;
        assert_eq!((id.as_str(), text.as_str()), ("q-1", "Which colour?"));
        assert!(correlator.resolve("q-1", "black"));

        assert_eq!(asker.await.unwrap().unwrap(), Some("black".to_string()));
        assert_eq!(correlator.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_out_of_order_answers() {
        let (correlator, mut rx) = correlator();
        let first = {
            let c = correlator.clone();
            tokio::spawn(async move { c.ask("first?", None, None).await })
        };
        let (first_id, _) = next_question(&mut rx).await;
        let second = {
            let c = correlator.clone();
            tokio::spawn(async move { c.ask("second?", None, None).await })
        };
        let (second_id, _) = next_question(&mut rx).await;
        assert_ne!(first_id, second_id);
        assert_eq!(correlator.outstanding(), 2);

        assert!(correlator.resolve(&second_id, "two"));
        assert!(correlator.resolve(&first_id, "one"));

        assert_eq!(first.await.unwrap().unwrap().as_deref(), Some("one"));
        assert_eq!(second.await.unwrap().unwrap().as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn test_resolve_unknown_or_settled_is_noop() {
        let (correlator, mut rx) = correlator();
        assert!(!correlator.resolve("ghost", "hello"));

        let asker = {
            let c = correlator.clone();
            tokio::spawn(async move { c.ask("q", Some("q-9".into()), None).await })
        };
        next_question(&mut rx).await;
        assert!(correlator.resolve("q-9", "a"));
        assert!(!correlator.resolve("q-9", "b"));
        assert_eq!(asker.await.unwrap().unwrap().as_deref(), Some("a"));
        assert_eq!(correlator.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_timeout_returns_none_and_clears_waiter() {
        let (correlator, _rx) = correlator();
        let started = std::time::Instant::now();
        let limit = Duration::from_millis(40);

        let answer = correlator.ask("anyone?", Some("q-t".into()), Some(limit)).await.unwrap();

        assert_eq!(answer, None);
        assert!(started.elapsed() >= limit);
        assert!(!correlator.is_pending("q-t"));
        assert!(!correlator.resolve("q-t", "too late"));
    }

    #[tokio::test]
    async fn test_timeouts_are_independent() {
        let (correlator, mut rx) = correlator();
        let short = {
            let c = correlator.clone();
            tokio::spawn(async move {
                c.ask("short", Some("s".into()), Some(Duration::from_millis(20))).await
            })
        };
        let long = {
            let c = correlator.clone();
            tokio::spawn(async move {
                c.ask("long", Some("l".into()), Some(Duration::from_secs(5))).await
            })
        };
        next_question(&mut rx).await;
        next_question(&mut rx).await;

        assert_eq!(short.await.unwrap().unwrap(), None);
        assert!(correlator.is_pending("l"));
        assert!(correlator.resolve("l", "fine"));
        assert_eq!(long.await.unwrap().unwrap().as_deref(), Some("fine"));
    }

    #[tokio::test]
    async fn test_scope_purges_only_its_own_waiters() {
        let (correlator, mut rx) = correlator();
        let scope_a = Arc::new(correlator.scope());
        let scope_b = Arc::new(correlator.scope());

        let a_task = tokio::spawn({
            let scope = scope_a.clone();
            async move { scope.ask("a?", Some("a".into()), None).await }
        });
        next_question(&mut rx).await;
        let b_task = tokio::spawn({
            let scope = scope_b.clone();
            async move { scope.ask("b?", Some("b".into()), None).await }
        });
        next_question(&mut rx).await;
        assert_eq!(correlator.outstanding(), 2);
        assert_eq!(scope_a.outstanding(), 1);

        assert_eq!(scope_a.purge(), 1);
        assert_eq!(a_task.await.unwrap().unwrap(), None);

        assert!(correlator.is_pending("b"));
        assert!(!correlator.resolve("a", "late"));
        assert!(correlator.resolve("b", "kept"));
        assert_eq!(b_task.await.unwrap().unwrap().as_deref(), Some("kept"));
    }

    #[tokio::test]
    async fn test_dropping_scope_purges() {
        let (correlator, mut rx) = correlator();
        let scope = correlator.scope();
        let pending = tokio::spawn({
            let c = correlator.clone();
            async move { c.ask("unscoped", Some("u".into()), None).await }
        });
        next_question(&mut rx).await;

        let run = tokio::spawn(async move { scope.ask("scoped", Some("s".into()), None).await });
        next_question(&mut rx).await;
        run.abort();
        let _ = run.await;

        assert!(!correlator.is_pending("s"));
        assert!(correlator.is_pending("u"));
        assert!(correlator.resolve("u", "ok"));
        assert!(pending.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_closed_channel_leaves_no_waiter() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let correlator = PromptCorrelator::new(Arc::new(tx));
        tokio_test::assert_err!(correlator.ask("hello?", None, None).await);
        assert_eq!(correlator.outstanding(), 0);
    }
}
