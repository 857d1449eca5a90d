//! Per-actor FIFO mailbox
//!
//! Many producers, one consumer. Posting never blocks; receiving suspends the
//! owning actor until a message arrives, the deadline elapses, the owner is
//! cancelled, or the mailbox is closed by a reap.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use shared_types::ActorId;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::actors::protocol::{CoordinationError, Message};

/// Stand-in deadline for timeouts too large to add to `Instant::now()`
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

pub(crate) fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout).unwrap_or(now + FAR_FUTURE)
}

/// Selects which queued message a receive consumes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceiveFilter {
    pub from: Option<ActorId>,
    pub correlation_id: Option<String>,
}

impl ReceiveFilter {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn matches(&self, message: &Message) -> bool {
        if let Some(from) = &self.from {
            if &message.from_id != from {
                return false;
            }
        }
        if let Some(correlation_id) = &self.correlation_id {
            if message.correlation_id.as_ref() != Some(correlation_id) {
                return false;
            }
        }
        true
    }
}

/// Ephemeral record of one `wait_for_response`; dropped on satisfaction or timeout
#[derive(Debug, Clone)]
pub struct PendingWait {
    pub waiter_id: ActorId,
    pub filter: ReceiveFilter,
    pub deadline: DateTime<Utc>,
    timeout: Duration,
}

impl PendingWait {
    pub fn new(waiter_id: ActorId, filter: ReceiveFilter, timeout: Duration) -> Self {
        let deadline = Utc::now()
            + chrono::Duration::from_std(timeout).unwrap_or_else(|_| chrono::Duration::zero());
        Self {
            waiter_id,
            filter,
            deadline,
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[derive(Debug, Default)]
struct MailboxInner {
    queue: VecDeque<Message>,
    closed: bool,
    posted_total: u64,
}

#[derive(Debug)]
pub struct Mailbox {
    owner: ActorId,
    inner: Mutex<MailboxInner>,
    notify: Notify,
}

impl Mailbox {
    pub fn new(owner: ActorId) -> Self {
        Self {
            owner,
            inner: Mutex::new(MailboxInner::default()),
            notify: Notify::new(),
        }
    }

    pub fn owner(&self) -> &ActorId {
        &self.owner
    }

    fn lock(&self) -> MutexGuard<'_, MailboxInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append to the tail. Returns the queue depth after the post.
    pub fn post(&self, message: Message) -> Result<usize, CoordinationError> {
        let depth = {
            let mut inner = self.lock();
            if inner.closed {
                return Err(CoordinationError::ActorGone(self.owner.clone()));
            }
            inner.queue.push_back(message);
            inner.posted_total += 1;
            inner.queue.len()
        };
        self.notify.notify_waiters();
        Ok(depth)
    }

    pub fn peek_count(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn posted_total(&self) -> u64 {
        self.lock().posted_total
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn contains_matching(&self, filter: &ReceiveFilter) -> bool {
        self.lock().queue.iter().any(|m| filter.matches(m))
    }

    /// Non-blocking receive of the head of the queue.
    pub fn try_receive(&self) -> Option<Message> {
        self.lock().queue.pop_front()
    }

    /// Close the mailbox, dropping anything still queued. Returns how many were dropped.
    pub fn close(&self) -> usize {
        let dropped = {
            let mut inner = self.lock();
            inner.closed = true;
            let dropped = inner.queue.len();
            inner.queue.clear();
            dropped
        };
        self.notify.notify_waiters();
        dropped
    }

    /// Block until the head message arrives or `timeout` elapses.
    pub async fn receive(&self, timeout: Duration) -> Result<Message, CoordinationError> {
        self.receive_matching(&ReceiveFilter::any(), timeout, None)
            .await
    }

    /// Block until the oldest message matching `filter` arrives.
    ///
    /// Non-matching messages stay queued in their original order. Returns
    /// `Cancelled` as soon as `cancel` fires.
    pub async fn receive_matching(
        &self,
        filter: &ReceiveFilter,
        timeout: Duration,
        cancel: Option<&CancellationToken>,
    ) -> Result<Message, CoordinationError> {
        let deadline = deadline_after(timeout);
        loop {
            // Register before inspecting the queue so a concurrent post cannot be missed.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut inner = self.lock();
                if let Some(pos) = inner.queue.iter().position(|m| filter.matches(m)) {
                    if let Some(message) = inner.queue.remove(pos) {
                        return Ok(message);
                    }
                }
                if inner.closed {
                    return Err(CoordinationError::ActorGone(self.owner.clone()));
                }
            }

            let cancelled = async {
                match cancel {
                    Some(token) => token.cancelled().await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep_until(deadline) => {
                    return Err(CoordinationError::Timeout(timeout));
                }
                _ = cancelled => {
                    return Err(CoordinationError::Cancelled);
                }
            }
        }
    }
}
