//! Process-wide request rate limiter.
//!
//! One [`RateLimiter`] is constructed at startup and shared via `Arc` by
//! every component that calls the remote API, so their combined call rate
//! stays inside the service's budget.
//!
//! # Ordering
//!
//! Every call draws a [`Ticket`] when it first arrives and keeps it across
//! its retries. Only the lowest waiting ticket may be admitted, and it
//! performs all waiting on behalf of the queue. Whether the wait is
//! regular spacing or a server-imposed pause, callers leave strictly in
//! arrival order. A call that was answered with 429 re-enters with its
//! original ticket, ahead of everyone who arrived after it.
//!
//! # Spacing
//!
//! Spacing follows GCRA: each permit advances a theoretical arrival time by
//! `60s / requests_per_minute`, and a caller may proceed while that time is
//! no more than `(burst - 1)` intervals ahead of now.

use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info};

/// Arrival position of one call in the limiter queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ticket(u64);

struct QueueState {
    /// Theoretical arrival time of the next permit.
    tat: Instant,
    paused_until: Option<Instant>,
    waiting: BTreeSet<Ticket>,
}

enum Admission {
    Granted,
    /// A lower ticket is waiting.
    Behind,
    /// Head of the queue, but spacing or a pause holds it back.
    WaitUntil(Instant),
}

/// Removes its ticket from the queue when the caller is admitted or gives
/// up, and wakes the next head.
struct QueueEntry<'a> {
    limiter: &'a RateLimiter,
    ticket: Ticket,
}

impl<'a> QueueEntry<'a> {
    fn join(limiter: &'a RateLimiter, ticket: Ticket) -> Self {
        limiter.state.lock().waiting.insert(ticket);
        // A returning caller may outrank the current head
        limiter.changed.notify_waiters();
        Self { limiter, ticket }
    }
}

impl Drop for QueueEntry<'_> {
    fn drop(&mut self) {
        self.limiter.state.lock().waiting.remove(&self.ticket);
        self.limiter.changed.notify_waiters();
    }
}

/// Shared rate limiter for remote API calls.
pub struct RateLimiter {
    interval: Duration,
    tolerance: Duration,
    state: Mutex<QueueState>,
    changed: Notify,
    next_ticket: AtomicU64,
    granted: AtomicU64,
    pauses: AtomicU64,
}

impl RateLimiter {
    /// Creates a limiter allowing `requests_per_minute` with `burst`
    /// back-to-back requests.
    pub fn new(requests_per_minute: u32, burst: u32) -> Self {
        let rpm = requests_per_minute.max(1);
        let interval = Duration::from_secs(60) / rpm;
        let tolerance = interval * burst.max(1).saturating_sub(1);
        debug!(
            requests_per_minute = rpm,
            burst,
            interval_ms = interval.as_millis() as u64,
            "Rate limiter initialized"
        );
        Self {
            interval,
            tolerance,
            state: Mutex::new(QueueState {
                tat: Instant::now(),
                paused_until: None,
                waiting: BTreeSet::new(),
            }),
            changed: Notify::new(),
            next_ticket: AtomicU64::new(0),
            granted: AtomicU64::new(0),
            pauses: AtomicU64::new(0),
        }
    }

    /// Draw the next arrival position.
    pub fn ticket(&self) -> Ticket {
        Ticket(self.next_ticket.fetch_add(1, Ordering::Relaxed))
    }

    /// Wait until a new request may be sent.
    ///
    /// Blocks the caller; requests are never dropped.
    pub async fn acquire(&self) {
        self.acquire_as(self.ticket()).await
    }

    /// Wait for a permit at the position of an earlier `ticket`.
    pub async fn acquire_as(&self, ticket: Ticket) {
        let _entry = QueueEntry::join(self, ticket);
        loop {
            let changed = self.changed.notified();
            tokio::pin!(changed);
            changed.as_mut().enable();

            match self.admit(ticket) {
                Admission::Granted => return,
                Admission::Behind => changed.await,
                Admission::WaitUntil(deadline) => {
                    // Re-evaluate early when a pause is extended or a
                    // lower ticket joins.
                    tokio::select! {
                        _ = tokio::time::sleep_until(deadline) => {}
                        _ = &mut changed => {}
                    }
                }
            }
        }
    }

    fn admit(&self, ticket: Ticket) -> Admission {
        let mut state = self.state.lock();
        if state.waiting.first() != Some(&ticket) {
            return Admission::Behind;
        }

        let now = Instant::now();
        if let Some(until) = state.paused_until.filter(|until| *until > now) {
            return Admission::WaitUntil(until);
        }

        let ready_at = state.tat.checked_sub(self.tolerance).unwrap_or(now);
        if ready_at > now {
            return Admission::WaitUntil(ready_at);
        }

        state.tat = state.tat.max(now) + self.interval;
        self.granted.fetch_add(1, Ordering::Relaxed);
        Admission::Granted
    }

    /// Pause every queued and future caller for `duration`.
    ///
    /// Overlapping pauses extend to the latest deadline; a shorter pause
    /// never shortens an existing one.
    pub fn pause(&self, duration: Duration) {
        let until = Instant::now() + duration;
        let mut state = self.state.lock();
        if state.paused_until.is_none_or(|current| current < until) {
            state.paused_until = Some(until);
            self.pauses.fetch_add(1, Ordering::Relaxed);
            info!(
                pause_secs = duration.as_secs(),
                "Remote rate limit hit, pausing all requests"
            );
            drop(state);
            self.changed.notify_waiters();
        }
    }

    /// Whether a pause is currently in effect.
    pub fn is_paused(&self) -> bool {
        self.state
            .lock()
            .paused_until
            .is_some_and(|until| until > Instant::now())
    }

    /// Number of permits granted so far.
    pub fn granted(&self) -> u64 {
        self.granted.load(Ordering::Relaxed)
    }

    /// Number of pauses applied so far.
    pub fn pauses(&self) -> u64 {
        self.pauses.load(Ordering::Relaxed)
    }
}
