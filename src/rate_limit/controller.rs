//! Admission Controller
//!
//! Decides for every outbound call whether it may proceed now, must wait in
//! a FIFO queue, or is rejected.
//!
//! # Concurrency
//!
//! All mutable state sits behind one mutex. Counters are reserved in the
//! same critical section that grants a slot, both on the fast path and when
//! the drain loop hands a slot to a queued waiter, so two callers can never
//! be told "go" for the same slot.
//!
//! Hooks run after the lock is released and may call back into the
//! controller.
//!
//! # Cancellation
//!
//! Dropping a pending [`AdmissionController::request_wait`] future removes
//! its waiter from the queue without disturbing the others. A slot granted
//! to a waiter that was dropped in the same instant is given back.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, oneshot, Notify};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use super::clock::{Clock, SystemClock};
use super::config::{Profile, RateLimiterConfig};
use super::error::{ConfigError, RateLimitError};
use super::events::{EventBus, RateLimitEvent};
use super::quota::{QuotaTracker, WindowMarks};
use super::status::RateLimitStatus;
use crate::metrics;

/// Remaining-admissions level at or below which the approaching hook fires
///
/// Absolute, independent of the configured limits.
pub const APPROACHING_LIMIT_THRESHOLD: u32 = 2;

/// Queued admission request
#[derive(Debug)]
struct Waiter {
    id: u64,
    enqueued_at: Instant,
    grant: oneshot::Sender<WindowMarks>,
}

#[derive(Debug)]
struct State {
    tracker: QuotaTracker,
    queue: VecDeque<Waiter>,
    draining: bool,
    next_waiter_id: u64,
}

#[derive(Debug)]
struct Inner {
    config: RateLimiterConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<State>,
    wakeup: Notify,
    events: EventBus,
}

/// Outcome of the locked part of `request_wait`
enum Decision {
    Admitted(WindowMarks),
    Rejected(RateLimitError),
    Enqueued {
        id: u64,
        grant: oneshot::Receiver<WindowMarks>,
        start_drain: bool,
    },
}

/// Rate limiter for one remote quota
///
/// Cloning yields another handle to the same quota.
///
/// # Example
///
/// ```ignore
/// let limiter = AdmissionController::new(RateLimiterConfig::new(Profile::Standard))?;
///
/// let admission = limiter.request_wait().await?;
/// match send_request().await {
///     Err(e) if e.is_connect() => admission.release(),
///     _ => {}
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AdmissionController {
    inner: Arc<Inner>,
}

impl AdmissionController {
    /// Create a controller on the wall clock
    pub fn new(config: RateLimiterConfig) -> Result<Self, ConfigError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a controller reading time from `clock`
    pub fn with_clock(config: RateLimiterConfig, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        config.validate()?;

        debug!(
            profile = %config.profile,
            second_limit = ?config.second_limit(),
            day_limit = ?config.day_limit(),
            queue_requests = config.queue_requests,
            max_queue_size = config.max_queue_size,
            "Admission controller created"
        );

        Ok(Self::from_parts(config, clock))
    }

    /// No limits enforced
    pub fn disabled() -> Self {
        Self::from_parts(RateLimiterConfig::disabled(), Arc::new(SystemClock))
    }

    fn from_parts(config: RateLimiterConfig, clock: Arc<dyn Clock>) -> Self {
        let tracker = QuotaTracker::new(config.second_limit(), config.day_limit(), clock.now_ms());

        Self {
            inner: Arc::new(Inner {
                config,
                clock,
                state: Mutex::new(State {
                    tracker,
                    queue: VecDeque::new(),
                    draining: false,
                    next_waiter_id: 0,
                }),
                wakeup: Notify::new(),
                events: EventBus::new(),
            }),
        }
    }

    pub fn profile(&self) -> Profile {
        self.inner.config.profile
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.inner.config
    }

    fn is_disabled(&self) -> bool {
        self.inner.config.is_disabled()
    }

    /// Whether one more request fits right now
    pub fn can_admit(&self) -> bool {
        if self.is_disabled() {
            return true;
        }
        let now = self.inner.clock.now_ms();
        let mut state = self.inner.lock_state();
        state.tracker.refresh_windows(now);
        state.tracker.has_capacity()
    }

    /// Count a request that was dispatched without going through [`request_wait`](Self::request_wait)
    ///
    /// Performs no capacity check. Never call this for a request admitted by
    /// `request_wait`, whose slot is already counted.
    pub fn record_admission(&self) {
        if self.is_disabled() {
            return;
        }
        let now = self.inner.clock.now_ms();
        let mut notices = Vec::new();
        {
            let mut state = self.inner.lock_state();
            state.tracker.refresh_windows(now);
            reserve(&mut state, &mut notices);
        }
        self.inner.dispatch(notices);
    }

    /// Wait for a slot
    ///
    /// Resolves immediately when capacity is free and nobody is queued.
    /// Otherwise fails fast with [`RateLimitError::RateLimitExceeded`] if
    /// queueing is disabled, with [`RateLimitError::QueueFull`] if the
    /// queue is at its bound, or joins the tail of the queue and resolves
    /// when the drain loop grants it a slot.
    ///
    /// The returned [`Admission`] has already been counted.
    ///
    /// Must be awaited inside a tokio runtime.
    pub async fn request_wait(&self) -> Result<Admission, RateLimitError> {
        if self.is_disabled() {
            return Ok(Admission::unlimited());
        }

        let now = self.inner.clock.now_ms();
        let mut notices = Vec::new();
        let decision = {
            let mut state = self.inner.lock_state();
            state.tracker.refresh_windows(now);
            self.decide(&mut state, now, &mut notices)
        };
        self.inner.dispatch(notices);

        match decision {
            Decision::Admitted(marks) => {
                metrics::ADMISSIONS_TOTAL.with_label_values(&["immediate"]).inc();
                Ok(Admission::reserved(self.clone(), marks, false, Duration::ZERO))
            }
            Decision::Rejected(err) => Err(err),
            Decision::Enqueued {
                id,
                grant,
                start_drain,
            } => {
                if start_drain {
                    tokio::spawn(drain_queue(Arc::clone(&self.inner)));
                }
                self.wait_for_grant(id, grant).await
            }
        }
    }

    /// [`request_wait`](Self::request_wait) with a deadline on the queued wait
    pub async fn request_wait_timeout(&self, timeout: Duration) -> Result<Admission, RateLimitError> {
        match tokio::time::timeout(timeout, self.request_wait()).await {
            Ok(result) => result,
            Err(_) => {
                let waited_ms = timeout.as_millis() as u64;
                warn!(waited_ms, "Timed out waiting for a rate limit slot");
                metrics::REJECTIONS_TOTAL.with_label_values(&["timeout"]).inc();
                Err(RateLimitError::WaitTimeout { waited_ms })
            }
        }
    }

    fn decide(&self, state: &mut State, now: u64, notices: &mut Vec<RateLimitEvent>) -> Decision {
        let config = &self.inner.config;

        // Arrivals never overtake queued waiters
        if state.queue.is_empty() && state.tracker.has_capacity() {
            let marks = reserve(state, notices);
            notices.push(RateLimitEvent::Granted {
                queued: false,
                waited_ms: 0,
            });
            return Decision::Admitted(marks);
        }

        if !config.queue_requests {
            let retry_after_ms = state.tracker.time_until_next_slot(now);
            warn!(retry_after_ms, "Rate limit exceeded, rejecting request");
            metrics::REJECTIONS_TOTAL.with_label_values(&["rate_limited"]).inc();
            notices.push(RateLimitEvent::LimitExceeded { retry_after_ms });
            return Decision::Rejected(RateLimitError::RateLimitExceeded { retry_after_ms });
        }

        if state.queue.len() >= config.max_queue_size {
            warn!(
                max_queue_size = config.max_queue_size,
                "Admission queue full, rejecting request"
            );
            metrics::REJECTIONS_TOTAL.with_label_values(&["queue_full"]).inc();
            notices.push(RateLimitEvent::QueueFull {
                max_queue_size: config.max_queue_size,
            });
            return Decision::Rejected(RateLimitError::QueueFull {
                max_queue_size: config.max_queue_size,
            });
        }

        let id = state.next_waiter_id;
        state.next_waiter_id += 1;
        let (tx, rx) = oneshot::channel();
        state.queue.push_back(Waiter {
            id,
            enqueued_at: Instant::now(),
            grant: tx,
        });
        metrics::QUEUE_DEPTH.inc();

        let start_drain = !state.draining;
        state.draining = true;

        debug!(waiter = id, queue_len = state.queue.len(), "Request queued");
        notices.push(RateLimitEvent::Queued {
            queue_len: state.queue.len(),
        });

        Decision::Enqueued {
            id,
            grant: rx,
            start_drain,
        }
    }

    async fn wait_for_grant(
        &self,
        id: u64,
        grant: oneshot::Receiver<WindowMarks>,
    ) -> Result<Admission, RateLimitError> {
        let mut pending = PendingWait {
            inner: Arc::clone(&self.inner),
            id,
            grant,
            enqueued_at: Instant::now(),
            finished: false,
        };

        match (&mut pending.grant).await {
            Ok(marks) => {
                pending.finished = true;
                let waited = pending.enqueued_at.elapsed();
                Ok(Admission::reserved(self.clone(), marks, true, waited))
            }
            Err(_) => Err(RateLimitError::Closed),
        }
    }

    /// Milliseconds until the next admission is possible; 0 if one is possible now
    pub fn retry_after(&self) -> u64 {
        if self.is_disabled() {
            return 0;
        }
        let now = self.inner.clock.now_ms();
        let mut state = self.inner.lock_state();
        state.tracker.refresh_windows(now);
        state.tracker.time_until_next_slot(now)
    }

    /// Nearer of the next second and next day boundary, epoch ms; 0 when disabled
    pub fn next_reset_timestamp(&self) -> u64 {
        if self.is_disabled() {
            return 0;
        }
        let now = self.inner.clock.now_ms();
        let mut state = self.inner.lock_state();
        state.tracker.refresh_windows(now);
        state.tracker.next_reset_timestamp()
    }

    /// Number of pending waiters
    pub fn queue_len(&self) -> usize {
        self.inner.lock_state().queue.len()
    }

    /// Snapshot of the current throttling state
    pub fn status(&self) -> RateLimitStatus {
        let now = self.inner.clock.now_ms();

        if self.is_disabled() {
            return RateLimitStatus {
                profile: Profile::Disabled,
                can_make_request: true,
                requests_this_second: 0,
                second_limit: None,
                requests_this_day: 0,
                day_limit: None,
                queue_size: 0,
                retry_after: 0,
                timestamp_ms: now,
            };
        }

        let mut state = self.inner.lock_state();
        state.tracker.refresh_windows(now);
        let tracker = &state.tracker;

        RateLimitStatus {
            profile: self.inner.config.profile,
            can_make_request: tracker.has_capacity(),
            requests_this_second: tracker.requests_this_second(),
            second_limit: tracker.second_limit(),
            requests_this_day: tracker.requests_this_day(),
            day_limit: tracker.day_limit(),
            queue_size: state.queue.len(),
            retry_after: tracker.time_until_next_slot(now),
            timestamp_ms: now,
        }
    }

    /// Receive every admission decision from now on
    pub fn subscribe(&self) -> broadcast::Receiver<RateLimitEvent> {
        self.inner.events.subscribe()
    }
}

/// Count one request and queue an approaching-limit notice if warranted
fn reserve(state: &mut State, notices: &mut Vec<RateLimitEvent>) -> WindowMarks {
    let marks = state.tracker.record();

    if let Some(remaining) = state.tracker.remaining() {
        if remaining <= APPROACHING_LIMIT_THRESHOLD {
            notices.push(RateLimitEvent::ApproachingLimit {
                remaining,
                reset_at_ms: state.tracker.next_reset_timestamp(),
            });
        }
    }

    marks
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, State> {
        // Every critical section leaves the state consistent
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run hooks and publish events, outside the lock
    fn dispatch(&self, notices: Vec<RateLimitEvent>) {
        for event in notices {
            match &event {
                RateLimitEvent::ApproachingLimit {
                    remaining,
                    reset_at_ms,
                } => {
                    debug!(remaining, reset_at_ms, "Approaching rate limit");
                    if let Some(hook) = &self.config.on_approaching_limit {
                        hook(*remaining, *reset_at_ms);
                    }
                }
                RateLimitEvent::LimitExceeded { retry_after_ms } => {
                    if let Some(hook) = &self.config.on_limit_exceeded {
                        hook(*retry_after_ms);
                    }
                }
                _ => {}
            }
            self.events.emit(event);
        }
    }

    /// Grant as many queued waiters as capacity allows
    ///
    /// Returns how long to sleep before trying again, or `None` once the
    /// queue is empty and the drain loop should stop.
    fn drain_step(&self) -> Option<Duration> {
        let now = self.clock.now_ms();
        let mut notices = Vec::new();

        let next = {
            let mut state = self.lock_state();
            state.tracker.refresh_windows(now);

            loop {
                if state.queue.is_empty() {
                    state.draining = false;
                    break None;
                }

                if !state.tracker.has_capacity() {
                    let wait_ms = state.tracker.time_until_next_slot(now).max(1);
                    break Some(Duration::from_millis(wait_ms));
                }

                let Some(waiter) = state.queue.pop_front() else {
                    continue;
                };
                metrics::QUEUE_DEPTH.dec();

                if waiter.grant.is_closed() {
                    continue;
                }

                let marks = reserve(&mut state, &mut notices);
                let waited = waiter.enqueued_at.elapsed();

                match waiter.grant.send(marks) {
                    Ok(()) => {
                        info!(
                            waiter = waiter.id,
                            waited_ms = waited.as_millis() as u64,
                            "Queued request admitted"
                        );
                        metrics::ADMISSIONS_TOTAL.with_label_values(&["queued"]).inc();
                        metrics::QUEUE_WAIT_SECONDS.observe(waited.as_secs_f64());
                        notices.push(RateLimitEvent::Granted {
                            queued: true,
                            waited_ms: waited.as_millis() as u64,
                        });
                    }
                    Err(marks) => {
                        state.tracker.release(marks);
                    }
                }
            }
        };

        self.dispatch(notices);
        next
    }

    /// Give back an unused reservation and let the drain loop use it
    fn release(&self, marks: WindowMarks) {
        let now = self.clock.now_ms();
        let released = {
            let mut state = self.lock_state();
            state.tracker.refresh_windows(now);
            state.tracker.release(marks)
        };

        if released {
            debug!("Admission released before dispatch");
            metrics::RELEASES_TOTAL.inc();
            self.events.emit(RateLimitEvent::Released);
            self.wakeup.notify_one();
        }
    }

    /// Clean up after a waiter whose future was dropped
    fn abandon(&self, id: u64, grant: &mut oneshot::Receiver<WindowMarks>, waited: Duration) {
        let now = self.clock.now_ms();
        let mut event = None;
        {
            let mut state = self.lock_state();
            if let Some(pos) = state.queue.iter().position(|w| w.id == id) {
                state.queue.remove(pos);
                metrics::QUEUE_DEPTH.dec();
                event = Some(RateLimitEvent::Cancelled {
                    waited_ms: waited.as_millis() as u64,
                });
            } else if let Ok(marks) = grant.try_recv() {
                // Granted in the same instant the caller gave up
                state.tracker.refresh_windows(now);
                if state.tracker.release(marks) {
                    metrics::RELEASES_TOTAL.inc();
                    event = Some(RateLimitEvent::Released);
                }
            }
        }

        if let Some(event) = event {
            debug!(waiter = id, ?event, "Queued request abandoned");
            self.events.emit(event);
            self.wakeup.notify_one();
        }
    }
}

/// Single drain loop per controller; exits when the queue empties
async fn drain_queue(inner: Arc<Inner>) {
    trace!("Drain loop started");
    while let Some(wait) = inner.drain_step() {
        trace!(?wait, "Drain loop sleeping");
        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = inner.wakeup.notified() => {}
        }
    }
    trace!("Drain loop finished");
}

/// Removes the waiter from the queue if the wait is dropped early
struct PendingWait {
    inner: Arc<Inner>,
    id: u64,
    grant: oneshot::Receiver<WindowMarks>,
    enqueued_at: Instant,
    finished: bool,
}

impl Drop for PendingWait {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let waited = self.enqueued_at.elapsed();
        self.inner.abandon(self.id, &mut self.grant, waited);
    }
}

/// A granted slot
///
/// The slot is counted the moment it is granted. Call
/// [`release`](Admission::release) if the request never left the process
/// so the slot can go to someone else.
#[derive(Debug)]
pub struct Admission {
    controller: Option<AdmissionController>,
    reservation: Option<WindowMarks>,
    queued: bool,
    waited: Duration,
}

impl Admission {
    fn unlimited() -> Self {
        Self {
            controller: None,
            reservation: None,
            queued: false,
            waited: Duration::ZERO,
        }
    }

    fn reserved(controller: AdmissionController, marks: WindowMarks, queued: bool, waited: Duration) -> Self {
        Self {
            controller: Some(controller),
            reservation: Some(marks),
            queued,
            waited,
        }
    }

    /// Whether the caller waited in the queue
    pub fn was_queued(&self) -> bool {
        self.queued
    }

    /// Time spent in the queue
    pub fn waited(&self) -> Duration {
        self.waited
    }

    /// Windows the slot was counted in; `None` when limits are disabled
    pub fn reservation(&self) -> Option<WindowMarks> {
        self.reservation
    }

    /// Return the slot; only has an effect while its windows are current
    pub fn release(self) {
        if let (Some(controller), Some(marks)) = (self.controller, self.reservation) {
            controller.inner.release(marks);
        }
    }
}
