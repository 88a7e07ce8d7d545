use log::info;
use rand::Rng;
use std::cell::{Cell, RefCell};
use std::thread;
use std::time::{Duration, Instant};

/// Source of time for every wait, backoff and pause in a run.
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

/// Wall clock backed by `thread::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Virtual clock: `sleep` returns immediately, advances `now` and is recorded.
#[derive(Debug)]
pub struct ManualClock {
    start: Instant,
    elapsed: Cell<Duration>,
    sleeps: RefCell<Vec<Duration>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        ManualClock {
            start: Instant::now(),
            elapsed: Cell::new(Duration::ZERO),
            sleeps: RefCell::new(Vec::new()),
        }
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every duration passed to `sleep`, in call order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.borrow().clone()
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed.get()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.start + self.elapsed.get()
    }

    fn sleep(&self, duration: Duration) {
        self.elapsed.set(self.elapsed.get() + duration);
        self.sleeps.borrow_mut().push(duration);
    }
}

/// Exponential backoff with whole-second jitter: `base * 2^attempt + rand[0, max_jitter]`.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub base: Duration,
    pub max_jitter_secs: u64,
}

impl Backoff {
    pub fn new(base: Duration) -> Self {
        Backoff { base, max_jitter_secs: 3 }
    }

    /// Deterministic part of the delay for `attempt` (1-based retry counter).
    pub fn floor(&self, attempt: u32) -> Duration {
        self.base.saturating_mul(2u32.saturating_pow(attempt))
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        let jitter = rand::thread_rng().gen_range(0..=self.max_jitter_secs);
        self.floor(attempt) + Duration::from_secs(jitter)
    }
}

/// How many times to attempt a unit of work and how long to wait in between.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub wait: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, wait: Duration) -> Self {
        RetryPolicy { max_retries, wait }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Pause between distinct case numbers: `base + index % spread` seconds,
/// so consecutive requests never share the same spacing.
#[derive(Debug, Clone, Copy)]
pub struct Pacing {
    pub base_secs: u64,
    pub spread: u64,
}

impl Pacing {
    pub fn delay(&self, index: usize) -> Duration {
        let extra = if self.spread == 0 { 0 } else { index as u64 % self.spread };
        Duration::from_secs(self.base_secs + extra)
    }

    pub fn wait(&self, clock: &dyn Clock, index: usize) {
        let delay = self.delay(index);
        info!("Waiting {} seconds before next search to avoid rate limiting...", delay.as_secs());
        clock.sleep(delay);
    }
}
