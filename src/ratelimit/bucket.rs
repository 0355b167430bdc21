use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Leaky bucket bounding burst size (`capacity`) and sustained rate (`leak_rate`).
///
/// Admission goes through [`LeakyBucket::fill`], a compare-and-swap loop that
/// never blocks. Draining goes through [`LeakyBucket::leak`], called from a
/// periodic timer; it serializes on its own lock so it never contends with
/// fillers.
#[derive(Debug)]
pub struct LeakyBucket {
    capacity: u32,
    leak_rate: u32,
    current: AtomicU32,
    last_leak: Mutex<Instant>,
}

impl LeakyBucket {
    pub fn new(capacity: u32, leaks_per_second: u32) -> Self {
        Self {
            capacity,
            leak_rate: leaks_per_second,
            current: AtomicU32::new(0),
            last_leak: Mutex::new(Instant::now()),
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn leak_rate(&self) -> u32 {
        self.leak_rate
    }

    pub fn current(&self) -> u32 {
        self.current.load(Ordering::Acquire)
    }

    /// Adds `amount` if the result stays within capacity. On `false` the
    /// level is left untouched.
    pub fn fill(&self, amount: u32) -> bool {
        let mut current = self.current.load(Ordering::Acquire);

        loop {
            let Some(fill_to) = current.checked_add(amount).filter(|f| *f <= self.capacity) else {
                return false;
            };

            match self.current.compare_exchange_weak(
                current,
                fill_to,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    pub fn leak(&self) {
        self.leak_at(Instant::now());
    }

    /// Drains whole units accrued between the last leak and `now`.
    pub fn leak_at(&self, now: Instant) {
        let mut last = self.last_leak.lock().unwrap_or_else(PoisonError::into_inner);

        if self.current.load(Ordering::Acquire) == 0 || self.leak_rate == 0 {
            *last = now;
            return;
        }

        let elapsed = now.saturating_duration_since(*last);
        let leak = (elapsed.as_secs_f64() * f64::from(self.leak_rate)) as u32;
        if leak == 0 {
            return;
        }

        let _ = self
            .current
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| {
                Some(c.saturating_sub(leak))
            });

        // Carry the fractional unit over to the next tick.
        let drained = Duration::from_secs_f64(f64::from(leak) / f64::from(self.leak_rate));
        *last = (*last + drained).min(now);
    }
}
