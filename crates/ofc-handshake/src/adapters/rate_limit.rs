//! Rate Limiter Adapters

use parking_lot::Mutex;

use crate::ports::ConnectionRateLimiter;

const MINUTE_MS: u64 = 60_000;

/// No-op rate limiter (always admits).
#[derive(Debug, Default)]
pub struct NoOpRateLimiter;

impl NoOpRateLimiter {
    /// Create a no-op rate limiter.
    pub fn new() -> Self {
        Self
    }
}

impl ConnectionRateLimiter for NoOpRateLimiter {
    fn try_acquire(&self) -> bool {
        true
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: u64,
    last_refill_ms: u64,
}

/// Token bucket limiting new device connections per minute.
///
/// The bucket starts full and regains `permits_per_minute` tokens per minute,
/// one at a time. A limit of 0 admits everything.
pub struct DeviceConnectionRateLimiter {
    permits_per_minute: u64,
    bucket: Mutex<Bucket>,
    /// Current time provider, in milliseconds
    time_provider: Box<dyn Fn() -> u64 + Send + Sync>,
}

impl std::fmt::Debug for DeviceConnectionRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceConnectionRateLimiter")
            .field("permits_per_minute", &self.permits_per_minute)
            .field("bucket", &self.bucket)
            .field("time_provider", &"<closure>")
            .finish()
    }
}

impl DeviceConnectionRateLimiter {
    /// Create a rate limiter with system time.
    pub fn new(permits_per_minute: u32) -> Self {
        Self::with_time_provider(permits_per_minute, || {
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
                .unwrap_or(0)
        })
    }

    /// Create with custom time provider (for testing).
    pub fn with_time_provider<F>(permits_per_minute: u32, provider: F) -> Self
    where
        F: Fn() -> u64 + Send + Sync + 'static,
    {
        let now = provider();
        Self {
            permits_per_minute: u64::from(permits_per_minute),
            bucket: Mutex::new(Bucket {
                tokens: u64::from(permits_per_minute),
                last_refill_ms: now,
            }),
            time_provider: Box::new(provider),
        }
    }

    fn refill(&self, bucket: &mut Bucket, now: u64) {
        let elapsed = now.saturating_sub(bucket.last_refill_ms);
        let gained = elapsed.saturating_mul(self.permits_per_minute) / MINUTE_MS;
        if gained == 0 {
            return;
        }

        if bucket.tokens + gained >= self.permits_per_minute {
            bucket.tokens = self.permits_per_minute;
            bucket.last_refill_ms = now;
        } else {
            bucket.tokens += gained;
            // Keep the fractional remainder for the next refill
            bucket.last_refill_ms += gained * MINUTE_MS / self.permits_per_minute;
        }
    }
}

impl ConnectionRateLimiter for DeviceConnectionRateLimiter {
    fn try_acquire(&self) -> bool {
        if self.permits_per_minute == 0 {
            return true;
        }

        let now = (self.time_provider)();
        let mut bucket = self.bucket.lock();
        self.refill(&mut bucket, now);

        if bucket.tokens == 0 {
            return false;
        }
        bucket.tokens -= 1;
        true
    }
}
