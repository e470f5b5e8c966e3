//! Time-related helpers backed by `tokio::time`.
//!
//! ```rust
//! use core_async::time::{sleep, timeout, Duration};
//!
//! async fn example() {
//!     sleep(Duration::from_millis(5)).await;
//!     let value = timeout(Duration::from_secs(1), async { 1 }).await;
//!     assert_eq!(value.unwrap(), 1);
//! }
//! ```

pub use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
pub use tokio::time::{
    error::Elapsed, interval, sleep, sleep_until, timeout, Interval, MissedTickBehavior, Sleep,
    Timeout,
};

/// Seconds since the Unix epoch, saturating to zero for clocks set before it.
pub fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
