//! Async facade for the library sync engine.
//!
//! Every other crate in the workspace reaches Tokio through this crate so the
//! executor choice lives in one place.
//!
//! # Modules
//!
//! - `runtime`: blocking entry points (`block_on`)
//! - `task`: task spawning
//! - `time`: sleep, timeout and interval helpers
//! - `sync`: async-aware locks, channels and the cancellation token
//!
//! # Examples
//!
//! ```rust
//! use core_async::task;
//! use core_async::time::{sleep, Duration};
//!
//! async fn example() {
//!     let handle = task::spawn(async {
//!         sleep(Duration::from_millis(10)).await;
//!         42
//!     });
//!     assert_eq!(handle.await.unwrap(), 42);
//! }
//! ```

// Re-export the async entry-point/test macros so downstream crates never need
// direct Tokio dependencies.
pub use core_async_macros::{main, test};

// Lets the macros' `core_async::` paths resolve inside this crate's own tests.
extern crate self as core_async;

pub mod runtime;
pub mod sync;
pub mod task;
pub mod time;

pub use task::spawn;
pub use time::{sleep, Duration, Instant};
