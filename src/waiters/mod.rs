//! Suspended long-poll subscribers.
//!
//! A subscriber that has nothing to catch up on joins the channel's
//! [`WaiterSet`] and awaits its [`Waiter`]. The next publish resumes every
//! joined waiter with the same batch; a waiter nobody resumes gives up
//! after its wait window.
//!
//! Each waiter owns a one-shot completion, so a subscriber that went away
//! cannot stop the others from being resumed.
//!
//! # Example
//!
//! ```ignore
//! let mut set = WaiterSet::new();
//! let mut waiter = set.join();
//!
//! set.flush(&[event]);
//!
//! match waiter.wait(Duration::from_secs(30)).await {
//!     WaitOutcome::Delivered(batch) => println!("{} new events", batch.len()),
//!     WaitOutcome::TimedOut => println!("re-poll"),
//!     WaitOutcome::Abandoned => println!("cancelled"),
//! }
//! ```

mod set;
mod types;

pub use set::WaiterSet;
pub use types::{WaitOutcome, Waiter, WaiterToken};
