//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod fencing;
mod lease;
mod quorum;

pub use fencing::{FencingToken, HighWaterMark};
pub use lease::{Lease, LockHandle};
pub use quorum::{acquire_validity, majority_of};
