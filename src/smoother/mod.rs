//! Backward smoothing passes: forward-filtering backward-sampling for the
//! particle filter, and the Rauch-Tung-Striebel recursion for the Kalman
//! filter. Each is specialized to its filter family rather than expressed
//! against the shared [`crate::filters::StateEstimator`] trait, since the
//! backward recursion needs internals (particle histories, the `A` matrix
//! used at each step) the trait does not expose.

mod ffbs;
mod rts;

pub use ffbs::{ffbs, FfbsResult};
pub use rts::{rts_smooth, RtsResult};
