//! Fragmentation and in-order transmission
//!
//! A transmission is planned up front as a flat list of logical messages
//! sharing one sequence counter, then executed one frame at a time.

pub mod executor;
pub mod plan;

pub use executor::{execute, execute_with_progress, StreamReport};
pub use plan::{build_stream_plan, StreamPlan};
