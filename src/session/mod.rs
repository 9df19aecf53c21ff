//! Sender session: user-action guards and transmission orchestration

pub mod controller;
pub mod machine;
pub mod state;

pub use controller::Sender;
pub use machine::{Session, StreamPermit};
pub use state::{Action, CaptureState, Readiness, SessionSnapshot, Status, StreamingState};
