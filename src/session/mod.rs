//! Discussion sessions: lifecycle, stream arbitration and cancellation

mod engine;
pub mod state;

pub use engine::{Session, StreamOutcome, StreamReport, DEFAULT_DEBATE_ROUNDS};
