//! Incremental answer pipeline: bytes -> text -> growing answer buffer.

pub mod accumulator;
pub mod decoder;
pub mod pump;

pub use accumulator::{AnswerAccumulator, AnswerUpdate, SubscriptionId, UpdateKind};
pub use decoder::Utf8StreamDecoder;
pub use pump::{PumpOptions, PumpOutcome, PumpState, StreamPump, StreamStatus, SubmitResult};
