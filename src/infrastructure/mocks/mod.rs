//! Mock implementations for testing.
//!
//! This module provides test doubles for infrastructure adapters,
//! enabling controlled testing of application logic.

pub mod backend;
pub mod clock;
pub mod layer;
pub mod random;

pub use backend::CaptureBackend;
pub use clock::MockClock;
pub use layer::{CapturedEvent, MockCaptureLayer};
pub use random::ScriptedRandom;
