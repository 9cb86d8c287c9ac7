//! Common test utilities for channel-dl integration tests

#[allow(dead_code)]
pub mod channel;
#[allow(dead_code)]
pub mod progress;

#[allow(unused_imports)]
pub use channel::*;
#[allow(unused_imports)]
pub use progress::*;
