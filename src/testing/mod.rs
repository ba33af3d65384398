//! Testing utilities and mock implementations
//!
//! Lets sessions be exercised end to end without a broker.

pub mod mocks;

pub use mocks::*;
