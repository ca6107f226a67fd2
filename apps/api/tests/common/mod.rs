//! Common test utilities for API integration tests
//!
//! Every test gets a private in-memory store, a manual clock and a hub, so
//! minutes of playback can be simulated without sleeping.

#![allow(unused_imports)]

pub mod fixtures;
pub mod helpers;

pub use fixtures::*;
pub use helpers::*;
