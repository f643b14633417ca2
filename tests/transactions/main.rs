//! Transaction Coordination Integration Tests
//!
//! Drives the public API against a scripted in-process engine.


mod errors;
mod lifecycle;
