//! Ferrous Replay Infrastructure Layer
//!
//! Scenario file parsing, sockets towards the system under test, the mock
//! upstream servers and the fake clock.
pub mod dns;
pub mod scenario;
pub mod system;
