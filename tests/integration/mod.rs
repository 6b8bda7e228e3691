//! Integration tests
//!
//! Everything here drives the full coordination protocol against a live
//! Redis instance and is therefore `#[ignore]`d by default.

mod coordination_tests;
