//! Stable problem codes for the IL engine.
//!
//! The enumeration is generated by `build.rs` from `resources/problem-codes.csv`
//! so that codes stay consistent between the engine and its documentation.
include!(concat!(env!("OUT_DIR"), "/problems.rs"));
