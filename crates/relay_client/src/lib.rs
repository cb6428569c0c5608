//! Relayer client and relay submission
//!
//! This crate talks to the transaction relayer over HTTP and drives a signed
//! forwarder call from submission to a recorded ledger row.

pub mod client;
pub mod submitter;

pub use client::*;
pub use submitter::*;
