//! Fee calculation, forwarding request verification and checkout
//!
//! This crate computes fees from a versioned fee schedule, verifies signed
//! forwarding requests before they are relayed, and creates payment intents.

pub mod calculator;
pub mod forwarder;
pub mod intents;

pub use calculator::*;
pub use forwarder::{
    decode_payment_call, encode_execute_call, forwarder_domain, idempotency_key, verify_fee,
    verify_payment_matches, verify_signature, ForwardRequest, ForwarderVerifier, IMinimalForwarder, IPaymentGateway,
    PreparedSubmission,
};
pub use intents::CheckoutService;
