//! H.323 call-signalling proxy and its H.245 companion.
//!
//! H.323 endpoints negotiate secondary channels by embedding raw
//! transport addresses in the signalling stream. Behind NAT those
//! addresses reference ports the translation table knows nothing about,
//! so the call setup completes and the media never arrives. These
//! modules scan proxied payloads for 6-byte big-endian (address, port)
//! tuples carrying the binding's translated inside address and request
//! an auxiliary binding for each, so the negotiated channel gets its own
//! translation entry before the peer connects to it.

pub mod module;

pub use module::{H245Module, H323Module, PinholeLedger, H323_PORT};
