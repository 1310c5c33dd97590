//! End-to-end tests of the service provider.
//!
//! Every test wires a complete SP over the in-memory cache and exchanges
//! real signed messages with a scripted IdP.

mod common;
mod authn;
mod slo;
