//! edgestack: edge infrastructure for a static single-page frontend.
//!
//! Typed inputs, a composition graph of immutable descriptors, a synthesized
//! provisioning template, BLAKE3 state locks and provenance tracing.

pub mod cli;
pub mod core;
pub mod provisioner;
pub mod tripwire;
