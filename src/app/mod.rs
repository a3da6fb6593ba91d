//! Application core: domain orchestration, zero direct I/O.
//!
//! The node service ties the node state machine, the beacon link and the
//! image store together.  All interaction with the radio, flash, update
//! pipeline, mesh stack and settings record happens through the **port
//! traits** in [`ports`], so the whole service runs on the host against
//! simulated adapters.

pub mod ports;
pub mod service;
