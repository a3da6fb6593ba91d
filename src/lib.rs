//! Beacon OTAP firmware library.
//!
//! Pairing with a companion phone app and over-the-air image upload using
//! only advertising packets, for a mesh sink node.  All platform services
//! are reached through the port traits in [`app::ports`]; the modules here
//! are pure logic and run on the host for testing.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod error;
pub mod fsm;
pub mod link;
pub mod otap;
pub mod scheduler;
pub mod settings;
