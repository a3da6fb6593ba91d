//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that drives the node service through a
//! scenario against the mock platform.  All tests run on the host with no
//! real radio or flash required.

mod mock_hw;
mod pairing_tests;
mod upload_tests;
