//! Adapters: host implementations of the hexagonal port traits.
//!
//! | Adapter          | Implements       | Stands in for                 |
//! |------------------|------------------|-------------------------------|
//! | `memory_area`    | MemoryAreaPort   | Dedicated image flash area    |
//! |                  | ClockPort        | Hardware microsecond timer    |
//! | `settings_store` | SettingsPort     | Persistent settings page      |
//!
//! The cooperative scheduler (`crate::scheduler`) is the host
//! [`SchedulerPort`](crate::app::ports::SchedulerPort).  Radio, stack and
//! update pipeline are recorded by the integration test platform.

pub mod memory_area;
pub mod settings_store;
