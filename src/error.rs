//! Unified error types for the beacon OTAP firmware.
//!
//! Every subsystem keeps its own small `Copy` error enum next to the code
//! that produces it; this module funnels them into a single [`Error`] so
//! the node service can report any failure uniformly.

use core::fmt;

use crate::app::ports::{
    MemoryAreaError, PipelineError, RadioError, SchedulerError, SettingsError, StackError,
};
use crate::config::ConfigError;
use crate::otap::PersistError;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The link configuration was refused.
    Config(ConfigError),
    /// The flash persistence layer failed.
    Persist(PersistError),
    /// The radio driver rejected a request.
    Radio(RadioError),
    /// The raw storage area driver failed.
    MemoryArea(MemoryAreaError),
    /// The external update pipeline rejected the image.
    Pipeline(PipelineError),
    /// The mesh stack could not be configured or started.
    Stack(StackError),
    /// The settings record could not be read or written.
    Settings(SettingsError),
    /// A task could not be scheduled.
    Scheduler(SchedulerError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Persist(e) => write!(f, "persist: {e}"),
            Self::Radio(e) => write!(f, "radio: {e}"),
            Self::MemoryArea(e) => write!(f, "memory area: {e}"),
            Self::Pipeline(e) => write!(f, "pipeline: {e}"),
            Self::Stack(e) => write!(f, "stack: {e}"),
            Self::Settings(e) => write!(f, "settings: {e}"),
            Self::Scheduler(e) => write!(f, "scheduler: {e}"),
        }
    }
}

impl std::error::Error for Error {}

macro_rules! impl_from {
    ($($src:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$src> for Error {
                fn from(e: $src) -> Self {
                    Self::$variant(e)
                }
            }
        )*
    };
}

impl_from! {
    ConfigError => Config,
    PersistError => Persist,
    RadioError => Radio,
    MemoryAreaError => MemoryArea,
    PipelineError => Pipeline,
    StackError => Stack,
    SettingsError => Settings,
    SchedulerError => Scheduler,
}

/// Convenience alias used across the crate.
pub type Result<T> = core::result::Result<T, Error>;

// ---------------------------------------------------------------------------
// Precondition checks
// ---------------------------------------------------------------------------

/// Check a fatal precondition.
///
/// A violation is always logged at error level.  With the `strict-asserts`
/// feature it also panics; otherwise the macro evaluates to `false` and the
/// caller turns the operation into a no-op.
#[macro_export]
macro_rules! precondition {
    ($cond:expr, $($arg:tt)+) => {{
        let ok: bool = $cond;
        if !ok {
            log::error!("precondition violated: {}", format_args!($($arg)+));
            #[cfg(feature = "strict-asserts")]
            panic!("precondition violated: {}", format_args!($($arg)+));
        }
        ok
    }};
}
