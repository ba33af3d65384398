//! Logging setup and error-log throttling

pub mod log_limit;
pub mod logging;

pub use log_limit::{ErrorLogLimiter, LogLimitScope};
pub use logging::{init_default_logging, init_logging, LogFormat};

pub use logging::session_span;
