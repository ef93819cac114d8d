//! Configuration errors raised by the control API
//!
//! None of these are fatal: a rejected call leaves the running capture untouched.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Trace index {index} out of range ({count} traces)")]
    TraceIndexOutOfRange { index: usize, count: usize },

    #[error("Trigger index {index} out of range ({count} triggers)")]
    TriggerIndexOutOfRange { index: usize, count: usize },

    #[error("Unknown projection type: {0}")]
    UnknownProjection(u32),

    #[error("Too many traces, at most {0} are supported")]
    TooManyTraces(usize),

    #[error("Too many triggers, at most {0} are supported")]
    TooManyTriggers(usize),

    #[error("The X trace (index 0) cannot be removed")]
    CannotRemoveXTrace,

    #[error("Invalid trace length: {0}")]
    InvalidTraceLength(usize),

    #[error("Trace delay of {delay} samples exceeds the maximum of {max}")]
    TraceDelayTooLong { delay: usize, max: usize },

    #[error("Invalid time base: {0}")]
    InvalidTimeBase(u32),

    #[error("Invalid time offset: {0} per mille")]
    InvalidTimeOffset(u32),

    #[error("Pre-trigger of {pre_trigger} samples does not fit a trace of {trace_length}")]
    PreTriggerTooLong { pre_trigger: usize, trace_length: usize },

    #[error("History index {index} out of range (depth {depth})")]
    HistoryIndexOutOfRange { index: usize, depth: usize },
}

pub type ConfigResult<T> = Result<T, ConfigError>;
