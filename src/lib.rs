pub mod args;
pub mod buffer;
pub mod capture;
pub mod complex;
pub mod engine;
pub mod error;
pub mod history;
pub mod monitoring;
pub mod projector;
pub mod render;
pub mod signal;
pub mod traces;
pub mod trigger;

pub use complex::Sample;
pub use engine::{ScopeEngine, Timing, TriggerState};
pub use error::{ConfigError, ConfigResult};
pub use projector::Projection;
pub use render::{ChannelRenderer, Color, Frame, NullRenderer, Renderer};
pub use traces::TraceSpec;
pub use trigger::{Edge, TriggerSpec};

/// Points per trace unless configured otherwise
pub const DEFAULT_TRACE_LENGTH: usize = 4800;
/// Longest trace, a hundred default lengths
pub const MAX_TRACE_LENGTH: usize = 100 * DEFAULT_TRACE_LENGTH;
