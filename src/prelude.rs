//! Convenience re-exports for common use.

pub use crate::config::{EngineSettings, GlobalOptions, TransportMode};
pub use crate::engine::Gptscript;
pub use crate::error::{ErrorCategory, GptscriptError, Result, RunError};
pub use crate::run::{Run, RunState};
pub use crate::types::{
    AuthResponse, CallFrame, Frame, FreeForm, Options, Program, PromptFrame, PromptResponse,
    RunFrame, ToolDef,
};
