//! Run lifecycle states.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Lifecycle of one run.
///
/// `Creating -> Running -> Continue | Finished | Error`. No state is revisited.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RunState {
    /// Built but not yet dispatched.
    #[default]
    Creating,
    /// Request sent; output is streaming.
    Running,
    /// The turn ended and the conversation expects more input.
    Continue,
    Finished,
    Error,
}

impl RunState {
    /// Whether the run can never produce more output.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Error)
    }

    /// Whether a follow-up turn may be started from this state.
    pub fn can_continue(&self) -> bool {
        matches!(self, Self::Creating | Self::Continue | Self::Error)
    }
}
