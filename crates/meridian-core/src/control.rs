//! C10: shared types for the Control Plane. The decision logic itself
//! (cooperative cancel, pause/resume validation against the engine's
//! control-state query) lives in `meridian-runtime` since every operation
//! round-trips through the [`crate::engine::EngineClient`] collaborator;
//! this module only carries the response shape both the runtime and a
//! gateway layer need.

use crate::task::TaskStatus;

/// The workflow's point-in-time control state, composed from the engine's
/// `control-state` query plus its `describe` status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlState {
    pub is_paused: bool,
    pub is_cancelled: bool,
    pub status: TaskStatus,
}
