//! Interactive gaze arbitration for embodied conversational agents.
//!
//! The engine decides, tick by tick, where a virtual agent should look
//! during a collaborative tabletop task: it fuses a noisy grid-cell gaze
//! estimate of the human partner into a candidate set, runs a
//! phase-dependent probabilistic state machine over five gaze targets,
//! and raises conversational-repair (refinement) flags when the partner
//! appears confused or slow to act.
//!
//! Provides:
//! - `grid`: tabletop cell vocabulary and candidate-set fusion
//! - `model`: states, phases, conditions, and the parameter tables
//! - `arbiter`: the per-tick gaze arbitration state machine
//! - `logging`: the tab-separated study event log
//! - `source` / `effector`: seams to sensors and to the animation layer
//! - `tracker`: head-direction grid localization with plane calibration
//! - `eyes_alive`: idle micro-saccade controller

pub mod arbiter;
pub mod effector;
pub mod eyes_alive;
pub mod grid;
pub mod logging;
pub mod model;
pub mod source;
pub mod tracker;

pub use arbiter::{ArbiterConfig, GazeArbiter, GazeEvent};
pub use effector::{Effector, GazeTarget};
pub use model::{AgentGazeState, Condition, ReferencePhase};
