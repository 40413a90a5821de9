//! The Sleuth agent: tool dispatch, the Triage/Plan/Act/Evaluate solver,
//! and the media sub-agents.
//!
//! The solver is a compiled [`sleuth_graph`] state machine over an
//! append-only conversation transcript. Nodes that act do so through the
//! [`dispatch::ToolDispatcher`], which enforces forced tool choice and
//! folds capability results back into the transcript. Video questions are
//! handled by a frame-walking sub-graph behind the `analyze_video`
//! capability; audio attachments go through the two-node [`AudioAgent`].

pub mod analyze_video;
pub mod audio;
pub mod dispatch;
pub mod prompts;
pub mod solver;
pub mod video;
pub mod walker;

pub use analyze_video::AnalyzeVideoTool;
pub use audio::AudioAgent;
pub use dispatch::{ToolDispatcher, ANSWER_TOOL};
pub use solver::{Solver, SolverNode, SolverState};
pub use video::{Frame, VideoSource};
pub use walker::VideoWalker;
