//! Turning a live frame stream into at most one resolution per presentation.
//!
//! [`CaptureSession`] is the pure state machine. [`CaptureEngine`] runs it on a
//! frame loop, hands detections to the resolver off-loop, and reports back
//! through [`CaptureEvent`]s.

pub mod engine;
pub mod frame;
pub mod scripted;
pub mod session;

pub use engine::{CaptureEngine, CaptureEvent, CaptureHandle, CaptureSummary};
pub use frame::{BoundingBox, DecodedSymbol, Frame, FrameSource, SymbolDecoder};
pub use scripted::{ScriptedFrameSource, TextPayloadDecoder};
pub use session::{CaptureMode, CaptureSession, CaptureState, FrameOutcome, SessionTuning};
