pub mod gate;
pub mod liveness;
pub mod recognizer;

pub use gate::{GateDecision, RecognitionGate, RejectReason, SessionState};
pub use liveness::{LivenessCheck, LivenessReport, LivenessVoter, SpoofType};
pub use recognizer::{FaceBox, Identification, NullRecognizer, Recognizer};
