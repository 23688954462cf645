//! Voice capture and playback for pawchat.
//!
//! Owns the microphone-acquisition -> chunked-record -> stop -> preview ->
//! send-or-cancel state machine, and the single-active playback handle.
//! Real audio I/O sits behind the [`Microphone`] and [`AudioSink`]
//! contracts; simulated implementations ship for the demo CLI and tests.

pub mod mic;
pub mod playback;
pub mod recorder;

pub use mic::{DeniedMicrophone, MicStream, Microphone, SimMicrophone};
pub use playback::{AudioSink, PlaybackController, SimAudioSink};
pub use recorder::CaptureSession;
