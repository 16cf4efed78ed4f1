//! Voice I/O
//!
//! Microphone capture, speaker playback and the speech recognition and
//! synthesis adapters.

mod capture;
mod playback;
mod stt;
mod tts;

pub use capture::{AudioCapture, DeviceRecorder, SAMPLE_RATE, calculate_rms, samples_to_wav};
pub use playback::{AudioPlayback, DevicePlayer, Pcm, decode_mp3, decode_wav, format_for};
pub use stt::{WhisperApi, WhisperCli, sidecar_path, transcriber_from_config};
pub use tts::OpenAiSpeech;
