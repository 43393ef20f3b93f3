//! Audio wire codec
//!
//! Fixed binary framing for audio packets plus the Opus-backed encode
//! pipeline. Decoding is the first line of defense against garbled or
//! adversarial peers: malformed input yields `None`, never a panic.

pub mod opus;
pub mod packet;
pub mod pipeline;

pub use opus::{OpusVoiceDecoder, OpusVoiceEncoder};
pub use packet::AudioPacket;
pub use pipeline::{
    AsyncDecoder, AsyncEncoder, DecodePipeline, DecodedFrame, EncodePipeline, FrameAssembler,
};
