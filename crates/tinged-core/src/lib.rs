//! Tinged Core - Playback transport
//!
//! This crate provides the transport behind the tinged player: the
//! playback state machine, the engine adapter and its native symphonia/cpal
//! backend, the draggable range control model, and the value/offset mapping
//! shared by the seek and volume bars.

pub mod command;
pub mod decoder;
pub mod engine;
pub mod mapper;
pub mod output;
pub mod poller;
pub mod range;
pub mod transport;

pub use command::{ Command, CommandError };
pub use decoder::AudioMetadata;
pub use engine::native::NativeBackend;
pub use engine::{ AudioBackend, EngineEvent, EngineMessage, EngineSession, EventSink, Generation };
pub use range::{ ControlId, PointerCapture, RangeControl, RangeEvent, RangeProps, TrackGeometry };
pub use transport::{
    PlaybackStatus, TransportController, TransportError, TransportPosition, TransportSnapshot, VolumeLevel,
};
