//! Playback engine adapter
//!
//! The transport never talks to an audio library directly. It asks an
//! [`AudioBackend`] to load a source, which hands back one [`EngineSession`]
//! per opened file. Sessions accept fire-and-forget commands and report what
//! actually happened as [`EngineEvent`]s through an [`EventSink`].
//!
//! Every event is tagged with the [`Generation`] of the session that produced
//! it so completions from a superseded session can be told apart.

pub mod native;

use std::fmt;
use std::path::Path;
use std::sync::mpsc;


/// Monotonic session counter.
#[derive( Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default )]
pub struct Generation( u64 );


impl Generation {
    /// Returns the generation following this one.
    pub fn next( self ) -> Self {
        Generation( self.0 + 1 )
    }


    /// Returns the raw counter value.
    pub fn value( self ) -> u64 {
        self.0
    }
}


impl fmt::Display for Generation {
    fn fmt( &self, f: &mut fmt::Formatter<'_> ) -> fmt::Result {
        write!( f, "#{}", self.0 )
    }
}


/// Lifecycle and status notifications raised by an engine.
#[derive( Debug, Clone, PartialEq )]
pub enum EngineEvent {
    /// Source decoded far enough to know its length.
    Loaded { duration: f64 },

    /// Source could not be opened or decoded.
    LoadError { reason: String },

    Playing,
    Paused,
    Stopped,

    /// Engine landed at `position` after a seek request.
    Seeked { position: f64 },

    /// Playback reached the end of the source.
    Ended,

    /// Unrecoverable failure during playback.
    Fault { reason: String },
}


/// An event tagged with the session that produced it.
#[derive( Debug, Clone, PartialEq )]
pub struct EngineMessage {
    pub generation: Generation,
    pub event: EngineEvent,
}


/// Sending half of the engine event queue, bound to one session.
#[derive( Debug, Clone )]
pub struct EventSink {
    generation: Generation,
    tx: mpsc::Sender<EngineMessage>,
}


impl EventSink {
    /// Creates a sink that tags every event with `generation`.
    pub fn new( generation: Generation, tx: mpsc::Sender<EngineMessage> ) -> Self {
        Self { generation, tx }
    }


    /// Returns the generation this sink reports for.
    pub fn generation( &self ) -> Generation {
        self.generation
    }


    /// Queues an event. Events sent after the queue is gone are dropped.
    pub fn emit( &self, event: EngineEvent ) {
        let message = EngineMessage { generation: self.generation, event };
        if self.tx.send( message ).is_err() {
            tracing::debug!( "Engine event dropped for {}: queue closed", self.generation );
        }
    }
}


/// One live engine instance bound to a single source.
///
/// Transport commands only request a change; the session reports the result
/// through its [`EventSink`].
pub trait EngineSession {
    /// Starts or resumes output. Reports `Playing`.
    fn play( &mut self );

    /// Pauses output. Reports `Paused`.
    fn pause( &mut self );

    /// Halts output. Reports `Stopped`.
    fn stop( &mut self );

    /// Moves the playhead. Reports `Seeked` with the position actually reached.
    fn seek( &mut self, seconds: f64 );

    /// Applies an output gain in percent. Takes effect immediately.
    fn set_volume( &mut self, percent: u8 );

    /// Reads the engine clock in seconds.
    fn current_position( &self ) -> f64;

    /// Releases every resource held by the session. Safe to call repeatedly.
    fn dispose( &mut self );
}


/// Factory for engine sessions.
pub trait AudioBackend {
    type Session: EngineSession;

    /// Starts loading `source` and returns the session immediately.
    ///
    /// Completion is reported later as `Loaded` or `LoadError` on `events`.
    fn load( &mut self, source: &Path, events: EventSink ) -> Self::Session;
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_generation_is_monotonic() {
        let first = Generation::default();
        let second = first.next();
        assert!( second > first );
        assert_eq!( second.next().value(), 2 );
    }


    #[test]
    fn test_sink_tags_events() {
        let ( tx, rx ) = mpsc::channel();
        let sink = EventSink::new( Generation::default().next(), tx );

        sink.emit( EngineEvent::Playing );

        let message = rx.try_recv().unwrap();
        assert_eq!( message.generation.value(), 1 );
        assert_eq!( message.event, EngineEvent::Playing );
    }


    #[test]
    fn test_sink_tolerates_closed_queue() {
        let ( tx, rx ) = mpsc::channel();
        let sink = EventSink::new( Generation::default(), tx );
        drop( rx );

        sink.emit( EngineEvent::Stopped );
    }
}
