//! Transport controller
//!
//! Single writer of playback state. UI intents become engine commands, and
//! status only changes when the engine reports back through the event queue.
//! The controller owns the one live engine session, the drag override for
//! the playhead, the volume level, and the position poller.

use std::fmt;
use std::path::{ Path, PathBuf };
use std::sync::mpsc;

use thiserror::Error;

use crate::engine::{ AudioBackend, EngineEvent, EngineMessage, EngineSession, EventSink, Generation };
use crate::poller::PositionPoller;


/// Default output level for a fresh controller.
pub const DEFAULT_VOLUME: u8 = 20;


/// Playback lifecycle as last reported by the engine.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Default )]
pub enum PlaybackStatus {
    #[default]
    Idle,
    Loading,
    Loaded,
    Playing,
    Paused,
    Stopped,
}


impl PlaybackStatus {
    /// Returns true once a source has finished loading.
    pub fn has_media( self ) -> bool {
        matches!(
            self,
            PlaybackStatus::Loaded | PlaybackStatus::Playing | PlaybackStatus::Paused | PlaybackStatus::Stopped
        )
    }
}


impl fmt::Display for PlaybackStatus {
    fn fmt( &self, f: &mut fmt::Formatter<'_> ) -> fmt::Result {
        let name = match self {
            PlaybackStatus::Idle => "idle",
            PlaybackStatus::Loading => "loading",
            PlaybackStatus::Loaded => "loaded",
            PlaybackStatus::Playing => "playing",
            PlaybackStatus::Paused => "paused",
            PlaybackStatus::Stopped => "stopped",
        };
        f.write_str( name )
    }
}


/// Errors surfaced to the shell.
#[derive( Debug, Clone, PartialEq, Error )]
pub enum TransportError {
    #[error( "Could not load source: {0}" )]
    Load( String ),

    #[error( "Playback failed: {0}" )]
    EngineFault( String ),

    #[error( "Cannot {command} while {status}" )]
    InvalidCommand {
        command: &'static str,
        status: PlaybackStatus,
    },
}


/// Output level in percent, always within `0..=100`.
#[derive( Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord )]
pub struct VolumeLevel( u8 );


impl VolumeLevel {
    /// Creates a level, clamping to 100.
    pub fn new( percent: u32 ) -> Self {
        VolumeLevel( percent.min( 100 ) as u8 )
    }


    pub fn percent( self ) -> u8 {
        self.0
    }


    /// Returns the level moved by `delta` percent, saturating at both ends.
    pub fn step( self, delta: i32 ) -> Self {
        VolumeLevel::new( ( i32::from( self.0 ) + delta ).max( 0 ) as u32 )
    }
}


impl Default for VolumeLevel {
    fn default() -> Self {
        VolumeLevel( DEFAULT_VOLUME )
    }
}


/// Playhead as shown to the user.
#[derive( Debug, Clone, Copy, PartialEq, Default )]
pub struct TransportPosition {
    pub current_seconds: f64,
    /// Set while a seek drag owns the playhead.
    pub user_driven: bool,
}


/// One opened source and its engine.
#[derive( Debug )]
struct MediaSession<S> {
    source: PathBuf,
    duration: f64,
    /// `None` once the engine has been released after a fault
    engine: Option<S>,
}


/// Read model for the shell.
#[derive( Debug, Clone, PartialEq )]
pub struct TransportSnapshot {
    pub status: PlaybackStatus,
    pub duration_seconds: f64,
    pub current_seconds: f64,
    pub volume_percent: u8,
    pub user_driven: bool,
    pub source: Option<PathBuf>,
}


/// Playback state machine over an [`AudioBackend`].
pub struct TransportController<B: AudioBackend> {
    backend: B,
    session: Option<MediaSession<B::Session>>,
    generation: Generation,
    events_tx: mpsc::Sender<EngineMessage>,
    events_rx: mpsc::Receiver<EngineMessage>,
    status: PlaybackStatus,
    position: TransportPosition,
    volume: VolumeLevel,
    poller: PositionPoller,
}


impl<B: AudioBackend> TransportController<B> {
    /// Creates an idle controller.
    pub fn new( backend: B, volume: VolumeLevel ) -> Self {
        let ( events_tx, events_rx ) = mpsc::channel();
        Self {
            backend,
            session: None,
            generation: Generation::default(),
            events_tx,
            events_rx,
            status: PlaybackStatus::Idle,
            position: TransportPosition::default(),
            volume,
            poller: PositionPoller::new(),
        }
    }


    /// Tears down the current session, if any, and starts loading `source`.
    ///
    /// Completions from any earlier load are ignored from here on.
    pub fn open( &mut self, source: impl Into<PathBuf> ) {
        let source = source.into();

        self.release_session();
        self.generation = self.generation.next();
        self.poller.disarm();
        self.position = TransportPosition::default();
        self.status = PlaybackStatus::Loading;

        tracing::info!( "Opening {:?} as session {}", source, self.generation );

        let sink = EventSink::new( self.generation, self.events_tx.clone() );
        let mut engine = self.backend.load( &source, sink );
        engine.set_volume( self.volume.percent() );

        self.session = Some( MediaSession {
            source,
            duration: 0.0,
            engine: Some( engine ),
        });
    }


    /// Drains queued engine events in arrival order.
    ///
    /// Returns load failures and engine faults for the shell to report.
    pub fn pump( &mut self ) -> Vec<TransportError> {
        let mut errors = Vec::new();
        while let Ok( message ) = self.events_rx.try_recv() {
            if let Err( e ) = self.handle_engine_message( message ) {
                errors.push( e );
            }
        }
        errors
    }


    /// Runs one poller frame and publishes the sampled position.
    pub fn on_frame( &mut self ) -> Option<f64> {
        let engine = self.session.as_ref().and_then( |s| s.engine.as_ref() );
        let sample = self.poller.frame( self.status, self.position.user_driven, engine )?;

        self.position.current_seconds = sample.clamp( 0.0, self.duration() );
        Some( self.position.current_seconds )
    }


    /// Resumes from Paused or Stopped. Rejected while a drag owns the playhead.
    pub fn play( &mut self ) -> Result<(), TransportError> {
        let allowed = !self.position.user_driven
            && matches!( self.status, PlaybackStatus::Paused | PlaybackStatus::Stopped );
        let engine = self.engine_for( "play", allowed )?;
        engine.play();
        Ok(())
    }


    /// Pauses while Playing. Rejected while a drag owns the playhead.
    pub fn pause( &mut self ) -> Result<(), TransportError> {
        let allowed = !self.position.user_driven && self.status == PlaybackStatus::Playing;
        let engine = self.engine_for( "pause", allowed )?;
        engine.pause();
        Ok(())
    }


    /// Stops and rewinds while Playing or Paused. Rejected while a drag owns
    /// the playhead.
    pub fn stop( &mut self ) -> Result<(), TransportError> {
        let allowed = !self.position.user_driven
            && matches!( self.status, PlaybackStatus::Playing | PlaybackStatus::Paused );
        let engine = self.engine_for( "stop", allowed )?;
        engine.stop();
        engine.seek( 0.0 );
        Ok(())
    }


    /// Jumps to `seconds`, clamped to the track.
    pub fn seek_to( &mut self, seconds: f64 ) -> Result<(), TransportError> {
        let allowed = self.status.has_media() && !self.position.user_driven;
        let target = if seconds.is_finite() { seconds.clamp( 0.0, self.duration() ) } else { 0.0 };
        let engine = self.engine_for( "seek", allowed )?;
        engine.seek( target );
        Ok(())
    }


    /// Hands the playhead to the seek bar and pauses audio.
    pub fn seek_drag_start( &mut self, value: f64 ) -> Result<(), TransportError> {
        let allowed = self.status.has_media();
        let engine = self.engine_for( "start seeking", allowed )?;
        engine.pause();

        self.position.user_driven = true;
        self.poller.disarm();
        tracing::debug!( "Seek drag started at {:.2}s", value );

        self.drag_to( value );
        Ok(())
    }


    /// Follows the seek bar during a drag.
    ///
    /// Values past the end of the track are dropped rather than clamped.
    pub fn seek_drag_move( &mut self, value: f64 ) -> Result<(), TransportError> {
        if !self.position.user_driven {
            return Err( self.invalid( "seek without a drag" ) );
        }
        self.drag_to( value );
        Ok(())
    }


    /// Returns the playhead to the engine and resumes playback.
    pub fn seek_drag_end( &mut self ) -> Result<(), TransportError> {
        if !self.position.user_driven {
            return Err( self.invalid( "finish seeking" ) );
        }
        self.position.user_driven = false;
        tracing::debug!( "Seek drag ended at {:.2}s", self.position.current_seconds );

        if self.status == PlaybackStatus::Playing {
            self.poller.arm();
        }
        if let Some( engine ) = self.engine_mut() {
            engine.play();
        }
        Ok(())
    }


    /// Applies a new output level. Never changes status.
    pub fn volume_changed( &mut self, percent: u32 ) {
        self.volume = VolumeLevel::new( percent );
        let level = self.volume.percent();
        if let Some( engine ) = self.engine_mut() {
            engine.set_volume( level );
        }
    }


    pub fn status( &self ) -> PlaybackStatus {
        self.status
    }


    /// Track length in seconds, or 0 before the source has loaded.
    pub fn duration( &self ) -> f64 {
        self.session.as_ref().map( |s| s.duration ).unwrap_or( 0.0 )
    }


    pub fn position( &self ) -> TransportPosition {
        self.position
    }


    pub fn volume( &self ) -> VolumeLevel {
        self.volume
    }


    pub fn source( &self ) -> Option<&Path> {
        self.session.as_ref().map( |s| s.source.as_path() )
    }


    /// Returns true while the position poller is scheduled.
    pub fn is_polling( &self ) -> bool {
        self.poller.is_armed()
    }


    /// Builds the read model.
    pub fn snapshot( &self ) -> TransportSnapshot {
        TransportSnapshot {
            status: self.status,
            duration_seconds: self.duration(),
            current_seconds: self.position.current_seconds,
            volume_percent: self.volume.percent(),
            user_driven: self.position.user_driven,
            source: self.session.as_ref().map( |s| s.source.clone() ),
        }
    }


    fn handle_engine_message( &mut self, message: EngineMessage ) -> Result<(), TransportError> {
        if message.generation != self.generation {
            tracing::debug!(
                "Ignoring {:?} from stale session {} (current {})",
                message.event,
                message.generation,
                self.generation
            );
            return Ok(());
        }

        match message.event {
            EngineEvent::Loaded { duration } => {
                if self.status != PlaybackStatus::Loading {
                    tracing::debug!( "Ignoring load completion while {}", self.status );
                    return Ok(());
                }
                let duration = if duration.is_finite() { duration.max( 0.0 ) } else { 0.0 };
                if let Some( session ) = self.session.as_mut() {
                    session.duration = duration;
                }
                self.position = TransportPosition::default();
                self.transition( PlaybackStatus::Loaded );
                if let Some( engine ) = self.engine_mut() {
                    engine.play();
                }
            }
            EngineEvent::LoadError { reason } => {
                if self.status != PlaybackStatus::Loading {
                    tracing::debug!( "Ignoring load failure while {}", self.status );
                    return Ok(());
                }
                tracing::warn!( "Load failed: {}", reason );
                self.release_session();
                self.session = None;
                self.position = TransportPosition::default();
                self.transition( PlaybackStatus::Idle );
                return Err( TransportError::Load( reason ) );
            }
            EngineEvent::Playing => {
                if !self.status.has_media() {
                    tracing::debug!( "Ignoring playing event while {}", self.status );
                    return Ok(());
                }
                self.transition( PlaybackStatus::Playing );
                if !self.position.user_driven {
                    self.poller.arm();
                }
            }
            EngineEvent::Paused => {
                if !self.status.has_media() {
                    return Ok(());
                }
                self.transition( PlaybackStatus::Paused );
                self.poller.disarm();
            }
            EngineEvent::Stopped | EngineEvent::Ended => {
                if !self.status.has_media() {
                    return Ok(());
                }
                self.transition( PlaybackStatus::Stopped );
                self.poller.disarm();
            }
            EngineEvent::Seeked { position } => {
                if self.position.user_driven {
                    tracing::trace!( "Seek landed at {:.2}s during drag", position );
                } else if self.status.has_media() {
                    self.position.current_seconds = position.clamp( 0.0, self.duration() );
                }
            }
            EngineEvent::Fault { reason } => {
                tracing::error!( "Engine fault: {}", reason );
                if let Some( mut engine ) = self.session.as_mut().and_then( |s| s.engine.take() ) {
                    engine.dispose();
                }
                self.position.user_driven = false;
                self.poller.disarm();
                self.transition( PlaybackStatus::Stopped );
                return Err( TransportError::EngineFault( reason ) );
            }
        }

        Ok(())
    }


    fn transition( &mut self, next: PlaybackStatus ) {
        if self.status != next {
            tracing::info!( "Transport: {} → {}", self.status, next );
            self.status = next;
        }
    }


    /// Moves the dragged playhead and the engine along with it.
    fn drag_to( &mut self, value: f64 ) {
        if !( 0.0..=self.duration() ).contains( &value ) {
            tracing::trace!( "Drag value {:.2}s outside track, ignored", value );
            return;
        }
        self.position.current_seconds = value;
        if let Some( engine ) = self.engine_mut() {
            engine.seek( value );
        }
    }


    fn engine_mut( &mut self ) -> Option<&mut B::Session> {
        self.session.as_mut().and_then( |s| s.engine.as_mut() )
    }


    /// Returns the live engine when `allowed`, or an invalid-command error.
    fn engine_for( &mut self, command: &'static str, allowed: bool ) -> Result<&mut B::Session, TransportError> {
        let status = self.status;
        match self.session.as_mut().and_then( |s| s.engine.as_mut() ) {
            Some( engine ) if allowed => Ok( engine ),
            _ => {
                tracing::debug!( "Rejected {} while {}", command, status );
                Err( TransportError::InvalidCommand { command, status } )
            }
        }
    }


    fn invalid( &self, command: &'static str ) -> TransportError {
        tracing::debug!( "Rejected {} while {}", command, self.status );
        TransportError::InvalidCommand { command, status: self.status }
    }


    fn release_session( &mut self ) {
        if let Some( session ) = self.session.as_mut() {
            if let Some( mut engine ) = session.engine.take() {
                engine.dispose();
                tracing::debug!( "Released engine for {:?}", session.source );
            }
        }
    }
}


impl<B: AudioBackend> Drop for TransportController<B> {
    fn drop( &mut self ) {
        self.release_session();
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_volume_level_clamps() {
        assert_eq!( VolumeLevel::new( 55 ).percent(), 55 );
        assert_eq!( VolumeLevel::new( 400 ).percent(), 100 );
        assert_eq!( VolumeLevel::default().percent(), DEFAULT_VOLUME );
    }


    #[test]
    fn test_volume_step_saturates() {
        assert_eq!( VolumeLevel::new( 3 ).step( -5 ).percent(), 0 );
        assert_eq!( VolumeLevel::new( 98 ).step( 5 ).percent(), 100 );
        assert_eq!( VolumeLevel::new( 50 ).step( 5 ).percent(), 55 );
    }


    #[test]
    fn test_has_media() {
        assert!( !PlaybackStatus::Idle.has_media() );
        assert!( !PlaybackStatus::Loading.has_media() );
        assert!( PlaybackStatus::Loaded.has_media() );
        assert!( PlaybackStatus::Stopped.has_media() );
    }


    #[test]
    fn test_invalid_command_message() {
        let err = TransportError::InvalidCommand { command: "seek", status: PlaybackStatus::Idle };
        assert_eq!( err.to_string(), "Cannot seek while idle" );
    }
}
