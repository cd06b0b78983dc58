//! Transport scenarios driven by a scripted engine.

use std::cell::{ Cell, RefCell };
use std::path::{ Path, PathBuf };
use std::rc::Rc;

use tinged_core::{
    AudioBackend, EngineEvent, EngineSession, EventSink, PlaybackStatus, TransportController, TransportError,
    VolumeLevel,
};


#[derive( Debug, Clone, PartialEq )]
enum Call {
    Load( PathBuf ),
    Play,
    Pause,
    Stop,
    Seek( f64 ),
    Volume( u8 ),
    Dispose,
}


/// Shared record of what the controller asked the engine to do.
#[derive( Clone, Default )]
struct Script {
    calls: Rc<RefCell<Vec<Call>>>,
    sinks: Rc<RefCell<Vec<EventSink>>>,
    clock: Rc<Cell<f64>>,
}


impl Script {
    fn calls( &self ) -> Vec<Call> {
        self.calls.borrow().clone()
    }


    fn clear_calls( &self ) {
        self.calls.borrow_mut().clear();
    }


    /// Emits an event from the `index`th loaded session.
    fn emit( &self, index: usize, event: EngineEvent ) {
        self.sinks.borrow()[ index ].emit( event );
    }


    fn finish_load( &self, index: usize, duration: f64 ) {
        self.emit( index, EngineEvent::Loaded { duration } );
    }
}


struct FakeBackend {
    script: Script,
}


struct FakeSession {
    script: Script,
    sink: EventSink,
    playing: bool,
}


impl FakeSession {
    fn record( &self, call: Call ) {
        self.script.calls.borrow_mut().push( call );
    }
}


impl EngineSession for FakeSession {
    fn play( &mut self ) {
        self.record( Call::Play );
        self.playing = true;
        self.sink.emit( EngineEvent::Playing );
    }


    fn pause( &mut self ) {
        self.record( Call::Pause );
        if self.playing {
            self.playing = false;
            self.sink.emit( EngineEvent::Paused );
        }
    }


    fn stop( &mut self ) {
        self.record( Call::Stop );
        self.playing = false;
        self.sink.emit( EngineEvent::Stopped );
    }


    fn seek( &mut self, seconds: f64 ) {
        self.record( Call::Seek( seconds ) );
        self.script.clock.set( seconds );
        self.sink.emit( EngineEvent::Seeked { position: seconds } );
    }


    fn set_volume( &mut self, percent: u8 ) {
        self.record( Call::Volume( percent ) );
    }


    fn current_position( &self ) -> f64 {
        self.script.clock.get()
    }


    fn dispose( &mut self ) {
        self.record( Call::Dispose );
    }
}


impl AudioBackend for FakeBackend {
    type Session = FakeSession;


    fn load( &mut self, source: &Path, events: EventSink ) -> FakeSession {
        self.script.calls.borrow_mut().push( Call::Load( source.to_path_buf() ) );
        self.script.sinks.borrow_mut().push( events.clone() );
        FakeSession {
            script: self.script.clone(),
            sink: events,
            playing: false,
        }
    }
}


fn controller() -> ( TransportController<FakeBackend>, Script ) {
    let script = Script::default();
    let backend = FakeBackend { script: script.clone() };
    ( TransportController::new( backend, VolumeLevel::default() ), script )
}


/// Opens a 180 second track and lets it start playing.
fn playing_controller() -> ( TransportController<FakeBackend>, Script ) {
    let ( mut transport, script ) = controller();
    transport.open( "track.flac" );
    script.finish_load( 0, 180.0 );
    assert!( transport.pump().is_empty() );
    assert_eq!( transport.status(), PlaybackStatus::Playing );
    script.clear_calls();
    ( transport, script )
}


#[test]
fn test_open_loads_then_autoplays() {
    let ( mut transport, script ) = controller();

    transport.open( "track.flac" );
    assert_eq!( transport.status(), PlaybackStatus::Loading );
    assert_eq!( transport.duration(), 0.0 );

    script.finish_load( 0, 180.0 );
    transport.pump();

    assert_eq!( transport.status(), PlaybackStatus::Playing );
    assert_eq!( transport.duration(), 180.0 );
    assert_eq!( transport.position().current_seconds, 0.0 );
    assert!( transport.is_polling() );
    assert_eq!(
        script.calls(),
        vec![ Call::Load( PathBuf::from( "track.flac" ) ), Call::Volume( 20 ), Call::Play ]
    );
}


#[test]
fn test_stale_load_completion_is_ignored() {
    let ( mut transport, script ) = controller();

    transport.open( "a.mp3" );
    transport.open( "b.mp3" );

    // The first source finishes after it was superseded
    script.finish_load( 0, 99.0 );
    transport.pump();
    assert_eq!( transport.status(), PlaybackStatus::Loading );
    assert_eq!( transport.duration(), 0.0 );
    assert_eq!( transport.source(), Some( Path::new( "b.mp3" ) ) );

    script.finish_load( 1, 240.0 );
    transport.pump();
    assert_eq!( transport.status(), PlaybackStatus::Playing );
    assert_eq!( transport.duration(), 240.0 );

    let calls = script.calls();
    let dispose_at = calls.iter().position( |c| *c == Call::Dispose ).unwrap();
    let second_load_at = calls.iter().position( |c| *c == Call::Load( PathBuf::from( "b.mp3" ) ) ).unwrap();
    assert!( dispose_at < second_load_at );
}


#[test]
fn test_load_error_returns_to_idle() {
    let ( mut transport, script ) = controller();

    transport.open( "broken.ogg" );
    script.emit( 0, EngineEvent::LoadError { reason: "Unsupported format".into() } );
    let errors = transport.pump();

    assert_eq!( errors, vec![ TransportError::Load( "Unsupported format".into() ) ] );
    assert_eq!( transport.status(), PlaybackStatus::Idle );
    assert_eq!( transport.source(), None );
    assert!( script.calls().contains( &Call::Dispose ) );
}


#[test]
fn test_stale_load_error_is_ignored() {
    let ( mut transport, script ) = controller();

    transport.open( "a.mp3" );
    transport.open( "b.mp3" );

    script.emit( 0, EngineEvent::LoadError { reason: "truncated header".into() } );
    assert!( transport.pump().is_empty() );
    assert_eq!( transport.status(), PlaybackStatus::Loading );
    assert_eq!( transport.source(), Some( Path::new( "b.mp3" ) ) );

    script.finish_load( 1, 120.0 );
    assert!( transport.pump().is_empty() );
    assert_eq!( transport.status(), PlaybackStatus::Playing );
}


#[test]
fn test_superseded_session_events_are_ignored() {
    let ( mut transport, script ) = playing_controller();

    transport.open( "b.mp3" );
    script.clear_calls();

    script.emit( 0, EngineEvent::Playing );
    script.emit( 0, EngineEvent::Seeked { position: 77.0 } );
    script.emit( 0, EngineEvent::Fault { reason: "device lost".into() } );
    assert!( transport.pump().is_empty() );

    assert_eq!( transport.status(), PlaybackStatus::Loading );
    assert_eq!( transport.position().current_seconds, 0.0 );
    assert!( !transport.is_polling() );
    assert!( script.calls().is_empty() );

    script.finish_load( 1, 90.0 );
    transport.pump();
    assert_eq!( transport.status(), PlaybackStatus::Playing );
    assert_eq!( transport.duration(), 90.0 );
}


#[test]
fn test_commands_rejected_outside_their_states() {
    let ( mut transport, _script ) = controller();

    assert_eq!(
        transport.play(),
        Err( TransportError::InvalidCommand { command: "play", status: PlaybackStatus::Idle } )
    );
    assert!( transport.pause().is_err() );
    assert!( transport.stop().is_err() );
    assert!( transport.seek_to( 10.0 ).is_err() );
    assert!( transport.seek_drag_start( 10.0 ).is_err() );
    assert!( transport.seek_drag_move( 10.0 ).is_err() );
    assert!( transport.seek_drag_end().is_err() );

    transport.open( "track.flac" );
    assert!( transport.seek_drag_start( 1.0 ).is_err() );
    assert_eq!( transport.status(), PlaybackStatus::Loading );
}


#[test]
fn test_poller_tracks_engine_until_pause() {
    let ( mut transport, script ) = playing_controller();

    let mut samples = Vec::new();
    let mut clock = 0.0;
    while clock < 180.0 {
        script.clock.set( clock );
        if let Some( position ) = transport.on_frame() {
            samples.push( position );
        }
        clock += 1.0 / 60.0;
    }

    assert!( samples.len() > 10_000 );
    assert!( samples.windows( 2 ).all( |w| w[ 0 ] <= w[ 1 ] ) );
    assert!( samples.iter().all( |p| ( 0.0..=180.0 ).contains( p ) ) );

    transport.pause().unwrap();
    transport.pump();
    assert_eq!( transport.status(), PlaybackStatus::Paused );
    assert!( !transport.is_polling() );

    script.clock.set( 179.5 );
    assert_eq!( transport.on_frame(), None );
}


#[test]
fn test_drag_owns_the_playhead() {
    let ( mut transport, script ) = playing_controller();
    script.clock.set( 12.0 );
    transport.on_frame();

    transport.seek_drag_start( 30.0 ).unwrap();
    transport.pump();
    assert_eq!( transport.status(), PlaybackStatus::Paused );
    assert!( transport.position().user_driven );
    assert_eq!( transport.position().current_seconds, 30.0 );
    assert_eq!( transport.on_frame(), None );

    transport.seek_drag_move( 45.0 ).unwrap();
    transport.pump();
    assert_eq!( transport.position().current_seconds, 45.0 );

    // Engine reports during the drag do not move the playhead
    script.emit( 0, EngineEvent::Seeked { position: 44.2 } );
    transport.pump();
    assert_eq!( transport.position().current_seconds, 45.0 );

    transport.seek_drag_end().unwrap();
    transport.pump();
    assert_eq!( transport.status(), PlaybackStatus::Playing );
    assert!( !transport.position().user_driven );
    assert!( transport.is_polling() );
    assert_eq!( transport.on_frame(), Some( 45.0 ) );

    assert_eq!(
        script.calls(),
        vec![ Call::Pause, Call::Seek( 30.0 ), Call::Seek( 45.0 ), Call::Play ]
    );
}


#[test]
fn test_drag_past_the_end_is_dropped() {
    let ( mut transport, script ) = playing_controller();

    transport.seek_drag_start( 170.0 ).unwrap();
    transport.seek_drag_move( 200.0 ).unwrap();
    transport.seek_drag_move( -3.0 ).unwrap();

    assert_eq!( transport.position().current_seconds, 170.0 );
    assert_eq!( script.calls(), vec![ Call::Pause, Call::Seek( 170.0 ) ] );
}


#[test]
fn test_transport_intents_rejected_during_drag() {
    let ( mut transport, script ) = playing_controller();

    transport.seek_drag_start( 30.0 ).unwrap();
    transport.pump();
    assert_eq!( transport.status(), PlaybackStatus::Paused );

    let rejected = TransportError::InvalidCommand { command: "play", status: PlaybackStatus::Paused };
    assert_eq!( transport.play(), Err( rejected ) );
    assert!( matches!( transport.pause(), Err( TransportError::InvalidCommand { command: "pause", .. } ) ) );
    assert!( matches!( transport.stop(), Err( TransportError::InvalidCommand { command: "stop", .. } ) ) );
    transport.pump();

    assert_eq!( transport.status(), PlaybackStatus::Paused );
    assert!( transport.position().user_driven );
    assert_eq!( transport.position().current_seconds, 30.0 );
    assert_eq!( script.calls(), vec![ Call::Pause, Call::Seek( 30.0 ) ] );

    transport.seek_drag_end().unwrap();
    transport.pump();
    assert_eq!( transport.status(), PlaybackStatus::Playing );
    assert!( transport.stop().is_ok() );
}


#[test]
fn test_seek_while_paused_updates_position() {
    let ( mut transport, _script ) = playing_controller();
    transport.pause().unwrap();
    transport.pump();

    transport.seek_to( 500.0 ).unwrap();
    transport.pump();

    assert_eq!( transport.status(), PlaybackStatus::Paused );
    assert_eq!( transport.position().current_seconds, 180.0 );
}


#[test]
fn test_stop_rewinds_and_replays_without_reloading() {
    let ( mut transport, script ) = playing_controller();
    script.clock.set( 60.0 );
    transport.on_frame();

    transport.stop().unwrap();
    transport.pump();
    assert_eq!( transport.status(), PlaybackStatus::Stopped );
    assert_eq!( transport.position().current_seconds, 0.0 );
    assert!( !transport.is_polling() );

    transport.play().unwrap();
    transport.pump();
    assert_eq!( transport.status(), PlaybackStatus::Playing );
    assert_eq!( script.calls(), vec![ Call::Stop, Call::Seek( 0.0 ), Call::Play ] );
}


#[test]
fn test_end_of_track_stops() {
    let ( mut transport, script ) = playing_controller();

    script.emit( 0, EngineEvent::Ended );
    transport.pump();

    assert_eq!( transport.status(), PlaybackStatus::Stopped );
    assert!( !transport.is_polling() );
    assert!( transport.play().is_ok() );
}


#[test]
fn test_volume_applies_without_status_change() {
    let ( mut transport, script ) = playing_controller();

    transport.volume_changed( 55 );

    assert_eq!( transport.volume().percent(), 55 );
    assert_eq!( transport.status(), PlaybackStatus::Playing );
    assert_eq!( script.calls(), vec![ Call::Volume( 55 ) ] );

    // Remembered for the next session
    script.clear_calls();
    transport.open( "next.flac" );
    assert!( script.calls().contains( &Call::Volume( 55 ) ) );
}


#[test]
fn test_volume_while_idle_is_kept() {
    let ( mut transport, _script ) = controller();

    transport.volume_changed( 250 );

    assert_eq!( transport.volume().percent(), 100 );
    assert_eq!( transport.snapshot().volume_percent, 100 );
}


#[test]
fn test_fault_releases_engine() {
    let ( mut transport, script ) = playing_controller();

    script.emit( 0, EngineEvent::Fault { reason: "device lost".into() } );
    let errors = transport.pump();

    assert_eq!( errors, vec![ TransportError::EngineFault( "device lost".into() ) ] );
    assert_eq!( transport.status(), PlaybackStatus::Stopped );
    assert_eq!( script.calls(), vec![ Call::Dispose ] );
    assert!( transport.play().is_err() );
}


#[test]
fn test_drop_disposes_engine() {
    let ( transport, script ) = playing_controller();

    drop( transport );

    assert_eq!( script.calls(), vec![ Call::Dispose ] );
}


#[test]
fn test_snapshot_reflects_state() {
    let ( mut transport, script ) = playing_controller();
    script.clock.set( 42.0 );
    transport.on_frame();

    let snapshot = transport.snapshot();
    assert_eq!( snapshot.status, PlaybackStatus::Playing );
    assert_eq!( snapshot.duration_seconds, 180.0 );
    assert_eq!( snapshot.current_seconds, 42.0 );
    assert_eq!( snapshot.volume_percent, 20 );
    assert!( !snapshot.user_driven );
    assert_eq!( snapshot.source, Some( PathBuf::from( "track.flac" ) ) );
}
