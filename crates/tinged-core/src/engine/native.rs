//! Native playback engine
//!
//! Each session owns one worker thread holding the decoder, the cpal stream
//! and an optional resampler. Transport commands reach the worker over a
//! channel; the worker applies them and reports the outcome as engine
//! events. Volume and the playback clock are shared through atomics so they
//! can be written and read without a round trip.

use std::path::{ Path, PathBuf };
use std::sync::atomic::{ AtomicU32, AtomicU64, Ordering };
use std::sync::mpsc::{ self, TryRecvError };
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rubato::{ FastFixedOut, PolynomialDegree, Resampler };
use thiserror::Error;

use super::{ AudioBackend, EngineEvent, EngineSession, EventSink };
use crate::decoder::{ Decoder, DecoderError };
use crate::output::{ AudioOutput, OutputError, SampleBuffer };


/// Output chunk size handed to the resampler, in frames.
const RESAMPLE_CHUNK: usize = 1024;

/// Sleep while paused or stopped.
const IDLE_WAIT: Duration = Duration::from_millis( 10 );

/// Sleep while the output buffer is comfortably full.
const FULL_WAIT: Duration = Duration::from_millis( 5 );


/// Errors raised while bringing up a session.
#[derive( Debug, Error )]
pub enum EngineError {
    #[error( transparent )]
    Decoder( #[from] DecoderError ),

    #[error( transparent )]
    Output( #[from] OutputError ),

    #[error( "Failed to create resampler: {0}" )]
    Resampler( String ),
}


enum Command {
    Play,
    Pause,
    Stop,
    Seek( f64 ),
    Shutdown,
}


/// Values shared between a session handle and its worker.
#[derive( Debug )]
struct EngineClock {
    /// Source frames decoded since the start of the track
    frames: AtomicU64,
    sample_rate: AtomicU32,
    /// Output gain as f32 bits
    gain: AtomicU32,
}


impl EngineClock {
    fn new() -> Self {
        Self {
            frames: AtomicU64::new( 0 ),
            sample_rate: AtomicU32::new( 0 ),
            gain: AtomicU32::new( 1.0_f32.to_bits() ),
        }
    }


    fn seconds( &self ) -> f64 {
        let rate = self.sample_rate.load( Ordering::Relaxed );
        if rate == 0 {
            return 0.0;
        }
        self.frames.load( Ordering::Relaxed ) as f64 / rate as f64
    }


    fn set_seconds( &self, seconds: f64 ) {
        let rate = self.sample_rate.load( Ordering::Relaxed ) as f64;
        self.frames.store( ( seconds.max( 0.0 ) * rate ) as u64, Ordering::Relaxed );
    }


    fn gain( &self ) -> f32 {
        f32::from_bits( self.gain.load( Ordering::Relaxed ) )
    }
}


/// Backend that plays files on the default output device.
#[derive( Debug, Default )]
pub struct NativeBackend;


impl NativeBackend {
    pub fn new() -> Self {
        Self
    }
}


impl AudioBackend for NativeBackend {
    type Session = NativeSession;


    fn load( &mut self, source: &Path, events: EventSink ) -> NativeSession {
        let ( commands, inbox ) = mpsc::channel();
        let clock = Arc::new( EngineClock::new() );

        let path = source.to_path_buf();
        let worker_clock = Arc::clone( &clock );
        let generation = events.generation();
        let fallback = events.clone();

        let spawned = thread::Builder::new()
            .name( format!( "tinged-engine-{}", generation.value() ) )
            .spawn( move || run_worker( path, events, inbox, worker_clock ) );

        let worker = match spawned {
            Ok( handle ) => Some( handle ),
            Err( e ) => {
                report_spawn_failure( &fallback, &e );
                None
            }
        };

        NativeSession {
            commands: Some( commands ),
            worker,
            clock,
        }
    }
}


/// A session whose worker never started still owes the controller a completion.
fn report_spawn_failure( events: &EventSink, error: &std::io::Error ) {
    tracing::error!( "Failed to spawn engine thread: {}", error );
    events.emit( EngineEvent::LoadError { reason: format!( "engine thread failed to start: {}", error ) } );
}


/// Handle to one running engine worker.
pub struct NativeSession {
    commands: Option<mpsc::Sender<Command>>,
    worker: Option<thread::JoinHandle<()>>,
    clock: Arc<EngineClock>,
}


impl NativeSession {
    fn send( &self, command: Command ) {
        let delivered = self.commands
            .as_ref()
            .map( |tx| tx.send( command ).is_ok() )
            .unwrap_or( false );
        if !delivered {
            tracing::debug!( "Engine command dropped: worker is gone" );
        }
    }
}


impl EngineSession for NativeSession {
    fn play( &mut self ) {
        self.send( Command::Play );
    }


    fn pause( &mut self ) {
        self.send( Command::Pause );
    }


    fn stop( &mut self ) {
        self.send( Command::Stop );
    }


    fn seek( &mut self, seconds: f64 ) {
        self.send( Command::Seek( seconds ) );
    }


    fn set_volume( &mut self, percent: u8 ) {
        let gain = f32::from( percent.min( 100 ) ) / 100.0;
        self.clock.gain.store( gain.to_bits(), Ordering::Relaxed );
    }


    fn current_position( &self ) -> f64 {
        self.clock.seconds()
    }


    fn dispose( &mut self ) {
        if let Some( commands ) = self.commands.take() {
            let _ = commands.send( Command::Shutdown );
        }
        if let Some( worker ) = self.worker.take() {
            if worker.join().is_err() {
                tracing::warn!( "Engine thread panicked during shutdown" );
            }
            tracing::debug!( "Engine session disposed" );
        }
    }
}


impl Drop for NativeSession {
    fn drop( &mut self ) {
        self.dispose();
    }
}


fn run_worker(
    path: PathBuf,
    events: EventSink,
    inbox: mpsc::Receiver<Command>,
    clock: Arc<EngineClock>,
) {
    tracing::info!( "Loading {:?} ({})", path, events.generation() );

    let mut worker = match Worker::open( &path, events.clone(), clock ) {
        Ok( worker ) => worker,
        Err( e ) => {
            tracing::warn!( "Failed to load {:?}: {}", path, e );
            events.emit( EngineEvent::LoadError { reason: e.to_string() } );
            return;
        }
    };

    events.emit( EngineEvent::Loaded { duration: worker.duration } );
    worker.run( inbox );

    tracing::debug!( "Engine worker for {} exiting", events.generation() );
}


/// Converts planar samples to interleaved order.
fn interleave( channels: &[Vec<f32>] ) -> Vec<f32> {
    let frames = channels.first().map( Vec::len ).unwrap_or( 0 );
    let mut out = Vec::with_capacity( frames * channels.len() );
    for f in 0..frames {
        for ch in channels {
            out.push( ch[ f ] );
        }
    }
    out
}


/// Rate converter with its pending planar input.
struct Resample {
    resampler: FastFixedOut<f32>,
    pending: Vec<Vec<f32>>,
}


impl Resample {
    fn new( from: u32, to: u32, channels: usize ) -> Result<Self, EngineError> {
        tracing::info!( "Resampling: {} Hz → {} Hz", from, to );
        let resampler = FastFixedOut::<f32>::new(
            to as f64 / from as f64,
            2.0,
            PolynomialDegree::Cubic,
            RESAMPLE_CHUNK,
            channels,
        ).map_err( |e| EngineError::Resampler( e.to_string() ) )?;

        Ok( Self {
            resampler,
            pending: ( 0..channels ).map( |_| Vec::new() ).collect(),
        })
    }


    fn process( &mut self, interleaved: &[f32] ) -> Vec<f32> {
        let channels = self.pending.len();
        for frame in interleaved.chunks( channels ) {
            for ( ch, sample ) in frame.iter().enumerate() {
                self.pending[ ch ].push( *sample );
            }
        }

        let mut out = Vec::new();
        while self.pending[ 0 ].len() >= self.resampler.input_frames_next() {
            let needed = self.resampler.input_frames_next();
            let chunk: Vec<Vec<f32>> = self.pending
                .iter_mut()
                .map( |ch| ch.drain( ..needed ).collect() )
                .collect();

            match self.resampler.process( &chunk, None ) {
                Ok( resampled ) => out.extend( interleave( &resampled ) ),
                Err( e ) => {
                    tracing::error!( "Resample error: {}", e );
                    break;
                }
            }
        }
        out
    }


    fn flush( &mut self ) -> Vec<f32> {
        if self.pending[ 0 ].is_empty() {
            return Vec::new();
        }
        let result = self.resampler.process_partial( Some( self.pending.as_slice() ), None );
        self.clear();
        match result {
            Ok( resampled ) => interleave( &resampled ),
            Err( e ) => {
                tracing::error!( "Final resample error: {}", e );
                Vec::new()
            }
        }
    }


    fn clear( &mut self ) {
        for ch in self.pending.iter_mut() {
            ch.clear();
        }
        self.resampler.reset();
    }
}


/// State owned by the engine thread.
struct Worker {
    decoder: Decoder,
    // Dropping the output stops the stream
    _output: AudioOutput,
    buffer: Arc<SampleBuffer>,
    resample: Option<Resample>,
    clock: Arc<EngineClock>,
    events: EventSink,
    duration: f64,
    channels: usize,
    playing: bool,
    /// End of stream reached; waiting for the buffer to empty
    draining: bool,
}


impl Worker {
    fn open( path: &Path, events: EventSink, clock: Arc<EngineClock> ) -> Result<Self, EngineError> {
        let decoder = Decoder::open( path )?;

        let source_rate = decoder.sample_rate();
        let channels = decoder.channels();
        let duration = decoder.duration().unwrap_or( 0.0 );

        let ( output, buffer ) = AudioOutput::new( source_rate, channels as u16 )?;
        buffer.set_paused( true );
        buffer.set_gain( clock.gain() );
        output.play()?;

        let resample = if output.sample_rate() != source_rate {
            Some( Resample::new( source_rate, output.sample_rate(), channels )? )
        } else {
            None
        };

        clock.sample_rate.store( source_rate, Ordering::Relaxed );
        clock.frames.store( 0, Ordering::Relaxed );

        Ok( Self {
            decoder,
            _output: output,
            buffer,
            resample,
            clock,
            events,
            duration,
            channels: channels.max( 1 ),
            playing: false,
            draining: false,
        })
    }


    fn run( &mut self, inbox: mpsc::Receiver<Command> ) {
        loop {
            loop {
                match inbox.try_recv() {
                    Ok( Command::Shutdown ) | Err( TryRecvError::Disconnected ) => return,
                    Ok( command ) => self.apply( command ),
                    Err( TryRecvError::Empty ) => break,
                }
            }

            self.buffer.set_gain( self.clock.gain() );

            if !self.playing {
                thread::sleep( IDLE_WAIT );
                continue;
            }

            if self.draining {
                if self.buffer.is_empty() {
                    self.finish_track();
                } else {
                    thread::sleep( IDLE_WAIT );
                }
                continue;
            }

            // Keep roughly 50ms decoded ahead of the device
            let target = ( self.decoder.sample_rate() as usize * self.channels ) / 20;
            if self.buffer.len() > target {
                thread::sleep( FULL_WAIT );
                continue;
            }

            match self.decoder.decode_next() {
                Ok( Some( samples ) ) => {
                    let frames = ( samples.len() / self.channels ) as u64;
                    self.clock.frames.fetch_add( frames, Ordering::Relaxed );
                    let samples = match self.resample.as_mut() {
                        Some( resample ) => resample.process( &samples ),
                        None => samples,
                    };
                    self.push_all( &samples );
                }
                Ok( None ) => {
                    tracing::info!( "Reached end of stream" );
                    if let Some( tail ) = self.resample.as_mut().map( Resample::flush ) {
                        self.push_all( &tail );
                    }
                    self.draining = true;
                }
                Err( e ) => {
                    tracing::error!( "Decode error during playback: {}", e );
                    self.buffer.set_paused( true );
                    self.events.emit( EngineEvent::Fault { reason: e.to_string() } );
                    return;
                }
            }
        }
    }


    fn apply( &mut self, command: Command ) {
        match command {
            Command::Play => {
                self.playing = true;
                self.buffer.set_paused( false );
                self.events.emit( EngineEvent::Playing );
            }
            Command::Pause => {
                if self.playing {
                    self.playing = false;
                    self.buffer.set_paused( true );
                    self.events.emit( EngineEvent::Paused );
                }
            }
            Command::Stop => {
                self.playing = false;
                self.buffer.set_paused( true );
                self.discard_buffered();
                self.events.emit( EngineEvent::Stopped );
            }
            Command::Seek( seconds ) => {
                self.discard_buffered();
                let position = match self.decoder.seek( seconds ) {
                    Ok( actual ) => {
                        self.clock.set_seconds( actual );
                        actual
                    }
                    Err( e ) => {
                        tracing::warn!( "Seek to {:.2}s failed: {}", seconds, e );
                        self.clock.seconds()
                    }
                };
                self.events.emit( EngineEvent::Seeked { position } );
            }
            Command::Shutdown => {}
        }
    }


    /// Reports the natural end of the track and rewinds for a later replay.
    fn finish_track( &mut self ) {
        self.playing = false;
        self.draining = false;
        self.buffer.set_paused( true );
        self.events.emit( EngineEvent::Ended );

        match self.decoder.seek( 0.0 ) {
            Ok( actual ) => self.clock.set_seconds( actual ),
            Err( e ) => tracing::warn!( "Rewind after end of stream failed: {}", e ),
        }
    }


    fn discard_buffered( &mut self ) {
        self.buffer.clear();
        self.draining = false;
        if let Some( resample ) = self.resample.as_mut() {
            resample.clear();
        }
    }


    fn push_all( &self, samples: &[f32] ) {
        let mut offset = 0;
        while offset < samples.len() && !self.buffer.is_paused() {
            let pushed = self.buffer.push( &samples[ offset.. ] );
            offset += pushed;
            if pushed == 0 {
                thread::sleep( FULL_WAIT );
            }
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_interleave_planar_channels() {
        let planar = vec![ vec![ 1.0, 2.0 ], vec![ 10.0, 20.0 ] ];
        assert_eq!( interleave( &planar ), vec![ 1.0, 10.0, 2.0, 20.0 ] );
        assert!( interleave( &[] ).is_empty() );
    }


    #[test]
    fn test_clock_converts_frames_to_seconds() {
        let clock = EngineClock::new();
        assert_eq!( clock.seconds(), 0.0 );

        clock.sample_rate.store( 48_000, Ordering::Relaxed );
        clock.set_seconds( 1.5 );
        assert_eq!( clock.frames.load( Ordering::Relaxed ), 72_000 );
        assert!( ( clock.seconds() - 1.5 ).abs() < 1e-9 );
    }


    #[test]
    fn test_missing_file_reports_load_error() {
        let ( tx, rx ) = mpsc::channel();
        let generation = crate::engine::Generation::default().next();
        let mut backend = NativeBackend::new();

        let mut session = backend.load(
            Path::new( "/no/such/file.ogg" ),
            EventSink::new( generation, tx ),
        );

        let message = rx.recv_timeout( Duration::from_secs( 5 ) ).unwrap();
        assert_eq!( message.generation, generation );
        assert!( matches!( message.event, EngineEvent::LoadError { .. } ) );

        session.dispose();
        session.dispose();
    }


    #[test]
    fn test_spawn_failure_reports_load_error() {
        let ( tx, rx ) = mpsc::channel();
        let generation = crate::engine::Generation::default().next().next();
        let error = std::io::Error::new( std::io::ErrorKind::OutOfMemory, "no threads left" );

        report_spawn_failure( &EventSink::new( generation, tx ), &error );

        let message = rx.try_recv().unwrap();
        assert_eq!( message.generation, generation );
        match message.event {
            EngineEvent::LoadError { reason } => assert!( reason.contains( "no threads left" ) ),
            other => panic!( "unexpected event {:?}", other ),
        }
        assert!( rx.try_recv().is_err() );
    }


    #[test]
    fn test_volume_is_clamped_percent() {
        let mut session = NativeSession {
            commands: None,
            worker: None,
            clock: Arc::new( EngineClock::new() ),
        };

        session.set_volume( 55 );
        assert!( ( session.clock.gain() - 0.55 ).abs() < 1e-6 );

        session.set_volume( 250 );
        assert_eq!( session.clock.gain(), 1.0 );
    }
}
