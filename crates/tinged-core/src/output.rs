//! Audio output via cpal
//!
//! The decode side pushes interleaved PCM into a [`SampleBuffer`]; the cpal
//! callback pulls from it, converting the channel layout and applying gain.

use std::collections::VecDeque;
use std::sync::atomic::{ AtomicBool, AtomicU32, Ordering };
use std::sync::{ Arc, Mutex, MutexGuard, PoisonError };

use cpal::traits::{ DeviceTrait, HostTrait, StreamTrait };
use thiserror::Error;


/// Errors that can occur with audio output.
#[derive( Debug, Error )]
pub enum OutputError {
    #[error( "No output device available" )]
    NoDevice,

    #[error( "Failed to get default stream config: {0}" )]
    StreamConfig( String ),

    #[error( "Failed to build output stream: {0}" )]
    BuildStream( String ),

    #[error( "Failed to play stream: {0}" )]
    PlayStream( String ),
}


/// Shared sample queue between the decode side and the audio callback.
pub struct SampleBuffer {
    buffer: Mutex<VecDeque<f32>>,
    capacity: usize,
    paused: AtomicBool,
    /// Linear gain stored as f32 bits
    gain: AtomicU32,
    source_channels: usize,
    output_channels: usize,
}


impl SampleBuffer {
    /// Creates a buffer holding at most `capacity` source samples.
    pub fn new( capacity: usize, source_channels: u16, output_channels: u16 ) -> Self {
        Self {
            buffer: Mutex::new( VecDeque::with_capacity( capacity ) ),
            capacity,
            paused: AtomicBool::new( false ),
            gain: AtomicU32::new( 1.0_f32.to_bits() ),
            source_channels: source_channels.max( 1 ) as usize,
            output_channels: output_channels.max( 1 ) as usize,
        }
    }


    fn queue( &self ) -> MutexGuard<'_, VecDeque<f32>> {
        self.buffer.lock().unwrap_or_else( PoisonError::into_inner )
    }


    /// Appends as many samples as fit. Returns the number accepted.
    pub fn push( &self, samples: &[f32] ) -> usize {
        let mut buf = self.queue();
        let available = self.capacity.saturating_sub( buf.len() );
        let to_push = samples.len().min( available );
        buf.extend( samples[ ..to_push ].iter().copied() );
        to_push
    }


    /// Fills `output` with converted frames, padding with silence.
    ///
    /// Returns the number of output samples carrying audio.
    pub fn pop( &self, output: &mut [f32] ) -> usize {
        output.fill( 0.0 );

        if self.paused.load( Ordering::Relaxed ) {
            return 0;
        }

        let gain = f32::from_bits( self.gain.load( Ordering::Relaxed ) );
        let src_ch = self.source_channels;
        let out_ch = self.output_channels;

        let mut buf = self.queue();
        let frames = ( output.len() / out_ch ).min( buf.len() / src_ch );

        for frame in 0..frames {
            let src = frame * src_ch;
            let dst = frame * out_ch;

            if out_ch == 1 && src_ch > 1 {
                // Mix down to mono
                let sum: f32 = ( 0..src_ch ).map( |c| buf[ src + c ] ).sum();
                output[ dst ] = sum / src_ch as f32;
            } else {
                // Copy matching channels, repeat the last one for extra outputs
                for ch in 0..out_ch {
                    output[ dst + ch ] = buf[ src + ch.min( src_ch - 1 ) ];
                }
            }
        }

        buf.drain( ..frames * src_ch );
        drop( buf );

        let written = frames * out_ch;
        if gain != 1.0 {
            for sample in output[ ..written ].iter_mut() {
                *sample *= gain;
            }
        }

        written
    }


    /// Returns the number of queued samples.
    pub fn len( &self ) -> usize {
        self.queue().len()
    }


    /// Returns true if nothing is queued.
    pub fn is_empty( &self ) -> bool {
        self.queue().is_empty()
    }


    /// Discards everything queued.
    pub fn clear( &self ) {
        self.queue().clear();
    }


    /// Silences the callback without discarding queued audio.
    pub fn set_paused( &self, paused: bool ) {
        self.paused.store( paused, Ordering::Relaxed );
    }


    pub fn is_paused( &self ) -> bool {
        self.paused.load( Ordering::Relaxed )
    }


    /// Sets the linear gain (0.0 = mute, 1.0 = unity).
    pub fn set_gain( &self, gain: f32 ) {
        self.gain.store( gain.max( 0.0 ).to_bits(), Ordering::Relaxed );
    }


    pub fn gain( &self ) -> f32 {
        f32::from_bits( self.gain.load( Ordering::Relaxed ) )
    }
}


/// Open output stream on the default device.
///
/// Not `Send`: keep it on the thread that created it.
pub struct AudioOutput {
    stream: cpal::Stream,
    sample_rate: u32,
    channels: u16,
}


impl AudioOutput {
    /// Opens the default device for the given source format.
    ///
    /// Returns the output and the buffer the caller should feed. The device
    /// configuration is chosen by, in order: exact channel and rate match,
    /// rate match with channel conversion, or the device default.
    pub fn new(
        source_sample_rate: u32,
        source_channels: u16,
    ) -> Result<( Self, Arc<SampleBuffer> ), OutputError> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or( OutputError::NoDevice )?;

        tracing::info!( "Using output device: {:?}", device.name() );

        let supported_configs: Vec<_> = device
            .supported_output_configs()
            .map_err( |e| OutputError::StreamConfig( e.to_string() ) )?
            .collect();

        let supports_rate = |c: &cpal::SupportedStreamConfigRange| {
            c.min_sample_rate().0 <= source_sample_rate
                && c.max_sample_rate().0 >= source_sample_rate
        };

        let config = if let Some( supported ) = supported_configs
            .iter()
            .find( |c| c.channels() == source_channels && supports_rate( *c ) )
        {
            supported.clone()
                .with_sample_rate( cpal::SampleRate( source_sample_rate ) )
                .config()
        } else if let Some( supported ) = supported_configs.iter().find( |c| supports_rate( *c ) ) {
            tracing::info!(
                "Channel conversion: file has {} channels, device using {} channels",
                source_channels,
                supported.channels()
            );
            supported.clone()
                .with_sample_rate( cpal::SampleRate( source_sample_rate ) )
                .config()
        } else {
            let default_config = device
                .default_output_config()
                .map_err( |e| OutputError::StreamConfig( e.to_string() ) )?;
            tracing::info!(
                "Device does not support {} Hz, resampling to {} Hz",
                source_sample_rate,
                default_config.sample_rate().0
            );
            default_config.config()
        };

        tracing::info!(
            "Audio output config: {} Hz, {} channels",
            config.sample_rate.0,
            config.channels
        );

        // About half a second of source audio
        let capacity = ( source_sample_rate as usize ) * ( source_channels as usize ) / 2;
        let sample_buffer = Arc::new( SampleBuffer::new( capacity, source_channels, config.channels ) );
        let callback_buffer = Arc::clone( &sample_buffer );

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    callback_buffer.pop( data );
                },
                |err| {
                    tracing::error!( "Audio output error: {}", err );
                },
                None,
            )
            .map_err( |e| OutputError::BuildStream( e.to_string() ) )?;

        Ok((
            Self {
                stream,
                sample_rate: config.sample_rate.0,
                channels: config.channels,
            },
            sample_buffer,
        ))
    }


    /// Starts the device callback.
    pub fn play( &self ) -> Result<(), OutputError> {
        self.stream
            .play()
            .map_err( |e| OutputError::PlayStream( e.to_string() ) )
    }


    /// Returns the device sample rate.
    pub fn sample_rate( &self ) -> u32 {
        self.sample_rate
    }


    /// Returns the device channel count.
    pub fn channels( &self ) -> u16 {
        self.channels
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_mono_is_duplicated_to_stereo() {
        let buffer = SampleBuffer::new( 16, 1, 2 );
        buffer.push( &[ 0.1, 0.2 ] );

        let mut out = [ 9.0; 6 ];
        let written = buffer.pop( &mut out );

        assert_eq!( written, 4 );
        assert_eq!( out, [ 0.1, 0.1, 0.2, 0.2, 0.0, 0.0 ] );
        assert!( buffer.is_empty() );
    }


    #[test]
    fn test_stereo_is_mixed_to_mono() {
        let buffer = SampleBuffer::new( 16, 2, 1 );
        buffer.push( &[ 0.2, 0.4, 1.0, 0.0 ] );

        let mut out = [ 0.0; 2 ];
        buffer.pop( &mut out );

        assert!( ( out[ 0 ] - 0.3 ).abs() < 1e-6 );
        assert!( ( out[ 1 ] - 0.5 ).abs() < 1e-6 );
    }


    #[test]
    fn test_paused_buffer_outputs_silence_and_keeps_audio() {
        let buffer = SampleBuffer::new( 16, 2, 2 );
        buffer.push( &[ 0.5; 4 ] );
        buffer.set_paused( true );

        let mut out = [ 1.0; 4 ];
        assert_eq!( buffer.pop( &mut out ), 0 );
        assert_eq!( out, [ 0.0; 4 ] );
        assert_eq!( buffer.len(), 4 );
    }


    #[test]
    fn test_gain_is_applied() {
        let buffer = SampleBuffer::new( 16, 2, 2 );
        buffer.set_gain( 0.5 );
        buffer.push( &[ 1.0, -1.0 ] );

        let mut out = [ 0.0; 2 ];
        buffer.pop( &mut out );

        assert_eq!( out, [ 0.5, -0.5 ] );
    }


    #[test]
    fn test_push_respects_capacity() {
        let buffer = SampleBuffer::new( 3, 1, 1 );
        assert_eq!( buffer.push( &[ 0.0; 5 ] ), 3 );
        assert_eq!( buffer.push( &[ 0.0; 5 ] ), 0 );

        buffer.clear();
        assert!( buffer.is_empty() );
    }
}
