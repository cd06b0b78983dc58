//! Audio decoding via Symphonia
//!
//! Probes a source file, decodes it packet by packet into interleaved f32
//! PCM, and seeks accurately, reporting where the demuxer actually landed.

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{ Decoder as SymphoniaDecoder, DecoderOptions, CODEC_TYPE_NULL };
use symphonia::core::formats::{ FormatOptions, FormatReader, SeekMode, SeekTo };
use symphonia::core::io::{ MediaSourceStream, MediaSourceStreamOptions };
use symphonia::core::meta::{ MetadataOptions, StandardTagKey, Tag };
use symphonia::core::probe::{ Hint, ProbedMetadata };
use symphonia::core::units::{ Time, TimeBase };
use thiserror::Error;


/// Descriptive tags and stream facts for display.
#[derive( Debug, Clone, Default, PartialEq )]
pub struct AudioMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub codec: Option<String>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u32>,
    pub duration_secs: Option<f64>,
}


/// Errors that can occur during decoding.
#[derive( Debug, Error )]
pub enum DecoderError {
    #[error( "Failed to open file: {0}" )]
    FileOpen( #[from] std::io::Error ),

    #[error( "Unsupported format" )]
    UnsupportedFormat,

    #[error( "No audio tracks found" )]
    NoAudioTrack,

    #[error( "Decoder creation failed: {0}" )]
    DecoderCreation( String ),

    #[error( "Decode error: {0}" )]
    Decode( String ),

    #[error( "Seek error: {0}" )]
    Seek( String ),
}


/// Audio decoder wrapper around Symphonia.
pub struct Decoder {
    format_reader: Box<dyn FormatReader>,
    decoder: Box<dyn SymphoniaDecoder>,
    track_id: u32,
    sample_rate: u32,
    channels: usize,
    time_base: Option<TimeBase>,
    sample_buf: Option<SampleBuffer<f32>>,
    duration: Option<f64>,
    probe_metadata: ProbedMetadata,
}


impl Decoder {
    /// Opens and probes an audio file.
    pub fn open( path: &Path ) -> Result<Self, DecoderError> {
        let file = File::open( path )?;
        let mss = MediaSourceStream::new(
            Box::new( file ),
            MediaSourceStreamOptions { buffer_len: 64 * 1024 },
        );

        // Extension is only a hint; the probe still sniffs the content
        let mut hint = Hint::new();
        if let Some( ext ) = path.extension().and_then( |e| e.to_str() ) {
            hint.with_extension( ext );
        }

        let probed = symphonia::default::get_probe()
            .format( &hint, mss, &FormatOptions::default(), &MetadataOptions::default() )
            .map_err( |_| DecoderError::UnsupportedFormat )?;

        let probe_metadata = probed.metadata;
        let format_reader = probed.format;

        let track = format_reader
            .tracks()
            .iter()
            .find( |t| t.codec_params.codec != CODEC_TYPE_NULL )
            .ok_or( DecoderError::NoAudioTrack )?;

        let track_id = track.id;
        let codec_params = &track.codec_params;

        let sample_rate = codec_params.sample_rate.unwrap_or( 44100 );
        let channels = codec_params.channels.map( |c| c.count() ).unwrap_or( 2 );
        let time_base = codec_params.time_base;

        let duration = codec_params.n_frames.map( |frames| {
            frames as f64 / sample_rate as f64
        });

        tracing::info!(
            "Opened audio: {} Hz, {} channels, duration: {:?}s",
            sample_rate,
            channels,
            duration
        );

        let decoder = symphonia::default::get_codecs()
            .make( codec_params, &DecoderOptions::default() )
            .map_err( |e| DecoderError::DecoderCreation( e.to_string() ) )?;

        Ok( Self {
            format_reader,
            decoder,
            track_id,
            sample_rate,
            channels,
            time_base,
            sample_buf: None,
            duration,
            probe_metadata,
        })
    }


    pub fn sample_rate( &self ) -> u32 {
        self.sample_rate
    }


    pub fn channels( &self ) -> usize {
        self.channels
    }


    /// Returns the duration in seconds, if the container declares it.
    pub fn duration( &self ) -> Option<f64> {
        self.duration
    }


    /// Collects tags from the probe and the container, first value wins.
    pub fn metadata( &mut self ) -> AudioMetadata {
        let mut meta = AudioMetadata {
            sample_rate: Some( self.sample_rate ),
            channels: Some( self.channels as u32 ),
            duration_secs: self.duration,
            ..AudioMetadata::default()
        };

        if let Some( metadata_log ) = self.probe_metadata.get() {
            if let Some( revision ) = metadata_log.current() {
                apply_tags( &mut meta, revision.tags() );
            }
        }

        if let Some( revision ) = self.format_reader.metadata().current() {
            apply_tags( &mut meta, revision.tags() );
        }

        if let Some( track ) = self.format_reader.tracks().iter().find( |t| t.id == self.track_id ) {
            meta.codec = Some( format!( "{:?}", track.codec_params.codec ).replace( "CODEC_TYPE_", "" ) );
        }

        meta
    }


    /// Decodes the next packet of the selected track into interleaved samples.
    ///
    /// Returns `None` at end of stream. Corrupt packets are skipped.
    pub fn decode_next( &mut self ) -> Result<Option<Vec<f32>>, DecoderError> {
        loop {
            let packet = match self.format_reader.next_packet() {
                Ok( packet ) => packet,
                Err( symphonia::core::errors::Error::IoError( ref e ) )
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok( None );
                }
                Err( e ) => return Err( DecoderError::Decode( e.to_string() ) ),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode( &packet ) {
                Ok( decoded ) => decoded,
                Err( symphonia::core::errors::Error::DecodeError( _ ) ) => continue,
                Err( e ) => return Err( DecoderError::Decode( e.to_string() ) ),
            };

            let spec = *decoded.spec();
            let num_frames = decoded.frames();

            let required = num_frames * spec.channels.count();
            if self.sample_buf.as_ref().map_or( true, |buf| buf.capacity() < required ) {
                self.sample_buf = Some( SampleBuffer::new( num_frames as u64, spec ) );
            }

            if let Some( sample_buf ) = self.sample_buf.as_mut() {
                sample_buf.copy_interleaved_ref( decoded );
                return Ok( Some( sample_buf.samples().to_vec() ) );
            }
        }
    }


    /// Seeks to `position_secs` and returns the position actually reached.
    pub fn seek( &mut self, position_secs: f64 ) -> Result<f64, DecoderError> {
        let seek_to = SeekTo::Time {
            time: Time::from( position_secs.max( 0.0 ) ),
            track_id: Some( self.track_id ),
        };

        let seeked = self.format_reader
            .seek( SeekMode::Accurate, seek_to )
            .map_err( |e| DecoderError::Seek( e.to_string() ) )?;

        self.decoder.reset();

        Ok( self.ts_to_secs( seeked.actual_ts ) )
    }


    fn ts_to_secs( &self, ts: u64 ) -> f64 {
        match self.time_base {
            Some( tb ) => {
                let time = tb.calc_time( ts );
                time.seconds as f64 + time.frac
            }
            None => ts as f64 / self.sample_rate as f64,
        }
    }
}


/// Reads display metadata from a file without starting playback.
pub fn probe_metadata( path: &Path ) -> Result<AudioMetadata, DecoderError> {
    let mut decoder = Decoder::open( path )?;
    Ok( decoder.metadata() )
}


fn apply_tags( meta: &mut AudioMetadata, tags: &[Tag] ) {
    for tag in tags {
        let slot = match tag.std_key {
            Some( StandardTagKey::TrackTitle ) => &mut meta.title,
            Some( StandardTagKey::Artist ) => &mut meta.artist,
            Some( StandardTagKey::Album ) => &mut meta.album,
            _ => continue,
        };
        if slot.is_none() {
            *slot = Some( tag.value.to_string() );
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_open_missing_file_is_io_error() {
        let result = Decoder::open( Path::new( "/definitely/not/here.flac" ) );
        assert!( matches!( result, Err( DecoderError::FileOpen( _ ) ) ) );
    }


    #[test]
    fn test_open_garbage_is_unsupported() {
        let path = std::env::temp_dir().join( format!( "tinged-garbage-{}.mp3", std::process::id() ) );
        std::fs::write( &path, b"this is not audio at all" ).unwrap();

        let result = Decoder::open( &path );
        let _ = std::fs::remove_file( &path );

        assert!( matches!( result, Err( DecoderError::UnsupportedFormat ) ) );
    }
}
