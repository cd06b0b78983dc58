//! Command-line argument parsing for Tinged.

use std::path::PathBuf;

use clap::Parser;


/// Tinged - A terminal audio player with a draggable transport.
#[derive( Parser, Debug )]
#[command( name = "tinged" )]
#[command( version, about, long_about = None )]
pub struct Args {
    /// Audio file to open on startup.
    pub file: Option<PathBuf>,

    /// Initial volume (0-100), overriding the saved setting.
    #[arg( short, long, value_parser = clap::value_parser!( u32 ).range( 0..=100 ) )]
    pub volume: Option<u32>,

    /// Log filter, e.g. "debug" or "tinged_core=trace". RUST_LOG takes precedence.
    #[arg( long )]
    pub log_level: Option<String>,
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_parse_file_and_volume() {
        let args = Args::try_parse_from([ "tinged", "--volume", "55", "song.flac" ]).unwrap();
        assert_eq!( args.file, Some( PathBuf::from( "song.flac" ) ) );
        assert_eq!( args.volume, Some( 55 ) );
        assert_eq!( args.log_level, None );
    }


    #[test]
    fn test_volume_out_of_range_is_rejected() {
        assert!( Args::try_parse_from([ "tinged", "-v", "150" ]).is_err() );
    }
}
