//! Slash command parsing.
//!
//! Commands typed after `/` in the shell are parsed here and then executed
//! against the transport controller.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;


/// Errors that can occur during command parsing or execution.
#[derive( Debug, Error )]
pub enum CommandError {
    #[error( "Unknown command: {0}" )]
    Unknown( String ),

    #[error( "Invalid argument: {0}" )]
    InvalidArgument( String ),

    #[error( "Missing argument: {0}" )]
    MissingArgument( String ),
}


/// Parsed slash command.
#[derive( Debug, Clone, PartialEq )]
pub enum Command {
    Open { path: PathBuf },
    Play,
    Pause,
    Stop,
    Seek { position: Duration },
    Volume { level: u32 },
    Help,
    Quit,
}


impl FromStr for Command {
    type Err = CommandError;


    fn from_str( s: &str ) -> Result<Self, Self::Err> {
        Command::parse( s )
    }
}


impl Command {
    /// Parses a command string (without the leading `/`).
    pub fn parse( input: &str ) -> Result<Self, CommandError> {
        let input = input.trim();
        let mut parts = input.splitn( 2, ' ' );
        let cmd = parts.next().unwrap_or( "" ).to_lowercase();
        let args = parts.next().map( |s| s.trim() ).filter( |s| !s.is_empty() );

        match cmd.as_str() {
            "open" | "o" => {
                let path = args
                    .ok_or_else( || CommandError::MissingArgument( "path".into() ) )?;
                Ok( Command::Open { path: PathBuf::from( path ) } )
            }
            "play" | "p" => Ok( Command::Play ),
            "pause" | "pa" => Ok( Command::Pause ),
            "stop" | "st" => Ok( Command::Stop ),
            "seek" | "sk" => {
                let time_str = args
                    .ok_or_else( || CommandError::MissingArgument( "time position".into() ) )?;
                let position = parse_time( time_str )?;
                Ok( Command::Seek { position } )
            }
            "vol" | "volume" => {
                let level = args
                    .ok_or_else( || CommandError::MissingArgument( "volume level".into() ) )?;
                let level: u32 = level.parse()
                    .map_err( |_| CommandError::InvalidArgument( format!( "Invalid volume: {}", level ) ) )?;
                if level > 100 {
                    return Err( CommandError::InvalidArgument( format!( "Volume out of range: {}", level ) ) );
                }
                Ok( Command::Volume { level } )
            }
            "help" | "h" => Ok( Command::Help ),
            "quit" | "q" | "exit" => Ok( Command::Quit ),

            "" => Err( CommandError::Unknown( "empty command".into() ) ),
            other => Err( CommandError::Unknown( other.to_string() ) ),
        }
    }
}


/// Parses a time string like "1:30" or "90" into a Duration.
fn parse_time( s: &str ) -> Result<Duration, CommandError> {
    let s = s.trim();

    if let Some(( min, sec )) = s.split_once( ':' ) {
        let minutes: u64 = min.parse()
            .map_err( |_| CommandError::InvalidArgument( format!( "Invalid minutes: {}", min ) ) )?;
        let seconds: u64 = sec.parse()
            .map_err( |_| CommandError::InvalidArgument( format!( "Invalid seconds: {}", sec ) ) )?;
        Ok( Duration::from_secs( minutes * 60 + seconds ) )
    } else {
        let seconds: u64 = s.parse()
            .map_err( |_| CommandError::InvalidArgument( format!( "Invalid time: {}", s ) ) )?;
        Ok( Duration::from_secs( seconds ) )
    }
}


/// Formats seconds as `M:SS`, or `H:MM:SS` past the hour.
pub fn format_time( seconds: f64 ) -> String {
    let total = if seconds.is_finite() { seconds.max( 0.0 ) as u64 } else { 0 };
    let ( hours, minutes, secs ) = ( total / 3600, ( total / 60 ) % 60, total % 60 );

    if hours > 0 {
        format!( "{}:{:02}:{:02}", hours, minutes, secs )
    } else {
        format!( "{}:{:02}", minutes, secs )
    }
}


/// Returns help text listing all available commands.
pub fn help_text() -> &'static str {
    r#"Commands:
  /open <path>    Open an audio file
  /play           Resume playback        [space]
  /pause          Pause playback         [space]
  /stop           Stop and rewind        [s]
  /seek <time>    Seek to position (e.g., 1:30)   [←/→]
  /vol <0-100>    Set volume             [+/-]
  /help           Show this help         [?]
  /quit           Exit tinged            [q]

In the command bar, ↑/↓ recall earlier commands.

Mouse:
  Drag the seek bar to scrub, drag the volume bar to adjust."#
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_parse_open() {
        let cmd = Command::parse( "open /path/to/file.mp3" ).unwrap();
        assert_eq!( cmd, Command::Open { path: PathBuf::from( "/path/to/file.mp3" ) } );
    }


    #[test]
    fn test_parse_open_keeps_spaces_in_path() {
        let cmd: Command = "o  /music/Some Album/01 Intro.flac ".parse().unwrap();
        assert_eq!( cmd, Command::Open { path: PathBuf::from( "/music/Some Album/01 Intro.flac" ) } );
    }


    #[test]
    fn test_parse_seek() {
        let cmd = Command::parse( "seek 1:30" ).unwrap();
        assert_eq!( cmd, Command::Seek { position: Duration::from_secs( 90 ) } );
    }


    #[test]
    fn test_parse_seek_seconds() {
        let cmd = Command::parse( "sk 45" ).unwrap();
        assert_eq!( cmd, Command::Seek { position: Duration::from_secs( 45 ) } );
    }


    #[test]
    fn test_parse_seek_rejects_garbage() {
        let result = Command::parse( "seek 1:xx" );
        assert!( matches!( result, Err( CommandError::InvalidArgument( _ ) ) ) );
    }


    #[test]
    fn test_parse_volume() {
        assert_eq!( Command::parse( "vol 55" ).unwrap(), Command::Volume { level: 55 } );
        assert!( matches!( Command::parse( "vol 101" ), Err( CommandError::InvalidArgument( _ ) ) ) );
        assert!( matches!( Command::parse( "volume" ), Err( CommandError::MissingArgument( _ ) ) ) );
    }


    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!( Command::parse( "PAUSE" ).unwrap(), Command::Pause );
        assert_eq!( Command::parse( "Quit" ).unwrap(), Command::Quit );
    }


    #[test]
    fn test_parse_unknown() {
        let result = Command::parse( "shuffle" );
        assert!( matches!( result, Err( CommandError::Unknown( _ ) ) ) );
    }


    #[test]
    fn test_parse_missing_arg() {
        let result = Command::parse( "open" );
        assert!( matches!( result, Err( CommandError::MissingArgument( _ ) ) ) );
    }


    #[test]
    fn test_format_time() {
        assert_eq!( format_time( 0.0 ), "0:00" );
        assert_eq!( format_time( 59.9 ), "0:59" );
        assert_eq!( format_time( 180.0 ), "3:00" );
        assert_eq!( format_time( 3725.0 ), "1:02:05" );
        assert_eq!( format_time( f64::NAN ), "0:00" );
    }
}
