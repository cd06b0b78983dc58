//! Application settings management
//!
//! Persists the output level and the shell's timing preferences between runs.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{ Deserialize, Serialize };

use tinged_core::transport::DEFAULT_VOLUME;


/// Application settings.
#[derive( Debug, Clone, PartialEq, Serialize, Deserialize )]
#[serde( default )]
pub struct Settings {
    /// Output level in percent, restored on startup
    pub volume: u32,

    /// Delay between rendered frames in milliseconds
    pub frame_interval_ms: u64,

    /// Seconds moved by the arrow keys
    pub seek_step_secs: u64,

    /// Log filter used when RUST_LOG is unset
    pub log_level: String,
}


impl Default for Settings {
    fn default() -> Self {
        Self {
            volume: u32::from( DEFAULT_VOLUME ),
            frame_interval_ms: 16,
            seek_step_secs: 5,
            log_level: "info".to_string(),
        }
    }
}


impl Settings {
    /// Returns the path to the settings file.
    fn settings_path() -> Option<PathBuf> {
        dirs::config_dir().map( |p| p.join( "tinged" ).join( "settings.json" ) )
    }


    /// Loads settings from disk, or returns defaults if not found.
    pub fn load() -> Self {
        let path = match Self::settings_path() {
            Some( p ) => p,
            None => return Self::default(),
        };

        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string( &path ) {
            Ok( contents ) => Self::from_json( &contents ),
            Err( e ) => {
                tracing::warn!( "Failed to read settings: {}", e );
                Self::default()
            }
        }
    }


    /// Parses settings, falling back to defaults on malformed input.
    fn from_json( contents: &str ) -> Self {
        serde_json::from_str( contents ).unwrap_or_else( |e| {
            tracing::warn!( "Ignoring malformed settings: {}", e );
            Self::default()
        })
    }


    /// Saves settings to disk.
    pub fn save( &self ) {
        let path = match Self::settings_path() {
            Some( p ) => p,
            None => return,
        };

        if let Some( parent ) = path.parent() {
            if !parent.exists() {
                if let Err( e ) = fs::create_dir_all( parent ) {
                    tracing::warn!( "Failed to create settings directory: {}", e );
                    return;
                }
            }
        }

        match serde_json::to_string_pretty( self ) {
            Ok( json ) => {
                if let Err( e ) = fs::write( &path, json ) {
                    tracing::warn!( "Failed to save settings: {}", e );
                }
            }
            Err( e ) => {
                tracing::warn!( "Failed to serialize settings: {}", e );
            }
        }
    }


    /// Frame cadence for input polling, position sampling and redraws.
    pub fn frame_interval( &self ) -> Duration {
        Duration::from_millis( self.frame_interval_ms.max( 1 ) )
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_missing_fields_use_defaults() {
        let settings = Settings::from_json( r#"{ "volume": 55 }"# );
        assert_eq!( settings.volume, 55 );
        assert_eq!( settings.frame_interval_ms, 16 );
        assert_eq!( settings.seek_step_secs, 5 );
        assert_eq!( settings.log_level, "info" );
    }


    #[test]
    fn test_malformed_file_falls_back() {
        assert_eq!( Settings::from_json( "{ not json" ), Settings::default() );
    }


    #[test]
    fn test_zero_interval_is_clamped() {
        let settings = Settings { frame_interval_ms: 0, ..Settings::default() };
        assert_eq!( settings.frame_interval(), Duration::from_millis( 1 ) );
    }
}
