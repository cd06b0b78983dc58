//! Tinged CLI - Terminal audio player

mod cli;
mod input;
mod settings;
mod view;

use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{ Duration, Instant };

use anyhow::Result;
use clap::Parser;
use crossterm::{
    event::{ self, Event, KeyCode, KeyEventKind, MouseButton, MouseEventKind },
    terminal::{ disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen },
    ExecutableCommand,
};
use ratatui::{
    layout::Alignment,
    prelude::*,
    widgets::{ Block, Borders, Paragraph, Wrap },
};
use tracing_subscriber::EnvFilter;

use cli::Args;
use input::{ CommandLine, KeyFocus };
use settings::Settings;
use view::{ bar_cells, ViewMode };

use tinged_core::{
    command::{ self, format_time },
    decoder::probe_metadata,
    AudioMetadata, Command, NativeBackend, PlaybackStatus, PointerCapture, RangeControl, RangeEvent,
    RangeProps, TrackGeometry, TransportController, TransportError, VolumeLevel,
};


/// Volume change per `+`/`-` press, in percent.
const VOLUME_STEP: i32 = 5;


/// Application state.
struct App {
    transport: TransportController<NativeBackend>,
    should_quit: bool,

    // View state
    view_mode: ViewMode,
    help_scroll: u16,

    // Input state
    focus: KeyFocus,
    command_line: CommandLine,

    // Range controls share one pointer registry
    capture: PointerCapture,
    seek_bar: RangeControl,
    volume_bar: RangeControl,

    /// Value reported by the seek bar just before its drag starts
    pending_seek: Option<f64>,

    metadata: Option<AudioMetadata>,

    // Status message (shown in status bar)
    status_message: Option<String>,
    status_clear_at: Option<Instant>,

    settings: Settings,
}


impl App {
    /// Creates a new App instance.
    fn new( args: &Args, settings: Settings ) -> Result<Self> {
        let volume = VolumeLevel::new( args.volume.unwrap_or( settings.volume ) );
        let transport = TransportController::new( NativeBackend::new(), volume );

        let capture = PointerCapture::new();
        let seek_bar = RangeControl::new( &capture, RangeProps { disabled: true, ..RangeProps::default() } );
        let volume_bar = RangeControl::new( &capture, RangeProps {
            value: f64::from( volume.percent() ),
            ..RangeProps::default()
        });

        let mut app = Self {
            transport,
            should_quit: false,
            view_mode: ViewMode::default(),
            help_scroll: 0,
            focus: KeyFocus::default(),
            command_line: CommandLine::new(),
            capture,
            seek_bar,
            volume_bar,
            pending_seek: None,
            metadata: None,
            status_message: None,
            status_clear_at: None,
            settings,
        };

        if let Some( ref file ) = args.file {
            app.open( file.clone() );
        }

        Ok( app )
    }


    /// Sets a status message that auto-clears after a delay.
    fn set_status( &mut self, msg: impl Into<String> ) {
        self.status_message = Some( msg.into() );
        self.status_clear_at = Some( Instant::now() + Duration::from_secs( 3 ) );
    }


    /// Runs one frame: expires messages, drains engine events, samples the
    /// playhead and pushes the new state into the range controls.
    fn tick( &mut self ) {
        if let Some( clear_at ) = self.status_clear_at {
            if Instant::now() >= clear_at {
                self.status_message = None;
                self.status_clear_at = None;
            }
        }

        for error in self.transport.pump() {
            self.set_status( error.to_string() );
        }

        self.transport.on_frame();
        self.sync_controls();
    }


    /// Feeds controller state into the controls as their props.
    fn sync_controls( &mut self ) {
        let snapshot = self.transport.snapshot();

        self.seek_bar.set_props( RangeProps {
            value: snapshot.current_seconds,
            min: 0.0,
            max: snapshot.duration_seconds,
            disabled: matches!(
                snapshot.status,
                PlaybackStatus::Idle | PlaybackStatus::Loading | PlaybackStatus::Stopped
            ),
            dragging: snapshot.user_driven,
        });

        self.volume_bar.set_props( RangeProps {
            value: f64::from( snapshot.volume_percent ),
            min: 0.0,
            max: 100.0,
            disabled: false,
            dragging: false,
        });
    }


    fn open( &mut self, path: PathBuf ) {
        self.metadata = match probe_metadata( &path ) {
            Ok( meta ) => Some( meta ),
            Err( e ) => {
                tracing::debug!( "No metadata for {:?}: {}", path, e );
                None
            }
        };
        self.set_status( format!( "Opening {}", path.display() ) );
        self.transport.open( path );
    }


    /// Shows transport rejections raised by a key or command.
    fn report( &mut self, result: Result<(), TransportError> ) {
        if let Err( e ) = result {
            self.set_status( e.to_string() );
        }
    }


    fn toggle_playback( &mut self ) {
        let result = match self.transport.status() {
            PlaybackStatus::Playing => self.transport.pause(),
            _ => self.transport.play(),
        };
        self.report( result );
    }


    fn seek_by( &mut self, delta: f64 ) {
        let target = self.transport.position().current_seconds + delta;
        let result = self.transport.seek_to( target );
        self.report( result );
    }


    fn step_volume( &mut self, delta: i32 ) {
        let level = self.transport.volume().step( delta );
        self.transport.volume_changed( u32::from( level.percent() ) );
    }


    fn handle_key( &mut self, code: KeyCode ) {
        match self.focus {
            KeyFocus::Transport => self.handle_normal_key( code ),
            KeyFocus::CommandLine => self.handle_command_key( code ),
        }
    }


    fn handle_normal_key( &mut self, code: KeyCode ) {
        if self.view_mode == ViewMode::Help {
            match code {
                KeyCode::Esc | KeyCode::Char( '?' ) => self.view_mode = ViewMode::Player,
                KeyCode::Up | KeyCode::Char( 'k' ) => self.help_scroll = self.help_scroll.saturating_sub( 1 ),
                KeyCode::Down | KeyCode::Char( 'j' ) => self.help_scroll = self.help_scroll.saturating_add( 1 ),
                KeyCode::Char( 'q' ) => self.should_quit = true,
                _ => {}
            }
            return;
        }

        let step = self.settings.seek_step_secs as f64;
        match code {
            KeyCode::Char( '/' ) => {
                self.focus = KeyFocus::CommandLine;
                self.command_line.discard();
            }
            KeyCode::Char( ' ' ) => self.toggle_playback(),
            KeyCode::Char( 's' ) => {
                let result = self.transport.stop();
                self.report( result );
            }
            KeyCode::Char( '+' ) | KeyCode::Char( '=' ) => self.step_volume( VOLUME_STEP ),
            KeyCode::Char( '-' ) => self.step_volume( -VOLUME_STEP ),
            KeyCode::Left => self.seek_by( -step ),
            KeyCode::Right => self.seek_by( step ),
            KeyCode::Char( '?' ) => {
                self.view_mode = self.view_mode.toggle_help();
                self.help_scroll = 0;
            }
            KeyCode::Char( 'q' ) => self.should_quit = true,
            _ => {}
        }
    }


    fn handle_command_key( &mut self, code: KeyCode ) {
        match code {
            KeyCode::Enter => {
                self.focus = KeyFocus::Transport;
                if let Some( line ) = self.command_line.submit() {
                    self.execute_command( &line );
                }
            }
            KeyCode::Esc => {
                self.focus = KeyFocus::Transport;
                self.command_line.discard();
            }
            KeyCode::Backspace => {
                if self.command_line.is_empty() {
                    self.focus = KeyFocus::Transport;
                } else {
                    self.command_line.erase_back();
                }
            }
            KeyCode::Delete => self.command_line.erase_forward(),
            KeyCode::Left => self.command_line.step_left(),
            KeyCode::Right => self.command_line.step_right(),
            KeyCode::Home => self.command_line.to_start(),
            KeyCode::End => self.command_line.to_end(),
            KeyCode::Up => self.command_line.recall_previous(),
            KeyCode::Down => self.command_line.recall_next(),
            KeyCode::Char( c ) => self.command_line.insert( c ),
            _ => {}
        }
    }


    fn execute_command( &mut self, input: &str ) {
        match Command::parse( input ) {
            Ok( cmd ) => {
                if let Err( e ) = self.run_command( cmd ) {
                    self.set_status( format!( "Error: {}", e ) );
                }
            }
            Err( e ) => {
                self.set_status( format!( "{}", e ) );
            }
        }
    }


    fn run_command( &mut self, cmd: Command ) -> Result<()> {
        tracing::debug!( "Running command: {:?}", cmd );
        match cmd {
            Command::Open { path } => {
                if !path.is_file() {
                    anyhow::bail!( "Not a file: {}", path.display() );
                }
                self.open( path );
            }
            Command::Play => self.transport.play()?,
            Command::Pause => self.transport.pause()?,
            Command::Stop => self.transport.stop()?,
            Command::Seek { position } => {
                self.transport.seek_to( position.as_secs_f64() )?;
                self.set_status( format!( "Seek to {}", format_time( position.as_secs_f64() ) ) );
            }
            Command::Volume { level } => {
                self.transport.volume_changed( level );
                self.set_status( format!( "Volume: {}%", self.transport.volume().percent() ) );
            }
            Command::Help => {
                self.view_mode = ViewMode::Help;
                self.help_scroll = 0;
            }
            Command::Quit => self.should_quit = true,
        }
        Ok(())
    }


    /// Routes terminal mouse input to the range controls.
    ///
    /// Presses only reach the control under the pointer. Drags and releases
    /// go to the controls registered in the pointer capture, wherever the
    /// pointer is.
    fn handle_mouse( &mut self, column: u16, row: u16, kind: MouseEventKind ) {
        let x = f64::from( column );
        let y = f64::from( row );

        match kind {
            MouseEventKind::Down( MouseButton::Left ) => {
                if self.seek_bar.is_under( x, y ) {
                    for event in self.seek_bar.pointer_down( x ) {
                        self.on_seek_event( event );
                    }
                } else if self.volume_bar.is_under( x, y ) {
                    for event in self.volume_bar.pointer_down( x ) {
                        self.on_volume_event( event );
                    }
                }
            }
            MouseEventKind::Drag( MouseButton::Left ) => {
                for id in self.capture.listeners() {
                    if id == self.seek_bar.id() {
                        if let Some( event ) = self.seek_bar.pointer_move( x ) {
                            self.on_seek_event( event );
                        }
                    } else if id == self.volume_bar.id() {
                        if let Some( event ) = self.volume_bar.pointer_move( x ) {
                            self.on_volume_event( event );
                        }
                    }
                }
            }
            MouseEventKind::Up( MouseButton::Left ) => {
                for id in self.capture.listeners() {
                    if id == self.seek_bar.id() {
                        if let Some( event ) = self.seek_bar.pointer_up() {
                            self.on_seek_event( event );
                        }
                    } else if id == self.volume_bar.id() {
                        if let Some( event ) = self.volume_bar.pointer_up() {
                            self.on_volume_event( event );
                        }
                    }
                }
            }
            _ => {}
        }

        let over_seek = self.seek_bar.is_under( x, y );
        let over_volume = self.volume_bar.is_under( x, y );
        self.seek_bar.set_hovering( over_seek );
        self.volume_bar.set_hovering( over_volume );
    }


    fn on_seek_event( &mut self, event: RangeEvent ) {
        // Mouse gestures on a bar that cannot seek are dropped quietly
        let result = match event {
            RangeEvent::Changed( value ) => {
                if self.transport.position().user_driven {
                    self.transport.seek_drag_move( value )
                } else {
                    self.pending_seek = Some( value );
                    Ok(())
                }
            }
            RangeEvent::DragStarted => {
                let value = self.pending_seek
                    .take()
                    .unwrap_or( self.transport.position().current_seconds );
                self.transport.seek_drag_start( value )
            }
            RangeEvent::DragEnded => self.transport.seek_drag_end(),
        };

        if let Err( e ) = result {
            tracing::debug!( "Seek bar gesture ignored: {}", e );
        }
    }


    fn on_volume_event( &mut self, event: RangeEvent ) {
        if let RangeEvent::Changed( value ) = event {
            self.transport.volume_changed( value.round().max( 0.0 ) as u32 );
        }
    }


    /// Records where a bar was drawn so pointer input can be mapped onto it.
    fn place_bar( control: &mut RangeControl, area: Rect ) {
        control.set_geometry( TrackGeometry {
            left: f64::from( area.x ),
            top: f64::from( area.y ),
            width: f64::from( area.width.saturating_sub( 1 ) ),
            height: f64::from( area.height ),
        });
    }


    fn save_settings( &mut self ) {
        self.settings.volume = u32::from( self.transport.volume().percent() );
        self.settings.save();
    }
}


/// Sends logs to a file under the local data directory.
///
/// The terminal belongs to the TUI, so nothing is written to stdout.
fn init_logging( default_filter: &str ) -> Result<()> {
    let dir = match dirs::data_local_dir() {
        Some( dir ) => dir.join( "tinged" ),
        None => return Ok(()),
    };
    fs::create_dir_all( &dir )?;

    let file = fs::OpenOptions::new()
        .create( true )
        .append( true )
        .open( dir.join( "tinged.log" ) )?;

    let filter = EnvFilter::try_from_default_env()
        .or_else( |_| EnvFilter::try_new( default_filter ) )?;

    tracing_subscriber::fmt()
        .with_env_filter( filter )
        .with_writer( Mutex::new( file ) )
        .with_ansi( false )
        .init();

    Ok(())
}


fn main() -> Result<()> {
    let args = Args::parse();
    let settings = Settings::load();

    init_logging( args.log_level.as_deref().unwrap_or( &settings.log_level ) )?;
    tracing::info!( "Starting tinged {}", env!( "CARGO_PKG_VERSION" ) );

    let frame_interval = settings.frame_interval();
    let mut app = App::new( &args, settings )?;

    // Setup terminal
    enable_raw_mode()?;
    io::stdout().execute( EnterAlternateScreen )?;
    io::stdout().execute( crossterm::event::EnableMouseCapture )?;

    let mut terminal = Terminal::new( CrosstermBackend::new( io::stdout() ) )?;

    // Main loop
    let result = run( &mut terminal, &mut app, frame_interval );

    // Cleanup
    io::stdout().execute( crossterm::event::DisableMouseCapture )?;
    disable_raw_mode()?;
    io::stdout().execute( LeaveAlternateScreen )?;

    app.save_settings();
    tracing::info!( "Exiting" );

    result
}


fn run<B: Backend>( terminal: &mut Terminal<B>, app: &mut App, frame_interval: Duration ) -> Result<()> {
    loop {
        if event::poll( frame_interval )? {
            match event::read()? {
                Event::Key( key ) if key.kind == KeyEventKind::Press => {
                    app.handle_key( key.code );
                }
                Event::Mouse( mouse ) => {
                    app.handle_mouse( mouse.column, mouse.row, mouse.kind );
                }
                _ => {}
            }
        }

        app.tick();
        terminal.draw( |frame| draw_ui( frame, app ) )?;

        if app.should_quit {
            return Ok(());
        }
    }
}


/// Draws the main UI.
fn draw_ui( frame: &mut Frame, app: &mut App ) {
    let area = frame.area();

    let chunks = Layout::default()
        .direction( Direction::Vertical )
        .constraints([
            Constraint::Length( 2 ),  // Header
            Constraint::Min( 0 ),     // Main content
            Constraint::Length( 4 ),  // Now playing
            Constraint::Length( 1 ),  // Seek row
            Constraint::Length( 1 ),  // Volume row
            Constraint::Length( 1 ),  // Status bar
        ])
        .split( area );

    let view_indicator = match app.view_mode {
        ViewMode::Player => "PLAYER",
        ViewMode::Help => "HELP",
    };

    let header = Paragraph::new( format!( "  TINGED - {}", view_indicator ) )
        .style( Style::default().fg( Color::Cyan ).bold() )
        .block( Block::default().borders( Borders::BOTTOM ) );
    frame.render_widget( header, chunks[0] );

    match app.view_mode {
        ViewMode::Player => draw_onboarding( frame, app, chunks[1] ),
        ViewMode::Help => draw_help( frame, app, chunks[1] ),
    }

    draw_now_playing( frame, app, chunks[2] );
    draw_seek_row( frame, app, chunks[3] );
    draw_volume_row( frame, app, chunks[4] );
    draw_status_bar( frame, app, chunks[5] );
}


fn draw_onboarding( frame: &mut Frame, app: &App, area: Rect ) {
    if app.transport.source().is_some() {
        return;
    }

    let lines = vec![
        Line::from( Span::styled( "Nothing loaded yet", Style::default().bold() ) ),
        Line::from( "" ),
        Line::from( "Type /open <path> to load an audio file," ),
        Line::from( "or pass one on the command line: tinged song.flac" ),
        Line::from( "" ),
        Line::from( Span::styled( "Press ? for help", Style::default().fg( Color::DarkGray ) ) ),
    ];

    let onboarding = Paragraph::new( lines )
        .alignment( Alignment::Center )
        .wrap( Wrap { trim: true } );

    let vertical_pad = area.height.saturating_sub( 6 ) / 2;
    let inner = Rect { y: area.y + vertical_pad, height: area.height - vertical_pad, ..area };
    frame.render_widget( onboarding, inner );
}


fn draw_help( frame: &mut Frame, app: &App, area: Rect ) {
    let help = Paragraph::new( command::help_text() )
        .block( Block::default().title( " Help " ).borders( Borders::ALL ) )
        .scroll(( app.help_scroll, 0 ));
    frame.render_widget( help, area );
}


fn draw_now_playing( frame: &mut Frame, app: &App, area: Rect ) {
    let status = app.transport.status();
    let state_str = match status {
        PlaybackStatus::Playing => "▶",
        PlaybackStatus::Paused => "⏸",
        PlaybackStatus::Stopped => "■",
        PlaybackStatus::Loading => "…",
        PlaybackStatus::Loaded => "▷",
        PlaybackStatus::Idle => " ",
    };

    let file_name = app.transport
        .source()
        .and_then( |p| p.file_name().map( |n| n.to_string_lossy().to_string() ) );

    let title = app.metadata
        .as_ref()
        .and_then( |m| m.title.clone() )
        .or( file_name )
        .unwrap_or_else( || "No track".to_string() );

    let artist_album = match app.metadata.as_ref().map( |m| ( &m.artist, &m.album ) ) {
        Some(( Some( artist ), Some( album ) )) => format!( "{} - {}", artist, album ),
        Some(( Some( artist ), None )) => artist.clone(),
        Some(( None, Some( album ) )) => album.clone(),
        _ => String::new(),
    };

    let lines = vec![
        Line::from( Span::styled( format!( " {} {} ", state_str, title ), Style::default().bold() ) ),
        Line::from( Span::styled( format!( "   {} ", artist_album ), Style::default().fg( Color::Gray ) ) ),
    ];

    let now_playing = Paragraph::new( lines )
        .block( Block::default().title( format!( " {} ", status ) ).borders( Borders::ALL ) );

    frame.render_widget( now_playing, area );
}


/// Splits a bar row into its left label, track, and right label.
fn bar_row( area: Rect ) -> [ Rect; 3 ] {
    let chunks = Layout::default()
        .direction( Direction::Horizontal )
        .constraints([
            Constraint::Length( 9 ),
            Constraint::Min( 4 ),
            Constraint::Length( 9 ),
        ])
        .split( area );
    [ chunks[0], chunks[1], chunks[2] ]
}


fn draw_bar( frame: &mut Frame, control: &RangeControl, area: Rect, color: Color ) {
    let cells = bar_cells( area.width as usize, control.pixel_offset(), control.is_active() );
    let style = if control.props().disabled {
        Style::default().fg( Color::DarkGray )
    } else {
        Style::default().fg( color )
    };
    frame.render_widget( Paragraph::new( cells.render() ).style( style ), area );
}


fn draw_seek_row( frame: &mut Frame, app: &mut App, area: Rect ) {
    let [ elapsed, track, total ] = bar_row( area );
    let snapshot = app.transport.snapshot();

    App::place_bar( &mut app.seek_bar, track );

    frame.render_widget(
        Paragraph::new( format!( " {} ", format_time( snapshot.current_seconds ) ) ).alignment( Alignment::Right ),
        elapsed,
    );
    draw_bar( frame, &app.seek_bar, track, Color::Cyan );
    frame.render_widget( Paragraph::new( format!( " {}", format_time( snapshot.duration_seconds ) ) ), total );
}


fn draw_volume_row( frame: &mut Frame, app: &mut App, area: Rect ) {
    let [ label, track, value ] = bar_row( area );

    App::place_bar( &mut app.volume_bar, track );

    let percent = app.transport.volume().percent();
    let label_text = if percent == 0 { "muted " } else { "vol " };

    frame.render_widget( Paragraph::new( label_text ).alignment( Alignment::Right ), label );
    draw_bar( frame, &app.volume_bar, track, Color::Green );
    frame.render_widget( Paragraph::new( format!( " {}%", percent ) ), value );
}


fn draw_status_bar( frame: &mut Frame, app: &App, area: Rect ) {
    let ( text, style ) = match app.focus {
        KeyFocus::CommandLine => {
            ( format!( "/{}", app.command_line.text() ), Style::default().fg( Color::Yellow ) )
        }
        KeyFocus::Transport => {
            if let Some( ref msg ) = app.status_message {
                ( msg.clone(), Style::default().fg( Color::Green ) )
            } else if !app.capture.is_empty() {
                ( " Dragging - release to finish ".to_string(), Style::default().fg( Color::DarkGray ) )
            } else {
                let hint = match app.view_mode {
                    ViewMode::Player => " [/]Cmd [Space]Play [s]Stop [←→]Seek [+/-]Vol [?]Help [q]Quit ",
                    ViewMode::Help => " [?]Close [Esc]Close [↑↓]Scroll ",
                };
                ( hint.to_string(), Style::default().fg( Color::DarkGray ) )
            }
        }
    };

    let status = Paragraph::new( text ).style( style );
    frame.render_widget( status, area );

    if app.focus == KeyFocus::CommandLine {
        let cursor_x = area.x + 1 + app.command_line.cursor() as u16;
        frame.set_cursor_position(( cursor_x, area.y ));
    }
}
