//! View state and range bar rendering for the TUI.


/// Current view mode of the application.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Default )]
pub enum ViewMode {
    /// Transport view - now playing, seek and volume bars.
    #[default]
    Player,

    /// Help overlay - shows available commands.
    Help,
}


impl ViewMode {
    /// Toggles the help overlay.
    pub fn toggle_help( self ) -> Self {
        match self {
            ViewMode::Player => ViewMode::Help,
            ViewMode::Help => ViewMode::Player,
        }
    }
}


/// Cell layout of one range bar.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub struct BarCells {
    /// Cells left of the thumb
    pub filled: usize,
    /// Thumb cell, when the thumb is shown
    pub thumb: Option<usize>,
    pub width: usize,
}


/// Lays out a bar `width` cells wide with the thumb `offset` cells in.
///
/// The thumb is only drawn while the control is hovered or dragged.
pub fn bar_cells( width: usize, offset: f64, show_thumb: bool ) -> BarCells {
    if width == 0 {
        return BarCells { filled: 0, thumb: None, width };
    }

    let last = width - 1;
    let cell = if offset.is_finite() { ( offset.max( 0.0 ).round() as usize ).min( last ) } else { 0 };

    BarCells {
        filled: cell,
        thumb: show_thumb.then_some( cell ),
        width,
    }
}


impl BarCells {
    /// Renders the bar as text.
    pub fn render( &self ) -> String {
        ( 0..self.width )
            .map( |i| {
                if self.thumb == Some( i ) {
                    '●'
                } else if i < self.filled {
                    '━'
                } else {
                    '─'
                }
            })
            .collect()
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_help_toggles() {
        assert_eq!( ViewMode::Player.toggle_help(), ViewMode::Help );
        assert_eq!( ViewMode::Help.toggle_help(), ViewMode::Player );
    }


    #[test]
    fn test_thumb_hidden_when_inactive() {
        let cells = bar_cells( 5, 2.0, false );
        assert_eq!( cells.thumb, None );
        assert_eq!( cells.render(), "━━───" );
    }


    #[test]
    fn test_thumb_shown_when_active() {
        assert_eq!( bar_cells( 5, 2.4, true ).render(), "━━●──" );
        assert_eq!( bar_cells( 5, 0.0, true ).render(), "●────" );
    }


    #[test]
    fn test_offset_is_clamped_to_the_bar() {
        assert_eq!( bar_cells( 4, 99.0, true ).render(), "━━━●" );
        assert_eq!( bar_cells( 4, f64::NAN, false ).render(), "────" );
        assert_eq!( bar_cells( 0, 3.0, true ).render(), "" );
    }
}
