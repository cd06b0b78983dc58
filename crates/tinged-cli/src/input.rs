//! Key focus and the slash command line.
//!
//! Keys either drive the transport shortcuts or edit the command line shown
//! in the status bar. Submitted lines are remembered so Up/Down can bring an
//! earlier command back.

const HISTORY_LIMIT: usize = 50;


/// Where key presses are routed.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Default )]
pub enum KeyFocus {
    #[default]
    Transport,
    CommandLine,
}


/// Single-line editor for slash commands, with recall of earlier lines.
#[derive( Debug, Default )]
pub struct CommandLine {
    text: Vec<char>,
    cursor: usize,
    history: Vec<String>,
    /// Index into `history` while browsing it.
    recalled: Option<usize>,
}


impl CommandLine {
    pub fn new() -> Self {
        Self::default()
    }


    pub fn text( &self ) -> String {
        self.text.iter().collect()
    }


    /// Cursor position in characters, for placing the terminal cursor.
    pub fn cursor( &self ) -> usize {
        self.cursor
    }


    pub fn is_empty( &self ) -> bool {
        self.text.is_empty()
    }


    pub fn insert( &mut self, c: char ) {
        self.text.insert( self.cursor, c );
        self.cursor += 1;
        self.recalled = None;
    }


    /// Removes the character left of the cursor.
    pub fn erase_back( &mut self ) {
        if self.cursor > 0 {
            self.cursor -= 1;
            self.text.remove( self.cursor );
        }
    }


    /// Removes the character under the cursor.
    pub fn erase_forward( &mut self ) {
        if self.cursor < self.text.len() {
            self.text.remove( self.cursor );
        }
    }


    pub fn step_left( &mut self ) {
        self.cursor = self.cursor.saturating_sub( 1 );
    }


    pub fn step_right( &mut self ) {
        self.cursor = ( self.cursor + 1 ).min( self.text.len() );
    }


    pub fn to_start( &mut self ) {
        self.cursor = 0;
    }


    pub fn to_end( &mut self ) {
        self.cursor = self.text.len();
    }


    /// Takes the edited line, leaving the editor empty.
    ///
    /// Blank lines return `None` and are not remembered. A line equal to the
    /// most recent history entry is not stored twice.
    pub fn submit( &mut self ) -> Option<String> {
        let line = self.text().trim().to_string();
        self.discard();
        if line.is_empty() {
            return None;
        }

        if self.history.last() != Some( &line ) {
            self.history.push( line.clone() );
            if self.history.len() > HISTORY_LIMIT {
                self.history.remove( 0 );
            }
        }
        Some( line )
    }


    /// Drops the edited line without remembering it.
    pub fn discard( &mut self ) {
        self.text.clear();
        self.cursor = 0;
        self.recalled = None;
    }


    /// Steps back to an older submitted line.
    pub fn recall_previous( &mut self ) {
        let index = match self.recalled {
            Some( 0 ) => return,
            Some( i ) => i - 1,
            None if self.history.is_empty() => return,
            None => self.history.len() - 1,
        };
        self.show_recalled( index );
    }


    /// Steps forward to a newer submitted line, or back to an empty line
    /// past the newest.
    pub fn recall_next( &mut self ) {
        match self.recalled {
            Some( i ) if i + 1 < self.history.len() => self.show_recalled( i + 1 ),
            Some( _ ) => self.discard(),
            None => {}
        }
    }


    fn show_recalled( &mut self, index: usize ) {
        self.text = self.history[ index ].chars().collect();
        self.cursor = self.text.len();
        self.recalled = Some( index );
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    fn typed( line: &str ) -> CommandLine {
        let mut editor = CommandLine::new();
        for c in line.chars() {
            editor.insert( c );
        }
        editor
    }


    #[test]
    fn test_cursor_counts_characters_not_bytes() {
        let mut editor = typed( "open é.flac" );
        assert_eq!( editor.cursor(), 11 );

        editor.to_end();
        for _ in 0..5 {
            editor.step_left();
        }
        editor.erase_back();
        assert_eq!( editor.text(), "open .flac" );
        assert_eq!( editor.cursor(), 5 );
    }


    #[test]
    fn test_editing_in_the_middle() {
        let mut editor = typed( "sek 10" );

        editor.to_start();
        editor.step_right();
        editor.step_right();
        editor.insert( 'e' );
        assert_eq!( editor.text(), "seek 10" );

        editor.to_end();
        editor.step_right();
        editor.step_left();
        editor.erase_forward();
        assert_eq!( editor.text(), "seek 1" );

        editor.to_start();
        editor.erase_back();
        editor.step_left();
        assert_eq!( editor.cursor(), 0 );
        assert_eq!( editor.text(), "seek 1" );
    }


    #[test]
    fn test_submit_trims_and_skips_blank_lines() {
        let mut editor = typed( "  vol 40 " );
        assert_eq!( editor.submit(), Some( "vol 40".to_string() ) );
        assert!( editor.is_empty() );

        let mut blank = typed( "   " );
        assert_eq!( blank.submit(), None );
        blank.recall_previous();
        assert!( blank.is_empty() );
    }


    #[test]
    fn test_recall_walks_history_and_back() {
        let mut editor = CommandLine::new();
        for line in [ "open a.flac", "vol 30", "vol 30", "seek 1:00" ] {
            for c in line.chars() {
                editor.insert( c );
            }
            editor.submit();
        }

        editor.recall_previous();
        assert_eq!( editor.text(), "seek 1:00" );
        editor.recall_previous();
        assert_eq!( editor.text(), "vol 30" );
        editor.recall_previous();
        assert_eq!( editor.text(), "open a.flac" );
        editor.recall_previous();
        assert_eq!( editor.text(), "open a.flac" );
        assert_eq!( editor.cursor(), 11 );

        editor.recall_next();
        assert_eq!( editor.text(), "vol 30" );
        editor.recall_next();
        editor.recall_next();
        assert!( editor.is_empty() );
    }


    #[test]
    fn test_typing_after_recall_starts_a_new_line() {
        let mut editor = typed( "pause" );
        editor.submit();

        editor.recall_previous();
        editor.insert( 'd' );
        editor.recall_next();
        assert_eq!( editor.text(), "paused" );

        assert_eq!( editor.submit(), Some( "paused".to_string() ) );
        editor.recall_previous();
        assert_eq!( editor.text(), "paused" );
        editor.recall_previous();
        assert_eq!( editor.text(), "pause" );
    }
}
