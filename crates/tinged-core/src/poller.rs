//! Position poller
//!
//! Samples the engine clock once per rendered frame while audio is playing.
//! Each frame either reschedules the loop (status still Playing, no drag in
//! progress) or lets it lapse. A lapsed loop stays down until the transport
//! re-arms it.

use crate::engine::EngineSession;
use crate::transport::PlaybackStatus;


/// Frame-driven sampling loop over the engine clock.
#[derive( Debug, Default )]
pub struct PositionPoller {
    armed: bool,
    samples: u64,
}


impl PositionPoller {
    pub fn new() -> Self {
        Self::default()
    }


    /// Schedules the loop for the next frame.
    pub fn arm( &mut self ) {
        if !self.armed {
            tracing::trace!( "Position poller armed" );
        }
        self.armed = true;
    }


    /// Cancels the loop before its next frame.
    pub fn disarm( &mut self ) {
        if self.armed {
            tracing::trace!( "Position poller disarmed after {} samples", self.samples );
        }
        self.armed = false;
    }


    pub fn is_armed( &self ) -> bool {
        self.armed
    }


    /// Runs one frame of the loop.
    ///
    /// Returns the sampled position and stays scheduled while `status` is
    /// Playing and no drag is in progress. Otherwise the loop ends itself and
    /// nothing is read from the engine.
    pub fn frame<S>( &mut self, status: PlaybackStatus, user_driven: bool, session: Option<&S> ) -> Option<f64>
    where
        S: EngineSession + ?Sized,
    {
        if !self.armed {
            return None;
        }

        let session = match session {
            Some( session ) if status == PlaybackStatus::Playing && !user_driven => session,
            _ => {
                self.disarm();
                return None;
            }
        };

        self.samples += 1;
        Some( session.current_position() )
    }
}


#[cfg( test )]
mod tests {
    use std::cell::Cell;

    use super::*;


    struct Clock {
        position: Cell<f64>,
        reads: Cell<u32>,
    }


    impl EngineSession for Clock {
        fn play( &mut self ) {}
        fn pause( &mut self ) {}
        fn stop( &mut self ) {}
        fn seek( &mut self, _seconds: f64 ) {}
        fn set_volume( &mut self, _percent: u8 ) {}

        fn current_position( &self ) -> f64 {
            self.reads.set( self.reads.get() + 1 );
            self.position.get()
        }

        fn dispose( &mut self ) {}
    }


    fn clock( position: f64 ) -> Clock {
        Clock { position: Cell::new( position ), reads: Cell::new( 0 ) }
    }


    #[test]
    fn test_unarmed_poller_reads_nothing() {
        let engine = clock( 3.0 );
        let mut poller = PositionPoller::new();

        assert_eq!( poller.frame( PlaybackStatus::Playing, false, Some( &engine ) ), None );
        assert_eq!( engine.reads.get(), 0 );
    }


    #[test]
    fn test_armed_poller_samples_every_frame() {
        let engine = clock( 1.0 );
        let mut poller = PositionPoller::new();
        poller.arm();

        assert_eq!( poller.frame( PlaybackStatus::Playing, false, Some( &engine ) ), Some( 1.0 ) );
        engine.position.set( 1.25 );
        assert_eq!( poller.frame( PlaybackStatus::Playing, false, Some( &engine ) ), Some( 1.25 ) );
        assert!( poller.is_armed() );
        assert_eq!( engine.reads.get(), 2 );
    }


    #[test]
    fn test_loop_ends_when_status_leaves_playing() {
        let engine = clock( 1.0 );
        let mut poller = PositionPoller::new();
        poller.arm();

        assert_eq!( poller.frame( PlaybackStatus::Paused, false, Some( &engine ) ), None );
        assert!( !poller.is_armed() );

        // Stays down even once playing again, until re-armed
        assert_eq!( poller.frame( PlaybackStatus::Playing, false, Some( &engine ) ), None );
        assert_eq!( engine.reads.get(), 0 );
    }


    #[test]
    fn test_loop_ends_during_drag() {
        let engine = clock( 1.0 );
        let mut poller = PositionPoller::new();
        poller.arm();

        assert_eq!( poller.frame( PlaybackStatus::Playing, true, Some( &engine ) ), None );
        assert!( !poller.is_armed() );
    }


    #[test]
    fn test_loop_ends_without_engine() {
        let mut poller = PositionPoller::new();
        poller.arm();

        assert_eq!( poller.frame::<Clock>( PlaybackStatus::Playing, false, None ), None );
        assert!( !poller.is_armed() );
    }
}
