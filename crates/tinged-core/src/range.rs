//! Draggable range control
//!
//! A headless, pointer-driven slider used for both the seek bar and the
//! volume bar. The control owns its thumb offset and hover state; the owner
//! supplies the value, range, and drag flag through [`RangeProps`] and
//! receives [`RangeEvent`]s back.
//!
//! While a drag is in progress the control holds a [`CaptureGuard`] from the
//! shared [`PointerCapture`], which makes it the receiver of every pointer
//! move and release regardless of where the pointer is. Dropping the guard
//! (on release, on an owner-driven drag end, or when the control itself is
//! dropped) detaches the listeners.

use std::cell::{ Cell, RefCell };
use std::rc::Rc;

use crate::mapper;


/// Identifies a control registered with a [`PointerCapture`].
#[derive( Debug, Clone, Copy, PartialEq, Eq, Hash )]
pub struct ControlId( u32 );


/// Process-wide pointer listener registry.
///
/// Pointer moves and releases are delivered to every listening control, not
/// only to the one under the pointer. Cloning shares the same registry.
#[derive( Debug, Clone, Default )]
pub struct PointerCapture {
    listeners: Rc<RefCell<Vec<ControlId>>>,
    next_id: Rc<Cell<u32>>,
}


impl PointerCapture {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }


    /// Allocates an id for a new control.
    fn register( &self ) -> ControlId {
        let id = self.next_id.get();
        self.next_id.set( id.wrapping_add( 1 ) );
        ControlId( id )
    }


    /// Attaches move/release listeners for `id` until the guard is dropped.
    fn acquire( &self, id: ControlId ) -> CaptureGuard {
        self.listeners.borrow_mut().push( id );
        tracing::trace!( "Pointer listeners attached for {:?}", id );
        CaptureGuard {
            listeners: Rc::clone( &self.listeners ),
            id,
        }
    }


    /// Returns the controls currently listening for pointer moves/releases.
    pub fn listeners( &self ) -> Vec<ControlId> {
        self.listeners.borrow().clone()
    }


    /// Returns true if `id` currently has listeners attached.
    pub fn is_listening( &self, id: ControlId ) -> bool {
        self.listeners.borrow().contains( &id )
    }


    /// Returns true if no control is listening.
    pub fn is_empty( &self ) -> bool {
        self.listeners.borrow().is_empty()
    }
}


/// Scoped registration of a control's pointer listeners.
///
/// Detaches on drop.
#[derive( Debug )]
pub struct CaptureGuard {
    listeners: Rc<RefCell<Vec<ControlId>>>,
    id: ControlId,
}


impl Drop for CaptureGuard {
    fn drop( &mut self ) {
        let mut listeners = self.listeners.borrow_mut();
        if let Some( pos ) = listeners.iter().position( |id| *id == self.id ) {
            listeners.remove( pos );
        }
        tracing::trace!( "Pointer listeners detached for {:?}", self.id );
    }
}


/// Horizontal placement of the track in pointer coordinates.
#[derive( Debug, Clone, Copy, PartialEq, Default )]
pub struct TrackGeometry {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}


impl TrackGeometry {
    /// Returns true if the point lies on the track. The right edge, where
    /// the thumb sits at `max`, counts as on the track.
    pub fn contains( &self, x: f64, y: f64 ) -> bool {
        x >= self.left
            && x <= self.left + self.width
            && y >= self.top
            && y < self.top + self.height
    }
}


/// Inputs supplied by the owner of a control.
#[derive( Debug, Clone, Copy, PartialEq )]
pub struct RangeProps {
    pub value: f64,
    pub min: f64,
    pub max: f64,
    pub disabled: bool,
    /// Owner-held drag flag, for controlled composition.
    pub dragging: bool,
}


impl Default for RangeProps {
    fn default() -> Self {
        Self {
            value: 0.0,
            min: 0.0,
            max: 100.0,
            disabled: false,
            dragging: false,
        }
    }
}


/// Notifications emitted by a control in response to pointer input.
#[derive( Debug, Clone, Copy, PartialEq )]
pub enum RangeEvent {
    /// New value under the pointer.
    Changed( f64 ),
    DragStarted,
    DragEnded,
}


/// Draggable range control.
#[derive( Debug )]
pub struct RangeControl {
    id: ControlId,
    capture: PointerCapture,
    props: RangeProps,
    geometry: TrackGeometry,
    pixel_offset: f64,
    hovering: bool,
    guard: Option<CaptureGuard>,
}


impl RangeControl {
    /// Creates a control registered with the given pointer registry.
    pub fn new( capture: &PointerCapture, props: RangeProps ) -> Self {
        Self {
            id: capture.register(),
            capture: capture.clone(),
            props,
            geometry: TrackGeometry::default(),
            pixel_offset: 0.0,
            hovering: false,
            guard: None,
        }
    }


    /// Returns this control's id in the pointer registry.
    pub fn id( &self ) -> ControlId {
        self.id
    }


    /// Updates the owner-supplied inputs.
    ///
    /// A rising `dragging` flag attaches the pointer listeners and a falling
    /// one detaches them. Outside a drag the thumb follows `value`.
    pub fn set_props( &mut self, props: RangeProps ) {
        let previous = self.props.dragging;
        self.props = props;

        if props.dragging && !previous && self.guard.is_none() {
            self.guard = Some( self.capture.acquire( self.id ) );
        } else if !props.dragging && previous {
            self.guard = None;
        }

        if !self.is_dragging() {
            self.sync_offset();
        }
    }


    /// Returns the current inputs.
    pub fn props( &self ) -> &RangeProps {
        &self.props
    }


    /// Records a new track layout and re-derives the thumb from the current value.
    pub fn set_geometry( &mut self, geometry: TrackGeometry ) {
        if geometry != self.geometry {
            self.geometry = geometry;
            self.sync_offset();
        }
    }


    /// Handles a press on the track.
    ///
    /// Emits the value under the pointer followed by a drag start, then
    /// attaches the pointer listeners. Does nothing when disabled.
    pub fn pointer_down( &mut self, x: f64 ) -> Vec<RangeEvent> {
        if self.props.disabled {
            return Vec::new();
        }

        let value = self.follow_pointer( x );
        if self.guard.is_none() {
            self.guard = Some( self.capture.acquire( self.id ) );
        }

        vec![ RangeEvent::Changed( value ), RangeEvent::DragStarted ]
    }


    /// Handles a pointer move anywhere on screen.
    ///
    /// Only a control with listeners attached reacts. Every move produces a
    /// value; nothing is coalesced.
    pub fn pointer_move( &mut self, x: f64 ) -> Option<RangeEvent> {
        if !self.is_listening() {
            return None;
        }
        Some( RangeEvent::Changed( self.follow_pointer( x ) ) )
    }


    /// Handles a pointer release anywhere on screen.
    pub fn pointer_up( &mut self ) -> Option<RangeEvent> {
        if !self.is_listening() {
            return None;
        }
        self.guard = None;
        Some( RangeEvent::DragEnded )
    }


    /// Updates hover tracking.
    pub fn set_hovering( &mut self, hovering: bool ) {
        self.hovering = hovering;
    }


    /// Returns true if the point lies on this control's track.
    pub fn is_under( &self, x: f64, y: f64 ) -> bool {
        self.geometry.contains( x, y )
    }


    /// Returns true while the control is hovered or dragged.
    pub fn is_active( &self ) -> bool {
        self.hovering || self.is_dragging()
    }


    /// Returns true while a drag is in progress.
    pub fn is_dragging( &self ) -> bool {
        self.props.dragging || self.guard.is_some()
    }


    /// Returns true while this control's pointer listeners are attached.
    pub fn is_listening( &self ) -> bool {
        self.guard.is_some()
    }


    /// Returns the thumb offset from the left edge of the track.
    pub fn pixel_offset( &self ) -> f64 {
        self.pixel_offset
    }


    /// Moves the thumb under the pointer and returns the matching value.
    fn follow_pointer( &mut self, x: f64 ) -> f64 {
        let width = self.geometry.width.max( 0.0 );
        let offset = ( x - self.geometry.left ).clamp( 0.0, width );
        self.pixel_offset = offset;
        mapper::to_value( offset, self.props.min, self.props.max, width )
    }


    fn sync_offset( &mut self ) {
        self.pixel_offset = mapper::to_offset(
            self.props.value,
            self.props.min,
            self.props.max,
            self.geometry.width.max( 0.0 ),
        );
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    fn seek_props( value: f64, max: f64 ) -> RangeProps {
        RangeProps { value, min: 0.0, max, disabled: false, dragging: false }
    }


    fn track( left: f64, width: f64 ) -> TrackGeometry {
        TrackGeometry { left, top: 0.0, width, height: 1.0 }
    }


    #[test]
    fn test_pointer_down_emits_value_then_drag_start() {
        let capture = PointerCapture::new();
        let mut control = RangeControl::new( &capture, seek_props( 0.0, 180.0 ) );
        control.set_geometry( track( 10.0, 100.0 ) );

        let events = control.pointer_down( 60.0 );

        assert_eq!( events, vec![ RangeEvent::Changed( 90.0 ), RangeEvent::DragStarted ] );
        assert_eq!( control.pixel_offset(), 50.0 );
        assert!( capture.is_listening( control.id() ) );
    }


    #[test]
    fn test_disabled_control_ignores_press() {
        let capture = PointerCapture::new();
        let mut control = RangeControl::new( &capture, RangeProps {
            disabled: true,
            ..seek_props( 30.0, 180.0 )
        });
        control.set_geometry( track( 0.0, 100.0 ) );

        assert!( control.pointer_down( 50.0 ).is_empty() );
        assert!( capture.is_empty() );
        assert_eq!( control.pointer_move( 70.0 ), None );
        assert_eq!( control.pointer_up(), None );
    }


    #[test]
    fn test_moves_outside_track_clamp() {
        let capture = PointerCapture::new();
        let mut control = RangeControl::new( &capture, seek_props( 0.0, 100.0 ) );
        control.set_geometry( track( 20.0, 50.0 ) );
        control.pointer_down( 30.0 );

        assert_eq!( control.pointer_move( 500.0 ), Some( RangeEvent::Changed( 100.0 ) ) );
        assert_eq!( control.pixel_offset(), 50.0 );
        assert_eq!( control.pointer_move( -40.0 ), Some( RangeEvent::Changed( 0.0 ) ) );
        assert_eq!( control.pixel_offset(), 0.0 );
    }


    #[test]
    fn test_every_move_emits_a_value() {
        let capture = PointerCapture::new();
        let mut control = RangeControl::new( &capture, seek_props( 0.0, 100.0 ) );
        control.set_geometry( track( 0.0, 100.0 ) );
        control.pointer_down( 0.0 );

        let values: Vec<_> = [ 1.0, 2.0, 2.0, 3.0 ]
            .iter()
            .filter_map( |x| control.pointer_move( *x ) )
            .collect();
        assert_eq!( values.len(), 4 );
    }


    #[test]
    fn test_pointer_up_detaches_listeners() {
        let capture = PointerCapture::new();
        let mut control = RangeControl::new( &capture, seek_props( 0.0, 100.0 ) );
        control.set_geometry( track( 0.0, 100.0 ) );
        control.pointer_down( 40.0 );

        assert_eq!( control.pointer_up(), Some( RangeEvent::DragEnded ) );
        assert!( capture.is_empty() );
        assert!( !control.is_dragging() );
        assert_eq!( control.pointer_move( 80.0 ), None );
    }


    #[test]
    fn test_listeners_do_not_accumulate_across_drags() {
        let capture = PointerCapture::new();
        let mut control = RangeControl::new( &capture, seek_props( 0.0, 100.0 ) );
        control.set_geometry( track( 0.0, 100.0 ) );

        for _ in 0..5 {
            control.pointer_down( 10.0 );
            assert_eq!( capture.listeners().len(), 1 );
            control.pointer_up();
            assert!( capture.is_empty() );
        }
    }


    #[test]
    fn test_dropping_control_mid_drag_releases_capture() {
        let capture = PointerCapture::new();
        {
            let mut control = RangeControl::new( &capture, seek_props( 0.0, 100.0 ) );
            control.set_geometry( track( 0.0, 100.0 ) );
            control.pointer_down( 10.0 );
            assert!( !capture.is_empty() );
        }
        assert!( capture.is_empty() );
    }


    #[test]
    fn test_owner_controls_drag_flag() {
        let capture = PointerCapture::new();
        let mut control = RangeControl::new( &capture, seek_props( 0.0, 100.0 ) );
        control.set_geometry( track( 0.0, 100.0 ) );

        control.set_props( RangeProps { dragging: true, ..seek_props( 0.0, 100.0 ) } );
        assert!( capture.is_listening( control.id() ) );
        assert_eq!( control.pointer_move( 25.0 ), Some( RangeEvent::Changed( 25.0 ) ) );

        control.set_props( seek_props( 25.0, 100.0 ) );
        assert!( capture.is_empty() );
        assert!( !control.is_dragging() );
    }


    #[test]
    fn test_press_then_owner_flag_keeps_single_listener() {
        let capture = PointerCapture::new();
        let mut control = RangeControl::new( &capture, seek_props( 0.0, 100.0 ) );
        control.set_geometry( track( 0.0, 100.0 ) );

        control.pointer_down( 30.0 );
        control.set_props( RangeProps { dragging: true, ..seek_props( 30.0, 100.0 ) } );
        assert_eq!( capture.listeners().len(), 1 );

        control.pointer_up();
        control.set_props( seek_props( 30.0, 100.0 ) );
        assert!( capture.is_empty() );
    }


    #[test]
    fn test_external_value_ignored_while_dragging() {
        let capture = PointerCapture::new();
        let mut control = RangeControl::new( &capture, seek_props( 0.0, 100.0 ) );
        control.set_geometry( track( 0.0, 200.0 ) );
        control.pointer_down( 100.0 );

        control.set_props( seek_props( 10.0, 100.0 ) );
        assert_eq!( control.pixel_offset(), 100.0 );

        control.pointer_up();
        control.set_props( seek_props( 10.0, 100.0 ) );
        assert_eq!( control.pixel_offset(), 20.0 );
    }


    #[test]
    fn test_resize_recomputes_offset_from_value() {
        let capture = PointerCapture::new();
        let mut control = RangeControl::new( &capture, seek_props( 45.0, 180.0 ) );

        control.set_geometry( track( 0.0, 100.0 ) );
        assert_eq!( control.pixel_offset(), 25.0 );

        control.set_geometry( track( 5.0, 40.0 ) );
        assert_eq!( control.pixel_offset(), 10.0 );
    }


    #[test]
    fn test_zero_max_renders_at_origin() {
        let capture = PointerCapture::new();
        let mut control = RangeControl::new( &capture, seek_props( 30.0, 0.0 ) );
        control.set_geometry( track( 0.0, 100.0 ) );

        assert_eq!( control.pixel_offset(), 0.0 );
    }


    #[test]
    fn test_unmeasured_track_yields_min() {
        let capture = PointerCapture::new();
        let mut control = RangeControl::new( &capture, seek_props( 0.0, 180.0 ) );

        let events = control.pointer_down( 75.0 );
        assert_eq!( events[ 0 ], RangeEvent::Changed( 0.0 ) );
    }


    #[test]
    fn test_active_is_hover_or_drag() {
        let capture = PointerCapture::new();
        let mut control = RangeControl::new( &capture, seek_props( 0.0, 100.0 ) );
        control.set_geometry( track( 0.0, 100.0 ) );
        assert!( !control.is_active() );

        control.set_hovering( true );
        assert!( control.is_active() );

        control.set_hovering( false );
        control.pointer_down( 5.0 );
        assert!( control.is_active() );

        control.pointer_up();
        assert!( !control.is_active() );
    }


    #[test]
    fn test_geometry_contains() {
        let geometry = TrackGeometry { left: 10.0, top: 4.0, width: 20.0, height: 1.0 };
        assert!( geometry.contains( 10.0, 4.0 ) );
        assert!( geometry.contains( 30.0, 4.0 ) );
        assert!( !geometry.contains( 30.5, 4.0 ) );
        assert!( !geometry.contains( 15.0, 5.0 ) );
    }


    #[test]
    fn test_capture_names_only_the_pressed_control() {
        let capture = PointerCapture::new();
        let mut seek = RangeControl::new( &capture, seek_props( 0.0, 180.0 ) );
        let mut volume = RangeControl::new( &capture, seek_props( 20.0, 100.0 ) );
        seek.set_geometry( TrackGeometry { left: 0.0, top: 0.0, width: 99.0, height: 1.0 } );
        volume.set_geometry( TrackGeometry { left: 0.0, top: 1.0, width: 99.0, height: 1.0 } );

        assert!( volume.is_under( 99.0, 1.0 ) );
        assert!( !seek.is_under( 40.0, 1.0 ) );
        volume.pointer_down( 40.0 );

        // Moves far off the volume row still belong to the volume bar
        assert_eq!( capture.listeners(), vec![ volume.id() ] );
        assert_eq!( volume.pointer_move( 60.0 ), Some( RangeEvent::Changed( 60.0 / 99.0 * 100.0 ) ) );
        assert_eq!( seek.pointer_move( 60.0 ), None );

        volume.pointer_up();
        assert!( capture.listeners().is_empty() );
    }
}
