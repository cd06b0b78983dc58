//! Value ↔ pixel offset mapping
//!
//! Pure conversions between a domain value in `[min, max]` and an offset
//! along a track of a given length. Degenerate ranges and tracks map to the
//! lower bound instead of dividing by zero.


/// Converts a domain value to an offset along the track.
///
/// Returns `0.0` when `max == min`. The result is clamped to `[0, track_length]`.
pub fn to_offset( value: f64, min: f64, max: f64, track_length: f64 ) -> f64 {
    if max == min {
        return 0.0;
    }

    let offset = ( ( value - min ) / ( max - min ) ) * track_length;
    offset.clamp( 0.0, track_length.max( 0.0 ) )
}


/// Converts an offset along the track back to a domain value.
///
/// Returns `min` when the track has no length. The result is clamped to `[min, max]`.
pub fn to_value( offset: f64, min: f64, max: f64, track_length: f64 ) -> f64 {
    if track_length == 0.0 {
        return min;
    }

    let value = min + ( offset / track_length ) * ( max - min );
    let ( lo, hi ) = if min <= max { ( min, max ) } else { ( max, min ) };
    value.clamp( lo, hi )
}


#[cfg( test )]
mod tests {
    use super::*;


    fn close( a: f64, b: f64 ) -> bool {
        let scale = a.abs().max( b.abs() ).max( 1.0 );
        ( a - b ).abs() <= 1e-6 * scale
    }


    #[test]
    fn test_round_trip_within_range() {
        let ranges = [ ( 0.0, 180.0 ), ( 0.0, 100.0 ), ( -20.0, 20.0 ), ( 3.5, 3.75 ) ];
        let tracks = [ 1.0, 37.0, 240.0, 1920.0 ];

        for &( min, max ) in &ranges {
            for &track in &tracks {
                for step in 0..=50 {
                    let v = min + ( max - min ) * step as f64 / 50.0;
                    let back = to_value( to_offset( v, min, max, track ), min, max, track );
                    assert!( close( v, back ), "v={} back={} range=[{},{}] track={}", v, back, min, max, track );
                }
            }
        }
    }


    #[test]
    fn test_zero_length_track_returns_min() {
        assert_eq!( to_value( 0.0, 5.0, 10.0, 0.0 ), 5.0 );
        assert_eq!( to_value( 42.0, 5.0, 10.0, 0.0 ), 5.0 );
        assert_eq!( to_value( -3.0, 0.0, 180.0, 0.0 ), 0.0 );
    }


    #[test]
    fn test_degenerate_range_returns_zero_offset() {
        assert_eq!( to_offset( 0.0, 0.0, 0.0, 300.0 ), 0.0 );
        assert_eq!( to_offset( 50.0, 0.0, 0.0, 300.0 ), 0.0 );
        assert_eq!( to_offset( 7.0, 7.0, 7.0, 10.0 ), 0.0 );
    }


    #[test]
    fn test_offset_is_clamped_to_track() {
        assert_eq!( to_offset( 200.0, 0.0, 100.0, 50.0 ), 50.0 );
        assert_eq!( to_offset( -10.0, 0.0, 100.0, 50.0 ), 0.0 );
        assert_eq!( to_offset( 50.0, 0.0, 100.0, 50.0 ), 25.0 );
    }


    #[test]
    fn test_value_is_clamped_to_range() {
        assert_eq!( to_value( 500.0, 0.0, 180.0, 100.0 ), 180.0 );
        assert_eq!( to_value( -5.0, 0.0, 180.0, 100.0 ), 0.0 );
        assert_eq!( to_value( 25.0, 0.0, 180.0, 100.0 ), 45.0 );
    }
}
