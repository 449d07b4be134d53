//! Path encoding and shaping.

use realtime::{Error, LatLng, Result};

const PRECISION: f64 = 1e5;

/// Decodes an encoded polyline (precision 1e5).
///
/// # Errors
///
/// Returns [`Error::InvalidFormat`] when the input is truncated or contains
/// characters outside the encoding alphabet.
pub fn decode(encoded: &str) -> Result<Vec<LatLng>> {
    let mut points = Vec::new();
    let mut bytes = encoded.bytes();
    let (mut lat, mut lng) = (0_i64, 0_i64);

    loop {
        let Some(d_lat) = next_value(&mut bytes)? else {
            break;
        };
        let Some(d_lng) = next_value(&mut bytes)? else {
            return Err(Error::InvalidFormat("polyline ends mid-coordinate".to_string()));
        };
        lat += d_lat;
        lng += d_lng;

        #[allow(clippy::cast_precision_loss)]
        points.push(LatLng::new(lat as f64 / PRECISION, lng as f64 / PRECISION));
    }

    Ok(points)
}

fn next_value(bytes: &mut impl Iterator<Item = u8>) -> Result<Option<i64>> {
    let mut result = 0_i64;
    let mut shift = 0;

    let Some(mut byte) = bytes.next() else {
        return Ok(None);
    };
    loop {
        if !(63..127).contains(&byte) {
            return Err(Error::InvalidFormat(format!("invalid polyline byte {byte}")));
        }
        if shift > 60 {
            return Err(Error::InvalidFormat("polyline value overflows".to_string()));
        }

        let chunk = i64::from(byte - 63);
        result |= (chunk & 0x1f) << shift;
        shift += 5;
        if chunk < 0x20 {
            break;
        }

        byte = bytes
            .next()
            .ok_or_else(|| Error::InvalidFormat("polyline ends mid-value".to_string()))?;
    }

    Ok(Some(if result & 1 == 1 { !(result >> 1) } else { result >> 1 }))
}

/// Chaikin corner cutting. Keeps both endpoints; each pass replaces every
/// interior corner with two points at 1/4 and 3/4 along its segments.
#[must_use]
pub fn smooth(path: &[LatLng], passes: usize) -> Vec<LatLng> {
    let mut current = path.to_vec();
    for _ in 0..passes {
        if current.len() < 3 {
            break;
        }

        let mut next = Vec::with_capacity(current.len() * 2);
        next.push(current[0]);
        for pair in current.windows(2) {
            next.push(pair[0].lerp(&pair[1], 0.25));
            next.push(pair[0].lerp(&pair[1], 0.75));
        }
        if let Some(last) = current.last() {
            next.push(*last);
        }
        current = next;
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_reference_polyline() {
        let points = decode("_p~iF~ps|U_ulLnnqC_mqNvxq`@").expect("valid polyline");

        assert_eq!(points.len(), 3);
        let expected = [(38.5, -120.2), (40.7, -120.95), (43.252, -126.453)];
        for (point, (lat, lng)) in points.iter().zip(expected) {
            assert!((point.lat - lat).abs() < 1e-9, "{point:?}");
            assert!((point.lng - lng).abs() < 1e-9, "{point:?}");
        }
    }

    #[test]
    fn empty_polyline() {
        assert!(decode("").expect("valid").is_empty());
    }

    #[test]
    fn rejects_truncated_input() {
        assert!(matches!(decode("_p~iF"), Err(Error::InvalidFormat(_))));
        assert!(matches!(decode("_p~iF~ps|"), Err(Error::InvalidFormat(_))));
        assert!(matches!(decode("_p~iF\u{7f}"), Err(Error::InvalidFormat(_))));
    }

    #[test]
    fn smoothing_keeps_endpoints() {
        let path = [LatLng::new(0.0, 0.0), LatLng::new(0.0, 1.0), LatLng::new(1.0, 1.0)];
        let smoothed = smooth(&path, 2);

        assert_eq!(smoothed.first(), path.first());
        assert_eq!(smoothed.last(), path.last());
        assert!(smoothed.len() > path.len());
        assert!(!smoothed.contains(&LatLng::new(0.0, 1.0)));
    }

    #[test]
    fn short_paths_are_unchanged() {
        let path = [LatLng::new(0.0, 0.0), LatLng::new(0.0, 1.0)];
        assert_eq!(smooth(&path, 3), path.to_vec());
    }
}
