//! Google's encoded polyline algorithm format.
//!
//! Coordinates are rounded to five decimal places, delta-encoded against the
//! previous point, zig-zag mapped to unsigned integers and written as 5-bit
//! groups offset by 63 (`'?'`), least significant group first.

use crate::entities::Waypoint;

const PRECISION: f64 = 1e5;
const OFFSET: u8 = 63;
const CONTINUATION: u64 = 0x20;
const CHUNK_MASK: u64 = 0x1f;

pub fn encode(waypoints: &[Waypoint]) -> String {
    let mut encoded = String::with_capacity(waypoints.len() * 8);
    let (mut prev_lat, mut prev_lng) = (0i64, 0i64);

    for waypoint in waypoints {
        let lat = scale(waypoint.latitude);
        let lng = scale(waypoint.longitude);

        encode_value(lat.wrapping_sub(prev_lat), &mut encoded);
        encode_value(lng.wrapping_sub(prev_lng), &mut encoded);

        prev_lat = lat;
        prev_lng = lng;
    }

    encoded
}

/// Decodes a polyline. Malformed input never panics: decoding stops at the
/// first incomplete number or byte outside the format's alphabet, keeping
/// the points decoded so far.
pub fn decode(encoded: &str) -> Vec<Waypoint> {
    let bytes = encoded.as_bytes();
    let mut index = 0;
    let (mut lat, mut lng) = (0i64, 0i64);
    let mut waypoints = vec![];

    while index < bytes.len() {
        let (delta_lat, delta_lng) = match (
            decode_value(bytes, &mut index),
            decode_value(bytes, &mut index),
        ) {
            (Some(delta_lat), Some(delta_lng)) => (delta_lat, delta_lng),
            _ => {
                tracing::debug!("polyline truncated or malformed at byte {}", index);
                break;
            }
        };

        lat = lat.wrapping_add(delta_lat);
        lng = lng.wrapping_add(delta_lng);

        waypoints.push(Waypoint::new(lat as f64 / PRECISION, lng as f64 / PRECISION));
    }

    waypoints
}

fn scale(coordinate: f64) -> i64 {
    (coordinate * PRECISION).round() as i64
}

fn encode_value(delta: i64, encoded: &mut String) {
    let shifted = delta << 1;
    let mut value = (if delta < 0 { !shifted } else { shifted }) as u64;

    while value >= CONTINUATION {
        encoded.push(char::from(((value & CHUNK_MASK) | CONTINUATION) as u8 + OFFSET));
        value >>= 5;
    }

    encoded.push(char::from(value as u8 + OFFSET));
}

fn decode_value(bytes: &[u8], index: &mut usize) -> Option<i64> {
    let mut result: u64 = 0;
    let mut shift = 0u32;

    loop {
        let byte = *bytes.get(*index)?;
        *index += 1;

        if !(OFFSET..=b'~').contains(&byte) || shift >= u64::BITS {
            return None;
        }

        let chunk = (byte - OFFSET) as u64;
        result |= (chunk & CHUNK_MASK) << shift;
        shift += 5;

        if chunk & CONTINUATION == 0 {
            break;
        }
    }

    let value = if result & 1 == 1 {
        !(result >> 1)
    } else {
        result >> 1
    };

    Some(value as i64)
}

#[cfg(test)]
fn points(waypoints: &[Waypoint]) -> Vec<(f64, f64)> {
    waypoints.iter().map(|w| (w.latitude, w.longitude)).collect()
}

#[cfg(test)]
fn assert_close(actual: &[Waypoint], expected: &[(f64, f64)]) {
    assert_eq!(actual.len(), expected.len(), "{:?} vs {:?}", points(actual), expected);

    for (waypoint, &(lat, lng)) in actual.iter().zip(expected) {
        assert!((waypoint.latitude - lat).abs() < 1e-5, "{} vs {}", waypoint.latitude, lat);
        assert!((waypoint.longitude - lng).abs() < 1e-5, "{} vs {}", waypoint.longitude, lng);
    }
}

#[test]
fn encodes_the_reference_example() {
    let waypoints = vec![
        Waypoint::new(38.5, -120.2),
        Waypoint::new(40.7, -120.95),
        Waypoint::new(43.252, -126.453),
    ];

    assert_eq!(encode(&waypoints), "_p~iF~ps|U_ulLnnqC_mqNvxq`@");
}

#[test]
fn decodes_the_reference_example() {
    let decoded = decode("_p~iF~ps|U_ulLnnqC_mqNvxq`@");

    assert_close(&decoded, &[(38.5, -120.2), (40.7, -120.95), (43.252, -126.453)]);
    assert!(decoded.iter().all(|w| w.order_id.is_none() && w.fragment_id.is_none()));
}

#[test]
fn empty_identities() {
    assert_eq!(encode(&[]), "");
    assert_eq!(decode(""), vec![]);
}

#[test]
fn zero_delta_still_emits_a_character() {
    assert_eq!(encode(&[Waypoint::new(0.0, 0.0)]), "??");

    let repeated = encode(&[Waypoint::new(38.5, -120.2), Waypoint::new(38.5, -120.2)]);
    assert!(repeated.ends_with("??"));
    assert_close(&decode(&repeated), &[(38.5, -120.2), (38.5, -120.2)]);
}

#[test]
fn single_waypoint_is_encoded_against_zero() {
    assert_eq!(encode(&[Waypoint::new(38.5, -120.2)]), "_p~iF~ps|U");
}

#[test]
fn boundary_coordinates_round_trip() {
    let expected = [(90.0, 180.0), (-90.0, -180.0), (90.0, -180.0), (-90.0, 180.0)];
    let waypoints: Vec<Waypoint> = expected
        .iter()
        .map(|&(lat, lng)| Waypoint::new(lat, lng))
        .collect();

    assert_close(&decode(&encode(&waypoints)), &expected);
}

#[test]
fn huge_finite_coordinates_do_not_panic() {
    let extremes = [
        vec![Waypoint::new(1e300, 0.0), Waypoint::new(-1e300, 0.0)],
        vec![Waypoint::new(1e14, 0.0), Waypoint::new(-1e14, 0.0)],
        vec![Waypoint::new(f64::MAX, f64::MIN), Waypoint::new(f64::MIN, f64::MAX)],
    ];

    for waypoints in &extremes {
        let encoded = encode(waypoints);

        assert!(!encoded.is_empty());
        assert!(encoded.bytes().all(|b| (OFFSET..=b'~').contains(&b)));
        assert_eq!(decode(&encoded).len(), 2);
    }
}

#[test]
fn random_routes_round_trip() {
    use rand::Rng;

    let mut rng = rand::thread_rng();

    for _ in 0..200 {
        let len = rng.gen_range(0..40);
        let expected: Vec<(f64, f64)> = (0..len)
            .map(|_| {
                let lat: f64 = rng.gen_range(-9_000_000..=9_000_000) as f64 / 1e5;
                let lng: f64 = rng.gen_range(-18_000_000..=18_000_000) as f64 / 1e5;
                (lat, lng)
            })
            .collect();
        let waypoints: Vec<Waypoint> = expected
            .iter()
            .map(|&(lat, lng)| Waypoint::new(lat, lng))
            .collect();

        assert_close(&decode(&encode(&waypoints)), &expected);
    }
}

#[test]
fn malformed_input_keeps_complete_points() {
    // longitude of the second point is missing
    assert_close(&decode("_p~iF~ps|U_ulL"), &[(38.5, -120.2)]);
    // input ends in the middle of a number
    assert_eq!(decode("_p~i"), vec![]);
    // bytes outside the alphabet
    assert_eq!(decode(" !"), vec![]);
    // a number longer than 64 bits
    assert_eq!(decode(&"~".repeat(20)), vec![]);
}
