//! # Tagged Line Decoder
//!
//! Decodes the free-text lines printed by the BNO055 sketch. Each line names
//! one category with a short tag and carries its values as decimal numbers:
//!
//! ```text
//! print start
//! eul analog 12.50 -3.20 0.10
//! qua analog 0.9990 0.0010 -0.0200 0.0300
//! acc analog -1.23 4.56 0.00
//! print end
//! ```
//!
//! Only numbers with a decimal point are extracted (`-?[0-9]+\.[0-9]+`), so an
//! integer-valued token such as `0` is skipped. The sensor firmware always
//! prints fixed-point values.

use regex::Regex;
use std::sync::OnceLock;

use super::reading::{Category, Euler, Quaternion, Reading, Vector3};
use super::DecodeOutcome;

/// Frame markers emitted around each burst of category lines
pub const FRAME_MARKERS: &[&str] = &["print start", "print end"];

/// Category tags, in the order they are matched
pub const CATEGORY_TAGS: &[(&str, Category)] = &[
    ("acc analog", Category::Accelerometer),
    ("mag analog", Category::Magnetometer),
    ("gyr analog", Category::Gyroscope),
    ("lia analog", Category::LinearAcceleration),
    ("grv analog", Category::Gravity),
    ("eul analog", Category::Orientation),
    ("qua analog", Category::Quaternion),
];

fn decimal_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"-?[0-9]+\.[0-9]+").expect("decimal pattern is valid"))
}

/// Values needed for a category
pub fn arity(category: Category) -> usize {
    match category {
        Category::Quaternion => 4,
        _ => 3,
    }
}

/// Find the category tag carried by a line
pub fn find_category(line: &str) -> Option<Category> {
    CATEGORY_TAGS
        .iter()
        .find(|(tag, _)| line.contains(tag))
        .map(|&(_, category)| category)
}

/// Whether a line is a frame marker rather than data
///
/// A marker only counts at the start of the line; data lines that happen to
/// end with a marker are still decoded.
pub fn is_frame_marker(line: &str) -> bool {
    FRAME_MARKERS.iter().any(|marker| line.starts_with(marker))
}

/// Extract every finite decimal number in a line, in order
///
/// Tokens too long to fit an `f64` (parsing to infinity) are skipped.
pub fn extract_decimals(line: &str) -> Vec<f64> {
    decimal_pattern()
        .find_iter(line)
        .filter_map(|m| m.as_str().parse::<f64>().ok())
        .filter(|value| value.is_finite())
        .collect()
}

/// Decode one tagged text line
///
/// # Examples
///
/// ```
/// use imu_bridge::protocol::text::decode_line;
/// use imu_bridge::protocol::DecodeOutcome;
///
/// match decode_line("eul analog 12.50 -3.20 0.10") {
///     DecodeOutcome::Decoded(reading) => {
///         let euler = reading.orientation.unwrap();
///         assert_eq!(euler.heading, 12.5);
///     }
///     other => panic!("unexpected outcome: {:?}", other),
/// }
/// ```
pub fn decode_line(line: &str) -> DecodeOutcome {
    let line = line.trim();

    if is_frame_marker(line) {
        return DecodeOutcome::Ignored;
    }

    let Some(category) = find_category(line) else {
        return DecodeOutcome::Ignored;
    };

    let values = extract_decimals(line);
    if values.len() < arity(category) {
        return DecodeOutcome::Ignored;
    }

    let vector = || Vector3::new(values[0], values[1], values[2]);
    let mut reading = Reading::default();
    match category {
        Category::Orientation => {
            reading.orientation = Some(Euler::new(values[0], values[1], values[2]));
        }
        Category::Quaternion => {
            reading.quaternion = Some(Quaternion::new(values[0], values[1], values[2], values[3]));
        }
        Category::Accelerometer => reading.acceleration = Some(vector()),
        Category::Magnetometer => reading.magnetometer = Some(vector()),
        Category::Gyroscope => reading.gyroscope = Some(vector()),
        Category::LinearAcceleration => reading.linear_acceleration = Some(vector()),
        Category::Gravity => reading.gravity = Some(vector()),
        // No text tag maps to the barometer
        Category::Environment => return DecodeOutcome::Ignored,
    }

    DecodeOutcome::Decoded(reading)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decoded(line: &str) -> Reading {
        match decode_line(line) {
            DecodeOutcome::Decoded(reading) => reading,
            other => panic!("expected Decoded for {:?}, got {:?}", line, other),
        }
    }

    #[test]
    fn test_acceleration_line() {
        let reading = decoded("acc analog -1.23 4.56 0.00");
        assert_eq!(reading.acceleration, Some(Vector3::new(-1.23, 4.56, 0.0)));
        assert_eq!(reading.categories(), vec![Category::Accelerometer]);
    }

    #[test]
    fn test_euler_line_with_trailing_marker() {
        let reading = decoded("eul analog 12.50 -3.20 0.10 print end");
        assert_eq!(reading.orientation, Some(Euler::new(12.5, -3.2, 0.1)));
        assert_eq!(reading.field_count(), 3);
    }

    #[test]
    fn test_quaternion_needs_four_values() {
        let reading = decoded("qua analog 0.9990 0.0010 -0.0200 0.0300");
        assert_eq!(reading.quaternion, Some(Quaternion::new(0.999, 0.001, -0.02, 0.03)));

        assert_eq!(decode_line("qua analog 0.9990 0.0010 -0.0200"), DecodeOutcome::Ignored);
    }

    #[test]
    fn test_each_vector_tag() {
        assert!(decoded("mag analog 1.0 2.0 3.0").magnetometer.is_some());
        assert!(decoded("gyr analog 1.0 2.0 3.0").gyroscope.is_some());
        assert!(decoded("lia analog 1.0 2.0 3.0").linear_acceleration.is_some());
        assert!(decoded("grv analog 1.0 2.0 3.0").gravity.is_some());
    }

    #[test]
    fn test_frame_markers_ignored() {
        assert_eq!(decode_line("print start"), DecodeOutcome::Ignored);
        assert_eq!(decode_line("  print end\r\n"), DecodeOutcome::Ignored);
    }

    #[test]
    fn test_untagged_line_ignored() {
        assert_eq!(decode_line("calibration 3 3 3 3"), DecodeOutcome::Ignored);
        assert_eq!(decode_line(""), DecodeOutcome::Ignored);
        assert_eq!(decode_line("1.0 2.0 3.0"), DecodeOutcome::Ignored);
    }

    #[test]
    fn test_under_matched_line_ignored() {
        assert_eq!(decode_line("acc analog 1.00 2.00"), DecodeOutcome::Ignored);
    }

    #[test]
    fn test_integers_are_not_extracted() {
        // "0" has no decimal point, so only two values remain
        assert_eq!(decode_line("acc analog 1.50 -2.25 0"), DecodeOutcome::Ignored);
        assert_eq!(extract_decimals("a 1 2.5 -3 -4.75"), vec![2.5, -4.75]);
    }

    #[test]
    fn test_overflowing_token_skipped() {
        let huge = format!("9{}.5", "9".repeat(400));
        assert_eq!(extract_decimals(&format!("{} 1.5", huge)), vec![1.5]);

        // Only two finite values remain, so the line is under-matched
        let line = format!("acc analog {} 2.00 3.00", huge);
        assert_eq!(decode_line(&line), DecodeOutcome::Ignored);

        let line = format!("gyr analog 1.00 {} 2.00 3.00", huge);
        assert_eq!(decoded(&line).gyroscope, Some(Vector3::new(1.0, 2.0, 3.0)));
    }

    #[test]
    fn test_extra_values_take_first() {
        let reading = decoded("gyr analog 0.10 0.20 0.30 0.40");
        assert_eq!(reading.gyroscope, Some(Vector3::new(0.1, 0.2, 0.3)));
    }

    #[test]
    fn test_tag_order_first_match_wins() {
        // Both tags present; "acc analog" is checked before "eul analog"
        let reading = decoded("eul analog acc analog 1.0 2.0 3.0");
        assert!(reading.acceleration.is_some());
        assert!(reading.orientation.is_none());
    }
}
