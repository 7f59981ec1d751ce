//! # Comma-Separated Record Decoder
//!
//! Decodes the fixed nine-field record printed by the BNO055 + BMP280 sketch:
//!
//! ```text
//! heading,roll,pitch,temperature,pressure,altitude,accX,accY,accZ
//! 359.94,-1.25,0.56,23.41,101325.00,12.30,0.12,-0.03,9.81
//! ```
//!
//! Parsing is all-or-nothing: a wrong field count or any field that is not a
//! finite number rejects the whole record.

use super::reading::{Environment, Euler, Reading, Vector3};
use super::DecodeOutcome;

/// Number of fields in a record
pub const FIELD_COUNT: usize = 9;

/// Field names in wire order
pub const FIELD_NAMES: [&str; FIELD_COUNT] = [
    "heading",
    "roll",
    "pitch",
    "temperature",
    "pressure",
    "altitude",
    "accX",
    "accY",
    "accZ",
];

/// Decode one comma-separated record
pub fn decode_record(record: &str) -> DecodeOutcome {
    let parts: Vec<&str> = record.trim().split(',').collect();
    if parts.len() != FIELD_COUNT {
        return DecodeOutcome::Malformed(format!(
            "expected {} fields, got {}",
            FIELD_COUNT,
            parts.len()
        ));
    }

    let mut values = [0.0f64; FIELD_COUNT];
    for (i, part) in parts.iter().enumerate() {
        match part.trim().parse::<f64>() {
            Ok(value) if value.is_finite() => values[i] = value,
            _ => {
                return DecodeOutcome::Malformed(format!(
                    "field {} is not a number: {:?}",
                    FIELD_NAMES[i], part
                ));
            }
        }
    }

    DecodeOutcome::Decoded(Reading {
        orientation: Some(Euler::new(values[0], values[1], values[2])),
        environment: Some(Environment {
            temperature: values[3],
            pressure: values[4],
            altitude: values[5],
        }),
        acceleration: Some(Vector3::new(values[6], values[7], values[8])),
        ..Reading::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::reading::Category;

    #[test]
    fn test_valid_record() {
        let outcome = decode_record("359.94,-1.25,0.56,23.41,101325.00,12.30,0.12,-0.03,9.81\r\n");
        let DecodeOutcome::Decoded(reading) = outcome else {
            panic!("expected Decoded, got {:?}", outcome);
        };

        assert_eq!(reading.orientation, Some(Euler::new(359.94, -1.25, 0.56)));
        let env = reading.environment.unwrap();
        assert_eq!(env.temperature, 23.41);
        assert_eq!(env.pressure, 101325.0);
        assert_eq!(env.altitude, 12.3);
        assert_eq!(reading.acceleration, Some(Vector3::new(0.12, -0.03, 9.81)));
        assert_eq!(
            reading.categories(),
            vec![Category::Orientation, Category::Accelerometer, Category::Environment]
        );
        assert_eq!(reading.field_count(), FIELD_COUNT);
    }

    #[test]
    fn test_integer_fields_accepted() {
        let outcome = decode_record("0,0,0,20,101325,0,0,0,9");
        assert!(matches!(outcome, DecodeOutcome::Decoded(_)));
    }

    #[test]
    fn test_spaces_around_fields() {
        let outcome = decode_record("1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0");
        assert!(matches!(outcome, DecodeOutcome::Decoded(_)));
    }

    #[test]
    fn test_wrong_field_count() {
        assert!(matches!(decode_record("1,2,3,4,5,6,7,8"), DecodeOutcome::Malformed(_)));
        assert!(matches!(decode_record("1,2,3,4,5,6,7,8,9,10"), DecodeOutcome::Malformed(_)));
        assert!(matches!(decode_record(""), DecodeOutcome::Malformed(_)));
    }

    #[test]
    fn test_non_numeric_field_rejects_record() {
        let outcome = decode_record("1.0,2.0,3.0,warm,5.0,6.0,7.0,8.0,9.0");
        match outcome {
            DecodeOutcome::Malformed(reason) => assert!(reason.contains("temperature")),
            other => panic!("expected Malformed, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_field_rejects_record() {
        let outcome = decode_record("1.0,2.0,3.0,4.0,,6.0,7.0,8.0,9.0");
        assert!(matches!(outcome, DecodeOutcome::Malformed(_)));
    }

    #[test]
    fn test_non_finite_rejected() {
        assert!(matches!(
            decode_record("NaN,2.0,3.0,4.0,5.0,6.0,7.0,8.0,9.0"),
            DecodeOutcome::Malformed(_)
        ));
        assert!(matches!(
            decode_record("1.0,2.0,3.0,inf,5.0,6.0,7.0,8.0,9.0"),
            DecodeOutcome::Malformed(_)
        ));
    }
}
