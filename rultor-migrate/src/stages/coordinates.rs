//! Stage 1: extract `coordinates` from the legacy `pulse` identifier
//!
//! Three encodings of `pulse` are known, each carrying owner, rule and
//! scheduled time:
//!
//! | encoding          | example                                                    |
//! |-------------------|------------------------------------------------------------|
//! | `urn:` colon form | `urn:facebook:1:rule-x:2013-08-28T18:05:00Z`               |
//! | space form        | `2013-08-29T19:25:00Z urn:facebook:1 rule-x`               |
//! | `2013` colon form | `2013-08-28T20:35:00Z:urn:facebook:1:rule-x`               |
//!
//! Colon forms are split positionally. The timestamp itself contains two
//! colons, so "three parts" of a colon form is one whole timestamp.

use super::{Outcome, Stage};
use rultor_common::db::{Document, Predicate};
use rultor_common::model::{ATTR_COORDS, ATTR_PULSE};
use rultor_common::Coordinates;
use serde_json::Value;
use tracing::{info, warn};

/// Parse a legacy pulse identifier
///
/// Returns `None` for any unrecognized shape, including the known shapes
/// with too few parts or an empty component.
pub fn extract_coordinates(pulse: &str) -> Option<Coordinates> {
    let coords = if pulse.starts_with("urn:") {
        let parts: Vec<&str> = pulse.split(':').collect();
        if parts.len() < 7 {
            return None;
        }
        Coordinates::new(parts[0..3].join(":"), parts[3], parts[4..].join(":"))
    } else if pulse.contains(' ') {
        let parts: Vec<&str> = pulse.split(' ').collect();
        if parts.len() < 3 {
            return None;
        }
        Coordinates::new(parts[1], parts[2], parts[0])
    } else if pulse.starts_with("2013") {
        let parts: Vec<&str> = pulse.split(':').collect();
        if parts.len() < 7 {
            return None;
        }
        Coordinates::new(parts[3..6].join(":"), parts[6], parts[0..3].join(":"))
    } else {
        return None;
    };

    coords.is_complete().then_some(coords)
}

/// Sets `coordinates` on every document that still only has a `pulse`
#[derive(Debug, Default, Clone, Copy)]
pub struct ExtractCoordinates;

impl Stage for ExtractCoordinates {
    fn name(&self) -> String {
        "extract-coordinates".to_string()
    }

    fn selector(&self) -> Predicate {
        Predicate::missing(ATTR_COORDS).and(Predicate::exists(ATTR_PULSE))
    }

    fn apply(&self, doc: &Document) -> Outcome {
        let Some(pulse) = doc.get(ATTR_PULSE).and_then(Value::as_str) else {
            warn!("{}: pulse is not a string - skipping", doc.id);
            return Outcome::Skip("pulse is not a string".to_string());
        };

        match extract_coordinates(pulse) {
            Some(coords) => {
                info!("{}: '{}' -> {}", doc.id, pulse, coords);
                Outcome::set(ATTR_COORDS, coords.to_value())
            }
            None => {
                warn!("{}: unrecognized pulse format '{}'", doc.id, pulse);
                Outcome::Skip(format!("unrecognized pulse format '{}'", pulse))
            }
        }
    }
}
