//! Baseline configuration used for new drafts and merge fallback

use super::schema::{FieldPath, FieldValue, FilteringType, ValueSet};

/// Default value for a single field
pub const fn default_value(path: FieldPath) -> FieldValue {
    match path {
        FieldPath::TrackerWaist
        | FieldPath::TrackerChest
        | FieldPath::TrackerFeet
        | FieldPath::TrackerKnees
        | FieldPath::TrackerElbows
        | FieldPath::TrackerHands => FieldValue::Bool(false),
        FieldPath::FilteringType => FieldValue::Choice(FilteringType::None as i32),
        FieldPath::FilteringAmount => FieldValue::Number(0.1),
        FieldPath::ExtendedSpine | FieldPath::ExtendedPelvis | FieldPath::ExtendedKnee => {
            FieldValue::Bool(true)
        }
        FieldPath::ForceArmsFromHmd | FieldPath::FloorClip | FieldPath::SkatingCorrection => {
            FieldValue::Bool(false)
        }
        FieldPath::TapResetEnabled => FieldValue::Bool(false),
        FieldPath::TapResetDelay => FieldValue::Number(0.2),
        FieldPath::CorrectionStrength => FieldValue::Number(0.3),
        FieldPath::Devmode => FieldValue::Bool(false),
        FieldPath::WatchNewDevices => FieldValue::Bool(true),
    }
}

/// Complete default configuration. Same result on every call.
pub fn defaults() -> ValueSet {
    FieldPath::ALL
        .into_iter()
        .map(|path| (path, default_value(path)))
        .collect()
}
