//! Field schema for the device configuration
//!
//! Every configurable field is a [`FieldPath`] variant with a stable dotted
//! path and a declared [`FieldDomain`]. Fields are never discovered at runtime.

use serde::ser::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Tolerance used when comparing numeric values against range bounds and steps
const NUMERIC_EPSILON: f64 = 1e-6;

/// Protocol groups a field belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FieldGroup {
    Trackers,
    Filtering,
    Toggles,
    TapDetection,
    LegTweaks,
    /// Local UI preferences, never sent to the device
    Interface,
}

impl FieldGroup {
    pub const fn as_str(self) -> &'static str {
        match self {
            FieldGroup::Trackers => "trackers",
            FieldGroup::Filtering => "filtering",
            FieldGroup::Toggles => "toggles",
            FieldGroup::TapDetection => "tapDetection",
            FieldGroup::LegTweaks => "legTweaks",
            FieldGroup::Interface => "interface",
        }
    }
}

/// Skeleton filtering mode reported under `filtering.type`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum FilteringType {
    None = 0,
    Smoothing = 1,
    Prediction = 2,
}

impl FilteringType {
    /// Wire values accepted for `filtering.type`
    pub const VALUES: &'static [i32] = &[
        FilteringType::None as i32,
        FilteringType::Smoothing as i32,
        FilteringType::Prediction as i32,
    ];
}

/// A configurable field, identified by its dotted path
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FieldPath {
    TrackerWaist,
    TrackerChest,
    TrackerFeet,
    TrackerKnees,
    TrackerElbows,
    TrackerHands,
    FilteringType,
    FilteringAmount,
    ExtendedSpine,
    ExtendedPelvis,
    ExtendedKnee,
    ForceArmsFromHmd,
    FloorClip,
    SkatingCorrection,
    TapResetEnabled,
    TapResetDelay,
    CorrectionStrength,
    Devmode,
    WatchNewDevices,
}

impl FieldPath {
    /// All fields in schema order
    pub const ALL: [FieldPath; 19] = [
        FieldPath::TrackerWaist,
        FieldPath::TrackerChest,
        FieldPath::TrackerFeet,
        FieldPath::TrackerKnees,
        FieldPath::TrackerElbows,
        FieldPath::TrackerHands,
        FieldPath::FilteringType,
        FieldPath::FilteringAmount,
        FieldPath::ExtendedSpine,
        FieldPath::ExtendedPelvis,
        FieldPath::ExtendedKnee,
        FieldPath::ForceArmsFromHmd,
        FieldPath::FloorClip,
        FieldPath::SkatingCorrection,
        FieldPath::TapResetEnabled,
        FieldPath::TapResetDelay,
        FieldPath::CorrectionStrength,
        FieldPath::Devmode,
        FieldPath::WatchNewDevices,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            FieldPath::TrackerWaist => "trackers.waist",
            FieldPath::TrackerChest => "trackers.chest",
            FieldPath::TrackerFeet => "trackers.feet",
            FieldPath::TrackerKnees => "trackers.knees",
            FieldPath::TrackerElbows => "trackers.elbows",
            FieldPath::TrackerHands => "trackers.hands",
            FieldPath::FilteringType => "filtering.type",
            FieldPath::FilteringAmount => "filtering.amount",
            FieldPath::ExtendedSpine => "toggles.extendedSpine",
            FieldPath::ExtendedPelvis => "toggles.extendedPelvis",
            FieldPath::ExtendedKnee => "toggles.extendedKnee",
            FieldPath::ForceArmsFromHmd => "toggles.forceArmsFromHmd",
            FieldPath::FloorClip => "toggles.floorClip",
            FieldPath::SkatingCorrection => "toggles.skatingCorrection",
            FieldPath::TapResetEnabled => "tapDetection.tapResetEnabled",
            FieldPath::TapResetDelay => "tapDetection.tapResetDelay",
            FieldPath::CorrectionStrength => "legTweaks.correctionStrength",
            FieldPath::Devmode => "interface.devmode",
            FieldPath::WatchNewDevices => "interface.watchNewDevices",
        }
    }

    pub const fn group(self) -> FieldGroup {
        match self {
            FieldPath::TrackerWaist
            | FieldPath::TrackerChest
            | FieldPath::TrackerFeet
            | FieldPath::TrackerKnees
            | FieldPath::TrackerElbows
            | FieldPath::TrackerHands => FieldGroup::Trackers,
            FieldPath::FilteringType | FieldPath::FilteringAmount => FieldGroup::Filtering,
            FieldPath::ExtendedSpine
            | FieldPath::ExtendedPelvis
            | FieldPath::ExtendedKnee
            | FieldPath::ForceArmsFromHmd
            | FieldPath::FloorClip
            | FieldPath::SkatingCorrection => FieldGroup::Toggles,
            FieldPath::TapResetEnabled | FieldPath::TapResetDelay => FieldGroup::TapDetection,
            FieldPath::CorrectionStrength => FieldGroup::LegTweaks,
            FieldPath::Devmode | FieldPath::WatchNewDevices => FieldGroup::Interface,
        }
    }

    pub const fn domain(self) -> FieldDomain {
        match self {
            FieldPath::FilteringType => FieldDomain::OneOf(FilteringType::VALUES),
            FieldPath::FilteringAmount | FieldPath::CorrectionStrength => FieldDomain::Range {
                min: 0.1,
                max: 1.0,
                step: 0.1,
            },
            FieldPath::TapResetDelay => FieldDomain::Range {
                min: 0.2,
                max: 3.0,
                step: 0.2,
            },
            _ => FieldDomain::Bool,
        }
    }

    /// Key of this field inside its protocol group (the part after the dot)
    pub fn key(self) -> &'static str {
        let path = self.as_str();
        match path.split_once('.') {
            Some((_, key)) => key,
            None => path,
        }
    }

    /// Local-only fields live in the preferences store, not on the device
    pub const fn is_local_only(self) -> bool {
        matches!(self.group(), FieldGroup::Interface)
    }

    /// Look up a field by protocol group and key
    pub fn from_group_key(group: FieldGroup, key: &str) -> Option<FieldPath> {
        FieldPath::ALL
            .into_iter()
            .find(|path| path.group() == group && path.key() == key)
    }

    /// Parse user input as a value of this field's kind
    pub fn parse_value(self, input: &str) -> Result<FieldValue, FieldError> {
        self.domain()
            .parse(input)
            .ok_or_else(|| FieldError::Unparsable {
                path: self,
                input: input.to_string(),
            })
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldPath {
    type Err = FieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FieldPath::ALL
            .into_iter()
            .find(|path| path.as_str() == s)
            .ok_or_else(|| FieldError::UnknownField(s.to_string()))
    }
}

/// Declared set of acceptable values for a field
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldDomain {
    Bool,
    /// Closed range `[min, max]`, values aligned to `step` from `min`
    Range { min: f64, max: f64, step: f64 },
    /// Enumerated integer set
    OneOf(&'static [i32]),
}

impl FieldDomain {
    pub fn contains(&self, value: &FieldValue) -> bool {
        match (self, value) {
            (FieldDomain::Bool, FieldValue::Bool(_)) => true,
            (FieldDomain::Range { min, max, step }, FieldValue::Number(v)) => {
                if !v.is_finite() || *v < min - NUMERIC_EPSILON || *v > max + NUMERIC_EPSILON {
                    return false;
                }
                let steps = (v - min) / step;
                (steps - steps.round()).abs() < NUMERIC_EPSILON
            }
            (FieldDomain::OneOf(allowed), FieldValue::Choice(v)) => allowed.contains(v),
            _ => false,
        }
    }

    /// Interpret a raw wire value, returning `None` if it is malformed,
    /// empty or outside the domain
    pub fn coerce(&self, raw: &serde_json::Value) -> Option<FieldValue> {
        let value = match self {
            FieldDomain::Bool => FieldValue::Bool(raw.as_bool()?),
            FieldDomain::Range { .. } => FieldValue::Number(raw.as_f64()?),
            FieldDomain::OneOf(_) => FieldValue::Choice(i32::try_from(raw.as_i64()?).ok()?),
        };
        self.contains(&value).then_some(value)
    }

    /// Parse a user-supplied string into a value of this domain's kind.
    /// Domain membership is not checked here.
    pub fn parse(&self, input: &str) -> Option<FieldValue> {
        let input = input.trim();
        match self {
            FieldDomain::Bool => match input.to_ascii_lowercase().as_str() {
                "true" | "on" | "1" | "yes" => Some(FieldValue::Bool(true)),
                "false" | "off" | "0" | "no" => Some(FieldValue::Bool(false)),
                _ => None,
            },
            FieldDomain::Range { .. } => input.parse::<f64>().ok().map(FieldValue::Number),
            FieldDomain::OneOf(_) => input.parse::<i32>().ok().map(FieldValue::Choice),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            FieldDomain::Bool => "expected a boolean".to_string(),
            FieldDomain::Range { min, max, step } => {
                format!("expected a number in [{min}, {max}] with step {step}")
            }
            FieldDomain::OneOf(allowed) => format!("expected one of {allowed:?}"),
        }
    }
}

/// Value held by a single field
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue {
    Bool(bool),
    Number(f64),
    Choice(i32),
}

impl FieldValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_choice(&self) -> Option<i32> {
        match self {
            FieldValue::Choice(v) => Some(*v),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            FieldValue::Bool(v) => serde_json::Value::from(*v),
            FieldValue::Number(v) => serde_json::Value::from(*v),
            FieldValue::Choice(v) => serde_json::Value::from(*v),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Bool(v) => write!(f, "{v}"),
            FieldValue::Number(v) => write!(f, "{v}"),
            FieldValue::Choice(v) => write!(f, "{v}"),
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldValue::Bool(v) => serializer.serialize_bool(*v),
            FieldValue::Number(v) => serializer.serialize_f64(*v),
            FieldValue::Choice(v) => serializer.serialize_i32(*v),
        }
    }
}

/// Errors raised when a value is rejected for a field
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FieldError {
    #[error("invalid value {value} for {path}: {reason}")]
    InvalidFieldValue {
        path: FieldPath,
        value: FieldValue,
        reason: String,
    },

    #[error("unknown field path '{0}'")]
    UnknownField(String),

    #[error("cannot parse '{input}' as a value for {path}")]
    Unparsable { path: FieldPath, input: String },

    #[error("{0} is not editable outside advanced mode")]
    Hidden(FieldPath),
}

/// Ordered collection of field values
///
/// A complete set holds a value for every [`FieldPath`]; a partial set may
/// omit any subset. Iteration follows schema order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueSet {
    values: BTreeMap<FieldPath, FieldValue>,
}

impl ValueSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: FieldPath) -> Option<FieldValue> {
        self.values.get(&path).copied()
    }

    pub fn insert(&mut self, path: FieldPath, value: FieldValue) -> Option<FieldValue> {
        self.values.insert(path, value)
    }

    pub fn contains(&self, path: FieldPath) -> bool {
        self.values.contains_key(&path)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        FieldPath::ALL.iter().all(|path| self.values.contains_key(path))
    }

    pub fn iter(&self) -> impl Iterator<Item = (FieldPath, FieldValue)> + '_ {
        self.values.iter().map(|(path, value)| (*path, *value))
    }

    pub fn bool(&self, path: FieldPath) -> Option<bool> {
        self.get(path).and_then(|v| v.as_bool())
    }

    pub fn number(&self, path: FieldPath) -> Option<f64> {
        self.get(path).and_then(|v| v.as_number())
    }

    pub fn choice(&self, path: FieldPath) -> Option<i32> {
        self.get(path).and_then(|v| v.as_choice())
    }

    /// Keep only the fields matching `keep`
    pub fn filtered(&self, mut keep: impl FnMut(FieldPath) -> bool) -> ValueSet {
        self.iter().filter(|(path, _)| keep(*path)).collect()
    }
}

impl FromIterator<(FieldPath, FieldValue)> for ValueSet {
    fn from_iter<I: IntoIterator<Item = (FieldPath, FieldValue)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

impl Serialize for ValueSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.values.iter().map(|(path, value)| (path.as_str(), value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_paths_round_trip_through_strings() {
        for path in FieldPath::ALL {
            assert_eq!(path.as_str().parse::<FieldPath>().unwrap(), path);
        }
        assert_eq!(
            "trackers.tail".parse::<FieldPath>(),
            Err(FieldError::UnknownField("trackers.tail".to_string()))
        );
    }

    #[test]
    fn test_group_key_lookup() {
        assert_eq!(FieldPath::TapResetDelay.key(), "tapResetDelay");
        assert_eq!(
            FieldPath::from_group_key(FieldGroup::Toggles, "extendedKnee"),
            Some(FieldPath::ExtendedKnee)
        );
        // Same key in the wrong group is not a match
        assert_eq!(FieldPath::from_group_key(FieldGroup::Trackers, "amount"), None);
    }

    #[test]
    fn test_range_domain_bounds_and_step() {
        let domain = FieldPath::TapResetDelay.domain();
        assert!(domain.contains(&FieldValue::Number(0.2)));
        assert!(domain.contains(&FieldValue::Number(3.0)));
        assert!(domain.contains(&FieldValue::Number(1.4)));
        assert!(!domain.contains(&FieldValue::Number(0.0)));
        assert!(!domain.contains(&FieldValue::Number(3.2)));
        assert!(!domain.contains(&FieldValue::Number(0.3)));
        assert!(!domain.contains(&FieldValue::Number(f64::NAN)));
        assert!(!domain.contains(&FieldValue::Bool(true)));
    }

    #[test]
    fn test_enum_domain() {
        let domain = FieldPath::FilteringType.domain();
        assert!(domain.contains(&FieldValue::Choice(2)));
        assert!(!domain.contains(&FieldValue::Choice(3)));
        assert!(!domain.contains(&FieldValue::Number(1.0)));
    }

    #[test]
    fn test_coerce_raw_values() {
        let amount = FieldPath::FilteringAmount.domain();
        assert_eq!(amount.coerce(&json!(0.5)), Some(FieldValue::Number(0.5)));
        assert_eq!(amount.coerce(&json!(1)), Some(FieldValue::Number(1.0)));
        assert_eq!(amount.coerce(&json!(0.0)), None);
        assert_eq!(amount.coerce(&json!("0.5")), None);
        assert_eq!(amount.coerce(&serde_json::Value::Null), None);

        let toggle = FieldPath::FloorClip.domain();
        assert_eq!(toggle.coerce(&json!(false)), Some(FieldValue::Bool(false)));
        assert_eq!(toggle.coerce(&json!(0)), None);

        let filter = FieldPath::FilteringType.domain();
        assert_eq!(filter.coerce(&json!(1)), Some(FieldValue::Choice(1)));
        assert_eq!(filter.coerce(&json!(1.5)), None);
    }

    #[test]
    fn test_parse_user_input() {
        assert_eq!(FieldDomain::Bool.parse("On"), Some(FieldValue::Bool(true)));
        assert_eq!(FieldDomain::Bool.parse("maybe"), None);
        assert_eq!(
            FieldPath::FilteringAmount.domain().parse(" 0.5 "),
            Some(FieldValue::Number(0.5))
        );
        assert_eq!(FieldPath::FilteringType.domain().parse("x"), None);
    }

    #[test]
    fn test_value_set_serializes_as_dotted_map() {
        let set: ValueSet = [
            (FieldPath::FilteringType, FieldValue::Choice(1)),
            (FieldPath::TrackerWaist, FieldValue::Bool(true)),
        ]
        .into_iter()
        .collect();

        let json = serde_json::to_value(&set).unwrap();
        assert_eq!(json, json!({"trackers.waist": true, "filtering.type": 1}));
        assert!(!set.is_complete());
    }
}
