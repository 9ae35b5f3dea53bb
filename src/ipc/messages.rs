//! IPC message types for client ↔ device communication

use serde::{Deserialize, Serialize};

use crate::settings::{default_value, FieldGroup, FieldPath, ValueSet};

/// Raw key/value map for one protocol group, as reported by the device
pub type RawGroup = serde_json::Map<String, serde_json::Value>;

/// Requests sent from the client to the device
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// Ask for the device's complete current settings
    SettingsRequest,

    /// Replace the device settings with the full local draft
    ChangeSettings(ChangeSettingsRequest),
}

/// Messages sent from the device to clients
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// Full or partial settings report.
    /// Sent as a reply to `SettingsRequest`, after every change, or unsolicited.
    SettingsResponse(SettingsResponse),
}

// ==============================================================================
// Outbound commit (strictly typed, always complete)
// ==============================================================================

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChangeSettingsRequest {
    pub steam_vr_trackers: SteamVrTrackers,
    pub model_settings: ModelSettings,
    pub tap_detection_settings: TapDetectionSettings,
    pub filtering: FilteringSettings,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct SteamVrTrackers {
    pub waist: bool,
    pub chest: bool,
    pub feet: bool,
    pub knees: bool,
    pub elbows: bool,
    pub hands: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModelSettings {
    pub toggles: ModelToggles,
    pub leg_tweaks: LegTweaksSettings,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModelToggles {
    pub extended_spine: bool,
    pub extended_pelvis: bool,
    pub extended_knee: bool,
    pub force_arms_from_hmd: bool,
    pub floor_clip: bool,
    pub skating_correction: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LegTweaksSettings {
    pub correction_strength: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TapDetectionSettings {
    pub tap_reset_enabled: bool,
    pub tap_reset_delay: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct FilteringSettings {
    #[serde(rename = "type")]
    pub kind: i32,
    pub amount: f64,
}

fn flag(values: &ValueSet, path: FieldPath) -> bool {
    values
        .bool(path)
        .or_else(|| default_value(path).as_bool())
        .unwrap_or_default()
}

fn number(values: &ValueSet, path: FieldPath) -> f64 {
    values
        .number(path)
        .or_else(|| default_value(path).as_number())
        .unwrap_or_default()
}

fn choice(values: &ValueSet, path: FieldPath) -> i32 {
    values
        .choice(path)
        .or_else(|| default_value(path).as_choice())
        .unwrap_or_default()
}

impl ChangeSettingsRequest {
    /// Partition a value set into the protocol groups.
    /// Missing fields are filled from the defaults.
    pub fn from_values(values: &ValueSet) -> Self {
        Self {
            steam_vr_trackers: SteamVrTrackers {
                waist: flag(values, FieldPath::TrackerWaist),
                chest: flag(values, FieldPath::TrackerChest),
                feet: flag(values, FieldPath::TrackerFeet),
                knees: flag(values, FieldPath::TrackerKnees),
                elbows: flag(values, FieldPath::TrackerElbows),
                hands: flag(values, FieldPath::TrackerHands),
            },
            model_settings: ModelSettings {
                toggles: ModelToggles {
                    extended_spine: flag(values, FieldPath::ExtendedSpine),
                    extended_pelvis: flag(values, FieldPath::ExtendedPelvis),
                    extended_knee: flag(values, FieldPath::ExtendedKnee),
                    force_arms_from_hmd: flag(values, FieldPath::ForceArmsFromHmd),
                    floor_clip: flag(values, FieldPath::FloorClip),
                    skating_correction: flag(values, FieldPath::SkatingCorrection),
                },
                leg_tweaks: LegTweaksSettings {
                    correction_strength: number(values, FieldPath::CorrectionStrength),
                },
            },
            tap_detection_settings: TapDetectionSettings {
                tap_reset_enabled: flag(values, FieldPath::TapResetEnabled),
                tap_reset_delay: number(values, FieldPath::TapResetDelay),
            },
            filtering: FilteringSettings {
                kind: choice(values, FieldPath::FilteringType),
                amount: number(values, FieldPath::FilteringAmount),
            },
        }
    }

    /// Flatten back into a value set of every device-side field
    pub fn to_values(&self) -> ValueSet {
        use crate::settings::FieldValue::{Bool, Choice, Number};

        let trackers = &self.steam_vr_trackers;
        let toggles = &self.model_settings.toggles;
        [
            (FieldPath::TrackerWaist, Bool(trackers.waist)),
            (FieldPath::TrackerChest, Bool(trackers.chest)),
            (FieldPath::TrackerFeet, Bool(trackers.feet)),
            (FieldPath::TrackerKnees, Bool(trackers.knees)),
            (FieldPath::TrackerElbows, Bool(trackers.elbows)),
            (FieldPath::TrackerHands, Bool(trackers.hands)),
            (FieldPath::FilteringType, Choice(self.filtering.kind)),
            (FieldPath::FilteringAmount, Number(self.filtering.amount)),
            (FieldPath::ExtendedSpine, Bool(toggles.extended_spine)),
            (FieldPath::ExtendedPelvis, Bool(toggles.extended_pelvis)),
            (FieldPath::ExtendedKnee, Bool(toggles.extended_knee)),
            (FieldPath::ForceArmsFromHmd, Bool(toggles.force_arms_from_hmd)),
            (FieldPath::FloorClip, Bool(toggles.floor_clip)),
            (FieldPath::SkatingCorrection, Bool(toggles.skating_correction)),
            (FieldPath::TapResetEnabled, Bool(self.tap_detection_settings.tap_reset_enabled)),
            (FieldPath::TapResetDelay, Number(self.tap_detection_settings.tap_reset_delay)),
            (
                FieldPath::CorrectionStrength,
                Number(self.model_settings.leg_tweaks.correction_strength),
            ),
        ]
        .into_iter()
        .collect()
    }
}

// ==============================================================================
// Inbound report (lenient: any group or key may be missing or malformed)
// ==============================================================================

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SettingsResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steam_vr_trackers: Option<RawGroup>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_settings: Option<RawModelSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tap_detection_settings: Option<RawGroup>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filtering: Option<RawGroup>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawModelSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toggles: Option<RawGroup>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leg_tweaks: Option<RawGroup>,
}

impl SettingsResponse {
    /// Build a report carrying every device-side field present in `values`.
    /// Groups with no fields are omitted.
    pub fn from_values(values: &ValueSet) -> Self {
        let group = |wanted: FieldGroup| -> Option<RawGroup> {
            let raw: RawGroup = values
                .iter()
                .filter(|(path, _)| path.group() == wanted)
                .map(|(path, value)| (path.key().to_string(), value.to_json()))
                .collect();
            (!raw.is_empty()).then_some(raw)
        };

        let toggles = group(FieldGroup::Toggles);
        let leg_tweaks = group(FieldGroup::LegTweaks);
        let model_settings = (toggles.is_some() || leg_tweaks.is_some())
            .then_some(RawModelSettings { toggles, leg_tweaks });

        Self {
            steam_vr_trackers: group(FieldGroup::Trackers),
            model_settings,
            tap_detection_settings: group(FieldGroup::TapDetection),
            filtering: group(FieldGroup::Filtering),
        }
    }

    /// Present groups paired with their schema group
    pub fn groups(&self) -> Vec<(FieldGroup, &RawGroup)> {
        let model = self.model_settings.as_ref();
        [
            (FieldGroup::Trackers, self.steam_vr_trackers.as_ref()),
            (FieldGroup::Toggles, model.and_then(|m| m.toggles.as_ref())),
            (FieldGroup::LegTweaks, model.and_then(|m| m.leg_tweaks.as_ref())),
            (FieldGroup::TapDetection, self.tap_detection_settings.as_ref()),
            (FieldGroup::Filtering, self.filtering.as_ref()),
        ]
        .into_iter()
        .filter_map(|(group, raw)| raw.map(|raw| (group, raw)))
        .collect()
    }
}
