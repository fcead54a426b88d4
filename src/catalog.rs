use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longest pause the synthesis service honours for a single break marker.
pub const MAX_PAUSE_SECS: f64 = 3.0;
pub const MIN_SPEED: f64 = 0.7;
pub const MAX_SPEED: f64 = 1.2;

static PAUSE_MARKER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<break\s+time\s*=\s*"([0-9]*\.?[0-9]+)s"\s*/>"#).expect("valid regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoiceSettings {
    pub stability: f64,
    pub similarity_boost: f64,
    pub style: f64,
    pub use_speaker_boost: bool,
    pub speed: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoicePreset {
    pub name: &'static str,
    pub settings: VoiceSettings,
    pub model_id: &'static str,
    pub voice_id: &'static str,
    pub voice_name: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scenario {
    pub name: &'static str,
    pub preset_name: &'static str,
    pub text: &'static str,
    pub manipulation_target: &'static str,
    pub variant_type: &'static str,
}

const ADAM: &str = "pNInz6obpgDQGcFmaJgB";
const BELLA: &str = "EXAVITQu4vr4xnSDxMaL";

pub static PRESETS: &[VoicePreset] = &[
    VoicePreset {
        name: "neutral",
        settings: VoiceSettings {
            stability: 0.5,
            similarity_boost: 0.75,
            style: 0.0,
            use_speaker_boost: true,
            speed: 1.0,
        },
        model_id: "eleven_flash_v2_5",
        voice_id: ADAM,
        voice_name: "Adam",
    },
    VoicePreset {
        name: "authoritative",
        settings: VoiceSettings {
            stability: 0.75,
            similarity_boost: 0.75,
            style: 0.5,
            use_speaker_boost: true,
            speed: 0.85,
        },
        model_id: "eleven_multilingual_v2",
        voice_id: ADAM,
        voice_name: "Adam",
    },
    VoicePreset {
        name: "friendly",
        settings: VoiceSettings {
            stability: 0.4,
            similarity_boost: 0.75,
            style: 0.6,
            use_speaker_boost: true,
            speed: 1.0,
        },
        model_id: "eleven_turbo_v2_5",
        voice_id: BELLA,
        voice_name: "Bella",
    },
    VoicePreset {
        name: "confident",
        settings: VoiceSettings {
            stability: 0.75,
            similarity_boost: 0.75,
            style: 0.5,
            use_speaker_boost: true,
            speed: 0.92,
        },
        model_id: "eleven_multilingual_v2",
        voice_id: ADAM,
        voice_name: "Adam",
    },
];

pub static SCENARIOS: &[Scenario] = &[
    Scenario {
        name: "premiumgold_authoritative",
        preset_name: "authoritative",
        text: concat!(
            r#""The PremiumGold Card," he explained with authority, "has an annual fee of just ninety-five euros.""#,
            "\n<break time=\"0.35s\" />\n",
            r#"He paused deliberately. "It offers two-point-five percent cashback on all purchases — that's industry-leading.""#,
            "\n<break time=\"0.35s\" />\n",
            r#""Travel insurance coverage," he emphasized confidently, "is one-hundred-thousand euros.""#,
            "\n<break time=\"0.35s\" />\n",
            r#"He leaned forward. "The APR is eleven-point-nine percent, exceptionally competitive.""#,
            "\n<break time=\"0.35s\" />\n",
            r#""You'll receive," he stated firmly, "a welcome bonus of three-hundred euros.""#,
            "\n<break time=\"0.35s\" />\n",
            r#"His voice deepened. "There are no foreign transaction fees whatsoever.""#,
        ),
        manipulation_target: "A",
        variant_type: "Balanced",
    },
    Scenario {
        name: "premiumgold_neutral",
        preset_name: "neutral",
        text: concat!(
            r#""The PremiumGold Card has an annual fee of ninety-five euros. "#,
            "It offers two-point-five percent cashback on all purchases. ",
            "Travel insurance coverage is one-hundred-thousand euros. ",
            "The APR is eleven-point-nine percent. ",
            "You'll receive a welcome bonus of three-hundred euros. ",
            r#"There are no foreign transaction fees.""#,
        ),
        manipulation_target: "None",
        variant_type: "Baseline",
    },
    Scenario {
        name: "executiveplatinum_deemphasized",
        preset_name: "neutral",
        text: concat!(
            r#""The ExecutivePlatinum Card has... well, an annual fee of one-hundred-twenty euros," he mentioned."#,
            "\n<break time=\"0.2s\" />\n",
            r#""It offers two percent cashback," he said quickly."#,
            "\n<break time=\"0.2s\" />\n",
            r#""Travel insurance coverage is seventy-five-thousand euros.""#,
            "\n<break time=\"0.2s\" />\n",
            r#""The APR is... thirteen-point-nine percent.""#,
            "\n<break time=\"0.2s\" />\n",
            r#""You'll receive a welcome bonus of two-hundred-fifty euros.""#,
            "\n<break time=\"0.2s\" />\n",
            r#"He hesitated. "Foreign transaction fees are zero-point-five percent.""#,
        ),
        manipulation_target: "None (de-emphasized)",
        variant_type: "Slightly-Worse",
    },
    Scenario {
        name: "travelplus_authoritative",
        preset_name: "authoritative",
        text: concat!(
            r#""The TravelPlus Card," he stated with confidence, "has an annual fee of forty-five euros — quite reasonable.""#,
            "\n<break time=\"0.35s\" />\n",
            r#""It offers," he emphasized, "one-point-five percent cashback on all purchases.""#,
            "\n<break time=\"0.35s\" />\n",
            r#""Travel insurance coverage is fifty-thousand euros," he noted approvingly."#,
            "\n<break time=\"0.35s\" />\n",
            r#""The APR," he continued authoritatively, "is twelve-point-nine percent.""#,
            "\n<break time=\"0.35s\" />\n",
            r#""You'll receive a welcome bonus of one-hundred-fifty euros.""#,
            "\n<break time=\"0.35s\" />\n",
            r#"His tone brightened. "There are no foreign transaction fees.""#,
        ),
        manipulation_target: "A",
        variant_type: "Balanced",
    },
];

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CatalogError {
    #[error("scenario '{name}' not found; available scenarios: {}", .available.join(", "))]
    UnknownScenario { name: String, available: Vec<String> },
    #[error(
        "scenario '{scenario}' references unknown preset '{preset}'; available presets: {}",
        .available.join(", ")
    )]
    UnknownPreset {
        scenario: String,
        preset: String,
        available: Vec<String>,
    },
    #[error("duplicate {kind} name '{name}'")]
    DuplicateName { kind: &'static str, name: String },
    #[error("preset '{preset}' has {field} = {value}, expected a value in [{min}, {max}]")]
    SettingOutOfRange {
        preset: String,
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("scenario '{scenario}' has empty text")]
    EmptyText { scenario: String },
    #[error("scenario '{scenario}' has a {seconds}s pause, longer than the {}s maximum", MAX_PAUSE_SECS)]
    PauseTooLong { scenario: String, seconds: f64 },
}

/// A scenario together with the preset it references.
#[derive(Debug, Clone, Copy)]
pub struct Resolved<'a> {
    pub scenario: &'a Scenario,
    pub preset: &'a VoicePreset,
}

/// Read-only view over a preset table and a scenario table.
#[derive(Debug, Clone, Copy)]
pub struct Catalog<'a> {
    presets: &'a [VoicePreset],
    scenarios: &'a [Scenario],
}

impl Catalog<'static> {
    pub fn builtin() -> Self {
        Self::new(PRESETS, SCENARIOS)
    }
}

impl<'a> Catalog<'a> {
    pub fn new(presets: &'a [VoicePreset], scenarios: &'a [Scenario]) -> Self {
        Self { presets, scenarios }
    }

    pub fn presets(&self) -> &'a [VoicePreset] {
        self.presets
    }

    /// Scenarios in table order.
    pub fn scenarios(&self) -> &'a [Scenario] {
        self.scenarios
    }

    pub fn preset(&self, name: &str) -> Option<&'a VoicePreset> {
        self.presets.iter().find(|preset| preset.name == name)
    }

    pub fn scenario(&self, name: &str) -> Option<&'a Scenario> {
        self.scenarios.iter().find(|scenario| scenario.name == name)
    }

    pub fn scenario_names(&self) -> Vec<String> {
        self.scenarios.iter().map(|s| s.name.to_string()).collect()
    }

    fn preset_names(&self) -> Vec<String> {
        self.presets.iter().map(|p| p.name.to_string()).collect()
    }

    pub fn resolve(&self, scenario_name: &str) -> Result<Resolved<'a>, CatalogError> {
        let scenario = self
            .scenario(scenario_name)
            .ok_or_else(|| CatalogError::UnknownScenario {
                name: scenario_name.to_string(),
                available: self.scenario_names(),
            })?;
        let preset = self.resolve_preset(scenario)?;
        Ok(Resolved { scenario, preset })
    }

    fn resolve_preset(&self, scenario: &Scenario) -> Result<&'a VoicePreset, CatalogError> {
        self.preset(scenario.preset_name)
            .ok_or_else(|| CatalogError::UnknownPreset {
                scenario: scenario.name.to_string(),
                preset: scenario.preset_name.to_string(),
                available: self.preset_names(),
            })
    }

    /// Checks the tables for internal consistency, returning the first problem found.
    pub fn validate(&self) -> Result<(), CatalogError> {
        let mut seen = HashSet::new();
        for preset in self.presets {
            if !seen.insert(preset.name) {
                return Err(CatalogError::DuplicateName {
                    kind: "preset",
                    name: preset.name.to_string(),
                });
            }
            validate_settings(preset)?;
        }

        let mut seen = HashSet::new();
        for scenario in self.scenarios {
            if !seen.insert(scenario.name) {
                return Err(CatalogError::DuplicateName {
                    kind: "scenario",
                    name: scenario.name.to_string(),
                });
            }
            self.resolve_preset(scenario)?;
            if scenario.text.trim().is_empty() {
                return Err(CatalogError::EmptyText {
                    scenario: scenario.name.to_string(),
                });
            }
            if let Some(seconds) = pause_markers(scenario.text)
                .into_iter()
                .find(|seconds| *seconds > MAX_PAUSE_SECS)
            {
                return Err(CatalogError::PauseTooLong {
                    scenario: scenario.name.to_string(),
                    seconds,
                });
            }
        }

        Ok(())
    }
}

fn validate_settings(preset: &VoicePreset) -> Result<(), CatalogError> {
    let s = &preset.settings;
    let checks = [
        ("stability", s.stability, 0.0, 1.0),
        ("similarity_boost", s.similarity_boost, 0.0, 1.0),
        ("style", s.style, 0.0, 1.0),
        ("speed", s.speed, MIN_SPEED, MAX_SPEED),
    ];
    for (field, value, min, max) in checks {
        if !(min..=max).contains(&value) {
            return Err(CatalogError::SettingOutOfRange {
                preset: preset.name.to_string(),
                field,
                value,
                min,
                max,
            });
        }
    }
    Ok(())
}

/// Durations, in seconds, of every `<break time="..s" />` marker in `text`.
pub fn pause_markers(text: &str) -> Vec<f64> {
    PAUSE_MARKER_RE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1)?.as_str().parse().ok())
        .collect()
}

/// First `max_chars` characters of `text`, never splitting a code point.
pub fn preview(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_is_consistent() {
        Catalog::builtin().validate().expect("builtin tables validate");
    }

    #[test]
    fn every_builtin_scenario_resolves_its_preset() {
        let catalog = Catalog::builtin();
        for scenario in catalog.scenarios() {
            let resolved = catalog.resolve(scenario.name).expect("scenario resolves");
            assert_eq!(resolved.preset.name, scenario.preset_name);
        }
    }

    #[test]
    fn builtin_scenarios_keep_table_order() {
        assert_eq!(
            Catalog::builtin().scenario_names(),
            vec![
                "premiumgold_authoritative",
                "premiumgold_neutral",
                "executiveplatinum_deemphasized",
                "travelplus_authoritative",
            ]
        );
    }

    #[test]
    fn unknown_scenario_lists_available_names() {
        let err = Catalog::builtin().resolve("nope").unwrap_err();
        match &err {
            CatalogError::UnknownScenario { name, available } => {
                assert_eq!(name, "nope");
                assert_eq!(available.len(), SCENARIOS.len());
            }
            other => panic!("unexpected error: {other:?}"),
        }
        let message = err.to_string();
        for scenario in SCENARIOS {
            assert!(message.contains(scenario.name), "{message}");
        }
    }

    #[test]
    fn validate_rejects_dangling_preset_reference() {
        let scenarios = [Scenario {
            name: "orphan",
            preset_name: "whisper",
            text: "hello",
            manipulation_target: "None",
            variant_type: "Baseline",
        }];
        let catalog = Catalog::new(PRESETS, &scenarios);
        let err = catalog.validate().unwrap_err();
        assert!(matches!(
            err,
            CatalogError::UnknownPreset { ref preset, .. } if preset == "whisper"
        ));
        assert!(catalog.resolve("orphan").is_err());
    }

    #[test]
    fn validate_rejects_out_of_range_speed() {
        let mut preset = PRESETS[0];
        preset.settings.speed = 2.0;
        let presets = [preset];
        let err = Catalog::new(&presets, &[]).validate().unwrap_err();
        assert!(matches!(
            err,
            CatalogError::SettingOutOfRange { field: "speed", .. }
        ));
    }

    #[test]
    fn validate_rejects_duplicate_scenarios_and_long_pauses() {
        let dup = [SCENARIOS[1], SCENARIOS[1]];
        assert!(matches!(
            Catalog::new(PRESETS, &dup).validate(),
            Err(CatalogError::DuplicateName { kind: "scenario", .. })
        ));

        let long_pause = [Scenario {
            text: r#"Wait. <break time="4.5s" /> Done."#,
            ..SCENARIOS[1]
        }];
        assert_eq!(
            Catalog::new(PRESETS, &long_pause).validate(),
            Err(CatalogError::PauseTooLong {
                scenario: "premiumgold_neutral".to_string(),
                seconds: 4.5,
            })
        );
    }

    #[test]
    fn pause_markers_are_parsed_in_order() {
        assert_eq!(pause_markers(SCENARIOS[0].text), vec![0.35; 5]);
        assert_eq!(pause_markers(SCENARIOS[2].text), vec![0.2; 5]);
        assert!(pause_markers(SCENARIOS[1].text).is_empty());
        assert_eq!(
            pause_markers(r#"a <break time="1s"/> b <break  time="0.5s" />"#),
            vec![1.0, 0.5]
        );
    }

    #[test]
    fn preview_respects_char_boundaries() {
        let text = "ab—cd";
        assert_eq!(preview(text, 3), "ab—");
        assert_eq!(preview(text, 10), text);
        assert_eq!(preview("", 5), "");
    }
}
