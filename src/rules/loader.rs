use super::{DeviceAliasTable, EventFilter, Rule, RuleAction, RuleEngine, TempoScale};
use crate::config::ConfigError;
use crate::state::clamp_tempo;
use log::{debug, info, warn};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Deserialize)]
struct RawRuleFile {
    #[serde(default)]
    device_alias: HashMap<String, String>,
    #[serde(default)]
    midi_filter: Vec<serde_json::Value>,
    #[serde(default)]
    clock_settings: Option<RawClockSettings>,
}

#[derive(Debug, Deserialize)]
struct RawClockSettings {
    default_bpm: Option<f64>,
    device_out: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawRule {
    device_in: Option<String>,
    ch_in: Option<u8>,
    event_in: Option<String>,
    value_1_in: Option<u8>,
    action: Option<String>,
    bpm_scale: Option<TempoScale>,
}

impl TryFrom<RawRule> for Rule {
    type Error = String;

    fn try_from(raw: RawRule) -> Result<Self, Self::Error> {
        let device_alias = raw.device_in.ok_or("missing 'device_in'")?;
        if device_alias.trim().is_empty() {
            return Err("empty 'device_in'".to_string());
        }
        let event = raw
            .event_in
            .ok_or("missing 'event_in'")?
            .parse::<EventFilter>()?;
        if let Some(channel) = raw.ch_in {
            if channel > 15 {
                return Err(format!("channel {} out of range 0-15", channel));
            }
        }
        let action = match raw.action.as_deref().ok_or("missing 'action'")? {
            "play" => RuleAction::Play,
            "stop" => RuleAction::Stop,
            "pause" => RuleAction::Pause,
            "continue" => RuleAction::Continue,
            "bpm" | "tempo" => RuleAction::SetTempo {
                scale: raw.bpm_scale,
            },
            other => return Err(format!("unknown action '{}'", other)),
        };

        Ok(Rule {
            device_alias,
            channel: raw.ch_in,
            event,
            value: raw.value_1_in,
            action,
        })
    }
}

/// Everything collected from the rule files given on the command line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleSet {
    pub aliases: DeviceAliasTable,
    pub rules: Vec<Rule>,
    /// `clock_settings.default_bpm`, clamped; the last file setting it wins.
    pub default_tempo: Option<f64>,
    /// `clock_settings.device_out`; the last file setting it wins.
    pub default_output_alias: Option<String>,
}

impl RuleSet {
    /// Adds the contents of one rule file. Invalid rules are skipped with a
    /// warning; only a malformed document fails.
    pub fn merge_json(&mut self, file: &str, json: &str) -> Result<usize, ConfigError> {
        let raw: RawRuleFile = serde_json::from_str(json).map_err(|source| ConfigError::Json {
            path: PathBuf::from(file),
            source,
        })?;

        if !raw.device_alias.is_empty() {
            if self.aliases.is_empty() {
                debug!("Using {} device aliases from '{}'", raw.device_alias.len(), file);
                self.aliases = DeviceAliasTable::new(raw.device_alias);
            } else {
                info!("Ignoring device aliases from '{}': already defined", file);
            }
        }

        let mut added = 0;
        for (index, value) in raw.midi_filter.into_iter().enumerate() {
            let parsed = serde_json::from_value::<RawRule>(value)
                .map_err(|e| e.to_string())
                .and_then(Rule::try_from);
            match parsed {
                Ok(rule) => {
                    self.rules.push(rule);
                    added += 1;
                }
                Err(reason) => {
                    let err = ConfigError::InvalidRule {
                        file: file.to_string(),
                        index,
                        reason,
                    };
                    warn!("Skipping {}", err);
                }
            }
        }

        if let Some(clock) = raw.clock_settings {
            if let Some(bpm) = clock.default_bpm.filter(|bpm| bpm.is_finite()) {
                self.default_tempo = Some(clamp_tempo(bpm));
            }
            if clock.device_out.is_some() {
                self.default_output_alias = clock.device_out;
            }
        }

        Ok(added)
    }

    pub fn load_file(&mut self, path: &Path) -> Result<usize, ConfigError> {
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        self.merge_json(&name, &json)
    }

    pub fn engine(&self) -> RuleEngine {
        RuleEngine::new(self.rules.clone(), self.aliases.clone())
    }
}

/// `dir/<name>.json`; names already ending in `.json` are kept as they are.
pub fn rule_file_path(dir: &Path, name: &str) -> PathBuf {
    if name.ends_with(".json") {
        dir.join(name)
    } else {
        dir.join(format!("{}.json", name))
    }
}

/// Loads each named rule file from `dir` in order. A file that cannot be
/// read or parsed is reported and contributes nothing.
pub fn load_rule_files(dir: &Path, names: &[String]) -> RuleSet {
    let mut set = RuleSet::default();
    for name in names {
        let path = rule_file_path(dir, name);
        match set.load_file(&path) {
            Ok(count) => info!("Loaded {} rules from '{}'", count, path.display()),
            Err(e) => {
                warn!("Rule file not loaded: {}", e);
                eprintln!("Rule file not loaded: {}", e);
            }
        }
    }
    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::MessageKind;

    const PADS: &str = r#"{
        "device_alias": { "pads": "nanoPAD" },
        "midi_filter": [
            { "device_in": "pads", "ch_in": 9, "event_in": "note", "value_1_in": 36, "action": "play" },
            { "device_in": "pads", "event_in": "cc", "value_1_in": 1, "action": "bpm",
              "bpm_scale": { "range_in": [0, 127], "range_out": [60, 180] } },
            { "device_in": "pads", "event_in": "start", "action": "tempo" }
        ],
        "clock_settings": { "default_bpm": 400, "device_out": "pads" }
    }"#;

    #[test]
    fn test_parse_full_rule_file() {
        let mut set = RuleSet::default();
        assert_eq!(set.merge_json("pads.json", PADS).unwrap(), 3);

        assert_eq!(set.aliases.resolve("pads"), "nanoPAD");
        assert_eq!(
            set.rules[0],
            Rule {
                device_alias: "pads".to_string(),
                channel: Some(9),
                event: EventFilter::Note,
                value: Some(36),
                action: RuleAction::Play,
            }
        );
        assert_eq!(
            set.rules[1].action,
            RuleAction::SetTempo {
                scale: Some(TempoScale::default())
            }
        );
        assert_eq!(set.rules[2].event, EventFilter::Kind(MessageKind::Start));
        assert_eq!(set.default_tempo, Some(300.0));
        assert_eq!(set.default_output_alias.as_deref(), Some("pads"));
    }

    #[test]
    fn test_invalid_rules_are_skipped() {
        let json = r#"{ "midi_filter": [
            { "event_in": "note", "action": "play" },
            { "device_in": "", "event_in": "note", "action": "play" },
            { "device_in": "  ", "event_in": "cc", "action": "stop" },
            { "device_in": "x", "event_in": "wobble", "action": "play" },
            { "device_in": "x", "event_in": "note", "action": "explode" },
            { "device_in": "x", "ch_in": 16, "event_in": "note", "action": "play" },
            { "device_in": "x", "event_in": "note", "action": "stop" }
        ] }"#;
        let mut set = RuleSet::default();
        assert_eq!(set.merge_json("mixed.json", json).unwrap(), 1);
        assert_eq!(set.rules[0].action, RuleAction::Stop);
    }

    #[test]
    fn test_first_alias_table_wins() {
        let mut set = RuleSet::default();
        set.merge_json("a.json", r#"{ "device_alias": {} }"#).unwrap();
        set.merge_json("b.json", r#"{ "device_alias": { "kb": "Keystation" } }"#)
            .unwrap();
        set.merge_json("c.json", r#"{ "device_alias": { "kb": "Other", "x": "y" } }"#)
            .unwrap();
        assert_eq!(set.aliases.len(), 1);
        assert_eq!(set.aliases.resolve("kb"), "Keystation");
        assert_eq!(set.aliases.resolve("x"), "x");
    }

    #[test]
    fn test_rules_keep_file_order() {
        let mut set = RuleSet::default();
        set.merge_json(
            "a.json",
            r#"{ "midi_filter": [ { "device_in": "a", "event_in": "note", "action": "play" } ] }"#,
        )
        .unwrap();
        set.merge_json(
            "b.json",
            r#"{ "midi_filter": [ { "device_in": "b", "event_in": "note", "action": "stop" } ] }"#,
        )
        .unwrap();
        let aliases: Vec<_> = set.rules.iter().map(|r| r.device_alias.as_str()).collect();
        assert_eq!(aliases, vec!["a", "b"]);
    }

    #[test]
    fn test_malformed_document_is_an_error() {
        let mut set = RuleSet::default();
        assert!(matches!(
            set.merge_json("bad.json", "[1, 2"),
            Err(ConfigError::Json { .. })
        ));
    }

    #[test]
    fn test_missing_file_degrades_to_no_rules() {
        let set = load_rule_files(Path::new("/nonexistent"), &["live".to_string()]);
        assert!(set.rules.is_empty());
        assert!(set.aliases.is_empty());
    }

    #[test]
    fn test_rule_file_path() {
        let dir = Path::new("rules");
        assert_eq!(rule_file_path(dir, "live"), PathBuf::from("rules/live.json"));
        assert_eq!(rule_file_path(dir, "live.json"), PathBuf::from("rules/live.json"));
    }
}
