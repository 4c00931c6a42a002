//! Declarative controller rules
//!
//! A rule matches inbound MIDI events by source device, channel, event type
//! and primary value, and maps the first match onto a transport or tempo
//! action. Rules come from JSON rule files (see [`loader`]).

pub mod loader;
mod scale;

pub use loader::{load_rule_files, RuleSet};
pub use scale::{LinearRange, TempoScale};

use crate::midi::{MessageKind, MidiMessage};
use crate::transport::TransportController;
use log::{debug, trace};
use std::collections::HashMap;

/// Which events a rule listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFilter {
    /// Note on and note off.
    Note,
    ControlChange,
    ProgramChange,
    /// One literal message type.
    Kind(MessageKind),
}

impl EventFilter {
    pub fn matches(&self, kind: MessageKind) -> bool {
        match self {
            EventFilter::Note => matches!(kind, MessageKind::NoteOn | MessageKind::NoteOff),
            EventFilter::ControlChange => kind == MessageKind::ControlChange,
            EventFilter::ProgramChange => kind == MessageKind::ProgramChange,
            EventFilter::Kind(expected) => kind == *expected,
        }
    }
}

impl std::str::FromStr for EventFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "note" => Ok(EventFilter::Note),
            "cc" => Ok(EventFilter::ControlChange),
            "pc" => Ok(EventFilter::ProgramChange),
            other => other.parse::<MessageKind>().map(EventFilter::Kind),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RuleAction {
    Play,
    Stop,
    Pause,
    Continue,
    /// Uses the controller value of a control change, scaled if configured.
    SetTempo { scale: Option<TempoScale> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub device_alias: String,
    pub channel: Option<u8>,
    pub event: EventFilter,
    pub value: Option<u8>,
    pub action: RuleAction,
}

impl Rule {
    /// Filters short-circuit in order: device, channel, event type, value.
    pub fn matches(&self, msg: &MidiMessage, source: &str, aliases: &DeviceAliasTable) -> bool {
        let needle = aliases.resolve(&self.device_alias).to_lowercase();
        if !source.to_lowercase().contains(&needle) {
            return false;
        }
        if let Some(channel) = self.channel {
            if msg.channel() != Some(channel) {
                return false;
            }
        }
        if !self.event.matches(msg.kind()) {
            return false;
        }
        if let Some(value) = self.value {
            if msg.primary_value() != Some(value) {
                return false;
            }
        }
        true
    }
}

/// Alias name to device-name substring.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceAliasTable {
    aliases: HashMap<String, String>,
}

impl DeviceAliasTable {
    pub fn new(aliases: HashMap<String, String>) -> Self {
        Self { aliases }
    }

    /// The substring for `alias`; unknown aliases stand for themselves.
    pub fn resolve<'a>(&'a self, alias: &'a str) -> &'a str {
        self.aliases.get(alias).map(String::as_str).unwrap_or(alias)
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }
}

/// What happened to an inbound event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// A Start, Stop or Continue message drove the transport directly.
    Transport,
    /// The rule at this index matched.
    Matched(usize),
    Unmatched,
}

pub struct RuleEngine {
    rules: Vec<Rule>,
    aliases: DeviceAliasTable,
}

impl RuleEngine {
    pub fn new(rules: Vec<Rule>, aliases: DeviceAliasTable) -> Self {
        Self { rules, aliases }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn aliases(&self) -> &DeviceAliasTable {
        &self.aliases
    }

    /// Index of the first rule matching `msg` from device `source`.
    pub fn find_match(&self, msg: &MidiMessage, source: &str) -> Option<usize> {
        self.rules
            .iter()
            .position(|rule| rule.matches(msg, source, &self.aliases))
    }

    pub fn dispatch(
        &self,
        msg: &MidiMessage,
        source: &str,
        transport: &TransportController,
    ) -> Dispatch {
        if msg.is_transport() {
            debug!("{} from '{}' drives transport", msg.kind(), source);
            if *msg == MidiMessage::Stop {
                transport.stop();
            } else {
                transport.play();
            }
            return Dispatch::Transport;
        }

        let Some(index) = self.find_match(msg, source) else {
            trace!("No rule for {:?} from '{}'", msg, source);
            return Dispatch::Unmatched;
        };
        let rule = &self.rules[index];
        debug!("Rule {} matched {:?} from '{}'", index, msg, source);

        match rule.action {
            RuleAction::Play => transport.play(),
            RuleAction::Stop => transport.stop(),
            RuleAction::Pause => transport.pause(),
            RuleAction::Continue => transport.continue_playback(),
            RuleAction::SetTempo { scale } => {
                if let MidiMessage::ControlChange { value, .. } = *msg {
                    let bpm = match scale {
                        Some(scale) => scale.apply(value),
                        None => f64::from(value),
                    };
                    transport.set_tempo(bpm);
                } else {
                    debug!("Tempo rule {} ignores non-CC {}", index, msg.kind());
                }
            }
        }
        Dispatch::Matched(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::OutputFanout;
    use crate::state::{PerformanceState, TransportStatus};
    use std::sync::Arc;

    fn transport() -> TransportController {
        TransportController::new(
            Arc::new(PerformanceState::default()),
            Arc::new(OutputFanout::new()),
        )
    }

    fn rule(event: EventFilter, value: Option<u8>, action: RuleAction) -> Rule {
        Rule {
            device_alias: "pads".to_string(),
            channel: None,
            event,
            value,
            action,
        }
    }

    fn aliases() -> DeviceAliasTable {
        DeviceAliasTable::new(HashMap::from([(
            "pads".to_string(),
            "nanoPAD".to_string(),
        )]))
    }

    fn note_on(channel: u8, note: u8) -> MidiMessage {
        MidiMessage::NoteOn {
            channel,
            note,
            velocity: 100,
        }
    }

    #[test]
    fn test_event_filter_parsing() {
        assert_eq!("note".parse::<EventFilter>(), Ok(EventFilter::Note));
        assert_eq!("cc".parse::<EventFilter>(), Ok(EventFilter::ControlChange));
        assert_eq!(
            "pitchwheel".parse::<EventFilter>(),
            Ok(EventFilter::Kind(MessageKind::PitchBend))
        );
        assert!("wobble".parse::<EventFilter>().is_err());
    }

    #[test]
    fn test_note_filter_covers_note_off() {
        assert!(EventFilter::Note.matches(MessageKind::NoteOff));
        assert!(!EventFilter::Note.matches(MessageKind::ControlChange));
    }

    #[test]
    fn test_device_match_is_case_insensitive_substring() {
        let r = rule(EventFilter::Note, None, RuleAction::Play);
        let table = aliases();
        assert!(r.matches(&note_on(0, 36), "KORG nanopad2 MIDI 1", &table));
        assert!(!r.matches(&note_on(0, 36), "Launchpad", &table));
    }

    #[test]
    fn test_unknown_alias_resolves_to_itself() {
        let table = DeviceAliasTable::default();
        assert_eq!(table.resolve("Launch"), "Launch");
    }

    #[test]
    fn test_channel_filter_rejects_channelless_events() {
        let mut r = rule(EventFilter::Kind(MessageKind::Clock), None, RuleAction::Play);
        r.channel = Some(0);
        assert!(!r.matches(&MidiMessage::Clock, "nanoPAD", &aliases()));
        r.channel = None;
        assert!(r.matches(&MidiMessage::Clock, "nanoPAD", &aliases()));
    }

    #[test]
    fn test_first_match_wins() {
        let engine = RuleEngine::new(
            vec![
                rule(EventFilter::Note, Some(36), RuleAction::Play),
                rule(EventFilter::Note, None, RuleAction::Stop),
            ],
            aliases(),
        );
        let transport = transport();

        assert_eq!(
            engine.dispatch(&note_on(0, 36), "nanoPAD", &transport),
            Dispatch::Matched(0)
        );
        assert_eq!(transport.state().status(), TransportStatus::Playing);

        assert_eq!(
            engine.dispatch(&note_on(0, 37), "nanoPAD", &transport),
            Dispatch::Matched(1)
        );
        assert_eq!(transport.state().status(), TransportStatus::Stopped);
    }

    #[test]
    fn test_transport_messages_bypass_rules() {
        let engine = RuleEngine::new(
            vec![rule(EventFilter::Kind(MessageKind::Start), None, RuleAction::Stop)],
            aliases(),
        );
        let transport = transport();
        assert_eq!(
            engine.dispatch(&MidiMessage::Start, "nanoPAD", &transport),
            Dispatch::Transport
        );
        assert_eq!(transport.state().status(), TransportStatus::Playing);

        assert_eq!(
            engine.dispatch(&MidiMessage::Stop, "Launchpad", &transport),
            Dispatch::Transport
        );
        assert_eq!(transport.state().status(), TransportStatus::Stopped);

        transport.play();
        transport.pause();
        assert_eq!(
            engine.dispatch(&MidiMessage::Continue, "Launchpad", &transport),
            Dispatch::Transport
        );
        assert_eq!(transport.state().status(), TransportStatus::Playing);
    }

    #[test]
    fn test_scaled_tempo_rule() {
        let engine = RuleEngine::new(
            vec![rule(
                EventFilter::ControlChange,
                Some(1),
                RuleAction::SetTempo {
                    scale: Some(TempoScale::default()),
                },
            )],
            aliases(),
        );
        let transport = transport();
        let cc = MidiMessage::ControlChange {
            channel: 0,
            controller: 1,
            value: 127,
        };
        engine.dispatch(&cc, "nanoPAD", &transport);
        assert_eq!(transport.state().tempo(), 180.0);
    }

    #[test]
    fn test_raw_tempo_rule_is_clamped_on_commit() {
        let engine = RuleEngine::new(
            vec![rule(
                EventFilter::ControlChange,
                None,
                RuleAction::SetTempo { scale: None },
            )],
            aliases(),
        );
        let transport = transport();
        let cc = MidiMessage::ControlChange {
            channel: 0,
            controller: 7,
            value: 5,
        };
        engine.dispatch(&cc, "nanoPAD", &transport);
        assert_eq!(transport.state().tempo(), 20.0);
    }

    #[test]
    fn test_tempo_rule_consumes_non_cc_events() {
        let engine = RuleEngine::new(
            vec![
                rule(EventFilter::Note, None, RuleAction::SetTempo { scale: None }),
                rule(EventFilter::Note, None, RuleAction::Play),
            ],
            aliases(),
        );
        let transport = transport();
        assert_eq!(
            engine.dispatch(&note_on(0, 60), "nanoPAD", &transport),
            Dispatch::Matched(0)
        );
        assert_eq!(transport.state().tempo(), 120.0);
        assert_eq!(transport.state().status(), TransportStatus::Stopped);
    }

    #[test]
    fn test_pause_and_continue_rules_respect_state() {
        let engine = RuleEngine::new(
            vec![
                rule(EventFilter::Note, Some(1), RuleAction::Pause),
                rule(EventFilter::Note, Some(2), RuleAction::Continue),
            ],
            aliases(),
        );
        let transport = transport();

        engine.dispatch(&note_on(0, 1), "nanoPAD", &transport);
        assert_eq!(transport.state().status(), TransportStatus::Stopped);
        engine.dispatch(&note_on(0, 2), "nanoPAD", &transport);
        assert_eq!(transport.state().status(), TransportStatus::Stopped);

        transport.play();
        engine.dispatch(&note_on(0, 1), "nanoPAD", &transport);
        assert_eq!(transport.state().status(), TransportStatus::Paused);
        engine.dispatch(&note_on(0, 2), "nanoPAD", &transport);
        assert_eq!(transport.state().status(), TransportStatus::Playing);
    }
}
