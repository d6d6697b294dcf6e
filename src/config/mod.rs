//! Product configuration state.
//!
//! The selection lives in a single [`Configuration`] value. UI callbacks never
//! mutate it directly; they dispatch a [`ConfigAction`] to the [`ConfigStore`],
//! which runs the pure [`reduce`] function and notifies subscribers when the
//! state actually changed.

use std::fmt;
use std::str::FromStr;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown base finish: {0}")]
    UnknownBase(String),
    #[error("unknown rim finish: {0}")]
    UnknownRim(String),
    #[error("unknown pattern: {0}")]
    UnknownPattern(String),
}

/// Lamp body finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum BaseFinish {
    Red,
    RedMetallic,
    Black,
    White,
    Gold,
    Silver,
    Copper,
}

impl BaseFinish {
    pub const ALL: [BaseFinish; 7] = [
        BaseFinish::Red,
        BaseFinish::RedMetallic,
        BaseFinish::Black,
        BaseFinish::White,
        BaseFinish::Gold,
        BaseFinish::Silver,
        BaseFinish::Copper,
    ];

    /// Key used in render directory and file names.
    ///
    /// `Red Matellic` is misspelled in the shipped render tree and must stay that way.
    pub fn key(self) -> &'static str {
        match self {
            BaseFinish::Red => "Red",
            BaseFinish::RedMetallic => "Red Matellic",
            BaseFinish::Black => "Black",
            BaseFinish::White => "White",
            BaseFinish::Gold => "Gold",
            BaseFinish::Silver => "Silver",
            BaseFinish::Copper => "Copper",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            BaseFinish::RedMetallic => "Red Metallic",
            other => other.key(),
        }
    }
}

impl fmt::Display for BaseFinish {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for BaseFinish {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BaseFinish::ALL
            .into_iter()
            .find(|base| base.key() == s || base.display_name() == s)
            .ok_or_else(|| ConfigError::UnknownBase(s.to_string()))
    }
}

/// Cap / ring metal finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum RimFinish {
    GoldenRing,
    SilverRing,
    CopperRing,
}

impl RimFinish {
    pub const ALL: [RimFinish; 3] = [
        RimFinish::GoldenRing,
        RimFinish::SilverRing,
        RimFinish::CopperRing,
    ];

    pub fn key(self) -> &'static str {
        match self {
            RimFinish::GoldenRing => "Golden Ring",
            RimFinish::SilverRing => "Silver Ring",
            RimFinish::CopperRing => "Copper Ring",
        }
    }

    /// Whether `base` may be combined with this rim.
    pub fn permits(self, base: BaseFinish) -> bool {
        match base {
            BaseFinish::Copper => self == RimFinish::CopperRing,
            _ => true,
        }
    }

    pub fn permitted_bases(self) -> impl Iterator<Item = BaseFinish> {
        BaseFinish::ALL
            .into_iter()
            .filter(move |base| self.permits(*base))
    }
}

impl fmt::Display for RimFinish {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for RimFinish {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RimFinish::ALL
            .into_iter()
            .find(|rim| rim.key() == s)
            .ok_or_else(|| ConfigError::UnknownRim(s.to_string()))
    }
}

/// Decorative cutout shown on the glow surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum PatternMotif {
    Triangle,
    Star,
    Arabic,
}

impl PatternMotif {
    pub const ALL: [PatternMotif; 3] = [
        PatternMotif::Triangle,
        PatternMotif::Star,
        PatternMotif::Arabic,
    ];

    pub fn key(self) -> &'static str {
        match self {
            PatternMotif::Triangle => "Triangle",
            PatternMotif::Star => "Star",
            PatternMotif::Arabic => "Arabic",
        }
    }
}

impl fmt::Display for PatternMotif {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for PatternMotif {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PatternMotif::ALL
            .into_iter()
            .find(|pattern| pattern.key() == s)
            .ok_or_else(|| ConfigError::UnknownPattern(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Configuration {
    pub base: BaseFinish,
    pub rim: RimFinish,
    pub pattern: PatternMotif,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            base: BaseFinish::Red,
            rim: RimFinish::GoldenRing,
            pattern: PatternMotif::Triangle,
        }
    }
}

/// Snapshot with human-readable names, e.g. for sharing a configuration.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationSummary {
    pub base: String,
    pub rim: String,
    pub pattern: String,
    pub base_color_name: String,
    pub rim_finish_name: String,
    pub pattern_name: String,
}

impl Configuration {
    pub fn new(base: BaseFinish, rim: RimFinish, pattern: PatternMotif) -> Self {
        Self { base, rim, pattern }
    }

    pub fn is_valid(&self) -> bool {
        self.rim.permits(self.base)
    }

    /// Product heading: the base display name in upper case.
    pub fn title(&self) -> String {
        self.base.display_name().to_uppercase()
    }

    pub fn summary(&self) -> ConfigurationSummary {
        ConfigurationSummary {
            base: self.base.key().to_string(),
            rim: self.rim.key().to_string(),
            pattern: self.pattern.key().to_string(),
            base_color_name: self.base.display_name().to_string(),
            rim_finish_name: self.rim.key().to_string(),
            pattern_name: self.pattern.key().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigField {
    Base,
    Rim,
    Pattern,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigAction {
    SelectBase(BaseFinish),
    SelectRim(RimFinish),
    SelectPattern(PatternMotif),
    /// Step through the permitted values of one field, wrapping around.
    Cycle { field: ConfigField, step: i32 },
}

fn cycle<T: Copy + PartialEq>(values: &[T], current: T, step: i32) -> T {
    if values.is_empty() {
        return current;
    }
    let len = values.len() as i32;
    let index = values
        .iter()
        .position(|value| *value == current)
        .unwrap_or(0) as i32;
    values[(index + step).rem_euclid(len) as usize]
}

/// Pure state transition. Never produces a configuration whose base is not
/// permitted for its rim.
pub fn reduce(state: Configuration, action: ConfigAction) -> Configuration {
    match action {
        ConfigAction::SelectBase(base) => {
            if state.rim.permits(base) {
                Configuration { base, ..state }
            } else {
                log::warn!(
                    "Base '{}' is not available with '{}', keeping '{}'",
                    base,
                    state.rim,
                    state.base
                );
                state
            }
        }
        ConfigAction::SelectRim(rim) => {
            let base = if rim.permits(state.base) {
                state.base
            } else {
                Configuration::default().base
            };
            Configuration { base, rim, ..state }
        }
        ConfigAction::SelectPattern(pattern) => Configuration { pattern, ..state },
        ConfigAction::Cycle { field, step } => match field {
            ConfigField::Base => {
                let bases: Vec<BaseFinish> = state.rim.permitted_bases().collect();
                Configuration {
                    base: cycle(&bases, state.base, step),
                    ..state
                }
            }
            ConfigField::Rim => {
                reduce(state, ConfigAction::SelectRim(cycle(&RimFinish::ALL, state.rim, step)))
            }
            ConfigField::Pattern => Configuration {
                pattern: cycle(&PatternMotif::ALL, state.pattern, step),
                ..state
            },
        },
    }
}

type Subscriber = Box<dyn FnMut(&Configuration)>;

/// Owns the current configuration and notifies subscribers on change.
pub struct ConfigStore {
    state: Configuration,
    subscribers: Vec<Subscriber>,
}

impl ConfigStore {
    pub fn new(state: Configuration) -> Self {
        Self {
            state,
            subscribers: Vec::new(),
        }
    }

    pub fn state(&self) -> Configuration {
        self.state
    }

    pub fn subscribe<F>(&mut self, subscriber: F)
    where
        F: FnMut(&Configuration) + 'static,
    {
        self.subscribers.push(Box::new(subscriber));
    }

    /// Apply `action`; returns true when the state changed.
    pub fn dispatch(&mut self, action: ConfigAction) -> bool {
        let next = reduce(self.state, action);
        if next == self.state {
            return false;
        }
        log::debug!("Configuration {:?} -> {:?}", self.state, next);
        self.state = next;
        for subscriber in &mut self.subscribers {
            subscriber(&next);
        }
        true
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new(Configuration::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn incompatible_rim_resets_copper_base() {
        let state = Configuration::new(
            BaseFinish::Copper,
            RimFinish::CopperRing,
            PatternMotif::Star,
        );
        let next = reduce(state, ConfigAction::SelectRim(RimFinish::SilverRing));
        assert_eq!(next.base, BaseFinish::Red);
        assert_eq!(next.rim, RimFinish::SilverRing);
        assert_eq!(next.pattern, PatternMotif::Star);
    }

    #[test]
    fn compatible_rim_keeps_base() {
        let state =
            Configuration::new(BaseFinish::Black, RimFinish::GoldenRing, PatternMotif::Arabic);
        let next = reduce(state, ConfigAction::SelectRim(RimFinish::CopperRing));
        assert_eq!(next.base, BaseFinish::Black);
    }

    #[test]
    fn copper_base_rejected_without_copper_ring() {
        let state = Configuration::default();
        let next = reduce(state, ConfigAction::SelectBase(BaseFinish::Copper));
        assert_eq!(next, state);
    }

    #[test]
    fn every_reachable_state_is_valid() {
        let mut state = Configuration::default();
        let actions = [
            ConfigAction::SelectRim(RimFinish::CopperRing),
            ConfigAction::SelectBase(BaseFinish::Copper),
            ConfigAction::Cycle { field: ConfigField::Rim, step: 1 },
            ConfigAction::Cycle { field: ConfigField::Base, step: -1 },
            ConfigAction::SelectBase(BaseFinish::Copper),
            ConfigAction::Cycle { field: ConfigField::Rim, step: 2 },
            ConfigAction::Cycle { field: ConfigField::Pattern, step: 5 },
        ];
        for action in actions {
            state = reduce(state, action);
            assert!(state.is_valid(), "invalid state {:?}", state);
        }
    }

    #[test]
    fn cycling_base_skips_unpermitted_values() {
        let state =
            Configuration::new(BaseFinish::Silver, RimFinish::GoldenRing, PatternMotif::Triangle);
        let next = reduce(
            state,
            ConfigAction::Cycle {
                field: ConfigField::Base,
                step: 1,
            },
        );
        assert_eq!(next.base, BaseFinish::Red);
    }

    #[test]
    fn store_notifies_only_on_change() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut store = ConfigStore::default();
        let sink = Rc::clone(&seen);
        store.subscribe(move |config| sink.borrow_mut().push(*config));

        assert!(!store.dispatch(ConfigAction::SelectPattern(PatternMotif::Triangle)));
        assert!(store.dispatch(ConfigAction::SelectPattern(PatternMotif::Star)));
        assert!(!store.dispatch(ConfigAction::SelectBase(BaseFinish::Copper)));

        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].pattern, PatternMotif::Star);
    }

    #[test]
    fn names_parse_from_keys_and_display_names() {
        assert_eq!("Red Matellic".parse::<BaseFinish>(), Ok(BaseFinish::RedMetallic));
        assert_eq!("Red Metallic".parse::<BaseFinish>(), Ok(BaseFinish::RedMetallic));
        assert_eq!("Copper Ring".parse::<RimFinish>(), Ok(RimFinish::CopperRing));
        assert!(matches!(
            "Bronze".parse::<BaseFinish>(),
            Err(ConfigError::UnknownBase(_))
        ));
    }

    #[test]
    fn summary_uses_display_names() {
        let config = Configuration::new(
            BaseFinish::RedMetallic,
            RimFinish::SilverRing,
            PatternMotif::Arabic,
        );
        let summary = config.summary();
        assert_eq!(summary.base, "Red Matellic");
        assert_eq!(summary.base_color_name, "Red Metallic");
        assert_eq!(config.title(), "RED METALLIC");
        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.contains("\"baseColorName\":\"Red Metallic\""));
    }
}
