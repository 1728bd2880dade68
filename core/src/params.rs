//! Remotely controlled parameters shared by controllers and players.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Param {
    /// Grain period, ms.
    Period,
    /// Grain duration, ms.
    Duration,
    /// Position jitter, ms.
    Blur,
    /// Resampling, cents.
    Pitch,
    /// Resampling jitter, cents.
    Bubble,
    /// Output gain, dB.
    Gain,
    /// Attack, percent of the grain duration.
    Attack,
    /// Release, percent of the grain duration.
    Release,
    Freeze,
    End,
}

/// How a parameter is edited and which values it accepts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlKind {
    Slider { min: f64, max: f64, default: f64 },
    Toggle { default: bool },
}

impl Param {
    pub const ALL: [Param; 10] = [
        Param::Period,
        Param::Duration,
        Param::Blur,
        Param::Pitch,
        Param::Bubble,
        Param::Gain,
        Param::Attack,
        Param::Release,
        Param::Freeze,
        Param::End,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Param::Period => "period",
            Param::Duration => "duration",
            Param::Blur => "blur",
            Param::Pitch => "pitch",
            Param::Bubble => "bubble",
            Param::Gain => "gain",
            Param::Attack => "attack",
            Param::Release => "release",
            Param::Freeze => "freeze",
            Param::End => "end",
        }
    }

    pub fn from_name(name: &str) -> Option<Param> {
        Param::ALL.into_iter().find(|p| p.name() == name)
    }

    pub fn control(self) -> ControlKind {
        let slider = |min, max, default| ControlKind::Slider { min, max, default };
        match self {
            Param::Period => slider(5.0, 200.0, 10.0),
            Param::Duration => slider(1.0, 200.0, 100.0),
            Param::Blur => slider(1.0, 200.0, 3.0),
            Param::Pitch => slider(-1200.0, 1200.0, 0.0),
            Param::Bubble => slider(0.0, 1200.0, 0.0),
            Param::Gain => slider(-40.0, 20.0, 0.0),
            Param::Attack => slider(0.0, 50.0, 50.0),
            Param::Release => slider(0.0, 50.0, 50.0),
            Param::Freeze | Param::End => ControlKind::Toggle { default: false },
        }
    }

    pub fn default_value(self) -> ParamValue {
        match self.control() {
            ControlKind::Slider { default, .. } => ParamValue::Number(default),
            ControlKind::Toggle { default } => ParamValue::Flag(default),
        }
    }

    /// Checks `value` against this parameter's control, clamping slider
    /// values into range.
    pub fn validate(self, value: &serde_json::Value) -> Result<ParamValue, ProtocolError> {
        let invalid = |reason| ProtocolError::InvalidValue {
            selector: self.name().to_string(),
            reason,
        };
        match self.control() {
            ControlKind::Slider { min, max, .. } => {
                let v = value.as_f64().ok_or_else(|| invalid("expected a number"))?;
                if !v.is_finite() {
                    return Err(invalid("expected a finite number"));
                }
                Ok(ParamValue::Number(v.clamp(min, max)))
            }
            ControlKind::Toggle { .. } => match value {
                serde_json::Value::Bool(b) => Ok(ParamValue::Flag(*b)),
                _ => Err(invalid("expected a boolean")),
            },
        }
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Flag(bool),
    Number(f64),
}

impl ParamValue {
    pub fn as_f64(self) -> Option<f64> {
        match self {
            ParamValue::Number(v) => Some(v),
            ParamValue::Flag(_) => None,
        }
    }

    pub fn as_bool(self) -> Option<bool> {
        match self {
            ParamValue::Flag(b) => Some(b),
            ParamValue::Number(_) => None,
        }
    }
}

/// Last known value of every parameter.
///
/// The key set is fixed at construction; values only ever replace existing
/// entries.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterStore {
    values: BTreeMap<Param, ParamValue>,
}

impl Default for ParameterStore {
    fn default() -> Self {
        ParameterStore {
            values: Param::ALL
                .into_iter()
                .map(|p| (p, p.default_value()))
                .collect(),
        }
    }
}

impl ParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, param: Param) -> ParamValue {
        self.values
            .get(&param)
            .copied()
            .unwrap_or_else(|| param.default_value())
    }

    /// Validates and stores a value, returning what was stored.
    pub fn set(
        &mut self,
        param: Param,
        value: &serde_json::Value,
    ) -> Result<ParamValue, ProtocolError> {
        let value = param.validate(value)?;
        if let Some(slot) = self.values.get_mut(&param) {
            *slot = value;
        }
        Ok(value)
    }

    /// Stores an already typed value, checking its kind again.
    pub fn insert(&mut self, param: Param, value: ParamValue) -> Result<ParamValue, ProtocolError> {
        self.set(param, &serde_json::to_value(value)?)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Param, ParamValue)> + '_ {
        self.values.iter().map(|(p, v)| (*p, *v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn names_round_trip() {
        for p in Param::ALL {
            assert_eq!(Param::from_name(p.name()), Some(p));
            assert_eq!(serde_json::to_value(p).unwrap(), json!(p.name()));
        }
        assert_eq!(Param::from_name("volume"), None);
    }

    #[test]
    fn store_starts_with_defaults() {
        let store = ParameterStore::new();
        assert_eq!(store.len(), 10);
        assert_eq!(store.get(Param::Duration), ParamValue::Number(100.0));
        assert_eq!(store.get(Param::Freeze), ParamValue::Flag(false));
    }

    #[test]
    fn sliders_are_clamped() {
        let mut store = ParameterStore::new();
        assert_eq!(
            store.set(Param::Period, &json!(1000)).unwrap(),
            ParamValue::Number(200.0)
        );
        assert_eq!(
            store.set(Param::Pitch, &json!(-5000.5)).unwrap(),
            ParamValue::Number(-1200.0)
        );
        assert_eq!(store.get(Param::Period), ParamValue::Number(200.0));
    }

    #[test]
    fn wrong_kinds_are_rejected() {
        let mut store = ParameterStore::new();
        assert!(store.set(Param::Gain, &json!(true)).is_err());
        assert!(store.set(Param::Freeze, &json!(1)).is_err());
        assert!(store.set(Param::Blur, &json!("3")).is_err());
        assert_eq!(store, ParameterStore::new());
    }

    #[test]
    fn values_serialize_untagged() {
        assert_eq!(serde_json::to_value(ParamValue::Flag(true)).unwrap(), json!(true));
        assert_eq!(serde_json::to_value(ParamValue::Number(2.5)).unwrap(), json!(2.5));
        let v: ParamValue = serde_json::from_value(json!(7)).unwrap();
        assert_eq!(v, ParamValue::Number(7.0));
    }
}
