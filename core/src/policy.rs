//! # Latency Policy
//!
//! The latency document declares three kinds of rules:
//!
//! ```yaml
//! DefaultLatency: 5ms
//! IntraRoleLatency:
//!   Controller: 20ms
//! InterRoleLatency:
//!   Controller_Compute: 100ms
//! ```
//!
//! Every distinct latency value is bound to a traffic-control mark. Marks are
//! handed out from [`FIRST_MARK`] upwards, visiting the default, then the
//! intra-role entries, then the inter-role entries, in declaration order.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::Deserialize;
use serde_yaml::Value;

use crate::error::PolicyError;

/// Integer tag binding a latency class to packets.
pub type Mark = u32;

pub const FIRST_MARK: Mark = 10;

const TIME_UNITS: &[&str] = &["us", "usec", "ms", "msec", "s", "sec", "secs"];

/// A tc time value such as `20ms`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Latency(String);

impl Latency {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Latency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Latency {
    type Err = String;

    /// Accepts a decimal number optionally followed by a tc time unit.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let split = s
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(s.len());
        let (number, unit) = s.split_at(split);

        let valid_number = !number.is_empty()
            && !number.starts_with('.')
            && !number.ends_with('.')
            && number.matches('.').count() <= 1;
        if !valid_number {
            return Err(format!("invalid duration {s:?}"));
        }
        if !unit.is_empty() && !TIME_UNITS.contains(&unit) {
            return Err(format!("unknown time unit {unit:?} in {s:?}"));
        }

        Ok(Self(s.to_string()))
    }
}

/// Distinct latency values and their marks, in assignment order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LatencyMarks {
    marks: IndexMap<Latency, Mark>,
}

impl LatencyMarks {
    fn register(&mut self, latency: &Latency) {
        if !self.marks.contains_key(latency) {
            let mark = FIRST_MARK + self.marks.len() as Mark;
            self.marks.insert(latency.clone(), mark);
        }
    }

    pub fn get(&self, latency: &Latency) -> Option<Mark> {
        self.marks.get(latency).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Latency, Mark)> {
        self.marks.iter().map(|(latency, mark)| (latency, *mark))
    }

    pub fn len(&self) -> usize {
        self.marks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawPolicy {
    #[serde(default)]
    default_latency: Option<Value>,
    #[serde(default)]
    intra_role_latency: Option<IndexMap<String, Value>>,
    #[serde(default)]
    inter_role_latency: Option<IndexMap<String, Value>>,
}

#[derive(Debug, Clone)]
pub struct LatencyPolicy {
    default: Option<Latency>,
    intra_role: Vec<(String, Latency)>,
    /// Keyed by `RoleA_RoleB`.
    inter_role: Vec<(String, Latency)>,
    marks: LatencyMarks,
}

impl LatencyPolicy {
    pub fn from_value(value: Value) -> Result<Self, PolicyError> {
        let raw: RawPolicy = serde_yaml::from_value(value)?;

        let default = match &raw.default_latency {
            None | Some(Value::Null) => None,
            Some(value) => Some(parse_latency("DefaultLatency", value)?),
        };
        let intra_role = parse_entries("IntraRoleLatency", raw.intra_role_latency)?;
        let inter_role = parse_entries("InterRoleLatency", raw.inter_role_latency)?;

        Ok(Self::new(default, intra_role, inter_role))
    }

    pub fn new(
        default: Option<Latency>,
        intra_role: Vec<(String, Latency)>,
        inter_role: Vec<(String, Latency)>,
    ) -> Self {
        let mut marks = LatencyMarks::default();
        let declared = default
            .iter()
            .chain(intra_role.iter().map(|(_, latency)| latency))
            .chain(inter_role.iter().map(|(_, latency)| latency));
        for latency in declared {
            marks.register(latency);
        }

        Self {
            default,
            intra_role,
            inter_role,
            marks,
        }
    }

    pub fn default_latency(&self) -> Option<&Latency> {
        self.default.as_ref()
    }

    pub fn intra_role_latency(&self, role: &str) -> Option<&Latency> {
        self.intra_role
            .iter()
            .find(|(name, _)| name == role)
            .map(|(_, latency)| latency)
    }

    /// Latency between `first` and `second`, declared under either ordering.
    pub fn inter_role_latency(
        &self,
        first: &str,
        second: &str,
    ) -> Result<Option<&Latency>, PolicyError> {
        let forward = format!("{first}_{second}");
        let reverse = format!("{second}_{first}");

        let matches: Vec<&Latency> = self
            .inter_role
            .iter()
            .filter(|(key, _)| *key == forward || *key == reverse)
            .map(|(_, latency)| latency)
            .collect();

        match matches.as_slice() {
            [] => Ok(None),
            [latency] => Ok(Some(*latency)),
            _ => Err(PolicyError::ConflictingInterRole { forward, reverse }),
        }
    }

    pub fn all_latency_marks(&self) -> &LatencyMarks {
        &self.marks
    }

    pub fn mark_for(&self, latency: &Latency) -> Result<Mark, PolicyError> {
        self.marks
            .get(latency)
            .ok_or_else(|| PolicyError::UnregisteredLatency(latency.to_string()))
    }
}

fn parse_entries(
    section: &str,
    entries: Option<IndexMap<String, Value>>,
) -> Result<Vec<(String, Latency)>, PolicyError> {
    entries
        .unwrap_or_default()
        .into_iter()
        .map(|(key, value)| -> Result<_, PolicyError> {
            let latency = parse_latency(&format!("{section}.{key}"), &value)?;
            Ok((key, latency))
        })
        .collect()
}

fn parse_latency(key: &str, value: &Value) -> Result<Latency, PolicyError> {
    let invalid = || PolicyError::InvalidLatency {
        key: key.to_string(),
        value: format!("{value:?}"),
    };
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return Err(invalid()),
    };
    text.parse().map_err(|_| invalid())
}
