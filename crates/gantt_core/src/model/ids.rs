//! Identifier types shared by tasks and links.

use serde::de::{self, Deserializer, Unexpected, Visitor};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Durable task identifier (SQLite rowid).
pub type TaskId = i64;

/// Durable link identifier (SQLite rowid).
pub type LinkId = i64;

/// Parent value of top-level tasks. Never assigned to a stored task.
pub const ROOT_TASK_ID: TaskId = 0;

/// Lenient wire form of an id.
///
/// The Gantt editor sends ids as numbers, as numeric strings, and uses an
/// empty string or `null` for "no id". All of those decode here; the empty
/// forms decode to [`ROOT_TASK_ID`].
///
/// Inside an `Option` field, `null` still decodes to `None` ("not supplied").
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct FuzzyId(pub i64);

impl FuzzyId {
    pub fn get(self) -> i64 {
        self.0
    }
}

impl From<i64> for FuzzyId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<FuzzyId> for i64 {
    fn from(value: FuzzyId) -> Self {
        value.0
    }
}

impl Display for FuzzyId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> Deserialize<'de> for FuzzyId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(FuzzyIdVisitor)
    }
}

struct FuzzyIdVisitor;

impl<'de> Visitor<'de> for FuzzyIdVisitor {
    type Value = FuzzyId;

    fn expecting(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("an integer id, a numeric string, an empty string or null")
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<FuzzyId, E> {
        Ok(FuzzyId(value))
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<FuzzyId, E> {
        i64::try_from(value)
            .map(FuzzyId)
            .map_err(|_| E::invalid_value(Unexpected::Unsigned(value), &self))
    }

    fn visit_f64<E: de::Error>(self, value: f64) -> Result<FuzzyId, E> {
        if value.fract() == 0.0 && value >= i64::MIN as f64 && value <= i64::MAX as f64 {
            return Ok(FuzzyId(value as i64));
        }
        Err(E::invalid_value(Unexpected::Float(value), &self))
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<FuzzyId, E> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Ok(FuzzyId(ROOT_TASK_ID));
        }
        trimmed
            .parse::<i64>()
            .map(FuzzyId)
            .map_err(|_| E::invalid_value(Unexpected::Str(value), &self))
    }

    fn visit_unit<E: de::Error>(self) -> Result<FuzzyId, E> {
        Ok(FuzzyId(ROOT_TASK_ID))
    }

    fn visit_none<E: de::Error>(self) -> Result<FuzzyId, E> {
        Ok(FuzzyId(ROOT_TASK_ID))
    }

    fn visit_some<D>(self, deserializer: D) -> Result<FuzzyId, D::Error>
    where
        D: Deserializer<'de>,
    {
        FuzzyId::deserialize(deserializer)
    }
}
