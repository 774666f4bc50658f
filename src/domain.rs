use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::RatError;

static STUDY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^S(\d{2})$").expect("study id regex"));

pub const FIRST_STUDY: u8 = 1;
pub const LAST_STUDY: u8 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StudyId(u8);

impl StudyId {
    pub fn new(number: u8) -> Result<Self, RatError> {
        if !(FIRST_STUDY..=LAST_STUDY).contains(&number) {
            return Err(RatError::InvalidDataset(format!("S{number:02}")));
        }
        Ok(Self(number))
    }

    pub fn number(&self) -> u8 {
        self.0
    }

    pub fn code(&self) -> String {
        format!("S{:02}", self.0)
    }

    pub fn all() -> Vec<StudyId> {
        (FIRST_STUDY..=LAST_STUDY).map(StudyId).collect()
    }
}

impl fmt::Display for StudyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{:02}", self.0)
    }
}

impl FromStr for StudyId {
    type Err = RatError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_uppercase();
        let number = STUDY_RE
            .captures(&normalized)
            .and_then(|caps| caps.get(1))
            .and_then(|digits| digits.as_str().parse::<u8>().ok())
            .ok_or_else(|| RatError::InvalidDataset(value.to_string()))?;
        Self::new(number).map_err(|_| RatError::InvalidDataset(value.to_string()))
    }
}

impl TryFrom<String> for StudyId {
    type Error = RatError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<StudyId> for String {
    fn from(value: StudyId) -> Self {
        value.code()
    }
}

/// Friendly names for the published study collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetGroup {
    RifampicinEffectSize,
    SixCompound,
    FieldStrength,
    Chronic,
}

impl DatasetGroup {
    pub const ALL: [DatasetGroup; 4] = [
        DatasetGroup::RifampicinEffectSize,
        DatasetGroup::SixCompound,
        DatasetGroup::FieldStrength,
        DatasetGroup::Chronic,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DatasetGroup::RifampicinEffectSize => "rifampicin_effect_size",
            DatasetGroup::SixCompound => "six_compound",
            DatasetGroup::FieldStrength => "field_strength",
            DatasetGroup::Chronic => "chronic",
        }
    }

    pub fn studies(&self) -> Vec<StudyId> {
        let numbers: &[u8] = match self {
            DatasetGroup::RifampicinEffectSize => &[1, 2, 3, 4],
            DatasetGroup::SixCompound => &[5, 6, 7, 8, 9, 10, 12],
            DatasetGroup::FieldStrength => &[13],
            DatasetGroup::Chronic => &[11, 14, 15],
        };
        numbers.iter().copied().map(StudyId).collect()
    }
}

impl fmt::Display for DatasetGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DatasetGroup {
    type Err = RatError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_lowercase();
        DatasetGroup::ALL
            .into_iter()
            .find(|group| group.name() == normalized)
            .ok_or_else(|| RatError::InvalidDataset(value.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dataset {
    Study(StudyId),
    Group(DatasetGroup),
    All,
}

impl Dataset {
    pub fn studies(&self) -> Vec<StudyId> {
        match self {
            Dataset::Study(id) => vec![*id],
            Dataset::Group(group) => group.studies(),
            Dataset::All => StudyId::all(),
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dataset::Study(id) => write!(f, "{id}"),
            Dataset::Group(group) => write!(f, "{group}"),
            Dataset::All => f.write_str("all"),
        }
    }
}

impl FromStr for Dataset {
    type Err = RatError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.eq_ignore_ascii_case("all") {
            return Ok(Dataset::All);
        }
        if let Ok(group) = trimmed.parse::<DatasetGroup>() {
            return Ok(Dataset::Group(group));
        }
        trimmed
            .parse::<StudyId>()
            .map(Dataset::Study)
            .map_err(|_| RatError::InvalidDataset(value.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_study_id_normalizes_case() {
        let id: StudyId = " s07 ".parse().unwrap();
        assert_eq!(id.code(), "S07");
        assert_eq!(id.number(), 7);
    }

    #[test]
    fn parse_study_id_out_of_range() {
        for value in ["S00", "S16", "S1", "X01", ""] {
            let err = value.parse::<StudyId>().unwrap_err();
            assert_matches!(err, RatError::InvalidDataset(_));
        }
    }

    #[test]
    fn group_names_round_trip_through_display() {
        for group in DatasetGroup::ALL {
            let parsed: DatasetGroup = group.to_string().parse().unwrap();
            assert_eq!(parsed, group);
        }
    }

    #[test]
    fn all_expands_to_every_study() {
        let studies = Dataset::All.studies();
        assert_eq!(studies.len(), 15);
        assert_eq!(studies.first().map(StudyId::code).as_deref(), Some("S01"));
        assert_eq!(studies.last().map(StudyId::code).as_deref(), Some("S15"));
    }

    #[test]
    fn study_id_serializes_as_code() {
        let id: StudyId = "S03".parse().unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"S03\"");
    }
}
