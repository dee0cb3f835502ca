//! Governance data models
//!
//! Drafts, vote records and the vote markers members react with.

use crate::error::AppError;
use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Which sequence a proposal is numbered in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalKind {
    /// Bloom Budget Proposal (BBP)
    Budget,
    /// Bloom Governance Proposal (BGP)
    Governance,
}

impl ProposalKind {
    pub fn id_type(&self) -> &'static str {
        match self {
            ProposalKind::Budget => "budget",
            ProposalKind::Governance => "governance",
        }
    }

    pub fn title_prefix(&self) -> &'static str {
        match self {
            ProposalKind::Budget => "Bloom Budget Proposal (BBP)",
            ProposalKind::Governance => "Bloom Governance Proposal (BGP)",
        }
    }
}

impl FromStr for ProposalKind {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_lowercase().as_str() {
            "budget" => Ok(ProposalKind::Budget),
            "governance" => Ok(ProposalKind::Governance),
            other => Err(AppError::InvalidKind(other.to_string())),
        }
    }
}

/// Accepts any casing, like `FromStr`
impl<'de> Deserialize<'de> for ProposalKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse::<ProposalKind>().map_err(de::Error::custom)
    }
}

impl fmt::Display for ProposalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id_type())
    }
}

/// Proposal content before publication
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Draft {
    #[serde(rename = "type")]
    pub kind: ProposalKind,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub background: String,
}

/// The three reactions a vote is cast with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteMarker {
    Yes,
    No,
    Abstain,
}

impl VoteMarker {
    /// Reaction order on the root message
    pub const ALL: [VoteMarker; 3] = [VoteMarker::Yes, VoteMarker::No, VoteMarker::Abstain];

    pub fn symbol(&self) -> &'static str {
        match self {
            VoteMarker::Yes => "✅",
            VoteMarker::No => "❌",
            VoteMarker::Abstain => "➖",
        }
    }

    /// Heading shown next to the marker in the proposal body
    pub fn heading(&self) -> &'static str {
        match self {
            VoteMarker::Yes => "Yes",
            VoteMarker::No => "Reassess",
            VoteMarker::Abstain => "Abstain",
        }
    }

    /// Choice label handed to the submission bridge
    pub fn label(&self) -> &'static str {
        match self {
            VoteMarker::Yes => "Yes",
            VoteMarker::No => "No",
            VoteMarker::Abstain => "Abstain",
        }
    }

    pub fn from_symbol(symbol: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.symbol() == symbol)
    }
}

/// Final or in-progress reaction counts, excluding the bot's own reactions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteCounts {
    pub yes: u64,
    pub no: u64,
    pub abstain: u64,
}

impl VoteCounts {
    pub fn set(&mut self, marker: VoteMarker, value: u64) {
        match marker {
            VoteMarker::Yes => self.yes = value,
            VoteMarker::No => self.no = value,
            VoteMarker::Abstain => self.abstain = value,
        }
    }
}

/// Outcome of a concluded vote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Passed,
    Failed,
}

/// Snowflake ids travel as strings; they do not fit an IEEE double
mod snowflake {
    use super::*;

    pub fn serialize<S: Serializer>(id: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&id.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse()
            .map_err(|_| de::Error::custom(format!("invalid snowflake '{}'", raw)))
    }
}

/// An in-flight vote, owned by the vote ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRecord {
    /// Discussion thread id; the forum root message shares it
    #[serde(with = "snowflake")]
    pub proposal_id: u64,
    pub draft: Draft,
    /// Fully rendered title, e.g. "Bloom Governance Proposal (BGP) #4: ..."
    pub title: String,
    pub channel_name: String,
    #[serde(with = "snowflake")]
    pub channel_id: u64,
    pub end_time: DateTime<Utc>,
    pub counts: VoteCounts,
}

impl VoteRecord {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        now >= self.end_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_kind_parsing_is_case_insensitive() {
        assert_eq!("Budget".parse::<ProposalKind>().unwrap(), ProposalKind::Budget);
        assert_eq!(" governance ".parse::<ProposalKind>().unwrap(), ProposalKind::Governance);
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let err = "grant".parse::<ProposalKind>().unwrap_err();
        assert!(matches!(err, AppError::InvalidKind(kind) if kind == "grant"));
    }

    #[test]
    fn test_kind_deserializes_in_any_case() {
        let kinds: Vec<ProposalKind> = serde_json::from_str(r#"["Budget", "GOVERNANCE", "budget"]"#).unwrap();
        assert_eq!(kinds, vec![ProposalKind::Budget, ProposalKind::Governance, ProposalKind::Budget]);
        assert!(serde_json::from_str::<ProposalKind>(r#""grant""#).is_err());
    }

    #[test]
    fn test_marker_symbols_round_trip() {
        for marker in VoteMarker::ALL {
            assert_eq!(VoteMarker::from_symbol(marker.symbol()), Some(marker));
        }
        assert_eq!(VoteMarker::from_symbol("🎉"), None);
    }

    #[test]
    fn test_draft_uses_wire_field_names() {
        let draft = Draft {
            kind: ProposalKind::Budget,
            title: "Fund art".to_string(),
            abstract_text: "Pay artists".to_string(),
            background: "We need art".to_string(),
        };
        let value = serde_json::to_value(&draft).unwrap();
        assert_eq!(value["type"], "budget");
        assert_eq!(value["abstract"], "Pay artists");
    }

    fn sample_record(end: DateTime<Utc>) -> VoteRecord {
        VoteRecord {
            proposal_id: 1,
            draft: Draft {
                kind: ProposalKind::Governance,
                title: "t".to_string(),
                abstract_text: "a".to_string(),
                background: "b".to_string(),
            },
            title: "t".to_string(),
            channel_name: "improvement-props".to_string(),
            channel_id: 2,
            end_time: end,
            counts: VoteCounts::default(),
        }
    }

    #[test]
    fn test_record_is_due_at_end_time() {
        let end = Utc::now();
        let record = sample_record(end);
        assert!(!record.is_due(end - Duration::seconds(1)));
        assert!(record.is_due(end));
    }

    #[test]
    fn test_record_ids_serialize_as_strings() {
        let mut record = sample_record(Utc::now());
        record.proposal_id = 1199577260643057685;
        record.channel_id = 980752213347549234;

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["proposalId"], "1199577260643057685");
        assert_eq!(value["channelId"], "980752213347549234");

        let back: VoteRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, record);
    }
}
