use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{CharacterId, SessionId, SnapshotId};

/// Strength of a snapshot attribution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
    /// History existed in the window but no weapon overlapped.
    NoMatch,
    /// No history in the window at all.
    NotFound,
}

impl ConfidenceLevel {
    /// Map a weapon-overlap score to a level; `None` below the eligibility floor.
    pub fn from_score(score: u8) -> Option<Self> {
        match score {
            0 => None,
            1 => Some(Self::Low),
            2 | 3 => Some(Self::Medium),
            _ => Some(Self::High),
        }
    }

    /// Whether a snapshot was actually attributed.
    pub fn is_linked(self) -> bool {
        matches!(self, Self::High | Self::Medium | Self::Low)
    }
}

impl std::fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::High => write!(f, "high"),
            Self::Medium => write!(f, "medium"),
            Self::Low => write!(f, "low"),
            Self::NoMatch => write!(f, "no-match"),
            Self::NotFound => write!(f, "not-found"),
        }
    }
}

impl std::str::FromStr for ConfidenceLevel {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            "no-match" => Ok(Self::NoMatch),
            "not-found" => Ok(Self::NotFound),
            other => Err(format!("unknown confidence level: {other}")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceSource {
    System,
    User,
}

impl std::fmt::Display for ConfidenceSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
        }
    }
}

impl std::str::FromStr for ConfidenceSource {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(Self::System),
            "user" => Ok(Self::User),
            other => Err(format!("unknown confidence source: {other}")),
        }
    }
}

/// Attribution of one match to one character's snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotLink {
    pub character_id: CharacterId,
    pub confidence_level: ConfidenceLevel,
    pub confidence_source: ConfidenceSource,
    pub created_at: DateTime<Utc>,
    /// Set when the link was produced during a session check-in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_id: Option<SnapshotId>,
}

impl SnapshotLink {
    /// System-sourced link with no session attached yet.
    pub fn system(
        character_id: CharacterId,
        confidence_level: ConfidenceLevel,
        snapshot_id: Option<SnapshotId>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            character_id,
            confidence_level,
            confidence_source: ConfidenceSource::System,
            created_at,
            session_id: None,
            snapshot_id,
        }
    }

    pub fn with_session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_mapping() {
        assert_eq!(ConfidenceLevel::from_score(5), Some(ConfidenceLevel::High));
        assert_eq!(ConfidenceLevel::from_score(4), Some(ConfidenceLevel::High));
        assert_eq!(ConfidenceLevel::from_score(3), Some(ConfidenceLevel::Medium));
        assert_eq!(ConfidenceLevel::from_score(2), Some(ConfidenceLevel::Medium));
        assert_eq!(ConfidenceLevel::from_score(1), Some(ConfidenceLevel::Low));
        assert_eq!(ConfidenceLevel::from_score(0), None);
    }

    #[test]
    fn level_display_matches_serde() {
        for level in [
            ConfidenceLevel::High,
            ConfidenceLevel::Medium,
            ConfidenceLevel::Low,
            ConfidenceLevel::NoMatch,
            ConfidenceLevel::NotFound,
        ] {
            let json = serde_json::to_value(level).unwrap();
            assert_eq!(json, serde_json::Value::String(level.to_string()));
            assert_eq!(level.to_string().parse::<ConfidenceLevel>().unwrap(), level);
        }
    }

    #[test]
    fn unlinked_levels() {
        assert!(!ConfidenceLevel::NoMatch.is_linked());
        assert!(!ConfidenceLevel::NotFound.is_linked());
        assert!(ConfidenceLevel::Low.is_linked());
    }

    #[test]
    fn with_session_attaches_id() {
        let link = SnapshotLink::system(
            CharacterId::from_raw("c1"),
            ConfidenceLevel::NotFound,
            None,
            Utc::now(),
        )
        .with_session(SessionId::from_raw("sess_1"));
        assert_eq!(link.session_id.unwrap().as_str(), "sess_1");
        assert_eq!(link.confidence_source, ConfidenceSource::System);
    }
}
