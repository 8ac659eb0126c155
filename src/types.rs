use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Opaque ID types for type safety
pub type DebateId = String;
pub type OptionId = String;
pub type VoteId = String;
pub type Fingerprint = String;

/// Lifecycle of a debate under moderation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DebateStatus {
    Pending,
    Approved,
    Rejected,
}

impl DebateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DebateStatus::Pending => "pending",
            DebateStatus::Approved => "approved",
            DebateStatus::Rejected => "rejected",
        }
    }
}

impl std::str::FromStr for DebateStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(DebateStatus::Pending),
            "approved" => Ok(DebateStatus::Approved),
            "rejected" => Ok(DebateStatus::Rejected),
            other => Err(format!("unknown debate status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Debate {
    pub id: DebateId,
    /// Assigned once at creation, never rewritten
    pub slug: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub status: DebateStatus,
    /// Only meaningful when `status == Rejected`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    pub is_active: bool,
    pub is_more_option_allowed: bool,
    pub total_votes: u64,
    pub created_at: DateTime<Utc>,
}

impl Debate {
    /// Public voting requires an approved and active debate
    pub fn is_votable(&self) -> bool {
        self.status == DebateStatus::Approved && self.is_active
    }
}

/// A selectable choice within a debate
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DebateOption {
    pub id: OptionId,
    pub debate_id: DebateId,
    pub name: String,
    pub votes: u64,
    pub created_at: DateTime<Utc>,
}

/// The current choice of one voter within one debate (overwritten on change)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    pub id: VoteId,
    pub debate_id: DebateId,
    pub fingerprint: Fingerprint,
    pub option_id: OptionId,
    pub updated_at: DateTime<Utc>,
}

/// Guarded content-creation actions, each with its own daily window
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActionClass {
    OptionCreation,
    DraftGeneration,
}

impl ActionClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionClass::OptionCreation => "option_creation",
            ActionClass::DraftGeneration => "draft_generation",
        }
    }
}

/// Key of a rate-limit window: one per identity, calendar day and action
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WindowKey {
    /// SHA-256 digest of the caller's network identity
    pub identity: String,
    pub day: NaiveDate,
    pub action: ActionClass,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitWindow {
    pub key: WindowKey,
    pub count: u32,
    pub last_request: DateTime<Utc>,
}

/// Categories a debate may be filed under
pub const CATEGORIES: &[&str] = &[
    "AI",
    "Art",
    "Automotive",
    "Business",
    "Career",
    "Crypto",
    "Education",
    "Entertainment",
    "Fashion",
    "Finance",
    "Fitness",
    "Food",
    "Gaming",
    "Health",
    "History",
    "Literature",
    "Movies",
    "Music",
    "Nature",
    "Parenting",
    "Pets",
    "Philosophy",
    "Politics",
    "Relationships",
    "Science",
    "Social Media",
    "Space",
    "Sports",
    "TV Shows",
    "Technology",
    "Travel",
];

/// Category used when neither the submitter nor the classifier picked a known one
pub const FALLBACK_CATEGORY: &str = "Other";

/// Resolve a free-form category name to its canonical spelling
pub fn canonical_category(name: &str) -> Option<&'static str> {
    let wanted = name.trim();
    CATEGORIES
        .iter()
        .copied()
        .find(|c| c.eq_ignore_ascii_case(wanted))
}
