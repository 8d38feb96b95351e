use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Smallest and largest number of volunteers a single request may ask for.
pub const MIN_VOLUNTEERS_NEEDED: u8 = 1;
pub const MAX_VOLUNTEERS_NEEDED: u8 = 10;

/// Days a request stays open before it is treated as expired.
pub const DEFAULT_REQUEST_TTL_DAYS: i64 = 30;

/// Identifier wrapper for help requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub String);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier wrapper for any user known to the identity collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Closed set of roles handed to the engine by the identity collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Requester,
    Volunteer,
    Administrator,
}

impl Role {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Requester => "requester",
            Self::Volunteer => "volunteer",
            Self::Administrator => "administrator",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "requester" => Some(Self::Requester),
            "volunteer" => Some(Self::Volunteer),
            "administrator" | "admin" => Some(Self::Administrator),
            _ => None,
        }
    }

    pub const fn can_open_requests(self) -> bool {
        matches!(self, Self::Requester)
    }

    pub const fn can_volunteer(self) -> bool {
        matches!(self, Self::Volunteer)
    }

    pub const fn overrides_ownership(self) -> bool {
        matches!(self, Self::Administrator)
    }
}

/// Authenticated caller of a lifecycle operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: UserId(id.into()),
            role,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Medical,
    Transportation,
    Shopping,
    Household,
    Technology,
    Companion,
    Other,
}

impl Category {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Medical => "medical",
            Self::Transportation => "transportation",
            Self::Shopping => "shopping",
            Self::Household => "household",
            Self::Technology => "technology",
            Self::Companion => "companion",
            Self::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    Medium,
    High,
    Urgent,
}

impl Urgency {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactMethod {
    Phone,
    Email,
    Message,
}

/// Authoritative workflow status of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Matched,
    Completed,
    Cancelled,
    Expired,
}

impl RequestStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Matched => "matched",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Expired)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Requester-side decision recorded on an interest entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    Pending,
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub address: String,
    pub city: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
}

/// Fields supplied by the requester when opening a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestDraft {
    pub title: String,
    pub description: String,
    pub category: Category,
    pub urgency: Urgency,
    pub location: Location,
    pub volunteers_needed: u8,
    pub expected_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_time: Option<NaiveTime>,
    pub contact_method: ContactMethod,
}

/// Partial edit of the descriptive fields of a pending request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<Category>,
    pub urgency: Option<Urgency>,
    pub location: Option<Location>,
    pub volunteers_needed: Option<u8>,
    pub expected_date: Option<NaiveDate>,
    pub expected_time: Option<NaiveTime>,
    pub contact_method: Option<ContactMethod>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterestEntry {
    pub volunteer: UserId,
    pub applied_at: DateTime<Utc>,
    pub message: String,
    pub application_status: ApplicationStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub volunteer: UserId,
    pub assigned_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    /// Set once the directory has acknowledged this assignment's rating.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub rating_recorded: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectionEntry {
    pub volunteer: UserId,
    pub rejected_at: DateTime<Utc>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionDetails {
    pub completed_at: DateTime<Utc>,
    /// Minutes spent on the visit, as reported by the requester.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_duration: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

/// Input to the completion transition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRequest {
    pub rating: Option<u8>,
    pub feedback: Option<String>,
    pub actual_duration: Option<u32>,
    pub notes: Option<String>,
    pub volunteer_id: Option<UserId>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestStats {
    pub view_count: u64,
    pub shortlist_count: u64,
    pub application_count: u32,
}

/// The central aggregate: one help request and every list hanging off it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelpRequest {
    pub id: RequestId,
    /// Optimistic concurrency token, bumped on every committed write.
    pub version: u64,
    pub requester: UserId,
    pub title: String,
    pub description: String,
    pub category: Category,
    pub urgency: Urgency,
    pub location: Location,
    pub volunteers_needed: u8,
    pub expected_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_time: Option<NaiveTime>,
    pub contact_method: ContactMethod,
    pub status: RequestStatus,
    pub interested_volunteers: Vec<InterestEntry>,
    pub assigned_volunteers: Vec<Assignment>,
    pub rejected_volunteers: Vec<RejectionEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_details: Option<CompletionDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancellation_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled_by: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
    pub stats: RequestStats,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl HelpRequest {
    pub fn interest_of(&self, volunteer: &UserId) -> Option<&InterestEntry> {
        self.interested_volunteers
            .iter()
            .find(|entry| &entry.volunteer == volunteer)
    }

    pub fn assignment_of(&self, volunteer: &UserId) -> Option<&Assignment> {
        self.assigned_volunteers
            .iter()
            .find(|entry| &entry.volunteer == volunteer)
    }

    pub fn has_declined(&self, volunteer: &UserId) -> bool {
        self.rejected_volunteers
            .iter()
            .any(|entry| &entry.volunteer == volunteer)
    }

    pub fn open_slots(&self) -> usize {
        usize::from(self.volunteers_needed).saturating_sub(self.assigned_volunteers.len())
    }

    /// True when the volunteer has applied to or is assigned to this request.
    pub fn involves(&self, volunteer: &UserId) -> bool {
        self.interest_of(volunteer).is_some() || self.assignment_of(volunteer).is_some()
    }

    pub fn summary(&self, now: DateTime<Utc>) -> RequestSummary {
        RequestSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            category: self.category,
            urgency: self.urgency,
            status: self.effective_status(now),
            volunteers_needed: self.volunteers_needed,
            assigned_count: self.assigned_volunteers.len(),
            application_count: self.stats.application_count,
            expected_date: self.expected_date,
            expires_at: self.expires_at,
        }
    }
}

/// Read-only projection used by listings and the bookmark collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSummary {
    pub id: RequestId,
    pub title: String,
    pub category: Category,
    pub urgency: Urgency,
    pub status: RequestStatus,
    pub volunteers_needed: u8,
    pub assigned_count: usize,
    pub application_count: u32,
    pub expected_date: NaiveDate,
    pub expires_at: DateTime<Utc>,
}

/// Failures raised by the lifecycle rules themselves.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    #[error("cannot {operation} a request that is {status}")]
    InvalidState {
        operation: &'static str,
        status: RequestStatus,
    },
    #[error("{0} has no rights over this request")]
    Forbidden(UserId),
    #[error("all {needed} volunteer slots are already filled")]
    Capacity { needed: u8 },
    #[error("{0}")]
    Conflict(String),
    #[error("{0} is not a volunteer")]
    InvalidVolunteer(UserId),
    #[error("{0} not found")]
    NotFound(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl LifecycleError {
    /// Stable machine-readable name of the error kind.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidState { .. } => "invalid_state",
            Self::Forbidden(_) => "forbidden",
            Self::Capacity { .. } => "capacity",
            Self::Conflict(_) => "conflict",
            Self::InvalidVolunteer(_) => "invalid_volunteer",
            Self::NotFound(_) => "not_found",
            Self::InvalidInput(_) => "invalid_input",
        }
    }
}
