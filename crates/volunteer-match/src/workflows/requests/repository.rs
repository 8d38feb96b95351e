use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{Category, HelpRequest, RequestId, RequestStatus, Role, Urgency, UserId};
use super::rating::{RatingGrant, RatingOutcome, RatingStats};

/// Storage abstraction for help requests.
///
/// `update` is an optimistic write: it must only succeed when the stored record's
/// version is exactly one behind the version carried by `record`, and must report
/// [`RepositoryError::VersionConflict`] otherwise.
pub trait RequestRepository: Send + Sync {
    fn insert(&self, record: HelpRequest) -> Result<HelpRequest, RepositoryError>;
    fn update(&self, record: HelpRequest) -> Result<(), RepositoryError>;
    fn fetch(&self, id: &RequestId) -> Result<Option<HelpRequest>, RepositoryError>;
    fn remove(&self, id: &RequestId, version: u64) -> Result<(), RepositoryError>;
    fn list(&self) -> Result<Vec<HelpRequest>, RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("record was modified concurrently")]
    VersionConflict,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Counters owned by the user-profile collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileCounter {
    RequestsCreated,
    ServicesVolunteered,
}

/// Identity and profile collaborator as seen by the matching engine.
pub trait UserDirectory: Send + Sync {
    /// Role of a known identity, `None` when the identity does not exist.
    fn role_of(&self, user: &UserId) -> Result<Option<Role>, DirectoryError>;

    /// Atomically fold `grant.score` into the volunteer's rating.
    ///
    /// Implementations remember which `(request, volunteer)` pairs were applied and
    /// answer [`RatingOutcome::AlreadyRecorded`] for repeats.
    fn record_rating(&self, grant: &RatingGrant) -> Result<RatingOutcome, DirectoryError>;

    fn rating_of(&self, user: &UserId) -> Result<Option<RatingStats>, DirectoryError>;

    fn increment_counter(&self, user: &UserId, counter: ProfileCounter)
        -> Result<(), DirectoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("unknown user {0}")]
    UnknownUser(UserId),
    #[error("user directory unavailable: {0}")]
    Unavailable(String),
}

/// Listing filter; every populated field must match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestFilter {
    pub status: Option<RequestStatus>,
    pub category: Option<Category>,
    pub urgency: Option<Urgency>,
    pub requester: Option<UserId>,
    /// Requests the volunteer applied to or was assigned to.
    pub volunteer: Option<UserId>,
}

impl RequestFilter {
    pub fn matches(&self, request: &HelpRequest, now: DateTime<Utc>) -> bool {
        self.status
            .map_or(true, |status| request.effective_status(now) == status)
            && self
                .category
                .map_or(true, |category| request.category == category)
            && self.urgency.map_or(true, |urgency| request.urgency == urgency)
            && self
                .requester
                .as_ref()
                .map_or(true, |requester| &request.requester == requester)
            && self
                .volunteer
                .as_ref()
                .map_or(true, |volunteer| request.involves(volunteer))
    }
}
