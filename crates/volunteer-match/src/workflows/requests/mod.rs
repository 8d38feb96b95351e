//! Help request lifecycle and volunteer matching.
//!
//! A request moves `pending -> matched -> completed`, may be cancelled while live,
//! and reads as expired once `expiresAt` has passed. The lifecycle, application
//! registry, and assignment engine are all implemented as methods on
//! [`HelpRequest`] so a single record is validated and mutated in one place; the
//! [`HelpRequestService`] wraps each call in an optimistic read-modify-write
//! against a [`RequestRepository`] and forwards completion ratings to the
//! [`RatingAggregator`].

pub mod applications;
pub mod assignment;
pub mod clock;
pub mod domain;
pub mod lifecycle;
pub mod rating;
pub mod repository;
pub mod router;
pub mod service;
pub mod store;

#[cfg(test)]
mod tests;

pub use applications::ApplicationReview;
pub use clock::{Clock, ManualClock, SystemClock};
pub use domain::{
    Actor, ApplicationStatus, Assignment, Category, CompletionDetails, CompletionRequest,
    ContactMethod, HelpRequest, InterestEntry, LifecycleError, Location, RejectionEntry,
    RequestChanges, RequestDraft, RequestId, RequestStats, RequestStatus, RequestSummary, Role,
    Urgency, UserId,
};
pub use rating::{round1, RatingAggregator, RatingGrant, RatingOutcome, RatingScore, RatingStats};
pub use repository::{
    DirectoryError, ProfileCounter, RepositoryError, RequestFilter, RequestRepository,
    UserDirectory,
};
pub use router::request_router;
pub use service::{HelpRequestService, MatchServiceError};
pub use store::{InMemoryRequestRepository, InMemoryUserDirectory, UserProfile};
