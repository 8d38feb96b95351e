//! Volunteer interest bookkeeping: applying, withdrawing, declining.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    Actor, ApplicationStatus, HelpRequest, InterestEntry, LifecycleError, RejectionEntry,
    RequestStatus, UserId,
};

/// Requester-side verdict on a volunteer's application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationReview {
    Accept,
    Decline,
}

impl HelpRequest {
    /// Register the calling volunteer's interest in a pending request.
    pub fn apply(
        &mut self,
        volunteer: &Actor,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), LifecycleError> {
        if !volunteer.role.can_volunteer() {
            return Err(LifecycleError::InvalidVolunteer(volunteer.id.clone()));
        }
        self.ensure_status("apply to", now, &[RequestStatus::Pending])?;

        if self.interest_of(&volunteer.id).is_some() {
            return Err(LifecycleError::Conflict(format!(
                "{} has already applied to request {}",
                volunteer.id, self.id
            )));
        }
        if self.assignment_of(&volunteer.id).is_some() {
            return Err(LifecycleError::Conflict(format!(
                "{} is already assigned to request {}",
                volunteer.id, self.id
            )));
        }
        if self.has_declined(&volunteer.id) {
            return Err(LifecycleError::Conflict(format!(
                "{} has declined request {}",
                volunteer.id, self.id
            )));
        }

        self.interested_volunteers.push(InterestEntry {
            volunteer: volunteer.id.clone(),
            applied_at: now,
            message: message.into().trim().to_string(),
            application_status: ApplicationStatus::Pending,
        });
        self.recompute_status();
        Ok(())
    }

    /// Drop the volunteer's interest entry. Returns whether an entry was removed.
    ///
    /// Allowed in every status: interest entries outlive completion and
    /// cancellation, and removing one never moves the lifecycle.
    pub fn withdraw(&mut self, volunteer: &UserId) -> Result<bool, LifecycleError> {
        let removed = self.remove_interest(volunteer);
        self.recompute_status();
        Ok(removed)
    }

    /// Volunteer-initiated decline of this request.
    pub fn reject(
        &mut self,
        volunteer: &Actor,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), LifecycleError> {
        if !volunteer.role.can_volunteer() {
            return Err(LifecycleError::InvalidVolunteer(volunteer.id.clone()));
        }
        self.ensure_status(
            "decline",
            now,
            &[RequestStatus::Pending, RequestStatus::Matched],
        )?;

        if self.has_declined(&volunteer.id) {
            return Err(LifecycleError::Conflict(format!(
                "{} has already declined request {}",
                volunteer.id, self.id
            )));
        }
        if self.assignment_of(&volunteer.id).is_some() {
            return Err(LifecycleError::Conflict(format!(
                "{} is assigned to request {} and cannot decline it",
                volunteer.id, self.id
            )));
        }

        self.remove_interest(&volunteer.id);
        self.rejected_volunteers.push(RejectionEntry {
            volunteer: volunteer.id.clone(),
            rejected_at: now,
            reason: reason.into().trim().to_string(),
        });
        self.recompute_status();
        Ok(())
    }

    /// Mark an application accepted or declined without removing it.
    pub fn review_application(
        &mut self,
        actor: &Actor,
        volunteer: &UserId,
        review: ApplicationReview,
        now: DateTime<Utc>,
    ) -> Result<(), LifecycleError> {
        self.authorize_owner(actor)?;
        self.ensure_status(
            "review applications on",
            now,
            &[RequestStatus::Pending, RequestStatus::Matched],
        )?;

        let entry = self
            .interested_volunteers
            .iter_mut()
            .find(|entry| &entry.volunteer == volunteer)
            .ok_or_else(|| LifecycleError::NotFound(format!("application from {volunteer}")))?;
        entry.application_status = match review {
            ApplicationReview::Accept => ApplicationStatus::Accepted,
            ApplicationReview::Decline => ApplicationStatus::Rejected,
        };
        self.recompute_status();
        Ok(())
    }

    pub(crate) fn remove_interest(&mut self, volunteer: &UserId) -> bool {
        let before = self.interested_volunteers.len();
        self.interested_volunteers
            .retain(|entry| &entry.volunteer != volunteer);
        self.interested_volunteers.len() != before
    }
}
