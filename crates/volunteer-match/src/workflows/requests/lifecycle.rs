//! Status transitions of a help request.
//!
//! Every mutating operation follows the same shape: authorize the actor, check the
//! effective status (expiry is applied on read), validate all input, then mutate and
//! finish with [`HelpRequest::recompute_status`]. Validation happens before the first
//! write so a failed call leaves the record untouched.

use chrono::{DateTime, Duration, Utc};

use super::domain::{
    Actor, CompletionDetails, CompletionRequest, HelpRequest, LifecycleError, RequestChanges,
    RequestDraft, RequestId, RequestStats, RequestStatus, UserId, MAX_VOLUNTEERS_NEEDED,
    MIN_VOLUNTEERS_NEEDED,
};
use super::rating::{RatingGrant, RatingScore};

impl HelpRequest {
    /// Open a new request on behalf of a requester.
    pub fn open(
        id: RequestId,
        actor: &Actor,
        draft: RequestDraft,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<Self, LifecycleError> {
        if !actor.role.can_open_requests() {
            return Err(LifecycleError::Forbidden(actor.id.clone()));
        }
        validate_volunteers_needed(draft.volunteers_needed)?;
        let title = required_text("title", draft.title)?;
        let description = required_text("description", draft.description)?;

        Ok(Self {
            id,
            version: 0,
            requester: actor.id.clone(),
            title,
            description,
            category: draft.category,
            urgency: draft.urgency,
            location: draft.location,
            volunteers_needed: draft.volunteers_needed,
            expected_date: draft.expected_date,
            expected_time: draft.expected_time,
            contact_method: draft.contact_method,
            status: RequestStatus::Pending,
            interested_volunteers: Vec::new(),
            assigned_volunteers: Vec::new(),
            rejected_volunteers: Vec::new(),
            completion_details: None,
            cancellation_reason: None,
            cancelled_by: None,
            cancelled_at: None,
            stats: RequestStats::default(),
            created_at: now,
            updated_at: now,
            expires_at: now + ttl,
        })
    }

    /// Status as observed at `now`: a live request past `expires_at` reads as expired.
    pub fn effective_status(&self, now: DateTime<Utc>) -> RequestStatus {
        if !self.status.is_terminal() && self.expires_at < now {
            RequestStatus::Expired
        } else {
            self.status
        }
    }

    /// Copy of the record with expiry applied, for read paths.
    pub fn observed(mut self, now: DateTime<Utc>) -> Self {
        self.status = self.effective_status(now);
        self
    }

    /// Materialize a passive expiry. Returns whether the status changed.
    pub fn expire(&mut self, now: DateTime<Utc>) -> bool {
        if self.effective_status(now) == RequestStatus::Expired
            && self.status != RequestStatus::Expired
        {
            self.status = RequestStatus::Expired;
            true
        } else {
            false
        }
    }

    pub(crate) fn authorize_owner(&self, actor: &Actor) -> Result<(), LifecycleError> {
        if actor.id == self.requester || actor.role.overrides_ownership() {
            Ok(())
        } else {
            Err(LifecycleError::Forbidden(actor.id.clone()))
        }
    }

    pub(crate) fn ensure_status(
        &self,
        operation: &'static str,
        now: DateTime<Utc>,
        allowed: &[RequestStatus],
    ) -> Result<(), LifecycleError> {
        let status = self.effective_status(now);
        if allowed.contains(&status) {
            Ok(())
        } else {
            Err(LifecycleError::InvalidState { operation, status })
        }
    }

    /// Post-condition step run at the end of every mutation.
    ///
    /// Keeps `stats.applicationCount` equal to the interest list length and flips a
    /// pending request to matched once every slot is filled.
    pub(crate) fn recompute_status(&mut self) {
        self.stats.application_count =
            u32::try_from(self.interested_volunteers.len()).unwrap_or(u32::MAX);

        if self.status == RequestStatus::Pending
            && !self.assigned_volunteers.is_empty()
            && self.open_slots() == 0
        {
            self.status = RequestStatus::Matched;
        }
    }

    pub fn cancel(
        &mut self,
        actor: &Actor,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), LifecycleError> {
        self.authorize_owner(actor)?;
        self.ensure_status(
            "cancel",
            now,
            &[RequestStatus::Pending, RequestStatus::Matched],
        )?;

        self.status = RequestStatus::Cancelled;
        self.cancellation_reason = Some(reason.into().trim().to_string());
        self.cancelled_by = Some(actor.id.clone());
        self.cancelled_at = Some(now);
        self.recompute_status();
        Ok(())
    }

    /// Close a matched request. Returns the ratings that must be forwarded to the
    /// aggregator, one per assignment that received a rating in this call.
    pub fn complete(
        &mut self,
        actor: &Actor,
        request: CompletionRequest,
        now: DateTime<Utc>,
    ) -> Result<Vec<RatingGrant>, LifecycleError> {
        self.authorize_owner(actor)?;
        self.ensure_status("complete", now, &[RequestStatus::Matched])?;

        let score = request.rating.map(RatingScore::new).transpose()?;
        if let Some(volunteer) = &request.volunteer_id {
            if self.assignment_of(volunteer).is_none() {
                return Err(LifecycleError::NotFound(format!(
                    "assignment for {volunteer}"
                )));
            }
        }

        let mut grants = Vec::new();
        for assignment in &mut self.assigned_volunteers {
            if assignment.completed_at.is_none() {
                assignment.completed_at = Some(now);
            }

            let Some(score) = score else { continue };
            let targeted = request
                .volunteer_id
                .as_ref()
                .map_or(true, |volunteer| volunteer == &assignment.volunteer);
            if targeted && assignment.rating.is_none() {
                assignment.rating = Some(score.value());
                assignment.feedback.clone_from(&request.feedback);
                grants.push(RatingGrant {
                    request: self.id.clone(),
                    volunteer: assignment.volunteer.clone(),
                    score,
                });
            }
        }

        self.status = RequestStatus::Completed;
        self.completion_details = Some(CompletionDetails {
            completed_at: now,
            actual_duration: request.actual_duration,
            notes: request.notes,
            rating: score.map(RatingScore::value),
            feedback: request.feedback,
        });
        self.recompute_status();
        Ok(grants)
    }

    /// Ratings granted at completion that the directory has not acknowledged yet.
    pub fn unrecorded_ratings(&self) -> Vec<RatingGrant> {
        if self.status != RequestStatus::Completed {
            return Vec::new();
        }
        self.assigned_volunteers
            .iter()
            .filter(|assignment| !assignment.rating_recorded)
            .filter_map(|assignment| {
                let score = RatingScore::new(assignment.rating?).ok()?;
                Some(RatingGrant {
                    request: self.id.clone(),
                    volunteer: assignment.volunteer.clone(),
                    score,
                })
            })
            .collect()
    }

    /// Mark `volunteer`'s rating as acknowledged. Returns `false` when there was no
    /// outstanding rating for them.
    pub fn mark_rating_recorded(&mut self, volunteer: &UserId) -> bool {
        let outstanding = self.assigned_volunteers.iter_mut().find(|assignment| {
            &assignment.volunteer == volunteer
                && assignment.rating.is_some()
                && !assignment.rating_recorded
        });
        match outstanding {
            Some(assignment) => {
                assignment.rating_recorded = true;
                true
            }
            None => false,
        }
    }

    /// Edit descriptive fields while the request is still pending.
    pub fn update_details(
        &mut self,
        actor: &Actor,
        changes: RequestChanges,
        now: DateTime<Utc>,
    ) -> Result<(), LifecycleError> {
        self.authorize_owner(actor)?;
        self.ensure_status("update", now, &[RequestStatus::Pending])?;

        let title = changes
            .title
            .map(|value| required_text("title", value))
            .transpose()?;
        let description = changes
            .description
            .map(|value| required_text("description", value))
            .transpose()?;
        if let Some(needed) = changes.volunteers_needed {
            validate_volunteers_needed(needed)?;
            if usize::from(needed) < self.assigned_volunteers.len() {
                return Err(LifecycleError::Capacity { needed });
            }
        }

        if let Some(title) = title {
            self.title = title;
        }
        if let Some(description) = description {
            self.description = description;
        }
        if let Some(category) = changes.category {
            self.category = category;
        }
        if let Some(urgency) = changes.urgency {
            self.urgency = urgency;
        }
        if let Some(location) = changes.location {
            self.location = location;
        }
        if let Some(needed) = changes.volunteers_needed {
            self.volunteers_needed = needed;
        }
        if let Some(date) = changes.expected_date {
            self.expected_date = date;
        }
        if changes.expected_time.is_some() {
            self.expected_time = changes.expected_time;
        }
        if let Some(method) = changes.contact_method {
            self.contact_method = method;
        }

        self.recompute_status();
        Ok(())
    }

    /// Hard deletion is only allowed once nobody is attached to the request.
    pub fn ensure_removable(&self, actor: &Actor) -> Result<(), LifecycleError> {
        self.authorize_owner(actor)?;
        if !self.interested_volunteers.is_empty() || !self.assigned_volunteers.is_empty() {
            return Err(LifecycleError::Conflict(format!(
                "request {} still has volunteers attached",
                self.id
            )));
        }
        Ok(())
    }

    pub fn record_view(&mut self) {
        self.stats.view_count = self.stats.view_count.saturating_add(1);
    }

    pub fn adjust_shortlist(&mut self, added: bool) {
        self.stats.shortlist_count = if added {
            self.stats.shortlist_count.saturating_add(1)
        } else {
            self.stats.shortlist_count.saturating_sub(1)
        };
    }
}

fn validate_volunteers_needed(needed: u8) -> Result<(), LifecycleError> {
    if (MIN_VOLUNTEERS_NEEDED..=MAX_VOLUNTEERS_NEEDED).contains(&needed) {
        Ok(())
    } else {
        Err(LifecycleError::InvalidInput(format!(
            "volunteersNeeded must be between {MIN_VOLUNTEERS_NEEDED} and {MAX_VOLUNTEERS_NEEDED}, got {needed}"
        )))
    }
}

fn required_text(field: &str, value: String) -> Result<String, LifecycleError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(LifecycleError::InvalidInput(format!("{field} must not be empty")))
    } else {
        Ok(trimmed.to_string())
    }
}
