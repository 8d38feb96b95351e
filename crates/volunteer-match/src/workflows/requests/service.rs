use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use super::applications::ApplicationReview;
use super::clock::{Clock, SystemClock};
use super::domain::{
    Actor, CompletionRequest, HelpRequest, LifecycleError, RequestChanges, RequestDraft,
    RequestId, RequestStatus, RequestSummary, UserId,
};
use super::rating::{RatingAggregator, RatingGrant};
use super::repository::{
    DirectoryError, ProfileCounter, RepositoryError, RequestFilter, RequestRepository,
    UserDirectory,
};
use crate::config::MatchingConfig;

/// Service running every lifecycle operation as an optimistic transaction over a
/// single request record.
pub struct HelpRequestService<R, D> {
    repository: Arc<R>,
    directory: Arc<D>,
    ratings: RatingAggregator<D>,
    config: MatchingConfig,
    clock: Arc<dyn Clock>,
}

static REQUEST_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_request_id() -> RequestId {
    let id = REQUEST_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    RequestId(format!("req-{id:06}"))
}

impl<R, D> HelpRequestService<R, D>
where
    R: RequestRepository + 'static,
    D: UserDirectory + 'static,
{
    pub fn new(repository: Arc<R>, directory: Arc<D>, config: MatchingConfig) -> Self {
        Self::with_clock(repository, directory, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        repository: Arc<R>,
        directory: Arc<D>,
        config: MatchingConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let ratings = RatingAggregator::new(Arc::clone(&directory));
        Self {
            repository,
            directory,
            ratings,
            config,
            clock,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Open a new pending request for the calling requester.
    pub fn create(
        &self,
        actor: &Actor,
        draft: RequestDraft,
    ) -> Result<HelpRequest, MatchServiceError> {
        let now = self.clock.now();
        let record = HelpRequest::open(
            next_request_id(),
            actor,
            draft,
            now,
            self.config.request_ttl(),
        )?;
        let stored = self.repository.insert(record)?;

        info!(
            request = %stored.id,
            requester = %stored.requester,
            category = stored.category.label(),
            urgency = stored.urgency.label(),
            volunteers_needed = stored.volunteers_needed,
            "help request created"
        );
        self.bump_counter(&actor.id, ProfileCounter::RequestsCreated);
        Ok(stored)
    }

    /// Fetch a request with expiry applied. Never writes.
    pub fn get(&self, id: &RequestId) -> Result<HelpRequest, MatchServiceError> {
        let record = self
            .repository
            .fetch(id)?
            .ok_or_else(|| not_found(id))?;
        Ok(record.observed(self.clock.now()))
    }

    /// Fetch a request on behalf of a reader, counting the view.
    pub fn view(&self, id: &RequestId) -> Result<HelpRequest, MatchServiceError> {
        let (record, ()) = self.transact(id, "view", |record, _| {
            record.record_view();
            Ok(())
        })?;
        Ok(record.observed(self.clock.now()))
    }

    /// Newest-first listing of the requests matching `filter`.
    pub fn list(&self, filter: &RequestFilter) -> Result<Vec<RequestSummary>, MatchServiceError> {
        let now = self.clock.now();
        let mut records: Vec<HelpRequest> = self
            .repository
            .list()?
            .into_iter()
            .filter(|record| filter.matches(record, now))
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(records.iter().map(|record| record.summary(now)).collect())
    }

    pub fn update_details(
        &self,
        id: &RequestId,
        actor: &Actor,
        changes: RequestChanges,
    ) -> Result<HelpRequest, MatchServiceError> {
        let (record, ()) = self.transact(id, "update", |record, now| {
            record.update_details(actor, changes.clone(), now)?;
            Ok(())
        })?;
        debug!(request = %record.id, actor = %actor.id, "request details updated");
        Ok(record)
    }

    /// Remove a request nobody is attached to.
    pub fn delete(&self, id: &RequestId, actor: &Actor) -> Result<(), MatchServiceError> {
        for attempt in 1..=self.attempts() {
            let record = self
                .repository
                .fetch(id)?
                .ok_or_else(|| not_found(id))?;
            record.ensure_removable(actor)?;

            match self.repository.remove(id, record.version) {
                Ok(()) => {
                    info!(request = %id, actor = %actor.id, "help request deleted");
                    return Ok(());
                }
                Err(RepositoryError::VersionConflict) => {
                    warn!(request = %id, attempt, "delete lost a race, retrying");
                }
                Err(other) => return Err(other.into()),
            }
        }
        Err(self.exhausted(id, "delete"))
    }

    pub fn apply(
        &self,
        id: &RequestId,
        volunteer: &Actor,
        message: &str,
    ) -> Result<HelpRequest, MatchServiceError> {
        let (record, ()) = self.transact(id, "apply", |record, now| {
            record.apply(volunteer, message, now)?;
            Ok(())
        })?;
        debug!(
            request = %record.id,
            volunteer = %volunteer.id,
            applications = record.stats.application_count,
            "volunteer applied"
        );
        Ok(record)
    }

    /// Withdraw the caller's application. Withdrawing twice is not an error.
    pub fn withdraw(
        &self,
        id: &RequestId,
        volunteer: &Actor,
    ) -> Result<HelpRequest, MatchServiceError> {
        let (record, removed) = self.transact(id, "withdraw", |record, _| {
            Ok(record.withdraw(&volunteer.id)?)
        })?;
        debug!(request = %record.id, volunteer = %volunteer.id, removed, "volunteer withdrew");
        Ok(record)
    }

    /// Volunteer declines the request.
    pub fn reject(
        &self,
        id: &RequestId,
        volunteer: &Actor,
        reason: &str,
    ) -> Result<HelpRequest, MatchServiceError> {
        let (record, ()) = self.transact(id, "reject", |record, now| {
            record.reject(volunteer, reason, now)?;
            Ok(())
        })?;
        debug!(request = %record.id, volunteer = %volunteer.id, "volunteer declined request");
        Ok(record)
    }

    pub fn review_application(
        &self,
        id: &RequestId,
        actor: &Actor,
        volunteer: &UserId,
        review: ApplicationReview,
    ) -> Result<HelpRequest, MatchServiceError> {
        let (record, ()) = self.transact(id, "review", |record, now| {
            record.review_application(actor, volunteer, review, now)?;
            Ok(())
        })?;
        debug!(request = %record.id, volunteer = %volunteer, ?review, "application reviewed");
        Ok(record)
    }

    pub fn assign(
        &self,
        id: &RequestId,
        actor: &Actor,
        volunteer: &UserId,
    ) -> Result<HelpRequest, MatchServiceError> {
        let role = self.directory.role_of(volunteer)?;
        let (record, status) = self.transact(id, "assign", |record, now| {
            Ok(record.assign(actor, volunteer, role, now)?)
        })?;

        info!(
            request = %record.id,
            volunteer = %volunteer,
            assigned = record.assigned_volunteers.len(),
            needed = record.volunteers_needed,
            status = status.label(),
            "volunteer assigned"
        );
        self.bump_counter(volunteer, ProfileCounter::ServicesVolunteered);
        Ok(record)
    }

    /// Fill the open slots from the interest list in application order.
    pub fn auto_assign(
        &self,
        id: &RequestId,
        actor: &Actor,
    ) -> Result<(HelpRequest, Vec<UserId>), MatchServiceError> {
        let (record, picked) = self.transact(id, "auto-assign", |record, now| {
            let mut roles = HashMap::new();
            for entry in &record.interested_volunteers {
                if let Some(role) = self.directory.role_of(&entry.volunteer)? {
                    roles.insert(entry.volunteer.clone(), role);
                }
            }
            Ok(record.auto_assign(actor, &roles, now)?)
        })?;

        info!(
            request = %record.id,
            picked = picked.len(),
            status = record.status.label(),
            "volunteers auto-assigned"
        );
        for volunteer in &picked {
            self.bump_counter(volunteer, ProfileCounter::ServicesVolunteered);
        }
        Ok((record, picked))
    }

    /// Complete a matched request and forward any rating to the aggregator.
    ///
    /// Ratings are forwarded only after the completion commits and stay outstanding
    /// on the record until the directory acknowledges them. Calling `complete` again
    /// on a completed request with outstanding ratings resends them instead of
    /// failing, so a caller can retry after a directory outage.
    pub fn complete(
        &self,
        id: &RequestId,
        actor: &Actor,
        completion: CompletionRequest,
    ) -> Result<HelpRequest, MatchServiceError> {
        let committed = self.transact(id, "complete", |record, now| {
            Ok(record.complete(actor, completion.clone(), now)?)
        });
        let (record, grants) = match committed {
            Ok((record, grants)) => {
                info!(
                    request = %record.id,
                    actor = %actor.id,
                    ratings = grants.len(),
                    "help request completed"
                );
                (record, grants)
            }
            Err(
                err @ MatchServiceError::Lifecycle(LifecycleError::InvalidState {
                    status: RequestStatus::Completed,
                    ..
                }),
            ) => {
                let record = self.get(id)?;
                record.authorize_owner(actor)?;
                let outstanding = record.unrecorded_ratings();
                if outstanding.is_empty() {
                    return Err(err);
                }
                info!(
                    request = %record.id,
                    ratings = outstanding.len(),
                    "resending outstanding completion ratings"
                );
                (record, outstanding)
            }
            Err(other) => return Err(other),
        };
        self.deliver_ratings(record, grants)
    }

    /// Resend every completion rating the directory has not acknowledged yet.
    /// Returns the requests whose ratings are now fully recorded.
    pub fn deliver_outstanding_ratings(&self) -> Result<Vec<RequestId>, MatchServiceError> {
        let pending: Vec<HelpRequest> = self
            .repository
            .list()?
            .into_iter()
            .filter(|record| !record.unrecorded_ratings().is_empty())
            .collect();

        let mut settled = Vec::new();
        for record in pending {
            let id = record.id.clone();
            let grants = record.unrecorded_ratings();
            match self.deliver_ratings(record, grants) {
                Ok(record) if record.unrecorded_ratings().is_empty() => settled.push(id),
                Ok(_) => {}
                Err(MatchServiceError::Directory(err)) => {
                    warn!(request = %id, error = %err, "rating redelivery deferred");
                }
                Err(other) => return Err(other),
            }
        }
        Ok(settled)
    }

    // Grants the directory accepted (or had already folded) are marked on the record.
    // A grant that fails stays outstanding for the next `complete` or sweep.
    fn deliver_ratings(
        &self,
        record: HelpRequest,
        grants: Vec<RatingGrant>,
    ) -> Result<HelpRequest, MatchServiceError> {
        let mut delivered = Vec::new();
        let mut failure = None;
        for grant in grants {
            match self.ratings.record(&grant) {
                Ok(_) => delivered.push(grant.volunteer),
                Err(err) => {
                    error!(
                        request = %grant.request,
                        volunteer = %grant.volunteer,
                        error = %err,
                        "failed to record rating for completed request"
                    );
                    failure.get_or_insert(err);
                }
            }
        }

        let mut record = record;
        if !delivered.is_empty() {
            let id = record.id.clone();
            let settled = self.transact(&id, "settle-ratings", |record, _| {
                let mut marked = 0;
                for volunteer in &delivered {
                    if record.mark_rating_recorded(volunteer) {
                        marked += 1;
                    }
                }
                Ok(marked)
            });
            match settled {
                Ok((updated, marked)) => {
                    debug!(request = %id, marked, "completion ratings acknowledged");
                    record = updated;
                }
                // The receipt set absorbs the resend of an unmarked grant.
                Err(err) => warn!(request = %id, error = %err, "failed to mark ratings recorded"),
            }
        }

        match failure {
            Some(err) => Err(err.into()),
            None => Ok(record),
        }
    }

    pub fn cancel(
        &self,
        id: &RequestId,
        actor: &Actor,
        reason: &str,
    ) -> Result<HelpRequest, MatchServiceError> {
        let (record, ()) = self.transact(id, "cancel", |record, now| {
            record.cancel(actor, reason, now)?;
            Ok(())
        })?;
        info!(request = %record.id, actor = %actor.id, reason, "help request cancelled");
        Ok(record)
    }

    /// Bookmark collaborator hook. Only the shortlist counter is touched.
    pub fn adjust_shortlist(
        &self,
        id: &RequestId,
        added: bool,
    ) -> Result<RequestSummary, MatchServiceError> {
        let (record, ()) = self.transact(id, "shortlist", |record, _| {
            record.adjust_shortlist(added);
            Ok(())
        })?;
        Ok(record.summary(self.clock.now()))
    }

    /// Persist the expired status of every stale pending or matched request.
    pub fn reap_expired(&self) -> Result<Vec<RequestId>, MatchServiceError> {
        let now = self.clock.now();
        let stale: Vec<RequestId> = self
            .repository
            .list()?
            .into_iter()
            .filter(|record| {
                !record.status.is_terminal()
                    && record.effective_status(now) == RequestStatus::Expired
            })
            .map(|record| record.id)
            .collect();

        let mut reaped = Vec::new();
        for id in stale {
            let changed = match self.transact(&id, "expire", |record, now| Ok(record.expire(now)))
            {
                Ok((_, changed)) => changed,
                // deleted since the listing
                Err(MatchServiceError::Lifecycle(LifecycleError::NotFound(_))) => false,
                Err(other) => return Err(other),
            };
            if changed {
                info!(request = %id, "help request expired");
                reaped.push(id);
            }
        }
        Ok(reaped)
    }

    /// Read, mutate a private copy, and write back with a version check.
    ///
    /// A failed `apply` discards the copy, so nothing partial is ever stored. Lost
    /// races are retried up to `commit_retries` times before surfacing as a
    /// conflict.
    fn transact<T, F>(
        &self,
        id: &RequestId,
        operation: &'static str,
        mut apply: F,
    ) -> Result<(HelpRequest, T), MatchServiceError>
    where
        F: FnMut(&mut HelpRequest, DateTime<Utc>) -> Result<T, MatchServiceError>,
    {
        for attempt in 1..=self.attempts() {
            let current = self
                .repository
                .fetch(id)?
                .ok_or_else(|| not_found(id))?;
            let now = self.clock.now();

            let mut next = current.clone();
            let outcome = apply(&mut next, now)?;
            next.version = current.version + 1;
            next.updated_at = now;

            match self.repository.update(next.clone()) {
                Ok(()) => return Ok((next, outcome)),
                Err(RepositoryError::VersionConflict) => {
                    warn!(request = %id, operation, attempt, "version conflict, retrying");
                }
                Err(other) => return Err(other.into()),
            }
        }
        Err(self.exhausted(id, operation))
    }

    fn attempts(&self) -> u32 {
        self.config.commit_retries.max(1)
    }

    fn exhausted(&self, id: &RequestId, operation: &str) -> MatchServiceError {
        LifecycleError::Conflict(format!(
            "request {id} kept changing during {operation}, giving up after {} attempts",
            self.attempts()
        ))
        .into()
    }

    // Profile counters are owned elsewhere; a failed increment must not undo the
    // lifecycle change that already committed.
    fn bump_counter(&self, user: &UserId, counter: ProfileCounter) {
        if let Err(err) = self.directory.increment_counter(user, counter) {
            warn!(user = %user, ?counter, error = %err, "profile counter update failed");
        }
    }
}

fn not_found(id: &RequestId) -> MatchServiceError {
    LifecycleError::NotFound(format!("request {id}")).into()
}

/// Error raised by the request service.
#[derive(Debug, thiserror::Error)]
pub enum MatchServiceError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

impl MatchServiceError {
    pub fn lifecycle(&self) -> Option<&LifecycleError> {
        match self {
            Self::Lifecycle(err) => Some(err),
            _ => None,
        }
    }
}
