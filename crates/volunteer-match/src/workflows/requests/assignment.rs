use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::domain::{
    Actor, ApplicationStatus, Assignment, HelpRequest, LifecycleError, RequestStatus, Role,
    UserId,
};

impl HelpRequest {
    /// Confirm a volunteer for one of the open slots.
    ///
    /// `candidate_role` is the role the identity collaborator reports for the
    /// volunteer, `None` when the identity is unknown. Returns the status after the
    /// assignment so callers can observe the pending to matched flip.
    pub fn assign(
        &mut self,
        actor: &Actor,
        volunteer: &UserId,
        candidate_role: Option<Role>,
        now: DateTime<Utc>,
    ) -> Result<RequestStatus, LifecycleError> {
        self.authorize_owner(actor)?;
        self.ensure_assignable(now)?;
        if self.open_slots() == 0 {
            return Err(LifecycleError::Capacity {
                needed: self.volunteers_needed,
            });
        }
        match candidate_role {
            None => return Err(LifecycleError::NotFound(format!("volunteer {volunteer}"))),
            Some(role) if !role.can_volunteer() => {
                return Err(LifecycleError::InvalidVolunteer(volunteer.clone()))
            }
            Some(_) => {}
        }
        self.ensure_unattached(volunteer)?;

        self.push_assignment(volunteer, now);
        self.recompute_status();
        Ok(self.status)
    }

    /// Fill every open slot from the interest list in `appliedAt` order.
    ///
    /// Declined applications and identities that are no longer volunteers are
    /// skipped. Returns the volunteers assigned by this call.
    pub fn auto_assign(
        &mut self,
        actor: &Actor,
        roles: &HashMap<UserId, Role>,
        now: DateTime<Utc>,
    ) -> Result<Vec<UserId>, LifecycleError> {
        self.authorize_owner(actor)?;
        self.ensure_assignable(now)?;
        let open_slots = self.open_slots();
        if open_slots == 0 {
            return Err(LifecycleError::Capacity {
                needed: self.volunteers_needed,
            });
        }

        let mut candidates: Vec<_> = self
            .interested_volunteers
            .iter()
            .filter(|entry| entry.application_status != ApplicationStatus::Rejected)
            .filter(|entry| roles.get(&entry.volunteer).is_some_and(|role| role.can_volunteer()))
            .map(|entry| (entry.applied_at, entry.volunteer.clone()))
            .collect();
        candidates.sort_by_key(|(applied_at, _)| *applied_at);

        let picked: Vec<UserId> = candidates
            .into_iter()
            .map(|(_, volunteer)| volunteer)
            .take(open_slots)
            .collect();
        for volunteer in &picked {
            self.push_assignment(volunteer, now);
        }
        self.recompute_status();
        Ok(picked)
    }

    fn ensure_assignable(&self, now: DateTime<Utc>) -> Result<(), LifecycleError> {
        self.ensure_status(
            "assign volunteers to",
            now,
            &[RequestStatus::Pending, RequestStatus::Matched],
        )
    }

    fn ensure_unattached(&self, volunteer: &UserId) -> Result<(), LifecycleError> {
        if self.assignment_of(volunteer).is_some() {
            return Err(LifecycleError::Conflict(format!(
                "{volunteer} is already assigned to request {}",
                self.id
            )));
        }
        if self.has_declined(volunteer) {
            return Err(LifecycleError::Conflict(format!(
                "{volunteer} has declined request {}",
                self.id
            )));
        }
        Ok(())
    }

    // Assignment supersedes the application, so the interest entry goes away.
    fn push_assignment(&mut self, volunteer: &UserId, now: DateTime<Utc>) {
        self.remove_interest(volunteer);
        self.assigned_volunteers.push(Assignment {
            volunteer: volunteer.clone(),
            assigned_at: now,
            completed_at: None,
            rating: None,
            feedback: None,
            rating_recorded: false,
        });
    }
}
