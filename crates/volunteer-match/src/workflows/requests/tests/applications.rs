use super::common::*;
use chrono::Duration;

use crate::workflows::requests::applications::ApplicationReview;
use crate::workflows::requests::domain::{
    ApplicationStatus, LifecycleError, RequestStatus, Role,
};

#[test]
fn apply_records_interest_and_counts_it() {
    let mut request = open_request(2);

    request
        .apply(&volunteer(0), "  I drive past the clinic daily ", t0())
        .expect("apply");

    let entry = request.interest_of(&volunteer_id(0)).expect("entry");
    assert_eq!(entry.message, "I drive past the clinic daily");
    assert_eq!(entry.applied_at, t0());
    assert_eq!(entry.application_status, ApplicationStatus::Pending);
    assert_eq!(request.stats.application_count, 1);
    assert_eq!(request.status, RequestStatus::Pending);
    assert_invariants(&request);
}

#[test]
fn apply_twice_is_a_conflict() {
    let mut request = open_request(2);
    request.apply(&volunteer(0), "first", t0()).expect("apply");

    let again = request.apply(&volunteer(0), "second", t0());
    assert!(matches!(again, Err(LifecycleError::Conflict(_))));
    assert_eq!(request.interested_volunteers.len(), 1);
    assert_eq!(request.interested_volunteers[0].message, "first");
}

#[test]
fn only_volunteers_may_apply() {
    let mut request = open_request(1);
    for actor in [requester(), other_requester(), admin()] {
        let result = request.apply(&actor, "", t0());
        assert_eq!(result, Err(LifecycleError::InvalidVolunteer(actor.id.clone())));
    }
    assert!(request.interested_volunteers.is_empty());
}

#[test]
fn apply_requires_pending_status() {
    let mut request = matched_request(1);
    let result = request.apply(&volunteer(2), "", t0());
    assert_eq!(
        result,
        Err(LifecycleError::InvalidState {
            operation: "apply to",
            status: RequestStatus::Matched,
        })
    );

    let mut expired = open_request(1);
    let late = expired.expires_at + Duration::seconds(1);
    let result = expired.apply(&volunteer(0), "", late);
    assert!(matches!(
        result,
        Err(LifecycleError::InvalidState {
            status: RequestStatus::Expired,
            ..
        })
    ));
}

#[test]
fn assigned_or_declined_volunteers_cannot_apply() {
    let mut request = open_request(3);
    request
        .assign(&requester(), &volunteer_id(0), Some(Role::Volunteer), t0())
        .expect("assign");
    request.reject(&volunteer(1), "too far", t0()).expect("reject");

    assert!(matches!(
        request.apply(&volunteer(0), "", t0()),
        Err(LifecycleError::Conflict(_))
    ));
    assert!(matches!(
        request.apply(&volunteer(1), "", t0()),
        Err(LifecycleError::Conflict(_))
    ));
    assert_invariants(&request);
}

#[test]
fn withdraw_removes_entry_and_is_idempotent() {
    let mut request = open_request(2);
    request.apply(&volunteer(0), "", t0()).expect("apply");
    request.apply(&volunteer(1), "", t0()).expect("apply");

    assert_eq!(request.withdraw(&volunteer_id(0)), Ok(true));
    assert_eq!(request.stats.application_count, 1);
    assert!(request.interest_of(&volunteer_id(0)).is_none());

    assert_eq!(request.withdraw(&volunteer_id(0)), Ok(false));
    assert_eq!(request.stats.application_count, 1);
    assert_invariants(&request);
}

#[test]
fn interest_can_be_withdrawn_after_the_request_closes() {
    let mut request = open_request(1);
    request.apply(&volunteer(0), "", t0()).expect("apply");
    request.apply(&volunteer(1), "", t0()).expect("apply");
    request
        .assign(&requester(), &volunteer_id(0), Some(Role::Volunteer), t0())
        .expect("assign");
    request
        .complete(&requester(), Default::default(), t0())
        .expect("complete");
    assert!(request.interest_of(&volunteer_id(1)).is_some());

    assert_eq!(request.withdraw(&volunteer_id(1)), Ok(true));
    assert_eq!(request.status, RequestStatus::Completed);
    assert_eq!(request.stats.application_count, 0);
    assert_eq!(request.withdraw(&volunteer_id(1)), Ok(false));
    assert_invariants(&request);
}

#[test]
fn withdraw_from_an_expired_request_keeps_it_expired() {
    let mut request = open_request(2);
    request.apply(&volunteer(0), "", t0()).expect("apply");
    let after = request.expires_at + Duration::minutes(1);

    assert_eq!(request.withdraw(&volunteer_id(0)), Ok(true));
    assert_eq!(request.effective_status(after), RequestStatus::Expired);
    assert_eq!(request.status, RequestStatus::Pending);
}

#[test]
fn withdraw_never_touches_assignments() {
    let mut request = matched_request(1);
    assert_eq!(request.withdraw(&volunteer_id(0)), Ok(false));
    assert_eq!(request.assigned_volunteers.len(), 1);
    assert_eq!(request.status, RequestStatus::Matched);
}

#[test]
fn reject_moves_applicant_to_declined_list() {
    let mut request = open_request(2);
    request.apply(&volunteer(0), "maybe", t0()).expect("apply");

    request
        .reject(&volunteer(0), " schedule clash ", t0())
        .expect("reject");

    assert!(request.interest_of(&volunteer_id(0)).is_none());
    assert_eq!(request.stats.application_count, 0);
    assert_eq!(request.rejected_volunteers.len(), 1);
    assert_eq!(request.rejected_volunteers[0].reason, "schedule clash");
    assert_eq!(request.rejected_volunteers[0].rejected_at, t0());
    assert_invariants(&request);
}

#[test]
fn reject_without_prior_application_is_allowed_once() {
    let mut request = open_request(1);
    request.reject(&volunteer(2), "not my area", t0()).expect("reject");

    let again = request.reject(&volunteer(2), "still not", t0());
    assert!(matches!(again, Err(LifecycleError::Conflict(_))));
    assert_eq!(request.rejected_volunteers.len(), 1);
}

#[test]
fn assigned_volunteer_cannot_reject() {
    let mut request = matched_request(1);
    let result = request.reject(&volunteer(0), "changed my mind", t0());
    assert!(matches!(result, Err(LifecycleError::Conflict(_))));
    assert!(request.rejected_volunteers.is_empty());
}

#[test]
fn reject_requires_volunteer_role() {
    let mut request = open_request(1);
    let result = request.reject(&requester(), "", t0());
    assert_eq!(result, Err(LifecycleError::InvalidVolunteer(requester().id)));
}

#[test]
fn review_marks_application_without_removing_it() {
    let mut request = open_request(2);
    request.apply(&volunteer(0), "", t0()).expect("apply");
    request.apply(&volunteer(1), "", t0()).expect("apply");

    request
        .review_application(&requester(), &volunteer_id(0), ApplicationReview::Accept, t0())
        .expect("accept");
    request
        .review_application(&admin(), &volunteer_id(1), ApplicationReview::Decline, t0())
        .expect("decline");

    let statuses: Vec<_> = request
        .interested_volunteers
        .iter()
        .map(|entry| entry.application_status)
        .collect();
    assert_eq!(
        statuses,
        vec![ApplicationStatus::Accepted, ApplicationStatus::Rejected]
    );
    assert_eq!(request.stats.application_count, 2);
    assert_invariants(&request);
}

#[test]
fn review_checks_owner_and_entry() {
    let mut request = open_request(1);
    request.apply(&volunteer(0), "", t0()).expect("apply");

    let stranger = request.review_application(
        &other_requester(),
        &volunteer_id(0),
        ApplicationReview::Accept,
        t0(),
    );
    assert_eq!(stranger, Err(LifecycleError::Forbidden(other_requester().id)));

    let missing = request.review_application(
        &requester(),
        &volunteer_id(3),
        ApplicationReview::Accept,
        t0(),
    );
    assert!(matches!(missing, Err(LifecycleError::NotFound(_))));
}
