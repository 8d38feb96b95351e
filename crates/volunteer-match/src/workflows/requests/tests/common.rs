use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use axum::response::Response;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde_json::Value;

use crate::config::MatchingConfig;
use crate::workflows::requests::clock::ManualClock;
use crate::workflows::requests::domain::{
    Actor, Category, ContactMethod, HelpRequest, Location, RequestDraft, RequestId, Role,
    Urgency, UserId,
};
use crate::workflows::requests::repository::{RepositoryError, RequestRepository};
use crate::workflows::requests::service::HelpRequestService;
use crate::workflows::requests::store::{InMemoryRequestRepository, InMemoryUserDirectory};

pub(super) type TestService =
    HelpRequestService<InMemoryRequestRepository, InMemoryUserDirectory>;

pub(super) const VOLUNTEERS: [&str; 4] = ["vol-ana", "vol-ben", "vol-cai", "vol-dee"];

pub(super) fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn requester() -> Actor {
    Actor::new("req-rosa", Role::Requester)
}

pub(super) fn other_requester() -> Actor {
    Actor::new("req-omar", Role::Requester)
}

pub(super) fn admin() -> Actor {
    Actor::new("admin-ada", Role::Administrator)
}

pub(super) fn volunteer(index: usize) -> Actor {
    Actor::new(VOLUNTEERS[index], Role::Volunteer)
}

pub(super) fn volunteer_id(index: usize) -> UserId {
    volunteer(index).id
}

pub(super) fn draft(volunteers_needed: u8) -> RequestDraft {
    RequestDraft {
        title: "Ride to the clinic".to_string(),
        description: "Need a lift to a follow-up appointment and back.".to_string(),
        category: Category::Transportation,
        urgency: Urgency::High,
        location: Location {
            address: "12 Elm Street".to_string(),
            city: "Des Moines".to_string(),
            postal_code: Some("50309".to_string()),
        },
        volunteers_needed,
        expected_date: NaiveDate::from_ymd_opt(2025, 3, 4).expect("valid date"),
        expected_time: None,
        contact_method: ContactMethod::Phone,
    }
}

/// A freshly opened request owned by [`requester`], created at [`t0`].
pub(super) fn open_request(volunteers_needed: u8) -> HelpRequest {
    HelpRequest::open(
        RequestId("req-test".to_string()),
        &requester(),
        draft(volunteers_needed),
        t0(),
        Duration::days(30),
    )
    .expect("request opens")
}

/// Open a request and assign volunteers `0..count` so it reaches matched.
pub(super) fn matched_request(count: usize) -> HelpRequest {
    let needed = u8::try_from(count).expect("small count");
    let mut request = open_request(needed);
    for index in 0..count {
        request
            .assign(&requester(), &volunteer_id(index), Some(Role::Volunteer), t0())
            .expect("assignment succeeds");
    }
    request
}

pub(super) fn directory() -> Arc<InMemoryUserDirectory> {
    let directory = InMemoryUserDirectory::default();
    for user in [requester(), other_requester(), admin()] {
        directory.register(user.id, user.role).expect("register");
    }
    for index in 0..VOLUNTEERS.len() {
        directory
            .register(volunteer_id(index), Role::Volunteer)
            .expect("register");
    }
    Arc::new(directory)
}

pub(super) struct Harness {
    pub(super) service: Arc<TestService>,
    pub(super) repository: Arc<InMemoryRequestRepository>,
    pub(super) directory: Arc<InMemoryUserDirectory>,
    pub(super) clock: Arc<ManualClock>,
}

pub(super) fn harness() -> Harness {
    let repository = Arc::new(InMemoryRequestRepository::default());
    let directory = directory();
    let clock = Arc::new(ManualClock::new(t0()));
    let service = Arc::new(HelpRequestService::with_clock(
        repository.clone(),
        directory.clone(),
        MatchingConfig::default(),
        clock.clone(),
    ));
    Harness {
        service,
        repository,
        directory,
        clock,
    }
}

/// Repository whose first `failures` updates lose the optimistic race.
pub(super) struct RacingRepository {
    pub(super) inner: InMemoryRequestRepository,
    failures: AtomicU32,
}

impl RacingRepository {
    pub(super) fn new(failures: u32) -> Self {
        Self {
            inner: InMemoryRequestRepository::default(),
            failures: AtomicU32::new(failures),
        }
    }
}

impl RequestRepository for RacingRepository {
    fn insert(&self, record: HelpRequest) -> Result<HelpRequest, RepositoryError> {
        self.inner.insert(record)
    }

    fn update(&self, record: HelpRequest) -> Result<(), RepositoryError> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(RepositoryError::VersionConflict);
        }
        self.inner.update(record)
    }

    fn fetch(&self, id: &RequestId) -> Result<Option<HelpRequest>, RepositoryError> {
        self.inner.fetch(id)
    }

    fn remove(&self, id: &RequestId, version: u64) -> Result<(), RepositoryError> {
        self.inner.remove(id, version)
    }

    fn list(&self) -> Result<Vec<HelpRequest>, RepositoryError> {
        self.inner.list()
    }
}

pub(super) struct UnavailableRepository;

impl RequestRepository for UnavailableRepository {
    fn insert(&self, _record: HelpRequest) -> Result<HelpRequest, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn update(&self, _record: HelpRequest) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch(&self, _id: &RequestId) -> Result<Option<HelpRequest>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn remove(&self, _id: &RequestId, _version: u64) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn list(&self) -> Result<Vec<HelpRequest>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

/// Every invariant that must hold at an operation boundary.
pub(super) fn assert_invariants(request: &HelpRequest) {
    assert!(
        request.assigned_volunteers.len() <= usize::from(request.volunteers_needed),
        "assigned volunteers exceed capacity"
    );
    assert_eq!(
        request.stats.application_count as usize,
        request.interested_volunteers.len(),
        "applicationCount out of sync"
    );
    for entry in &request.interested_volunteers {
        assert!(request.assignment_of(&entry.volunteer).is_none());
        assert!(!request.has_declined(&entry.volunteer));
    }
    for entry in &request.assigned_volunteers {
        assert!(!request.has_declined(&entry.volunteer));
    }
    if request.status == crate::workflows::requests::domain::RequestStatus::Matched {
        assert!(!request.assigned_volunteers.is_empty());
    }
}
