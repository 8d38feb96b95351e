//! Mutex-backed stores used by the HTTP service and the test suites.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use super::domain::{HelpRequest, RequestId, Role, UserId};
use super::rating::{RatingGrant, RatingOutcome, RatingStats};
use super::repository::{
    DirectoryError, ProfileCounter, RepositoryError, RequestRepository, UserDirectory,
};

#[derive(Default, Clone)]
pub struct InMemoryRequestRepository {
    records: Arc<Mutex<HashMap<RequestId, HelpRequest>>>,
}

impl InMemoryRequestRepository {
    fn lock(&self) -> Result<MutexGuard<'_, HashMap<RequestId, HelpRequest>>, RepositoryError> {
        self.records
            .lock()
            .map_err(|_| RepositoryError::Unavailable("request store lock poisoned".to_string()))
    }
}

impl RequestRepository for InMemoryRequestRepository {
    fn insert(&self, record: HelpRequest) -> Result<HelpRequest, RepositoryError> {
        let mut guard = self.lock()?;
        if guard.contains_key(&record.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn update(&self, record: HelpRequest) -> Result<(), RepositoryError> {
        let mut guard = self.lock()?;
        let stored = guard.get(&record.id).ok_or(RepositoryError::NotFound)?;
        if stored.version.checked_add(1) != Some(record.version) {
            return Err(RepositoryError::VersionConflict);
        }
        guard.insert(record.id.clone(), record);
        Ok(())
    }

    fn fetch(&self, id: &RequestId) -> Result<Option<HelpRequest>, RepositoryError> {
        let guard = self.lock()?;
        Ok(guard.get(id).cloned())
    }

    fn remove(&self, id: &RequestId, version: u64) -> Result<(), RepositoryError> {
        let mut guard = self.lock()?;
        let stored = guard.get(id).ok_or(RepositoryError::NotFound)?;
        if stored.version != version {
            return Err(RepositoryError::VersionConflict);
        }
        guard.remove(id);
        Ok(())
    }

    fn list(&self) -> Result<Vec<HelpRequest>, RepositoryError> {
        let guard = self.lock()?;
        Ok(guard.values().cloned().collect())
    }
}

/// Profile slice the matching engine reads and writes.
#[derive(Debug, Clone, PartialEq)]
pub struct UserProfile {
    pub role: Role,
    pub rating: RatingStats,
    pub requests_created: u64,
    pub services_volunteered: u64,
}

impl UserProfile {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            rating: RatingStats::default(),
            requests_created: 0,
            services_volunteered: 0,
        }
    }
}

#[derive(Default)]
struct DirectoryState {
    profiles: HashMap<UserId, UserProfile>,
    applied: HashSet<(RequestId, UserId)>,
}

#[derive(Default, Clone)]
pub struct InMemoryUserDirectory {
    state: Arc<Mutex<DirectoryState>>,
}

impl InMemoryUserDirectory {
    fn lock(&self) -> Result<MutexGuard<'_, DirectoryState>, DirectoryError> {
        self.state
            .lock()
            .map_err(|_| DirectoryError::Unavailable("user directory lock poisoned".to_string()))
    }

    pub fn register(&self, user: UserId, role: Role) -> Result<(), DirectoryError> {
        self.insert_profile(user, UserProfile::new(role))
    }

    pub fn insert_profile(&self, user: UserId, profile: UserProfile) -> Result<(), DirectoryError> {
        self.lock()?.profiles.insert(user, profile);
        Ok(())
    }

    pub fn profile(&self, user: &UserId) -> Result<Option<UserProfile>, DirectoryError> {
        Ok(self.lock()?.profiles.get(user).cloned())
    }
}

impl UserDirectory for InMemoryUserDirectory {
    fn role_of(&self, user: &UserId) -> Result<Option<Role>, DirectoryError> {
        Ok(self.lock()?.profiles.get(user).map(|profile| profile.role))
    }

    fn record_rating(&self, grant: &RatingGrant) -> Result<RatingOutcome, DirectoryError> {
        let mut guard = self.lock()?;
        let state = &mut *guard;
        let profile = state
            .profiles
            .get_mut(&grant.volunteer)
            .ok_or_else(|| DirectoryError::UnknownUser(grant.volunteer.clone()))?;

        if !state
            .applied
            .insert((grant.request.clone(), grant.volunteer.clone()))
        {
            return Ok(RatingOutcome::AlreadyRecorded(profile.rating));
        }
        profile.rating = profile.rating.fold(grant.score);
        Ok(RatingOutcome::Applied(profile.rating))
    }

    fn rating_of(&self, user: &UserId) -> Result<Option<RatingStats>, DirectoryError> {
        Ok(self.lock()?.profiles.get(user).map(|profile| profile.rating))
    }

    fn increment_counter(
        &self,
        user: &UserId,
        counter: ProfileCounter,
    ) -> Result<(), DirectoryError> {
        let mut guard = self.lock()?;
        let profile = guard
            .profiles
            .get_mut(user)
            .ok_or_else(|| DirectoryError::UnknownUser(user.clone()))?;
        match counter {
            ProfileCounter::RequestsCreated => profile.requests_created += 1,
            ProfileCounter::ServicesVolunteered => profile.services_volunteered += 1,
        }
        Ok(())
    }
}
