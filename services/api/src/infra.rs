use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use volunteer_match::workflows::requests::{
    DirectoryError, InMemoryUserDirectory, Role, UserId,
};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) const DEMO_REQUESTER: &str = "req-rosa";
pub(crate) const DEMO_ADMINISTRATOR: &str = "admin-ada";
pub(crate) const DEMO_VOLUNTEERS: [&str; 3] = ["vol-ana", "vol-ben", "vol-cai"];

/// Register the fixed cast used by the demo and by `serve --seed-demo-users`.
pub(crate) fn seed_demo_users(directory: &InMemoryUserDirectory) -> Result<(), DirectoryError> {
    directory.register(UserId::new(DEMO_REQUESTER), Role::Requester)?;
    directory.register(UserId::new(DEMO_ADMINISTRATOR), Role::Administrator)?;
    for volunteer in DEMO_VOLUNTEERS {
        directory.register(UserId::new(volunteer), Role::Volunteer)?;
    }
    Ok(())
}
