use crate::cli::ServeArgs;
use crate::infra::{seed_demo_users, AppState};
use crate::routes::{with_request_routes, AppService};
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use volunteer_match::config::AppConfig;
use volunteer_match::error::AppError;
use volunteer_match::telemetry;
use volunteer_match::workflows::requests::{
    HelpRequestService, InMemoryRequestRepository, InMemoryUserDirectory, MatchServiceError,
};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry, config.environment)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let repository = Arc::new(InMemoryRequestRepository::default());
    let directory = Arc::new(InMemoryUserDirectory::default());
    if args.seed_demo_users {
        seed_demo_users(&directory).map_err(MatchServiceError::from)?;
        info!("demo users registered");
    }
    let service = Arc::new(HelpRequestService::new(
        repository,
        directory.clone(),
        config.matching.clone(),
    ));

    if let Some(period) = config.matching.reaper_interval() {
        spawn_reaper(service.clone(), period);
    }

    let app = with_request_routes(service, directory)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        ttl_days = config.matching.request_ttl_days,
        "volunteer matching service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}

/// Periodically persist the expiry of stale requests and resend completion ratings
/// the directory has not acknowledged. Reads already treat stale requests as
/// expired, so a missed tick only delays the stored status.
fn spawn_reaper(service: Arc<AppService>, period: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match service.reap_expired() {
                Ok(reaped) if reaped.is_empty() => {}
                Ok(reaped) => info!(count = reaped.len(), "expired requests reaped"),
                Err(err) => error!(error = %err, "expiry sweep failed"),
            }
            match service.deliver_outstanding_ratings() {
                Ok(settled) if settled.is_empty() => {}
                Ok(settled) => info!(count = settled.len(), "outstanding ratings delivered"),
                Err(err) => error!(error = %err, "rating redelivery sweep failed"),
            }
        }
    });
}
