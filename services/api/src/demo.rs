use crate::infra::{seed_demo_users, DEMO_ADMINISTRATOR, DEMO_REQUESTER, DEMO_VOLUNTEERS};
use chrono::{Duration, Utc};
use clap::Args;
use std::sync::Arc;
use volunteer_match::config::MatchingConfig;
use volunteer_match::error::AppError;
use volunteer_match::workflows::requests::{
    Actor, Category, CompletionRequest, ContactMethod, HelpRequest, HelpRequestService,
    InMemoryRequestRepository, InMemoryUserDirectory, Location, ManualClock, MatchServiceError,
    RequestDraft, Role, Urgency, UserDirectory, UserId,
};

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Number of volunteers the demo request asks for (1-3).
    #[arg(long, default_value_t = 2, value_parser = clap::value_parser!(u8).range(1..=3))]
    pub(crate) volunteers_needed: u8,
    /// Rating given to the volunteers when the request is completed (1-5).
    #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u8).range(1..=5))]
    pub(crate) rating: u8,
    /// Skip the expiry portion of the demo.
    #[arg(long)]
    pub(crate) skip_expiry: bool,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        volunteers_needed,
        rating,
        skip_expiry,
    } = args;

    let repository = Arc::new(InMemoryRequestRepository::default());
    let directory = Arc::new(InMemoryUserDirectory::default());
    seed_demo_users(&directory).map_err(MatchServiceError::from)?;
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let service = HelpRequestService::with_clock(
        repository,
        directory.clone(),
        MatchingConfig::default(),
        clock.clone(),
    );

    let requester = Actor::new(DEMO_REQUESTER, Role::Requester);
    let volunteers: Vec<Actor> = DEMO_VOLUNTEERS
        .iter()
        .map(|id| Actor::new(*id, Role::Volunteer))
        .collect();

    println!("Volunteer matching demo");
    let request = service.create(&requester, demo_draft(volunteers_needed, service.now()))?;
    print_request("Opened", &request);

    for volunteer in &volunteers {
        let updated = service.apply(&request.id, volunteer, "Happy to help out")?;
        println!(
            "- {} applied ({} application(s) on file)",
            volunteer.id, updated.stats.application_count
        );
        clock.advance(Duration::minutes(3));
    }

    let (matched, picked) = service.auto_assign(&request.id, &requester)?;
    let names: Vec<String> = picked.iter().map(UserId::to_string).collect();
    println!("- Auto-assigned in application order: {}", names.join(", "));
    print_request("After assignment", &matched);

    let late = volunteers
        .iter()
        .find(|volunteer| matched.assignment_of(&volunteer.id).is_none());
    if let Some(late) = late {
        service.withdraw(&request.id, late)?;
        println!("- {} withdrew after the request filled up", late.id);
    }

    clock.advance(Duration::days(2));
    let completed = service.complete(
        &request.id,
        &requester,
        CompletionRequest {
            rating: Some(rating),
            feedback: Some("Arrived early and stayed to help".to_string()),
            actual_duration: Some(75),
            ..CompletionRequest::default()
        },
    )?;
    print_request("Completed", &completed);

    println!("Volunteer profiles");
    for volunteer in &picked {
        let stats = directory
            .rating_of(volunteer)
            .map_err(MatchServiceError::from)?
            .unwrap_or_default();
        println!(
            "  - {}: rating {:.1} across {} completion(s)",
            volunteer, stats.rating, stats.total_ratings
        );
    }

    if skip_expiry {
        return Ok(());
    }

    println!("\nExpiry demo");
    let stale = service.create(&requester, demo_draft(1, service.now()))?;
    clock.advance(MatchingConfig::default().request_ttl() + Duration::hours(1));
    let observed = service.get(&stale.id)?;
    println!(
        "- {} reads as {} once expiresAt has passed",
        stale.id, observed.status
    );
    let admin = Actor::new(DEMO_ADMINISTRATOR, Role::Administrator);
    if let Err(err) = service.cancel(&stale.id, &admin, "cleanup") {
        println!("- Cancel rejected: {err}");
    }
    let reaped = service.reap_expired()?;
    println!("- Reaper persisted {} expired request(s)", reaped.len());

    Ok(())
}

fn demo_draft(volunteers_needed: u8, now: chrono::DateTime<Utc>) -> RequestDraft {
    RequestDraft {
        title: "Ride to a physiotherapy appointment".to_string(),
        description: "Drop-off at 10:00 and pick-up about an hour later.".to_string(),
        category: Category::Transportation,
        urgency: Urgency::Medium,
        location: Location {
            address: "18 Walnut Street".to_string(),
            city: "Des Moines".to_string(),
            postal_code: Some("50309".to_string()),
        },
        volunteers_needed,
        expected_date: (now + Duration::days(3)).date_naive(),
        expected_time: None,
        contact_method: ContactMethod::Phone,
    }
}

fn print_request(label: &str, request: &HelpRequest) {
    println!(
        "{label}: {} [{}] {}/{} assigned, {} application(s), version {}",
        request.id,
        request.status,
        request.assigned_volunteers.len(),
        request.volunteers_needed,
        request.stats.application_count,
        request.version
    );
}
