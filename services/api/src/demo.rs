use crate::infra::{
    parse_booking, parse_date, seeded_registry, InMemoryInmateDirectory,
    InMemoryMessageRepository, InMemoryPrisonRegistry, InMemoryScheduleRepository,
    InMemoryTransferRepository, LoggingEventPublisher,
};
use chrono::{Days, Local, NaiveDate};
use clap::Args;
use prison_ops::clock::{Clock, FixedClock};
use prison_ops::config::{
    TransferConfig, VisitationConfig, DEFAULT_BOOKING_HORIZON_DAYS, DEFAULT_DAILY_VISIT_CAPACITY,
};
use prison_ops::error::AppError;
use prison_ops::workflows::messaging::{Attachment, MessageDraft, MessagingService, UserId};
use prison_ops::workflows::transfer::{
    write_transfer_register, InmateId, PrisonId, PrisonRegistry, TransferDraft, TransferOutcome,
    TransferWorkflowService,
};
use prison_ops::workflows::visitation::{
    CapacityCalendar, DayAvailability, IdType, Relationship, SchedulePayload,
    VisitSchedulingService, VisitTime, VisitorId,
};
use prison_ops::workflows::{Actor, ActorRole, WorkflowError};
use serde_json::json;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

type DemoTransfers = TransferWorkflowService<
    InMemoryTransferRepository,
    InMemoryInmateDirectory,
    InMemoryPrisonRegistry,
    LoggingEventPublisher,
>;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Calendar day the demo runs on (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = parse_date)]
    pub(crate) today: Option<NaiveDate>,
    /// Daily visit limit used for the booking walkthrough.
    #[arg(long, default_value_t = 3)]
    pub(crate) daily_capacity: u32,
    /// Write the transfer register CSV here instead of printing it.
    #[arg(long)]
    pub(crate) register_out: Option<PathBuf>,
    /// Skip the messaging portion of the demo.
    #[arg(long)]
    pub(crate) skip_messaging: bool,
}

#[derive(Args, Debug)]
pub(crate) struct CapacityReportArgs {
    /// First day of the booking window (defaults to today)
    #[arg(long, value_parser = parse_date)]
    pub(crate) today: Option<NaiveDate>,
    /// Visits allowed per day
    #[arg(long, default_value_t = DEFAULT_DAILY_VISIT_CAPACITY)]
    pub(crate) capacity: u32,
    /// Days in the booking window
    #[arg(long, default_value_t = DEFAULT_BOOKING_HORIZON_DAYS)]
    pub(crate) horizon_days: u32,
    /// Days shown in the heat map
    #[arg(long, default_value_t = 7)]
    pub(crate) days: u32,
    /// Existing load as YYYY-MM-DD=COUNT; repeat for several days
    #[arg(long, value_parser = parse_booking)]
    pub(crate) booked: Vec<(NaiveDate, u32)>,
    /// Emit JSON instead of a table
    #[arg(long)]
    pub(crate) json: bool,
}

pub(crate) fn run_capacity_report(args: CapacityReportArgs) -> Result<(), AppError> {
    let CapacityReportArgs {
        today,
        capacity,
        horizon_days,
        days,
        booked,
        json,
    } = args;

    let today = today.unwrap_or_else(|| Local::now().date_naive());
    let mut counts = BTreeMap::new();
    for (date, count) in booked {
        *counts.entry(date).or_insert(0) += count;
    }

    let calendar = CapacityCalendar::new(capacity, today, horizon_days, counts);
    let heat_map = calendar.heat_map(days);

    if json {
        let payload = json!({ "capacity": calendar.info(), "heat_map": heat_map });
        match serde_json::to_string_pretty(&payload) {
            Ok(rendered) => println!("{rendered}"),
            Err(err) => println!("Capacity payload unavailable: {err}"),
        }
        return Ok(());
    }

    println!(
        "Visit capacity report ({} to {}, {} visits per day)",
        today,
        calendar.window_end(),
        capacity
    );
    render_heat_map(&heat_map);
    match calendar.next_available() {
        Some(date) => println!("Next available date: {date}"),
        None => println!("Next available date: none within {horizon_days} days"),
    }
    Ok(())
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        today,
        daily_capacity,
        register_out,
        skip_messaging,
    } = args;

    let today = today.unwrap_or_else(|| Local::now().date_naive());
    let clock: Arc<dyn Clock> = Arc::new(FixedClock::on(today));
    let (prisons, inmates) = seeded_registry().map_err(WorkflowError::from)?;

    println!("Prison operations demo ({today})");

    let events = Arc::new(LoggingEventPublisher::default());
    let transfers = TransferWorkflowService::new(
        Arc::new(InMemoryTransferRepository::default()),
        inmates.clone(),
        prisons.clone(),
        events.clone(),
        TransferConfig::default(),
    )
    .with_clock(clock.clone());
    demo_transfers(&transfers, &prisons)?;
    println!("  Events published: {}", events.events().len());

    let rows = transfers.list()?;
    match register_out {
        Some(path) => {
            write_transfer_register(File::create(&path)?, &rows)?;
            println!("  Transfer register written to {}", path.display());
        }
        None => {
            println!("\nTransfer register");
            write_transfer_register(std::io::stdout().lock(), &rows)?;
        }
    }

    let visits = VisitSchedulingService::new(
        Arc::new(InMemoryScheduleRepository::default()),
        inmates,
        VisitationConfig {
            daily_capacity: daily_capacity.max(1),
            horizon_days: DEFAULT_BOOKING_HORIZON_DAYS,
        },
    )
    .with_clock(clock.clone());
    demo_visits(&visits, today)?;

    if !skip_messaging {
        let messaging =
            MessagingService::new(Arc::new(InMemoryMessageRepository::default())).with_clock(clock);
        demo_messaging(&messaging)?;
    }

    Ok(())
}

fn demo_transfers(
    transfers: &DemoTransfers,
    prisons: &InMemoryPrisonRegistry,
) -> Result<(), AppError> {
    let woreda = Actor::new("woreda-officer-7", ActorRole::Woreda);
    let inspector = Actor::new("inspector-2", ActorRole::Inspector);

    println!("\nTransfer workflow");
    println!(
        "  Before: Kality {} | Ziway {}",
        population(prisons, "kality")?,
        population(prisons, "ziway")?
    );

    let filed = transfers.create_transfer_request(draft(
        "INM-0001",
        "ziway",
        "Closer to family in Batu",
        &woreda,
    ))?;
    let transfer_id = filed.transfer.id.clone();
    println!(
        "  Filed {} for {} ({})",
        transfer_id,
        filed.transfer.inmate_data.full_name(),
        filed.transfer.status.label()
    );

    match transfers.create_transfer_request(draft(
        "INM-0001",
        "shewa-robit",
        "Duplicate filing",
        &woreda,
    )) {
        Ok(outcome) => println!("  Unexpected second filing {}", outcome.transfer.id),
        Err(err) => println!("  Second request refused: {err}"),
    }

    transfers.begin_review(&transfer_id, &inspector)?;
    let approved = transfers.approve_transfer(&transfer_id, &inspector)?;
    print_outcome("Approved", &approved);
    println!(
        "  After: Kality {} | Ziway {}",
        population(prisons, "kality")?,
        population(prisons, "ziway")?
    );

    match transfers.create_transfer_request(draft(
        "INM-0002",
        "kilinto",
        "Remand hearing",
        &woreda,
    )) {
        Ok(outcome) => println!("  Unexpected filing {}", outcome.transfer.id),
        Err(err) => println!("  Kilinto refused: {err}"),
    }

    let rejected = transfers.create_transfer_request(draft(
        "INM-0003",
        "shewa-robit",
        "Medical follow-up",
        &woreda,
    ))?;
    let rejected = transfers.reject_transfer(
        &rejected.transfer.id,
        &inspector,
        "Receiving facility at capacity",
    )?;
    print_outcome("Rejected", &rejected);

    let fast = transfers.create_approved_transfer(
        draft("INM-0002", "shewa-robit", "Court order", &woreda),
        &inspector,
    )?;
    print_outcome("Filed pre-approved", &fast);

    let pending = transfers.pending_reconciliation()?;
    println!("  Awaiting reconciliation: {}", pending.len());
    Ok(())
}

fn demo_visits(
    visits: &VisitSchedulingService<InMemoryScheduleRepository, InMemoryInmateDirectory>,
    today: NaiveDate,
) -> Result<(), AppError> {
    let visit_date = today.checked_add_days(Days::new(1)).unwrap_or(today);
    let capacity = visits.max_capacity();

    println!("\nVisit scheduling ({capacity} visits per day)");
    for n in 1..=capacity {
        let visitor = VisitorId(format!("visitor-{n}"));
        let schedule =
            visits.create_or_update_schedule(&visitor, booking_form(n, visit_date), None)?;
        println!(
            "  Booked {} for {} on {} at {}",
            schedule.id,
            visitor.0,
            schedule.visit_date,
            schedule.visit_time.label()
        );
    }

    let late = VisitorId(format!("visitor-{}", capacity + 1));
    match visits.create_or_update_schedule(&late, booking_form(capacity + 1, visit_date), None) {
        Err(WorkflowError::CapacityExceeded { suggested_date, .. }) => println!(
            "  {} turned away: {} is full (suggested {})",
            late.0,
            visit_date,
            suggested_date
                .map(|date| date.to_string())
                .unwrap_or_else(|| "none".to_string())
        ),
        Err(err) => return Err(err.into()),
        Ok(schedule) => println!("  Unexpected booking {}", schedule.id),
    }

    let first = VisitorId("visitor-1".to_string());
    if let Some(schedule) = visits.pending_schedule(&first)? {
        let owner = Actor::new(first.0.clone(), ActorRole::Visitor);
        visits.cancel_schedule(&schedule.id, &owner)?;
        println!("  {} cancelled {}", first.0, schedule.id);
    }

    let rebooked =
        visits.create_or_update_schedule(&late, booking_form(capacity + 1, visit_date), None)?;
    println!("  {} booked {} in the freed slot", late.0, rebooked.id);

    let staff = Actor::new("gate-officer-1", ActorRole::Staff);
    let approved = visits.approve_schedule(&rebooked.id, &staff)?;
    println!("  {} is now {}", approved.id, approved.status.label());

    println!("\nAvailability for the coming week");
    render_heat_map(&visits.availability_heat_map(7)?);
    Ok(())
}

fn demo_messaging(
    messaging: &MessagingService<InMemoryMessageRepository>,
) -> Result<(), AppError> {
    let visitor = UserId("visitor-2".to_string());
    let desk = UserId("visits-desk".to_string());

    println!("\nMessaging");
    messaging.send(MessageDraft {
        sender_id: Some(visitor.clone()),
        receiver_id: Some(desk.clone()),
        content: Some("May I bring the court letter to tomorrow's visit?".to_string()),
        attachment: Some(attachment("court-letter.pdf", 240_000)),
    })?;
    messaging.send(MessageDraft {
        sender_id: Some(visitor.clone()),
        receiver_id: Some(desk.clone()),
        content: Some("I will arrive at 10:00 AM.".to_string()),
        attachment: None,
    })?;

    match messaging.send(MessageDraft {
        sender_id: Some(visitor.clone()),
        receiver_id: Some(desk.clone()),
        content: None,
        attachment: Some(attachment("setup.exe", 1_024)),
    }) {
        Ok(message) => println!("  Unexpected attachment accepted on {}", message.id),
        Err(err) => println!("  Attachment refused: {err}"),
    }

    let unread = messaging.unread_counts(&desk)?;
    println!("  Desk unread before opening: {}", unread.count);

    for message in messaging.conversation(&desk, &visitor, None)? {
        let attached = message
            .attachment
            .as_ref()
            .map(|file| format!(" [{} {}]", file.file_name, file.content_type))
            .unwrap_or_default();
        println!(
            "  {} -> {}: {}{}",
            message.sender_id, message.receiver_id, message.content, attached
        );
    }

    let unread = messaging.unread_counts(&desk)?;
    println!("  Desk unread after opening: {}", unread.count);
    Ok(())
}

fn draft(inmate: &str, to: &str, reason: &str, requested_by: &Actor) -> TransferDraft {
    TransferDraft {
        inmate_id: InmateId(inmate.to_string()),
        to_prison: PrisonId(to.to_string()),
        reason: reason.to_string(),
        requested_by: requested_by.clone(),
    }
}

fn population(prisons: &InMemoryPrisonRegistry, id: &str) -> Result<u32, AppError> {
    let prison_id = PrisonId(id.to_string());
    let prison = prisons
        .find(&prison_id)
        .map_err(WorkflowError::from)?
        .ok_or_else(|| WorkflowError::not_found("prison", id))?;
    Ok(prison.current_population)
}

fn print_outcome(label: &str, outcome: &TransferOutcome) {
    println!(
        "  {} {} ({} -> {}), population settled: {}",
        label,
        outcome.transfer.id,
        outcome
            .transfer
            .request_details
            .from_prison_name
            .as_deref()
            .unwrap_or("Not Assigned"),
        outcome.transfer.request_details.to_prison_name,
        outcome.transfer.population.is_settled()
    );
    for anomaly in &outcome.anomalies {
        println!("    Needs attention: {anomaly}");
    }
}

pub(crate) fn booking_form(n: u32, visit_date: NaiveDate) -> SchedulePayload {
    let slot = VisitTime::ALL[(n as usize) % VisitTime::ALL.len()];
    SchedulePayload {
        first_name: Some(format!("Visitor{n}")),
        last_name: Some("Demo".to_string()),
        phone: Some(format!("+2519110000{n:02}")),
        id_type: Some(IdType::NationalId),
        id_number: Some(format!("ET-{n:04}")),
        purpose: Some("Family visit".to_string()),
        relationship: Some(Relationship::Relative),
        inmate_id: Some(InmateId("INM-0001".to_string())),
        visit_date: Some(visit_date),
        visit_time: Some(slot),
        visitor_photo: Some(format!("uploads/visitor-{n}.jpg")),
        id_photo: Some(format!("uploads/visitor-{n}-id.jpg")),
        ..SchedulePayload::default()
    }
}

fn attachment(file_name: &str, size_bytes: u64) -> Attachment {
    let content_type = mime_guess::from_path(file_name).first_or_octet_stream();
    Attachment {
        url: format!("uploads/messages/{file_name}"),
        file_name: file_name.to_string(),
        content_type: content_type.essence_str().to_string(),
        size_bytes,
    }
}

fn render_heat_map(days: &[DayAvailability]) {
    for day in days {
        println!(
            "  {} {}  {:>3} booked  {:>3}%  {:?}",
            day.date, day.weekday, day.visitor_count, day.percent_full, day.level
        );
    }
}
