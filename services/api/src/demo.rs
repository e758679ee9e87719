use crate::infra::{
    load_vendor_directory, sample_vendors, InMemoryJobRepository, TracingNotifier, DEFAULT_CENTER,
};
use clap::Args;
use print_dispatch::config::{AppConfig, DispatchConfig};
use print_dispatch::error::AppError;
use print_dispatch::workflows::fulfillment::intake::validate_quote_request;
use print_dispatch::workflows::fulfillment::{
    Coordinates, CsvVendorDirectory, DispatchError, DocumentRef, FulfillmentService, Job,
    PaperSize, PrintRequest, QuoteRequest, TimeoutScheduler, VendorDirectory, VendorMatch,
    VendorMatcher,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

#[derive(Args, Debug)]
pub(crate) struct QuoteArgs {
    /// Customer latitude in degrees
    #[arg(long, default_value_t = DEFAULT_CENTER.latitude, allow_negative_numbers = true)]
    pub(crate) lat: f64,
    /// Customer longitude in degrees
    #[arg(long, default_value_t = DEFAULT_CENTER.longitude, allow_negative_numbers = true)]
    pub(crate) lon: f64,
    /// Pages in the document
    #[arg(long, default_value_t = 10)]
    pub(crate) pages: u32,
    /// Number of copies
    #[arg(long, default_value_t = 1)]
    pub(crate) copies: u32,
    /// Paper size (A3, A4, A5, Letter, Legal)
    #[arg(long, default_value = "A4", value_parser = parse_paper_size)]
    pub(crate) paper: PaperSize,
    /// Print in color
    #[arg(long)]
    pub(crate) color: bool,
    /// Print on both sides
    #[arg(long)]
    pub(crate) duplex: bool,
    /// Vendor directory CSV (defaults to APP_VENDORS_CSV, then the sample shops)
    #[arg(long)]
    pub(crate) vendors_csv: Option<PathBuf>,
    /// Emit the ranking as JSON
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Seconds a vendor has to answer an offer
    #[arg(long, default_value_t = 2)]
    pub(crate) decision_secs: u64,
    /// Seconds a ready job waits for pickup before completing on its own
    #[arg(long, default_value_t = 3)]
    pub(crate) pickup_secs: u64,
}

#[derive(Debug, Serialize)]
struct QuoteLine<'a> {
    rank: usize,
    #[serde(flatten)]
    found: &'a VendorMatch,
}

fn parse_paper_size(raw: &str) -> Result<PaperSize, String> {
    raw.parse()
}

pub(crate) fn run_quote(args: QuoteArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let csv = args.vendors_csv.or(config.vendors_csv);
    let directory = load_vendor_directory(csv.as_deref())?;

    let request = QuoteRequest {
        page_count: args.pages,
        paper_size: args.paper,
        color: args.color,
        duplex: args.duplex,
        copies: args.copies,
        customer_location: Coordinates::new(args.lat, args.lon),
    };
    validate_quote_request(&request).map_err(DispatchError::from)?;

    let vendors = directory.list_all()?;
    let matcher = VendorMatcher::new(config.dispatch.matching);
    let ranked = matcher.rank(&request.requirements(), &vendors, &[]);

    if args.json {
        let lines: Vec<QuoteLine<'_>> = ranked
            .iter()
            .enumerate()
            .map(|(index, found)| QuoteLine {
                rank: index + 1,
                found,
            })
            .collect();
        match serde_json::to_string_pretty(&lines) {
            Ok(json) => println!("{json}"),
            Err(err) => println!("Quote payload unavailable: {err}"),
        }
        return Ok(());
    }

    println!(
        "Quotes for {} x {} {} {} {} page(s) within {:.0} km",
        args.copies,
        args.pages,
        args.paper.label(),
        if args.color { "color" } else { "mono" },
        if args.duplex { "double-sided" } else { "single-sided" },
        matcher.config().max_distance_km
    );
    if ranked.is_empty() {
        println!("- No vendor nearby can take this job");
        return Ok(());
    }
    for (index, found) in ranked.iter().enumerate() {
        println!(
            "{}. {} ({}) | {:.2} km | unit {} | total {} | score {:.2}",
            index + 1,
            found.vendor_name,
            found.vendor_id,
            found.distance_km,
            found.unit_price,
            found.total_price,
            found.score
        );
    }
    Ok(())
}

/// Walk a job through an ignored offer, a re-match, printing and an
/// unattended pickup window.
pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let config = DispatchConfig {
        decision_window: Duration::from_secs(args.decision_secs),
        pickup_window: Duration::from_secs(args.pickup_secs),
        ..DispatchConfig::default()
    };
    let service = FulfillmentService::new(
        Arc::new(InMemoryJobRepository::default()),
        Arc::new(CsvVendorDirectory::new(sample_vendors(DEFAULT_CENTER))),
        Arc::new(TracingNotifier),
        TimeoutScheduler::new(Handle::current()),
        config,
    );

    println!("Print dispatch demo");
    let request = PrintRequest {
        customer_id: "demo-customer".to_string(),
        document: DocumentRef {
            storage_key: "demo/lecture-notes.pdf".to_string(),
            file_name: "lecture-notes.pdf".to_string(),
        },
        page_count: 24,
        paper_size: PaperSize::A4,
        color: false,
        duplex: true,
        copies: 2,
        customer_location: DEFAULT_CENTER,
        preferred_vendor: None,
    };

    let job = service.create_job(request)?;
    println!("- Job {} created", job.tracking_code);
    describe(&job);

    println!(
        "\nWaiting {}s without a vendor response...",
        args.decision_secs + 1
    );
    tokio::time::sleep(Duration::from_secs(args.decision_secs + 1)).await;
    let job = service.get_job(&job.id)?;
    describe(&job);
    let excluded: Vec<String> = job
        .excluded_vendors
        .iter()
        .map(ToString::to_string)
        .collect();
    println!("  Excluded vendors: {}", excluded.join(", "));

    let Some(vendor) = job.vendor_id().cloned() else {
        println!("  No vendor left to take the job; retry later.");
        return Ok(());
    };

    println!("\nVendor {vendor} accepts and prints");
    service.accept_job(&job.id, &vendor)?;
    let printing = service.start_printing(&job.id, &vendor)?;
    describe(&printing);
    let ready = service.mark_ready(&job.id, &vendor)?;
    describe(&ready);

    println!(
        "\nWaiting {}s for a pickup that never comes...",
        args.pickup_secs + 1
    );
    tokio::time::sleep(Duration::from_secs(args.pickup_secs + 1)).await;
    let done = service.track(&job.tracking_code)?;
    describe(&done);

    match serde_json::to_string_pretty(&done.status_view()) {
        Ok(json) => println!("\nPublic status payload:\n{json}"),
        Err(err) => println!("\nPublic status payload unavailable: {err}"),
    }
    Ok(())
}

fn describe(job: &Job) {
    match &job.assignment {
        Some(assignment) => println!(
            "  {} -> {} ({:.2} km, total {})",
            job.status, assignment.vendor_name, assignment.distance_km, assignment.total_price
        ),
        None => println!("  {} -> no vendor assigned", job.status),
    }
    if let Some(deadline) = &job.pending_deadline {
        println!(
            "  next deadline: {} at {}",
            deadline.kind,
            deadline.due_at.format("%H:%M:%S UTC")
        );
    }
}
