use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::scheduler::DeadlineKind;

/// Internal identifier for a print job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Short public identifier customers use to follow a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackingCode(pub String);

impl fmt::Display for TrackingCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier wrapper for vendors owned by the account directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VendorId(pub String);

impl fmt::Display for VendorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaperSize {
    A3,
    A4,
    A5,
    Letter,
    Legal,
}

impl PaperSize {
    pub const fn label(self) -> &'static str {
        match self {
            Self::A3 => "A3",
            Self::A4 => "A4",
            Self::A5 => "A5",
            Self::Letter => "Letter",
            Self::Legal => "Legal",
        }
    }
}

impl FromStr for PaperSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "a3" => Ok(Self::A3),
            "a4" => Ok(Self::A4),
            "a5" => Ok(Self::A5),
            "letter" => Ok(Self::Letter),
            "legal" => Ok(Self::Legal),
            other => Err(format!("unsupported paper size '{other}'")),
        }
    }
}

/// Latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// File identity written once by the upload collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
    pub storage_key: String,
    pub file_name: String,
}

/// Inbound request to print a stored document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrintRequest {
    pub customer_id: String,
    pub document: DocumentRef,
    pub page_count: u32,
    pub paper_size: PaperSize,
    pub color: bool,
    pub duplex: bool,
    pub copies: u32,
    pub customer_location: Coordinates,
    #[serde(default)]
    pub preferred_vendor: Option<VendorId>,
}

impl PrintRequest {
    pub fn requirements(&self) -> PrintRequirements {
        PrintRequirements {
            paper_size: self.paper_size,
            color: self.color,
            duplex: self.duplex,
            copies: self.copies,
            page_count: self.page_count,
            location: self.customer_location,
        }
    }
}

/// Request for a price comparison without creating a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteRequest {
    pub page_count: u32,
    pub paper_size: PaperSize,
    pub color: bool,
    pub duplex: bool,
    pub copies: u32,
    pub customer_location: Coordinates,
}

impl QuoteRequest {
    pub fn requirements(&self) -> PrintRequirements {
        PrintRequirements {
            paper_size: self.paper_size,
            color: self.color,
            duplex: self.duplex,
            copies: self.copies,
            page_count: self.page_count,
            location: self.customer_location,
        }
    }
}

/// The subset of a job the matcher ranks vendors against.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PrintRequirements {
    pub paper_size: PaperSize,
    pub color: bool,
    pub duplex: bool,
    pub copies: u32,
    pub page_count: u32,
    pub location: Coordinates,
}

/// Per-category unit prices. A missing rate means the vendor does not offer that category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorRates {
    pub mono_single: Option<Decimal>,
    pub mono_double: Option<Decimal>,
    pub color_single: Option<Decimal>,
    pub color_double: Option<Decimal>,
}

impl VendorRates {
    pub fn rate_for(&self, color: bool, duplex: bool) -> Option<Decimal> {
        match (color, duplex) {
            (false, false) => self.mono_single,
            (false, true) => self.mono_double,
            (true, false) => self.color_single,
            (true, true) => self.color_double,
        }
    }
}

/// Advertised equipment. Vendors without a descriptor are treated as compatible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorCapabilities {
    pub paper_sizes: Vec<PaperSize>,
    pub color: bool,
}

impl VendorCapabilities {
    pub fn supports(&self, requirements: &PrintRequirements) -> bool {
        self.paper_sizes.contains(&requirements.paper_size) && (self.color || !requirements.color)
    }
}

/// Read-only vendor projection supplied by the account directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vendor {
    pub id: VendorId,
    pub name: String,
    pub location: Coordinates,
    pub active: bool,
    pub open: bool,
    pub verified: bool,
    pub rates: VendorRates,
    #[serde(default)]
    pub capabilities: Option<VendorCapabilities>,
}

impl Vendor {
    pub fn is_available(&self) -> bool {
        self.active && self.verified && self.open
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Uploaded,
    AwaitingAcceptance,
    Accepted,
    Printing,
    Ready,
    Completed,
    VendorRejected,
    VendorTimeout,
    NoVendorsAvailable,
}

impl JobStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Uploaded => "uploaded",
            Self::AwaitingAcceptance => "awaiting_acceptance",
            Self::Accepted => "accepted",
            Self::Printing => "printing",
            Self::Ready => "ready",
            Self::Completed => "completed",
            Self::VendorRejected => "vendor_rejected",
            Self::VendorTimeout => "vendor_timeout",
            Self::NoVendorsAvailable => "no_vendors_available",
        }
    }

    /// Statuses in which a job must have a vendor assigned.
    pub const fn requires_vendor(self) -> bool {
        matches!(
            self,
            Self::AwaitingAcceptance | Self::Accepted | Self::Printing | Self::Ready | Self::Completed
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How the current vendor ended up on the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentSource {
    Ranked,
    Manual,
}

/// Vendor and price committed at match time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub vendor_id: VendorId,
    pub vendor_name: String,
    pub source: AssignmentSource,
    pub distance_km: f64,
    pub unit_price: Decimal,
    pub total_price: Decimal,
}

/// The single deferred action currently armed for a job.
///
/// `id` is fresh for every deadline written to the record; a timer only acts
/// if the record still carries the id it was armed with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDeadline {
    pub id: Uuid,
    pub kind: DeadlineKind,
    pub vendor_id: VendorId,
    pub due_at: DateTime<Utc>,
}

impl PendingDeadline {
    pub fn new(kind: DeadlineKind, vendor_id: VendorId, due_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            vendor_id,
            due_at,
        }
    }
}

/// Timestamps for each transition actually taken.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobTimeline {
    pub created_at: DateTime<Utc>,
    pub matched_at: Option<DateTime<Utc>>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub printing_started_at: Option<DateTime<Utc>>,
    pub ready_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// One customer print request tracked from upload to completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub tracking_code: TrackingCode,
    pub customer_id: String,
    pub document: DocumentRef,
    pub page_count: u32,
    pub paper_size: PaperSize,
    pub color: bool,
    pub duplex: bool,
    pub copies: u32,
    pub customer_location: Coordinates,
    pub preferred_vendor: Option<VendorId>,
    pub status: JobStatus,
    pub assignment: Option<Assignment>,
    pub excluded_vendors: Vec<VendorId>,
    pub pending_deadline: Option<PendingDeadline>,
    pub estimated_ready_at: Option<DateTime<Utc>>,
    pub timeline: JobTimeline,
}

impl Job {
    pub fn new(request: PrintRequest, tracking_code: TrackingCode, now: DateTime<Utc>) -> Self {
        Self {
            id: JobId::new(),
            tracking_code,
            customer_id: request.customer_id,
            document: request.document,
            page_count: request.page_count,
            paper_size: request.paper_size,
            color: request.color,
            duplex: request.duplex,
            copies: request.copies,
            customer_location: request.customer_location,
            preferred_vendor: request.preferred_vendor,
            status: JobStatus::Uploaded,
            assignment: None,
            excluded_vendors: Vec::new(),
            pending_deadline: None,
            estimated_ready_at: None,
            timeline: JobTimeline {
                created_at: now,
                matched_at: None,
                accepted_at: None,
                printing_started_at: None,
                ready_at: None,
                completed_at: None,
            },
        }
    }

    pub fn requirements(&self) -> PrintRequirements {
        PrintRequirements {
            paper_size: self.paper_size,
            color: self.color,
            duplex: self.duplex,
            copies: self.copies,
            page_count: self.page_count,
            location: self.customer_location,
        }
    }

    pub fn vendor_id(&self) -> Option<&VendorId> {
        self.assignment.as_ref().map(|assignment| &assignment.vendor_id)
    }

    pub fn is_manual_assignment(&self) -> bool {
        matches!(
            self.assignment.as_ref().map(|assignment| assignment.source),
            Some(AssignmentSource::Manual)
        )
    }

    pub fn exclude(&mut self, vendor_id: VendorId) {
        if !self.excluded_vendors.contains(&vendor_id) {
            self.excluded_vendors.push(vendor_id);
        }
    }

    pub fn status_view(&self) -> JobStatusView {
        JobStatusView {
            job_id: self.id,
            tracking_code: self.tracking_code.clone(),
            status: self.status.label(),
            vendor_id: self.vendor_id().cloned(),
            vendor_name: self
                .assignment
                .as_ref()
                .map(|assignment| assignment.vendor_name.clone()),
            unit_price: self.assignment.as_ref().map(|assignment| assignment.unit_price),
            total_price: self
                .assignment
                .as_ref()
                .map(|assignment| assignment.total_price),
            distance_km: self
                .assignment
                .as_ref()
                .map(|assignment| assignment.distance_km),
            deadline: self.pending_deadline.as_ref().map(|deadline| deadline.kind),
            deadline_at: self.pending_deadline.as_ref().map(|deadline| deadline.due_at),
            estimated_ready_at: self.estimated_ready_at,
            timeline: self.timeline.clone(),
        }
    }
}

/// Customer-facing snapshot of a job.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatusView {
    pub job_id: JobId,
    pub tracking_code: TrackingCode,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor_id: Option<VendorId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DeadlineKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_ready_at: Option<DateTime<Utc>>,
    pub timeline: JobTimeline,
}
