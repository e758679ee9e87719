use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::response::Response;
use rust_decimal::Decimal;
use serde_json::Value;
use tokio::runtime::Handle;

use crate::config::DispatchConfig;
use crate::workflows::fulfillment::domain::{
    Coordinates, DocumentRef, Job, JobId, JobStatus, PaperSize, PrintRequest, TrackingCode,
    Vendor, VendorCapabilities, VendorId, VendorRates,
};
use crate::workflows::fulfillment::geo::EARTH_RADIUS_KM;
use crate::workflows::fulfillment::repository::{
    DirectoryError, JobRepository, NotificationError, NotificationGateway, RepositoryError,
    VendorDirectory,
};
use crate::workflows::fulfillment::{FulfillmentService, TimeoutScheduler, TrackingCodeSource};

pub(super) const ORIGIN: Coordinates = Coordinates::new(37.5665, 126.9780);

/// A point `km` due north of `ORIGIN`.
pub(super) fn north_of_origin(km: f64) -> Coordinates {
    let degrees = (km / EARTH_RADIUS_KM).to_degrees();
    Coordinates::new(ORIGIN.latitude + degrees, ORIGIN.longitude)
}

pub(super) fn cents(value: i64) -> Decimal {
    Decimal::new(value, 2)
}

pub(super) fn vendor(id: &str, km: f64, mono_single: Decimal) -> Vendor {
    Vendor {
        id: VendorId(id.to_string()),
        name: format!("{id} copy shop"),
        location: north_of_origin(km),
        active: true,
        open: true,
        verified: true,
        rates: VendorRates {
            mono_single: Some(mono_single),
            mono_double: Some(mono_single),
            color_single: Some(mono_single * Decimal::from(4)),
            color_double: None,
        },
        capabilities: None,
    }
}

pub(super) fn mono_only(mut vendor: Vendor) -> Vendor {
    vendor.capabilities = Some(VendorCapabilities {
        paper_sizes: vec![PaperSize::A4, PaperSize::Letter],
        color: false,
    });
    vendor
}

pub(super) fn vendor_id(id: &str) -> VendorId {
    VendorId(id.to_string())
}

/// Ten mono single-sided A4 pages, one copy.
pub(super) fn print_request() -> PrintRequest {
    PrintRequest {
        customer_id: "cust-42".to_string(),
        document: DocumentRef {
            storage_key: "uploads/cust-42/syllabus.pdf".to_string(),
            file_name: "syllabus.pdf".to_string(),
        },
        page_count: 10,
        paper_size: PaperSize::A4,
        color: false,
        duplex: false,
        copies: 1,
        customer_location: ORIGIN,
        preferred_vendor: None,
    }
}

pub(super) fn dispatch_config() -> DispatchConfig {
    DispatchConfig::default()
}

pub(super) type TestService = FulfillmentService<MemoryJobs, MemoryVendors, RecordingNotifier>;

pub(super) struct Harness {
    pub(super) service: Arc<TestService>,
    pub(super) jobs: Arc<MemoryJobs>,
    pub(super) vendors: Arc<MemoryVendors>,
    pub(super) notifier: Arc<RecordingNotifier>,
}

/// Must run inside a tokio runtime; timers spawn on the current handle.
pub(super) fn harness(vendors: Vec<Vendor>) -> Harness {
    harness_with(vendors, dispatch_config(), None)
}

pub(super) fn harness_with(
    vendors: Vec<Vendor>,
    config: DispatchConfig,
    codes: Option<Arc<dyn TrackingCodeSource>>,
) -> Harness {
    let jobs = Arc::new(MemoryJobs::default());
    let vendors = Arc::new(MemoryVendors::new(vendors));
    let notifier = Arc::new(RecordingNotifier::default());
    let scheduler = TimeoutScheduler::new(Handle::current());
    let service = match codes {
        Some(codes) => FulfillmentService::with_tracking_codes(
            jobs.clone(),
            vendors.clone(),
            notifier.clone(),
            scheduler,
            config,
            codes,
        ),
        None => FulfillmentService::new(
            jobs.clone(),
            vendors.clone(),
            notifier.clone(),
            scheduler,
            config,
        ),
    };
    Harness {
        service,
        jobs,
        vendors,
        notifier,
    }
}

pub(super) async fn advance(duration: Duration) {
    tokio::time::sleep(duration).await;
}

#[derive(Default)]
pub(super) struct MemoryJobs {
    records: Mutex<HashMap<JobId, Job>>,
    fail_saves: AtomicBool,
}

impl MemoryJobs {
    pub(super) fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub(super) fn stored(&self, id: &JobId) -> Job {
        self.records
            .lock()
            .expect("jobs mutex poisoned")
            .get(id)
            .cloned()
            .expect("job stored")
    }

    pub(super) fn count(&self) -> usize {
        self.records.lock().expect("jobs mutex poisoned").len()
    }

    pub(super) fn put(&self, job: Job) {
        self.records
            .lock()
            .expect("jobs mutex poisoned")
            .insert(job.id, job);
    }
}

impl JobRepository for MemoryJobs {
    fn insert(&self, job: Job) -> Result<Job, RepositoryError> {
        let mut guard = self.records.lock().expect("jobs mutex poisoned");
        let taken = guard.contains_key(&job.id)
            || guard
                .values()
                .any(|existing| existing.tracking_code == job.tracking_code);
        if taken {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(job.id, job.clone());
        Ok(job)
    }

    fn save(&self, job: Job) -> Result<Job, RepositoryError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("write rejected".to_string()));
        }
        let mut guard = self.records.lock().expect("jobs mutex poisoned");
        if !guard.contains_key(&job.id) {
            return Err(RepositoryError::NotFound);
        }
        guard.insert(job.id, job.clone());
        Ok(job)
    }

    fn load(&self, id: &JobId) -> Result<Option<Job>, RepositoryError> {
        Ok(self
            .records
            .lock()
            .expect("jobs mutex poisoned")
            .get(id)
            .cloned())
    }

    fn exists_by_tracking_code(&self, code: &TrackingCode) -> Result<bool, RepositoryError> {
        Ok(self.find_by_tracking_code(code)?.is_some())
    }

    fn find_by_tracking_code(&self, code: &TrackingCode) -> Result<Option<Job>, RepositoryError> {
        Ok(self
            .records
            .lock()
            .expect("jobs mutex poisoned")
            .values()
            .find(|job| &job.tracking_code == code)
            .cloned())
    }

    fn find_pending_for_vendor(&self, vendor: &VendorId) -> Result<Vec<Job>, RepositoryError> {
        Ok(self
            .records
            .lock()
            .expect("jobs mutex poisoned")
            .values()
            .filter(|job| job.status == JobStatus::AwaitingAcceptance)
            .filter(|job| job.vendor_id() == Some(vendor))
            .cloned()
            .collect())
    }

    fn with_pending_deadline(&self) -> Result<Vec<Job>, RepositoryError> {
        Ok(self
            .records
            .lock()
            .expect("jobs mutex poisoned")
            .values()
            .filter(|job| job.pending_deadline.is_some())
            .cloned()
            .collect())
    }
}

pub(super) struct UnavailableJobs;

impl JobRepository for UnavailableJobs {
    fn insert(&self, _job: Job) -> Result<Job, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn save(&self, _job: Job) -> Result<Job, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn load(&self, _id: &JobId) -> Result<Option<Job>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn exists_by_tracking_code(&self, _code: &TrackingCode) -> Result<bool, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn find_by_tracking_code(&self, _code: &TrackingCode) -> Result<Option<Job>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn find_pending_for_vendor(&self, _vendor: &VendorId) -> Result<Vec<Job>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn with_pending_deadline(&self) -> Result<Vec<Job>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

pub(super) struct MemoryVendors {
    vendors: Mutex<Vec<Vendor>>,
}

impl MemoryVendors {
    pub(super) fn new(vendors: Vec<Vendor>) -> Self {
        Self {
            vendors: Mutex::new(vendors),
        }
    }

    pub(super) fn replace(&self, vendors: Vec<Vendor>) {
        *self.vendors.lock().expect("vendors mutex poisoned") = vendors;
    }
}

impl VendorDirectory for MemoryVendors {
    fn list_all(&self) -> Result<Vec<Vendor>, DirectoryError> {
        Ok(self.vendors.lock().expect("vendors mutex poisoned").clone())
    }

    fn find_by_id(&self, id: &VendorId) -> Result<Option<Vendor>, DirectoryError> {
        Ok(self
            .vendors
            .lock()
            .expect("vendors mutex poisoned")
            .iter()
            .find(|vendor| &vendor.id == id)
            .cloned())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(super) enum Notice {
    Offer(VendorId, JobId),
    Rescind(VendorId, JobId),
    Status(JobId, JobStatus, String),
}

#[derive(Default)]
pub(super) struct RecordingNotifier {
    events: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub(super) fn events(&self) -> Vec<Notice> {
        self.events.lock().expect("notifier mutex poisoned").clone()
    }

    pub(super) fn offers(&self) -> Vec<VendorId> {
        self.events()
            .into_iter()
            .filter_map(|notice| match notice {
                Notice::Offer(vendor, _) => Some(vendor),
                _ => None,
            })
            .collect()
    }

    pub(super) fn statuses(&self) -> Vec<JobStatus> {
        self.events()
            .into_iter()
            .filter_map(|notice| match notice {
                Notice::Status(_, status, _) => Some(status),
                _ => None,
            })
            .collect()
    }

    fn record(&self, notice: Notice) {
        self.events
            .lock()
            .expect("notifier mutex poisoned")
            .push(notice);
    }
}

impl NotificationGateway for RecordingNotifier {
    fn offer_job_to_vendor(&self, vendor: &VendorId, job: &Job) -> Result<(), NotificationError> {
        self.record(Notice::Offer(vendor.clone(), job.id));
        Ok(())
    }

    fn rescind_offer(&self, vendor: &VendorId, job_id: &JobId) -> Result<(), NotificationError> {
        self.record(Notice::Rescind(vendor.clone(), *job_id));
        Ok(())
    }

    fn status_changed(
        &self,
        job: &Job,
        status: JobStatus,
        message: &str,
    ) -> Result<(), NotificationError> {
        self.record(Notice::Status(job.id, status, message.to_string()));
        Ok(())
    }
}

/// Hands out a fixed sequence of codes, repeating the last one.
pub(super) struct ScriptedCodes {
    codes: Mutex<VecDeque<String>>,
    last: String,
}

impl ScriptedCodes {
    pub(super) fn new(codes: &[&str]) -> Self {
        Self {
            codes: Mutex::new(codes.iter().map(|code| code.to_string()).collect()),
            last: codes.last().copied().unwrap_or("ZZZZZZZZ").to_string(),
        }
    }
}

impl TrackingCodeSource for ScriptedCodes {
    fn next_code(&self) -> TrackingCode {
        let next = self.codes.lock().expect("codes mutex poisoned").pop_front();
        match next {
            Some(code) => TrackingCode(code),
            None => TrackingCode(self.last.clone()),
        }
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
