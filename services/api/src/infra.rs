use metrics_exporter_prometheus::PrometheusHandle;
use print_dispatch::workflows::fulfillment::{
    Coordinates, CsvVendorDirectory, DirectoryError, Job, JobId, JobRepository, JobStatus,
    NotificationError, NotificationGateway, PaperSize, RepositoryError, TrackingCode, Vendor,
    VendorCapabilities, VendorId, VendorRates,
};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryJobRepository {
    records: Arc<Mutex<HashMap<JobId, Job>>>,
}

impl InMemoryJobRepository {
    fn records(&self) -> Result<MutexGuard<'_, HashMap<JobId, Job>>, RepositoryError> {
        self.records
            .lock()
            .map_err(|_| RepositoryError::Unavailable("job store lock poisoned".to_string()))
    }
}

impl JobRepository for InMemoryJobRepository {
    fn insert(&self, job: Job) -> Result<Job, RepositoryError> {
        let mut guard = self.records()?;
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
        let mut guard = self.records()?;
        if guard.contains_key(&job.id) {
            guard.insert(job.id, job.clone());
            Ok(job)
        } else {
            Err(RepositoryError::NotFound)
        }
    }

    fn load(&self, id: &JobId) -> Result<Option<Job>, RepositoryError> {
        Ok(self.records()?.get(id).cloned())
    }

    fn exists_by_tracking_code(&self, code: &TrackingCode) -> Result<bool, RepositoryError> {
        Ok(self
            .records()?
            .values()
            .any(|job| &job.tracking_code == code))
    }

    fn find_by_tracking_code(&self, code: &TrackingCode) -> Result<Option<Job>, RepositoryError> {
        Ok(self
            .records()?
            .values()
            .find(|job| &job.tracking_code == code)
            .cloned())
    }

    fn find_pending_for_vendor(&self, vendor: &VendorId) -> Result<Vec<Job>, RepositoryError> {
        let mut pending: Vec<Job> = self
            .records()?
            .values()
            .filter(|job| job.status == JobStatus::AwaitingAcceptance)
            .filter(|job| job.vendor_id() == Some(vendor))
            .cloned()
            .collect();
        pending.sort_by_key(|job| job.timeline.created_at);
        Ok(pending)
    }

    fn with_pending_deadline(&self) -> Result<Vec<Job>, RepositoryError> {
        Ok(self
            .records()?
            .values()
            .filter(|job| job.pending_deadline.is_some())
            .cloned()
            .collect())
    }
}

/// Records notification intents in the service log. Push and email delivery
/// live outside this service.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct TracingNotifier;

impl NotificationGateway for TracingNotifier {
    fn offer_job_to_vendor(&self, vendor: &VendorId, job: &Job) -> Result<(), NotificationError> {
        let total = job
            .assignment
            .as_ref()
            .map(|assignment| assignment.total_price.to_string())
            .unwrap_or_default();
        info!(target: "notifications", vendor_id = %vendor, job_id = %job.id, %total, "offer sent to vendor");
        Ok(())
    }

    fn rescind_offer(&self, vendor: &VendorId, job_id: &JobId) -> Result<(), NotificationError> {
        info!(target: "notifications", vendor_id = %vendor, %job_id, "offer withdrawn");
        Ok(())
    }

    fn status_changed(
        &self,
        job: &Job,
        status: JobStatus,
        message: &str,
    ) -> Result<(), NotificationError> {
        info!(
            target: "notifications",
            customer_id = %job.customer_id,
            tracking_code = %job.tracking_code,
            %status,
            note = message,
            "customer notified"
        );
        Ok(())
    }
}

pub(crate) fn load_vendor_directory(
    path: Option<&Path>,
) -> Result<CsvVendorDirectory, DirectoryError> {
    match path {
        Some(path) => {
            let directory = CsvVendorDirectory::from_path(path)?;
            info!(path = %path.display(), vendors = directory.len(), "loaded vendor directory");
            Ok(directory)
        }
        None => Ok(CsvVendorDirectory::new(sample_vendors(DEFAULT_CENTER))),
    }
}

/// Seoul City Hall; the sample vendors are placed around it.
pub(crate) const DEFAULT_CENTER: Coordinates = Coordinates::new(37.5665, 126.9780);

/// A small neighbourhood of print shops used when no CSV is configured.
pub(crate) fn sample_vendors(center: Coordinates) -> Vec<Vendor> {
    let shop = |id: &str, name: &str, dlat: f64, dlon: f64, mono: i64, color: Option<i64>| Vendor {
        id: VendorId(id.to_string()),
        name: name.to_string(),
        location: Coordinates::new(center.latitude + dlat, center.longitude + dlon),
        active: true,
        open: true,
        verified: true,
        rates: VendorRates {
            mono_single: Some(Decimal::new(mono, 2)),
            mono_double: Some(Decimal::new(mono * 8 / 10, 2)),
            color_single: color.map(|cents| Decimal::new(cents, 2)),
            color_double: color.map(|cents| Decimal::new(cents * 8 / 10, 2)),
        },
        capabilities: Some(VendorCapabilities {
            paper_sizes: vec![PaperSize::A4, PaperSize::A3, PaperSize::Letter],
            color: color.is_some(),
        }),
    };

    vec![
        shop("campus-copy", "Campus Copy Center", 0.010, 0.004, 10, Some(50)),
        shop("station-print", "Station Print Bar", -0.022, 0.015, 8, None),
        shop("night-owl", "Night Owl Printing", 0.031, -0.027, 12, Some(45)),
        shop("riverside", "Riverside Reprographics", -0.054, -0.041, 7, Some(60)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use print_dispatch::workflows::fulfillment::VendorDirectory;

    #[test]
    fn sample_directory_is_used_without_a_csv() {
        let directory = load_vendor_directory(None).expect("sample vendors");
        let vendors = directory.list_all().expect("list");
        assert_eq!(vendors.len(), 4);
        assert!(vendors.iter().all(Vendor::is_available));
    }

    #[test]
    fn repository_enforces_unique_tracking_codes() {
        let repository = InMemoryJobRepository::default();
        let request = print_dispatch::workflows::fulfillment::PrintRequest {
            customer_id: "cust".to_string(),
            document: print_dispatch::workflows::fulfillment::DocumentRef {
                storage_key: "k".to_string(),
                file_name: "f.pdf".to_string(),
            },
            page_count: 1,
            paper_size: PaperSize::A4,
            color: false,
            duplex: false,
            copies: 1,
            customer_location: DEFAULT_CENTER,
            preferred_vendor: None,
        };
        let code = TrackingCode("ABCD2345".to_string());
        let now = chrono::Utc::now();

        repository
            .insert(Job::new(request.clone(), code.clone(), now))
            .expect("first insert");
        assert!(matches!(
            repository.insert(Job::new(request, code.clone(), now)),
            Err(RepositoryError::Conflict)
        ));
        assert!(repository.exists_by_tracking_code(&code).expect("lookup"));
    }
}
