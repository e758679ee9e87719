use super::domain::{Job, JobId, JobStatus, TrackingCode, Vendor, VendorId};

/// Storage abstraction so the orchestrator can be exercised in isolation.
///
/// Implementations must offer read-after-write consistency for a single job.
pub trait JobRepository: Send + Sync {
    /// Persist a freshly created job. Fails with `Conflict` if the id or
    /// tracking code is taken.
    fn insert(&self, job: Job) -> Result<Job, RepositoryError>;
    fn save(&self, job: Job) -> Result<Job, RepositoryError>;
    fn load(&self, id: &JobId) -> Result<Option<Job>, RepositoryError>;
    fn exists_by_tracking_code(&self, code: &TrackingCode) -> Result<bool, RepositoryError>;
    fn find_by_tracking_code(&self, code: &TrackingCode) -> Result<Option<Job>, RepositoryError>;
    /// Jobs currently offered to `vendor` and waiting for a decision.
    fn find_pending_for_vendor(&self, vendor: &VendorId) -> Result<Vec<Job>, RepositoryError>;
    /// Jobs whose record carries an armed deadline, used to restore timers.
    fn with_pending_deadline(&self) -> Result<Vec<Job>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Read-only view of the vendor accounts.
pub trait VendorDirectory: Send + Sync {
    fn list_all(&self) -> Result<Vec<Vendor>, DirectoryError>;
    fn find_by_id(&self, id: &VendorId) -> Result<Option<Vendor>, DirectoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("vendor directory unavailable: {0}")]
    Unavailable(String),
    #[error("invalid vendor record: {0}")]
    InvalidRecord(String),
}

/// Outbound notification intents. Delivery is best-effort; the orchestrator
/// logs failures and moves on.
pub trait NotificationGateway: Send + Sync {
    fn offer_job_to_vendor(&self, vendor: &VendorId, job: &Job) -> Result<(), NotificationError>;
    fn rescind_offer(&self, vendor: &VendorId, job_id: &JobId) -> Result<(), NotificationError>;
    fn status_changed(
        &self,
        job: &Job,
        status: JobStatus,
        message: &str,
    ) -> Result<(), NotificationError>;
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}
