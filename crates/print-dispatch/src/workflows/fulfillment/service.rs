use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::domain::{
    Assignment, AssignmentSource, Job, JobId, JobStatus, PendingDeadline, PrintRequest,
    QuoteRequest, TrackingCode, VendorId,
};
use super::intake::{validate_print_request, validate_quote_request, ValidationError};
use super::lifecycle::{JobAction, PrintTimeModel};
use super::matching::{VendorMatch, VendorMatcher};
use super::repository::{
    DirectoryError, JobRepository, NotificationGateway, RepositoryError, VendorDirectory,
};
use super::scheduler::{DeadlineKind, FiredDeadline, TimeoutScheduler};
use super::tracking::{RandomTrackingCodes, TrackingCodeSource};
use crate::config::DispatchConfig;

/// Drives print jobs from upload to pickup.
///
/// Every mutation of a job, whether triggered by a customer, a vendor or an
/// elapsed deadline, runs under that job's lock and persists before any timer
/// or notification side effect happens.
///
/// Methods are synchronous and may block on the job lock and the repository.
/// Async callers should go through `spawn_blocking`. Elapsed deadlines are
/// applied inline on the runtime worker that fired them, which assumes the
/// repository and notifier return quickly.
pub struct FulfillmentService<J, V, N> {
    this: Weak<Self>,
    jobs: Arc<J>,
    vendors: Arc<V>,
    notifier: Arc<N>,
    scheduler: TimeoutScheduler,
    matcher: VendorMatcher,
    print_time: PrintTimeModel,
    config: DispatchConfig,
    codes: Arc<dyn TrackingCodeSource>,
    locks: DashMap<JobId, Arc<Mutex<()>>>,
}

enum MatchOutcome {
    Offer(VendorMatch, AssignmentSource),
    Exhausted(String),
}

impl<J, V, N> FulfillmentService<J, V, N>
where
    J: JobRepository + 'static,
    V: VendorDirectory + 'static,
    N: NotificationGateway + 'static,
{
    pub fn new(
        jobs: Arc<J>,
        vendors: Arc<V>,
        notifier: Arc<N>,
        scheduler: TimeoutScheduler,
        config: DispatchConfig,
    ) -> Arc<Self> {
        Self::with_tracking_codes(
            jobs,
            vendors,
            notifier,
            scheduler,
            config,
            Arc::new(RandomTrackingCodes),
        )
    }

    pub fn with_tracking_codes(
        jobs: Arc<J>,
        vendors: Arc<V>,
        notifier: Arc<N>,
        scheduler: TimeoutScheduler,
        config: DispatchConfig,
        codes: Arc<dyn TrackingCodeSource>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            jobs,
            vendors,
            notifier,
            scheduler,
            matcher: VendorMatcher::new(config.matching.clone()),
            print_time: PrintTimeModel::default(),
            config,
            codes,
            locks: DashMap::new(),
        })
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &TimeoutScheduler {
        &self.scheduler
    }

    /// Validate and store a new job, then try to place it with a vendor.
    ///
    /// The returned job is either awaiting a vendor decision or parked in
    /// `NoVendorsAvailable`; both are successful outcomes.
    pub fn create_job(&self, request: PrintRequest) -> Result<Job, DispatchError> {
        validate_print_request(&request)?;
        if let Some(vendor_id) = &request.preferred_vendor {
            if self.vendors.find_by_id(vendor_id)?.is_none() {
                return Err(ValidationError::UnknownVendor(vendor_id.clone()).into());
            }
        }

        let job = self.insert_with_unique_code(request)?;
        info!(
            job_id = %job.id,
            tracking_code = %job.tracking_code,
            pages = job.page_count,
            copies = job.copies,
            "print job created"
        );

        let job_id = job.id;
        self.with_job_lock(&job_id, || self.run_match(job))
    }

    /// Rank nearby vendors for a prospective job without persisting anything.
    pub fn get_quote(&self, request: &QuoteRequest) -> Result<Vec<VendorMatch>, DispatchError> {
        validate_quote_request(request)?;
        let candidates = self.vendors.list_all()?;
        Ok(self.matcher.rank(&request.requirements(), &candidates, &[]))
    }

    pub fn get_job(&self, job_id: &JobId) -> Result<Job, DispatchError> {
        self.jobs
            .load(job_id)?
            .ok_or(DispatchError::JobNotFound(*job_id))
    }

    pub fn track(&self, code: &TrackingCode) -> Result<Job, DispatchError> {
        self.jobs
            .find_by_tracking_code(code)?
            .ok_or_else(|| DispatchError::TrackingCodeNotFound(code.clone()))
    }

    /// Offers currently waiting on `vendor_id`.
    pub fn pending_for_vendor(&self, vendor_id: &VendorId) -> Result<Vec<Job>, DispatchError> {
        Ok(self.jobs.find_pending_for_vendor(vendor_id)?)
    }

    pub fn accept_job(&self, job_id: &JobId, vendor_id: &VendorId) -> Result<Job, DispatchError> {
        self.with_vendor_job(job_id, vendor_id, JobAction::Accept, |job| {
            let mut next = job;
            next.status = JobStatus::Accepted;
            next.pending_deadline = None;
            next.timeline.accepted_at = Some(Utc::now());

            let saved = self.jobs.save(next)?;
            self.scheduler.cancel(&saved.id);
            info!(job_id = %saved.id, vendor_id = %vendor_id, "vendor accepted job");
            self.notify_status(&saved, "Your print shop accepted the job.");
            Ok(saved)
        })
    }

    /// Decline an offer. The vendor is excluded from this job and matching
    /// runs again right away.
    pub fn reject_job(&self, job_id: &JobId, vendor_id: &VendorId) -> Result<Job, DispatchError> {
        self.with_vendor_job(job_id, vendor_id, JobAction::Reject, |job| {
            let mut next = job;
            next.status = JobStatus::VendorRejected;
            next.exclude(vendor_id.clone());
            next.assignment = None;
            next.pending_deadline = None;

            let saved = self.jobs.save(next)?;
            self.scheduler.cancel(&saved.id);
            info!(job_id = %saved.id, vendor_id = %vendor_id, "vendor rejected job");
            self.notify_status(
                &saved,
                "The print shop declined your job. Looking for another one nearby.",
            );
            self.run_match(saved)
        })
    }

    pub fn start_printing(
        &self,
        job_id: &JobId,
        vendor_id: &VendorId,
    ) -> Result<Job, DispatchError> {
        self.with_vendor_job(job_id, vendor_id, JobAction::StartPrinting, |job| {
            let now = Utc::now();
            let estimate = self
                .print_time
                .estimate(job.page_count, job.copies, job.color);
            let ready_at = due_after(now, estimate);

            let mut next = job;
            next.status = JobStatus::Printing;
            next.timeline.printing_started_at = Some(now);
            next.estimated_ready_at = Some(ready_at);
            next.pending_deadline = Some(PendingDeadline::new(
                DeadlineKind::PrintingEstimate,
                vendor_id.clone(),
                ready_at,
            ));

            let saved = self.jobs.save(next)?;
            self.arm(&saved, estimate);
            info!(
                job_id = %saved.id,
                vendor_id = %vendor_id,
                estimate_secs = estimate.as_secs(),
                "printing started"
            );
            self.notify_status(
                &saved,
                &format!(
                    "Your job is printing. Estimated ready at {}.",
                    ready_at.format("%H:%M UTC")
                ),
            );
            Ok(saved)
        })
    }

    pub fn mark_ready(&self, job_id: &JobId, vendor_id: &VendorId) -> Result<Job, DispatchError> {
        self.with_vendor_job(job_id, vendor_id, JobAction::MarkReady, |job| {
            self.enter_ready(job)
        })
    }

    pub fn complete_job(&self, job_id: &JobId, vendor_id: &VendorId) -> Result<Job, DispatchError> {
        self.with_vendor_job(job_id, vendor_id, JobAction::Complete, |job| {
            self.enter_completed(job)
        })
    }

    /// Run matching again for a job parked in a recovery status.
    pub fn retry_matching(&self, job_id: &JobId) -> Result<Job, DispatchError> {
        self.with_job_lock(job_id, || {
            let job = self.get_job(job_id)?;
            ensure_permitted(&job, JobAction::Match)?;
            info!(job_id = %job.id, status = %job.status, "retrying vendor matching");
            self.run_match(job)
        })
    }

    /// Re-arm timers for every stored job that still carries a deadline.
    /// Deadlines already in the past fire immediately.
    pub fn resume_deadlines(&self) -> Result<usize, DispatchError> {
        let now = Utc::now();
        let pending = self.jobs.with_pending_deadline()?;
        let mut resumed = 0;
        for job in pending {
            let Some(deadline) = &job.pending_deadline else {
                continue;
            };
            let delay = (deadline.due_at - now).to_std().unwrap_or(Duration::ZERO);
            self.arm(&job, delay);
            resumed += 1;
        }
        if resumed > 0 {
            info!(resumed, "restored pending deadlines");
        }
        Ok(resumed)
    }

    /// Apply an elapsed deadline armed for the recorded deadline `deadline_id`.
    /// Anything the job record no longer carries is ignored, so duplicate or
    /// late firings are harmless.
    pub fn handle_deadline(&self, fired: FiredDeadline, deadline_id: Uuid) {
        self.with_job_lock(&fired.job_id, || {
            if let Err(err) = self.apply_deadline(fired, deadline_id) {
                error!(
                    job_id = %fired.job_id,
                    deadline = %fired.kind,
                    error = %err,
                    "failed to apply elapsed deadline"
                );
            }
        })
    }

    fn apply_deadline(
        &self,
        fired: FiredDeadline,
        deadline_id: Uuid,
    ) -> Result<(), DispatchError> {
        let Some(job) = self.jobs.load(&fired.job_id)? else {
            debug!(job_id = %fired.job_id, deadline = %fired.kind, "deadline for unknown job");
            return Ok(());
        };

        let current = job
            .pending_deadline
            .as_ref()
            .filter(|pending| pending.id == deadline_id && pending.kind == fired.kind)
            .filter(|pending| job.vendor_id() == Some(&pending.vendor_id));
        if current.is_none() {
            debug!(
                job_id = %job.id,
                status = %job.status,
                deadline = %fired.kind,
                "stale deadline ignored"
            );
            return Ok(());
        }

        match (fired.kind, job.status) {
            (DeadlineKind::DecisionWindow, JobStatus::AwaitingAcceptance) => {
                self.expire_offer(job)?;
            }
            (DeadlineKind::PrintingEstimate, JobStatus::Printing) => {
                self.enter_ready(job)?;
            }
            (DeadlineKind::PickupWindow, JobStatus::Ready) => {
                self.enter_completed(job)?;
            }
            (kind, status) => {
                debug!(job_id = %job.id, %status, deadline = %kind, "deadline does not apply");
            }
        }
        Ok(())
    }

    fn expire_offer(&self, job: Job) -> Result<Job, DispatchError> {
        let Some(vendor_id) = job.vendor_id().cloned() else {
            error!(job_id = %job.id, status = %job.status, "offer expired without a vendor");
            return Ok(job);
        };
        let manual = job.is_manual_assignment();

        let mut next = job;
        next.status = JobStatus::VendorTimeout;
        next.exclude(vendor_id.clone());
        next.assignment = None;
        next.pending_deadline = None;

        let saved = self.jobs.save(next)?;
        info!(job_id = %saved.id, vendor_id = %vendor_id, manual, "vendor decision window expired");
        if let Err(err) = self.notifier.rescind_offer(&vendor_id, &saved.id) {
            warn!(job_id = %saved.id, vendor_id = %vendor_id, error = %err, "failed to rescind offer");
        }

        if manual {
            self.notify_status(
                &saved,
                "The print shop you selected did not respond in time. Pick another shop or retry matching.",
            );
            return Ok(saved);
        }

        self.notify_status(
            &saved,
            "The print shop did not respond in time. Looking for another one nearby.",
        );
        self.run_match(saved)
    }

    fn enter_ready(&self, job: Job) -> Result<Job, DispatchError> {
        let Some(vendor_id) = job.vendor_id().cloned() else {
            return Err(AccessError::NoVendorAssigned(job.id).into());
        };
        let now = Utc::now();
        let window = self.config.pickup_window;
        let pickup_by = due_after(now, window);

        let mut next = job;
        next.status = JobStatus::Ready;
        next.timeline.ready_at = Some(now);
        next.pending_deadline = Some(PendingDeadline::new(
            DeadlineKind::PickupWindow,
            vendor_id.clone(),
            pickup_by,
        ));

        let saved = self.jobs.save(next)?;
        self.scheduler.cancel(&saved.id);
        self.arm(&saved, window);
        info!(job_id = %saved.id, vendor_id = %vendor_id, "job ready for pickup");

        let shop = saved
            .assignment
            .as_ref()
            .map(|assignment| assignment.vendor_name.as_str())
            .unwrap_or("your print shop");
        self.notify_status(
            &saved,
            &format!(
                "Your job is ready for pickup at {shop}. Please collect it by {}.",
                pickup_by.format("%Y-%m-%d %H:%M UTC")
            ),
        );
        Ok(saved)
    }

    fn enter_completed(&self, job: Job) -> Result<Job, DispatchError> {
        let mut next = job;
        next.status = JobStatus::Completed;
        next.pending_deadline = None;
        next.timeline.completed_at = Some(Utc::now());

        let saved = self.jobs.save(next)?;
        self.scheduler.cancel(&saved.id);
        info!(job_id = %saved.id, "job completed");
        self.notify_status(&saved, "Your job is complete. Thank you!");
        Ok(saved)
    }

    /// Caller holds the job lock and the job is in a status that permits matching.
    fn run_match(&self, job: Job) -> Result<Job, DispatchError> {
        match self.find_vendor(&job)? {
            MatchOutcome::Offer(found, source) => self.offer(job, found, source),
            MatchOutcome::Exhausted(reason) => self.park_unmatched(job, &reason),
        }
    }

    fn find_vendor(&self, job: &Job) -> Result<MatchOutcome, DispatchError> {
        let requirements = job.requirements();

        let preferred = job
            .preferred_vendor
            .as_ref()
            .filter(|vendor_id| !job.excluded_vendors.contains(vendor_id));
        if let Some(vendor_id) = preferred {
            let outcome = match self.vendors.find_by_id(vendor_id)? {
                Some(vendor) => match self.matcher.evaluate_selected(&requirements, &vendor) {
                    Ok(found) => MatchOutcome::Offer(found, AssignmentSource::Manual),
                    Err(rejection) => {
                        debug!(job_id = %job.id, %rejection, "selected vendor cannot take job");
                        MatchOutcome::Exhausted(
                            "The print shop you selected cannot print this job. Pick another shop."
                                .to_string(),
                        )
                    }
                },
                None => MatchOutcome::Exhausted(
                    "The print shop you selected is no longer available.".to_string(),
                ),
            };
            return Ok(outcome);
        }

        let candidates = self.vendors.list_all()?;
        let outcome = match self
            .matcher
            .best(&requirements, &candidates, &job.excluded_vendors)
        {
            Some(found) => MatchOutcome::Offer(found, AssignmentSource::Ranked),
            None => MatchOutcome::Exhausted(
                "No print shop nearby can take this job right now. Try again later.".to_string(),
            ),
        };
        Ok(outcome)
    }

    fn offer(
        &self,
        job: Job,
        found: VendorMatch,
        source: AssignmentSource,
    ) -> Result<Job, DispatchError> {
        let now = Utc::now();
        let window = self.config.decision_window;

        let mut next = job;
        next.status = JobStatus::AwaitingAcceptance;
        next.timeline.matched_at = Some(now);
        next.pending_deadline = Some(PendingDeadline::new(
            DeadlineKind::DecisionWindow,
            found.vendor_id.clone(),
            due_after(now, window),
        ));
        next.assignment = Some(Assignment {
            vendor_id: found.vendor_id,
            vendor_name: found.vendor_name,
            source,
            distance_km: found.distance_km,
            unit_price: found.unit_price,
            total_price: found.total_price,
        });

        let saved = self.jobs.save(next)?;
        self.arm(&saved, window);

        if let Some(assignment) = &saved.assignment {
            info!(
                job_id = %saved.id,
                vendor_id = %assignment.vendor_id,
                source = ?assignment.source,
                distance_km = assignment.distance_km,
                total_price = %assignment.total_price,
                "job offered to vendor"
            );
            if let Err(err) = self.notifier.offer_job_to_vendor(&assignment.vendor_id, &saved) {
                warn!(
                    job_id = %saved.id,
                    vendor_id = %assignment.vendor_id,
                    error = %err,
                    "failed to notify vendor of offer"
                );
            }
        }
        Ok(saved)
    }

    fn park_unmatched(&self, job: Job, reason: &str) -> Result<Job, DispatchError> {
        let mut next = job;
        next.status = JobStatus::NoVendorsAvailable;
        next.assignment = None;
        next.pending_deadline = None;

        let saved = self.jobs.save(next)?;
        info!(
            job_id = %saved.id,
            excluded = saved.excluded_vendors.len(),
            "no vendor available for job"
        );
        self.notify_status(&saved, reason);
        Ok(saved)
    }

    fn with_vendor_job<F>(
        &self,
        job_id: &JobId,
        vendor_id: &VendorId,
        action: JobAction,
        apply: F,
    ) -> Result<Job, DispatchError>
    where
        F: FnOnce(Job) -> Result<Job, DispatchError>,
    {
        self.with_job_lock(job_id, || {
            let job = self.get_job(job_id)?;
            verify_assignment(&job, vendor_id)?;
            ensure_permitted(&job, action)?;
            apply(job)
        })
    }

    /// Arm a timer for the deadline recorded on `job`, if there is one.
    fn arm(&self, job: &Job, delay: Duration) {
        let Some(deadline) = &job.pending_deadline else {
            return;
        };
        let (job_id, kind, deadline_id) = (job.id, deadline.kind, deadline.id);
        let service = self.this.clone();
        let armed = self.scheduler.arm(job_id, kind, delay, move |fired| {
            if let Some(service) = service.upgrade() {
                service.handle_deadline(fired, deadline_id);
            }
        });
        match armed.replaced {
            Some(previous) if previous != kind => warn!(
                %job_id,
                replaced = %previous,
                deadline = %kind,
                "armed deadline displaced a different pending deadline"
            ),
            Some(_) => debug!(%job_id, deadline = %kind, "deadline re-armed"),
            None => debug!(%job_id, deadline = %kind, delay_secs = delay.as_secs(), "deadline armed"),
        }
    }

    fn insert_with_unique_code(&self, request: PrintRequest) -> Result<Job, DispatchError> {
        let attempts = self.config.tracking_code_attempts;
        for attempt in 1..=attempts {
            let code = self.codes.next_code();
            if self.jobs.exists_by_tracking_code(&code)? {
                debug!(attempt, tracking_code = %code, "tracking code collision");
                continue;
            }
            match self.jobs.insert(Job::new(request.clone(), code, Utc::now())) {
                Ok(job) => return Ok(job),
                Err(RepositoryError::Conflict) => {
                    debug!(attempt, "tracking code claimed concurrently");
                }
                Err(err) => return Err(err.into()),
            }
        }
        warn!(attempts, "could not allocate a unique tracking code");
        Err(DispatchError::TrackingCodesExhausted(attempts))
    }

    fn notify_status(&self, job: &Job, message: &str) {
        if let Err(err) = self.notifier.status_changed(job, job.status, message) {
            warn!(job_id = %job.id, status = %job.status, error = %err, "customer notification failed");
        }
    }

    /// Run `work` under the job's lock. The lock entry is dropped again once
    /// nobody else holds or waits on it, so the table only tracks jobs that are
    /// being worked on.
    fn with_job_lock<T>(&self, job_id: &JobId, work: impl FnOnce() -> T) -> T {
        let lock = Arc::clone(self.locks.entry(*job_id).or_default().value());
        let outcome = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            work()
        };
        drop(lock);
        self.locks.remove_if(job_id, |_, lock| Arc::strong_count(lock) == 1);
        outcome
    }

    #[cfg(test)]
    pub(crate) fn tracked_locks(&self) -> usize {
        self.locks.len()
    }
}

fn verify_assignment(job: &Job, vendor_id: &VendorId) -> Result<(), AccessError> {
    match job.vendor_id() {
        Some(assigned) if assigned == vendor_id => Ok(()),
        Some(_) => Err(AccessError::NotAssigned {
            job_id: job.id,
            vendor_id: vendor_id.clone(),
        }),
        None => {
            if job.status.requires_vendor() {
                error!(job_id = %job.id, status = %job.status, "job has no vendor in a status that requires one");
            }
            Err(AccessError::NoVendorAssigned(job.id))
        }
    }
}

fn ensure_permitted(job: &Job, action: JobAction) -> Result<(), DispatchError> {
    if action.permitted_from(job.status) {
        Ok(())
    } else {
        Err(DispatchError::IllegalTransition {
            job_id: job.id,
            status: job.status,
            action,
        })
    }
}

fn due_after(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Vendor-scoped operation attempted by a vendor that does not hold the job.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccessError {
    #[error("job {job_id} is not assigned to vendor {vendor_id}")]
    NotAssigned { job_id: JobId, vendor_id: VendorId },
    #[error("job {0} has no vendor assigned")]
    NoVendorAssigned(JobId),
}

/// Error raised by the fulfillment service.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("job {0} not found")]
    JobNotFound(JobId),
    #[error("no job with tracking code {0}")]
    TrackingCodeNotFound(TrackingCode),
    #[error(transparent)]
    Access(#[from] AccessError),
    #[error("cannot {action} job {job_id} while it is {status}")]
    IllegalTransition {
        job_id: JobId,
        status: JobStatus,
        action: JobAction,
    },
    #[error("could not allocate a unique tracking code after {0} attempts")]
    TrackingCodesExhausted(u8),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
}
