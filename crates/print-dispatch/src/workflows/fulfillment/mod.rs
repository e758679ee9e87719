//! Print job fulfillment: vendor matching, pricing and the job lifecycle from
//! upload to pickup.

pub mod directory;
pub mod domain;
pub mod geo;
pub mod intake;
pub mod lifecycle;
pub mod matching;
pub mod pricing;
pub mod repository;
pub mod router;
pub mod scheduler;
mod service;
pub mod tracking;

#[cfg(test)]
mod tests;

pub use domain::{
    Assignment, AssignmentSource, Coordinates, DocumentRef, Job, JobId, JobStatus,
    JobStatusView, PaperSize, PendingDeadline, PrintRequest, PrintRequirements, QuoteRequest,
    TrackingCode, Vendor, VendorCapabilities, VendorId, VendorRates,
};
pub use directory::CsvVendorDirectory;
pub use intake::ValidationError;
pub use lifecycle::{JobAction, PrintTimeModel};
pub use matching::{MatchingConfig, VendorMatch, VendorMatcher};
pub use repository::{
    DirectoryError, JobRepository, NotificationError, NotificationGateway, RepositoryError,
    VendorDirectory,
};
pub use router::{fulfillment_router, VENDOR_HEADER};
pub use scheduler::{DeadlineKind, FiredDeadline, TimeoutScheduler};
pub use service::{AccessError, DispatchError, FulfillmentService};
pub use tracking::{RandomTrackingCodes, TrackingCodeSource};
