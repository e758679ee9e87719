use super::domain::{Coordinates, PrintRequest, QuoteRequest, VendorId};

pub const MAX_COPIES: u32 = 100;

/// Validation errors raised before any job state exists.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("customer id is required")]
    MissingCustomer,
    #[error("document reference is missing a storage key")]
    MissingDocument,
    #[error("page count must be at least 1")]
    EmptyDocument,
    #[error("copies must be between 1 and {MAX_COPIES} (found {0})")]
    CopiesOutOfRange(u32),
    #[error("coordinates ({latitude}, {longitude}) are out of range")]
    InvalidCoordinates { latitude: f64, longitude: f64 },
    #[error("selected vendor {0} does not exist")]
    UnknownVendor(VendorId),
}

/// Check an inbound print request. The selected vendor, if any, is resolved
/// by the caller against the directory.
pub fn validate_print_request(request: &PrintRequest) -> Result<(), ValidationError> {
    if request.customer_id.trim().is_empty() {
        return Err(ValidationError::MissingCustomer);
    }
    if request.document.storage_key.trim().is_empty() {
        return Err(ValidationError::MissingDocument);
    }
    validate_print_shape(request.page_count, request.copies, request.customer_location)
}

pub fn validate_quote_request(request: &QuoteRequest) -> Result<(), ValidationError> {
    validate_print_shape(request.page_count, request.copies, request.customer_location)
}

fn validate_print_shape(
    page_count: u32,
    copies: u32,
    location: Coordinates,
) -> Result<(), ValidationError> {
    if page_count == 0 {
        return Err(ValidationError::EmptyDocument);
    }
    if !(1..=MAX_COPIES).contains(&copies) {
        return Err(ValidationError::CopiesOutOfRange(copies));
    }
    if !location.is_valid() {
        return Err(ValidationError::InvalidCoordinates {
            latitude: location.latitude,
            longitude: location.longitude,
        });
    }
    Ok(())
}
