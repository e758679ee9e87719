use rand::Rng;

use super::domain::TrackingCode;

/// Upper-case alphanumerics without the look-alikes 0/O and 1/I.
const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const TRACKING_CODE_LENGTH: usize = 8;

/// Source of candidate tracking codes. Uniqueness is checked by the caller.
pub trait TrackingCodeSource: Send + Sync {
    fn next_code(&self) -> TrackingCode;
}

/// Default source drawing from the thread-local RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomTrackingCodes;

impl TrackingCodeSource for RandomTrackingCodes {
    fn next_code(&self) -> TrackingCode {
        let mut rng = rand::thread_rng();
        let code: String = (0..TRACKING_CODE_LENGTH)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect();
        TrackingCode(code)
    }
}
