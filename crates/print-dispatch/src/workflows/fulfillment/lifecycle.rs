use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::domain::JobStatus;

/// Events that move a job between statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobAction {
    Match,
    Accept,
    Reject,
    Timeout,
    StartPrinting,
    MarkReady,
    Complete,
}

impl JobAction {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Match => "match",
            Self::Accept => "accept",
            Self::Reject => "reject",
            Self::Timeout => "timeout",
            Self::StartPrinting => "start_printing",
            Self::MarkReady => "mark_ready",
            Self::Complete => "complete",
        }
    }

    /// Whether the action may be applied to a job in `status`.
    pub const fn permitted_from(self, status: JobStatus) -> bool {
        use JobStatus::*;
        match self {
            Self::Match => matches!(
                status,
                Uploaded | VendorRejected | VendorTimeout | NoVendorsAvailable
            ),
            Self::Accept | Self::Reject | Self::Timeout => matches!(status, AwaitingAcceptance),
            Self::StartPrinting => matches!(status, Accepted),
            Self::MarkReady => matches!(status, Accepted | Printing),
            Self::Complete => matches!(status, Ready),
        }
    }
}

impl fmt::Display for JobAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Heuristic for how long a vendor needs to print a job. Tunable, not a
/// physical model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrintTimeModel {
    pub base_minutes: u32,
    pub minutes_per_color_page: u32,
    pub pages_per_extra_minute: u32,
    pub minutes_per_extra_copy: u32,
    pub min_minutes: u32,
    pub max_minutes: u32,
}

impl Default for PrintTimeModel {
    fn default() -> Self {
        Self {
            base_minutes: 2,
            minutes_per_color_page: 1,
            pages_per_extra_minute: 5,
            minutes_per_extra_copy: 1,
            min_minutes: 1,
            max_minutes: 30,
        }
    }
}

impl PrintTimeModel {
    pub fn estimate_minutes(&self, page_count: u32, copies: u32, color: bool) -> u32 {
        let color_minutes = if color {
            page_count.saturating_mul(self.minutes_per_color_page)
        } else {
            0
        };
        let volume_minutes = match self.pages_per_extra_minute {
            0 => 0,
            step => page_count / step,
        };
        let copy_minutes = copies
            .saturating_sub(1)
            .saturating_mul(self.minutes_per_extra_copy);

        self.base_minutes
            .saturating_add(color_minutes)
            .saturating_add(volume_minutes)
            .saturating_add(copy_minutes)
            .clamp(self.min_minutes, self.max_minutes)
    }

    pub fn estimate(&self, page_count: u32, copies: u32, color: bool) -> Duration {
        Duration::from_secs(u64::from(self.estimate_minutes(page_count, copies, color)) * 60)
    }
}
