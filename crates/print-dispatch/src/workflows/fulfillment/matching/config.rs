use serde::{Deserialize, Serialize};

/// Ranking dials. The weights mix kilometers and currency on purpose and are
/// tuned, not normalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchingConfig {
    pub max_distance_km: f64,
    pub distance_weight: f64,
    pub price_weight: f64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            max_distance_km: 20.0,
            distance_weight: 0.7,
            price_weight: 0.3,
        }
    }
}
