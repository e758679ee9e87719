mod config;

pub use config::MatchingConfig;

use std::cmp::Ordering;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::domain::{PrintRequirements, Vendor, VendorId};
use super::geo::haversine_km;
use super::pricing::{self, PriceQuote};

/// A ranked candidate. Recomputed on every pass, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VendorMatch {
    pub vendor_id: VendorId,
    pub vendor_name: String,
    pub distance_km: f64,
    pub unit_price: Decimal,
    pub total_price: Decimal,
    pub score: f64,
}

/// Why a customer-selected vendor cannot take a job.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MatchRejection {
    #[error("vendor {0} cannot print this paper size or color mode")]
    Incapable(VendorId),
    #[error("vendor {0} has no rate for the requested category")]
    NoRate(VendorId),
}

/// Stateless ranker applying the matching configuration to a vendor pool.
#[derive(Debug, Clone, Default)]
pub struct VendorMatcher {
    config: MatchingConfig,
}

impl VendorMatcher {
    pub fn new(config: MatchingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MatchingConfig {
        &self.config
    }

    /// Rank every eligible vendor, best (lowest score) first.
    pub fn rank(
        &self,
        requirements: &PrintRequirements,
        candidates: &[Vendor],
        excluded: &[VendorId],
    ) -> Vec<VendorMatch> {
        let mut matches: Vec<VendorMatch> = candidates
            .iter()
            .filter(|vendor| vendor.is_available())
            .filter(|vendor| !excluded.contains(&vendor.id))
            .filter(|vendor| is_capable(vendor, requirements))
            .filter_map(|vendor| {
                let distance_km = haversine_km(requirements.location, vendor.location);
                if distance_km > self.config.max_distance_km {
                    return None;
                }
                let price = price_for(vendor, requirements)?;
                Some(self.build_match(vendor, distance_km, price))
            })
            .collect();

        matches.sort_by(compare_matches);
        matches
    }

    /// Convenience for callers that only want the head of the ranking.
    pub fn best(
        &self,
        requirements: &PrintRequirements,
        candidates: &[Vendor],
        excluded: &[VendorId],
    ) -> Option<VendorMatch> {
        self.rank(requirements, candidates, excluded)
            .into_iter()
            .next()
    }

    /// Check a vendor the customer picked by hand.
    ///
    /// Only capability and price apply; distance is reported for display and
    /// the radius is not enforced.
    pub fn evaluate_selected(
        &self,
        requirements: &PrintRequirements,
        vendor: &Vendor,
    ) -> Result<VendorMatch, MatchRejection> {
        if !is_capable(vendor, requirements) {
            return Err(MatchRejection::Incapable(vendor.id.clone()));
        }
        let price = price_for(vendor, requirements)
            .ok_or_else(|| MatchRejection::NoRate(vendor.id.clone()))?;
        let distance_km = haversine_km(requirements.location, vendor.location);
        Ok(self.build_match(vendor, distance_km, price))
    }

    fn build_match(&self, vendor: &Vendor, distance_km: f64, price: PriceQuote) -> VendorMatch {
        VendorMatch {
            vendor_id: vendor.id.clone(),
            vendor_name: vendor.name.clone(),
            distance_km,
            unit_price: price.unit_price,
            total_price: price.total_price,
            score: self.score(distance_km, price.total_price),
        }
    }

    /// Composite score, lower is better.
    pub fn score(&self, distance_km: f64, total_price: Decimal) -> f64 {
        let price = total_price.to_f64().unwrap_or(f64::MAX);
        self.config.distance_weight * distance_km + self.config.price_weight * price
    }
}

fn is_capable(vendor: &Vendor, requirements: &PrintRequirements) -> bool {
    match &vendor.capabilities {
        Some(capabilities) => capabilities.supports(requirements),
        None => true,
    }
}

fn price_for(vendor: &Vendor, requirements: &PrintRequirements) -> Option<PriceQuote> {
    pricing::quote(
        &vendor.rates,
        requirements.color,
        requirements.duplex,
        requirements.page_count,
        requirements.copies,
    )
}

fn compare_matches(a: &VendorMatch, b: &VendorMatch) -> Ordering {
    a.score
        .total_cmp(&b.score)
        .then_with(|| a.distance_km.total_cmp(&b.distance_km))
        .then_with(|| a.vendor_id.cmp(&b.vendor_id))
}
