//! Enrichment cost model.
//!
//! Providers bill per SERP page of ten results, so cost is tiered by depth.

use serde::{Deserialize, Serialize};

const RESULTS_PER_PAGE: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostModel {
    /// Price of one result page, in millionths of the billing currency.
    pub price_per_page_micros: u64,
}

impl Default for CostModel {
    fn default() -> Self {
        Self {
            price_per_page_micros: 600,
        }
    }
}

/// Cost computed before dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostEstimate {
    pub items: usize,
    pub per_item_micros: u64,
    pub total_micros: u64,
}

impl CostModel {
    pub fn new(price_per_page_micros: u64) -> Self {
        Self {
            price_per_page_micros,
        }
    }

    /// Cost of one dispatched item at `depth`. Depth 0 still bills one page.
    pub fn item_cost(&self, depth: u32) -> u64 {
        let pages = depth.div_ceil(RESULTS_PER_PAGE).max(1);
        self.price_per_page_micros.saturating_mul(u64::from(pages))
    }

    pub fn estimate(&self, items: usize, depth: u32) -> CostEstimate {
        let per_item_micros = self.item_cost(depth);
        CostEstimate {
            items,
            per_item_micros,
            total_micros: per_item_micros.saturating_mul(items as u64),
        }
    }
}

/// Renders micros as a currency amount with six decimals.
pub fn format_micros(micros: u64) -> String {
    format!("{}.{:06}", micros / 1_000_000, micros % 1_000_000)
}
