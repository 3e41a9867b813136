//! Provider rate limits and source thresholds
//!
//! These are provider policy values that drift over time, so they live in
//! configuration rather than constants at the call sites.

use serde::{Deserialize, Serialize};

/// Provider rate limits and source thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Request weight the provider grants per rolling minute
    pub weight_limit_per_minute: u32,

    /// Static weight cost of one candle page request
    pub kline_request_weight: u32,

    /// Maximum candles per real-time API page
    pub rest_page_limit: u32,

    /// Age (hours past end-of-day) after which a day is expected in the bulk
    /// archive; younger segments go straight to the real-time API
    pub vision_delay_hours: u32,

    /// Cap on a single budget-denial sleep, in milliseconds
    pub budget_wait_cap_ms: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            weight_limit_per_minute: 1_200,
            kline_request_weight: 2,
            rest_page_limit: 1_000,
            vision_delay_hours: 40,
            budget_wait_cap_ms: 10_000,
        }
    }
}
