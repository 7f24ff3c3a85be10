//! Validation utilities for recommendation requests

use crate::types::RecommendationKey;

/// Longest horizon the forecasting model produces
pub const MAX_HORIZON_DAYS: u32 = 180;

/// Validate reservoir id format (1-32 characters, alphanumeric, '-' or '_')
pub fn validate_reservoir_id(id: &str) -> Result<(), &'static str> {
    if id.is_empty() {
        return Err("Reservoir id is required");
    }
    if id.len() > 32 {
        return Err("Reservoir id must be at most 32 characters");
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err("Reservoir id must be alphanumeric");
    }
    Ok(())
}

/// Validate forecast horizon (1-180 days)
pub fn validate_horizon(days: u32) -> Result<(), &'static str> {
    if days == 0 {
        return Err("Horizon must be at least 1 day");
    }
    if days > MAX_HORIZON_DAYS {
        return Err("Horizon must be at most 180 days");
    }
    Ok(())
}

/// Validate a full recommendation key, naming the offending field
pub fn validate_key(key: &RecommendationKey) -> Result<(), (&'static str, &'static str)> {
    validate_reservoir_id(&key.reservoir_id).map_err(|e| ("reservoir_id", e))?;
    validate_horizon(key.horizon_days).map_err(|e| ("horizon_days", e))?;
    Ok(())
}
