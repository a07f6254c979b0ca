//! Shared business rules — framework-agnostic pure functions.
//!
//! Route handlers stay thin adapters over these.

use crate::ServiceError;

// ─── Validation ─────────────────────────────────────────────────────────────

/// Validate and normalize a profile username. Returns the trimmed name.
pub fn validate_username(username: &str) -> Result<String, ServiceError> {
    let trimmed = username.trim().to_string();
    if trimmed.is_empty() || trimmed.len() > 32 {
        return Err(ServiceError::BadRequest(
            "username must be 1-32 characters".into(),
        ));
    }
    Ok(trimmed)
}

/// Validate and normalize a team name. Returns the trimmed name.
pub fn validate_team_name(name: &str) -> Result<String, ServiceError> {
    let trimmed = name.trim().to_string();
    if trimmed.is_empty() || trimmed.len() > 64 {
        return Err(ServiceError::BadRequest(
            "team name must be 1-64 characters".into(),
        ));
    }
    Ok(trimmed)
}

/// Default team capacity.
pub const DEFAULT_TEAM_SIZE: i64 = 4;

/// Largest allowed team capacity.
pub const MAX_TEAM_SIZE: i64 = 10;

/// Resolve a requested team capacity. Defaults to 4, clamped to [1, 10].
pub fn clamp_max_members(requested: Option<u32>) -> i64 {
    match requested {
        None => DEFAULT_TEAM_SIZE,
        Some(n) => i64::from(n).clamp(1, MAX_TEAM_SIZE),
    }
}

// ─── Presence ───────────────────────────────────────────────────────────────

/// A profile counts as "active" if it heartbeat within this window.
pub const PRESENCE_WINDOW_MINUTES: i64 = 5;

/// Current UTC time in the SQLite `datetime` format used across the schema.
pub fn now_sqlite() -> String {
    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Lower bound of the presence window, in SQLite `datetime` format.
pub fn presence_cutoff() -> String {
    (chrono::Utc::now() - chrono::Duration::minutes(PRESENCE_WINDOW_MINUTES))
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_username() {
        assert!(validate_username("nova").is_ok());
        assert_eq!(validate_username("  nova  ").unwrap(), "nova");
        assert!(validate_username("").is_err());
        assert!(validate_username("   ").is_err());
        assert!(validate_username(&"x".repeat(33)).is_err());
        assert!(validate_username(&"x".repeat(32)).is_ok());
    }

    #[test]
    fn test_validate_team_name() {
        assert!(validate_team_name("rust rovers").is_ok());
        assert!(validate_team_name("").is_err());
        assert!(validate_team_name(&"x".repeat(65)).is_err());
    }

    #[test]
    fn test_clamp_max_members() {
        assert_eq!(clamp_max_members(None), 4);
        assert_eq!(clamp_max_members(Some(0)), 1);
        assert_eq!(clamp_max_members(Some(6)), 6);
        assert_eq!(clamp_max_members(Some(99)), 10);
    }

    #[test]
    fn presence_cutoff_precedes_now() {
        assert!(presence_cutoff() < now_sqlite());
    }
}
