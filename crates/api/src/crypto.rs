//! Random credential generation.
//!
//! Uses the OS entropy source via `getrandom` — secret codes double as an
//! authentication credential for the non-OAuth login path, so a
//! non-cryptographic generator is not acceptable here.

use crate::ServiceError;

/// Entropy per secret code, in bytes (128 bits → 32 hex chars).
const SECRET_CODE_LEN: usize = 16;

/// Prefix identifying TeamDock secret codes.
pub const SECRET_CODE_PREFIX: &str = "td_";

/// Generate a bootstrap secret code for a new profile.
pub fn generate_secret_code() -> Result<String, ServiceError> {
    let mut bytes = [0u8; SECRET_CODE_LEN];
    getrandom::getrandom(&mut bytes)
        .map_err(|e| ServiceError::Internal(format!("RNG failure: {e}")))?;
    Ok(format!("{SECRET_CODE_PREFIX}{}", hex::encode(bytes)))
}
