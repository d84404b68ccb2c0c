//! One-time passcodes for email verification and password reset.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;

/// Lowest code that can be issued.
pub const OTP_MIN: u32 = 10_000;
/// Highest code that can be issued.
pub const OTP_MAX: u32 = 99_999;
/// Default lifetime of an issued code, in seconds.
pub const DEFAULT_OTP_TTL_SECS: u64 = 600;

/// A five-digit numeric passcode.
#[derive(Clone, PartialEq, Eq)]
pub struct OtpCode(String);

impl OtpCode {
    /// Draws a fresh code uniformly from `10000..=99999`.
    #[must_use]
    pub fn generate() -> Self {
        let value = rand::thread_rng().gen_range(OTP_MIN..=OTP_MAX);
        Self(value.to_string())
    }

    /// Returns the code digits.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the code as an owned string for storage.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

// Codes are credentials; keep them out of debug logs.
impl fmt::Debug for OtpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("OtpCode([REDACTED])")
    }
}

/// Computes the expiry instant for a code issued at `issued_at`.
///
/// Lifetimes that overflow the calendar saturate to the far future.
#[must_use]
pub fn expiry_from(issued_at: DateTime<Utc>, ttl_secs: u64) -> DateTime<Utc> {
    let ttl = i64::try_from(ttl_secs)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX);
    issued_at
        .checked_add_signed(ttl)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
