//! Housekeeping for the refresh token blacklist.

use crate::db::Database;
use crate::jwt::now_secs;
use tracing::{error, info};

/// Delete blacklist entries whose tokens have expired on their own.
///
/// An expired refresh token is rejected by signature validation already, so
/// its blacklist entry is dead weight. Returns the number of entries removed,
/// or None (after logging) on failure.
pub async fn flush_expired_tokens(db: &Database) -> Option<u64> {
    let now = match now_secs() {
        Ok(now) => now,
        Err(e) => {
            error!("Failed to read the clock: {}", e);
            return None;
        }
    };

    match db.blacklist().delete_expired(now).await {
        Ok(count) if count > 0 => {
            info!("Flushed {} expired blacklisted tokens", count);
            Some(count)
        }
        Ok(_) => {
            info!("No expired blacklisted tokens to flush");
            Some(0)
        }
        Err(e) => {
            error!("Failed to flush expired blacklisted tokens: {}", e);
            None
        }
    }
}
