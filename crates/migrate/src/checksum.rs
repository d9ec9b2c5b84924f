//! SHA-256 fingerprint of a migration's SQL.
//!
//! The digest is written to the tracking table when a migration is applied.
//! It is audit metadata only: nothing compares it against the files later.

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of `up_sql` followed by `down_sql`
pub fn checksum(up_sql: &str, down_sql: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(up_sql.as_bytes());
    hasher.update(down_sql.as_bytes());
    hex::encode(hasher.finalize())
}
