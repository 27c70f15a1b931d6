//! ID generation utilities for Cadence
//!
//! Provides functions for generating identifiers for series and queued jobs.

use rand::Rng;

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Generate a unique series ID
///
/// Format: `ser-{timestamp_ms}-{random_hex}`
/// Example: `ser-1738300800123-a1b2`
pub fn generate_series_id() -> String {
    let timestamp = now_ms();
    let random: u16 = rand::rng().random();
    format!("ser-{}-{:04x}", timestamp, random)
}

/// Generate a job ID for one queued invocation
///
/// Format: `job-{series_id}-{random_hex}`
pub fn generate_job_id(series_id: &str) -> String {
    let random: u32 = rand::rng().random();
    format!("job-{}-{:08x}", series_id, random)
}

/// Dedup key shared by every occurrence-scheduling job of one series
pub fn occurrence_dedup_key(series_id: &str) -> String {
    format!("init-next-occurrence:{}", series_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_ms_returns_reasonable_timestamp() {
        let ts = now_ms();
        assert!(ts > 1577836800000); // 2020-01-01
        assert!(ts < 4102444800000); // 2100-01-01
    }

    #[test]
    fn test_generate_series_id_format() {
        let id = generate_series_id();
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "ser");
        assert!(parts[1].chars().all(|c| c.is_ascii_digit()));
        assert_eq!(parts[2].len(), 4);
        assert!(parts[2].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generate_series_id_uniqueness() {
        let id1 = generate_series_id();
        let id2 = generate_series_id();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_generate_job_id_includes_series() {
        let id = generate_job_id("ser-1-abcd");
        assert!(id.starts_with("job-ser-1-abcd-"));
    }

    #[test]
    fn test_dedup_key_is_per_series() {
        assert_eq!(occurrence_dedup_key("ser-1"), "init-next-occurrence:ser-1");
        assert_ne!(occurrence_dedup_key("a"), occurrence_dedup_key("b"));
    }
}
