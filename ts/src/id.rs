//! ID generation and timestamp helpers shared by every record type.

use uuid::Uuid;

/// Generate a new time-ordered record identifier (UUIDv7).
///
/// UUIDv7 embeds a millisecond timestamp in its high bits, so ids sort
/// lexicographically in creation order - useful for cheap "most recent N"
/// scans without an extra index.
pub fn generate_id() -> String {
    Uuid::now_v7().to_string()
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique_and_well_formed() {
        let a = generate_id();
        let b = generate_id();
        assert_ne!(a, b);
        assert!(Uuid::parse_str(&a).is_ok());
    }

    #[test]
    fn ids_sort_in_creation_order() {
        let a = generate_id();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = generate_id();
        assert!(a < b);
    }
}
