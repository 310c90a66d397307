//! Small shared helpers.

pub mod timestamps;

pub use timestamps::{duration_ms, format_timestamp, iso_timestamp, now, Timestamp};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iso_timestamp_format() {
        let ts = iso_timestamp();
        assert!(ts.contains('T'));
        assert!(ts.ends_with('Z'));
    }
}
