// src/api/uid.rs

//! Helpers for `type:id` unique identifiers (`license:12345`, `asset:9`, ...)

/// Object types that can carry custom metadata
pub const METADATA_OBJECT_TYPES: &[&str] = &[
    "asset",
    "campaign",
    "campaign_section",
    "task",
    "channel",
    "monitoring_flag",
    "post",
    "targeting",
    "post_attachment",
];

/// Numeric part of a uid (`license:12345` → `12345`); the input when it has no type prefix
pub fn id_from_uid(uid: &str) -> &str {
    uid.split_once(':').map(|(_, id)| id).unwrap_or(uid)
}

/// Type prefix of a uid (`asset:9` → `asset`)
pub fn object_type(uid: &str) -> Option<&str> {
    uid.split_once(':').map(|(t, _)| t)
}

/// Whether objects of this uid's type accept custom metadata
pub fn supports_metadata(uid: &str) -> bool {
    object_type(uid).is_some_and(|t| METADATA_OBJECT_TYPES.contains(&t))
}

/// File-name friendly form of a uid (`license:1` → `license_1`)
pub fn file_safe(uid: &str) -> String {
    uid.replace(':', "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_from_uid() {
        assert_eq!(id_from_uid("license:12345"), "12345");
        assert_eq!(id_from_uid("term:a:b"), "a:b");
        assert_eq!(id_from_uid("plain"), "plain");
    }

    #[test]
    fn test_object_type() {
        assert_eq!(object_type("asset:9"), Some("asset"));
        assert_eq!(object_type("nothing"), None);
        assert!(supports_metadata("campaign:1"));
        assert!(supports_metadata("post_attachment:1"));
        assert!(!supports_metadata("license:1"));
    }

    #[test]
    fn test_file_safe() {
        assert_eq!(file_safe("license:1"), "license_1");
    }
}
