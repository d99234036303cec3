//! Reserved block ids and relation keys.

/// Reserved id of the header layout; always the first child of root.
pub const HEADER_BLOCK_ID: &str = "header";

/// Prefix stripped from object-type urls before they enter the type list.
pub const OBJECT_TYPE_URL_PREFIX: &str = "_ot";

pub const LAST_MODIFIED_DATE: &str = "lastModifiedDate";
pub const LAST_MODIFIED_BY: &str = "lastModifiedBy";
pub const SNIPPET: &str = "snippet";

/// Keys that are device-local or derived. They are never written to the
/// shared details and never carried in snapshots.
pub const LOCAL_RELATION_KEYS: &[&str] = &[
    "id",
    LAST_MODIFIED_DATE,
    LAST_MODIFIED_BY,
    "lastOpenedDate",
    SNIPPET,
    "syncStatus",
    "syncDate",
    "syncError",
    "spaceId",
    "backlinks",
    "links",
    "isDeleted",
];

pub fn is_local_key(key: &str) -> bool {
    LOCAL_RELATION_KEYS.contains(&key)
}

/// Normalizes an object-type url to its key.
pub fn object_type_key(url: &str) -> &str {
    url.strip_prefix(OBJECT_TYPE_URL_PREFIX).unwrap_or(url)
}
