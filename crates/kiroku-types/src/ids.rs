//! Change identifiers.
//!
//! A change id is the content address of a change record: an opaque string,
//! globally unique, compared byte-wise. Ids are cloned constantly while
//! building trees, so the string is shared behind an `Arc`.

use std::borrow::Borrow;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Content address of a change.
///
/// Ordering is plain lexicographic ordering of the underlying string, which
/// is what head sorting and the canonical walk rely on.
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct ChangeId(Arc<str>);

impl ChangeId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// First 8 characters, for log lines only.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(8) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl From<&str> for ChangeId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ChangeId {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl From<&String> for ChangeId {
    fn from(s: &String) -> Self {
        Self::new(s)
    }
}

impl From<ChangeId> for String {
    fn from(id: ChangeId) -> Self {
        id.0.to_string()
    }
}

impl Deref for ChangeId {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ChangeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ChangeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for ChangeId {
    fn eq(&self, other: &str) -> bool {
        &*self.0 == other
    }
}

impl PartialEq<&str> for ChangeId {
    fn eq(&self, other: &&str) -> bool {
        &*self.0 == *other
    }
}

impl fmt::Display for ChangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ChangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChangeId({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_ordering_is_lexicographic() {
        let mut ids: Vec<ChangeId> = vec!["c3.3".into(), "c3".into(), "a".into()];
        ids.sort();
        assert_eq!(ids, vec![ChangeId::from("a"), "c3".into(), "c3.3".into()]);
    }

    #[test]
    fn test_borrow_lookup_by_str() {
        let mut map = HashMap::new();
        map.insert(ChangeId::from("s0"), 1);
        assert_eq!(map.get("s0"), Some(&1));
    }

    #[test]
    fn test_short() {
        assert_eq!(ChangeId::from("bafyreiabcdef").short(), "bafyreia");
        assert_eq!(ChangeId::from("s0").short(), "s0");
    }

    #[test]
    fn test_serde_as_plain_string() {
        let id = ChangeId::from("c1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"c1\"");
        let back: ChangeId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
