use serde::{Deserialize, Serialize};

use super::principal::Identity;

/// Ordered set of uids granted admin. Insertion order is kept for display; duplicates
/// and blank entries are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct AllowList {
    uids: Vec<String>,
}

impl AllowList {
    pub fn new<I, S>(uids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out: Vec<String> = Vec::new();
        for u in uids {
            let u: String = u.into();
            let u = u.trim();
            if u.is_empty() || out.iter().any(|x| x == u) { continue; }
            out.push(u.to_string());
        }
        Self { uids: out }
    }

    /// Parse a comma separated list, e.g. `uid1,uid2, uid3`.
    pub fn from_csv(s: &str) -> Self { Self::new(s.split(',')) }

    pub fn contains(&self, uid: &str) -> bool { self.uids.iter().any(|u| u == uid) }

    /// The sole authorization predicate.
    pub fn admits(&self, identity: Option<&Identity>) -> bool {
        identity.map(|i| self.contains(&i.uid)).unwrap_or(false)
    }

    pub fn is_empty(&self) -> bool { self.uids.is_empty() }
    pub fn len(&self) -> usize { self.uids.len() }
    pub fn iter(&self) -> impl Iterator<Item = &str> { self.uids.iter().map(|s| s.as_str()) }
}

impl From<Vec<String>> for AllowList {
    fn from(v: Vec<String>) -> Self { AllowList::new(v) }
}

impl From<AllowList> for Vec<String> {
    fn from(a: AllowList) -> Self { a.uids }
}
