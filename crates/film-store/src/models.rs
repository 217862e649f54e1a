//! Film entity as held by either store.

use chrono::{DateTime, Utc};

/// A film catalogue entry.
///
/// `uuid` is the cross-system identity. `row_id` is store-internal and only
/// set on values read back from a store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Film {
    pub row_id: Option<i64>,
    pub uuid: String,
    /// Legacy row id, used to match legacy rows that predate `uuid`.
    pub external_id: Option<i64>,
    pub title: String,
    pub year: i32,
    pub last_update: Option<DateTime<Utc>>,
}

impl Film {
    /// Title and year, the fields reconciliation must converge on.
    pub fn business_fields(&self) -> (&str, i32) {
        (&self.title, self.year)
    }
}
