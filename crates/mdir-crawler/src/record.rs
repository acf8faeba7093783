use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::detail::Details;

/// Key of the general field that member records are ordered by
pub const NAME_FIELD: &str = "Name";

/// One member: the listing row's fields plus the parsed detail page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberRecord {
    #[serde(flatten)]
    pub general: IndexMap<String, String>,
    pub details: Details,
}

impl MemberRecord {
    pub fn name(&self) -> &str {
        self.general
            .get(NAME_FIELD)
            .map(String::as_str)
            .unwrap_or_default()
    }
}

/// Stable sort by name, members sharing a name keep their relative order
pub fn sort_by_name(records: &mut [MemberRecord]) {
    records.sort_by(|a, b| a.name().cmp(b.name()));
}
