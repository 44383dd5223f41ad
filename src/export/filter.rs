use crate::models::{CatalogRecord, GeneratedProduct, Role};
use crate::store::ListFilter;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Deserialize;

/// Narrows an export. Generated products always count as `Child` and their
/// category is their product name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ExportFilter {
    #[serde(default)]
    pub kind: Option<Role>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub created_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_to: Option<DateTime<Utc>>,
}

impl ExportFilter {
    pub fn window(&self) -> ListFilter {
        ListFilter {
            created_from: self.created_from,
            created_to: self.created_to,
        }
    }

    pub fn accepts_record(&self, record: &CatalogRecord) -> bool {
        self.accepts(record.role, record.category.as_deref(), record.created_at)
    }

    pub fn accepts_generated(&self, product: &GeneratedProduct) -> bool {
        self.accepts(Role::Child, Some(&product.product_name), product.created_at)
    }

    fn accepts(&self, role: Role, category: Option<&str>, created_at: DateTime<Utc>) -> bool {
        if self.kind.is_some_and(|kind| kind != role) {
            return false;
        }
        if let Some(wanted) = self.category.as_deref() {
            let matches = category.is_some_and(|c| c.trim().eq_ignore_ascii_case(wanted.trim()));
            if !matches {
                return false;
            }
        }
        self.window().matches(created_at)
    }
}

/// Parses an RFC 3339 timestamp or a bare `YYYY-MM-DD`. Bare dates cover the
/// whole day: the start when `end_of_day` is false, the last instant otherwise.
pub fn parse_bound(raw: &str, end_of_day: bool) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
    let time = if end_of_day {
        NaiveTime::from_hms_milli_opt(23, 59, 59, 999)?
    } else {
        NaiveTime::MIN
    };
    Some(date.and_time(time).and_utc())
}
