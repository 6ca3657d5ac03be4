//! Diff and as-of addresses for feed entries

use chrono::{DateTime, SecondsFormat, Utc};

use crate::pages::Page;

/// Builds canonical addresses below a fixed mount prefix.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LinkBuilder {
    prefix: String,
}

/// Address form of a revision date
pub fn format_date(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl LinkBuilder {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into().trim_end_matches('/').to_string(),
        }
    }

    /// `<prefix>/<region>/<namespace>/<pretty_slug>`
    pub fn page_address(&self, namespace: &str, page: &Page) -> String {
        format!(
            "{}/{}/{}/{}",
            self.prefix,
            page.region.slug,
            namespace,
            page.pretty_slug()
        )
    }

    /// Compare view of `page`. With one date the view compares that revision
    /// against its predecessor; with two it compares the pair.
    pub fn diff_address(
        &self,
        namespace: &str,
        page: &Page,
        date1: DateTime<Utc>,
        date2: Option<DateTime<Utc>>,
    ) -> String {
        let base = self.page_address(namespace, page);
        match date2 {
            Some(date2) => format!("{}/diff/{}...{}", base, format_date(date1), format_date(date2)),
            None => format!("{}/diff/{}", base, format_date(date1)),
        }
    }

    /// `page` as it was at `date`
    pub fn as_of_address(&self, namespace: &str, page: &Page, date: DateTime<Utc>) -> String {
        format!("{}/as-of/{}", self.page_address(namespace, page), format_date(date))
    }
}
