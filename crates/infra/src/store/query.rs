//! Listing filters and pagination shared by every store.

use serde::{Deserialize, Serialize};

use warden_core::TenantId;

/// Pagination parameters for list queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// Maximum number of items to return.
    pub limit: u32,
    /// Offset for pagination (0-based).
    pub offset: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: Self::DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

impl Pagination {
    pub const DEFAULT_LIMIT: u32 = 10;
    pub const MAX_LIMIT: u32 = 100;

    pub fn new(limit: Option<u32>, offset: Option<u32>) -> Self {
        Self {
            limit: limit.unwrap_or(Self::DEFAULT_LIMIT).clamp(1, Self::MAX_LIMIT),
            offset: offset.unwrap_or(0),
        }
    }

    /// 1-based page numbering.
    pub fn from_page(page: Option<u32>, limit: Option<u32>) -> Self {
        let limit = limit.unwrap_or(Self::DEFAULT_LIMIT).clamp(1, Self::MAX_LIMIT);
        let page = page.unwrap_or(1).max(1);
        Self {
            limit,
            offset: (page - 1).saturating_mul(limit),
        }
    }

    pub fn page(&self) -> u32 {
        self.offset / self.limit.max(1) + 1
    }
}

/// One page of results plus totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub pagination: Pagination,
    pub has_more: bool,
}

impl<T> Page<T> {
    /// Slice an already filtered and ordered result set.
    pub fn from_items(items: Vec<T>, pagination: Pagination) -> Self {
        let total = items.len() as u64;
        let items: Vec<T> = items
            .into_iter()
            .skip(pagination.offset as usize)
            .take(pagination.limit as usize)
            .collect();
        let has_more = total > u64::from(pagination.offset) + items.len() as u64;
        Self {
            items,
            total,
            pagination,
            has_more,
        }
    }

    pub fn total_pages(&self) -> u64 {
        self.total.div_ceil(u64::from(self.pagination.limit.max(1)))
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            pagination: self.pagination,
            has_more: self.has_more,
        }
    }
}

/// Which tenants a listing covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TenantScope {
    #[default]
    All,
    /// Rows whose tenant equals the given one (`None` = global rows).
    Exactly(Option<TenantId>),
    /// Rows of the given tenant plus global rows.
    WithGlobal(Option<TenantId>),
}

impl TenantScope {
    pub fn admits(&self, tenant_id: Option<TenantId>) -> bool {
        match *self {
            TenantScope::All => true,
            TenantScope::Exactly(t) => tenant_id == t,
            TenantScope::WithGlobal(t) => tenant_id.is_none() || tenant_id == t,
        }
    }
}

/// Filter for list queries: tenant scope plus a case-insensitive substring
/// match on the record's name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
    pub tenant: TenantScope,
    pub search: Option<String>,
}

impl ListFilter {
    pub fn new(tenant: TenantScope, search: Option<String>) -> Self {
        let search = search
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        Self { tenant, search }
    }

    pub fn matches(&self, tenant_id: Option<TenantId>, name: &str) -> bool {
        self.tenant.admits(tenant_id) && self.matches_name(name)
    }

    pub fn matches_name(&self, name: &str) -> bool {
        match &self.search {
            Some(needle) => name.to_lowercase().contains(&needle.to_lowercase()),
            None => true,
        }
    }

    /// SQL `ILIKE` pattern for the search term.
    pub fn like_pattern(&self) -> Option<String> {
        self.search.as_ref().map(|s| {
            let escaped = s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
            format!("%{escaped}%")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_numbers_map_to_offsets() {
        let p = Pagination::from_page(Some(3), Some(10));
        assert_eq!(p.offset, 20);
        assert_eq!(p.page(), 3);
        assert_eq!(Pagination::from_page(Some(0), None).offset, 0);
        assert_eq!(Pagination::new(Some(10_000), None).limit, Pagination::MAX_LIMIT);
    }

    #[test]
    fn page_slices_and_reports_totals() {
        let page = Page::from_items((1..=25).collect::<Vec<_>>(), Pagination::from_page(Some(2), Some(10)));
        assert_eq!(page.items, (11..=20).collect::<Vec<_>>());
        assert_eq!(page.total, 25);
        assert_eq!(page.total_pages(), 3);
        assert!(page.has_more);

        let last = Page::from_items((1..=25).collect::<Vec<_>>(), Pagination::from_page(Some(3), Some(10)));
        assert_eq!(last.items.len(), 5);
        assert!(!last.has_more);
    }

    #[test]
    fn scopes() {
        let t = Some(TenantId::new());
        let other = Some(TenantId::new());
        assert!(TenantScope::All.admits(other));
        assert!(TenantScope::Exactly(t).admits(t));
        assert!(!TenantScope::Exactly(t).admits(None));
        assert!(TenantScope::WithGlobal(t).admits(None));
        assert!(!TenantScope::WithGlobal(t).admits(other));
    }

    #[test]
    fn search_is_case_insensitive_and_trimmed() {
        let f = ListFilter::new(TenantScope::All, Some("  ADMIN ".into()));
        assert!(f.matches(None, "companyadmin"));
        assert!(!f.matches(None, "clientuser"));
        assert_eq!(ListFilter::new(TenantScope::All, Some("   ".into())).search, None);
        assert_eq!(
            ListFilter::new(TenantScope::All, Some("a_b%".into())).like_pattern().as_deref(),
            Some("%a\\_b\\%%")
        );
    }
}
