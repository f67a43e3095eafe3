//! Length-aware pagination results

use serde::Serialize;

use crate::collection::Collection;

/// One page of models plus the totals needed to render page links
#[derive(Debug, Clone, Serialize)]
pub struct Paginator {
    pub items: Collection,
    pub total: u64,
    pub per_page: i64,
    pub current_page: i64,
    pub last_page: i64,
    pub has_more_pages: bool,
}

impl Paginator {
    pub fn new(items: Collection, total: u64, per_page: i64, current_page: i64) -> Self {
        let per_page = per_page.max(1);
        let last_page = ((total as i64 + per_page - 1) / per_page).max(1);
        Self {
            items,
            total,
            per_page,
            current_page,
            last_page,
            has_more_pages: current_page < last_page,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// 1-based position of the first item on this page
    pub fn first_item(&self) -> Option<u64> {
        if self.items.is_empty() {
            None
        } else {
            Some(((self.current_page - 1) * self.per_page) as u64 + 1)
        }
    }

    pub fn last_item(&self) -> Option<u64> {
        self.first_item().map(|first| first + self.items.len() as u64 - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_math() {
        let page = Paginator::new(Collection::default(), 31, 15, 2);
        assert_eq!(page.last_page, 3);
        assert!(page.has_more_pages);
        assert_eq!(page.first_item(), None);

        let empty = Paginator::new(Collection::default(), 0, 15, 1);
        assert_eq!(empty.last_page, 1);
        assert!(!empty.has_more_pages);
    }
}
