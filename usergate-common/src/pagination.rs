//! Length-aware pagination page.

use serde::{Deserialize, Serialize};

/// One page of results plus the totals needed to render a pager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub current_page: u32,
    pub data: Vec<T>,
    /// 1-based index of the first item on this page, `None` when empty
    pub from: Option<u64>,
    pub last_page: u32,
    pub per_page: u32,
    /// 1-based index of the last item on this page, `None` when empty
    pub to: Option<u64>,
    pub total: u64,
}

impl<T> Page<T> {
    pub fn new(data: Vec<T>, total: u64, current_page: u32, per_page: u32) -> Self {
        let per_page = per_page.max(1);
        let last_page = total.div_ceil(per_page as u64).max(1) as u32;

        let (from, to) = if data.is_empty() {
            (None, None)
        } else {
            let from = (current_page.saturating_sub(1) as u64) * per_page as u64 + 1;
            (Some(from), Some(from + data.len() as u64 - 1))
        };

        Self {
            current_page,
            data,
            from,
            last_page,
            per_page,
            to,
            total,
        }
    }

    pub fn map<U, F>(self, f: F) -> Page<U>
    where
        F: FnMut(T) -> U,
    {
        Page {
            current_page: self.current_page,
            data: self.data.into_iter().map(f).collect(),
            from: self.from,
            last_page: self.last_page,
            per_page: self.per_page,
            to: self.to,
            total: self.total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_bounds() {
        let page = Page::new(vec![1, 2, 3], 23, 2, 10);
        assert_eq!(page.from, Some(11));
        assert_eq!(page.to, Some(13));
        assert_eq!(page.last_page, 3);
    }

    #[test]
    fn test_empty_page() {
        let page: Page<i32> = Page::new(vec![], 0, 1, 15);
        assert_eq!(page.from, None);
        assert_eq!(page.to, None);
        assert_eq!(page.last_page, 1);
        assert_eq!(page.total, 0);
    }

    #[test]
    fn test_page_map_keeps_totals() {
        let page = Page::new(vec![1, 2], 2, 1, 15).map(|n| n.to_string());
        assert_eq!(page.data, vec!["1".to_string(), "2".to_string()]);
        assert_eq!(page.total, 2);
        assert_eq!(page.to, Some(2));
    }
}
