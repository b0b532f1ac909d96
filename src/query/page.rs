use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// One page of search results.
///
/// `total_count` is the size of the filtered set before pagination, so
/// `items.len() <= page_size` always holds while `total_count` may be larger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PageResult<T> {
    pub items: Vec<T>,
    #[ts(type = "number")]
    pub total_count: u64,
    pub page: u32,
    pub page_size: u32,
}

impl<T> PageResult<T> {
    pub fn empty(total_count: u64, page: u32, page_size: u32) -> Self {
        Self {
            items: Vec::new(),
            total_count,
            page,
            page_size,
        }
    }

    /// Number of pages needed to cover `total_count`.
    pub fn total_pages(&self) -> u64 {
        if self.page_size == 0 {
            return 0;
        }
        self.total_count.div_ceil(u64::from(self.page_size))
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PageResult<U> {
        PageResult {
            items: self.items.into_iter().map(f).collect(),
            total_count: self.total_count,
            page: self.page,
            page_size: self.page_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_pages_rounds_up() {
        assert_eq!(PageResult::<()>::empty(0, 1, 20).total_pages(), 0);
        assert_eq!(PageResult::<()>::empty(5, 1, 2).total_pages(), 3);
        assert_eq!(PageResult::<()>::empty(4, 1, 2).total_pages(), 2);
    }

    #[test]
    fn map_keeps_paging_metadata() {
        let page = PageResult {
            items: vec![1, 2],
            total_count: 7,
            page: 3,
            page_size: 2,
        };
        let mapped = page.map(|n| n * 10);
        assert_eq!(mapped.items, vec![10, 20]);
        assert_eq!((mapped.total_count, mapped.page, mapped.page_size), (7, 3, 2));
    }
}
