use serde::Deserialize;

use crown_types::api::Page;

const DEFAULT_PAGE_SIZE: u32 = 20;
const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

impl Default for PageQuery {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageQuery {
    /// (limit, offset) with the page size clamped to 1..=100.
    pub fn limits(self) -> (u32, u32) {
        let size = self.page_size.clamp(1, MAX_PAGE_SIZE);
        let page = self.page.max(1);
        (size, (page - 1) * size)
    }

    pub fn envelope<T>(self, count: u64, results: Vec<T>) -> Page<T> {
        let (size, _) = self.limits();
        Page {
            count,
            page: self.page.max(1),
            page_size: size,
            results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_is_clamped() {
        let q = PageQuery { page: 3, page_size: 500 };
        assert_eq!(q.limits(), (100, 200));

        let q = PageQuery { page: 0, page_size: 0 };
        assert_eq!(q.limits(), (1, 0));
    }

    #[test]
    fn envelope_reports_clamped_size() {
        let q = PageQuery { page: 2, page_size: 10 };
        let page = q.envelope(35, vec![1, 2, 3]);
        assert_eq!(page.count, 35);
        assert_eq!(page.page, 2);
        assert_eq!(page.page_size, 10);
        assert_eq!(page.results.len(), 3);
    }
}
