//! Page arithmetic and page-link rendering.
//!
//! Long page ranges are elided: the first and last page are always linked,
//! plus `window` pages either side of the current one.
//!
//! ```text
//! « 1 … 4 5 [6] 7 8 … 20 »
//! ```

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PageLink {
    Previous(usize),
    Page(usize),
    Current(usize),
    Gap,
    Next(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paginator {
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub window: usize,
}

impl Paginator {
    pub fn new(total: usize, page: usize, page_size: usize) -> Self {
        Self {
            total,
            page: page.max(1),
            page_size: page_size.max(1),
            window: 2,
        }
    }

    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window;
        self
    }

    /// `ceil(total / page_size)`.
    pub fn total_pages(&self) -> usize {
        self.total.div_ceil(self.page_size)
    }

    /// Links for a pager. Empty when everything fits on one page.
    pub fn links(&self) -> Vec<PageLink> {
        let pages = self.total_pages();
        if pages <= 1 {
            return Vec::new();
        }
        let current = self.page.min(pages);
        let lo = current.saturating_sub(self.window).max(1);
        let hi = (current + self.window).min(pages);

        let mut links = Vec::new();
        if current > 1 {
            links.push(PageLink::Previous(current - 1));
        }
        for p in 1..=pages {
            if p == current {
                links.push(PageLink::Current(p));
            } else if p == 1 || p == pages || (lo..=hi).contains(&p) {
                links.push(PageLink::Page(p));
            } else if links.last() != Some(&PageLink::Gap) {
                links.push(PageLink::Gap);
            }
        }
        if current < pages {
            links.push(PageLink::Next(current + 1));
        }
        links
    }
}

/// Plain-text pager line.
pub fn render(links: &[PageLink]) -> String {
    links
        .iter()
        .map(|l| match l {
            PageLink::Previous(_) => "«".to_string(),
            PageLink::Page(p) => p.to_string(),
            PageLink::Current(p) => format!("[{}]", p),
            PageLink::Gap => "…".to_string(),
            PageLink::Next(_) => "»".to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}
