//! Result pages.
//!
//! A [`Page`] is one skip/limit window over a query result together with the
//! total number of matches and whether rows exist beyond the window.

use serde::{Deserialize, Serialize};

/// A single page of results.
///
/// # Example
///
/// ```ignore
/// use docrest_core::page::Page;
///
/// let page: Page<String> = Page::builder(vec!["item1".to_string()])
///     .with_count(100)
///     .with_has_more(Some(true))
///     .build();
///
/// assert_eq!(page.items.len(), 1);
/// assert_eq!(page.count, 100);
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// The items contained in this page.
    pub items: Vec<T>,
    /// Total count of matching items, independent of the window.
    pub count: usize,
    /// Whether more items exist past this page. `None` when the result was not
    /// windowed (unpaginated resources and bulk operations).
    pub has_more: Option<bool>,
}

impl<T> Page<T> {
    /// Creates a new builder for constructing a page.
    pub fn builder(items: Vec<T>) -> PageBuilder<T> {
        PageBuilder::new(items)
    }

    /// Converts every item, keeping the page metadata.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            count: self.count,
            has_more: self.has_more,
        }
    }

    /// Fallible variant of [`Page::map`].
    pub fn try_map<U, E>(self, f: impl FnMut(T) -> Result<U, E>) -> Result<Page<U>, E> {
        Ok(Page {
            items: self.items.into_iter().map(f).collect::<Result<Vec<_>, _>>()?,
            count: self.count,
            has_more: self.has_more,
        })
    }
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            count: 0,
            has_more: None,
        }
    }
}

/// Builder for constructing [`Page`] instances.
pub struct PageBuilder<T> {
    items: Vec<T>,
    count: usize,
    has_more: Option<bool>,
}

impl<T> PageBuilder<T> {
    /// Creates a new builder with the given items.
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            count: 0,
            has_more: None,
        }
    }

    /// Sets the total count of matching items.
    pub fn with_count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    /// Sets the has-more flag.
    pub fn with_has_more(mut self, has_more: Option<bool>) -> Self {
        self.has_more = has_more;
        self
    }

    /// Builds and returns the final [`Page`] instance.
    pub fn build(self) -> Page<T> {
        Page {
            items: self.items,
            count: self.count,
            has_more: self.has_more,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_keeps_metadata() {
        let page = Page::builder(vec![1, 2, 3])
            .with_count(7)
            .with_has_more(Some(true))
            .build()
            .map(|n| n * 10);

        assert_eq!(page.items, vec![10, 20, 30]);
        assert_eq!(page.count, 7);
        assert_eq!(page.has_more, Some(true));
    }
}
