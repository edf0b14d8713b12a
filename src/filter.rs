//! Filter/Rewriter external interface: a query
//! pre-transform attached to the runner layer, with Skip/Modify/Pass
//! decisions.

use std::sync::atomic::{AtomicU64, Ordering};

/// A query pre-transform. `filter(sql)` returns `None` to suppress the
/// statement (`Skip`), `Some(sql)` unchanged to pass it through, or
/// `Some(rewritten)` to modify it before execution.
pub trait Filter: Send + Sync {
    /// Applies the filter to one statement.
    fn filter(&self, sql: &str) -> Option<String>;

    /// Statistics this filter has accumulated, if it tracks any.
    fn stats(&self) -> FilterStats {
        FilterStats::default()
    }
}

/// Counters a [`Filter`] implementation may expose.
#[derive(Clone, Copy, Debug, Default)]
pub struct FilterStats {
    /// Number of statements rewritten.
    pub queries_filtered: u64,
    /// Number of statements suppressed entirely.
    pub queries_skipped: u64,
}

/// A filter that drops any statement matching a fixed substring, counting
/// both rewrites (none, by construction) and skips. Useful as a minimal
/// reference implementation and for tests exercising the filter interface.
#[derive(Default)]
pub struct SubstringSkipFilter {
    needle: String,
    skipped: AtomicU64,
}

impl SubstringSkipFilter {
    /// Builds a filter that skips any statement containing `needle`.
    pub fn new(needle: impl Into<String>) -> Self {
        SubstringSkipFilter {
            needle: needle.into(),
            skipped: AtomicU64::new(0),
        }
    }
}

impl Filter for SubstringSkipFilter {
    fn filter(&self, sql: &str) -> Option<String> {
        if sql.contains(&self.needle) {
            self.skipped.fetch_add(1, Ordering::Relaxed);
            None
        } else {
            Some(sql.to_owned())
        }
    }

    fn stats(&self) -> FilterStats {
        FilterStats {
            queries_filtered: 0,
            queries_skipped: self.skipped.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_statements_are_skipped() {
        let filter = SubstringSkipFilter::new("DROP");
        assert_eq!(filter.filter("DROP TABLE t"), None);
        assert_eq!(filter.filter("SELECT 1"), Some("SELECT 1".to_owned()));
        assert_eq!(filter.stats().queries_skipped, 1);
    }
}
