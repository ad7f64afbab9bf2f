//! Single-slot result cache.
//!
//! Holds the engine hit list for the last query term only, together with
//! the hit limit it was fetched with. Storing a new term evicts the
//! previous one. Filtering and pagination still run on cached hits, so a
//! stale or missing entry only costs latency.

use crate::index::EngineHit;

#[derive(Debug, Default)]
pub struct ResultCache {
    slot: Option<Slot>,
}

#[derive(Debug)]
struct Slot {
    term: String,
    limit: usize,
    hits: Vec<EngineHit>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hits stored for exactly this term, cut to `limit`. A miss when the
    /// stored list was fetched with a smaller limit.
    pub fn get(&self, term: &str, limit: usize) -> Option<&[EngineHit]> {
        match &self.slot {
            Some(slot) if slot.term == term && slot.limit >= limit => {
                Some(&slot.hits[..slot.hits.len().min(limit)])
            }
            _ => None,
        }
    }

    /// Store hits fetched for `term` with at most `limit` results, evicting
    /// whatever was there.
    pub fn put(&mut self, term: impl Into<String>, limit: usize, hits: Vec<EngineHit>) {
        self.slot = Some(Slot {
            term: term.into(),
            limit,
            hits,
        });
    }

    pub fn clear(&mut self) {
        self.slot = None;
    }

    pub fn term(&self) -> Option<&str> {
        self.slot.as_ref().map(|s| s.term.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Document;

    fn hits(title: &str) -> Vec<EngineHit> {
        hits_n(title, 1)
    }

    fn hits_n(title: &str, n: usize) -> Vec<EngineHit> {
        let doc = Document {
            title: title.into(),
            ..Default::default()
        };
        (0..n).map(|_| EngineHit::from_document(&doc, 1.0)).collect()
    }

    #[test]
    fn storing_a_new_term_evicts_the_old_one() {
        let mut cache = ResultCache::new();
        cache.put("alpha", 10, hits("a"));
        assert_eq!(cache.get("alpha", 10).unwrap()[0].title, "a");

        cache.put("beta", 10, hits("b"));
        assert!(cache.get("alpha", 10).is_none());
        assert_eq!(cache.get("beta", 10).unwrap()[0].title, "b");
        assert_eq!(cache.term(), Some("beta"));
    }

    #[test]
    fn larger_limit_misses_smaller_limit_is_cut() {
        let mut cache = ResultCache::new();
        cache.put("alpha", 3, hits_n("a", 3));
        assert!(cache.get("alpha", 10).is_none());
        assert_eq!(cache.get("alpha", 3).unwrap().len(), 3);
        assert_eq!(cache.get("alpha", 2).unwrap().len(), 2);
    }
}
