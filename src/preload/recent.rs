use std::collections::{HashMap, VecDeque};

/// Bounded FIFO of URLs that finished preloading, successfully or not.
/// The oldest entry is evicted once `capacity` is exceeded.
#[derive(Debug, Clone)]
pub struct RecentlyCompleted {
    capacity: usize,
    order: VecDeque<String>,
    counts: HashMap<String, usize>,
}

impl RecentlyCompleted {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            counts: HashMap::new(),
        }
    }

    pub fn insert(&mut self, url: String) {
        *self.counts.entry(url.clone()).or_insert(0) += 1;
        self.order.push_back(url);

        while self.order.len() > self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            if let Some(count) = self.counts.get_mut(&oldest) {
                *count -= 1;
                if *count == 0 {
                    self.counts.remove(&oldest);
                }
            }
        }
    }

    pub fn contains(&self, url: &str) -> bool {
        self.counts.contains_key(url)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evicts_oldest_at_capacity() {
        let mut recent = RecentlyCompleted::new(1000);
        recent.insert("first".to_string());

        for n in 0..999 {
            recent.insert(format!("url-{n}"));
        }
        assert_eq!(recent.len(), 1000);
        assert!(recent.contains("first"));

        recent.insert("one-more".to_string());
        assert_eq!(recent.len(), 1000);
        assert!(!recent.contains("first"));
        assert!(recent.contains("url-0"));
        assert!(recent.contains("one-more"));
    }

    #[test]
    fn test_repeated_url_survives_first_eviction() {
        let mut recent = RecentlyCompleted::new(3);
        recent.insert("a".to_string());
        recent.insert("b".to_string());
        recent.insert("a".to_string());
        recent.insert("c".to_string());

        // the first "a" is gone but the second copy is still queued
        assert!(recent.contains("a"));
        assert!(!recent.is_empty());

        recent.insert("d".to_string());
        recent.insert("e".to_string());
        assert!(!recent.contains("a"));
        assert!(!recent.contains("b"));
        assert_eq!(recent.len(), 3);
    }
}
