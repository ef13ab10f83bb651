//! Per-segment image collection with an explicit fallback chain.

use super::fetch::AssetFetcher;
use super::query::{fallback_query, topic_keyword};
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{debug, info, instrument};

/// One way of producing a search query for an image slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackStrategy {
    /// The query derived for this slot.
    DirectQuery(String),
    /// The overall topic string as given.
    TopicQuery,
    /// Topic keyword plus a positional marker.
    IndexedTopicQuery(usize),
}

impl FallbackStrategy {
    /// The search string this strategy stands for.
    pub fn query(&self, topic: &str) -> String {
        match self {
            FallbackStrategy::DirectQuery(q) => q.clone(),
            FallbackStrategy::TopicQuery => topic.trim().to_string(),
            FallbackStrategy::IndexedTopicQuery(position) => fallback_query(&topic_keyword(topic), *position),
        }
    }
}

/// Ordered strategies for one image slot.
///
/// `DirectQuery`, then `TopicQuery`, then `budget` indexed topic queries at
/// positions unique to this segment and slot. Indexed positions start above
/// `per_segment`, which is the range used when derived queries are padded.
pub fn fallback_plan(
    derived: &str,
    segment_index: usize,
    slot: usize,
    per_segment: usize,
    budget: usize,
) -> Vec<FallbackStrategy> {
    let mut plan = vec![FallbackStrategy::DirectQuery(derived.to_string()), FallbackStrategy::TopicQuery];
    let base = (segment_index * per_segment + slot) * budget.max(1);
    plan.extend((1..=budget).map(|k| FallbackStrategy::IndexedTopicQuery(per_segment + base + k)));
    plan
}

/// Runs fallback plans against an [`AssetFetcher`].
pub struct ImageCollector<'a> {
    fetcher: &'a AssetFetcher,
    topic: &'a str,
    fallback_budget: usize,
}

impl<'a> ImageCollector<'a> {
    pub fn new(fetcher: &'a AssetFetcher, topic: &'a str, fallback_budget: usize) -> Self {
        Self { fetcher, topic, fallback_budget }
    }

    /// One image per derived query, in query order.
    ///
    /// A slot whose whole plan fails is left out, so the result may be
    /// shorter than `queries`. The same URL is never used twice in a segment.
    #[instrument(skip(self, queries), fields(segment = segment_index, slots = queries.len()))]
    pub async fn collect(&self, segment_index: usize, queries: &[String]) -> Vec<PathBuf> {
        let mut used_urls = HashSet::new();
        let mut images = Vec::with_capacity(queries.len());

        for (slot, derived) in queries.iter().enumerate() {
            let plan = fallback_plan(derived, segment_index, slot, queries.len(), self.fallback_budget);
            let mut tried = HashSet::new();
            let mut found = false;

            for strategy in &plan {
                let query = strategy.query(self.topic);
                if query.is_empty() || !tried.insert(query.clone()) {
                    continue;
                }
                if let Some(image) = self.fetcher.fetch(&query, 1, &used_urls).await.into_iter().next() {
                    debug!("Slot {} filled by {:?}", slot, strategy);
                    used_urls.insert(image.url);
                    images.push(image.path);
                    found = true;
                    break;
                }
            }

            if !found {
                info!("Segment {} slot {}: fallback budget exhausted", segment_index, slot);
            }
        }

        images
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::visuals::fetch::tests::{fast_settings, hit, png, MapDownloader, TableSearch};
    use std::collections::HashMap;
    use std::sync::Arc;

    #[test]
    fn test_plan_order() {
        let plan = fallback_plan("guitar solo 2024", 1, 0, 2, 2);
        assert_eq!(
            plan,
            vec![
                FallbackStrategy::DirectQuery("guitar solo 2024".to_string()),
                FallbackStrategy::TopicQuery,
                FallbackStrategy::IndexedTopicQuery(7),
                FallbackStrategy::IndexedTopicQuery(8),
            ]
        );
    }

    #[test]
    fn test_plan_positions_do_not_collide() {
        let mut seen = HashSet::new();
        for segment in 0..4 {
            for slot in 0..3 {
                for strategy in fallback_plan("q", segment, slot, 3, 2) {
                    if let FallbackStrategy::IndexedTopicQuery(p) = strategy {
                        assert!(seen.insert(p), "position {} reused", p);
                    }
                }
            }
        }
    }

    #[test]
    fn test_indexed_positions_skip_padded_range() {
        for per_segment in 1..=5 {
            for slot in 0..per_segment {
                for strategy in fallback_plan("q", 2, slot, per_segment, 3) {
                    if let FallbackStrategy::IndexedTopicQuery(p) = strategy {
                        assert!(p > per_segment, "position {} overlaps padded queries", p);
                    }
                }
            }
        }
    }

    #[tokio::test]
    async fn test_repeated_query_is_searched_once_per_slot() {
        let dir = tempfile::tempdir().unwrap();
        let search = Arc::new(TableSearch::new(HashMap::new()));
        let fetcher = AssetFetcher::new(
            search.clone(),
            Arc::new(MapDownloader::new(HashMap::new())),
            dir.path().to_path_buf(),
            &fast_settings(),
        );
        let collector = ImageCollector::new(&fetcher, "Real Madrid", 1);

        // The derived query is the topic itself, as happens after padding or
        // when the model echoes the topic back.
        let images = collector.collect(0, &["Real Madrid".to_string()]).await;

        assert!(images.is_empty());
        let asked = search.calls.lock().unwrap().clone();
        assert_eq!(
            asked,
            vec![("Real Madrid".to_string(), 0), ("Madrid photo 2".to_string(), 0)]
        );
    }

    #[tokio::test]
    async fn test_padded_query_is_not_retried_as_indexed_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let search = Arc::new(TableSearch::new(HashMap::new()));
        let fetcher = AssetFetcher::new(
            search.clone(),
            Arc::new(MapDownloader::new(HashMap::new())),
            dir.path().to_path_buf(),
            &fast_settings(),
        );
        let collector = ImageCollector::new(&fetcher, "Real Madrid", 1);

        let padded = vec![fallback_query("Madrid", 1), fallback_query("Madrid", 2)];
        collector.collect(0, &padded).await;

        let asked: Vec<String> = search.calls.lock().unwrap().iter().map(|(q, _)| q.clone()).collect();
        for padded_query in &padded {
            assert_eq!(asked.iter().filter(|q| *q == padded_query).count(), 1, "{:?}", asked);
        }
        assert!(asked.contains(&"Madrid photo 3".to_string()));
        assert!(asked.contains(&"Madrid photo 4".to_string()));
    }

    #[test]
    fn test_strategy_queries() {
        let topic = "Top 10 Metal Bands of All Time";
        assert_eq!(FallbackStrategy::DirectQuery("x".into()).query(topic), "x");
        assert_eq!(FallbackStrategy::TopicQuery.query(topic), topic);
        assert_eq!(FallbackStrategy::IndexedTopicQuery(3).query(topic), "Metal photo 3");
    }

    #[tokio::test]
    async fn test_failed_queries_fall_back_to_topic_then_indexed() {
        let dir = tempfile::tempdir().unwrap();
        let topic = "Real Madrid";

        // Derived queries find nothing; the topic query has one image,
        // the second slot's first indexed topic query has another.
        let mut pages = HashMap::new();
        pages.insert(topic.to_string(), vec![vec![hit("https://t.com/topic.png")]]);
        pages.insert("Madrid photo 5".to_string(), vec![vec![hit("https://t.com/indexed.png")]]);

        let mut files = HashMap::new();
        files.insert("https://t.com/topic.png".to_string(), png(300, 10, 10));
        files.insert("https://t.com/indexed.png".to_string(), png(300, 10, 20));

        let search = Arc::new(TableSearch::new(pages));
        let fetcher = AssetFetcher::new(
            search.clone(),
            Arc::new(MapDownloader::new(files)),
            dir.path().to_path_buf(),
            &fast_settings(),
        );
        let collector = ImageCollector::new(&fetcher, topic, 2);

        let queries = vec!["nothing here".to_string(), "still nothing".to_string()];
        let images = collector.collect(0, &queries).await;

        assert_eq!(images.len(), 2);
        assert_ne!(images[0], images[1]);

        // The topic image is already used by slot 0, so slot 1 pages past it
        // and then moves on to its indexed query.
        let asked = search.calls.lock().unwrap().clone();
        let expected: Vec<(String, u32)> = [
            ("nothing here", 0),
            ("Real Madrid", 0),
            ("still nothing", 0),
            ("Real Madrid", 0),
            ("Real Madrid", 1),
            ("Madrid photo 5", 0),
        ]
        .iter()
        .map(|(q, p)| (q.to_string(), *p))
        .collect();
        assert_eq!(asked, expected);
    }

    #[tokio::test]
    async fn test_exhausted_budget_returns_fewer_images() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = AssetFetcher::new(
            Arc::new(TableSearch::new(HashMap::new())),
            Arc::new(MapDownloader::new(HashMap::new())),
            dir.path().to_path_buf(),
            &fast_settings(),
        );
        let collector = ImageCollector::new(&fetcher, "volcanoes", 1);

        let images = collector.collect(3, &["a".to_string(), "b".to_string()]).await;
        assert!(images.is_empty());
    }
}
