//! Verified image download.
//!
//! Images are checked in memory before anything touches disk: the bytes must
//! decode and the picture must be at least `min_width` pixels wide. Accepted
//! images are stored under their content hash next to a JSON sidecar.

use super::search::{ImageHit, ImageSearch};
use crate::config::VisualSettings;
use crate::error::{ReelcastError, Result};
use crate::openai::http_client;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Fetches raw bytes for a URL.
#[async_trait]
pub trait Downloader: Send + Sync {
    async fn download(&self, url: &str) -> Result<Vec<u8>>;
}

/// reqwest-backed downloader.
pub struct HttpDownloader {
    http: reqwest::Client,
}

impl HttpDownloader {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self { http: http_client(timeout)? })
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.http.get(url).send().await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}

/// Sidecar record written next to every stored image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageMetadata {
    pub title: Option<String>,
    pub width: u32,
    pub height: u32,
    pub attribution: Option<String>,
    pub source_url: String,
    pub query: String,
}

/// A verified image on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedImage {
    pub path: PathBuf,
    pub url: String,
}

/// Searches, downloads, verifies and stores images.
pub struct AssetFetcher {
    search: Arc<dyn ImageSearch>,
    downloader: Arc<dyn Downloader>,
    assets_dir: PathBuf,
    min_width: u32,
    max_attempts: u32,
    backoff: Duration,
    timeout: Duration,
    max_pages: u32,
    blocklist: HashSet<String>,
}

impl AssetFetcher {
    pub fn new(
        search: Arc<dyn ImageSearch>,
        downloader: Arc<dyn Downloader>,
        assets_dir: PathBuf,
        settings: &VisualSettings,
    ) -> Self {
        Self {
            search,
            downloader,
            assets_dir,
            min_width: settings.min_width,
            max_attempts: settings.max_attempts.max(1),
            backoff: settings.retry_backoff(),
            timeout: settings.fetch_timeout(),
            max_pages: settings.max_pages.max(1),
            blocklist: settings.blocklist.iter().map(|h| h.to_lowercase()).collect(),
        }
    }

    /// Whether `url` may be downloaded at all.
    pub fn allowed_host(&self, url: &str) -> bool {
        match url::Url::parse(url) {
            Ok(parsed) => parsed
                .host_str()
                .is_some_and(|host| !self.blocklist.contains(&host.to_lowercase())),
            Err(_) => false,
        }
    }

    /// Up to `target` verified images for `query`, skipping URLs in `skip`.
    ///
    /// Never fails: search and download problems shrink the result instead.
    #[instrument(skip(self, skip), fields(query = %query, target = target))]
    pub async fn fetch(&self, query: &str, target: usize, skip: &HashSet<String>) -> Vec<FetchedImage> {
        let mut saved = Vec::new();
        if target == 0 {
            return saved;
        }

        'pages: for page in 0..self.max_pages {
            let hits = match tokio::time::timeout(self.timeout, self.search.search_page(query, page)).await {
                Ok(Ok(hits)) => hits,
                Ok(Err(e)) => {
                    warn!("Search failed on page {}: {}", page, e);
                    break;
                }
                Err(_) => {
                    warn!("Search timed out on page {}", page);
                    break;
                }
            };
            if hits.is_empty() {
                break;
            }

            for hit in hits {
                if saved.len() >= target {
                    break 'pages;
                }
                if skip.contains(&hit.url) || saved.iter().any(|s: &FetchedImage| s.url == hit.url) {
                    continue;
                }
                if !self.allowed_host(&hit.url) {
                    debug!("Skipping blocked host: {}", hit.url);
                    continue;
                }
                if let Some(path) = self.save_image(&hit, query).await {
                    saved.push(FetchedImage { path, url: hit.url });
                }
            }

            if saved.len() >= target {
                break;
            }
        }

        info!("{} image(s) saved for '{}'", saved.len(), query);
        saved
    }

    /// Download and verify one hit, retrying with backoff.
    async fn save_image(&self, hit: &ImageHit, query: &str) -> Option<PathBuf> {
        for attempt in 1..=self.max_attempts {
            match self.try_save(hit, query).await {
                Ok(path) => {
                    debug!("Saved {}", hit.title.as_deref().unwrap_or(&hit.url));
                    return Some(path);
                }
                Err(e) if attempt == self.max_attempts => {
                    warn!("Giving up on {}: {}", hit.url, e);
                }
                Err(e) => {
                    debug!("Attempt {}/{} for {} failed: {}", attempt, self.max_attempts, hit.url, e);
                    if !self.backoff.is_zero() {
                        tokio::time::sleep(self.backoff).await;
                    }
                }
            }
        }
        None
    }

    async fn try_save(&self, hit: &ImageHit, query: &str) -> Result<PathBuf> {
        let bytes = tokio::time::timeout(self.timeout, self.downloader.download(&hit.url))
            .await
            .map_err(|_| ReelcastError::Timeout(self.timeout.as_secs()))??;

        let verified = verify_image(&bytes, self.min_width)?;

        let metadata = ImageMetadata {
            title: hit.title.clone(),
            width: verified.width,
            height: verified.height,
            attribution: hit.attribution.clone(),
            source_url: hit.url.clone(),
            query: query.to_string(),
        };

        store_image(&self.assets_dir, &bytes, verified.extension, &metadata)
    }
}

/// Dimensions and file extension of an accepted image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VerifiedImage {
    pub width: u32,
    pub height: u32,
    pub extension: &'static str,
}

/// Decode `bytes` and require a width of at least `min_width`.
pub fn verify_image(bytes: &[u8], min_width: u32) -> Result<VerifiedImage> {
    let format = image::guess_format(bytes)
        .map_err(|e| ReelcastError::ImageRejected(format!("unknown format: {}", e)))?;
    let decoded = image::load_from_memory_with_format(bytes, format)
        .map_err(|e| ReelcastError::ImageRejected(format!("corrupt image: {}", e)))?;

    if decoded.width() < min_width {
        return Err(ReelcastError::ImageRejected(format!(
            "{}px < {}px",
            decoded.width(),
            min_width
        )));
    }

    Ok(VerifiedImage {
        width: decoded.width(),
        height: decoded.height(),
        extension: format.extensions_str().first().copied().unwrap_or("img"),
    })
}

/// Hex SHA-256 of `bytes`.
pub fn content_hash(bytes: &[u8]) -> String {
    Sha256::digest(bytes).iter().map(|b| format!("{:02x}", b)).collect()
}

/// Write image and sidecar under the content hash.
///
/// On any failure nothing written by this call is left behind.
fn store_image(dir: &Path, bytes: &[u8], extension: &str, metadata: &ImageMetadata) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;

    let hash = content_hash(bytes);
    let image_path = dir.join(format!("{}.{}", hash, extension));
    let sidecar_path = dir.join(format!("{}.json", hash));

    if image_path.is_file() && sidecar_path.is_file() {
        return Ok(image_path);
    }

    // A file already under this hash belongs to an earlier run.
    let created_image = !image_path.is_file();
    if created_image {
        std::fs::write(&image_path, bytes)?;
    }

    let sidecar = serde_json::to_vec_pretty(metadata)
        .map_err(ReelcastError::from)
        .and_then(|json| Ok(std::fs::write(&sidecar_path, json)?));

    if let Err(e) = sidecar {
        if created_image {
            let _ = std::fs::remove_file(&image_path);
        }
        if sidecar_path.is_file() {
            let _ = std::fs::remove_file(&sidecar_path);
        }
        return Err(e);
    }

    Ok(image_path)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    pub(crate) fn png(width: u32, height: u32, shade: u8) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([shade, shade, shade]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    /// Search backed by a fixed query -> pages table.
    pub(crate) struct TableSearch {
        pub pages: HashMap<String, Vec<Vec<ImageHit>>>,
        pub calls: Mutex<Vec<(String, u32)>>,
    }

    impl TableSearch {
        pub fn new(pages: HashMap<String, Vec<Vec<ImageHit>>>) -> Self {
            Self { pages, calls: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl ImageSearch for TableSearch {
        async fn search_page(&self, query: &str, page: u32) -> Result<Vec<ImageHit>> {
            self.calls.lock().unwrap().push((query.to_string(), page));
            Ok(self
                .pages
                .get(query)
                .and_then(|pages| pages.get(page as usize))
                .cloned()
                .unwrap_or_default())
        }
    }

    /// Serves fixed bytes per URL and counts downloads.
    pub(crate) struct MapDownloader {
        pub files: HashMap<String, Vec<u8>>,
        pub downloads: AtomicUsize,
    }

    impl MapDownloader {
        pub fn new(files: HashMap<String, Vec<u8>>) -> Self {
            Self { files, downloads: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl Downloader for MapDownloader {
        async fn download(&self, url: &str) -> Result<Vec<u8>> {
            self.downloads.fetch_add(1, Ordering::SeqCst);
            self.files
                .get(url)
                .cloned()
                .ok_or_else(|| ReelcastError::ImageSearch(format!("404 {}", url)))
        }
    }

    pub(crate) fn hit(url: &str) -> ImageHit {
        ImageHit { url: url.to_string(), title: Some(format!("title of {}", url)), width: None, attribution: None }
    }

    pub(crate) fn fast_settings() -> VisualSettings {
        VisualSettings {
            min_width: 100,
            retry_backoff_ms: 0,
            ..VisualSettings::default()
        }
    }

    fn files_in(dir: &Path) -> usize {
        std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
    }

    #[tokio::test]
    async fn test_undersized_images_leave_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let mut pages = HashMap::new();
        pages.insert(
            "small".to_string(),
            vec![vec![hit("https://a.com/1.png"), hit("https://a.com/2.png")]],
        );
        let mut files = HashMap::new();
        files.insert("https://a.com/1.png".to_string(), png(50, 10, 1));
        files.insert("https://a.com/2.png".to_string(), png(99, 10, 2));

        let downloader = Arc::new(MapDownloader::new(files));
        let fetcher = AssetFetcher::new(
            Arc::new(TableSearch::new(pages)),
            downloader.clone(),
            dir.path().to_path_buf(),
            &fast_settings(),
        );

        let fetched = fetcher.fetch("small", 1, &HashSet::new()).await;

        assert!(fetched.is_empty());
        assert_eq!(files_in(dir.path()), 0);
        // Each URL is attempted the full budget
        assert_eq!(downloader.downloads.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn test_saves_image_and_sidecar_by_content_hash() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = png(120, 40, 7);
        let mut pages = HashMap::new();
        pages.insert("wide".to_string(), vec![vec![hit("https://b.com/wide.png")]]);
        let mut files = HashMap::new();
        files.insert("https://b.com/wide.png".to_string(), bytes.clone());

        let fetcher = AssetFetcher::new(
            Arc::new(TableSearch::new(pages)),
            Arc::new(MapDownloader::new(files)),
            dir.path().to_path_buf(),
            &fast_settings(),
        );

        let fetched = fetcher.fetch("wide", 1, &HashSet::new()).await;
        assert_eq!(fetched.len(), 1);

        let hash = content_hash(&bytes);
        assert_eq!(fetched[0].path, dir.path().join(format!("{}.png", hash)));

        let sidecar: ImageMetadata =
            serde_json::from_slice(&std::fs::read(dir.path().join(format!("{}.json", hash))).unwrap()).unwrap();
        assert_eq!(sidecar.width, 120);
        assert_eq!(sidecar.query, "wide");
        assert_eq!(sidecar.source_url, "https://b.com/wide.png");
    }

    #[tokio::test]
    async fn test_blocked_hosts_are_never_downloaded() {
        let dir = tempfile::tempdir().unwrap();
        let mut pages = HashMap::new();
        pages.insert(
            "q".to_string(),
            vec![vec![hit("https://img.uefa.com/x.png"), hit("https://ok.com/y.png")]],
        );
        let mut files = HashMap::new();
        files.insert("https://img.uefa.com/x.png".to_string(), png(200, 10, 3));
        files.insert("https://ok.com/y.png".to_string(), png(200, 10, 4));

        let downloader = Arc::new(MapDownloader::new(files));
        let fetcher = AssetFetcher::new(
            Arc::new(TableSearch::new(pages)),
            downloader.clone(),
            dir.path().to_path_buf(),
            &fast_settings(),
        );

        let fetched = fetcher.fetch("q", 1, &HashSet::new()).await;
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].url, "https://ok.com/y.png");
        assert_eq!(downloader.downloads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_paginates_until_empty_page_or_target() {
        let dir = tempfile::tempdir().unwrap();
        let mut pages = HashMap::new();
        pages.insert(
            "q".to_string(),
            vec![
                vec![hit("https://c.com/broken.png")],
                vec![hit("https://c.com/good.png")],
                vec![hit("https://c.com/never.png")],
            ],
        );
        let mut files = HashMap::new();
        files.insert("https://c.com/broken.png".to_string(), b"not an image".to_vec());
        files.insert("https://c.com/good.png".to_string(), png(150, 10, 5));

        let search = Arc::new(TableSearch::new(pages));
        let fetcher = AssetFetcher::new(
            search.clone(),
            Arc::new(MapDownloader::new(files)),
            dir.path().to_path_buf(),
            &fast_settings(),
        );

        let fetched = fetcher.fetch("q", 1, &HashSet::new()).await;
        assert_eq!(fetched.len(), 1);
        assert_eq!(search.calls.lock().unwrap().len(), 2);

        let none = fetcher.fetch("unknown", 1, &HashSet::new()).await;
        assert!(none.is_empty());
        assert_eq!(search.calls.lock().unwrap().last(), Some(&("unknown".to_string(), 0)));
    }

    #[tokio::test]
    async fn test_pagination_stops_at_max_pages() {
        let dir = tempfile::tempdir().unwrap();
        let mut pages = HashMap::new();
        pages.insert(
            "deep".to_string(),
            (0..6).map(|i| vec![hit(&format!("https://p.com/{}.png", i))]).collect(),
        );

        let search = Arc::new(TableSearch::new(pages));
        let settings = VisualSettings { max_pages: 3, ..fast_settings() };
        let fetcher = AssetFetcher::new(
            search.clone(),
            Arc::new(MapDownloader::new(HashMap::new())),
            dir.path().to_path_buf(),
            &settings,
        );

        assert!(fetcher.fetch("deep", 1, &HashSet::new()).await.is_empty());
        let read: Vec<u32> = search.calls.lock().unwrap().iter().map(|(_, p)| *p).collect();
        assert_eq!(read, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_skip_set_is_respected() {
        let dir = tempfile::tempdir().unwrap();
        let mut pages = HashMap::new();
        pages.insert("q".to_string(), vec![vec![hit("https://d.com/1.png"), hit("https://d.com/2.png")]]);
        let mut files = HashMap::new();
        files.insert("https://d.com/1.png".to_string(), png(150, 10, 6));
        files.insert("https://d.com/2.png".to_string(), png(150, 10, 8));

        let fetcher = AssetFetcher::new(
            Arc::new(TableSearch::new(pages)),
            Arc::new(MapDownloader::new(files)),
            dir.path().to_path_buf(),
            &fast_settings(),
        );

        let skip: HashSet<String> = ["https://d.com/1.png".to_string()].into_iter().collect();
        let fetched = fetcher.fetch("q", 1, &skip).await;
        assert_eq!(fetched[0].url, "https://d.com/2.png");
    }

    /// Downloads that never complete.
    struct StalledDownloader {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Downloader for StalledDownloader {
        async fn download(&self, _url: &str) -> Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::future::pending().await
        }
    }

    /// Searches that never answer.
    struct StalledSearch {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ImageSearch for StalledSearch {
        async fn search_page(&self, _query: &str, _page: u32) -> Result<Vec<ImageHit>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_download_times_out_each_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let mut pages = HashMap::new();
        pages.insert("slow".to_string(), vec![vec![hit("https://slow.com/1.png")]]);

        let settings = VisualSettings {
            min_width: 100,
            fetch_timeout_secs: 1,
            retry_backoff_ms: 1000,
            max_attempts: 3,
            ..VisualSettings::default()
        };
        let downloader = Arc::new(StalledDownloader { calls: AtomicUsize::new(0) });
        let fetcher = AssetFetcher::new(
            Arc::new(TableSearch::new(pages)),
            downloader.clone(),
            dir.path().to_path_buf(),
            &settings,
        );

        let started = tokio::time::Instant::now();
        let fetched = fetcher.fetch("slow", 1, &HashSet::new()).await;

        assert!(fetched.is_empty());
        assert_eq!(downloader.calls.load(Ordering::SeqCst), 3);
        assert_eq!(files_in(dir.path()), 0);
        // Three timeouts plus two backoff sleeps
        assert!(started.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_search_returns_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let search = Arc::new(StalledSearch { calls: AtomicUsize::new(0) });
        let downloader = Arc::new(MapDownloader::new(HashMap::new()));
        let settings = VisualSettings { fetch_timeout_secs: 2, ..fast_settings() };
        let fetcher = AssetFetcher::new(search.clone(), downloader.clone(), dir.path().to_path_buf(), &settings);

        let fetched = fetcher.fetch("anything", 2, &HashSet::new()).await;

        assert!(fetched.is_empty());
        assert_eq!(search.calls.load(Ordering::SeqCst), 1);
        assert_eq!(downloader.downloads.load(Ordering::SeqCst), 0);
    }

    fn metadata_for(url: &str) -> ImageMetadata {
        ImageMetadata {
            title: None,
            width: 150,
            height: 10,
            attribution: None,
            source_url: url.to_string(),
            query: "q".to_string(),
        }
    }

    #[test]
    fn test_failed_sidecar_keeps_existing_image() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = png(150, 10, 3);
        let hash = content_hash(&bytes);
        let image_path = dir.path().join(format!("{}.png", hash));
        std::fs::write(&image_path, &bytes).unwrap();
        // A directory where the sidecar should go makes the sidecar write fail
        std::fs::create_dir(dir.path().join(format!("{}.json", hash))).unwrap();

        let result = store_image(dir.path(), &bytes, "png", &metadata_for("https://e.com/1.png"));

        assert!(result.is_err());
        assert!(image_path.is_file());
        assert_eq!(std::fs::read(&image_path).unwrap(), bytes);
    }

    #[test]
    fn test_failed_sidecar_removes_image_written_by_the_same_call() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = png(150, 10, 4);
        let hash = content_hash(&bytes);
        std::fs::create_dir(dir.path().join(format!("{}.json", hash))).unwrap();

        let result = store_image(dir.path(), &bytes, "png", &metadata_for("https://e.com/2.png"));

        assert!(result.is_err());
        assert!(!dir.path().join(format!("{}.png", hash)).exists());
    }

    #[test]
    fn test_verify_image_rejects_garbage_and_narrow() {
        assert!(verify_image(b"definitely not a png", 1).is_err());
        assert!(verify_image(&png(999, 2, 0), 1000).is_err());
        let ok = verify_image(&png(1000, 2, 0), 1000).unwrap();
        assert_eq!(ok.width, 1000);
        assert_eq!(ok.extension, "png");
    }
}
