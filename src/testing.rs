use std::{
    collections::{HashMap, HashSet, VecDeque},
    io::Cursor,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use image::{GrayImage, ImageFormat, Luma};
use parking_lot::Mutex;

use crate::{
    detection::{
        suspicion::{ScoreComponents, SuspicionReport},
        PipelineError, PostInspector,
    },
    domain::{Account, ActionKind, Comment, MatchResult, ModerationAction, Post},
    imaging::{
        Correspondence, DescriptorSet, ImageCapability, ImageError, ImageFetcher,
        OrientedPatchExtractor, Raster,
    },
    platform::{PlatformClient, PlatformError, SessionFactory, TopWindow},
    tasks::ScanSettings,
};

const EPOCH: i64 = 1_700_000_000;

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(EPOCH + secs, 0)
        .single()
        .expect("valid test timestamp")
}

pub fn image_post(id: &str, title: &str, created: i64) -> Post {
    Post {
        id: id.to_string(),
        author: Some(format!("author_{id}")),
        subreddit: "pics".to_string(),
        permalink: format!("/r/pics/comments/{id}/x/"),
        url: format!("https://i.redd.it/{id}.jpg"),
        title: title.to_string(),
        created: at(created),
        is_self: false,
        locked: false,
        stickied: false,
        likes: None,
    }
}

pub fn text_post(id: &str, title: &str) -> Post {
    Post {
        is_self: true,
        url: format!("https://www.reddit.com/r/pics/comments/{id}/x/"),
        ..image_post(id, title, 0)
    }
}

pub fn comment(id: &str, permalink: &str) -> Comment {
    Comment {
        id: id.to_string(),
        author: Some(format!("author_{id}")),
        permalink: permalink.to_string(),
        body: "nice".to_string(),
        created: at(0),
    }
}

pub fn settings() -> ScanSettings {
    ScanSettings::new(
        0.5,
        0.5,
        vec![
            ActionKind::Debug,
            ActionKind::Downvote,
            ActionKind::Reply,
            ActionKind::Report,
        ],
        false,
        Duration::from_secs(30),
        Duration::from_secs(1_200),
    )
}

pub fn textured_image(seed: u64, size: u32) -> GrayImage {
    const BLOCK: u32 = 4;
    let blocks = size.div_ceil(BLOCK);
    let mut state = seed.wrapping_mul(0x9E37_79B9_7F4A_7C15).wrapping_add(1);
    let mut values = Vec::with_capacity((blocks * blocks) as usize);
    for _ in 0..blocks * blocks {
        state = state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        values.push((state >> 56) as u8);
    }
    GrayImage::from_fn(size, size, |x, y| {
        Luma([values[((y / BLOCK) * blocks + x / BLOCK) as usize]])
    })
}

pub fn encode_png(image: &GrayImage) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    image
        .write_to(&mut buf, ImageFormat::Png)
        .expect("encode test png");
    buf.into_inner()
}

#[derive(Default)]
struct PlatformState {
    new_posts: Vec<Post>,
    posts: HashMap<String, Post>,
    accounts: HashMap<String, (Account, usize, usize)>,
    search_results: Vec<Post>,
    search_queries: Vec<(String, String)>,
    replied: HashSet<String>,
    rejected_sources: HashSet<String>,
    actions: Vec<(String, ModerationAction)>,
    listing_failures: VecDeque<PlatformError>,
    fetch_post_failures: VecDeque<PlatformError>,
    account_failures: VecDeque<PlatformError>,
    action_failures: VecDeque<PlatformError>,
    fetch_post_calls: usize,
    top_count_calls: usize,
}

pub struct FakePlatform {
    username: String,
    state: Mutex<PlatformState>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self {
            username: "exterminator".to_string(),
            state: Mutex::new(PlatformState::default()),
        }
    }

    pub fn set_new_posts(&self, posts: Vec<Post>) {
        self.state.lock().new_posts = posts;
    }

    pub fn insert_post(&self, post: Post) {
        self.state.lock().posts.insert(post.id.clone(), post);
    }

    pub fn insert_account(&self, account: Account, lifetime_top: usize, recent_top: usize) {
        self.state
            .lock()
            .accounts
            .insert(account.name.clone(), (account, lifetime_top, recent_top));
    }

    pub fn set_search_results(&self, posts: Vec<Post>) {
        self.state.lock().search_results = posts;
    }

    pub fn mark_replied(&self, post_id: &str) {
        self.state.lock().replied.insert(post_id.to_string());
    }

    pub fn reject_source(&self, source: &str) {
        self.state.lock().rejected_sources.insert(source.to_string());
    }

    pub fn fail_next_listing(&self, err: PlatformError) {
        self.state.lock().listing_failures.push_back(err);
    }

    pub fn fail_next_fetch_post(&self, err: PlatformError) {
        self.state.lock().fetch_post_failures.push_back(err);
    }

    pub fn fail_next_account_fetch(&self, err: PlatformError) {
        self.state.lock().account_failures.push_back(err);
    }

    pub fn fail_next_action(&self, err: PlatformError) {
        self.state.lock().action_failures.push_back(err);
    }

    pub fn actions(&self) -> Vec<(String, ModerationAction)> {
        self.state.lock().actions.clone()
    }

    pub fn search_queries(&self) -> Vec<(String, String)> {
        self.state.lock().search_queries.clone()
    }

    pub fn search_calls(&self) -> usize {
        self.state.lock().search_queries.len()
    }

    pub fn fetch_post_calls(&self) -> usize {
        self.state.lock().fetch_post_calls
    }

    pub fn top_count_calls(&self) -> usize {
        self.state.lock().top_count_calls
    }
}

#[async_trait]
impl PlatformClient for FakePlatform {
    fn username(&self) -> &str {
        &self.username
    }

    async fn validate_source(&self, source: &str) -> Result<(), PlatformError> {
        if self.state.lock().rejected_sources.contains(source) {
            return Err(PlatformError::NotFound(format!("r/{source}")));
        }
        Ok(())
    }

    async fn fetch_new_posts(
        &self,
        _sources: &[String],
        limit: usize,
    ) -> Result<Vec<Post>, PlatformError> {
        let mut state = self.state.lock();
        if let Some(err) = state.listing_failures.pop_front() {
            return Err(err);
        }
        Ok(state.new_posts.iter().take(limit).cloned().collect())
    }

    async fn fetch_post(&self, id: &str) -> Result<Post, PlatformError> {
        let mut state = self.state.lock();
        state.fetch_post_calls += 1;
        if let Some(err) = state.fetch_post_failures.pop_front() {
            return Err(err);
        }
        state
            .posts
            .get(id)
            .cloned()
            .ok_or_else(|| PlatformError::NotFound(id.to_string()))
    }

    async fn fetch_account(&self, name: &str, limit: usize) -> Result<Account, PlatformError> {
        let mut state = self.state.lock();
        if let Some(err) = state.account_failures.pop_front() {
            return Err(err);
        }
        let (account, _, _) = state
            .accounts
            .get(name)
            .ok_or_else(|| PlatformError::NotFound(name.to_string()))?;
        let mut account = account.clone();
        account.activity.truncate(limit);
        Ok(account)
    }

    async fn count_top_content(
        &self,
        name: &str,
        window: TopWindow,
        limit: usize,
    ) -> Result<usize, PlatformError> {
        let mut state = self.state.lock();
        state.top_count_calls += 1;
        let count = state
            .accounts
            .get(name)
            .map(|(_, lifetime, recent)| match window {
                TopWindow::All => *lifetime,
                TopWindow::Month => *recent,
            })
            .unwrap_or(0);
        Ok(count.min(limit))
    }

    async fn search(
        &self,
        scope: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Post>, PlatformError> {
        let mut state = self.state.lock();
        state
            .search_queries
            .push((scope.to_string(), query.to_string()));
        Ok(state.search_results.iter().take(limit).cloned().collect())
    }

    async fn apply_action(
        &self,
        post: &Post,
        action: &ModerationAction,
    ) -> Result<(), PlatformError> {
        let mut state = self.state.lock();
        if let Some(err) = state.action_failures.pop_front() {
            return Err(err);
        }
        state.actions.push((post.id.clone(), action.clone()));
        Ok(())
    }

    async fn has_reply_from(&self, _account: &str, post: &Post) -> Result<bool, PlatformError> {
        Ok(self.state.lock().replied.contains(&post.id))
    }
}

pub struct FakeSessionFactory {
    platform: Arc<FakePlatform>,
    opened: AtomicUsize,
}

impl FakeSessionFactory {
    pub fn new(platform: Arc<FakePlatform>) -> Self {
        Self {
            platform,
            opened: AtomicUsize::new(0),
        }
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionFactory for FakeSessionFactory {
    async fn open_session(&self) -> Result<Arc<dyn PlatformClient>, PlatformError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let client: Arc<dyn PlatformClient> = self.platform.clone();
        Ok(client)
    }
}

pub struct FakeImageFetcher {
    images: Mutex<HashMap<String, Vec<u8>>>,
    calls: AtomicUsize,
}

impl FakeImageFetcher {
    pub fn new() -> Self {
        Self {
            images: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn insert(&self, url: &str, bytes: Vec<u8>) {
        self.images.lock().insert(url.to_string(), bytes);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageFetcher for FakeImageFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ImageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.images
            .lock()
            .get(url)
            .cloned()
            .ok_or_else(|| ImageError::Fetch(format!("{url}: 404")))
    }
}

pub struct CountingCapability {
    inner: OrientedPatchExtractor,
    calls: AtomicUsize,
}

impl CountingCapability {
    pub fn new() -> Self {
        Self {
            inner: OrientedPatchExtractor,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ImageCapability for CountingCapability {
    fn decode_and_normalize(&self, bytes: &[u8]) -> Result<Raster, ImageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.decode_and_normalize(bytes)
    }

    fn extract_descriptors(&self, raster: &Raster) -> DescriptorSet {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.extract_descriptors(raster)
    }

    fn match_descriptors(
        &self,
        query: &DescriptorSet,
        train: &DescriptorSet,
        k: usize,
    ) -> Vec<Vec<Correspondence>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.match_descriptors(query, train, k)
    }
}

pub struct FixedInspector {
    user_score: f64,
    post_score: f64,
    candidate: Option<Post>,
    suspicion_calls: AtomicUsize,
    match_calls: AtomicUsize,
}

impl FixedInspector {
    pub fn new(user_score: f64, post_score: f64, candidate: Option<Post>) -> Self {
        Self {
            user_score,
            post_score,
            candidate,
            suspicion_calls: AtomicUsize::new(0),
            match_calls: AtomicUsize::new(0),
        }
    }

    pub fn suspicion_calls(&self) -> usize {
        self.suspicion_calls.load(Ordering::SeqCst)
    }

    pub fn match_calls(&self) -> usize {
        self.match_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PostInspector for FixedInspector {
    async fn user_suspicion(
        &self,
        _client: &dyn PlatformClient,
        author: &str,
    ) -> Result<SuspicionReport, PipelineError> {
        self.suspicion_calls.fetch_add(1, Ordering::SeqCst);
        Ok(SuspicionReport {
            account: author.to_string(),
            components: ScoreComponents::default(),
            score: self.user_score,
        })
    }

    async fn repost_match(
        &self,
        _client: &dyn PlatformClient,
        _post: &Post,
    ) -> Result<MatchResult, PipelineError> {
        self.match_calls.fetch_add(1, Ordering::SeqCst);
        Ok(MatchResult {
            candidate: self.candidate.clone(),
            confidence: self.post_score,
        })
    }
}
