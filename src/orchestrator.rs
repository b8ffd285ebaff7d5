use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;

use crate::cache::{CacheEntry, CacheIndex};
use crate::error::{ProxyError, Result};
use crate::fingerprint::{Fingerprint, fingerprint};
use crate::gateway::GenerationGateway;
use crate::metrics::{CACHE_HITS, CACHE_MISSES};
use crate::models::{CacheMetadata, GenerationRequest};
use crate::store::ArtifactStore;

// Result of one generate call
#[derive(Debug, Clone)]
pub struct GenerateOutcome {
    pub image: Vec<u8>,
    pub metadata: CacheMetadata,
    pub fingerprint: Fingerprint,
    pub filename: String,
    pub cached: bool,
}

impl GenerateOutcome {
    fn from_entry(entry: CacheEntry, image: Vec<u8>) -> Self {
        Self {
            image,
            metadata: entry.metadata,
            fingerprint: entry.fingerprint,
            filename: entry.filename,
            cached: true,
        }
    }
}

/// Ties fingerprinting, the index, the artifact store and the backend
/// together for each generate request.
///
/// Concurrent misses for the same fingerprint are serialized so only one of
/// them reaches the backend; the others are served from the entry it
/// creates. Backend calls and disk I/O never run under the index lock.
///
/// A miss runs on its own task: once started, a generation is cached even
/// if the caller goes away. Cloning is cheap and shares all state.
#[derive(Clone)]
pub struct Orchestrator {
    index: Arc<CacheIndex>,
    store: Arc<ArtifactStore>,
    gateway: GenerationGateway,
    inflight: Arc<DashMap<Fingerprint, Arc<AsyncMutex<()>>>>,
}

impl Orchestrator {
    pub fn new(index: Arc<CacheIndex>, store: Arc<ArtifactStore>, gateway: GenerationGateway) -> Self {
        Self {
            index,
            store,
            gateway,
            inflight: Arc::new(DashMap::new()),
        }
    }

    pub fn index(&self) -> &CacheIndex {
        &self.index
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn gateway(&self) -> &GenerationGateway {
        &self.gateway
    }

    pub async fn handle_generate(&self, request: &GenerationRequest) -> Result<GenerateOutcome> {
        let key = fingerprint(request);

        // fast path, no per-key lock
        if let Some(hit) = self.try_cached(&key).await {
            return Ok(hit);
        }

        let this = self.clone();
        let request = request.clone();
        tokio::spawn(async move { this.generate_detached(key, request).await })
            .await
            .map_err(|e| ProxyError::Task(e.to_string()))?
    }

    // Owns everything it touches, so dropping the caller cannot cut it short
    async fn generate_detached(
        self,
        key: Fingerprint,
        request: GenerationRequest,
    ) -> Result<GenerateOutcome> {
        let slot = self.inflight.entry(key.clone()).or_default().clone();
        let result = {
            let _guard = slot.lock().await;
            self.generate_locked(&key, &request).await
        };
        drop(slot);
        self.inflight.remove_if(&key, |_, s| Arc::strong_count(s) == 1);

        result
    }

    /// Look up a cached image by key without generating anything.
    pub async fn cached_image(&self, key: &Fingerprint) -> Result<(CacheEntry, Vec<u8>)> {
        let entry = self
            .index
            .lookup(key)
            .ok_or_else(|| ProxyError::NotFound(format!("cache key {key} not found")))?;
        let image = self.store.read(&entry.filename).await?;
        Ok((entry, image))
    }

    async fn try_cached(&self, key: &Fingerprint) -> Option<GenerateOutcome> {
        let entry = self.index.lookup(key)?;
        match self.store.read(&entry.filename).await {
            Ok(image) => {
                CACHE_HITS.inc();
                tracing::debug!(cache_key = %key, filename = %entry.filename, "Cache HIT");
                Some(GenerateOutcome::from_entry(entry, image))
            }
            Err(_) => None,
        }
    }

    // Runs with the per-key slot held, so nothing else mutates `key` meanwhile
    async fn generate_locked(
        &self,
        key: &Fingerprint,
        request: &GenerationRequest,
    ) -> Result<GenerateOutcome> {
        // another request may have filled or healed the entry while we waited
        if let Some(entry) = self.index.lookup(key) {
            match self.store.read(&entry.filename).await {
                Ok(image) => {
                    CACHE_HITS.inc();
                    tracing::debug!(cache_key = %key, "Cache HIT after wait");
                    return Ok(GenerateOutcome::from_entry(entry, image));
                }
                Err(e) => {
                    tracing::warn!(
                        cache_key = %key,
                        filename = %entry.filename,
                        error = %e,
                        "Cached file not found, regenerating"
                    );
                    self.index.invalidate(key);
                }
            }
        }

        CACHE_MISSES.inc();
        tracing::info!(cache_key = %key, "Cache MISS - calling backend");

        let image = self.gateway.generate(request).await?;
        let filename = self.store.write(&image).await?;
        let metadata = CacheMetadata::from_request(request);
        let entry = self.index.insert(key.clone(), filename, metadata).await;

        tracing::info!(cache_key = %key, filename = %entry.filename, "Generated and cached image");

        Ok(GenerateOutcome {
            image,
            metadata: entry.metadata,
            fingerprint: entry.fingerprint,
            filename: entry.filename,
            cached: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    // "hello" / "world"
    const IMAGE_A: &str = "aGVsbG8=";
    const IMAGE_B: &str = "d29ybGQ=";

    fn request(value: Value) -> GenerationRequest {
        GenerationRequest::try_from(value).unwrap()
    }

    fn setup(server_uri: &str, capacity: usize) -> (tempfile::TempDir, Orchestrator) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ArtifactStore::new(dir.path()));
        let index = Arc::new(CacheIndex::new(capacity, Arc::clone(&store)));
        let gateway = GenerationGateway::new(server_uri, Duration::from_secs(5)).unwrap();
        (dir, Orchestrator::new(index, store, gateway))
    }

    async fn mock_backend(image: &str, expected_calls: u64) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sdapi/v1/txt2img"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "images": [image] })))
            .expect(expected_calls)
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn second_identical_request_is_cached() {
        let server = mock_backend(IMAGE_A, 1).await;
        let (_dir, orch) = setup(&server.uri(), 30);
        let req = request(json!({"prompt": "cat", "steps": 20}));

        let first = orch.handle_generate(&req).await.unwrap();
        let second = orch.handle_generate(&req).await.unwrap();

        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(first.image, b"hello");
        assert_eq!(first.image, second.image);
        assert_eq!(first.fingerprint, second.fingerprint);
        assert_eq!(first.metadata, second.metadata);
        assert_eq!(second.metadata.prompt, "cat");
    }

    #[tokio::test]
    async fn reordered_request_hits_cache() {
        let server = mock_backend(IMAGE_A, 1).await;
        let (_dir, orch) = setup(&server.uri(), 30);

        let a: Value = serde_json::from_str(r#"{"prompt":"cat","steps":20}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"steps":20,"prompt":"cat"}"#).unwrap();

        assert!(!orch.handle_generate(&request(a)).await.unwrap().cached);
        assert!(orch.handle_generate(&request(b)).await.unwrap().cached);
    }

    #[tokio::test]
    async fn dangling_entry_regenerates_once() {
        let server = mock_backend(IMAGE_A, 2).await;
        let (_dir, orch) = setup(&server.uri(), 30);
        let req = request(json!({"prompt": "cat"}));

        let first = orch.handle_generate(&req).await.unwrap();
        std::fs::remove_file(orch.store().root().join(&first.filename)).unwrap();

        let second = orch.handle_generate(&req).await.unwrap();
        assert!(!second.cached);
        assert_eq!(second.image, b"hello");
        assert_ne!(second.filename, first.filename);
        assert_eq!(orch.index().len(), 1);
        assert_eq!(orch.index().lookup(&second.fingerprint).unwrap().filename, second.filename);

        let third = orch.handle_generate(&req).await.unwrap();
        assert!(third.cached);
    }

    #[tokio::test]
    async fn backend_failure_leaves_index_untouched() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"images": []})))
            .mount(&server)
            .await;
        let (dir, orch) = setup(&server.uri(), 30);

        let err = orch.handle_generate(&request(json!({"prompt": "cat"}))).await.unwrap_err();
        assert!(matches!(err, ProxyError::EmptyResult));
        assert!(orch.index().is_empty());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn store_write_failure_propagates() {
        let server = mock_backend(IMAGE_A, 1).await;
        let (dir, orch) = setup(&server.uri(), 30);
        std::fs::remove_dir(dir.path()).unwrap();

        let err = orch.handle_generate(&request(json!({"prompt": "cat"}))).await.unwrap_err();
        assert!(matches!(err, ProxyError::Storage(_)));
        assert!(orch.index().is_empty());
    }

    #[tokio::test]
    async fn capacity_evicts_first_request() {
        let server = mock_backend(IMAGE_B, 3).await;
        let (_dir, orch) = setup(&server.uri(), 2);

        let mut outcomes = Vec::new();
        for n in 0..3 {
            outcomes.push(orch.handle_generate(&request(json!({ "seed": n }))).await.unwrap());
        }

        assert!(orch.index().lookup(&outcomes[0].fingerprint).is_none());
        assert!(!orch.store().exists(&outcomes[0].filename).await);
        assert!(orch.index().lookup(&outcomes[1].fingerprint).is_some());
        assert!(orch.index().lookup(&outcomes[2].fingerprint).is_some());
    }

    #[tokio::test]
    async fn concurrent_misses_call_backend_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "images": [IMAGE_A] }))
                    .set_delay(Duration::from_millis(200)),
            )
            .expect(1)
            .mount(&server)
            .await;
        let (_dir, orch) = setup(&server.uri(), 30);
        let orch = Arc::new(orch);
        let req = request(json!({"prompt": "cat"}));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let orch = Arc::clone(&orch);
                let req = req.clone();
                tokio::spawn(async move { orch.handle_generate(&req).await.unwrap() })
            })
            .collect();

        let mut generated = 0;
        for handle in handles {
            if !handle.await.unwrap().cached {
                generated += 1;
            }
        }
        assert_eq!(generated, 1);
        assert_eq!(orch.index().len(), 1);
        assert!(orch.inflight.is_empty());
    }

    #[tokio::test]
    async fn abandoned_caller_still_caches_generation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "images": [IMAGE_A] }))
                    .set_delay(Duration::from_millis(400)),
            )
            .expect(1)
            .mount(&server)
            .await;
        let (dir, orch) = setup(&server.uri(), 30);
        let req = request(json!({"prompt": "cat"}));

        let caller = {
            let orch = orch.clone();
            let req = req.clone();
            tokio::spawn(async move { orch.handle_generate(&req).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        caller.abort();
        assert!(caller.await.unwrap_err().is_cancelled());

        tokio::time::sleep(Duration::from_millis(800)).await;
        assert_eq!(orch.index().len(), 1);
        assert!(orch.inflight.is_empty());
        let entry = orch.index().list_all().remove(0);
        assert!(orch.store().exists(&entry.filename).await);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);

        // served from cache, no second backend call
        assert!(orch.handle_generate(&req).await.unwrap().cached);
    }

    #[tokio::test]
    async fn cached_image_reports_missing_artifact() {
        let server = mock_backend(IMAGE_A, 1).await;
        let (_dir, orch) = setup(&server.uri(), 30);

        let outcome = orch.handle_generate(&request(json!({"prompt": "cat"}))).await.unwrap();
        let (entry, image) = orch.cached_image(&outcome.fingerprint).await.unwrap();
        assert_eq!(entry.filename, outcome.filename);
        assert_eq!(image, b"hello");

        std::fs::remove_file(orch.store().root().join(&outcome.filename)).unwrap();
        assert!(matches!(
            orch.cached_image(&outcome.fingerprint).await,
            Err(ProxyError::NotFound(_))
        ));
        assert!(matches!(
            orch.cached_image(&Fingerprint::from("nope".to_string())).await,
            Err(ProxyError::NotFound(_))
        ));
    }
}
