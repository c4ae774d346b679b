//! The shared resource cache: typed stores, the fetch queue and the
//! decode worker pool.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use dashmap::DashMap;
use tracing::{debug, warn};

use crate::budget::{select_evictions, CacheBudget, EvictionCandidate};
use crate::codec;
use crate::geodata::GeodataTile;
use crate::queue::{FetchJob, FetchKind, FetchQueue};
use crate::resource::{Resource, Validity};
use crate::transport::{TileTransport, TransportError};
use crate::types::{GeodataFeatures, GeodataStyle, MeshAggregate, MetaTile, Texture};

/// Snapshot of cache counters, taken once per frame for logging.
#[derive(Clone, Copy, Debug, Default)]
pub struct CacheStats {
    pub pending_jobs: usize,
    pub meta_count: usize,
    pub mesh_count: usize,
    pub texture_count: usize,
    pub geodata_count: usize,
    pub mesh_bytes: usize,
    pub texture_bytes: usize,
    pub completed: u64,
    pub failed: u64,
    pub evicted: u64,
}

/// Worker threads to run when the caller does not configure a count.
pub fn default_worker_count() -> usize {
    num_cpus::get().saturating_sub(1).clamp(1, 8)
}

struct CacheInner {
    transport: Arc<dyn TileTransport>,
    budget: CacheBudget,
    queue: Mutex<FetchQueue>,
    shutdown: AtomicBool,
    tick: AtomicU64,

    meta: DashMap<String, Arc<Resource<MetaTile>>>,
    meshes: DashMap<String, Arc<Resource<MeshAggregate>>>,
    textures: DashMap<String, Arc<Resource<Texture>>>,
    styles: DashMap<String, Arc<Resource<GeodataStyle>>>,
    features: DashMap<String, Arc<Resource<GeodataFeatures>>>,
    geodata: DashMap<String, Arc<GeodataTile>>,

    mesh_bytes: AtomicUsize,
    texture_bytes: AtomicUsize,
    completed: AtomicU64,
    failed: AtomicU64,
    evicted: AtomicU64,
}

/// Owns the typed resource stores and the worker pool.
///
/// All `fetch_*` methods are poll-style: they return the shared handle
/// immediately and schedule background work as needed. With
/// `worker_count == 0` nothing runs in the background and
/// [`ResourceCache::pump`] drains the queue on the calling thread,
/// which keeps tests deterministic.
pub struct ResourceCache {
    inner: Arc<CacheInner>,
    work_tx: Sender<()>,
    workers: Vec<JoinHandle<()>>,
}

impl ResourceCache {
    pub fn new(
        transport: Arc<dyn TileTransport>,
        budget: CacheBudget,
        worker_count: usize,
    ) -> Self {
        let inner = Arc::new(CacheInner {
            transport,
            budget,
            queue: Mutex::new(FetchQueue::new()),
            shutdown: AtomicBool::new(false),
            tick: AtomicU64::new(0),
            meta: DashMap::new(),
            meshes: DashMap::new(),
            textures: DashMap::new(),
            styles: DashMap::new(),
            features: DashMap::new(),
            geodata: DashMap::new(),
            mesh_bytes: AtomicUsize::new(0),
            texture_bytes: AtomicUsize::new(0),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
        });

        let (work_tx, work_rx) = unbounded();
        let workers = (0..worker_count)
            .map(|i| {
                let inner = Arc::clone(&inner);
                let work_rx: Receiver<()> = work_rx.clone();
                std::thread::Builder::new()
                    .name(format!("tellus-fetch-{i}"))
                    .spawn(move || worker_loop(&inner, &work_rx))
                    .expect("failed to spawn fetch worker")
            })
            .collect();

        Self {
            inner,
            work_tx,
            workers,
        }
    }

    /// Advance the render tick. Call once at the start of each frame;
    /// the returned tick timestamps all touches within the frame.
    pub fn begin_frame(&self) -> u64 {
        self.inner.tick.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn current_tick(&self) -> u64 {
        self.inner.tick.load(Ordering::Acquire)
    }

    pub fn fetch_meta(&self, key: &str, priority: f64) -> Arc<Resource<MetaTile>> {
        self.fetch_in(&self.inner.meta, FetchKind::MetaTile, key, priority)
    }

    pub fn fetch_mesh(&self, key: &str, priority: f64) -> Arc<Resource<MeshAggregate>> {
        self.fetch_in(&self.inner.meshes, FetchKind::Mesh, key, priority)
    }

    pub fn fetch_texture(&self, key: &str, priority: f64) -> Arc<Resource<Texture>> {
        self.fetch_in(&self.inner.textures, FetchKind::Texture, key, priority)
    }

    pub fn fetch_style(&self, key: &str, priority: f64) -> Arc<Resource<GeodataStyle>> {
        self.fetch_in(&self.inner.styles, FetchKind::Style, key, priority)
    }

    pub fn fetch_features(&self, key: &str, priority: f64) -> Arc<Resource<GeodataFeatures>> {
        self.fetch_in(&self.inner.features, FetchKind::Features, key, priority)
    }

    /// Get or create the geodata tile for `key` and, when the inputs
    /// differ from what it was last built from, schedule a rebuild.
    pub fn fetch_geodata(
        &self,
        key: &str,
        style: Arc<GeodataStyle>,
        features: Arc<GeodataFeatures>,
        options: serde_json::Value,
        priority: f64,
    ) -> Arc<GeodataTile> {
        let tile = self
            .inner
            .geodata
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(GeodataTile::new(key.to_string())))
            .clone();
        if tile.update(style, features, options) {
            self.enqueue(
                FetchJob {
                    kind: FetchKind::GeodataAssemble,
                    key: key.to_string(),
                },
                priority,
            );
        }
        tile
    }

    fn fetch_in<T>(
        &self,
        store: &DashMap<String, Arc<Resource<T>>>,
        kind: FetchKind,
        key: &str,
        priority: f64,
    ) -> Arc<Resource<T>> {
        let tick = self.current_tick();
        let mut created = false;
        let resource = store
            .entry(key.to_string())
            .or_insert_with(|| {
                created = true;
                Arc::new(Resource::new(key))
            })
            .clone();
        resource.update_priority(priority as f32);
        resource.touch(tick);

        if created {
            self.enqueue(
                FetchJob {
                    kind,
                    key: key.to_string(),
                },
                priority,
            );
        } else if resource.validity() == Validity::Indeterminate {
            // Refresh the queued priority. A job already taken by a
            // worker is left alone.
            let job = FetchJob {
                kind,
                key: key.to_string(),
            };
            let mut queue = self.inner.queue.lock().unwrap();
            if queue.contains(&job) {
                queue.push(job, priority);
            }
        }
        resource
    }

    fn enqueue(&self, job: FetchJob, priority: f64) {
        self.inner.queue.lock().unwrap().push(job, priority);
        let _ = self.work_tx.send(());
    }

    /// Drain the queue on the calling thread. Used when running with
    /// no workers; returns the number of jobs processed.
    pub fn pump(&self) -> usize {
        let mut processed = 0;
        loop {
            let job = self.inner.queue.lock().unwrap().pop();
            match job {
                Some(job) => {
                    process_job(&self.inner, &job);
                    processed += 1;
                }
                None => return processed,
            }
        }
    }

    /// Evict least recently used meshes and textures until both byte
    /// budgets hold. Entries touched in the current frame survive.
    pub fn enforce_budget(&self) {
        let tick = self.current_tick();
        let evicted_meshes = evict_store(
            &self.inner.meshes,
            &self.inner.mesh_bytes,
            self.inner.budget.mesh_budget,
            tick,
        );
        let evicted_textures = evict_store(
            &self.inner.textures,
            &self.inner.texture_bytes,
            self.inner.budget.texture_budget,
            tick,
        );
        let total = evicted_meshes + evicted_textures;
        if total > 0 {
            self.inner.evicted.fetch_add(total, Ordering::AcqRel);
            debug!(
                meshes = evicted_meshes,
                textures = evicted_textures,
                "evicted cache entries over budget"
            );
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            pending_jobs: self.inner.queue.lock().unwrap().len(),
            meta_count: self.inner.meta.len(),
            mesh_count: self.inner.meshes.len(),
            texture_count: self.inner.textures.len(),
            geodata_count: self.inner.geodata.len(),
            mesh_bytes: self.inner.mesh_bytes.load(Ordering::Acquire),
            texture_bytes: self.inner.texture_bytes.load(Ordering::Acquire),
            completed: self.inner.completed.load(Ordering::Acquire),
            failed: self.inner.failed.load(Ordering::Acquire),
            evicted: self.inner.evicted.load(Ordering::Acquire),
        }
    }
}

impl Drop for ResourceCache {
    fn drop(&mut self) {
        self.inner.shutdown.store(true, Ordering::Release);
        // Wake idle workers so they observe the flag.
        for _ in &self.workers {
            let _ = self.work_tx.send(());
        }
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

fn worker_loop(inner: &CacheInner, work_rx: &Receiver<()>) {
    loop {
        if inner.shutdown.load(Ordering::Acquire) {
            return;
        }
        loop {
            let job = inner.queue.lock().unwrap().pop();
            match job {
                Some(job) => process_job(inner, &job),
                None => break,
            }
            if inner.shutdown.load(Ordering::Acquire) {
                return;
            }
        }
        match work_rx.recv_timeout(Duration::from_millis(50)) {
            Ok(()) | Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return,
        }
    }
}

fn process_job(inner: &CacheInner, job: &FetchJob) {
    match job.kind {
        FetchKind::MetaTile => {
            fetch_and_publish(inner, &inner.meta, &job.key, |bytes| {
                codec::decode_meta_tile(bytes).map(|tile| (tile, bytes.len()))
            });
        }
        FetchKind::Mesh => {
            let published = fetch_and_publish(inner, &inner.meshes, &job.key, |bytes| {
                codec::decode_mesh_aggregate(bytes).map(|agg| {
                    let size = agg.byte_size();
                    (agg, size)
                })
            });
            inner.mesh_bytes.fetch_add(published, Ordering::AcqRel);
        }
        FetchKind::Texture => {
            let published = fetch_and_publish(inner, &inner.textures, &job.key, |bytes| {
                codec::decode_texture(bytes).map(|tex| {
                    let size = tex.byte_size();
                    (tex, size)
                })
            });
            inner.texture_bytes.fetch_add(published, Ordering::AcqRel);
        }
        FetchKind::Style => {
            fetch_and_publish(inner, &inner.styles, &job.key, |bytes| {
                codec::decode_style(bytes).map(|s| (s, bytes.len()))
            });
        }
        FetchKind::Features => {
            fetch_and_publish(inner, &inner.features, &job.key, |bytes| {
                codec::decode_features(bytes).map(|f| (f, bytes.len()))
            });
        }
        FetchKind::GeodataAssemble => {
            if let Some(tile) = inner.geodata.get(&job.key).map(|t| t.clone()) {
                tile.assemble();
                inner.completed.fetch_add(1, Ordering::AcqRel);
            }
        }
    }
}

/// Fetch, decode and publish one resource. Returns the published byte
/// size (0 on failure) so callers can account it against a budget.
fn fetch_and_publish<T, F>(
    inner: &CacheInner,
    store: &DashMap<String, Arc<Resource<T>>>,
    key: &str,
    decode: F,
) -> usize
where
    F: FnOnce(&[u8]) -> Result<(T, usize), codec::DecodeError>,
{
    let Some(resource) = store.get(key).map(|r| r.clone()) else {
        return 0;
    };
    match inner.transport.fetch(key) {
        Ok(bytes) => match decode(&bytes) {
            Ok((payload, size)) => {
                resource.publish_valid(payload, size);
                inner.completed.fetch_add(1, Ordering::AcqRel);
                debug!(key, size, "resource published");
                size
            }
            Err(err) => {
                warn!(key, error = %err, "resource decode failed");
                resource.publish_invalid();
                inner.failed.fetch_add(1, Ordering::AcqRel);
                0
            }
        },
        Err(TransportError::NotFound(_)) => {
            debug!(key, "resource not found");
            resource.publish_invalid();
            inner.failed.fetch_add(1, Ordering::AcqRel);
            0
        }
        Err(err) => {
            warn!(key, error = %err, "transport failed");
            resource.publish_invalid();
            inner.failed.fetch_add(1, Ordering::AcqRel);
            0
        }
    }
}

fn evict_store<T>(
    store: &DashMap<String, Arc<Resource<T>>>,
    total_bytes: &AtomicUsize,
    budget: usize,
    tick: u64,
) -> u64 {
    let total = total_bytes.load(Ordering::Acquire);
    if total <= budget {
        return 0;
    }
    let candidates: Vec<EvictionCandidate> = store
        .iter()
        .filter(|entry| entry.validity() == Validity::Valid)
        .map(|entry| EvictionCandidate {
            key: entry.key().clone(),
            last_access: entry.last_access(),
            bytes: entry.size_bytes(),
        })
        .collect();
    let picked = select_evictions(total, budget, tick, candidates);
    let mut count = 0;
    for key in picked {
        if let Some((_, resource)) = store.remove(&key) {
            total_bytes.fetch_sub(resource.size_bytes(), Ordering::AcqRel);
            count += 1;
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{encode_meta_tile, MetaNodeSpec};
    use crate::transport::MemoryTransport;
    use glam::DVec3;
    use tellus_math::DAabb;
    use tellus_tile::TileId;

    fn meta_bytes() -> Vec<u8> {
        let node = MetaNodeSpec::new(TileId::root(), DAabb::new(DVec3::ZERO, DVec3::ONE));
        encode_meta_tile(TileId::root(), &[node])
    }

    fn cache_with(transport: Arc<MemoryTransport>) -> ResourceCache {
        ResourceCache::new(transport, CacheBudget::unlimited(), 0)
    }

    #[test]
    fn test_fetch_goes_valid_after_pump() {
        let transport = Arc::new(MemoryTransport::new());
        transport.insert("meta/0-0-0", meta_bytes());
        let cache = cache_with(transport);
        cache.begin_frame();

        let res = cache.fetch_meta("meta/0-0-0", 1.0);
        assert_eq!(res.validity(), Validity::Indeterminate);
        assert_eq!(cache.pump(), 1);
        assert_eq!(res.validity(), Validity::Valid);
        assert!(res.get().unwrap().get(TileId::root()).is_some());
    }

    #[test]
    fn test_missing_resource_goes_invalid() {
        let cache = cache_with(Arc::new(MemoryTransport::new()));
        let res = cache.fetch_meta("meta/absent", 1.0);
        cache.pump();
        assert_eq!(res.validity(), Validity::Invalid);
    }

    #[test]
    fn test_repeat_fetch_is_deduplicated() {
        let transport = Arc::new(MemoryTransport::new());
        transport.insert("meta/0-0-0", meta_bytes());
        let cache = cache_with(transport.clone());

        let a = cache.fetch_meta("meta/0-0-0", 1.0);
        let b = cache.fetch_meta("meta/0-0-0", 3.0);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.pump(), 1);
        assert_eq!(transport.request_count(), 1);

        // Valid resources are served from the store without refetching.
        cache.fetch_meta("meta/0-0-0", 5.0);
        assert_eq!(cache.pump(), 0);
        assert_eq!(transport.request_count(), 1);
    }

    #[test]
    fn test_undecodable_payload_goes_invalid() {
        let transport = Arc::new(MemoryTransport::new());
        transport.insert("meta/garbage", vec![0xff; 16]);
        let cache = cache_with(transport);
        let res = cache.fetch_meta("meta/garbage", 1.0);
        cache.pump();
        assert_eq!(res.validity(), Validity::Invalid);
        assert_eq!(cache.stats().failed, 1);
    }

    #[test]
    fn test_budget_eviction_drops_stale_meshes() {
        use crate::codec::{encode_mesh_aggregate, MeshAggregateSpec, MeshPartSpec};
        use crate::types::MeshVertex;

        let bytes = encode_mesh_aggregate(&MeshAggregateSpec {
            parts: vec![MeshPartSpec {
                vertices: vec![MeshVertex::default(); 64],
                indices: vec![0; 96],
                ..Default::default()
            }],
        });
        let transport = Arc::new(MemoryTransport::new());
        transport.insert("mesh/a", bytes.clone());
        transport.insert("mesh/b", bytes);

        let cache = ResourceCache::new(
            transport,
            CacheBudget {
                mesh_budget: 2000,
                texture_budget: 0,
            },
            0,
        );
        cache.begin_frame();
        cache.fetch_mesh("mesh/a", 1.0);
        cache.pump();
        cache.begin_frame();
        let live = cache.fetch_mesh("mesh/b", 1.0);
        cache.pump();

        // Two aggregates exceed the budget; the one untouched this
        // frame goes.
        cache.enforce_budget();
        let stats = cache.stats();
        assert_eq!(stats.evicted, 1);
        assert_eq!(stats.mesh_count, 1);
        assert_eq!(live.validity(), Validity::Valid);
        assert!(stats.mesh_bytes <= 2000);
    }

    #[test]
    fn test_worker_pool_publishes() {
        let transport = Arc::new(MemoryTransport::new());
        transport.insert("meta/0-0-0", meta_bytes());
        let cache = ResourceCache::new(transport, CacheBudget::unlimited(), 2);
        let res = cache.fetch_meta("meta/0-0-0", 1.0);
        for _ in 0..200 {
            if res.validity() != Validity::Indeterminate {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(res.validity(), Validity::Valid);
    }

    #[test]
    fn test_geodata_assembly_via_pump() {
        let cache = cache_with(Arc::new(MemoryTransport::new()));

        let style = Arc::new(GeodataStyle {
            json: serde_json::json!({"label-source":"name"}),
        });
        let features = Arc::new(GeodataFeatures {
            json: serde_json::json!({
                "features": [{
                    "geometry": {"type": "Point", "coordinates": [1.0, 2.0]},
                    "properties": {"name": "peak"}
                }]
            }),
        });
        let tile = cache.fetch_geodata(
            "geo/1-0-0",
            style.clone(),
            features.clone(),
            serde_json::Value::Null,
            1.0,
        );
        assert_eq!(tile.validity(), Validity::Indeterminate);
        assert_eq!(cache.pump(), 1);
        assert_eq!(tile.validity(), Validity::Valid);
        assert_eq!(tile.renders().len(), 2);

        // Unchanged inputs schedule nothing.
        cache.fetch_geodata("geo/1-0-0", style, features, serde_json::Value::Null, 1.0);
        assert_eq!(cache.pump(), 0);
    }
}
