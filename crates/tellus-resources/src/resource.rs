//! Shared resource handles with a non-blocking validity state machine.

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

/// Download/decode state of a resource, observed by polling.
///
/// `Indeterminate` is transient (retry next frame); `Invalid` is a
/// permanent absence for this resource key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Validity {
    Valid,
    Invalid,
    Indeterminate,
}

const STATE_INDETERMINATE: u8 = 0;
const STATE_VALID: u8 = 1;
const STATE_INVALID: u8 = 2;

/// A cached resource of payload type `T`.
///
/// The handle is shared (`Arc`) between the cache, the worker pool and
/// any consumer holding it in a draw task. Workers publish the payload
/// exactly once; consumers only read. Priority and last-access are
/// atomics so the render thread can bump them without locking.
#[derive(Debug)]
pub struct Resource<T> {
    key: String,
    state: AtomicU8,
    payload: OnceLock<Arc<T>>,
    /// f32 bits; combined by max so the most urgent consumer wins.
    priority: AtomicU32,
    /// Render tick of the last touch, for eviction.
    last_access: AtomicU64,
    size_bytes: AtomicUsize,
}

impl<T> Resource<T> {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            state: AtomicU8::new(STATE_INDETERMINATE),
            payload: OnceLock::new(),
            priority: AtomicU32::new(0f32.to_bits()),
            last_access: AtomicU64::new(0),
            size_bytes: AtomicUsize::new(0),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn validity(&self) -> Validity {
        match self.state.load(Ordering::Acquire) {
            STATE_VALID => Validity::Valid,
            STATE_INVALID => Validity::Invalid,
            _ => Validity::Indeterminate,
        }
    }

    /// Snapshot of the payload, present only once `Valid`.
    pub fn get(&self) -> Option<&T> {
        if self.validity() == Validity::Valid {
            self.payload.get().map(Arc::as_ref)
        } else {
            None
        }
    }

    /// Shared handle to the payload; the `Arc` identity is stable for
    /// the lifetime of this resource, which versioned consumers rely
    /// on.
    pub fn get_shared(&self) -> Option<Arc<T>> {
        if self.validity() == Validity::Valid {
            self.payload.get().cloned()
        } else {
            None
        }
    }

    /// Raise the fetch priority of this resource. Priorities only ever
    /// increase between publications; the downloader uses them to starve
    /// low-urgency tiles under load.
    pub fn update_priority(&self, priority: f32) {
        let _ = self
            .priority
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                let current = f32::from_bits(bits);
                if priority > current {
                    Some(priority.to_bits())
                } else {
                    None
                }
            });
    }

    pub fn priority(&self) -> f32 {
        f32::from_bits(self.priority.load(Ordering::Acquire))
    }

    /// Record an access at the given render tick.
    pub fn touch(&self, tick: u64) {
        self.last_access.fetch_max(tick, Ordering::AcqRel);
    }

    pub fn last_access(&self) -> u64 {
        self.last_access.load(Ordering::Acquire)
    }

    pub fn size_bytes(&self) -> usize {
        self.size_bytes.load(Ordering::Acquire)
    }

    /// Publish a successfully decoded payload. Called once, from a
    /// worker thread.
    pub fn publish_valid(&self, payload: T, size_bytes: usize) {
        let stored = self.payload.set(Arc::new(payload)).is_ok();
        debug_assert!(stored, "resource {} published twice", self.key);
        self.size_bytes.store(size_bytes, Ordering::Release);
        self.state.store(STATE_VALID, Ordering::Release);
    }

    /// Mark the resource permanently absent.
    pub fn publish_invalid(&self) {
        self.state.store(STATE_INVALID, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_indeterminate() {
        let r: Resource<u32> = Resource::new("k");
        assert_eq!(r.validity(), Validity::Indeterminate);
        assert!(r.get().is_none());
    }

    #[test]
    fn test_publish_valid() {
        let r: Resource<u32> = Resource::new("k");
        r.publish_valid(42, 4);
        assert_eq!(r.validity(), Validity::Valid);
        assert_eq!(r.get(), Some(&42));
        assert_eq!(r.size_bytes(), 4);
    }

    #[test]
    fn test_publish_invalid_hides_payload() {
        let r: Resource<u32> = Resource::new("k");
        r.publish_invalid();
        assert_eq!(r.validity(), Validity::Invalid);
        assert!(r.get().is_none());
    }

    /// Priority only increases; lower bids never regress it.
    #[test]
    fn test_priority_is_max_combined() {
        let r: Resource<u32> = Resource::new("k");
        r.update_priority(5.0);
        r.update_priority(2.0);
        assert_eq!(r.priority(), 5.0);
        r.update_priority(9.0);
        assert_eq!(r.priority(), 9.0);
    }

    #[test]
    fn test_touch_keeps_latest_tick() {
        let r: Resource<u32> = Resource::new("k");
        r.touch(3);
        r.touch(1);
        assert_eq!(r.last_access(), 3);
    }
}
