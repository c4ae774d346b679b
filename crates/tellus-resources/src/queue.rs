//! Priority queue ordering pending fetches by consumer urgency.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use rustc_hash::FxHashMap;

/// Which decoder a fetched payload goes through.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FetchKind {
    MetaTile,
    Mesh,
    Texture,
    Style,
    Features,
    /// Not a transport fetch: assemble a geodata tile from already
    /// valid style + features.
    GeodataAssemble,
}

/// One pending unit of background work.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FetchJob {
    pub kind: FetchKind,
    pub key: String,
}

#[derive(Clone, Debug)]
struct QueueEntry {
    job: FetchJob,
    priority: f64,
    /// Generation counter so a re-prioritized key supersedes its stale
    /// heap entries.
    generation: u64,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .partial_cmp(&other.priority)
            .unwrap_or(Ordering::Equal)
    }
}

/// Max-heap of pending fetches with lazy priority updates.
///
/// Pushing an already queued job bumps its generation; stale heap
/// entries are skipped on pop. Workers therefore always take the
/// currently most urgent fetch.
#[derive(Default)]
pub struct FetchQueue {
    heap: BinaryHeap<QueueEntry>,
    generations: FxHashMap<FetchJob, u64>,
    next_generation: u64,
}

impl FetchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or re-prioritize a job.
    pub fn push(&mut self, job: FetchJob, priority: f64) {
        let generation = self.next_generation;
        self.next_generation += 1;
        self.generations.insert(job.clone(), generation);
        self.heap.push(QueueEntry {
            job,
            priority,
            generation,
        });
    }

    /// Remove and return the most urgent job, skipping stale entries.
    pub fn pop(&mut self) -> Option<FetchJob> {
        while let Some(entry) = self.heap.pop() {
            if self.generations.get(&entry.job) == Some(&entry.generation) {
                self.generations.remove(&entry.job);
                return Some(entry.job);
            }
        }
        None
    }

    /// Whether the job is still pending.
    pub fn contains(&self, job: &FetchJob) -> bool {
        self.generations.contains_key(job)
    }

    pub fn len(&self) -> usize {
        self.generations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.generations.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
        self.generations.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(key: &str) -> FetchJob {
        FetchJob {
            kind: FetchKind::MetaTile,
            key: key.into(),
        }
    }

    #[test]
    fn test_pops_highest_priority_first() {
        let mut q = FetchQueue::new();
        q.push(job("low"), 1.0);
        q.push(job("high"), 100.0);
        q.push(job("mid"), 10.0);
        assert_eq!(q.pop(), Some(job("high")));
        assert_eq!(q.pop(), Some(job("mid")));
        assert_eq!(q.pop(), Some(job("low")));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn test_reprioritize_supersedes_stale_entry() {
        let mut q = FetchQueue::new();
        q.push(job("a"), 100.0);
        q.push(job("b"), 50.0);
        // The camera moved; "b" is now more urgent.
        q.push(job("a"), 10.0);
        q.push(job("b"), 90.0);
        assert_eq!(q.pop(), Some(job("b")));
        assert_eq!(q.pop(), Some(job("a")));
        assert!(q.is_empty());
    }

    #[test]
    fn test_len_counts_unique_jobs() {
        let mut q = FetchQueue::new();
        q.push(job("a"), 1.0);
        q.push(job("a"), 2.0);
        assert_eq!(q.len(), 1);
        q.push(job("b"), 3.0);
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn test_contains() {
        let mut q = FetchQueue::new();
        q.push(job("a"), 1.0);
        assert!(q.contains(&job("a")));
        q.pop();
        assert!(!q.contains(&job("a")));
    }
}
