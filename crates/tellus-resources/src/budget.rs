//! Memory budget configuration and eviction selection for cached
//! tile resources.

/// Byte budgets per resource class.
#[derive(Clone, Copy, Debug)]
pub struct CacheBudget {
    /// Maximum bytes for decoded mesh aggregates.
    pub mesh_budget: usize,
    /// Maximum bytes for decoded textures.
    pub texture_budget: usize,
}

impl Default for CacheBudget {
    fn default() -> Self {
        Self {
            mesh_budget: 512 * 1024 * 1024,
            texture_budget: 768 * 1024 * 1024,
        }
    }
}

impl CacheBudget {
    /// Budget for low-memory systems.
    #[must_use]
    pub fn low() -> Self {
        Self {
            mesh_budget: 128 * 1024 * 1024,
            texture_budget: 192 * 1024 * 1024,
        }
    }

    /// Effectively unlimited budget, used by tests.
    #[must_use]
    pub fn unlimited() -> Self {
        Self {
            mesh_budget: usize::MAX,
            texture_budget: usize::MAX,
        }
    }
}

/// One eviction candidate: a cache key with its usage bookkeeping.
#[derive(Clone, Debug)]
pub struct EvictionCandidate {
    pub key: String,
    /// Frame tick of the last traversal that touched the entry.
    pub last_access: u64,
    pub bytes: usize,
}

/// Select entries to evict until `total_bytes` fits under `budget`.
///
/// Candidates are dropped oldest-access first. Entries touched at the
/// current tick are never selected; they are in use this frame.
pub fn select_evictions(
    total_bytes: usize,
    budget: usize,
    current_tick: u64,
    mut candidates: Vec<EvictionCandidate>,
) -> Vec<String> {
    let mut overage = total_bytes.saturating_sub(budget);
    if overage == 0 {
        return Vec::new();
    }
    candidates.sort_by_key(|c| c.last_access);
    let mut evicted = Vec::new();
    for c in candidates {
        if overage == 0 {
            break;
        }
        if c.last_access >= current_tick {
            break;
        }
        overage = overage.saturating_sub(c.bytes);
        evicted.push(c.key);
    }
    evicted
}
