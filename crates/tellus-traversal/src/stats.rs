//! Per-pass traversal counters, merged by the caller after each pass.

/// LOD buckets tracked per counter; deeper levels share the last slot.
pub const STAT_LODS: usize = 25;

#[derive(Clone, Debug)]
pub struct TraversalStats {
    pub meta_updates: u64,
    pub draw_updates: u64,
    pub traversed_total: u64,
    pub traversed_per_lod: [u64; STAT_LODS],
    pub rendered_total: u64,
    pub rendered_per_lod: [u64; STAT_LODS],
    pub rendered_coarser: u64,
    pub culled: u64,
    pub preload_requests: u64,
}

impl Default for TraversalStats {
    fn default() -> Self {
        Self {
            meta_updates: 0,
            draw_updates: 0,
            traversed_total: 0,
            traversed_per_lod: [0; STAT_LODS],
            rendered_total: 0,
            rendered_per_lod: [0; STAT_LODS],
            rendered_coarser: 0,
            culled: 0,
            preload_requests: 0,
        }
    }
}

impl TraversalStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_traversed(&mut self, lod: u32) {
        self.traversed_total += 1;
        self.traversed_per_lod[(lod as usize).min(STAT_LODS - 1)] += 1;
    }

    pub fn record_rendered(&mut self, lod: u32) {
        self.rendered_total += 1;
        self.rendered_per_lod[(lod as usize).min(STAT_LODS - 1)] += 1;
    }

    pub fn merge(&mut self, other: &TraversalStats) {
        self.meta_updates += other.meta_updates;
        self.draw_updates += other.draw_updates;
        self.traversed_total += other.traversed_total;
        self.rendered_total += other.rendered_total;
        self.rendered_coarser += other.rendered_coarser;
        self.culled += other.culled;
        self.preload_requests += other.preload_requests;
        for (a, b) in self
            .traversed_per_lod
            .iter_mut()
            .zip(other.traversed_per_lod)
        {
            *a += b;
        }
        for (a, b) in self.rendered_per_lod.iter_mut().zip(other.rendered_per_lod) {
            *a += b;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_accumulates_lod_buckets() {
        let mut a = TraversalStats::new();
        a.record_traversed(2);
        a.record_rendered(2);
        let mut b = TraversalStats::new();
        b.record_traversed(2);
        b.record_traversed(40);
        b.culled = 3;

        a.merge(&b);
        assert_eq!(a.traversed_total, 3);
        assert_eq!(a.traversed_per_lod[2], 2);
        assert_eq!(a.traversed_per_lod[STAT_LODS - 1], 1);
        assert_eq!(a.rendered_per_lod[2], 1);
        assert_eq!(a.culled, 3);
    }
}
