//! Collection configuration

/// Tuning knobs for a collection run
#[derive(Debug, Clone)]
pub struct CollectConfig {
    /// Maximum number of streams waiting for the sink
    pub queue_capacity: usize,
    /// Bytes requested from the device per read (rounded up to whole clusters)
    pub read_chunk_size: usize,
    /// Number of forked chunks the $MFT copy may lag behind the walker
    pub tee_buffer_chunks: usize,
}

impl Default for CollectConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 100,
            read_chunk_size: 1024 * 1024,
            tee_buffer_chunks: 16,
        }
    }
}

impl CollectConfig {
    /// Chunk size aligned to whole clusters, never smaller than one cluster
    pub fn chunk_size_for(&self, cluster_size: u64) -> usize {
        let cluster = cluster_size.max(1) as usize;
        let clusters = self.read_chunk_size.div_ceil(cluster).max(1);
        clusters * cluster
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_size_is_cluster_aligned() {
        let config = CollectConfig {
            read_chunk_size: 10_000,
            ..Default::default()
        };
        assert_eq!(config.chunk_size_for(4096), 12_288);
        assert_eq!(config.chunk_size_for(65_536), 65_536);
    }
}
