use crate::metadata::BoundedCache;

const BLOCK_TIMESTAMP_CACHE_CAPACITY: usize = 4096;

/// Block number → header timestamp in unix seconds, cleared wholesale past
/// its capacity. Headers are fetched by the scanner on a miss.
#[derive(Debug)]
pub struct BlockTimestamps {
    cache: BoundedCache<u64, u64>,
}

impl Default for BlockTimestamps {
    fn default() -> Self {
        Self::with_capacity(BLOCK_TIMESTAMP_CACHE_CAPACITY)
    }
}

impl BlockTimestamps {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            cache: BoundedCache::new("block timestamp", capacity),
        }
    }

    pub fn get(&self, block_number: u64) -> Option<u64> {
        self.cache.get(&block_number)
    }

    pub fn insert(&self, block_number: u64, unix_seconds: u64) {
        self.cache.insert(block_number, unix_seconds);
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_block_number() {
        let timestamps = BlockTimestamps::default();
        timestamps.insert(100, 1_700_000_000);

        assert_eq!(timestamps.get(100), Some(1_700_000_000));
        assert_eq!(timestamps.get(101), None);
    }

    #[test]
    fn test_bounded_by_capacity() {
        let timestamps = BlockTimestamps::with_capacity(2);
        timestamps.insert(1, 10);
        timestamps.insert(2, 20);
        timestamps.insert(3, 30);

        assert_eq!(timestamps.len(), 1);
        assert_eq!(timestamps.get(3), Some(30));
    }
}
