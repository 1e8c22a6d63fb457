use serde::Deserialize;

/// A cache configuration with multiple layers
#[derive(Debug, Deserialize)]
pub struct LayeredCacheConfig {
    pub caches: Vec<CacheConfig>,
}

/// A configuration for a single set-associative cache
///
/// `ways` is the associativity of every set. The optional promotion vector
/// configures the IPV replacement policy and must contain `ways + 1` entries:
/// one target rank per current rank, plus the insertion rank for fresh fills.
/// When omitted the cache behaves as plain LRU (promote to rank 0, insert at
/// rank 0)
///
/// All validation happens when the cache is constructed, so a bad
/// configuration is rejected before any simulation runs
#[derive(Debug, Deserialize)]
pub struct CacheConfig {
    pub name: String,
    pub size: u64,
    pub line_size: u64,
    pub ways: u64,
    #[serde(default)]
    pub promotion_vector: Option<Vec<usize>>,
}
