use crate::config::CacheConfig;
use crate::replacement::{BlockEntry, PromotionTable, ReplacementEngine};

/// A set-associative cache model driven by the IPV replacement engine
///
/// The cache only tracks tags; there is no data array. Each line has a
/// [`BlockEntry`] handle into the engine, obtained once at construction, and
/// every access is routed through the engine: hits promote via `touch`,
/// misses pick a victim with `get_victim` and insert the new block with
/// `reset`, external invalidations demote via `invalidate`
///
/// Note that for optimisation reasons the cache assumes that accessing 0 is
/// not possible, as it would cause an error on most systems: a zero tag marks
/// a line that has never been filled or was invalidated
pub struct Cache {
    set_selection_bit_mask: u64,
    tag_selection_bit_mask: u64,
    cache_alignment_bit_mask: u64,
    line_size: u64,
    cache_alignment_bits: u8,
    ways: u64,
    tags: Vec<u64>,
    entries: Vec<BlockEntry>,
    engine: ReplacementEngine,
}

impl Cache {
    /// Builds a cache from its configuration, validating everything up front
    ///
    /// Rejected configurations: sizes and line sizes that are not powers of
    /// two, a size that doesn't divide into lines, a line count that doesn't
    /// divide into sets of `ways` lines, and any promotion vector the engine
    /// refuses (wrong length, out-of-range entries, non-power-of-two ways)
    ///
    /// # Arguments
    ///
    /// * `config`: A single cache configuration, usually one layer of a
    /// parsed JSON config
    ///
    /// returns: Result<Cache, String>
    pub fn new(config: &CacheConfig) -> Result<Self, String> {
        let name = &config.name;
        if config.line_size == 0 || !config.line_size.is_power_of_two() {
            return Err(format!(
                "Cache {name}: line size must be a non-zero power of two, got {}",
                config.line_size
            ));
        }
        if config.size == 0 || config.size % config.line_size != 0 {
            return Err(format!(
                "Cache {name}: size {} is not a non-zero multiple of the line size {}",
                config.size, config.line_size
            ));
        }
        let num_lines = config.size / config.line_size;
        if config.ways == 0 || num_lines % config.ways != 0 {
            return Err(format!(
                "Cache {name}: {num_lines} lines cannot be split into sets of {} ways",
                config.ways
            ));
        }
        let num_sets = num_lines / config.ways;
        if !num_sets.is_power_of_two() {
            return Err(format!(
                "Cache {name}: the number of sets must be a power of two, got {num_sets}"
            ));
        }
        let table = match &config.promotion_vector {
            Some(vector) => PromotionTable::from_vector(vector.clone()),
            None => PromotionTable::lru(config.ways as usize),
        };
        let mut engine = ReplacementEngine::new(num_sets as usize, config.ways as usize, table)
            .map_err(|e| format!("Cache {name}: {e}"))?;
        // One entry per line, row-major, so line set * ways + way is owned by
        // the entry at the same index
        let entries = (0..num_lines).map(|_| engine.instantiate()).collect();

        let cache_alignment_bits = config.line_size.trailing_zeros() as u8;
        let set_selection_bits = num_sets.trailing_zeros() as u8;
        Ok(Self {
            set_selection_bit_mask: (num_sets - 1) << cache_alignment_bits,
            // Shifting MAX down then back up never overflows, even in the
            // degenerate case of byte lines with a single set where the tag
            // covers the whole address
            tag_selection_bit_mask: (u64::MAX >> (set_selection_bits as u32 + cache_alignment_bits as u32)) << (cache_alignment_bits + set_selection_bits),
            cache_alignment_bit_mask: !((1 << (cache_alignment_bits as u32)) - 1),
            line_size: config.line_size,
            cache_alignment_bits,
            ways: config.ways,
            tags: vec![0; num_lines as usize],
            entries,
            engine,
        })
    }

    /// Converts an address into a set and a tag. Both respect cache line
    /// alignment.
    ///
    /// The set is aligned such that it can be used as an index to a
    /// collection of sets
    ///
    /// The tag is not re-aligned as this isn't required
    ///
    /// # Arguments
    ///
    /// * `input`:
    ///
    /// returns: (u64, u64)
    pub fn address_to_set_and_tag(&self, input: u64) -> (u64, u64) {
        (((input & self.set_selection_bit_mask) >> self.cache_alignment_bits), input & (self.tag_selection_bit_mask))
    }

    // Cache hit is true, cache miss is false
    pub fn read_and_update_line(&mut self, input: u64) -> bool {
        let (set, tag) = self.address_to_set_and_tag(input);
        let set_inclusive_lower_bound = (set * self.ways) as usize;
        let set_exclusive_upper_bound = set_inclusive_lower_bound + self.ways as usize;
        // Only search the relevant set
        for x in set_inclusive_lower_bound..set_exclusive_upper_bound {
            // Cache hit
            if self.tags[x] == tag {
                self.engine.touch(&self.entries[x]);
                return true;
            }
        }
        // Cache miss, evict and fill
        let candidates = &self.entries[set_inclusive_lower_bound..set_exclusive_upper_bound];
        let victim = self.engine.get_victim(candidates);
        self.tags[set_inclusive_lower_bound + victim.way()] = tag;
        self.engine.reset(&victim);
        false
    }

    /// Invalidates the line holding `input`'s tag, if present, demoting its
    /// way to the eviction-eligible rank. Returns whether a line was
    /// invalidated
    pub fn invalidate_line(&mut self, input: u64) -> bool {
        let (set, tag) = self.address_to_set_and_tag(input);
        let set_inclusive_lower_bound = (set * self.ways) as usize;
        let set_exclusive_upper_bound = set_inclusive_lower_bound + self.ways as usize;
        for x in set_inclusive_lower_bound..set_exclusive_upper_bound {
            if self.tags[x] == tag && tag != 0 {
                self.tags[x] = 0;
                self.engine.invalidate(&self.entries[x]);
                return true;
            }
        }
        false
    }

    /// Gets the bit mask used to align the address
    pub fn get_alignment_bit_mask(&self) -> u64 {
        self.cache_alignment_bit_mask
    }

    /// Gets the line size used by this cache
    pub fn get_line_size(&self) -> u64 {
        self.line_size
    }

    /// Gets the number of uninitialised cache lines. Useful for analysing
    /// cache performance or debugging
    pub fn get_uninitialised_line_count(&self) -> usize {
        self.tags.iter().filter(|a| **a == 0).count()
    }

    /// The raw recency ranks of one set, for tracing
    pub fn recency_ranks(&self, set: usize) -> &[usize] {
        self.engine.stack_ranks(set)
    }

    pub fn num_sets(&self) -> usize {
        self.engine.num_sets()
    }
}
