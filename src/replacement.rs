/// The table driving an Insertion/Promotion-Vector (IPV) policy
///
/// Entries `0..ways-1` give the rank a block jumps to when it is hit while
/// holding that rank; the final entry (index `ways`) is the rank assigned to a
/// freshly filled block. Plain LRU is the special case where every entry is 0.
///
/// The table is validated against the cache associativity when an engine is
/// built from it, see [`ReplacementEngine::new`]
#[derive(Debug, Clone)]
pub struct PromotionTable {
    entries: Vec<usize>,
}

impl PromotionTable {
    /// Builds a table from an explicit vector of length `ways + 1`
    pub fn from_vector(entries: Vec<usize>) -> Self {
        Self { entries }
    }

    /// The plain-LRU table for a given associativity: every hit promotes to
    /// rank 0 and fresh blocks are inserted at rank 0
    pub fn lru(ways: usize) -> Self {
        Self { entries: vec![0; ways + 1] }
    }

    /// The 16-way promotion vector from the IPV paper. Only valid for an
    /// associativity of 16
    pub fn lru_ipv() -> Self {
        Self { entries: vec![0, 0, 1, 0, 3, 0, 1, 2, 1, 0, 5, 1, 0, 0, 1, 11, 13] }
    }

    /// The rank a block at `rank` is promoted to on a hit
    pub fn promote(&self, rank: usize) -> usize {
        self.entries[rank]
    }

    /// The rank assigned to a newly filled block
    pub fn insertion_rank(&self) -> usize {
        self.entries[self.entries.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A handle identifying one way's slot in its set's recency stack
///
/// Handed out once per way by [`ReplacementEngine::instantiate`]; its identity
/// never changes. The rank it owns lives in the engine's per-set stack at
/// `way`, not in the handle itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockEntry {
    set_id: usize,
    way: usize,
}

impl BlockEntry {
    pub fn set_id(&self) -> usize {
        self.set_id
    }

    pub fn way(&self) -> usize {
        self.way
    }
}

/// The LRU-IPV replacement engine
///
/// Maintains one recency stack per cache set: a fixed-length array holding a
/// permutation of the ranks `0..ways-1`, where rank 0 is the most valuable
/// position and rank `ways - 1` is eviction-eligible. An invalidated way
/// stores the sentinel value `ways`, which clamps back to `ways - 1` whenever
/// it is read.
///
/// The stacks live in an arena owned by the engine rather than behind shared
/// pointers; a [`BlockEntry`] is an index pair into that arena. All operations
/// are O(ways) scans over a single set's stack and run to completion, so the
/// engine needs no interior synchronisation under a single-threaded caller
pub struct ReplacementEngine {
    ways: usize,
    sets: Vec<Box<[usize]>>,
    table: PromotionTable,
    instantiated: usize,
}

impl ReplacementEngine {
    /// Creates an engine for `num_sets` sets of `ways` ways each
    ///
    /// Fails when `ways` is zero or not a power of two, when the table length
    /// is not `ways + 1`, or when any table entry lies outside `0..ways`.
    /// Rejecting these outright avoids the silently-wrong rankings a
    /// mismatched table would otherwise produce
    ///
    /// # Arguments
    ///
    /// * `num_sets`: The number of sets the engine will manage
    /// * `ways`: The associativity, shared by every set
    /// * `table`: The promotion table, of length `ways + 1`
    ///
    /// returns: Result<ReplacementEngine, String>
    pub fn new(num_sets: usize, ways: usize, table: PromotionTable) -> Result<Self, String> {
        if ways == 0 || !ways.is_power_of_two() {
            return Err(format!("The number of ways must be a non-zero power of two, got {ways}"));
        }
        if table.len() != ways + 1 {
            return Err(format!(
                "The promotion table must have {} entries for {ways} ways, got {}",
                ways + 1,
                table.len()
            ));
        }
        if let Some(entry) = table.entries.iter().find(|e| **e >= ways) {
            return Err(format!(
                "Promotion table entries must be ranks below {ways}, got {entry}"
            ));
        }
        // Every stack starts as the identity permutation: way i at rank i
        let sets = (0..num_sets)
            .map(|_| (0..ways).collect::<Box<[usize]>>())
            .collect();
        Ok(Self {
            ways,
            sets,
            table,
            instantiated: 0,
        })
    }

    /// Hands out the entry for the next way, in row-major order (all ways of
    /// set 0, then set 1, and so on)
    ///
    /// Requesting more entries than `num_sets * ways` is a programming error
    pub fn instantiate(&mut self) -> BlockEntry {
        assert!(
            self.instantiated < self.sets.len() * self.ways,
            "all {} ways already instantiated",
            self.sets.len() * self.ways
        );
        let entry = BlockEntry {
            set_id: self.instantiated / self.ways,
            way: self.instantiated % self.ways,
        };
        self.instantiated += 1;
        entry
    }

    /// Promotes a block on a cache hit
    ///
    /// The block jumps from its clamped rank `r_old` to `table[r_old]`, and
    /// every block ranked in `[r_new, r_old)` moves down one place to close
    /// the gap, preserving relative order. A single backward scan over the
    /// set's stack performs both steps; when the table maps a rank to itself
    /// the scan degenerates to a no-op
    pub fn touch(&mut self, entry: &BlockEntry) {
        let ways = self.ways;
        let stack = &mut self.sets[entry.set_id];
        let r_old = stack[entry.way].min(ways - 1);
        let r_new = self.table.promote(r_old);
        let mut i = ways;
        while i > 0 {
            i -= 1;
            let rank = stack[i].min(ways - 1);
            if rank == r_old {
                stack[i] = r_new;
            } else if rank >= r_new && rank < r_old {
                stack[i] = rank + 1;
            }
        }
        self.debug_check_permutation(entry.set_id);
    }

    /// Inserts a newly filled block at the table's insertion rank
    ///
    /// Identical to [`Self::touch`] except the destination is `table[ways]`
    /// rather than a function of the old rank. Intended for a way that was
    /// just selected as victim or invalidated, i.e. one currently holding the
    /// least-valuable rank
    pub fn reset(&mut self, entry: &BlockEntry) {
        let ways = self.ways;
        let stack = &mut self.sets[entry.set_id];
        let r_old = stack[entry.way].min(ways - 1);
        let r_new = self.table.insertion_rank();
        let mut i = ways;
        while i > 0 {
            i -= 1;
            let rank = stack[i].min(ways - 1);
            if rank == r_old {
                stack[i] = r_new;
            } else if rank >= r_new && rank < r_old {
                stack[i] = rank + 1;
            }
        }
        self.debug_check_permutation(entry.set_id);
    }

    /// Demotes a block to the least-valuable position after an external
    /// invalidation
    ///
    /// The way's slot is written with the sentinel `ways` and everything
    /// ranked below it moves up one place; after clamping, the invalidated
    /// way holds rank `ways - 1` and the relative order of the rest is
    /// unchanged
    pub fn invalidate(&mut self, entry: &BlockEntry) {
        let ways = self.ways;
        let stack = &mut self.sets[entry.set_id];
        let r_old = stack[entry.way].min(ways - 1);
        let mut i = ways;
        while i > 0 {
            i -= 1;
            // Compare clamped values: a way already holding the sentinel
            // ranks as ways - 1 and shifts down like any other way
            let rank = stack[i].min(ways - 1);
            if rank == r_old {
                stack[i] = ways;
            } else if rank > r_old {
                stack[i] = rank - 1;
            }
        }
        self.debug_check_permutation(entry.set_id);
    }

    /// Selects the eviction victim among `candidates`, without mutating
    /// anything
    ///
    /// Returns the candidate with the highest clamped rank, keeping the first
    /// among ties, so callers supplying candidates in a fixed order get a
    /// deterministic victim. Over a full set this is exactly the holder of
    /// rank `ways - 1`; over a restricted list it is the least valuable of
    /// the candidates given
    ///
    /// # Arguments
    ///
    /// * `candidates`: The viable entries, normally all ways of one set.
    /// Must be non-empty
    ///
    /// returns: BlockEntry
    pub fn get_victim(&self, candidates: &[BlockEntry]) -> BlockEntry {
        assert!(!candidates.is_empty(), "get_victim requires at least one candidate");
        let mut victim = candidates[0];
        let mut victim_rank = self.clamped_rank(&victim);
        for candidate in &candidates[1..] {
            let rank = self.clamped_rank(candidate);
            if rank > victim_rank {
                victim = *candidate;
                victim_rank = rank;
            }
        }
        victim
    }

    /// The clamped rank currently held by an entry. Diagnostic, also used by
    /// victim selection
    pub fn clamped_rank(&self, entry: &BlockEntry) -> usize {
        self.sets[entry.set_id][entry.way].min(self.ways - 1)
    }

    /// The raw rank values of one set's stack, for tracing. Sentinel values
    /// are left unclamped so an invalidated way is visible as `ways`
    pub fn stack_ranks(&self, set_id: usize) -> &[usize] {
        &self.sets[set_id]
    }

    pub fn ways(&self) -> usize {
        self.ways
    }

    pub fn num_sets(&self) -> usize {
        self.sets.len()
    }

    // The clamped values of a stack must always be a permutation of
    // 0..ways-1; anything else means the shift arithmetic went wrong
    #[cfg(debug_assertions)]
    fn debug_check_permutation(&self, set_id: usize) {
        let mut counts = vec![0usize; self.ways];
        for rank in self.sets[set_id].iter() {
            debug_assert!(
                *rank <= self.ways,
                "rank {rank} outside 0..={} in set {set_id}",
                self.ways
            );
            counts[(*rank).min(self.ways - 1)] += 1;
        }
        debug_assert!(
            counts.iter().all(|c| *c == 1),
            "set {set_id} stack is not a permutation: {:?}",
            self.sets[set_id]
        );
    }

    #[cfg(not(debug_assertions))]
    fn debug_check_permutation(&self, _set_id: usize) {}
}
