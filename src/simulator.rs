use std::time::{Duration, Instant};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use crate::cache::Cache;
use crate::config::LayeredCacheConfig;

lazy_static! {
    // <op> <hex address> [<size>], op is L (load), S (store) or I (invalidate)
    static ref TRACE_LINE: Regex =
        Regex::new(r"^(?P<op>[LSI])\s+(?P<addr>[0-9a-fA-F]{1,16})(?:\s+(?P<size>[0-9]{1,3}))?\s*$").unwrap();
}

/// The simulator handles line alignment when using the caches, and collects
/// results.
///
/// It supports calling simulate multiple times, and will update the time taken
/// to simulate and the results accordingly
pub struct Simulator {
    caches: Vec<Cache>,
    result: LayeredCacheResult,
    simulation_time: Duration,
}

/// The result of a cache simulation. Can be serialised to the output format
#[derive(Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct LayeredCacheResult {
    pub main_memory_accesses: u64,
    pub caches: Vec<CacheResult>,
}

/// The result for an individual cache. Can be serialised to the output format
#[derive(Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct CacheResult {
    pub name: String,
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
}

impl Simulator {

    /// Creates a new simulator for a given configuration
    ///
    /// Fails when any layer's configuration is rejected, so a simulator that
    /// constructs successfully can never produce wrong rankings from a
    /// mismatched promotion vector
    ///
    /// # Arguments
    ///
    /// * `config`: A cache configuration, usually resulting from parsing JSON
    ///
    /// returns: Result<Simulator, String>
    pub fn new(config: &LayeredCacheConfig) -> Result<Self, String> {
        if config.caches.is_empty() {
            return Err("The configuration must contain at least one cache".to_string());
        }
        let caches = config.caches.iter().map(Cache::new).collect::<Result<Vec<_>, _>>()?;
        let result = LayeredCacheResult {
            main_memory_accesses: 0,
            caches: config.caches.iter().map(|cache| CacheResult {
                hits: 0,
                misses: 0,
                invalidations: 0,
                name: cache.name.clone(),
            }).collect(),
        };
        Ok(Self {
            caches,
            result,
            simulation_time: Duration::new(0, 0),
        })
    }

    /// Reads a value from memory, at a given address with a given size
    ///
    /// The simulator will handle splitting the read so caches can be checked
    /// for each relevant line
    ///
    /// # Arguments
    ///
    /// * `address`: The address of the read
    /// * `size`: The size of the read in bytes
    ///
    /// returns: (), internally the result is updated
    fn read(&mut self, address: u64, size: u16) {
        // Assume line size doesn't decrease with level
        let first_cache = self.caches.first().unwrap();
        let lowest_line_size = first_cache.get_line_size();
        let alignment_diff = address & !first_cache.get_alignment_bit_mask();
        let mut current_aligned_address = address - alignment_diff;
        // Saturate so reads at the top of the address space terminate
        // instead of wrapping
        let exclusive_upper_bound = address.saturating_add(size as u64);
        while current_aligned_address < exclusive_upper_bound {
            for (cache, res) in self.caches.iter_mut().zip(&mut self.result.caches) {
                if cache.read_and_update_line(current_aligned_address) {
                    // Hit
                    res.hits += 1;
                    break;
                } else {
                    // Miss
                    res.misses += 1;
                }
            }
            current_aligned_address = match current_aligned_address.checked_add(lowest_line_size) {
                Some(next) => next,
                None => break,
            };
        }
    }

    /// Invalidates a line in every layer. Unlike reads, an invalidation never
    /// stops at the first layer that holds the line
    fn invalidate(&mut self, address: u64) {
        for (cache, res) in self.caches.iter_mut().zip(&mut self.result.caches) {
            if cache.invalidate_line(address) {
                res.invalidations += 1;
            }
        }
    }

    /// Simulates the caches over a byte buffer holding a line-oriented trace
    ///
    /// Each non-empty line must match `<op> <hex address> [<size>]`, where
    /// `op` is `L` or `S` for an access of `size` bytes (default 1) or `I`
    /// for an invalidation. A line that doesn't match fails the whole
    /// simulation, naming the offending line
    ///
    /// # Arguments
    ///
    /// * `bytes`: The input byte buffer, e.g. a memory-mapped trace file
    ///
    /// returns: Result<&LayeredCacheResult, String>
    pub fn simulate(&mut self, bytes: &[u8]) -> Result<&LayeredCacheResult, String> {
        let start = Instant::now();
        for (line_number, line) in bytes.split(|b| *b == b'\n').enumerate() {
            let line = std::str::from_utf8(line)
                .map_err(|e| format!("Trace line {} is not valid UTF-8: {e}", line_number + 1))?
                .trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            let tokens = TRACE_LINE.captures(line)
                .ok_or(format!("Trace line {} is malformed: {line:?}", line_number + 1))?;
            // The regex guarantees these parse
            let address = u64::from_str_radix(&tokens["addr"], 16).unwrap();
            match &tokens["op"] {
                "I" => self.invalidate(address),
                _ => {
                    let size = tokens.name("size").map_or(1, |s| s.as_str().parse::<u16>().unwrap());
                    self.read(address, size);
                }
            }
        }
        let end = Instant::now();
        self.simulation_time += end - start;
        // Main memory accesses are whatever misses the last cache
        self.result.main_memory_accesses = self.result.caches.last().unwrap().misses;
        Ok(&self.result)
    }

    /// Gets the wall-clock execution time for processing
    pub fn get_execution_time(&self) -> &Duration {
        &self.simulation_time
    }

    /// Gets the number of uninitialised lines for each cache
    pub fn get_uninitialised_line_counts(&self) -> Vec<u64> {
        self.caches.iter().map(|x| x.get_uninitialised_line_count() as u64).collect()
    }

    /// Renders the recency stacks of the first `max_sets` sets of each cache,
    /// for debugging. Purely observational
    pub fn dump_recency_state(&self, max_sets: usize) -> String {
        let mut out = String::new();
        for (cache, res) in self.caches.iter().zip(&self.result.caches) {
            out.push_str(&format!("{}:\n", res.name));
            for set in 0..cache.num_sets().min(max_sets) {
                out.push_str(&format!("  set {set}: {:?}\n", cache.recency_ranks(set)));
            }
        }
        out
    }
}
