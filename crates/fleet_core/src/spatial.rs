//! Spatial operations: paired H3 cell indices and distance calculations.
//!
//! This module provides:
//!
//! - **EntityCells**: entity id buckets at the fine (location) and coarse (search) resolution
//! - **Nearest-entity search**: ring-by-ring expansion over the coarse index
//! - **Distance calculations**: Haversine distance between H3 cells, LRU cached
//! - **Grid disk queries**: cached `grid_disk` lookups used by the ring search
//!
//! Buckets are persistent `im` collections so a world copy shares them structurally.

use std::num::NonZeroUsize;
use std::sync::{Mutex, OnceLock};

use h3o::{CellIndex, LatLng, Resolution};
use im::{OrdMap, OrdSet};
use lru::LruCache;

use crate::error::{SimResult, SimulationError};

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two coordinates.
pub fn haversine_km(a: LatLng, b: LatLng) -> f64 {
    let (lat1, lon1) = (a.lat().to_radians(), a.lng().to_radians());
    let (lat2, lon2) = (b.lat().to_radians(), b.lng().to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let sin_dlat = (dlat * 0.5).sin();
    let sin_dlon = (dlon * 0.5).sin();
    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlon * sin_dlon;
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}

fn distance_km_between_cells_uncached(a: CellIndex, b: CellIndex) -> f64 {
    haversine_km(a.into(), b.into())
}

/// Global distance cache (50,000 entries, ~800KB memory).
fn get_distance_cache() -> &'static Mutex<LruCache<(CellIndex, CellIndex), f64>> {
    static CACHE: OnceLock<Mutex<LruCache<(CellIndex, CellIndex), f64>>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(LruCache::new(NonZeroUsize::MIN.saturating_add(49_999))))
}

/// Calculate distance between two H3 cell centers with LRU caching.
pub fn distance_km_between_cells(a: CellIndex, b: CellIndex) -> f64 {
    if a == b {
        return 0.0;
    }
    // Symmetric key (smaller cell first) to maximize cache hits
    let key = if a < b { (a, b) } else { (b, a) };

    let mut cache = match get_distance_cache().lock() {
        Ok(guard) => guard,
        Err(_) => return distance_km_between_cells_uncached(key.0, key.1),
    };
    *cache.get_or_insert(key, || distance_km_between_cells_uncached(key.0, key.1))
}

struct GridDiskCache {
    cache: Mutex<LruCache<(CellIndex, u32), Vec<CellIndex>>>,
}

impl GridDiskCache {
    fn new() -> Self {
        Self {
            cache: Mutex::new(LruCache::new(NonZeroUsize::MIN.saturating_add(4_999))),
        }
    }

    fn get_or_compute(&self, origin: CellIndex, k: u32) -> Vec<CellIndex> {
        let mut cache = match self.cache.lock() {
            Ok(guard) => guard,
            Err(_) => return origin.grid_disk::<Vec<_>>(k),
        };
        cache
            .get_or_insert((origin, k), || origin.grid_disk::<Vec<_>>(k))
            .clone()
    }
}

static GRID_DISK_CACHE: OnceLock<GridDiskCache> = OnceLock::new();

/// Get grid disk with caching.
pub fn grid_disk_cached(origin: CellIndex, k: u32) -> Vec<CellIndex> {
    GRID_DISK_CACHE
        .get_or_init(GridDiskCache::new)
        .get_or_compute(origin, k)
}

/// Cells at exactly grid distance `k` from `origin`.
pub fn grid_ring(origin: CellIndex, k: u32) -> Vec<CellIndex> {
    if k == 0 {
        return vec![origin];
    }
    let inner: OrdSet<CellIndex> = grid_disk_cached(origin, k - 1).into_iter().collect();
    grid_disk_cached(origin, k)
        .into_iter()
        .filter(|cell| !inner.contains(cell))
        .collect()
}

/// Parent of `cell` at `resolution`, or an error when `cell` is coarser than it.
pub fn parent_cell(cell: CellIndex, resolution: Resolution) -> SimResult<CellIndex> {
    cell.parent(resolution)
        .ok_or(SimulationError::ResolutionMismatch {
            cell,
            actual: u8::from(cell.resolution()),
            expected: u8::from(resolution),
        })
}

fn with_member<K: Ord + Clone>(
    buckets: &OrdMap<CellIndex, OrdSet<K>>,
    cell: CellIndex,
    id: K,
) -> OrdMap<CellIndex, OrdSet<K>> {
    let bucket = buckets.get(&cell).cloned().unwrap_or_default().update(id);
    buckets.update(cell, bucket)
}

fn without_member<K: Ord + Clone>(
    buckets: &OrdMap<CellIndex, OrdSet<K>>,
    cell: CellIndex,
    id: &K,
) -> OrdMap<CellIndex, OrdSet<K>> {
    match buckets.get(&cell) {
        None => buckets.clone(),
        Some(bucket) => {
            let bucket = bucket.without(id);
            if bucket.is_empty() {
                buckets.without(&cell)
            } else {
                buckets.update(cell, bucket)
            }
        }
    }
}

/// Fine and coarse cell buckets for one entity kind.
///
/// Every id lives in exactly one location bucket and one search bucket. Empty
/// buckets are removed rather than kept as empty sets.
#[derive(Debug, Clone)]
pub struct EntityCells<K: Ord + Clone> {
    search_resolution: Resolution,
    locations: OrdMap<CellIndex, OrdSet<K>>,
    search: OrdMap<CellIndex, OrdSet<K>>,
}

impl<K: Ord + Clone> EntityCells<K> {
    pub fn new(search_resolution: Resolution) -> Self {
        Self {
            search_resolution,
            locations: OrdMap::new(),
            search: OrdMap::new(),
        }
    }

    pub fn search_resolution(&self) -> Resolution {
        self.search_resolution
    }

    pub fn insert(&self, id: K, cell: CellIndex) -> SimResult<Self> {
        let search_cell = parent_cell(cell, self.search_resolution)?;
        Ok(Self {
            search_resolution: self.search_resolution,
            locations: with_member(&self.locations, cell, id.clone()),
            search: with_member(&self.search, search_cell, id),
        })
    }

    pub fn remove(&self, id: &K, cell: CellIndex) -> SimResult<Self> {
        let search_cell = parent_cell(cell, self.search_resolution)?;
        Ok(Self {
            search_resolution: self.search_resolution,
            locations: without_member(&self.locations, cell, id),
            search: without_member(&self.search, search_cell, id),
        })
    }

    /// Moves `id` between buckets; a same-cell move returns an identical index.
    pub fn relocate(&self, id: &K, from: CellIndex, to: CellIndex) -> SimResult<Self> {
        if from == to {
            return Ok(self.clone());
        }
        self.remove(id, from)?.insert(id.clone(), to)
    }

    pub fn at_location(&self, cell: CellIndex) -> Option<&OrdSet<K>> {
        self.locations.get(&cell)
    }

    pub fn at_search_cell(&self, cell: CellIndex) -> Option<&OrdSet<K>> {
        self.search.get(&cell)
    }

    pub fn locations(&self) -> &OrdMap<CellIndex, OrdSet<K>> {
        &self.locations
    }

    pub fn search_cells(&self) -> &OrdMap<CellIndex, OrdSet<K>> {
        &self.search
    }

    /// Verifies that each `(id, cell)` pair is indexed exactly once at both resolutions.
    pub fn check_consistency<'a, I>(&self, entities: I) -> Result<(), String>
    where
        I: IntoIterator<Item = (&'a K, CellIndex)>,
        K: 'a + std::fmt::Debug,
    {
        let mut expected = 0usize;
        for (id, cell) in entities {
            expected += 1;
            if !self.locations.get(&cell).is_some_and(|b| b.contains(id)) {
                return Err(format!("{id:?} missing from location bucket {cell}"));
            }
            let search_cell = cell
                .parent(self.search_resolution)
                .ok_or_else(|| format!("{id:?} at {cell} has no search parent"))?;
            if !self.search.get(&search_cell).is_some_and(|b| b.contains(id)) {
                return Err(format!("{id:?} missing from search bucket {search_cell}"));
            }
        }
        for (name, buckets) in [("location", &self.locations), ("search", &self.search)] {
            if buckets.values().any(|bucket| bucket.is_empty()) {
                return Err(format!("empty {name} bucket left in index"));
            }
            let indexed: usize = buckets.values().map(|bucket| bucket.len()).sum();
            if indexed != expected {
                return Err(format!(
                    "{name} index holds {indexed} entries for {expected} entities"
                ));
            }
        }
        Ok(())
    }

    /// Finds the closest qualifying entity around `origin`.
    ///
    /// Rings of search-resolution cells around the origin's parent are visited
    /// outwards, each ring covering roughly two search-cell edge lengths, up to
    /// `max_search_distance_km`. `score` returns the distance of a candidate or
    /// `None` when it does not qualify. Once a ring yields a hit one more ring
    /// is examined, since a candidate in the adjacent ring can still be closer.
    /// Ties are broken by id.
    pub fn nearest_entity<F>(
        &self,
        origin: CellIndex,
        max_search_distance_km: f64,
        mut score: F,
    ) -> SimResult<Option<(K, f64)>>
    where
        F: FnMut(&K) -> Option<f64>,
    {
        let search_cell = parent_cell(origin, self.search_resolution)?;
        let k_distance_km = self.search_resolution.edge_length_km() * 2.0;
        let max_k = (max_search_distance_km.max(0.0) / k_distance_km).ceil() as u32;

        let mut best: Option<(K, f64)> = None;
        let mut first_hit_ring: Option<u32> = None;
        for k in 0..=max_k {
            if first_hit_ring.is_some_and(|hit| k > hit + 1) {
                break;
            }
            for cell in grid_ring(search_cell, k) {
                let Some(bucket) = self.search.get(&cell) else {
                    continue;
                };
                for id in bucket.iter() {
                    let Some(distance) = score(id) else {
                        continue;
                    };
                    let is_better = match &best {
                        None => true,
                        Some((best_id, best_distance)) => distance
                            .total_cmp(best_distance)
                            .then_with(|| id.cmp(best_id))
                            .is_lt(),
                    };
                    if is_better {
                        best = Some((id.clone(), distance));
                    }
                }
            }
            if best.is_some() && first_hit_ring.is_none() {
                first_hit_ring = Some(k);
            }
        }
        Ok(best)
    }
}
