use ordered_float::OrderedFloat;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use crate::ann::{AnnHit, AnnIndex};
use crate::Matrix;

/// Generation-stamped visited marks; clearing is O(1)
struct VisitedSet {
    marks: Vec<u32>,
    generation: u32,
}

impl VisitedSet {
    #[inline]
    fn new(capacity: usize) -> Self {
        Self {
            marks: vec![0; capacity],
            generation: 1,
        }
    }

    #[inline]
    fn clear(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        if self.generation == 0 {
            self.marks.fill(0);
            self.generation = 1;
        }
    }

    #[inline]
    fn ensure_capacity(&mut self, capacity: usize) {
        if capacity > self.marks.len() {
            self.marks.resize(capacity, 0);
        }
    }

    /// Returns true the first time `idx` is seen in this generation
    #[inline]
    fn insert(&mut self, idx: usize) -> bool {
        if self.marks[idx] == self.generation {
            return false;
        }
        self.marks[idx] = self.generation;
        true
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HnswConfig {
    /// Links per node on upper layers; layer 0 keeps twice as many
    pub m: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
    pub max_layers: usize,
    pub seed: u64,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construction: 200,
            ef_search: 64,
            max_layers: 4,
            seed: 42,
        }
    }
}

/// HNSW graph over L2-normalized rows, scored by inner product.
///
/// Node `i` is row `i` of the matrix it was built from, so hits map straight
/// back to factor rows. Searching takes `&self` and allocates its own visited
/// set, which lets a cached index serve concurrent readers without a lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HnswIndex {
    dim: usize,
    /// Contiguous row-major storage for all vectors
    vectors: Vec<f32>,
    /// `links[node][layer]` holds the neighbors of `node` on `layer`
    links: Vec<Vec<Vec<u32>>>,
    entry_point: Option<u32>,
    top_layer: usize,
    m: usize,
    ef_construction: usize,
    ef_search: usize,
}

impl HnswIndex {
    #[must_use]
    pub fn build(vectors: &Matrix, config: &HnswConfig) -> Self {
        let mut index = Self {
            dim: vectors.cols(),
            vectors: vectors.as_slice().to_vec(),
            links: Vec::with_capacity(vectors.rows()),
            entry_point: None,
            top_layer: 0,
            m: config.m.max(2),
            ef_construction: config.ef_construction.max(config.m),
            ef_search: config.ef_search.max(1),
        };

        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut visited = VisitedSet::new(vectors.rows());
        let max_layers = config.max_layers.max(1);
        for node in 0..vectors.rows() {
            let layer = Self::select_layer(&mut rng, max_layers);
            index.insert(node as u32, layer, &mut visited);
        }

        tracing::debug!(
            nodes = index.links.len(),
            top_layer = index.top_layer,
            "built hnsw index"
        );
        index
    }

    /// Exponential decay: each extra layer with probability 1/2
    #[inline]
    fn select_layer(rng: &mut StdRng, max_layers: usize) -> usize {
        let mut layer = 0;
        while layer < max_layers - 1 && rng.random::<f32>() < 0.5 {
            layer += 1;
        }
        layer
    }

    #[inline(always)]
    fn vector(&self, node: u32) -> &[f32] {
        let start = node as usize * self.dim;
        &self.vectors[start..start + self.dim]
    }

    #[inline(always)]
    fn distance(&self, query: &[f32], node: u32) -> f32 {
        1.0 - crate::simd::dot_product_simd(query, self.vector(node))
    }

    /// Best-first search on one layer. Result is sorted by ascending distance.
    fn search_layer(
        &self,
        query: &[f32],
        entry: u32,
        ef: usize,
        layer: usize,
        visited: &mut VisitedSet,
    ) -> Vec<(u32, f32)> {
        visited.clear();
        visited.ensure_capacity(self.links.len());

        let entry_dist = self.distance(query, entry);
        let mut candidates = BinaryHeap::with_capacity(ef * 2);
        let mut results = BinaryHeap::with_capacity(ef + 1);
        candidates.push(Reverse((OrderedFloat(entry_dist), entry)));
        results.push((OrderedFloat(entry_dist), entry));
        visited.insert(entry as usize);

        while let Some(Reverse((OrderedFloat(dist), node))) = candidates.pop() {
            let worst = results.peek().map(|(d, _)| d.0).unwrap_or(f32::INFINITY);
            if results.len() >= ef && dist > worst {
                break;
            }

            let Some(neighbors) = self.links[node as usize].get(layer) else {
                continue;
            };
            for &next in neighbors {
                if !visited.insert(next as usize) {
                    continue;
                }
                let d = self.distance(query, next);
                let worst = results.peek().map(|(w, _)| w.0).unwrap_or(f32::INFINITY);
                if results.len() < ef || d < worst {
                    candidates.push(Reverse((OrderedFloat(d), next)));
                    results.push((OrderedFloat(d), next));
                    if results.len() > ef {
                        results.pop();
                    }
                }
            }
        }

        let mut out: Vec<(u32, f32)> = results.into_iter().map(|(d, n)| (n, d.0)).collect();
        out.sort_by(|a, b| OrderedFloat(a.1).cmp(&OrderedFloat(b.1)).then(a.0.cmp(&b.0)));
        out
    }

    /// Greedy walk from the entry point down to `stop_layer + 1`
    fn descend(&self, query: &[f32], stop_layer: usize, visited: &mut VisitedSet) -> Option<u32> {
        let mut current = self.entry_point?;
        let mut layer = self.top_layer;
        while layer > stop_layer {
            if let Some(&(best, _)) = self.search_layer(query, current, 1, layer, visited).first() {
                current = best;
            }
            layer -= 1;
        }
        Some(current)
    }

    fn insert(&mut self, node: u32, layer: usize, visited: &mut VisitedSet) {
        self.links.push(vec![Vec::new(); layer + 1]);

        let Some(entry) = self.entry_point else {
            self.entry_point = Some(node);
            self.top_layer = layer;
            return;
        };

        let query = self.vector(node).to_vec();
        let mut current = if layer < self.top_layer {
            self.descend(&query, layer, visited).unwrap_or(entry)
        } else {
            entry
        };

        for l in (0..=layer.min(self.top_layer)).rev() {
            let candidates = self.search_layer(&query, current, self.ef_construction, l, visited);
            let neighbors: Vec<u32> = candidates
                .iter()
                .map(|&(n, _)| n)
                .filter(|&n| n != node)
                .take(self.m)
                .collect();

            let max_links = if l == 0 { self.m * 2 } else { self.m };
            for &n in &neighbors {
                self.links[n as usize][l].push(node);
                if self.links[n as usize][l].len() > max_links {
                    self.prune(n, l, max_links);
                }
            }
            self.links[node as usize][l] = neighbors;

            if let Some(&(closest, _)) = candidates.first() {
                current = closest;
            }
        }

        if layer > self.top_layer {
            self.top_layer = layer;
            self.entry_point = Some(node);
        }
    }

    /// Keep the `max_links` closest neighbors of `node` on `layer`
    fn prune(&mut self, node: u32, layer: usize, max_links: usize) {
        let base = self.vector(node).to_vec();
        let mut scored: Vec<(u32, f32)> = self.links[node as usize][layer]
            .iter()
            .map(|&n| (n, self.distance(&base, n)))
            .collect();
        scored.sort_by(|a, b| OrderedFloat(a.1).cmp(&OrderedFloat(b.1)));
        scored.truncate(max_links);
        self.links[node as usize][layer] = scored.into_iter().map(|(n, _)| n).collect();
    }
}

impl AnnIndex for HnswIndex {
    fn dim(&self) -> usize {
        self.dim
    }

    fn len(&self) -> usize {
        self.links.len()
    }

    fn search(&self, query: &[f32], k: usize) -> Vec<AnnHit> {
        if k == 0 || self.links.is_empty() || query.len() != self.dim {
            return Vec::new();
        }

        let mut visited = VisitedSet::new(self.links.len());
        let Some(start) = self.descend(query, 0, &mut visited) else {
            return Vec::new();
        };
        let ef = self.ef_search.max(k);

        self.search_layer(query, start, ef, 0, &mut visited)
            .into_iter()
            .take(k)
            .map(|(node, dist)| AnnHit {
                row: node as i64,
                score: 1.0 - dist,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ann::FlatIpIndex;

    fn random_unit_rows(n: usize, dim: usize, seed: u64) -> Matrix {
        let mut rng = StdRng::seed_from_u64(seed);
        let rows: Vec<Vec<f32>> = (0..n)
            .map(|_| (0..dim).map(|_| rng.random::<f32>() - 0.5).collect())
            .collect();
        Matrix::from_rows(&rows).unwrap().normalized_rows()
    }

    #[test]
    fn test_hnsw_finds_exact_match() {
        let vectors = random_unit_rows(200, 16, 7);
        let index = HnswIndex::build(&vectors, &HnswConfig::default());
        assert_eq!(index.len(), 200);

        for row in [0usize, 57, 199] {
            let hits = index.search(vectors.row(row), 1);
            assert_eq!(hits[0].row, row as i64);
            assert!((hits[0].score - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_hnsw_recall_against_flat() {
        let vectors = random_unit_rows(300, 8, 11);
        let hnsw = HnswIndex::build(&vectors, &HnswConfig::default());
        let flat = FlatIpIndex::new(vectors.clone());

        let queries = random_unit_rows(20, 8, 99);
        let mut found = 0;
        for q in 0..queries.rows() {
            let truth: Vec<i64> = flat.search(queries.row(q), 10).iter().map(|h| h.row).collect();
            let approx = hnsw.search(queries.row(q), 10);
            assert!(approx.windows(2).all(|w| w[0].score >= w[1].score));
            found += approx.iter().filter(|h| truth.contains(&h.row)).count();
        }
        assert!(found as f32 / 200.0 > 0.8, "recall too low: {}", found);
    }

    #[test]
    fn test_hnsw_empty_and_k_zero() {
        let empty = HnswIndex::build(&Matrix::zeros(0, 4), &HnswConfig::default());
        assert!(empty.search(&[0.0; 4], 3).is_empty());

        let vectors = random_unit_rows(5, 4, 1);
        let index = HnswIndex::build(&vectors, &HnswConfig::default());
        assert!(index.search(vectors.row(0), 0).is_empty());
        assert!(index.search(vectors.row(0), 10).len() <= 5);
    }

    #[test]
    fn test_visited_set() {
        let mut vs = VisitedSet::new(100);
        assert!(vs.insert(5));
        assert!(!vs.insert(5));
        vs.clear();
        assert!(vs.insert(5));
    }
}
