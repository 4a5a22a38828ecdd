use kiln_types::BitSet;

use super::{Degree, Reg};

/// Undirected interference graph over register indices.
///
/// Rows are adjacency bitsets, so edge membership is O(1) and removing a
/// node costs its degree; a `live` set tracks which nodes are still
/// present, which is what the allocator's simplify loop consumes. A
/// compact CSR would not do here: simplification removes nodes one by
/// one.
#[derive(Debug, Default, Clone)]
pub struct Graph {
    adj: Vec<BitSet>,
    degree: Vec<Degree>,
    live: BitSet,
    live_count: u32,
}

impl Graph {
    /// Construct an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset to `n` nodes and no edges. Returns `false` if an allocation
    /// failed.
    pub fn reset(&mut self, n: u32) -> bool {
        let n = n as usize;
        if self.adj.len() < n && self.adj.try_reserve(n - self.adj.len()).is_err() {
            return false;
        }
        self.adj.truncate(n);
        for row in &mut self.adj {
            if !row.resize(n) {
                return false;
            }
            row.fill(false);
        }
        while self.adj.len() < n {
            let mut row = BitSet::new();
            if !row.resize(n) {
                return false;
            }
            self.adj.push(row);
        }
        if self.degree.try_reserve(n.saturating_sub(self.degree.len())).is_err() {
            return false;
        }
        self.degree.clear();
        self.degree.resize(n, 0);
        if !self.live.resize(n) {
            return false;
        }
        self.live.fill(true);
        self.live_count = n as u32;
        true
    }

    /// Total number of nodes, removed ones included.
    pub fn len(&self) -> u32 {
        self.adj.len() as u32
    }

    /// True when the graph was never sized.
    pub fn is_empty(&self) -> bool {
        self.adj.is_empty()
    }

    /// Number of nodes still present.
    pub const fn live_count(&self) -> u32 {
        self.live_count
    }

    /// True if `reg` has not been removed.
    pub fn is_live(&self, reg: Reg) -> bool {
        self.live.get(reg as usize)
    }

    /// Add an undirected edge. Self-edges and duplicates are ignored.
    pub fn add_edge(&mut self, a: Reg, b: Reg) {
        let (a, b) = (a as usize, b as usize);
        if a == b || a >= self.adj.len() || b >= self.adj.len() || self.adj[a].get(b) {
            return;
        }
        self.adj[a].set(b, true);
        self.adj[b].set(a, true);
        self.degree[a] += 1;
        self.degree[b] += 1;
    }

    /// True if `a` and `b` interfere.
    pub fn has_edge(&self, a: Reg, b: Reg) -> bool {
        self.adj
            .get(a as usize)
            .is_some_and(|row| row.get(b as usize))
    }

    /// Current degree of `reg`.
    pub fn degree(&self, reg: Reg) -> Degree {
        self.degree.get(reg as usize).copied().unwrap_or(0)
    }

    /// Iterate over the neighbors of `reg`, ascending.
    pub fn neighbors(&self, reg: Reg) -> impl Iterator<Item = Reg> + '_ {
        self.adj
            .get(reg as usize)
            .into_iter()
            .flat_map(|row| row.ones().map(|n| n as Reg))
    }

    /// Remove a node and its edges.
    pub fn remove_node(&mut self, reg: Reg) {
        let r = reg as usize;
        if r >= self.adj.len() || !self.live.get(r) {
            return;
        }
        // Detach from every neighbor first; the row borrow ends before
        // the neighbor rows are touched.
        let neighbors: Vec<usize> = self.adj[r].ones().collect();
        for n in neighbors {
            self.adj[n].set(r, false);
            self.degree[n] -= 1;
        }
        self.adj[r].fill(false);
        self.degree[r] = 0;
        self.live.set(r, false);
        self.live_count -= 1;
    }

    /// Make this graph an exact copy of `other`. Returns `false` if an
    /// allocation failed.
    pub fn copy_from(&mut self, other: &Graph) -> bool {
        if !self.reset(other.len()) {
            return false;
        }
        for (row, src) in self.adj.iter_mut().zip(&other.adj) {
            if !row.copy_from(src) {
                return false;
            }
        }
        self.degree.copy_from_slice(&other.degree);
        if !self.live.copy_from(&other.live) {
            return false;
        }
        self.live_count = other.live_count;
        true
    }
}
