use kiln_types::BitSet;
use tracing::debug;

use super::{Color, Degree, Graph, Reg, NO_COLOR, NO_REG};

/// Graph-coloring register allocator: Chaitin's simplify/select with
/// spilling and advisory coloring hints.
///
/// Usage: `reset(num_regs)`, populate [`Allocator::graph_mut`] with
/// interference edges, optionally [`Allocator::add_hint`], then
/// [`Allocator::allocate_regs`] and read [`Allocator::colors`]. Spilled
/// registers receive colors `>= num_colors`; no neighbor ever shares a
/// color, spill colors included.
#[derive(Debug, Default)]
pub struct Allocator {
    g: Graph,
    g2: Graph,
    stack: Vec<Reg>,
    hints: Vec<Color>,
    colors: Vec<Color>,
    avail_colors: BitSet,
    hints_enabled: bool,
}

impl Allocator {
    /// Construct an idle allocator; call [`Allocator::reset`] before use.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset for `num_regs` registers, dropping edges, hints and colors.
    /// Returns `false` if an allocation failed.
    pub fn reset(&mut self, num_regs: u32) -> bool {
        let n = num_regs as usize;
        if !self.g.reset(num_regs) || !self.g2.reset(num_regs) {
            return false;
        }
        self.stack.clear();
        if self.stack.try_reserve(n).is_err() {
            return false;
        }
        self.hints.clear();
        self.colors.clear();
        if self.hints.try_reserve(n).is_err() || self.colors.try_reserve(n).is_err() {
            return false;
        }
        self.hints.resize(n, NO_COLOR);
        self.colors.resize(n, NO_COLOR);
        self.hints_enabled = false;
        true
    }

    /// The interference graph; add edges between registers that are live
    /// at the same time.
    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut self.g
    }

    /// Read access to the interference graph.
    pub const fn graph(&self) -> &Graph {
        &self.g
    }

    /// Store a preferred color for `reg` and enable hint tracking. Hints
    /// are advisory: honored only when the hinted color would be a valid
    /// choice anyway. `reset` disables hints again.
    pub fn add_hint(&mut self, reg: Reg, color: Color) {
        if let Some(slot) = self.hints.get_mut(reg as usize) {
            *slot = color;
            self.hints_enabled = true;
        }
    }

    /// Number of registers the allocator was reset for.
    pub fn len(&self) -> u32 {
        self.g.len()
    }

    /// True before the first `reset`.
    pub fn is_empty(&self) -> bool {
        self.g.is_empty()
    }

    /// Choose a color for every register in the graph.
    pub fn allocate_regs(&mut self, num_colors: Color) {
        if !self.init(num_colors) {
            return;
        }
        // Simplify: peel off nodes of insufficient degree; when none
        // exists, pick a spill candidate instead.
        while self.g2.live_count() > 0 {
            let reg = match self.find_degree_less_than(num_colors) {
                NO_REG => self.pick(),
                reg => reg,
            };
            if reg == NO_REG {
                break;
            }
            self.stack.push(reg);
            self.g2.remove_node(reg);
        }
        self.assign_colors(num_colors);
    }

    /// Colors chosen by [`Allocator::allocate_regs`], indexed by register.
    pub fn colors(&self) -> &[Color] {
        &self.colors
    }

    /// Scratch bitset, resized by `allocate_regs`. Exposed so callers can
    /// reuse it as a buffer between runs.
    pub fn bitset_mut(&mut self) -> &mut BitSet {
        &mut self.avail_colors
    }

    fn init(&mut self, num_colors: Color) -> bool {
        self.stack.clear();
        for color in &mut self.colors {
            *color = NO_COLOR;
        }
        self.g2.copy_from(&self.g) && self.avail_colors.resize(num_colors as usize)
    }

    /// Lowest-indexed live node whose degree is below `degree`, or
    /// `NO_REG`. Ascending scan keeps the algorithm deterministic.
    fn find_degree_less_than(&self, degree: Degree) -> Reg {
        (0..self.g2.len())
            .find(|&reg| self.g2.is_live(reg) && self.g2.degree(reg) < degree)
            .unwrap_or(NO_REG)
    }

    /// Spill candidate: the live node with the highest degree, ties
    /// broken by the lowest register index.
    fn pick(&self) -> Reg {
        let mut best = NO_REG;
        let mut best_degree = 0;
        for reg in 0..self.g2.len() {
            if !self.g2.is_live(reg) {
                continue;
            }
            let degree = self.g2.degree(reg);
            if best == NO_REG || degree > best_degree {
                best = reg;
                best_degree = degree;
            }
        }
        if best != NO_REG {
            debug!(target: "kiln::regalloc", reg = best, degree = best_degree, "spill pick");
        }
        best
    }

    /// Pop registers from the stack and color each with the lowest color
    /// not used by a neighbor, the hinted color when it is equally valid,
    /// or the lowest spill color (`>= num_colors`) otherwise.
    fn assign_colors(&mut self, num_colors: Color) {
        while let Some(reg) = self.stack.pop() {
            self.avail_colors.fill(true);
            for neighbor in self.g.neighbors(reg) {
                let used = self.colors[neighbor as usize];
                if used != NO_COLOR {
                    self.avail_colors.set(used as usize, false);
                }
            }
            let color = match self.try_satisfy_hints(reg) {
                NO_COLOR => match self.avail_colors.first_set() {
                    Some(color) => color as Color,
                    None => self.spill_color(reg, num_colors),
                },
                hinted => hinted,
            };
            self.colors[reg as usize] = color;
        }
    }

    /// The hinted color, when hints are enabled, the hint is in range and
    /// no neighbor holds it already.
    fn try_satisfy_hints(&self, reg: Reg) -> Color {
        if !self.hints_enabled {
            return NO_COLOR;
        }
        let hint = self.hints[reg as usize];
        if hint == NO_COLOR || hint as usize >= self.avail_colors.len() {
            return NO_COLOR;
        }
        if self.avail_colors.get(hint as usize) {
            hint
        } else {
            NO_COLOR
        }
    }

    /// Smallest color `>= num_colors` not used by a neighbor, so spilled
    /// registers stay consistent with invariant "no edge shares a color".
    fn spill_color(&self, reg: Reg, num_colors: Color) -> Color {
        let mut color = num_colors;
        loop {
            let taken = self
                .g
                .neighbors(reg)
                .any(|n| self.colors[n as usize] == color);
            if !taken {
                debug!(target: "kiln::regalloc", reg, color, "spilled");
                return color;
            }
            color += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triangle_with_two_colors_spills_one() {
        let mut alloc = Allocator::new();
        assert!(alloc.reset(3));
        alloc.graph_mut().add_edge(0, 1);
        alloc.graph_mut().add_edge(1, 2);
        alloc.graph_mut().add_edge(0, 2);
        alloc.allocate_regs(2);

        let colors = alloc.colors();
        let spilled: Vec<_> = colors.iter().filter(|&&c| c >= 2).collect();
        assert_eq!(spilled.len(), 1);
        for a in 0..3u32 {
            for b in 0..3u32 {
                if a != b {
                    assert_ne!(colors[a as usize], colors[b as usize]);
                }
            }
        }
    }

    #[test]
    fn hints_are_honored_when_valid() {
        let mut alloc = Allocator::new();
        assert!(alloc.reset(2));
        // No edge between the two regs: both may take the hinted color.
        alloc.add_hint(0, 2);
        alloc.add_hint(1, 2);
        alloc.allocate_regs(4);
        assert_eq!(alloc.colors(), [2, 2]);
    }

    #[test]
    fn hints_lose_to_interference() {
        let mut alloc = Allocator::new();
        assert!(alloc.reset(2));
        alloc.graph_mut().add_edge(0, 1);
        alloc.add_hint(0, 1);
        alloc.add_hint(1, 1);
        alloc.allocate_regs(4);
        let colors = alloc.colors();
        assert_ne!(colors[0], colors[1]);
        assert!(colors.contains(&1));
    }

    #[test]
    fn deterministic_across_runs() {
        let run = || {
            let mut alloc = Allocator::new();
            assert!(alloc.reset(6));
            for (a, b) in [(0, 1), (1, 2), (2, 3), (3, 4), (4, 5), (5, 0), (0, 3)] {
                alloc.graph_mut().add_edge(a, b);
            }
            alloc.allocate_regs(2);
            alloc.colors().to_vec()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn reset_disables_hints() {
        let mut alloc = Allocator::new();
        assert!(alloc.reset(2));
        alloc.add_hint(0, 3);
        assert!(alloc.reset(2));
        alloc.allocate_regs(4);
        // Without the hint, reg 0 takes the lowest color.
        assert_eq!(alloc.colors()[0], 0);
    }
}
