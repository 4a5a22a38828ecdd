//! Register interference graph and the graph-coloring allocator.

mod allocator;
mod graph;

pub use allocator::Allocator;
pub use graph::Graph;

/// A virtual register: a node index in the interference graph.
pub type Reg = u32;

/// A color assigned to a register. Colors `>= num_colors` mark spills.
pub type Color = u32;

/// Degree of a graph node.
pub type Degree = u32;

/// Sentinel shared by [`NO_REG`], [`NO_COLOR`] and [`NO_POS`].
const NO_POS_VAL: u32 = u32::MAX;

/// No register.
pub const NO_REG: Reg = NO_POS_VAL;

/// No color.
pub const NO_COLOR: Color = NO_POS_VAL;

/// No position.
pub const NO_POS: u32 = NO_POS_VAL;
