//! Bounded byte buffer for emitted machine code, with label back-patching.
//!
//! The buffer has a fixed capacity (machine code usually targets a mapped
//! executable region): appends past capacity set a sticky error flag and
//! are dropped. Labels are resolved in two steps: [`Assembler::mark_label`]
//! records a label's byte position into its node's address slot, and
//! [`Assembler::seal`] patches every site recorded by
//! [`Assembler::add_label`] with the signed relative distance from the end
//! of the patch site to the label's resolved position.

use kiln_ir::{Code, Label};
use tracing::warn;

/// One pending patch site: the byte span of the displacement field and
/// the label it refers to.
#[derive(Debug, Clone, Copy)]
struct LabelRef {
    /// Byte offset just past the displacement field; relative jumps on
    /// x86-64 are measured from the next instruction byte.
    end: usize,
    /// Width of the displacement field in bytes (1, 2, 4 or 8), taken
    /// from the bytes most recently added before `add_label`.
    width: usize,
    label: Label,
}

/// Byte buffer with label patching. See the module docs.
#[derive(Debug, Default)]
pub struct Assembler {
    bytes: Vec<u8>,
    capacity: usize,
    last_add: usize,
    refs: Vec<LabelRef>,
    err: bool,
}

impl Assembler {
    /// Construct with a fixed byte capacity. If the backing allocation
    /// fails the assembler starts in the error state.
    pub fn new(capacity: usize) -> Self {
        let mut bytes = Vec::new();
        let err = bytes.try_reserve_exact(capacity).is_err();
        Self {
            bytes,
            capacity,
            last_add: 0,
            refs: Vec::new(),
            err,
        }
    }

    /// False once any append was dropped or a patch failed.
    pub const fn ok(&self) -> bool {
        !self.err
    }

    /// Bytes emitted so far.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True when nothing has been emitted.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// View of the emitted bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Append one byte.
    pub fn add_byte(&mut self, byte: u8) -> &mut Self {
        self.add_bytes(&[byte])
    }

    /// Append a byte slice. Appends past capacity set the sticky error
    /// flag and are dropped whole.
    pub fn add_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        if self.err || self.bytes.len() + bytes.len() > self.capacity {
            self.err = true;
            return self;
        }
        self.last_add = bytes.len();
        self.bytes.extend_from_slice(bytes);
        self
    }

    /// Attach the most recently added bytes to `label` as a displacement
    /// field to be patched at seal time. Invalid (codeless) labels are
    /// no-ops.
    pub fn add_label(&mut self, label: Label) -> &mut Self {
        if !label.node().is_valid() || label.node().offset().is_none() {
            return self;
        }
        if !matches!(self.last_add, 1 | 2 | 4 | 8) {
            self.err = true;
            return self;
        }
        self.refs.push(LabelRef {
            end: self.bytes.len(),
            width: self.last_add,
            label,
        });
        self
    }

    /// Record the label's position as the current end of the buffer.
    pub fn mark_label(&mut self, code: &mut Code, label: Label) -> &mut Self {
        label.resolve(code, self.bytes.len() as u64);
        self
    }

    /// Patch every recorded site with the signed relative distance to its
    /// label. Unresolved labels and displacements that do not fit their
    /// field set the error flag; other sites are still patched.
    pub fn seal(&mut self, code: &Code) -> bool {
        for i in 0..self.refs.len() {
            let LabelRef { end, width, label } = self.refs[i];
            let Some(address) = label.resolved(code) else {
                warn!(target: "kiln::asm", index = label.index(), "unresolved label");
                self.err = true;
                continue;
            };
            let disp = address as i64 - end as i64;
            let bits = width * 8;
            // Displacement must fit its field.
            if bits < 64 && (disp >= 1i64 << (bits - 1) || disp < -(1i64 << (bits - 1))) {
                warn!(target: "kiln::asm", index = label.index(), disp, "displacement overflow");
                self.err = true;
                continue;
            }
            let le = disp.to_le_bytes();
            self.bytes[end - width..end].copy_from_slice(&le[..width]);
        }
        self.refs.clear();
        !self.err
    }

    /// Drop everything and clear the error flag; capacity is kept.
    pub fn clear(&mut self) {
        self.bytes.clear();
        self.refs.clear();
        self.last_add = 0;
        self.err = false;
    }
}
