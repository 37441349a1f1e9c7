// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Human-readable tree dumps.

use alloc::string::String;
use alloc::vec;
use core::fmt::Write as _;

use super::id::{INVALID, NodeId};
use super::store::NodeStore;

impl NodeStore {
    /// Renders the subtree rooted at `root`, one node per line, children
    /// indented two spaces under their parent, bottom child first.
    ///
    /// ```text
    /// "stage" (Stage) (0, 0) 1280x800 scale=(1.00, 1.00) opacity=1.00 tilt=0.00
    ///   "window" (hidden Quad) (10, 20) 300x200 scale=(1.00, 1.00) opacity=0.50 tilt=0.00
    /// ```
    #[must_use]
    pub fn debug_string(&self, root: NodeId) -> String {
        assert!(self.is_alive(root), "stale NodeId: {root:?}");
        let mut out = String::new();
        let mut stack = vec![(root.idx, 0_usize)];
        while let Some((idx, indent)) = stack.pop() {
            self.dump_line(&mut out, idx, indent);
            // Last child pushed first so the bottom child pops first.
            let mut c = self.last_child[idx as usize];
            while c != INVALID {
                stack.push((c, indent + 1));
                c = self.prev_sibling[c as usize];
            }
        }
        out
    }

    fn dump_line(&self, out: &mut String, idx: u32, indent: usize) {
        let i = idx as usize;
        for _ in 0..indent {
            out.push_str("  ");
        }
        // Writing to a String cannot fail.
        let _ = writeln!(
            out,
            "\"{}\" ({}{}) ({}, {}) {}x{} scale=({:.2}, {:.2}) opacity={:.2} tilt={:.2}",
            self.name[i],
            if self.shown[i] { "" } else { "hidden " },
            self.kind[i],
            self.x[i],
            self.y[i],
            self.width[i],
            self.height[i],
            self.scale_x[i],
            self.scale_y[i],
            self.opacity[i],
            self.tilt[i],
        );
    }
}
