//! Overlay change tracking between runs.
//!
//! Compares the freshly resolved application order against the order
//! recorded by the previous successful apply pass. Purely informational:
//! nothing here mutates engine state.

use std::cmp::Ordering;

use crate::overlay::{classify, Classification};

/// Overlay names added since the previous run, and names no longer present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverlayDiff {
    pub added: Vec<String>,
    pub reverted: Vec<String>,
}

impl OverlayDiff {
    pub fn is_changed(&self) -> bool {
        !self.added.is_empty() || !self.reverted.is_empty()
    }

    /// Diff for a first run with no applied-overlay log: everything resolved
    /// is new.
    pub fn all_added(current: &[String]) -> Self {
        Self {
            added: current.to_vec(),
            reverted: Vec::new(),
        }
    }
}

/// Diff two application orders.
///
/// Service packs occupy the head position and are compared as whole units,
/// never artifact-by-artifact: differing heads report the old pack as
/// reverted and the new one as added. The patch remainder of both lists is
/// ascending, so a linear two-pointer merge yields the added/reverted sets.
pub fn diff_orders(current: &[String], previous: &[String]) -> OverlayDiff {
    let mut diff = OverlayDiff::default();
    let mut cur = current;
    let mut prev = previous;

    let cur_head_is_pack = cur.first().is_some_and(|n| is_service_pack(n));
    let prev_head_is_pack = prev.first().is_some_and(|n| is_service_pack(n));
    match (cur_head_is_pack, prev_head_is_pack) {
        (true, true) => {
            if cur[0] != prev[0] {
                diff.reverted.push(prev[0].clone());
                diff.added.push(cur[0].clone());
            }
            cur = &cur[1..];
            prev = &prev[1..];
        }
        (true, false) => {
            diff.added.push(cur[0].clone());
            cur = &cur[1..];
        }
        (false, true) => {
            diff.reverted.push(prev[0].clone());
            prev = &prev[1..];
        }
        (false, false) => {}
    }

    let (mut i, mut j) = (0, 0);
    while i < cur.len() && j < prev.len() {
        match cur[i].cmp(&prev[j]) {
            Ordering::Equal => {
                i += 1;
                j += 1;
            }
            Ordering::Less => {
                diff.added.push(cur[i].clone());
                i += 1;
            }
            Ordering::Greater => {
                diff.reverted.push(prev[j].clone());
                j += 1;
            }
        }
    }
    diff.added.extend(cur[i..].iter().cloned());
    diff.reverted.extend(prev[j..].iter().cloned());

    diff
}

fn is_service_pack(name: &str) -> bool {
    classify(name) == Classification::ServicePack
}
