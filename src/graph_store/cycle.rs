//! Cycle detection along the owner direction

use std::collections::HashSet;

use super::snapshot::GraphSnapshot;
use ubo_types::EntityId;

impl GraphSnapshot {
    /// DFS upward from `from`. Returns the cycle as `[from, owner, ..., from]`,
    /// or `None` when `from` cannot reach itself.
    pub fn detect_cycle(&self, from: &EntityId) -> Option<Vec<EntityId>> {
        let start = self.slot(from)?;

        // Stack entries: (entity slot, next owner-edge position to try)
        let mut stack: Vec<(usize, usize)> = vec![(start, 0)];
        let mut exhausted: HashSet<usize> = HashSet::new();

        while let Some(&(node, pos)) = stack.last() {
            let owner_edges = self.owner_slots(node);
            if pos >= owner_edges.len() {
                exhausted.insert(node);
                stack.pop();
                continue;
            }
            if let Some(top) = stack.last_mut() {
                top.1 += 1;
            }

            let edge = self.edge_at(owner_edges[pos]);
            if self.is_superseded(edge.id) {
                continue;
            }
            let Some(next) = self.slot(&edge.owner) else {
                continue;
            };

            if next == start {
                let mut path: Vec<EntityId> = stack
                    .iter()
                    .map(|&(slot, _)| self.entity_at(slot).clone())
                    .collect();
                path.push(from.clone());
                return Some(path);
            }
            if exhausted.contains(&next) || stack.iter().any(|&(slot, _)| slot == next) {
                continue;
            }
            stack.push((next, 0));
        }

        None
    }
}
