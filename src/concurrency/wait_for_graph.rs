use std::collections::{HashMap, HashSet, VecDeque};

use crate::common::TransactionId;

/// Directed graph of "waiter waits for holder" edges between transactions.
#[derive(Debug, Default)]
pub struct WaitForGraph {
    edges: HashMap<TransactionId, HashSet<TransactionId>>,
}

impl WaitForGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the outgoing edges of `waiter`.
    pub fn set_waits(&mut self, waiter: TransactionId, blockers: HashSet<TransactionId>) {
        if blockers.is_empty() {
            self.edges.remove(&waiter);
        } else {
            self.edges.insert(waiter, blockers);
        }
    }

    /// Drops every outgoing edge of `tid`.
    pub fn remove(&mut self, tid: TransactionId) {
        self.edges.remove(&tid);
    }

    /// Breadth-first search from `start`; true if some path leads back to it.
    pub fn has_cycle_from(&self, start: TransactionId) -> bool {
        let mut visited = HashSet::new();
        let mut queue: VecDeque<TransactionId> = self
            .edges
            .get(&start)
            .map(|b| b.iter().copied().collect())
            .unwrap_or_default();

        while let Some(tid) = queue.pop_front() {
            if tid == start {
                return true;
            }
            if !visited.insert(tid) {
                continue;
            }
            if let Some(next) = self.edges.get(&tid) {
                queue.extend(next.iter().copied());
            }
        }
        false
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}
