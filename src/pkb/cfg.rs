//! Control-flow graph data and the CFG-derived relations.
//!
//! The graph has two edge sets over statement numbers: the
//! intra-procedural `Next` edges, closed into an N×N shortest-path
//! matrix for `Next*`, and the inter-procedural "bip" edges, whose
//! weights carry return labels (`1` = plain step; `k > 1` = a step
//! that returns from the call at statement `k - 1` and is only
//! followable when that call is on the traversal's stack).
//!
//! `Affects` is not stored: it is computed on demand by a worklist
//! search over the `Next` edges and memoised on the statement records.

use super::{Pkb, PkbError, StatementSet};
use crate::ast::StmtId;
use smol_str::SmolStr;
use std::collections::{HashMap, VecDeque};

const INF: usize = usize::MAX;

/// The control-flow graph proper: adjacency and kind indexes.
#[derive(Debug)]
pub struct Cfg {
    node_count: usize,
    /// Row-major N×N distance matrix; `INF` = unreachable.
    dist: Vec<usize>,
    /// Intra-procedural successor lists.
    adj: HashMap<StmtId, StatementSet>,
    /// Weighted inter-procedural successor lists.
    bip_adj: HashMap<StmtId, Vec<(StmtId, usize)>>,
    /// Per procedure: entry statement and the set of exit leaves.
    gates: HashMap<SmolStr, (StmtId, Vec<StmtId>)>,
    pub(crate) assign_ids: StatementSet,
    /// Call statement id → callee name.
    pub(crate) call_ids: HashMap<StmtId, SmolStr>,
    /// Statements that modify anything: assigns, reads, calls.
    pub(crate) mod_ids: StatementSet,
    next_exists: bool,
}

impl Cfg {
    pub(crate) fn new(node_count: usize) -> Self {
        Self {
            node_count,
            dist: vec![INF; node_count * node_count],
            adj: HashMap::new(),
            bip_adj: HashMap::new(),
            gates: HashMap::new(),
            assign_ids: StatementSet::new(),
            call_ids: HashMap::new(),
            mod_ids: StatementSet::new(),
            next_exists: false,
        }
    }

    fn index(&self, from: StmtId, to: StmtId) -> usize {
        debug_assert!(from >= 1 && from <= self.node_count);
        debug_assert!(to >= 1 && to <= self.node_count);
        (from - 1) * self.node_count + (to - 1)
    }

    pub(crate) fn add_edge(&mut self, from: StmtId, to: StmtId) {
        let index = self.index(from, to);
        self.dist[index] = 1;
        self.adj.entry(from).or_default().insert(to);
        self.next_exists = true;
    }

    pub(crate) fn add_bip_edge(&mut self, from: StmtId, to: StmtId, weight: usize) {
        debug_assert!(weight >= 1);
        let edges = self.bip_adj.entry(from).or_default();
        if !edges.contains(&(to, weight)) {
            edges.push((to, weight));
        }
    }

    /// Seeds the bip edge set with every intra-procedural edge at
    /// weight 1.
    pub(crate) fn copy_edges_to_bip(&mut self) {
        let edges: Vec<(StmtId, StmtId)> = self
            .adj
            .iter()
            .flat_map(|(&from, tos)| tos.iter().map(move |&to| (from, to)))
            .collect();
        for (from, to) in edges {
            self.add_bip_edge(from, to, 1);
        }
    }

    /// Removes the plain fall-through edge `from -> to`, used when a
    /// call statement's successor becomes reachable only via return
    /// edges.
    pub(crate) fn remove_bip_fallthrough(&mut self, from: StmtId, to: StmtId) {
        if let Some(edges) = self.bip_adj.get_mut(&from) {
            edges.retain(|&(target, weight)| !(target == to && weight == 1));
            if edges.is_empty() {
                self.bip_adj.remove(&from);
            }
        }
    }

    pub(crate) fn set_gates(&mut self, proc: SmolStr, entry: StmtId, exits: Vec<StmtId>) {
        self.gates.insert(proc, (entry, exits));
    }

    pub(crate) fn gates(&self, proc: &str) -> Option<&(StmtId, Vec<StmtId>)> {
        self.gates.get(proc)
    }

    /// Floyd–Warshall closure of the distance matrix.
    pub(crate) fn compute_dist_matrix(&mut self) {
        let n = self.node_count;
        for k in 0..n {
            for i in 0..n {
                let ik = self.dist[i * n + k];
                if ik == INF {
                    continue;
                }
                for j in 0..n {
                    let kj = self.dist[k * n + j];
                    if kj == INF {
                        continue;
                    }
                    let through = ik + kj;
                    if through < self.dist[i * n + j] {
                        self.dist[i * n + j] = through;
                    }
                }
            }
        }
    }

    pub(crate) fn is_next(&self, from: StmtId, to: StmtId) -> bool {
        self.dist[self.index(from, to)] == 1
    }

    pub(crate) fn is_next_transitive(&self, from: StmtId, to: StmtId) -> bool {
        self.dist[self.index(from, to)] < INF
    }

    pub(crate) fn successors(&self, from: StmtId) -> Option<&StatementSet> {
        self.adj.get(&from)
    }

    pub(crate) fn bip_successors(&self, from: StmtId) -> Option<&Vec<(StmtId, usize)>> {
        self.bip_adj.get(&from)
    }

    pub(crate) fn next_relation_exists(&self) -> bool {
        self.next_exists
    }

    pub(crate) fn bip_relation_exists(&self) -> bool {
        !self.bip_adj.is_empty()
    }

    pub(crate) fn node_count(&self) -> usize {
        self.node_count
    }
}

impl Pkb {
    /// A procedure's entry statement and its exit leaves (the terminal
    /// statement of the body, recursed through a trailing if's
    /// branches).
    pub fn proc_entry_exits(&self, name: &str) -> Option<(StmtId, &[StmtId])> {
        self.cfg
            .gates(name)
            .map(|(entry, exits)| (*entry, exits.as_slice()))
    }

    // --- Next / Next* ---

    pub fn next_relation_exists(&self) -> bool {
        self.cfg.next_relation_exists()
    }

    pub fn is_next(&self, from: StmtId, to: StmtId) -> bool {
        self.has_statement(from) && self.has_statement(to) && self.cfg.is_next(from, to)
    }

    pub fn is_next_transitive(&self, from: StmtId, to: StmtId) -> bool {
        self.has_statement(from) && self.has_statement(to) && self.cfg.is_next_transitive(from, to)
    }

    /// Direct successors of `id` in the control flow.
    pub fn next_stmts(&self, id: StmtId) -> Result<&StatementSet, PkbError> {
        let stmt = self.get_statement(id)?;
        Ok(stmt
            .caches
            .next
            .get_or_init(|| self.cfg.successors(id).cloned().unwrap_or_default()))
    }

    /// Direct predecessors of `id` in the control flow.
    pub fn prev_stmts(&self, id: StmtId) -> Result<&StatementSet, PkbError> {
        let stmt = self.get_statement(id)?;
        Ok(stmt.caches.prev.get_or_init(|| {
            (1..=self.cfg.node_count())
                .filter(|&from| self.cfg.is_next(from, id))
                .collect()
        }))
    }

    /// All statements reachable from `id` (strictly, via at least one step).
    pub fn next_stmts_transitive(&self, id: StmtId) -> Result<&StatementSet, PkbError> {
        let stmt = self.get_statement(id)?;
        Ok(stmt.caches.next_t.get_or_init(|| {
            (1..=self.cfg.node_count())
                .filter(|&to| self.cfg.is_next_transitive(id, to))
                .collect()
        }))
    }

    /// All statements that reach `id`.
    pub fn prev_stmts_transitive(&self, id: StmtId) -> Result<&StatementSet, PkbError> {
        let stmt = self.get_statement(id)?;
        Ok(stmt.caches.prev_t.get_or_init(|| {
            (1..=self.cfg.node_count())
                .filter(|&from| self.cfg.is_next_transitive(from, id))
                .collect()
        }))
    }

    // --- Affects / Affects* ---

    /// Affects(a, b): `a` and `b` are assignments, `b` is reachable from
    /// `a`, and the variable assigned by `a` reaches a use in `b` along
    /// some path free of intervening modification.
    pub fn does_affect(&self, a: StmtId, b: StmtId) -> bool {
        if !self.has_statement(a) || !self.has_statement(b) {
            return false;
        }
        if !self.cfg.is_next_transitive(a, b) {
            return false;
        }
        if !self.cfg.assign_ids.contains(&a) || !self.cfg.assign_ids.contains(&b) {
            return false;
        }

        let (lhs, _) = self.statements[a - 1]
            .assign_parts()
            .expect("assign_ids only holds assignments");
        if !self.statements[b - 1].uses_variable(lhs) {
            return false;
        }

        // Worklist search from a's successors; a path dies where the
        // variable is modified again. Visited is keyed on statement id
        // alone, which suffices for an existence query.
        let mut visited = StatementSet::new();
        let mut queue = VecDeque::new();
        if let Some(successors) = self.cfg.successors(a) {
            for &s in successors {
                visited.insert(s);
                queue.push_back(s);
            }
        }

        while let Some(n) = queue.pop_front() {
            if n == b {
                return true;
            }
            if self.cfg.mod_ids.contains(&n) && self.statements[n - 1].modifies_variable(lhs) {
                continue;
            }
            if let Some(successors) = self.cfg.successors(n) {
                for &s in successors {
                    if visited.insert(s) {
                        queue.push_back(s);
                    }
                }
            }
        }
        false
    }

    /// All assignments affected by `id`.
    pub fn affected_stmts(&self, id: StmtId) -> Result<&StatementSet, PkbError> {
        let stmt = self.get_statement(id)?;
        Ok(stmt.caches.affected.get_or_init(|| {
            let reachable = self
                .next_stmts_transitive(id)
                .map(|set| set.clone())
                .unwrap_or_default();
            reachable
                .into_iter()
                .filter(|&b| self.does_affect(id, b))
                .collect()
        }))
    }

    /// All assignments that affect `id`.
    pub fn affecting_stmts(&self, id: StmtId) -> Result<&StatementSet, PkbError> {
        let stmt = self.get_statement(id)?;
        Ok(stmt.caches.affecting.get_or_init(|| {
            let reaching = self
                .prev_stmts_transitive(id)
                .map(|set| set.clone())
                .unwrap_or_default();
            reaching
                .into_iter()
                .filter(|&a| self.does_affect(a, id))
                .collect()
        }))
    }

    pub fn does_affect_transitive(&self, a: StmtId, b: StmtId) -> bool {
        self.affected_stmts_transitive(a)
            .is_ok_and(|set| set.contains(&b))
    }

    /// Reachability closure over the affects relation.
    pub fn affected_stmts_transitive(&self, id: StmtId) -> Result<&StatementSet, PkbError> {
        let stmt = self.get_statement(id)?;
        Ok(stmt
            .caches
            .affected_t
            .get_or_init(|| self.relation_closure(id, |n| self.affected_stmts(n))))
    }

    pub fn affecting_stmts_transitive(&self, id: StmtId) -> Result<&StatementSet, PkbError> {
        let stmt = self.get_statement(id)?;
        Ok(stmt
            .caches
            .affecting_t
            .get_or_init(|| self.relation_closure(id, |n| self.affecting_stmts(n))))
    }

    pub fn affects_relation_exists(&self) -> bool {
        self.cfg
            .assign_ids
            .iter()
            .any(|&a| self.affected_stmts(a).is_ok_and(|set| !set.is_empty()))
    }

    /// BFS closure of a memoised successor function, excluding the seed
    /// unless it lies on a cycle.
    fn relation_closure<'a, F>(&'a self, seed: StmtId, successors: F) -> StatementSet
    where
        F: Fn(StmtId) -> Result<&'a StatementSet, PkbError>,
    {
        let mut visited = StatementSet::new();
        let mut queue = VecDeque::new();
        if let Ok(direct) = successors(seed) {
            for &s in direct {
                if visited.insert(s) {
                    queue.push_back(s);
                }
            }
        }
        while let Some(n) = queue.pop_front() {
            if let Ok(direct) = successors(n) {
                for &s in direct {
                    if visited.insert(s) {
                        queue.push_back(s);
                    }
                }
            }
        }
        visited
    }

    // --- NextBip / NextBip* ---

    pub fn next_bip_relation_exists(&self) -> bool {
        self.cfg.bip_relation_exists()
    }

    pub fn is_next_bip(&self, from: StmtId, to: StmtId) -> bool {
        self.has_statement(from)
            && self.has_statement(to)
            && self
                .cfg
                .bip_successors(from)
                .is_some_and(|edges| edges.iter().any(|&(target, _)| target == to))
    }

    pub fn next_stmts_bip(&self, id: StmtId) -> Result<&StatementSet, PkbError> {
        let stmt = self.get_statement(id)?;
        Ok(stmt.caches.next_bip.get_or_init(|| {
            self.cfg
                .bip_successors(id)
                .map(|edges| edges.iter().map(|&(target, _)| target).collect())
                .unwrap_or_default()
        }))
    }

    pub fn prev_stmts_bip(&self, id: StmtId) -> Result<&StatementSet, PkbError> {
        let stmt = self.get_statement(id)?;
        Ok(stmt.caches.prev_bip.get_or_init(|| {
            (1..=self.cfg.node_count())
                .filter(|&from| {
                    self.cfg
                        .bip_successors(from)
                        .is_some_and(|edges| edges.iter().any(|&(target, _)| target == id))
                })
                .collect()
        }))
    }

    /// The call statements that may be on the stack while control is in
    /// `id`'s procedure: calls targeting the procedure itself or any of
    /// its transitive callers. A conservative over-approximation that
    /// preserves existence.
    fn bip_call_stack_seed(&self, id: StmtId) -> StatementSet {
        let proc_name = &self.statements[id - 1].proc;
        let mut seed = StatementSet::new();
        if let Some(proc) = self.procedures.get(proc_name) {
            for caller in &proc.called_by_transitive {
                if let Some(caller_proc) = self.procedures.get(caller) {
                    seed.extend(caller_proc.call_stmts.iter().copied());
                }
            }
            seed.extend(proc.call_stmts.iter().copied());
        }
        seed
    }

    /// All statements reachable from `id` across procedure boundaries,
    /// following return edges only when their call is active.
    pub fn next_stmts_bip_transitive(&self, id: StmtId) -> Result<&StatementSet, PkbError> {
        let stmt = self.get_statement(id)?;
        Ok(stmt.caches.next_bip_t.get_or_init(|| {
            let mut stack = self.bip_call_stack_seed(id);
            let mut visited = StatementSet::new();
            let mut queue = VecDeque::from([id]);
            let mut initial = true;

            while let Some(n) = queue.pop_front() {
                if self.cfg.call_ids.contains_key(&n) {
                    stack.insert(n);
                }
                if let Some(edges) = self.cfg.bip_successors(n) {
                    for &(target, weight) in edges {
                        if (weight == 1 || stack.contains(&(weight - 1)))
                            && !visited.contains(&target)
                        {
                            queue.push_back(target);
                        }
                    }
                }
                if !initial {
                    visited.insert(n);
                }
                initial = false;
            }
            visited
        }))
    }

    pub fn is_next_bip_transitive(&self, from: StmtId, to: StmtId) -> bool {
        self.has_statement(to)
            && self
                .next_stmts_bip_transitive(from)
                .is_ok_and(|set| set.contains(&to))
    }

    pub fn prev_stmts_bip_transitive(&self, id: StmtId) -> Result<&StatementSet, PkbError> {
        let stmt = self.get_statement(id)?;
        Ok(stmt.caches.prev_bip_t.get_or_init(|| {
            (1..=self.cfg.node_count())
                .filter(|&from| self.is_next_bip_transitive(from, id))
                .collect()
        }))
    }

    // --- AffectsBip / AffectsBip* ---

    /// Like [`Pkb::does_affect`], but over the bip edges: the search
    /// follows calls into their callees, so call statements never kill
    /// the variable themselves; the assignments and reads inside the
    /// callee do.
    pub fn does_affect_bip(&self, a: StmtId, b: StmtId) -> bool {
        if !self.has_statement(a) || !self.has_statement(b) {
            return false;
        }
        if !self.cfg.assign_ids.contains(&a) || !self.cfg.assign_ids.contains(&b) {
            return false;
        }

        let (lhs, _) = self.statements[a - 1]
            .assign_parts()
            .expect("assign_ids only holds assignments");
        if !self.statements[b - 1].uses_variable(lhs) {
            return false;
        }

        let mut stack = self.bip_call_stack_seed(a);
        let mut visited = StatementSet::new();
        let mut queue = VecDeque::new();
        if let Some(edges) = self.cfg.bip_successors(a) {
            for &(target, weight) in edges {
                if (weight == 1 || stack.contains(&(weight - 1))) && visited.insert(target) {
                    queue.push_back(target);
                }
            }
        }

        while let Some(n) = queue.pop_front() {
            if n == b {
                return true;
            }
            let kills = self.cfg.mod_ids.contains(&n)
                && !self.cfg.call_ids.contains_key(&n)
                && self.statements[n - 1].modifies_variable(lhs);
            if kills {
                continue;
            }
            if self.cfg.call_ids.contains_key(&n) {
                stack.insert(n);
            }
            if let Some(edges) = self.cfg.bip_successors(n) {
                for &(target, weight) in edges {
                    if (weight == 1 || stack.contains(&(weight - 1))) && visited.insert(target) {
                        queue.push_back(target);
                    }
                }
            }
        }
        false
    }

    pub fn affected_stmts_bip(&self, id: StmtId) -> Result<&StatementSet, PkbError> {
        let stmt = self.get_statement(id)?;
        Ok(stmt.caches.affected_bip.get_or_init(|| {
            let reachable = self
                .next_stmts_bip_transitive(id)
                .map(|set| set.clone())
                .unwrap_or_default();
            reachable
                .into_iter()
                .filter(|&b| self.cfg.assign_ids.contains(&b) && self.does_affect_bip(id, b))
                .collect()
        }))
    }

    pub fn affecting_stmts_bip(&self, id: StmtId) -> Result<&StatementSet, PkbError> {
        let stmt = self.get_statement(id)?;
        Ok(stmt.caches.affecting_bip.get_or_init(|| {
            self.cfg
                .assign_ids
                .iter()
                .copied()
                .filter(|&a| self.does_affect_bip(a, id))
                .collect()
        }))
    }

    pub fn does_affect_bip_transitive(&self, a: StmtId, b: StmtId) -> bool {
        self.affected_stmts_bip_transitive(a)
            .is_ok_and(|set| set.contains(&b))
    }

    pub fn affected_stmts_bip_transitive(&self, id: StmtId) -> Result<&StatementSet, PkbError> {
        let stmt = self.get_statement(id)?;
        Ok(stmt
            .caches
            .affected_bip_t
            .get_or_init(|| self.relation_closure(id, |n| self.affected_stmts_bip(n))))
    }

    pub fn affecting_stmts_bip_transitive(&self, id: StmtId) -> Result<&StatementSet, PkbError> {
        let stmt = self.get_statement(id)?;
        Ok(stmt
            .caches
            .affecting_bip_t
            .get_or_init(|| self.relation_closure(id, |n| self.affecting_stmts_bip(n))))
    }

    pub fn affects_bip_relation_exists(&self) -> bool {
        self.cfg
            .assign_ids
            .iter()
            .any(|&a| self.affected_stmts_bip(a).is_ok_and(|set| !set.is_empty()))
    }
}
