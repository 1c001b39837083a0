//! The join solver: turns domains and joins into result rows.
//!
//! Declarations are grouped into connected components of the join
//! dependency graph; each component is solved independently by
//! successive cross-product-and-filter into an intermediate table,
//! smallest table first so intermediate products stay small. A
//! component with no selected columns acts as a pure witness: its rows
//! prove satisfiability and are then discarded.

use super::table::{Domain, Entry, Join};
use crate::pql::ast::DeclRef;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;
use tracing::{debug, trace};

/// One row of an intermediate table. Every entry carries its
/// declaration, so a row is a partial assignment of synonyms.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub(crate) struct IntRow {
    columns: Vec<Entry>,
}

impl IntRow {
    pub(crate) fn contains(&self, decl: &DeclRef) -> bool {
        self.columns.iter().any(|entry| entry.decl() == decl)
    }

    /// The entry bound to `decl`; the caller guarantees presence.
    pub(crate) fn value(&self, decl: &DeclRef) -> &Entry {
        self.columns
            .iter()
            .find(|entry| entry.decl() == decl)
            .expect("row is missing a declaration the solver promised")
    }

    fn add_column(&mut self, entry: Entry) {
        debug_assert!(!self.contains(entry.decl()));
        self.columns.push(entry);
    }

    /// Two rows merge iff they agree on every shared declaration.
    fn can_merge(&self, other: &IntRow) -> bool {
        other.columns.iter().all(|entry| {
            !self.contains(entry.decl()) || self.value(entry.decl()) == entry
        })
    }

    fn merge_row(&mut self, other: &IntRow) {
        debug_assert!(self.can_merge(other));
        for entry in &other.columns {
            if !self.contains(entry.decl()) {
                self.columns.push(entry.clone());
            }
        }
    }

    fn filter_columns(&mut self, allowed: &HashSet<DeclRef>) {
        self.columns.retain(|entry| allowed.contains(entry.decl()));
    }

    /// Does this row satisfy the join's allowed pairs? Both of the
    /// join's declarations must be bound in the row.
    fn satisfies(&self, join: &Join) -> bool {
        join.is_allowed(self.value(join.decl_a()), self.value(join.decl_b()))
    }

    fn is_trivial(&self) -> bool {
        self.columns.is_empty()
    }
}

/// An intermediate table: a header set plus rows.
///
/// A fresh table holds one row with no columns ("trivially true"); a
/// table with no rows at all is unsatisfiable. The distinction drives
/// the solver's validity check.
#[derive(Debug, Clone)]
pub(crate) struct IntTable {
    rows: Vec<IntRow>,
    headers: HashSet<DeclRef>,
}

impl IntTable {
    pub(crate) fn new() -> Self {
        Self {
            rows: vec![IntRow::default()],
            headers: HashSet::new(),
        }
    }

    pub(crate) fn contains_decl(&self, decl: &DeclRef) -> bool {
        self.headers.contains(decl)
    }

    pub(crate) fn rows(&self) -> &[IntRow] {
        &self.rows
    }

    pub(crate) fn len(&self) -> usize {
        self.rows.len()
    }

    pub(crate) fn num_columns(&self) -> usize {
        self.headers.len()
    }

    /// Unsatisfiable: no rows, or only a single all-filtered row.
    pub(crate) fn is_empty(&self) -> bool {
        self.rows.is_empty() || (self.rows.len() == 1 && self.rows[0].is_trivial())
    }

    /// Cross product with another table, keeping compatible rows.
    pub(crate) fn merge(&mut self, other: &IntTable) {
        trace!(left = self.rows.len(), right = other.rows.len(), "merging tables");
        let mut new_rows = Vec::with_capacity(self.rows.len() * other.rows.len().max(1));
        for row in &self.rows {
            for other_row in &other.rows {
                if row.can_merge(other_row) {
                    let mut merged = row.clone();
                    merged.merge_row(other_row);
                    new_rows.push(merged);
                }
            }
        }
        self.rows = new_rows;
        self.headers.extend(other.headers.iter().cloned());
    }

    /// Cross product with a single-synonym domain.
    pub(crate) fn merge_column(&mut self, decl: &DeclRef, domain: &Domain) {
        debug_assert!(!self.headers.contains(decl));
        let mut new_rows = Vec::with_capacity(self.rows.len() * domain.len());
        for row in &self.rows {
            for entry in domain {
                debug_assert_eq!(entry.decl(), decl);
                let mut new_row = row.clone();
                new_row.add_column(entry.clone());
                new_rows.push(new_row);
            }
        }
        self.headers.insert(Rc::clone(decl));
        self.rows = new_rows;
    }

    /// Cross product filtered by a join in one pass.
    pub(crate) fn merge_and_filter(&mut self, other: &IntTable, join: &Join) {
        trace!(
            left = self.rows.len(),
            right = other.rows.len(),
            join = join.id(),
            "merge and filter"
        );
        let mut new_rows = Vec::new();
        for row in &self.rows {
            for other_row in &other.rows {
                if row.can_merge(other_row) {
                    let mut merged = row.clone();
                    merged.merge_row(other_row);
                    if merged.satisfies(join) {
                        new_rows.push(merged);
                    }
                }
            }
        }
        self.rows = new_rows;
        self.headers.extend(other.headers.iter().cloned());
    }

    /// Drops rows violating a join whose declarations are both present;
    /// a join touching absent columns is skipped.
    pub(crate) fn filter_rows(&mut self, join: &Join) {
        if !self.headers.contains(join.decl_a()) || !self.headers.contains(join.decl_b()) {
            trace!(join = join.id(), "skipping filter, columns absent");
            return;
        }
        let before = self.rows.len();
        self.rows.retain(|row| row.satisfies(join));
        trace!(join = join.id(), before, after = self.rows.len(), "filtered rows");
    }

    pub(crate) fn filter_columns(&mut self, allowed: &HashSet<DeclRef>) {
        for row in &mut self.rows {
            row.filter_columns(allowed);
        }
        self.headers.retain(|decl| allowed.contains(decl));
    }

    pub(crate) fn dedup_rows(&mut self) {
        let mut seen = HashSet::new();
        self.rows.retain(|row| seen.insert(row.clone()));
    }
}

/// Connected components of the "co-occur in a join" graph.
struct DepGraph {
    colouring: HashMap<DeclRef, usize>,
    colour_count: usize,
}

impl DepGraph {
    fn new(decls: &HashSet<DeclRef>, joins: &[Join]) -> Self {
        let mut edges: HashMap<DeclRef, HashSet<DeclRef>> = HashMap::new();
        for join in joins {
            edges
                .entry(Rc::clone(join.decl_a()))
                .or_default()
                .insert(Rc::clone(join.decl_b()));
            edges
                .entry(Rc::clone(join.decl_b()))
                .or_default()
                .insert(Rc::clone(join.decl_a()));
        }

        // colour in name order so component numbering is deterministic
        let mut ordered: Vec<&DeclRef> = decls.iter().collect();
        ordered.sort_by(|a, b| a.name.cmp(&b.name));

        let mut colouring: HashMap<DeclRef, usize> = HashMap::new();
        let mut colour_count = 0;
        for decl in ordered {
            if colouring.contains_key(decl) {
                continue;
            }
            let mut queue = VecDeque::from([Rc::clone(decl)]);
            while let Some(node) = queue.pop_front() {
                if colouring.contains_key(&node) {
                    continue;
                }
                colouring.insert(Rc::clone(&node), colour_count);
                if let Some(neighbours) = edges.get(&node) {
                    for neighbour in neighbours {
                        if !colouring.contains_key(neighbour) {
                            queue.push_back(Rc::clone(neighbour));
                        }
                    }
                }
            }
            colour_count += 1;
        }

        Self {
            colouring,
            colour_count,
        }
    }

    fn components(&self) -> Vec<Vec<DeclRef>> {
        let mut components = vec![Vec::new(); self.colour_count];
        for (decl, &colour) in &self.colouring {
            components[colour].push(Rc::clone(decl));
        }
        components
    }
}

/// The solver itself. Construction does all the work; afterwards the
/// caller asks for validity and, if needed, the return table.
pub(crate) struct Solver {
    domains: HashMap<DeclRef, Domain>,
    joins: Vec<Join>,
    return_decls: HashSet<DeclRef>,
    int_tables: Vec<IntTable>,
    decl_components: Vec<Vec<DeclRef>>,
}

impl Solver {
    pub(crate) fn new(
        joins: Vec<Join>,
        domains: HashMap<DeclRef, Domain>,
        return_decls: HashSet<DeclRef>,
        select_decls: HashSet<DeclRef>,
    ) -> Self {
        let mut solver = Self {
            domains,
            joins,
            return_decls,
            int_tables: Vec::new(),
            decl_components: Vec::new(),
        };

        let return_decls = solver.return_decls.clone();
        solver.trim(&return_decls);
        solver.trim(&select_decls);

        // one seed table per participating declaration, name order for
        // deterministic processing
        let mut all_decls: Vec<DeclRef> = return_decls
            .iter()
            .chain(select_decls.iter())
            .cloned()
            .collect();
        all_decls.sort_by(|a, b| a.name.cmp(&b.name));
        all_decls.dedup();

        for decl in &all_decls {
            if solver.has_table(decl) {
                continue;
            }
            let domain = solver.domains.get(decl).cloned().unwrap_or_default();
            let mut table = IntTable::new();
            table.merge_column(decl, &domain);
            solver.int_tables.push(table);
        }

        let node_set: HashSet<DeclRef> = all_decls.iter().cloned().collect();
        let dep_graph = DepGraph::new(&node_set, &solver.joins);
        solver.decl_components = solver.sort_components(dep_graph.components());
        solver.preprocess();
        solver
    }

    /// Intersects each trimmed declaration's domain with the entries its
    /// joins allow, and drops join pairs outside the new domain.
    fn trim(&mut self, decls: &HashSet<DeclRef>) {
        for join_index in 0..self.joins.len() {
            let decl_a = Rc::clone(self.joins[join_index].decl_a());
            let decl_b = Rc::clone(self.joins[join_index].decl_b());
            if decls.contains(&decl_a) {
                self.trim_helper(&decl_a, join_index);
            }
            if decls.contains(&decl_b) {
                self.trim_helper(&decl_b, join_index);
            }
        }
    }

    fn trim_helper(&mut self, decl: &DeclRef, join_index: usize) {
        let join = &self.joins[join_index];
        let side_entries: HashSet<Entry> = join
            .allowed()
            .iter()
            .map(|(first, second)| {
                if first.decl() == decl {
                    first.clone()
                } else {
                    second.clone()
                }
            })
            .collect();

        let domain = self.domains.get(decl).cloned().unwrap_or_default();
        let trimmed: Domain = domain
            .into_iter()
            .filter(|entry| side_entries.contains(entry))
            .collect();

        self.joins[join_index].allowed_mut().retain(|(first, second)| {
            let entry = if first.decl() == decl { first } else { second };
            trimmed.contains(entry)
        });
        self.domains.insert(Rc::clone(decl), trimmed);
    }

    fn has_table(&self, decl: &DeclRef) -> bool {
        self.int_tables.iter().any(|table| table.contains_decl(decl))
    }

    fn table_index(&self, decl: &DeclRef) -> usize {
        self.int_tables
            .iter()
            .position(|table| table.contains_decl(decl))
            .expect("every solver declaration has a table")
    }

    fn join_indices(&self, decl: &DeclRef) -> Vec<usize> {
        self.joins
            .iter()
            .enumerate()
            .filter(|(_, join)| join.decl_a() == decl || join.decl_b() == decl)
            .map(|(index, _)| index)
            .collect()
    }

    /// Orders each component smallest seed table first, names breaking
    /// ties, so the merge order is deterministic.
    fn sort_components(&self, components: Vec<Vec<DeclRef>>) -> Vec<Vec<DeclRef>> {
        components
            .into_iter()
            .map(|mut component| {
                component.sort_by(|a, b| {
                    let size_a = self.int_tables[self.table_index(a)].len();
                    let size_b = self.int_tables[self.table_index(b)].len();
                    size_a.cmp(&size_b).then_with(|| a.name.cmp(&b.name))
                });
                component
            })
            .collect()
    }

    /// Merges each component into one table, applying joins as soon as
    /// both sides are available.
    fn preprocess(&mut self) {
        let mut new_tables: Vec<IntTable> = Vec::new();
        let mut processed_joins: HashSet<usize> = HashSet::new();

        let components = self.decl_components.clone();
        for component in &components {
            debug_assert!(!component.is_empty());
            let mut table = IntTable::new();

            for decl in component {
                if !table.contains_decl(decl) {
                    table.merge(&self.int_tables[self.table_index(decl)]);
                }

                for join_index in self.join_indices(decl) {
                    if !processed_joins.insert(self.joins[join_index].id()) {
                        continue;
                    }
                    let join = &self.joins[join_index];
                    let other = if join.decl_a() == decl {
                        join.decl_b()
                    } else {
                        join.decl_a()
                    };

                    if table.contains_decl(other) {
                        table.filter_rows(join);
                    } else {
                        let other_table = self.int_tables[self.table_index(other)].clone();
                        table.merge_and_filter(&other_table, join);
                    }

                    // an empty table can never become satisfiable again
                    if table.len() == 0 {
                        break;
                    }
                }
                if table.len() == 0 {
                    break;
                }
            }

            /*
               two subtleties:
               1. a table with no rows must be kept: "has no rows" is how
                  the validity check learns the query failed;
               2. a table that had rows but keeps no *columns* after
                  projection was a pure witness. It must be dropped
                  without failing the query, because projecting it would
                  leave zero rows and look like failure.
            */
            if table.len() > 0 {
                table.filter_columns(&self.return_decls);
                if table.num_columns() == 0 {
                    debug!("dropping fully-consumed witness component");
                    continue;
                }
            }

            table.dedup_rows();
            let failed = table.len() == 0;
            new_tables.push(table);
            if failed {
                break;
            }
        }

        self.int_tables = new_tables;
    }

    /// True iff every retained component table is satisfiable.
    pub(crate) fn is_valid(&self) -> bool {
        self.int_tables.iter().all(|table| !table.is_empty())
    }

    /// Cross product of the component tables holding the return
    /// declarations, smallest first.
    pub(crate) fn return_table(&self) -> IntTable {
        debug_assert!(!self.return_decls.is_empty());

        let mut ordered: Vec<&DeclRef> = self.return_decls.iter().collect();
        ordered.sort_by(|a, b| {
            let size_a = self.int_tables[self.table_index(a)].len();
            let size_b = self.int_tables[self.table_index(b)].len();
            size_a.cmp(&size_b).then_with(|| a.name.cmp(&b.name))
        });

        let mut result = IntTable::new();
        for decl in ordered {
            if result.contains_decl(decl) {
                continue;
            }
            result.merge(&self.int_tables[self.table_index(decl)]);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pql::ast::{Declaration, DesignEnt};

    fn decl(name: &str) -> DeclRef {
        Rc::new(Declaration {
            name: name.into(),
            ent: DesignEnt::Stmt,
        })
    }

    fn stmt_domain(decl: &DeclRef, ids: &[usize]) -> Domain {
        ids.iter().map(|&id| Entry::stmt(decl, id)).collect()
    }

    #[test]
    fn fresh_table_is_trivially_true() {
        let table = IntTable::new();
        assert!(table.is_empty());
        assert_eq!(table.len(), 1);
        assert_eq!(table.num_columns(), 0);
    }

    #[test]
    fn merge_column_expands_rows() {
        let s = decl("s");
        let mut table = IntTable::new();
        table.merge_column(&s, &stmt_domain(&s, &[1, 2, 3]));
        assert_eq!(table.len(), 3);
        assert!(!table.is_empty());
    }

    #[test]
    fn merge_is_a_cross_product_on_disjoint_headers() {
        let s1 = decl("s1");
        let s2 = decl("s2");
        let mut left = IntTable::new();
        left.merge_column(&s1, &stmt_domain(&s1, &[1, 2]));
        let mut right = IntTable::new();
        right.merge_column(&s2, &stmt_domain(&s2, &[3, 4, 5]));

        left.merge(&right);
        assert_eq!(left.len(), 6);
        assert_eq!(left.num_columns(), 2);
    }

    #[test]
    fn merge_respects_shared_columns() {
        let s = decl("s");
        let mut left = IntTable::new();
        left.merge_column(&s, &stmt_domain(&s, &[1, 2]));
        let mut right = IntTable::new();
        right.merge_column(&s, &stmt_domain(&s, &[2, 3]));

        left.merge(&right);
        assert_eq!(left.len(), 1);
        assert_eq!(left.rows()[0].value(&s).stmt_id().unwrap(), 2);
    }

    #[test]
    fn solver_simple_join() {
        let s1 = decl("s1");
        let s2 = decl("s2");

        let mut domains = HashMap::new();
        domains.insert(Rc::clone(&s1), stmt_domain(&s1, &[1, 2, 3]));
        domains.insert(Rc::clone(&s2), stmt_domain(&s2, &[2, 3, 4]));

        // s2 = s1 + 1
        let pairs: HashSet<(Entry, Entry)> = [(1, 2), (2, 3), (3, 4)]
            .into_iter()
            .map(|(a, b)| (Entry::stmt(&s1, a), Entry::stmt(&s2, b)))
            .collect();
        let mut table = crate::eval::table::Table::new();
        table.add_join(&s1, &s2, pairs);

        let return_decls: HashSet<DeclRef> = [Rc::clone(&s1), Rc::clone(&s2)].into();
        let select_decls: HashSet<DeclRef> = return_decls.clone();
        let solver = Solver::new(
            table_joins_for_test(&table),
            domains,
            return_decls,
            select_decls,
        );
        assert!(solver.is_valid());

        let result = solver.return_table();
        assert_eq!(result.len(), 3);
        assert_eq!(result.num_columns(), 2);
    }

    #[test]
    fn solver_fails_on_empty_domain() {
        let s1 = decl("s1");
        let mut domains = HashMap::new();
        domains.insert(Rc::clone(&s1), Domain::new());

        let return_decls: HashSet<DeclRef> = [Rc::clone(&s1)].into();
        let solver = Solver::new(Vec::new(), domains, return_decls.clone(), return_decls);
        assert!(!solver.is_valid());
    }

    #[test]
    fn witness_component_is_discarded_without_failing() {
        // s2 is constrained (select decl) but not returned; its
        // component must prove satisfiability and then disappear.
        let s1 = decl("s1");
        let s2 = decl("s2");

        let mut domains = HashMap::new();
        domains.insert(Rc::clone(&s1), stmt_domain(&s1, &[1, 2]));
        domains.insert(Rc::clone(&s2), stmt_domain(&s2, &[7]));

        let return_decls: HashSet<DeclRef> = [Rc::clone(&s1)].into();
        let select_decls: HashSet<DeclRef> = [Rc::clone(&s2)].into();
        let solver = Solver::new(Vec::new(), domains, return_decls, select_decls);
        assert!(solver.is_valid());
        assert_eq!(solver.return_table().len(), 2);
    }

    #[test]
    fn empty_witness_component_fails_the_query() {
        let s1 = decl("s1");
        let s2 = decl("s2");

        let mut domains = HashMap::new();
        domains.insert(Rc::clone(&s1), stmt_domain(&s1, &[1, 2]));
        domains.insert(Rc::clone(&s2), Domain::new());

        let return_decls: HashSet<DeclRef> = [Rc::clone(&s1)].into();
        let select_decls: HashSet<DeclRef> = [Rc::clone(&s2)].into();
        let solver = Solver::new(Vec::new(), domains, return_decls, select_decls);
        assert!(!solver.is_valid());
    }

    // test helper: pull the joins back out of a Table
    fn table_joins_for_test(table: &crate::eval::table::Table) -> Vec<Join> {
        table.joins_for_test()
    }
}
