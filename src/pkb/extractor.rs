//! The design extractor: builds a [`Pkb`] from a program AST.
//!
//! Phases run in strict order, because each consumes the previous
//! phase's results:
//!
//! 1. statement numbering (program order, 1-based, dense);
//! 2. the call graph, with cycle and undefined-callee rejection and a
//!    reverse-topological order as a by-product;
//! 3. Follows/Parent closures and Uses/Modifies, visiting procedures
//!    in that order so call-site propagation sees finalised callees;
//! 4. control-flow edges;
//! 5. inter-procedural (bip) edge wiring through procedure gates;
//! 6. the Floyd–Warshall closure for `Next*`.

use super::cfg::Cfg;
use super::{Pkb, PkbError, Procedure, Statement, Variable};
use crate::ast::{self, Expr, Program, StmtId, StmtKind};
use crate::pql::ast::DesignEnt;
use smol_str::SmolStr;
use std::collections::HashMap;
use std::rc::Rc;
use tracing::debug;

/// Runs the extractor over a parsed program.
pub fn extract(program: Program) -> Result<Pkb, PkbError> {
    DesignExtractor::default().run(program)
}

#[derive(Default)]
struct DesignExtractor {
    statements: Vec<Statement>,
    procedures: HashMap<SmolStr, Procedure>,
    variables: HashMap<SmolStr, Variable>,
    constants: super::NameSet,
    stmt_kinds: HashMap<DesignEnt, super::StatementSet>,
    follows_exists: bool,
    parent_exists: bool,
    calls_exists: bool,
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    InProgress,
    Done,
}

impl DesignExtractor {
    fn run(mut self, program: Program) -> Result<Pkb, PkbError> {
        for ent in DesignEnt::STATEMENT_KINDS {
            self.stmt_kinds.insert(ent, super::StatementSet::new());
        }

        for proc in &program.procedures {
            if self
                .procedures
                .insert(proc.name.clone(), Procedure::default())
                .is_some()
            {
                return Err(PkbError::DuplicateProcedure(proc.name.clone()));
            }
            self.number_stmts(&proc.body, &proc.name);
        }
        debug!(statements = self.statements.len(), "numbering complete");

        let topo_order = self.process_call_graph(&program)?;
        debug!(procedures = topo_order.len(), "call graph complete");

        let proc_bodies: HashMap<&SmolStr, &ast::StmtList> = program
            .procedures
            .iter()
            .map(|proc| (&proc.name, &proc.body))
            .collect();
        for name in &topo_order {
            let body = proc_bodies[name];
            let mut container_stack = Vec::new();
            self.process_stmt_list(body, &mut container_stack, name);
        }
        debug!("follows/parent/uses/modifies complete");

        let cfg = self.build_cfg(&program);
        debug!("control-flow graph complete");

        Ok(Pkb {
            program,
            statements: self.statements,
            procedures: self.procedures,
            variables: self.variables,
            constants: self.constants,
            stmt_kinds: self.stmt_kinds,
            follows_exists: self.follows_exists,
            parent_exists: self.parent_exists,
            calls_exists: self.calls_exists,
            cfg,
        })
    }

    // --- phase 1: numbering ---

    fn number_stmts(&mut self, list: &ast::StmtList, proc: &SmolStr) {
        for stmt in &list.stmts {
            debug_assert_eq!(stmt.id.get(), 0, "statement numbered twice");
            let id = self.statements.len() + 1;
            stmt.id.set(id);
            self.statements
                .push(Statement::new(Rc::clone(stmt), proc.clone()));

            match &stmt.kind {
                StmtKind::If {
                    then_body,
                    else_body,
                    ..
                } => {
                    self.number_stmts(then_body, proc);
                    self.number_stmts(else_body, proc);
                }
                StmtKind::While { body, .. } => self.number_stmts(body, proc),
                _ => {}
            }
        }
    }

    // --- phase 2: call graph ---

    fn process_call_graph(&mut self, program: &Program) -> Result<Vec<SmolStr>, PkbError> {
        let proc_bodies: HashMap<&SmolStr, &ast::StmtList> = program
            .procedures
            .iter()
            .map(|proc| (&proc.name, &proc.body))
            .collect();

        let mut marks: HashMap<SmolStr, Mark> = HashMap::new();
        let mut topo_order = Vec::new();
        for proc in &program.procedures {
            self.visit_proc(&proc.name, &proc_bodies, &mut marks, &mut topo_order)?;
        }

        // with the topological order established, close called_by in
        // reverse: callers are finalised before their callees.
        for name in topo_order.iter().rev() {
            let callers: Vec<SmolStr> = self.procedures[name].called_by.iter().cloned().collect();
            let mut transitive = super::NameSet::new();
            for caller in callers {
                transitive.extend(
                    self.procedures[&caller]
                        .called_by_transitive
                        .iter()
                        .cloned(),
                );
                transitive.insert(caller);
            }
            self.procedures.get_mut(name).expect("registered").called_by_transitive = transitive;
        }

        Ok(topo_order)
    }

    /// Three-colour DFS: revisiting an in-progress procedure is a cycle.
    fn visit_proc(
        &mut self,
        name: &SmolStr,
        proc_bodies: &HashMap<&SmolStr, &ast::StmtList>,
        marks: &mut HashMap<SmolStr, Mark>,
        topo_order: &mut Vec<SmolStr>,
    ) -> Result<(), PkbError> {
        match marks.get(name) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::InProgress) => return Err(PkbError::CyclicCalls),
            None => {}
        }
        marks.insert(name.clone(), Mark::InProgress);

        let body = proc_bodies
            .get(name)
            .ok_or_else(|| PkbError::UndefinedProcedure(name.clone()))?;
        self.visit_calls(body, name, proc_bodies, marks, topo_order)?;

        topo_order.push(name.clone());
        marks.insert(name.clone(), Mark::Done);
        Ok(())
    }

    fn visit_calls(
        &mut self,
        list: &ast::StmtList,
        caller: &SmolStr,
        proc_bodies: &HashMap<&SmolStr, &ast::StmtList>,
        marks: &mut HashMap<SmolStr, Mark>,
        topo_order: &mut Vec<SmolStr>,
    ) -> Result<(), PkbError> {
        for stmt in &list.stmts {
            match &stmt.kind {
                StmtKind::If {
                    then_body,
                    else_body,
                    ..
                } => {
                    self.visit_calls(then_body, caller, proc_bodies, marks, topo_order)?;
                    self.visit_calls(else_body, caller, proc_bodies, marks, topo_order)?;
                }
                StmtKind::While { body, .. } => {
                    self.visit_calls(body, caller, proc_bodies, marks, topo_order)?;
                }
                StmtKind::Call { proc: callee } => {
                    if !self.procedures.contains_key(callee) {
                        return Err(PkbError::UndefinedProcedure(callee.clone()));
                    }
                    self.calls_exists = true;

                    // go deeper first, so the callee's transitive set is
                    // complete when we fold it into the caller's.
                    self.visit_proc(callee, proc_bodies, marks, topo_order)?;

                    let callee_transitive = self.procedures[callee].calls_transitive.clone();
                    let caller_record = self.procedures.get_mut(caller).expect("registered");
                    caller_record.calls.insert(callee.clone());
                    caller_record.calls_transitive.insert(callee.clone());
                    caller_record.calls_transitive.extend(callee_transitive);

                    self.procedures
                        .get_mut(callee)
                        .expect("registered")
                        .called_by
                        .insert(caller.clone());
                }
                _ => {}
            }
        }
        Ok(())
    }

    // --- phase 3: follows, parent, uses, modifies, kind indexes ---

    fn process_stmt_list(
        &mut self,
        list: &ast::StmtList,
        container_stack: &mut Vec<StmtId>,
        proc: &SmolStr,
    ) {
        // forwards for Follows/Follows* in one direction, backwards for
        // the other; the running union gives the closure for free.
        for i in 1..list.stmts.len() {
            let this_id = list.stmts[i].id.get();
            let prev_id = list.stmts[i - 1].id.get();
            let prev_before = self.statements[prev_id - 1].before.clone();

            let this_stmt = &mut self.statements[this_id - 1];
            this_stmt.directly_before = prev_id;
            this_stmt.before.insert(prev_id);
            this_stmt.before.extend(prev_before);
            self.follows_exists = true;
        }
        for i in (1..list.stmts.len()).rev() {
            let this_id = list.stmts[i].id.get();
            let prev_id = list.stmts[i - 1].id.get();
            let this_after = self.statements[this_id - 1].after.clone();

            let prev_stmt = &mut self.statements[prev_id - 1];
            prev_stmt.directly_after = this_id;
            prev_stmt.after.insert(this_id);
            prev_stmt.after.extend(this_after);
        }

        for stmt in &list.stmts {
            let id = stmt.id.get();

            if let Some(&top) = container_stack.last() {
                let top_ancestors = self.statements[top - 1].ancestors.clone();
                self.statements[top - 1].children.insert(id);

                let record = &mut self.statements[id - 1];
                record.parent = Some(top);
                record.ancestors.insert(top);
                record.ancestors.extend(top_ancestors);

                for &container in container_stack.iter() {
                    self.statements[container - 1].descendants.insert(id);
                }
                self.parent_exists = true;
            }

            self.add_stmt_kind(DesignEnt::Stmt, id);
            self.add_stmt_kind(DesignEnt::ProgLine, id);

            match &stmt.kind {
                StmtKind::If {
                    cond,
                    then_body,
                    else_body,
                } => {
                    container_stack.push(id);
                    self.process_expr(cond, id, container_stack, proc);
                    self.process_stmt_list(then_body, container_stack, proc);
                    self.process_stmt_list(else_body, container_stack, proc);
                    self.add_stmt_kind(DesignEnt::If, id);
                    debug_assert_eq!(container_stack.last(), Some(&id));
                    container_stack.pop();
                }
                StmtKind::While { cond, body } => {
                    container_stack.push(id);
                    self.process_expr(cond, id, container_stack, proc);
                    self.process_stmt_list(body, container_stack, proc);
                    self.add_stmt_kind(DesignEnt::While, id);
                    debug_assert_eq!(container_stack.last(), Some(&id));
                    container_stack.pop();
                }
                StmtKind::Assign { lhs, rhs } => {
                    self.process_modifies(lhs, id, container_stack, proc);
                    self.process_expr(rhs, id, container_stack, proc);
                    self.add_stmt_kind(DesignEnt::Assign, id);
                }
                StmtKind::Read { var } => {
                    self.process_modifies(var, id, container_stack, proc);
                    self.variables
                        .entry(var.clone())
                        .or_default()
                        .read_stmts
                        .insert(id);
                    self.add_stmt_kind(DesignEnt::Read, id);
                }
                StmtKind::Print { var } => {
                    self.process_uses(var, id, container_stack, proc);
                    self.variables
                        .entry(var.clone())
                        .or_default()
                        .print_stmts
                        .insert(id);
                    self.add_stmt_kind(DesignEnt::Print, id);
                }
                StmtKind::Call { proc: callee } => {
                    self.procedures
                        .get_mut(callee)
                        .expect("checked by the call graph")
                        .call_stmts
                        .insert(id);
                    self.add_stmt_kind(DesignEnt::Call, id);

                    // the callee was processed first (topological call
                    // order), so its sets are final here.
                    let used: Vec<SmolStr> = self.procedures[callee].uses.iter().cloned().collect();
                    let modified: Vec<SmolStr> =
                        self.procedures[callee].modifies.iter().cloned().collect();
                    for var in used {
                        self.process_uses(&var, id, container_stack, proc);
                    }
                    for var in modified {
                        self.process_modifies(&var, id, container_stack, proc);
                    }
                }
            }
        }
    }

    fn process_uses(&mut self, var: &SmolStr, id: StmtId, stack: &[StmtId], proc: &SmolStr) {
        {
            let record = self.variables.entry(var.clone()).or_default();
            record.used_by.insert(id);
            record.used_by.extend(stack.iter().copied());
            record.used_by_procs.insert(proc.clone());
        }

        self.statements[id - 1].uses.insert(var.clone());
        for &container in stack {
            self.statements[container - 1].uses.insert(var.clone());
        }
        self.procedures
            .get_mut(proc)
            .expect("registered")
            .uses
            .insert(var.clone());

        // condition-variable index for if/while pattern clauses
        if matches!(
            self.statements[id - 1].ast.kind,
            StmtKind::If { .. } | StmtKind::While { .. }
        ) {
            self.statements[id - 1].condition_uses.insert(var.clone());
        }
    }

    fn process_modifies(&mut self, var: &SmolStr, id: StmtId, stack: &[StmtId], proc: &SmolStr) {
        {
            let record = self.variables.entry(var.clone()).or_default();
            record.modified_by.insert(id);
            record.modified_by.extend(stack.iter().copied());
            record.modified_by_procs.insert(proc.clone());
        }

        self.statements[id - 1].modifies.insert(var.clone());
        for &container in stack {
            self.statements[container - 1].modifies.insert(var.clone());
        }
        self.procedures
            .get_mut(proc)
            .expect("registered")
            .modifies
            .insert(var.clone());
    }

    fn process_expr(&mut self, expr: &Expr, id: StmtId, stack: &[StmtId], proc: &SmolStr) {
        match expr {
            Expr::Var(name) => self.process_uses(name, id, stack, proc),
            Expr::Const(value) => {
                self.constants.insert(value.clone());
            }
            Expr::Binary { lhs, rhs, .. } => {
                self.process_expr(lhs, id, stack, proc);
                self.process_expr(rhs, id, stack, proc);
            }
            Expr::Unary { operand, .. } => self.process_expr(operand, id, stack, proc),
        }
    }

    fn add_stmt_kind(&mut self, ent: DesignEnt, id: StmtId) {
        self.stmt_kinds.entry(ent).or_default().insert(id);
    }

    // --- phases 4-6: control flow ---

    fn build_cfg(&self, program: &Program) -> Cfg {
        let mut cfg = Cfg::new(self.statements.len());
        for proc in &program.procedures {
            Self::process_cfg_list(&mut cfg, &proc.body, 0);
        }
        self.process_bip(&mut cfg, program);
        cfg.compute_dist_matrix();
        cfg
    }

    /// Adds the intra-procedural edges of one statement list.
    /// `last_checkpt` is where control resumes after the list ends: the
    /// loop header for while bodies, the statement after the enclosing
    /// if for its branches, 0 at the top of a procedure.
    fn process_cfg_list(cfg: &mut Cfg, list: &ast::StmtList, last_checkpt: StmtId) {
        for (i, stmt) in list.stmts.iter().enumerate() {
            let id = stmt.id.get();
            let next_in_list = list.stmts.get(i + 1).map(|s| s.id.get()).unwrap_or(0);
            let continuation = if next_in_list != 0 {
                next_in_list
            } else {
                last_checkpt
            };

            match &stmt.kind {
                StmtKind::If {
                    then_body,
                    else_body,
                    ..
                } => {
                    // an if has exactly its two branch entries; control
                    // rejoins at the continuation, never directly.
                    cfg.add_edge(id, then_body.first_id());
                    cfg.add_edge(id, else_body.first_id());
                    Self::process_cfg_list(cfg, then_body, continuation);
                    Self::process_cfg_list(cfg, else_body, continuation);
                }
                StmtKind::While { body, .. } => {
                    cfg.add_edge(id, body.first_id());
                    if continuation != 0 {
                        cfg.add_edge(id, continuation);
                    }
                    Self::process_cfg_list(cfg, body, id);
                }
                StmtKind::Assign { .. } => {
                    if continuation != 0 {
                        cfg.add_edge(id, continuation);
                    }
                    cfg.assign_ids.insert(id);
                    cfg.mod_ids.insert(id);
                }
                StmtKind::Read { .. } => {
                    if continuation != 0 {
                        cfg.add_edge(id, continuation);
                    }
                    cfg.mod_ids.insert(id);
                }
                StmtKind::Print { .. } => {
                    if continuation != 0 {
                        cfg.add_edge(id, continuation);
                    }
                }
                StmtKind::Call { proc } => {
                    if continuation != 0 {
                        cfg.add_edge(id, continuation);
                    }
                    cfg.mod_ids.insert(id);
                    cfg.call_ids.insert(id, proc.clone());
                }
            }
        }
    }

    fn process_bip(&self, cfg: &mut Cfg, program: &Program) {
        cfg.copy_edges_to_bip();

        for proc in &program.procedures {
            let entry = proc.body.first_id();
            let mut exits = Vec::new();
            Self::collect_exits(&proc.body, &mut exits);
            cfg.set_gates(proc.name.clone(), entry, exits);
        }

        let calls: Vec<(StmtId, SmolStr)> = cfg
            .call_ids
            .iter()
            .map(|(&call_stmt, callee)| (call_stmt, callee.clone()))
            .collect();
        for (call_stmt, callee) in calls {
            let successor = cfg.successors(call_stmt).and_then(|set| {
                debug_assert!(set.len() <= 1, "call statements have one successor at most");
                set.iter().next().copied()
            });
            let (entry, exits) = cfg.gates(&callee).cloned().expect("gates cover every proc");

            cfg.add_bip_edge(call_stmt, entry, call_stmt + 1);
            if let Some(successor) = successor {
                cfg.remove_bip_fallthrough(call_stmt, successor);
                for exit in exits {
                    cfg.add_bip_edge(exit, successor, call_stmt + 1);
                }
            }
        }
    }

    /// Flattens a statement list's terminal statements: an if at the
    /// tail contributes the leaves of both branches.
    fn collect_exits(list: &ast::StmtList, exits: &mut Vec<StmtId>) {
        let Some(last) = list.stmts.last() else {
            return;
        };
        match &last.kind {
            StmtKind::If {
                then_body,
                else_body,
                ..
            } => {
                Self::collect_exits(then_body, exits);
                Self::collect_exits(else_body, exits);
            }
            _ => exits.push(last.id.get()),
        }
    }
}
