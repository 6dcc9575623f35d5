//! # Loop Invariant Synthesis (k-induction)
//!
//! For every `while`/`for` loop a transition system is built over the
//! integer and boolean variables the body writes:
//!
//! - the **initial state** comes from constant assignments preceding the loop
//!   (and the range start of a `for`),
//! - one **step** applies the top-level assignments of the body in order;
//!   writes under nested control flow or with unencodable values are havocked,
//! - the loop condition is assumed at every unrolled state.
//!
//! Candidate invariants are guessed from the loop's shape and checked with
//! k-induction, for `k = 1..=max_k`:
//!
//! ```text
//! base(k):  init ∧ T(0,1) ∧ ... ∧ T(k-2,k-1) ∧ ¬(P(0) ∧ ... ∧ P(k-1))   must be UNSAT
//! step(k):  P(0) ∧ T(0,1) ∧ ... ∧ P(k-1) ∧ T(k-1,k) ∧ ¬P(k)             UNSAT proves P
//! ```
//!
//! Integers are mathematical: wrap-around is not modelled.

use crate::ast::BinaryOp;
use crate::binder::{BoundExpr, BoundFunction, BoundStatement};
use crate::compiler::ir::{LiteralValue, SemanticType};
use crate::diagnostics::{DiagnosticBag, DiagnosticCode, Span};
use crate::solver::{SatResult, SmtQuery, SmtSort, SmtTerm, Solver};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// k-induction limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KInductionOptions {
    /// Deepest unrolling tried
    pub max_k: u32,
    /// Candidates checked per loop
    pub max_candidates: usize,
}

impl Default for KInductionOptions {
    fn default() -> Self {
        Self {
            max_k: 3,
            max_candidates: 16,
        }
    }
}

/// Proves loop invariants and reports them as `InvariantSynthesized`
pub struct LoopInvariantSynthesizer {
    options: KInductionOptions,
    solver: Option<Arc<dyn Solver>>,
    timeout: Duration,
}

impl LoopInvariantSynthesizer {
    /// Synthesizer without a solver
    pub fn new(options: KInductionOptions) -> Self {
        Self {
            options,
            solver: None,
            timeout: Duration::from_millis(5000),
        }
    }

    /// Without a solver the synthesizer reports nothing
    pub fn with_solver(mut self, solver: Arc<dyn Solver>, timeout: Duration) -> Self {
        self.solver = Some(solver);
        self.timeout = timeout;
        self
    }

    /// Analyzes every loop of the function; returns the number of invariants
    /// reported
    pub fn run(&self, function: &BoundFunction, diagnostics: &DiagnosticBag) -> usize {
        let solver = match &self.solver {
            Some(solver) => solver.as_ref(),
            None => return 0,
        };
        let mut run = Run {
            options: &self.options,
            solver,
            function,
            diagnostics,
            deadline: Instant::now() + self.timeout,
            reported: 0,
        };
        run.block(&function.body, HashMap::new());
        run.reported
    }
}

enum Update {
    Set(String, BoundExpr),
    Havoc(String),
}

/// Transition system of one loop
struct LoopModel {
    kind: &'static str,
    span: Span,
    condition: BoundExpr,
    state: Vec<(String, SmtSort)>,
    updates: Vec<Update>,
    init: Vec<(String, BoundExpr)>,
}

impl LoopModel {
    fn is_state(&self, name: &str) -> bool {
        self.state.iter().any(|(n, _)| n == name)
    }

    fn sort_of(&self, name: &str) -> SmtSort {
        self.state
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, s)| *s)
            .unwrap_or(SmtSort::Int)
    }

    fn at(&self, step: u32) -> impl Fn(&str) -> String + '_ {
        move |name: &str| {
            if self.is_state(name) {
                versioned(name, step)
            } else {
                name.to_string()
            }
        }
    }

    fn encode_init(&self, query: &mut SmtQuery) {
        for (name, value) in &self.init {
            let constant = versioned(name, 0);
            query.declare(constant.clone(), self.sort_of(name));
            if let Some(term) = query.encode(value, &|n: &str| n.to_string()) {
                query.assert(SmtTerm::eq(SmtTerm::var(constant), term));
            }
        }
    }

    fn encode_condition(&self, query: &mut SmtQuery, step: u32) {
        if let Some(term) = query.encode(&self.condition, &self.at(step)) {
            query.assert(term);
        }
    }

    /// Constrains state `step + 1` as one pass over the body from `step`
    fn encode_transition(&self, query: &mut SmtQuery, step: u32) {
        let mut current: HashMap<String, String> = self
            .state
            .iter()
            .map(|(n, _)| (n.clone(), versioned(n, step)))
            .collect();

        for (i, update) in self.updates.iter().enumerate() {
            let (name, value) = match update {
                Update::Set(name, value) => (name, Some(value)),
                Update::Havoc(name) => (name, None),
            };
            let constant = format!("{}@{}.{}", name, step, i);
            query.declare(constant.clone(), self.sort_of(name));
            if let Some(value) = value {
                let term = query.encode(value, &|n: &str| {
                    current.get(n).cloned().unwrap_or_else(|| n.to_string())
                });
                if let Some(term) = term {
                    query.assert(SmtTerm::eq(SmtTerm::var(constant.clone()), term));
                }
            }
            current.insert(name.clone(), constant);
        }

        for (name, sort) in &self.state {
            let next = versioned(name, step + 1);
            query.declare(next.clone(), *sort);
            if let Some(last) = current.get(name) {
                query.assert(SmtTerm::eq(SmtTerm::var(next), SmtTerm::var(last.clone())));
            }
        }
    }

    fn base_query(&self, candidate: &BoundExpr, k: u32) -> Option<SmtQuery> {
        let mut query = SmtQuery::new();
        self.encode_init(&mut query);
        for j in 0..k.saturating_sub(1) {
            self.encode_condition(&mut query, j);
            self.encode_transition(&mut query, j);
        }
        let mut holds = Vec::new();
        for j in 0..k {
            holds.push(query.encode(candidate, &self.at(j))?);
        }
        query.assert(SmtTerm::not(SmtTerm::and(holds)));
        Some(query)
    }

    fn step_query(&self, candidate: &BoundExpr, k: u32) -> Option<SmtQuery> {
        let mut query = SmtQuery::new();
        for j in 0..k {
            let holds = query.encode(candidate, &self.at(j))?;
            query.assert(holds);
            self.encode_condition(&mut query, j);
            self.encode_transition(&mut query, j);
        }
        let last = query.encode(candidate, &self.at(k))?;
        query.assert(SmtTerm::not(last));
        Some(query)
    }
}

fn versioned(name: &str, step: u32) -> String {
    format!("{}@{}", name, step)
}

struct Run<'a> {
    options: &'a KInductionOptions,
    solver: &'a dyn Solver,
    function: &'a BoundFunction,
    diagnostics: &'a DiagnosticBag,
    deadline: Instant,
    reported: usize,
}

impl Run<'_> {
    fn expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// Walks a block tracking constant values of variables
    fn block(&mut self, stmts: &[BoundStatement], mut known: HashMap<String, i64>) {
        for stmt in stmts {
            if self.expired() {
                tracing::debug!("k-induction deadline reached in {}", self.function.name);
                return;
            }
            match stmt {
                BoundStatement::Bind {
                    name, initializer, ..
                } => match initializer.as_ref().and_then(constant_int) {
                    Some(v) => {
                        known.insert(name.clone(), v);
                    }
                    None => {
                        known.remove(name);
                    }
                },
                BoundStatement::Assign { target, value, .. } => match constant_int(value) {
                    Some(v) => {
                        known.insert(target.clone(), v);
                    }
                    None => {
                        known.remove(target);
                    }
                },
                BoundStatement::If {
                    then_body,
                    else_ifs,
                    else_body,
                    ..
                } => {
                    self.block(then_body, known.clone());
                    for arm in else_ifs {
                        self.block(&arm.body, known.clone());
                    }
                    if let Some(body) = else_body {
                        self.block(body, known.clone());
                    }
                }
                BoundStatement::While {
                    condition,
                    body,
                    span,
                } => {
                    if let Some(model) = self.model("while", *span, condition.clone(), body, None, &known) {
                        self.prove(&model, self.candidates(&model, None));
                    }
                    self.block(body, without_assigned(&known, std::slice::from_ref(stmt)));
                }
                BoundStatement::For {
                    variable,
                    ty,
                    from,
                    to,
                    step,
                    body,
                    span,
                } => {
                    let condition =
                        BoundExpr::binary(BinaryOp::Lt, BoundExpr::var(variable.clone(), *ty), to.clone());
                    let range = ForRange {
                        variable,
                        ty: *ty,
                        from,
                        to,
                        step,
                    };
                    if let Some(model) = self.model("for", *span, condition, body, Some(&range), &known) {
                        self.prove(&model, self.candidates(&model, Some(&range)));
                    }
                    self.block(body, without_assigned(&known, std::slice::from_ref(stmt)));
                }
                BoundStatement::Try {
                    body,
                    catch_clauses,
                    finally_body,
                    ..
                } => {
                    let inner = without_assigned(&known, std::slice::from_ref(stmt));
                    self.block(body, known.clone());
                    for clause in catch_clauses {
                        self.block(&clause.body, inner.clone());
                    }
                    if let Some(finally) = finally_body {
                        self.block(finally, inner.clone());
                    }
                }
                _ => {}
            }

            if matches!(
                stmt,
                BoundStatement::If { .. }
                    | BoundStatement::While { .. }
                    | BoundStatement::For { .. }
                    | BoundStatement::Try { .. }
            ) {
                known = without_assigned(&known, std::slice::from_ref(stmt));
            }
        }
    }

    fn model(
        &self,
        kind: &'static str,
        span: Span,
        condition: BoundExpr,
        body: &[BoundStatement],
        range: Option<&ForRange<'_>>,
        known: &HashMap<String, i64>,
    ) -> Option<LoopModel> {
        // `continue` skips the rest of the body, which one step cannot express
        if has_continue(body) {
            return None;
        }

        let mut assigned = Vec::new();
        if let Some(range) = range {
            assigned.push(range.variable.to_string());
        }
        assigned_vars(body, &mut assigned);
        let state: Vec<(String, SmtSort)> = assigned
            .iter()
            .filter_map(|name| {
                let ty = self.function.type_of(name)?;
                SmtSort::of(ty).map(|sort| (name.clone(), sort))
            })
            .collect();
        if state.is_empty() {
            return None;
        }
        let in_state = |name: &str| state.iter().any(|(n, _)| n == name);

        let mut updates = Vec::new();
        for stmt in body {
            match stmt {
                BoundStatement::Bind {
                    name, initializer, ..
                } if in_state(name.as_str()) => updates.push(match initializer {
                    Some(value) => Update::Set(name.clone(), value.clone()),
                    None => Update::Havoc(name.clone()),
                }),
                BoundStatement::Assign { target, value, .. } if in_state(target.as_str()) => {
                    updates.push(Update::Set(target.clone(), value.clone()))
                }
                BoundStatement::If { .. }
                | BoundStatement::While { .. }
                | BoundStatement::For { .. }
                | BoundStatement::Try { .. } => {
                    let mut nested = Vec::new();
                    assigned_vars(std::slice::from_ref(stmt), &mut nested);
                    updates.extend(
                        nested
                            .into_iter()
                            .filter(|n| in_state(n.as_str()))
                            .map(Update::Havoc),
                    );
                }
                _ => {}
            }
        }

        let mut init = Vec::new();
        if let Some(range) = range {
            updates.push(Update::Set(
                range.variable.to_string(),
                BoundExpr::binary(
                    BinaryOp::Add,
                    BoundExpr::var(range.variable, range.ty),
                    range.step.clone(),
                ),
            ));
            init.push((range.variable.to_string(), range.from.clone()));
        }
        for (name, _) in &state {
            if range.map_or(false, |r| r.variable == name.as_str()) {
                continue;
            }
            if let (Some(value), Some(ty)) = (known.get(name), self.function.type_of(name)) {
                init.push((name.clone(), int_literal(*value, ty)));
            }
        }

        Some(LoopModel {
            kind,
            span,
            condition,
            state,
            updates,
            init,
        })
    }

    fn candidates(&self, model: &LoopModel, range: Option<&ForRange<'_>>) -> Vec<BoundExpr> {
        let mut out = Vec::new();
        let var_of = |name: &str| {
            BoundExpr::var(
                name,
                self.function.type_of(name).unwrap_or(SemanticType::Int),
            )
        };
        let independent = |e: &BoundExpr| e.reads().iter().all(|n| !model.is_state(n));

        // Range of a `for` with a positive constant step
        if let Some(range) = range {
            if constant_int(range.step).map_or(false, |s| s > 0) {
                let var = var_of(range.variable);
                if independent(range.from) {
                    out.push(BoundExpr::binary(BinaryOp::Ge, var.clone(), range.from.clone()));
                }
                if independent(range.to) && independent(range.from) {
                    out.push(BoundExpr::binary(BinaryOp::Le, var, range.to.clone()));
                }
            }
        }

        let initial = |name: &str| {
            model
                .init
                .iter()
                .find(|(n, _)| n == name)
                .and_then(|(_, v)| constant_int(v))
        };

        // Monotone counters
        for (name, sort) in &model.state {
            if *sort != SmtSort::Int {
                continue;
            }
            let writes: Vec<&Update> = model
                .updates
                .iter()
                .filter(|u| match u {
                    Update::Set(n, _) | Update::Havoc(n) => n == name,
                })
                .collect();
            let delta = match writes.as_slice() {
                [Update::Set(_, value)] => constant_delta(name, value),
                _ => None,
            };
            if let (Some(delta), Some(start)) = (delta, initial(name)) {
                let ty = self.function.type_of(name).unwrap_or(SemanticType::Int);
                let op = if delta > 0 { BinaryOp::Ge } else { BinaryOp::Le };
                if delta != 0 {
                    out.push(BoundExpr::binary(op, var_of(name), int_literal(start, ty)));
                }
            }
        }

        // Non-strict form of the loop condition
        if let BoundExpr::Binary {
            op, left, right, ..
        } = &model.condition
        {
            let weakened = match op {
                BinaryOp::Lt => Some(BinaryOp::Le),
                BinaryOp::Gt => Some(BinaryOp::Ge),
                _ => None,
            };
            if let Some(weak) = weakened {
                if left.ty().is_integral() && right.ty().is_integral() {
                    out.push(BoundExpr::binary(weak, (**left).clone(), (**right).clone()));
                }
            }
        }

        // Non-negativity of counters starting at or above zero
        for (name, sort) in &model.state {
            if *sort == SmtSort::Int && initial(name).map_or(false, |v| v >= 0) {
                let ty = self.function.type_of(name).unwrap_or(SemanticType::Int);
                out.push(BoundExpr::binary(BinaryOp::Ge, var_of(name), int_literal(0, ty)));
            }
        }

        let mut seen = HashSet::new();
        out.retain(|c| seen.insert(c.to_string()));
        out.truncate(self.options.max_candidates);
        out
    }

    fn check(&self, query: &SmtQuery) -> Option<SatResult> {
        let now = Instant::now();
        if now >= self.deadline {
            return None;
        }
        match self.solver.check_sat(query, self.deadline - now) {
            Ok(result) => Some(result),
            Err(e) => {
                if e.is_inconclusive() {
                    tracing::debug!("k-induction query inconclusive: {}", e);
                } else {
                    tracing::warn!("k-induction query failed: {}", e);
                }
                None
            }
        }
    }

    fn prove(&mut self, model: &LoopModel, candidates: Vec<BoundExpr>) {
        for candidate in candidates {
            if self.expired() {
                return;
            }
            for k in 1..=self.options.max_k.max(1) {
                let base = match model.base_query(&candidate, k) {
                    Some(q) => q,
                    None => break,
                };
                match self.check(&base) {
                    Some(SatResult::Unsat) => {}
                    _ => break,
                }
                let step = match model.step_query(&candidate, k) {
                    Some(q) => q,
                    None => break,
                };
                match self.check(&step) {
                    Some(SatResult::Unsat) => {
                        self.diagnostics.info(
                            model.span,
                            DiagnosticCode::InvariantSynthesized,
                            format!(
                                "Invariant '{}' holds for the {} loop at line {} (k = {})",
                                candidate, model.kind, model.span.line, k
                            ),
                        );
                        self.reported += 1;
                        break;
                    }
                    Some(SatResult::Sat) => continue,
                    _ => break,
                }
            }
        }
    }
}

struct ForRange<'s> {
    variable: &'s str,
    ty: SemanticType,
    from: &'s BoundExpr,
    to: &'s BoundExpr,
    step: &'s BoundExpr,
}

fn constant_int(expr: &BoundExpr) -> Option<i64> {
    expr.constant_value().and_then(|v| v.as_i64())
}

fn int_literal(value: i64, ty: SemanticType) -> BoundExpr {
    match (ty, i32::try_from(value)) {
        (SemanticType::Int, Ok(v)) => BoundExpr::Literal(LiteralValue::Int(v)),
        _ => BoundExpr::Literal(LiteralValue::Long(value)),
    }
}

/// `name + c` or `name - c` as a signed delta
fn constant_delta(name: &str, value: &BoundExpr) -> Option<i64> {
    if let BoundExpr::Binary {
        op, left, right, ..
    } = value
    {
        if let BoundExpr::Variable { name: n, .. } = &**left {
            if n == name {
                let c = constant_int(right)?;
                return match op {
                    BinaryOp::Add => Some(c),
                    BinaryOp::Sub => c.checked_neg(),
                    _ => None,
                };
            }
        }
    }
    None
}

/// Every name written anywhere in `stmts`, in first-write order
fn assigned_vars(stmts: &[BoundStatement], out: &mut Vec<String>) {
    fn add(name: &str, out: &mut Vec<String>) {
        if !out.iter().any(|n| n == name) {
            out.push(name.to_string());
        }
    }
    for stmt in stmts {
        match stmt {
            BoundStatement::Bind { name, .. } => add(name, out),
            BoundStatement::Assign { target, .. } => add(target, out),
            BoundStatement::If {
                then_body,
                else_ifs,
                else_body,
                ..
            } => {
                assigned_vars(then_body, out);
                for arm in else_ifs {
                    assigned_vars(&arm.body, out);
                }
                if let Some(body) = else_body {
                    assigned_vars(body, out);
                }
            }
            BoundStatement::While { body, .. } => assigned_vars(body, out),
            BoundStatement::For { variable, body, .. } => {
                add(variable, out);
                assigned_vars(body, out);
            }
            BoundStatement::Try {
                body,
                catch_clauses,
                finally_body,
                ..
            } => {
                assigned_vars(body, out);
                for clause in catch_clauses {
                    if let Some(var) = &clause.variable {
                        add(var, out);
                    }
                    assigned_vars(&clause.body, out);
                }
                if let Some(finally) = finally_body {
                    assigned_vars(finally, out);
                }
            }
            _ => {}
        }
    }
}

fn without_assigned(known: &HashMap<String, i64>, stmts: &[BoundStatement]) -> HashMap<String, i64> {
    let mut assigned = Vec::new();
    assigned_vars(stmts, &mut assigned);
    let mut out = known.clone();
    for name in assigned {
        out.remove(&name);
    }
    out
}

/// `continue` belonging to this loop (nested loops own theirs)
fn has_continue(stmts: &[BoundStatement]) -> bool {
    stmts.iter().any(|stmt| match stmt {
        BoundStatement::Continue { .. } => true,
        BoundStatement::If {
            then_body,
            else_ifs,
            else_body,
            ..
        } => {
            has_continue(then_body)
                || else_ifs.iter().any(|arm| has_continue(&arm.body))
                || else_body.as_deref().map_or(false, has_continue)
        }
        BoundStatement::Try {
            body,
            catch_clauses,
            finally_body,
            ..
        } => {
            has_continue(body)
                || catch_clauses.iter().any(|c| has_continue(&c.body))
                || finally_body.as_deref().map_or(false, has_continue)
        }
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::VariableSymbol;
    use crate::Result;
    use parking_lot::Mutex;

    /// Answers every query with one result and records the scripts
    struct ScriptedSolver {
        answer: SatResult,
        scripts: Mutex<Vec<String>>,
    }

    impl ScriptedSolver {
        fn new(answer: SatResult) -> Arc<Self> {
            Arc::new(Self {
                answer,
                scripts: Mutex::new(Vec::new()),
            })
        }
    }

    impl Solver for ScriptedSolver {
        fn check_sat(&self, query: &SmtQuery, _timeout: Duration) -> Result<SatResult> {
            self.scripts.lock().push(query.to_smtlib());
            Ok(self.answer)
        }
    }

    fn counter_loop() -> BoundFunction {
        // i = 0; while (i < n) { i = i + 1 }
        let i = BoundExpr::var("i", SemanticType::Int);
        let n = BoundExpr::var("n", SemanticType::Int);
        BoundFunction {
            id: "f".into(),
            name: "f".into(),
            parameters: vec![VariableSymbol {
                name: "n".into(),
                ty: SemanticType::Int,
                is_parameter: true,
            }],
            locals: vec![VariableSymbol {
                name: "i".into(),
                ty: SemanticType::Int,
                is_parameter: false,
            }],
            return_type: SemanticType::Void,
            body: vec![
                BoundStatement::Bind {
                    name: "i".into(),
                    ty: SemanticType::Int,
                    initializer: Some(BoundExpr::int(0)),
                    span: Span::default(),
                },
                BoundStatement::While {
                    condition: BoundExpr::binary(BinaryOp::Lt, i.clone(), n),
                    body: vec![BoundStatement::Assign {
                        target: "i".into(),
                        value: BoundExpr::binary(BinaryOp::Add, i, BoundExpr::int(1)),
                        span: Span::default(),
                    }],
                    span: Span::at_line(2),
                },
            ],
            span: Span::default(),
        }
    }

    #[test]
    fn test_no_solver_reports_nothing() {
        let bag = DiagnosticBag::new();
        let count = LoopInvariantSynthesizer::new(KInductionOptions::default()).run(&counter_loop(), &bag);
        assert_eq!(count, 0);
        assert!(bag.is_empty());
    }

    #[test]
    fn test_candidates_proven_when_solver_refutes_counterexamples() {
        let bag = DiagnosticBag::new();
        let solver = ScriptedSolver::new(SatResult::Unsat);
        let count = LoopInvariantSynthesizer::new(KInductionOptions::default())
            .with_solver(solver.clone(), Duration::from_secs(5))
            .run(&counter_loop(), &bag);

        // i >= 0 (monotone counter, also non-negative) and i <= n (weakened condition)
        assert_eq!(count, 2);
        assert_eq!(bag.count_code(DiagnosticCode::InvariantSynthesized), 2);
        let scripts = solver.scripts.lock();
        assert_eq!(scripts.len(), 4);
        assert!(scripts[0].contains("(assert (= i@0 0))"));
        assert!(scripts[1].contains("(assert (not (>= i@1 0)))"));
    }

    #[test]
    fn test_refuted_base_case_reports_nothing() {
        let bag = DiagnosticBag::new();
        let solver = ScriptedSolver::new(SatResult::Sat);
        let count = LoopInvariantSynthesizer::new(KInductionOptions::default())
            .with_solver(solver, Duration::from_secs(5))
            .run(&counter_loop(), &bag);
        assert_eq!(count, 0);
        assert!(bag.is_empty());
    }

    #[test]
    fn test_expired_deadline_reports_nothing() {
        let bag = DiagnosticBag::new();
        let count = LoopInvariantSynthesizer::new(KInductionOptions::default())
            .with_solver(ScriptedSolver::new(SatResult::Unsat), Duration::ZERO)
            .run(&counter_loop(), &bag);
        assert_eq!(count, 0);
    }
}
