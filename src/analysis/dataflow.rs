//! # Dataflow Analyses
//!
//! Two classic analyses over [`ControlFlowGraph`]:
//!
//! - **Uninitialized use** (forward, must): a variable is initialized at a
//!   point when every path from the entry writes it first. Parameters start
//!   initialized. Blocks without a path from the entry start at top, so they
//!   never report.
//! - **Dead store** (backward, may): a write is dead when no path from it
//!   reads the value before the next write. Parameters are never reported.

use super::cfg::{CfgNode, ControlFlowGraph};
use crate::binder::BoundFunction;
use crate::diagnostics::{DiagnosticBag, DiagnosticCode, Span};
use crate::{Error, Result};
use std::collections::HashSet;

/// Fixpoint iteration cap per block
const ITERATIONS_PER_BLOCK: usize = 64;

/// Must-initialized facts, `Top` standing for "every variable"
#[derive(Debug, Clone, PartialEq)]
enum InitFacts {
    Top,
    Set(HashSet<String>),
}

impl InitFacts {
    fn meet(&self, other: &InitFacts) -> InitFacts {
        match (self, other) {
            (InitFacts::Top, x) | (x, InitFacts::Top) => x.clone(),
            (InitFacts::Set(a), InitFacts::Set(b)) => {
                InitFacts::Set(a.intersection(b).cloned().collect())
            }
        }
    }

    fn contains(&self, name: &str) -> bool {
        match self {
            InitFacts::Top => true,
            InitFacts::Set(set) => set.contains(name),
        }
    }

    fn apply(&mut self, node: &CfgNode) {
        if let InitFacts::Set(set) = self {
            match node {
                CfgNode::Define { name, .. } => {
                    set.insert(name.clone());
                }
                CfgNode::Declare { name, .. } => {
                    set.remove(name);
                }
                _ => {}
            }
        }
    }
}

fn iteration_limit(cfg: &ControlFlowGraph) -> usize {
    (cfg.blocks.len() + 1) * ITERATIONS_PER_BLOCK
}

/// Reports reads of variables that may not have been written yet
///
/// Each variable is reported once. Returns the number of reports.
pub fn analyze_uninitialized(
    cfg: &ControlFlowGraph,
    function: &BoundFunction,
    diagnostics: &DiagnosticBag,
) -> Result<usize> {
    let params: HashSet<String> = function.parameters.iter().map(|p| p.name.clone()).collect();
    let n = cfg.blocks.len();
    let mut block_in = vec![InitFacts::Top; n];
    let mut block_out = vec![InitFacts::Top; n];
    block_in[cfg.entry] = InitFacts::Set(params.clone());

    let limit = iteration_limit(cfg);
    let mut iterations = 0;
    let mut changed = true;
    while changed {
        changed = false;
        iterations += 1;
        if iterations > limit {
            return Err(Error::NoFixpoint { iterations: limit });
        }
        for block in &cfg.blocks {
            let input = if block.id == cfg.entry {
                InitFacts::Set(params.clone())
            } else {
                block
                    .predecessors
                    .iter()
                    .fold(InitFacts::Top, |acc, p| acc.meet(&block_out[*p]))
            };
            let mut output = input.clone();
            for node in &block.nodes {
                output.apply(node);
            }
            if output != block_out[block.id] {
                changed = true;
            }
            block_in[block.id] = input;
            block_out[block.id] = output;
        }
    }

    let mut reported: HashSet<&str> = HashSet::new();
    for block in &cfg.blocks {
        let mut facts = block_in[block.id].clone();
        for node in &block.nodes {
            for name in node.reads() {
                if !facts.contains(name) && reported.insert(name) {
                    diagnostics.error(
                        node.span(),
                        DiagnosticCode::UninitializedVariable,
                        format!("Variable '{}' may be used before it is assigned", name),
                    );
                }
            }
            facts.apply(node);
        }
    }

    Ok(reported.len())
}

/// Reports writes whose value is never read
///
/// Returns the number of reports.
pub fn analyze_dead_stores(
    cfg: &ControlFlowGraph,
    function: &BoundFunction,
    diagnostics: &DiagnosticBag,
) -> Result<usize> {
    let n = cfg.blocks.len();
    let mut live_in: Vec<HashSet<&str>> = vec![HashSet::new(); n];
    let mut live_out: Vec<HashSet<&str>> = vec![HashSet::new(); n];

    let limit = iteration_limit(cfg);
    let mut iterations = 0;
    let mut changed = true;
    while changed {
        changed = false;
        iterations += 1;
        if iterations > limit {
            return Err(Error::NoFixpoint { iterations: limit });
        }
        for block in cfg.blocks.iter().rev() {
            let mut out: HashSet<&str> = HashSet::new();
            for succ in &block.successors {
                out.extend(live_in[*succ].iter().copied());
            }
            let mut live = out.clone();
            for node in block.nodes.iter().rev() {
                transfer_live(&mut live, node);
            }
            if live != live_in[block.id] {
                changed = true;
            }
            live_in[block.id] = live;
            live_out[block.id] = out;
        }
    }

    let mut dead: Vec<(usize, usize, &str, Span)> = Vec::new();
    for block in &cfg.blocks {
        let mut live = live_out[block.id].clone();
        for (index, node) in block.nodes.iter().enumerate().rev() {
            if let CfgNode::Define {
                name,
                value: Some(_),
                span,
            } = node
            {
                if !live.contains(name.as_str()) && !function.is_parameter(name) {
                    dead.push((block.id, index, name.as_str(), *span));
                }
            }
            transfer_live(&mut live, node);
        }
    }
    dead.sort_by_key(|(block, index, _, _)| (*block, *index));

    for (_, _, name, span) in &dead {
        diagnostics.warning(
            *span,
            DiagnosticCode::DeadStore,
            format!("Value assigned to '{}' is never read", name),
        );
    }
    Ok(dead.len())
}

fn transfer_live<'a>(live: &mut HashSet<&'a str>, node: &'a CfgNode) {
    match node {
        CfgNode::Define { name, value, .. } => {
            live.remove(name.as_str());
            if let Some(value) = value {
                live.extend(value.reads());
            }
        }
        CfgNode::Declare { name, .. } => {
            live.remove(name.as_str());
        }
        other => live.extend(other.reads()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::{BoundCatch, BoundExpr, BoundStatement, VariableSymbol};
    use crate::compiler::ir::SemanticType;

    fn function(params: &[&str], body: Vec<BoundStatement>) -> BoundFunction {
        BoundFunction {
            id: "f".into(),
            name: "f".into(),
            parameters: params
                .iter()
                .map(|p| VariableSymbol {
                    name: p.to_string(),
                    ty: SemanticType::Int,
                    is_parameter: true,
                })
                .collect(),
            locals: vec![],
            return_type: SemanticType::Int,
            body,
            span: Span::default(),
        }
    }

    fn x() -> BoundExpr {
        BoundExpr::var("x", SemanticType::Int)
    }

    #[test]
    fn test_declared_but_unassigned_read() {
        let f = function(
            &[],
            vec![
                BoundStatement::Bind {
                    name: "x".into(),
                    ty: SemanticType::Int,
                    initializer: None,
                    span: Span::default(),
                },
                BoundStatement::Return {
                    value: Some(x()),
                    span: Span::default(),
                },
            ],
        );
        let cfg = ControlFlowGraph::build(&f).unwrap();
        let bag = DiagnosticBag::new();
        assert_eq!(analyze_uninitialized(&cfg, &f, &bag).unwrap(), 1);
        assert_eq!(bag.count_code(DiagnosticCode::UninitializedVariable), 1);
    }

    #[test]
    fn test_assigned_on_one_branch_only() {
        let f = function(
            &["c"],
            vec![
                BoundStatement::Bind {
                    name: "x".into(),
                    ty: SemanticType::Int,
                    initializer: None,
                    span: Span::default(),
                },
                BoundStatement::If {
                    condition: BoundExpr::var("c", SemanticType::Bool),
                    then_body: vec![BoundStatement::Assign {
                        target: "x".into(),
                        value: BoundExpr::int(1),
                        span: Span::default(),
                    }],
                    else_ifs: vec![],
                    else_body: None,
                    span: Span::default(),
                },
                BoundStatement::Return {
                    value: Some(x()),
                    span: Span::default(),
                },
            ],
        );
        let cfg = ControlFlowGraph::build(&f).unwrap();
        let bag = DiagnosticBag::new();
        assert_eq!(analyze_uninitialized(&cfg, &f, &bag).unwrap(), 1);
    }

    #[test]
    fn test_parameters_are_initialized() {
        let f = function(
            &["x"],
            vec![BoundStatement::Return {
                value: Some(x()),
                span: Span::default(),
            }],
        );
        let cfg = ControlFlowGraph::build(&f).unwrap();
        let bag = DiagnosticBag::new();
        assert_eq!(analyze_uninitialized(&cfg, &f, &bag).unwrap(), 0);
        assert!(bag.is_empty());
    }

    #[test]
    fn test_loop_carried_value_is_not_dead() {
        // x = 0; while (x < 10) { x = x + 1 }; return x
        let f = function(
            &[],
            vec![
                BoundStatement::Bind {
                    name: "x".into(),
                    ty: SemanticType::Int,
                    initializer: Some(BoundExpr::int(0)),
                    span: Span::default(),
                },
                BoundStatement::While {
                    condition: BoundExpr::binary(crate::ast::BinaryOp::Lt, x(), BoundExpr::int(10)),
                    body: vec![BoundStatement::Assign {
                        target: "x".into(),
                        value: BoundExpr::binary(crate::ast::BinaryOp::Add, x(), BoundExpr::int(1)),
                        span: Span::default(),
                    }],
                    span: Span::default(),
                },
                BoundStatement::Return {
                    value: Some(x()),
                    span: Span::default(),
                },
            ],
        );
        let cfg = ControlFlowGraph::build(&f).unwrap();
        let bag = DiagnosticBag::new();
        assert_eq!(analyze_dead_stores(&cfg, &f, &bag).unwrap(), 0);
    }

    #[test]
    fn test_parameter_overwrite_not_reported() {
        let f = function(
            &["x"],
            vec![BoundStatement::Assign {
                target: "x".into(),
                value: BoundExpr::int(5),
                span: Span::default(),
            }],
        );
        let cfg = ControlFlowGraph::build(&f).unwrap();
        let bag = DiagnosticBag::new();
        assert_eq!(analyze_dead_stores(&cfg, &f, &bag).unwrap(), 0);
    }

    fn risky() -> BoundExpr {
        BoundExpr::Call {
            target: "Risky".into(),
            args: vec![],
            ty: SemanticType::Int,
        }
    }

    /// `try { x = Risky() } catch { return x }`
    fn guarded_write() -> BoundStatement {
        BoundStatement::Try {
            body: vec![BoundStatement::Assign {
                target: "x".into(),
                value: risky(),
                span: Span::at_line(2),
            }],
            catch_clauses: vec![BoundCatch {
                exception_type: None,
                variable: None,
                body: vec![BoundStatement::Return {
                    value: Some(x()),
                    span: Span::at_line(3),
                }],
            }],
            finally_body: None,
            span: Span::at_line(2),
        }
    }

    #[test]
    fn test_value_read_by_handler_is_not_dead() {
        // x = 1; try { x = Risky() } catch { return x }; return x
        let f = function(
            &[],
            vec![
                BoundStatement::Bind {
                    name: "x".into(),
                    ty: SemanticType::Int,
                    initializer: Some(BoundExpr::int(1)),
                    span: Span::at_line(1),
                },
                guarded_write(),
                BoundStatement::Return {
                    value: Some(x()),
                    span: Span::at_line(4),
                },
            ],
        );
        let cfg = ControlFlowGraph::build(&f).unwrap();
        let bag = DiagnosticBag::new();
        assert_eq!(analyze_dead_stores(&cfg, &f, &bag).unwrap(), 0);
        assert!(bag.is_empty(), "{:?}", bag.snapshot());
    }

    #[test]
    fn test_handler_read_before_protected_write() {
        // let x; try { x = Risky() } catch { return x }
        let f = function(
            &[],
            vec![
                BoundStatement::Bind {
                    name: "x".into(),
                    ty: SemanticType::Int,
                    initializer: None,
                    span: Span::at_line(1),
                },
                guarded_write(),
            ],
        );
        let cfg = ControlFlowGraph::build(&f).unwrap();
        let bag = DiagnosticBag::new();
        assert_eq!(analyze_uninitialized(&cfg, &f, &bag).unwrap(), 1);
        assert_eq!(bag.snapshot()[0].span.line, 3);
    }

    #[test]
    fn test_return_through_finally_keeps_its_reads() {
        // let y = 1; try { return 0 } finally { Log(y) }
        let f = function(
            &[],
            vec![
                BoundStatement::Bind {
                    name: "y".into(),
                    ty: SemanticType::Int,
                    initializer: Some(BoundExpr::int(1)),
                    span: Span::at_line(1),
                },
                BoundStatement::Try {
                    body: vec![BoundStatement::Return {
                        value: Some(BoundExpr::int(0)),
                        span: Span::at_line(2),
                    }],
                    catch_clauses: vec![],
                    finally_body: Some(vec![BoundStatement::Expression {
                        expr: BoundExpr::Call {
                            target: "Log".into(),
                            args: vec![BoundExpr::var("y", SemanticType::Int)],
                            ty: SemanticType::Void,
                        },
                        span: Span::at_line(3),
                    }]),
                    span: Span::at_line(2),
                },
            ],
        );
        let cfg = ControlFlowGraph::build(&f).unwrap();
        let bag = DiagnosticBag::new();
        assert_eq!(analyze_dead_stores(&cfg, &f, &bag).unwrap(), 0);
    }
}
