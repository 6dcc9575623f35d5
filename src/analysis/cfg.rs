//! # Control Flow Graph
//!
//! Builds basic blocks from a bound function body. Block 0 is the entry and
//! block 1 the exit; both are empty. Statements after a `return`, `throw`,
//! `break` or `continue` land in a block without predecessors.
//!
//! Inside a `try` every node that may raise starts a new block, and the block
//! before it gets edges to the handlers. `return`, `break` and `continue`
//! that leave a `try` with a `finally` go through the `finally` block first.

use crate::ast::BinaryOp;
use crate::binder::{BoundCatch, BoundElseIf, BoundExpr, BoundFunction, BoundStatement};
use crate::diagnostics::Span;
use crate::{Error, Result};

/// Straight-line action inside a block
#[derive(Debug, Clone, PartialEq)]
pub enum CfgNode {
    /// Declaration without initializer
    Declare { name: String, span: Span },
    /// Write of `name`; `value` is `None` when it comes from outside
    /// (a caught exception)
    Define {
        name: String,
        value: Option<BoundExpr>,
        span: Span,
    },
    /// Evaluation for effects or as a branch condition
    Eval { expr: BoundExpr, span: Span },
    /// Function return
    Return { value: Option<BoundExpr>, span: Span },
    /// Raised exception
    Throw { value: BoundExpr, span: Span },
}

impl CfgNode {
    /// Expressions the node evaluates
    pub fn expressions(&self) -> Vec<&BoundExpr> {
        match self {
            CfgNode::Declare { .. } => Vec::new(),
            CfgNode::Define { value, .. } => value.iter().collect(),
            CfgNode::Eval { expr, .. } => vec![expr],
            CfgNode::Return { value, .. } => value.iter().collect(),
            CfgNode::Throw { value, .. } => vec![value],
        }
    }

    /// Variables read, in evaluation order
    pub fn reads(&self) -> Vec<&str> {
        self.expressions()
            .into_iter()
            .flat_map(BoundExpr::reads)
            .collect()
    }

    pub fn span(&self) -> Span {
        match self {
            CfgNode::Declare { span, .. }
            | CfgNode::Define { span, .. }
            | CfgNode::Eval { span, .. }
            | CfgNode::Return { span, .. }
            | CfgNode::Throw { span, .. } => *span,
        }
    }
}

/// A basic block in the control flow graph
#[derive(Debug, Clone, Default)]
pub struct BasicBlock {
    /// Unique block ID (its index)
    pub id: usize,
    /// Nodes in execution order
    pub nodes: Vec<CfgNode>,
    /// Successor block IDs
    pub successors: Vec<usize>,
    /// Predecessor block IDs
    pub predecessors: Vec<usize>,
    /// Block label (if any)
    pub label: Option<String>,
}

/// Control Flow Graph of one function
#[derive(Debug, Clone)]
pub struct ControlFlowGraph {
    /// Function name
    pub function: String,
    /// Blocks indexed by ID
    pub blocks: Vec<BasicBlock>,
    /// Entry block ID
    pub entry: usize,
    /// Exit block ID
    pub exit: usize,
}

impl ControlFlowGraph {
    /// Builds the graph of a bound function
    pub fn build(function: &BoundFunction) -> Result<Self> {
        let mut builder = CfgBuilder {
            function: &function.name,
            blocks: Vec::new(),
            current: 0,
            exit: 0,
            loops: Vec::new(),
            regions: Vec::new(),
        };
        let entry = builder.new_block(Some("entry"));
        let exit = builder.new_block(Some("exit"));
        builder.exit = exit;
        let first = builder.new_block(None);
        builder.edge(entry, first);
        builder.current = first;

        builder.lower_block(&function.body)?;
        builder.edge(builder.current, exit);

        Ok(ControlFlowGraph {
            function: function.name.clone(),
            blocks: builder.blocks,
            entry,
            exit,
        })
    }

    /// Blocks reachable from the entry
    pub fn reachable(&self) -> Vec<bool> {
        let mut seen = vec![false; self.blocks.len()];
        let mut stack = vec![self.entry];
        while let Some(id) = stack.pop() {
            if std::mem::replace(&mut seen[id], true) {
                continue;
            }
            stack.extend(self.blocks[id].successors.iter().copied());
        }
        seen
    }

    /// Total number of nodes
    pub fn node_count(&self) -> usize {
        self.blocks.iter().map(|b| b.nodes.len()).sum()
    }
}

struct LoopTargets {
    continue_to: usize,
    break_to: usize,
}

/// Where control leaves a protected region to
#[derive(Debug, Clone, Copy, PartialEq)]
enum Exit {
    Return,
    Break(usize),
    Continue(usize),
}

/// One enclosing `try`
struct TryRegion {
    catches: Vec<usize>,
    finally: Option<usize>,
    /// Loops opened before the region
    loop_depth: usize,
    in_catch: bool,
    /// Exits that reach their target only after `finally` runs
    pending: Vec<Exit>,
}

struct CfgBuilder<'f> {
    function: &'f str,
    blocks: Vec<BasicBlock>,
    current: usize,
    exit: usize,
    loops: Vec<LoopTargets>,
    regions: Vec<TryRegion>,
}

impl CfgBuilder<'_> {
    fn new_block(&mut self, label: Option<&str>) -> usize {
        let id = self.blocks.len();
        self.blocks.push(BasicBlock {
            id,
            label: label.map(str::to_string),
            ..BasicBlock::default()
        });
        id
    }

    fn edge(&mut self, from: usize, to: usize) {
        if !self.blocks[from].successors.contains(&to) {
            self.blocks[from].successors.push(to);
            self.blocks[to].predecessors.push(from);
        }
    }

    fn push(&mut self, node: CfgNode) {
        let current = self.current;
        self.blocks[current].nodes.push(node);
    }

    /// Pushes a node that may raise. Inside a `try` the handlers see the
    /// state before the node, so the node starts a block of its own.
    fn push_raising(&mut self, node: CfgNode) {
        if let Some(targets) = self.raise_targets() {
            for target in targets {
                self.edge(self.current, target);
            }
            let next = self.new_block(None);
            self.edge(self.current, next);
            self.current = next;
        }
        self.push(node);
    }

    /// Handler entries an exception raised here reaches; `None` when it
    /// leaves the function
    fn raise_targets(&self) -> Option<Vec<usize>> {
        for region in self.regions.iter().rev() {
            let mut targets = if region.in_catch {
                Vec::new()
            } else {
                region.catches.clone()
            };
            targets.extend(region.finally);
            if !targets.is_empty() {
                return Some(targets);
            }
        }
        None
    }

    /// Ends the current block with a jump and continues in a fresh,
    /// unreachable one
    fn jump(&mut self, targets: &[usize]) {
        for &target in targets {
            self.edge(self.current, target);
        }
        self.current = self.new_block(None);
    }

    /// Leaves through every `finally` between here and the target
    fn leave(&mut self, exit: Exit) {
        let from = self.current;
        self.route(from, exit);
        self.current = self.new_block(None);
    }

    fn route(&mut self, from: usize, exit: Exit) {
        let mut guard = None;
        for (index, region) in self.regions.iter().enumerate().rev() {
            let crosses = match exit {
                Exit::Return => true,
                Exit::Break(depth) | Exit::Continue(depth) => depth < region.loop_depth,
            };
            if !crosses {
                break;
            }
            if let Some(finally) = region.finally {
                guard = Some((index, finally));
                break;
            }
        }
        let target = match guard {
            Some((index, finally)) => {
                let pending = &mut self.regions[index].pending;
                if !pending.contains(&exit) {
                    pending.push(exit);
                }
                finally
            }
            None => match exit {
                Exit::Return => self.exit,
                Exit::Break(depth) => self.loops[depth].break_to,
                Exit::Continue(depth) => self.loops[depth].continue_to,
            },
        };
        self.edge(from, target);
    }

    fn malformed(&self, reason: &str) -> Error {
        Error::MalformedCfg {
            function: self.function.to_string(),
            reason: reason.to_string(),
        }
    }

    fn innermost_loop(&self, reason: &str) -> Result<usize> {
        match self.loops.len() {
            0 => Err(self.malformed(reason)),
            n => Ok(n - 1),
        }
    }

    fn lower_block(&mut self, stmts: &[BoundStatement]) -> Result<()> {
        for stmt in stmts {
            self.lower_statement(stmt)?;
        }
        Ok(())
    }

    fn lower_statement(&mut self, stmt: &BoundStatement) -> Result<()> {
        match stmt {
            BoundStatement::Bind {
                name,
                initializer,
                span,
                ..
            } => match initializer {
                Some(value) => self.push_raising(CfgNode::Define {
                    name: name.clone(),
                    value: Some(value.clone()),
                    span: *span,
                }),
                None => self.push(CfgNode::Declare {
                    name: name.clone(),
                    span: *span,
                }),
            },

            BoundStatement::Assign {
                target,
                value,
                span,
            } => self.push_raising(CfgNode::Define {
                name: target.clone(),
                value: Some(value.clone()),
                span: *span,
            }),

            BoundStatement::Expression { expr, span } => self.push_raising(CfgNode::Eval {
                expr: expr.clone(),
                span: *span,
            }),

            BoundStatement::Return { value, span } => {
                let node = CfgNode::Return {
                    value: value.clone(),
                    span: *span,
                };
                if value.is_some() {
                    self.push_raising(node);
                } else {
                    self.push(node);
                }
                self.leave(Exit::Return);
            }

            BoundStatement::Throw { value, span } => {
                self.push_raising(CfgNode::Throw {
                    value: value.clone(),
                    span: *span,
                });
                let targets = self.raise_targets().unwrap_or_else(|| vec![self.exit]);
                self.jump(&targets);
            }

            BoundStatement::If {
                condition,
                then_body,
                else_ifs,
                else_body,
                span,
            } => self.lower_if(condition, then_body, else_ifs, else_body.as_deref(), *span)?,

            BoundStatement::While {
                condition,
                body,
                span,
            } => {
                let header = self.new_block(Some("while_header"));
                self.edge(self.current, header);
                self.current = header;
                self.push_raising(CfgNode::Eval {
                    expr: condition.clone(),
                    span: *span,
                });
                let test = self.current;
                let body_block = self.new_block(Some("while_body"));
                let after = self.new_block(Some("while_exit"));
                self.edge(test, body_block);
                self.edge(test, after);

                self.loops.push(LoopTargets {
                    continue_to: header,
                    break_to: after,
                });
                self.current = body_block;
                self.lower_block(body)?;
                self.loops.pop();
                self.edge(self.current, header);
                self.current = after;
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
                self.push_raising(CfgNode::Define {
                    name: variable.clone(),
                    value: Some(from.clone()),
                    span: *span,
                });
                let header = self.new_block(Some("for_header"));
                self.edge(self.current, header);
                self.current = header;
                self.push_raising(CfgNode::Eval {
                    expr: BoundExpr::binary(
                        BinaryOp::Lt,
                        BoundExpr::var(variable.clone(), *ty),
                        to.clone(),
                    ),
                    span: *span,
                });
                let test = self.current;
                let body_block = self.new_block(Some("for_body"));
                let step_block = self.new_block(Some("for_step"));
                let after = self.new_block(Some("for_exit"));
                self.edge(test, body_block);
                self.edge(test, after);

                self.loops.push(LoopTargets {
                    continue_to: step_block,
                    break_to: after,
                });
                self.current = body_block;
                self.lower_block(body)?;
                self.loops.pop();
                self.edge(self.current, step_block);

                self.current = step_block;
                self.push_raising(CfgNode::Define {
                    name: variable.clone(),
                    value: Some(BoundExpr::binary(
                        BinaryOp::Add,
                        BoundExpr::var(variable.clone(), *ty),
                        step.clone(),
                    )),
                    span: *span,
                });
                self.edge(self.current, header);
                self.current = after;
            }

            BoundStatement::Break { .. } => {
                let depth = self.innermost_loop("break outside of a loop")?;
                self.leave(Exit::Break(depth));
            }

            BoundStatement::Continue { .. } => {
                let depth = self.innermost_loop("continue outside of a loop")?;
                self.leave(Exit::Continue(depth));
            }

            BoundStatement::Try {
                body,
                catch_clauses,
                finally_body,
                ..
            } => self.lower_try(body, catch_clauses, finally_body.as_deref())?,
        }
        Ok(())
    }

    fn lower_if(
        &mut self,
        condition: &BoundExpr,
        then_body: &[BoundStatement],
        else_ifs: &[BoundElseIf],
        else_body: Option<&[BoundStatement]>,
        span: Span,
    ) -> Result<()> {
        self.push_raising(CfgNode::Eval {
            expr: condition.clone(),
            span,
        });
        let mut test_block = self.current;
        let mut arm_ends = Vec::new();

        let then_block = self.new_block(Some("then"));
        self.edge(test_block, then_block);
        self.current = then_block;
        self.lower_block(then_body)?;
        arm_ends.push(self.current);

        for arm in else_ifs {
            let next_test = self.new_block(Some("elseif_next"));
            self.edge(test_block, next_test);
            self.current = next_test;
            self.push_raising(CfgNode::Eval {
                expr: arm.condition.clone(),
                span: arm.span,
            });
            test_block = self.current;

            let arm_block = self.new_block(Some("elseif_then"));
            self.edge(test_block, arm_block);
            self.current = arm_block;
            self.lower_block(&arm.body)?;
            arm_ends.push(self.current);
        }

        let join = match else_body {
            Some(body) => {
                let else_block = self.new_block(Some("else"));
                self.edge(test_block, else_block);
                self.current = else_block;
                self.lower_block(body)?;
                arm_ends.push(self.current);
                self.new_block(Some("endif"))
            }
            None => {
                let join = self.new_block(Some("endif"));
                self.edge(test_block, join);
                join
            }
        };
        for end in arm_ends {
            self.edge(end, join);
        }
        self.current = join;
        Ok(())
    }

    fn lower_try(
        &mut self,
        body: &[BoundStatement],
        catch_clauses: &[BoundCatch],
        finally_body: Option<&[BoundStatement]>,
    ) -> Result<()> {
        let catch_entries: Vec<usize> = catch_clauses
            .iter()
            .map(|_| self.new_block(Some("catch")))
            .collect();
        let finally_block = finally_body.map(|_| self.new_block(Some("finally")));
        let after = self.new_block(Some("try_end"));
        let resume = finally_block.unwrap_or(after);

        let try_start = self.new_block(Some("try"));
        self.edge(self.current, try_start);
        self.current = try_start;

        self.regions.push(TryRegion {
            catches: catch_entries.clone(),
            finally: finally_block,
            loop_depth: self.loops.len(),
            in_catch: false,
            pending: Vec::new(),
        });
        self.lower_block(body)?;
        self.edge(self.current, resume);

        if let Some(region) = self.regions.last_mut() {
            region.in_catch = true;
        }
        for (clause, &entry) in catch_clauses.iter().zip(&catch_entries) {
            self.current = entry;
            if let Some(variable) = &clause.variable {
                self.push(CfgNode::Define {
                    name: variable.clone(),
                    value: None,
                    span: Span::default(),
                });
            }
            self.lower_block(&clause.body)?;
            self.edge(self.current, resume);
        }
        let pending = self
            .regions
            .pop()
            .map(|region| region.pending)
            .unwrap_or_default();

        if let (Some(block), Some(stmts)) = (finally_block, finally_body) {
            self.current = block;
            self.lower_block(stmts)?;
            let end = self.current;
            self.edge(end, after);
            // Exceptions nothing caught continue outward after `finally`
            if let Some(targets) = self.raise_targets() {
                for target in targets {
                    self.edge(end, target);
                }
            }
            for exit in pending {
                self.route(end, exit);
            }
        }

        self.current = after;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ir::SemanticType;

    fn function(body: Vec<BoundStatement>) -> BoundFunction {
        BoundFunction {
            id: "f".into(),
            name: "f".into(),
            parameters: vec![],
            locals: vec![],
            return_type: SemanticType::Void,
            body,
            span: Span::default(),
        }
    }

    fn assign(name: &str, value: i32) -> BoundStatement {
        BoundStatement::Assign {
            target: name.into(),
            value: BoundExpr::int(value),
            span: Span::default(),
        }
    }

    #[test]
    fn test_straight_line_body() {
        let cfg = ControlFlowGraph::build(&function(vec![assign("x", 1), assign("x", 2)])).unwrap();
        assert_eq!(cfg.blocks.len(), 3);
        assert_eq!(cfg.blocks[2].nodes.len(), 2);
        assert_eq!(cfg.blocks[2].successors, vec![cfg.exit]);
    }

    #[test]
    fn test_while_has_back_edge() {
        let body = vec![BoundStatement::While {
            condition: BoundExpr::Literal(crate::compiler::ir::LiteralValue::Bool(true)),
            body: vec![assign("x", 1)],
            span: Span::default(),
        }];
        let cfg = ControlFlowGraph::build(&function(body)).unwrap();
        let header = cfg
            .blocks
            .iter()
            .find(|b| b.label.as_deref() == Some("while_header"))
            .unwrap();
        assert_eq!(header.predecessors.len(), 2);
    }

    #[test]
    fn test_code_after_return_is_unreachable() {
        let body = vec![
            BoundStatement::Return {
                value: None,
                span: Span::default(),
            },
            assign("x", 1),
        ];
        let cfg = ControlFlowGraph::build(&function(body)).unwrap();
        let reachable = cfg.reachable();
        let dead = cfg
            .blocks
            .iter()
            .find(|b| !b.nodes.is_empty() && matches!(b.nodes[0], CfgNode::Define { .. }))
            .unwrap();
        assert!(!reachable[dead.id]);
    }

    #[test]
    fn test_break_outside_loop_is_malformed() {
        let body = vec![BoundStatement::Break {
            span: Span::default(),
        }];
        let err = ControlFlowGraph::build(&function(body)).unwrap_err();
        assert!(matches!(err, Error::MalformedCfg { .. }));
    }

    fn finally_block(cfg: &ControlFlowGraph) -> &BasicBlock {
        cfg.blocks
            .iter()
            .find(|b| b.label.as_deref() == Some("finally"))
            .unwrap()
    }

    #[test]
    fn test_return_inside_try_runs_finally() {
        let body = vec![BoundStatement::Try {
            body: vec![BoundStatement::Return {
                value: None,
                span: Span::default(),
            }],
            catch_clauses: vec![],
            finally_body: Some(vec![assign("x", 1)]),
            span: Span::default(),
        }];
        let cfg = ControlFlowGraph::build(&function(body)).unwrap();
        assert!(cfg.blocks[cfg.exit]
            .predecessors
            .iter()
            .all(|p| !matches!(cfg.blocks[*p].nodes.last(), Some(CfgNode::Return { .. }))));
        let finally = finally_block(&cfg);
        assert!(finally.successors.contains(&cfg.exit));
    }

    #[test]
    fn test_uncaught_throw_unwinds_through_finally() {
        let body = vec![BoundStatement::Try {
            body: vec![BoundStatement::Throw {
                value: BoundExpr::int(0),
                span: Span::default(),
            }],
            catch_clauses: vec![],
            finally_body: Some(vec![assign("x", 1)]),
            span: Span::default(),
        }];
        let cfg = ControlFlowGraph::build(&function(body)).unwrap();
        let thrower = cfg
            .blocks
            .iter()
            .find(|b| matches!(b.nodes.last(), Some(CfgNode::Throw { .. })))
            .unwrap();
        assert_eq!(thrower.successors, vec![finally_block(&cfg).id]);
    }

    #[test]
    fn test_break_inside_try_runs_finally_first() {
        let body = vec![BoundStatement::While {
            condition: BoundExpr::Literal(crate::compiler::ir::LiteralValue::Bool(true)),
            body: vec![BoundStatement::Try {
                body: vec![BoundStatement::Break {
                    span: Span::default(),
                }],
                catch_clauses: vec![],
                finally_body: Some(vec![assign("x", 1)]),
                span: Span::default(),
            }],
            span: Span::default(),
        }];
        let cfg = ControlFlowGraph::build(&function(body)).unwrap();
        let loop_exit = cfg
            .blocks
            .iter()
            .find(|b| b.label.as_deref() == Some("while_exit"))
            .unwrap();
        assert!(finally_block(&cfg).successors.contains(&loop_exit.id));
    }

    #[test]
    fn test_handler_sees_state_before_each_write() {
        let body = vec![BoundStatement::Try {
            body: vec![assign("x", 1), assign("x", 2)],
            catch_clauses: vec![BoundCatch {
                exception_type: None,
                variable: None,
                body: vec![],
            }],
            finally_body: None,
            span: Span::default(),
        }];
        let cfg = ControlFlowGraph::build(&function(body)).unwrap();
        let catch = cfg
            .blocks
            .iter()
            .find(|b| b.label.as_deref() == Some("catch"))
            .unwrap();
        // From before the first write and from between the two writes
        let writes_before: Vec<usize> = catch
            .predecessors
            .iter()
            .map(|p| cfg.blocks[*p].nodes.len())
            .collect();
        assert_eq!(writes_before, vec![0, 1]);
    }
}
