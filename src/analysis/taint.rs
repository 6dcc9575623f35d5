//! # Taint Analysis
//!
//! Forward may-analysis over the CFG tracking which variables hold data from
//! untrusted sources. Calls to sources produce tainted values, sanitizers
//! produce clean ones, and any other expression is tainted when something it
//! reads is. A sink call with a tainted argument is a vulnerability.
//!
//! Call names are matched case-insensitively.

use super::cfg::{CfgNode, ControlFlowGraph};
use crate::binder::{BoundExpr, BoundFunction};
use crate::diagnostics::{DiagnosticBag, DiagnosticCode};
use crate::Result;
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Fixpoint iteration cap per block
const ITERATIONS_PER_BLOCK: usize = 64;

/// Class of injection a sink is exposed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VulnerabilityKind {
    SqlInjection,
    CommandInjection,
    PathTraversal,
    CodeInjection,
    CrossSiteScripting,
}

impl VulnerabilityKind {
    /// Diagnostic code reported for this kind
    pub fn code(&self) -> DiagnosticCode {
        match self {
            VulnerabilityKind::SqlInjection => DiagnosticCode::SqlInjection,
            VulnerabilityKind::CommandInjection => DiagnosticCode::CommandInjection,
            VulnerabilityKind::PathTraversal => DiagnosticCode::PathTraversal,
            VulnerabilityKind::CodeInjection => DiagnosticCode::CodeInjection,
            VulnerabilityKind::CrossSiteScripting => DiagnosticCode::CrossSiteScripting,
        }
    }
}

impl fmt::Display for VulnerabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VulnerabilityKind::SqlInjection => "SQL injection",
            VulnerabilityKind::CommandInjection => "command injection",
            VulnerabilityKind::PathTraversal => "path traversal",
            VulnerabilityKind::CodeInjection => "code injection",
            VulnerabilityKind::CrossSiteScripting => "cross-site scripting",
        };
        f.write_str(name)
    }
}

lazy_static! {
    static ref DEFAULT_SOURCES: Vec<&'static str> = vec![
        "Console.ReadLine",
        "ReadLine",
        "ReadInput",
        "Environment.GetEnvironmentVariable",
        "GetEnv",
        "Request.Query",
        "Request.Form",
        "GetParameter",
        "File.ReadAllText",
    ];
    static ref DEFAULT_SINKS: Vec<(&'static str, VulnerabilityKind)> = vec![
        ("ExecuteSql", VulnerabilityKind::SqlInjection),
        ("ExecuteQuery", VulnerabilityKind::SqlInjection),
        ("SqlCommand", VulnerabilityKind::SqlInjection),
        ("Process.Start", VulnerabilityKind::CommandInjection),
        ("Exec", VulnerabilityKind::CommandInjection),
        ("Shell", VulnerabilityKind::CommandInjection),
        ("File.Open", VulnerabilityKind::PathTraversal),
        ("File.Delete", VulnerabilityKind::PathTraversal),
        ("File.WriteAllText", VulnerabilityKind::PathTraversal),
        ("Eval", VulnerabilityKind::CodeInjection),
        ("Evaluate", VulnerabilityKind::CodeInjection),
        ("Response.Write", VulnerabilityKind::CrossSiteScripting),
        ("RenderHtml", VulnerabilityKind::CrossSiteScripting),
    ];
    static ref DEFAULT_SANITIZERS: Vec<&'static str> = vec![
        "Sanitize",
        "Escape",
        "EscapeSql",
        "EscapeShell",
        "HtmlEncode",
        "Path.GetFileName",
        "Validate",
    ];
}

/// Sources, sinks and sanitizers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaintOptions {
    /// Calls returning untrusted data
    pub sources: Vec<String>,
    /// Calls that must not receive untrusted data, by vulnerability kind
    pub sinks: HashMap<String, VulnerabilityKind>,
    /// Calls whose result is clean whatever their input
    pub sanitizers: Vec<String>,
    /// Treat every parameter as tainted on entry
    pub taint_parameters: bool,
}

impl Default for TaintOptions {
    fn default() -> Self {
        Self {
            sources: DEFAULT_SOURCES.iter().map(|s| s.to_string()).collect(),
            sinks: DEFAULT_SINKS
                .iter()
                .map(|(name, kind)| (name.to_string(), *kind))
                .collect(),
            sanitizers: DEFAULT_SANITIZERS.iter().map(|s| s.to_string()).collect(),
            taint_parameters: false,
        }
    }
}

/// Taint tracker with lower-cased lookup tables
pub struct TaintAnalysis {
    sources: HashSet<String>,
    sinks: HashMap<String, VulnerabilityKind>,
    sanitizers: HashSet<String>,
    taint_parameters: bool,
}

impl TaintAnalysis {
    /// Builds the lookup tables; names match case-insensitively
    pub fn new(options: &TaintOptions) -> Self {
        Self {
            sources: options.sources.iter().map(|s| s.to_lowercase()).collect(),
            sinks: options
                .sinks
                .iter()
                .map(|(name, kind)| (name.to_lowercase(), *kind))
                .collect(),
            sanitizers: options.sanitizers.iter().map(|s| s.to_lowercase()).collect(),
            taint_parameters: options.taint_parameters,
        }
    }

    /// Reports every sink call reached by tainted data; returns the count
    pub fn run(
        &self,
        cfg: &ControlFlowGraph,
        function: &BoundFunction,
        diagnostics: &DiagnosticBag,
    ) -> Result<usize> {
        let entry_facts: HashSet<&str> = if self.taint_parameters {
            function.parameters.iter().map(|p| p.name.as_str()).collect()
        } else {
            HashSet::new()
        };

        let n = cfg.blocks.len();
        let mut block_out: Vec<HashSet<&str>> = vec![HashSet::new(); n];
        let mut block_in: Vec<HashSet<&str>> = vec![HashSet::new(); n];
        let limit = (n + 1) * ITERATIONS_PER_BLOCK;
        let mut iterations = 0;
        let mut changed = true;

        while changed {
            changed = false;
            iterations += 1;
            if iterations > limit {
                return Err(crate::Error::NoFixpoint { iterations: limit });
            }
            for block in &cfg.blocks {
                let mut facts = if block.id == cfg.entry {
                    entry_facts.clone()
                } else {
                    let mut facts = HashSet::new();
                    for pred in &block.predecessors {
                        facts.extend(block_out[*pred].iter().copied());
                    }
                    facts
                };
                block_in[block.id] = facts.clone();
                for node in &block.nodes {
                    self.transfer(&mut facts, node);
                }
                if facts != block_out[block.id] {
                    block_out[block.id] = facts;
                    changed = true;
                }
            }
        }

        let mut found = 0;
        for block in &cfg.blocks {
            let mut facts = block_in[block.id].clone();
            for node in &block.nodes {
                for expr in node.expressions() {
                    found += self.report_sinks(expr, &facts, node, diagnostics);
                }
                self.transfer(&mut facts, node);
            }
        }

        if found > 0 {
            tracing::debug!("{}: {} tainted sink calls", function.name, found);
        }
        Ok(found)
    }

    fn transfer<'a>(&self, facts: &mut HashSet<&'a str>, node: &'a CfgNode) {
        match node {
            CfgNode::Define {
                name,
                value: Some(value),
                ..
            } => {
                if self.is_tainted(value, facts) {
                    facts.insert(name.as_str());
                } else {
                    facts.remove(name.as_str());
                }
            }
            CfgNode::Define { name, value: None, .. } | CfgNode::Declare { name, .. } => {
                facts.remove(name.as_str());
            }
            _ => {}
        }
    }

    fn is_tainted(&self, expr: &BoundExpr, facts: &HashSet<&str>) -> bool {
        match expr {
            BoundExpr::Literal(_) | BoundExpr::Error => false,
            BoundExpr::Variable { name, .. } => facts.contains(name.as_str()),
            BoundExpr::Call { target, args, .. } => {
                let target = target.to_lowercase();
                if self.sanitizers.contains(&target) {
                    false
                } else if self.sources.contains(&target) {
                    true
                } else {
                    args.iter().any(|a| self.is_tainted(a, facts))
                }
            }
            BoundExpr::Binary { left, right, .. } => {
                self.is_tainted(left, facts) || self.is_tainted(right, facts)
            }
            BoundExpr::Unary { operand, .. } => self.is_tainted(operand, facts),
            BoundExpr::Conditional {
                condition,
                when_true,
                when_false,
                ..
            } => {
                self.is_tainted(condition, facts)
                    || self.is_tainted(when_true, facts)
                    || self.is_tainted(when_false, facts)
            }
        }
    }

    fn report_sinks(
        &self,
        expr: &BoundExpr,
        facts: &HashSet<&str>,
        node: &CfgNode,
        diagnostics: &DiagnosticBag,
    ) -> usize {
        let mut found = 0;
        expr.visit(&mut |e| {
            if let BoundExpr::Call { target, args, .. } = e {
                if let Some(kind) = self.sinks.get(&target.to_lowercase()) {
                    if args.iter().any(|a| self.is_tainted(a, facts)) {
                        diagnostics.error(
                            node.span(),
                            kind.code(),
                            format!(
                                "Untrusted data reaches '{}' ({} risk)",
                                target, kind
                            ),
                        );
                        found += 1;
                    }
                }
            }
        });
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::{BoundStatement, VariableSymbol};
    use crate::compiler::ir::SemanticType;
    use crate::diagnostics::Span;

    fn call(target: &str, args: Vec<BoundExpr>) -> BoundExpr {
        BoundExpr::Call {
            target: target.into(),
            args,
            ty: SemanticType::Object,
        }
    }

    fn function(body: Vec<BoundStatement>) -> BoundFunction {
        BoundFunction {
            id: "f".into(),
            name: "f".into(),
            parameters: vec![VariableSymbol {
                name: "p".into(),
                ty: SemanticType::String,
                is_parameter: true,
            }],
            locals: vec![],
            return_type: SemanticType::Void,
            body,
            span: Span::default(),
        }
    }

    fn run(options: &TaintOptions, f: &BoundFunction) -> (usize, DiagnosticBag) {
        let bag = DiagnosticBag::new();
        let cfg = ControlFlowGraph::build(f).unwrap();
        let found = TaintAnalysis::new(options).run(&cfg, f, &bag).unwrap();
        (found, bag)
    }

    fn bind(name: &str, value: BoundExpr) -> BoundStatement {
        BoundStatement::Bind {
            name: name.into(),
            ty: SemanticType::String,
            initializer: Some(value),
            span: Span::default(),
        }
    }

    fn expr(e: BoundExpr) -> BoundStatement {
        BoundStatement::Expression {
            expr: e,
            span: Span::default(),
        }
    }

    fn var(name: &str) -> BoundExpr {
        BoundExpr::var(name, SemanticType::String)
    }

    #[test]
    fn test_source_to_sink() {
        let f = function(vec![
            bind("q", call("console.readline", vec![])),
            expr(call("ExecuteSql", vec![var("q")])),
        ]);
        let (found, bag) = run(&TaintOptions::default(), &f);
        assert_eq!(found, 1);
        assert_eq!(bag.count_code(DiagnosticCode::SqlInjection), 1);
    }

    #[test]
    fn test_sanitizer_cleans() {
        let f = function(vec![
            bind("q", call("ReadLine", vec![])),
            bind("safe", call("EscapeSql", vec![var("q")])),
            expr(call("ExecuteSql", vec![var("safe")])),
        ]);
        let (found, bag) = run(&TaintOptions::default(), &f);
        assert_eq!(found, 0);
        assert!(bag.is_empty());
    }

    #[test]
    fn test_parameters_clean_unless_configured() {
        let f = function(vec![expr(call("Process.Start", vec![var("p")]))]);
        assert_eq!(run(&TaintOptions::default(), &f).0, 0);

        let options = TaintOptions {
            taint_parameters: true,
            ..TaintOptions::default()
        };
        let (found, bag) = run(&options, &f);
        assert_eq!(found, 1);
        assert_eq!(bag.count_code(DiagnosticCode::CommandInjection), 1);
    }

    #[test]
    fn test_overwrite_clears_taint() {
        let f = function(vec![
            bind("q", call("ReadLine", vec![])),
            BoundStatement::Assign {
                target: "q".into(),
                value: BoundExpr::Literal(crate::compiler::ir::LiteralValue::String("x".into())),
                span: Span::default(),
            },
            expr(call("Eval", vec![var("q")])),
        ]);
        assert_eq!(run(&TaintOptions::default(), &f).0, 0);
    }
}
