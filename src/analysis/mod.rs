//! # Verification Analysis
//!
//! Static analyses over bound functions, orchestrated by
//! [`VerificationAnalysisPass`]:
//!
//! ```text
//! BoundFunction → CFG → dataflow (uninitialized use, dead stores)
//!               → bug patterns (optionally solver-backed)
//!               → taint (source → sink)
//!               → k-induction loop invariants (solver-backed, opt-in)
//! ```
//!
//! Every function is analyzed into its own [`DiagnosticBag`], which is then
//! appended to the caller's bag in declaration order. Counts are measured on
//! the local bag, so a parallel run reports exactly what a sequential one
//! does.
//!
//! ## Usage
//!
//! ```ignore
//! use calor::analysis::{VerificationAnalysisPass, VerificationOptions};
//!
//! let pass = VerificationAnalysisPass::new(VerificationOptions::fast());
//! let result = pass.run(&bound_module, &diagnostics);
//! println!("{} dataflow issues", result.dataflow_issues);
//! ```

pub mod bug_patterns;
pub mod cfg;
pub mod dataflow;
pub mod kinduction;
pub mod taint;

pub use bug_patterns::{BugPatternOptions, BugPatternRunner};
pub use cfg::{BasicBlock, CfgNode, ControlFlowGraph};
pub use dataflow::{analyze_dead_stores, analyze_uninitialized};
pub use kinduction::{KInductionOptions, LoopInvariantSynthesizer};
pub use taint::{TaintAnalysis, TaintOptions, VulnerabilityKind};

use crate::binder::{BoundFunction, BoundModule};
use crate::diagnostics::{DiagnosticBag, DiagnosticCode};
use crate::solver::Solver;
use crate::Result;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Which analyses run, and how
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationOptions {
    /// Uninitialized-use and dead-store analyses
    pub enable_dataflow: bool,
    /// Division, overflow, self-assignment and constant-condition checks
    pub enable_bug_patterns: bool,
    /// Source-to-sink taint tracking
    pub enable_taint_analysis: bool,
    /// Loop invariant synthesis; needs a solver
    pub enable_k_induction: bool,
    /// Let bug patterns consult the solver
    pub use_solver_verification: bool,
    /// Budget for solver work per function and analysis
    pub solver_timeout_ms: u64,
    /// Which bug patterns run
    pub bug_patterns: BugPatternOptions,
    /// Source, sink and sanitizer tables
    pub taint: TaintOptions,
    /// k-induction limits
    pub k_induction: KInductionOptions,
    /// Analyze functions on a rayon pool
    pub parallel: bool,
}

impl Default for VerificationOptions {
    fn default() -> Self {
        Self {
            enable_dataflow: true,
            enable_bug_patterns: true,
            enable_taint_analysis: true,
            enable_k_induction: false,
            use_solver_verification: true,
            solver_timeout_ms: 5000,
            bug_patterns: BugPatternOptions::default(),
            taint: TaintOptions::default(),
            k_induction: KInductionOptions::default(),
            parallel: false,
        }
    }
}

impl VerificationOptions {
    /// Everything but the solver
    pub fn fast() -> Self {
        Self {
            use_solver_verification: false,
            enable_k_induction: false,
            ..Self::default()
        }
    }

    /// Every analysis, with a longer solver budget
    pub fn thorough() -> Self {
        Self {
            enable_k_induction: true,
            solver_timeout_ms: 10_000,
            ..Self::default()
        }
    }

    /// Options from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// `solver_timeout_ms` as a duration
    pub fn solver_timeout(&self) -> Duration {
        Duration::from_millis(self.solver_timeout_ms)
    }
}

/// Counts for one function
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FunctionSummary {
    /// Function ID
    pub id: String,
    /// Function name
    pub name: String,
    /// Uninitialized uses plus dead stores
    pub dataflow_issues: usize,
    /// Bug-pattern diagnostics
    pub bug_patterns: usize,
    /// Tainted values reaching a sink
    pub taint_vulnerabilities: usize,
    /// Invariants proven by k-induction
    pub invariants_synthesized: usize,
    /// Diagnostics the function contributed
    pub diagnostics: usize,
}

/// Aggregate outcome of a pass
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VerificationPassResult {
    /// Functions the pass visited
    pub functions_analyzed: usize,
    /// Uninitialized uses plus dead stores, over all functions
    pub dataflow_issues: usize,
    /// Bug-pattern diagnostics, over all functions
    pub bug_patterns: usize,
    /// Taint findings, over all functions
    pub taint_vulnerabilities: usize,
    /// Invariants proven, summed over functions
    pub invariants_synthesized: usize,
    /// Wall-clock time of the run
    pub duration: Duration,
    /// Per-function counts in declaration order
    pub functions: Vec<FunctionSummary>,
}

impl VerificationPassResult {
    /// Sum of all findings except synthesized invariants
    pub fn total_issues(&self) -> usize {
        self.dataflow_issues + self.bug_patterns + self.taint_vulnerabilities
    }
}

/// Runs the enabled analyses over every function of a bound module
pub struct VerificationAnalysisPass {
    options: VerificationOptions,
    solver: Option<Arc<dyn Solver>>,
}

impl VerificationAnalysisPass {
    /// Pass without a solver; solver-backed checks stay silent
    pub fn new(options: VerificationOptions) -> Self {
        Self {
            options,
            solver: None,
        }
    }

    /// Solver for solver-backed bug patterns and k-induction
    pub fn with_solver(mut self, solver: Arc<dyn Solver>) -> Self {
        self.solver = Some(solver);
        self
    }

    /// Options the pass runs with
    pub fn options(&self) -> &VerificationOptions {
        &self.options
    }

    /// Analyzes every function, appending findings to `diagnostics`
    pub fn run(&self, module: &BoundModule, diagnostics: &DiagnosticBag) -> VerificationPassResult {
        let start = Instant::now();
        tracing::debug!(
            "Verification pass over {} ({} functions)",
            module.name,
            module.functions.len()
        );

        let outcomes = if self.options.parallel && module.functions.len() > 1 {
            self.run_parallel(&module.functions)
        } else {
            module.functions.iter().map(|f| self.analyze_function(f)).collect()
        };

        let mut result = VerificationPassResult::default();
        for (summary, bag) in outcomes {
            result.functions_analyzed += 1;
            result.dataflow_issues += summary.dataflow_issues;
            result.bug_patterns += summary.bug_patterns;
            result.taint_vulnerabilities += summary.taint_vulnerabilities;
            result.invariants_synthesized += summary.invariants_synthesized;
            diagnostics.extend_from(bag);
            result.functions.push(summary);
        }
        result.duration = start.elapsed();

        tracing::debug!(
            "Verification pass done in {:?}: {} dataflow, {} bug patterns, {} taint, {} invariants",
            result.duration,
            result.dataflow_issues,
            result.bug_patterns,
            result.taint_vulnerabilities,
            result.invariants_synthesized
        );
        result
    }

    fn run_parallel(&self, functions: &[BoundFunction]) -> Vec<(FunctionSummary, DiagnosticBag)> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_cpus::get().min(functions.len()))
            .build();
        match pool {
            Ok(pool) => pool.install(|| {
                functions
                    .par_iter()
                    .map(|f| self.analyze_function(f))
                    .collect()
            }),
            Err(e) => {
                tracing::warn!("Failed to create thread pool, analyzing sequentially: {}", e);
                functions.iter().map(|f| self.analyze_function(f)).collect()
            }
        }
    }

    /// Runs every enabled analysis over one function into a fresh bag
    pub fn analyze_function(&self, function: &BoundFunction) -> (FunctionSummary, DiagnosticBag) {
        let bag = DiagnosticBag::new();
        let mut summary = FunctionSummary {
            id: function.id.clone(),
            name: function.name.clone(),
            ..FunctionSummary::default()
        };
        let timeout = self.options.solver_timeout();

        // The CFG is only needed by dataflow and taint
        let cfg = if self.options.enable_dataflow || self.options.enable_taint_analysis {
            match ControlFlowGraph::build(function) {
                Ok(cfg) => Some(cfg),
                Err(e) => {
                    tracing::debug!("Skipping CFG analyses for {}: {}", function.name, e);
                    None
                }
            }
        } else {
            None
        };

        if self.options.enable_dataflow {
            if let Some(cfg) = &cfg {
                match run_dataflow(cfg, function, &bag) {
                    Ok(count) => summary.dataflow_issues = count,
                    Err(e) => tracing::debug!("Dataflow skipped for {}: {}", function.name, e),
                }
            }
        }

        if self.options.enable_bug_patterns {
            let mut runner = BugPatternRunner::new(self.options.bug_patterns.clone());
            if self.options.use_solver_verification {
                if let Some(solver) = &self.solver {
                    runner = runner.with_solver(solver.clone(), timeout);
                }
            }
            let before = bag.len();
            runner.run(function, &bag);
            summary.bug_patterns = bag.len() - before;
        }

        if self.options.enable_taint_analysis {
            if let Some(cfg) = &cfg {
                match TaintAnalysis::new(&self.options.taint).run(cfg, function, &bag) {
                    Ok(count) => summary.taint_vulnerabilities = count,
                    Err(e) => tracing::debug!("Taint analysis skipped for {}: {}", function.name, e),
                }
            }
        }

        if self.options.enable_k_induction {
            let mut synthesizer = LoopInvariantSynthesizer::new(self.options.k_induction.clone());
            if let Some(solver) = &self.solver {
                synthesizer = synthesizer.with_solver(solver.clone(), timeout);
            }
            let before = bag.len();
            synthesizer.run(function, &bag);
            summary.invariants_synthesized =
                bag.count_code_since(before, DiagnosticCode::InvariantSynthesized);
        }

        summary.diagnostics = bag.len();
        (summary, bag)
    }
}

fn run_dataflow(cfg: &ControlFlowGraph, function: &BoundFunction, bag: &DiagnosticBag) -> Result<usize> {
    // Report nothing unless both analyses complete
    let local = DiagnosticBag::new();
    let uninitialized = analyze_uninitialized(cfg, function, &local)?;
    let dead = analyze_dead_stores(cfg, function, &local)?;
    bag.extend_from(local);
    Ok(uninitialized + dead)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        let fast = VerificationOptions::fast();
        assert!(!fast.use_solver_verification);
        assert!(!fast.enable_k_induction);
        assert!(fast.enable_dataflow);

        let thorough = VerificationOptions::thorough();
        assert!(thorough.enable_k_induction);
        assert_eq!(thorough.solver_timeout_ms, 10_000);
        assert_eq!(VerificationOptions::default().solver_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let options = VerificationOptions::from_json(r#"{"enable_taint_analysis": false}"#).unwrap();
        assert!(!options.enable_taint_analysis);
        assert!(options.enable_dataflow);
        assert_eq!(options.solver_timeout_ms, 5000);
        assert!(options.bug_patterns.division_by_zero);
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(VerificationOptions::from_json("not json").is_err());
    }

    #[test]
    fn test_empty_module() {
        let module = BoundModule {
            name: "m".into(),
            functions: vec![],
        };
        let bag = DiagnosticBag::new();
        let result = VerificationAnalysisPass::new(VerificationOptions::default()).run(&module, &bag);
        assert_eq!(result.functions_analyzed, 0);
        assert_eq!(result.total_issues(), 0);
        assert!(bag.is_empty());
    }
}
