//! Z3 as an external process
//!
//! Each query starts `z3 -in` with a soft `-t:` timeout and the script on
//! stdin. The process is killed if it outlives the timeout plus a grace
//! period.

use super::{SatResult, SmtQuery, Solver};
use crate::{Error, Result};
use lazy_static::lazy_static;
use regex::Regex;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// Extra wall-clock time granted past the soft timeout before the kill
const KILL_GRACE: Duration = Duration::from_millis(500);

const POLL_INTERVAL: Duration = Duration::from_millis(5);

lazy_static! {
    static ref ERROR_LINE: Regex = Regex::new(r#"(?m)^\(error "(.*)"\)\s*$"#).unwrap();
}

/// Z3 reached through its command-line interface
#[derive(Debug, Clone)]
pub struct Z3Solver {
    path: PathBuf,
}

impl Default for Z3Solver {
    fn default() -> Self {
        Self::new()
    }
}

impl Z3Solver {
    /// Uses `z3` from `PATH`
    pub fn new() -> Self {
        Self::with_path("z3")
    }

    /// Uses a specific binary
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Whether the binary can be started
    pub fn is_available(&self) -> bool {
        Command::new(&self.path)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

impl Solver for Z3Solver {
    fn check_sat(&self, query: &SmtQuery, timeout: Duration) -> Result<SatResult> {
        let mut child = Command::new(&self.path)
            .arg("-in")
            .arg(format!("-t:{}", timeout.as_millis().max(1)))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::SolverUnavailable(format!("{} not found", self.path.display()))
                } else {
                    Error::solver(format!("Failed to start {}: {}", self.path.display(), e))
                }
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(query.to_smtlib().as_bytes())
                .map_err(|e| Error::solver(format!("Failed to send query: {}", e)))?;
        }

        let deadline = Instant::now() + timeout + KILL_GRACE;
        loop {
            match child.try_wait() {
                Ok(Some(_)) => break,
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    tracing::warn!("z3 killed after exceeding {:?}", timeout);
                    return Err(Error::SolverTimeout(timeout));
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => return Err(Error::solver(format!("Failed to wait for z3: {}", e))),
            }
        }

        let mut stdout = String::new();
        if let Some(mut out) = child.stdout.take() {
            out.read_to_string(&mut stdout)
                .map_err(|e| Error::solver(format!("Failed to read z3 output: {}", e)))?;
        }
        parse_output(&stdout)
    }
}

/// Reads the answer of a single `(check-sat)`
fn parse_output(stdout: &str) -> Result<SatResult> {
    if let Some(caps) = ERROR_LINE.captures(stdout) {
        return Err(Error::solver(caps[1].to_string()));
    }
    match stdout.lines().map(str::trim).find(|l| !l.is_empty()) {
        Some("sat") => Ok(SatResult::Sat),
        Some("unsat") => Ok(SatResult::Unsat),
        Some("unknown") | Some("timeout") => Ok(SatResult::Unknown),
        Some(other) => Err(Error::solver(format!("Unexpected z3 output: {}", other))),
        None => Err(Error::solver("z3 produced no output")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_answers() {
        assert_eq!(parse_output("sat\n").unwrap(), SatResult::Sat);
        assert_eq!(parse_output("\nunsat\n").unwrap(), SatResult::Unsat);
        assert_eq!(parse_output("unknown\n").unwrap(), SatResult::Unknown);
    }

    #[test]
    fn test_parse_error_line() {
        let err = parse_output("(error \"line 3 column 10: unknown constant y\")\nsat\n").unwrap_err();
        assert!(matches!(err, Error::SolverError { message } if message.contains("unknown constant")));
    }

    #[test]
    fn test_missing_binary_is_unavailable() {
        let solver = Z3Solver::with_path("/nonexistent/z3-binary");
        assert!(!solver.is_available());
        let err = solver
            .check_sat(&SmtQuery::new(), Duration::from_millis(100))
            .unwrap_err();
        assert!(err.is_inconclusive());
    }
}
