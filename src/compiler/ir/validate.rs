//! Normal-Form well-formedness checks

use super::instruction::{NfExpression, NfStatement};
use super::program::{NfFunction, NfModule};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// A broken Normal-Form guarantee
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NfViolation {
    /// Same label defined twice
    #[error("{function}: label '{label}' defined more than once")]
    DuplicateLabel { function: String, label: String },

    /// Jump to a label that does not exist
    #[error("{function}: jump to undefined label '{label}'")]
    UndefinedLabel { function: String, label: String },

    /// Label nothing jumps to
    #[error("{function}: label '{label}' is never referenced")]
    UnreferencedLabel { function: String, label: String },

    /// Compound expression where an atom is required
    #[error("{function}: statement {index} is not in three-address form")]
    NotThreeAddress { function: String, index: usize },
}

/// Checks every function of a module
pub fn validate_module(module: &NfModule) -> Vec<NfViolation> {
    module.functions.iter().flat_map(validate_function).collect()
}

/// Checks label uniqueness and closure plus three-address form
///
/// Statements are numbered in [`NfFunction::walk`] order.
pub fn validate_function(function: &NfFunction) -> Vec<NfViolation> {
    let mut violations = Vec::new();
    let mut defined: HashMap<&str, usize> = HashMap::new();
    let mut referenced: HashSet<&str> = HashSet::new();

    for (index, stmt) in function.all_statements().into_iter().enumerate() {
        if let NfStatement::Label(name) = stmt {
            *defined.entry(name.as_str()).or_insert(0) += 1;
        }
        referenced.extend(stmt.jump_targets());

        if !is_three_address(stmt) {
            violations.push(NfViolation::NotThreeAddress {
                function: function.name.clone(),
                index,
            });
        }
    }

    let mut duplicates: Vec<&str> = defined
        .iter()
        .filter(|(_, count)| **count > 1)
        .map(|(label, _)| *label)
        .collect();
    duplicates.sort_unstable();
    violations.extend(duplicates.into_iter().map(|label| NfViolation::DuplicateLabel {
        function: function.name.clone(),
        label: label.to_string(),
    }));

    let mut undefined: Vec<&str> = referenced
        .iter()
        .filter(|label| !defined.contains_key(*label))
        .copied()
        .collect();
    undefined.sort_unstable();
    violations.extend(undefined.into_iter().map(|label| NfViolation::UndefinedLabel {
        function: function.name.clone(),
        label: label.to_string(),
    }));

    let mut unreferenced: Vec<&str> = defined
        .keys()
        .filter(|label| !referenced.contains(*label))
        .copied()
        .collect();
    unreferenced.sort_unstable();
    violations.extend(
        unreferenced
            .into_iter()
            .map(|label| NfViolation::UnreferencedLabel {
                function: function.name.clone(),
                label: label.to_string(),
            }),
    );

    violations
}

fn is_three_address(stmt: &NfStatement) -> bool {
    match stmt {
        NfStatement::Assign { value, .. } => value.is_flat(),
        NfStatement::Branch { condition, .. } => condition.is_atomic(),
        NfStatement::Return(value) => value.as_ref().map_or(true, NfExpression::is_atomic),
        NfStatement::Throw(value) => value.is_atomic(),
        NfStatement::Goto(_) | NfStatement::Label(_) | NfStatement::Try { .. } => true,
    }
}
