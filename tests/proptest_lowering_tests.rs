//! Property-based tests for Normal-Form lowering
//!
//! Random expression trees are lowered and checked for:
//! 1. Three-address form and label closure
//! 2. Left-to-right operand evaluation order
//! 3. Deterministic output
//! 4. The binder and analyses never panic on the same trees

use calor::analysis::{VerificationAnalysisPass, VerificationOptions};
use calor::ast::{BinaryOp, ElseIfClause, Expression, Function, Module, Statement, UnaryOp};
use calor::binder::Binder;
use calor::compiler::ir::{validate_function, CnfLowering, NfExpression, NfStatement};
use calor::diagnostics::Span;
use calor::diagnostics::DiagnosticBag;
use proptest::prelude::*;

// =============================================================================
// STRATEGY GENERATORS
// =============================================================================

fn binary_op() -> impl Strategy<Value = BinaryOp> {
    prop_oneof![
        Just(BinaryOp::Add),
        Just(BinaryOp::Sub),
        Just(BinaryOp::Mul),
        Just(BinaryOp::Div),
        Just(BinaryOp::Lt),
        Just(BinaryOp::Eq),
        Just(BinaryOp::And),
        Just(BinaryOp::Or),
        Just(BinaryOp::BitXor),
    ]
}

fn leaf() -> impl Strategy<Value = Expression> {
    prop_oneof![
        (-100i32..100).prop_map(Expression::int),
        any::<bool>().prop_map(Expression::bool),
        prop_oneof![Just("a"), Just("b"), Just("c")].prop_map(|name| Expression::var(name)),
    ]
}

fn expression() -> impl Strategy<Value = Expression> {
    leaf().prop_recursive(4, 32, 3, |inner| {
        prop_oneof![
            (binary_op(), inner.clone(), inner.clone())
                .prop_map(|(op, l, r)| Expression::binary(op, l, r)),
            inner.clone().prop_map(|e| Expression::unary(UnaryOp::Neg, e)),
            (inner.clone(), inner.clone(), inner.clone())
                .prop_map(|(c, t, e)| Expression::conditional(c, t, e)),
            prop::collection::vec(inner.clone(), 0..3)
                .prop_map(|args| Expression::call("Helper", args)),
            inner.prop_map(|e| Expression::Some(Box::new(e))),
        ]
    })
}

fn statement() -> impl Strategy<Value = Statement> {
    prop_oneof![
        expression().prop_map(|e| Statement::assign("a", e)),
        expression().prop_map(|e| Statement::expr(Expression::call("Log", vec![e]))),
        (expression(), expression()).prop_map(|(c, e)| Statement::if_else(
            c,
            vec![Statement::assign("b", e)],
            Some(vec![Statement::assign("c", Expression::int(0))]),
        )),
        (
            expression(),
            prop::collection::vec((expression(), expression()), 1..4),
            any::<bool>(),
        )
            .prop_map(|(c, arms, has_else)| Statement::If {
                condition: c,
                then_body: vec![Statement::assign("b", Expression::int(1))],
                else_ifs: arms
                    .into_iter()
                    .map(|(condition, e)| ElseIfClause {
                        condition,
                        body: vec![Statement::assign("a", e)],
                        span: Span::default(),
                    })
                    .collect(),
                else_body: if has_else {
                    Some(vec![Statement::assign("c", Expression::bool(false))])
                } else {
                    None
                },
                span: Span::default(),
            }),
        (expression(), expression())
            .prop_map(|(c, e)| Statement::while_loop(c, vec![Statement::assign("a", e)])),
    ]
}

fn function_with(body: Vec<Statement>) -> Function {
    Function::new("f", "f")
        .param("a", "i32")
        .param("b", "i32")
        .param("c", "bool")
        .returns("i32")
        .body(body)
}

/// Position of the first call to `target` in the lowered body
fn call_position(body: &[NfStatement], target: &str) -> Option<usize> {
    body.iter().position(|s| {
        matches!(
            s,
            NfStatement::Assign { value: NfExpression::Call { target: t, .. }, .. } if t == target
        )
    })
}

// =============================================================================
// PROPERTIES
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// Every lowered function passes the shape checks
    #[test]
    fn lowered_functions_are_well_formed(body in prop::collection::vec(statement(), 0..6)) {
        let nf = CnfLowering::new().lower_function(&function_with(body));
        let violations = validate_function(&nf);
        prop_assert!(violations.is_empty(), "violations: {:?}\n{}", violations, nf);
    }

    /// Left operand statements come strictly before right operand statements
    #[test]
    fn left_operand_is_lowered_first(left in expression(), right in expression()) {
        let expr = Expression::binary(
            BinaryOp::Add,
            Expression::call("Left", vec![left]),
            Expression::call("Right", vec![right]),
        );
        let nf = CnfLowering::new().lower_function(&function_with(vec![Statement::ret(Some(expr))]));
        let l = call_position(&nf.body, "Left");
        let r = call_position(&nf.body, "Right");
        prop_assert!(l.is_some() && r.is_some());
        prop_assert!(l < r);
    }

    /// Lowering the same tree twice gives the same Normal Form
    #[test]
    fn lowering_is_deterministic(body in prop::collection::vec(statement(), 0..6)) {
        let f = function_with(body);
        let first = CnfLowering::new().lower_function(&f);
        let second = CnfLowering::new().lower_function(&f);
        prop_assert_eq!(first, second);
    }

    /// Binding and every analysis handle arbitrary bodies
    #[test]
    fn analyses_never_panic(body in prop::collection::vec(statement(), 0..6)) {
        let module = Module::new("m", "m").with_function(function_with(body));
        let bag = DiagnosticBag::new();
        let bound = Binder::new(&bag).bind_module(&module);
        let result = VerificationAnalysisPass::new(VerificationOptions::fast()).run(&bound, &bag);
        prop_assert_eq!(result.functions_analyzed, 1);
    }
}
