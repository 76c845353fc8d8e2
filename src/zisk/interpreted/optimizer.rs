use tracing::trace;

use crate::zisk::common::error::ErrorInfo;
use crate::zisk::interpreted::ast::{
    Atom, BinaryOperator, CatchClause, ClassDef, ClassMember, Expression, FunctionDef, Program, Statement,
    UnaryOperator,
};
use crate::zisk::interpreted::interpreter::operators;
use crate::zisk::interpreted::interpreter::value::ZiskValue;

/// Constant folding and removal of statically dead branches. Every fold goes through the same
/// arithmetic the interpreter uses, and an operation that would raise is left for run time.
pub fn optimize(program: Program) -> Program {
    Program::new(optimize_statements(program.statements))
}

fn optimize_statements(statements: Vec<Statement>) -> Vec<Statement> {
    statements.into_iter().filter_map(optimize_statement).collect()
}

// Positions that need a statement get an empty block when theirs is optimized away.
fn optimize_body(statement: Statement) -> Box<Statement> {
    Box::new(optimize_statement(statement).unwrap_or(Statement::Block(Vec::new())))
}

fn optimize_statement(statement: Statement) -> Option<Statement> {
    let result = match statement {
        Statement::Block(statements) => Statement::Block(optimize_statements(statements)),
        Statement::Variable { name, declared_type, value, error_info } =>
            Statement::Variable { name, declared_type, value: value.map(optimize_expression), error_info },
        Statement::Constant { name, declared_type, value, error_info } =>
            Statement::Constant { name, declared_type, value: optimize_expression(value), error_info },
        Statement::Function(def) => Statement::Function(optimize_function(def)),
        Statement::Class(class) => Statement::Class(optimize_class(class)),
        Statement::IfElse { cond, if_stmt, else_stmt } => match optimize_expression(cond) {
            Expression::Atomic(Atom::True, _) => {
                trace!("dropping unreachable else branch");
                return optimize_statement(*if_stmt);
            }
            Expression::Atomic(Atom::False, _) => {
                trace!("dropping unreachable then branch");
                return else_stmt.and_then(|e| optimize_statement(*e));
            }
            cond => Statement::IfElse {
                cond,
                if_stmt: optimize_body(*if_stmt),
                else_stmt: else_stmt.map(|e| optimize_body(*e)),
            },
        },
        Statement::While(cond, body) => match optimize_expression(cond) {
            Expression::Atomic(Atom::False, _) => {
                trace!("dropping loop that never runs");
                return None;
            }
            cond => Statement::While(cond, optimize_body(*body)),
        },
        Statement::DoWhile(body, cond) => Statement::DoWhile(optimize_body(*body), optimize_expression(cond)),
        Statement::For { init, cond, update, body } => Statement::For {
            init: init.and_then(|i| optimize_statement(*i)).map(Box::new),
            cond: cond.map(optimize_expression),
            update: update.map(optimize_expression),
            body: optimize_body(*body),
        },
        Statement::Try { body, catch, finally } => Statement::Try {
            body: optimize_statements(body),
            catch: catch.map(|c| CatchClause { name: c.name, body: optimize_statements(c.body) }),
            finally: finally.map(optimize_statements),
        },
        Statement::Return(value, error_info) => Statement::Return(value.map(optimize_expression), error_info),
        Statement::Expression(e) => Statement::Expression(optimize_expression(e)),
        s @ (Statement::Import { .. } | Statement::Break(_) | Statement::Continue(_)) => s,
    };
    Some(result)
}

fn optimize_function(def: FunctionDef) -> FunctionDef {
    FunctionDef { body: optimize_statements(def.body), ..def }
}

fn optimize_class(class: ClassDef) -> ClassDef {
    let members = class.members.into_iter().map(|member| match member {
        ClassMember::Field { name, declared_type, value, modifiers, error_info } =>
            ClassMember::Field { name, declared_type, value: value.map(optimize_expression), modifiers, error_info },
        ClassMember::Constant { name, declared_type, value, modifiers, error_info } =>
            ClassMember::Constant { name, declared_type, value: optimize_expression(value), modifiers, error_info },
        ClassMember::Method(def, modifiers) => ClassMember::Method(optimize_function(def), modifiers),
    }).collect();
    ClassDef { members, ..class }
}

fn optimize_expressions(expressions: Vec<Expression>) -> Vec<Expression> {
    expressions.into_iter().map(optimize_expression).collect()
}

fn optimize_expression(expression: Expression) -> Expression {
    match expression {
        Expression::Binary(op, e1, e2, info) =>
            fold_binary(op, optimize_expression(*e1), optimize_expression(*e2), info),
        Expression::Unary(op, e, info) => fold_unary(op, optimize_expression(*e), info),
        Expression::List(elements, info) => Expression::List(optimize_expressions(elements), info),
        Expression::Object(entries, info) =>
            Expression::Object(entries.into_iter().map(|(k, v)| (k, optimize_expression(v))).collect(), info),
        Expression::Assign(op, target, value, info) =>
            Expression::Assign(op, Box::new(optimize_expression(*target)), Box::new(optimize_expression(*value)), info),
        Expression::Call(callee, args, info) =>
            Expression::Call(Box::new(optimize_expression(*callee)), optimize_expressions(args), info),
        Expression::NativeCall(name, args, info) => Expression::NativeCall(name, optimize_expressions(args), info),
        Expression::Index(e, index, info) =>
            Expression::Index(Box::new(optimize_expression(*e)), Box::new(optimize_expression(*index)), info),
        Expression::Property(e, name, info) => Expression::Property(Box::new(optimize_expression(*e)), name, info),
        Expression::New(class, args, info) => Expression::New(class, optimize_expressions(args), info),
        e @ Expression::Atomic(..) => e,
    }
}

fn numeric_literal(expression: &Expression) -> Option<ZiskValue> {
    match expression {
        Expression::Atomic(Atom::Integer(i), _) => Some(ZiskValue::Integer(*i)),
        Expression::Atomic(Atom::Decimal(d), _) => Some(ZiskValue::Decimal(*d)),
        _ => None,
    }
}

fn to_literal(value: ZiskValue, info: ErrorInfo) -> Option<Expression> {
    match value {
        ZiskValue::Integer(i) => Some(Expression::integer(i, info)),
        ZiskValue::Decimal(d) if d.is_finite() => Some(Expression::decimal(d, info)),
        _ => None,
    }
}

fn fold_binary(op: BinaryOperator, e1: Expression, e2: Expression, info: ErrorInfo) -> Expression {
    if op.is_arithmetic() {
        if let (Some(v1), Some(v2)) = (numeric_literal(&e1), numeric_literal(&e2)) {
            let folded = operators::arithmetic(op, &v1, &v2, &info).ok().and_then(|v| to_literal(v, info));
            if let Some(folded) = folded {
                trace!(op = op.symbol(), "folded constant");
                return folded;
            }
        }
    }
    Expression::Binary(op, Box::new(e1), Box::new(e2), info)
}

fn fold_unary(op: UnaryOperator, e: Expression, info: ErrorInfo) -> Expression {
    if op == UnaryOperator::Minus {
        let folded = numeric_literal(&e)
            .and_then(|v| operators::unary(op, &v, &info).ok())
            .and_then(|v| to_literal(v, info));
        if let Some(folded) = folded {
            return folded;
        }
    }
    Expression::Unary(op, Box::new(e), info)
}

#[cfg(test)]
mod tests {
    use crate::zisk::interpreted::interpreter::Interpreter;
    use crate::zisk::interpreted::tests::unsafe_parse;

    use super::*;

    fn optimized(program: Vec<&str>) -> Vec<Statement> { optimize(unsafe_parse(program)).statements }

    fn optimized_expression(expression: &str) -> String {
        match optimized(vec![expression]).as_slice() {
            [Statement::Expression(e)] => e.pretty_print(),
            other => panic!("Expected a single expression, got {:?}", other),
        }
    }

    #[test]
    fn folds_numeric_literals() {
        assert_eq!(optimized_expression("1 + 2 * 3"), "7");
        assert_eq!(optimized_expression("7 / 2"), "3.5");
        assert_eq!(optimized_expression("-7 % 3"), "2");
        assert_eq!(optimized_expression("1.5 * 2"), "3.0");
        assert_eq!(optimized_expression("x + 2 * 3"), "(x + 6)");
    }

    #[test]
    fn leaves_failing_operations_for_run_time() {
        assert_eq!(optimized_expression("1 / 0"), "(1 / 0)");
        assert_eq!(optimized_expression("5 % (2 - 2)"), "(5 % 0)");
        assert_eq!(optimized_expression("9223372036854775807 + 1"), "(9223372036854775807 + 1)");
        assert_eq!(optimized_expression("\"a\" + \"b\""), "(\"a\" + \"b\")");
    }

    #[test]
    fn folding_matches_evaluation() {
        let expressions = vec![
            "1 + 2 - 3 * 4 / 5", "(10 - 3) * (2 + 0.5)", "-8 / 3 + 7 % -4", "100 / 7 * 7", "2 * 3.25 - -1",
        ];
        for expression in expressions {
            let (plain, _) = Interpreter::new().evaluate(expression, false).unwrap();
            let (folded, _) = Interpreter::new().evaluate(expression, true).unwrap();
            assert_eq!(plain, folded, "{}", expression);
        }
    }

    #[test]
    fn constant_conditions_pick_a_branch() {
        match optimized(vec!["si verdadero { mostrar(1) } sino { mostrar(2) }"]).as_slice() {
            [Statement::Block(body)] => assert_eq!(body.len(), 1),
            other => panic!("Unexpected {:?}", other),
        }
        match optimized(vec!["si (1 == 2) { mostrar(1) } sino { mostrar(2) }"]).as_slice() {
            [Statement::IfElse { .. }] => {}
            other => panic!("Unexpected {:?}", other),
        }
        assert!(optimized(vec!["si falso { mostrar(1) }"]).is_empty());
        assert_eq!(optimized(vec!["si falso { mostrar(1) } sino { mostrar(2) }"]).len(), 1);
    }

    #[test]
    fn removes_loops_that_never_run() {
        let statements = optimized(vec!["mientras falso { mostrar(1) }", "mostrar(2)"]);
        assert_eq!(statements.len(), 1);
        match optimized(vec!["mientras verdadero { si falso { mostrar(1) } sino mostrar(2) break }"]).as_slice() {
            [Statement::While(_, body)] => assert!(matches!(**body, Statement::Block(ref v) if v.len() == 2)),
            other => panic!("Unexpected {:?}", other),
        }
    }

    #[test]
    fn optimizes_function_and_method_bodies() {
        let statements = optimized(vec![
            "funcion f() { retorna 2 * 21 }",
            "clase A { var x = 1 + 1 funcion g() { si falso { retorna 0 } retorna 1 } }",
        ]);
        match &statements[0] {
            Statement::Function(def) => match def.body.as_slice() {
                [Statement::Return(Some(value), _)] => assert_eq!(value.pretty_print(), "42"),
                other => panic!("Unexpected {:?}", other),
            },
            other => panic!("Unexpected {:?}", other),
        }
        match &statements[1] {
            Statement::Class(class) => match class.members.as_slice() {
                [ClassMember::Field { value: Some(v), .. }, ClassMember::Method(def, _)] => {
                    assert_eq!(v.pretty_print(), "2");
                    assert_eq!(def.body.len(), 1);
                }
                other => panic!("Unexpected {:?}", other),
            },
            other => panic!("Unexpected {:?}", other),
        }
    }
}
