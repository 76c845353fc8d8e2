use std::cmp::Ordering;

use crate::zisk::common::error::ErrorInfo;
use crate::zisk::interpreted::ast::{BinaryOperator, UnaryOperator};
use crate::zisk::interpreted::interpreter::result::{binary_type_error, InterpretResult, RuntimeError, unary_type_error};
use crate::zisk::interpreted::interpreter::value::ZiskValue;
use crate::zisk::interpreted::interpreter::value::ZiskValue::{Bool, Decimal, Integer, Text};

// Upper bound on the length of a text built by `*`.
const MAX_REPEATED_TEXT: usize = 1 << 26;

/// `+ - * / %`. `/` always produces a decimal; `%` takes the sign of the divisor.
pub fn arithmetic(
    op: BinaryOperator, v1: &ZiskValue, v2: &ZiskValue, error_info: &ErrorInfo,
) -> InterpretResult<ZiskValue> {
    let overflow = || RuntimeError::general("Desbordamiento de entero", *error_info);
    match (op, v1, v2) {
        (BinaryOperator::Plus, Text(s1), Text(s2)) => Ok(Text(format!("{}{}", s1, s2))),
        (BinaryOperator::Mult, Text(s), Integer(n)) | (BinaryOperator::Mult, Integer(n), Text(s)) =>
            repeat(s, *n, error_info),
        (BinaryOperator::Div, _, divisor) if v1.is_numeric() && is_zero(divisor) =>
            Err(RuntimeError::general("División por cero", *error_info)),
        (BinaryOperator::Mod, _, divisor) if v1.is_numeric() && is_zero(divisor) =>
            Err(RuntimeError::general("Módulo por cero", *error_info)),
        (op, Integer(i1), Integer(i2)) => match op {
            BinaryOperator::Plus => i1.checked_add(*i2).map(Integer).ok_or_else(overflow),
            BinaryOperator::Minus => i1.checked_sub(*i2).map(Integer).ok_or_else(overflow),
            BinaryOperator::Mult => i1.checked_mul(*i2).map(Integer).ok_or_else(overflow),
            BinaryOperator::Div => Ok(Decimal(*i1 as f64 / *i2 as f64)),
            BinaryOperator::Mod => i1.checked_rem(*i2)
                .map(|r| if r != 0 && (r < 0) != (*i2 < 0) { r + i2 } else { r })
                .map(Integer)
                .ok_or_else(overflow),
            _ => binary_type_error(&op, v1, v2, error_info),
        },
        (op, n1, n2) if n1.is_numeric() && n2.is_numeric() => {
            let (d1, d2) = (n1.as_decimal().unwrap_or_default(), n2.as_decimal().unwrap_or_default());
            match op {
                BinaryOperator::Plus => Ok(Decimal(d1 + d2)),
                BinaryOperator::Minus => Ok(Decimal(d1 - d2)),
                BinaryOperator::Mult => Ok(Decimal(d1 * d2)),
                BinaryOperator::Div => Ok(Decimal(d1 / d2)),
                BinaryOperator::Mod => {
                    let r = d1 % d2;
                    Ok(Decimal(if r != 0.0 && (r < 0.0) != (d2 < 0.0) { r + d2 } else { r }))
                }
                _ => binary_type_error(&op, v1, v2, error_info),
            }
        }
        _ => binary_type_error(&op, v1, v2, error_info),
    }
}

fn is_zero(v: &ZiskValue) -> bool {
    match v {
        Integer(i) => *i == 0,
        Decimal(d) => *d == 0.0,
        _ => false,
    }
}

fn repeat(s: &str, n: i64, error_info: &ErrorInfo) -> InterpretResult<ZiskValue> {
    if n <= 0 {
        return Ok(Text(String::new()));
    }
    match s.len().checked_mul(n as usize) {
        Some(len) if len <= MAX_REPEATED_TEXT => Ok(Text(s.repeat(n as usize))),
        _ => Err(RuntimeError::general("El texto resultante es demasiado grande", *error_info)),
    }
}

/// `< <= > >=` on numbers, texts and booleans.
pub fn comparison(
    op: BinaryOperator, v1: &ZiskValue, v2: &ZiskValue, error_info: &ErrorInfo,
) -> InterpretResult<ZiskValue> {
    let ordering = match (v1, v2) {
        (Integer(i1), Integer(i2)) => Some(i1.cmp(i2)),
        (n1, n2) if n1.is_numeric() && n2.is_numeric() =>
            n1.as_decimal().partial_cmp(&n2.as_decimal()),
        (Text(s1), Text(s2)) => Some(s1.cmp(s2)),
        (Bool(b1), Bool(b2)) => Some(b1.cmp(b2)),
        _ => return binary_type_error(&op, v1, v2, error_info),
    };
    // NaN compares false every way.
    let result = match ordering {
        None => false,
        Some(ordering) => match op {
            BinaryOperator::Less => ordering == Ordering::Less,
            BinaryOperator::LessEqual => ordering != Ordering::Greater,
            BinaryOperator::Greater => ordering == Ordering::Greater,
            BinaryOperator::GreaterEqual => ordering != Ordering::Less,
            _ => return binary_type_error(&op, v1, v2, error_info),
        },
    };
    Ok(Bool(result))
}

/// Every binary operator except the short-circuiting `&&` and `||`.
pub fn binary(
    op: BinaryOperator, v1: &ZiskValue, v2: &ZiskValue, error_info: &ErrorInfo,
) -> InterpretResult<ZiskValue> {
    match op {
        BinaryOperator::EqualEqual => Ok(Bool(v1.equals(v2))),
        BinaryOperator::BangEqual => Ok(Bool(!v1.equals(v2))),
        BinaryOperator::Less | BinaryOperator::LessEqual | BinaryOperator::Greater
        | BinaryOperator::GreaterEqual => comparison(op, v1, v2, error_info),
        BinaryOperator::And | BinaryOperator::Or => binary_type_error(&op, v1, v2, error_info),
        _ => arithmetic(op, v1, v2, error_info),
    }
}

pub fn unary(op: UnaryOperator, v: &ZiskValue, error_info: &ErrorInfo) -> InterpretResult<ZiskValue> {
    match (op, v) {
        (UnaryOperator::Bang, v) => Ok(Bool(!v.truthiness())),
        (UnaryOperator::Minus, Integer(i)) =>
            i.checked_neg().map(Integer).ok_or_else(|| RuntimeError::general("Desbordamiento de entero", *error_info)),
        (UnaryOperator::Minus, Decimal(d)) => Ok(Decimal(-d)),
        (op, v) => unary_type_error(&op, v, error_info),
    }
}

#[cfg(test)]
mod tests {
    use crate::zisk::common::error::{ErrorKind, ZiskError};

    use super::*;

    fn eval(op: BinaryOperator, v1: ZiskValue, v2: ZiskValue) -> InterpretResult<ZiskValue> {
        binary(op, &v1, &v2, &ErrorInfo::new(1, 1))
    }

    #[test]
    fn integer_arithmetic() {
        assert_eq!(eval(BinaryOperator::Plus, Integer(2), Integer(3)).unwrap(), Integer(5));
        assert_eq!(eval(BinaryOperator::Mult, Integer(-2), Integer(3)).unwrap(), Integer(-6));
        assert!(matches!(eval(BinaryOperator::Div, Integer(7), Integer(2)).unwrap(), Decimal(d) if d == 3.5));
        assert!(matches!(eval(BinaryOperator::Div, Integer(4), Integer(2)).unwrap(), Decimal(d) if d == 2.0));
    }

    #[test]
    fn modulo_follows_divisor_sign() {
        assert!(matches!(eval(BinaryOperator::Mod, Integer(-7), Integer(3)).unwrap(), Integer(2)));
        assert!(matches!(eval(BinaryOperator::Mod, Integer(7), Integer(-3)).unwrap(), Integer(-2)));
        assert!(matches!(eval(BinaryOperator::Mod, Integer(7), Integer(3)).unwrap(), Integer(1)));
        assert!(matches!(eval(BinaryOperator::Mod, Decimal(-7.5), Integer(2)).unwrap(), Decimal(d) if d == 0.5));
    }

    #[test]
    fn mixed_numbers_widen() {
        assert!(matches!(eval(BinaryOperator::Plus, Integer(1), Decimal(0.5)).unwrap(), Decimal(d) if d == 1.5));
        assert_eq!(eval(BinaryOperator::Less, Integer(1), Decimal(1.5)).unwrap(), Bool(true));
    }

    #[test]
    fn division_by_zero() {
        for (op, divisor) in [(BinaryOperator::Div, Integer(0)), (BinaryOperator::Mod, Decimal(0.0))] {
            let err = eval(op, Integer(5), divisor).unwrap_err();
            assert_eq!(err.get_kind(), ErrorKind::Runtime);
        }
    }

    #[test]
    fn texts() {
        assert_eq!(eval(BinaryOperator::Plus, Text("ab".into()), Text("cd".into())).unwrap(), Text("abcd".into()));
        assert_eq!(eval(BinaryOperator::Mult, Integer(3), Text("ab".into())).unwrap(), Text("ababab".into()));
        assert_eq!(eval(BinaryOperator::Mult, Text("ab".into()), Integer(-1)).unwrap(), Text("".into()));
        assert_eq!(eval(BinaryOperator::Less, Text("a".into()), Text("b".into())).unwrap(), Bool(true));
        assert!(eval(BinaryOperator::Plus, Text("a".into()), Integer(1)).is_err());
        assert!(eval(BinaryOperator::Minus, Text("a".into()), Text("b".into())).is_err());
    }

    #[test]
    fn overflow_is_an_error() {
        assert!(eval(BinaryOperator::Plus, Integer(i64::MAX), Integer(1)).is_err());
        assert!(unary(UnaryOperator::Minus, &Integer(i64::MIN), &ErrorInfo::default()).is_err());
    }

    #[test]
    fn equality_never_fails() {
        assert_eq!(eval(BinaryOperator::EqualEqual, Text("1".into()), Integer(1)).unwrap(), Bool(false));
        assert_eq!(eval(BinaryOperator::BangEqual, ZiskValue::Null, Bool(false)).unwrap(), Bool(true));
        assert!(eval(BinaryOperator::Less, ZiskValue::Null, Integer(1)).is_err());
    }

    #[test]
    fn unary_operators() {
        let info = ErrorInfo::default();
        assert_eq!(unary(UnaryOperator::Bang, &ZiskValue::Null, &info).unwrap(), Bool(true));
        assert_eq!(unary(UnaryOperator::Minus, &Integer(3), &info).unwrap(), Integer(-3));
        assert!(unary(UnaryOperator::Minus, &Text("x".into()), &info).is_err());
    }
}
