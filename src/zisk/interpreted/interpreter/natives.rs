use std::fmt;
use std::fmt::{Debug, Formatter};

use option_ext::OptionExt;

use crate::zisk::common::error::ErrorInfo;
use crate::zisk::interpreted::interpreter::Interpreter;
use crate::zisk::interpreted::interpreter::result::{InterpretResult, RuntimeError};
use crate::zisk::interpreted::interpreter::value::ZiskValue;

type NativeFn = fn(&mut Interpreter, Vec<ZiskValue>, &ErrorInfo) -> InterpretResult<ZiskValue>;

// Natives are plain function pointers; the ones doing IO reach the streams through the interpreter.
#[derive(Clone, Copy)]
pub struct NativeFunction {
    pub name: &'static str,
    pub min_arity: usize,
    // `None` for variadic natives.
    pub max_arity: Option<usize>,
    pub func: NativeFn,
}

impl Debug for NativeFunction {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "<nativa {}>", self.name)
    }
}

impl NativeFunction {
    pub fn call(
        &self, interpreter: &mut Interpreter, args: Vec<ZiskValue>, error_info: &ErrorInfo,
    ) -> InterpretResult<ZiskValue> {
        let too_many = self.max_arity.map_or2(|max| args.len() > max, false);
        if args.len() < self.min_arity || too_many {
            let expected = match self.max_arity {
                Some(max) if max == self.min_arity => max.to_string(),
                Some(max) => format!("entre {} y {}", self.min_arity, max),
                None => format!("al menos {}", self.min_arity),
            };
            return Err(RuntimeError::general(
                format!("La función '{}' espera {} argumento(s), pero recibió {}", self.name, expected, args.len()),
                *error_info,
            ));
        }
        (self.func)(interpreter, args, error_info)
    }
}

pub const NATIVES: [NativeFunction; 8] = [
    NativeFunction { name: "mostrar", min_arity: 0, max_arity: None, func: print },
    NativeFunction { name: "ingresar", min_arity: 0, max_arity: Some(1), func: input },
    NativeFunction { name: "longitud", min_arity: 1, max_arity: Some(1), func: length },
    NativeFunction { name: "tipo_de", min_arity: 1, max_arity: Some(1), func: type_of },
    NativeFunction { name: "convertir_a_entero", min_arity: 1, max_arity: Some(1), func: to_integer },
    NativeFunction { name: "convertir_a_decimal", min_arity: 1, max_arity: Some(1), func: to_decimal },
    NativeFunction { name: "convertir_a_texto", min_arity: 1, max_arity: Some(1), func: to_text },
    NativeFunction { name: "convertir_a_booleano", min_arity: 1, max_arity: Some(1), func: to_bool },
];

pub fn find(name: &str) -> Option<NativeFunction> {
    NATIVES.iter().find(|n| n.name == name).copied()
}

fn single(mut args: Vec<ZiskValue>) -> ZiskValue {
    args.pop().unwrap_or(ZiskValue::Null)
}

fn print(interpreter: &mut Interpreter, args: Vec<ZiskValue>, error_info: &ErrorInfo) -> InterpretResult<ZiskValue> {
    let line = args.iter().map(|a| a.stringify()).collect::<Vec<_>>().join(" ");
    interpreter.write_line(&line, error_info)?;
    Ok(ZiskValue::Null)
}

fn input(interpreter: &mut Interpreter, args: Vec<ZiskValue>, error_info: &ErrorInfo) -> InterpretResult<ZiskValue> {
    let prompt = args.first().map(|p| p.stringify());
    Ok(interpreter.read_line(prompt.as_deref(), error_info)?
        .map(ZiskValue::Text)
        .unwrap_or(ZiskValue::Null))
}

fn length(_: &mut Interpreter, args: Vec<ZiskValue>, error_info: &ErrorInfo) -> InterpretResult<ZiskValue> {
    let len = match single(args) {
        ZiskValue::Text(s) => s.chars().count(),
        ZiskValue::List(l) => l.borrow().len(),
        ZiskValue::Object(o) => o.borrow().len(),
        other => return Err(RuntimeError::general(
            format!("longitud() no admite valores de tipo '{}'", other.type_name()),
            *error_info,
        )),
    };
    Ok(ZiskValue::Integer(len as i64))
}

fn type_of(interpreter: &mut Interpreter, args: Vec<ZiskValue>, _: &ErrorInfo) -> InterpretResult<ZiskValue> {
    let name = interpreter.type_system().borrow().infer_type(&single(args));
    Ok(ZiskValue::Text(name))
}

fn conversion_error(value: &ZiskValue, target: &str, error_info: &ErrorInfo) -> RuntimeError {
    RuntimeError::general(format!("No se puede convertir {} a {}", value.repr(), target), *error_info)
}

fn to_integer(_: &mut Interpreter, args: Vec<ZiskValue>, error_info: &ErrorInfo) -> InterpretResult<ZiskValue> {
    let value = single(args);
    match &value {
        ZiskValue::Integer(i) => Ok(ZiskValue::Integer(*i)),
        ZiskValue::Bool(b) => Ok(ZiskValue::Integer(*b as i64)),
        ZiskValue::Decimal(d) if d.is_finite() && d.trunc().abs() < i64::MAX as f64 =>
            Ok(ZiskValue::Integer(d.trunc() as i64)),
        ZiskValue::Text(s) => s.trim().parse::<i64>()
            .map(ZiskValue::Integer)
            .map_err(|_| conversion_error(&value, "entero", error_info)),
        _ => Err(conversion_error(&value, "entero", error_info)),
    }
}

fn to_decimal(_: &mut Interpreter, args: Vec<ZiskValue>, error_info: &ErrorInfo) -> InterpretResult<ZiskValue> {
    let value = single(args);
    match &value {
        ZiskValue::Integer(i) => Ok(ZiskValue::Decimal(*i as f64)),
        ZiskValue::Decimal(d) => Ok(ZiskValue::Decimal(*d)),
        ZiskValue::Bool(b) => Ok(ZiskValue::Decimal(if *b { 1.0 } else { 0.0 })),
        ZiskValue::Text(s) => s.trim().parse::<f64>()
            .map(ZiskValue::Decimal)
            .map_err(|_| conversion_error(&value, "decimal", error_info)),
        _ => Err(conversion_error(&value, "decimal", error_info)),
    }
}

fn to_text(_: &mut Interpreter, args: Vec<ZiskValue>, _: &ErrorInfo) -> InterpretResult<ZiskValue> {
    Ok(ZiskValue::Text(single(args).stringify()))
}

fn to_bool(_: &mut Interpreter, args: Vec<ZiskValue>, _: &ErrorInfo) -> InterpretResult<ZiskValue> {
    Ok(ZiskValue::Bool(match single(args) {
        ZiskValue::Text(s) => !matches!(s.trim().to_lowercase().as_str(), "falso" | "false" | "0" | ""),
        other => other.truthiness(),
    }))
}

#[cfg(test)]
mod tests {
    use crate::zisk::common::error::{ErrorKind, ZiskError};

    use super::*;

    fn call(name: &str, args: Vec<ZiskValue>) -> InterpretResult<ZiskValue> {
        let mut interpreter = Interpreter::new();
        find(name).unwrap().call(&mut interpreter, args, &ErrorInfo::new(1, 1))
    }

    #[test]
    fn conversions() {
        assert_eq!(call("convertir_a_entero", vec![ZiskValue::text(" 42 ")]).unwrap(), ZiskValue::Integer(42));
        assert_eq!(call("convertir_a_entero", vec![ZiskValue::Decimal(-3.9)]).unwrap(), ZiskValue::Integer(-3));
        assert!(call("convertir_a_entero", vec![ZiskValue::text("3.5")]).is_err());
        assert_eq!(call("convertir_a_decimal", vec![ZiskValue::text("3.5")]).unwrap(), ZiskValue::Decimal(3.5));
        assert_eq!(call("convertir_a_texto", vec![ZiskValue::Bool(true)]).unwrap(), ZiskValue::text("verdadero"));
        assert_eq!(call("convertir_a_booleano", vec![ZiskValue::text("Falso")]).unwrap(), ZiskValue::Bool(false));
        assert_eq!(call("convertir_a_booleano", vec![ZiskValue::text("si")]).unwrap(), ZiskValue::Bool(true));
        assert_eq!(call("convertir_a_booleano", vec![ZiskValue::Integer(0)]).unwrap(), ZiskValue::Bool(false));
    }

    #[test]
    fn length_and_type() {
        assert_eq!(call("longitud", vec![ZiskValue::text("año")]).unwrap(), ZiskValue::Integer(3));
        assert_eq!(call("longitud", vec![ZiskValue::list(vec![ZiskValue::Null])]).unwrap(), ZiskValue::Integer(1));
        assert!(call("longitud", vec![ZiskValue::Integer(1)]).is_err());
        assert_eq!(call("tipo_de", vec![ZiskValue::Decimal(1.0)]).unwrap(), ZiskValue::text("decimal"));
    }

    #[test]
    fn arity() {
        let err = call("longitud", vec![]).unwrap_err();
        assert_eq!(err.get_kind(), ErrorKind::Runtime);
        assert!(call("ingresar", vec![ZiskValue::Null, ZiskValue::Null]).is_err());
        assert!(find("no_existe").is_none());
    }
}
