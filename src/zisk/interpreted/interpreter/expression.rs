use indexmap::IndexMap;
use tracing::trace;

use crate::zisk::common::error::{ErrorInfo, ZiskError};
use crate::zisk::common::utils::RcRc;
use crate::zisk::interpreted::ast::{AssignOperator, Atom, BinaryOperator, Expression, FunctionDef};
use crate::zisk::interpreted::interpreter::environment::Binding;
use crate::zisk::interpreted::interpreter::Interpreter;
use crate::zisk::interpreted::interpreter::natives;
use crate::zisk::interpreted::interpreter::operators;
use crate::zisk::interpreted::interpreter::result::{Flow, InterpretResult, RuntimeError};
use crate::zisk::interpreted::interpreter::value::{Instance, ZiskValue};
use crate::zisk::interpreted::types::TypeError;

impl Interpreter {
    pub(super) fn evaluate_expression(&mut self, expression: &Expression) -> InterpretResult<ZiskValue> {
        match expression {
            Expression::Atomic(atom, info) => self.evaluate_atom(atom, *info),
            Expression::List(elements, _) => self.evaluate_arguments(elements).map(ZiskValue::list),
            Expression::Object(entries, _) => {
                let mut fields = IndexMap::new();
                for (key, value) in entries {
                    let value = self.evaluate_expression(value)?;
                    fields.insert(key.to_owned(), value);
                }
                Ok(ZiskValue::object(fields))
            }
            Expression::Unary(op, e, info) => {
                let value = self.evaluate_expression(e)?;
                operators::unary(*op, &value, info)
            }
            // `&&` and `||` never evaluate their right operand once the left one decides.
            Expression::Binary(BinaryOperator::And, left, right, _) =>
                if self.evaluate_expression(left)?.truthiness() {
                    self.evaluate_expression(right)
                } else {
                    Ok(ZiskValue::Bool(false))
                },
            Expression::Binary(BinaryOperator::Or, left, right, _) =>
                if self.evaluate_expression(left)?.truthiness() {
                    Ok(ZiskValue::Bool(true))
                } else {
                    self.evaluate_expression(right)
                },
            Expression::Binary(op, left, right, info) => {
                let left = self.evaluate_expression(left)?;
                let right = self.evaluate_expression(right)?;
                operators::binary(*op, &left, &right, info)
            }
            Expression::Assign(op, target, value, info) => self.assign(*op, target, value, *info),
            Expression::Call(callee, args, info) => {
                let callee = self.evaluate_expression(callee)?;
                let args = self.evaluate_arguments(args)?;
                self.call_value(callee, args, *info)
            }
            Expression::NativeCall(name, args, info) => {
                let native = natives::find(name).ok_or_else(|| RuntimeError::general(
                    format!("Función nativa desconocida: '{}'", name),
                    *info,
                ))?;
                let args = self.evaluate_arguments(args)?;
                native.call(self, args, info)
            }
            Expression::Index(owner, index, info) => {
                let owner = self.evaluate_expression(owner)?;
                let index = self.evaluate_expression(index)?;
                get_index(&owner, &index, *info)
            }
            Expression::Property(owner, name, info) => {
                let owner = self.evaluate_expression(owner)?;
                self.get_property(&owner, name, *info)
            }
            Expression::New(class, args, info) => self.instantiate(class, args, *info),
        }
    }

    fn evaluate_atom(&self, atom: &Atom, info: ErrorInfo) -> InterpretResult<ZiskValue> {
        Ok(match atom {
            Atom::Identifier(name) => return self.lookup(name, info),
            Atom::Integer(i) => ZiskValue::Integer(*i),
            Atom::Decimal(d) => ZiskValue::Decimal(*d),
            Atom::Text(s) => ZiskValue::text(s.as_str()),
            Atom::True => ZiskValue::Bool(true),
            Atom::False => ZiskValue::Bool(false),
            Atom::Null => ZiskValue::Null,
            Atom::This => match &self.receiver {
                Some(instance) => ZiskValue::Instance(instance.clone()),
                None => return Err(RuntimeError::general(
                    "'este' solo puede usarse dentro de un método de instancia",
                    info,
                )),
            },
        })
    }

    pub(super) fn evaluate_arguments(&mut self, args: &[Expression]) -> InterpretResult<Vec<ZiskValue>> {
        args.iter().map(|e| self.evaluate_expression(e)).collect()
    }

    /// Variables from the innermost scope outwards, then functions, classes and natives.
    pub(super) fn resolve_name(&self, name: &str) -> Option<ZiskValue> {
        self.environment.get(name).map(|b| b.value.clone())
            .or_else(|| self.functions.get(name).map(|def| ZiskValue::function(def.clone())))
            .or_else(|| self.classes.get(name).map(|class| ZiskValue::Class(class.clone())))
            .or_else(|| natives::find(name).map(ZiskValue::Native))
    }

    fn lookup(&self, name: &str, info: ErrorInfo) -> InterpretResult<ZiskValue> {
        self.resolve_name(name)
            .ok_or_else(|| RuntimeError::general(format!("Variable no definida: '{}'", name), info))
    }

    // Targets are evaluated left to right, then the current value (for compound operators), then
    // the right-hand side. Nothing is written if the computation fails.
    fn assign(
        &mut self, op: AssignOperator, target: &Expression, value: &Expression, info: ErrorInfo,
    ) -> InterpretResult<ZiskValue> {
        match target {
            Expression::Atomic(Atom::Identifier(name), _) => {
                let current = match op.binary() {
                    Some(_) => Some(self.lookup(name, info)?),
                    None => None,
                };
                let rhs = self.evaluate_expression(value)?;
                let new_value = combine(op, current, rhs, &info)?;
                self.assign_variable(name, new_value.clone(), info)?;
                Ok(new_value)
            }
            Expression::Property(owner, name, _) => {
                let owner = self.evaluate_expression(owner)?;
                let current = match op.binary() {
                    Some(_) => Some(self.get_property(&owner, name, info)?),
                    None => None,
                };
                let rhs = self.evaluate_expression(value)?;
                let new_value = combine(op, current, rhs, &info)?;
                self.set_property(&owner, name, new_value.clone(), info)?;
                Ok(new_value)
            }
            Expression::Index(owner, index, _) => {
                let owner = self.evaluate_expression(owner)?;
                let index = self.evaluate_expression(index)?;
                let current = match op.binary() {
                    Some(_) => Some(get_index(&owner, &index, info)?),
                    None => None,
                };
                let rhs = self.evaluate_expression(value)?;
                let new_value = combine(op, current, rhs, &info)?;
                set_index(&owner, &index, new_value.clone(), info)?;
                Ok(new_value)
            }
            other => Err(RuntimeError::general(
                format!("Objetivo de asignación no válido: {}", other.pretty_print()),
                info,
            )),
        }
    }

    fn assign_variable(&mut self, name: &str, value: ZiskValue, info: ErrorInfo) -> InterpretResult<()> {
        let binding: &mut Binding = self.environment.get_mut(name)
            .ok_or_else(|| RuntimeError::general(format!("Variable no definida: '{}'", name), info))?;
        if binding.is_const {
            return Err(RuntimeError::general(format!("No se puede reasignar la constante '{}'", name), info));
        }
        self.type_system.borrow().validate_assignment(
            &format!("la variable '{}'", name),
            &value,
            binding.declared_type.as_deref(),
            info,
        )?;
        binding.value = value;
        Ok(())
    }

    pub(super) fn get_property(&self, owner: &ZiskValue, name: &str, info: ErrorInfo) -> InterpretResult<ZiskValue> {
        match owner {
            ZiskValue::Instance(instance) => self.instance_member(instance, name, info),
            ZiskValue::Class(class) => self.class_member(class, name, info),
            ZiskValue::Module(module) => self.module_member(module, name, info),
            ZiskValue::Object(fields) => fields.borrow().get(name).cloned().ok_or_else(|| RuntimeError::attribute(
                format!("El objeto no tiene la propiedad '{}'", name),
                info,
            )),
            ZiskValue::Error(err) => match name {
                "mensaje" => Ok(ZiskValue::Text(err.get_message())),
                "linea" => Ok(ZiskValue::Integer(err.get_info().line as i64)),
                "columna" => Ok(ZiskValue::Integer(err.get_info().column as i64)),
                "tipo" => Ok(ZiskValue::text(err.get_kind().name())),
                _ => Err(RuntimeError::attribute(format!("El error no tiene la propiedad '{}'", name), info)),
            },
            other => Err(RuntimeError::attribute(
                format!(
                    "Un valor de tipo '{}' no tiene la propiedad '{}'",
                    self.type_system.borrow().infer_type(other),
                    name,
                ),
                info,
            )),
        }
    }

    fn set_property(&self, owner: &ZiskValue, name: &str, value: ZiskValue, info: ErrorInfo) -> InterpretResult<()> {
        match owner {
            ZiskValue::Instance(instance) => self.set_field(instance, name, value, info),
            ZiskValue::Class(class) => self.set_static(class, name, value, info),
            ZiskValue::Object(fields) => {
                fields.borrow_mut().insert(name.to_owned(), value);
                Ok(())
            }
            other => Err(RuntimeError::attribute(
                format!("No se puede asignar la propiedad '{}' a un valor de tipo '{}'", name, other.type_name()),
                info,
            )),
        }
    }

    pub(super) fn call_value(
        &mut self, callee: ZiskValue, args: Vec<ZiskValue>, info: ErrorInfo,
    ) -> InterpretResult<ZiskValue> {
        match callee {
            ZiskValue::Function { def, home: None } => self.call_function(&def, args, info),
            ZiskValue::Function { def, home: Some(module) } => {
                let mut interpreter = module.interpreter.try_borrow_mut().map_err(|_| RuntimeError::general(
                    format!("El módulo '{}' ya está en ejecución", module.name),
                    info,
                ))?;
                interpreter.call_function(&def, args, info)
            }
            ZiskValue::Method { receiver, method } => self.call_method(receiver, &method, args, info),
            ZiskValue::Native(native) => native.call(self, args, &info),
            ZiskValue::Class(class) => self.construct(&class, args, info),
            other => Err(RuntimeError::general(
                format!("Un valor de tipo '{}' no es invocable", other.type_name()),
                info,
            )),
        }
    }

    fn call_function(&mut self, def: &FunctionDef, args: Vec<ZiskValue>, info: ErrorInfo) -> InterpretResult<ZiskValue> {
        self.type_system.borrow().validate_function_call(&def.name, &args, &def.params, info)?;
        self.invoke(def, &def.name, args, None, info)
    }

    /// Runs a body in a fresh call frame. Arguments must already be validated. The caller's local
    /// scopes, receiver and loop nesting are restored on every path.
    pub(super) fn invoke(
        &mut self,
        def: &FunctionDef,
        display_name: &str,
        args: Vec<ZiskValue>,
        receiver: Option<RcRc<Instance>>,
        info: ErrorInfo,
    ) -> InterpretResult<ZiskValue> {
        if self.function_depth >= self.config.max_call_depth {
            return Err(RuntimeError::general(
                format!("Se excedió la profundidad máxima de llamadas ({})", self.config.max_call_depth),
                info,
            ));
        }
        if self.stack.used() > self.config.max_stack_bytes {
            return Err(RuntimeError::general(
                format!("Se agotó la pila de ejecución tras {} llamadas anidadas", self.function_depth),
                info,
            ));
        }
        let saved_scopes = self.environment.enter_call();
        for (param, arg) in def.params.iter().zip(args) {
            self.environment.declare(param.name.to_owned(), Binding::var(arg, param.declared_type.clone()));
        }
        let saved_receiver = std::mem::replace(&mut self.receiver, receiver);
        let saved_loops = std::mem::replace(&mut self.loop_depth, 0);
        self.function_depth += 1;
        trace!(function = display_name, depth = self.function_depth, "call");

        let result = self.execute_statements(&def.body);

        self.function_depth -= 1;
        self.loop_depth = saved_loops;
        self.receiver = saved_receiver;
        self.environment.exit_call(saved_scopes);

        let value = match result? {
            Flow::Return(value) => value,
            _ => ZiskValue::Null,
        };
        self.type_system.borrow().validate_assignment(
            &format!("el retorno de '{}'", display_name),
            &value,
            def.return_type.as_deref(),
            info,
        )?;
        Ok(value)
    }
}

fn combine(
    op: AssignOperator, current: Option<ZiskValue>, rhs: ZiskValue, info: &ErrorInfo,
) -> InterpretResult<ZiskValue> {
    match (op.binary(), current) {
        (Some(binary), Some(current)) => operators::arithmetic(binary, &current, &rhs, info),
        _ => Ok(rhs),
    }
}

fn checked_index(index: &ZiskValue, len: usize, kind: &str, info: ErrorInfo) -> InterpretResult<usize> {
    match index {
        ZiskValue::Integer(i) if *i >= 0 && (*i as usize) < len => Ok(*i as usize),
        ZiskValue::Integer(i) => Err(RuntimeError::index(
            format!("Índice {} fuera de rango para {} de tamaño {}", i, kind, len),
            info,
        )),
        other => Err(TypeError::new(
            format!("El índice de {} debe ser entero, no '{}'", kind, other.type_name()),
            info,
        ).into()),
    }
}

// Object keys are texts; any other index is converted with its display form.
fn get_index(owner: &ZiskValue, index: &ZiskValue, info: ErrorInfo) -> InterpretResult<ZiskValue> {
    match owner {
        ZiskValue::List(list) => {
            let list = list.borrow();
            let i = checked_index(index, list.len(), "lista", info)?;
            Ok(list[i].clone())
        }
        ZiskValue::Text(text) => {
            let chars = text.chars().collect::<Vec<_>>();
            let i = checked_index(index, chars.len(), "texto", info)?;
            Ok(ZiskValue::Text(chars[i].to_string()))
        }
        ZiskValue::Object(fields) => {
            let key = index.stringify();
            let value = fields.borrow().get(&key).cloned();
            value.ok_or_else(|| RuntimeError::key(format!("Clave '{}' no encontrada en el objeto", key), info))
        }
        other => Err(TypeError::new(
            format!("El tipo '{}' no admite acceso por índice '[]'", other.type_name()),
            info,
        ).into()),
    }
}

/// Writing exactly one past the end of a list appends.
fn set_index(owner: &ZiskValue, index: &ZiskValue, value: ZiskValue, info: ErrorInfo) -> InterpretResult<()> {
    match owner {
        ZiskValue::List(list) => {
            let mut list = list.borrow_mut();
            if matches!(index, ZiskValue::Integer(i) if *i >= 0 && *i as usize == list.len()) {
                list.push(value);
                return Ok(());
            }
            let i = checked_index(index, list.len(), "lista", info)?;
            list[i] = value;
            Ok(())
        }
        ZiskValue::Object(fields) => {
            fields.borrow_mut().insert(index.stringify(), value);
            Ok(())
        }
        other => Err(TypeError::new(
            format!("El tipo '{}' no admite asignación por índice '[]'", other.type_name()),
            info,
        ).into()),
    }
}
