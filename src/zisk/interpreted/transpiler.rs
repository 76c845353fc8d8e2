use std::collections::HashSet;
use std::slice;

use crate::zisk::common::utils::{format_decimal, mk_string};
use crate::zisk::interpreted::ast::{
    Atom, BinaryOperator, ClassDef, ClassMember, Expression, FunctionDef, Program, Statement, UnaryOperator,
};
use crate::zisk::interpreted::interpreter::classes::CONSTRUCTOR;
use crate::zisk::interpreted::interpreter::modules::EXTENSION;

const INDENT: &str = "    ";

/// Renders a program as Python source. The output is for export only and is never run.
pub fn transpile(program: &Program) -> String {
    let mut transpiler = Transpiler::default();
    let blocks: Vec<String> = program.statements.iter()
        .map(|s| transpiler.statement(s))
        .filter(|s| !s.is_empty())
        .collect();
    blocks.join("\n\n")
}

#[derive(Default)]
struct Transpiler {
    depth: usize,
    imported: HashSet<String>,
}

impl Transpiler {
    fn pad(&self) -> String { INDENT.repeat(self.depth) }

    fn lines(&mut self, statements: &[Statement]) -> Vec<String> {
        statements.iter().map(|s| self.statement(s)).filter(|s| !s.is_empty()).collect()
    }

    // An indented suite; Python needs at least one statement in it.
    fn suite(&mut self, statements: &[Statement]) -> String {
        self.depth += 1;
        let lines = self.lines(statements);
        let suite = if lines.is_empty() { format!("{}pass", self.pad()) } else { lines.join("\n") };
        self.depth -= 1;
        suite
    }

    fn body(&mut self, statement: &Statement) -> String {
        match statement {
            Statement::Block(statements) => self.suite(statements),
            other => self.suite(slice::from_ref(other)),
        }
    }

    fn statement(&mut self, statement: &Statement) -> String {
        let pad = self.pad();
        match statement {
            Statement::Block(statements) => self.lines(statements).join("\n"),
            Statement::Variable { name, declared_type, value, .. } => {
                let value = value.as_ref().map(expression).unwrap_or_else(|| "None".to_owned());
                format!("{}{} = {}{}", pad, name, value, type_comment(declared_type))
            }
            Statement::Constant { name, declared_type, value, .. } =>
                format!("{}{} = {}{}", pad, name, expression(value), type_comment(declared_type)),
            Statement::Function(def) => self.function(def, None),
            Statement::Class(class) => self.class(class),
            Statement::Import { path, alias, .. } => {
                let module = path.strip_suffix(EXTENSION).unwrap_or(path).replace(['/', '\\'], ".");
                if !self.imported.insert(module.clone()) {
                    return String::new();
                }
                match alias {
                    Some(alias) => format!("{}import {} as {}", pad, module, alias),
                    None => format!("{}import {}", pad, module),
                }
            }
            Statement::IfElse { cond, if_stmt, else_stmt } => {
                let mut result = format!("{}if {}:\n{}", pad, expression(cond), self.body(if_stmt));
                if let Some(else_stmt) = else_stmt {
                    result.push_str(&format!("\n{}else:\n{}", pad, self.body(else_stmt)));
                }
                result
            }
            Statement::While(cond, body) => format!("{}while {}:\n{}", pad, expression(cond), self.body(body)),
            Statement::DoWhile(body, cond) => {
                let inner = format!("{}{}", pad, INDENT);
                format!(
                    "{}while True:\n{}\n{}if not ({}):\n{}{}break",
                    pad, self.body(body), inner, expression(cond), inner, INDENT,
                )
            }
            Statement::For { init, cond, update, body } => {
                let mut result = String::new();
                if let Some(init) = init {
                    let init = self.statement(init);
                    if !init.is_empty() {
                        result.push_str(&init);
                        result.push('\n');
                    }
                }
                let cond = cond.as_ref().map(expression).unwrap_or_else(|| "True".to_owned());
                let mut statements = match body.as_ref() {
                    Statement::Block(statements) => statements.clone(),
                    other => vec![other.clone()],
                };
                statements.extend(update.iter().cloned().map(Statement::Expression));
                result.push_str(&format!("{}while {}:\n{}", pad, cond, self.suite(&statements)));
                result
            }
            Statement::Try { body, catch, finally } => {
                let mut result = format!("{}try:\n{}", pad, self.suite(body));
                if let Some(catch) = catch {
                    result.push_str(&format!("\n{}except Exception as {}:\n{}", pad, catch.name, self.suite(&catch.body)));
                }
                if let Some(finally) = finally {
                    result.push_str(&format!("\n{}finally:\n{}", pad, self.suite(finally)));
                }
                result
            }
            Statement::Break(_) => format!("{}break", pad),
            Statement::Continue(_) => format!("{}continue", pad),
            Statement::Return(None, _) => format!("{}return", pad),
            Statement::Return(Some(value), _) => format!("{}return {}", pad, expression(value)),
            Statement::Expression(e) => format!("{}{}", pad, expression(e)),
        }
    }

    fn function(&mut self, def: &FunctionDef, receiver: Option<&str>) -> String {
        let params = receiver.into_iter().map(|r| r.to_owned()).chain(def.param_names());
        let return_comment = def.return_type.as_ref().map(|t| format!("  # -> {}", t)).unwrap_or_default();
        format!(
            "{}def {}({}):{}\n{}",
            self.pad(), def.name, mk_string(params, ", ", |p| p), return_comment, self.suite(&def.body),
        )
    }

    fn class(&mut self, class: &ClassDef) -> String {
        let superclass = class.superclass.as_ref().map(|s| format!("({})", s)).unwrap_or_default();
        let header = format!("{}class {}{}:", self.pad(), class.name, superclass);
        self.depth += 1;
        let pad = self.pad();
        let mut class_level = Vec::new();
        let mut instance_fields = Vec::new();
        let mut has_constructor = false;
        for member in &class.members {
            match member {
                ClassMember::Field { name, declared_type, value, modifiers, .. } => {
                    let value = value.as_ref().map(expression).unwrap_or_else(|| "None".to_owned());
                    if modifiers.is_static {
                        class_level.push(format!("{}{} = {}{}", pad, name, value, type_comment(declared_type)));
                    } else {
                        instance_fields.push(format!("{}{}self.{} = {}{}", pad, INDENT, name, value, type_comment(declared_type)));
                    }
                }
                ClassMember::Constant { name, declared_type, value, .. } =>
                    class_level.push(format!("{}{} = {}{}", pad, name, expression(value), type_comment(declared_type))),
                ClassMember::Method(def, modifiers) => {
                    has_constructor |= def.name == CONSTRUCTOR && !modifiers.is_static;
                    let method = if modifiers.is_static {
                        format!("{}@staticmethod\n{}", pad, self.function(def, None))
                    } else {
                        self.function(def, Some("self"))
                    };
                    class_level.push(method);
                }
            }
        }
        if has_constructor {
            instance_fields.push(format!("{}{}self.{}(*args)", pad, INDENT, CONSTRUCTOR));
        }
        if !instance_fields.is_empty() {
            let params = if has_constructor { "self, *args" } else { "self" };
            class_level.insert(0, format!("{}def __init__({}):\n{}", pad, params, instance_fields.join("\n")));
        }
        if class_level.is_empty() {
            class_level.push(format!("{}pass", pad));
        }
        self.depth -= 1;
        format!("{}\n{}", header, class_level.join("\n"))
    }
}

fn type_comment(declared_type: &Option<String>) -> String {
    declared_type.as_ref().map(|t| format!("  # type: {}", t)).unwrap_or_default()
}

fn native_name(name: &str) -> &str {
    match name {
        "mostrar" => "print",
        "ingresar" => "input",
        "longitud" => "len",
        "tipo_de" => "type",
        "convertir_a_entero" => "int",
        "convertir_a_decimal" => "float",
        "convertir_a_texto" => "str",
        "convertir_a_booleano" => "bool",
        other => other,
    }
}

fn arguments(args: &[Expression]) -> String { mk_string(args, ", ", expression) }

fn expression(e: &Expression) -> String {
    match e {
        Expression::Atomic(atom, _) => match atom {
            Atom::Identifier(name) => name.to_owned(),
            Atom::Integer(i) => i.to_string(),
            Atom::Decimal(d) => format_decimal(*d),
            Atom::Text(s) => format!("{:?}", s),
            Atom::True => "True".to_owned(),
            Atom::False => "False".to_owned(),
            Atom::Null => "None".to_owned(),
            Atom::This => "self".to_owned(),
        },
        Expression::List(elements, _) => format!("[{}]", arguments(elements)),
        Expression::Object(entries, _) =>
            format!("{{{}}}", mk_string(entries, ", ", |(k, v)| format!("{:?}: {}", k, expression(v)))),
        Expression::Unary(UnaryOperator::Minus, e, _) => format!("(-{})", expression(e)),
        Expression::Unary(UnaryOperator::Bang, e, _) => format!("(not {})", expression(e)),
        Expression::Binary(op, e1, e2, _) => {
            let op = match op {
                BinaryOperator::And => "and",
                BinaryOperator::Or => "or",
                other => other.symbol(),
            };
            format!("({} {} {})", expression(e1), op, expression(e2))
        }
        Expression::Assign(op, target, value, _) =>
            format!("{} {} {}", expression(target), op.symbol(), expression(value)),
        Expression::Call(callee, args, _) => {
            let callee = match callee.as_ref() {
                Expression::Atomic(Atom::Identifier(name), _) => native_name(name).to_owned(),
                other => expression(other),
            };
            format!("{}({})", callee, arguments(args))
        }
        Expression::NativeCall(name, args, _) => format!("{}({})", native_name(name), arguments(args)),
        Expression::Index(e, index, _) => format!("{}[{}]", expression(e), expression(index)),
        Expression::Property(e, name, _) => format!("{}.{}", expression(e), name),
        Expression::New(class, args, _) => format!("{}({})", class, arguments(args)),
    }
}
