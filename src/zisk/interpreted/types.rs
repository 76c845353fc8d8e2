use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::zisk::common::error::{ErrorInfo, ErrorKind, ZiskError};
use crate::zisk::interpreted::ast::Param;
use crate::zisk::interpreted::interpreter::value::ZiskValue;

/// What `tipo_de` answers for values no annotation can name: modules and caught errors.
pub const UNKNOWN_TYPE: &str = "desconocido";

pub const BUILTIN_TYPES: [&str; 9] =
    ["entero", "decimal", "texto", "booleano", "lista", "objeto", "funcion", "clase", "nulo"];

#[derive(Debug, PartialEq, Clone, thiserror::Error)]
#[error("Error en línea {}, columna {}: {}", .error_info.line, .error_info.column, .message)]
pub struct TypeError {
    pub message: String,
    pub error_info: ErrorInfo,
}

impl TypeError {
    pub fn new<S: Into<String>>(message: S, error_info: ErrorInfo) -> Self {
        TypeError { message: message.into(), error_info }
    }
}

impl ZiskError for TypeError {
    fn get_info(&self) -> ErrorInfo { self.error_info }

    fn get_message(&self) -> String { self.message.to_owned() }

    fn get_kind(&self) -> ErrorKind { ErrorKind::Type }
}

pub type TypeResult<A> = Result<A, TypeError>;

#[derive(Debug, Clone, PartialEq)]
pub struct MethodSignature {
    pub return_type: Option<String>,
    pub params: Vec<Param>,
}

/// Class hierarchy, variable annotations and method signatures. One instance is shared by an
/// interpreter and every module it imports.
#[derive(Debug, Default)]
pub struct TypeSystem {
    class_hierarchy: HashMap<String, Option<String>>,
    type_annotations: HashMap<String, String>,
    method_signatures: HashMap<(String, String), MethodSignature>,
}

impl TypeSystem {
    pub fn new() -> Self { TypeSystem::default() }

    pub fn add_class<S: Into<String>>(&mut self, name: S, superclass: Option<String>) {
        let name = name.into();
        debug!(class = %name, superclass = ?superclass, "registered class");
        self.class_hierarchy.insert(name, superclass);
    }

    pub fn is_class(&self, name: &str) -> bool { self.class_hierarchy.contains_key(name) }

    pub fn is_known_type(&self, name: &str) -> bool { BUILTIN_TYPES.contains(&name) || self.is_class(name) }

    pub fn add_variable_annotation<S: Into<String>>(&mut self, name: S, declared_type: S) {
        self.type_annotations.insert(name.into(), declared_type.into());
    }

    pub fn get_variable_type(&self, name: &str) -> Option<&str> {
        self.type_annotations.get(name).map(|s| s.as_str())
    }

    pub fn add_method_signature(&mut self, class: &str, method: &str, signature: MethodSignature) {
        self.method_signatures.insert((class.to_owned(), method.to_owned()), signature);
    }

    /// Looks the method up on `class`, then along its superclasses.
    pub fn get_method_signature(&self, class: &str, method: &str) -> Option<&MethodSignature> {
        let mut visited = HashSet::new();
        let mut current = Some(class.to_owned());
        while let Some(name) = current {
            if !visited.insert(name.clone()) {
                return None;
            }
            if let Some(signature) = self.method_signatures.get(&(name.clone(), method.to_owned())) {
                return Some(signature);
            }
            current = self.class_hierarchy.get(&name).cloned().flatten();
        }
        None
    }

    /// Walks the superclass chain of `class`; a cycle yields `false` rather than looping.
    pub fn is_subclass_or_same(&self, class: &str, ancestor: &str) -> bool {
        let mut visited = HashSet::new();
        let mut current = Some(class.to_owned());
        while let Some(name) = current {
            if name == ancestor {
                return true;
            }
            if !visited.insert(name.clone()) {
                return false;
            }
            current = self.class_hierarchy.get(&name).cloned().flatten();
        }
        false
    }

    pub fn check_type(&self, value: &ZiskValue, expected: &str) -> bool {
        if self.is_class(expected) {
            return match value {
                ZiskValue::Instance(instance) =>
                    self.is_subclass_or_same(&instance.borrow().class.name, expected),
                ZiskValue::Class(class) => class.name == expected,
                _ => false,
            };
        }
        match expected {
            "nulo" => matches!(value, ZiskValue::Null),
            "entero" => matches!(value, ZiskValue::Integer(_)),
            "decimal" => matches!(value, ZiskValue::Decimal(_)),
            "texto" => matches!(value, ZiskValue::Text(_)),
            "booleano" => matches!(value, ZiskValue::Bool(_)),
            "lista" => matches!(value, ZiskValue::List(_)),
            "objeto" => matches!(value, ZiskValue::Object(_)),
            "funcion" => matches!(
                value,
                ZiskValue::Function { .. } | ZiskValue::Method { .. } | ZiskValue::Native(_)
            ),
            "clase" => matches!(value, ZiskValue::Class(_)),
            _ => false,
        }
    }

    /// The class name for instances, the built-in type name otherwise, `UNKNOWN_TYPE` when neither
    /// applies.
    pub fn infer_type(&self, value: &ZiskValue) -> String {
        match value {
            ZiskValue::Instance(instance) => instance.borrow().class.name.to_owned(),
            other => other.type_name().to_owned(),
        }
    }

    /// `context` names what is being assigned ("variable 'x'", "retorno de 'f'", ...). `nulo` is
    /// accepted whatever the declared type.
    pub fn validate_assignment(
        &self,
        context: &str,
        value: &ZiskValue,
        expected: Option<&str>,
        info: ErrorInfo,
    ) -> TypeResult<()> {
        match expected {
            Some(_) if matches!(value, ZiskValue::Null) => Ok(()),
            Some(expected) if !self.check_type(value, expected) => Err(TypeError::new(
                format!(
                    "Tipo incompatible para {}: se esperaba '{}', se obtuvo '{}'",
                    context,
                    expected,
                    self.infer_type(value),
                ),
                info,
            )),
            _ => Ok(()),
        }
    }

    pub fn validate_function_call(
        &self,
        name: &str,
        args: &[ZiskValue],
        params: &[Param],
        info: ErrorInfo,
    ) -> TypeResult<()> {
        if args.len() != params.len() {
            return Err(TypeError::new(
                format!(
                    "La función '{}' espera {} argumento(s), pero recibió {}",
                    name,
                    params.len(),
                    args.len(),
                ),
                info,
            ));
        }
        for (arg, param) in args.iter().zip(params) {
            self.validate_assignment(
                &format!("el parámetro '{}' de '{}'", param.name, name),
                arg,
                param.declared_type.as_deref(),
                info,
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use indexmap::IndexMap;

    use crate::zisk::common::utils::rcrc;
    use crate::zisk::interpreted::interpreter::result::RuntimeError;

    use super::*;

    fn hierarchy() -> TypeSystem {
        let mut types = TypeSystem::new();
        types.add_class("Animal", None);
        types.add_class("Perro", Some("Animal".to_owned()));
        types.add_class("Cachorro", Some("Perro".to_owned()));
        types
    }

    #[test]
    fn subclass_chain() {
        let types = hierarchy();
        assert!(types.is_subclass_or_same("Cachorro", "Animal"));
        assert!(types.is_subclass_or_same("Perro", "Perro"));
        assert!(!types.is_subclass_or_same("Animal", "Perro"));
        assert!(!types.is_subclass_or_same("Gato", "Animal"));
    }

    #[test]
    fn cyclic_hierarchy_terminates() {
        let mut types = TypeSystem::new();
        types.add_class("A", Some("B".to_owned()));
        types.add_class("B", Some("A".to_owned()));
        assert!(!types.is_subclass_or_same("A", "C"));
        assert_eq!(types.get_method_signature("A", "m"), None);
    }

    #[test]
    fn builtin_checks() {
        let types = TypeSystem::new();
        assert!(types.check_type(&ZiskValue::Integer(1), "entero"));
        assert!(!types.check_type(&ZiskValue::Integer(1), "decimal"));
        assert!(!types.check_type(&ZiskValue::Bool(true), "entero"));
        assert!(types.check_type(&ZiskValue::Null, "nulo"));
        assert!(types.check_type(&ZiskValue::Object(rcrc(IndexMap::new())), "objeto"));
        assert!(!types.check_type(&ZiskValue::Text("x".to_owned()), "Desconocido"));
        assert!(types.is_known_type("lista"));
        assert!(!types.is_known_type("Desconocido"));
    }

    #[test]
    fn inference() {
        let types = TypeSystem::new();
        assert_eq!(types.infer_type(&ZiskValue::Decimal(1.5)), "decimal");
        assert_eq!(types.infer_type(&ZiskValue::Bool(false)), "booleano");
        assert_eq!(types.infer_type(&ZiskValue::List(rcrc(vec![]))), "lista");
        let caught = ZiskValue::Error(Rc::new(RuntimeError::general("x", ErrorInfo::default())));
        assert_eq!(types.infer_type(&caught), UNKNOWN_TYPE);
        assert!(!types.check_type(&caught, UNKNOWN_TYPE));
    }

    #[test]
    fn assignment_validation() {
        let types = TypeSystem::new();
        let info = ErrorInfo::new(4, 2);
        assert_eq!(types.validate_assignment("variable 'x'", &ZiskValue::Integer(1), None, info), Ok(()));
        let err = types.validate_assignment(
            "variable 'x'", &ZiskValue::Text("hola".to_owned()), Some("entero"), info,
        ).unwrap_err();
        assert_eq!(
            types.validate_assignment("variable 'x'", &ZiskValue::Null, Some("entero"), info),
            Ok(()),
        );
        assert_eq!(
            err.to_string(),
            "Error en línea 4, columna 2: Tipo incompatible para variable 'x': se esperaba 'entero', se obtuvo 'texto'",
        );
    }

    #[test]
    fn call_validation() {
        let types = TypeSystem::new();
        let params = vec![
            Param { name: "a".to_owned(), declared_type: Some("entero".to_owned()) },
            Param { name: "b".to_owned(), declared_type: None },
        ];
        let info = ErrorInfo::new(1, 1);
        assert!(types.validate_function_call("f", &[ZiskValue::Integer(1), ZiskValue::Null], &params, info).is_ok());
        assert!(types.validate_function_call("f", &[ZiskValue::Integer(1)], &params, info).is_err());
        assert!(types.validate_function_call("f", &[ZiskValue::Text("a".to_owned()), ZiskValue::Null], &params, info).is_err());
    }

    #[test]
    fn method_signatures_are_inherited() {
        let mut types = hierarchy();
        let signature = MethodSignature { return_type: Some("texto".to_owned()), params: vec![] };
        types.add_method_signature("Animal", "hablar", signature.clone());
        assert_eq!(types.get_method_signature("Cachorro", "hablar"), Some(&signature));
        assert_eq!(types.get_method_signature("Cachorro", "volar"), None);
    }
}
