use std::collections::HashMap;

use lazy_static::lazy_static;
use nonempty::NonEmpty;
use regex::Regex;

lazy_static! {
    static ref LOWER_CASE: Regex = Regex::new(r"^[a-z_][a-zA-Z0-9_]*$").unwrap();
    static ref PASCAL_CASE: Regex = Regex::new(r"^[A-Z][a-zA-Z0-9_]*$").unwrap();
    static ref UPPER_CASE: Regex = Regex::new(r"^[A-Z_][A-Z0-9_]*$").unwrap();
}

/// Variables, functions, methods and parameters.
pub fn is_lower_case(name: &str) -> bool { LOWER_CASE.is_match(name) }

/// Class names.
pub fn is_pascal_case(name: &str) -> bool { PASCAL_CASE.is_match(name) }

/// Constants.
pub fn is_upper_case(name: &str) -> bool { UPPER_CASE.is_match(name) }

pub fn is_private_name(name: &str) -> bool { name.starts_with('_') || is_lower_case(name) }

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclarationKind {
    Var,
    Const,
    Param,
}

impl DeclarationKind {
    pub fn describe(&self) -> &'static str {
        match self {
            DeclarationKind::Var => "variable",
            DeclarationKind::Const => "constante",
            DeclarationKind::Param => "parámetro",
        }
    }
}

/// Parse-time lexical scopes. The outermost scope is never popped.
#[derive(Debug)]
pub struct ScopeStack {
    scopes: NonEmpty<HashMap<String, DeclarationKind>>,
}

impl ScopeStack {
    pub fn new() -> Self { ScopeStack { scopes: NonEmpty::new(HashMap::new()) } }

    pub fn enter_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn exit_scope(&mut self) {
        self.scopes.pop();
    }

    /// Declares `name` in the innermost scope, returning the previous declaration's kind when
    /// the name is already taken there. Shadowing an outer scope is allowed.
    pub fn declare(&mut self, name: &str, kind: DeclarationKind) -> Result<(), DeclarationKind> {
        let scope = self.scopes.last_mut();
        match scope.get(name) {
            Some(existing) => Err(*existing),
            None => {
                scope.insert(name.to_owned(), kind);
                Ok(())
            }
        }
    }

    pub fn depth(&self) -> usize { self.scopes.len() }
}

impl Default for ScopeStack {
    fn default() -> Self { ScopeStack::new() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn naming_conventions() {
        assert!(is_lower_case("contador_total"));
        assert!(is_lower_case("_interno"));
        assert!(!is_lower_case("Contador"));
        assert!(is_pascal_case("Persona"));
        assert!(!is_pascal_case("persona"));
        assert!(is_upper_case("MAX_VALOR"));
        assert!(!is_upper_case("MaxValor"));
        assert!(is_private_name("_secreto"));
    }

    #[test]
    fn redeclaration_only_in_same_scope() {
        let mut scopes = ScopeStack::new();
        assert_eq!(scopes.declare("x", DeclarationKind::Var), Ok(()));
        assert_eq!(scopes.declare("x", DeclarationKind::Const), Err(DeclarationKind::Var));
        scopes.enter_scope();
        assert_eq!(scopes.declare("x", DeclarationKind::Param), Ok(()));
        scopes.exit_scope();
        assert_eq!(scopes.depth(), 1);
    }

    #[test]
    fn outermost_scope_survives_extra_exits() {
        let mut scopes = ScopeStack::new();
        scopes.exit_scope();
        scopes.exit_scope();
        assert_eq!(scopes.depth(), 1);
        assert_eq!(scopes.declare("y", DeclarationKind::Var), Ok(()));
    }
}
