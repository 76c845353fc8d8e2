use std::fmt::{Debug, Formatter};
use std::iter;

use indexmap::IndexMap;
use nonempty::NonEmpty;
use option_ext::OptionExt;

use crate::zisk::common::utils::mk_string;
use crate::zisk::interpreted::interpreter::value::ZiskValue;

#[derive(Debug, Clone)]
pub struct Binding {
    pub value: ZiskValue,
    pub is_const: bool,
    pub declared_type: Option<String>,
}

impl Binding {
    pub fn var(value: ZiskValue, declared_type: Option<String>) -> Self {
        Binding { value, is_const: false, declared_type }
    }
    pub fn constant(value: ZiskValue, declared_type: Option<String>) -> Self {
        Binding { value, is_const: true, declared_type }
    }
}

pub type Scope = IndexMap<String, Binding>;

/// The runtime scope stack. The head is the global scope and is never popped.
#[derive(Clone)]
pub struct Environment {
    scopes: NonEmpty<Scope>,
}

impl Environment {
    pub fn new() -> Self { Environment { scopes: NonEmpty::new(IndexMap::new()) } }

    pub fn push_scope(&mut self) {
        self.scopes.push(IndexMap::new());
    }

    pub fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    /// Hides every local scope of the caller, so the callee only sees the globals and its own
    /// frame. The returned scopes must be handed back to `exit_call`.
    pub fn enter_call(&mut self) -> Vec<Scope> {
        let saved = std::mem::take(&mut self.scopes.tail);
        self.push_scope();
        saved
    }

    pub fn exit_call(&mut self, saved: Vec<Scope>) {
        self.scopes.tail = saved;
    }

    /// Binds `name` in the innermost scope. Returns false, without touching the scope, when that
    /// would overwrite a constant.
    pub fn declare(&mut self, name: String, binding: Binding) -> bool {
        let scope = self.scopes.last_mut();
        if scope.get(&name).map_or2(|b| b.is_const, false) {
            return false;
        }
        scope.insert(name, binding);
        true
    }

    pub fn get(&self, name: &str) -> Option<&Binding> {
        self.scopes.tail.iter().rev()
            .chain(iter::once(&self.scopes.head))
            .find_map(|scope| scope.get(name))
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Binding> {
        self.scopes.tail.iter_mut().rev()
            .chain(iter::once(&mut self.scopes.head))
            .find_map(|scope| scope.get_mut(name))
    }

    pub fn globals(&self) -> &Scope { &self.scopes.head }

    pub fn depth(&self) -> usize { self.scopes.len() }
}

impl Default for Environment {
    fn default() -> Self { Environment::new() }
}

impl Debug for Environment {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let render = |scope: &Scope| mk_string(scope.iter(), ", ", |(k, b)| format!("{} -> {}", k, b.value.repr()));
        let scopes = mk_string(self.scopes.iter(), ";; ", render);
        write!(f, "{}", scopes)
    }
}
