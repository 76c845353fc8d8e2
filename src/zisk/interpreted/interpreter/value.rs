use std::cell::RefCell;
use std::fmt;
use std::fmt::{Debug, Display, Formatter};
use std::path::PathBuf;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use option_ext::OptionExt;

use crate::zisk::common::utils::{format_decimal, mk_string, RcRc};
use crate::zisk::interpreted::ast::{FunctionDef, Modifiers};
use crate::zisk::interpreted::interpreter::Interpreter;
use crate::zisk::interpreted::interpreter::natives::NativeFunction;
use crate::zisk::interpreted::interpreter::result::RuntimeError;
use crate::zisk::interpreted::types::UNKNOWN_TYPE;

pub type Fields = IndexMap<String, ZiskValue>;

#[derive(Clone)]
pub enum ZiskValue {
    Null,
    Bool(bool),
    Integer(i64),
    Decimal(f64),
    Text(String),
    List(RcRc<Vec<ZiskValue>>),
    Object(RcRc<Fields>),
    // A function declared in another module runs in that module's interpreter, hence `home`.
    Function {
        def: Rc<FunctionDef>,
        home: Option<Rc<Module>>,
    },
    // `receiver` is `None` for static methods.
    Method {
        receiver: Option<RcRc<Instance>>,
        method: Rc<MethodDescriptor>,
    },
    Native(NativeFunction),
    Class(Rc<ClassDescriptor>),
    Instance(RcRc<Instance>),
    Module(Rc<Module>),
    // What a `catch` clause binds.
    Error(Rc<RuntimeError>),
}

impl ZiskValue {
    pub fn text<S: Into<String>>(str: S) -> Self { ZiskValue::Text(str.into()) }

    pub fn list(values: Vec<ZiskValue>) -> Self { ZiskValue::List(Rc::new(RefCell::new(values))) }

    pub fn object(fields: Fields) -> Self { ZiskValue::Object(Rc::new(RefCell::new(fields))) }

    pub fn function(def: Rc<FunctionDef>) -> Self { ZiskValue::Function { def, home: None } }

    pub fn type_name(&self) -> &'static str {
        match self {
            ZiskValue::Null => "nulo",
            ZiskValue::Bool(_) => "booleano",
            ZiskValue::Integer(_) => "entero",
            ZiskValue::Decimal(_) => "decimal",
            ZiskValue::Text(_) => "texto",
            ZiskValue::List(_) => "lista",
            ZiskValue::Object(_) => "objeto",
            ZiskValue::Function { .. } | ZiskValue::Method { .. } | ZiskValue::Native(_) => "funcion",
            ZiskValue::Class(_) => "clase",
            ZiskValue::Instance(_) => "instancia",
            ZiskValue::Module(_) | ZiskValue::Error(_) => UNKNOWN_TYPE,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ZiskValue::Integer(_) | ZiskValue::Decimal(_))
    }

    pub fn as_decimal(&self) -> Option<f64> {
        match self {
            ZiskValue::Integer(i) => Some(*i as f64),
            ZiskValue::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    pub fn truthiness(&self) -> bool {
        match self {
            ZiskValue::Null => false,
            ZiskValue::Bool(b) => *b,
            ZiskValue::Integer(i) => *i != 0,
            ZiskValue::Decimal(d) => *d != 0.0,
            ZiskValue::Text(s) => !s.is_empty(),
            ZiskValue::List(l) => !l.borrow().is_empty(),
            ZiskValue::Object(o) => !o.borrow().is_empty(),
            _ => true,
        }
    }

    /// What `mostrar` prints.
    pub fn stringify(&self) -> String {
        match self {
            ZiskValue::Text(s) => s.to_owned(),
            other => other.repr(),
        }
    }

    /// Like `stringify`, but texts are quoted; used for list/object elements and the shell. A list
    /// or object met again while rendering itself shows as `[...]` or `{...}`.
    pub fn repr(&self) -> String {
        self.repr_within(&mut Vec::new())
    }

    fn repr_within(&self, open: &mut Vec<*const ()>) -> String {
        match self {
            ZiskValue::Null => "nulo".to_owned(),
            ZiskValue::Bool(true) => "verdadero".to_owned(),
            ZiskValue::Bool(false) => "falso".to_owned(),
            ZiskValue::Integer(i) => i.to_string(),
            ZiskValue::Decimal(d) => format_decimal(*d),
            ZiskValue::Text(s) => format!("{:?}", s),
            ZiskValue::List(l) => {
                let id = Rc::as_ptr(l) as *const ();
                if open.contains(&id) {
                    return "[...]".to_owned();
                }
                open.push(id);
                let result = format!("[{}]", mk_string(l.borrow().iter(), ", ", |v| v.repr_within(open)));
                open.pop();
                result
            }
            ZiskValue::Object(o) => {
                let id = Rc::as_ptr(o) as *const ();
                if open.contains(&id) {
                    return "{...}".to_owned();
                }
                open.push(id);
                let result = format!(
                    "{{{}}}",
                    mk_string(o.borrow().iter(), ", ", |(k, v)| format!("{:?}: {}", k, v.repr_within(open))),
                );
                open.pop();
                result
            }
            ZiskValue::Function { def, .. } => format!("<funcion {}>", def.name),
            ZiskValue::Method { method, .. } => format!("<metodo {}.{}>", method.owner, method.def.name),
            ZiskValue::Native(native) => format!("<funcion nativa {}>", native.name),
            ZiskValue::Class(class) => format!("<clase {}>", class.name),
            ZiskValue::Instance(instance) => format!("<instancia de {}>", instance.borrow().class.name),
            ZiskValue::Module(module) => format!("<modulo {}>", module.name),
            ZiskValue::Error(err) => err.to_string(),
        }
    }

    /// Structural for lists and objects, numeric across `entero`/`decimal`, identity for the rest.
    /// A pair of collections compared again while comparing themselves counts as equal.
    pub fn equals(&self, other: &ZiskValue) -> bool {
        self.equals_within(other, &mut Vec::new())
    }

    fn equals_within(&self, other: &ZiskValue, open: &mut Vec<(*const (), *const ())>) -> bool {
        match (self, other) {
            (ZiskValue::Null, ZiskValue::Null) => true,
            (ZiskValue::Bool(b1), ZiskValue::Bool(b2)) => b1 == b2,
            (ZiskValue::Integer(i1), ZiskValue::Integer(i2)) => i1 == i2,
            (n1, n2) if n1.is_numeric() && n2.is_numeric() => n1.as_decimal() == n2.as_decimal(),
            (ZiskValue::Text(s1), ZiskValue::Text(s2)) => s1 == s2,
            (ZiskValue::List(l1), ZiskValue::List(l2)) => {
                let pair = (Rc::as_ptr(l1) as *const (), Rc::as_ptr(l2) as *const ());
                Rc::ptr_eq(l1, l2) || open.contains(&pair) || {
                    open.push(pair);
                    let result = lists_equal(&l1.borrow(), &l2.borrow(), open);
                    open.pop();
                    result
                }
            }
            (ZiskValue::Object(o1), ZiskValue::Object(o2)) => {
                let pair = (Rc::as_ptr(o1) as *const (), Rc::as_ptr(o2) as *const ());
                Rc::ptr_eq(o1, o2) || open.contains(&pair) || {
                    open.push(pair);
                    let result = objects_equal(&o1.borrow(), &o2.borrow(), open);
                    open.pop();
                    result
                }
            }
            (ZiskValue::Function { def: d1, .. }, ZiskValue::Function { def: d2, .. }) => Rc::ptr_eq(d1, d2),
            (ZiskValue::Method { receiver: r1, method: m1 }, ZiskValue::Method { receiver: r2, method: m2 }) =>
                Rc::ptr_eq(m1, m2) && match (r1, r2) {
                    (Some(r1), Some(r2)) => Rc::ptr_eq(r1, r2),
                    (None, None) => true,
                    _ => false,
                },
            (ZiskValue::Native(n1), ZiskValue::Native(n2)) => n1.name == n2.name,
            (ZiskValue::Class(c1), ZiskValue::Class(c2)) => Rc::ptr_eq(c1, c2),
            (ZiskValue::Instance(i1), ZiskValue::Instance(i2)) => Rc::ptr_eq(i1, i2),
            (ZiskValue::Module(m1), ZiskValue::Module(m2)) => Rc::ptr_eq(m1, m2),
            (ZiskValue::Error(e1), ZiskValue::Error(e2)) => Rc::ptr_eq(e1, e2),
            _ => false,
        }
    }
}

fn lists_equal(l1: &[ZiskValue], l2: &[ZiskValue], open: &mut Vec<(*const (), *const ())>) -> bool {
    l1.len() == l2.len() && l1.iter().zip(l2.iter()).all(|(a, b)| a.equals_within(b, open))
}

// Key order does not matter.
fn objects_equal(o1: &Fields, o2: &Fields, open: &mut Vec<(*const (), *const ())>) -> bool {
    o1.len() == o2.len() && o1.iter().all(|(k, v)| o2.get(k).map_or2(|v2| v.equals_within(v2, open), false))
}

impl PartialEq for ZiskValue {
    fn eq(&self, other: &Self) -> bool { self.equals(other) }
}

impl Display for ZiskValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.stringify())
    }
}

// Values may be cyclic through shared lists and instances, so no derived Debug.
impl Debug for ZiskValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repr())
    }
}

#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub name: String,
    pub declared_type: Option<String>,
    pub default: ZiskValue,
}

#[derive(Debug, Clone)]
pub struct StaticMember {
    pub value: ZiskValue,
    pub declared_type: Option<String>,
    pub is_const: bool,
}

pub struct MethodDescriptor {
    pub def: Rc<FunctionDef>,
    pub owner: String,
    pub modifiers: Modifiers,
    // The module whose interpreter declared the method; dangling for top-level classes.
    pub home: Weak<Module>,
}

impl Debug for MethodDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("owner", &self.owner)
            .field("name", &self.def.name)
            .field("modifiers", &self.modifiers)
            .finish()
    }
}

impl MethodDescriptor {
    pub fn is_static(&self) -> bool { self.modifiers.is_static }
}

/// Everything construction and dispatch need to know about a class. Static `var` members are the
/// only part that changes after declaration.
#[derive(Debug)]
pub struct ClassDescriptor {
    pub name: String,
    pub superclass: Option<Rc<ClassDescriptor>>,
    pub fields: Vec<FieldDescriptor>,
    pub statics: RefCell<IndexMap<String, StaticMember>>,
    pub methods: IndexMap<String, Rc<MethodDescriptor>>,
}

impl ClassDescriptor {
    pub fn superclass_name(&self) -> Option<String> {
        self.superclass.as_ref().map(|s| s.name.to_owned())
    }

    pub fn find_method(&self, name: &str) -> Option<Rc<MethodDescriptor>> {
        self.methods.get(name).cloned()
            .or_else(|| self.superclass.as_ref().and_then(|s| s.find_method(name)))
    }

    pub fn find_static(&self, name: &str) -> Option<StaticMember> {
        self.statics.borrow().get(name).cloned()
            .or_else(|| self.superclass.as_ref().and_then(|s| s.find_static(name)))
    }

    /// The class in the chain whose static store holds `name`.
    pub fn static_owner(self: &Rc<Self>, name: &str) -> Option<Rc<ClassDescriptor>> {
        if self.statics.borrow().contains_key(name) {
            Some(self.clone())
        } else {
            self.superclass.as_ref().and_then(|s| s.static_owner(name))
        }
    }

    pub fn find_field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
            .or_else(|| self.superclass.as_ref().and_then(|s| s.find_field(name)))
    }

    /// Root ancestor first, `self` last.
    pub fn ancestry(self: &Rc<Self>) -> Vec<Rc<ClassDescriptor>> {
        let mut chain = vec![self.clone()];
        let mut current = self.superclass.clone();
        while let Some(class) = current {
            current = class.superclass.clone();
            chain.push(class);
        }
        chain.reverse();
        chain
    }
}

#[derive(Debug)]
pub struct Instance {
    pub class: Rc<ClassDescriptor>,
    pub fields: Fields,
}

impl Instance {
    pub fn new(class: Rc<ClassDescriptor>) -> Self {
        Instance { class, fields: IndexMap::new() }
    }
}

pub struct Module {
    pub name: String,
    pub path: PathBuf,
    pub interpreter: RcRc<Interpreter>,
}

impl Debug for Module {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module").field("name", &self.name).field("path", &self.path).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness() {
        assert!(!ZiskValue::Null.truthiness());
        assert!(!ZiskValue::Integer(0).truthiness());
        assert!(!ZiskValue::Decimal(0.0).truthiness());
        assert!(!ZiskValue::text("").truthiness());
        assert!(!ZiskValue::list(vec![]).truthiness());
        assert!(ZiskValue::text("0").truthiness());
        assert!(ZiskValue::list(vec![ZiskValue::Null]).truthiness());
    }

    #[test]
    fn display() {
        let mut fields = IndexMap::new();
        fields.insert("a".to_owned(), ZiskValue::list(vec![ZiskValue::Integer(1), ZiskValue::text("x")]));
        fields.insert("b".to_owned(), ZiskValue::Bool(false));
        let object = ZiskValue::object(fields);
        assert_eq!(object.stringify(), "{\"a\": [1, \"x\"], \"b\": falso}");
        assert_eq!(ZiskValue::text("hola").stringify(), "hola");
        assert_eq!(ZiskValue::text("hola").repr(), "\"hola\"");
        assert_eq!(ZiskValue::Decimal(3.0).stringify(), "3.0");
        assert_eq!(ZiskValue::Null.stringify(), "nulo");
    }

    #[test]
    fn equality() {
        assert_eq!(ZiskValue::Integer(2), ZiskValue::Decimal(2.0));
        assert_ne!(ZiskValue::Integer(2), ZiskValue::text("2"));
        assert_eq!(
            ZiskValue::list(vec![ZiskValue::Integer(1), ZiskValue::Null]),
            ZiskValue::list(vec![ZiskValue::Integer(1), ZiskValue::Null]),
        );
        let mut f1 = IndexMap::new();
        f1.insert("x".to_owned(), ZiskValue::Integer(1));
        f1.insert("y".to_owned(), ZiskValue::Integer(2));
        let mut f2 = IndexMap::new();
        f2.insert("y".to_owned(), ZiskValue::Integer(2));
        f2.insert("x".to_owned(), ZiskValue::Integer(1));
        assert_eq!(ZiskValue::object(f1), ZiskValue::object(f2));
    }

    #[test]
    fn self_containing_collections_render_and_compare() {
        let list = ZiskValue::list(vec![ZiskValue::Integer(1)]);
        if let ZiskValue::List(l) = &list {
            l.borrow_mut().push(list.clone());
        }
        assert_eq!(list.repr(), "[1, [...]]");

        let object = ZiskValue::object(IndexMap::new());
        if let ZiskValue::Object(o) = &object {
            o.borrow_mut().insert("yo".to_owned(), object.clone());
            o.borrow_mut().insert("lista".to_owned(), list.clone());
        }
        assert_eq!(object.repr(), "{\"yo\": {...}, \"lista\": [1, [...]]}");

        let other = ZiskValue::list(vec![ZiskValue::Integer(1)]);
        if let ZiskValue::List(l) = &other {
            l.borrow_mut().push(other.clone());
        }
        assert_eq!(list, other);
        let different = ZiskValue::list(vec![ZiskValue::Integer(2)]);
        if let ZiskValue::List(l) = &different {
            l.borrow_mut().push(different.clone());
        }
        assert_ne!(list, different);
    }
}
