use crate::zisk::common::error::ErrorInfo;
use crate::zisk::common::utils::mk_string;

#[derive(Debug, PartialEq, Clone)]
pub struct Program {
    pub statements: Vec<Statement>,
}

impl Program {
    pub fn new(statements: Vec<Statement>) -> Self { Program { statements } }
}

#[derive(Debug, PartialEq, Clone)]
pub struct Param {
    pub name: String,
    pub declared_type: Option<String>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: Option<String>,
    pub body: Vec<Statement>,
    pub error_info: ErrorInfo,
}

impl FunctionDef {
    pub fn arity(&self) -> usize { self.params.len() }

    pub fn param_names(&self) -> Vec<String> {
        self.params.iter().map(|p| p.name.clone()).collect()
    }
}

#[derive(Debug, PartialEq, Clone, Copy, Eq, Default)]
pub struct Modifiers {
    pub is_static: bool,
    pub is_private: bool,
}

#[derive(Debug, PartialEq, Clone)]
pub enum ClassMember {
    Field {
        name: String,
        declared_type: Option<String>,
        value: Option<Expression>,
        modifiers: Modifiers,
        error_info: ErrorInfo,
    },
    Constant {
        name: String,
        declared_type: Option<String>,
        value: Expression,
        modifiers: Modifiers,
        error_info: ErrorInfo,
    },
    Method(FunctionDef, Modifiers),
}

#[derive(Debug, PartialEq, Clone)]
pub struct ClassDef {
    pub name: String,
    pub superclass: Option<String>,
    pub members: Vec<ClassMember>,
    pub error_info: ErrorInfo,
}

#[derive(Debug, PartialEq, Clone)]
pub struct CatchClause {
    pub name: String,
    pub body: Vec<Statement>,
}

#[derive(Debug, PartialEq, Clone)]
pub enum Statement {
    Block(Vec<Statement>),
    Variable {
        name: String,
        declared_type: Option<String>,
        value: Option<Expression>,
        error_info: ErrorInfo,
    },
    Constant {
        name: String,
        declared_type: Option<String>,
        value: Expression,
        error_info: ErrorInfo,
    },
    Function(FunctionDef),
    Class(ClassDef),
    Import { path: String, alias: Option<String>, error_info: ErrorInfo },
    IfElse { cond: Expression, if_stmt: Box<Statement>, else_stmt: Option<Box<Statement>> },
    While(Expression, Box<Statement>),
    DoWhile(Box<Statement>, Expression),
    For {
        init: Option<Box<Statement>>,
        cond: Option<Expression>,
        update: Option<Expression>,
        body: Box<Statement>,
    },
    Try { body: Vec<Statement>, catch: Option<CatchClause>, finally: Option<Vec<Statement>> },
    Break(ErrorInfo),
    Continue(ErrorInfo),
    Return(Option<Expression>, ErrorInfo),
    Expression(Expression),
}

#[derive(Debug, PartialEq, Clone)]
pub enum Expression {
    Atomic(Atom, ErrorInfo),
    List(Vec<Expression>, ErrorInfo),
    Object(Vec<(String, Expression)>, ErrorInfo),
    Unary(UnaryOperator, Box<Expression>, ErrorInfo),
    Binary(BinaryOperator, Box<Expression>, Box<Expression>, ErrorInfo),
    Assign(AssignOperator, Box<Expression>, Box<Expression>, ErrorInfo),
    Call(Box<Expression>, Vec<Expression>, ErrorInfo),
    // `mostrar(...)` and `ingresar(...)`, which are keywords rather than identifiers.
    NativeCall(String, Vec<Expression>, ErrorInfo),
    Index(Box<Expression>, Box<Expression>, ErrorInfo),
    Property(Box<Expression>, String, ErrorInfo),
    New(String, Vec<Expression>, ErrorInfo),
}

impl Expression {
    pub fn error_info(&self) -> ErrorInfo {
        match self {
            Expression::Atomic(_, i) => *i,
            Expression::List(_, i) => *i,
            Expression::Object(_, i) => *i,
            Expression::Unary(_, _, i) => *i,
            Expression::Binary(_, _, _, i) => *i,
            Expression::Assign(_, _, _, i) => *i,
            Expression::Call(_, _, i) => *i,
            Expression::NativeCall(_, _, i) => *i,
            Expression::Index(_, _, i) => *i,
            Expression::Property(_, _, i) => *i,
            Expression::New(_, _, i) => *i,
        }
    }

    pub fn is_assignable(&self) -> bool {
        matches!(
            self,
            Expression::Atomic(Atom::Identifier(_), _) | Expression::Index(..) | Expression::Property(..)
        )
    }

    /// Single-line, fully parenthesized rendering; used by `:ast` and in tests.
    pub fn pretty_print(&self) -> String {
        let list = |args: &Vec<Expression>| mk_string(args, ", ", |e| e.pretty_print());
        match self {
            Expression::Atomic(atom, _) => atom.pretty_print(),
            Expression::List(elements, _) => format!("[{}]", list(elements)),
            Expression::Object(entries, _) =>
                format!("{{{}}}", mk_string(entries, ", ", |(k, v)| format!("{}: {}", k, v.pretty_print()))),
            Expression::Unary(op, e, _) => format!("({}{})", op.symbol(), e.pretty_print()),
            Expression::Binary(op, e1, e2, _) =>
                format!("({} {} {})", e1.pretty_print(), op.symbol(), e2.pretty_print()),
            Expression::Assign(op, target, value, _) =>
                format!("({} {} {})", target.pretty_print(), op.symbol(), value.pretty_print()),
            Expression::Call(callee, args, _) => format!("{}({})", callee.pretty_print(), list(args)),
            Expression::NativeCall(name, args, _) => format!("{}({})", name, list(args)),
            Expression::Index(e, index, _) => format!("{}[{}]", e.pretty_print(), index.pretty_print()),
            Expression::Property(e, name, _) => format!("{}.{}", e.pretty_print(), name),
            Expression::New(class, args, _) => format!("nuevo {}({})", class, list(args)),
        }
    }

    pub fn identifier<S: Into<String>>(str: S, error_info: ErrorInfo) -> Self {
        Expression::Atomic(Atom::Identifier(str.into()), error_info)
    }
    pub fn integer(i: i64, error_info: ErrorInfo) -> Self {
        Expression::Atomic(Atom::Integer(i), error_info)
    }
    pub fn decimal(d: f64, error_info: ErrorInfo) -> Self {
        Expression::Atomic(Atom::Decimal(d), error_info)
    }
}

#[derive(Debug, PartialEq, Clone)]
pub enum Atom {
    Identifier(String),
    Integer(i64),
    Decimal(f64),
    Text(String),
    True,
    False,
    Null,
    This,
}

impl Atom {
    pub fn is_numeric(&self) -> bool {
        matches!(self, Atom::Integer(_) | Atom::Decimal(_))
    }

    pub fn pretty_print(&self) -> String {
        match self {
            Atom::Identifier(name) => name.to_owned(),
            Atom::Integer(i) => i.to_string(),
            Atom::Decimal(d) => crate::zisk::common::utils::format_decimal(*d),
            Atom::Text(s) => format!("{:?}", s),
            Atom::True => "verdadero".to_owned(),
            Atom::False => "falso".to_owned(),
            Atom::Null => "nulo".to_owned(),
            Atom::This => "este".to_owned(),
        }
    }
}

#[derive(Debug, PartialEq, Clone, Copy, Eq)]
pub enum UnaryOperator {
    Minus,
    Bang,
}

impl UnaryOperator {
    pub fn symbol(&self) -> &str {
        match self {
            UnaryOperator::Minus => "-",
            UnaryOperator::Bang => "!",
        }
    }
}

#[derive(Debug, PartialEq, Clone, Copy, Eq)]
pub enum BinaryOperator {
    Plus,
    Minus,
    Mult,
    Div,
    Mod,

    EqualEqual,
    BangEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,

    And,
    Or,
}

impl BinaryOperator {
    pub fn symbol(&self) -> &str {
        match self {
            BinaryOperator::Plus => "+",
            BinaryOperator::Minus => "-",
            BinaryOperator::Mult => "*",
            BinaryOperator::Div => "/",
            BinaryOperator::Mod => "%",
            BinaryOperator::EqualEqual => "==",
            BinaryOperator::BangEqual => "!=",
            BinaryOperator::Less => "<",
            BinaryOperator::LessEqual => "<=",
            BinaryOperator::Greater => ">",
            BinaryOperator::GreaterEqual => ">=",
            BinaryOperator::And => "&&",
            BinaryOperator::Or => "||",
        }
    }

    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            BinaryOperator::Plus | BinaryOperator::Minus | BinaryOperator::Mult | BinaryOperator::Div
            | BinaryOperator::Mod
        )
    }
}

#[derive(Debug, PartialEq, Clone, Copy, Eq)]
pub enum AssignOperator {
    Assign,
    Plus,
    Minus,
    Mult,
    Div,
    Mod,
}

impl AssignOperator {
    pub fn symbol(&self) -> &str {
        match self {
            AssignOperator::Assign => "=",
            AssignOperator::Plus => "+=",
            AssignOperator::Minus => "-=",
            AssignOperator::Mult => "*=",
            AssignOperator::Div => "/=",
            AssignOperator::Mod => "%=",
        }
    }

    /// The arithmetic a compound assignment performs, `None` for plain `=`.
    pub fn binary(&self) -> Option<BinaryOperator> {
        match self {
            AssignOperator::Assign => None,
            AssignOperator::Plus => Some(BinaryOperator::Plus),
            AssignOperator::Minus => Some(BinaryOperator::Minus),
            AssignOperator::Mult => Some(BinaryOperator::Mult),
            AssignOperator::Div => Some(BinaryOperator::Div),
            AssignOperator::Mod => Some(BinaryOperator::Mod),
        }
    }
}
