use std::fmt::{Debug, Display};

#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct ErrorInfo {
    pub line: usize,
    pub column: usize,
}

impl ErrorInfo {
    pub fn new(line: usize, column: usize) -> Self { ErrorInfo { line, column } }
}

/// Which phase (and, for runtime failures, which family) produced an error.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ErrorKind {
    Lex,
    Parse,
    Type,
    Runtime,
    Attribute,
    Index,
    Key,
}

impl ErrorKind {
    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::Lex => "ErrorLexico",
            ErrorKind::Parse => "ErrorSintaxis",
            ErrorKind::Type => "ErrorTipo",
            ErrorKind::Runtime => "ErrorEjecucion",
            ErrorKind::Attribute => "ErrorAtributo",
            ErrorKind::Index => "ErrorIndice",
            ErrorKind::Key => "ErrorClave",
        }
    }
}

/// Every user-facing failure renders as `Error en línea L, columna C: <mensaje>`.
pub trait ZiskError: Debug + Display {
    fn get_info(&self) -> ErrorInfo;
    fn get_message(&self) -> String;
    fn get_kind(&self) -> ErrorKind;
}

pub type ZiskResult<A> = Result<A, Box<dyn ZiskError>>;

pub fn convert_error<A, E: ZiskError + 'static>(result: Result<A, E>) -> ZiskResult<A> {
    result.map_err(|e| Box::new(e) as Box<dyn ZiskError>)
}

#[derive(Debug, PartialEq, Clone, thiserror::Error)]
#[error("Error en línea {}, columna {}: {}", .error_info.line, .error_info.column, .message)]
pub struct ParserError {
    pub message: String,
    pub error_info: ErrorInfo,
}

impl ParserError {
    pub fn new<S: Into<String>>(message: S, error_info: ErrorInfo) -> Self {
        ParserError { message: message.into(), error_info }
    }
}

impl ZiskError for ParserError {
    fn get_info(&self) -> ErrorInfo { self.error_info }

    fn get_message(&self) -> String { self.message.to_owned() }

    fn get_kind(&self) -> ErrorKind { ErrorKind::Parse }
}
