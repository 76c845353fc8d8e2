use crate::zisk::common::error::{ErrorInfo, ErrorKind, ZiskError};
use crate::zisk::interpreted::ast::{BinaryOperator, UnaryOperator};
use crate::zisk::interpreted::interpreter::value::ZiskValue;
use crate::zisk::interpreted::types::TypeError;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Type(#[from] TypeError),
    #[error("Error en línea {}, columna {}: {}", .error_info.line, .error_info.column, .message)]
    General { message: String, error_info: ErrorInfo },
    #[error("Error en línea {}, columna {}: {}", .error_info.line, .error_info.column, .message)]
    Attribute { message: String, error_info: ErrorInfo },
    #[error("Error en línea {}, columna {}: {}", .error_info.line, .error_info.column, .message)]
    Index { message: String, error_info: ErrorInfo },
    #[error("Error en línea {}, columna {}: {}", .error_info.line, .error_info.column, .message)]
    Key { message: String, error_info: ErrorInfo },
}

impl RuntimeError {
    pub fn general<S: Into<String>>(message: S, error_info: ErrorInfo) -> Self {
        RuntimeError::General { message: message.into(), error_info }
    }
    pub fn attribute<S: Into<String>>(message: S, error_info: ErrorInfo) -> Self {
        RuntimeError::Attribute { message: message.into(), error_info }
    }
    pub fn index<S: Into<String>>(message: S, error_info: ErrorInfo) -> Self {
        RuntimeError::Index { message: message.into(), error_info }
    }
    pub fn key<S: Into<String>>(message: S, error_info: ErrorInfo) -> Self {
        RuntimeError::Key { message: message.into(), error_info }
    }
}

impl ZiskError for RuntimeError {
    fn get_info(&self) -> ErrorInfo {
        match self {
            RuntimeError::Type(e) => e.error_info,
            RuntimeError::General { error_info, .. } => *error_info,
            RuntimeError::Attribute { error_info, .. } => *error_info,
            RuntimeError::Index { error_info, .. } => *error_info,
            RuntimeError::Key { error_info, .. } => *error_info,
        }
    }

    fn get_message(&self) -> String {
        match self {
            RuntimeError::Type(e) => e.message.to_owned(),
            RuntimeError::General { message, .. } => message.to_owned(),
            RuntimeError::Attribute { message, .. } => message.to_owned(),
            RuntimeError::Index { message, .. } => message.to_owned(),
            RuntimeError::Key { message, .. } => message.to_owned(),
        }
    }

    fn get_kind(&self) -> ErrorKind {
        match self {
            RuntimeError::Type(_) => ErrorKind::Type,
            RuntimeError::General { .. } => ErrorKind::Runtime,
            RuntimeError::Attribute { .. } => ErrorKind::Attribute,
            RuntimeError::Index { .. } => ErrorKind::Index,
            RuntimeError::Key { .. } => ErrorKind::Key,
        }
    }
}

pub type InterpretResult<A> = Result<A, RuntimeError>;

/// How a statement finished. Non-local exits travel here, never through `RuntimeError`.
#[derive(Debug, Clone)]
pub enum Flow {
    Normal(ZiskValue),
    Return(ZiskValue),
    Break,
    Continue,
}

pub fn unary_type_error<A>(
    op: &UnaryOperator, v: &ZiskValue, error_info: &ErrorInfo,
) -> InterpretResult<A> {
    Err(RuntimeError::general(
        format!("No se puede aplicar el operador '{}' a un valor de tipo '{}'", op.symbol(), v.type_name()),
        *error_info,
    ))
}

pub fn binary_type_error<A>(
    op: &BinaryOperator, v1: &ZiskValue, v2: &ZiskValue, error_info: &ErrorInfo,
) -> InterpretResult<A> {
    Err(RuntimeError::general(
        format!(
            "No se puede aplicar el operador '{}' a '{}' y '{}'",
            op.symbol(),
            v1.type_name(),
            v2.type_name(),
        ),
        *error_info,
    ))
}
