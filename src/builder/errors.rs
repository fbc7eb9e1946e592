use thiserror::Error;

use super::FrameKind;
use crate::ir::{AssemblerError, NodeKind, Type};

/// The broad kind of contract violation an error reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// A required enclosing scope is not open.
    ScopeNotFound,
    /// The required scope is open, but another scope sits between it and the caller.
    ScopeNotImmediate,
    /// A set-once field or unique name was written twice.
    DuplicateDefinition,
    /// Something reserved or required was never defined before its scope closed.
    UndefinedEntity,
    ResultAlreadySet,
    UnknownName,
    /// Misuse of the scope protocol itself.
    Protocol,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum BuilderError {
    #[error("no builder is active on this thread ({operation})")]
    NoActiveBuilder { operation: &'static str },
    #[error("a builder is already active on this thread ({operation})")]
    BuilderAlreadyActive { operation: &'static str },
    #[error("the active builder is already borrowed ({operation})")]
    BuilderInUse { operation: &'static str },
    #[error("{operation} failed: the session already failed and must be aborted")]
    SessionFailed { operation: &'static str },
    #[error("{operation}: no scope is open")]
    EmptyStack { operation: &'static str },
    #[error("{operation}: {kind:?} scope at depth {depth} is not the innermost open scope")]
    UnbalancedScope {
        operation: &'static str,
        kind: FrameKind,
        depth: usize,
        innermost: Option<usize>,
    },
    #[error("{operation}: a module is already open")]
    NestedModule { operation: &'static str },
    #[error("{operation}: the builder result has already been set")]
    ResultAlreadySet { operation: &'static str },
    #[error("module frame not found, '{operation}' must be called inside a module")]
    ModuleNotFound { operation: &'static str },
    #[error("'{operation}' must be called immediately under a module")]
    NotImmediatelyInModule { operation: &'static str },
    #[error("function frame not found, '{operation}' must be called inside a function")]
    NotInFunctionScope { operation: &'static str },
    #[error("'{operation}' must be called immediately under a function")]
    NotImmediatelyInFunction { operation: &'static str },
    #[error("cannot find where to insert function {name:?}")]
    NoInsertionTarget { name: String },
    #[error("function {name:?} already exists ({operation})")]
    DuplicateFunction {
        name: String,
        operation: &'static str,
    },
    #[error("duplicate function name, previous one is {previous:?} ({operation})")]
    DuplicateName {
        previous: String,
        operation: &'static str,
    },
    #[error("duplicate function attributes, {count} already set ({operation})")]
    DuplicateAttrs {
        count: usize,
        operation: &'static str,
    },
    #[error("duplicate function return type, previous one is {previous} ({operation})")]
    DuplicateReturnType {
        previous: Type,
        operation: &'static str,
    },
    #[error("function {name:?} has already been defined ({operation})")]
    AlreadyDefined {
        name: String,
        operation: &'static str,
    },
    #[error("function {name:?} does not exist ({operation})")]
    UnknownName {
        name: String,
        operation: &'static str,
    },
    #[error("function {name:?} is not defined")]
    UndefinedFunction { name: String },
    #[error("return type of function {name:?} must be defined")]
    MissingReturnType { name: String },
    #[error("function {name:?} returns nothing, at least one output is required")]
    MissingOutput { name: String },
    #[error("no renamer registered for {kind:?} nodes (naming {name:?})")]
    NoRenamerRegistered { kind: NodeKind, name: String },
    #[error(transparent)]
    Assembler(#[from] AssemblerError),
}

impl BuilderError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            BuilderError::ModuleNotFound { .. }
            | BuilderError::NotInFunctionScope { .. }
            | BuilderError::NoInsertionTarget { .. } => ErrorCategory::ScopeNotFound,
            BuilderError::NotImmediatelyInModule { .. }
            | BuilderError::NotImmediatelyInFunction { .. } => ErrorCategory::ScopeNotImmediate,
            BuilderError::DuplicateFunction { .. }
            | BuilderError::DuplicateName { .. }
            | BuilderError::DuplicateAttrs { .. }
            | BuilderError::DuplicateReturnType { .. }
            | BuilderError::AlreadyDefined { .. } => ErrorCategory::DuplicateDefinition,
            BuilderError::UndefinedFunction { .. }
            | BuilderError::MissingReturnType { .. }
            | BuilderError::MissingOutput { .. } => ErrorCategory::UndefinedEntity,
            BuilderError::ResultAlreadySet { .. } => ErrorCategory::ResultAlreadySet,
            BuilderError::UnknownName { .. } => ErrorCategory::UnknownName,
            BuilderError::NoActiveBuilder { .. }
            | BuilderError::BuilderAlreadyActive { .. }
            | BuilderError::BuilderInUse { .. }
            | BuilderError::SessionFailed { .. }
            | BuilderError::EmptyStack { .. }
            | BuilderError::UnbalancedScope { .. }
            | BuilderError::NestedModule { .. }
            | BuilderError::NoRenamerRegistered { .. }
            | BuilderError::Assembler(_) => ErrorCategory::Protocol,
        }
    }
}

pub type Result<T, E = BuilderError> = std::result::Result<T, E>;
