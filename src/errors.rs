//! Contract-related error types

use thiserror::Error;

use crate::contract::AssertionKind;

/// Main contract error type
#[derive(Error, Debug)]
pub enum ContractError {
    /// Contract violation during execution
    #[error("Contract violation: {0}")]
    Violation(#[from] ContractViolation),

    /// Malformed or inconsistent class model
    #[error("Model error: {0}")]
    Model(String),

    /// Error while evaluating a predicate or a method body
    #[error("Evaluation error: {0}")]
    Evaluation(String),

    /// Error during the weaving passes
    #[error("Weaving error: {0}")]
    Weaving(String),

    /// Referenced class does not exist in the compilation unit
    #[error("Unknown class: {0}")]
    UnknownClass(String),

    /// Referenced method does not exist on the class or its ancestors
    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Represents a contract violation
///
/// Three disjoint kinds, all fatal by default: they abort the call stack up
/// to the nearest catching frame. Each carries the declaring class, the
/// method signature, and the violated predicate's source text.
#[derive(Error, Debug, Clone)]
pub enum ContractViolation {
    /// Precondition violation (blames the caller)
    #[error("Precondition violated in '{}.{}'{}: {}",
        class,
        method,
        if let Some(p) = predicate { format!(" [{}]", p) } else { String::new() },
        message
    )]
    Precondition {
        class: String,
        method: String,
        predicate: Option<String>,
        message: String,
    },

    /// Postcondition violation (blames the implementation)
    #[error("Postcondition violated in '{}.{}'{}: {}",
        class,
        method,
        if let Some(p) = predicate { format!(" [{}]", p) } else { String::new() },
        message
    )]
    Postcondition {
        class: String,
        method: String,
        predicate: Option<String>,
        message: String,
    },

    /// Class invariant violation (blames whoever corrupted the state)
    #[error("Class invariant violated in '{}'{}{}: {}",
        class,
        if let Some(m) = method { format!(" after '{}'", m) } else { String::new() },
        if let Some(p) = predicate { format!(" [{}]", p) } else { String::new() },
        message
    )]
    Invariant {
        class: String,
        method: Option<String>,
        predicate: Option<String>,
        message: String,
    },
}

impl ContractViolation {
    /// Create a new contract violation of the given kind
    pub fn new(
        kind: AssertionKind,
        class: String,
        method: Option<String>,
        predicate: Option<String>,
        message: String,
    ) -> Self {
        match kind {
            AssertionKind::Precondition => Self::Precondition {
                class,
                method: method.unwrap_or_default(),
                predicate,
                message,
            },
            AssertionKind::Postcondition => Self::Postcondition {
                class,
                method: method.unwrap_or_default(),
                predicate,
                message,
            },
            AssertionKind::Invariant => Self::Invariant {
                class,
                method,
                predicate,
                message,
            },
        }
    }

    /// The kind of assertion that was violated
    pub fn kind(&self) -> AssertionKind {
        match self {
            Self::Precondition { .. } => AssertionKind::Precondition,
            Self::Postcondition { .. } => AssertionKind::Postcondition,
            Self::Invariant { .. } => AssertionKind::Invariant,
        }
    }

    /// The declaring class of the violated assertion
    pub fn class_name(&self) -> &str {
        match self {
            Self::Precondition { class, .. }
            | Self::Postcondition { class, .. }
            | Self::Invariant { class, .. } => class,
        }
    }

    /// The method the violation was raised in, if any
    pub fn method_name(&self) -> Option<&str> {
        match self {
            Self::Precondition { method, .. } | Self::Postcondition { method, .. } => {
                Some(method)
            }
            Self::Invariant { method, .. } => method.as_deref(),
        }
    }

    /// Source text of the violated predicate, if available
    pub fn predicate_source(&self) -> Option<&str> {
        match self {
            Self::Precondition { predicate, .. }
            | Self::Postcondition { predicate, .. }
            | Self::Invariant { predicate, .. } => predicate.as_deref(),
        }
    }
}

/// Result type for contract operations
pub type ContractResult<T> = Result<T, ContractError>;
