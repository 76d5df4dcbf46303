//! Error types for docsim core.

use docsim_values::{ValidationError, ValueError};
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur while emulating the backend.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    /// A value or function argument did not match its validator.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// A value, id or name was malformed.
    #[error("{0}")]
    Value(#[from] ValueError),

    /// The id does not resolve to a live document.
    #[error("document not found: {id}")]
    DocumentNotFound {
        /// The id that was not found.
        id: String,
    },

    /// A write tried to change `_id` or `_creationTime`.
    #[error("cannot change system field `{field}` of document {id}")]
    SystemFieldMismatch {
        /// The system field.
        field: String,
        /// The document being written.
        id: String,
    },

    /// Schema validation is on and the table is not declared.
    #[error("table `{table}` is not declared in the schema")]
    TableNotInSchema {
        /// The undeclared table.
        table: String,
    },

    /// Commit or rollback with no open write layer.
    #[error("transaction already finished")]
    TransactionFinished,

    /// A setup call was made while a transaction is open.
    #[error("cannot {action} while a transaction is in progress")]
    TransactionInProgress {
        /// The attempted setup action.
        action: String,
    },

    /// The named index is not declared.
    #[error("index `{table}.{index}` not found")]
    IndexNotFound {
        /// Table name.
        table: String,
        /// Index name.
        index: String,
    },

    /// A chain of index range expressions is malformed.
    #[error("invalid index range: {message}")]
    InvalidIndexRange {
        /// What was wrong with the chain.
        message: String,
    },

    /// The named search index is not declared.
    #[error("search index `{table}.{index}` not found")]
    SearchIndexNotFound {
        /// Table name.
        table: String,
        /// Index name.
        index: String,
    },

    /// The named vector index is not declared.
    #[error("vector index `{table}.{index}` not found")]
    VectorIndexNotFound {
        /// Table name.
        table: String,
        /// Index name.
        index: String,
    },

    /// A query was built or used incorrectly.
    #[error("invalid query: {message}")]
    InvalidQuery {
        /// Description of the problem.
        message: String,
    },

    /// A filter expression could not be parsed or evaluated.
    #[error("invalid expression: {message}")]
    InvalidExpression {
        /// Description of the problem.
        message: String,
    },

    /// No component is registered at the path.
    #[error("no component registered at path {path:?}")]
    ComponentNotFound {
        /// The component path.
        path: String,
    },

    /// No module is registered at the path.
    #[error("no module registered at path {path:?}")]
    ModuleNotFound {
        /// The module path.
        path: String,
    },

    /// The module has no such export.
    #[error("module {module:?} has no export named {export:?}")]
    FunctionNotFound {
        /// Module path.
        module: String,
        /// Export name.
        export: String,
    },

    /// The resolved function is of a different kind than requested.
    #[error("function {path:?} is a {actual}, not a {expected}")]
    FunctionKindMismatch {
        /// Function path.
        path: String,
        /// Requested kind.
        expected: String,
        /// Registered kind.
        actual: String,
    },

    /// A function handle string could not be parsed.
    #[error("invalid function handle: {handle:?}")]
    InvalidFunctionHandle {
        /// The rejected handle.
        handle: String,
    },

    /// A scheduled job was observed in a state its lifecycle forbids.
    #[error("scheduled job {job} observed in unexpected state `{state}` (expected `{expected}`)")]
    SchedulerInvariant {
        /// The job id.
        job: String,
        /// State that was observed.
        state: String,
        /// State that was required.
        expected: String,
    },

    /// Draining scheduled functions did not converge.
    #[error(
        "scheduled functions still pending after {iterations} iterations; \
         a function is probably rescheduling itself forever"
    )]
    SchedulerRunaway {
        /// Iterations performed before giving up.
        iterations: usize,
    },

    /// A storage id does not resolve to a stored file.
    #[error("storage object not found: {id}")]
    StorageNotFound {
        /// The storage id.
        id: String,
    },

    /// Error raised by handler code.
    #[error("{message}")]
    Handler {
        /// The handler's message.
        message: String,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates a document not found error.
    pub fn document_not_found(id: impl ToString) -> Self {
        Self::DocumentNotFound { id: id.to_string() }
    }

    /// Creates an index range error.
    pub fn invalid_index_range(message: impl Into<String>) -> Self {
        Self::InvalidIndexRange {
            message: message.into(),
        }
    }

    /// Creates an invalid query error.
    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::InvalidQuery {
            message: message.into(),
        }
    }

    /// Creates an invalid expression error.
    pub fn invalid_expression(message: impl Into<String>) -> Self {
        Self::InvalidExpression {
            message: message.into(),
        }
    }

    /// Creates a handler error, the usual way for handler code to fail.
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates a transaction-in-progress error for a setup action.
    pub fn transaction_in_progress(action: impl Into<String>) -> Self {
        Self::TransactionInProgress {
            action: action.into(),
        }
    }

    /// Returns true for validation failures of arguments or documents.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::TableNotInSchema { .. })
    }
}
