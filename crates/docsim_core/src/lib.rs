//! # docsim Core
//!
//! In-process emulator of a transactional document database backend, for
//! running backend functions in tests without a server.
//!
//! This crate provides:
//! - Per-component document stores with nested write layers
//! - A query planner/executor with index ranges, text search and pagination
//! - Brute-force vector search over declared vector indexes
//! - A transaction manager that serializes top-level calls through one gate
//! - Scheduled functions driven by tokio timers
//! - Function registration, dispatch and HTTP routing
//! - [`TestHarness`], the surface tests drive
//!
//! ## Example
//!
//! ```rust
//! use docsim_core::{mutation, query, Module, ModuleRegistry, TestHarness, Value};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let modules = ModuleRegistry::new().module("tasks", || {
//!     Module::new()
//!         .export("add", mutation(|ctx, args| async move {
//!             Ok(Value::from(ctx.db.insert("tasks", args)?))
//!         }))
//!         .export("list", query(|ctx, _args| async move {
//!             let docs = ctx.db.query("tasks").collect()?;
//!             Ok(Value::Array(docs.iter().map(Value::from).collect()))
//!         }))
//! });
//!
//! let t = TestHarness::new(None, modules);
//! t.mutation("tasks:add", Value::object([("text", Value::from("write docs"))]))
//!     .await
//!     .unwrap();
//! let tasks = t.query("tasks:list", Value::empty_object()).await.unwrap();
//! assert_eq!(tasks.as_array().map(<[Value]>::len), Some(1));
//! # });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod context;
mod error;
mod functions;
mod harness;
mod http;
mod identity;
mod query;
mod runtime;
mod scheduler;
mod schema;
mod storage;
mod store;
mod subscription;
mod transaction;
mod types;
mod vector;

pub use config::Config;
pub use context::{
    ActionCtx, Auth, DatabaseReader, DatabaseWriter, MutationCtx, QueryCtx, RunCtx, Scheduler,
    SystemReader,
};
pub use error::{CoreError, CoreResult};
pub use functions::{
    action, format_handle, http_action, join_component_path, mutation, query, BoxFuture,
    FunctionPath, FunctionReference, Module, ModuleRegistry, RegisteredFunction, HANDLE_PREFIX,
};
pub use harness::TestHarness;
pub use http::{HttpRequest, HttpResponse, HttpRouter, Method, NO_MATCHING_ROUTE};
pub use identity::UserIdentity;
pub use query::{
    execute, matches_range, matches_search, paginate, text_matches, truthy, validate_range,
    validate_search, ArithmeticOp, Expression, FilterBuilder, IndexRangeBuilder, Order,
    PaginationOptions, PaginationResult, Query, QueryOperator, QueryPlan, QuerySource,
    RangeExpression, RangeOp, SearchFilter, SearchFilterBuilder, END_CURSOR,
};
pub use runtime::{Component, Runtime, ROOT_COMPONENT};
pub use scheduler::{JobState, ScheduledJob, SCHEDULED_FUNCTIONS_TABLE};
pub use schema::{
    index_key_fields, IndexDefinition, Schema, SearchIndexDefinition, TableDefinition,
    VectorIndexDefinition, BY_CREATION_TIME_INDEX, BY_ID_INDEX,
};
pub use storage::{ActionStorage, FileMetadata, StorageReader, StorageWriter, STORAGE_TABLE};
pub use store::{DocumentStore, LayerStack, PendingWrite, WriteLayer};
pub use subscription::{SubscriptionHandle, SubscriptionRegistry, UpdateCallback};
pub use transaction::{GatePermit, TransactionGate, TransactionManager, TransactionScope};
pub use types::{Document, FunctionKind, Patch, TransactionId};
pub use vector::{cosine_similarity, vector_search, VectorSearchQuery, VectorSearchResult};

pub use docsim_values::{v, DocumentId, ValidationError, Validator, Value, ValueError};
