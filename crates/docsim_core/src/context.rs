//! Contexts handed to function handlers.
//!
//! Each context is bound to the component the function belongs to and to
//! the identity of the call. Capabilities grow with the function kind:
//! queries read, mutations also write and schedule, actions call other
//! functions, store files and run vector searches.

use crate::error::{CoreError, CoreResult};
use crate::functions::{format_handle, BoxFuture, FunctionReference};
use crate::identity::UserIdentity;
use crate::query::Query;
use crate::runtime::{Component, Expected, Invocation, Runtime};
use crate::scheduler::{self, unix_millis};
use crate::storage::{ActionStorage, StorageReader, StorageWriter};
use crate::store::DocumentStore;
use crate::types::{Document, FunctionKind, Patch};
use crate::vector::{vector_search, VectorSearchQuery, VectorSearchResult};
use docsim_values::identifier::is_system_table;
use docsim_values::{DocumentId, Value};
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

/// Runtime, component and identity of one call.
#[derive(Debug, Clone)]
pub(crate) struct CallContext {
    runtime: Arc<Runtime>,
    component: Arc<Component>,
    identity: Option<UserIdentity>,
}

impl CallContext {
    pub(crate) fn new(runtime: Arc<Runtime>, component: Arc<Component>, identity: Option<UserIdentity>) -> Self {
        Self {
            runtime,
            component,
            identity,
        }
    }

    fn store(&self) -> Arc<DocumentStore> {
        Arc::clone(self.component.store())
    }

    fn storage_reader(&self) -> StorageReader {
        StorageReader::new(
            Arc::clone(&self.component),
            self.runtime.config().storage_url_base.clone(),
        )
    }

    /// Runs a function as a nested call with the caller's identity.
    fn call(&self, reference: FunctionReference, kind: FunctionKind, args: Value) -> BoxFuture<CoreResult<Value>> {
        let resolved = self.runtime.resolve(self.component.path(), &reference);
        let runtime = Arc::clone(&self.runtime);
        let identity = self.identity.clone();
        Box::pin(async move {
            let (component, path) = resolved?;
            runtime
                .invoke(Invocation {
                    component,
                    path,
                    expected: Expected::Kind(kind),
                    args,
                    identity,
                    nested: true,
                })
                .await
        })
    }
}

/// Read access to the documents of the current component.
#[derive(Debug, Clone)]
pub struct DatabaseReader {
    store: Arc<DocumentStore>,
}

impl DatabaseReader {
    fn new(store: Arc<DocumentStore>) -> Self {
        Self { store }
    }

    /// Reads a document by id.
    pub fn get(&self, id: &DocumentId) -> CoreResult<Option<Document>> {
        reject_system(id.table())?;
        Ok(self.store.get(id))
    }

    /// Starts a query over `table`.
    #[must_use]
    pub fn query(&self, table: &str) -> Query {
        match reject_system(table) {
            Ok(()) => Query::new(Arc::clone(&self.store), table),
            Err(e) => Query::failed(Arc::clone(&self.store), table, e),
        }
    }

    /// Parses `id` as an id of `table`.
    #[must_use]
    pub fn normalize_id(&self, table: &str, id: &str) -> Option<DocumentId> {
        self.store.normalize_id(table, id)
    }

    /// Read access to system tables such as `_scheduled_functions`.
    #[must_use]
    pub fn system(&self) -> SystemReader {
        SystemReader {
            store: Arc::clone(&self.store),
        }
    }
}

fn reject_system(table: &str) -> CoreResult<()> {
    if is_system_table(table) {
        return Err(CoreError::invalid_operation(format!(
            "system table `{table}` must be read through db.system()"
        )));
    }
    Ok(())
}

/// Read access to system tables.
#[derive(Debug, Clone)]
pub struct SystemReader {
    store: Arc<DocumentStore>,
}

impl SystemReader {
    /// Reads a system document by id.
    pub fn get(&self, id: &DocumentId) -> CoreResult<Option<Document>> {
        if !is_system_table(id.table()) {
            return Err(CoreError::invalid_operation(format!(
                "`{}` is not a system table",
                id.table()
            )));
        }
        Ok(self.store.get(id))
    }

    /// Starts a query over a system table.
    #[must_use]
    pub fn query(&self, table: &str) -> Query {
        if is_system_table(table) {
            Query::new(Arc::clone(&self.store), table)
        } else {
            Query::failed(
                Arc::clone(&self.store),
                table,
                CoreError::invalid_operation(format!("`{table}` is not a system table")),
            )
        }
    }
}

/// Read and write access to the documents of the current component.
#[derive(Debug, Clone)]
pub struct DatabaseWriter {
    reader: DatabaseReader,
}

impl DatabaseWriter {
    fn new(store: Arc<DocumentStore>) -> Self {
        Self {
            reader: DatabaseReader::new(store),
        }
    }

    /// Inserts a document and returns its id.
    pub fn insert(&self, table: &str, value: impl Into<Value>) -> CoreResult<DocumentId> {
        self.reader.store.insert(table, value.into())
    }

    /// Shallow-merges fields into a document.
    pub fn patch(&self, id: &DocumentId, patch: &Patch) -> CoreResult<()> {
        self.reader.store.patch(id, patch)
    }

    /// Replaces all user fields of a document.
    pub fn replace(&self, id: &DocumentId, value: impl Into<Value>) -> CoreResult<()> {
        self.reader.store.replace(id, value.into())
    }

    /// Deletes a document.
    pub fn delete(&self, id: &DocumentId) -> CoreResult<()> {
        self.reader.store.delete(id)
    }
}

impl Deref for DatabaseWriter {
    type Target = DatabaseReader;

    fn deref(&self) -> &DatabaseReader {
        &self.reader
    }
}

/// The identity the call runs as.
#[derive(Debug, Clone, Default)]
pub struct Auth {
    identity: Option<UserIdentity>,
}

impl Auth {
    /// Returns the impersonated identity, if any.
    #[must_use]
    pub fn get_user_identity(&self) -> Option<&UserIdentity> {
        self.identity.as_ref()
    }
}

/// Schedules functions to run later.
#[derive(Debug, Clone)]
pub struct Scheduler {
    call: CallContext,
}

impl Scheduler {
    /// Runs `reference` after `delay`. Returns the job id.
    pub fn run_after(
        &self,
        delay: Duration,
        reference: impl Into<FunctionReference>,
        args: impl Into<Value>,
    ) -> CoreResult<DocumentId> {
        let target = self
            .call
            .runtime
            .resolve(self.call.component.path(), &reference.into())?;
        scheduler::schedule(
            &self.call.runtime,
            &self.call.component,
            target,
            delay,
            args.into(),
        )
    }

    /// Runs `reference` at `timestamp_ms` (milliseconds since the epoch).
    /// Past timestamps run as soon as possible.
    pub fn run_at(
        &self,
        timestamp_ms: f64,
        reference: impl Into<FunctionReference>,
        args: impl Into<Value>,
    ) -> CoreResult<DocumentId> {
        if !timestamp_ms.is_finite() {
            return Err(CoreError::invalid_operation(format!(
                "cannot schedule at timestamp {timestamp_ms}"
            )));
        }
        let delay_ms = (timestamp_ms - unix_millis()).max(0.0);
        let delay = Duration::try_from_secs_f64(delay_ms / 1000.0).map_err(|e| {
            CoreError::invalid_operation(format!("cannot schedule at timestamp {timestamp_ms}: {e}"))
        })?;
        self.run_after(delay, reference, args)
    }

    /// Cancels a pending job. Jobs already running or finished are unaffected.
    pub fn cancel(&self, job: &DocumentId) -> CoreResult<()> {
        scheduler::cancel(&self.call.component, job)
    }
}

/// Context of a query.
#[derive(Debug, Clone)]
pub struct QueryCtx {
    /// Document reads.
    pub db: DatabaseReader,
    /// Caller identity.
    pub auth: Auth,
    /// File URLs and metadata.
    pub storage: StorageReader,
    call: CallContext,
}

impl QueryCtx {
    pub(crate) fn new(call: CallContext) -> Self {
        Self {
            db: DatabaseReader::new(call.store()),
            auth: Auth {
                identity: call.identity.clone(),
            },
            storage: call.storage_reader(),
            call,
        }
    }

    /// Runs another query in the current transaction.
    pub fn run_query(&self, reference: impl Into<FunctionReference>, args: impl Into<Value>) -> BoxFuture<CoreResult<Value>> {
        self.call.call(reference.into(), FunctionKind::Query, args.into())
    }
}

/// Context of a mutation.
#[derive(Debug, Clone)]
pub struct MutationCtx {
    /// Document reads and writes.
    pub db: DatabaseWriter,
    /// Caller identity.
    pub auth: Auth,
    /// Function scheduling.
    pub scheduler: Scheduler,
    /// File URLs, metadata and deletion.
    pub storage: StorageWriter,
    call: CallContext,
}

impl MutationCtx {
    pub(crate) fn new(call: CallContext) -> Self {
        Self {
            db: DatabaseWriter::new(call.store()),
            auth: Auth {
                identity: call.identity.clone(),
            },
            scheduler: Scheduler { call: call.clone() },
            storage: StorageWriter::new(call.storage_reader()),
            call,
        }
    }

    /// Runs a query in the current transaction.
    pub fn run_query(&self, reference: impl Into<FunctionReference>, args: impl Into<Value>) -> BoxFuture<CoreResult<Value>> {
        self.call.call(reference.into(), FunctionKind::Query, args.into())
    }

    /// Runs a mutation as a nested transaction.
    pub fn run_mutation(
        &self,
        reference: impl Into<FunctionReference>,
        args: impl Into<Value>,
    ) -> BoxFuture<CoreResult<Value>> {
        self.call.call(reference.into(), FunctionKind::Mutation, args.into())
    }
}

/// Context of an action or HTTP action.
#[derive(Debug, Clone)]
pub struct ActionCtx {
    /// Caller identity.
    pub auth: Auth,
    /// Function scheduling.
    pub scheduler: Scheduler,
    /// Full file access.
    pub storage: ActionStorage,
    call: CallContext,
}

impl ActionCtx {
    pub(crate) fn new(call: CallContext) -> Self {
        Self {
            auth: Auth {
                identity: call.identity.clone(),
            },
            scheduler: Scheduler { call: call.clone() },
            storage: ActionStorage::new(StorageWriter::new(call.storage_reader())),
            call,
        }
    }

    /// Runs a query.
    pub fn run_query(&self, reference: impl Into<FunctionReference>, args: impl Into<Value>) -> BoxFuture<CoreResult<Value>> {
        self.call.call(reference.into(), FunctionKind::Query, args.into())
    }

    /// Runs a mutation. Mutations run from one action are not atomic with
    /// each other.
    pub fn run_mutation(
        &self,
        reference: impl Into<FunctionReference>,
        args: impl Into<Value>,
    ) -> BoxFuture<CoreResult<Value>> {
        self.call.call(reference.into(), FunctionKind::Mutation, args.into())
    }

    /// Runs another action.
    pub fn run_action(&self, reference: impl Into<FunctionReference>, args: impl Into<Value>) -> BoxFuture<CoreResult<Value>> {
        self.call.call(reference.into(), FunctionKind::Action, args.into())
    }

    /// Nearest neighbours of a vector in a declared vector index.
    pub async fn vector_search(
        &self,
        table: &str,
        index: &str,
        query: VectorSearchQuery,
    ) -> CoreResult<Vec<VectorSearchResult>> {
        tokio::task::yield_now().await;
        vector_search(
            self.call.component.store(),
            self.call.runtime.config(),
            table,
            index,
            &query,
        )
    }

    /// Creates a handle string that other code can call the function by.
    pub fn create_function_handle(&self, reference: impl Into<FunctionReference>) -> CoreResult<String> {
        let (component, path) = self
            .call
            .runtime
            .resolve(self.call.component.path(), &reference.into())?;
        Ok(format_handle(&component, &path))
    }
}

/// Context of a [`TestHarness::run`](crate::TestHarness::run) block: direct
/// store access without argument validation.
#[derive(Debug, Clone)]
pub struct RunCtx {
    /// Document reads and writes.
    pub db: DatabaseWriter,
    /// Full file access.
    pub storage: ActionStorage,
}

impl RunCtx {
    pub(crate) fn new(call: &CallContext) -> Self {
        Self {
            db: DatabaseWriter::new(call.store()),
            storage: ActionStorage::new(StorageWriter::new(call.storage_reader())),
        }
    }
}
