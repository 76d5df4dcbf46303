//! The emulator runtime: components, dispatch and transactions.

use crate::config::Config;
use crate::context::{ActionCtx, CallContext, MutationCtx, QueryCtx};
use crate::error::{CoreError, CoreResult};
use crate::functions::{BoxFuture, FunctionPath, FunctionReference, Handler, ModuleRegistry};
use crate::http::{HttpRequest, HttpResponse};
use crate::identity::UserIdentity;
use crate::scheduler::SchedulerState;
use crate::schema::Schema;
use crate::storage::BlobStore;
use crate::store::DocumentStore;
use crate::subscription::SubscriptionRegistry;
use crate::transaction::TransactionManager;
use crate::types::FunctionKind;
use docsim_values::Value;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Path of the root component.
pub const ROOT_COMPONENT: &str = "";

/// An isolated unit: its own store, blobs and modules.
#[derive(Debug)]
pub struct Component {
    path: String,
    store: Arc<DocumentStore>,
    blobs: BlobStore,
    modules: ModuleRegistry,
}

impl Component {
    fn new(path: String, schema: Option<Schema>, modules: ModuleRegistry) -> Self {
        Self {
            path,
            store: Arc::new(DocumentStore::new(schema.map(Arc::new))),
            blobs: BlobStore::default(),
            modules,
        }
    }

    /// Component path; the root is `""`.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The component's document store.
    #[must_use]
    pub fn store(&self) -> &Arc<DocumentStore> {
        &self.store
    }

    pub(crate) fn blobs(&self) -> &BlobStore {
        &self.blobs
    }

    /// The component's modules.
    #[must_use]
    pub fn modules(&self) -> &ModuleRegistry {
        &self.modules
    }
}

/// Which function kinds a call accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Expected {
    Kind(FunctionKind),
    /// Scheduled jobs may target mutations and actions.
    Scheduled,
}

impl Expected {
    fn accepts(self, kind: FunctionKind) -> bool {
        match self {
            Self::Kind(expected) => expected == kind,
            Self::Scheduled => matches!(kind, FunctionKind::Mutation | FunctionKind::Action),
        }
    }

    fn describe(self) -> String {
        match self {
            Self::Kind(kind) => kind.to_string(),
            Self::Scheduled => "mutation or action".to_string(),
        }
    }
}

/// A resolved call.
#[derive(Debug, Clone)]
pub(crate) struct Invocation {
    pub component: String,
    pub path: FunctionPath,
    pub expected: Expected,
    pub args: Value,
    pub identity: Option<UserIdentity>,
    pub nested: bool,
}

/// Shared emulator state.
///
/// Owned by a [`TestHarness`](crate::TestHarness); every context handed to
/// handler code holds an `Arc` back to it.
#[derive(Debug)]
pub struct Runtime {
    config: Config,
    components: RwLock<BTreeMap<String, Arc<Component>>>,
    transactions: TransactionManager,
    pub(crate) scheduler: SchedulerState,
    pub(crate) subscriptions: Arc<SubscriptionRegistry>,
    query_calls: Mutex<HashMap<String, usize>>,
    epoch: AtomicU64,
}

impl Runtime {
    /// Creates a runtime with a root component.
    #[must_use]
    pub fn new(config: Config, schema: Option<Schema>, modules: ModuleRegistry) -> Arc<Self> {
        let root = Component::new(ROOT_COMPONENT.to_string(), schema, modules);
        let mut components = BTreeMap::new();
        components.insert(ROOT_COMPONENT.to_string(), Arc::new(root));
        Arc::new(Self {
            config,
            components: RwLock::new(components),
            transactions: TransactionManager::new(),
            scheduler: SchedulerState::default(),
            subscriptions: Arc::new(SubscriptionRegistry::default()),
            query_calls: Mutex::new(HashMap::new()),
            epoch: AtomicU64::new(0),
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Adds an isolated component at `path`.
    pub fn register_component(
        &self,
        path: impl Into<String>,
        schema: Option<Schema>,
        modules: ModuleRegistry,
    ) -> CoreResult<()> {
        if self.transactions.in_progress() {
            return Err(CoreError::transaction_in_progress("register a component"));
        }
        let path = path.into();
        if path.is_empty() {
            return Err(CoreError::invalid_operation(
                "the root component is registered when the runtime is created",
            ));
        }
        info!(component = %path, "component registered");
        self.components
            .write()
            .insert(path.clone(), Arc::new(Component::new(path, schema, modules)));
        Ok(())
    }

    /// Looks up a component.
    pub fn component(&self, path: &str) -> CoreResult<Arc<Component>> {
        self.components
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| CoreError::ComponentNotFound {
                path: path.to_string(),
            })
    }

    /// Paths of all components, root first.
    #[must_use]
    pub fn component_paths(&self) -> Vec<String> {
        self.components.read().keys().cloned().collect()
    }

    fn stores(&self) -> Vec<Arc<DocumentStore>> {
        self.components
            .read()
            .values()
            .map(|c| Arc::clone(&c.store))
            .collect()
    }

    /// Empties every store and forgets pending timers.
    pub fn reset(&self) -> CoreResult<()> {
        if self.transactions.in_progress() {
            return Err(CoreError::transaction_in_progress("reset the runtime"));
        }
        self.epoch.fetch_add(1, Ordering::SeqCst);
        for store in self.stores() {
            store.reset();
        }
        for component in self.components.read().values() {
            component.blobs.clear();
        }
        self.scheduler.clear();
        self.query_calls.lock().clear();
        info!("runtime reset");
        Ok(())
    }

    /// Generation counter bumped by every reset.
    pub(crate) fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Returns true while any transaction is open.
    #[must_use]
    pub fn transaction_in_progress(&self) -> bool {
        self.transactions.in_progress()
    }

    pub(crate) fn call_context(
        self: &Arc<Self>,
        component: &str,
        identity: Option<UserIdentity>,
    ) -> CoreResult<CallContext> {
        Ok(CallContext::new(
            Arc::clone(self),
            self.component(component)?,
            identity,
        ))
    }

    /// Resolves a reference made from `caller` into an invocation target.
    pub(crate) fn resolve(
        &self,
        caller: &str,
        reference: &FunctionReference,
    ) -> CoreResult<(String, FunctionPath)> {
        let (component, path) = reference.resolve(caller)?;
        // fail early on unknown components and functions
        self.component(&component)?.modules.resolve(&path)?;
        Ok((component, path))
    }

    /// Runs `body` inside a transaction, committing on success.
    ///
    /// Successful top-level transactions refresh live subscriptions when
    /// `refresh` is set.
    pub(crate) async fn transact<T, Fut>(self: &Arc<Self>, nested: bool, refresh: bool, body: Fut) -> CoreResult<T>
    where
        Fut: Future<Output = CoreResult<T>>,
    {
        let scope = self.transactions.begin(self.stores(), nested).await;
        match body.await {
            Ok(value) => {
                scope.commit()?;
                if refresh && !nested {
                    self.refresh_subscriptions().await;
                }
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = scope.rollback() {
                    error!(error = %rollback, "rollback failed");
                }
                Err(e)
            }
        }
    }

    /// Runs a synchronous closure against one component's store in its own
    /// top-level transaction.
    pub(crate) async fn system_transaction<T>(
        self: &Arc<Self>,
        component: &str,
        body: impl FnOnce(&DocumentStore) -> CoreResult<T>,
    ) -> CoreResult<T> {
        let component = self.component(component)?;
        self.transact(false, false, async move { body(component.store.as_ref()) })
            .await
    }

    /// Invokes a function.
    pub(crate) fn invoke(self: &Arc<Self>, invocation: Invocation) -> BoxFuture<CoreResult<Value>> {
        let runtime = Arc::clone(self);
        Box::pin(async move {
            let Invocation {
                component,
                path,
                expected,
                args,
                identity,
                nested,
            } = invocation;

            let target = runtime.component(&component)?;
            let function = target.modules.resolve(&path)?;
            let kind = function.kind();
            if !expected.accepts(kind) {
                return Err(CoreError::FunctionKindMismatch {
                    path: path.to_string(),
                    expected: expected.describe(),
                    actual: kind.to_string(),
                });
            }
            function.validate_args(&args)?;

            debug!(function = %path, component = %component, %kind, nested, "invoking function");
            if kind == FunctionKind::Query {
                runtime.record_query_call(&component, &path);
            }

            let call = CallContext::new(Arc::clone(&runtime), target, identity);
            let handler = function.handler().clone();
            let body = async move {
                let value = match handler {
                    Handler::Query(h) => h(QueryCtx::new(call), args).await?,
                    Handler::Mutation(h) => h(MutationCtx::new(call), args).await?,
                    Handler::Action(h) => h(ActionCtx::new(call), args).await?,
                    Handler::Http(_) => {
                        return Err(CoreError::invalid_operation(
                            "HTTP actions can only be called through fetch",
                        ))
                    }
                };
                function.validate_return(&value)?;
                Ok(value)
            };
            runtime
                .transact(nested, kind != FunctionKind::Query, body)
                .await
        })
    }

    /// Routes a request to the root component's HTTP router.
    pub(crate) async fn fetch(
        self: &Arc<Self>,
        request: HttpRequest,
        identity: Option<UserIdentity>,
    ) -> CoreResult<HttpResponse> {
        let root = self.component(ROOT_COMPONENT)?;
        let function = root
            .modules
            .router()
            .and_then(|router| router.lookup(request.method, request.route_path()));
        let Some(function) = function else {
            debug!(method = %request.method, path = %request.path, "no matching route");
            return Ok(HttpResponse::not_found());
        };
        let Handler::Http(handler) = function.handler().clone() else {
            return Err(CoreError::invalid_operation("route target is not an HTTP action"));
        };

        debug!(method = %request.method, path = %request.path, "fetch");
        let call = CallContext::new(Arc::clone(self), root, identity);
        self.transact(false, true, handler(ActionCtx::new(call), request))
            .await
    }

    fn query_key(component: &str, path: &FunctionPath) -> String {
        if component.is_empty() {
            path.to_string()
        } else {
            format!("{component}#{path}")
        }
    }

    fn record_query_call(&self, component: &str, path: &FunctionPath) {
        *self
            .query_calls
            .lock()
            .entry(Self::query_key(component, path))
            .or_default() += 1;
    }

    /// How many times a query has run.
    pub fn query_call_count(&self, component: &str, path: &FunctionPath) -> usize {
        self.query_calls
            .lock()
            .get(&Self::query_key(component, path))
            .copied()
            .unwrap_or(0)
    }

    /// Clears every query call counter.
    pub fn reset_query_call_counts(&self) {
        self.query_calls.lock().clear();
    }

    /// Re-runs every live subscription and notifies those whose result changed.
    pub(crate) async fn refresh_subscriptions(self: &Arc<Self>) {
        for subscription in self.subscriptions.snapshot() {
            let result = self
                .invoke(Invocation {
                    component: subscription.component.clone(),
                    path: subscription.path.clone(),
                    expected: Expected::Kind(FunctionKind::Query),
                    args: subscription.args.clone(),
                    identity: subscription.identity.clone(),
                    nested: false,
                })
                .await;
            match result {
                Ok(value) => self.subscriptions.deliver(subscription.id, value),
                Err(e) => {
                    warn!(subscription = subscription.id, function = %subscription.path, error = %e, "subscription query failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::{mutation, query, Module};
    use serde_json::json;

    fn runtime() -> Arc<Runtime> {
        let modules = ModuleRegistry::new().module("counter", || {
            Module::new()
                .export(
                    "get",
                    query(|ctx, _args| async move {
                        let docs = ctx.db.query("counters").collect()?;
                        Ok(Value::Float64(docs.len() as f64))
                    }),
                )
                .export(
                    "bump",
                    mutation(|ctx, _args| async move {
                        ctx.db.insert("counters", json!({}))?;
                        Ok(Value::Null)
                    }),
                )
                .export(
                    "fail",
                    mutation(|ctx, _args| async move {
                        ctx.db.insert("counters", json!({}))?;
                        Err(CoreError::handler("nope"))
                    }),
                )
        });
        Runtime::new(Config::default(), None, modules)
    }

    fn call(path: &str, kind: FunctionKind) -> Invocation {
        Invocation {
            component: ROOT_COMPONENT.to_string(),
            path: FunctionPath::parse(path).unwrap(),
            expected: Expected::Kind(kind),
            args: Value::empty_object(),
            identity: None,
            nested: false,
        }
    }

    #[tokio::test]
    async fn mutation_commits_and_query_reads() {
        let runtime = runtime();
        runtime
            .invoke(call("counter:bump", FunctionKind::Mutation))
            .await
            .unwrap();
        let count = runtime
            .invoke(call("counter:get", FunctionKind::Query))
            .await
            .unwrap();
        assert_eq!(count, Value::Float64(1.0));
        assert!(!runtime.transaction_in_progress());
    }

    #[tokio::test]
    async fn failing_mutation_rolls_back() {
        let runtime = runtime();
        let err = runtime
            .invoke(call("counter:fail", FunctionKind::Mutation))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "nope");
        let count = runtime
            .invoke(call("counter:get", FunctionKind::Query))
            .await
            .unwrap();
        assert_eq!(count, Value::Float64(0.0));
    }

    #[tokio::test]
    async fn kind_mismatch_is_reported() {
        let runtime = runtime();
        let err = runtime
            .invoke(call("counter:bump", FunctionKind::Query))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::FunctionKindMismatch { .. }));
        assert!(err.to_string().contains("is a mutation, not a query"));
    }

    #[tokio::test]
    async fn query_calls_are_counted() {
        let runtime = runtime();
        let path = FunctionPath::parse("counter:get").unwrap();
        for _ in 0..2 {
            runtime
                .invoke(call("counter:get", FunctionKind::Query))
                .await
                .unwrap();
        }
        assert_eq!(runtime.query_call_count(ROOT_COMPONENT, &path), 2);
        runtime.reset_query_call_counts();
        assert_eq!(runtime.query_call_count(ROOT_COMPONENT, &path), 0);
    }

    #[tokio::test]
    async fn reset_clears_documents() {
        let runtime = runtime();
        runtime
            .invoke(call("counter:bump", FunctionKind::Mutation))
            .await
            .unwrap();
        runtime.reset().unwrap();
        let count = runtime
            .invoke(call("counter:get", FunctionKind::Query))
            .await
            .unwrap();
        assert_eq!(count, Value::Float64(0.0));
    }

    #[test]
    fn components_register_and_resolve() {
        let runtime = runtime();
        runtime
            .register_component("child", None, ModuleRegistry::new())
            .unwrap();
        assert_eq!(runtime.component_paths(), vec!["", "child"]);
        assert!(runtime.component("missing").is_err());
        assert!(runtime
            .register_component("", None, ModuleRegistry::new())
            .is_err());
    }
}
