//! The public test harness.

use crate::config::Config;
use crate::context::RunCtx;
use crate::error::{CoreError, CoreResult};
use crate::functions::{FunctionReference, ModuleRegistry};
use crate::http::{HttpRequest, HttpResponse};
use crate::identity::UserIdentity;
use crate::runtime::{Expected, Invocation, Runtime, ROOT_COMPONENT};
use crate::scheduler::{ScheduledJob, SCHEDULED_FUNCTIONS_TABLE};
use crate::schema::Schema;
use crate::subscription::SubscriptionHandle;
use crate::types::FunctionKind;
use docsim_values::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Drives functions against an in-memory backend.
///
/// Every call made through the harness is a top-level call: it waits for
/// any other top-level call to finish, runs in its own transaction and
/// commits on success.
///
/// ```no_run
/// use docsim_core::{mutation, query, Module, ModuleRegistry, TestHarness, Value};
///
/// # async fn demo() -> docsim_core::CoreResult<()> {
/// let modules = ModuleRegistry::new().module("counter", || {
///     Module::new()
///         .export("bump", mutation(|ctx, _args| async move {
///             ctx.db.insert("counters", Value::empty_object())?;
///             Ok(Value::Null)
///         }))
///         .export("count", query(|ctx, _args| async move {
///             Ok(Value::Float64(ctx.db.query("counters").collect()?.len() as f64))
///         }))
/// });
/// let t = TestHarness::new(None, modules);
/// t.mutation("counter:bump", Value::empty_object()).await?;
/// assert_eq!(t.query("counter:count", Value::empty_object()).await?, Value::Float64(1.0));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct TestHarness {
    runtime: Arc<Runtime>,
    identity: Option<UserIdentity>,
}

impl TestHarness {
    /// Creates a harness with the default configuration.
    #[must_use]
    pub fn new(schema: Option<Schema>, modules: ModuleRegistry) -> Self {
        Self::with_config(Config::default(), schema, modules)
    }

    /// Creates a harness with a custom configuration.
    #[must_use]
    pub fn with_config(config: Config, schema: Option<Schema>, modules: ModuleRegistry) -> Self {
        Self {
            runtime: Runtime::new(config, schema, modules),
            identity: None,
        }
    }

    /// Returns the underlying runtime.
    #[must_use]
    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    /// Returns a harness sharing this one's state whose calls run as
    /// `identity`.
    ///
    /// Missing `subject`, `issuer` and `tokenIdentifier` are derived from the
    /// other claims, so the same claims always give the same user.
    #[must_use]
    pub fn with_identity(&self, identity: UserIdentity) -> Self {
        Self {
            runtime: Arc::clone(&self.runtime),
            identity: Some(identity.with_defaults(&self.runtime.config().identity_issuer)),
        }
    }

    /// The identity calls run as.
    #[must_use]
    pub fn identity(&self) -> Option<&UserIdentity> {
        self.identity.as_ref()
    }

    async fn call(
        &self,
        reference: FunctionReference,
        kind: FunctionKind,
        args: Value,
    ) -> CoreResult<Value> {
        let (component, path) = self.runtime.resolve(ROOT_COMPONENT, &reference)?;
        self.runtime
            .invoke(Invocation {
                component,
                path,
                expected: Expected::Kind(kind),
                args,
                identity: self.identity.clone(),
                nested: false,
            })
            .await
    }

    /// Runs a query.
    pub async fn query(&self, reference: impl Into<FunctionReference>, args: impl Into<Value>) -> CoreResult<Value> {
        self.call(reference.into(), FunctionKind::Query, args.into())
            .await
    }

    /// Runs a mutation.
    pub async fn mutation(&self, reference: impl Into<FunctionReference>, args: impl Into<Value>) -> CoreResult<Value> {
        self.call(reference.into(), FunctionKind::Mutation, args.into())
            .await
    }

    /// Runs an action.
    pub async fn action(&self, reference: impl Into<FunctionReference>, args: impl Into<Value>) -> CoreResult<Value> {
        self.call(reference.into(), FunctionKind::Action, args.into())
            .await
    }

    /// Runs `body` with direct access to the root component's store.
    ///
    /// Writes skip nothing but argument validation: schema validation
    /// still applies. The block commits if it returns `Ok`.
    pub async fn run<F, Fut, T>(&self, body: F) -> CoreResult<T>
    where
        F: FnOnce(RunCtx) -> Fut,
        Fut: Future<Output = CoreResult<T>>,
    {
        let call = self
            .runtime
            .call_context(ROOT_COMPONENT, self.identity.clone())?;
        self.runtime
            .transact(false, true, async move { body(RunCtx::new(&call)).await })
            .await
    }

    /// Sends a request to the root component's HTTP router.
    pub async fn fetch(&self, request: HttpRequest) -> CoreResult<HttpResponse> {
        self.runtime.fetch(request, self.identity.clone()).await
    }

    /// Adds an isolated component at `path`.
    pub fn register_component(
        &self,
        path: impl Into<String>,
        schema: Option<Schema>,
        modules: ModuleRegistry,
    ) -> CoreResult<()> {
        self.runtime.register_component(path, schema, modules)
    }

    /// Waits for every scheduled function that is due or running to finish.
    pub async fn finish_in_progress_scheduled_functions(&self) {
        self.runtime.scheduler.finish_in_progress().await;
    }

    /// Alternates `advance` and waiting for due functions until no
    /// scheduled function is left.
    ///
    /// Fails with [`CoreError::SchedulerRunaway`] after
    /// [`Config::max_scheduler_iterations`] rounds.
    pub async fn finish_all_scheduled_functions<F, Fut>(&self, advance: F) -> CoreResult<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ()>,
    {
        let max = self.runtime.config().max_scheduler_iterations;
        self.runtime.scheduler.finish_all(max, advance).await
    }

    /// Moves the paused tokio clock forward.
    ///
    /// # Panics
    ///
    /// Panics unless the tokio clock is paused.
    pub async fn advance_timers(&self, by: Duration) {
        tokio::time::advance(by).await;
    }

    /// Moves the paused tokio clock to the latest armed scheduler deadline.
    ///
    /// # Panics
    ///
    /// Panics unless the tokio clock is paused.
    pub async fn run_all_timers(&self) {
        if let Some(deadline) = self.runtime.scheduler.latest_deadline() {
            let now = Instant::now();
            if deadline > now {
                tokio::time::advance(deadline - now).await;
            }
        }
        tokio::task::yield_now().await;
    }

    /// Every job in every component's `_scheduled_functions` table.
    pub async fn scheduled_jobs(&self) -> CoreResult<Vec<ScheduledJob>> {
        let mut jobs = Vec::new();
        for component in self.runtime.component_paths() {
            let docs = self
                .runtime
                .system_transaction(&component, |store| {
                    Ok(store.table_documents(SCHEDULED_FUNCTIONS_TABLE))
                })
                .await?;
            for doc in &docs {
                jobs.push(ScheduledJob::from_document(doc)?);
            }
        }
        Ok(jobs)
    }

    /// Subscribes to a query.
    ///
    /// The query runs now and after every committed top-level write;
    /// `callback` receives each result that differs from the previous one.
    pub async fn on_update<F>(
        &self,
        reference: impl Into<FunctionReference>,
        args: impl Into<Value>,
        callback: F,
    ) -> CoreResult<SubscriptionHandle>
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let (component, path) = self.runtime.resolve(ROOT_COMPONENT, &reference.into())?;
        let args = args.into();
        let registry = Arc::clone(&self.runtime.subscriptions);
        let id = registry.add(
            component.clone(),
            path.clone(),
            args.clone(),
            self.identity.clone(),
            Arc::new(callback),
        );
        let handle = SubscriptionHandle::new(id, &registry);
        let initial = self
            .runtime
            .invoke(Invocation {
                component,
                path,
                expected: Expected::Kind(FunctionKind::Query),
                args,
                identity: self.identity.clone(),
                nested: false,
            })
            .await?;
        registry.deliver(id, initial);
        Ok(handle)
    }

    /// How many times a query has run.
    pub fn query_call_count(&self, reference: impl Into<FunctionReference>) -> CoreResult<usize> {
        let (component, path) = self.runtime.resolve(ROOT_COMPONENT, &reference.into())?;
        Ok(self.runtime.query_call_count(&component, &path))
    }

    /// Clears every query call counter.
    pub fn reset_query_call_counts(&self) {
        self.runtime.reset_query_call_counts();
    }

    /// Empties every store and forgets pending scheduled functions.
    pub fn reset(&self) -> CoreResult<()> {
        self.runtime.reset()
    }

    /// Fails unless no transaction is open.
    pub fn ensure_idle(&self) -> CoreResult<()> {
        if self.runtime.transaction_in_progress() {
            return Err(CoreError::transaction_in_progress("continue"));
        }
        Ok(())
    }
}
