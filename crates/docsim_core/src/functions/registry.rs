//! Registered functions and lazily loaded modules.

use super::reference::FunctionPath;
use crate::context::{ActionCtx, MutationCtx, QueryCtx};
use crate::error::{CoreError, CoreResult};
use crate::http::{HttpRequest, HttpResponse, HttpRouter};
use crate::types::FunctionKind;
use docsim_values::{Validator, Value};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::debug;

/// A boxed, sendable future.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

type QueryFn = dyn Fn(QueryCtx, Value) -> BoxFuture<CoreResult<Value>> + Send + Sync;
type MutationFn = dyn Fn(MutationCtx, Value) -> BoxFuture<CoreResult<Value>> + Send + Sync;
type ActionFn = dyn Fn(ActionCtx, Value) -> BoxFuture<CoreResult<Value>> + Send + Sync;
type HttpFn = dyn Fn(ActionCtx, HttpRequest) -> BoxFuture<CoreResult<HttpResponse>> + Send + Sync;

/// The callable part of a registered function.
#[derive(Clone)]
pub(crate) enum Handler {
    Query(Arc<QueryFn>),
    Mutation(Arc<MutationFn>),
    Action(Arc<ActionFn>),
    Http(Arc<HttpFn>),
}

/// A function with its kind and validators.
#[derive(Clone)]
pub struct RegisteredFunction {
    handler: Handler,
    args: Option<Validator>,
    returns: Option<Validator>,
}

impl fmt::Debug for RegisteredFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredFunction")
            .field("kind", &self.kind())
            .field("args", &self.args)
            .field("returns", &self.returns)
            .finish()
    }
}

impl RegisteredFunction {
    fn new(handler: Handler) -> Self {
        Self {
            handler,
            args: None,
            returns: None,
        }
    }

    /// Declares the argument validator.
    #[must_use]
    pub fn args(mut self, validator: Validator) -> Self {
        self.args = Some(validator);
        self
    }

    /// Declares the return value validator.
    #[must_use]
    pub fn returns(mut self, validator: Validator) -> Self {
        self.returns = Some(validator);
        self
    }

    /// Returns the function kind.
    #[must_use]
    pub fn kind(&self) -> FunctionKind {
        match self.handler {
            Handler::Query(_) => FunctionKind::Query,
            Handler::Mutation(_) => FunctionKind::Mutation,
            Handler::Action(_) => FunctionKind::Action,
            Handler::Http(_) => FunctionKind::HttpAction,
        }
    }

    pub(crate) fn handler(&self) -> &Handler {
        &self.handler
    }

    /// Validates call arguments against the declared validator.
    pub fn validate_args(&self, args: &Value) -> CoreResult<()> {
        if let Some(validator) = &self.args {
            validator.validate(Some(args))?;
        }
        Ok(())
    }

    /// Validates a return value against the declared validator.
    pub fn validate_return(&self, value: &Value) -> CoreResult<()> {
        if let Some(validator) = &self.returns {
            validator.validate(Some(value))?;
        }
        Ok(())
    }
}

/// Wraps a read-only handler.
pub fn query<F, Fut>(handler: F) -> RegisteredFunction
where
    F: Fn(QueryCtx, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = CoreResult<Value>> + Send + 'static,
{
    RegisteredFunction::new(Handler::Query(Arc::new(
        move |ctx: QueryCtx, args: Value| -> BoxFuture<CoreResult<Value>> {
            Box::pin(handler(ctx, args))
        },
    )))
}

/// Wraps a transactional read-write handler.
pub fn mutation<F, Fut>(handler: F) -> RegisteredFunction
where
    F: Fn(MutationCtx, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = CoreResult<Value>> + Send + 'static,
{
    RegisteredFunction::new(Handler::Mutation(Arc::new(
        move |ctx: MutationCtx, args: Value| -> BoxFuture<CoreResult<Value>> {
            Box::pin(handler(ctx, args))
        },
    )))
}

/// Wraps an action handler.
pub fn action<F, Fut>(handler: F) -> RegisteredFunction
where
    F: Fn(ActionCtx, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = CoreResult<Value>> + Send + 'static,
{
    RegisteredFunction::new(Handler::Action(Arc::new(
        move |ctx: ActionCtx, args: Value| -> BoxFuture<CoreResult<Value>> {
            Box::pin(handler(ctx, args))
        },
    )))
}

/// Wraps an HTTP endpoint handler.
pub fn http_action<F, Fut>(handler: F) -> RegisteredFunction
where
    F: Fn(ActionCtx, HttpRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = CoreResult<HttpResponse>> + Send + 'static,
{
    RegisteredFunction::new(Handler::Http(Arc::new(
        move |ctx: ActionCtx, request: HttpRequest| -> BoxFuture<CoreResult<HttpResponse>> {
            Box::pin(handler(ctx, request))
        },
    )))
}

/// The exports of one module.
#[derive(Debug, Clone, Default)]
pub struct Module {
    exports: BTreeMap<String, Arc<RegisteredFunction>>,
}

impl Module {
    /// Creates an empty module.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an export.
    #[must_use]
    pub fn export(mut self, name: impl Into<String>, function: RegisteredFunction) -> Self {
        self.exports.insert(name.into(), Arc::new(function));
        self
    }

    /// Looks up an export.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<RegisteredFunction>> {
        self.exports.get(name)
    }

    /// Export names.
    pub fn export_names(&self) -> impl Iterator<Item = &str> {
        self.exports.keys().map(String::as_str)
    }
}

type ModuleLoader = Arc<dyn Fn() -> Module + Send + Sync>;

/// Module loaders for one component, plus its optional HTTP router.
///
/// Modules are built on first use and cached.
#[derive(Default)]
pub struct ModuleRegistry {
    loaders: BTreeMap<String, ModuleLoader>,
    loaded: Mutex<HashMap<String, Arc<Module>>>,
    http: Option<Arc<HttpRouter>>,
}

impl fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("modules", &self.loaders.keys().collect::<Vec<_>>())
            .field("loaded", &self.loaded.lock().len())
            .field("http", &self.http.is_some())
            .finish()
    }
}

impl ModuleRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a module loader under `path`, e.g. `"messages"`.
    #[must_use]
    pub fn module<F>(mut self, path: impl Into<String>, loader: F) -> Self
    where
        F: Fn() -> Module + Send + Sync + 'static,
    {
        self.loaders.insert(path.into(), Arc::new(loader));
        self
    }

    /// Attaches the HTTP router.
    #[must_use]
    pub fn http_router(mut self, router: HttpRouter) -> Self {
        self.http = Some(Arc::new(router));
        self
    }

    /// Returns the HTTP router, if any.
    #[must_use]
    pub fn router(&self) -> Option<&Arc<HttpRouter>> {
        self.http.as_ref()
    }

    /// Loads (or reuses) the module at `path`.
    pub fn load(&self, path: &str) -> CoreResult<Arc<Module>> {
        if let Some(module) = self.loaded.lock().get(path) {
            return Ok(Arc::clone(module));
        }
        let loader = self.loaders.get(path).ok_or_else(|| CoreError::ModuleNotFound {
            path: path.to_string(),
        })?;
        // loaders run unlocked
        let module = Arc::new(loader());
        debug!(module = path, "module loaded");
        let mut loaded = self.loaded.lock();
        Ok(Arc::clone(
            loaded.entry(path.to_string()).or_insert(module),
        ))
    }

    /// Resolves a function path to its registered function.
    pub fn resolve(&self, path: &FunctionPath) -> CoreResult<Arc<RegisteredFunction>> {
        let module = self.load(path.module())?;
        module
            .get(path.export())
            .cloned()
            .ok_or_else(|| CoreError::FunctionNotFound {
                module: path.module().to_string(),
                export: path.export().to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsim_values::v;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn registry(loads: Arc<AtomicUsize>) -> ModuleRegistry {
        ModuleRegistry::new().module("messages", move || {
            loads.fetch_add(1, Ordering::SeqCst);
            Module::new()
                .export("list", query(|_ctx, _args| async { Ok(Value::Array(vec![])) }))
                .export(
                    "send",
                    mutation(|_ctx, _args| async { Ok(Value::Null) })
                        .args(v::object([("body", v::string())])),
                )
        })
    }

    #[test]
    fn resolves_and_caches_modules() {
        let loads = Arc::new(AtomicUsize::new(0));
        let registry = registry(Arc::clone(&loads));
        let list = registry.resolve(&FunctionPath::new("messages", "list")).unwrap();
        assert_eq!(list.kind(), FunctionKind::Query);
        let send = registry.resolve(&FunctionPath::new("messages", "send")).unwrap();
        assert_eq!(send.kind(), FunctionKind::Mutation);
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn missing_module_and_export() {
        let registry = registry(Arc::new(AtomicUsize::new(0)));
        assert!(matches!(
            registry.resolve(&FunctionPath::new("nope", "x")),
            Err(CoreError::ModuleNotFound { .. })
        ));
        assert!(matches!(
            registry.resolve(&FunctionPath::new("messages", "nope")),
            Err(CoreError::FunctionNotFound { .. })
        ));
    }

    #[test]
    fn args_are_validated() {
        let registry = registry(Arc::new(AtomicUsize::new(0)));
        let send = registry.resolve(&FunctionPath::new("messages", "send")).unwrap();
        assert!(send
            .validate_args(&Value::object([("body", Value::from("hi"))]))
            .is_ok());
        let err = send
            .validate_args(&Value::object([("body", Value::Float64(1.0))]))
            .unwrap_err();
        assert!(err.to_string().contains(".body"));
    }
}
