//! Function registration and references.

mod reference;
mod registry;

pub use reference::{format_handle, join_component_path, FunctionPath, FunctionReference, HANDLE_PREFIX};
pub(crate) use registry::Handler;
pub use registry::{
    action, http_action, mutation, query, BoxFuture, Module, ModuleRegistry, RegisteredFunction,
};
