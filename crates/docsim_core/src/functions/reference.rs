//! Function paths, references and handles.

use crate::error::{CoreError, CoreResult};
use std::fmt;

/// Prefix of every function handle string.
pub const HANDLE_PREFIX: &str = "function://";

/// A function inside a component: module path plus export name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionPath {
    module: String,
    export: String,
}

impl FunctionPath {
    /// Creates a path from its parts.
    #[must_use]
    pub fn new(module: impl Into<String>, export: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            export: export.into(),
        }
    }

    /// Parses `module:export`; a bare module names its `default` export.
    pub fn parse(name: &str) -> CoreResult<Self> {
        let (module, export) = name.split_once(':').unwrap_or((name, "default"));
        let module = module.trim_end_matches(".js");
        if module.is_empty() || export.is_empty() || export.contains(':') {
            return Err(CoreError::ModuleNotFound {
                path: name.to_string(),
            });
        }
        Ok(Self::new(module, export))
    }

    /// Returns the module path.
    #[must_use]
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Returns the export name.
    #[must_use]
    pub fn export(&self) -> &str {
        &self.export
    }
}

impl fmt::Display for FunctionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.module, self.export)
    }
}

/// How a caller names the function it wants to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FunctionReference {
    /// `module:export` in the caller's own component.
    Name(String),
    /// `module:export` in a child component of the caller.
    Component {
        /// Child component path, relative to the caller.
        component: String,
        /// `module:export` inside that component.
        name: String,
    },
    /// An opaque handle from `create_function_handle`.
    Handle(String),
}

impl FunctionReference {
    /// A function of the caller's component.
    #[must_use]
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    /// A function of a child component.
    #[must_use]
    pub fn component(component: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Component {
            component: component.into(),
            name: name.into(),
        }
    }

    /// A function handle.
    #[must_use]
    pub fn handle(handle: impl Into<String>) -> Self {
        Self::Handle(handle.into())
    }

    /// Resolves to an absolute component path and a function path.
    pub fn resolve(&self, caller_component: &str) -> CoreResult<(String, FunctionPath)> {
        match self {
            Self::Name(name) => Ok((caller_component.to_string(), FunctionPath::parse(name)?)),
            Self::Component { component, name } => Ok((
                join_component_path(caller_component, component),
                FunctionPath::parse(name)?,
            )),
            Self::Handle(handle) => parse_handle(handle),
        }
    }
}

impl From<&str> for FunctionReference {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for FunctionReference {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<&FunctionReference> for FunctionReference {
    fn from(reference: &FunctionReference) -> Self {
        reference.clone()
    }
}

/// Joins a child path onto a parent component path. The root is `""`.
#[must_use]
pub fn join_component_path(parent: &str, child: &str) -> String {
    if parent.is_empty() {
        child.to_string()
    } else if child.is_empty() {
        parent.to_string()
    } else {
        format!("{parent}/{child}")
    }
}

/// Encodes a resolved function as a handle string.
#[must_use]
pub fn format_handle(component: &str, path: &FunctionPath) -> String {
    format!("{HANDLE_PREFIX}{component};{path}")
}

fn parse_handle(handle: &str) -> CoreResult<(String, FunctionPath)> {
    let invalid = || CoreError::InvalidFunctionHandle {
        handle: handle.to_string(),
    };
    let rest = handle.strip_prefix(HANDLE_PREFIX).ok_or_else(invalid)?;
    let (component, path) = rest.split_once(';').ok_or_else(invalid)?;
    let path = FunctionPath::parse(path).map_err(|_| invalid())?;
    Ok((component.to_string(), path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_paths() {
        let path = FunctionPath::parse("messages:send").unwrap();
        assert_eq!(path.module(), "messages");
        assert_eq!(path.export(), "send");
        assert_eq!(FunctionPath::parse("dir/jobs").unwrap().export(), "default");
        assert_eq!(FunctionPath::parse("lib.js:run").unwrap().module(), "lib");
        assert!(FunctionPath::parse(":x").is_err());
        assert!(FunctionPath::parse("a:b:c").is_err());
    }

    #[test]
    fn names_resolve_in_caller_component() {
        let (component, path) = FunctionReference::from("lib:add").resolve("counter").unwrap();
        assert_eq!(component, "counter");
        assert_eq!(path.to_string(), "lib:add");
    }

    #[test]
    fn component_references_are_relative() {
        let reference = FunctionReference::component("counter", "lib:add");
        assert_eq!(reference.resolve("").unwrap().0, "counter");
        assert_eq!(reference.resolve("app").unwrap().0, "app/counter");
    }

    #[test]
    fn handles_round_trip() {
        let handle = format_handle("app/counter", &FunctionPath::new("lib", "add"));
        assert_eq!(handle, "function://app/counter;lib:add");
        let (component, path) = FunctionReference::handle(handle).resolve("elsewhere").unwrap();
        assert_eq!(component, "app/counter");
        assert_eq!(path, FunctionPath::new("lib", "add"));

        let root = format_handle("", &FunctionPath::new("messages", "send"));
        assert_eq!(FunctionReference::handle(root).resolve("x").unwrap().0, "");
    }

    #[test]
    fn bad_handles_rejected() {
        for bad in ["lib:add", "function://nosemicolon", "function://c;"] {
            assert!(matches!(
                FunctionReference::handle(bad).resolve(""),
                Err(CoreError::InvalidFunctionHandle { .. })
            ));
        }
    }
}
