//! # Session Namespace
//!
//! The variables a session's fragments share. Top-level `let` bindings land
//! in the Rhai scope and survive from one fragment to the next.

use crate::convert;
use crate::error::{Error, Result};
use rhai::{Dynamic, Scope};

/// Name under which the session context is seeded
pub const CONTEXT_VAR: &str = "context";

/// Variables persisted across fragments
#[derive(Debug, Clone, Default)]
pub struct Namespace {
    scope: Scope<'static>,
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a namespace holding `context`
    pub fn with_context(context: Dynamic) -> Self {
        let mut scope = Scope::new();
        scope.push_dynamic(CONTEXT_VAR, context);
        Self { scope }
    }

    /// Number of bindings, shadowed ones included
    pub fn len(&self) -> usize {
        self.scope.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scope.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.scope.contains(name)
    }

    /// The innermost binding of `name`
    pub fn get(&self, name: &str) -> Option<&Dynamic> {
        self.scope.get(name)
    }

    pub fn set(&mut self, name: &str, value: Dynamic) {
        self.scope.set_or_push(name, value);
    }

    /// Resolve a `FINAL_VAR` reference: strings as-is, anything else in its
    /// display form
    pub fn resolve_final(&self, name: &str) -> Result<String> {
        self.get(name)
            .map(convert::display)
            .ok_or_else(|| Error::unresolved_final_variable(name))
    }

    pub(crate) fn take_scope(&mut self) -> Scope<'static> {
        std::mem::take(&mut self.scope)
    }

    pub(crate) fn restore_scope(&mut self, scope: Scope<'static>) {
        self.scope = scope;
    }
}
