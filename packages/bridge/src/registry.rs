//! The set of currently known operations.
//!
//! A registry is built whole from a list of operations and never mutated
//! piecemeal: reloading a backend builds a new registry and swaps it in.
//! Entries keep registration order for first-match routing, with an id
//! index on the side for direct lookup.

use std::collections::HashMap;

use opbridge_http::Method;

use crate::error::RegistryError;
use crate::operation::Operation;
use crate::route::{PathParams, RoutePattern};

#[derive(Debug, Clone)]
struct Entry {
    operation: Operation,
    pattern: RoutePattern,
}

/// A successful route lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteMatch<'a> {
    pub operation: &'a Operation,
    pub pattern: &'a RoutePattern,
    pub params: PathParams,
}

#[derive(Debug, Clone, Default)]
pub struct OperationRegistry {
    entries: Vec<Entry>,
    by_id: HashMap<String, usize>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a full operation set.
    ///
    /// Fails on the first empty id, duplicate id, or invalid path template.
    /// Operations without a summary get `"{METHOD} {path}"`.
    pub fn from_operations(
        operations: impl IntoIterator<Item = Operation>,
    ) -> Result<Self, RegistryError> {
        let mut registry = Self::new();

        for mut operation in operations {
            if operation.operation_id.is_empty() {
                return Err(RegistryError::MissingOperationId {
                    path: operation.path,
                });
            }
            if registry.by_id.contains_key(&operation.operation_id) {
                return Err(RegistryError::DuplicateOperation {
                    operation_id: operation.operation_id,
                });
            }

            let pattern = RoutePattern::compile(&operation.path).map_err(|source| {
                RegistryError::InvalidRoute {
                    operation_id: operation.operation_id.clone(),
                    source,
                }
            })?;

            if operation.summary.is_none() {
                operation.summary = Some(operation.display_summary());
            }

            registry
                .by_id
                .insert(operation.operation_id.clone(), registry.entries.len());
            registry.entries.push(Entry { operation, pattern });
        }

        Ok(registry)
    }

    /// Replace the whole set. On error the current set is left untouched.
    pub fn register(
        &mut self,
        operations: impl IntoIterator<Item = Operation>,
    ) -> Result<(), RegistryError> {
        *self = Self::from_operations(operations)?;
        Ok(())
    }

    /// All operations in registration order.
    pub fn all(&self) -> Vec<Operation> {
        self.operations().cloned().collect()
    }

    pub fn operations(&self) -> impl Iterator<Item = &Operation> {
        self.entries.iter().map(|entry| &entry.operation)
    }

    pub fn get(&self, operation_id: &str) -> Option<&Operation> {
        self.by_id
            .get(operation_id)
            .map(|&index| &self.entries[index].operation)
    }

    /// First operation in registration order whose method and template
    /// match the request path.
    pub fn find(&self, method: Method, path: &str) -> Option<RouteMatch<'_>> {
        self.entries
            .iter()
            .filter(|entry| entry.operation.method == method)
            .find_map(|entry| {
                entry.pattern.match_path(path).map(|params| RouteMatch {
                    operation: &entry.operation,
                    pattern: &entry.pattern,
                    params,
                })
            })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
