//! Update-expression builder.
//!
//! Turns a sparse [`TaskPatch`] into the smallest `SET` expression that
//! applies it, in the `UpdateExpression` / `ExpressionAttributeNames` /
//! `ExpressionAttributeValues` shape of a DynamoDB `UpdateItem` call.
//!
//! Rules:
//!
//! - Only fields present in the patch produce an assignment. `None` is "leave
//!   alone"; `Some("")` is "set to empty".
//! - Every value is bound through a `:field` placeholder, never inlined.
//! - An attribute whose name is a reserved word of the expression grammar
//!   (`status` is the one that bites) is referenced through a `#field` alias.
//! - `updatedAt = :updatedAt` is always the last assignment, and does not
//!   count as a change: [`UpdateExpression::has_semantic_fields`] reports
//!   whether anything else was set.
//!
//! # Examples
//!
//! ```
//! use pkce_tasks::store::expression::UpdateExpression;
//! use pkce_tasks::types::TaskPatch;
//!
//! let patch = TaskPatch {
//!     status: Some("done".to_string()),
//!     ..TaskPatch::default()
//! };
//! let update = UpdateExpression::from_patch(&patch, "2025-01-01T00:00:00.000Z").unwrap();
//! assert_eq!(update.expression(), "SET #status = :status, updatedAt = :updatedAt");
//! assert_eq!(update.attribute_names()["#status"], "status");
//! assert!(update.has_semantic_fields());
//! ```

use std::collections::BTreeMap;

use crate::error::TaskError;
use crate::types::task::{TaskPatch, TaskStatus};

/// Attribute refreshed on every successful mutation.
pub const UPDATED_AT: &str = "updatedAt";

/// Reserved words of the update-expression grammar that can plausibly
/// collide with an attribute name. Compared case-insensitively.
const RESERVED_WORDS: &[&str] = &[
    "ABORT", "ALL", "AND", "AS", "ASC", "BETWEEN", "BY", "COMMENT", "COUNT", "DATA", "DATE",
    "DAY", "DELETE", "DESC", "GROUP", "HOUR", "IN", "INDEX", "KEY", "LIMIT", "NAME", "NOT",
    "NULL", "OR", "ORDER", "OWNER", "SET", "SIZE", "STATE", "STATUS", "TABLE", "TEXT", "TIME",
    "TIMESTAMP", "TTL", "TYPE", "UPDATE", "USER", "USERS", "VALUE", "VALUES", "VIEW", "YEAR",
    "ZONE",
];

/// Returns `true` if `attribute` must be aliased in an expression.
pub fn is_reserved_word(attribute: &str) -> bool {
    RESERVED_WORDS
        .iter()
        .any(|word| word.eq_ignore_ascii_case(attribute))
}

/// One `path = :placeholder` clause.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Assignment {
    attribute: String,
    path: String,
    placeholder: String,
}

/// A ready-to-send `SET` expression with its name and value bindings.
///
/// Backends either forward the three parts verbatim (DynamoDB) or walk
/// [`assignments`](Self::assignments) to apply the resolved attribute/value
/// pairs (in-memory).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateExpression {
    assignments: Vec<Assignment>,
    names: BTreeMap<String, String>,
    values: BTreeMap<String, String>,
    semantic_fields: usize,
}

impl UpdateExpression {
    /// Starts an empty builder.
    pub fn builder() -> UpdateExpressionBuilder {
        UpdateExpressionBuilder::default()
    }

    /// Validates `patch` and builds its expression.
    ///
    /// Checks run before anything is built, so a rejected patch never
    /// reaches storage:
    ///
    /// - a present `status` outside the enum fails with
    ///   [`TaskError::InvalidStatus`];
    /// - a present `title` that is blank fails with [`TaskError::InvalidTitle`].
    ///
    /// A patch with no recognized fields is *not* rejected here; it yields
    /// an expression whose [`has_semantic_fields`](Self::has_semantic_fields)
    /// is `false`, and the store decides.
    ///
    /// # Errors
    ///
    /// See above.
    pub fn from_patch(patch: &TaskPatch, updated_at: &str) -> Result<Self, TaskError> {
        let status = patch
            .status
            .as_deref()
            .map(str::parse::<TaskStatus>)
            .transpose()?;

        if patch.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(TaskError::InvalidTitle);
        }

        Ok(Self::builder()
            .set_if_present("title", patch.title.as_deref())
            .set_if_present("description", patch.description.as_deref())
            .set_if_present("status", status.as_ref().map(TaskStatus::as_str))
            .build(updated_at))
    }

    /// Renders the `SET ...` expression string.
    pub fn expression(&self) -> String {
        let clauses: Vec<String> = self
            .assignments
            .iter()
            .map(|a| format!("{} = {}", a.path, a.placeholder))
            .collect();
        format!("SET {}", clauses.join(", "))
    }

    /// `#alias -> attribute` bindings. Empty when no reserved word is used.
    pub fn attribute_names(&self) -> &BTreeMap<String, String> {
        &self.names
    }

    /// `:placeholder -> value` bindings.
    pub fn attribute_values(&self) -> &BTreeMap<String, String> {
        &self.values
    }

    /// Resolved `(attribute, value)` pairs in expression order.
    pub fn assignments(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.assignments.iter().filter_map(|a| {
            self.values
                .get(&a.placeholder)
                .map(|value| (a.attribute.as_str(), value.as_str()))
        })
    }

    /// `true` if at least one assignment other than `updatedAt` is present.
    pub fn has_semantic_fields(&self) -> bool {
        self.semantic_fields > 0
    }
}

/// Accumulates assignments for an [`UpdateExpression`].
#[derive(Debug, Default)]
pub struct UpdateExpressionBuilder {
    assignments: Vec<Assignment>,
    names: BTreeMap<String, String>,
    values: BTreeMap<String, String>,
}

impl UpdateExpressionBuilder {
    /// Adds `attribute = value`.
    ///
    /// Setting the same attribute twice keeps the first clause and the last
    /// value.
    pub fn set(mut self, attribute: &str, value: impl Into<String>) -> Self {
        self.push(attribute, value.into());
        self
    }

    /// Adds `attribute = value` only when `value` is `Some`.
    pub fn set_if_present(self, attribute: &str, value: Option<&str>) -> Self {
        match value {
            Some(v) => self.set(attribute, v),
            None => self,
        }
    }

    /// Appends `updatedAt = :updatedAt` and finishes the expression.
    pub fn build(mut self, updated_at: impl Into<String>) -> UpdateExpression {
        let semantic_fields = self
            .assignments
            .iter()
            .filter(|a| a.attribute != UPDATED_AT)
            .count();
        self.assignments.retain(|a| a.attribute != UPDATED_AT);
        self.push(UPDATED_AT, updated_at.into());

        UpdateExpression {
            assignments: self.assignments,
            names: self.names,
            values: self.values,
            semantic_fields,
        }
    }

    fn push(&mut self, attribute: &str, value: String) {
        let placeholder = format!(":{attribute}");
        if !self.assignments.iter().any(|a| a.attribute == attribute) {
            let path = if is_reserved_word(attribute) {
                let alias = format!("#{attribute}");
                self.names.insert(alias.clone(), attribute.to_string());
                alias
            } else {
                attribute.to_string()
            };
            self.assignments.push(Assignment {
                attribute: attribute.to_string(),
                path,
                placeholder: placeholder.clone(),
            });
        }
        self.values.insert(placeholder, value);
    }
}
