//! Expression translators.
//!
//! A translator is a visitor compiling a criteria into a backend-specific
//! artifact: an in-process closure, a document-store filter, and so on.
//! Composite nodes are canonicalized into the logical vocabulary before
//! dispatch, so implementations only handle comparisons and logical nodes.

pub mod closure;

use crate::criteria::SortKey;
use crate::error::DomainError;
use crate::expression::{Comparison, Expression, Logical};

pub use closure::{ClosureTranslator, Comparator, Predicate, Slice};

/// Compiles criteria into a backend-specific query artifact.
pub trait Translator {
    /// Artifact produced for a predicate expression.
    type Filter;
    /// Artifact produced for a list of sort keys.
    type Orderings;
    /// Artifact produced for an offset/limit pair.
    type Slicing;

    /// Translates a comparison leaf.
    ///
    /// # Errors
    ///
    /// Returns an error if the operator or operand cannot be expressed by
    /// the backend.
    fn translate_comparison(&self, comparison: &Comparison) -> Result<Self::Filter, DomainError>;

    /// Translates a logical node. Implementations call [`Translator::dispatch`]
    /// on each sub-expression.
    ///
    /// # Errors
    ///
    /// Propagates errors from translating sub-expressions.
    fn translate_logical(&self, logical: &Logical) -> Result<Self::Filter, DomainError>;

    /// Translates sort keys.
    fn translate_orderings(orderings: &[SortKey]) -> Self::Orderings;

    /// Translates an offset/limit pair.
    fn translate_slicing(offset: Option<usize>, limit: Option<usize>) -> Self::Slicing;

    /// Routes a node to the matching extension point.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::UnsupportedComposite` for a composite node with
    /// no logical counterpart, or any error raised by the extension points.
    fn dispatch(&self, expression: &Expression) -> Result<Self::Filter, DomainError> {
        match expression {
            Expression::Comparison(comparison) => self.translate_comparison(comparison),
            Expression::Logical(logical) => self.translate_logical(logical),
            Expression::Composite(_) => self.dispatch(&expression.canonicalize()?),
        }
    }

    /// Canonicalizes and translates a whole expression tree.
    ///
    /// # Errors
    ///
    /// See [`Translator::dispatch`].
    fn translate_expression(&self, expression: &Expression) -> Result<Self::Filter, DomainError> {
        self.dispatch(&expression.canonicalize()?)
    }
}
