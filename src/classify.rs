//! Candidate classification for contract sites
//!
//! Pure predicates with no side effects: they decide which classes and
//! methods are eligible for weaving. Inherited methods are not re-classified
//! here; ancestor contributions flow through the combinator instead.

use crate::model::{ClassKind, ClassModel, MethodModel};

/// Whether a class is an eligible contract site
///
/// Interfaces, enums, generic placeholders, and synthetic classes are
/// excluded. Interfaces may still declare assertions that the combinator
/// folds into implementing classes.
pub fn is_candidate_class(class: &ClassModel) -> bool {
    !class.synthetic && class.kind == ClassKind::Class
}

/// Whether a method or constructor declared on `class` is eligible
///
/// Synthetic, static, abstract, and non-public members are excluded, as are
/// methods not declared directly on the class.
pub fn is_candidate_method(class: &ClassModel, method: &MethodModel) -> bool {
    method.declaring == class.id
        && method.modifiers.public
        && !method.modifiers.synthetic
        && !method.modifiers.is_static
        && !method.modifiers.is_abstract
}
