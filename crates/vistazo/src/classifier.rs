//! UI-bound type classification.
//!
//! A type is UI-bound when it, or any of its supertypes, carries a
//! page-binding marker at type level or on any declared field. The first match
//! anywhere in the chain decides. Field visibility plays no part because
//! descriptors list every declared field.

use crate::descriptor::{TypeDescriptor, TypeRef};
use std::any::TypeId;
use std::collections::{HashMap, HashSet};

/// Whether `ty` must be built by page binding
#[must_use]
pub fn classify(ty: &TypeRef) -> bool {
    let mut visited = HashSet::new();
    let mut current = Some(*ty);
    while let Some(ty) = current {
        if !visited.insert(ty.id()) {
            return false;
        }
        let descriptor = ty.descriptor();
        if declares_page_marker(&descriptor) {
            return true;
        }
        current = descriptor.supertype();
    }
    false
}

/// Whether a single level (no supertypes) declares a page-binding marker
#[must_use]
pub fn declares_page_marker(descriptor: &TypeDescriptor) -> bool {
    descriptor.markers().iter().any(|m| m.is_page_binding())
        || descriptor.fields().iter().any(|f| f.has_page_marker())
}

/// Classify through a memo keyed by type identity.
///
/// Returns the classification and whether it was computed by this call.
pub fn classify_memoized(ty: &TypeRef, memo: &mut HashMap<TypeId, bool>) -> (bool, bool) {
    if let Some(&known) = memo.get(&ty.id()) {
        return (known, false);
    }
    let result = classify(ty);
    memo.insert(ty.id(), result);
    (result, true)
}
