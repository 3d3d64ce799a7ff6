// SPDX-License-Identifier: Apache-2.0

//! Type-compatibility rules behind severity classification. Output
//! positions may gain non-null; input positions may lose it. Everything
//! else is a breaking rewrap.

use async_graphql_parser::types::{BaseType, Type};

/// `old -> new` at an output position (field result). Clients keep working
/// when the new type is the same shape, at most stricter about null.
#[must_use]
pub fn is_safe_output_type_change(old: &Type, new: &Type) -> bool {
    if !(old.nullable || !new.nullable) {
        return false;
    }
    base_compatible(&old.base, &new.base, Position::Output)
}

/// `old -> new` at an input position (argument, input field). Clients keep
/// working when the new type is the same shape, at most more lenient about
/// null.
#[must_use]
pub fn is_safe_input_type_change(old: &Type, new: &Type) -> bool {
    if !(new.nullable || !old.nullable) {
        return false;
    }
    base_compatible(&old.base, &new.base, Position::Input)
}

#[derive(Clone, Copy)]
enum Position {
    Output,
    Input,
}

fn base_compatible(old: &BaseType, new: &BaseType, position: Position) -> bool {
    match (old, new) {
        (BaseType::Named(a), BaseType::Named(b)) => a == b,
        (BaseType::List(a), BaseType::List(b)) => match position {
            Position::Output => is_safe_output_type_change(a, b),
            Position::Input => is_safe_input_type_change(a, b),
        },
        _ => false,
    }
}

/// A required argument or input field is one a client cannot omit.
#[must_use]
pub fn is_required_input(ty: &Type, has_default: bool) -> bool {
    !ty.nullable && !has_default
}
