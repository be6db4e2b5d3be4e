//! Embedded expression language.
//!
//! Definition attributes may embed expressions in strings as `${...}`
//! interpolations. A string that is exactly one interpolation evaluates to
//! the inner value with its original type; mixed text concatenates
//! stringified values. `$${` escapes a literal `${`.

mod ast;
mod eval;
mod parser;
mod scope;

pub use ast::{Accessor, BinaryOp, Expr, RefPath, TemplatePart, UnaryOp};
pub use eval::evaluate;
pub(crate) use eval::type_name;
pub use parser::{parse_expression, parse_template};
pub use scope::{LateBindingGuard, Scope, KNOWN_NAMESPACES};
