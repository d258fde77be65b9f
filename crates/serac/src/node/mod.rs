//! Expression model: the AST, canonical rendering, structural rebuild
//! helpers, literal ranges, and structural identity.

mod ast;
mod print;
pub mod range;
pub mod rewrite;
pub mod structural;


pub use ast::{Compare, CompareOp, Expr, FieldOpLiteral, Float64, FunctionCall, Literal};
