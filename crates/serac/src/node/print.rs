//! Canonical text rendering for expressions; deterministic, used in logs
//! and in the context attached to compile errors.

use crate::node::{Compare, Expr, FunctionCall, Literal};
use std::fmt;

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(x) => write!(f, "{}", x.get()),
            Self::Text(s) => write!(f, "'{s}'"),
        }
    }
}

impl fmt::Display for Compare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.lhs, self.op.symbol(), self.rhs)
    }
}

impl fmt::Display for FunctionCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}(", self.namespace, self.name)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{arg}")?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And(children) => write_junction(f, children, " && "),
            Self::Or(children) => write_junction(f, children, " || "),
            Self::Not(inner) => match inner.as_ref() {
                inner @ (Self::Group(_) | Self::And(_) | Self::Or(_)) => write!(f, "!{inner}"),
                inner => write!(f, "!({inner})"),
            },
            Self::Compare(cmp) => write!(f, "{cmp}"),
            Self::Function(call) => write!(f, "{call}"),
            Self::Group(inner) => write!(f, "({inner})"),
            Self::Literal(lit) => write!(f, "{lit}"),
            Self::Ident(name) => write!(f, "{name}"),
            Self::Marked(marker) => write!(f, "{}({})", marker.kind.label(), marker.source),
        }
    }
}

fn write_junction(f: &mut fmt::Formatter<'_>, children: &[Expr], sep: &str) -> fmt::Result {
    write!(f, "(")?;
    for (i, child) in children.iter().enumerate() {
        if i > 0 {
            write!(f, "{sep}")?;
        }
        write!(f, "{child}")?;
    }
    write!(f, ")")
}
