use crate::marker::{Marker, MarkerKind};
use serde::{Deserialize, Serialize};
use std::{
    cmp::Ordering,
    hash::{Hash, Hasher},
    ops::{BitAnd, BitOr},
};

///
/// Expression AST
///
/// Pure, catalog-agnostic representation of a boolean field query.
/// This layer contains no index logic, no normalization, and no plan
/// semantics. All interpretation occurs in later passes:
///
/// - model alias expansion
/// - multi-representation expansion
/// - composite synthesis
/// - pruning
/// - classification
/// - pattern expansion
/// - plan compilation
///

///
/// CompareOp
///

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Deserialize, Serialize)]
#[repr(u8)]
pub enum CompareOp {
    Eq = 0x01,
    Ne = 0x02,
    RegexMatch = 0x03,
    RegexNotMatch = 0x04,
    Lt = 0x05,
    Le = 0x06,
    Gt = 0x07,
    Ge = 0x08,
}

impl CompareOp {
    #[must_use]
    pub const fn tag(self) -> u8 {
        self as u8
    }

    /// Operators whose index form is an exclusion rather than an inclusion.
    #[must_use]
    pub const fn is_negative(self) -> bool {
        matches!(self, Self::Ne | Self::RegexNotMatch)
    }

    #[must_use]
    pub const fn is_regex(self) -> bool {
        matches!(self, Self::RegexMatch | Self::RegexNotMatch)
    }

    /// Relational operators that can form one side of a literal range.
    #[must_use]
    pub const fn is_relational(self) -> bool {
        matches!(self, Self::Lt | Self::Le | Self::Gt | Self::Ge)
    }

    #[must_use]
    pub const fn is_lower_bound(self) -> bool {
        matches!(self, Self::Gt | Self::Ge)
    }

    #[must_use]
    pub const fn is_upper_bound(self) -> bool {
        matches!(self, Self::Lt | Self::Le)
    }

    /// The operator obtained by swapping the operands: `5 < F` is `F > 5`.
    #[must_use]
    pub const fn mirrored(self) -> Self {
        match self {
            Self::Lt => Self::Gt,
            Self::Le => Self::Ge,
            Self::Gt => Self::Lt,
            Self::Ge => Self::Le,
            other => other,
        }
    }

    /// The operator obtained by logical negation: `!(F < 5)` is `F >= 5`.
    #[must_use]
    pub const fn negated(self) -> Self {
        match self {
            Self::Eq => Self::Ne,
            Self::Ne => Self::Eq,
            Self::RegexMatch => Self::RegexNotMatch,
            Self::RegexNotMatch => Self::RegexMatch,
            Self::Lt => Self::Ge,
            Self::Le => Self::Gt,
            Self::Gt => Self::Le,
            Self::Ge => Self::Lt,
        }
    }

    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::RegexMatch => "=~",
            Self::RegexNotMatch => "!~",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

///
/// Float64
///
/// Finite f64 only; -0.0 canonically stored as 0.0 so Eq/Hash/Ord agree.
///

#[repr(transparent)]
#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct Float64(f64);

impl Float64 {
    /// Fallible constructor that rejects non-finite values and normalizes -0.0.
    #[must_use]
    pub fn try_new(v: f64) -> Option<Self> {
        if !v.is_finite() {
            return None;
        }

        Some(Self(if v == 0.0 { 0.0 } else { v }))
    }

    #[must_use]
    pub const fn get(self) -> f64 {
        self.0
    }

    #[must_use]
    pub const fn to_be_bytes(self) -> [u8; 8] {
        self.0.to_bits().to_be_bytes()
    }
}

impl Eq for Float64 {}

impl PartialEq for Float64 {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Hash for Float64 {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.0.to_bits()); // stable 8-byte IEEE-754
    }
}

impl Ord for Float64 {
    fn cmp(&self, other: &Self) -> Ordering {
        // safe: no NaN, -0 normalized
        self.0.partial_cmp(&other.0).unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for Float64 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<'de> Deserialize<'de> for Float64 {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = f64::deserialize(deserializer)?;
        Self::try_new(value)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid Float64 value: {value}")))
    }
}

///
/// Literal
///
/// Comparison operand values. Text literals double as regex patterns when
/// the operator is a regex operator.
///

#[derive(
    Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Deserialize, Serialize,
)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(Float64),
    Text(String),
}

impl Literal {
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Canonical key-space rendering used for index probes and dedup.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Null => "null".to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Int(n) => n.to_string(),
            Self::Float(f) => f.get().to_string(),
            Self::Text(s) => s.clone(),
        }
    }
}

impl From<&str> for Literal {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Literal {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for Literal {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<bool> for Literal {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

///
/// Compare
///
/// A two-operand comparison. Operands are full expressions so that
/// mirrored forms (`5 < F`) and function-valued operands survive the
/// front end; most passes only consume the field-op-literal view.
///

#[derive(Clone, Debug, Eq, Hash, PartialEq, Deserialize, Serialize)]
pub struct Compare {
    pub lhs: Box<Expr>,
    pub op: CompareOp,
    pub rhs: Box<Expr>,
}

impl Compare {
    #[must_use]
    pub fn new(lhs: Expr, op: CompareOp, rhs: Expr) -> Self {
        Self {
            lhs: Box::new(lhs),
            op,
            rhs: Box::new(rhs),
        }
    }

    /// Construct the common identifier-op-literal shape.
    #[must_use]
    pub fn term(field: impl Into<String>, op: CompareOp, value: impl Into<Literal>) -> Self {
        Self::new(Expr::Ident(field.into()), op, Expr::Literal(value.into()))
    }

    /// Orientation-normalized view of this comparison.
    ///
    /// Returns `None` when neither operand order yields an identifier on
    /// one side and a literal on the other; such comparisons are left for
    /// post-scan evaluation.
    #[must_use]
    pub fn field_op_literal(&self) -> Option<FieldOpLiteral<'_>> {
        match (self.lhs.peel(), self.rhs.peel()) {
            (Expr::Ident(field), Expr::Literal(literal)) => Some(FieldOpLiteral {
                field,
                op: self.op,
                literal,
            }),
            (Expr::Literal(literal), Expr::Ident(field)) => Some(FieldOpLiteral {
                field,
                op: self.op.mirrored(),
                literal,
            }),
            _ => None,
        }
    }
}

///
/// FieldOpLiteral
///
/// Borrowed field-op-literal view, with the operator already mirrored
/// when the source comparison was written literal-first.
///

#[derive(Clone, Copy, Debug)]
pub struct FieldOpLiteral<'a> {
    pub field: &'a str,
    pub op: CompareOp,
    pub literal: &'a Literal,
}

///
/// FunctionCall
///
/// Opaque to the compiler beyond namespace admission; never consulted
/// for index bounds.
///

#[derive(Clone, Debug, Eq, Hash, PartialEq, Deserialize, Serialize)]
pub struct FunctionCall {
    pub namespace: String,
    pub name: String,
    pub args: Vec<Expr>,
}

impl FunctionCall {
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, args: Vec<Expr>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            args,
        }
    }
}

///
/// Expr
///

#[derive(Clone, Debug, Eq, Hash, PartialEq, Deserialize, Serialize)]
pub enum Expr {
    And(Vec<Self>),
    Or(Vec<Self>),
    Not(Box<Self>),
    Compare(Compare),
    Function(FunctionCall),
    Group(Box<Self>),
    Literal(Literal),
    Ident(String),
    Marked(Marker),
}

impl Expr {
    #[must_use]
    pub const fn and(exprs: Vec<Self>) -> Self {
        Self::And(exprs)
    }

    #[must_use]
    pub const fn or(exprs: Vec<Self>) -> Self {
        Self::Or(exprs)
    }

    #[expect(clippy::should_implement_trait)]
    #[must_use]
    pub fn not(expr: Self) -> Self {
        Self::Not(Box::new(expr))
    }

    #[must_use]
    pub fn group(expr: Self) -> Self {
        Self::Group(Box::new(expr))
    }

    #[must_use]
    pub fn ident(name: impl Into<String>) -> Self {
        Self::Ident(name.into())
    }

    #[must_use]
    pub fn lit(value: impl Into<Literal>) -> Self {
        Self::Literal(value.into())
    }

    #[must_use]
    pub fn eq(field: impl Into<String>, value: impl Into<Literal>) -> Self {
        Self::Compare(Compare::term(field, CompareOp::Eq, value))
    }

    #[must_use]
    pub fn ne(field: impl Into<String>, value: impl Into<Literal>) -> Self {
        Self::Compare(Compare::term(field, CompareOp::Ne, value))
    }

    #[must_use]
    pub fn lt(field: impl Into<String>, value: impl Into<Literal>) -> Self {
        Self::Compare(Compare::term(field, CompareOp::Lt, value))
    }

    #[must_use]
    pub fn le(field: impl Into<String>, value: impl Into<Literal>) -> Self {
        Self::Compare(Compare::term(field, CompareOp::Le, value))
    }

    #[must_use]
    pub fn gt(field: impl Into<String>, value: impl Into<Literal>) -> Self {
        Self::Compare(Compare::term(field, CompareOp::Gt, value))
    }

    #[must_use]
    pub fn ge(field: impl Into<String>, value: impl Into<Literal>) -> Self {
        Self::Compare(Compare::term(field, CompareOp::Ge, value))
    }

    #[must_use]
    pub fn matches(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::Compare(Compare::term(
            field,
            CompareOp::RegexMatch,
            Literal::Text(pattern.into()),
        ))
    }

    #[must_use]
    pub fn not_matches(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::Compare(Compare::term(
            field,
            CompareOp::RegexNotMatch,
            Literal::Text(pattern.into()),
        ))
    }

    /// Strip grouping wrappers; grouping is structural only and every pass
    /// must see through it.
    #[must_use]
    pub fn peel(&self) -> &Self {
        let mut node = self;
        while let Self::Group(inner) = node {
            node = inner;
        }
        node
    }

    /// The field-op-literal view of this node, if it is (a grouping of) a
    /// comparison in that shape.
    #[must_use]
    pub fn as_field_term(&self) -> Option<FieldOpLiteral<'_>> {
        match self.peel() {
            Self::Compare(cmp) => cmp.field_op_literal(),
            _ => None,
        }
    }

    /// The boolean constant this node represents, if any.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self.peel() {
            Self::Literal(lit) => lit.as_bool(),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_marked(&self, kind: MarkerKind) -> bool {
        match self.peel() {
            Self::Marked(marker) => marker.kind == kind,
            _ => false,
        }
    }

    /// Count the comparison leaves that participate in the term budget.
    ///
    /// Deferral-marked subtrees count as one deferred unit regardless of
    /// their internal width; function arguments are opaque and not terms.
    #[must_use]
    pub fn term_count(&self) -> usize {
        match self {
            Self::And(children) | Self::Or(children) => {
                children.iter().map(Self::term_count).sum()
            }
            Self::Not(inner) | Self::Group(inner) => inner.term_count(),
            Self::Compare(_) => 1,
            Self::Marked(marker) => {
                if marker.kind.is_deferral() {
                    1
                } else {
                    marker.source.term_count()
                }
            }
            Self::Function(_) | Self::Literal(_) | Self::Ident(_) => 0,
        }
    }
}

impl BitAnd for Expr {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self::Output {
        Self::And(vec![self, rhs])
    }
}

impl BitAnd for &Expr {
    type Output = Expr;

    fn bitand(self, rhs: Self) -> Self::Output {
        Expr::And(vec![self.clone(), rhs.clone()])
    }
}

impl BitOr for Expr {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self::Or(vec![self, rhs])
    }
}

impl BitOr for &Expr {
    type Output = Expr;

    fn bitor(self, rhs: Self) -> Self::Output {
        Expr::Or(vec![self.clone(), rhs.clone()])
    }
}
