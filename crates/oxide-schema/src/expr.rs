//! Expression trees.
//!
//! Defaults, computed columns, check conditions, index filters and view
//! sources are all expressed with [`Expr`]. Expressions held by the graph
//! reference columns by identity ([`ColumnRef`]), so renaming a column never
//! invalidates them. When a statement is synthesized the references are
//! resolved to names, producing a [`SqlExpr`] that a renderer can print
//! without access to the graph.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::graph::{ColumnId, ObjectId, ViewId};

/// A literal value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Literal {
    /// Integer literal.
    Integer(i64),
    /// Float literal.
    Float(f64),
    /// String literal.
    String(String),
    /// Boolean literal.
    Boolean(bool),
    /// NULL literal.
    Null,
}

impl Literal {
    /// Returns the SQL representation of this literal.
    #[must_use]
    pub fn to_sql(&self) -> String {
        match self {
            Self::Integer(i) => i.to_string(),
            Self::Float(f) => {
                let text = f.to_string();
                if text.contains(['.', 'e', 'E']) || !f.is_finite() {
                    text
                } else {
                    format!("{text}.0")
                }
            }
            Self::String(s) => format!("'{}'", s.replace('\'', "''")),
            Self::Boolean(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            Self::Null => "NULL".to_string(),
        }
    }
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,

    // Comparison
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,

    // Logical
    And,
    Or,

    // String
    Concat,
    Like,
}

impl BinaryOp {
    /// Returns the SQL representation of the operator.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::Eq => "=",
            Self::NotEq => "<>",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
            Self::And => "AND",
            Self::Or => "OR",
            Self::Concat => "||",
            Self::Like => "LIKE",
        }
    }

    /// Returns the precedence of the operator (higher = binds tighter).
    #[must_use]
    pub const fn precedence(&self) -> u8 {
        match self {
            Self::Or => 1,
            Self::And => 2,
            Self::Eq | Self::NotEq | Self::Lt | Self::LtEq | Self::Gt | Self::GtEq => 3,
            Self::Like => 4,
            Self::Add | Self::Sub | Self::Concat => 8,
            Self::Mul | Self::Div | Self::Mod => 9,
        }
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    /// Negation (-)
    Neg,
    /// Logical NOT
    Not,
}

impl UnaryOp {
    /// Returns the SQL representation of the operator.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Neg => "-",
            Self::Not => "NOT ",
        }
    }
}

/// A column reference held by the graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ColumnRef {
    /// A table column.
    Column(ColumnId),
    /// An output field of a view, by its projected name.
    ViewField {
        /// The view exposing the field.
        view: ViewId,
        /// Field name.
        field: String,
    },
}

impl From<ColumnId> for ColumnRef {
    fn from(id: ColumnId) -> Self {
        Self::Column(id)
    }
}

/// A schema-qualified object name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QualifiedName {
    /// Schema name.
    pub schema: String,
    /// Object name.
    pub name: String,
}

impl QualifiedName {
    /// Creates a qualified name.
    #[must_use]
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// A resolved column reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnName {
    /// Owning table or view, when the expression spans several sources.
    pub qualifier: Option<QualifiedName>,
    /// Column or field name.
    pub name: String,
}

impl ColumnName {
    /// Creates an unqualified column name.
    #[must_use]
    pub fn bare(name: impl Into<String>) -> Self {
        Self {
            qualifier: None,
            name: name.into(),
        }
    }
}

/// An SQL expression, generic over how columns are referenced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr<C = ColumnRef> {
    /// A literal value.
    Literal(Literal),

    /// A column reference.
    Column(C),

    /// A binary expression.
    Binary {
        /// Left operand.
        left: Box<Expr<C>>,
        /// Operator.
        op: BinaryOp,
        /// Right operand.
        right: Box<Expr<C>>,
    },

    /// A unary expression.
    Unary {
        /// Operator.
        op: UnaryOp,
        /// Operand.
        operand: Box<Expr<C>>,
    },

    /// A function call.
    Function {
        /// The function name.
        name: String,
        /// The arguments.
        args: Vec<Expr<C>>,
    },

    /// IS NULL expression.
    IsNull {
        /// The expression to check.
        expr: Box<Expr<C>>,
        /// Whether this is IS NOT NULL.
        negated: bool,
    },

    /// IN expression.
    In {
        /// The expression to check.
        expr: Box<Expr<C>>,
        /// The list of values.
        list: Vec<Expr<C>>,
        /// Whether this is NOT IN.
        negated: bool,
    },

    /// BETWEEN expression.
    Between {
        /// The expression to check.
        expr: Box<Expr<C>>,
        /// Lower bound.
        low: Box<Expr<C>>,
        /// Upper bound.
        high: Box<Expr<C>>,
        /// Whether this is NOT BETWEEN.
        negated: bool,
    },

    /// An opaque SQL fragment such as `CURRENT_TIMESTAMP`. Never references
    /// columns.
    Raw(String),
}

/// An expression with resolved column names.
pub type SqlExpr = Expr<ColumnName>;

/// Creates a reference to a table column.
#[must_use]
pub const fn col(id: ColumnId) -> Expr {
    Expr::Column(ColumnRef::Column(id))
}

/// Creates a reference to an output field of a view.
#[must_use]
pub fn field(view: ViewId, name: impl Into<String>) -> Expr {
    Expr::Column(ColumnRef::ViewField {
        view,
        field: name.into(),
    })
}

impl<C> Expr<C> {
    /// Creates a column reference.
    #[must_use]
    pub const fn column(column: C) -> Self {
        Self::Column(column)
    }

    /// Creates a new integer literal.
    #[must_use]
    pub const fn integer(value: i64) -> Self {
        Self::Literal(Literal::Integer(value))
    }

    /// Creates a new float literal.
    #[must_use]
    pub const fn float(value: f64) -> Self {
        Self::Literal(Literal::Float(value))
    }

    /// Creates a new string literal.
    #[must_use]
    pub fn string(value: impl Into<String>) -> Self {
        Self::Literal(Literal::String(value.into()))
    }

    /// Creates a new boolean literal.
    #[must_use]
    pub const fn boolean(value: bool) -> Self {
        Self::Literal(Literal::Boolean(value))
    }

    /// Creates a NULL literal.
    #[must_use]
    pub const fn null() -> Self {
        Self::Literal(Literal::Null)
    }

    /// Creates an opaque SQL fragment.
    #[must_use]
    pub fn raw(sql: impl Into<String>) -> Self {
        Self::Raw(sql.into())
    }

    /// Creates a function call.
    #[must_use]
    pub fn function(name: impl Into<String>, args: Vec<Self>) -> Self {
        Self::Function {
            name: name.into(),
            args,
        }
    }

    /// Creates a binary expression.
    #[must_use]
    pub fn binary(self, op: BinaryOp, right: Self) -> Self {
        Self::Binary {
            left: Box::new(self),
            op,
            right: Box::new(right),
        }
    }

    /// Creates an equality expression.
    #[must_use]
    pub fn eq(self, right: Self) -> Self {
        self.binary(BinaryOp::Eq, right)
    }

    /// Creates an inequality expression.
    #[must_use]
    pub fn not_eq(self, right: Self) -> Self {
        self.binary(BinaryOp::NotEq, right)
    }

    /// Creates a less-than expression.
    #[must_use]
    pub fn lt(self, right: Self) -> Self {
        self.binary(BinaryOp::Lt, right)
    }

    /// Creates a less-than-or-equal expression.
    #[must_use]
    pub fn lt_eq(self, right: Self) -> Self {
        self.binary(BinaryOp::LtEq, right)
    }

    /// Creates a greater-than expression.
    #[must_use]
    pub fn gt(self, right: Self) -> Self {
        self.binary(BinaryOp::Gt, right)
    }

    /// Creates a greater-than-or-equal expression.
    #[must_use]
    pub fn gt_eq(self, right: Self) -> Self {
        self.binary(BinaryOp::GtEq, right)
    }

    /// Creates an AND expression.
    #[must_use]
    pub fn and(self, right: Self) -> Self {
        self.binary(BinaryOp::And, right)
    }

    /// Creates an OR expression.
    #[must_use]
    pub fn or(self, right: Self) -> Self {
        self.binary(BinaryOp::Or, right)
    }

    /// Creates an addition expression.
    #[must_use]
    pub fn plus(self, right: Self) -> Self {
        self.binary(BinaryOp::Add, right)
    }

    /// Creates a multiplication expression.
    #[must_use]
    pub fn times(self, right: Self) -> Self {
        self.binary(BinaryOp::Mul, right)
    }

    /// Creates a logical negation.
    #[must_use]
    pub fn negate(self) -> Self {
        Self::Unary {
            op: UnaryOp::Not,
            operand: Box::new(self),
        }
    }

    /// Creates an IS NULL expression.
    #[must_use]
    pub fn is_null(self) -> Self {
        Self::IsNull {
            expr: Box::new(self),
            negated: false,
        }
    }

    /// Creates an IS NOT NULL expression.
    #[must_use]
    pub fn is_not_null(self) -> Self {
        Self::IsNull {
            expr: Box::new(self),
            negated: true,
        }
    }

    /// Creates an IN expression.
    #[must_use]
    pub fn in_list(self, list: Vec<Self>) -> Self {
        Self::In {
            expr: Box::new(self),
            list,
            negated: false,
        }
    }

    /// Creates a BETWEEN expression.
    #[must_use]
    pub fn between(self, low: Self, high: Self) -> Self {
        Self::Between {
            expr: Box::new(self),
            low: Box::new(low),
            high: Box::new(high),
            negated: false,
        }
    }

    /// Calls `f` for every column reference, left to right.
    pub fn visit_columns<'a>(&'a self, f: &mut impl FnMut(&'a C)) {
        match self {
            Self::Literal(_) | Self::Raw(_) => {}
            Self::Column(c) => f(c),
            Self::Binary { left, right, .. } => {
                left.visit_columns(f);
                right.visit_columns(f);
            }
            Self::Unary { operand, .. } => operand.visit_columns(f),
            Self::Function { args, .. } => {
                for arg in args {
                    arg.visit_columns(f);
                }
            }
            Self::IsNull { expr, .. } => expr.visit_columns(f),
            Self::In { expr, list, .. } => {
                expr.visit_columns(f);
                for item in list {
                    item.visit_columns(f);
                }
            }
            Self::Between {
                expr, low, high, ..
            } => {
                expr.visit_columns(f);
                low.visit_columns(f);
                high.visit_columns(f);
            }
        }
    }

    /// Rebuilds the expression with every column reference mapped by `f`.
    pub fn map_columns<D>(&self, f: &mut impl FnMut(&C) -> D) -> Expr<D> {
        let result: Result<Expr<D>, std::convert::Infallible> =
            self.try_map_columns(&mut |c| Ok(f(c)));
        match result {
            Ok(expr) => expr,
            Err(never) => match never {},
        }
    }

    /// Rebuilds the expression with every column reference mapped by `f`,
    /// stopping at the first error.
    pub fn try_map_columns<D, E>(
        &self,
        f: &mut impl FnMut(&C) -> Result<D, E>,
    ) -> Result<Expr<D>, E> {
        let mapped = match self {
            Self::Literal(l) => Expr::Literal(l.clone()),
            Self::Raw(sql) => Expr::Raw(sql.clone()),
            Self::Column(c) => Expr::Column(f(c)?),
            Self::Binary { left, op, right } => Expr::Binary {
                left: Box::new(left.try_map_columns(f)?),
                op: *op,
                right: Box::new(right.try_map_columns(f)?),
            },
            Self::Unary { op, operand } => Expr::Unary {
                op: *op,
                operand: Box::new(operand.try_map_columns(f)?),
            },
            Self::Function { name, args } => Expr::Function {
                name: name.clone(),
                args: args
                    .iter()
                    .map(|arg| arg.try_map_columns(f))
                    .collect::<Result<_, _>>()?,
            },
            Self::IsNull { expr, negated } => Expr::IsNull {
                expr: Box::new(expr.try_map_columns(f)?),
                negated: *negated,
            },
            Self::In {
                expr,
                list,
                negated,
            } => Expr::In {
                expr: Box::new(expr.try_map_columns(f)?),
                list: list
                    .iter()
                    .map(|item| item.try_map_columns(f))
                    .collect::<Result<_, _>>()?,
                negated: *negated,
            },
            Self::Between {
                expr,
                low,
                high,
                negated,
            } => Expr::Between {
                expr: Box::new(expr.try_map_columns(f)?),
                low: Box::new(low.try_map_columns(f)?),
                high: Box::new(high.try_map_columns(f)?),
                negated: *negated,
            },
        };
        Ok(mapped)
    }

    /// Returns `true` if the expression references at least one column.
    #[must_use]
    pub fn has_columns(&self) -> bool {
        let mut found = false;
        self.visit_columns(&mut |_| found = true);
        found
    }
}

impl Expr {
    /// Table columns referenced by this expression.
    #[must_use]
    pub fn referenced_columns(&self) -> BTreeSet<ColumnId> {
        let mut columns = BTreeSet::new();
        self.visit_columns(&mut |c| {
            if let ColumnRef::Column(id) = c {
                columns.insert(*id);
            }
        });
        columns
    }

    /// Views whose output fields this expression reads.
    #[must_use]
    pub fn referenced_views(&self) -> BTreeSet<ViewId> {
        let mut views = BTreeSet::new();
        self.visit_columns(&mut |c| {
            if let ColumnRef::ViewField { view, .. } = c {
                views.insert(*view);
            }
        });
        views
    }
}

/// Writes `expr` as SQL text. Column references are printed by `column`.
pub fn write_sql<C>(out: &mut String, expr: &Expr<C>, column: &dyn Fn(&C) -> String) {
    write_with_precedence(out, expr, column, 0);
}

const TIGHTEST: u8 = 10;

fn write_with_precedence<C>(
    out: &mut String,
    expr: &Expr<C>,
    column: &dyn Fn(&C) -> String,
    parent: u8,
) {
    match expr {
        Expr::Literal(l) => out.push_str(&l.to_sql()),
        Expr::Raw(sql) => out.push_str(sql),
        Expr::Column(c) => out.push_str(&column(c)),
        Expr::Binary { left, op, right } => {
            let precedence = op.precedence();
            let wrap = precedence < parent;
            if wrap {
                out.push('(');
            }
            write_with_precedence(out, left, column, precedence);
            out.push(' ');
            out.push_str(op.as_str());
            out.push(' ');
            write_with_precedence(out, right, column, precedence + 1);
            if wrap {
                out.push(')');
            }
        }
        Expr::Unary { op, operand } => {
            out.push_str(op.as_str());
            write_with_precedence(out, operand, column, TIGHTEST);
        }
        Expr::Function { name, args } => {
            out.push_str(name);
            out.push('(');
            for (i, arg) in args.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_with_precedence(out, arg, column, 0);
            }
            out.push(')');
        }
        Expr::IsNull { expr, negated } => {
            write_with_precedence(out, expr, column, TIGHTEST);
            out.push_str(if *negated { " IS NOT NULL" } else { " IS NULL" });
        }
        Expr::In {
            expr,
            list,
            negated,
        } => {
            write_with_precedence(out, expr, column, TIGHTEST);
            out.push_str(if *negated { " NOT IN (" } else { " IN (" });
            for (i, item) in list.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_with_precedence(out, item, column, 0);
            }
            out.push(')');
        }
        Expr::Between {
            expr,
            low,
            high,
            negated,
        } => {
            write_with_precedence(out, expr, column, TIGHTEST);
            out.push_str(if *negated { " NOT BETWEEN " } else { " BETWEEN " });
            write_with_precedence(out, low, column, TIGHTEST);
            out.push_str(" AND ");
            write_with_precedence(out, high, column, TIGHTEST);
        }
    }
}

impl fmt::Display for SqlExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        write_sql(&mut out, self, &|c: &ColumnName| match &c.qualifier {
            Some(q) => format!("\"{}\".\"{}\".\"{}\"", q.schema, q.name, c.name),
            None => format!("\"{}\"", c.name),
        });
        f.write_str(&out)
    }
}

/// A projected output column of a view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projection<C = ColumnRef> {
    /// Projected expression.
    pub expr: Expr<C>,
    /// Output alias.
    pub alias: Option<String>,
}

/// The query a view is defined by.
///
/// `S` is the source reference type: object identities inside the graph,
/// qualified names once resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewQuery<C = ColumnRef, S = ObjectId> {
    /// Whether SELECT DISTINCT is used.
    pub distinct: bool,
    /// Output columns.
    pub columns: Vec<Projection<C>>,
    /// Tables and views read by the query.
    pub from: Vec<S>,
    /// WHERE condition.
    pub filter: Option<Expr<C>>,
    /// GROUP BY expressions.
    pub group_by: Vec<Expr<C>>,
}

/// A view query with resolved names.
pub type SqlQuery = ViewQuery<ColumnName, QualifiedName>;

impl<C, S> ViewQuery<C, S> {
    /// Adds an output column.
    #[must_use]
    pub fn select(mut self, expr: Expr<C>) -> Self {
        self.columns.push(Projection { expr, alias: None });
        self
    }

    /// Adds an aliased output column.
    #[must_use]
    pub fn select_as(mut self, expr: Expr<C>, alias: impl Into<String>) -> Self {
        self.columns.push(Projection {
            expr,
            alias: Some(alias.into()),
        });
        self
    }

    /// Sets the WHERE condition.
    #[must_use]
    pub fn filter(mut self, condition: Expr<C>) -> Self {
        self.filter = Some(condition);
        self
    }

    /// Adds a GROUP BY expression.
    #[must_use]
    pub fn group_by(mut self, expr: Expr<C>) -> Self {
        self.group_by.push(expr);
        self
    }

    /// Uses SELECT DISTINCT.
    #[must_use]
    pub const fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Calls `f` for every column reference of the query.
    pub fn visit_columns<'a>(&'a self, f: &mut impl FnMut(&'a C)) {
        for projection in &self.columns {
            projection.expr.visit_columns(f);
        }
        if let Some(filter) = &self.filter {
            filter.visit_columns(f);
        }
        for expr in &self.group_by {
            expr.visit_columns(f);
        }
    }

    /// Rebuilds the query with mapped column and source references.
    pub fn map<D, T>(
        &self,
        column: &mut impl FnMut(&C) -> D,
        source: &mut impl FnMut(&S) -> T,
    ) -> ViewQuery<D, T> {
        ViewQuery {
            distinct: self.distinct,
            columns: self
                .columns
                .iter()
                .map(|p| Projection {
                    expr: p.expr.map_columns(column),
                    alias: p.alias.clone(),
                })
                .collect(),
            from: self.from.iter().map(source).collect(),
            filter: self.filter.as_ref().map(|e| e.map_columns(column)),
            group_by: self.group_by.iter().map(|e| e.map_columns(column)).collect(),
        }
    }
}

impl<C, S> Default for ViewQuery<C, S> {
    fn default() -> Self {
        Self {
            distinct: false,
            columns: Vec::new(),
            from: Vec::new(),
            filter: None,
            group_by: Vec::new(),
        }
    }
}

impl ViewQuery {
    /// Creates an empty query.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a table or view to the FROM list.
    #[must_use]
    pub fn source(mut self, source: impl Into<ObjectId>) -> Self {
        self.from.push(source.into());
        self
    }

    /// Table columns referenced anywhere in the query.
    #[must_use]
    pub fn referenced_columns(&self) -> BTreeSet<ColumnId> {
        let mut columns = BTreeSet::new();
        self.visit_columns(&mut |c| {
            if let ColumnRef::Column(id) = c {
                columns.insert(*id);
            }
        });
        columns
    }

    /// Views whose fields the query reads.
    #[must_use]
    pub fn referenced_views(&self) -> BTreeSet<ViewId> {
        let mut views = BTreeSet::new();
        self.visit_columns(&mut |c| {
            if let ColumnRef::ViewField { view, .. } = c {
                views.insert(*view);
            }
        });
        views
    }
}
