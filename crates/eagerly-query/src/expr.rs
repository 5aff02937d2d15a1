//! SQL expressions used in WHERE, ON and ORDER BY.

use eagerly_core::{Dialect, Operator, Value};

/// A SQL expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Column reference with optional table qualifier
    Column {
        /// Optional table name or alias
        table: Option<String>,
        /// Column name (`*` renders bare)
        name: String,
    },

    /// Literal value, bound as a parameter
    Literal(Value),

    /// Raw SQL fragment, rendered verbatim
    Raw(String),

    /// Binary operation (e.g., a = b, a LIKE b)
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },

    /// `expr IN (...)` / `expr NOT IN (...)`
    InList {
        expr: Box<Expr>,
        values: Vec<Value>,
        negated: bool,
    },

    /// `expr IS NULL` / `expr IS NOT NULL`
    IsNull { expr: Box<Expr>, negated: bool },

    /// Function call (e.g., COUNT(DISTINCT x), MIN(x))
    Function {
        name: String,
        distinct: bool,
        args: Vec<Expr>,
    },

    /// Parenthesized expression
    Paren(Box<Expr>),
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
    NotLike,
    And,
    Or,
}

impl BinaryOp {
    /// Get the SQL representation of this operator.
    pub const fn as_str(&self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Like => "LIKE",
            BinaryOp::NotLike => "NOT LIKE",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
        }
    }
}

impl Expr {
    /// Column reference from a possibly dot-qualified path.
    ///
    /// `"orders.status"` becomes table `orders`, column `status`; with more
    /// than two segments everything before the last dot is the qualifier.
    pub fn col(path: impl AsRef<str>) -> Self {
        let path = path.as_ref();
        match path.rsplit_once('.') {
            Some((table, name)) => Expr::Column {
                table: Some(table.to_string()),
                name: name.to_string(),
            },
            None => Expr::Column {
                table: None,
                name: path.to_string(),
            },
        }
    }

    /// Column reference with an explicit qualifier.
    pub fn qualified(table: impl Into<String>, name: impl Into<String>) -> Self {
        Expr::Column {
            table: Some(table.into()),
            name: name.into(),
        }
    }

    /// Literal value.
    pub fn lit(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    /// Raw SQL fragment.
    pub fn raw(sql: impl Into<String>) -> Self {
        Expr::Raw(sql.into())
    }

    fn binary(self, op: BinaryOp, right: Expr) -> Self {
        Expr::Binary {
            left: Box::new(self),
            op,
            right: Box::new(right),
        }
    }

    pub fn eq(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Eq, other.into())
    }

    pub fn ne(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Ne, other.into())
    }

    pub fn like(self, pattern: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Like, pattern.into())
    }

    pub fn and(self, other: Expr) -> Self {
        self.binary(BinaryOp::And, other)
    }

    pub fn or(self, other: Expr) -> Self {
        self.binary(BinaryOp::Or, other)
    }

    /// `self IN (values)`.
    pub fn in_list(self, values: Vec<Value>) -> Self {
        Expr::InList {
            expr: Box::new(self),
            values,
            negated: false,
        }
    }

    /// `self NOT IN (values)`.
    pub fn not_in_list(self, values: Vec<Value>) -> Self {
        Expr::InList {
            expr: Box::new(self),
            values,
            negated: true,
        }
    }

    pub fn is_null(self) -> Self {
        Expr::IsNull {
            expr: Box::new(self),
            negated: false,
        }
    }

    pub fn is_not_null(self) -> Self {
        Expr::IsNull {
            expr: Box::new(self),
            negated: true,
        }
    }

    /// Compare with a predicate operator. List operators expect
    /// [`Value::Array`]; a scalar is treated as a one-element list.
    /// Equality against [`Value::Null`] becomes `IS NULL` / `IS NOT NULL`.
    pub fn compare(self, op: Operator, value: Value) -> Self {
        fn list(value: Value) -> Vec<Value> {
            match value {
                Value::Array(items) => items,
                other => vec![other],
            }
        }
        match op {
            Operator::Eq if value.is_null() => self.is_null(),
            Operator::NotEq if value.is_null() => self.is_not_null(),
            Operator::Eq => self.binary(BinaryOp::Eq, Expr::Literal(value)),
            Operator::NotEq => self.binary(BinaryOp::Ne, Expr::Literal(value)),
            Operator::Lt => self.binary(BinaryOp::Lt, Expr::Literal(value)),
            Operator::Le => self.binary(BinaryOp::Le, Expr::Literal(value)),
            Operator::Gt => self.binary(BinaryOp::Gt, Expr::Literal(value)),
            Operator::Ge => self.binary(BinaryOp::Ge, Expr::Literal(value)),
            Operator::Like => self.binary(BinaryOp::Like, Expr::Literal(value)),
            Operator::NotLike => self.binary(BinaryOp::NotLike, Expr::Literal(value)),
            Operator::In => self.in_list(list(value)),
            Operator::NotIn => self.not_in_list(list(value)),
        }
    }

    /// OR together `exprs` inside parentheses. `None` when empty.
    pub fn any(exprs: impl IntoIterator<Item = Expr>) -> Option<Self> {
        exprs
            .into_iter()
            .reduce(Expr::or)
            .map(|e| Expr::Paren(Box::new(e)))
    }

    /// `COUNT(DISTINCT expr)`.
    pub fn count_distinct(expr: Expr) -> Self {
        Expr::Function {
            name: "COUNT".to_string(),
            distinct: true,
            args: vec![expr],
        }
    }

    /// `COUNT(*)`.
    pub fn count_star() -> Self {
        Expr::Function {
            name: "COUNT".to_string(),
            distinct: false,
            args: vec![Expr::raw("*")],
        }
    }

    pub fn min(expr: Expr) -> Self {
        Expr::Function {
            name: "MIN".to_string(),
            distinct: false,
            args: vec![expr],
        }
    }

    pub fn max(expr: Expr) -> Self {
        Expr::Function {
            name: "MAX".to_string(),
            distinct: false,
            args: vec![expr],
        }
    }

    /// Build SQL, pushing bound values onto `params`. Placeholders are
    /// numbered by position in `params`.
    pub fn build_with_dialect(&self, dialect: Dialect, params: &mut Vec<Value>) -> String {
        match self {
            Expr::Column { table, name } => {
                let column = if name == "*" {
                    name.clone()
                } else {
                    dialect.quote_identifier(name)
                };
                match table {
                    Some(t) => format!("{}.{}", dialect.quote_path(t), column),
                    None => column,
                }
            }

            Expr::Literal(value) => {
                params.push(value.clone());
                dialect.placeholder(params.len())
            }

            Expr::Raw(sql) => sql.clone(),

            Expr::Binary { left, op, right } => {
                let left_sql = left.build_with_dialect(dialect, params);
                let right_sql = right.build_with_dialect(dialect, params);
                format!("{left_sql} {} {right_sql}", op.as_str())
            }

            Expr::InList {
                expr,
                values,
                negated,
            } => {
                // an empty list matches nothing (IN) or everything (NOT IN)
                if values.is_empty() {
                    return if *negated { "1 = 1" } else { "1 = 0" }.to_string();
                }
                let expr_sql = expr.build_with_dialect(dialect, params);
                let placeholders: Vec<String> = values
                    .iter()
                    .map(|v| {
                        params.push(v.clone());
                        dialect.placeholder(params.len())
                    })
                    .collect();
                format!(
                    "{expr_sql} {}IN ({})",
                    if *negated { "NOT " } else { "" },
                    placeholders.join(", ")
                )
            }

            Expr::IsNull { expr, negated } => format!(
                "{} IS {}NULL",
                expr.build_with_dialect(dialect, params),
                if *negated { "NOT " } else { "" }
            ),

            Expr::Function {
                name,
                distinct,
                args,
            } => {
                let arg_sqls: Vec<_> = args
                    .iter()
                    .map(|a| a.build_with_dialect(dialect, params))
                    .collect();
                format!(
                    "{name}({}{})",
                    if *distinct { "DISTINCT " } else { "" },
                    arg_sqls.join(", ")
                )
            }

            Expr::Paren(inner) => format!("({})", inner.build_with_dialect(dialect, params)),
        }
    }
}

impl From<Value> for Expr {
    fn from(v: Value) -> Self {
        Expr::Literal(v)
    }
}

impl From<&str> for Expr {
    fn from(s: &str) -> Self {
        Expr::Literal(Value::Text(s.to_string()))
    }
}

impl From<String> for Expr {
    fn from(s: String) -> Self {
        Expr::Literal(Value::Text(s))
    }
}

impl From<i64> for Expr {
    fn from(n: i64) -> Self {
        Expr::Literal(Value::BigInt(n))
    }
}
