// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: GPL-3.0-only OR LicenseRef-Slint-Royalty-free-2.0 OR LicenseRef-Slint-Software-3.0

/*!
The expression tree of compiled scripts: binding expressions, signal handler bodies and
function bodies.
*/

use crate::value::Value;
use smol_str::SmolStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum BinaryOp {
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Sub,
    #[strum(serialize = "*")]
    Mul,
    #[strum(serialize = "/")]
    Div,
    #[strum(serialize = "%")]
    Rem,
    #[strum(serialize = "===")]
    Equal,
    #[strum(serialize = "!==")]
    NotEqual,
    #[strum(serialize = "<")]
    Less,
    #[strum(serialize = "<=")]
    LessEqual,
    #[strum(serialize = ">")]
    Greater,
    #[strum(serialize = ">=")]
    GreaterEqual,
    #[strum(serialize = "&&")]
    And,
    #[strum(serialize = "||")]
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum UnaryOp {
    #[strum(serialize = "-")]
    Minus,
    #[strum(serialize = "+")]
    Plus,
    #[strum(serialize = "!")]
    Not,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Number(f64),
    String(SmolStr),
    Bool(bool),
    Null,
    Undefined,
    /// An unqualified name: parameter, id, property of the scope or context object, or
    /// imported script
    Lookup(SmolStr),
    Member(Box<Expression>, SmolStr),
    Binary {
        lhs: Box<Expression>,
        op: BinaryOp,
        rhs: Box<Expression>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expression>,
    },
    Conditional {
        condition: Box<Expression>,
        true_expr: Box<Expression>,
        false_expr: Box<Expression>,
    },
    /// `name(args)` or `target.name(args)`
    Call {
        target: Option<Box<Expression>>,
        name: SmolStr,
        arguments: Vec<Expression>,
    },
    /// `target = value`, where target is a lookup or a member access
    Assign {
        target: Box<Expression>,
        value: Box<Expression>,
    },
    Array(Vec<Expression>),
    /// Statements evaluated in order, the value of the last one is the result
    Sequence(Vec<Expression>),
}

impl Expression {
    pub fn lookup(name: &str) -> Self {
        Expression::Lookup(name.into())
    }

    pub fn member(self, name: &str) -> Self {
        Expression::Member(Box::new(self), name.into())
    }

    pub fn binary(self, op: BinaryOp, rhs: impl Into<Expression>) -> Self {
        Expression::Binary { lhs: Box::new(self), op, rhs: Box::new(rhs.into()) }
    }

    pub fn unary(op: UnaryOp, operand: impl Into<Expression>) -> Self {
        Expression::Unary { op, operand: Box::new(operand.into()) }
    }

    pub fn conditional(
        condition: impl Into<Expression>,
        true_expr: impl Into<Expression>,
        false_expr: impl Into<Expression>,
    ) -> Self {
        Expression::Conditional {
            condition: Box::new(condition.into()),
            true_expr: Box::new(true_expr.into()),
            false_expr: Box::new(false_expr.into()),
        }
    }

    pub fn call(name: &str, arguments: Vec<Expression>) -> Self {
        Expression::Call { target: None, name: name.into(), arguments }
    }

    pub fn method_call(self, name: &str, arguments: Vec<Expression>) -> Self {
        Expression::Call { target: Some(Box::new(self)), name: name.into(), arguments }
    }

    pub fn assign(self, value: impl Into<Expression>) -> Self {
        Expression::Assign { target: Box::new(self), value: Box::new(value.into()) }
    }

    /// The value of a literal expression, without evaluation
    pub fn as_literal(&self) -> Option<Value> {
        match self {
            Expression::Number(n) => Some(Value::Number(*n)),
            Expression::String(s) => Some(Value::String(s.clone())),
            Expression::Bool(b) => Some(Value::Bool(*b)),
            Expression::Null => Some(Value::Null),
            Expression::Undefined => Some(Value::Undefined),
            Expression::Unary { op: UnaryOp::Minus, operand } => match **operand {
                Expression::Number(n) => Some(Value::Number(-n)),
                _ => None,
            },
            _ => None,
        }
    }

    /// Visit each sub expression recursively
    pub fn visit_recursive(&self, visitor: &mut dyn FnMut(&Expression)) {
        visitor(self);
        match self {
            Expression::Member(base, _) => base.visit_recursive(visitor),
            Expression::Binary { lhs, rhs, .. } => {
                lhs.visit_recursive(visitor);
                rhs.visit_recursive(visitor);
            }
            Expression::Unary { operand, .. } => operand.visit_recursive(visitor),
            Expression::Conditional { condition, true_expr, false_expr } => {
                condition.visit_recursive(visitor);
                true_expr.visit_recursive(visitor);
                false_expr.visit_recursive(visitor);
            }
            Expression::Call { target, arguments, .. } => {
                if let Some(target) = target {
                    target.visit_recursive(visitor);
                }
                arguments.iter().for_each(|a| a.visit_recursive(visitor));
            }
            Expression::Assign { target, value } => {
                target.visit_recursive(visitor);
                value.visit_recursive(visitor);
            }
            Expression::Array(items) | Expression::Sequence(items) => {
                items.iter().for_each(|a| a.visit_recursive(visitor))
            }
            _ => {}
        }
    }
}

impl From<f64> for Expression {
    fn from(n: f64) -> Self {
        Expression::Number(n)
    }
}

impl From<i32> for Expression {
    fn from(n: i32) -> Self {
        Expression::Number(n as f64)
    }
}

impl From<bool> for Expression {
    fn from(b: bool) -> Self {
        Expression::Bool(b)
    }
}

/// String literal
impl From<&str> for Expression {
    fn from(s: &str) -> Self {
        Expression::String(s.into())
    }
}

fn write_list(
    f: &mut std::fmt::Formatter<'_>,
    items: &[Expression],
    separator: &str,
) -> std::fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(separator)?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

/// Renders the expression as script source
impl std::fmt::Display for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expression::Number(n) => write!(f, "{}", Value::Number(*n).to_display_string()),
            Expression::String(s) => write!(f, "{s:?}"),
            Expression::Bool(b) => write!(f, "{b}"),
            Expression::Null => f.write_str("null"),
            Expression::Undefined => f.write_str("undefined"),
            Expression::Lookup(name) => f.write_str(name),
            Expression::Member(base, name) => write!(f, "{base}.{name}"),
            Expression::Binary { lhs, op, rhs } => write!(f, "({lhs} {op} {rhs})"),
            Expression::Unary { op, operand } => write!(f, "{op}{operand}"),
            Expression::Conditional { condition, true_expr, false_expr } => {
                write!(f, "({condition} ? {true_expr} : {false_expr})")
            }
            Expression::Call { target, name, arguments } => {
                if let Some(target) = target {
                    write!(f, "{target}.")?;
                }
                write!(f, "{name}(")?;
                write_list(f, arguments, ", ")?;
                f.write_str(")")
            }
            Expression::Assign { target, value } => write!(f, "{target} = {value}"),
            Expression::Array(items) => {
                f.write_str("[")?;
                write_list(f, items, ", ")?;
                f.write_str("]")
            }
            Expression::Sequence(items) => {
                f.write_str("{ ")?;
                write_list(f, items, "; ")?;
                f.write_str(" }")
            }
        }
    }
}

#[test]
fn literal_detection() {
    assert_eq!(Expression::from(5).as_literal(), Some(Value::Number(5.)));
    assert_eq!(Expression::unary(UnaryOp::Minus, 2.5).as_literal(), Some(Value::Number(-2.5)));
    assert_eq!(Expression::lookup("x").binary(BinaryOp::Mul, 2).as_literal(), None);
    let mut lookups = Vec::new();
    Expression::lookup("root")
        .member("x")
        .binary(BinaryOp::Add, Expression::lookup("y"))
        .visit_recursive(&mut |e| {
            if let Expression::Lookup(n) = e {
                lookups.push(n.clone())
            }
        });
    assert_eq!(lookups, ["root", "y"]);
    assert_eq!(
        Expression::lookup("root").member("x").binary(BinaryOp::Mul, 2).to_string(),
        "(root.x * 2)"
    );
    assert_eq!(
        Expression::call("print", vec!["hi".into(), true.into()]).to_string(),
        "print(\"hi\", true)"
    );
}
