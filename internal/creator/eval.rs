// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: GPL-3.0-only OR LicenseRef-Slint-Royalty-free-2.0 OR LicenseRef-Slint-Software-3.0

/*!
Evaluation of binding expressions, signal handlers and functions.

Names are resolved in this order: parameters of the function or handler, then for each
context from the innermost outwards its ids, the scope object (innermost context only), its
context object and its imported scripts, and finally the `Math` and `console` builtins.
*/

use i_qmlrt_runtime::context::ContextRc;
use i_qmlrt_runtime::expression::{BinaryOp, Expression, UnaryOp};
use i_qmlrt_runtime::object::{ObjectRc, SetPropertyError};
use i_qmlrt_runtime::property::{facet_get, facet_set};
use i_qmlrt_runtime::value::Value;
use smol_str::SmolStr;

#[derive(Debug, Clone, PartialEq, derive_more::Error, derive_more::Display)]
#[non_exhaustive]
pub enum EvalError {
    #[display("ReferenceError: {name} is not defined")]
    ReferenceError { name: SmolStr },
    #[display("TypeError: {message}")]
    TypeError { message: String },
    #[display("Error: {message}")]
    Error { message: String },
}

impl EvalError {
    fn type_error(message: impl Into<String>) -> Self {
        EvalError::TypeError { message: message.into() }
    }
}

impl From<SetPropertyError> for EvalError {
    fn from(error: SetPropertyError) -> Self {
        EvalError::TypeError { message: error.to_string() }
    }
}

/// Where an expression is evaluated
#[derive(Clone)]
pub struct EvalScope {
    pub context: ContextRc,
    /// The object whose bindings or handlers the expression belongs to
    pub scope_object: Option<ObjectRc>,
    pub parameters: Vec<(SmolStr, Value)>,
}

impl EvalScope {
    pub fn new(context: ContextRc, scope_object: Option<ObjectRc>) -> Self {
        Self { context, scope_object, parameters: Vec::new() }
    }

    pub fn with_parameters(mut self, names: &[SmolStr], values: &[Value]) -> Self {
        self.parameters = names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.clone(), values.get(i).cloned().unwrap_or_default()))
            .collect();
        self
    }

    fn lookup(&self, name: &str) -> Result<Value, EvalError> {
        if let Some((_, value)) = self.parameters.iter().rev().find(|(n, _)| n == name) {
            return Ok(value.clone());
        }
        for (depth, context) in self.context.ancestry().enumerate() {
            if let Some(object) = context.id_object(name) {
                return Ok(Value::from_object(&object));
            }
            if depth == 0
                && let Some(scope) = &self.scope_object
                && let Some(value) = read_member(scope, name)
            {
                return Ok(value);
            }
            if let Some(object) = context.context_object()
                && let Some(value) = read_member(&object, name)
            {
                return Ok(value);
            }
            if let Some(value) = context.imported_script(name) {
                return Ok(value);
            }
        }
        Err(EvalError::ReferenceError { name: name.into() })
    }

    /// Whether `name` refers to the builtin namespace of that name rather than to something
    /// declared in the document
    fn is_builtin(&self, expression: &Expression, name: &str) -> bool {
        matches!(expression, Expression::Lookup(n) if n == name) && self.lookup(name).is_err()
    }

    /// The object owning the property `name` as it would be found by [`Self::lookup`]
    fn lookup_owner(&self, name: &str) -> Option<ObjectRc> {
        for (depth, context) in self.context.ancestry().enumerate() {
            if context.has_id(name) {
                return None;
            }
            if depth == 0
                && let Some(scope) = &self.scope_object
                && scope.property_index(name).is_some()
            {
                return Some(scope.clone());
            }
            if let Some(object) = context.context_object()
                && object.property_index(name).is_some()
            {
                return Some(object);
            }
        }
        None
    }

    /// Finds the object a function called without target belongs to
    fn function_owner(&self, name: &str) -> Option<ObjectRc> {
        let candidates = self
            .scope_object
            .iter()
            .cloned()
            .chain(self.context.ancestry().filter_map(|c| c.context_object()));
        for object in candidates {
            let has_function = object.declarative_data().functions.iter().any(|(n, _)| n == name)
                || object.native_type().property_cache().method(name).is_some();
            if has_function {
                return Some(object);
            }
        }
        None
    }
}

/// Reads a property of an object, or its `parent`
fn read_member(object: &ObjectRc, name: &str) -> Option<Value> {
    if let Some(index) = object.property_index(name) {
        return Some(object.read_property(index));
    }
    match name {
        "parent" => Some(object.parent().map_or(Value::Null, |p| Value::from_object(&p))),
        _ => None,
    }
}

fn member(base: &Value, name: &str) -> Result<Value, EvalError> {
    match base {
        Value::Object(_) => match base.as_object() {
            Some(object) => Ok(read_member(&object, name).unwrap_or_default()),
            None => Err(EvalError::type_error(format!("Cannot read property '{name}' of null"))),
        },
        Value::Undefined | Value::Null => Err(EvalError::type_error(format!(
            "Cannot read property '{name}' of {}",
            base.to_display_string()
        ))),
        Value::List(list) if name == "length" => Ok(Value::Number(list.len() as f64)),
        Value::String(s) if name == "length" => Ok(Value::Number(s.chars().count() as f64)),
        _ => Ok(facet_get(base, name).unwrap_or_default()),
    }
}

fn math_constant(name: &str) -> Value {
    match name {
        "PI" => Value::Number(std::f64::consts::PI),
        "E" => Value::Number(std::f64::consts::E),
        _ => Value::Undefined,
    }
}

fn call_math(name: &str, arguments: &[Value]) -> Result<Value, EvalError> {
    let arg = |i: usize| arguments.get(i).map_or(f64::NAN, Value::to_number);
    let result = match name {
        "abs" => arg(0).abs(),
        "floor" => arg(0).floor(),
        "ceil" => arg(0).ceil(),
        "round" => (arg(0) + 0.5).floor(),
        "sqrt" => arg(0).sqrt(),
        "pow" => arg(0).powf(arg(1)),
        "max" => arguments.iter().map(Value::to_number).fold(f64::NEG_INFINITY, f64::max),
        "min" => arguments.iter().map(Value::to_number).fold(f64::INFINITY, f64::min),
        _ => return Err(EvalError::type_error(format!("Math.{name} is not a function"))),
    };
    Ok(Value::Number(result))
}

fn call_console(name: &str, arguments: &[Value]) -> Result<Value, EvalError> {
    use itertools::Itertools as _;
    let message = arguments.iter().map(|a| a.to_display_string()).join(" ");
    match name {
        "log" | "info" => log::info!("{message}"),
        "debug" => log::debug!("{message}"),
        "warn" => log::warn!("{message}"),
        "error" => log::error!("{message}"),
        _ => return Err(EvalError::type_error(format!("console.{name} is not a function"))),
    }
    Ok(Value::Undefined)
}

fn call_object(object: &ObjectRc, name: &str, arguments: &[Value]) -> Result<Value, EvalError> {
    if let Some(result) = object.invoke(name, arguments) {
        return result.map_err(|message| EvalError::Error { message });
    }
    if object.emit_by_name(name, arguments) {
        return Ok(Value::Undefined);
    }
    Err(EvalError::type_error(format!(
        "Property '{name}' of object {} is not a function",
        object.type_name()
    )))
}

fn binary(lhs: Value, op: BinaryOp, rhs: Value) -> Value {
    let numbers = || (lhs.to_number(), rhs.to_number());
    match op {
        BinaryOp::Add => match (&lhs, &rhs) {
            (Value::String(a), b) => {
                Value::String(smol_str::format_smolstr!("{a}{}", b.to_display_string()))
            }
            (a, Value::String(b)) => {
                Value::String(smol_str::format_smolstr!("{}{b}", a.to_display_string()))
            }
            _ => Value::Number(lhs.to_number() + rhs.to_number()),
        },
        BinaryOp::Sub => Value::Number(lhs.to_number() - rhs.to_number()),
        BinaryOp::Mul => Value::Number(lhs.to_number() * rhs.to_number()),
        BinaryOp::Div => Value::Number(lhs.to_number() / rhs.to_number()),
        BinaryOp::Rem => Value::Number(lhs.to_number() % rhs.to_number()),
        BinaryOp::Equal => Value::Bool(lhs == rhs),
        BinaryOp::NotEqual => Value::Bool(lhs != rhs),
        BinaryOp::Less | BinaryOp::LessEqual | BinaryOp::Greater | BinaryOp::GreaterEqual => {
            let ordering = match (&lhs, &rhs) {
                (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                _ => {
                    let (a, b) = numbers();
                    a.partial_cmp(&b)
                }
            };
            Value::Bool(ordering.is_some_and(|o| match op {
                BinaryOp::Less => o.is_lt(),
                BinaryOp::LessEqual => o.is_le(),
                BinaryOp::Greater => o.is_gt(),
                _ => o.is_ge(),
            }))
        }
        BinaryOp::And | BinaryOp::Or => {
            unreachable!("short-circuit operators are evaluated lazily")
        }
    }
}

/// Evaluates `expression` in `scope`
pub fn eval_expression(expression: &Expression, scope: &EvalScope) -> Result<Value, EvalError> {
    Ok(match expression {
        Expression::Number(n) => Value::Number(*n),
        Expression::String(s) => Value::String(s.clone()),
        Expression::Bool(b) => Value::Bool(*b),
        Expression::Null => Value::Null,
        Expression::Undefined => Value::Undefined,
        Expression::Lookup(name) => scope.lookup(name)?,
        Expression::Member(base, name) if scope.is_builtin(base, "Math") => math_constant(name),
        Expression::Member(base, name) => member(&eval_expression(base, scope)?, name)?,
        Expression::Binary { lhs, op: BinaryOp::And, rhs } => {
            let lhs = eval_expression(lhs, scope)?;
            if lhs.to_bool() { eval_expression(rhs, scope)? } else { lhs }
        }
        Expression::Binary { lhs, op: BinaryOp::Or, rhs } => {
            let lhs = eval_expression(lhs, scope)?;
            if lhs.to_bool() { lhs } else { eval_expression(rhs, scope)? }
        }
        Expression::Binary { lhs, op, rhs } => {
            binary(eval_expression(lhs, scope)?, *op, eval_expression(rhs, scope)?)
        }
        Expression::Unary { op, operand } => {
            let operand = eval_expression(operand, scope)?;
            match op {
                UnaryOp::Minus => Value::Number(-operand.to_number()),
                UnaryOp::Plus => Value::Number(operand.to_number()),
                UnaryOp::Not => Value::Bool(!operand.to_bool()),
            }
        }
        Expression::Conditional { condition, true_expr, false_expr } => {
            if eval_expression(condition, scope)?.to_bool() {
                eval_expression(true_expr, scope)?
            } else {
                eval_expression(false_expr, scope)?
            }
        }
        Expression::Call { target, name, arguments } => {
            let arguments =
                arguments.iter().map(|a| eval_expression(a, scope)).collect::<Result<Vec<_>, _>>()?;
            match target.as_deref() {
                None => match scope.function_owner(name) {
                    Some(object) => call_object(&object, name, &arguments)?,
                    None => return Err(EvalError::ReferenceError { name: name.clone() }),
                },
                Some(ns) if scope.is_builtin(ns, "Math") => call_math(name, &arguments)?,
                Some(ns) if scope.is_builtin(ns, "console") => call_console(name, &arguments)?,
                Some(target) => match eval_expression(target, scope)?.as_object() {
                    Some(object) => call_object(&object, name, &arguments)?,
                    None => {
                        return Err(EvalError::type_error(format!(
                            "Cannot call method '{name}' of null"
                        )));
                    }
                },
            }
        }
        Expression::Assign { target, value } => {
            let value = eval_expression(value, scope)?;
            assign(target, value.clone(), scope)?;
            value
        }
        Expression::Array(items) => {
            Value::List(items.iter().map(|i| eval_expression(i, scope)).collect::<Result<_, _>>()?)
        }
        Expression::Sequence(items) => {
            let mut last = Value::Undefined;
            for item in items {
                last = eval_expression(item, scope)?;
            }
            last
        }
    })
}

/// Imperative assignment: removes the binding of the assigned property
fn assign(target: &Expression, value: Value, scope: &EvalScope) -> Result<(), EvalError> {
    match target {
        Expression::Lookup(name) => match scope.lookup_owner(name) {
            Some(object) => Ok(object.set(name, value)?),
            None => Err(EvalError::ReferenceError { name: name.clone() }),
        },
        Expression::Member(base, name) => {
            let base_value = eval_expression(base, scope)?;
            if let Some(object) = base_value.as_object() {
                return Ok(object.set(name, value)?);
            }
            // `valueTypeProperty.facet = value` or `object.valueTypeProperty.facet = value`
            let owner = match &**base {
                Expression::Lookup(property) => scope.lookup_owner(property).map(|o| (o, property)),
                Expression::Member(owner, property) => {
                    eval_expression(owner, scope)?.as_object().map(|o| (o, property))
                }
                _ => None,
            };
            match (owner, facet_set(&base_value, name, value)) {
                (Some((object, property)), Some(updated)) => Ok(object.set(property, updated)?),
                _ => Err(EvalError::type_error(format!(
                    "Cannot assign to '{name}' of {}",
                    base_value.to_display_string()
                ))),
            }
        }
        _ => Err(EvalError::Error { message: "Invalid left-hand side in assignment".into() }),
    }
}
