// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: GPL-3.0-only OR LicenseRef-Slint-Royalty-free-2.0 OR LicenseRef-Slint-Software-3.0

use crate::compiled::ScriptIndex;
use crate::context::ContextWeak;
use crate::graphics::{Color, Point, Rect, Size, Vector2D, Vector3D, Vector4D};
use crate::object::{ObjectRc, ObjectWeak};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use euclid::approxeq::ApproxEq as _;
use smol_str::{SmolStr, ToSmolStr};
use std::collections::BTreeMap;
use std::rc::Rc;

/// This enum represents the different variants of the [`Value`] enum, without
/// the contained values.
#[derive(Debug, Copy, Clone, PartialEq, Eq, strum::Display)]
#[non_exhaustive]
pub enum ValueType {
    #[strum(serialize = "undefined")]
    Undefined,
    #[strum(serialize = "null")]
    Null,
    #[strum(serialize = "number")]
    Number,
    #[strum(serialize = "bool")]
    Bool,
    #[strum(serialize = "string")]
    String,
    #[strum(serialize = "color")]
    Color,
    #[strum(serialize = "date")]
    Date,
    #[strum(serialize = "time")]
    Time,
    #[strum(serialize = "datetime")]
    DateTime,
    #[strum(serialize = "point")]
    Point,
    #[strum(serialize = "size")]
    Size,
    #[strum(serialize = "rect")]
    Rect,
    #[strum(serialize = "vector2d")]
    Vector2D,
    #[strum(serialize = "vector3d")]
    Vector3D,
    #[strum(serialize = "vector4d")]
    Vector4D,
    #[strum(serialize = "struct")]
    Struct,
    #[strum(serialize = "object")]
    Object,
    #[strum(serialize = "list")]
    List,
    #[strum(serialize = "script string")]
    ScriptString,
}

/// A dynamically typed value as stored in object property slots and produced by
/// expressions.
#[derive(Clone, Default)]
#[non_exhaustive]
pub enum Value {
    /// There is nothing in this value. That's the default.
    #[default]
    Undefined,
    /// The null object reference
    Null,
    Number(f64),
    Bool(bool),
    String(SmolStr),
    Color(Color),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    Point(Point),
    Size(Size),
    Rect(Rect),
    Vector2D(Vector2D),
    Vector3D(Vector3D),
    Vector4D(Vector4D),
    /// A generic value type with named facets (`font`, `anchors`-like groups)
    Struct(Struct),
    /// A reference to a live object. References never own the object.
    Object(ObjectWeak),
    List(Vec<Value>),
    ScriptString(ScriptString),
}

impl Value {
    /// Returns the type variant that this value holds without the containing value.
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Undefined => ValueType::Undefined,
            Value::Null => ValueType::Null,
            Value::Number(_) => ValueType::Number,
            Value::Bool(_) => ValueType::Bool,
            Value::String(_) => ValueType::String,
            Value::Color(_) => ValueType::Color,
            Value::Date(_) => ValueType::Date,
            Value::Time(_) => ValueType::Time,
            Value::DateTime(_) => ValueType::DateTime,
            Value::Point(_) => ValueType::Point,
            Value::Size(_) => ValueType::Size,
            Value::Rect(_) => ValueType::Rect,
            Value::Vector2D(_) => ValueType::Vector2D,
            Value::Vector3D(_) => ValueType::Vector3D,
            Value::Vector4D(_) => ValueType::Vector4D,
            Value::Struct(_) => ValueType::Struct,
            Value::Object(_) => ValueType::Object,
            Value::List(_) => ValueType::List,
            Value::ScriptString(_) => ValueType::ScriptString,
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_null_or_undefined(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => true,
            Value::Object(o) => o.strong_count() == 0,
            _ => false,
        }
    }

    pub fn from_object(object: &ObjectRc) -> Self {
        Value::Object(Rc::downgrade(object))
    }

    /// The live object this value references, if any
    pub fn as_object(&self) -> Option<ObjectRc> {
        match self {
            Value::Object(o) => o.upgrade().filter(|o| !o.is_destroyed()),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Numeric conversion following script semantics (`true` is 1, unparsable strings are NaN)
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Number(n) => *n,
            Value::Bool(b) => *b as i32 as f64,
            Value::String(s) => {
                let s = s.trim();
                if s.is_empty() { 0. } else { s.parse().unwrap_or(f64::NAN) }
            }
            Value::Null => 0.,
            _ => f64::NAN,
        }
    }

    /// Truthiness following script semantics
    pub fn to_bool(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Number(n) => *n != 0. && !n.is_nan(),
            Value::Bool(b) => *b,
            Value::String(s) => !s.is_empty(),
            Value::Object(o) => o.strong_count() > 0,
            _ => true,
        }
    }

    /// String conversion following script semantics
    pub fn to_display_string(&self) -> SmolStr {
        match self {
            Value::Undefined => "undefined".into(),
            Value::Null => "null".into(),
            Value::Number(n) => format_number(*n),
            Value::Bool(b) => b.to_smolstr(),
            Value::String(s) => s.clone(),
            Value::Color(c) => c.to_smolstr(),
            Value::Date(d) => d.format("%Y-%m-%d").to_smolstr(),
            Value::Time(t) => t.format("%H:%M:%S").to_smolstr(),
            Value::DateTime(dt) => dt.format("%Y-%m-%dT%H:%M:%S").to_smolstr(),
            Value::Point(p) => smol_str::format_smolstr!("Point({}, {})", p.x, p.y),
            Value::Size(s) => smol_str::format_smolstr!("Size({}, {})", s.width, s.height),
            Value::Rect(r) => smol_str::format_smolstr!(
                "Rect({}, {}, {}, {})",
                r.origin.x,
                r.origin.y,
                r.size.width,
                r.size.height
            ),
            Value::Vector2D(v) => smol_str::format_smolstr!("Vector2D({}, {})", v.x, v.y),
            Value::Vector3D(v) => smol_str::format_smolstr!("Vector3D({}, {}, {})", v.x, v.y, v.z),
            Value::Vector4D(v) => {
                smol_str::format_smolstr!("Vector4D({}, {}, {}, {})", v.x, v.y, v.z, v.w)
            }
            Value::Struct(_) => "[object Object]".into(),
            Value::Object(o) => match o.upgrade() {
                Some(o) => {
                    smol_str::format_smolstr!("{}(0x{:x})", o.type_name(), Rc::as_ptr(&o) as usize)
                }
                None => "null".into(),
            },
            Value::List(l) => {
                use itertools::Itertools as _;
                l.iter().map(|v| v.to_display_string()).join(",").into()
            }
            Value::ScriptString(s) => s.script.clone(),
        }
    }
}

fn format_number(n: f64) -> SmolStr {
    if n.is_nan() {
        "NaN".into()
    } else if n.is_infinite() {
        if n > 0. { "Infinity".into() } else { "-Infinity".into() }
    } else if n.fract() == 0. && n.abs() < 1e21 {
        (n as i64).to_smolstr()
    } else {
        n.to_smolstr()
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match self {
            Value::Undefined => matches!(other, Value::Undefined),
            Value::Null => matches!(other, Value::Null),
            Value::Number(lhs) => matches!(other, Value::Number(rhs) if lhs.approx_eq(rhs)),
            Value::Bool(lhs) => matches!(other, Value::Bool(rhs) if lhs == rhs),
            Value::String(lhs) => matches!(other, Value::String(rhs) if lhs == rhs),
            Value::Color(lhs) => matches!(other, Value::Color(rhs) if lhs == rhs),
            Value::Date(lhs) => matches!(other, Value::Date(rhs) if lhs == rhs),
            Value::Time(lhs) => matches!(other, Value::Time(rhs) if lhs == rhs),
            Value::DateTime(lhs) => matches!(other, Value::DateTime(rhs) if lhs == rhs),
            Value::Point(lhs) => matches!(other, Value::Point(rhs) if lhs.approx_eq(rhs)),
            Value::Size(lhs) => matches!(other, Value::Size(rhs) if size_approx_eq(lhs, rhs)),
            Value::Rect(lhs) => matches!(
                other,
                Value::Rect(rhs)
                    if lhs.origin.approx_eq(&rhs.origin) && size_approx_eq(&lhs.size, &rhs.size)
            ),
            Value::Vector2D(lhs) => matches!(other, Value::Vector2D(rhs) if lhs.approx_eq(rhs)),
            Value::Vector3D(lhs) => matches!(other, Value::Vector3D(rhs) if lhs.approx_eq(rhs)),
            Value::Vector4D(lhs) => matches!(other, Value::Vector4D(rhs) if lhs == rhs),
            Value::Struct(lhs) => matches!(other, Value::Struct(rhs) if lhs == rhs),
            Value::Object(lhs) => matches!(other, Value::Object(rhs) if lhs.ptr_eq(rhs)),
            Value::List(lhs) => matches!(other, Value::List(rhs) if lhs == rhs),
            Value::ScriptString(lhs) => matches!(other, Value::ScriptString(rhs) if lhs == rhs),
        }
    }
}

fn size_approx_eq(lhs: &Size, rhs: &Size) -> bool {
    lhs.width.approx_eq(&rhs.width) && lhs.height.approx_eq(&rhs.height)
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Undefined => write!(f, "Value::Undefined"),
            Value::Null => write!(f, "Value::Null"),
            Value::Number(n) => write!(f, "Value::Number({n:?})"),
            Value::Bool(b) => write!(f, "Value::Bool({b:?})"),
            Value::String(s) => write!(f, "Value::String({s:?})"),
            Value::Color(c) => write!(f, "Value::Color({c})"),
            Value::Date(d) => write!(f, "Value::Date({d})"),
            Value::Time(t) => write!(f, "Value::Time({t})"),
            Value::DateTime(dt) => write!(f, "Value::DateTime({dt})"),
            Value::Point(p) => write!(f, "Value::Point({p:?})"),
            Value::Size(s) => write!(f, "Value::Size({s:?})"),
            Value::Rect(r) => write!(f, "Value::Rect({r:?})"),
            Value::Vector2D(v) => write!(f, "Value::Vector2D({v:?})"),
            Value::Vector3D(v) => write!(f, "Value::Vector3D({v:?})"),
            Value::Vector4D(v) => write!(f, "Value::Vector4D({v:?})"),
            Value::Struct(s) => write!(f, "Value::Struct({s:?})"),
            Value::Object(o) => match o.upgrade() {
                Some(o) => write!(f, "Value::Object({})", o.type_name()),
                None => write!(f, "Value::Object(<dead>)"),
            },
            Value::List(l) => {
                write!(f, "Value::List(")?;
                f.debug_list().entries(l.iter()).finish()?;
                write!(f, ")")
            }
            Value::ScriptString(s) => write!(f, "Value::ScriptString({:?})", s.script),
        }
    }
}

/// Helper macro to implement the From / TryFrom for Value
///
/// For example
/// `declare_value_conversion!(Number => [u32, u64, i32, i64, f32, f64] );`
/// means that `Value::Number` can be converted to / from each of the said rust types
macro_rules! declare_value_conversion {
    ( $value:ident => [$($ty:ty),*] ) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$value(v as _)
                }
            }
            impl TryFrom<Value> for $ty {
                type Error = Value;
                fn try_from(v: Value) -> Result<$ty, Self::Error> {
                    match v {
                        Value::$value(x) => Ok(x as _),
                        _ => Err(v)
                    }
                }
            }
        )*
    };
}
declare_value_conversion!(Number => [u32, u64, i32, i64, f32, f64, usize, isize] );
declare_value_conversion!(Bool => [bool] );
declare_value_conversion!(Color => [Color] );
declare_value_conversion!(Date => [NaiveDate] );
declare_value_conversion!(Time => [NaiveTime] );
declare_value_conversion!(DateTime => [NaiveDateTime] );
declare_value_conversion!(Point => [Point] );
declare_value_conversion!(Size => [Size] );
declare_value_conversion!(Rect => [Rect] );
declare_value_conversion!(Vector2D => [Vector2D] );
declare_value_conversion!(Vector3D => [Vector3D] );
declare_value_conversion!(Vector4D => [Vector4D] );
declare_value_conversion!(Struct => [Struct] );

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.into())
    }
}

impl From<SmolStr> for Value {
    fn from(v: SmolStr) -> Self {
        Value::String(v)
    }
}

impl TryFrom<Value> for SmolStr {
    type Error = Value;
    fn try_from(v: Value) -> Result<SmolStr, Self::Error> {
        match v {
            Value::String(s) => Ok(s),
            _ => Err(v),
        }
    }
}

impl From<()> for Value {
    #[inline]
    fn from(_: ()) -> Self {
        Value::Undefined
    }
}

/// This type represents a value type with named fields. Reading and writing a field
/// is a read-modify-write of the whole struct.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct Struct(BTreeMap<SmolStr, Value>);

impl Struct {
    /// Get the value for a given struct field
    pub fn get_field(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }
    /// Set the value of a given struct field
    pub fn set_field(&mut self, name: SmolStr, value: Value) {
        self.0.insert(name, value);
    }

    /// Iterate over all the fields in this struct
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(a, b)| (a.as_str(), b))
    }
}

impl FromIterator<(SmolStr, Value)> for Struct {
    fn from_iter<T: IntoIterator<Item = (SmolStr, Value)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// The raw text of a binding expression together with the scope it was written in, for
/// properties that want to evaluate the expression themselves later.
#[derive(Clone, Debug, Default)]
pub struct ScriptString {
    pub script: SmolStr,
    pub script_index: Option<ScriptIndex>,
    pub context: Option<ContextWeak>,
    pub scope: Option<ObjectWeak>,
    /// Set when the expression is a plain literal, so that it can be read without evaluation
    pub literal: Option<Box<Value>>,
    pub line: u32,
    pub column: u32,
}

impl ScriptString {
    pub fn is_empty(&self) -> bool {
        self.script.is_empty()
    }

    pub fn is_undefined_literal(&self) -> bool {
        self.script == "undefined"
    }

    pub fn number_literal(&self) -> Option<f64> {
        self.literal.as_deref().and_then(Value::as_number)
    }

    pub fn string_literal(&self) -> Option<&str> {
        match self.literal.as_deref() {
            Some(Value::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl PartialEq for ScriptString {
    fn eq(&self, other: &Self) -> bool {
        self.script == other.script
            && self.script_index == other.script_index
            && match (&self.scope, &other.scope) {
                (Some(a), Some(b)) => a.ptr_eq(b),
                (None, None) => true,
                _ => false,
            }
    }
}

#[test]
fn value_conversions() {
    let v = Value::from(100u32);
    assert_eq!(v.clone().try_into(), Ok(100u32));
    assert_eq!(v.value_type(), ValueType::Number);
    assert_eq!(Value::from(true).to_number(), 1.);
    assert_eq!(Value::from("12").to_number(), 12.);
    assert!(Value::from("x").to_number().is_nan());
    assert_eq!(Value::Number(3.).to_display_string(), "3");
    assert_eq!(Value::Number(1.5).to_display_string(), "1.5");
    assert!(!Value::from("").to_bool());
    assert!(Value::Null.is_null_or_undefined());
    assert_eq!(ValueType::Vector3D.to_string(), "vector3d");
}
