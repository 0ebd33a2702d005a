// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: GPL-3.0-only OR LicenseRef-Slint-Royalty-free-2.0 OR LicenseRef-Slint-Software-3.0

/*!
Property descriptors and the property cache.

A [`PropertyCache`] maps the property, signal and method names of an object to slot indices.
Native types build one cache per type; objects that declare extra properties in a document
get a derived cache of their own (the "virtual meta object").
*/

use crate::graphics::Color;
use crate::literals;
use crate::value::{Struct, Value};
use smol_str::{SmolStr, format_smolstr};
use std::collections::HashMap;
use std::rc::Rc;

/// An enumeration type with named integer keys
#[derive(Debug, Clone, PartialEq)]
pub struct EnumInfo {
    pub name: SmolStr,
    pub values: Vec<(SmolStr, i32)>,
}

impl EnumInfo {
    pub fn new(name: &str, values: &[(&str, i32)]) -> Rc<Self> {
        let values = values.iter().map(|(k, v)| ((*k).into(), *v)).collect();
        Rc::new(Self { name: name.into(), values })
    }

    /// Resolves `Key`, `Enum.Key` or `Type.Key`
    pub fn value_of(&self, key: &str) -> Option<i32> {
        let key = key.rsplit('.').next().unwrap_or(key);
        self.values.iter().find(|(k, _)| k == key).map(|(_, v)| *v)
    }
}

/// A registered value type with named fields, like `font`
#[derive(Debug, Clone, PartialEq)]
pub struct ValueTypeInfo {
    pub name: SmolStr,
    pub fields: Vec<(SmolStr, PropertyType)>,
}

impl ValueTypeInfo {
    pub fn new(name: &str, fields: Vec<(&str, PropertyType)>) -> Rc<Self> {
        let fields = fields.into_iter().map(|(n, t)| (n.into(), t)).collect();
        Rc::new(Self { name: name.into(), fields })
    }

    pub fn default_value(&self) -> Struct {
        self.fields.iter().map(|(n, t)| (n.clone(), t.default_value())).collect()
    }
}

/// The declared type of a property slot
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum PropertyType {
    Int,
    Real,
    Bool,
    String,
    Url,
    Color,
    Date,
    Time,
    DateTime,
    Point,
    Size,
    Rect,
    Vector2D,
    Vector3D,
    Vector4D,
    Enumeration(Rc<EnumInfo>),
    /// A reference to an object, optionally restricted to a type and its subtypes
    Object(Option<SmolStr>),
    /// A reference to an object implementing the named interface
    Interface(SmolStr),
    List {
        element_interface: Option<SmolStr>,
        appendable: bool,
    },
    /// `var` properties of documents, storing any value
    Var,
    /// `variant` properties of native types
    Variant,
    ScriptString,
    ValueType(Rc<ValueTypeInfo>),
    /// A native type with a registered string converter
    Custom(SmolStr),
}

impl PropertyType {
    pub fn default_value(&self) -> Value {
        match self {
            PropertyType::Int | PropertyType::Real | PropertyType::Enumeration(_) => {
                Value::Number(0.)
            }
            PropertyType::Bool => Value::Bool(false),
            PropertyType::String | PropertyType::Url => Value::String(SmolStr::default()),
            PropertyType::Color => Value::Color(Color::default()),
            PropertyType::Date => Value::Date(chrono::NaiveDate::default()),
            PropertyType::Time => Value::Time(chrono::NaiveTime::MIN),
            PropertyType::DateTime => Value::DateTime(chrono::NaiveDateTime::default()),
            PropertyType::Point => Value::Point(Default::default()),
            PropertyType::Size => Value::Size(Default::default()),
            PropertyType::Rect => Value::Rect(Default::default()),
            PropertyType::Vector2D => Value::Vector2D(Default::default()),
            PropertyType::Vector3D => Value::Vector3D(Default::default()),
            PropertyType::Vector4D => Value::Vector4D(Default::default()),
            PropertyType::Object(_) | PropertyType::Interface(_) => Value::Null,
            PropertyType::List { .. } => Value::List(Vec::new()),
            PropertyType::Var | PropertyType::Variant | PropertyType::Custom(_) => Value::Undefined,
            PropertyType::ScriptString => Value::ScriptString(Default::default()),
            PropertyType::ValueType(info) => Value::Struct(info.default_value()),
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, PropertyType::List { .. })
    }

    /// Properties whose facets can be bound individually with read-modify-write semantics
    pub fn is_value_type(&self) -> bool {
        matches!(
            self,
            PropertyType::Point
                | PropertyType::Size
                | PropertyType::Rect
                | PropertyType::Vector2D
                | PropertyType::Vector3D
                | PropertyType::Vector4D
                | PropertyType::Color
                | PropertyType::ValueType(_)
        )
    }

    pub fn is_object(&self) -> bool {
        matches!(self, PropertyType::Object(_) | PropertyType::Interface(_))
    }

    /// The type of the facet `name` of a value type property
    pub fn facet_type(&self, name: &str) -> Option<PropertyType> {
        match (self, name) {
            (PropertyType::Point | PropertyType::Vector2D, "x" | "y") => Some(PropertyType::Real),
            (PropertyType::Vector3D, "x" | "y" | "z") => Some(PropertyType::Real),
            (PropertyType::Vector4D, "x" | "y" | "z" | "w") => Some(PropertyType::Real),
            (PropertyType::Size, "width" | "height") => Some(PropertyType::Real),
            (PropertyType::Rect, "x" | "y" | "width" | "height") => Some(PropertyType::Real),
            (PropertyType::Color, "r" | "g" | "b" | "a") => Some(PropertyType::Real),
            (PropertyType::ValueType(info), _) => {
                info.fields.iter().find(|(n, _)| n == name).map(|(_, t)| t.clone())
            }
            _ => None,
        }
    }

    /// Converts `value` to the representation stored for this type
    pub fn coerce(&self, value: Value) -> Result<Value, String> {
        let mismatch = |value: &Value| -> String {
            match value {
                Value::Undefined => format!("Unable to assign [undefined] to {self}"),
                v => format!("Unable to assign {} to {self}", v.value_type()),
            }
        };
        Ok(match self {
            PropertyType::Int => match value {
                Value::Number(n) if n.is_finite() => Value::Number(n.trunc()),
                Value::Bool(_) | Value::String(_) => Value::Number(value.to_number().trunc()),
                v => return Err(mismatch(&v)),
            },
            PropertyType::Real => match value {
                Value::Number(_) => value,
                Value::Bool(_) | Value::String(_) => Value::Number(value.to_number()),
                v => return Err(mismatch(&v)),
            },
            PropertyType::Enumeration(_) => match value {
                Value::Number(n) => Value::Number(n.trunc()),
                v => return Err(mismatch(&v)),
            },
            PropertyType::Bool => match value {
                Value::Undefined => return Err(mismatch(&value)),
                v => Value::Bool(v.to_bool()),
            },
            PropertyType::String | PropertyType::Url => match value {
                Value::Undefined => return Err(mismatch(&value)),
                Value::String(_) => value,
                v => Value::String(v.to_display_string()),
            },
            PropertyType::Color => match value {
                Value::Color(_) => value,
                Value::String(s) => {
                    Value::Color(literals::parse_color(&s).map_err(|e| e.to_string())?)
                }
                v => return Err(mismatch(&v)),
            },
            PropertyType::Date => match value {
                Value::Date(_) => value,
                Value::DateTime(dt) => Value::Date(dt.date()),
                Value::String(s) => {
                    Value::Date(literals::parse_date(&s).map_err(|e| e.to_string())?)
                }
                v => return Err(mismatch(&v)),
            },
            PropertyType::Time => match value {
                Value::Time(_) => value,
                Value::DateTime(dt) => Value::Time(dt.time()),
                Value::String(s) => {
                    Value::Time(literals::parse_time(&s).map_err(|e| e.to_string())?)
                }
                v => return Err(mismatch(&v)),
            },
            PropertyType::DateTime => match value {
                Value::DateTime(_) => value,
                Value::String(s) => {
                    Value::DateTime(literals::parse_date_time(&s).map_err(|e| e.to_string())?)
                }
                v => return Err(mismatch(&v)),
            },
            PropertyType::Point => match value {
                Value::Point(_) => value,
                Value::String(s) => {
                    Value::Point(literals::parse_point(&s).map_err(|e| e.to_string())?)
                }
                v => return Err(mismatch(&v)),
            },
            PropertyType::Size => match value {
                Value::Size(_) => value,
                Value::String(s) => {
                    Value::Size(literals::parse_size(&s).map_err(|e| e.to_string())?)
                }
                v => return Err(mismatch(&v)),
            },
            PropertyType::Rect => match value {
                Value::Rect(_) => value,
                Value::String(s) => {
                    Value::Rect(literals::parse_rect(&s).map_err(|e| e.to_string())?)
                }
                v => return Err(mismatch(&v)),
            },
            PropertyType::Vector2D => match value {
                Value::Vector2D(_) => value,
                v => return Err(mismatch(&v)),
            },
            PropertyType::Vector3D => match value {
                Value::Vector3D(_) => value,
                v => return Err(mismatch(&v)),
            },
            PropertyType::Vector4D => match value {
                Value::Vector4D(_) => value,
                v => return Err(mismatch(&v)),
            },
            PropertyType::Object(type_name) => match value {
                Value::Null => value,
                Value::Undefined => Value::Null,
                Value::Object(_) => match (value.as_object(), type_name) {
                    (None, _) => Value::Null,
                    (Some(o), Some(t)) if !o.native_type().is_a(t) => {
                        return Err(format!("Unable to assign {} to {t}", o.type_name()));
                    }
                    (Some(_), _) => value,
                },
                v => return Err(mismatch(&v)),
            },
            PropertyType::Interface(name) => match value {
                Value::Null | Value::Undefined => Value::Null,
                Value::Object(_) => match value.as_object() {
                    Some(o) if !o.native_type().is_a(name) => {
                        return Err(format!("Unable to assign {} to {name}", o.type_name()));
                    }
                    _ => value,
                },
                v => return Err(mismatch(&v)),
            },
            PropertyType::List { .. } => match value {
                Value::List(_) => value,
                Value::Object(_) | Value::Null => Value::List(vec![value]),
                v => return Err(mismatch(&v)),
            },
            PropertyType::Var | PropertyType::Variant | PropertyType::Custom(_) => value,
            PropertyType::ScriptString => match value {
                Value::ScriptString(_) => value,
                v => return Err(mismatch(&v)),
            },
            PropertyType::ValueType(_) => match value {
                Value::Struct(_) => value,
                v => return Err(mismatch(&v)),
            },
        })
    }
}

impl std::fmt::Display for PropertyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PropertyType::Int => write!(f, "int"),
            PropertyType::Real => write!(f, "real"),
            PropertyType::Bool => write!(f, "bool"),
            PropertyType::String => write!(f, "string"),
            PropertyType::Url => write!(f, "url"),
            PropertyType::Color => write!(f, "color"),
            PropertyType::Date => write!(f, "date"),
            PropertyType::Time => write!(f, "time"),
            PropertyType::DateTime => write!(f, "datetime"),
            PropertyType::Point => write!(f, "point"),
            PropertyType::Size => write!(f, "size"),
            PropertyType::Rect => write!(f, "rect"),
            PropertyType::Vector2D => write!(f, "vector2d"),
            PropertyType::Vector3D => write!(f, "vector3d"),
            PropertyType::Vector4D => write!(f, "vector4d"),
            PropertyType::Enumeration(e) => write!(f, "{}", e.name),
            PropertyType::Object(Some(t)) => write!(f, "{t}"),
            PropertyType::Object(None) => write!(f, "object"),
            PropertyType::Interface(i) => write!(f, "{i}"),
            PropertyType::List { element_interface: Some(e), .. } => write!(f, "list<{e}>"),
            PropertyType::List { element_interface: None, .. } => write!(f, "list<object>"),
            PropertyType::Var => write!(f, "var"),
            PropertyType::Variant => write!(f, "variant"),
            PropertyType::ScriptString => write!(f, "script string"),
            PropertyType::ValueType(v) => write!(f, "{}", v.name),
            PropertyType::Custom(c) => write!(f, "{c}"),
        }
    }
}

/// Reads facet `name` of a value type value
pub fn facet_get(value: &Value, name: &str) -> Option<Value> {
    Some(match (value, name) {
        (Value::Point(p), "x") => p.x.into(),
        (Value::Point(p), "y") => p.y.into(),
        (Value::Size(s), "width") => s.width.into(),
        (Value::Size(s), "height") => s.height.into(),
        (Value::Rect(r), "x") => r.origin.x.into(),
        (Value::Rect(r), "y") => r.origin.y.into(),
        (Value::Rect(r), "width") => r.size.width.into(),
        (Value::Rect(r), "height") => r.size.height.into(),
        (Value::Vector2D(v), "x") => v.x.into(),
        (Value::Vector2D(v), "y") => v.y.into(),
        (Value::Vector3D(v), "x") => v.x.into(),
        (Value::Vector3D(v), "y") => v.y.into(),
        (Value::Vector3D(v), "z") => v.z.into(),
        (Value::Vector4D(v), "x") => v.x.into(),
        (Value::Vector4D(v), "y") => v.y.into(),
        (Value::Vector4D(v), "z") => v.z.into(),
        (Value::Vector4D(v), "w") => v.w.into(),
        (Value::Color(c), _) => c.channel(name)?.into(),
        (Value::Struct(s), _) => s.get_field(name)?.clone(),
        _ => return None,
    })
}

/// Returns `value` with facet `name` replaced. `None` if the value has no such facet.
pub fn facet_set(value: &Value, name: &str, facet: Value) -> Option<Value> {
    let mut value = value.clone();
    match (&mut value, name) {
        (Value::Struct(s), _) => {
            s.get_field(name)?;
            s.set_field(name.into(), facet);
            return Some(value);
        }
        (Value::Color(c), _) => {
            *c = c.with_channel(name, facet.to_number())?;
            return Some(value);
        }
        _ => {}
    }
    let n = facet.to_number();
    match (&mut value, name) {
        (Value::Point(p), "x") => p.x = n,
        (Value::Point(p), "y") => p.y = n,
        (Value::Size(s), "width") => s.width = n,
        (Value::Size(s), "height") => s.height = n,
        (Value::Rect(r), "x") => r.origin.x = n,
        (Value::Rect(r), "y") => r.origin.y = n,
        (Value::Rect(r), "width") => r.size.width = n,
        (Value::Rect(r), "height") => r.size.height = n,
        (Value::Vector2D(v), "x") => v.x = n,
        (Value::Vector2D(v), "y") => v.y = n,
        (Value::Vector3D(v), "x") => v.x = n,
        (Value::Vector3D(v), "y") => v.y = n,
        (Value::Vector3D(v), "z") => v.z = n,
        (Value::Vector4D(v), "x") => v.x = n,
        (Value::Vector4D(v), "y") => v.y = n,
        (Value::Vector4D(v), "z") => v.z = n,
        (Value::Vector4D(v), "w") => v.w = n,
        _ => return None,
    }
    Some(value)
}

/// Flags of a [`PropertyData`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PropertyFlags(u8);

impl PropertyFlags {
    pub const WRITABLE: Self = Self(1 << 0);
    pub const ALIAS: Self = Self(1 << 1);
    pub const DEFAULT: Self = Self(1 << 2);
    pub const FINAL: Self = Self(1 << 3);
    /// Declared by a document rather than by a native type
    pub const DYNAMIC: Self = Self(1 << 4);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

impl std::ops::BitOr for PropertyFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// The target of an alias property: an object id in the declaring document and an optional
/// property of that object. Without a property, the alias refers to the object itself.
#[derive(Debug, Clone, PartialEq)]
pub struct AliasTarget {
    pub object_id: SmolStr,
    pub property: Option<SmolStr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyData {
    pub name: SmolStr,
    pub ty: PropertyType,
    pub flags: PropertyFlags,
    pub alias: Option<AliasTarget>,
    /// Initial value of the slot, the type's default value otherwise
    pub initial_value: Option<Value>,
}

impl PropertyData {
    pub fn new(name: impl Into<SmolStr>, ty: PropertyType) -> Self {
        Self {
            name: name.into(),
            ty,
            flags: PropertyFlags::WRITABLE,
            alias: None,
            initial_value: None,
        }
    }

    pub fn alias(name: impl Into<SmolStr>, target: AliasTarget) -> Self {
        Self {
            name: name.into(),
            ty: PropertyType::Var,
            flags: PropertyFlags::WRITABLE | PropertyFlags::ALIAS | PropertyFlags::DYNAMIC,
            alias: Some(target),
            initial_value: None,
        }
    }

    pub fn is_writable(&self) -> bool {
        self.flags.contains(PropertyFlags::WRITABLE)
    }

    pub fn is_alias(&self) -> bool {
        self.alias.is_some()
    }

    pub fn initial_value(&self) -> Value {
        self.initial_value.clone().unwrap_or_else(|| self.ty.default_value())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignalParameter {
    pub name: SmolStr,
    pub ty: PropertyType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignalData {
    pub name: SmolStr,
    pub parameters: Vec<SignalParameter>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodData {
    pub name: SmolStr,
    pub parameters: Vec<PropertyType>,
}

/// A signal of an object: either a declared signal or the change signal of a property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalRef {
    Declared(usize),
    PropertyChanged(usize),
}

/// Maps names to slots for one type, or for one object extending its type.
#[derive(Debug, Clone, Default)]
pub struct PropertyCache {
    type_name: SmolStr,
    properties: Vec<PropertyData>,
    signals: Vec<SignalData>,
    methods: Vec<MethodData>,
    by_name: HashMap<SmolStr, usize>,
    default_property: Option<usize>,
}

impl PropertyCache {
    pub fn new(type_name: impl Into<SmolStr>) -> Self {
        Self { type_name: type_name.into(), ..Default::default() }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Adds a property, shadowing a previous one of the same name. Returns the slot index.
    pub fn add_property(&mut self, data: PropertyData) -> usize {
        let index = self.properties.len();
        if data.flags.contains(PropertyFlags::DEFAULT) {
            self.default_property = Some(index);
        }
        self.by_name.insert(data.name.clone(), index);
        self.properties.push(data);
        index
    }

    pub fn add_signal(&mut self, data: SignalData) -> usize {
        self.signals.retain(|s| s.name != data.name);
        self.signals.push(data);
        self.signals.len() - 1
    }

    pub fn add_method(&mut self, data: MethodData) {
        self.methods.retain(|m| m.name != data.name);
        self.methods.push(data);
    }

    pub fn set_default_property(&mut self, name: &str) -> bool {
        match self.by_name.get(name) {
            Some(index) => {
                self.default_property = Some(*index);
                true
            }
            None => false,
        }
    }

    /// A cache for an object extending this type with its own declarations
    pub fn derive(&self) -> Self {
        self.clone()
    }

    pub fn property_count(&self) -> usize {
        self.properties.len()
    }

    pub fn property(&self, index: usize) -> Option<&PropertyData> {
        self.properties.get(index)
    }

    pub fn properties(&self) -> &[PropertyData] {
        &self.properties
    }

    pub fn property_index(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn find_property(&self, name: &str) -> Option<(usize, &PropertyData)> {
        let index = self.property_index(name)?;
        Some((index, &self.properties[index]))
    }

    pub fn default_property(&self) -> Option<(usize, &PropertyData)> {
        let index = self.default_property?;
        Some((index, &self.properties[index]))
    }

    pub fn signals(&self) -> &[SignalData] {
        &self.signals
    }

    pub fn method(&self, name: &str) -> Option<&MethodData> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// Resolves `clicked` or `widthChanged`
    pub fn signal(&self, name: &str) -> Option<SignalRef> {
        if let Some(index) = self.signals.iter().position(|s| s.name == name) {
            return Some(SignalRef::Declared(index));
        }
        let property = name.strip_suffix("Changed")?;
        self.property_index(property).map(SignalRef::PropertyChanged)
    }

    /// Resolves a handler name such as `onClicked` or `onWidthChanged` to its signal
    pub fn handler_signal(&self, handler: &str) -> Option<SignalRef> {
        let rest = handler.strip_prefix("on")?;
        let mut chars = rest.chars();
        let first = chars.next()?;
        if !first.is_ascii_uppercase() {
            return None;
        }
        let name = format_smolstr!("{}{}", first.to_ascii_lowercase(), chars.as_str());
        self.signal(&name)
    }

    pub fn signal_name(&self, signal: SignalRef) -> SmolStr {
        match signal {
            SignalRef::Declared(index) => self.signals[index].name.clone(),
            SignalRef::PropertyChanged(index) => {
                format_smolstr!("{}Changed", self.properties[index].name)
            }
        }
    }

    pub fn signal_parameters(&self, signal: SignalRef) -> &[SignalParameter] {
        match signal {
            SignalRef::Declared(index) => &self.signals[index].parameters,
            SignalRef::PropertyChanged(_) => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handler_resolution() {
        let mut cache = PropertyCache::new("Button");
        let width = cache.add_property(PropertyData::new("width", PropertyType::Real));
        cache.add_signal(SignalData {
            name: "clicked".into(),
            parameters: vec![SignalParameter { name: "x".into(), ty: PropertyType::Int }],
        });
        assert_eq!(cache.handler_signal("onClicked"), Some(SignalRef::Declared(0)));
        assert_eq!(cache.handler_signal("onWidthChanged"), Some(SignalRef::PropertyChanged(width)));
        assert_eq!(cache.handler_signal("onclicked"), None);
        assert_eq!(cache.handler_signal("onHeightChanged"), None);
        assert_eq!(cache.signal_name(SignalRef::PropertyChanged(width)), "widthChanged");
        assert_eq!(cache.signal_parameters(SignalRef::Declared(0))[0].name, "x");
    }

    #[test]
    fn coercion() {
        assert_eq!(PropertyType::Int.coerce(Value::Number(2.7)), Ok(Value::Number(2.)));
        assert_eq!(PropertyType::String.coerce(Value::Number(3.)), Ok(Value::from("3")));
        assert_eq!(
            PropertyType::Int.coerce(Value::Undefined),
            Err("Unable to assign [undefined] to int".to_string())
        );
        assert_eq!(
            PropertyType::Color.coerce(Value::from("#ff0000")),
            Ok(Value::Color(Color::from_rgb_u8(255, 0, 0)))
        );
        assert!(PropertyType::Point.coerce(Value::Bool(true)).is_err());
    }

    #[test]
    fn facets() {
        let p = Value::Point(crate::graphics::Point::new(1., 2.));
        assert_eq!(facet_get(&p, "y"), Some(Value::Number(2.)));
        let p = facet_set(&p, "x", Value::Number(5.)).unwrap();
        assert_eq!(p, Value::Point(crate::graphics::Point::new(5., 2.)));
        assert_eq!(facet_set(&p, "width", Value::Number(5.)), None);
        assert_eq!(PropertyType::Rect.facet_type("height"), Some(PropertyType::Real));
        assert_eq!(PropertyType::Int.facet_type("x"), None);
    }
}
