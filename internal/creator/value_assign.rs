// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: GPL-3.0-only OR LicenseRef-Slint-Royalty-free-2.0 OR LicenseRef-Slint-Software-3.0

//! Conversion of compiled literals to the type of the property they are assigned to.

use i_qmlrt_runtime::compiled::{BindingValue, CompiledBinding};
use i_qmlrt_runtime::engine::Engine;
use i_qmlrt_runtime::literals;
use i_qmlrt_runtime::property::PropertyType;
use i_qmlrt_runtime::value::Value;
use smol_str::SmolStr;
use url::Url;

fn expected(what: &str) -> String {
    format!("Invalid property assignment: {what} expected")
}

/// Resolves `url` against the url of the document it is written in
///
/// Absolute urls and urls that cannot be joined to `base` are returned unchanged.
pub fn resolve_url(base: &str, url: &str) -> SmolStr {
    if url.is_empty() || Url::parse(url).is_ok() {
        return url.into();
    }
    Url::parse(base)
        .and_then(|base| base.join(url))
        .map_or_else(|_| url.into(), |resolved| resolved.as_str().into())
}

fn string_literal<'a>(binding: &'a CompiledBinding, what: &str) -> Result<&'a str, String> {
    match &binding.value {
        BindingValue::String(s) => Ok(s.as_str()),
        _ => Err(expected(what)),
    }
}

/// Converts the literal of `binding` to a value of type `ty`
pub fn convert_literal(
    engine: &Engine,
    url: &str,
    ty: &PropertyType,
    binding: &CompiledBinding,
) -> Result<Value, String> {
    debug_assert!(binding.value.is_literal());
    let parse_error = |e: literals::LiteralError| format!("Invalid property assignment: {e}");
    Ok(match ty {
        PropertyType::Int => match binding.value {
            // integral literals take the fast path, others are truncated like the engine would
            BindingValue::Number(n) if n.fract() == 0. => Value::Number(n),
            BindingValue::Number(n) if n.is_finite() => Value::Number(n.trunc()),
            _ => return Err(expected("int")),
        },
        PropertyType::Real => match binding.value {
            BindingValue::Number(n) => Value::Number(n),
            _ => return Err(expected("number")),
        },
        PropertyType::Bool => match binding.value {
            BindingValue::Boolean(b) => Value::Bool(b),
            _ => return Err(expected("boolean")),
        },
        PropertyType::String => Value::String(string_literal(binding, "string")?.into()),
        PropertyType::Url => Value::String(resolve_url(url, string_literal(binding, "url")?)),
        PropertyType::Color => Value::Color(
            literals::parse_color(string_literal(binding, "color")?).map_err(parse_error)?,
        ),
        PropertyType::Date => Value::Date(
            literals::parse_date(string_literal(binding, "date")?).map_err(parse_error)?,
        ),
        PropertyType::Time => Value::Time(
            literals::parse_time(string_literal(binding, "time")?).map_err(parse_error)?,
        ),
        PropertyType::DateTime => Value::DateTime(
            literals::parse_date_time(string_literal(binding, "datetime")?).map_err(parse_error)?,
        ),
        PropertyType::Point => Value::Point(
            literals::parse_point(string_literal(binding, "point")?).map_err(parse_error)?,
        ),
        PropertyType::Size => Value::Size(
            literals::parse_size(string_literal(binding, "size")?).map_err(parse_error)?,
        ),
        PropertyType::Rect => Value::Rect(
            literals::parse_rect(string_literal(binding, "rect")?).map_err(parse_error)?,
        ),
        PropertyType::Vector2D => Value::Vector2D(
            literals::parse_vector2d(string_literal(binding, "2D vector")?).map_err(parse_error)?,
        ),
        PropertyType::Vector3D => Value::Vector3D(
            literals::parse_vector3d(string_literal(binding, "3D vector")?).map_err(parse_error)?,
        ),
        PropertyType::Vector4D => Value::Vector4D(
            literals::parse_vector4d(string_literal(binding, "4D vector")?).map_err(parse_error)?,
        ),
        PropertyType::Enumeration(info) => match &binding.value {
            BindingValue::Number(n) => Value::Number(*n),
            BindingValue::String(key) => match info.value_of(key) {
                Some(v) => Value::Number(v as f64),
                None => {
                    return Err(format!(
                        "Invalid property assignment: unknown enumeration \"{key}\""
                    ));
                }
            },
            _ => return Err(expected("enumeration")),
        },
        PropertyType::Var | PropertyType::Variant => binding.value.literal().unwrap_or_default(),
        PropertyType::Custom(name) => {
            let converter = engine.registry().string_converter(name);
            match (converter, &binding.value) {
                (Some(converter), BindingValue::String(s)) => match converter(s) {
                    Some(value) => value,
                    None => return Err(expected(name)),
                },
                _ => {
                    return Err(format!(
                        "Invalid property assignment: unsupported type \"{name}\""
                    ));
                }
            }
        }
        PropertyType::List { .. } => return Err("Cannot assign primitives to lists".into()),
        PropertyType::Object(_) | PropertyType::Interface(_) => {
            return Err(format!("Invalid property assignment: {ty} expected"));
        }
        ty => return Err(format!("Invalid property assignment: unsupported type \"{ty}\"")),
    })
}

#[test]
fn url_resolution() {
    assert_eq!(resolve_url("file:///app/qml/main.qml", "icon.png"), "file:///app/qml/icon.png");
    assert_eq!(
        resolve_url("file:///app/qml/main.qml", "../img/icon.png"),
        "file:///app/img/icon.png"
    );
    assert_eq!(resolve_url("http://host/a/main.qml", "/root.png"), "http://host/root.png");
    assert_eq!(resolve_url("file:///app/main.qml", "http://x/y.png"), "http://x/y.png");
    assert_eq!(resolve_url("file:///app/main.qml", ""), "");
    assert_eq!(resolve_url("qrc:/qml/main.qml", "icon.png"), "qrc:/qml/icon.png");
    assert_eq!(resolve_url("qrc:/qml/main.qml", "../icon.png"), "qrc:/icon.png");
    assert_eq!(resolve_url("http://host/a/main.qml", "//cdn/x.png"), "http://cdn/x.png");
    assert_eq!(resolve_url("http://host/a/main.qml?v=1/2", "icon.png"), "http://host/a/icon.png");
    assert_eq!(
        resolve_url("file:///app/main.qml", "data:image/png;base64,AAAA"),
        "data:image/png;base64,AAAA"
    );
    // documents without a parseable url leave relative urls alone
    assert_eq!(resolve_url("main.qml", "icon.png"), "icon.png");
}

#[test]
fn literal_conversion() {
    use i_qmlrt_runtime::compiled::BindingFlags;
    use i_qmlrt_runtime::diagnostics::SourceLocation;
    let engine = Engine::new();
    let binding = |value| CompiledBinding {
        property_name: "p".into(),
        value,
        flags: BindingFlags::empty(),
        location: SourceLocation::new(1, 1),
    };
    let convert =
        |ty: &PropertyType, value| convert_literal(&engine, "file:///t.qml", ty, &binding(value));
    assert_eq!(convert(&PropertyType::Int, BindingValue::Number(3.)), Ok(Value::Number(3.)));
    assert_eq!(convert(&PropertyType::Int, BindingValue::Number(3.7)), Ok(Value::Number(3.)));
    assert_eq!(
        convert(&PropertyType::Color, BindingValue::String("nope".into())),
        Err("Invalid property assignment: color expected".into())
    );
    assert_eq!(
        convert(&PropertyType::Bool, BindingValue::Number(1.)),
        Err("Invalid property assignment: boolean expected".into())
    );
    assert_eq!(
        convert(&PropertyType::Custom("Money".into()), BindingValue::String("1".into())),
        Err("Invalid property assignment: unsupported type \"Money\"".into())
    );
    engine.register_string_converter("Money", |s| {
        s.strip_suffix('$').map(|v| Value::String(v.into()))
    });
    assert_eq!(
        convert(&PropertyType::Custom("Money".into()), BindingValue::String("12$".into())),
        Ok(Value::String("12".into()))
    );
}
