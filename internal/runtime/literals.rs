// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: GPL-3.0-only OR LicenseRef-Slint-Royalty-free-2.0 OR LicenseRef-Slint-Software-3.0

/*!
Conversions from string literals to typed values.

String literals assigned to typed properties (`color: "red"`, `pos: "10,20"`) are converted
with these functions at creation time.
*/

use crate::graphics::{Color, Point, Rect, Size, Vector2D, Vector3D, Vector4D};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

/// Error returned when a string cannot be converted to the requested type
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Error, derive_more::Display)]
#[non_exhaustive]
pub enum LiteralError {
    #[display("color expected")]
    Color,
    #[display("date expected")]
    Date,
    #[display("time expected")]
    Time,
    #[display("datetime expected")]
    DateTime,
    #[display("point expected")]
    Point,
    #[display("size expected")]
    Size,
    #[display("rect expected")]
    Rect,
    #[display("2D vector expected")]
    Vector2D,
    #[display("3D vector expected")]
    Vector3D,
    #[display("4D vector expected")]
    Vector4D,
}

/// Returns `0xaarrggbb`
///
/// Eight digit literals are `#aarrggbb`, alpha first.
pub fn parse_color_literal(str: &str) -> Option<u32> {
    if !str.starts_with('#') {
        return None;
    }
    if !str.is_ascii() {
        return None;
    }
    let str = &str[1..];
    let (r, g, b, a) = match str.len() {
        3 => (
            u8::from_str_radix(&str[0..=0], 16).ok()? * 0x11,
            u8::from_str_radix(&str[1..=1], 16).ok()? * 0x11,
            u8::from_str_radix(&str[2..=2], 16).ok()? * 0x11,
            255u8,
        ),
        6 => (
            u8::from_str_radix(&str[0..2], 16).ok()?,
            u8::from_str_radix(&str[2..4], 16).ok()?,
            u8::from_str_radix(&str[4..6], 16).ok()?,
            255u8,
        ),
        8 => (
            u8::from_str_radix(&str[2..4], 16).ok()?,
            u8::from_str_radix(&str[4..6], 16).ok()?,
            u8::from_str_radix(&str[6..8], 16).ok()?,
            u8::from_str_radix(&str[0..2], 16).ok()?,
        ),
        _ => return None,
    };
    Some((a as u32) << 24 | (r as u32) << 16 | (g as u32) << 8 | (b as u32))
}

/// Parses `#rgb`, `#rrggbb`, `#aarrggbb` and named colors (`"red"`, `"transparent"`)
pub fn parse_color(str: &str) -> Result<Color, LiteralError> {
    let str = str.trim();
    if str.starts_with('#') {
        return parse_color_literal(str).map(Color::from_argb_encoded).ok_or(LiteralError::Color);
    }
    let c = str.parse::<css_color_parser2::Color>().map_err(|_| LiteralError::Color)?;
    Ok(Color::from_argb_u8((c.a * 255.).round() as u8, c.r, c.g, c.b))
}

pub fn parse_date(str: &str) -> Result<NaiveDate, LiteralError> {
    NaiveDate::parse_from_str(str.trim(), "%Y-%m-%d").map_err(|_| LiteralError::Date)
}

pub fn parse_time(str: &str) -> Result<NaiveTime, LiteralError> {
    let str = str.trim();
    NaiveTime::parse_from_str(str, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(str, "%H:%M"))
        .map_err(|_| LiteralError::Time)
}

pub fn parse_date_time(str: &str) -> Result<NaiveDateTime, LiteralError> {
    let str = str.trim();
    NaiveDateTime::parse_from_str(str, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(str, "%Y-%m-%d %H:%M:%S%.f"))
        .or_else(|_| NaiveDateTime::parse_from_str(str, "%Y-%m-%dT%H:%M"))
        .or_else(|_| parse_date(str).map(|d| d.and_time(NaiveTime::MIN)))
        .map_err(|_| LiteralError::DateTime)
}

fn parse_list(str: &str) -> Option<Vec<f64>> {
    str.split(',').map(|s| s.trim().parse::<f64>().ok()).collect()
}

/// `"x,y"`
pub fn parse_point(str: &str) -> Result<Point, LiteralError> {
    match parse_list(str).as_deref() {
        Some([x, y]) => Ok(Point::new(*x, *y)),
        _ => Err(LiteralError::Point),
    }
}

/// `"wxh"`
pub fn parse_size(str: &str) -> Result<Size, LiteralError> {
    let (w, h) = str.trim().split_once('x').ok_or(LiteralError::Size)?;
    let w = w.trim().parse().map_err(|_| LiteralError::Size)?;
    let h = h.trim().parse().map_err(|_| LiteralError::Size)?;
    Ok(Size::new(w, h))
}

/// `"x,y,wxh"`
pub fn parse_rect(str: &str) -> Result<Rect, LiteralError> {
    let mut parts = str.trim().splitn(3, ',');
    let (Some(x), Some(y), Some(size)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(LiteralError::Rect);
    };
    let x = x.trim().parse().map_err(|_| LiteralError::Rect)?;
    let y = y.trim().parse().map_err(|_| LiteralError::Rect)?;
    let size = parse_size(size).map_err(|_| LiteralError::Rect)?;
    Ok(Rect::new(Point::new(x, y), size))
}

/// `"x,y"`
pub fn parse_vector2d(str: &str) -> Result<Vector2D, LiteralError> {
    match parse_list(str).as_deref() {
        Some([x, y]) => Ok(Vector2D::new(*x, *y)),
        _ => Err(LiteralError::Vector2D),
    }
}

/// `"x,y,z"`
pub fn parse_vector3d(str: &str) -> Result<Vector3D, LiteralError> {
    match parse_list(str).as_deref() {
        Some([x, y, z]) => Ok(Vector3D::new(*x, *y, *z)),
        _ => Err(LiteralError::Vector3D),
    }
}

/// `"x,y,z,w"`
pub fn parse_vector4d(str: &str) -> Result<Vector4D, LiteralError> {
    match parse_list(str).as_deref() {
        Some([x, y, z, w]) => Ok(Vector4D::new(*x, *y, *z, *w)),
        _ => Err(LiteralError::Vector4D),
    }
}

#[test]
fn test_parse_color_literal() {
    assert_eq!(parse_color_literal("#abc"), Some(0xffaabbcc));
    assert_eq!(parse_color_literal("#ABC"), Some(0xffaabbcc));
    assert_eq!(parse_color_literal("#01234567"), Some(0x01234567));
    assert_eq!(parse_color_literal("#012345"), Some(0xff012345));
    assert_eq!(parse_color_literal("_01234567"), None);
    assert_eq!(parse_color_literal("#→↓←"), None);
    assert_eq!(parse_color_literal("#1234567890"), None);
    assert_eq!(parse_color("red"), Ok(Color::from_rgb_u8(255, 0, 0)));
    assert_eq!(parse_color("transparent").map(|c| c.alpha()), Ok(0));
    assert_eq!(parse_color("not a color"), Err(LiteralError::Color));
}

#[test]
fn test_parse_geometry() {
    assert_eq!(parse_point("10, 20.5"), Ok(Point::new(10., 20.5)));
    assert_eq!(parse_point("10"), Err(LiteralError::Point));
    assert_eq!(parse_size("30x40"), Ok(Size::new(30., 40.)));
    assert_eq!(parse_rect("1,2,30x40"), Ok(Rect::new(Point::new(1., 2.), Size::new(30., 40.))));
    assert_eq!(parse_rect("1,2"), Err(LiteralError::Rect));
    assert_eq!(parse_vector3d("1,2,3"), Ok(Vector3D::new(1., 2., 3.)));
    assert_eq!(parse_vector4d("1,2,3"), Err(LiteralError::Vector4D));
}

#[test]
fn test_parse_dates() {
    assert_eq!(parse_date("2024-02-29"), Ok(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()));
    assert_eq!(parse_date("2023-02-29"), Err(LiteralError::Date));
    assert_eq!(parse_time("13:45"), Ok(NaiveTime::from_hms_opt(13, 45, 0).unwrap()));
    assert_eq!(
        parse_date_time("2020-01-02T03:04:05").map(|dt| dt.to_string()),
        Ok("2020-01-02 03:04:05".to_string())
    );
}
