// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: GPL-3.0-only OR LicenseRef-Slint-Royalty-free-2.0 OR LicenseRef-Slint-Software-3.0

/*!
Geometry and color value types that literal bindings can produce.
*/

/// 2D point in document coordinates
pub type Point = euclid::default::Point2D<f64>;
/// 2D size
pub type Size = euclid::default::Size2D<f64>;
/// Rectangle given by its origin and size
pub type Rect = euclid::default::Rect<f64>;
/// 2D vector
pub type Vector2D = euclid::default::Vector2D<f64>;
/// 3D vector
pub type Vector3D = euclid::default::Vector3D<f64>;

/// 4D vector. `euclid` stops at three dimensions.
#[derive(Copy, Clone, PartialEq, Debug, Default)]
pub struct Vector4D {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Vector4D {
    pub const fn new(x: f64, y: f64, z: f64, w: f64) -> Self {
        Self { x, y, z, w }
    }
}

/// Color represents a color with 8-bit channels for red, green, blue and the alpha (opacity).
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Default)]
pub struct Color {
    red: u8,
    green: u8,
    blue: u8,
    alpha: u8,
}

impl Color {
    /// Construct a color from an integer encoded as `0xAARRGGBB`
    pub const fn from_argb_encoded(encoded: u32) -> Color {
        Self {
            red: (encoded >> 16) as u8,
            green: (encoded >> 8) as u8,
            blue: encoded as u8,
            alpha: (encoded >> 24) as u8,
        }
    }

    /// Construct a color from the alpha, red, green and blue color channel parameters.
    pub const fn from_argb_u8(alpha: u8, red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue, alpha }
    }

    /// Construct an opaque color from the red, green and blue color channel parameters.
    pub const fn from_rgb_u8(red: u8, green: u8, blue: u8) -> Self {
        Self::from_argb_u8(255, red, green, blue)
    }

    /// Returns the red channel of the color as u8 in the range 0..255.
    pub fn red(self) -> u8 {
        self.red
    }

    /// Returns the green channel of the color as u8 in the range 0..255.
    pub fn green(self) -> u8 {
        self.green
    }

    /// Returns the blue channel of the color as u8 in the range 0..255.
    pub fn blue(self) -> u8 {
        self.blue
    }

    /// Returns the alpha channel of the color as u8 in the range 0..255.
    pub fn alpha(self) -> u8 {
        self.alpha
    }

    pub fn with_channel(self, channel: &str, value: f64) -> Option<Self> {
        let v = (value.clamp(0., 1.) * 255.).round() as u8;
        let mut c = self;
        match channel {
            "r" => c.red = v,
            "g" => c.green = v,
            "b" => c.blue = v,
            "a" => c.alpha = v,
            _ => return None,
        }
        Some(c)
    }

    /// Returns the named channel (`r`, `g`, `b` or `a`) normalized to 0..1
    pub fn channel(self, channel: &str) -> Option<f64> {
        let v = match channel {
            "r" => self.red,
            "g" => self.green,
            "b" => self.blue,
            "a" => self.alpha,
            _ => return None,
        };
        Some(v as f64 / 255.)
    }
}

impl std::fmt::Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.alpha == 255 {
            write!(f, "#{:02x}{:02x}{:02x}", self.red, self.green, self.blue)
        } else {
            write!(f, "#{:02x}{:02x}{:02x}{:02x}", self.alpha, self.red, self.green, self.blue)
        }
    }
}

#[test]
fn color_channels() {
    let c = Color::from_argb_encoded(0x80ff0000);
    assert_eq!(c.red(), 255);
    assert_eq!(c.alpha(), 0x80);
    assert_eq!(c.channel("r"), Some(1.));
    assert_eq!(c.channel("b"), Some(0.));
    assert_eq!(c.channel("x"), None);
    assert_eq!(c.to_string(), "#80ff0000");
    assert_eq!(Color::from_rgb_u8(1, 2, 3).to_string(), "#010203");
    let c = c.with_channel("g", 1.0).unwrap();
    assert_eq!(c.green(), 255);
    assert!(c.with_channel("q", 1.0).is_none());
}
