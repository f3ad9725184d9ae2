//! Output values produced by interpolators and derived cells.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::color::Rgba;
use super::compound::Compound;
use crate::error::{MotionError, Result};

/// A value an interpolator can produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    Color(Rgba),
    /// A color literal or a compound value such as `"10px solid"`.
    Text(String),
}

impl Value {
    /// The numeric payload, if this is a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The color payload, parsing color literals held as text.
    pub fn as_color(&self) -> Option<Rgba> {
        match self {
            Value::Color(c) => Some(*c),
            Value::Text(text) => Rgba::parse(text),
            Value::Number(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Decide which mixer blends this value.
    pub fn mix_kind(&self) -> Result<MixKind> {
        match self {
            Value::Number(_) => Ok(MixKind::Numeric),
            Value::Color(_) => Ok(MixKind::Color),
            Value::Text(text) => {
                if Rgba::parse(text).is_some() {
                    Ok(MixKind::Color)
                } else if Compound::parse(text).is_animatable() {
                    Ok(MixKind::Compound)
                } else {
                    Err(MotionError::unsupported(text.as_str()))
                }
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => f.write_str(&format_number(*n)),
            Value::Color(c) => fmt::Display::fmt(c, f),
            Value::Text(text) => f.write_str(text),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<Rgba> for Value {
    fn from(c: Rgba) -> Self {
        Value::Color(c)
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Value::Text(text.to_string())
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Value::Text(text)
    }
}

/// Blend strategy for a family of values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MixKind {
    Numeric,
    Color,
    Compound,
}

impl fmt::Display for MixKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MixKind::Numeric => "number",
            MixKind::Color => "color",
            MixKind::Compound => "compound",
        })
    }
}

/// Render a number with at most five decimals and without negative zero.
pub fn format_number(n: f64) -> String {
    let rounded = (n * 100_000.0).round() / 100_000.0;
    if !rounded.is_finite() {
        return n.to_string();
    }
    if rounded == 0.0 {
        return "0".to_string();
    }
    rounded.to_string()
}
