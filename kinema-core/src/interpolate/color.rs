//! RGBA colors and color literal parsing.
//!
//! Accepted literals: `#rgb`, `#rgba`, `#rrggbb`, `#rrggbbaa`, `rgb()`,
//! `rgba()`, `hsl()` and `hsla()`. Function arguments may be separated by
//! commas, spaces or a `/` before alpha; RGB channels accept percentages.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A color with red, green and blue in `0..=255` and alpha in `0..=1`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgba {
    pub red: f64,
    pub green: f64,
    pub blue: f64,
    pub alpha: f64,
}

impl Rgba {
    pub fn new(red: f64, green: f64, blue: f64, alpha: f64) -> Self {
        Self {
            red,
            green,
            blue,
            alpha,
        }
    }

    /// Opaque color from RGB channels.
    pub fn rgb(red: f64, green: f64, blue: f64) -> Self {
        Self::new(red, green, blue, 1.0)
    }

    /// Clamp every channel to its own domain.
    pub fn clamped(self) -> Self {
        Self {
            red: clamp_channel(self.red, 255.0),
            green: clamp_channel(self.green, 255.0),
            blue: clamp_channel(self.blue, 255.0),
            alpha: clamp_channel(self.alpha, 1.0),
        }
    }

    /// Parse a color literal. Returns `None` if `text` is not one.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if let Some(hex) = text.strip_prefix('#') {
            return parse_hex(hex);
        }

        let open = text.find('(')?;
        let inner = text[open + 1..].strip_suffix(')')?;
        let name = text[..open].trim().to_ascii_lowercase();
        let args: Vec<&str> = inner
            .split(|c: char| c == ',' || c == '/' || c.is_whitespace())
            .filter(|part| !part.is_empty())
            .collect();

        let color = match (name.as_str(), args.as_slice()) {
            ("rgb" | "rgba", [r, g, b]) => Rgba::rgb(rgb_arg(r)?, rgb_arg(g)?, rgb_arg(b)?),
            ("rgb" | "rgba", [r, g, b, a]) => {
                Rgba::new(rgb_arg(r)?, rgb_arg(g)?, rgb_arg(b)?, alpha_arg(a)?)
            }
            ("hsl" | "hsla", [h, s, l]) => {
                hsl_to_rgba(hue_arg(h)?, percent_arg(s)?, percent_arg(l)?, 1.0)
            }
            ("hsl" | "hsla", [h, s, l, a]) => {
                hsl_to_rgba(hue_arg(h)?, percent_arg(s)?, percent_arg(l)?, alpha_arg(a)?)
            }
            _ => return None,
        };
        Some(color.clamped())
    }
}

impl fmt::Display for Rgba {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = self.clamped();
        write!(
            f,
            "rgba({}, {}, {}, {})",
            c.red.round(),
            c.green.round(),
            c.blue.round(),
            super::output::format_number(c.alpha)
        )
    }
}

fn clamp_channel(value: f64, max: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, max)
}

fn parse_hex(hex: &str) -> Option<Rgba> {
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }

    let short = |i: usize| -> Option<f64> {
        let digit = u8::from_str_radix(&hex[i..i + 1], 16).ok()?;
        Some(f64::from(digit * 17))
    };
    let long = |i: usize| -> Option<f64> {
        let byte = u8::from_str_radix(&hex[i..i + 2], 16).ok()?;
        Some(f64::from(byte))
    };

    match hex.len() {
        3 => Some(Rgba::rgb(short(0)?, short(1)?, short(2)?)),
        4 => Some(Rgba::new(short(0)?, short(1)?, short(2)?, short(3)? / 255.0)),
        6 => Some(Rgba::rgb(long(0)?, long(2)?, long(4)?)),
        8 => Some(Rgba::new(long(0)?, long(2)?, long(4)?, long(6)? / 255.0)),
        _ => None,
    }
}

fn number_arg(arg: &str) -> Option<f64> {
    let value: f64 = arg.parse().ok()?;
    value.is_finite().then_some(value)
}

fn rgb_arg(arg: &str) -> Option<f64> {
    match arg.strip_suffix('%') {
        Some(pct) => Some(number_arg(pct)? * 2.55),
        None => number_arg(arg),
    }
}

fn alpha_arg(arg: &str) -> Option<f64> {
    match arg.strip_suffix('%') {
        Some(pct) => Some(number_arg(pct)? / 100.0),
        None => number_arg(arg),
    }
}

fn percent_arg(arg: &str) -> Option<f64> {
    Some(number_arg(arg.strip_suffix('%')?)? / 100.0)
}

fn hue_arg(arg: &str) -> Option<f64> {
    number_arg(arg.strip_suffix("deg").unwrap_or(arg))
}

/// Convert HSL (hue in degrees, saturation and lightness in `0..=1`).
fn hsl_to_rgba(hue: f64, saturation: f64, lightness: f64, alpha: f64) -> Rgba {
    let h = hue.rem_euclid(360.0) / 360.0;
    let s = saturation.clamp(0.0, 1.0);
    let l = lightness.clamp(0.0, 1.0);

    if s == 0.0 {
        let v = l * 255.0;
        return Rgba::new(v, v, v, alpha);
    }

    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;
    Rgba::new(
        hue_to_channel(p, q, h + 1.0 / 3.0) * 255.0,
        hue_to_channel(p, q, h) * 255.0,
        hue_to_channel(p, q, h - 1.0 / 3.0) * 255.0,
        alpha,
    )
}

fn hue_to_channel(p: f64, q: f64, t: f64) -> f64 {
    let t = t.rem_euclid(1.0);
    if t < 1.0 / 6.0 {
        p + (q - p) * 6.0 * t
    } else if t < 0.5 {
        q
    } else if t < 2.0 / 3.0 {
        p + (q - p) * (2.0 / 3.0 - t) * 6.0
    } else {
        p
    }
}
