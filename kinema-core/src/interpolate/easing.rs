//! Easing curves applied to the local progress of a range segment.
//!
//! An easing maps a segment fraction in `[0, 1]` to an eased fraction. The
//! result may leave `[0, 1]` (the back and anticipate curves overshoot), and
//! the mixers accept that.

use std::sync::Arc;

use serde::{Serialize, Serializer};

/// Overshoot strength shared by the back and anticipate curves.
const BACK_STRENGTH: f64 = 1.525;

/// Caller-supplied easing function.
///
/// Two `CustomEasing` values are equal only if they wrap the same closure
/// allocation; clones of one `CustomEasing` compare equal.
#[derive(Clone)]
pub struct CustomEasing(Arc<dyn Fn(f64) -> f64 + Send + Sync>);

impl CustomEasing {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(f64) -> f64 + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Stable token identifying the wrapped closure for this process.
    fn identity(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl PartialEq for CustomEasing {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl std::fmt::Debug for CustomEasing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CustomEasing({:#x})", self.identity())
    }
}

/// An easing curve.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Easing {
    #[default]
    Linear,
    EaseIn,
    EaseOut,
    EaseInOut,
    CircIn,
    CircOut,
    CircInOut,
    BackIn,
    BackOut,
    BackInOut,
    Anticipate,
    /// CSS-style cubic bezier with control points `(x1, y1, x2, y2)`.
    CubicBezier(f64, f64, f64, f64),
    /// Jump in `n` equal steps, holding each until the next is reached.
    Steps(u32),
    Custom(CustomEasing),
}

impl Easing {
    /// Wrap a closure as an easing.
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(f64) -> f64 + Send + Sync + 'static,
    {
        Self::Custom(CustomEasing::new(f))
    }

    /// Apply the curve to a segment fraction.
    pub fn apply(&self, p: f64) -> f64 {
        match self {
            Easing::Linear => p,
            Easing::EaseIn => p * p,
            Easing::EaseOut => mirror(p, |p| p * p),
            Easing::EaseInOut => mirror_in_out(p, |p| p * p),
            Easing::CircIn => circ_in(p),
            Easing::CircOut => mirror(p, circ_in),
            Easing::CircInOut => mirror_in_out(p, circ_in),
            Easing::BackIn => back_in(p),
            Easing::BackOut => mirror(p, back_in),
            Easing::BackInOut => mirror_in_out(p, back_in),
            Easing::Anticipate => anticipate(p),
            Easing::CubicBezier(x1, y1, x2, y2) => cubic_bezier(p, *x1, *y1, *x2, *y2),
            Easing::Steps(n) => steps(p, *n),
            Easing::Custom(f) => (f.0)(p),
        }
    }

    /// Name used in fingerprints and diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Easing::Linear => "linear",
            Easing::EaseIn => "easeIn",
            Easing::EaseOut => "easeOut",
            Easing::EaseInOut => "easeInOut",
            Easing::CircIn => "circIn",
            Easing::CircOut => "circOut",
            Easing::CircInOut => "circInOut",
            Easing::BackIn => "backIn",
            Easing::BackOut => "backOut",
            Easing::BackInOut => "backInOut",
            Easing::Anticipate => "anticipate",
            Easing::CubicBezier(..) => "cubicBezier",
            Easing::Steps(_) => "steps",
            Easing::Custom(_) => "custom",
        }
    }
}

impl Serialize for Easing {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Easing::CubicBezier(x1, y1, x2, y2) => {
                (self.name(), [*x1, *y1, *x2, *y2]).serialize(serializer)
            }
            Easing::Steps(n) => (self.name(), n).serialize(serializer),
            Easing::Custom(f) => (self.name(), f.identity()).serialize(serializer),
            _ => serializer.serialize_str(self.name()),
        }
    }
}

/// Turn an ease-in curve into its ease-out counterpart.
fn mirror(p: f64, ease_in: impl Fn(f64) -> f64) -> f64 {
    1.0 - ease_in(1.0 - p)
}

/// Ease in over the first half, out over the second.
fn mirror_in_out(p: f64, ease_in: impl Fn(f64) -> f64) -> f64 {
    if p <= 0.5 {
        ease_in(2.0 * p) / 2.0
    } else {
        (2.0 - ease_in(2.0 * (1.0 - p))) / 2.0
    }
}

fn circ_in(p: f64) -> f64 {
    1.0 - p.clamp(-1.0, 1.0).acos().sin()
}

fn back_in(p: f64) -> f64 {
    p * p * ((BACK_STRENGTH + 1.0) * p - BACK_STRENGTH)
}

fn anticipate(p: f64) -> f64 {
    let p = p * 2.0;
    if p < 1.0 {
        0.5 * back_in(p)
    } else {
        0.5 * (2.0 - 2f64.powf(-10.0 * (p - 1.0)))
    }
}

fn steps(p: f64, n: u32) -> f64 {
    if n == 0 {
        return p;
    }
    let n = f64::from(n);
    ((p * n).floor() / n).clamp(0.0, 1.0)
}

/// Cubic bezier basis with fixed endpoints at 0 and 1.
#[inline]
fn bezier(c1: f64, c2: f64, t: f64) -> f64 {
    let u = 1.0 - t;
    3.0 * u * u * t * c1 + 3.0 * u * t * t * c2 + t * t * t
}

/// Invert the x curve by bisection, then evaluate y at the found parameter.
fn cubic_bezier(p: f64, x1: f64, y1: f64, x2: f64, y2: f64) -> f64 {
    if x1 == y1 && x2 == y2 {
        return p;
    }
    if p <= 0.0 {
        return 0.0;
    }
    if p >= 1.0 {
        return 1.0;
    }

    let mut lo = 0.0;
    let mut hi = 1.0;
    let mut mid = p;
    for _ in 0..32 {
        let x = bezier(x1, x2, mid);
        if (x - p).abs() < 1e-7 {
            break;
        }
        if x < p {
            lo = mid;
        } else {
            hi = mid;
        }
        mid = 0.5 * (lo + hi);
    }
    bezier(y1, y2, mid)
}
