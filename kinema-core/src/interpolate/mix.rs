//! Type Mixers
//!
//! Blend strategies for each family of output values:
//!
//! - numbers: `a + (b - a) * t`
//! - colors: channel-wise lerp, each channel clamped to its own domain
//! - compound values: slot-wise blend inside a shared token template, with
//!   numeric slots mixed as numbers and color slots mixed as colors
//!
//! The free functions blend two arbitrary values and report structural
//! mismatches when they are called. [`Keyframes`] is the compiled form used
//! by interpolators: it resolves the mix kind once and parses every output
//! up front, so queries never re-inspect or re-parse values.

use smallvec::SmallVec;

use super::color::Rgba;
use super::compound::{Compound, Slot, Template};
use super::output::{MixKind, Value};
use crate::error::{MotionError, Result};

/// Linear interpolation of scalars.
#[inline]
pub fn mix_number(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

/// Channel-wise color interpolation, clamped after blending.
pub fn mix_color(a: &Rgba, b: &Rgba, t: f64) -> Rgba {
    Rgba::new(
        mix_number(a.red, b.red, t),
        mix_number(a.green, b.green, t),
        mix_number(a.blue, b.blue, t),
        mix_number(a.alpha, b.alpha, t),
    )
    .clamped()
}

/// Blend two compound strings slot by slot.
///
/// Fails with [`MotionError::TypeMismatch`] if the two strings do not
/// decompose into the same literal tokens.
pub fn mix_compound(a: &str, b: &str, t: f64) -> Result<String> {
    let from = Compound::parse(a);
    let to = Compound::parse(b);
    if from.template != to.template {
        return Err(MotionError::type_mismatch(format!(
            "compound values {a:?} and {b:?} do not share a token template"
        )));
    }

    let slots = mix_slots(&from.slots, &to.slots, t);
    Ok(from.template.render(&slots))
}

/// Blend two values of the same family.
pub fn mix(a: &Value, b: &Value, t: f64) -> Result<Value> {
    let kind = a.mix_kind()?;
    let other = b.mix_kind()?;
    if kind != other {
        return Err(MotionError::type_mismatch(format!(
            "cannot mix a {kind} with a {other}"
        )));
    }

    match (kind, a, b) {
        (MixKind::Numeric, Value::Number(a), Value::Number(b)) => {
            Ok(Value::Number(mix_number(*a, *b, t)))
        }
        (MixKind::Color, _, _) => {
            let (Some(from), Some(to)) = (a.as_color(), b.as_color()) else {
                return Err(MotionError::type_mismatch("color endpoints failed to parse"));
            };
            Ok(color_output(mix_color(&from, &to, t), matches!(a, Value::Text(_))))
        }
        (MixKind::Compound, Value::Text(a), Value::Text(b)) => {
            Ok(Value::Text(mix_compound(a, b, t)?))
        }
        _ => Err(MotionError::type_mismatch(format!("cannot mix {a:?} with {b:?}"))),
    }
}

/// Blend slots pairwise. Callers guarantee both sides share a template, so
/// slot kinds line up.
fn mix_slots(a: &[Slot], b: &[Slot], t: f64) -> SmallVec<[Slot; 4]> {
    a.iter()
        .zip(b)
        .map(|pair| match pair {
            (Slot::Number(a), Slot::Number(b)) => Slot::Number(mix_number(*a, *b, t)),
            (Slot::Color(a), Slot::Color(b)) => Slot::Color(mix_color(a, b, t)),
            (a, _) => *a,
        })
        .collect()
}

/// Colors keep the representation of the first output: typed colors stay
/// typed, color literals come back as `rgba(...)` text.
fn color_output(color: Rgba, textual: bool) -> Value {
    if textual {
        Value::Text(color.to_string())
    } else {
        Value::Color(color)
    }
}

/// Output range parsed once for a single mix kind.
#[derive(Debug, Clone)]
pub(crate) enum Keyframes {
    Numeric(SmallVec<[f64; 6]>),
    Color {
        frames: SmallVec<[Rgba; 6]>,
        textual: bool,
    },
    Compound {
        template: Template,
        slots: Vec<SmallVec<[Slot; 4]>>,
    },
}

impl Keyframes {
    /// Resolve the mix kind from the first value and parse every value.
    ///
    /// All values must share that kind, and compound values must share the
    /// first value's token template.
    pub(crate) fn compile(values: &[Value]) -> Result<Self> {
        let Some(first) = values.first() else {
            return Err(MotionError::configuration("output range is empty"));
        };
        let kind = first.mix_kind()?;

        for (index, value) in values.iter().enumerate().skip(1) {
            let found = value.mix_kind()?;
            if found != kind {
                return Err(MotionError::type_mismatch(format!(
                    "output[{index}] is a {found} but output[0] is a {kind}"
                )));
            }
        }

        match kind {
            MixKind::Numeric => Ok(Keyframes::Numeric(
                values.iter().filter_map(Value::as_number).collect(),
            )),
            MixKind::Color => Ok(Keyframes::Color {
                frames: values.iter().filter_map(Value::as_color).collect(),
                textual: matches!(first, Value::Text(_)),
            }),
            MixKind::Compound => {
                let parsed: Vec<Compound> = values
                    .iter()
                    .filter_map(Value::as_text)
                    .map(Compound::parse)
                    .collect();
                let template = parsed[0].template.clone();

                for (index, compound) in parsed.iter().enumerate().skip(1) {
                    if compound.template != template {
                        return Err(MotionError::type_mismatch(format!(
                            "output[{index}] {:?} does not share the token template \
                             of output[0] {:?}",
                            values[index],
                            values[0]
                        )));
                    }
                }

                Ok(Keyframes::Compound {
                    template,
                    slots: parsed.into_iter().map(|c| c.slots).collect(),
                })
            }
        }
    }

    pub(crate) fn kind(&self) -> MixKind {
        match self {
            Keyframes::Numeric(_) => MixKind::Numeric,
            Keyframes::Color { .. } => MixKind::Color,
            Keyframes::Compound { .. } => MixKind::Compound,
        }
    }

    /// Blend keyframes `from` and `to` at fraction `t`.
    pub(crate) fn blend(&self, from: usize, to: usize, t: f64) -> Value {
        match self {
            Keyframes::Numeric(frames) => Value::Number(mix_number(frames[from], frames[to], t)),
            Keyframes::Color { frames, textual } => {
                color_output(mix_color(&frames[from], &frames[to], t), *textual)
            }
            Keyframes::Compound { template, slots } => {
                Value::Text(template.render(&mix_slots(&slots[from], &slots[to], t)))
            }
        }
    }

    /// Numeric keyframe at `index`, for linear extrapolation.
    pub(crate) fn number(&self, index: usize) -> Option<f64> {
        match self {
            Keyframes::Numeric(frames) => frames.get(index).copied(),
            _ => None,
        }
    }
}
