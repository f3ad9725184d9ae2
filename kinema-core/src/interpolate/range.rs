//! Range Interpolator
//!
//! Compiles an input range of numeric breakpoints and an output range of
//! values into a function `f64 -> Value`.
//!
//! # Algorithm
//!
//! 1. Validate the configuration once, at compile time. A compiled
//!    interpolator can be queried with any `f64`.
//! 2. For a query `x`:
//!    - an exact breakpoint hit returns that breakpoint's output unchanged;
//!    - outside the domain, `clamp` returns the nearest boundary output,
//!      otherwise numeric ranges continue the edge segment linearly and
//!      other ranges hold the boundary output;
//!    - inside the domain, find the segment containing `x`, ease the local
//!      fraction and blend the segment's two outputs.
//!
//! Input ranges may ascend or descend. Ranges are short (a handful of
//! breakpoints), so segment lookup is a linear scan.

use serde::Serialize;
use smallvec::SmallVec;

use super::easing::Easing;
use super::mix::Keyframes;
use super::output::{MixKind, Value};
use crate::error::{MotionError, Result};

/// Clamp and easing configuration for a range.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InterpolateOptions {
    /// Hold the boundary outputs outside the input domain.
    pub clamp: bool,

    /// Easing applied to every segment. Ignored when `easings` is non-empty.
    pub ease: Easing,

    /// One easing per segment.
    pub easings: Vec<Easing>,
}

impl Default for InterpolateOptions {
    fn default() -> Self {
        Self {
            clamp: true,
            ease: Easing::Linear,
            easings: Vec::new(),
        }
    }
}

impl InterpolateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clamp(mut self, clamp: bool) -> Self {
        self.clamp = clamp;
        self
    }

    /// Use one easing for every segment.
    pub fn ease(mut self, ease: Easing) -> Self {
        self.ease = ease;
        self.easings.clear();
        self
    }

    /// Use one easing per segment. Must hold exactly one easing per segment.
    pub fn easings(mut self, easings: impl IntoIterator<Item = Easing>) -> Self {
        self.easings = easings.into_iter().collect();
        self
    }
}

/// Direction of the input range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Ascending,
    Descending,
}

/// A compiled range mapping.
#[derive(Debug, Clone)]
pub struct Interpolator {
    input: SmallVec<[f64; 6]>,
    outputs: Vec<Value>,
    keyframes: Keyframes,
    easings: SmallVec<[Easing; 5]>,
    direction: Direction,
    clamp: bool,
}

impl Interpolator {
    /// Validate a range configuration and build its mapping function.
    pub fn compile(
        input: &[f64],
        output: &[Value],
        options: &InterpolateOptions,
    ) -> Result<Self> {
        if input.len() < 2 {
            return Err(MotionError::configuration(format!(
                "input range needs at least 2 breakpoints, got {}",
                input.len()
            )));
        }
        if input.len() != output.len() {
            return Err(MotionError::configuration(format!(
                "input range has {} breakpoints but output range has {} values",
                input.len(),
                output.len()
            )));
        }
        if let Some(index) = input.iter().position(|x| !x.is_finite()) {
            return Err(MotionError::configuration(format!(
                "input[{index}] is not a finite number"
            )));
        }

        let direction = direction_of(input)?;

        let segments = input.len() - 1;
        let easings: SmallVec<[Easing; 5]> = if options.easings.is_empty() {
            std::iter::repeat(options.ease.clone()).take(segments).collect()
        } else if options.easings.len() == segments {
            options.easings.iter().cloned().collect()
        } else {
            return Err(MotionError::configuration(format!(
                "{} easings given for {} segments",
                options.easings.len(),
                segments
            )));
        };

        let keyframes = Keyframes::compile(output)?;

        tracing::debug!(
            breakpoints = input.len(),
            kind = %keyframes.kind(),
            clamp = options.clamp,
            "compiled interpolator"
        );

        Ok(Self {
            input: input.iter().copied().collect(),
            outputs: output.to_vec(),
            keyframes,
            easings,
            direction,
            clamp: options.clamp,
        })
    }

    /// Map an input scalar to an output value.
    pub fn map(&self, x: f64) -> Value {
        let last = self.input.len() - 1;

        if x.is_nan() {
            return self.outputs[0].clone();
        }
        if let Some(hit) = self.input.iter().position(|b| *b == x) {
            return self.outputs[hit].clone();
        }

        if self.before(x, self.input[0]) {
            return self.outside(x, 0, 0, 1);
        }
        if self.before(self.input[last], x) {
            return self.outside(x, last, last - 1, last);
        }

        // First segment whose end lies at or beyond x.
        let segment = (0..last)
            .find(|&i| !self.before(self.input[i + 1], x))
            .unwrap_or(last - 1);

        let from = self.input[segment];
        let to = self.input[segment + 1];
        let width = to - from;
        if width == 0.0 {
            return self.outputs[segment].clone();
        }

        let progress = (x - from) / width;
        let eased = self.easings[segment].apply(progress);
        self.keyframes.blend(segment, segment + 1, eased)
    }

    /// Mix kind of the output range.
    pub fn kind(&self) -> MixKind {
        self.keyframes.kind()
    }

    pub fn input(&self) -> &[f64] {
        &self.input
    }

    pub fn output(&self) -> &[Value] {
        &self.outputs
    }

    pub fn is_clamped(&self) -> bool {
        self.clamp
    }

    /// Whether `a` comes strictly before `b` in the direction of the range.
    fn before(&self, a: f64, b: f64) -> bool {
        match self.direction {
            Direction::Ascending => a < b,
            Direction::Descending => a > b,
        }
    }

    /// Value for an input outside the domain, beyond breakpoint `edge`.
    fn outside(&self, x: f64, edge: usize, from: usize, to: usize) -> Value {
        if self.clamp {
            return self.outputs[edge].clone();
        }

        match (self.keyframes.number(from), self.keyframes.number(to)) {
            (Some(a), Some(b)) => {
                let width = self.input[to] - self.input[from];
                if width == 0.0 {
                    return self.outputs[edge].clone();
                }
                let anchor = self.keyframes.number(edge).unwrap_or(a);
                let progress = (x - self.input[edge]) / width;
                Value::Number(anchor + (b - a) * progress)
            }
            // Colors and compound values cannot be extrapolated; hold the edge.
            _ => self.outputs[edge].clone(),
        }
    }
}

/// Monotonic direction of `input`, rejecting ranges that turn around.
fn direction_of(input: &[f64]) -> Result<Direction> {
    let mut direction = None;
    for (index, pair) in input.windows(2).enumerate() {
        let step = if pair[1] > pair[0] {
            Direction::Ascending
        } else if pair[1] < pair[0] {
            Direction::Descending
        } else {
            continue;
        };

        match direction {
            None => direction = Some(step),
            Some(existing) if existing != step => {
                return Err(MotionError::configuration(format!(
                    "input range is not monotonic at input[{}] = {}",
                    index + 1,
                    pair[1]
                )));
            }
            Some(_) => {}
        }
    }
    Ok(direction.unwrap_or(Direction::Ascending))
}

/// Compile a range and map a single input through it.
///
/// Convenience for one-off conversions; hot paths should compile once with
/// [`Interpolator::compile`] and call [`Interpolator::map`].
pub fn interpolate(
    x: f64,
    input: &[f64],
    output: &[Value],
    options: &InterpolateOptions,
) -> Result<Value> {
    Ok(Interpolator::compile(input, output, options)?.map(x))
}
