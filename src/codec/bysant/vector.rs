//! Compressed numeric vectors.
//!
//! Both vector kinds keep their compressed form as the source of truth and
//! expand lazily through [`DeltaVector::samples`] and
//! [`QuasiPeriodicVector::samples`].
//!
//! ```text
//! DeltaVector { factor: 2, start: 5, deltas: [1, -2, 3] }
//!   -> [10, 12, 8, 14]
//!
//! QuasiPeriodicVector { period: 10, start: 100, shifts: [2, 1, 1] }
//!   -> [100, 110, 120, 131, 141]
//! ```

use std::fmt;
use std::ops::{Add, Mul};

use super::tags::MAX_VECTOR_SAMPLES;

/// Numeric sample produced by vector expansion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    /// Integer sample
    Int(i64),
    /// Floating point sample
    Float(f64),
}

impl Number {
    /// Sample as a float, regardless of variant.
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Int(i) => i as f64,
            Self::Float(f) => f,
        }
    }
}

impl Add for Number {
    type Output = Number;

    fn add(self, rhs: Number) -> Number {
        match (self, rhs) {
            (Self::Int(a), Self::Int(b)) => Self::Int(a.wrapping_add(b)),
            (a, b) => Self::Float(a.as_f64() + b.as_f64()),
        }
    }
}

impl Mul for Number {
    type Output = Number;

    fn mul(self, rhs: Number) -> Number {
        match (self, rhs) {
            (Self::Int(a), Self::Int(b)) => Self::Int(a.wrapping_mul(b)),
            (a, b) => Self::Float(a.as_f64() * b.as_f64()),
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
        }
    }
}

impl From<i64> for Number {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Number {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for Number {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

/// Sequence stored as a start value and running deltas, all scaled by `factor`.
#[derive(Debug, Clone, PartialEq)]
pub struct DeltaVector {
    /// Scale applied to the start value and every delta
    pub factor: Number,
    /// First sample before scaling
    pub start: Number,
    /// Differences between consecutive samples before scaling
    pub deltas: Vec<i64>,
}

impl DeltaVector {
    /// Create a delta vector.
    pub fn new(factor: impl Into<Number>, start: impl Into<Number>, deltas: Vec<i64>) -> Self {
        Self {
            factor: factor.into(),
            start: start.into(),
            deltas,
        }
    }

    /// Number of samples the vector expands to.
    pub fn len(&self) -> usize {
        self.deltas.len() + 1
    }

    /// Always false; a delta vector carries at least its start sample.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Lazily expand to the flat sample sequence.
    pub fn samples(&self) -> impl Iterator<Item = Number> + '_ {
        let factor = self.factor;
        let first = self.start * factor;
        std::iter::once(first).chain(self.deltas.iter().scan(first, move |acc, &delta| {
            *acc = *acc + Number::Int(delta) * factor;
            Some(*acc)
        }))
    }

    /// Expand to a vector of samples.
    pub fn flatten(&self) -> Vec<Number> {
        self.samples().collect()
    }

    /// Smallest big-endian width, in bytes, that holds every delta.
    pub(crate) fn delta_width(&self) -> u8 {
        self.deltas
            .iter()
            .map(|&d| {
                if i8::try_from(d).is_ok() {
                    1
                } else if i16::try_from(d).is_ok() {
                    2
                } else if i32::try_from(d).is_ok() {
                    4
                } else {
                    8
                }
            })
            .max()
            .unwrap_or(1)
    }
}

/// Why a quasi-periodic shift list was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftsError {
    /// A repetition count is negative.
    NegativeCount(i64),
    /// Expansion would exceed the sample cap.
    TooLarge,
}

/// Sequence of samples spaced by a nominal `period`, with occasional shifts.
///
/// `shifts` is read as `(count, shift)` pairs: `count` samples exactly one
/// period apart, then one sample `period + shift` after the previous. A
/// trailing unpaired count emits regular samples only.
#[derive(Debug, Clone, PartialEq)]
pub struct QuasiPeriodicVector {
    period: Number,
    start: Number,
    shifts: Vec<i64>,
}

impl QuasiPeriodicVector {
    /// Create a quasi-periodic vector, validating the shift list.
    pub fn new(
        period: impl Into<Number>,
        start: impl Into<Number>,
        shifts: Vec<i64>,
    ) -> Result<Self, ShiftsError> {
        Self::sample_count(&shifts)?;
        Ok(Self {
            period: period.into(),
            start: start.into(),
            shifts,
        })
    }

    /// Nominal distance between samples
    pub fn period(&self) -> Number {
        self.period
    }

    /// First sample
    pub fn start(&self) -> Number {
        self.start
    }

    /// Raw `(count, shift)` list
    pub fn shifts(&self) -> &[i64] {
        &self.shifts
    }

    /// Number of samples the vector expands to.
    pub fn len(&self) -> usize {
        // Validated at construction.
        Self::sample_count(&self.shifts).unwrap_or(0)
    }

    /// Always false; the start sample is always present.
    pub fn is_empty(&self) -> bool {
        false
    }

    fn sample_count(shifts: &[i64]) -> Result<usize, ShiftsError> {
        let mut total: usize = 1;
        for pair in shifts.chunks(2) {
            let count =
                usize::try_from(pair[0]).map_err(|_| ShiftsError::NegativeCount(pair[0]))?;
            let step = count + usize::from(pair.len() == 2);
            total = total
                .checked_add(step)
                .filter(|&t| t <= MAX_VECTOR_SAMPLES)
                .ok_or(ShiftsError::TooLarge)?;
        }
        Ok(total)
    }

    /// Lazily expand to the flat sample sequence.
    pub fn samples(&self) -> impl Iterator<Item = Number> + '_ {
        let period = self.period;
        let steps = self.shifts.chunks(2).flat_map(move |pair| {
            let count = usize::try_from(pair[0]).unwrap_or(0);
            let shifted = pair.get(1).map(|&shift| period + Number::Int(shift));
            std::iter::repeat(period).take(count).chain(shifted)
        });
        std::iter::once(self.start).chain(steps.scan(self.start, |acc, step| {
            *acc = *acc + step;
            Some(*acc)
        }))
    }

    /// Expand to a vector of samples.
    pub fn flatten(&self) -> Vec<Number> {
        self.samples().collect()
    }
}
