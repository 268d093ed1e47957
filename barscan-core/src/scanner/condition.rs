//! Entry conditions, evaluated over a row range at a time.
//!
//! Each condition resolves its operands to column slices once per chunk and
//! then ANDs its result into a boolean mask. Undefined values are NaN, and
//! every comparison against NaN is false, so warm-up rows never pass.

use serde::{Deserialize, Serialize};
use std::ops::Range;

use crate::series::PriceSeries;

/// A value source for one side of a condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Operand {
    Open,
    High,
    Low,
    Close,
    Column { name: String },
    Const { value: f64 },
}

impl Operand {
    pub fn column(name: impl Into<String>) -> Self {
        Operand::Column { name: name.into() }
    }

    pub fn constant(value: f64) -> Self {
        Operand::Const { value }
    }

    fn indicator_name(&self) -> Option<&str> {
        match self {
            Operand::Column { name } => Some(name),
            _ => None,
        }
    }

    fn source<'s>(&self, series: &'s PriceSeries) -> Source<'s> {
        match self {
            Operand::Open => Source::Slice(series.open()),
            Operand::High => Source::Slice(series.high()),
            Operand::Low => Source::Slice(series.low()),
            Operand::Close => Source::Slice(series.close()),
            Operand::Column { name } => match series.indicators().get_series(name) {
                Some(values) => Source::Slice(values),
                None => Source::Const(f64::NAN),
            },
            Operand::Const { value } => Source::Const(*value),
        }
    }
}

enum Source<'s> {
    Slice(&'s [f64]),
    Const(f64),
}

impl Source<'_> {
    #[inline]
    fn at(&self, i: usize) -> f64 {
        match self {
            Source::Slice(values) => values[i],
            Source::Const(v) => *v,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Gt,
    Ge,
    Lt,
    Le,
}

impl CompareOp {
    #[inline]
    fn holds(self, left: f64, right: f64) -> bool {
        match self {
            CompareOp::Gt => left > right,
            CompareOp::Ge => left >= right,
            CompareOp::Lt => left < right,
            CompareOp::Le => left <= right,
        }
    }
}

/// One entry rule. A direction fires when all of its conditions hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    Compare {
        left: Operand,
        op: CompareOp,
        right: Operand,
    },
    /// `fast` closes above `slow` on this bar after being at or below it on the previous one.
    CrossAbove { fast: Operand, slow: Operand },
    /// `fast` closes below `slow` on this bar after being at or above it on the previous one.
    CrossBelow { fast: Operand, slow: Operand },
}

impl Condition {
    pub fn compare(left: Operand, op: CompareOp, right: Operand) -> Self {
        Condition::Compare { left, op, right }
    }

    /// Indicator columns this condition reads.
    pub fn indicator_names(&self) -> impl Iterator<Item = &str> {
        let (a, b) = match self {
            Condition::Compare { left, right, .. } => (left, right),
            Condition::CrossAbove { fast, slow } | Condition::CrossBelow { fast, slow } => {
                (fast, slow)
            }
        };
        a.indicator_name().into_iter().chain(b.indicator_name())
    }

    /// AND this condition into `mask`, where `mask[k]` is row `rows.start + k`.
    pub(crate) fn apply(&self, series: &PriceSeries, rows: Range<usize>, mask: &mut [bool]) {
        debug_assert_eq!(mask.len(), rows.len());
        match self {
            Condition::Compare { left, op, right } => {
                let (l, r) = (left.source(series), right.source(series));
                for (slot, i) in mask.iter_mut().zip(rows) {
                    *slot = *slot && op.holds(l.at(i), r.at(i));
                }
            }
            Condition::CrossAbove { fast, slow } => {
                let (f, s) = (fast.source(series), slow.source(series));
                for (slot, i) in mask.iter_mut().zip(rows) {
                    *slot = *slot && i > 0 && f.at(i - 1) <= s.at(i - 1) && f.at(i) > s.at(i);
                }
            }
            Condition::CrossBelow { fast, slow } => {
                let (f, s) = (fast.source(series), slow.source(series));
                for (slot, i) in mask.iter_mut().zip(rows) {
                    *slot = *slot && i > 0 && f.at(i - 1) >= s.at(i - 1) && f.at(i) < s.at(i);
                }
            }
        }
    }
}
