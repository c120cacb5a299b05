//! Ordered field fallbacks.
//!
//! A field is described as a list of sources tried in order; the first one
//! that yields a defined value wins. Later sources are never evaluated once an
//! earlier one succeeds.

use crate::market::{BarField, InfoRecord, PriceBar};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSource {
    /// A key of the metadata record.
    Info(&'static str),
    /// A field of the most recent bar.
    LastBar(BarField),
    /// A field of the bar before the most recent one.
    PreviousBar(BarField),
}

impl FieldSource {
    fn lookup(self, info: &InfoRecord, bars: &[PriceBar]) -> Option<f64> {
        match self {
            Self::Info(key) => info.number(key),
            Self::LastBar(field) => bars.last()?.field(field),
            Self::PreviousBar(field) => {
                let idx = bars.len().checked_sub(2)?;
                bars[idx].field(field)
            }
        }
    }
}

impl fmt::Display for FieldSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info(key) => write!(f, "info.{key}"),
            Self::LastBar(field) => write!(f, "history[-1].{field:?}"),
            Self::PreviousBar(field) => write!(f, "history[-2].{field:?}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolved {
    pub value: f64,
    pub source: FieldSource,
}

/// The upstream data a field can be derived from.
#[derive(Debug, Clone, Copy)]
pub struct FallbackInputs<'a> {
    pub info: &'a InfoRecord,
    pub bars: &'a [PriceBar],
}

impl<'a> FallbackInputs<'a> {
    pub fn new(info: &'a InfoRecord, bars: &'a [PriceBar]) -> Self {
        Self { info, bars }
    }

    pub fn resolve(&self, sources: &[FieldSource]) -> Option<Resolved> {
        sources.iter().find_map(|&source| {
            source
                .lookup(self.info, self.bars)
                .map(|value| Resolved { value, source })
        })
    }

    pub fn resolve_or(&self, sources: &[FieldSource], default: f64) -> f64 {
        self.resolve(sources).map_or(default, |r| r.value)
    }

    pub fn text(&self, keys: &[&str]) -> Option<&'a str> {
        keys.iter().find_map(|key| self.info.text(key))
    }
}
