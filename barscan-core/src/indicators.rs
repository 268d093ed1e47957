//! Indicator ownership registry.
//!
//! Holds the ordered list of indicator names a strategy declares. The core
//! never computes indicators; this registry only answers "which columns does
//! this run depend on, and are they there?" for audit and reporting.

use serde::{Deserialize, Serialize};

use crate::error::PolicyConfigError;
use crate::series::PriceSeries;

/// Ordered, duplicate-free list of declared indicator names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorRegistry {
    names: Vec<String>,
}

impl IndicatorRegistry {
    /// Build from declaration order; repeated names keep their first position.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out: Vec<String> = Vec::new();
        for name in names {
            let name = name.into();
            if !out.contains(&name) {
                out.push(name);
            }
        }
        Self { names: out }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Per-name presence and warm-up report against a series.
    pub fn audit(&self, series: &PriceSeries) -> IndicatorAudit {
        let entries = self
            .names
            .iter()
            .map(|name| match series.indicators().get_series(name) {
                Some(values) => IndicatorAuditEntry {
                    name: name.clone(),
                    present: true,
                    warmup_bars: values.iter().take_while(|v| v.is_nan()).count(),
                    defined_count: values.iter().filter(|v| !v.is_nan()).count(),
                },
                None => IndicatorAuditEntry {
                    name: name.clone(),
                    present: false,
                    warmup_bars: series.len(),
                    defined_count: 0,
                },
            })
            .collect();
        IndicatorAudit { entries }
    }

    /// Fail on the first declared name with no column in the series.
    pub fn require_all(&self, series: &PriceSeries) -> Result<(), PolicyConfigError> {
        match self
            .names
            .iter()
            .find(|name| !series.indicators().contains(name))
        {
            Some(missing) => Err(PolicyConfigError::MissingIndicator(missing.clone())),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorAuditEntry {
    pub name: String,
    pub present: bool,
    /// Leading rows with no defined value.
    pub warmup_bars: usize,
    pub defined_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorAudit {
    pub entries: Vec<IndicatorAuditEntry>,
}

impl IndicatorAudit {
    pub fn missing(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|e| !e.present)
            .map(|e| e.name.as_str())
    }

    /// Longest warm-up among present indicators.
    pub fn max_warmup(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.present)
            .map(|e| e.warmup_bars)
            .max()
            .unwrap_or(0)
    }
}
