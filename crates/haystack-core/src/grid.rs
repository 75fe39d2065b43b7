use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{HaystackError, HaystackResult};

/// Where depth samples fall inside each depth interval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepthSpacing {
    /// `(j + 1) / n`: 0.1, 0.2, ... 1.0 for ten intervals.
    #[default]
    Trailing,
    /// `(j + 0.5) / n`: 0.05, 0.15, ... 0.95 for ten intervals.
    Centered,
}

impl fmt::Display for DepthSpacing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Trailing => write!(f, "trailing"),
            Self::Centered => write!(f, "centered"),
        }
    }
}

impl std::str::FromStr for DepthSpacing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trailing" => Ok(Self::Trailing),
            "centered" => Ok(Self::Centered),
            _ => Err(format!("invalid depth spacing: {s}")),
        }
    }
}

/// One point of the evaluation grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TestCell {
    pub context_percentage: f64,
    pub context_size: usize,
    pub depth: f64,
}

/// The `context_intervals × depth_intervals` matrix, enumerated context
/// ascending (outer) then depth ascending (inner). The order is fixed so a
/// resumed run can skip cells by count.
#[derive(Debug, Clone)]
pub struct Grid {
    max_context_tokens: usize,
    context_intervals: usize,
    depth_intervals: usize,
    spacing: DepthSpacing,
}

impl Grid {
    pub fn new(
        max_context_tokens: usize,
        context_intervals: usize,
        depth_intervals: usize,
        spacing: DepthSpacing,
    ) -> HaystackResult<Self> {
        if max_context_tokens == 0 {
            return Err(HaystackError::Config(
                "max_context_tokens must be positive".into(),
            ));
        }
        if context_intervals == 0 || depth_intervals == 0 {
            return Err(HaystackError::Config(format!(
                "grid needs at least one interval per axis (got {context_intervals}x{depth_intervals})"
            )));
        }
        Ok(Self {
            max_context_tokens,
            context_intervals,
            depth_intervals,
            spacing,
        })
    }

    pub fn len(&self) -> usize {
        self.context_intervals * self.depth_intervals
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn context_percentage(&self, i: usize) -> f64 {
        (i + 1) as f64 * (100.0 / self.context_intervals as f64)
    }

    pub fn context_size(&self, i: usize) -> usize {
        (self.max_context_tokens as f64 * (self.context_percentage(i) / 100.0)) as usize
    }

    pub fn depth(&self, j: usize) -> f64 {
        let n = self.depth_intervals as f64;
        match self.spacing {
            DepthSpacing::Trailing => (j + 1) as f64 / n,
            DepthSpacing::Centered => (j as f64 + 0.5) / n,
        }
    }

    pub fn cells(&self) -> impl Iterator<Item = TestCell> + '_ {
        (0..self.context_intervals).flat_map(move |i| {
            (0..self.depth_intervals).map(move |j| TestCell {
                context_percentage: self.context_percentage(i),
                context_size: self.context_size(i),
                depth: self.depth(j),
            })
        })
    }
}
