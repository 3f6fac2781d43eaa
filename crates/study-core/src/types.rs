use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::model::{Model, TIME_LABEL};
use crate::modification::ModValue;
use crate::provenance::{RunProvenance, SchemaVersion};

/// Stable 1-based variant identifier.
pub type VariantId = u32;

/// Numerical integration scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    /// Forward Euler (Euler-Maruyama for noisy states).
    Euler,
    /// Heun's second order method.
    Rk2,
    /// Classic fourth order Runge-Kutta.
    #[default]
    Rk4,
}

/// Solver selection and numeric run options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Integration scheme.
    #[serde(default)]
    pub method: Method,
    /// Start and end time.
    #[serde(default = "SolverConfig::default_tspan")]
    pub tspan: [f64; 2],
    /// Fixed step size.
    #[serde(default = "SolverConfig::default_dt")]
    pub dt: f64,
    /// Keep every n-th sample.
    #[serde(default = "SolverConfig::default_downsample")]
    pub downsample: usize,
    /// Master seed for stochastic states.
    #[serde(default)]
    pub seed: u64,
}

impl SolverConfig {
    /// Largest number of integration steps a single run may take.
    pub const MAX_STEPS: usize = 1_000_000_000;

    fn default_tspan() -> [f64; 2] {
        [0.0, 100.0]
    }

    fn default_dt() -> f64 {
        0.01
    }

    const fn default_downsample() -> usize {
        1
    }

    /// Exact step count as a float; infinite or NaN for degenerate inputs.
    pub fn step_ratio(&self) -> f64 {
        ((self.tspan[1] - self.tspan[0]) / self.dt).round()
    }

    /// Number of integration steps covering the time span.
    ///
    /// Saturates for spans beyond [`SolverConfig::MAX_STEPS`]; callers check
    /// the bound before allocating.
    pub fn steps(&self) -> usize {
        let span = self.tspan[1] - self.tspan[0];
        if span <= 0.0 || self.dt <= 0.0 {
            return 0;
        }
        (span / self.dt).round() as usize
    }
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            method: Method::default(),
            tspan: Self::default_tspan(),
            dt: Self::default_dt(),
            downsample: Self::default_downsample(),
            seed: 0,
        }
    }
}

/// Where a run's channels are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Channels are returned in memory.
    #[default]
    Memory,
    /// Channels are written to a CSV file next to the variant's work directory.
    Disk,
}

/// Storage of a result's labeled channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SeriesData {
    /// One vector per label, in label order.
    Memory {
        /// Channel samples.
        channels: Vec<Vec<f64>>,
    },
    /// CSV file whose header equals the label list.
    Disk {
        /// Location of the CSV file.
        path: PathBuf,
    },
}

/// Output of one variant execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    /// Schema version of the record payload.
    #[serde(default)]
    pub schema_version: SchemaVersion,
    /// Variant the record belongs to.
    pub variant_id: VariantId,
    /// Channel labels; `time` is always first.
    pub labels: Vec<String>,
    /// Number of samples per channel.
    pub samples: usize,
    /// Channel storage.
    pub series: SeriesData,
    /// Solver configuration used.
    pub solver: SolverConfig,
    /// Effective model, when requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<Model>,
    /// Perturbed fields keyed by their normalized tag name.
    #[serde(default)]
    pub varied: BTreeMap<String, ModValue>,
    /// Provenance of the run.
    #[serde(default)]
    pub provenance: RunProvenance,
}

impl ResultRecord {
    /// In-memory channels, if the record was produced in memory mode.
    pub fn memory_channels(&self) -> Option<&[Vec<f64>]> {
        match &self.series {
            SeriesData::Memory { channels } => Some(channels),
            SeriesData::Disk { .. } => None,
        }
    }

    /// In-memory channel by label.
    pub fn channel(&self, label: &str) -> Option<&[f64]> {
        let idx = self.labels.iter().position(|l| l == label)?;
        self.memory_channels()
            .and_then(|channels| channels.get(idx))
            .map(|c| c.as_slice())
    }

    /// In-memory time axis.
    pub fn time(&self) -> Option<&[f64]> {
        self.channel(TIME_LABEL)
    }

    /// Numeric value of a varied tag.
    pub fn varied_value(&self, tag: &str) -> Option<f64> {
        self.varied.get(tag).and_then(ModValue::as_f64)
    }
}
