//! Hyperparameter search spaces
//!
//! A [`ParamSpace`] is either one set of named dimensions or a list of
//! alternative subspaces (conditional grids, e.g. kernel-dependent degree
//! ranges). Grid, random and Bayesian search all consume the same type.

use crate::emulators::{HyperParams, ParamValue};
use crate::error::{Result, SurrogateError};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Domain of a single hyperparameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Domain {
    /// Explicit list of values
    Choice { values: Vec<ParamValue> },
    /// Continuous uniform distribution on [low, high]
    Uniform { low: f64, high: f64 },
    /// Log-uniform distribution on [low, high], both positive
    LogUniform { low: f64, high: f64 },
    /// Uniform integer distribution on [low, high]
    IntUniform { low: i64, high: i64 },
}

impl Domain {
    pub fn choice<V: Into<ParamValue>>(values: Vec<V>) -> Self {
        Domain::Choice {
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether the domain is an explicit list
    pub fn is_list(&self) -> bool {
        matches!(self, Domain::Choice { .. })
    }

    /// Number of distinct values, `None` for continuous domains
    pub fn cardinality(&self) -> Option<usize> {
        match self {
            Domain::Choice { values } => Some(values.len()),
            Domain::IntUniform { low, high } => Some((high - low + 1).max(0) as usize),
            Domain::Uniform { .. } | Domain::LogUniform { .. } => None,
        }
    }

    /// Enumerate every value of a discrete domain
    pub fn values(&self) -> Option<Vec<ParamValue>> {
        match self {
            Domain::Choice { values } => Some(values.clone()),
            Domain::IntUniform { low, high } => Some((*low..=*high).map(ParamValue::Int).collect()),
            _ => None,
        }
    }

    /// Draw a random value
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> ParamValue {
        match self {
            Domain::Choice { values } => values[rng.gen_range(0..values.len())].clone(),
            Domain::Uniform { low, high } => ParamValue::Float(low + rng.gen::<f64>() * (high - low)),
            Domain::LogUniform { low, high } => {
                let (ll, lh) = (low.ln(), high.ln());
                ParamValue::Float((ll + rng.gen::<f64>() * (lh - ll)).exp())
            }
            Domain::IntUniform { low, high } => ParamValue::Int(rng.gen_range(*low..=*high)),
        }
    }

    /// Map a point in [0, 1] onto the domain
    pub fn decode(&self, u: f64) -> ParamValue {
        let u = u.clamp(0.0, 1.0);
        match self {
            Domain::Choice { values } => {
                let idx = ((u * values.len() as f64) as usize).min(values.len() - 1);
                values[idx].clone()
            }
            Domain::Uniform { low, high } => ParamValue::Float(low + u * (high - low)),
            Domain::LogUniform { low, high } => {
                let (ll, lh) = (low.ln(), high.ln());
                ParamValue::Float((ll + u * (lh - ll)).exp())
            }
            Domain::IntUniform { low, high } => {
                let span = (high - low + 1) as f64;
                let offset = ((u * span) as i64).min(high - low);
                ParamValue::Int(low + offset)
            }
        }
    }

    /// Map a value back to the centre of its cell in [0, 1]
    pub fn encode(&self, value: &ParamValue) -> f64 {
        match self {
            Domain::Choice { values } => {
                let idx = values.iter().position(|v| v == value).unwrap_or(0);
                (idx as f64 + 0.5) / values.len() as f64
            }
            Domain::Uniform { low, high } => {
                let v = value.as_float().unwrap_or(*low);
                if high > low {
                    ((v - low) / (high - low)).clamp(0.0, 1.0)
                } else {
                    0.5
                }
            }
            Domain::LogUniform { low, high } => {
                let v = value.as_float().unwrap_or(*low).max(f64::MIN_POSITIVE);
                let (ll, lh) = (low.ln(), high.ln());
                if lh > ll {
                    ((v.ln() - ll) / (lh - ll)).clamp(0.0, 1.0)
                } else {
                    0.5
                }
            }
            Domain::IntUniform { low, high } => {
                let v = value.as_int().unwrap_or(*low);
                let span = (high - low + 1) as f64;
                ((v - low) as f64 + 0.5) / span
            }
        }
    }

    fn validate(&self, name: &str) -> Result<()> {
        let bad = |reason: String| SurrogateError::InvalidParameter {
            name: name.to_string(),
            estimator: "search space".to_string(),
            reason,
        };
        match self {
            Domain::Choice { values } if values.is_empty() => {
                Err(bad("empty list of values".to_string()))
            }
            Domain::Uniform { low, high } if !(low <= high) => {
                Err(bad(format!("invalid range [{}, {}]", low, high)))
            }
            Domain::LogUniform { low, high } if !(*low > 0.0 && low <= high) => {
                Err(bad(format!("invalid log range [{}, {}]", low, high)))
            }
            Domain::IntUniform { low, high } if low > high => {
                Err(bad(format!("invalid range [{}, {}]", low, high)))
            }
            _ => Ok(()),
        }
    }
}

/// One set of named dimensions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Subspace {
    dims: Vec<(String, Domain)>,
}

impl Subspace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a dimension, replacing any earlier one with the same name
    pub fn add(mut self, name: impl Into<String>, domain: Domain) -> Self {
        let name = name.into();
        self.dims.retain(|(n, _)| *n != name);
        self.dims.push((name, domain));
        self
    }

    pub fn choice<V: Into<ParamValue>>(self, name: impl Into<String>, values: Vec<V>) -> Self {
        self.add(name, Domain::choice(values))
    }

    pub fn uniform(self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.add(name, Domain::Uniform { low, high })
    }

    pub fn log_uniform(self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.add(name, Domain::LogUniform { low, high })
    }

    pub fn int_uniform(self, name: impl Into<String>, low: i64, high: i64) -> Self {
        self.add(name, Domain::IntUniform { low, high })
    }

    pub fn dims(&self) -> &[(String, Domain)] {
        &self.dims
    }

    pub fn len(&self) -> usize {
        self.dims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dims.is_empty()
    }

    /// Number of grid points, `None` if any dimension is continuous
    pub fn cardinality(&self) -> Option<usize> {
        self.dims
            .iter()
            .try_fold(1usize, |acc, (_, d)| d.cardinality().map(|c| acc.saturating_mul(c)))
    }

    /// Cartesian product of all list-valued dimensions, in declaration order
    pub fn grid(&self) -> Result<Vec<HyperParams>> {
        let mut points = vec![HyperParams::new()];
        for (name, domain) in &self.dims {
            let values = match domain {
                Domain::Choice { values } => values,
                _ => {
                    return Err(SurrogateError::InvalidParameter {
                        name: name.clone(),
                        estimator: "grid search".to_string(),
                        reason: "grid search requires a list of values, not a distribution"
                            .to_string(),
                    })
                }
            };
            let mut next = Vec::with_capacity(points.len() * values.len());
            for point in &points {
                for value in values {
                    let mut p = point.clone();
                    p.insert(name.clone(), value.clone());
                    next.push(p);
                }
            }
            points = next;
        }
        Ok(points)
    }

    /// Every point of an all-discrete subspace
    pub(crate) fn enumerate(&self) -> Option<Vec<HyperParams>> {
        let mut points = vec![HyperParams::new()];
        for (name, domain) in &self.dims {
            let values = domain.values()?;
            points = points
                .iter()
                .flat_map(|p| {
                    values.iter().map(move |v| {
                        let mut q = p.clone();
                        q.insert(name.clone(), v.clone());
                        q
                    })
                })
                .collect();
        }
        Some(points)
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> HyperParams {
        self.dims
            .iter()
            .map(|(name, domain)| (name.clone(), domain.sample(rng)))
            .collect()
    }
}

/// Search space: plain dimensions or conditional alternatives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamSpace {
    Dims(Subspace),
    Conditional(Vec<Subspace>),
}

impl Default for ParamSpace {
    fn default() -> Self {
        ParamSpace::Dims(Subspace::new())
    }
}

impl From<Subspace> for ParamSpace {
    fn from(sub: Subspace) -> Self {
        ParamSpace::Dims(sub)
    }
}

impl ParamSpace {
    pub fn subspaces(&self) -> &[Subspace] {
        match self {
            ParamSpace::Dims(sub) => std::slice::from_ref(sub),
            ParamSpace::Conditional(subs) => subs,
        }
    }

    /// Distinct parameter names across all subspaces, in first-seen order
    pub fn param_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for sub in self.subspaces() {
            for (name, _) in sub.dims() {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
        }
        names
    }

    pub fn is_empty(&self) -> bool {
        self.subspaces().iter().all(|s| s.is_empty())
    }

    /// Total number of grid points, `None` if anything is continuous
    pub fn cardinality(&self) -> Option<usize> {
        self.subspaces()
            .iter()
            .try_fold(0usize, |acc, s| s.cardinality().map(|c| acc.saturating_add(c)))
    }

    /// Full grid, concatenating the grids of conditional subspaces
    pub fn grid(&self) -> Result<Vec<HyperParams>> {
        let mut points = Vec::new();
        for sub in self.subspaces() {
            points.extend(sub.grid()?);
        }
        Ok(points)
    }

    /// Check that every domain is well formed
    pub fn validate(&self) -> Result<()> {
        if let ParamSpace::Conditional(subs) = self {
            if subs.is_empty() {
                return Err(SurrogateError::Config(
                    "conditional search space has no subspaces".to_string(),
                ));
            }
        }
        for sub in self.subspaces() {
            for (name, domain) in sub.dims() {
                domain.validate(name)?;
            }
        }
        Ok(())
    }

    /// Rewrite `model__<param>` keys to plain parameter names
    pub fn strip_prefix(&self, prefix: &str) -> ParamSpace {
        let strip = |sub: &Subspace| Subspace {
            dims: sub
                .dims()
                .iter()
                .map(|(n, d)| (n.strip_prefix(prefix).unwrap_or(n).to_string(), d.clone()))
                .collect(),
        };
        match self {
            ParamSpace::Dims(sub) => ParamSpace::Dims(strip(sub)),
            ParamSpace::Conditional(subs) => ParamSpace::Conditional(subs.iter().map(strip).collect()),
        }
    }
}
