//! Perception filters ("lenses")
//!
//! A lens belongs to the receiving agent. The router consults it to decide
//! which signals the receiver attends to and to shape every projection the
//! receiver gets. Senders never see or call a receiver's lens.

use crate::message::{Payload, ShapeHint, Signal};
use crate::types::AgentId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// Capability interface for receiver-owned filtering.
///
/// Errors are reported as plain reasons; the router wraps them into
/// [`crate::error::RoutingError::FilterFailed`] and drops the one message.
pub trait PerceptionFilter: Send + Sync {
    fn should_attend(&self, signal: &Signal) -> Result<bool, String>;

    fn shape(&self, sender: &AgentId, raw: &Payload) -> Result<Payload, String>;

    /// Shape hint sent along with on-demand projection requests.
    fn shape_hint(&self) -> ShapeHint {
        ShapeHint::default()
    }
}

/// Signal attention policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attention {
    /// Attend to every signal.
    All,
    /// Attend to nothing.
    Nothing,
    /// Attend when the signal carries any of these topics.
    Topics(BTreeSet<String>),
    /// Attend when the sparse dot product of lens weights and signal topic
    /// weights reaches `threshold`.
    Weighted {
        weights: BTreeMap<String, f64>,
        threshold: f64,
    },
}

impl Default for Attention {
    fn default() -> Self {
        Attention::All
    }
}

/// Declarative lens, loadable from configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LensConfig {
    #[serde(default)]
    pub attention: Attention,
    /// Field allow-list applied to projections; `None` keeps every field.
    #[serde(default)]
    pub fields: Option<BTreeSet<String>>,
}

/// Per-agent lens: a declarative configuration or a custom strategy object.
#[derive(Clone)]
pub enum Lens {
    Configured(LensConfig),
    Custom(Arc<dyn PerceptionFilter>),
}

impl Lens {
    pub fn attend_all() -> Self {
        Lens::Configured(LensConfig::default())
    }

    pub fn topics<I, S>(topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Lens::Configured(LensConfig {
            attention: Attention::Topics(topics.into_iter().map(Into::into).collect()),
            fields: None,
        })
    }

    pub fn weighted(weights: BTreeMap<String, f64>, threshold: f64) -> Self {
        Lens::Configured(LensConfig {
            attention: Attention::Weighted { weights, threshold },
            fields: None,
        })
    }

    pub fn custom(filter: impl PerceptionFilter + 'static) -> Self {
        Lens::Custom(Arc::new(filter))
    }

    /// Restrict projections to the given fields. No effect on custom lenses.
    pub fn with_fields<I, S>(self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        match self {
            Lens::Configured(mut config) => {
                config.fields = Some(fields.into_iter().map(Into::into).collect());
                Lens::Configured(config)
            }
            custom => custom,
        }
    }
}

impl Default for Lens {
    fn default() -> Self {
        Lens::attend_all()
    }
}

impl fmt::Debug for Lens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lens::Configured(config) => f.debug_tuple("Configured").field(config).finish(),
            Lens::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl From<LensConfig> for Lens {
    fn from(config: LensConfig) -> Self {
        Lens::Configured(config)
    }
}

/// Sparse dot product of two topic-weight maps. Missing keys count as 0.0.
pub fn sparse_dot(a: &BTreeMap<String, f64>, b: &BTreeMap<String, f64>) -> f64 {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    small
        .iter()
        .map(|(key, weight)| weight * large.get(key).copied().unwrap_or(0.0))
        .sum()
}

impl PerceptionFilter for LensConfig {
    fn should_attend(&self, signal: &Signal) -> Result<bool, String> {
        match &self.attention {
            Attention::All => Ok(true),
            Attention::Nothing => Ok(false),
            Attention::Topics(topics) => Ok(topics.iter().any(|t| signal.has_topic(t))),
            Attention::Weighted { weights, threshold } => {
                if let Some((topic, weight)) =
                    signal.topic_keys.iter().find(|(_, w)| !w.is_finite())
                {
                    return Err(format!(
                        "signal from {} has non-finite weight {} for topic '{}'",
                        signal.sender, weight, topic
                    ));
                }
                Ok(sparse_dot(weights, &signal.topic_keys) >= *threshold)
            }
        }
    }

    fn shape(&self, _sender: &AgentId, raw: &Payload) -> Result<Payload, String> {
        match &self.fields {
            None => Ok(raw.clone()),
            Some(fields) => Ok(raw
                .iter()
                .filter(|(key, _)| fields.contains(key.as_str()))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect()),
        }
    }

    fn shape_hint(&self) -> ShapeHint {
        ShapeHint {
            fields: self.fields.as_ref().map(|f| f.iter().cloned().collect()),
        }
    }
}

impl PerceptionFilter for Lens {
    fn should_attend(&self, signal: &Signal) -> Result<bool, String> {
        match self {
            Lens::Configured(config) => config.should_attend(signal),
            Lens::Custom(filter) => filter.should_attend(signal),
        }
    }

    fn shape(&self, sender: &AgentId, raw: &Payload) -> Result<Payload, String> {
        match self {
            Lens::Configured(config) => config.shape(sender, raw),
            Lens::Custom(filter) => filter.shape(sender, raw),
        }
    }

    fn shape_hint(&self) -> ShapeHint {
        match self {
            Lens::Configured(config) => config.shape_hint(),
            Lens::Custom(filter) => filter.shape_hint(),
        }
    }
}
