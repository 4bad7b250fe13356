use serde::{Deserialize, Serialize};

use crate::Config;
use crate::shared::{TransformConfig, ValidationError};

/// Configuration for a conduit pipeline.
///
/// A pipeline applies its transforms in order to every message it receives.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum number of messages processed at the same time. Zero removes the limit.
    #[serde(default)]
    pub concurrency: usize,
    /// Transforms applied to every message, in order.
    pub transforms: Vec<TransformConfig>,
}

impl PipelineConfig {
    /// Validates the pipeline and every transform in it.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.transforms.is_empty() {
            return Err(ValidationError::NoTransforms);
        }

        for transform in &self.transforms {
            transform.validate()?;
        }

        Ok(())
    }
}

impl Config for PipelineConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &[];
}
