//! Tree configuration

use crate::error::TreeError;
use serde::{Deserialize, Serialize};

/// Sizing and assertion knobs for the tree
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TreeConfig {
    /// Maximum number of entries (and children) per node
    pub arity: usize,
    /// Minimum fill ratio for non-root nodes, in `(0, 0.5]`
    pub alpha: f64,
    /// Check strictly ascending keys on every node before it is persisted
    pub assert_key_order: bool,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            arity: 8,
            alpha: 0.25,
            assert_key_order: false,
        }
    }
}

impl TreeConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), TreeError> {
        if self.arity < 4 {
            return Err(TreeError::Config(format!(
                "arity must be at least 4, got {}",
                self.arity
            )));
        }
        if !(self.alpha > 0.0 && self.alpha <= 0.5) {
            return Err(TreeError::Config(format!(
                "alpha must be in (0, 0.5], got {}",
                self.alpha
            )));
        }
        Ok(())
    }

    /// Maximum entries per node
    pub fn max_degree(&self) -> usize {
        self.arity
    }

    /// Minimum entries per non-root node
    pub fn min_degree(&self) -> usize {
        (self.alpha * self.arity as f64).floor() as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = TreeConfig::default();
        config.validate().unwrap();
        assert_eq!(config.max_degree(), 8);
        assert_eq!(config.min_degree(), 2);
    }

    #[test]
    fn test_rejects_tiny_arity() {
        let config = TreeConfig {
            arity: 2,
            ..TreeConfig::default()
        };
        assert!(matches!(config.validate(), Err(TreeError::Config(_))));
    }

    #[test]
    fn test_rejects_alpha_out_of_range() {
        for alpha in [0.0, 0.75, -0.1] {
            let config = TreeConfig {
                alpha,
                ..TreeConfig::default()
            };
            assert!(matches!(config.validate(), Err(TreeError::Config(_))));
        }
    }
}
