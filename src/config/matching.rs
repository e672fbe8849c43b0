//! Runtime matchmaking configuration derived from [`AppConfig`]

use crate::config::app::AppConfig;
use crate::error::{MatchmakingError, Result};
use crate::types::Category;
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

/// Validated, typed view of the matchmaking settings
#[derive(Debug, Clone)]
pub struct MatchingConfig {
    /// Empty means any well-formed category is accepted
    pub categories: BTreeSet<Category>,
    pub group_size: usize,
    pub default_timeout: Duration,
    pub category_timeouts: HashMap<Category, Duration>,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            categories: BTreeSet::new(),
            group_size: 2,
            default_timeout: Duration::from_secs(120),
            category_timeouts: HashMap::new(),
        }
    }
}

impl MatchingConfig {
    pub fn from_app_config(config: &AppConfig) -> Result<Self> {
        let categories = config
            .matchmaking
            .categories
            .iter()
            .map(|c| Category::new(c.as_str()))
            .collect::<Result<BTreeSet<_>>>()?;

        let category_timeouts = config
            .matchmaking
            .category_timeouts
            .iter()
            .map(|(c, secs)| Ok((Category::new(c.as_str())?, Duration::from_secs(*secs))))
            .collect::<Result<HashMap<_, _>>>()?;

        Ok(Self {
            categories,
            group_size: config.matchmaking.group_size,
            default_timeout: config.waiting_timeout(),
            category_timeouts,
        })
    }

    /// Waiting timeout applied to new entries of `category`
    pub fn timeout_for(&self, category: &Category) -> Duration {
        self.category_timeouts
            .get(category)
            .copied()
            .unwrap_or(self.default_timeout)
    }

    /// Reject categories outside the configured list
    pub fn ensure_known(&self, category: &Category) -> Result<()> {
        if self.categories.is_empty() || self.categories.contains(category) {
            Ok(())
        } else {
            Err(MatchmakingError::UnknownCategory {
                category: category.to_string(),
            }
            .into())
        }
    }
}
