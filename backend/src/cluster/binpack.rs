//! Node ranking strategies for placement

use crate::orchestrator::config::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Order in which candidate nodes are offered to a job's demand chunks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BinpackStrategy {
    /// Node index order
    #[default]
    FirstFit,
    /// Fewest usable GPUs first
    BestFit,
    /// Most usable GPUs first
    WorstFit,
}

impl BinpackStrategy {
    /// Rank node indices by their usable GPU counts
    ///
    /// Sorting is stable, so equal counts keep node index order.
    pub fn rank(&self, usable: &[usize]) -> Vec<usize> {
        let mut order: Vec<usize> = (0..usable.len()).collect();
        match self {
            BinpackStrategy::FirstFit => {}
            BinpackStrategy::BestFit => order.sort_by_key(|&n| usable[n]),
            BinpackStrategy::WorstFit => order.sort_by(|&a, &b| usable[b].cmp(&usable[a])),
        }
        order
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BinpackStrategy::FirstFit => "first-fit",
            BinpackStrategy::BestFit => "best-fit",
            BinpackStrategy::WorstFit => "worst-fit",
        }
    }
}

impl FromStr for BinpackStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "first-fit" => Ok(BinpackStrategy::FirstFit),
            "best-fit" => Ok(BinpackStrategy::BestFit),
            "worst-fit" => Ok(BinpackStrategy::WorstFit),
            other => Err(ConfigError::UnknownBinpack(other.to_string())),
        }
    }
}

impl fmt::Display for BinpackStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
