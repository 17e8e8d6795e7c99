//! Fee quoting for fee-market transactions.
//!
//! Live fee data is scaled by the priority tier as an integer percentage and
//! floored, then capped by the configured ceiling. Any failure to read live
//! fees, or a network without fee-market support, yields the static
//! configured fees instead of failing the dispatch.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::blockchain::types::{ChainRpc, FeeData};
use crate::config::{GasConfig, WalletConfig};
use crate::observability::metrics;

/// Urgency of a dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriorityTier {
    Low,
    #[default]
    Medium,
    High,
}

impl PriorityTier {
    /// Fee multiplier as an integer percentage.
    pub fn percent(self) -> u128 {
        match self {
            PriorityTier::Low => 80,
            PriorityTier::Medium => 100,
            PriorityTier::High => 150,
        }
    }
}

impl fmt::Display for PriorityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PriorityTier::Low => write!(f, "low"),
            PriorityTier::Medium => write!(f, "medium"),
            PriorityTier::High => write!(f, "high"),
        }
    }
}

impl FromStr for PriorityTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(PriorityTier::Low),
            "medium" => Ok(PriorityTier::Medium),
            "high" => Ok(PriorityTier::High),
            other => Err(format!("unknown priority tier '{}'", other)),
        }
    }
}

/// Fees to put on a transaction, in wei.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeQuote {
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
}

/// Static fee settings and the hard ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeePolicy {
    pub static_max_fee: u128,
    pub static_priority_fee: u128,
    pub ceiling: u128,
}

impl FeePolicy {
    pub fn from_config(wallet: &WalletConfig, gas: &GasConfig) -> Self {
        Self {
            static_max_fee: wallet.max_fee_per_gas as u128,
            static_priority_fee: wallet.max_priority_fee_per_gas as u128,
            ceiling: gas.max_gas_price as u128,
        }
    }

    /// Static fees, capped by the ceiling.
    pub fn fallback(&self) -> FeeQuote {
        cap(self.static_max_fee, self.static_priority_fee, self.ceiling)
    }

    /// Quote from live fee data; `None` when the network lacks fee-market fees.
    pub fn quote_from(&self, data: FeeData, tier: PriorityTier) -> Option<FeeQuote> {
        let (max_fee, priority) = match (data.max_fee_per_gas, data.max_priority_fee_per_gas) {
            (Some(max_fee), Some(priority)) => (max_fee, priority),
            _ => return None,
        };
        let pct = tier.percent();
        Some(cap(
            max_fee.saturating_mul(pct) / 100,
            priority.saturating_mul(pct) / 100,
            self.ceiling,
        ))
    }
}

fn cap(max_fee: u128, priority: u128, ceiling: u128) -> FeeQuote {
    let max_fee_per_gas = max_fee.min(ceiling);
    FeeQuote {
        max_fee_per_gas,
        // a tip above the max fee is rejected by nodes
        max_priority_fee_per_gas: priority.min(max_fee_per_gas),
    }
}

/// Quotes fees against live network data.
#[derive(Debug)]
pub struct GasStrategy<R> {
    rpc: Arc<R>,
    policy: FeePolicy,
}

impl<R: ChainRpc> GasStrategy<R> {
    pub fn new(rpc: Arc<R>, policy: FeePolicy) -> Self {
        Self { rpc, policy }
    }

    pub fn policy(&self) -> &FeePolicy {
        &self.policy
    }

    /// Quote fees for `tier`. Never fails.
    pub async fn quote(&self, tier: PriorityTier) -> FeeQuote {
        match self.rpc.fee_data().await {
            Ok(data) => match self.policy.quote_from(data, tier) {
                Some(quote) => {
                    tracing::debug!(
                        tier = %tier,
                        max_fee_per_gas = quote.max_fee_per_gas,
                        max_priority_fee_per_gas = quote.max_priority_fee_per_gas,
                        "Fee quote"
                    );
                    quote
                }
                None => {
                    tracing::debug!("Network has no fee-market data, using static fees");
                    metrics::record_fee_fallback("unsupported");
                    self.policy.fallback()
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "Fee data unavailable, using static fees");
                metrics::record_fee_fallback("error");
                self.policy.fallback()
            }
        }
    }
}
