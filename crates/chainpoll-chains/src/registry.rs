//! Which source implementation serves a job.
//!
//! Resolved once at startup from the job's chain and fetch strategy, so an
//! unsupported combination is a configuration error, never a runtime one.

use std::fmt;

use chainpoll_core::config::{Chain, ChainFamily, FetchStrategy, JobConfig};
use chainpoll_core::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    EvmLogs,
    EvmTransactions,
    NearTransactions,
    CosmosTransactions,
    AlgorandTransactions,
    AptosEvents,
    SeiTransactions,
    SuiTransactions,
    SolanaTransactions,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EvmLogs => "evm-logs",
            Self::EvmTransactions => "evm-transactions",
            Self::NearTransactions => "near-transactions",
            Self::CosmosTransactions => "cosmos-transactions",
            Self::AlgorandTransactions => "algorand-transactions",
            Self::AptosEvents => "aptos-events",
            Self::SeiTransactions => "sei-transactions",
            Self::SuiTransactions => "sui-transactions",
            Self::SolanaTransactions => "solana-transactions",
        }
    }

    /// Cursor family the source persists.
    pub fn family(&self) -> ChainFamily {
        match self {
            Self::AptosEvents | Self::SeiTransactions => ChainFamily::Sequence,
            Self::SuiTransactions => ChainFamily::CheckpointDigest,
            Self::SolanaTransactions => ChainFamily::Slot,
            _ => ChainFamily::Height,
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pick the source for `chain` + `strategy`.
pub fn resolve(chain: Chain, strategy: FetchStrategy) -> Result<SourceKind, ConfigError> {
    use FetchStrategy::*;

    let kind = match (chain, strategy) {
        (c, Logs) if c.is_evm() => SourceKind::EvmLogs,
        (c, Transactions) if c.is_evm() => SourceKind::EvmTransactions,
        (Chain::Near, Transactions) => SourceKind::NearTransactions,
        (Chain::Cosmos | Chain::Wormchain, Transactions) => SourceKind::CosmosTransactions,
        (Chain::Algorand, Transactions) => SourceKind::AlgorandTransactions,
        (Chain::Aptos, Events) => SourceKind::AptosEvents,
        (Chain::Sei, Transactions) => SourceKind::SeiTransactions,
        (Chain::Sui, Events | Transactions) => SourceKind::SuiTransactions,
        (Chain::Solana, Transactions) => SourceKind::SolanaTransactions,
        _ => {
            return Err(ConfigError::Unknown {
                what: "source",
                value: format!("{chain}/{strategy}"),
            })
        }
    };
    Ok(kind)
}

/// [`resolve`] for a whole job.
pub fn resolve_job(cfg: &JobConfig) -> Result<SourceKind, ConfigError> {
    resolve(cfg.chain(), cfg.strategy())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_accepted_strategy_resolves() {
        for chain in Chain::ALL {
            for &strategy in chain.strategies() {
                let kind = resolve(chain, strategy).unwrap();
                assert_eq!(kind.family(), chain.family(), "{chain}/{strategy}");
            }
        }
    }

    #[test]
    fn explicit_strategies() {
        assert_eq!(resolve(Chain::Base, FetchStrategy::Transactions).unwrap(), SourceKind::EvmTransactions);
        assert_eq!(resolve(Chain::Wormchain, FetchStrategy::Transactions).unwrap(), SourceKind::CosmosTransactions);
        assert!(resolve(Chain::Solana, FetchStrategy::Logs).is_err());
        assert!(resolve(Chain::Ethereum, FetchStrategy::Events).is_err());
    }
}
