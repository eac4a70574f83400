//! Job configuration.
//!
//! A [`JobConfig`] is immutable once built and always valid: both the builder
//! and the serde path go through [`JobConfig::validate`], so an inverted
//! `from`/`to` pair or a zero batch size fails at start-up, not mid-run.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::{Commitment, EventFilter};

pub const DEFAULT_BATCH_SIZE: u64 = 100;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5_000;

// ─── Chain ────────────────────────────────────────────────────────────────────

/// How a chain expresses "position", which decides the cursor and advancer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainFamily {
    Height,
    Sequence,
    CheckpointDigest,
    Slot,
}

/// Every chain a job can watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Chain {
    Ethereum,
    Bsc,
    Polygon,
    Avalanche,
    Fantom,
    Celo,
    Moonbeam,
    Arbitrum,
    Optimism,
    Base,
    Near,
    Algorand,
    Cosmos,
    Wormchain,
    Aptos,
    Sei,
    Sui,
    Solana,
}

impl Chain {
    pub const ALL: [Chain; 18] = [
        Chain::Ethereum,
        Chain::Bsc,
        Chain::Polygon,
        Chain::Avalanche,
        Chain::Fantom,
        Chain::Celo,
        Chain::Moonbeam,
        Chain::Arbitrum,
        Chain::Optimism,
        Chain::Base,
        Chain::Near,
        Chain::Algorand,
        Chain::Cosmos,
        Chain::Wormchain,
        Chain::Aptos,
        Chain::Sei,
        Chain::Sui,
        Chain::Solana,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ethereum => "ethereum",
            Self::Bsc => "bsc",
            Self::Polygon => "polygon",
            Self::Avalanche => "avalanche",
            Self::Fantom => "fantom",
            Self::Celo => "celo",
            Self::Moonbeam => "moonbeam",
            Self::Arbitrum => "arbitrum",
            Self::Optimism => "optimism",
            Self::Base => "base",
            Self::Near => "near",
            Self::Algorand => "algorand",
            Self::Cosmos => "cosmos",
            Self::Wormchain => "wormchain",
            Self::Aptos => "aptos",
            Self::Sei => "sei",
            Self::Sui => "sui",
            Self::Solana => "solana",
        }
    }

    pub fn is_evm(&self) -> bool {
        matches!(
            self,
            Self::Ethereum
                | Self::Bsc
                | Self::Polygon
                | Self::Avalanche
                | Self::Fantom
                | Self::Celo
                | Self::Moonbeam
                | Self::Arbitrum
                | Self::Optimism
                | Self::Base
        )
    }

    pub fn family(&self) -> ChainFamily {
        match self {
            Self::Aptos | Self::Sei => ChainFamily::Sequence,
            Self::Sui => ChainFamily::CheckpointDigest,
            Self::Solana => ChainFamily::Slot,
            _ => ChainFamily::Height,
        }
    }

    /// Fetch strategies this chain supports; the first one is the default.
    pub fn strategies(&self) -> &'static [FetchStrategy] {
        if self.is_evm() {
            &[FetchStrategy::Logs, FetchStrategy::Transactions]
        } else {
            match self {
                Self::Aptos => &[FetchStrategy::Events],
                Self::Sui => &[FetchStrategy::Events, FetchStrategy::Transactions],
                _ => &[FetchStrategy::Transactions],
            }
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Chain {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == lower)
            .ok_or(ConfigError::Unknown {
                what: "chain",
                value: s.to_string(),
            })
    }
}

// ─── FetchStrategy ───────────────────────────────────────────────────────────

/// What a job extracts from each window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStrategy {
    /// Contract logs (EVM `eth_getLogs`).
    Logs,
    /// Whole transactions touching the watched addresses.
    Transactions,
    /// Move events (Aptos event handles, Sui event queries).
    Events,
}

impl FetchStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Logs => "logs",
            Self::Transactions => "transactions",
            Self::Events => "events",
        }
    }
}

impl fmt::Display for FetchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FetchStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "logs" => Ok(Self::Logs),
            "transactions" => Ok(Self::Transactions),
            "events" => Ok(Self::Events),
            _ => Err(ConfigError::Unknown {
                what: "fetch strategy",
                value: s.to_string(),
            }),
        }
    }
}

// ─── RpcSettings ─────────────────────────────────────────────────────────────

/// Resilience settings for the RPC client of one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcSettings {
    /// Operations allowed per `rate_period_ms`.
    pub rate_limit: u32,
    pub rate_period_ms: u64,
    /// Total attempts per call, first try included.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Fixed wait after a "rate limited" / "no healthy providers" error.
    pub capacity_cooldown_ms: u64,
    /// Consecutive failures before the breaker opens.
    pub failure_threshold: u32,
    pub open_duration_ms: u64,
}

impl Default for RpcSettings {
    fn default() -> Self {
        Self {
            rate_limit: 1_000,
            rate_period_ms: 10_000,
            max_attempts: 10,
            initial_backoff_ms: 200,
            max_backoff_ms: 30_000,
            capacity_cooldown_ms: 5_000,
            failure_threshold: 5,
            open_duration_ms: 10_000,
        }
    }
}

// ─── JobConfig ───────────────────────────────────────────────────────────────

/// Immutable configuration of a single polling job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawJobConfig")]
pub struct JobConfig {
    id: String,
    chain: Chain,
    commitment: Commitment,
    from: Option<u64>,
    to: Option<u64>,
    batch_size: u64,
    poll_interval_ms: u64,
    strategy: FetchStrategy,
    filter: EventFilter,
    rpc: RpcSettings,
}

impl JobConfig {
    /// Unique job id; also the cursor key.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn chain(&self) -> Chain {
        self.chain
    }

    pub fn commitment(&self) -> Commitment {
        self.commitment
    }

    /// Configured lower bound (inclusive), in chain-native units.
    pub fn from(&self) -> Option<u64> {
        self.from
    }

    /// Configured upper bound (inclusive); `None` = run forever.
    pub fn to(&self) -> Option<u64> {
        self.to
    }

    pub fn batch_size(&self) -> u64 {
        self.batch_size
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn strategy(&self) -> FetchStrategy {
        self.strategy
    }

    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }

    pub fn rpc(&self) -> &RpcSettings {
        &self.rpc
    }

    /// `true` once `position` has reached the configured `to` bound.
    pub fn is_past_end(&self, position: u64) -> bool {
        self.to.is_some_and(|to| position >= to)
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if self.id.trim().is_empty() {
            return Err(ConfigError::EmptyId);
        }
        if self.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize { job: self.id });
        }
        if let (Some(from), Some(to)) = (self.from, self.to) {
            if from > to {
                return Err(ConfigError::InvertedBounds { job: self.id, from, to });
            }
        }
        if !self.chain.strategies().contains(&self.strategy) {
            return Err(ConfigError::Invalid {
                reason: format!(
                    "strategy '{}' is not supported on {}",
                    self.strategy, self.chain
                ),
                job: self.id,
            });
        }
        if self.rpc.rate_limit == 0 || self.rpc.rate_period_ms == 0 {
            return Err(ConfigError::Invalid {
                job: self.id,
                reason: "rate limit and rate period must be greater than zero".into(),
            });
        }
        if self.rpc.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                job: self.id,
                reason: "max_attempts must be at least 1".into(),
            });
        }
        Ok(self)
    }
}

/// Wire form of [`JobConfig`]; only reachable through validation.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawJobConfig {
    id: String,
    chain: Chain,
    #[serde(default)]
    commitment: Commitment,
    #[serde(default)]
    from: Option<u64>,
    #[serde(default)]
    to: Option<u64>,
    #[serde(default = "default_batch_size")]
    batch_size: u64,
    #[serde(default = "default_poll_interval_ms")]
    poll_interval_ms: u64,
    #[serde(default)]
    strategy: Option<FetchStrategy>,
    #[serde(default)]
    filter: EventFilter,
    #[serde(default)]
    rpc: RpcSettings,
}

fn default_batch_size() -> u64 {
    DEFAULT_BATCH_SIZE
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

impl TryFrom<RawJobConfig> for JobConfig {
    type Error = ConfigError;

    fn try_from(raw: RawJobConfig) -> Result<Self, Self::Error> {
        JobConfig {
            strategy: raw.strategy.unwrap_or(raw.chain.strategies()[0]),
            id: raw.id,
            chain: raw.chain,
            commitment: raw.commitment,
            from: raw.from,
            to: raw.to,
            batch_size: raw.batch_size,
            poll_interval_ms: raw.poll_interval_ms,
            filter: raw.filter,
            rpc: raw.rpc,
        }
        .validate()
    }
}

// ─── Builder ─────────────────────────────────────────────────────────────────

/// Fluent builder for [`JobConfig`].
///
/// ```rust
/// use chainpoll_core::config::{Chain, JobConfig};
///
/// let cfg = JobConfig::builder("wormhole-ethereum", Chain::Ethereum)
///     .from(19_000_000)
///     .batch_size(500)
///     .build()
///     .unwrap();
/// assert_eq!(cfg.batch_size(), 500);
/// ```
#[derive(Debug, Clone)]
pub struct JobConfigBuilder {
    config: JobConfig,
}

impl JobConfig {
    pub fn builder(id: impl Into<String>, chain: Chain) -> JobConfigBuilder {
        JobConfigBuilder {
            config: JobConfig {
                id: id.into(),
                chain,
                commitment: Commitment::default(),
                from: None,
                to: None,
                batch_size: DEFAULT_BATCH_SIZE,
                poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
                strategy: chain.strategies()[0],
                filter: EventFilter::default(),
                rpc: RpcSettings::default(),
            },
        }
    }
}

impl JobConfigBuilder {
    pub fn commitment(mut self, commitment: Commitment) -> Self {
        self.config.commitment = commitment;
        self
    }

    /// Set the first position to process (inclusive).
    pub fn from(mut self, from: u64) -> Self {
        self.config.from = Some(from);
        self
    }

    /// Set the last position to process (inclusive).
    pub fn to(mut self, to: u64) -> Self {
        self.config.to = Some(to);
        self
    }

    pub fn batch_size(mut self, size: u64) -> Self {
        self.config.batch_size = size;
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    pub fn strategy(mut self, strategy: FetchStrategy) -> Self {
        self.config.strategy = strategy;
        self
    }

    pub fn filter(mut self, filter: EventFilter) -> Self {
        self.config.filter = filter;
        self
    }

    pub fn rpc(mut self, rpc: RpcSettings) -> Self {
        self.config.rpc = rpc;
        self
    }

    /// Validate and build the configuration.
    pub fn build(self) -> Result<JobConfig, ConfigError> {
        self.config.validate()
    }
}

// ─── Jobs file ───────────────────────────────────────────────────────────────

/// A set of jobs, as loaded from a JSON document `{ "jobs": [ ... ] }`.
#[derive(Debug, Clone, Deserialize)]
pub struct JobsFile {
    pub jobs: Vec<JobConfig>,
}

impl JobsFile {
    /// Parse and validate a jobs document. Duplicate ids are rejected.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let file: JobsFile =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        let mut seen = HashSet::new();
        for job in &file.jobs {
            if !seen.insert(job.id()) {
                return Err(ConfigError::DuplicateId(job.id().to_string()));
            }
        }
        Ok(file)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Parse(format!("{}: {e}", path.display())))?;
        Self::from_json(&text)
    }
}

// ─── Tunables ────────────────────────────────────────────────────────────────

pub const NEAR_HEAD_TOLERANCE_ENV: &str = "CHAINPOLL_NEAR_HEAD_TOLERANCE";
pub const SOLANA_SLOT_SEARCH_LIMIT_ENV: &str = "CHAINPOLL_SOLANA_SLOT_SEARCH_LIMIT";

/// Process-wide knobs for chain-specific heuristics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tunables {
    /// Blocks a Near head read may lag before it is treated as stale.
    pub near_head_tolerance: u64,
    /// Slots walked looking for a produced block before a Solana cycle fails.
    pub solana_slot_search_limit: u64,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            near_head_tolerance: 100,
            solana_slot_search_limit: 10,
        }
    }
}

impl Tunables {
    /// Read overrides from the environment; unset variables keep the default.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            near_head_tolerance: parse_var(
                NEAR_HEAD_TOLERANCE_ENV,
                lookup(NEAR_HEAD_TOLERANCE_ENV),
                defaults.near_head_tolerance,
            )?,
            solana_slot_search_limit: parse_var(
                SOLANA_SLOT_SEARCH_LIMIT_ENV,
                lookup(SOLANA_SLOT_SEARCH_LIMIT_ENV),
                defaults.solana_slot_search_limit,
            )?,
        })
    }
}

fn parse_var(name: &'static str, value: Option<String>, default: u64) -> Result<u64, ConfigError> {
    match value {
        None => Ok(default),
        Some(v) => v.trim().parse().map_err(|_| ConfigError::Env { name, value: v }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let cfg = JobConfig::builder("evm", Chain::Ethereum).build().unwrap();
        assert_eq!(cfg.batch_size(), DEFAULT_BATCH_SIZE);
        assert_eq!(cfg.poll_interval(), Duration::from_millis(DEFAULT_POLL_INTERVAL_MS));
        assert_eq!(cfg.strategy(), FetchStrategy::Logs);
        assert_eq!(cfg.commitment(), Commitment::Latest);
        assert!(cfg.from().is_none() && cfg.to().is_none());
    }

    #[test]
    fn inverted_bounds_fail_fast() {
        let err = JobConfig::builder("evm", Chain::Ethereum)
            .from(100)
            .to(99)
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvertedBounds { job: "evm".into(), from: 100, to: 99 }
        );
    }

    #[test]
    fn zero_batch_size_rejected() {
        let err = JobConfig::builder("sol", Chain::Solana).batch_size(0).build();
        assert!(matches!(err, Err(ConfigError::ZeroBatchSize { .. })));
    }

    #[test]
    fn unsupported_strategy_rejected() {
        let err = JobConfig::builder("sol", Chain::Solana)
            .strategy(FetchStrategy::Logs)
            .build();
        assert!(matches!(err, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn deserialize_applies_defaults_and_validates() {
        let cfg: JobConfig = serde_json::from_str(
            r#"{ "id": "aptos-bridge", "chain": "aptos", "from": 146040 }"#,
        )
        .unwrap();
        assert_eq!(cfg.chain().family(), ChainFamily::Sequence);
        assert_eq!(cfg.strategy(), FetchStrategy::Events);
        assert_eq!(cfg.from(), Some(146_040));

        let bad = serde_json::from_str::<JobConfig>(
            r#"{ "id": "x", "chain": "ethereum", "from": 10, "to": 5 }"#,
        );
        assert!(bad.is_err());
    }

    #[test]
    fn unknown_strategy_name_fails_at_load() {
        let bad = serde_json::from_str::<JobConfig>(
            r#"{ "id": "x", "chain": "ethereum", "strategy": "GetEvmReceipts" }"#,
        );
        assert!(bad.is_err());
    }

    #[test]
    fn jobs_file_rejects_duplicate_ids() {
        let json = r#"{ "jobs": [
            { "id": "a", "chain": "ethereum" },
            { "id": "a", "chain": "solana" }
        ] }"#;
        assert_eq!(
            JobsFile::from_json(json).unwrap_err(),
            ConfigError::DuplicateId("a".into())
        );
    }

    #[test]
    fn chain_from_str_roundtrip() {
        for chain in Chain::ALL {
            assert_eq!(chain.as_str().parse::<Chain>().unwrap(), chain);
        }
        assert!("dogecoin".parse::<Chain>().is_err());
    }

    #[test]
    fn past_end() {
        let cfg = JobConfig::builder("evm", Chain::Ethereum).to(50).build().unwrap();
        assert!(!cfg.is_past_end(49));
        assert!(cfg.is_past_end(50));
        let open = JobConfig::builder("evm", Chain::Ethereum).build().unwrap();
        assert!(!open.is_past_end(u64::MAX));
    }

    #[test]
    fn tunables_from_lookup() {
        let t = Tunables::from_lookup(|name| {
            (name == NEAR_HEAD_TOLERANCE_ENV).then(|| "250".to_string())
        })
        .unwrap();
        assert_eq!(t.near_head_tolerance, 250);
        assert_eq!(t.solana_slot_search_limit, 10);

        let err = Tunables::from_lookup(|_| Some("ten".into())).unwrap_err();
        assert!(matches!(err, ConfigError::Env { .. }));
    }
}
