//! chainpoll-chains — per-family range advancers and poll sources.
//!
//! Four cursor families cover every supported chain:
//!
//! | Family              | Advancer             | Source           | Chains                                |
//! |---------------------|----------------------|------------------|---------------------------------------|
//! | Height              | [`HeightAdvancer`]     | [`HeightSource`]   | EVM chains, Near, Cosmos, Wormchain, Algorand |
//! | Sequence            | [`SequenceAdvancer`]   | [`SequenceSource`] | Aptos, Sei                            |
//! | Checkpoint + digest | [`CheckpointAdvancer`] | [`SuiSource`]      | Sui                                   |
//! | Slot                | [`SlotAdvancer`]       | [`SolanaSource`]   | Solana                                |
//!
//! Chain access is expressed as repository traits (`EvmRpc`, `NearRpc`,
//! `AptosRpc`, …); every call a source makes goes through the job's
//! [`ResilientClient`](chainpoll_rpc::ResilientClient).

pub mod algorand;
pub mod aptos;
pub mod client;
pub mod cosmos;
pub mod evm;
pub mod height;
pub mod near;
pub mod registry;
pub mod sei;
pub mod sequence;
pub mod solana;
pub mod sui;

pub use algorand::{AlgorandIndexer, AlgorandRepository, AlgorandTransaction};
pub use aptos::{AptosEvent, AptosRepository, AptosRpc, EventHandle};
pub use client::{client_for, rpc_config};
pub use cosmos::{CosmosEvent, CosmosRepository, CosmosRpc, CosmosTx};
pub use evm::{EvmItem, EvmLog, EvmRepository, EvmRpc, EvmTransaction};
pub use height::{HeightAdvancer, HeightRepository, HeightSource};
pub use near::{near_source, NearRepository, NearRpc, NearTransaction};
pub use registry::{resolve, resolve_job, SourceKind};
pub use sei::{SeiRepository, SeiRpc, SeiTransaction};
pub use sequence::{SequenceAdvancer, SequenceRepository, SequenceSource, Sequenced};
pub use solana::{SlotAdvancer, SolanaBlock, SolanaRepository, SolanaSource, SolanaTransaction};
pub use sui::{CheckpointAdvancer, SuiCheckpoint, SuiRepository, SuiSource, SuiTransaction, SuiWindow};
