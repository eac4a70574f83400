//! Aptos: Move events read from an event handle by sequence number.
//!
//! The job filter selects the stream: `addresses[0]` is the account that
//! owns the handle and `topics[0]` the `<struct>::<field>` handle path, e.g.
//! `0x5bc1…::state::WormholeMessageHandle` / `event`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use chainpoll_core::types::{Commitment, EventFilter, SequenceWindow};
use chainpoll_rpc::RpcError;

use crate::sequence::{SequenceRepository, Sequenced};

/// An event as returned by `/accounts/{address}/events/{handle}/{field}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AptosEvent {
    /// Ledger version of the emitting transaction.
    #[serde(with = "u64_string")]
    pub version: u64,
    #[serde(with = "u64_string")]
    pub sequence_number: u64,
    #[serde(rename = "type")]
    pub type_tag: String,
    pub data: Value,
}

impl Sequenced for AptosEvent {
    fn sequence(&self) -> u64 {
        self.sequence_number
    }
}

/// Event-handle coordinates taken from a job filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventHandle<'a> {
    pub account: &'a str,
    pub handle: &'a str,
    pub field: &'a str,
}

impl<'a> EventHandle<'a> {
    pub fn from_filter(filter: &'a EventFilter) -> Result<Self, RpcError> {
        let account = filter
            .addresses
            .first()
            .ok_or_else(|| RpcError::other("aptos job needs the handle's account in `addresses`"))?;
        let path = filter
            .topics
            .first()
            .ok_or_else(|| RpcError::other("aptos job needs `<struct>/<field>` in `topics`"))?;
        let (handle, field) = path
            .split_once('/')
            .ok_or_else(|| RpcError::other(format!("malformed event handle `{path}`")))?;
        Ok(Self {
            account,
            handle,
            field,
        })
    }
}

/// Raw Aptos REST reads.
#[async_trait]
pub trait AptosRpc: Send + Sync {
    /// Number of events emitted so far on the handle (its counter).
    async fn event_count(&self, handle: &EventHandle<'_>) -> Result<u64, RpcError>;

    async fn events_by_handle(
        &self,
        handle: &EventHandle<'_>,
        start: u64,
        limit: u64,
    ) -> Result<Vec<AptosEvent>, RpcError>;
}

pub struct AptosRepository<C> {
    rpc: C,
}

impl<C: AptosRpc> AptosRepository<C> {
    pub fn new(rpc: C) -> Self {
        Self { rpc }
    }
}

#[async_trait]
impl<C: AptosRpc> SequenceRepository for AptosRepository<C> {
    type Item = AptosEvent;

    /// Aptos has instant finality; `commitment` is ignored.
    async fn head(&self, _commitment: Commitment, filter: &EventFilter) -> Result<u64, RpcError> {
        let handle = EventHandle::from_filter(filter)?;
        let count = self.rpc.event_count(&handle).await?;
        Ok(count.saturating_sub(1))
    }

    async fn fetch(&self, window: SequenceWindow, filter: &EventFilter) -> Result<Vec<AptosEvent>, RpcError> {
        let handle = EventHandle::from_filter(filter)?;
        self.rpc
            .events_by_handle(&handle, window.from_sequence, window.limit)
            .await
    }
}

/// Aptos encodes u64 as decimal strings.
mod u64_string {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &u64, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&v.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
        String::deserialize(d)?.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_json_with_string_numbers() {
        let ev: AptosEvent = serde_json::from_value(serde_json::json!({
            "version": "1234567",
            "sequence_number": "146040",
            "type": "0x5bc1::state::WormholeMessage",
            "data": { "payload": "0x01" }
        }))
        .unwrap();
        assert_eq!(ev.sequence(), 146_040);
        assert_eq!(ev.version, 1_234_567);
    }

    #[test]
    fn handle_from_filter() {
        let filter = EventFilter::address("0x5bc1").topic("0x5bc1::state::WormholeMessageHandle/event");
        let handle = EventHandle::from_filter(&filter).unwrap();
        assert_eq!(handle.account, "0x5bc1");
        assert_eq!(handle.handle, "0x5bc1::state::WormholeMessageHandle");
        assert_eq!(handle.field, "event");

        assert!(EventHandle::from_filter(&EventFilter::default()).is_err());
        assert!(EventHandle::from_filter(&EventFilter::address("0x1").topic("no-field")).is_err());
    }
}
