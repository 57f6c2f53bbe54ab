//! A memory-bounded buffer of unsafe payloads received ahead of the unsafe head.

use std::{collections::BTreeMap, sync::Arc};

use alloy_primitives::B256;
use rollup_protocol::{ExecutionPayloadEnvelope, L2BlockInfo};
use thiserror::Error;

/// The fixed memory cost accounted for every buffered payload.
pub const PAYLOAD_MEM_FIXED_COST: u64 = 800;

/// The memory cost accounted for every transaction on top of its encoded length.
pub const PAYLOAD_TX_MEM_OVERHEAD: u64 = 24;

/// Estimates the memory held by an execution payload envelope.
pub fn payload_mem_size(envelope: &ExecutionPayloadEnvelope) -> u64 {
    envelope.transactions().iter().fold(PAYLOAD_MEM_FIXED_COST, |acc, tx| {
        acc + PAYLOAD_TX_MEM_OVERHEAD + tx.len() as u64
    })
}

/// An error pushing a payload onto the [`UnsafePayloadQueue`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PayloadQueueError {
    /// The exact payload is already buffered.
    #[error("payload {number} ({hash}) is already queued")]
    Duplicate {
        /// The block number.
        number: u64,
        /// The block hash.
        hash: B256,
    },
    /// The payload alone exceeds the memory ceiling.
    #[error("payload of {size} bytes exceeds the queue capacity of {max} bytes")]
    TooLarge {
        /// The estimated size of the payload.
        size: u64,
        /// The memory ceiling of the queue.
        max: u64,
    },
    /// Making room for the payload would evict the payload itself.
    #[error("payload {number} is older than every queued payload and the queue is full")]
    Outdated {
        /// The block number.
        number: u64,
    },
}

/// A buffered payload together with its estimated memory size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    /// The buffered payload.
    pub envelope: Arc<ExecutionPayloadEnvelope>,
    /// The estimated memory held by the payload.
    pub size: u64,
}

/// Buffers unsafe payloads ordered by block number, then block hash.
///
/// The total estimated memory of the held payloads never exceeds the configured
/// ceiling. Once full, the payloads with the lowest block numbers are evicted to
/// make room for newer ones.
#[derive(Debug, Clone)]
pub struct UnsafePayloadQueue {
    entries: BTreeMap<(u64, B256), QueueEntry>,
    mem_size: u64,
    max_mem_size: u64,
}

impl UnsafePayloadQueue {
    /// Creates an empty queue bounded by `max_mem_size` bytes.
    pub const fn new(max_mem_size: u64) -> Self {
        Self { entries: BTreeMap::new(), mem_size: 0, max_mem_size }
    }

    /// Returns the number of buffered payloads.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no payloads are buffered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the estimated memory held by the buffered payloads.
    pub const fn mem_size(&self) -> u64 {
        self.mem_size
    }

    /// Returns the memory ceiling of the queue.
    pub const fn max_mem_size(&self) -> u64 {
        self.max_mem_size
    }

    /// Buffers a payload, evicting the lowest-numbered payloads if the queue is full.
    ///
    /// Nothing changes if the payload is rejected.
    pub fn push(&mut self, envelope: Arc<ExecutionPayloadEnvelope>) -> Result<(), PayloadQueueError> {
        let key = (envelope.block_number(), envelope.block_hash());
        if self.entries.contains_key(&key) {
            return Err(PayloadQueueError::Duplicate { number: key.0, hash: key.1 });
        }

        let size = payload_mem_size(&envelope);
        if size > self.max_mem_size {
            return Err(PayloadQueueError::TooLarge { size, max: self.max_mem_size });
        }

        // Walk the entries that would have to go, lowest first, before touching anything.
        let mut excess = (self.mem_size + size).saturating_sub(self.max_mem_size);
        let mut evicted = Vec::new();
        for (entry_key, entry) in &self.entries {
            if excess == 0 {
                break;
            }
            if key < *entry_key {
                return Err(PayloadQueueError::Outdated { number: key.0 });
            }
            excess = excess.saturating_sub(entry.size);
            evicted.push(*entry_key);
        }

        for entry_key in evicted {
            if let Some(entry) = self.entries.remove(&entry_key) {
                self.mem_size -= entry.size;
                debug!(
                    target: "engine_queue",
                    number = entry_key.0,
                    hash = %entry_key.1,
                    "Evicted unsafe payload from full queue"
                );
            }
        }

        self.mem_size += size;
        self.entries.insert(key, QueueEntry { envelope, size });
        Ok(())
    }

    /// Returns the lowest-numbered payload without removing it.
    pub fn peek(&self) -> Option<&Arc<ExecutionPayloadEnvelope>> {
        self.entries.values().next().map(|entry| &entry.envelope)
    }

    /// Removes and returns the lowest-numbered payload.
    pub fn pop(&mut self) -> Option<Arc<ExecutionPayloadEnvelope>> {
        let (_, entry) = self.entries.pop_first()?;
        self.mem_size -= entry.size;
        Some(entry.envelope)
    }

    /// Pops every payload at the front of the queue that can no longer extend the chain.
    ///
    /// Stops at the first payload that is either the next block on top of the unsafe head
    /// or lies a gap beyond it.
    pub fn drop_inapplicable(&mut self, unsafe_head: &L2BlockInfo, safe_head: &L2BlockInfo) {
        while let Some(next) = self.peek() {
            let number = next.block_number();
            let hash = next.block_hash();

            if next.id() == unsafe_head.id() {
                debug!(target: "engine_queue", number, %hash, "Dropping payload that is the unsafe head");
            } else if number <= safe_head.number() {
                info!(
                    target: "engine_queue",
                    number,
                    %hash,
                    safe = safe_head.number(),
                    "Dropping payload at or below the safe head"
                );
            } else if number <= unsafe_head.number() {
                info!(
                    target: "engine_queue",
                    number,
                    %hash,
                    unsafe_head = unsafe_head.number(),
                    "Dropping payload at or below the unsafe head"
                );
            } else if unsafe_head.number().checked_add(1) == Some(number)
                && !unsafe_head.block_info.is_parent_of(&next.block_info())
            {
                info!(
                    target: "engine_queue",
                    number,
                    %hash,
                    parent = %next.parent_hash(),
                    unsafe_head = %unsafe_head.hash(),
                    "Dropping payload that does not build on the unsafe head"
                );
            } else {
                return;
            }
            self.pop();
        }
    }
}
