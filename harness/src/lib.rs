// Copyright 2020 The miniraft developers. Licensed under Apache-2.0.

/*!

This module contains various testing harness utilities for Raft.

The harness simulates a network of Raft peers in process: messages drained
from one peer's outbox are stepped into the addressed peer, with optional
per-link drop probabilities and message-type filters, until the exchange
quiesces. No actual network calls are made and no clock is involved, which
keeps every exchange deterministic.

*/

#![deny(missing_docs)]

mod interface;
mod network;

pub use self::{interface::Interface, network::Network};
