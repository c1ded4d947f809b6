// Copyright 2020 The miniraft developers. Licensed under Apache-2.0.

//! The plain-data types exchanged between peers and with the embedder.
//!
//! These structs are deliberately free of any wire framing; serialization for
//! transport is the embedder's concern. They derive `serde` traits so that an
//! embedder can pick its own codec, and conf-change payloads inside entries
//! are encoded with `bincode`.

use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

/// The kind of a log entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryType {
    /// An opaque command for the embedder's state machine.
    EntryNormal,
    /// A membership change; `Entry::data` holds an encoded [`ConfChange`].
    EntryConfChange,
}

impl Default for EntryType {
    fn default() -> Self {
        EntryType::EntryNormal
    }
}

/// A single record in the replicated log.
///
/// Within one log, `index` is dense and strictly increasing and `term` is
/// non-decreasing.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// Distinguishes normal commands from membership changes.
    pub entry_type: EntryType,
    /// The election term the entry was proposed in.
    pub term: u64,
    /// The 1-based position of the entry in the log.
    pub index: u64,
    /// The opaque command payload.
    pub data: Vec<u8>,
    /// Opaque context the proposer wants echoed back on apply.
    pub context: Vec<u8>,
}

/// The message types understood by [`Raft::step`](crate::Raft::step).
///
/// `MsgHup`, `MsgBeat`, `MsgPropose` and `MsgCheckQuorum` are local messages:
/// they carry term 0 and never travel between peers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    /// Local: start a campaign.
    MsgHup,
    /// Local: leader should broadcast heartbeats.
    MsgBeat,
    /// Local: append the carried entries to the log.
    MsgPropose,
    /// Leader -> follower log replication.
    MsgAppend,
    /// Follower -> leader replication ack or rejection.
    MsgAppendResponse,
    /// Candidate -> peer vote request.
    MsgRequestVote,
    /// Peer -> candidate vote grant or rejection.
    MsgRequestVoteResponse,
    /// Leader -> lagging follower snapshot installation.
    MsgSnapshot,
    /// Leader -> follower liveness probe carrying the commit index.
    MsgHeartbeat,
    /// Follower -> leader heartbeat ack.
    MsgHeartbeatResponse,
    /// Local: leader should verify a quorum is still active.
    MsgCheckQuorum,
    /// Ask the leader to hand leadership to the sender.
    MsgTransferLeader,
    /// Leader -> transfer target: campaign immediately.
    MsgTimeoutNow,
}

impl Default for MessageType {
    fn default() -> Self {
        MessageType::MsgHup
    }
}

/// The envelope stepped through the state machine and drained from its outbox.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// What this message means.
    pub msg_type: MessageType,
    /// Destination peer id.
    pub to: u64,
    /// Source peer id; filled in on send.
    pub from: u64,
    /// Sender term. Zero on local messages and proposals.
    pub term: u64,
    /// Term of the entry at `index` (appends and vote requests).
    pub log_term: u64,
    /// Log position this message refers to.
    pub index: u64,
    /// Entries to append.
    pub entries: Vec<Entry>,
    /// Sender commit index.
    pub commit: u64,
    /// Snapshot payload for `MsgSnapshot`.
    pub snapshot: Snapshot,
    /// Set on responses that refuse the request.
    pub reject: bool,
    /// On append rejection, the rejecter's last index, to speed up backoff.
    pub reject_hint: u64,
    /// Opaque context, e.g. the campaign type on vote requests.
    pub context: Vec<u8>,
}

/// The state a replica must persist before sending any message referencing it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HardState {
    /// The current election term.
    pub term: u64,
    /// The peer this replica voted for in `term`, or 0.
    pub vote: u64,
    /// The highest index known committed.
    pub commit: u64,
}

/// The membership of the group as an exact list of voter ids.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfState {
    /// Ids of all voting members.
    pub voters: Vec<u64>,
}

impl From<Vec<u64>> for ConfState {
    fn from(voters: Vec<u64>) -> ConfState {
        ConfState { voters }
    }
}

/// Identifies the log prefix a snapshot replaces.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    /// The membership at `index`.
    pub conf_state: ConfState,
    /// The last log index covered by the snapshot.
    pub index: u64,
    /// The term of the entry at `index`.
    pub term: u64,
}

/// A point-in-time image of the state machine up to `metadata.index`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// The embedder-defined state machine image.
    pub data: Vec<u8>,
    /// Index, term and membership of the covered prefix.
    pub metadata: SnapshotMetadata,
}

impl Snapshot {
    /// A snapshot that covers nothing is treated as absent.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.metadata.index == 0
    }
}

/// The two single-server membership operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfChangeType {
    /// Add `node_id` as a voter.
    AddNode,
    /// Remove `node_id` from the group.
    RemoveNode,
}

impl Default for ConfChangeType {
    fn default() -> Self {
        ConfChangeType::AddNode
    }
}

/// A single-server membership change, carried inside an
/// [`EntryType::EntryConfChange`] entry.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfChange {
    /// Whether the node is added or removed.
    pub change_type: ConfChangeType,
    /// The id of the affected node.
    pub node_id: u64,
    /// Opaque embedder context.
    pub context: Vec<u8>,
}

impl ConfChange {
    /// Encodes the change for embedding into `Entry::data`.
    pub fn write_to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| Error::Codec(e.to_string()))
    }

    /// Decodes a change out of `Entry::data`.
    pub fn from_bytes(data: &[u8]) -> Result<ConfChange> {
        bincode::deserialize(data).map_err(|e| Error::Codec(e.to_string()))
    }
}
