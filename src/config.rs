// Copyright 2020 The miniraft developers. Licensed under Apache-2.0.

use super::errors::{Error, Result};
use super::util::NO_LIMIT;
use super::INVALID_ID;

/// Config contains the parameters to start a raft.
#[derive(Clone)]
pub struct Config {
    /// The identity of the local raft. It cannot be 0, and must be unique in the group.
    pub id: u64,

    /// The ids of all nodes (including self) in the raft cluster. It should
    /// only be set when starting a new raft cluster. Restarting raft from a
    /// previous configuration requires it to be empty; the membership is read
    /// back from storage instead.
    pub peers: Vec<u64>,

    /// The number of `tick` invocations that must pass between elections.
    /// That is, if a follower does not receive any message from the leader of
    /// the current term before `election_tick` has elapsed, it will become
    /// candidate and start an election. `election_tick` must be greater than
    /// `heartbeat_tick`. We suggest election_tick = 10 * heartbeat_tick to
    /// avoid unnecessary leader switching.
    pub election_tick: usize,

    /// The number of `tick` invocations that must pass between heartbeats.
    /// That is, a leader sends heartbeat messages to maintain its leadership
    /// every `heartbeat_tick` ticks.
    pub heartbeat_tick: usize,

    /// Applied is the last applied index. It should only be set when
    /// restarting raft. raft will not return entries to the application
    /// smaller or equal to `applied`.
    pub applied: u64,

    /// Limit the max aggregate byte size of the entries returned per outgoing
    /// append message. Smaller values lower the recovery cost (initial
    /// probing and message loss during normal operation) at the expense of
    /// replication throughput.
    pub max_ents_size: u64,

    /// Specify if the leader should check quorum activity. The leader steps
    /// down when quorum is not active for an `election_tick` interval.
    pub check_quorum: bool,
}

impl Default for Config {
    fn default() -> Self {
        const HEARTBEAT_TICK: usize = 2;
        Self {
            id: 0,
            peers: vec![],
            election_tick: HEARTBEAT_TICK * 10,
            heartbeat_tick: HEARTBEAT_TICK,
            applied: 0,
            max_ents_size: NO_LIMIT,
            check_quorum: false,
        }
    }
}

impl Config {
    /// Creates a new config.
    pub fn new(id: u64) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    /// Runs validations against the config.
    pub fn validate(&self) -> Result<()> {
        if self.id == INVALID_ID {
            return Err(Error::ConfigInvalid("invalid node id".to_owned()));
        }

        if self.heartbeat_tick == 0 {
            return Err(Error::ConfigInvalid(
                "heartbeat tick must be greater than 0".to_owned(),
            ));
        }

        if self.election_tick <= self.heartbeat_tick {
            return Err(Error::ConfigInvalid(
                "election tick must be greater than heartbeat tick".to_owned(),
            ));
        }

        if self.max_ents_size == 0 {
            return Err(Error::ConfigInvalid(
                "max entries size must be greater than 0".to_owned(),
            ));
        }

        Ok(())
    }
}
