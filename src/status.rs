// Copyright 2020 The miniraft developers. Licensed under Apache-2.0.

use crate::message::HardState;
use crate::progress::Progress;
use crate::raft::{Raft, SoftState, StateRole};
use crate::storage::Storage;
use crate::HashMap;

/// Represents the current status of the raft
#[derive(Default)]
pub struct Status {
    /// The ID of the current node.
    pub id: u64,
    /// The hardstate of the raft, representing voted state.
    pub hs: HardState,
    /// The softstate of the raft, representing proposed state.
    pub ss: SoftState,
    /// The index of the last entry to have been applied.
    pub applied: u64,
    /// The progress towards catching up and applying logs.
    pub progress: HashMap<u64, Progress>,
}

impl Status {
    /// Gets a copy of the current raft status.
    pub fn new<T: Storage>(raft: &Raft<T>) -> Status {
        let mut s = Status {
            id: raft.id,
            ..Default::default()
        };
        s.hs = raft.hard_state();
        s.ss = raft.soft_state();
        s.applied = raft.raft_log.applied();
        if s.ss.raft_state == StateRole::Leader {
            s.progress = raft.prs().iter().map(|(&id, pr)| (id, *pr)).collect();
        }
        s
    }
}
