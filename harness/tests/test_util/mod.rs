// Copyright 2020 The miniraft developers. Licensed under Apache-2.0.

use miniraft::message::*;
use miniraft::storage::MemStorage;
use miniraft::*;
use miniraft_harness::{Interface, Network};
use slog::Logger;

#[allow(clippy::declare_interior_mutable_const)]
pub const NOP_STEPPER: Option<Interface> = Some(Interface { raft: None });

pub const SOME_DATA: Option<&'static str> = Some("somedata");

pub fn ltoa(raft_log: &RaftLog<MemStorage>) -> String {
    let mut s = format!("committed: {}\n", raft_log.committed);
    s = s + &format!("applied: {}\n", raft_log.applied);
    for (i, e) in raft_log.all_entries().iter().enumerate() {
        s = s + &format!("#{}: {:?}\n", i, e);
    }
    s
}

pub fn new_storage() -> MemStorage {
    MemStorage::new()
}

pub fn new_test_config(id: u64, election_tick: usize, heartbeat_tick: usize) -> Config {
    Config {
        id,
        election_tick,
        heartbeat_tick,
        max_ents_size: NO_LIMIT,
        ..Default::default()
    }
}

pub fn new_test_raft(
    id: u64,
    peers: Vec<u64>,
    election: usize,
    heartbeat: usize,
    storage: MemStorage,
    l: &Logger,
) -> Interface {
    let config = new_test_config(id, election, heartbeat);
    if storage.initial_state().unwrap().initialized() && peers.is_empty() {
        panic!("new_test_raft with empty peers on initialized store");
    }
    if !peers.is_empty() && !storage.initial_state().unwrap().initialized() {
        storage.initialize_with_conf_state(peers);
    }
    new_test_raft_with_config(&config, storage, l)
}

pub fn new_test_raft_with_logs(
    id: u64,
    peers: Vec<u64>,
    election: usize,
    heartbeat: usize,
    storage: MemStorage,
    logs: &[Entry],
    l: &Logger,
) -> Interface {
    let config = new_test_config(id, election, heartbeat);
    if storage.initial_state().unwrap().initialized() && peers.is_empty() {
        panic!("new_test_raft with empty peers on initialized store");
    }
    if !peers.is_empty() && !storage.initial_state().unwrap().initialized() {
        storage.initialize_with_conf_state(peers);
    }
    storage.wl().append(logs).unwrap();
    new_test_raft_with_config(&config, storage, l)
}

pub fn new_test_raft_with_config(config: &Config, storage: MemStorage, l: &Logger) -> Interface {
    Interface::new(Raft::new(config, storage, l).unwrap())
}

pub fn hard_state(term: u64, commit: u64, vote: u64) -> HardState {
    HardState { term, vote, commit }
}

pub fn soft_state(leader_id: u64, raft_state: StateRole) -> SoftState {
    SoftState {
        leader_id,
        raft_state,
    }
}

pub fn new_message_with_entries(from: u64, to: u64, t: MessageType, ents: Vec<Entry>) -> Message {
    let mut m = Message::default();
    m.from = from;
    m.to = to;
    m.msg_type = t;
    if !ents.is_empty() {
        m.entries = ents;
    }
    m
}

pub fn new_message(from: u64, to: u64, t: MessageType, n: usize) -> Message {
    let mut m = new_message_with_entries(from, to, t, vec![]);
    if n > 0 {
        let mut ents = Vec::with_capacity(n);
        for _ in 0..n {
            ents.push(new_entry(0, 0, SOME_DATA));
        }
        m.entries = ents;
    }
    m
}

pub fn new_entry(term: u64, index: u64, data: Option<&str>) -> Entry {
    let mut e = Entry::default();
    e.index = index;
    e.term = term;
    if let Some(d) = data {
        e.data = d.as_bytes().to_vec();
    }
    e
}

pub fn empty_entry(term: u64, index: u64) -> Entry {
    new_entry(term, index, None)
}

pub fn new_snapshot(index: u64, term: u64, voters: Vec<u64>) -> Snapshot {
    let mut s = Snapshot::default();
    s.metadata.index = index;
    s.metadata.term = term;
    s.metadata.conf_state = ConfState::from(voters);
    s
}

pub fn conf_change(ty: ConfChangeType, node_id: u64) -> ConfChange {
    let mut cc = ConfChange::default();
    cc.change_type = ty;
    cc.node_id = node_id;
    cc
}

/// Persist the unstable entries of a raft peer into its storage and release
/// the unstable tail, as an embedder driving the ready cycle would.
pub fn persist(raft: &mut Interface) {
    if raft.raft.is_some() {
        if let Some(snap) = raft.raft_log.unstable.snapshot.clone() {
            let index = snap.metadata.index;
            raft.mut_store().wl().apply_snapshot(snap).expect("");
            raft.raft_log.stable_snap_to(index);
        }
        let unstable: Vec<Entry> = raft.raft_log.unstable_entries().unwrap_or(&[]).to_vec();
        if !unstable.is_empty() {
            let last = unstable.last().unwrap().clone();
            raft.mut_store().wl().append(&unstable).expect("");
            raft.raft_log.stable_to(last.index, last.term);
        }
    }
}

// Sets up a network with the given number of peers, elects peer 1, and
// returns the network.
pub fn new_network_with_elected_leader(size: u64, l: &Logger) -> Network {
    let peers = (0..size).map(|_| None).collect();
    let mut network = Network::new(peers, l);
    network.send(vec![new_message(1, 1, MessageType::MsgHup, 0)]);
    assert_eq!(network.peers[&1].state, StateRole::Leader);
    network
}
