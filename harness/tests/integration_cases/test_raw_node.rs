// Copyright 2020 The miniraft developers. Licensed under Apache-2.0.

use miniraft::default_logger;
use miniraft::message::*;
use miniraft::raw_node::RawNode;
use miniraft::storage::MemStorage;
use miniraft::*;

use crate::test_util::*;
use slog::Logger;

fn new_raw_node(
    id: u64,
    peers: Vec<u64>,
    election_tick: usize,
    heartbeat_tick: usize,
    storage: MemStorage,
    logger: &Logger,
) -> RawNode<MemStorage> {
    let config = new_test_config(id, election_tick, heartbeat_tick);
    if storage.initial_state().unwrap().initialized() && peers.is_empty() {
        panic!("new_raw_node with empty peers on initialized store");
    }
    if !peers.is_empty() && !storage.initial_state().unwrap().initialized() {
        storage.initialize_with_conf_state(peers);
    }
    RawNode::new(&config, storage, logger).unwrap()
}

// Local messages and responses from unknown peers are refused at the
// RawNode boundary.
#[test]
fn test_raw_node_step() {
    let l = default_logger();
    let mut raw_node = new_raw_node(1, vec![1], 10, 1, new_storage(), &l);
    for msg_type in &[
        MessageType::MsgHup,
        MessageType::MsgBeat,
        MessageType::MsgCheckQuorum,
    ] {
        let mut m = Message::default();
        m.msg_type = *msg_type;
        assert_eq!(raw_node.step(m), Err(Error::StepLocalMsg));
    }

    let mut m = Message::default();
    m.msg_type = MessageType::MsgAppendResponse;
    m.from = 99;
    m.term = 0;
    assert_eq!(raw_node.step(m), Err(Error::StepPeerNotFound));
}

// A single-node cluster drives itself to leadership and commits through the
// ready/advance cycle.
#[test]
fn test_raw_node_campaign_and_propose() {
    let l = default_logger();
    let store = new_storage();
    let mut raw_node = new_raw_node(1, vec![1], 10, 1, store.clone(), &l);

    raw_node.campaign().unwrap();
    let rd = raw_node.ready();
    // the term/vote change must be fsynced
    assert!(rd.must_sync());
    assert_eq!(rd.hs(), Some(&hard_state(1, 1, 1)));
    assert_eq!(rd.entries.len(), 1);
    assert_eq!(rd.entries[0].index, 1);
    assert_eq!(rd.entries[0].term, 1);
    assert!(rd.entries[0].data.is_empty());
    assert_eq!(
        rd.ss().map(|ss| ss.raft_state),
        Some(StateRole::Leader)
    );

    store.wl().append(&rd.entries).unwrap();
    store.wl().set_hardstate(rd.hs().unwrap().clone());
    let committed = rd.committed_entries.as_ref().map_or(0, |v| v.len());
    assert_eq!(committed, 1);
    raw_node.advance(rd);
    assert!(!raw_node.has_ready());

    raw_node.propose(vec![], b"somedata".to_vec()).unwrap();
    assert!(raw_node.has_ready());
    let rd = raw_node.ready();
    assert_eq!(rd.entries.len(), 1);
    assert_eq!(rd.entries[0].data, b"somedata".to_vec());
    assert_eq!(
        rd.committed_entries.as_ref().map_or(0, |v| v.len()),
        1
    );
    store.wl().append(&rd.entries).unwrap();
    if let Some(hs) = rd.hs() {
        store.wl().set_hardstate(hs.clone());
    }
    raw_node.advance(rd);
    assert!(!raw_node.has_ready());
    assert_eq!(raw_node.raft.raft_log.committed, 2);
    assert_eq!(raw_node.raft.raft_log.applied(), 2);
}

#[test]
fn test_raw_node_propose_and_apply_conf_change() {
    let l = default_logger();
    let store = new_storage();
    let mut raw_node = new_raw_node(1, vec![1], 10, 1, store.clone(), &l);
    raw_node.campaign().unwrap();
    let rd = raw_node.ready();
    store.wl().append(&rd.entries).unwrap();
    raw_node.advance(rd);

    let cc = conf_change(ConfChangeType::AddNode, 2);
    raw_node.propose_conf_change(vec![], cc).unwrap();
    let rd = raw_node.ready();
    store.wl().append(&rd.entries).unwrap();

    let committed = rd.committed_entries.as_ref().unwrap().clone();
    assert_eq!(committed.len(), 1);
    assert_eq!(committed[0].entry_type, EntryType::EntryConfChange);
    let cc = ConfChange::from_bytes(&committed[0].data).unwrap();
    let conf_state = raw_node.apply_conf_change(&cc).unwrap();
    assert_eq!(conf_state.voters, vec![1, 2]);
    store.wl().set_conf_state(conf_state);
    raw_node.advance(rd);

    assert!(raw_node.raft.prs().get(2).is_some());
}

// Ready must not surface entries below the configured applied index after a
// restart.
#[test]
fn test_raw_node_restart() {
    let l = default_logger();
    let entries = vec![empty_entry(1, 1), new_entry(1, 2, Some("foo"))];

    let store = new_storage();
    store.initialize_with_conf_state(vec![1, 2]);
    store.wl().set_hardstate(hard_state(1, 1, 0));
    store.wl().append(&entries).unwrap();
    let mut raw_node = new_raw_node(1, vec![1, 2], 10, 1, store, &l);

    let rd = raw_node.ready();
    assert!(rd.entries.is_empty());
    assert!(!rd.must_sync());
    // only the committed prefix is handed out
    assert_eq!(rd.committed_entries, Some(entries[..1].to_vec()));
    raw_node.advance(rd);
    assert!(!raw_node.has_ready());
}

#[test]
fn test_raw_node_restart_from_applied() {
    let l = default_logger();
    let entries = vec![empty_entry(1, 1), new_entry(1, 2, Some("foo"))];

    let store = new_storage();
    store.initialize_with_conf_state(vec![1, 2]);
    store.wl().set_hardstate(hard_state(1, 2, 0));
    store.wl().append(&entries).unwrap();
    let mut config = new_test_config(1, 10, 1);
    config.applied = 1;
    let mut raw_node = RawNode::new(&config, store, &l).unwrap();

    // entry 1 was already applied before the restart
    let rd = raw_node.ready();
    assert_eq!(rd.committed_entries, Some(entries[1..].to_vec()));
    raw_node.advance(rd);
    assert!(!raw_node.has_ready());
}

#[test]
fn test_raw_node_restart_from_snapshot() {
    let l = default_logger();
    let snap = new_snapshot(2, 1, vec![1, 2]);
    let entries = vec![new_entry(1, 3, Some("foo"))];

    let store = new_storage();
    store.wl().apply_snapshot(snap).unwrap();
    store.wl().append(&entries).unwrap();
    store.wl().set_hardstate(hard_state(1, 3, 0));
    let mut raw_node = new_raw_node(1, vec![1, 2], 10, 1, store, &l);

    let rd = raw_node.ready();
    assert!(rd.snapshot().is_empty());
    assert_eq!(rd.committed_entries, Some(entries));
    raw_node.advance(rd);
    assert!(!raw_node.has_ready());
}

// A follower handed a snapshot surfaces it in Ready exactly once.
#[test]
fn test_raw_node_receives_snapshot() {
    let l = default_logger();
    let store = new_storage();
    let mut raw_node = new_raw_node(1, vec![1, 2], 10, 1, store.clone(), &l);

    let snap = new_snapshot(5, 2, vec![1, 2]);
    let mut m = Message::default();
    m.msg_type = MessageType::MsgSnapshot;
    m.from = 2;
    m.to = 1;
    m.term = 2;
    m.snapshot = snap.clone();
    raw_node.step(m).unwrap();

    let mut rd = raw_node.ready();
    assert_eq!(rd.snapshot(), &snap);
    assert!(rd.must_sync());
    // the acknowledgement goes back to the sender
    assert_eq!(rd.messages.len(), 1);
    assert_eq!(rd.messages[0].msg_type, MessageType::MsgAppendResponse);
    let msgs = std::mem::take(&mut rd.messages);
    assert_eq!(msgs[0].index, 5);

    store.wl().apply_snapshot(rd.snapshot().clone()).unwrap();
    raw_node.advance(rd);
    assert!(raw_node.snap().is_none());
    assert_eq!(raw_node.raft.raft_log.committed, 5);
    assert!(!raw_node.has_ready());
}

// Messages the state machine emits while stepping are collected in order.
#[test]
fn test_raw_node_outbox_order() {
    let l = default_logger();
    let store = new_storage();
    let mut raw_node = new_raw_node(1, vec![1, 2, 3], 10, 1, store.clone(), &l);
    raw_node.campaign().unwrap();
    let rd = raw_node.ready();
    let vote_requests: Vec<_> = rd
        .messages
        .iter()
        .filter(|m| m.msg_type == MessageType::MsgRequestVote)
        .collect();
    assert_eq!(vote_requests.len(), 2);
    for m in vote_requests {
        assert_eq!(m.term, 1);
        assert_eq!(m.from, 1);
    }
}
