// Copyright 2020 The miniraft developers. Licensed under Apache-2.0.

use miniraft::default_logger;
use miniraft::message::*;
use miniraft::*;
use miniraft_harness::Network;

use crate::test_util::*;

#[test]
fn test_progress_leader() {
    let l = default_logger();
    let mut raft = new_test_raft(1, vec![1, 2], 10, 1, new_storage(), &l);
    raft.become_candidate();
    raft.become_leader();
    // The leader's own progress moves as it appends.
    for i in 0..5u64 {
        assert_eq!(raft.prs().get(1).unwrap().matched, i + 1);
        assert_eq!(raft.prs().get(1).unwrap().next_idx, i + 2);
        raft.step(new_message(1, 1, MessageType::MsgPropose, 1))
            .expect("");
    }
}

#[test]
fn test_single_node_election() {
    let l = default_logger();
    let mut raft = new_test_raft(1, vec![1], 10, 1, new_storage(), &l);
    assert_eq!(raft.state, StateRole::Follower);

    let timeout = raft.election_timeout();
    raft.set_randomized_election_timeout(timeout);
    for _ in 0..timeout {
        raft.tick();
    }

    // A single-node cluster elects itself without any messages and commits
    // the initial empty entry right away.
    assert_eq!(raft.state, StateRole::Leader);
    assert_eq!(raft.term, 1);
    assert_eq!(raft.raft_log.last_index(), 1);
    assert_eq!(raft.raft_log.term(1), Ok(1));
    assert_eq!(raft.raft_log.committed, 1);
    assert!(raft.raft_log.all_entries()[0].data.is_empty());
    assert_eq!(raft.soft_state(), soft_state(1, StateRole::Leader));
}

#[test]
fn test_leader_election() {
    let l = default_logger();
    let mut tests = vec![
        (
            Network::new(vec![None, None, None], &l),
            StateRole::Leader,
            1,
        ),
        (
            Network::new(vec![None, None, NOP_STEPPER], &l),
            StateRole::Leader,
            1,
        ),
        // Quorum cannot be reached with two of three peers down.
        (
            Network::new(vec![None, NOP_STEPPER, NOP_STEPPER], &l),
            StateRole::Candidate,
            1,
        ),
        (
            Network::new(vec![None, NOP_STEPPER, NOP_STEPPER, None], &l),
            StateRole::Candidate,
            1,
        ),
        (
            Network::new(vec![None, NOP_STEPPER, NOP_STEPPER, None, None], &l),
            StateRole::Leader,
            1,
        ),
    ];

    for (i, (network, state, term)) in tests.iter_mut().enumerate() {
        network.send(vec![new_message(1, 1, MessageType::MsgHup, 0)]);
        let raft = &network.peers[&1];
        if raft.state != *state {
            panic!("#{}: state = {:?}, want {:?}", i, raft.state, state);
        }
        if raft.term != *term {
            panic!("#{}: term = {}, want {}", i, raft.term, term);
        }
    }
}

#[test]
fn test_leader_cycle() {
    // Each node can campaign and be elected in turn, overwriting the
    // previous leader.
    let l = default_logger();
    let mut network = Network::new(vec![None, None, None], &l);
    for campaigner_id in 1..=3 {
        network.send(vec![new_message(
            campaigner_id,
            campaigner_id,
            MessageType::MsgHup,
            0,
        )]);

        for sm in network.peers.values() {
            if sm.id == campaigner_id {
                assert_eq!(sm.state, StateRole::Leader);
            } else {
                assert_eq!(sm.state, StateRole::Follower);
            }
        }
    }
}

#[test]
fn test_log_replication_and_commit() {
    let l = default_logger();
    let mut network = Network::new(vec![None, None, None], &l);
    network.send(vec![new_message(1, 1, MessageType::MsgHup, 0)]);
    assert_eq!(network.peers[&1].state, StateRole::Leader);
    // The initial empty entry of term 1 is committed everywhere.
    for sm in network.peers.values() {
        assert_eq!(sm.raft_log.committed, 1);
    }

    network.send(vec![new_message(1, 1, MessageType::MsgPropose, 1)]);
    for sm in network.peers.values() {
        assert_eq!(sm.raft_log.committed, 2);
        assert_eq!(sm.raft_log.last_index(), 2);
        let ents = sm.raft_log.all_entries();
        assert_eq!(ents[1].data, b"somedata".to_vec());
    }

    // A redundant acknowledgement does not move anything backwards.
    let leader_term = network.peers[&1].term;
    let mut m = new_message(3, 1, MessageType::MsgAppendResponse, 0);
    m.term = leader_term;
    m.index = 2;
    network.send(vec![m]);
    assert_eq!(network.peers[&1].raft_log.committed, 2);
}

#[test]
fn test_dueling_candidates() {
    let l = default_logger();
    let a = new_test_raft(1, vec![1, 2, 3], 10, 1, new_storage(), &l);
    let b = new_test_raft(2, vec![1, 2, 3], 10, 1, new_storage(), &l);
    let c = new_test_raft(3, vec![1, 2, 3], 10, 1, new_storage(), &l);

    let mut nt = Network::new(vec![Some(a), Some(b), Some(c)], &l);
    nt.cut(1, 3);

    nt.send(vec![new_message(1, 1, MessageType::MsgHup, 0)]);
    nt.send(vec![new_message(3, 3, MessageType::MsgHup, 0)]);

    // 1 becomes leader since it receives votes from 1 and 2.
    assert_eq!(nt.peers[&1].state, StateRole::Leader);
    // 3 stays as candidate since it receives a vote from 3 and a rejection from 2.
    assert_eq!(nt.peers[&3].state, StateRole::Candidate);

    nt.recover();

    // Candidate 3 now increases its term and tries to vote again. We expect
    // it to disrupt the leader (1's term is lower) but not to win: 1's log is
    // longer, so 3 cannot collect a quorum.
    nt.send(vec![new_message(3, 3, MessageType::MsgHup, 0)]);

    assert_eq!(nt.peers[&1].state, StateRole::Follower);
    assert_eq!(nt.peers[&3].state, StateRole::Follower);
    assert_eq!(nt.peers[&1].term, 2);
    assert_eq!(nt.peers[&3].term, 2);
    // 1 keeps its entry from term 1; 3 never got one.
    assert_eq!(nt.peers[&1].raft_log.last_index(), 1);
    assert_eq!(nt.peers[&3].raft_log.last_index(), 0);
}

#[test]
fn test_candidate_concede() {
    let l = default_logger();
    let mut tt = Network::new(vec![None, None, None], &l);
    tt.isolate(1);

    tt.send(vec![new_message(1, 1, MessageType::MsgHup, 0)]);
    tt.send(vec![new_message(3, 3, MessageType::MsgHup, 0)]);

    // heal the partition
    tt.recover();
    // send heartbeat; reset wait
    tt.send(vec![new_message(3, 3, MessageType::MsgBeat, 0)]);

    // disrupt the leader so that the stuck peer is freed
    let data = "force follower";
    let mut m = new_message(3, 3, MessageType::MsgPropose, 0);
    m.entries = vec![new_entry(0, 0, Some(data))];
    tt.send(vec![m]);

    assert_eq!(tt.peers[&1].state, StateRole::Follower);
    assert_eq!(tt.peers[&1].term, tt.peers[&3].term);
    for p in tt.peers.values() {
        assert_eq!(p.raft_log.last_index(), 2);
        assert_eq!(p.raft_log.committed, 2);
    }
}

#[test]
fn test_old_messages() {
    let l = default_logger();
    let mut tt = Network::new(vec![None, None, None], &l);
    // make 0 leader @ term 3
    tt.send(vec![new_message(1, 1, MessageType::MsgHup, 0)]);
    tt.send(vec![new_message(2, 2, MessageType::MsgHup, 0)]);
    tt.send(vec![new_message(1, 1, MessageType::MsgHup, 0)]);
    assert_eq!(tt.peers[&1].state, StateRole::Leader);
    assert_eq!(tt.peers[&1].term, 3);

    // pretend we're an old leader trying to make progress; this entry is expected to be ignored.
    let mut m = new_message(2, 1, MessageType::MsgAppend, 0);
    m.term = 2;
    m.entries = vec![empty_entry(2, 3)];
    tt.send(vec![m]);

    // commit a new entry
    tt.send(vec![new_message(1, 1, MessageType::MsgPropose, 1)]);

    let wlog = ltoa(&tt.peers[&1].raft_log);
    for p in tt.peers.values() {
        let raft = p.raft.as_ref().unwrap();
        assert_eq!(raft.raft_log.committed, 4);
        assert_eq!(ltoa(&raft.raft_log), wlog);
        let ents = raft.raft_log.all_entries();
        assert_eq!(ents.len(), 4);
        assert_eq!(ents[3].data, b"somedata".to_vec());
    }
}

#[test]
fn test_proposal() {
    let l = default_logger();
    let mut tests = vec![
        (Network::new(vec![None, None, None], &l), true),
        (Network::new(vec![None, None, NOP_STEPPER], &l), true),
        (Network::new(vec![None, NOP_STEPPER, NOP_STEPPER], &l), false),
        (
            Network::new(vec![None, NOP_STEPPER, NOP_STEPPER, None], &l),
            false,
        ),
        (
            Network::new(vec![None, NOP_STEPPER, NOP_STEPPER, None, None], &l),
            true,
        ),
    ];

    for (j, (nw, success)) in tests.iter_mut().enumerate() {
        // promote 1 to become leader
        nw.send(vec![new_message(1, 1, MessageType::MsgHup, 0)]);
        nw.send(vec![new_message(1, 1, MessageType::MsgPropose, 1)]);

        // committed index depends on whether the proposal could gather a quorum
        let want_log = if *success { 2 } else { 0 };
        for p in nw.peers.values() {
            if let Some(raft) = &p.raft {
                assert_eq!(raft.raft_log.committed, want_log, "#{}", j);
            }
        }
        let term = if *success { 1 } else { nw.peers[&1].term };
        assert_eq!(nw.peers[&1].term, term, "#{}", j);
    }
}

#[test]
fn test_proposal_by_proxy() {
    let l = default_logger();
    let mut tests = vec![
        Network::new(vec![None, None, None], &l),
        Network::new(vec![None, None, NOP_STEPPER], &l),
    ];
    for (j, tt) in tests.iter_mut().enumerate() {
        // promote 1 the leader
        tt.send(vec![new_message(1, 1, MessageType::MsgHup, 0)]);

        // propose via follower 2
        tt.send(vec![new_message(2, 2, MessageType::MsgPropose, 1)]);

        for p in tt.peers.values() {
            if let Some(raft) = &p.raft {
                assert_eq!(raft.raft_log.committed, 2, "#{}", j);
                let ents = raft.raft_log.all_entries();
                assert_eq!(ents[1].data, b"somedata".to_vec(), "#{}", j);
            }
        }
        assert_eq!(tt.peers[&1].term, 1, "#{}", j);
    }
}

#[test]
fn test_proposal_dropped_without_leader() {
    let l = default_logger();
    let mut raft = new_test_raft(1, vec![1, 2, 3], 10, 1, new_storage(), &l);
    assert_eq!(
        raft.step(new_message(1, 1, MessageType::MsgPropose, 1)),
        Err(Error::ProposalDropped)
    );

    // Candidates drop proposals too.
    raft.become_candidate();
    assert_eq!(
        raft.step(new_message(1, 1, MessageType::MsgPropose, 1)),
        Err(Error::ProposalDropped)
    );
}

#[test]
fn test_handle_msg_append() {
    let l = default_logger();
    let nm = |term, log_term, index, commit, ents: Option<Vec<(u64, u64)>>| {
        let mut m = Message::default();
        m.msg_type = MessageType::MsgAppend;
        m.term = term;
        m.log_term = log_term;
        m.index = index;
        m.commit = commit;
        if let Some(ets) = ents {
            m.entries = ets.iter().map(|&(i, t)| empty_entry(t, i)).collect();
        }
        m
    };

    // msg, w_index, w_commit, w_reject
    let tests = vec![
        // Ensure 1: previous log entry mismatch or missing
        (nm(2, 3, 2, 3, None), 2, 0, true),
        (nm(2, 3, 3, 3, None), 2, 0, true),
        // Ensure 2: accept and commit
        (nm(2, 1, 1, 1, None), 2, 1, false),
        (nm(2, 0, 0, 1, Some(vec![(1, 2)])), 1, 1, false),
        (nm(2, 2, 2, 3, Some(vec![(3, 2), (4, 2)])), 4, 3, false),
        (nm(2, 2, 2, 4, Some(vec![(3, 2)])), 3, 3, false),
        (nm(2, 1, 1, 4, Some(vec![(2, 2)])), 2, 2, false),
        // Ensure 3: duplicate or overlapping entries
        (nm(2, 2, 2, 2, None), 2, 2, false),
        (nm(2, 1, 1, 1, Some(vec![(2, 2)])), 2, 1, false),
    ];

    for (j, (m, w_index, w_commit, w_reject)) in tests.into_iter().enumerate() {
        let store = new_storage();
        let mut sm = new_test_raft_with_logs(
            1,
            vec![1],
            10,
            1,
            store,
            &[empty_entry(1, 1), empty_entry(2, 2)],
            &l,
        );
        sm.become_follower(2, INVALID_ID);

        sm.handle_append_entries(&m);
        if sm.raft_log.last_index() != w_index {
            panic!(
                "#{}: last_index = {}, want {}",
                j,
                sm.raft_log.last_index(),
                w_index
            );
        }
        if sm.raft_log.committed != w_commit {
            panic!(
                "#{}: committed = {}, want {}",
                j, sm.raft_log.committed, w_commit
            );
        }
        let msgs = sm.read_messages();
        assert_eq!(msgs.len(), 1, "#{}", j);
        assert_eq!(msgs[0].reject, w_reject, "#{}", j);
        if w_reject {
            assert_eq!(msgs[0].reject_hint, sm.raft_log.last_index(), "#{}", j);
        }
    }
}

// A follower whose log diverges truncates its uncommitted suffix when the new
// leader's append conflicts with it.
#[test]
fn test_log_conflict_on_new_leader() {
    let l = default_logger();
    let store = new_storage();
    let mut sm = new_test_raft_with_logs(
        1,
        vec![1, 2],
        10,
        1,
        store,
        &[empty_entry(1, 1), empty_entry(1, 2), empty_entry(1, 3)],
        &l,
    );
    sm.become_follower(2, 2);

    let mut m = Message::default();
    m.msg_type = MessageType::MsgAppend;
    m.from = 2;
    m.term = 2;
    m.index = 1;
    m.log_term = 1;
    m.entries = vec![empty_entry(2, 2)];
    sm.step(m).expect("");

    assert_eq!(sm.raft_log.last_index(), 2);
    assert_eq!(sm.raft_log.term(2), Ok(2));
    let msgs = sm.read_messages();
    assert_eq!(msgs.len(), 1);
    assert_eq!(msgs[0].msg_type, MessageType::MsgAppendResponse);
    assert!(!msgs[0].reject);
    assert_eq!(msgs[0].index, 2);
}

#[test]
fn test_handle_heartbeat() {
    let l = default_logger();
    let commit = 2u64;
    let nm = |from, to, term, commit| {
        let mut m = new_message(from, to, MessageType::MsgHeartbeat, 0);
        m.term = term;
        m.commit = commit;
        m
    };
    let mut tests = vec![
        (nm(2, 1, 2, commit + 1), commit + 1),
        // The commit cursor never moves backwards.
        (nm(2, 1, 2, commit - 1), commit),
    ];
    for (i, (m, w_commit)) in tests.drain(..).enumerate() {
        let store = new_storage();
        let mut sm = new_test_raft_with_logs(
            1,
            vec![1, 2],
            10,
            1,
            store,
            &[empty_entry(1, 1), empty_entry(2, 2), empty_entry(3, 3)],
            &l,
        );
        sm.become_follower(2, 2);
        sm.raft_log.commit_to(commit);
        sm.step(m).expect("");
        if sm.raft_log.committed != w_commit {
            panic!(
                "#{}: committed = {}, want {}",
                i, sm.raft_log.committed, w_commit
            );
        }
        let msgs = sm.read_messages();
        assert_eq!(msgs.len(), 1, "#{}", i);
        assert_eq!(msgs[0].msg_type, MessageType::MsgHeartbeatResponse, "#{}", i);
    }
}

#[test]
fn test_handle_heartbeat_resp() {
    let l = default_logger();
    let store = new_storage();
    let mut sm = new_test_raft(1, vec![1, 2], 10, 1, store, &l);
    sm.become_candidate();
    sm.become_leader();
    sm.read_messages();

    // A heartbeat response from a lagging follower triggers an append.
    let mut m = new_message(2, 1, MessageType::MsgHeartbeatResponse, 0);
    m.term = sm.term;
    sm.step(m.clone()).expect("");
    let msgs = sm.read_messages();
    assert_eq!(msgs.len(), 1);
    assert_eq!(msgs[0].msg_type, MessageType::MsgAppend);

    // Once the follower caught up, heartbeat responses are quiet.
    let last_index = sm.raft_log.last_index();
    sm.mut_prs().get_mut(2).unwrap().maybe_update(last_index);
    sm.step(m).expect("");
    assert!(sm.read_messages().is_empty());
}

// A stale leader learns about the new term through the response to its own
// append and steps down.
#[test]
fn test_stale_leader_steps_down() {
    let l = default_logger();
    let mut config = new_test_config(1, 10, 1);
    config.check_quorum = true;
    let storage = new_storage();
    storage.initialize_with_conf_state(vec![1, 2]);
    let mut leader = new_test_raft_with_config(&config, storage, &l);
    leader.become_candidate();
    leader.become_leader();
    assert_eq!(leader.term, 1);
    leader.read_messages();

    let mut config = new_test_config(2, 10, 1);
    config.check_quorum = true;
    let storage = new_storage();
    storage.initialize_with_conf_state(vec![1, 2]);
    let mut follower = new_test_raft_with_config(&config, storage, &l);
    // The follower has moved on to term 4 under a different leader.
    follower.load_state(&hard_state(4, 0, 0));
    follower.become_follower(4, INVALID_ID);

    // The stale append is answered with an empty response at term 4...
    let mut m = new_message(1, 2, MessageType::MsgAppend, 0);
    m.term = 1;
    m.log_term = 0;
    m.index = 0;
    follower.step(m).expect("");
    let msgs = follower.read_messages();
    assert_eq!(msgs.len(), 1);
    assert_eq!(msgs[0].msg_type, MessageType::MsgAppendResponse);
    assert_eq!(msgs[0].term, 4);

    // ...which forces the old leader down.
    leader.step(msgs.into_iter().next().unwrap()).expect("");
    assert_eq!(leader.state, StateRole::Follower);
    assert_eq!(leader.term, 4);
}

#[test]
fn test_candidate_split_vote() {
    let l = default_logger();
    // Five nodes; three of them are down, so two simultaneous candidacies
    // cannot be resolved.
    let mut nt = Network::new(
        vec![None, None, NOP_STEPPER, NOP_STEPPER, NOP_STEPPER],
        &l,
    );
    nt.peers
        .get_mut(&1)
        .unwrap()
        .step(new_message(1, 1, MessageType::MsgHup, 0))
        .expect("");
    nt.peers
        .get_mut(&2)
        .unwrap()
        .step(new_message(2, 2, MessageType::MsgHup, 0))
        .expect("");

    let msgs = nt.read_messages();
    nt.send(msgs);

    // Both voted for themselves and rejected the other; no leader emerges.
    for id in 1..=2u64 {
        assert_eq!(nt.peers[&id].state, StateRole::Candidate);
        assert_eq!(nt.peers[&id].term, 1);
    }

    // On the next timeout both restart the election at the next term with a
    // fresh randomized timeout, so a future round can break the tie.
    for id in 1..=2u64 {
        let p = nt.peers.get_mut(&id).unwrap();
        let timeout = p.election_timeout();
        p.set_randomized_election_timeout(timeout);
        for _ in 0..timeout {
            p.tick();
        }
        assert_eq!(p.state, StateRole::Candidate);
        assert_eq!(p.term, 2);
        let randomized = p.randomized_election_timeout();
        assert!(timeout <= randomized && randomized < 2 * timeout);
    }
}

#[test]
fn test_leader_only_commits_log_from_current_term() {
    let l = default_logger();
    let ents = vec![empty_entry(1, 1), empty_entry(2, 2)];
    // (index, wcommit)
    let mut tests = vec![
        // do not commit log entries from previous terms
        (1, 0),
        (2, 0),
        // commit log entry from the current term, which by the matching
        // property commits everything before it
        (3, 3),
    ];
    for (i, (index, wcommit)) in tests.drain(..).enumerate() {
        let store = new_storage();
        store.initialize_with_conf_state(vec![1, 2]);
        store.wl().append(&ents).unwrap();
        let mut r = {
            let config = new_test_config(1, 10, 1);
            let mut sm = new_test_raft_with_config(&config, store, &l);
            sm.load_state(&hard_state(2, 0, 0));
            sm
        };
        // become leader at term 3
        r.become_candidate();
        r.become_leader();
        r.read_messages();

        let mut m = new_message(2, 1, MessageType::MsgAppendResponse, 0);
        m.term = r.term;
        m.index = index;
        r.step(m).expect("");
        if r.raft_log.committed != wcommit {
            panic!("#{}: committed = {}, want {}", i, r.raft_log.committed, wcommit);
        }
    }
}

#[test]
fn test_reject_backs_off_next_index() {
    let l = default_logger();
    // Leader at term 2 with entries up to index 3; follower's log is shorter.
    let store = new_storage();
    store.initialize_with_conf_state(vec![1, 2]);
    store
        .wl()
        .append(&[empty_entry(1, 1), empty_entry(1, 2), empty_entry(1, 3)])
        .unwrap();
    let config = new_test_config(1, 10, 1);
    let mut leader = new_test_raft_with_config(&config, store, &l);
    leader.load_state(&hard_state(1, 0, 0));
    leader.become_candidate();
    leader.become_leader();
    leader.read_messages();

    // Probe 2 at the leader's last index.
    let mut reply = new_message(2, 1, MessageType::MsgAppendResponse, 0);
    reply.term = leader.term;
    reply.reject = true;
    reply.index = leader.prs().get(2).unwrap().next_idx - 1;
    reply.reject_hint = 1; // the follower only has one entry

    leader.step(reply).expect("");
    // next_idx snaps to reject_hint + 1 and a resend goes out immediately.
    assert_eq!(leader.prs().get(2).unwrap().next_idx, 2);
    let msgs = leader.read_messages();
    assert_eq!(msgs.len(), 1);
    assert_eq!(msgs[0].msg_type, MessageType::MsgAppend);
    assert_eq!(msgs[0].index, 1);
}

#[test]
fn test_leader_steps_down_when_quorum_inactive() {
    let l = default_logger();
    let mut config = new_test_config(1, 10, 1);
    config.check_quorum = true;
    let storage = new_storage();
    storage.initialize_with_conf_state(vec![1, 2, 3]);
    let mut sm = new_test_raft_with_config(&config, storage, &l);
    sm.become_candidate();
    sm.become_leader();

    for _ in 0..=sm.election_timeout() {
        sm.tick();
    }
    assert_eq!(sm.state, StateRole::Follower);
}

#[test]
fn test_leader_stays_with_active_quorum() {
    let l = default_logger();
    let mut config = new_test_config(1, 10, 1);
    config.check_quorum = true;
    let storage = new_storage();
    storage.initialize_with_conf_state(vec![1, 2, 3]);
    let mut sm = new_test_raft_with_config(&config, storage, &l);
    sm.become_candidate();
    sm.become_leader();

    let election_timeout = sm.election_timeout();
    for _ in 0..election_timeout {
        // Peer 2 keeps acknowledging the leader.
        let mut m = new_message(2, 1, MessageType::MsgAppendResponse, 0);
        m.term = sm.term;
        m.index = sm.raft_log.last_index();
        sm.step(m).expect("");
        sm.tick();
    }
    assert_eq!(sm.state, StateRole::Leader);
}

#[test]
fn test_vote_ignored_within_lease() {
    let l = default_logger();
    let mut config = new_test_config(1, 10, 1);
    config.check_quorum = true;
    let storage = new_storage();
    storage.initialize_with_conf_state(vec![1, 2, 3]);
    let mut sm = new_test_raft_with_config(&config, storage, &l);
    sm.become_follower(1, 2);

    // A vote request arriving while we recently heard from a leader is ignored.
    let mut m = new_message(3, 1, MessageType::MsgRequestVote, 0);
    m.term = 2;
    m.log_term = 2;
    m.index = 10;
    sm.step(m).expect("");
    assert!(sm.read_messages().is_empty());
    assert_eq!(sm.term, 1);

    // Unless the campaign was started by a leadership transfer.
    let mut m = new_message(3, 1, MessageType::MsgRequestVote, 0);
    m.term = 2;
    m.log_term = 2;
    m.index = 10;
    m.context = b"CampaignTransfer".to_vec();
    sm.step(m).expect("");
    let msgs = sm.read_messages();
    assert_eq!(msgs.len(), 1);
    assert_eq!(msgs[0].msg_type, MessageType::MsgRequestVoteResponse);
    assert!(!msgs[0].reject);
    assert_eq!(sm.term, 2);
}

#[test]
fn test_leader_transfer_to_up_to_date_node() {
    let l = default_logger();
    let mut nt = new_network_with_elected_leader(3, &l);

    nt.send(vec![new_message(3, 1, MessageType::MsgTransferLeader, 0)]);

    assert_eq!(nt.peers[&1].state, StateRole::Follower);
    assert_eq!(nt.peers[&3].state, StateRole::Leader);
    assert_eq!(nt.peers[&3].term, 2);
}

#[test]
fn test_leader_transfer_to_slow_follower() {
    let l = default_logger();
    let mut nt = new_network_with_elected_leader(3, &l);

    nt.isolate(3);
    nt.send(vec![new_message(1, 1, MessageType::MsgPropose, 1)]);
    nt.recover();
    assert_eq!(nt.peers[&1].prs().get(3).unwrap().matched, 1);

    // The leader first brings 3 up to date, then hands off.
    nt.send(vec![new_message(3, 1, MessageType::MsgTransferLeader, 0)]);
    assert_eq!(nt.peers[&3].state, StateRole::Leader);
    assert_eq!(nt.peers[&1].state, StateRole::Follower);
    assert_eq!(nt.peers[&3].raft_log.last_index(), 3);
}

#[test]
fn test_leader_transfer_to_self_is_ignored() {
    let l = default_logger();
    let mut nt = new_network_with_elected_leader(3, &l);

    nt.send(vec![new_message(1, 1, MessageType::MsgTransferLeader, 0)]);
    assert_eq!(nt.peers[&1].state, StateRole::Leader);
    assert_eq!(nt.peers[&1].lead_transferee, None);
}

#[test]
fn test_leader_transfer_to_non_member_is_ignored() {
    let l = default_logger();
    let mut nt = new_network_with_elected_leader(3, &l);

    let p = nt.peers.get_mut(&1).unwrap();
    p.step(new_message(4, 1, MessageType::MsgTransferLeader, 0))
        .expect("");
    assert_eq!(p.state, StateRole::Leader);
    assert_eq!(p.lead_transferee, None);
}

#[test]
fn test_leader_transfer_times_out() {
    let l = default_logger();
    let mut nt = new_network_with_elected_leader(3, &l);

    nt.isolate(3);
    nt.send(vec![new_message(3, 1, MessageType::MsgTransferLeader, 0)]);
    assert_eq!(nt.peers[&1].lead_transferee, Some(3));

    // Proposals are dropped while the transfer is in flight.
    assert_eq!(
        nt.peers
            .get_mut(&1)
            .unwrap()
            .step(new_message(1, 1, MessageType::MsgPropose, 1)),
        Err(Error::ProposalDropped)
    );

    // The transfer is abandoned after an election timeout.
    let election_timeout = nt.peers[&1].election_timeout();
    for _ in 0..election_timeout {
        nt.peers.get_mut(&1).unwrap().tick();
    }
    assert_eq!(nt.peers[&1].lead_transferee, None);
    assert_eq!(nt.peers[&1].state, StateRole::Leader);
}

#[test]
fn test_leader_transfer_aborts_when_target_removed() {
    let l = default_logger();
    let mut nt = new_network_with_elected_leader(3, &l);

    nt.isolate(3);
    nt.send(vec![new_message(3, 1, MessageType::MsgTransferLeader, 0)]);
    assert_eq!(nt.peers[&1].lead_transferee, Some(3));

    nt.peers.get_mut(&1).unwrap().remove_node(3);
    assert_eq!(nt.peers[&1].lead_transferee, None);
    assert_eq!(nt.peers[&1].state, StateRole::Leader);
}

#[test]
fn test_transferred_candidate_ignores_stale_timeout() {
    let l = default_logger();
    let mut nt = new_network_with_elected_leader(3, &l);
    // A candidate ignores MsgTimeoutNow; only followers campaign on it.
    nt.isolate(2);
    let p = nt.peers.get_mut(&2).unwrap();
    let timeout = p.election_timeout();
    p.set_randomized_election_timeout(timeout);
    for _ in 0..timeout {
        p.tick();
    }
    assert_eq!(p.state, StateRole::Candidate);
    let term = p.term;
    let mut m = new_message(1, 2, MessageType::MsgTimeoutNow, 0);
    m.term = term;
    p.step(m).expect("");
    assert_eq!(p.state, StateRole::Candidate);
    assert_eq!(p.term, term);
}
