// Copyright 2020 The miniraft developers. Licensed under Apache-2.0.

use std::cmp;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use slog::Logger;

use crate::config::Config;
use crate::errors::{Error, Result, StorageError};
use crate::message::{
    Entry, EntryType, HardState, Message, MessageType, Snapshot,
};
use crate::progress::{CandidacyStatus, Progress, ProgressSet};
use crate::raft_log::RaftLog;
use crate::storage::Storage;
use crate::HashMap;

/// CAMPAIGN_ELECTION represents a normal (time-based) election.
const CAMPAIGN_ELECTION: &[u8] = b"CampaignElection";
/// CAMPAIGN_TRANSFER represents the type of leader transfer.
const CAMPAIGN_TRANSFER: &[u8] = b"CampaignTransfer";

/// The role of the node.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum StateRole {
    /// The node is a follower of the leader.
    Follower,
    /// The node could become a leader.
    Candidate,
    /// The node is a leader.
    Leader,
}

impl Default for StateRole {
    fn default() -> StateRole {
        StateRole::Follower
    }
}

/// A constant represents invalid id of raft.
pub const INVALID_ID: u64 = 0;
/// A constant represents invalid index of raft log.
pub const INVALID_INDEX: u64 = 0;

/// SoftState provides state that is useful for logging and debugging.
/// The state is volatile and does not need to be persisted to the WAL.
#[derive(Default, PartialEq, Debug, Clone)]
pub struct SoftState {
    /// The potential leader of the cluster.
    pub leader_id: u64,
    /// The soft role this node may take.
    pub raft_state: StateRole,
}

fn new_message(to: u64, field_type: MessageType, from: Option<u64>) -> Message {
    let mut m = Message::default();
    m.to = to;
    if let Some(id) = from {
        m.from = id;
    }
    m.msg_type = field_type;
    m
}

/// A struct that represents the raft consensus itself. Stores details concerning the current
/// and possible state the system can take.
#[derive(CopyGetters)]
pub struct Raft<T: Storage> {
    /// The current election term.
    pub term: u64,

    /// Which peer this raft is voting for.
    pub vote: u64,

    /// The ID of this node.
    pub id: u64,

    /// The persistent log.
    pub raft_log: RaftLog<T>,

    /// The maximum aggregate byte size of the entries in one outgoing append.
    pub max_ents_size: u64,

    prs: ProgressSet,

    /// The current role of this node.
    pub state: StateRole,

    /// The current votes for this node in an election.
    ///
    /// Reset when changing role.
    pub votes: HashMap<u64, bool>,

    /// The outbox: messages the embedder needs to deliver, in emission order.
    pub msgs: Vec<Message>,

    /// The leader id
    pub leader_id: u64,

    /// ID of the leader transfer target when its value is not None.
    ///
    /// If this is Some(id), we follow the procedure defined in raft thesis 3.10.
    pub lead_transferee: Option<u64>,

    /// Only one conf change may be pending (in the log, but not yet
    /// applied) at a time. This is enforced via `pending_conf_index`, which
    /// is set to a value >= the log index of the latest pending
    /// configuration change (if any). Config changes are only allowed to
    /// be proposed if the leader's applied index is greater than this
    /// value.
    pub pending_conf_index: u64,

    /// Ticks since it reached last electionTimeout when it is leader or candidate.
    /// Number of ticks since it reached last electionTimeout or received a
    /// valid message from current leader when it is a follower.
    pub election_elapsed: usize,

    /// Number of ticks since it reached last heartbeatTimeout.
    /// Only the leader keeps heartbeat_elapsed.
    #[get_copy = "pub"]
    heartbeat_elapsed: usize,

    /// Whether to check the quorum
    pub check_quorum: bool,

    /// Ticks between heartbeats while leader.
    #[get_copy = "pub"]
    heartbeat_timeout: usize,
    /// Base number of ticks before an election fires.
    #[get_copy = "pub"]
    election_timeout: usize,

    /// A random number between [election_timeout, 2 * election_timeout - 1].
    /// It gets reset when raft changes its state to follower or candidate.
    #[get_copy = "pub"]
    randomized_election_timeout: usize,

    rng: StdRng,

    /// The logger for the raft structure.
    pub(crate) logger: Logger,
}

trait AssertSend: Send {}

impl<T: Storage + Send> AssertSend for Raft<T> {}

impl<T: Storage> Raft<T> {
    /// Creates a new raft for use on the node.
    #[allow(clippy::new_ret_no_self)]
    pub fn new(c: &Config, store: T, logger: &Logger) -> Result<Raft<T>> {
        c.validate()?;
        let logger = logger.new(o!("raft_id" => c.id));
        let raft_state = store.initial_state()?;
        let voters = &raft_state.conf_state.voters;
        if !voters.is_empty() && !c.peers.is_empty() {
            return Err(Error::ConfigInvalid(
                "cannot specify both config.peers and a non-empty ConfState".to_owned(),
            ));
        }
        let peers: &[u64] = if voters.is_empty() { &c.peers } else { voters };

        let mut r = Raft {
            id: c.id,
            term: Default::default(),
            vote: Default::default(),
            raft_log: RaftLog::new(store, logger.clone()),
            max_ents_size: c.max_ents_size,
            prs: ProgressSet::with_capacity(peers.len()),
            state: StateRole::Follower,
            votes: Default::default(),
            msgs: Default::default(),
            leader_id: Default::default(),
            lead_transferee: None,
            pending_conf_index: Default::default(),
            election_elapsed: Default::default(),
            heartbeat_elapsed: Default::default(),
            check_quorum: c.check_quorum,
            heartbeat_timeout: c.heartbeat_tick,
            election_timeout: c.election_tick,
            randomized_election_timeout: 0,
            rng: StdRng::from_entropy(),
            logger,
        };
        for p in peers {
            r.prs.insert_voter(*p, Progress::new(1));
        }

        if raft_state.hard_state != HardState::default() {
            r.load_state(&raft_state.hard_state);
        }
        if c.applied > 0 {
            r.raft_log.applied_to(c.applied);
        }
        let term = r.term;
        r.become_follower(term, INVALID_ID);

        info!(
            r.logger,
            "newRaft";
            "term" => r.term,
            "commit" => r.raft_log.committed,
            "applied" => r.raft_log.applied,
            "last index" => r.raft_log.last_index(),
            "last term" => r.raft_log.last_term(),
            "peers" => ?r.prs.voter_ids(),
        );
        Ok(r)
    }

    /// Grabs an immutable reference to the store.
    #[inline]
    pub fn store(&self) -> &T {
        &self.raft_log.store
    }

    /// Grabs a mutable reference to the store.
    #[inline]
    pub fn mut_store(&mut self) -> &mut T {
        &mut self.raft_log.store
    }

    /// Grabs a reference to the pending snapshot, if any.
    #[inline]
    pub fn snap(&self) -> Option<&Snapshot> {
        self.raft_log.unstable.snapshot.as_ref()
    }

    /// Returns a read-only reference to the progress set.
    pub fn prs(&self) -> &ProgressSet {
        &self.prs
    }

    /// Returns a mutable reference to the progress set.
    pub fn mut_prs(&mut self) -> &mut ProgressSet {
        &mut self.prs
    }

    /// Returns a value representing the softstate at the time of calling.
    pub fn soft_state(&self) -> SoftState {
        SoftState {
            leader_id: self.leader_id,
            raft_state: self.state,
        }
    }

    /// Returns a value representing the hardstate at the time of calling.
    pub fn hard_state(&self) -> HardState {
        HardState {
            term: self.term,
            vote: self.vote,
            commit: self.raft_log.committed,
        }
    }

    /// Indicates whether this node may campaign, which is true when its own
    /// id is in the current membership.
    pub fn promotable(&self) -> bool {
        self.prs.contains(self.id)
    }

    /// For testing leader lease.
    #[doc(hidden)]
    pub fn set_randomized_election_timeout(&mut self, t: usize) {
        assert!(self.election_timeout <= t && t < 2 * self.election_timeout);
        self.randomized_election_timeout = t;
    }

    // send persists state to stable storage and then sends to its mailbox.
    fn send(&mut self, mut m: Message) {
        debug!(
            self.logger,
            "Sending from {from} to {to}",
            from = self.id,
            to = m.to;
            "msg" => ?m,
        );
        m.from = self.id;
        if m.msg_type == MessageType::MsgRequestVote
            || m.msg_type == MessageType::MsgRequestVoteResponse
        {
            if m.term == 0 {
                // All campaign messages need to have the term set when sending:
                // - MsgRequestVote: m.term is the term the node is campaigning
                //   for, non-zero as we increment the term when campaigning.
                // - MsgRequestVoteResponse: m.term is the new term if the vote
                //   was granted, non-zero for the same reason.
                fatal!(
                    self.logger,
                    "term should be set when sending {:?}",
                    m.msg_type
                );
            }
        } else {
            if m.term != 0 {
                fatal!(
                    self.logger,
                    "term should not be set when sending {:?} (was {})",
                    m.msg_type,
                    m.term
                );
            }
            // Do not attach term to MsgPropose. Proposals are a way to forward
            // to the leader and should be treated as local messages.
            if m.msg_type != MessageType::MsgPropose {
                m.term = self.term;
            }
        }
        self.msgs.push(m);
    }

    fn prepare_send_snapshot(&mut self, m: &mut Message, to: u64) -> bool {
        m.msg_type = MessageType::MsgSnapshot;
        let snapshot = match self.raft_log.snapshot() {
            Ok(s) => s,
            Err(e) => {
                if e == Error::Store(StorageError::SnapshotTemporarilyUnavailable) {
                    debug!(
                        self.logger,
                        "failed to send snapshot to {} because snapshot is temporarily \
                         unavailable",
                        to;
                    );
                    return false;
                }
                fatal!(self.logger, "unexpected error: {:?}", e);
            }
        };
        if snapshot.metadata.index == 0 {
            fatal!(self.logger, "need non-empty snapshot");
        }
        let (sindex, sterm) = (snapshot.metadata.index, snapshot.metadata.term);
        m.snapshot = snapshot;
        debug!(
            self.logger,
            "[firstindex: {first_index}, commit: {committed}] sent snapshot[index: {snapshot_index}, term: {snapshot_term}] to {to}",
            first_index = self.raft_log.first_index(),
            committed = self.raft_log.committed,
            snapshot_index = sindex,
            snapshot_term = sterm,
            to = to;
        );
        true
    }

    /// Sends an append RPC with new entries (if any) and the current commit
    /// index to the given peer. Falls back to sending a snapshot if the
    /// entries the peer needs have been compacted away.
    pub fn send_append(&mut self, to: u64) {
        let pr = match self.prs.get(to) {
            Some(pr) => *pr,
            None => return,
        };
        let mut m = Message::default();
        m.to = to;
        let term = self.raft_log.term(pr.next_idx - 1);
        let ents = self.raft_log.entries(pr.next_idx, self.max_ents_size);
        if term.is_err() || ents.is_err() {
            // Send a snapshot if we failed to get the term or entries.
            if !self.prepare_send_snapshot(&mut m, to) {
                return;
            }
        } else {
            m.msg_type = MessageType::MsgAppend;
            m.index = pr.next_idx - 1;
            m.log_term = term.unwrap();
            m.entries = ents.unwrap();
            m.commit = self.raft_log.committed;
        }
        self.send(m);
    }

    // send_heartbeat sends an empty MsgHeartbeat.
    fn send_heartbeat(&mut self, to: u64) {
        // Attach the commit as min(to.matched, self.raft_log.committed).
        // When the leader sends out heartbeat message,
        // the receiver(follower) might not be matched with the leader
        // or it might not have all the committed entries.
        // The leader MUST NOT forward the follower's commit to
        // an unmatched index.
        let matched = match self.prs.get(to) {
            Some(pr) => pr.matched,
            None => return,
        };
        let mut m = Message::default();
        m.to = to;
        m.msg_type = MessageType::MsgHeartbeat;
        m.commit = cmp::min(matched, self.raft_log.committed);
        self.send(m);
    }

    /// Sends RPC, with entries to all peers that are not up-to-date
    /// according to the progress recorded in r.prs().
    pub fn bcast_append(&mut self) {
        let self_id = self.id;
        for id in self.prs.voter_ids() {
            if id == self_id {
                continue;
            }
            self.send_append(id);
        }
    }

    /// Sends RPC, without entries to all the peers.
    pub fn bcast_heartbeat(&mut self) {
        let self_id = self.id;
        for id in self.prs.voter_ids() {
            if id == self_id {
                continue;
            }
            self.send_heartbeat(id);
        }
    }

    /// Broadcasts heartbeats to all the followers if it's leader.
    pub fn ping(&mut self) {
        if self.state == StateRole::Leader {
            self.bcast_heartbeat();
        }
    }

    /// Attempts to advance the commit index. Returns true if the commit index
    /// changed (in which case the caller should call `r.bcast_append`).
    pub fn maybe_commit(&mut self) -> bool {
        let mci = self.prs.maximal_committed_index();
        self.raft_log.maybe_commit(mci, self.term)
    }

    /// Resets the current node to a given term.
    pub fn reset(&mut self, term: u64) {
        if self.term != term {
            self.term = term;
            self.vote = INVALID_ID;
        }
        self.leader_id = INVALID_ID;
        self.reset_randomized_election_timeout();
        self.election_elapsed = 0;
        self.heartbeat_elapsed = 0;

        self.abort_leader_transfer();

        self.votes.clear();

        self.pending_conf_index = 0;

        let last_index = self.raft_log.last_index();
        let self_id = self.id;
        for (&id, pr) in self.prs.iter_mut() {
            pr.reset(last_index + 1);
            if id == self_id {
                pr.matched = last_index;
            }
        }
    }

    /// Appends a slice of entries to the log. The entries are updated to match
    /// the current index and term.
    pub fn append_entry(&mut self, es: &mut [Entry]) {
        let mut li = self.raft_log.last_index();
        for (i, e) in es.iter_mut().enumerate() {
            e.term = self.term;
            e.index = li + 1 + i as u64;
        }
        // use latest "last" index after truncate/append
        li = self.raft_log.append(es);

        let self_id = self.id;
        self.prs.get_mut(self_id).unwrap().maybe_update(li);

        // Regardless of maybe_commit's return, our caller will call bcast_append.
        self.maybe_commit();
    }

    /// Advances the internal logical clock by one tick.
    ///
    /// Returns true to indicate that there will probably be some readiness
    /// need to be handled.
    pub fn tick(&mut self) -> bool {
        match self.state {
            StateRole::Follower | StateRole::Candidate => self.tick_election(),
            StateRole::Leader => self.tick_heartbeat(),
        }
    }

    /// Run by followers and candidates after self.election_timeout.
    ///
    /// Returns true to indicate that there will probably be some readiness need to be handled.
    pub fn tick_election(&mut self) -> bool {
        self.election_elapsed += 1;
        if !self.pass_election_timeout() || !self.promotable() {
            return false;
        }

        self.election_elapsed = 0;
        let m = new_message(INVALID_ID, MessageType::MsgHup, Some(self.id));
        let _ = self.step(m);
        true
    }

    // tick_heartbeat is run by leaders to send a MsgBeat after self.heartbeat_timeout.
    // Returns true to indicate that there will probably be some readiness need to be handled.
    fn tick_heartbeat(&mut self) -> bool {
        self.heartbeat_elapsed += 1;
        self.election_elapsed += 1;

        let mut has_ready = false;
        if self.election_elapsed >= self.election_timeout {
            self.election_elapsed = 0;
            if self.check_quorum {
                has_ready = true;
                let m = new_message(INVALID_ID, MessageType::MsgCheckQuorum, Some(self.id));
                let _ = self.step(m);
            }
            // The target failed to take leadership within one election
            // timeout; give up on the transfer.
            if self.state == StateRole::Leader && self.lead_transferee.is_some() {
                self.abort_leader_transfer()
            }
        }

        if self.state != StateRole::Leader {
            return has_ready;
        }

        if self.heartbeat_elapsed >= self.heartbeat_timeout {
            self.heartbeat_elapsed = 0;
            has_ready = true;
            let m = new_message(INVALID_ID, MessageType::MsgBeat, Some(self.id));
            let _ = self.step(m);
        }
        has_ready
    }

    /// Converts this node to a follower.
    pub fn become_follower(&mut self, term: u64, leader_id: u64) {
        self.reset(term);
        self.leader_id = leader_id;
        self.state = StateRole::Follower;
        info!(
            self.logger,
            "became follower at term {term}",
            term = self.term;
        );
    }

    /// Converts this node to a candidate
    ///
    /// # Panics
    ///
    /// Panics if a leader already exists.
    pub fn become_candidate(&mut self) {
        assert_ne!(
            self.state,
            StateRole::Leader,
            "invalid transition [leader -> candidate]"
        );
        let term = self.term + 1;
        self.reset(term);
        let id = self.id;
        self.vote = id;
        self.state = StateRole::Candidate;
        info!(
            self.logger,
            "became candidate at term {term}",
            term = self.term;
        );
    }

    /// Makes this raft the leader.
    ///
    /// # Panics
    ///
    /// Panics if this is a follower node.
    pub fn become_leader(&mut self) {
        assert_ne!(
            self.state,
            StateRole::Follower,
            "invalid transition [follower -> leader]"
        );
        let term = self.term;
        self.reset(term);
        self.leader_id = self.id;
        self.state = StateRole::Leader;

        // Conservatively set the pending_conf_index to the last index in the
        // log. There may or may not be a pending config change, but it's
        // safe to delay any future proposals until we commit all our
        // pending log entries, and scanning the entire tail of the log
        // could be expensive.
        self.pending_conf_index = self.raft_log.last_index();

        // The empty entry at the new term is what lets the leader commit
        // entries from prior terms once it is replicated.
        self.append_entry(&mut [Entry::default()]);

        info!(
            self.logger,
            "became leader at term {term}",
            term = self.term;
        );
    }

    fn num_pending_conf(&self, ents: &[Entry]) -> usize {
        ents.iter()
            .filter(|e| e.entry_type == EntryType::EntryConfChange)
            .count()
    }

    /// Campaign to attempt to become a leader.
    pub fn campaign(&mut self, campaign_type: &[u8]) {
        self.become_candidate();
        let (vote_msg, term) = (MessageType::MsgRequestVote, self.term);
        let self_id = self.id;
        self.register_vote(self_id, true);
        if let CandidacyStatus::Elected = self.prs.candidacy_status(&self.votes) {
            // We won the election after voting for ourselves (which must mean that
            // this is a single-node cluster). Advance to the next state.
            self.become_leader();
            return;
        }

        for id in self.prs.voter_ids() {
            if id == self_id {
                continue;
            }
            info!(
                self.logger,
                "[logterm: {log_term}, index: {log_index}] sent vote request to {id}",
                log_term = self.raft_log.last_term(),
                log_index = self.raft_log.last_index(),
                id = id;
                "term" => self.term,
            );
            let mut m = new_message(id, vote_msg, None);
            m.term = term;
            m.index = self.raft_log.last_index();
            m.log_term = self.raft_log.last_term();
            if campaign_type == CAMPAIGN_TRANSFER {
                m.context = campaign_type.to_vec();
            }
            self.send(m);
        }
    }

    /// Records the vote of `id`; only its first response counts.
    fn register_vote(&mut self, id: u64, vote: bool) {
        self.votes.entry(id).or_insert(vote);
    }

    /// Steps the raft along via a message. This should be called every time your raft receives a
    /// message from a peer.
    pub fn step(&mut self, m: Message) -> Result<()> {
        // Handle the message term, which may result in our stepping down to a follower.
        if m.term == 0 {
            // local message
        } else if m.term > self.term {
            if m.msg_type == MessageType::MsgRequestVote {
                let force = m.context == CAMPAIGN_TRANSFER;
                let in_lease = self.check_quorum
                    && self.leader_id != INVALID_ID
                    && self.election_elapsed < self.election_timeout;
                if !force && in_lease {
                    // If a server receives a RequestVote within the minimum
                    // election timeout of hearing from a current leader, it
                    // does not update its term or grant its vote. A removed
                    // node would otherwise keep disrupting the group with
                    // campaigns it can never win.
                    info!(
                        self.logger,
                        "[logterm: {log_term}, index: {log_index}, vote: {vote}] ignored vote from \
                         {from} [logterm: {msg_term}, index: {msg_index}]: lease is not expired",
                        log_term = self.raft_log.last_term(),
                        log_index = self.raft_log.last_index(),
                        vote = self.vote,
                        from = m.from,
                        msg_term = m.log_term,
                        msg_index = m.index;
                        "term" => self.term,
                        "remaining ticks" => self.election_timeout - self.election_elapsed,
                    );
                    return Ok(());
                }
            }

            info!(
                self.logger,
                "received a message with higher term from {from}",
                from = m.from;
                "term" => self.term,
                "message_term" => m.term,
                "msg type" => ?m.msg_type,
            );
            if m.msg_type == MessageType::MsgAppend
                || m.msg_type == MessageType::MsgHeartbeat
                || m.msg_type == MessageType::MsgSnapshot
            {
                self.become_follower(m.term, m.from);
            } else {
                self.become_follower(m.term, INVALID_ID);
            }
        } else if m.term < self.term {
            if self.check_quorum
                && (m.msg_type == MessageType::MsgHeartbeat
                    || m.msg_type == MessageType::MsgAppend)
            {
                // We have received messages from a leader at a lower term. It
                // is possible that these messages were simply delayed in the
                // network, but this could also mean that this node has
                // advanced its term during a network partition, and it is now
                // unable to either win an election or to rejoin the majority
                // on the old term. With check_quorum the stale leader does not
                // advance its term on RequestVote, so reply with an empty
                // response to notify it of the newer term.
                let to_send = new_message(m.from, MessageType::MsgAppendResponse, None);
                self.send(to_send);
            } else {
                info!(
                    self.logger,
                    "ignored a message with lower term from {from}",
                    from = m.from;
                    "term" => self.term,
                    "msg type" => ?m.msg_type,
                    "msg term" => m.term
                );
            }
            return Ok(());
        }

        match m.msg_type {
            MessageType::MsgHup => self.hup(false),
            MessageType::MsgRequestVote => {
                // We can vote if this is a repeat of a vote we've already cast...
                let can_vote = (self.vote == m.from)
                    // ...or we haven't voted and we don't think there's a leader yet in this term.
                    || (self.vote == INVALID_ID && self.leader_id == INVALID_ID);
                // ...and we believe the candidate is up to date.
                if can_vote && self.raft_log.is_up_to_date(m.index, m.log_term) {
                    // When responding to vote messages we include the term
                    // from the message, not the local term: the two are the
                    // same here, and the candidate ignores out of date terms.
                    self.log_vote_approve(&m);
                    let mut to_send =
                        new_message(m.from, MessageType::MsgRequestVoteResponse, None);
                    to_send.reject = false;
                    to_send.term = m.term;
                    self.send(to_send);
                    self.election_elapsed = 0;
                    self.vote = m.from;
                } else {
                    self.log_vote_reject(&m);
                    let mut to_send =
                        new_message(m.from, MessageType::MsgRequestVoteResponse, None);
                    to_send.reject = true;
                    to_send.term = self.term;
                    self.send(to_send);
                }
            }
            _ => match self.state {
                StateRole::Candidate => self.step_candidate(m)?,
                StateRole::Follower => self.step_follower(m)?,
                StateRole::Leader => self.step_leader(m)?,
            },
        }
        Ok(())
    }

    fn hup(&mut self, transfer_leader: bool) {
        if self.state == StateRole::Leader {
            debug!(
                self.logger,
                "ignoring MsgHup because already leader";
            );
            return;
        }

        // If there is a pending snapshot, its index will be returned by
        // `maybe_first_index`. Note that snapshot updates configuration
        // already, so as long as pending entries don't contain conf change
        // it's safe to start campaign.
        let first_index = match self.raft_log.unstable.maybe_first_index() {
            Some(idx) => idx,
            None => self.raft_log.applied + 1,
        };

        let ents = self
            .raft_log
            .slice(first_index, self.raft_log.committed + 1, None)
            .unwrap_or_else(|e| {
                fatal!(
                    self.logger,
                    "unexpected error getting unapplied entries [{}, {}): {:?}",
                    first_index,
                    self.raft_log.committed + 1,
                    e
                );
            });
        let n = self.num_pending_conf(&ents);
        if n != 0 && !transfer_leader {
            warn!(
                self.logger,
                "cannot campaign at term {term} since there are still {pending_changes} pending \
                 configuration changes to apply",
                term = self.term,
                pending_changes = n;
            );
            return;
        }
        info!(
            self.logger,
            "starting a new election";
            "term" => self.term,
        );
        if transfer_leader {
            self.campaign(CAMPAIGN_TRANSFER);
        } else {
            self.campaign(CAMPAIGN_ELECTION);
        }
    }

    fn log_vote_approve(&self, m: &Message) {
        info!(
            self.logger,
            "[logterm: {log_term}, index: {log_index}, vote: {vote}] cast vote for {from} [logterm: {msg_term}, index: {msg_index}] \
             at term {term}",
            log_term = self.raft_log.last_term(),
            log_index = self.raft_log.last_index(),
            vote = self.vote,
            from = m.from,
            msg_term = m.log_term,
            msg_index = m.index,
            term = self.term;
        );
    }

    fn log_vote_reject(&self, m: &Message) {
        info!(
            self.logger,
            "[logterm: {log_term}, index: {log_index}, vote: {vote}] rejected vote from {from} [logterm: {msg_term}, index: \
             {msg_index}] at term {term}",
            log_term = self.raft_log.last_term(),
            log_index = self.raft_log.last_index(),
            vote = self.vote,
            from = m.from,
            msg_term = m.log_term,
            msg_index = m.index,
            term = self.term;
        );
    }

    fn handle_append_response(&mut self, m: &Message) {
        {
            let pr = self.prs.get_mut(m.from).unwrap();
            pr.recent_active = true;
        }

        if m.reject {
            debug!(
                self.logger,
                "received msgAppend rejection";
                "reject hint" => m.reject_hint,
                "from" => m.from,
                "index" => m.index,
            );

            let decreased = self
                .prs
                .get_mut(m.from)
                .unwrap()
                .maybe_decr_to(m.index, m.reject_hint);
            if decreased {
                debug!(
                    self.logger,
                    "decreased progress of {from}",
                    from = m.from;
                );
                self.send_append(m.from);
            }
            return;
        }

        if !self.prs.get_mut(m.from).unwrap().maybe_update(m.index) {
            return;
        }

        if self.maybe_commit() {
            self.bcast_append();
        }

        // Transfer leadership is in progress.
        if self.lead_transferee == Some(m.from)
            && self.prs.get(m.from).unwrap().matched == self.raft_log.last_index()
        {
            info!(
                self.logger,
                "sent MsgTimeoutNow to {from} after received MsgAppendResponse",
                from = m.from;
            );
            self.send_timeout_now(m.from);
        }
    }

    fn handle_heartbeat_response(&mut self, m: &Message) {
        let matched = {
            let pr = self.prs.get_mut(m.from).unwrap();
            pr.recent_active = true;
            pr.matched
        };
        if matched < self.raft_log.last_index() {
            self.send_append(m.from);
        }
    }

    fn handle_transfer_leader(&mut self, m: &Message) {
        let lead_transferee = m.from;
        if let Some(last_lead_transferee) = self.lead_transferee {
            if last_lead_transferee == lead_transferee {
                info!(
                    self.logger,
                    "[term {term}] transfer leadership to {lead_transferee} is in progress, ignores request \
                     to same node {lead_transferee}",
                    term = self.term,
                    lead_transferee = lead_transferee;
                );
                return;
            }
            self.abort_leader_transfer();
            info!(
                self.logger,
                "[term {term}] abort previous transferring leadership to {last_lead_transferee}",
                term = self.term,
                last_lead_transferee = last_lead_transferee;
            );
        }
        if lead_transferee == self.id {
            debug!(
                self.logger,
                "already leader; ignored transferring leadership to self";
            );
            return;
        }
        // Transfer leadership to third party.
        info!(
            self.logger,
            "[term {term}] starts to transfer leadership to {lead_transferee}",
            term = self.term,
            lead_transferee = lead_transferee;
        );
        // Transfer leadership should be finished in one electionTimeout
        // so reset r.election_elapsed.
        self.election_elapsed = 0;
        self.lead_transferee = Some(lead_transferee);
        if self.prs.get(lead_transferee).unwrap().matched == self.raft_log.last_index() {
            self.send_timeout_now(lead_transferee);
            info!(
                self.logger,
                "sends MsgTimeoutNow to {lead_transferee} immediately as {lead_transferee} already has up-to-date log",
                lead_transferee = lead_transferee;
            );
        } else {
            self.send_append(lead_transferee);
        }
    }

    fn step_leader(&mut self, mut m: Message) -> Result<()> {
        // These message types do not require any progress for m.from.
        match m.msg_type {
            MessageType::MsgBeat => {
                self.bcast_heartbeat();
                return Ok(());
            }
            MessageType::MsgCheckQuorum => {
                if !self.check_quorum_active() {
                    warn!(
                        self.logger,
                        "stepped down to follower since quorum is not active";
                    );
                    let term = self.term;
                    self.become_follower(term, INVALID_ID);
                }
                return Ok(());
            }
            MessageType::MsgPropose => {
                if m.entries.is_empty() {
                    fatal!(self.logger, "stepped empty MsgPropose");
                }
                if !self.prs.contains(self.id) {
                    // If we are not currently a member of the group (i.e. this
                    // node was removed from the configuration while serving as
                    // leader), drop any new proposals.
                    return Err(Error::ProposalDropped);
                }
                if self.lead_transferee.is_some() {
                    debug!(
                        self.logger,
                        "[term {term}] transfer leadership to {lead_transferee} is in progress; dropping \
                         proposal",
                        term = self.term,
                        lead_transferee = self.lead_transferee.unwrap();
                    );
                    return Err(Error::ProposalDropped);
                }

                for (i, e) in m.entries.iter_mut().enumerate() {
                    if e.entry_type == EntryType::EntryConfChange {
                        if self.has_pending_conf() {
                            info!(
                                self.logger,
                                "propose conf entry ignored since pending unapplied configuration";
                                "entry" => ?e,
                                "index" => self.pending_conf_index,
                                "applied" => self.raft_log.applied,
                            );
                            *e = Entry::default();
                        } else {
                            self.pending_conf_index = self.raft_log.last_index() + i as u64 + 1;
                        }
                    }
                }
                self.append_entry(&mut m.entries);
                self.bcast_append();
                return Ok(());
            }
            _ => {}
        }

        // All other message types require a progress for m.from.
        if self.prs.get(m.from).is_none() {
            debug!(
                self.logger,
                "no progress available for {}",
                m.from;
            );
            return Ok(());
        }
        match m.msg_type {
            MessageType::MsgAppendResponse => self.handle_append_response(&m),
            MessageType::MsgHeartbeatResponse => self.handle_heartbeat_response(&m),
            MessageType::MsgTransferLeader => self.handle_transfer_leader(&m),
            _ => {}
        }
        Ok(())
    }

    fn step_candidate(&mut self, m: Message) -> Result<()> {
        match m.msg_type {
            MessageType::MsgPropose => {
                info!(
                    self.logger,
                    "no leader at term {term}; dropping proposal",
                    term = self.term;
                );
                return Err(Error::ProposalDropped);
            }
            MessageType::MsgAppend => {
                debug_assert_eq!(self.term, m.term);
                self.become_follower(m.term, m.from);
                self.handle_append_entries(&m);
            }
            MessageType::MsgHeartbeat => {
                debug_assert_eq!(self.term, m.term);
                self.become_follower(m.term, m.from);
                self.handle_heartbeat(m);
            }
            MessageType::MsgSnapshot => {
                debug_assert_eq!(self.term, m.term);
                self.become_follower(m.term, m.from);
                self.handle_snapshot(m);
            }
            MessageType::MsgRequestVoteResponse => {
                let acceptance = !m.reject;
                info!(
                    self.logger,
                    "received{} from {from}",
                    if !acceptance { " rejection" } else { "" },
                    from = m.from;
                    "msg type" => ?m.msg_type,
                    "term" => self.term,
                );
                self.register_vote(m.from, acceptance);
                match self.prs.candidacy_status(&self.votes) {
                    CandidacyStatus::Elected => {
                        self.become_leader();
                        self.bcast_append();
                    }
                    CandidacyStatus::Ineligible => {
                        // A quorum rejected us; revert to follower at the
                        // same term and wait for the next timeout.
                        let term = self.term;
                        self.become_follower(term, INVALID_ID);
                    }
                    CandidacyStatus::Eligible => (),
                };
            }
            MessageType::MsgTimeoutNow => debug!(
                self.logger,
                "{term} ignored MsgTimeoutNow from {from}",
                term = self.term,
                from = m.from;
                "state" => ?self.state,
            ),
            _ => {}
        }
        Ok(())
    }

    fn step_follower(&mut self, mut m: Message) -> Result<()> {
        match m.msg_type {
            MessageType::MsgPropose => {
                if self.leader_id == INVALID_ID {
                    info!(
                        self.logger,
                        "no leader at term {term}; dropping proposal",
                        term = self.term;
                    );
                    return Err(Error::ProposalDropped);
                }
                m.to = self.leader_id;
                self.send(m);
            }
            MessageType::MsgAppend => {
                self.election_elapsed = 0;
                self.leader_id = m.from;
                self.handle_append_entries(&m);
            }
            MessageType::MsgHeartbeat => {
                self.election_elapsed = 0;
                self.leader_id = m.from;
                self.handle_heartbeat(m);
            }
            MessageType::MsgSnapshot => {
                self.election_elapsed = 0;
                self.leader_id = m.from;
                self.handle_snapshot(m);
            }
            MessageType::MsgTransferLeader => {
                if self.leader_id == INVALID_ID {
                    info!(
                        self.logger,
                        "no leader at term {term}; dropping leader transfer msg",
                        term = self.term;
                    );
                    return Ok(());
                }
                m.to = self.leader_id;
                self.send(m);
            }
            MessageType::MsgTimeoutNow => {
                if self.promotable() {
                    info!(
                        self.logger,
                        "[term {term}] received MsgTimeoutNow from {from} and starts an election to \
                         get leadership",
                        term = self.term,
                        from = m.from;
                    );
                    self.hup(true);
                } else {
                    info!(
                        self.logger,
                        "received MsgTimeoutNow from {} but is not promotable",
                        m.from;
                    );
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// For a given message, append the entries to the log.
    pub fn handle_append_entries(&mut self, m: &Message) {
        if m.index < self.raft_log.committed {
            debug!(
                self.logger,
                "got message with lower index than committed";
            );
            let mut to_send = Message::default();
            to_send.msg_type = MessageType::MsgAppendResponse;
            to_send.to = m.from;
            to_send.index = self.raft_log.committed;
            self.send(to_send);
            return;
        }

        let mut to_send = Message::default();
        to_send.to = m.from;
        to_send.msg_type = MessageType::MsgAppendResponse;

        if let Some(last_idx) = self
            .raft_log
            .maybe_append(m.index, m.log_term, m.commit, &m.entries)
        {
            to_send.index = last_idx;
            self.send(to_send);
        } else {
            debug!(
                self.logger,
                "rejected msgApp [logterm: {msg_log_term}, index: {msg_index}] \
                 from {from}",
                msg_log_term = m.log_term,
                msg_index = m.index,
                from = m.from;
                "index" => m.index,
                "logterm" => ?self.raft_log.term(m.index),
            );
            to_send.index = m.index;
            to_send.reject = true;
            to_send.reject_hint = self.raft_log.last_index();
            self.send(to_send);
        }
    }

    /// For a message, commit and send out heartbeat.
    pub fn handle_heartbeat(&mut self, mut m: Message) {
        self.raft_log
            .commit_to(cmp::min(m.commit, self.raft_log.last_index()));
        let mut to_send = Message::default();
        to_send.msg_type = MessageType::MsgHeartbeatResponse;
        to_send.to = m.from;
        to_send.context = std::mem::take(&mut m.context);
        self.send(to_send);
    }

    fn handle_snapshot(&mut self, mut m: Message) {
        debug_assert!(m.term != 0, "{:?} term can't be 0", m);
        let (sindex, sterm) = (m.snapshot.metadata.index, m.snapshot.metadata.term);
        if self.restore(std::mem::take(&mut m.snapshot)) {
            info!(
                self.logger,
                "[commit: {commit}, term: {term}] restored snapshot [index: {snapshot_index}, term: {snapshot_term}]",
                term = self.term,
                commit = self.raft_log.committed,
                snapshot_index = sindex,
                snapshot_term = sterm;
            );
            let mut to_send = Message::default();
            to_send.msg_type = MessageType::MsgAppendResponse;
            to_send.to = m.from;
            to_send.index = self.raft_log.last_index();
            self.send(to_send);
        } else {
            info!(
                self.logger,
                "[commit: {commit}] ignored snapshot [index: {snapshot_index}, term: {snapshot_term}]",
                commit = self.raft_log.committed,
                snapshot_index = sindex,
                snapshot_term = sterm;
            );
            let mut to_send = Message::default();
            to_send.msg_type = MessageType::MsgAppendResponse;
            to_send.to = m.from;
            to_send.index = self.raft_log.committed;
            self.send(to_send);
        }
    }

    /// Recovers the state machine from a snapshot. It restores the log and the
    /// configuration of the state machine.
    pub fn restore(&mut self, snap: Snapshot) -> bool {
        if snap.metadata.index <= self.raft_log.committed {
            return false;
        }
        if self
            .raft_log
            .match_term(snap.metadata.index, snap.metadata.term)
        {
            // The snapshot prefix is already in the log; only the commit
            // cursor needs to move.
            info!(
                self.logger,
                "[commit: {commit}, lastindex: {last_index}, lastterm: {last_term}] fast-forwarded commit to \
                 snapshot [index: {snapshot_index}, term: {snapshot_term}]",
                commit = self.raft_log.committed,
                last_index = self.raft_log.last_index(),
                last_term = self.raft_log.last_term(),
                snapshot_index = snap.metadata.index,
                snapshot_term = snap.metadata.term;
            );
            self.raft_log.commit_to(snap.metadata.index);
            return false;
        }

        info!(
            self.logger,
            "[commit: {commit}, lastindex: {last_index}, lastterm: {last_term}] starts to \
             restore snapshot [index: {snapshot_index}, term: {snapshot_term}]",
            commit = self.raft_log.committed,
            last_index = self.raft_log.last_index(),
            last_term = self.raft_log.last_term(),
            snapshot_index = snap.metadata.index,
            snapshot_term = snap.metadata.term;
        );

        let voters = snap.metadata.conf_state.voters.clone();
        self.raft_log.restore(snap);

        // The snapshot carries the membership at its index; rebuild the
        // progress table from it.
        let next_idx = self.raft_log.last_index() + 1;
        self.prs = ProgressSet::with_capacity(voters.len());
        for id in voters {
            let mut pr = Progress::new(next_idx);
            if id == self.id {
                pr.matched = next_idx - 1;
            }
            self.prs.insert_voter(id, pr);
        }
        true
    }

    /// Check if there is any pending conf change.
    pub fn has_pending_conf(&self) -> bool {
        self.pending_conf_index > self.raft_log.applied
    }

    /// Adds a new node to the cluster. Adding an existing member is a no-op,
    /// so that replayed conf-change entries stay harmless.
    pub fn add_node(&mut self, id: u64) {
        debug!(
            self.logger,
            "adding node with ID {id} to peers",
            id = id,
        );
        if self.prs.contains(id) {
            return;
        }
        let mut pr = Progress::new(self.raft_log.last_index() + 1);
        // Mark the new peer as active so an imminent quorum check does not
        // depose the leader before the peer had a chance to respond.
        pr.recent_active = true;
        self.prs.insert_voter(id, pr);
    }

    /// Removes a node from the raft.
    pub fn remove_node(&mut self, id: u64) {
        debug!(
            self.logger,
            "removing node with ID {id} from peers",
            id = id,
        );
        self.prs.remove(id);

        // Do not try to commit or abort transferring if the group has no voters.
        if self.prs.is_empty() {
            return;
        }

        // The quorum size is now smaller, so see if any pending entries can
        // be committed.
        if self.maybe_commit() {
            self.bcast_append();
        }
        // If the removed node is the lead_transferee, then abort the leadership transferring.
        if self.state == StateRole::Leader && self.lead_transferee == Some(id) {
            self.abort_leader_transfer();
        }
    }

    /// For a given hardstate, load the state into self.
    pub fn load_state(&mut self, hs: &HardState) {
        if hs.commit < self.raft_log.committed || hs.commit > self.raft_log.last_index() {
            fatal!(
                self.logger,
                "hs.commit {} is out of range [{}, {}]",
                hs.commit,
                self.raft_log.committed,
                self.raft_log.last_index()
            )
        }
        self.raft_log.committed = hs.commit;
        self.term = hs.term;
        self.vote = hs.vote;
    }

    /// `pass_election_timeout` returns true if `election_elapsed` is greater
    /// than or equal to the randomized election timeout in
    /// [`election_timeout`, 2 * `election_timeout` - 1].
    pub fn pass_election_timeout(&self) -> bool {
        self.election_elapsed >= self.randomized_election_timeout
    }

    /// Regenerates and stores the election timeout.
    pub fn reset_randomized_election_timeout(&mut self) {
        let prev_timeout = self.randomized_election_timeout;
        let timeout = self
            .rng
            .gen_range(self.election_timeout..2 * self.election_timeout);
        debug!(
            self.logger,
            "reset election timeout {prev_timeout} -> {timeout} at {election_elapsed}",
            prev_timeout = prev_timeout,
            timeout = timeout,
            election_elapsed = self.election_elapsed;
        );
        self.randomized_election_timeout = timeout;
    }

    // check_quorum_active returns true if the quorum is active from
    // the view of the local raft state machine. Otherwise, it returns
    // false. It also resets all recent_active flags.
    // check_quorum_active can only be called by the leader.
    fn check_quorum_active(&mut self) -> bool {
        let self_id = self.id;
        self.prs.quorum_recently_active(self_id)
    }

    /// Issues a message to timeout immediately.
    pub fn send_timeout_now(&mut self, to: u64) {
        let msg = new_message(to, MessageType::MsgTimeoutNow, None);
        self.send(msg);
    }

    /// Stops the transfer of a leader.
    pub fn abort_leader_transfer(&mut self) {
        self.lead_transferee = None;
    }
}
