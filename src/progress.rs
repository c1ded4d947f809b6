// Copyright 2020 The miniraft developers. Licensed under Apache-2.0.

use std::cmp;

use crate::util::majority;
use crate::{HashMap, HashSet};

/// The leader's view of how a candidacy is going.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CandidacyStatus {
    /// The peer has collected a quorum of vote grants.
    Elected,
    /// A quorum of peers rejected the vote; the candidacy is lost.
    Ineligible,
    /// Neither grants nor rejections have reached a quorum yet.
    Eligible,
}

/// The replication cursor the leader keeps for one peer.
///
/// `matched` is the highest index known replicated on that peer; `next_idx`
/// is the index of the next entry to send. `matched` is monotonically
/// non-decreasing while the leader's term does not change.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Progress {
    /// How much state is matched.
    pub matched: u64,
    /// The next index to apply
    pub next_idx: u64,
    /// Whether the peer acknowledged the leader since the last quorum check.
    pub recent_active: bool,
}

impl Progress {
    /// Creates a new progress with the given `next_idx`.
    pub fn new(next_idx: u64) -> Progress {
        Progress {
            matched: 0,
            next_idx,
            recent_active: false,
        }
    }

    /// Resets the cursor as if nothing had been replicated yet.
    pub fn reset(&mut self, next_idx: u64) {
        self.matched = 0;
        self.next_idx = next_idx;
    }

    /// Returns false if the given index comes from an outdated message.
    /// Otherwise it updates the progress and returns true.
    pub fn maybe_update(&mut self, n: u64) -> bool {
        let need_update = self.matched < n;
        if need_update {
            self.matched = n;
        }
        if self.next_idx < n + 1 {
            self.next_idx = n + 1;
        }
        need_update
    }

    /// Backs off `next_idx` after a rejected append.
    ///
    /// Returns false if the rejection is stale: a response that does not
    /// refer to the entry probed last, or one below an index already known
    /// replicated, carries no new information. Otherwise `next_idx` moves to
    /// `min(rejected, last + 1)`, floored at `matched + 1` and at 1.
    pub fn maybe_decr_to(&mut self, rejected: u64, last: u64) -> bool {
        if rejected <= self.matched {
            return false;
        }
        if self.next_idx == 0 || self.next_idx - 1 != rejected {
            return false;
        }

        self.next_idx = cmp::max(cmp::min(rejected, last + 1), self.matched + 1);
        true
    }
}

/// `ProgressSet` holds the [`Progress`] of every member of the group, keyed
/// by peer id, and answers quorum questions over them.
#[derive(Clone, Debug, Default)]
pub struct ProgressSet {
    progress: HashMap<u64, Progress>,
}

impl ProgressSet {
    /// Creates a progress set with the given capacity.
    pub fn with_capacity(voters: usize) -> ProgressSet {
        ProgressSet {
            progress: HashMap::with_capacity_and_hasher(voters, Default::default()),
        }
    }

    /// The number of voters in the group.
    #[inline]
    pub fn len(&self) -> usize {
        self.progress.len()
    }

    /// Whether the group has no members at all.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.progress.is_empty()
    }

    /// The strict majority of the current membership.
    #[inline]
    pub fn quorum(&self) -> usize {
        majority(self.progress.len())
    }

    /// Whether `id` is a member of the group.
    #[inline]
    pub fn contains(&self, id: u64) -> bool {
        self.progress.contains_key(&id)
    }

    /// Returns the ids of all members, sorted.
    pub fn voter_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.progress.keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    /// Grabs a reference to the progress of a node.
    pub fn get(&self, id: u64) -> Option<&Progress> {
        self.progress.get(&id)
    }

    /// Grabs a mutable reference to the progress of a node.
    pub fn get_mut(&mut self, id: u64) -> Option<&mut Progress> {
        self.progress.get_mut(&id)
    }

    /// Returns an iterator across all the nodes and their progress.
    pub fn iter(&self) -> impl Iterator<Item = (&u64, &Progress)> {
        self.progress.iter()
    }

    /// Returns a mutable iterator across all the nodes and their progress.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&u64, &mut Progress)> {
        self.progress.iter_mut()
    }

    /// Adds a voter to the group.
    ///
    /// An existing member is left untouched; membership application must be
    /// idempotent because a restarting replica replays conf-change entries.
    pub fn insert_voter(&mut self, id: u64, pr: Progress) {
        self.progress.entry(id).or_insert(pr);
    }

    /// Removes the voter with the given id, returning its progress if it was
    /// a member.
    pub fn remove(&mut self, id: u64) -> Option<Progress> {
        self.progress.remove(&id)
    }

    /// The highest index replicated on a quorum of members: collect `matched`
    /// across the group, sort descending, and take position `quorum - 1`.
    ///
    /// # Panics
    ///
    /// Panics if the group is empty.
    pub fn maximal_committed_index(&self) -> u64 {
        let mut matched: Vec<u64> = self.progress.values().map(|pr| pr.matched).collect();
        matched.sort_unstable_by(|a, b| b.cmp(a));
        matched[self.quorum() - 1]
    }

    /// Determines the candidacy outcome from a vote tally. Votes from peers
    /// outside the current membership are ignored.
    pub fn candidacy_status(&self, votes: &HashMap<u64, bool>) -> CandidacyStatus {
        let (mut granted, mut rejected) = (0, 0);
        for (id, vote) in votes {
            if !self.progress.contains_key(id) {
                continue;
            }
            if *vote {
                granted += 1;
            } else {
                rejected += 1;
            }
        }
        if granted >= self.quorum() {
            CandidacyStatus::Elected
        } else if rejected >= self.quorum() {
            CandidacyStatus::Ineligible
        } else {
            CandidacyStatus::Eligible
        }
    }

    /// Determine if a quorum is formed from the given set of nodes.
    pub fn has_quorum(&self, potential_quorum: &HashSet<u64>) -> bool {
        let count = potential_quorum
            .iter()
            .filter(|id| self.progress.contains_key(id))
            .count();
        count >= self.quorum()
    }

    /// Returns whether a quorum of members was active since the last check,
    /// and resets every peer's activity flag for the next interval. The
    /// leader itself always counts as active.
    ///
    /// This is only called by the leader.
    pub fn quorum_recently_active(&mut self, perspective_of: u64) -> bool {
        let mut active = 0;
        for (&id, pr) in self.progress.iter_mut() {
            if id == perspective_of {
                active += 1;
                continue;
            }
            if pr.recent_active {
                active += 1;
            }
            pr.recent_active = false;
        }
        active >= self.quorum()
    }
}
