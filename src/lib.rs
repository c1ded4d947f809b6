// Copyright 2020 The miniraft developers. Licensed under Apache-2.0.

/*!

A pure, message-driven implementation of the Raft distributed consensus
algorithm.

The core of this crate is a deterministic state machine: given a stream of
inbound [`Message`](message/struct.Message.html)s and periodic logical clock
ticks it produces outbound messages and advances a replicated log, with no
I/O, threads or timers of its own. A cluster of such state machines maintains
an identical, linearizable sequence of committed entries.

## Creating a Raft node

You can use [`RawNode::new`](raw_node/struct.RawNode.html#method.new) to create
the Raft node. To create the Raft node, you need to provide a
[`Storage`](storage/trait.Storage.html) component, and a
[`Config`](struct.Config.html) to the `RawNode::new` function.

```rust
use miniraft::{
    Config,
    storage::MemStorage,
    raw_node::RawNode,
};
use slog::{Drain, o};

// Select some defaults, then change what we need.
let config = Config {
    id: 1,
    ..Default::default()
};
// Initialize logger.
let logger = slog::Logger::root(slog_stdlog::StdLog.fuse(), o!());
// After, make sure it's valid!
config.validate().unwrap();
// We'll use the built-in `MemStorage`, but you will likely want your own.
// Finally, create our Raft node!
let storage = MemStorage::new_with_conf_state(vec![1]);
let mut node = RawNode::new(&config, storage, &logger).unwrap();
// We will coax it into being the lead of a single node cluster for exploration.
node.raft.become_candidate();
node.raft.become_leader();
```

## Ticking the Raft node

Use a timer to tick the Raft node at regular intervals. See the following
example using Rust channel `recv_timeout` to drive the Raft node at least every
100ms, calling [`tick()`](raw_node/struct.RawNode.html#method.tick) each time.

```rust
# use slog::{Drain, o};
# use miniraft::{Config, storage::MemStorage, raw_node::RawNode};
# let config = Config { id: 1, ..Default::default() };
# let store = MemStorage::new_with_conf_state(vec![1]);
# let logger = slog::Logger::root(slog_stdlog::StdLog.fuse(), o!());
# let mut node = RawNode::new(&config, store, &logger).unwrap();
# node.raft.become_candidate();
# node.raft.become_leader();
use std::{sync::mpsc::{channel, RecvTimeoutError}, time::{Instant, Duration}};

// We're using a channel, but this could be any stream of events.
let (tx, rx) = channel();
let timeout = Duration::from_millis(100);
let mut remaining_timeout = timeout;

// Send the `tx` somewhere else...

loop {
    let now = Instant::now();

    match rx.recv_timeout(remaining_timeout) {
        Ok(()) => {
            // Let's save this for later.
            unimplemented!()
        },
        Err(RecvTimeoutError::Timeout) => (),
        Err(RecvTimeoutError::Disconnected) => unimplemented!(),
    }

    let elapsed = now.elapsed();
    if elapsed >= remaining_timeout {
        remaining_timeout = timeout;
        // We drive Raft every 100ms.
        node.tick();
    } else {
        remaining_timeout -= elapsed;
    }
#    break;
}
```

## Proposing to, and stepping the Raft node

Use `propose` to drive the Raft node when the client sends a request to the
Raft server, and `step` when you receive a message from another node.

```rust
# use miniraft::{Config, storage::MemStorage, raw_node::RawNode, message::Message};
# use std::{
#     sync::mpsc::{channel, RecvTimeoutError},
#     time::{Instant, Duration},
#     collections::HashMap
# };
# use slog::{Drain, o};
#
# let config = Config { id: 1, ..Default::default() };
# let store = MemStorage::new_with_conf_state(vec![1]);
# let logger = slog::Logger::root(slog_stdlog::StdLog.fuse(), o!());
# let mut node = RawNode::new(&config, store, &logger).unwrap();
# node.raft.become_candidate();
# node.raft.become_leader();
#
# let (tx, rx) = channel();
# let timeout = Duration::from_millis(100);
# let mut remaining_timeout = timeout;
#
enum Msg {
    Propose {
        id: u8,
        callback: Box<dyn Fn() + Send>,
    },
    Raft(Message),
}

// Simulate a message coming down the stream.
tx.send(Msg::Propose { id: 1, callback: Box::new(|| ()) });

let mut cbs = HashMap::new();
loop {
    let now = Instant::now();

    match rx.recv_timeout(remaining_timeout) {
        Ok(Msg::Propose { id, callback }) => {
            cbs.insert(id, callback);
            node.propose(vec![], vec![id]).unwrap();
        }
        Ok(Msg::Raft(m)) => node.step(m).unwrap(),
        Err(RecvTimeoutError::Timeout) => (),
        Err(RecvTimeoutError::Disconnected) => unimplemented!(),
    }

    let elapsed = now.elapsed();
    if elapsed >= remaining_timeout {
        remaining_timeout = timeout;
        // We drive Raft every 100ms.
        node.tick();
    } else {
        remaining_timeout -= elapsed;
    }
    break;
}
```

## Processing the `Ready` State

When your Raft node is ticked and running, Raft should enter a `Ready` state.
You need to first use `has_ready` to check whether Raft is ready. If yes, use
the `ready` function to get a `Ready` state, then:

1. Apply the snapshot in the `Ready`, if any.
2. Append `entries` to the Raft log of your storage.
3. Persist the hard state, if it changed.
4. Send the messages to the other peers.
5. Apply `committed_entries` to your state machine, remembering the last
   applied index.
6. Call `advance` to prepare for the next `Ready` state.

```rust
# use slog::{Drain, o};
# use miniraft::{Config, storage::MemStorage, raw_node::RawNode, message::EntryType};
#
# let config = Config { id: 1, ..Default::default() };
# config.validate().unwrap();
# let store = MemStorage::new_with_conf_state(vec![1]);
# let logger = slog::Logger::root(slog_stdlog::StdLog.fuse(), o!());
# let mut node = RawNode::new(&config, store, &logger).unwrap();
#
if !node.has_ready() {
    return;
}

// The Raft is ready, we can do something now.
let mut ready = node.ready();

if !ready.snapshot().is_empty() {
    // This is a snapshot, we need to apply the snapshot at first.
    node.mut_store()
        .wl()
        .apply_snapshot(ready.snapshot().clone())
        .unwrap();
}

if !ready.entries.is_empty() {
    // Append entries to the Raft log.
    node.mut_store().wl().append(&ready.entries).unwrap();
}

if let Some(hs) = ready.hs() {
    // Raft HardState changed, and we need to persist it.
    node.mut_store().wl().set_hardstate(hs.clone());
}

for _msg in ready.messages.drain(..) {
    // Send messages to other peers.
}

if let Some(committed_entries) = ready.committed_entries.take() {
    let mut _last_apply_index = 0;
    for entry in committed_entries {
        // Mostly, you need to save the last apply index to resume applying
        // after restart. Here we just ignore this because we use a Memory storage.
        _last_apply_index = entry.index;

        if entry.data.is_empty() {
            // Empty entry, when the peer becomes Leader it will send an empty entry.
            continue;
        }

        match entry.entry_type {
            EntryType::EntryNormal => (),
            EntryType::EntryConfChange => (),
        }
    }
}

node.advance(ready);
```

## Membership changes

Membership is changed one server at a time: propose a
[`ConfChange`](message/struct.ConfChange.html) with `propose_conf_change`,
wait for the entry to commit and be handed back through `committed_entries`,
and then call `apply_conf_change`. Only one change may be pending at a time;
further conf-change proposals are down-converted to empty entries until the
pending one is applied.

*/

#![deny(clippy::all)]
#![deny(missing_docs)]
#![recursion_limit = "128"]

#[macro_use]
extern crate getset;
#[macro_use]
extern crate quick_error;
#[macro_use]
extern crate slog;

macro_rules! fatal {
    ($logger:expr, $msg:expr) => {{
        let owned_kv = ($logger).list();
        let s = crate::util::format_kv_list(&owned_kv);
        if s.is_empty() {
            panic!("{}", $msg)
        } else {
            panic!("{}, {}", $msg, s)
        }
    }};
    ($logger:expr, $fmt:expr, $($arg:tt)+) => {{
        fatal!($logger, format_args!($fmt, $($arg)+))
    }};
}

mod config;
mod errors;
mod log_unstable;
pub mod message;
mod progress;
mod raft;
mod raft_log;
pub mod raw_node;
mod status;
pub mod storage;
pub mod util;

pub use self::config::Config;
pub use self::errors::{Error, Result, StorageError};
pub use self::log_unstable::Unstable;
pub use self::progress::{CandidacyStatus, Progress, ProgressSet};
pub use self::raft::{Raft, SoftState, StateRole, INVALID_ID, INVALID_INDEX};
pub use self::raft_log::{RaftLog, NO_LIMIT};
pub use self::raw_node::{is_local_msg, Peer, RawNode, Ready};
pub use self::status::Status;
pub use self::storage::{MemStorage, RaftState, Storage};
pub use self::util::majority;

pub mod prelude {
    //! A "prelude" for crates using this crate.
    //!
    //! This prelude is similar to the standard library's prelude in that you'll
    //! almost always want to import its entire contents, but unlike the standard
    //! library's prelude you'll have to do so manually:
    //!
    //! ```
    //! use miniraft::prelude::*;
    //! ```
    //!
    //! The prelude may grow over time as additional items see ubiquitous use.

    pub use crate::config::Config;
    pub use crate::message::{
        ConfChange, ConfChangeType, ConfState, Entry, EntryType, HardState, Message, MessageType,
        Snapshot, SnapshotMetadata,
    };
    pub use crate::raft::Raft;
    pub use crate::raw_node::{Peer, RawNode, Ready};
    pub use crate::status::Status;
    pub use crate::storage::{MemStorage, RaftState, Storage};
    pub use crate::Progress;
}

/// The terminal logger used by tests and examples, filtered through
/// `RUST_LOG` and tagged with the running test's name.
#[cfg(any(test, feature = "default-logger"))]
pub fn default_logger() -> slog::Logger {
    use slog::Drain;
    use std::sync::Mutex;

    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::CompactFormat::new(decorator).build();
    let drain = slog_envlogger::new(drain);
    let logger = slog::Logger::root(Mutex::new(drain).fuse(), o!());

    if let Some(case) = std::thread::current()
        .name()
        .and_then(|v| v.split(':').last())
    {
        logger.new(o!("case" => case.to_string()))
    } else {
        logger.new(o!())
    }
}

type DefaultHashBuilder = std::hash::BuildHasherDefault<fxhash::FxHasher>;
type HashMap<K, V> = std::collections::HashMap<K, V, DefaultHashBuilder>;
type HashSet<K> = std::collections::HashSet<K, DefaultHashBuilder>;
