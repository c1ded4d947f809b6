// Copyright 2020 The miniraft developers. Licensed under Apache-2.0.

mod test_raft;
mod test_raw_node;
