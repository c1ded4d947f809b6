// Copyright 2020 The miniraft developers. Licensed under Apache-2.0.

//! This module contains a collection of various tools to use to manipulate
//! and control messages and data associated with raft.

use std::fmt;
use std::fmt::Write;
use std::u64;

use slog::{OwnedKVList, Record, KV};

use crate::message::Entry;

/// A number to represent that there is no limit.
pub const NO_LIMIT: u64 = u64::MAX;

/// The rough in-memory footprint of an entry, used to enforce aggregate
/// byte limits on log reads and outgoing appends.
#[inline]
pub fn entry_approximate_size(e: &Entry) -> usize {
    // Payloads plus the fixed header fields (type, term, index).
    e.data.len() + e.context.len() + 24
}

/// Truncates the list of entries down to a specific byte-length of
/// all entries together.
///
/// The first entry is always kept, no matter how large, so that replication
/// can make progress.
///
/// # Examples
///
/// ```
/// use miniraft::{util::limit_size, prelude::*};
///
/// let template = {
///     let mut entry = Entry::default();
///     entry.data = "*".repeat(100).into_bytes();
///     entry
/// };
///
/// // Make a bunch of entries that are ~124 bytes long
/// let mut entries = vec![
///     template.clone(),
///     template.clone(),
///     template.clone(),
///     template.clone(),
///     template.clone(),
/// ];
///
/// assert_eq!(entries.len(), 5);
/// limit_size(&mut entries, Some(275));
/// assert_eq!(entries.len(), 2);
///
/// // `entries` will always have at least 1 entry.
/// limit_size(&mut entries, Some(0));
/// assert_eq!(entries.len(), 1);
/// ```
pub fn limit_size(entries: &mut Vec<Entry>, max: Option<u64>) {
    if entries.len() <= 1 {
        return;
    }
    let max = match max {
        None | Some(NO_LIMIT) => return,
        Some(max) => max,
    };

    let mut size = 0;
    let limit = entries
        .iter()
        .take_while(|&e| {
            if size == 0 {
                size += entry_approximate_size(e) as u64;
                true
            } else {
                size += entry_approximate_size(e) as u64;
                size <= max
            }
        })
        .count();

    entries.truncate(limit);
}

struct FormatKeyValueList {
    pub buffer: String,
}

impl slog::Serializer for FormatKeyValueList {
    fn emit_arguments(&mut self, key: slog::Key, val: &fmt::Arguments) -> slog::Result {
        if !self.buffer.is_empty() {
            write!(&mut self.buffer, ", {}: {}", key, val).unwrap();
        } else {
            write!(&mut self.buffer, "{}: {}", key, val).unwrap();
        }
        Ok(())
    }
}

pub(crate) fn format_kv_list(kv_list: &OwnedKVList) -> String {
    let mut formatter = FormatKeyValueList {
        buffer: "".to_owned(),
    };
    let record = record_static!(slog::Level::Trace, "");
    kv_list
        .serialize(
            &Record::new(&record, &format_args!(""), b!()),
            &mut formatter,
        )
        .unwrap();
    formatter.buffer
}

/// Get the majority number of given nodes count.
#[inline]
pub fn majority(total: usize) -> usize {
    (total / 2) + 1
}
