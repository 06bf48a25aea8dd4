//! Record decoding
//!
//! A shard is a tar archive in which consecutive members sharing a key
//! (the path up to the first `.` of the file name) form one record, e.g.
//! `000123.jpg` + `000123.txt` + `000123.json`.
//!
//! Decoding is lenient per member: a member without a usable key or whose
//! body cannot be read is skipped and counted, not fatal. A broken archive
//! stream is fatal because nothing after it can be trusted.

use std::io::{self, Read};
use tracing::{debug, warn};

/// Totals for one decoded shard
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordCount {
    pub records: u64,
    pub skipped_members: u64,
}

/// Streams an archive and counts its records
pub fn count_records<R: Read>(reader: R) -> io::Result<RecordCount> {
    let mut archive = tar::Archive::new(reader);
    let mut count = RecordCount::default();
    let mut current_key: Option<String> = None;

    for entry in archive.entries()? {
        let mut entry = entry?;

        if !entry.header().entry_type().is_file() {
            continue;
        }

        let Some(key) = record_key(&entry.path_bytes()) else {
            warn!(
                "Skipping member without a record key: {}",
                String::from_utf8_lossy(&entry.path_bytes())
            );
            count.skipped_members += 1;
            continue;
        };

        if let Err(e) = io::copy(&mut entry, &mut io::sink()) {
            warn!("Skipping unreadable member of record {}: {}", key, e);
            count.skipped_members += 1;
            continue;
        }

        if current_key.as_deref() != Some(key.as_str()) {
            count.records += 1;
            current_key = Some(key);
        }
    }

    debug!(
        "Decoded {} record(s), skipped {} member(s)",
        count.records, count.skipped_members
    );

    Ok(count)
}

/// Key of the record an archive member belongs to
///
/// `dir/000123.jpg` and `dir/000123.meta.json` both map to `dir/000123`.
fn record_key(path: &[u8]) -> Option<String> {
    let path = std::str::from_utf8(path).ok()?;
    let name_start = path.rfind('/').map_or(0, |i| i + 1);
    let name = &path[name_start..];
    let dot = name.find('.')?;

    if dot == 0 || dot + 1 == name.len() {
        return None;
    }

    Some(path[..name_start + dot].to_string())
}
