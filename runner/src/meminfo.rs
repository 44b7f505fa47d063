//! Parsing line-oriented `Key: value` text, such as `/proc/meminfo` or the output of the memory
//! introspection tool.
//!
//! Values are taken to be the first integer embedded in the value part of the line, so
//! `MemTotal:       16384000 kB` gives `16384000`. Nothing here knows what the numbers mean.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Host memory accounting.
pub const PROC_MEMINFO: &str = "/proc/meminfo";

/// `/proc/meminfo` fields the benchmark reads. All are in KiB.
pub mod fields {
    pub const MEM_TOTAL: &str = "MemTotal";
    pub const MEM_AVAILABLE: &str = "MemAvailable";
    pub const ACTIVE_ANON: &str = "Active(anon)";
    pub const ANON_PAGES: &str = "AnonPages";
    pub const MAPPED: &str = "Mapped";
    pub const SHMEM: &str = "Shmem";

    /// Reported by the introspection tool, in KiB.
    pub const TOTAL_OVERHEAD: &str = "Total Overhead";
}

/// Split a line into its key and value at the first colon.
fn split_line(line: &str) -> Option<(&str, &str)> {
    let colon = line.find(':')?;
    Some((line[..colon].trim(), &line[colon + 1..]))
}

/// The first run of ASCII digits in `s`, parsed.
fn first_integer(s: &str) -> Option<u64> {
    let start = s.find(|c: char| c.is_ascii_digit())?;
    let rest = &s[start..];
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or_else(|| rest.len());
    rest[..end].parse().ok()
}

/// Find the line whose key is exactly `field` and return the first integer in its value. Returns
/// `None` if there is no such line or the line carries no integer.
pub fn extract_field(text: &str, field: &str) -> Option<u64> {
    text.lines()
        .filter_map(split_line)
        .find(|(key, _)| *key == field)
        .and_then(|(_, value)| first_integer(value))
}

/// All `key: integer` pairs in `text`. Lines without a colon or without an integer are skipped.
/// If a key repeats, the first occurrence wins, matching `extract_field`.
pub fn parse_key_values(text: &str) -> BTreeMap<String, u64> {
    let mut map = BTreeMap::new();
    for (key, value) in text.lines().filter_map(split_line) {
        if let Some(v) = first_integer(value) {
            map.entry(key.to_owned()).or_insert(v);
        }
    }
    map
}

pub fn kib_to_gib(kib: u64) -> f64 {
    kib as f64 / 1024.0 / 1024.0
}

pub fn kib_to_mib(kib: u64) -> f64 {
    kib as f64 / 1024.0
}

/// The `/proc/meminfo` values of interest, in KiB.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MeminfoSample {
    pub mem_total: Option<u64>,
    pub mem_available: Option<u64>,
    pub active_anon: Option<u64>,
    pub anon_pages: Option<u64>,
    pub mapped: Option<u64>,
    pub shmem: Option<u64>,
}

impl MeminfoSample {
    pub fn parse(text: &str) -> Self {
        let map = parse_key_values(text);
        let get = |f: &str| map.get(f).cloned();

        MeminfoSample {
            mem_total: get(fields::MEM_TOTAL),
            mem_available: get(fields::MEM_AVAILABLE),
            active_anon: get(fields::ACTIVE_ANON),
            anon_pages: get(fields::ANON_PAGES),
            mapped: get(fields::MAPPED),
            shmem: get(fields::SHMEM),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MEMINFO: &str = "\
MemTotal:       65641272 kB
MemFree:        40019884 kB
MemAvailable:   48121740 kB
Buffers:          412120 kB
Cached:          8462604 kB
Active(anon):   14901220 kB
Inactive(anon):    12408 kB
AnonPages:      14886848 kB
Mapped:           632436 kB
Shmem:            123456 kB
HugePages_Total:       0
Hugepagesize:       2048 kB
DirectMap4k:      612200 kB
";

    #[test]
    fn exact_field_match() {
        let text = "MemTotal:    16384000 kB\nMemFree:    2048 kB";
        assert_eq!(extract_field(text, "MemTotal"), Some(16384000));
        assert_eq!(extract_field(text, "MemFree"), Some(2048));
        assert_eq!(extract_field(text, "Mem"), None);
        assert_eq!(extract_field(text, "Total"), None);
        assert_eq!(extract_field(text, "MemTotal"), extract_field(text, "MemTotal"));
    }

    #[test]
    fn parenthesized_keys() {
        assert_eq!(extract_field(MEMINFO, "Active(anon)"), Some(14901220));
        assert_eq!(extract_field(MEMINFO, "Inactive(anon)"), Some(12408));
    }

    #[test]
    fn digits_in_key_are_not_values() {
        assert_eq!(extract_field(MEMINFO, "DirectMap4k"), Some(612200));
    }

    #[test]
    fn overhead_line() {
        let out = "pid 4242: guest size 16777216 KiB\n\
                   Page tables: 33000 KiB\n\
                   Total Overhead: 123456 KiB (0.74%)\n";
        assert_eq!(extract_field(out, fields::TOTAL_OVERHEAD), Some(123456));
        assert_eq!(extract_field("", fields::TOTAL_OVERHEAD), None);
        assert_eq!(extract_field("Total Overhead: n/a", fields::TOTAL_OVERHEAD), None);
    }

    #[test]
    fn key_values() {
        let map = parse_key_values(MEMINFO);
        assert_eq!(map.len(), 13);
        assert_eq!(map["HugePages_Total"], 0);
        assert_eq!(map["Shmem"], 123456);
        assert!(parse_key_values("no colon here\n: \n").is_empty());
    }

    #[test]
    fn units() {
        assert_eq!(kib_to_gib(1048576), 1.0);
        assert_eq!(kib_to_gib(0), 0.0);
        assert_eq!(kib_to_gib(3 * 1048576 / 2), 1.5);
        assert_eq!(kib_to_mib(2048), 2.0);
    }

    #[test]
    fn sample() {
        let s = MeminfoSample::parse(MEMINFO);
        assert_eq!(s.mem_total, Some(65641272));
        assert_eq!(s.mem_available, Some(48121740));
        assert_eq!(s.active_anon, Some(14901220));
        assert_eq!(s.anon_pages, Some(14886848));
        assert_eq!(s.mapped, Some(632436));
        assert_eq!(s.shmem, Some(123456));

        assert_eq!(MeminfoSample::parse(""), MeminfoSample::default());
    }
}
