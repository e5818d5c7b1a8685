//! Deterministic module and chunk ids.
//!
//! An id is a prefix of the BLAKE3 hash of a stable key (a module's
//! root-relative path or a chunk's name). Each key gets the shortest prefix,
//! never below [`MIN_ID_LEN`], that no other key in the set shares. Adding a
//! key therefore only lengthens the ids it actually collides with. Ids
//! depend only on the set of keys, not on their order.

use std::collections::HashMap;

/// Shortest id length in hex characters.
pub const MIN_ID_LEN: usize = 8;

/// Assigns prefix-unique hash ids to a set of keys.
#[derive(Debug, Clone)]
pub struct IdAssigner {
    min_len: usize,
}

impl Default for IdAssigner {
    fn default() -> Self {
        Self {
            min_len: MIN_ID_LEN,
        }
    }
}

impl IdAssigner {
    /// Creates an assigner with a custom minimum length (clamped to 1..=64).
    pub fn with_min_len(min_len: usize) -> Self {
        Self {
            min_len: min_len.clamp(1, 64),
        }
    }

    /// Returns the id of every key, in input order. Equal keys get equal ids.
    pub fn assign<'a, I>(&self, keys: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let hashes: Vec<String> = keys.into_iter().map(full_hash).collect();

        let mut sorted: Vec<&str> = hashes.iter().map(String::as_str).collect();
        sorted.sort_unstable();
        sorted.dedup();

        // The longest prefix a hash shares with any other is the one shared
        // with a sorted neighbor.
        let mut lengths: HashMap<&str, usize> = sorted.iter().map(|&h| (h, self.min_len)).collect();
        for pair in sorted.windows(2) {
            let needed = (common_prefix(pair[0], pair[1]) + 1).min(64);
            for hash in pair {
                if let Some(len) = lengths.get_mut(hash)
                    && *len < needed
                {
                    *len = needed;
                }
            }
        }

        hashes
            .iter()
            .map(|h| {
                let len = lengths.get(h.as_str()).copied().unwrap_or(self.min_len);
                h[..len].to_string()
            })
            .collect()
    }

    /// Returns a key -> id map.
    pub fn assign_map<'a, I>(&self, keys: I) -> HashMap<String, String>
    where
        I: IntoIterator<Item = &'a str> + Clone,
    {
        let ids = self.assign(keys.clone());
        keys.into_iter().map(String::from).zip(ids).collect()
    }
}

fn full_hash(key: &str) -> String {
    blake3::hash(key.as_bytes()).to_hex().to_string()
}

fn common_prefix(a: &str, b: &str) -> usize {
    a.bytes().zip(b.bytes()).take_while(|(x, y)| x == y).count()
}
