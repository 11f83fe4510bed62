//! Per-name icon cache.
//!
//! Entries are only ever added.  A name is fetched at most once at a time:
//! `begin_fetch` refuses names that are cached or already in flight.  A
//! failed fetch clears the in-flight mark so the next listing retries it.

use std::collections::{HashMap, HashSet};

#[derive(Debug, Default)]
pub struct IconCache {
    icons: HashMap<String, String>,
    in_flight: HashSet<String>,
}

impl IconCache {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.icons.get(name).map(String::as_str)
    }

    #[cfg(test)]
    pub fn contains(&self, name: &str) -> bool {
        self.icons.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.icons.len()
    }

    /// Claim `name` for a network fetch.  `false` means the caller must not
    /// issue one.
    pub fn begin_fetch(&mut self, name: &str) -> bool {
        if self.icons.contains_key(name) || self.in_flight.contains(name) {
            return false;
        }
        self.in_flight.insert(name.to_string());
        true
    }

    /// Record the outcome of a fetch started with `begin_fetch`.  Returns
    /// `true` when a new icon was stored.
    pub fn finish_fetch(&mut self, name: &str, data_url: Option<String>) -> bool {
        self.in_flight.remove(name);
        match data_url {
            Some(url) if !self.icons.contains_key(name) => {
                self.icons.insert(name.to_string(), url);
                true
            }
            _ => false,
        }
    }

    #[cfg(test)]
    pub fn is_in_flight(&self, name: &str) -> bool {
        self.in_flight.contains(name)
    }
}
