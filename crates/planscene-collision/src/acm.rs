//! Allowed-collision matrix.
//!
//! A symmetric table from pairs of entity names (links, attached bodies,
//! world objects) to an [`AllowedCollision`] verdict, plus per-name default
//! verdicts consulted when a pair has no explicit entry.
//!
//! | Lookup | Result |
//! |--------|--------|
//! | explicit pair entry | that entry |
//! | one name has a default | that default |
//! | both names have defaults | the more restrictive (`Never` > `Conditional` > `Always`) |
//! | nothing | no verdict (the pair collides) |

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use planscene_types::AllowedCollisionMatrixMsg;
use tracing::error;

use crate::types::Contact;

/// Predicate deciding whether a specific contact is acceptable.
pub type ContactPredicate = Arc<dyn Fn(&Contact) -> bool + Send + Sync>;

#[derive(Clone)]
pub enum AllowedCollision {
    Never,
    Always,
    Conditional(ContactPredicate),
}

impl AllowedCollision {
    pub fn from_bool(allowed: bool) -> Self {
        if allowed {
            AllowedCollision::Always
        } else {
            AllowedCollision::Never
        }
    }

    /// Whether `contact` is acceptable under this verdict.
    pub fn allows(&self, contact: &Contact) -> bool {
        match self {
            AllowedCollision::Never => false,
            AllowedCollision::Always => true,
            AllowedCollision::Conditional(f) => f(contact),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            AllowedCollision::Never => 2,
            AllowedCollision::Conditional(_) => 1,
            AllowedCollision::Always => 0,
        }
    }
}

impl PartialEq for AllowedCollision {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (AllowedCollision::Never, AllowedCollision::Never) => true,
            (AllowedCollision::Always, AllowedCollision::Always) => true,
            (AllowedCollision::Conditional(a), AllowedCollision::Conditional(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for AllowedCollision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllowedCollision::Never => f.write_str("Never"),
            AllowedCollision::Always => f.write_str("Always"),
            AllowedCollision::Conditional(_) => f.write_str("Conditional"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AllowedCollisionMatrix {
    entries: BTreeMap<String, BTreeMap<String, AllowedCollision>>,
    defaults: BTreeMap<String, AllowedCollision>,
}

impl AllowedCollisionMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Matrix where every listed pair (in both orders) has `allowed`.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>, allowed: bool) -> Self {
        let mut acm = Self::new();
        for (a, b) in pairs {
            acm.set_entry(a, b, allowed);
        }
        acm
    }

    /// Build from the dense message form.  Rows whose length does not match
    /// the name list are logged and skipped.
    pub fn from_msg(msg: &AllowedCollisionMatrixMsg) -> Self {
        let mut acm = Self::new();
        let n = msg.entry_names.len();
        if msg.entry_values.len() != n {
            error!(
                names = n,
                rows = msg.entry_values.len(),
                "The number of allowed-collision rows does not match the number of names"
            );
        }
        for (i, row) in msg.entry_values.iter().enumerate().take(n) {
            if row.len() != n {
                error!(entry = %msg.entry_names[i], "Allowed-collision row has the wrong length");
                continue;
            }
            for j in i..n {
                acm.set_entry(&msg.entry_names[i], &msg.entry_names[j], row[j]);
            }
        }
        for (name, allowed) in msg.default_entry_names.iter().zip(&msg.default_entry_values) {
            acm.set_default_entry(name, *allowed);
        }
        acm
    }

    /// Dense message form; conditional entries serialise as not allowed.
    pub fn to_msg(&self) -> AllowedCollisionMatrixMsg {
        let names = self.entry_names();
        let entry_values = names
            .iter()
            .map(|a| {
                names
                    .iter()
                    .map(|b| matches!(self.entry(a, b), Some(AllowedCollision::Always)))
                    .collect()
            })
            .collect();
        let (default_entry_names, default_entry_values) = self
            .defaults
            .iter()
            .map(|(name, v)| (name.clone(), matches!(v, AllowedCollision::Always)))
            .unzip();
        AllowedCollisionMatrixMsg {
            entry_names: names,
            entry_values,
            default_entry_names,
            default_entry_values,
        }
    }

    // ── Explicit entries ────────────────────────────────────────────────────

    fn insert(&mut self, a: &str, b: &str, value: AllowedCollision) {
        self.entries
            .entry(a.to_string())
            .or_default()
            .insert(b.to_string(), value.clone());
        self.entries
            .entry(b.to_string())
            .or_default()
            .insert(a.to_string(), value);
    }

    pub fn set_entry(&mut self, a: &str, b: &str, allowed: bool) {
        self.insert(a, b, AllowedCollision::from_bool(allowed));
    }

    pub fn set_entry_fn(&mut self, a: &str, b: &str, predicate: ContactPredicate) {
        self.insert(a, b, AllowedCollision::Conditional(predicate));
    }

    /// Set `name` against every other name already in the matrix.
    pub fn set_entry_for_name(&mut self, name: &str, allowed: bool) {
        let others: Vec<String> = self
            .entries
            .keys()
            .filter(|k| k.as_str() != name)
            .cloned()
            .collect();
        for other in others {
            self.set_entry(name, &other, allowed);
        }
    }

    /// Set every pair `(a, b)` with `a` in `first` and `b` in `second`.
    pub fn set_entry_between(&mut self, first: &[&str], second: &[&str], allowed: bool) {
        for a in first {
            for b in second {
                self.set_entry(a, b, allowed);
            }
        }
    }

    /// Set every pair among the names already present.
    pub fn set_all_entries(&mut self, allowed: bool) {
        let names: Vec<String> = self.entries.keys().cloned().collect();
        for (i, a) in names.iter().enumerate() {
            for b in &names[i + 1..] {
                self.set_entry(a, b, allowed);
            }
        }
    }

    pub fn remove_pair(&mut self, a: &str, b: &str) {
        for (x, y) in [(a, b), (b, a)] {
            if let Some(row) = self.entries.get_mut(x) {
                row.remove(y);
                if row.is_empty() {
                    self.entries.remove(x);
                }
            }
        }
    }

    /// Remove every entry mentioning `name`.
    pub fn remove_entry(&mut self, name: &str) {
        self.entries.remove(name);
        self.entries.retain(|_, row| {
            row.remove(name);
            !row.is_empty()
        });
    }

    pub fn has_entry(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn has_pair_entry(&self, a: &str, b: &str) -> bool {
        self.entry(a, b).is_some()
    }

    pub fn entry(&self, a: &str, b: &str) -> Option<&AllowedCollision> {
        self.entries.get(a).and_then(|row| row.get(b))
    }

    // ── Defaults ────────────────────────────────────────────────────────────

    pub fn set_default_entry(&mut self, name: &str, allowed: bool) {
        self.defaults
            .insert(name.to_string(), AllowedCollision::from_bool(allowed));
    }

    pub fn set_default_entry_fn(&mut self, name: &str, predicate: ContactPredicate) {
        self.defaults
            .insert(name.to_string(), AllowedCollision::Conditional(predicate));
    }

    pub fn default_entry(&self, name: &str) -> Option<&AllowedCollision> {
        self.defaults.get(name)
    }

    // ── Lookup ──────────────────────────────────────────────────────────────

    /// Effective verdict for a pair (see the module table).
    pub fn allowed_collision(&self, a: &str, b: &str) -> Option<&AllowedCollision> {
        if let Some(v) = self.entry(a, b) {
            return Some(v);
        }
        match (self.defaults.get(a), self.defaults.get(b)) {
            (None, None) => None,
            (Some(x), None) | (None, Some(x)) => Some(x),
            (Some(x), Some(y)) => Some(if y.rank() > x.rank() { y } else { x }),
        }
    }

    /// Sorted names with an explicit or default entry.
    pub fn entry_names(&self) -> Vec<String> {
        self.entries
            .keys()
            .chain(self.defaults.keys())
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entry_names().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.defaults.is_empty()
    }
}
