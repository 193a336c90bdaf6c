//! Provisional-to-canonical key aliasing.
//!
//! When a create is rekeyed, the provisional key becomes an alias of the
//! canonical key. Read and mutation entry points resolve aliases so callers
//! holding the provisional key keep working after the rekey.

use dashmap::DashMap;
use stratum_core::StoreKey;

/// Bound on alias-chain traversal. Chains longer than this indicate a
/// cycle introduced by conflicting rekeys and resolution stops.
const MAX_HOPS: usize = 8;

/// Concurrent map of provisional → canonical key aliases.
#[derive(Default)]
pub struct KeyAliasMap {
    aliases: DashMap<StoreKey, StoreKey>,
}

impl KeyAliasMap {
    /// Creates an empty alias map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `provisional` as an alias of `canonical`.
    pub fn record(&self, provisional: StoreKey, canonical: StoreKey) {
        if provisional != canonical {
            self.aliases.insert(provisional, canonical);
        }
    }

    /// Resolves `key` through any recorded aliases.
    #[must_use]
    pub fn resolve(&self, key: &StoreKey) -> StoreKey {
        let mut current = key.clone();
        for _ in 0..MAX_HOPS {
            match self.aliases.get(&current) {
                Some(next) => current = next.clone(),
                None => break,
            }
        }
        current
    }

    /// Number of recorded aliases.
    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    /// Whether no alias is recorded.
    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(id: &str) -> StoreKey {
        StoreKey::by_id("app", "user", id)
    }

    #[test]
    fn unaliased_keys_resolve_to_themselves() {
        let aliases = KeyAliasMap::new();
        assert_eq!(aliases.resolve(&key("1")), key("1"));
    }

    #[test]
    fn provisional_resolves_to_canonical() {
        let aliases = KeyAliasMap::new();
        aliases.record(key("prov"), key("srv-1"));
        assert_eq!(aliases.resolve(&key("prov")), key("srv-1"));
        assert_eq!(aliases.resolve(&key("srv-1")), key("srv-1"));
    }

    #[test]
    fn chains_resolve_transitively() {
        let aliases = KeyAliasMap::new();
        aliases.record(key("a"), key("b"));
        aliases.record(key("b"), key("c"));
        assert_eq!(aliases.resolve(&key("a")), key("c"));
    }

    #[test]
    fn self_alias_is_ignored() {
        let aliases = KeyAliasMap::new();
        aliases.record(key("a"), key("a"));
        assert!(aliases.is_empty());
        assert_eq!(aliases.resolve(&key("a")), key("a"));
    }

    #[test]
    fn cycles_terminate() {
        let aliases = KeyAliasMap::new();
        aliases.record(key("a"), key("b"));
        aliases.record(key("b"), key("a"));
        // Resolution must stop; landing on either side of the cycle is fine.
        let resolved = aliases.resolve(&key("a"));
        assert!(resolved == key("a") || resolved == key("b"));
    }
}
