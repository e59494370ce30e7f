use std::collections::BTreeMap;

/// Merge `overlay` on top of `base`, key by key.
/// Keys only in `base` are kept; on collision `overlay`'s value wins.
pub fn merge_last_wins<K: Ord, V>(mut base: BTreeMap<K, V>, overlay: BTreeMap<K, V>) -> BTreeMap<K, V> {
    base.extend(overlay);
    base
}

/// Fold a sequence of optional layers, lowest priority first.
/// `None` layers contribute nothing and never erase earlier entries.
pub fn merge_layers<K: Ord, V>(layers: impl IntoIterator<Item = Option<BTreeMap<K, V>>>) -> BTreeMap<K, V> {
    layers
        .into_iter()
        .flatten()
        .fold(BTreeMap::new(), merge_last_wins)
}

/// Keep the last `Some` of a sequence of optional layers (wholesale replacement).
pub fn last_some<T>(layers: impl IntoIterator<Item = Option<T>>) -> Option<T> {
    layers.into_iter().flatten().last()
}

/// Merge global-scope entries underneath a verb's own entries.
/// The verb's entry always wins on the same key.
pub fn apply_global<K: Ord + Clone, V: Clone>(
    global: &BTreeMap<K, V>,
    verb: BTreeMap<K, V>,
) -> BTreeMap<K, V> {
    merge_last_wins(global.clone(), verb)
}
