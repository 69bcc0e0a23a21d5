use fxhash::FxBuildHasher;

/// Hash map used for all pool indices.
///
/// Iteration order is unspecified; anything that has to be processed in a fair order
/// (pending requests, idle slots) is kept in a separate ordered index.
pub type Map<K, V> = hashbrown::HashMap<K, V, FxBuildHasher>;

pub type Set<T> = hashbrown::HashSet<T, FxBuildHasher>;

#[inline]
pub fn new_map<K, V>() -> Map<K, V> {
    Map::with_hasher(FxBuildHasher::default())
}

#[inline]
pub fn new_set<T>() -> Set<T> {
    Set::with_hasher(FxBuildHasher::default())
}
