use std::num::NonZeroUsize;

/// Split `ids` into consecutive groups of `chunk_size`, the last one holding
/// the remainder. Order is preserved and no empty group is ever produced.
pub fn split<T: Clone>(ids: &[T], chunk_size: NonZeroUsize) -> Vec<Vec<T>> {
    ids.chunks(chunk_size.get()).map(<[T]>::to_vec).collect()
}
