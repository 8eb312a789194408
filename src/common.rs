pub(crate) mod concurrent;
pub(crate) mod error;

#[cfg(test)]
pub(crate) mod test_utils;

/// Returns `2^power - 1`, the mask selecting a bucket of a `2^power` array.
#[inline]
pub(crate) fn hash_mask(power: u32) -> u64 {
    hash_size(power) - 1
}

#[inline]
pub(crate) fn hash_size(power: u32) -> u64 {
    1u64 << power
}
