use std::hash::{BuildHasher, Hasher};

/// A `BuildHasher` whose digest is stored in the key itself: the first four
/// bytes, little endian. Lets tests place keys in chosen buckets.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct PrefixDigest;

#[derive(Default)]
pub(crate) struct PrefixDigestHasher {
    prefix: [u8; 4],
    len: usize,
}

impl BuildHasher for PrefixDigest {
    type Hasher = PrefixDigestHasher;

    fn build_hasher(&self) -> Self::Hasher {
        PrefixDigestHasher::default()
    }
}

impl Hasher for PrefixDigestHasher {
    fn write(&mut self, bytes: &[u8]) {
        for b in bytes {
            if self.len == self.prefix.len() {
                return;
            }
            self.prefix[self.len] = *b;
            self.len += 1;
        }
    }

    fn finish(&self) -> u64 {
        u32::from_le_bytes(self.prefix) as u64
    }
}

/// Builds a key whose `PrefixDigest` is `digest`.
pub(crate) fn key_with_digest(name: &str, digest: u32) -> Vec<u8> {
    let mut key = digest.to_le_bytes().to_vec();
    key.extend_from_slice(name.as_bytes());
    key
}

/// The digest `PrefixDigest` computes for `key`.
pub(crate) fn prefix_digest(key: &[u8]) -> u32 {
    let mut hasher = PrefixDigest.build_hasher();
    hasher.write(key);
    hasher.finish() as u32
}
