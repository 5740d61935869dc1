//! Hashing System - lookup3 digests for fixtures
//!
//! Bob Jenkins' `hashlittle2` (the same lookup3 variant HDF5 uses for its
//! metadata checksums). Digests are pure functions of their input bytes and
//! seed, so golden values survive across files and reader implementations.

use byteorder::{ByteOrder, LittleEndian};

/// Initial accumulator value before length and seed are added.
pub const LOOKUP3_INIT: u32 = 0xDEAD_BEEF;

const BLOCK: usize = 12;

struct State {
    a: u32,
    b: u32,
    c: u32,
}

impl State {
    fn new(length: usize, seed: u32) -> Self {
        // Lengths beyond u32 wrap, matching the reference on 32-bit counters.
        let init = LOOKUP3_INIT
            .wrapping_add(length as u32)
            .wrapping_add(seed);
        Self { a: init, b: init, c: init }
    }

    /// Add one little-endian 12-byte group to the accumulators.
    fn absorb(&mut self, block: &[u8]) {
        self.a = self.a.wrapping_add(LittleEndian::read_u32(&block[0..4]));
        self.b = self.b.wrapping_add(LittleEndian::read_u32(&block[4..8]));
        self.c = self.c.wrapping_add(LittleEndian::read_u32(&block[8..12]));
    }

    fn mix(&mut self) {
        let Self { a, b, c } = self;
        *a = a.wrapping_sub(*c);
        *a ^= c.rotate_left(4);
        *c = c.wrapping_add(*b);
        *b = b.wrapping_sub(*a);
        *b ^= a.rotate_left(6);
        *a = a.wrapping_add(*c);
        *c = c.wrapping_sub(*b);
        *c ^= b.rotate_left(8);
        *b = b.wrapping_add(*a);
        *a = a.wrapping_sub(*c);
        *a ^= c.rotate_left(16);
        *c = c.wrapping_add(*b);
        *b = b.wrapping_sub(*a);
        *b ^= a.rotate_left(19);
        *a = a.wrapping_add(*c);
        *c = c.wrapping_sub(*b);
        *c ^= b.rotate_left(4);
        *b = b.wrapping_add(*a);
    }

    fn finish(&mut self) {
        let Self { a, b, c } = self;
        *c ^= *b;
        *c = c.wrapping_sub(b.rotate_left(14));
        *a ^= *c;
        *a = a.wrapping_sub(c.rotate_left(11));
        *b ^= *a;
        *b = b.wrapping_sub(a.rotate_left(25));
        *c ^= *b;
        *c = c.wrapping_sub(b.rotate_left(16));
        *a ^= *c;
        *a = a.wrapping_sub(c.rotate_left(4));
        *b ^= *a;
        *b = b.wrapping_sub(a.rotate_left(14));
        *c ^= *b;
        *c = c.wrapping_sub(b.rotate_left(24));
    }
}

/// Hash `data` into the `(c, b)` pair produced by lookup3's `hashlittle2`.
///
/// The final 1..=12 bytes are always handled as the tail group, so an input
/// that is an exact multiple of 12 still goes through the finishing mix. Only
/// empty input returns the seeded accumulators unmixed.
pub fn hashlittle2(data: &[u8], seed: u32) -> (u32, u32) {
    let mut state = State::new(data.len(), seed);

    let mut rest = data;
    while rest.len() > BLOCK {
        let (block, tail) = rest.split_at(BLOCK);
        state.absorb(block);
        state.mix();
        rest = tail;
    }

    if rest.is_empty() {
        return (state.c, state.b);
    }

    // Missing tail bytes contribute zero, same as the reference switch.
    let mut tail = [0u8; BLOCK];
    tail[..rest.len()].copy_from_slice(rest);
    state.absorb(&tail);
    state.finish();

    (state.c, state.b)
}

/// Primary lookup3 digest of `data`.
pub fn lookup3(data: &[u8], seed: u32) -> u32 {
    hashlittle2(data, seed).0
}

/// Fold `buffers` in order, seeding each call with the previous digest.
pub fn rolling_lookup3<I, B>(buffers: I, seed: u32) -> u32
where
    I: IntoIterator<Item = B>,
    B: AsRef<[u8]>,
{
    let mut rolling = RollingChecksum::with_seed(seed);
    for buffer in buffers {
        rolling.update(buffer.as_ref());
    }
    rolling.digest()
}

/// Incremental form of [`rolling_lookup3`] for buffers that arrive one at a
/// time (frames read from a container).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RollingChecksum {
    digest: u32,
    buffers: usize,
}

impl RollingChecksum {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_seed(seed: u32) -> Self {
        Self { digest: seed, buffers: 0 }
    }

    pub fn update(&mut self, buffer: &[u8]) {
        self.digest = lookup3(buffer, self.digest);
        self.buffers += 1;
    }

    pub fn digest(&self) -> u32 {
        self.digest
    }

    /// Number of buffers folded so far.
    pub fn buffers(&self) -> usize {
        self.buffers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const FOUR_SCORE: &[u8] = b"Four score and seven years ago";

    #[test]
    fn test_empty_input_returns_seeded_accumulators() {
        assert_eq!(hashlittle2(b"", 0), (0xDEAD_BEEF, 0xDEAD_BEEF));
        assert_eq!(hashlittle2(b"", 0xDEAD_BEEF), (0xBD5B_7DDE, 0xBD5B_7DDE));
        assert_eq!(lookup3(b"", 7), 0xDEAD_BEEF + 7);
    }

    #[test]
    fn test_reference_vectors() {
        assert_eq!(hashlittle2(FOUR_SCORE, 0), (0x1777_0551, 0xCE72_26E6));
        assert_eq!(lookup3(FOUR_SCORE, 1), 0xCD62_8161);
    }

    #[test]
    fn test_exact_block_multiple_is_finished() {
        // 12 and 24 byte inputs take the tail path, never the unmixed return.
        let twelve = [0u8; 12];
        let (c, b) = hashlittle2(&twelve, 0);
        assert_ne!((c, b), (0xDEAD_BEEF + 12, 0xDEAD_BEEF + 12));

        let twenty_four = [0u8; 24];
        assert_ne!(lookup3(&twenty_four, 0), lookup3(&twelve, 0));
    }

    #[test]
    fn test_trailing_zero_bytes_change_digest() {
        // Length feeds the initial state, so zero padding is not invisible.
        assert_ne!(lookup3(&[1, 2, 3], 0), lookup3(&[1, 2, 3, 0], 0));
    }

    #[test]
    fn test_rolling_is_order_dependent() {
        let forward = rolling_lookup3([&b"frame-0"[..], &b"frame-1"[..]], 0);
        let reverse = rolling_lookup3([&b"frame-1"[..], &b"frame-0"[..]], 0);
        assert_ne!(forward, reverse);
    }

    #[test]
    fn test_rolling_counts_buffers() {
        let mut rolling = RollingChecksum::new();
        rolling.update(b"a");
        rolling.update(b"");
        assert_eq!(rolling.buffers(), 2);
        assert_eq!(rolling.digest(), lookup3(b"", lookup3(b"a", 0)));
    }

    proptest! {
        #[test]
        fn prop_digest_deterministic(data in proptest::collection::vec(any::<u8>(), 0..200), seed in any::<u32>()) {
            prop_assert_eq!(hashlittle2(&data, seed), hashlittle2(&data, seed));
        }

        #[test]
        fn prop_fold_matches_rolling(
            first in proptest::collection::vec(any::<u8>(), 0..64),
            second in proptest::collection::vec(any::<u8>(), 0..64),
            seed in any::<u32>(),
        ) {
            let folded = lookup3(&second, lookup3(&first, seed));
            prop_assert_eq!(folded, rolling_lookup3([&first, &second], seed));
        }
    }
}
