// Licensed under the Apache-2.0 license

/// Width of the key block in bytes.
pub const AES_KEY_WIDTH: usize = 16;
/// Width of one cipher block in bytes.
pub const AES_TEXT_WIDTH: usize = 16;

/// Rounds `len` up to a multiple of `align`, which must be a power of two.
pub const fn aligned_size(len: usize, align: usize) -> usize {
    (len + align - 1) & !(align - 1)
}

/// Like [`aligned_size`], but `None` when the result does not fit a `usize`.
pub fn checked_aligned_size(len: u64, align: usize) -> Option<usize> {
    let len = usize::try_from(len).ok()?;
    Some(len.checked_add(align - 1)? & !(align - 1))
}

/// A 128-bit key as four 32-bit words. Words are streamed to the core in
/// memory order, least significant byte first.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AesKey(pub [u32; AES_KEY_WIDTH / 4]);

impl AesKey {
    pub fn to_bytes(&self) -> [u8; AES_KEY_WIDTH] {
        let mut bytes = [0u8; AES_KEY_WIDTH];
        for (chunk, word) in bytes.chunks_exact_mut(4).zip(self.0.iter()) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        bytes
    }

    pub fn from_bytes(bytes: [u8; AES_KEY_WIDTH]) -> Self {
        let mut words = [0u32; AES_KEY_WIDTH / 4];
        for (word, chunk) in words.iter_mut().zip(bytes.chunks_exact(4)) {
            *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        Self(words)
    }
}
