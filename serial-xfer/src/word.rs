//! Word sizes and their wire encoding
//!
//! Buffers handed to the engine are always byte slices. For word sizes
//! wider than 8 bits each word occupies [`WordSize::bytes`] consecutive
//! bytes, most significant byte first. Backends shift words out MSB first,
//! so the order in memory is the order on the wire whatever the host
//! endianness is.

/// Width of one word of a raw transfer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WordSize {
    /// 8 bit words.
    #[default]
    Bits8,
    /// 16 bit words.
    Bits16,
    /// 32 bit words.
    Bits32,
}

impl WordSize {
    /// Number of bytes one word occupies in a buffer.
    pub const fn bytes(self) -> usize {
        match self {
            WordSize::Bits8 => 1,
            WordSize::Bits16 => 2,
            WordSize::Bits32 => 4,
        }
    }

    /// Number of bits clocked per word.
    pub const fn bits(self) -> u32 {
        self.bytes() as u32 * 8
    }

    /// Mask of the bits a word of this size can carry.
    pub const fn mask(self) -> u32 {
        match self {
            WordSize::Bits8 => 0xFF,
            WordSize::Bits16 => 0xFFFF,
            WordSize::Bits32 => 0xFFFF_FFFF,
        }
    }

    /// Number of whole words in `len` bytes, or `None` if `len` is not a
    /// multiple of the word size.
    pub const fn words_in(self, len: usize) -> Option<usize> {
        if len % self.bytes() == 0 {
            Some(len / self.bytes())
        } else {
            None
        }
    }
}

/// Decodes one big-endian word from `bytes`.
///
/// `bytes` must hold exactly one word; shorter input is zero extended.
pub fn decode(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, b| (acc << 8) | u32::from(*b))
}

/// Encodes `word` big-endian into `out`, truncating to `out.len()` bytes.
pub fn encode(word: u32, out: &mut [u8]) {
    let len = out.len();
    for (i, byte) in out.iter_mut().enumerate() {
        let shift = 8 * (len - 1 - i);
        *byte = (word >> shift) as u8;
    }
}
