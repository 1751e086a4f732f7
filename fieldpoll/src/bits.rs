use crate::error::BitsError;

/// Numbering of the bits within each byte of a [`BitVector`]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum BitOrder {
    /// bit 0 is the least significant bit of byte 0 (Modbus coil packing)
    #[default]
    Lsb0,
    /// bit 0 is the most significant bit of byte 0
    Msb0,
}

/// Fixed-size sequence of bits backed by bytes
///
/// The declared size never exceeds the capacity of the backing bytes and every bit
/// beyond the declared size is kept at zero, so equality is value based.
#[derive(Clone, Debug)]
pub struct BitVector {
    bytes: Vec<u8>,
    size: usize,
    order: BitOrder,
}

/// number of bytes required to hold `count` bits
pub(crate) fn num_bytes_for_bits(count: usize) -> usize {
    count.div_ceil(8)
}

impl BitVector {
    /// create a zeroed vector of `size` bits
    pub fn new(size: usize, order: BitOrder) -> Self {
        Self {
            bytes: vec![0; num_bytes_for_bits(size)],
            size,
            order,
        }
    }

    /// create a vector of `size` bits over a copy of `bytes`
    pub fn from_bytes(bytes: &[u8], size: usize, order: BitOrder) -> Result<Self, BitsError> {
        let capacity = bytes.len() * 8;
        if size > capacity {
            return Err(BitsError::InvalidSize { size, capacity });
        }
        let mut vector = Self {
            bytes: bytes.to_vec(),
            size,
            order,
        };
        vector.clear_unused();
        Ok(vector)
    }

    /// create a vector from the bytes of 16-bit words sent in swapped (low byte first) order
    ///
    /// bit `i` is bit `i % 16` of word `i / 16`
    pub fn from_swapped_words(bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.to_vec(),
            size: bytes.len() * 8,
            order: BitOrder::Lsb0,
        }
    }

    /// create a vector from big-endian register bytes
    ///
    /// bit `i` is bit `i % 16` of register `i / 16`
    pub fn from_registers(bytes: &[u8]) -> Self {
        let mut swapped = bytes.to_vec();
        crate::codec::swap_words(&mut swapped);
        Self::from_swapped_words(&swapped)
    }

    /// number of declared bits
    pub fn len(&self) -> usize {
        self.size
    }

    /// true if the declared size is zero
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// bit numbering of the vector
    pub fn order(&self) -> BitOrder {
        self.order
    }

    /// number of bits the backing bytes can hold
    pub fn capacity(&self) -> usize {
        self.bytes.len() * 8
    }

    /// read the bit at `index`
    pub fn get(&self, index: usize) -> Result<bool, BitsError> {
        self.check_index(index)?;
        let (byte, mask) = self.locate(index);
        Ok(self.bytes[byte] & mask != 0)
    }

    /// write the bit at `index`
    pub fn set(&mut self, index: usize, value: bool) -> Result<(), BitsError> {
        self.check_index(index)?;
        let (byte, mask) = self.locate(index);
        if value {
            self.bytes[byte] |= mask;
        } else {
            self.bytes[byte] &= !mask;
        }
        Ok(())
    }

    /// copy the bits `[start, end)` into a new vector
    ///
    /// positions beyond the declared size read as zero
    pub fn range(&self, start: usize, end: usize) -> BitVector {
        let size = end.saturating_sub(start);
        let mut out = BitVector::new(size, self.order);
        for i in 0..size {
            if let Ok(true) = self.get(start + i) {
                let (byte, mask) = out.locate(i);
                out.bytes[byte] |= mask;
            }
        }
        out
    }

    /// append `other` to a copy of this vector
    pub fn concat(&self, other: &BitVector) -> BitVector {
        let mut out = BitVector::new(self.size + other.size, self.order);
        for (i, value) in self.iter().chain(other.iter()).enumerate() {
            if value {
                let (byte, mask) = out.locate(i);
                out.bytes[byte] |= mask;
            }
        }
        out
    }

    /// grow the declared size up to the capacity of the backing bytes
    ///
    /// a size below the current one leaves the vector unchanged; the newly exposed bits
    /// read as zero. Fails if `size` exceeds the capacity.
    pub fn force_size(&mut self, size: usize) -> Result<(), BitsError> {
        let capacity = self.capacity();
        if size > capacity {
            return Err(BitsError::InvalidSize { size, capacity });
        }
        self.size = self.size.max(size);
        Ok(())
    }

    /// iterate over the declared bits
    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.size).map(move |i| {
            let (byte, mask) = self.locate(i);
            self.bytes[byte] & mask != 0
        })
    }

    /// indices of all set bits in ascending order
    pub fn ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.iter()
            .enumerate()
            .filter_map(|(i, value)| value.then_some(i))
    }

    /// the minimal bytes holding the declared bits
    pub fn to_bytes(&self) -> Vec<u8> {
        self.bytes[..num_bytes_for_bits(self.size)].to_vec()
    }

    /// big-endian register bytes holding the declared bits, padded to whole registers
    ///
    /// inverse of [`BitVector::from_registers`] for `Lsb0` vectors
    pub fn to_registers(&self) -> Vec<u8> {
        let registers = self.size.div_ceil(16);
        let mut out = vec![0u8; registers * 2];
        for i in self.ones() {
            let register = i / 16;
            let bit = i % 16;
            // high byte of the register holds bits 8..16
            let offset = if bit < 8 { 1 } else { 0 };
            out[register * 2 + offset] |= 1 << (bit % 8);
        }
        out
    }

    /// render as `0`/`1` characters in index order, one space between bytes
    pub fn to_bit_string(&self) -> String {
        let mut out = String::with_capacity(self.size + self.size / 8);
        for (i, value) in self.iter().enumerate() {
            if i > 0 && i % 8 == 0 {
                out.push(' ');
            }
            out.push(if value { '1' } else { '0' });
        }
        out
    }

    /// parse the output of [`BitVector::to_bit_string`], ignoring whitespace
    pub fn parse_bit_string(text: &str, order: BitOrder) -> Result<Self, BitsError> {
        let bits = text
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| match c {
                '0' => Ok(false),
                '1' => Ok(true),
                other => Err(BitsError::InvalidCharacter(other)),
            })
            .collect::<Result<Vec<bool>, BitsError>>()?;

        let mut out = BitVector::new(bits.len(), order);
        for (i, value) in bits.into_iter().enumerate() {
            out.set(i, value)?;
        }
        Ok(out)
    }

    fn check_index(&self, index: usize) -> Result<(), BitsError> {
        if index >= self.size {
            return Err(BitsError::IndexOutOfRange {
                index,
                size: self.size,
            });
        }
        Ok(())
    }

    fn locate(&self, index: usize) -> (usize, u8) {
        let bit = (index % 8) as u8;
        let mask = match self.order {
            BitOrder::Lsb0 => 1 << bit,
            BitOrder::Msb0 => 0x80 >> bit,
        };
        (index / 8, mask)
    }

    fn clear_unused(&mut self) {
        for i in self.size..self.capacity() {
            let (byte, mask) = self.locate(i);
            self.bytes[byte] &= !mask;
        }
    }
}

impl PartialEq for BitVector {
    fn eq(&self, other: &Self) -> bool {
        self.size == other.size && self.iter().eq(other.iter())
    }
}

impl Eq for BitVector {}

impl std::fmt::Display for BitVector {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(&self.to_bit_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calculates_number_of_bytes_needed_for_bits() {
        assert_eq!(num_bytes_for_bits(0), 0);
        assert_eq!(num_bytes_for_bits(7), 1);
        assert_eq!(num_bytes_for_bits(8), 1);
        assert_eq!(num_bytes_for_bits(9), 2);
        assert_eq!(num_bytes_for_bits(17), 3);
    }

    #[test]
    fn get_and_set_respect_bit_order() {
        let lsb = BitVector::from_bytes(&[0x01], 8, BitOrder::Lsb0).unwrap();
        let msb = BitVector::from_bytes(&[0x01], 8, BitOrder::Msb0).unwrap();
        assert!(lsb.get(0).unwrap());
        assert!(msb.get(7).unwrap());

        let mut bits = BitVector::new(10, BitOrder::Lsb0);
        bits.set(9, true).unwrap();
        assert_eq!(bits.to_bytes(), vec![0x00, 0x02]);
    }

    #[test]
    fn get_and_set_fail_beyond_declared_size() {
        let mut bits = BitVector::new(3, BitOrder::Lsb0);
        assert_eq!(
            bits.get(3),
            Err(BitsError::IndexOutOfRange { index: 3, size: 3 })
        );
        assert!(bits.set(3, true).is_err());
    }

    #[test]
    fn range_zero_fills_beyond_size() {
        let bits = BitVector::from_bytes(&[0xFF], 4, BitOrder::Lsb0).unwrap();
        let range = bits.range(2, 8);
        assert_eq!(range.len(), 6);
        assert_eq!(range.to_bit_string(), "110000");
    }

    #[test]
    fn concatenation_preserves_order() {
        let a = BitVector::parse_bit_string("101", BitOrder::Lsb0).unwrap();
        let b = BitVector::parse_bit_string("0011", BitOrder::Lsb0).unwrap();
        let c = a.concat(&b);
        assert_eq!(c.len(), 7);
        assert_eq!(c.to_bit_string(), "1010011");
        assert_eq!(c.range(0, 3), a);
        assert_eq!(c.range(3, 7), b);
    }

    #[test]
    fn force_size_is_bounded_by_capacity() {
        let mut bits = BitVector::from_bytes(&[0xFF, 0xFF], 4, BitOrder::Lsb0).unwrap();
        bits.force_size(16).unwrap();
        // bits hidden by the declared size were cleared
        assert_eq!(bits.to_bytes(), vec![0x0F, 0x00]);
        assert_eq!(
            bits.force_size(17),
            Err(BitsError::InvalidSize {
                size: 17,
                capacity: 16
            })
        );
    }

    #[test]
    fn force_size_never_shrinks() {
        let mut bits = BitVector::parse_bit_string("1011 0110 1", BitOrder::Lsb0).unwrap();
        bits.force_size(3).unwrap();
        assert_eq!(bits.len(), 9);
        assert_eq!(bits.to_bit_string(), "10110110 1");
        bits.force_size(12).unwrap();
        assert_eq!(bits.len(), 12);
        assert_eq!(bits.to_bit_string(), "10110110 1000");
    }

    #[test]
    fn every_index_reads_back_what_was_set() {
        for order in [BitOrder::Lsb0, BitOrder::Msb0] {
            let size = 37;
            for index in 0..size {
                let mut bits = BitVector::new(size, order);
                bits.set(index, true).unwrap();
                for other in 0..size {
                    assert_eq!(bits.get(other), Ok(other == index), "{order:?} {index} {other}");
                }
                assert_eq!(bits.ones().collect::<Vec<_>>(), vec![index]);
                bits.set(index, false).unwrap();
                assert!(bits.iter().all(|x| !x));
            }

            // alternating pattern over every byte
            let mut bits = BitVector::new(size, order);
            for index in 0..size {
                bits.set(index, index % 3 == 0).unwrap();
            }
            for index in 0..size {
                assert_eq!(bits.get(index), Ok(index % 3 == 0), "{order:?} {index}");
            }
        }
    }

    #[test]
    fn from_bytes_rejects_oversize() {
        assert!(BitVector::from_bytes(&[0x00], 9, BitOrder::Lsb0).is_err());
    }

    #[test]
    fn register_bits_number_from_the_least_significant_bit() {
        // register value 0x0008 has bit 3 set
        let bits = BitVector::from_registers(&[0x00, 0x08]);
        assert_eq!(bits.ones().collect::<Vec<_>>(), vec![3]);
        assert_eq!(bits.to_registers(), vec![0x00, 0x08]);

        let bits = BitVector::from_registers(&[0x80, 0x00, 0x00, 0x01]);
        assert_eq!(bits.ones().collect::<Vec<_>>(), vec![15, 16]);
        assert_eq!(bits.to_registers(), vec![0x80, 0x00, 0x00, 0x01]);
    }

    #[test]
    fn swapped_words_match_registers() {
        assert_eq!(
            BitVector::from_swapped_words(&[0x08, 0x00]),
            BitVector::from_registers(&[0x00, 0x08])
        );
    }

    #[test]
    fn bit_string_groups_by_byte() {
        let bits = BitVector::from_bytes(&[0x01, 0x80], 12, BitOrder::Lsb0).unwrap();
        assert_eq!(bits.to_bit_string(), "10000000 0000");
        let parsed = BitVector::parse_bit_string("10000000 0000", BitOrder::Lsb0).unwrap();
        assert_eq!(parsed, bits);
        assert_eq!(
            BitVector::parse_bit_string("10x", BitOrder::Lsb0),
            Err(BitsError::InvalidCharacter('x'))
        );
    }

    #[test]
    fn equality_ignores_backing_capacity() {
        let a = BitVector::from_bytes(&[0x05, 0x00], 3, BitOrder::Lsb0).unwrap();
        let b = BitVector::from_bytes(&[0x05], 3, BitOrder::Lsb0).unwrap();
        assert_eq!(a, b);
    }
}
