use std::io::{Cursor, Write};

use anyhow::{bail, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::CompressionError;

const TOP: u32 = 1 << 24;
const BOTTOM: u32 = 1 << 16;

/// Largest total frequency a table may have. The coder divides its 32-bit range by the total, which has to leave
/// at least one unit for every symbol after normalization
pub const MAX_TOTAL_FREQUENCY: u32 = 65280;
/// Total that frequencies are scaled to if the symbol counts exceed [MAX_TOTAL_FREQUENCY]. The gap to the limit
/// leaves room for rare symbols that are rounded up to a frequency of 1
const SCALED_TOTAL_FREQUENCY: u64 = 65024;

/// Frequencies of the 256 byte symbols together with their cumulative sums
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrequencyTable {
    frequencies: [u16; 256],
    cumulative: [u32; 257],
}

impl FrequencyTable {
    /// Creates a table from explicit frequencies
    ///
    /// # Errors
    ///
    /// If all frequencies are zero, or if their sum exceeds [MAX_TOTAL_FREQUENCY]
    pub fn new(frequencies: [u16; 256]) -> Result<Self> {
        let mut cumulative = [0_u32; 257];
        for (symbol, frequency) in frequencies.iter().enumerate() {
            cumulative[symbol + 1] = cumulative[symbol] + *frequency as u32;
        }
        let total = cumulative[256];
        if total == 0 || total > MAX_TOTAL_FREQUENCY {
            bail!(
                "Total symbol frequency must be in [1;{}], but was {}",
                MAX_TOTAL_FREQUENCY,
                total
            );
        }
        Ok(Self {
            frequencies,
            cumulative,
        })
    }

    /// Table in which every byte value has frequency 1
    pub fn uniform() -> Self {
        let mut cumulative = [0_u32; 257];
        for (symbol, entry) in cumulative.iter_mut().enumerate() {
            *entry = symbol as u32;
        }
        Self {
            frequencies: [1; 256],
            cumulative,
        }
    }

    /// Counts the symbols in `data` and scales the counts so that their total fits into the coder's precision.
    /// Every symbol that occurs in `data` keeps a frequency of at least 1. Returns `None` for empty `data`
    pub fn from_symbols(data: &[u8]) -> Option<Self> {
        if data.is_empty() {
            return None;
        }
        let mut counts = [0_u64; 256];
        for symbol in data {
            counts[*symbol as usize] += 1;
        }
        let total = data.len() as u64;
        let mut frequencies = [0_u16; 256];
        for (frequency, count) in frequencies.iter_mut().zip(counts.iter()) {
            if *count == 0 {
                continue;
            }
            *frequency = if total > MAX_TOTAL_FREQUENCY as u64 {
                (count * SCALED_TOTAL_FREQUENCY / total).max(1) as u16
            } else {
                *count as u16
            };
        }
        Self::new(frequencies).ok()
    }

    pub fn frequency(&self, symbol: u8) -> u16 {
        self.frequencies[symbol as usize]
    }

    pub fn total(&self) -> u32 {
        self.cumulative[256]
    }

    /// Number of symbols with a non-zero frequency
    pub fn symbol_count(&self) -> usize {
        self.frequencies.iter().filter(|f| **f > 0).count()
    }

    fn cumulative_frequency(&self, symbol: u8) -> u32 {
        self.cumulative[symbol as usize]
    }

    /// The symbol whose cumulative interval contains `value`. `value` must be less than [total](FrequencyTable::total)
    fn symbol_for_value(&self, value: u32) -> u8 {
        (self.cumulative.partition_point(|c| *c <= value) - 1) as u8
    }

    /// Writes the number of used symbols as `u16`, followed by a `(u8 symbol, u16 frequency)` pair for each of them
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u16::<LittleEndian>(self.symbol_count() as u16)?;
        for (symbol, frequency) in self.frequencies.iter().enumerate() {
            if *frequency == 0 {
                continue;
            }
            writer.write_u8(symbol as u8)?;
            writer.write_u16::<LittleEndian>(*frequency)?;
        }
        Ok(())
    }

    /// Reads a table written by [write_to](FrequencyTable::write_to)
    pub fn read_from(reader: &mut Cursor<&[u8]>) -> Result<Self> {
        let corrupt = |msg: String| CompressionError::CorruptStream(msg);
        let entries = reader
            .read_u16::<LittleEndian>()
            .map_err(|_| corrupt("Frequency table is truncated".into()))?;
        if entries == 0 || entries > 256 {
            return Err(corrupt(format!("Frequency table has {} entries", entries)).into());
        }
        let mut frequencies = [0_u16; 256];
        for _ in 0..entries {
            let symbol = reader
                .read_u8()
                .map_err(|_| corrupt("Frequency table is truncated".into()))?;
            let frequency = reader
                .read_u16::<LittleEndian>()
                .map_err(|_| corrupt("Frequency table is truncated".into()))?;
            if frequency == 0 || frequencies[symbol as usize] != 0 {
                return Err(corrupt(format!("Invalid frequency table entry for symbol {}", symbol)).into());
            }
            frequencies[symbol as usize] = frequency;
        }
        Self::new(frequencies).map_err(|e| corrupt(e.to_string()).into())
    }
}

struct RangeEncoder {
    low: u32,
    range: u32,
    out: Vec<u8>,
}

impl RangeEncoder {
    fn new(out: Vec<u8>) -> Self {
        Self {
            low: 0,
            range: u32::MAX,
            out,
        }
    }

    fn encode(&mut self, cumulative: u32, frequency: u32, total: u32) {
        self.range /= total;
        self.low = self.low.wrapping_add(cumulative * self.range);
        self.range *= frequency;
        loop {
            if (self.low ^ self.low.wrapping_add(self.range)) >= TOP {
                if self.range >= BOTTOM {
                    break;
                }
                self.range = self.low.wrapping_neg() & (BOTTOM - 1);
            }
            self.out.push((self.low >> 24) as u8);
            self.low <<= 8;
            self.range <<= 8;
        }
    }

    fn finish(mut self) -> Vec<u8> {
        for _ in 0..4 {
            self.out.push((self.low >> 24) as u8);
            self.low <<= 8;
        }
        self.out
    }
}

struct RangeDecoder<'a> {
    low: u32,
    range: u32,
    code: u32,
    data: &'a [u8],
    position: usize,
}

impl<'a> RangeDecoder<'a> {
    fn new(data: &'a [u8]) -> Result<Self> {
        let mut decoder = Self {
            low: 0,
            range: u32::MAX,
            code: 0,
            data,
            position: 0,
        };
        for _ in 0..4 {
            decoder.code = (decoder.code << 8) | decoder.next_byte()? as u32;
        }
        Ok(decoder)
    }

    fn next_byte(&mut self) -> Result<u8> {
        match self.data.get(self.position) {
            Some(byte) => {
                self.position += 1;
                Ok(*byte)
            }
            None => Err(CompressionError::CorruptStream("Range coded data ended early".into()).into()),
        }
    }

    fn decode(&mut self, table: &FrequencyTable) -> Result<u8> {
        let total = table.total();
        self.range /= total;
        let value = self.code.wrapping_sub(self.low) / self.range;
        if value >= total {
            return Err(CompressionError::CorruptStream(format!(
                "Range coded value {} is outside of the frequency table",
                value
            ))
            .into());
        }
        let symbol = table.symbol_for_value(value);
        self.low = self
            .low
            .wrapping_add(table.cumulative_frequency(symbol) * self.range);
        self.range *= table.frequency(symbol) as u32;
        loop {
            if (self.low ^ self.low.wrapping_add(self.range)) >= TOP {
                if self.range >= BOTTOM {
                    break;
                }
                self.range = self.low.wrapping_neg() & (BOTTOM - 1);
            }
            self.code = (self.code << 8) | self.next_byte()? as u32;
            self.low <<= 8;
            self.range <<= 8;
        }
        Ok(symbol)
    }
}

/// Carry-less range coder over byte symbols with a static frequency table
///
/// By default, the table is computed from the data of each [encode](StaticRangeCoder::encode) call and stored in
/// front of the coded bytes. With [with_fixed_table](StaticRangeCoder::with_fixed_table), a table that encoder and
/// decoder agree on is used instead and nothing but the coded bytes is written
///
/// ```
/// # use voxtree_io::compression::StaticRangeCoder;
/// let coder = StaticRangeCoder::new();
/// let data = b"abracadabra";
/// let encoded = coder.encode(data).unwrap();
/// assert_eq!(&data[..], &coder.decode(&encoded, data.len()).unwrap()[..]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticRangeCoder {
    fixed_table: Option<FrequencyTable>,
}

impl StaticRangeCoder {
    /// Creates a coder that computes a frequency table for every call and embeds it into the coded data
    pub fn new() -> Self {
        Default::default()
    }

    /// Creates a coder that uses `table` for all data. The table is not written to the coded data
    pub fn with_fixed_table(table: FrequencyTable) -> Self {
        Self {
            fixed_table: Some(table),
        }
    }

    /// Encodes `data`. Empty `data` encodes to no bytes at all
    ///
    /// # Errors
    ///
    /// With a fixed table, if `data` contains a symbol whose frequency is zero
    pub fn encode(&self, data: &[u8]) -> Result<Vec<u8>> {
        if data.is_empty() {
            return Ok(vec![]);
        }
        let (table, out) = match &self.fixed_table {
            Some(table) => (table.clone(), Vec::with_capacity(data.len() + 4)),
            None => {
                let table = match FrequencyTable::from_symbols(data) {
                    Some(table) => table,
                    None => bail!("Could not build a frequency table"),
                };
                let mut out = Vec::with_capacity(data.len() + 4 + 3 * table.symbol_count() + 2);
                table.write_to(&mut out)?;
                (table, out)
            }
        };
        let total = table.total();
        let mut encoder = RangeEncoder::new(out);
        for symbol in data {
            let frequency = table.frequency(*symbol);
            if frequency == 0 {
                bail!("Symbol {} has no frequency in the range coder table", symbol);
            }
            encoder.encode(table.cumulative_frequency(*symbol), frequency as u32, total);
        }
        Ok(encoder.finish())
    }

    /// Decodes `symbol_count` symbols from `data`, which must be exactly the output of [encode](StaticRangeCoder::encode)
    ///
    /// # Errors
    ///
    /// [CompressionError::CorruptStream] if `data` is not a valid encoding of `symbol_count` symbols
    pub fn decode(&self, data: &[u8], symbol_count: usize) -> Result<Vec<u8>> {
        if symbol_count == 0 {
            if !data.is_empty() {
                return Err(CompressionError::CorruptStream(format!(
                    "Expected no range coded data but got {} bytes",
                    data.len()
                ))
                .into());
            }
            return Ok(vec![]);
        }
        let (table, coded) = match &self.fixed_table {
            Some(table) => (table.clone(), data),
            None => {
                let mut cursor = Cursor::new(data);
                let table = FrequencyTable::read_from(&mut cursor)?;
                (table, &data[cursor.position() as usize..])
            }
        };
        let mut decoder = RangeDecoder::new(coded)?;
        // A single symbol can take up less than a bit, so the length of `coded` does not bound the capacity
        let mut symbols = Vec::with_capacity(symbol_count.min(1 << 20));
        for _ in 0..symbol_count {
            symbols.push(decoder.decode(&table)?);
        }
        if decoder.position != coded.len() {
            return Err(CompressionError::CorruptStream(format!(
                "{} bytes of range coded data were not used",
                coded.len() - decoder.position
            ))
            .into());
        }
        Ok(symbols)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{distributions::Uniform, thread_rng, Rng};

    fn skewed_data(count: usize) -> Vec<u8> {
        let mut rng = thread_rng();
        (0..count)
            .map(|_| {
                if rng.gen_bool(0.9) {
                    rng.gen_range(0..4)
                } else {
                    rng.gen()
                }
            })
            .collect()
    }

    #[test]
    fn test_round_trip() {
        let coder = StaticRangeCoder::new();
        for count in [1, 2, 10, 1000, 100_000].iter() {
            let data = skewed_data(*count);
            let encoded = coder.encode(&data).unwrap();
            let decoded = coder.decode(&encoded, data.len()).unwrap();
            assert_eq!(data, decoded);
        }
    }

    #[test]
    fn test_round_trip_uniform_data() {
        let data = thread_rng()
            .sample_iter(Uniform::new_inclusive(0, 255_u8))
            .take(50_000)
            .collect::<Vec<_>>();
        let coder = StaticRangeCoder::new();
        let encoded = coder.encode(&data).unwrap();
        assert_eq!(data, coder.decode(&encoded, data.len()).unwrap());
    }

    #[test]
    fn test_single_symbol() {
        let data = vec![42; 70_000];
        let coder = StaticRangeCoder::new();
        let encoded = coder.encode(&data).unwrap();
        assert!(encoded.len() < 100);
        assert_eq!(data, coder.decode(&encoded, data.len()).unwrap());
    }

    #[test]
    fn test_skewed_data_compresses() {
        let data = skewed_data(10_000);
        let encoded = StaticRangeCoder::new().encode(&data).unwrap();
        assert!(encoded.len() < data.len() / 2);
    }

    #[test]
    fn test_empty_input() {
        let coder = StaticRangeCoder::new();
        assert!(coder.encode(&[]).unwrap().is_empty());
        assert!(coder.decode(&[], 0).unwrap().is_empty());
    }

    #[test]
    fn test_scaled_table_keeps_rare_symbols() {
        let mut data = vec![0_u8; 200_000];
        data.push(1);
        let table = FrequencyTable::from_symbols(&data).unwrap();
        assert!(table.total() <= MAX_TOTAL_FREQUENCY);
        assert_eq!(1, table.frequency(1));
        assert_eq!(0, table.frequency(2));
    }

    #[test]
    fn test_fixed_table() {
        let mut frequencies = [0_u16; 256];
        frequencies[0] = 100;
        frequencies[1] = 10;
        frequencies[2] = 1;
        let coder = StaticRangeCoder::with_fixed_table(FrequencyTable::new(frequencies).unwrap());
        let data = vec![0, 0, 1, 0, 2, 0, 0, 1];
        let encoded = coder.encode(&data).unwrap();
        let with_embedded_table = StaticRangeCoder::new().encode(&data).unwrap();
        assert!(encoded.len() < with_embedded_table.len());
        assert_eq!(data, coder.decode(&encoded, data.len()).unwrap());

        assert!(coder.encode(&[3]).is_err());
    }

    #[test]
    fn test_uniform_table() {
        let coder = StaticRangeCoder::with_fixed_table(FrequencyTable::uniform());
        let data = (0..=255_u8).collect::<Vec<_>>();
        let encoded = coder.encode(&data).unwrap();
        assert_eq!(data, coder.decode(&encoded, data.len()).unwrap());
    }

    #[test]
    fn test_invalid_tables() {
        assert!(FrequencyTable::new([0; 256]).is_err());
        assert!(FrequencyTable::new([300; 256]).is_err());
    }

    #[test]
    fn test_corrupt_data_is_detected() {
        let coder = StaticRangeCoder::new();
        let data = skewed_data(1000);
        let encoded = coder.encode(&data).unwrap();

        let truncated = &encoded[..encoded.len() - 3];
        let err = coder.decode(truncated, data.len()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CompressionError>(),
            Some(CompressionError::CorruptStream(_))
        ));

        let err = coder.decode(&encoded, data.len() - 10).unwrap_err();
        assert!(err.downcast_ref::<CompressionError>().is_some());

        assert!(coder.decode(&[0, 0], 5).is_err());
    }
}
