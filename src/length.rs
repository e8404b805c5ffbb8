//! Packet and tile-part length bookkeeping (A.7.2, A.7.3, A.7.6).
//!
//! PLT/PLM marker segments carry packet lengths as 7-bit continuation
//! bytes, split across numbered segments once a segment's payload is
//! full. TLM marker segments carry tile-part lengths. Both codecs keep
//! lengths grouped by segment index so a codestream's segments can be
//! decoded in any order and replayed in index order.

use std::collections::BTreeMap;
use std::ops::Bound;

use crate::error::{MarkerError, ResourceError, Result, bail, err};
use crate::log::ldebug;
use crate::reader::Reader;

/// Largest packet-length payload of a single PLT/PLM segment: the
/// marker segment size limit minus 4 bytes for the marker and its
/// length field, minus 1 byte for the segment index.
pub const MAX_PACKET_LEN_BYTES_PER_PLT: usize = u16::MAX as usize - 1 - 4;

/// Fewest packets a full PLT/PLM segment can hold, since a single
/// packet length never needs more than 5 bytes.
pub const MIN_PACKETS_PER_PLT: usize = MAX_PACKET_LEN_BYTES_PER_PLT / 5;

const PLT: u16 = 0xFF58;

/// Packet lengths grouped by PLT/PLM segment index.
#[derive(Debug, Clone, Default)]
pub struct PacketLengthMarkers {
    markers: BTreeMap<u8, Vec<u32>>,
    decode_index: u8,
    packet_len: u32,
    read_key: Option<u8>,
    read_index: usize,
    out: Vec<u8>,
    available_bytes: usize,
    segment_len_pos: Option<usize>,
    segment_payload_bytes: usize,
    next_index: u8,
}

impl PacketLengthMarkers {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// The total number of packet lengths collected so far.
    pub fn num_packets(&self) -> usize {
        self.markers.values().map(Vec::len).sum()
    }

    /// Starts decoding the segment with index `index`.
    ///
    /// Bytes fed to [`PacketLengthMarkers::decode_next`] are appended to
    /// this segment until the index changes.
    pub fn decode_init_index(&mut self, index: u8) {
        self.decode_index = index;
        self.packet_len = 0;
        self.markers.entry(index).or_default();
    }

    /// Feeds one payload byte to the running length accumulation.
    pub fn decode_next(&mut self, byte: u8) {
        self.packet_len = (self.packet_len << 7) | u32::from(byte & 0x7F);
        if byte & 0x80 == 0 {
            // Terminator, the accumulated value is complete.
            if let Some(lengths) = self.markers.get_mut(&self.decode_index) {
                lengths.push(self.packet_len);
            }
            self.packet_len = 0;
        }
    }

    /// Whether the last fed byte left a length accumulation unfinished.
    pub fn decode_has_pending_packet_length(&self) -> bool {
        self.packet_len != 0
    }

    /// Decodes a whole PLT marker segment body, starting at its length
    /// field.
    pub fn decode_segment(&mut self, body: &[u8]) -> Result<()> {
        let mut reader = Reader::new(body);
        let Some(len) = reader.read_u16() else {
            return err!(MarkerError::Truncated("PLT"));
        };
        if len < 3 || usize::from(len) > body.len() {
            bail!(MarkerError::ParseFailure("PLT"));
        }
        let Some(index) = reader.read_byte() else {
            return err!(MarkerError::Truncated("PLT"));
        };

        self.decode_init_index(index);
        for _ in 0..len - 3 {
            let Some(byte) = reader.read_byte() else {
                return err!(MarkerError::Truncated("PLT"));
            };
            self.decode_next(byte);
        }

        Ok(())
    }

    /// Rewinds the replay cursor to the first length of the lowest
    /// segment index.
    pub fn read_init(&mut self) {
        self.read_key = self.markers.keys().next().copied();
        self.read_index = 0;
    }

    /// Pops the next packet length, walking segments in index order.
    pub fn read_next(&mut self) -> Option<u32> {
        loop {
            let key = self.read_key?;
            let lengths = &self.markers[&key];
            if self.read_index < lengths.len() {
                let len = lengths[self.read_index];
                self.read_index += 1;
                return Some(len);
            }

            self.read_key = self
                .markers
                .range((Bound::Excluded(key), Bound::Unbounded))
                .map(|(k, _)| *k)
                .next();
            self.read_index = 0;
        }
    }

    /// Starts an encode session with a byte budget for all segments.
    pub fn encode_init(&mut self, available_bytes: usize) {
        self.out.clear();
        self.available_bytes = available_bytes;
        self.segment_len_pos = None;
        self.segment_payload_bytes = 0;
        self.next_index = 0;
    }

    /// Appends one packet length, opening a new segment when the current
    /// one is full.
    pub fn encode_next(&mut self, len: u32) -> Result<()> {
        debug_assert!(len > 0);

        let num_bytes = encoded_length(len);
        if self.segment_len_pos.is_none()
            || self.segment_payload_bytes + num_bytes > MAX_PACKET_LEN_BYTES_PER_PLT
        {
            self.start_segment()?;
        }
        if self.out.len() + num_bytes > self.available_bytes {
            bail!(ResourceError::MarkerCacheExhausted);
        }

        for i in (0..num_bytes).rev() {
            let mut byte = ((len >> (7 * i as u32)) & 0x7F) as u8;
            if i != 0 {
                byte |= 0x80;
            }
            self.out.push(byte);
        }
        self.segment_payload_bytes += num_bytes;

        Ok(())
    }

    /// Finalizes the last open segment and returns the encoded marker
    /// segment bytes.
    pub fn write(&mut self) -> &[u8] {
        self.finish_segment();
        &self.out
    }

    fn start_segment(&mut self) -> Result<()> {
        self.finish_segment();

        // Marker, length field and segment index.
        if self.out.len() + 5 > self.available_bytes {
            bail!(ResourceError::MarkerCacheExhausted);
        }
        ldebug!("opening PLT segment {}", self.next_index);

        self.out.extend_from_slice(&PLT.to_be_bytes());
        self.segment_len_pos = Some(self.out.len());
        self.out.extend_from_slice(&[0, 0]);
        self.out.push(self.next_index);
        self.next_index = self.next_index.wrapping_add(1);
        self.segment_payload_bytes = 0;

        Ok(())
    }

    fn finish_segment(&mut self) {
        if let Some(pos) = self.segment_len_pos.take() {
            let len = (2 + 1 + self.segment_payload_bytes) as u16;
            self.out[pos..pos + 2].copy_from_slice(&len.to_be_bytes());
        }
    }
}

/// The number of 7-bit continuation bytes needed for `len`.
fn encoded_length(len: u32) -> usize {
    let num_bits = (u32::BITS - len.leading_zeros()).max(1);
    num_bits.div_ceil(7) as usize
}

/// A single tile-part length recorded in a TLM marker segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileLengthEntry {
    /// The tile the tile-part belongs to, when the segment signals tile
    /// numbers explicitly.
    pub tile_number: Option<u16>,
    /// The length of the tile-part in bytes, markers included.
    pub length: u32,
}

/// Tile-part lengths grouped by TLM segment index.
#[derive(Debug, Clone, Default)]
pub struct TileLengthMarkers {
    markers: BTreeMap<u8, Vec<TileLengthEntry>>,
}

impl TileLengthMarkers {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a tile-part length under segment `index`.
    pub fn push(&mut self, index: u8, entry: TileLengthEntry) {
        self.markers.entry(index).or_default().push(entry);
    }

    /// The entries of segment `index`, in recording order.
    pub fn marker(&self, index: u8) -> Option<&[TileLengthEntry]> {
        self.markers.get(&index).map(Vec::as_slice)
    }

    /// All entries, walking segments in index order.
    pub fn entries(&self) -> impl Iterator<Item = TileLengthEntry> + '_ {
        self.markers.values().flatten().copied()
    }

    /// Decodes a whole TLM marker segment body, starting at its length
    /// field (A.7.6).
    pub fn decode_segment(&mut self, body: &[u8]) -> Result<()> {
        let mut reader = Reader::new(body);
        let Some(len) = reader.read_u16() else {
            return err!(MarkerError::Truncated("TLM"));
        };
        if len < 4 || usize::from(len) > body.len() {
            bail!(MarkerError::ParseFailure("TLM"));
        }
        let (Some(index), Some(stlm)) = (reader.read_byte(), reader.read_byte()) else {
            return err!(MarkerError::Truncated("TLM"));
        };

        // ST selects the width of the tile number field, SP the width of
        // the length field.
        let st = (stlm >> 4) & 0x3;
        let sp = (stlm >> 6) & 0x1;
        if st == 3 {
            bail!(MarkerError::ParseFailure("TLM"));
        }
        let entry_size = usize::from(st) + if sp == 1 { 4 } else { 2 };
        let payload = usize::from(len) - 4;
        if payload % entry_size != 0 {
            bail!(MarkerError::ParseFailure("TLM"));
        }

        let mut reader = Reader::new(&body[4..usize::from(len)]);
        while !reader.at_end() {
            let tile_number = match st {
                0 => None,
                1 => reader.read_byte().map(u16::from),
                _ => reader.read_u16(),
            };
            if st != 0 && tile_number.is_none() {
                bail!(MarkerError::Truncated("TLM"));
            }

            let length = if sp == 1 {
                reader.read_u32()
            } else {
                reader.read_u16().map(u32::from)
            };
            let Some(length) = length else {
                return err!(MarkerError::Truncated("TLM"));
            };

            self.push(index, TileLengthEntry {
                tile_number,
                length,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    /// Splits `bytes` into (index, payload) pairs and checks framing.
    fn parse_plt_segments(bytes: &[u8]) -> Vec<(u8, Vec<u8>)> {
        let mut segments = Vec::new();
        let mut reader = Reader::new(bytes);

        while !reader.at_end() {
            assert_eq!(reader.read_u16(), Some(PLT));
            let len = reader.read_u16().unwrap() as usize;
            let index = reader.read_byte().unwrap();
            let payload = reader.read_bytes(len - 3).unwrap();
            segments.push((index, payload.to_vec()));
        }

        segments
    }

    #[test]
    fn varint_boundary_widths() {
        assert_eq!(encoded_length(1), 1);
        assert_eq!(encoded_length(127), 1);
        assert_eq!(encoded_length(128), 2);
        assert_eq!(encoded_length(16383), 2);
        assert_eq!(encoded_length(16384), 3);
        assert_eq!(encoded_length(2097151), 3);
        assert_eq!(encoded_length(2097152), 4);
        assert_eq!(encoded_length(268435455), 4);
        assert_eq!(encoded_length(268435456), 5);
        assert_eq!(encoded_length(u32::MAX), 5);
    }

    #[test]
    fn encode_decode_round_trip() {
        let lengths = [
            1u32, 127, 128, 16383, 16384, 2097151, 2097152, 268435455, 268435456, u32::MAX,
        ];

        let mut enc = PacketLengthMarkers::new();
        enc.encode_init(1 << 16);
        for &len in &lengths {
            enc.encode_next(len).unwrap();
        }
        let bytes = enc.write().to_vec();

        let mut dec = PacketLengthMarkers::new();
        let mut pos = 0;
        while pos < bytes.len() {
            assert_eq!(u16::from_be_bytes([bytes[pos], bytes[pos + 1]]), PLT);
            let seg_len = u16::from_be_bytes([bytes[pos + 2], bytes[pos + 3]]) as usize;
            dec.decode_segment(&bytes[pos + 2..pos + 2 + seg_len]).unwrap();
            pos += 2 + seg_len;
        }

        dec.read_init();
        for &len in &lengths {
            assert_eq!(dec.read_next(), Some(len));
        }
        assert_eq!(dec.read_next(), None);
    }

    #[test]
    fn long_run_rolls_over_segments() {
        let mut enc = PacketLengthMarkers::new();
        enc.encode_init(1 << 20);
        for _ in 0..70000 {
            enc.encode_next(127).unwrap();
        }
        let bytes = enc.write().to_vec();

        let segments = parse_plt_segments(&bytes);
        assert!(segments.len() >= 2);
        for (i, (index, payload)) in segments.iter().enumerate() {
            assert_eq!(usize::from(*index), i);
            assert!(payload.len() <= MAX_PACKET_LEN_BYTES_PER_PLT);
        }
        let total: usize = segments.iter().map(|(_, p)| p.len()).sum();
        assert_eq!(total, 70000);

        let mut dec = PacketLengthMarkers::new();
        for (index, payload) in &segments {
            dec.decode_init_index(*index);
            for &byte in payload {
                dec.decode_next(byte);
            }
        }
        dec.read_init();
        for _ in 0..70000 {
            assert_eq!(dec.read_next(), Some(127));
        }
        assert_eq!(dec.read_next(), None);
    }

    #[test]
    fn pending_length_spans_byte_feeds() {
        let mut dec = PacketLengthMarkers::new();
        dec.decode_init_index(0);

        // 300 = 0b10_0101100, split over two continuation bytes.
        dec.decode_next(0x82);
        assert!(dec.decode_has_pending_packet_length());
        dec.decode_next(0x2C);
        assert!(!dec.decode_has_pending_packet_length());

        dec.read_init();
        assert_eq!(dec.read_next(), Some(300));
    }

    #[test]
    fn replay_walks_segments_in_index_order() {
        let mut dec = PacketLengthMarkers::new();
        dec.decode_init_index(7);
        dec.decode_next(3);
        dec.decode_next(4);
        dec.decode_init_index(2);
        dec.decode_next(1);

        dec.read_init();
        assert_eq!(dec.read_next(), Some(1));
        assert_eq!(dec.read_next(), Some(3));
        assert_eq!(dec.read_next(), Some(4));
        assert_eq!(dec.read_next(), None);
        assert_eq!(dec.num_packets(), 3);
    }

    #[test]
    fn encode_respects_byte_budget() {
        let mut enc = PacketLengthMarkers::new();
        enc.encode_init(6);
        enc.encode_next(5).unwrap();
        assert_eq!(
            enc.encode_next(5),
            Err(Error::Resource(ResourceError::MarkerCacheExhausted))
        );
    }

    #[test]
    fn tlm_push_preserves_order() {
        let mut tlm = TileLengthMarkers::new();
        tlm.push(0, TileLengthEntry {
            tile_number: Some(0),
            length: 1000,
        });
        tlm.push(0, TileLengthEntry {
            tile_number: Some(1),
            length: 2000,
        });
        tlm.push(1, TileLengthEntry {
            tile_number: Some(0),
            length: 500,
        });

        let lengths: Vec<u32> = tlm.entries().map(|e| e.length).collect();
        assert_eq!(lengths, vec![1000, 2000, 500]);
        assert_eq!(tlm.marker(1).unwrap().len(), 1);
    }

    #[test]
    fn tlm_segment_with_tile_numbers_and_wide_lengths() {
        // Ltlm = 4 + 2 entries * (2 + 4) = 16, Stlm: ST = 2, SP = 1.
        let body = [
            0x00, 0x10, 0x05, 0x60, 0x00, 0x03, 0x00, 0x00, 0x12, 0x34, 0x00, 0x07, 0x00, 0x00,
            0x00, 0x2A,
        ];

        let mut tlm = TileLengthMarkers::new();
        tlm.decode_segment(&body).unwrap();

        let entries = tlm.marker(5).unwrap();
        assert_eq!(entries, &[
            TileLengthEntry {
                tile_number: Some(3),
                length: 0x1234,
            },
            TileLengthEntry {
                tile_number: Some(7),
                length: 42,
            },
        ]);
    }

    #[test]
    fn tlm_segment_rejects_ragged_payload() {
        // Ltlm = 7 does not divide into 2-byte entries after the header.
        let body = [0x00, 0x07, 0x00, 0x00, 0x01, 0x02, 0x03];
        let mut tlm = TileLengthMarkers::new();
        assert_eq!(
            tlm.decode_segment(&body),
            Err(Error::Marker(MarkerError::ParseFailure("TLM")))
        );
    }
}
