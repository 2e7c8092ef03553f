//! Transport-wide congestion control feedback payload, as specified in
//! <https://datatracker.ietf.org/doc/html/draft-holmer-rmcat-transport-wide-cc-extensions-01>.
//!
//! Only the feedback payload itself is handled here; RTCP framing and
//! dispatch happen upstream.

use bytes::{Buf, BufMut};
use shared::error::{Error, Result};
use shared::marshal::{Marshal, MarshalSize, Unmarshal};

/// Scale factor for receive deltas (250 microseconds).
pub const TYPE_TCC_DELTA_SCALE_FACTOR: i64 = 250;

/// Unit of the reference time field (64 milliseconds).
pub const REFERENCE_TIME_UNIT_US: i64 = 64_000;

/// Fixed feedback header: base sequence number (16), packet status count
/// (16), reference time (24), feedback packet count (8).
const HEADER_LENGTH: usize = 8;

/// Chunk capacity limits.
const MAX_RUN_LENGTH_CAP: u16 = 0x1FFF; // 13 bits
const MAX_ONE_BIT_CAP: usize = 14;
const MAX_TWO_BIT_CAP: usize = 7;

/// Per-packet reception status carried by the status chunks.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum SymbolTypeTcc {
    #[default]
    PacketNotReceived = 0,
    PacketReceivedSmallDelta = 1,
    PacketReceivedLargeDelta = 2,
    /// Reserved by the draft; treated as received without a delta field.
    PacketReceivedWithoutDelta = 3,
}

impl From<u16> for SymbolTypeTcc {
    fn from(val: u16) -> Self {
        match val & 0x3 {
            1 => SymbolTypeTcc::PacketReceivedSmallDelta,
            2 => SymbolTypeTcc::PacketReceivedLargeDelta,
            3 => SymbolTypeTcc::PacketReceivedWithoutDelta,
            _ => SymbolTypeTcc::PacketNotReceived,
        }
    }
}

impl SymbolTypeTcc {
    /// Number of delta bytes a packet with this status contributes.
    fn delta_size(self) -> usize {
        match self {
            SymbolTypeTcc::PacketReceivedSmallDelta => 1,
            SymbolTypeTcc::PacketReceivedLargeDelta => 2,
            _ => 0,
        }
    }
}

/// Symbol width of a status vector chunk.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum SymbolSizeTypeTcc {
    #[default]
    OneBit = 0,
    TwoBit = 1,
}

/// ```text
///  0                   1
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |0| S |       Run Length        |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunLengthChunk {
    pub packet_status_symbol: SymbolTypeTcc,
    pub run_length: u16,
}

/// ```text
///  0                   1
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |1|S|       symbol list         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// `symbol_list` may hold fewer symbols than the chunk has slots; the
/// remaining slots are zero on the wire and dropped on decode once
/// `packet_status_count` is satisfied.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StatusVectorChunk {
    pub symbol_size: SymbolSizeTypeTcc,
    pub symbol_list: Vec<SymbolTypeTcc>,
}

/// A single 16-bit packet status chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketStatusChunk {
    RunLengthChunk(RunLengthChunk),
    StatusVectorChunk(StatusVectorChunk),
}

impl MarshalSize for PacketStatusChunk {
    fn marshal_size(&self) -> usize {
        2
    }
}

impl PacketStatusChunk {
    fn as_u16(&self) -> u16 {
        match self {
            PacketStatusChunk::RunLengthChunk(rlc) => {
                ((rlc.packet_status_symbol as u16) << 13) | (rlc.run_length & MAX_RUN_LENGTH_CAP)
            }
            PacketStatusChunk::StatusVectorChunk(svc) => {
                let mut chunk = 0x8000 | ((svc.symbol_size as u16) << 14);
                match svc.symbol_size {
                    SymbolSizeTypeTcc::OneBit => {
                        for (i, symbol) in svc.symbol_list.iter().take(MAX_ONE_BIT_CAP).enumerate()
                        {
                            let bit =
                                matches!(symbol, SymbolTypeTcc::PacketReceivedSmallDelta) as u16;
                            chunk |= bit << (13 - i);
                        }
                    }
                    SymbolSizeTypeTcc::TwoBit => {
                        for (i, symbol) in svc.symbol_list.iter().take(MAX_TWO_BIT_CAP).enumerate()
                        {
                            chunk |= (*symbol as u16) << (12 - 2 * i);
                        }
                    }
                }
                chunk
            }
        }
    }
}

impl Marshal for PacketStatusChunk {
    fn marshal_to(&self, mut buf: &mut [u8]) -> Result<usize> {
        if buf.len() < 2 {
            return Err(Error::PacketStatusChunkLength);
        }
        buf.put_u16(self.as_u16());
        Ok(2)
    }
}

impl Unmarshal for PacketStatusChunk {
    fn unmarshal<B>(buf: &mut B) -> Result<Self>
    where
        B: Buf,
    {
        if buf.remaining() < 2 {
            return Err(Error::PacketStatusChunkLength);
        }
        let chunk = buf.get_u16();

        if chunk & 0x8000 == 0 {
            return Ok(PacketStatusChunk::RunLengthChunk(RunLengthChunk {
                packet_status_symbol: ((chunk >> 13) & 0x3).into(),
                run_length: chunk & MAX_RUN_LENGTH_CAP,
            }));
        }

        if chunk & 0x4000 == 0 {
            let symbol_list = (0..MAX_ONE_BIT_CAP)
                .map(|i| {
                    if chunk & (1 << (13 - i)) != 0 {
                        SymbolTypeTcc::PacketReceivedSmallDelta
                    } else {
                        SymbolTypeTcc::PacketNotReceived
                    }
                })
                .collect();
            Ok(PacketStatusChunk::StatusVectorChunk(StatusVectorChunk {
                symbol_size: SymbolSizeTypeTcc::OneBit,
                symbol_list,
            }))
        } else {
            let symbol_list = (0..MAX_TWO_BIT_CAP)
                .map(|i| SymbolTypeTcc::from((chunk >> (12 - 2 * i)) & 0x3))
                .collect();
            Ok(PacketStatusChunk::StatusVectorChunk(StatusVectorChunk {
                symbol_size: SymbolSizeTypeTcc::TwoBit,
                symbol_list,
            }))
        }
    }
}

/// A transport-wide congestion control feedback payload.
///
/// `recv_deltas` carries one entry per reported packet in ascending
/// transport sequence order: `Some(delta)` is the inter-arrival delta in
/// microseconds, `None` marks a packet that was not received.
/// `packet_status_count` mirrors `recv_deltas.len()`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TransportLayerCc {
    pub base_sequence_number: u16,
    pub packet_status_count: u16,
    /// Reference time in multiples of 64 ms; 24 bits on the wire.
    pub reference_time: u32,
    pub fb_pkt_count: u8,
    pub recv_deltas: Vec<Option<i64>>,
}

impl TransportLayerCc {
    /// Classifies one delta the way the encoder will emit it.
    fn symbol_for(delta: &Option<i64>) -> SymbolTypeTcc {
        match delta {
            None => SymbolTypeTcc::PacketNotReceived,
            Some(delta_us) => {
                let scaled = *delta_us / TYPE_TCC_DELTA_SCALE_FACTOR;
                if (0..=0xff).contains(&scaled) {
                    SymbolTypeTcc::PacketReceivedSmallDelta
                } else {
                    SymbolTypeTcc::PacketReceivedLargeDelta
                }
            }
        }
    }

    fn symbols(&self) -> Vec<SymbolTypeTcc> {
        self.recv_deltas.iter().map(Self::symbol_for).collect()
    }
}

/// A chunk being assembled by the packer. Vector symbols accumulate in
/// processing order (right to left) and are reversed into wire order when
/// the chunk is finalized.
enum PendingChunk {
    RunLength {
        symbol: SymbolTypeTcc,
        count: u16,
    },
    Vector {
        symbols: Vec<SymbolTypeTcc>,
    },
}

impl PendingChunk {
    fn finalize(self) -> PacketStatusChunk {
        match self {
            PendingChunk::RunLength { symbol, count } => {
                PacketStatusChunk::RunLengthChunk(RunLengthChunk {
                    packet_status_symbol: symbol,
                    run_length: count,
                })
            }
            PendingChunk::Vector { mut symbols } => {
                symbols.reverse();
                PacketStatusChunk::StatusVectorChunk(StatusVectorChunk {
                    symbol_size: SymbolSizeTypeTcc::TwoBit,
                    symbol_list: symbols,
                })
            }
        }
    }
}

/// Packs statuses into chunks, walking the status list right to left and
/// reversing the chunk list for emission.
///
/// Runs shorter than a vector's seven slots fold into a two-bit status
/// vector when the status changes; longer runs stay run-length encoded
/// because they would overflow a single vector. Only two-bit vectors are
/// emitted.
fn pack_chunks(statuses: &[SymbolTypeTcc]) -> Vec<PacketStatusChunk> {
    let mut chunks = Vec::new();
    let mut pending: Option<PendingChunk> = None;

    for &status in statuses.iter().rev() {
        pending = Some(match pending.take() {
            None => PendingChunk::RunLength {
                symbol: status,
                count: 1,
            },
            Some(PendingChunk::RunLength { symbol, count })
                if symbol == status && count < MAX_RUN_LENGTH_CAP =>
            {
                PendingChunk::RunLength {
                    symbol,
                    count: count + 1,
                }
            }
            Some(PendingChunk::RunLength { symbol, count })
                if (count as usize) < MAX_TWO_BIT_CAP =>
            {
                let mut symbols = vec![symbol; count as usize];
                symbols.push(status);
                PendingChunk::Vector { symbols }
            }
            Some(PendingChunk::Vector { mut symbols }) if symbols.len() < MAX_TWO_BIT_CAP => {
                symbols.push(status);
                PendingChunk::Vector { symbols }
            }
            Some(full) => {
                chunks.push(full.finalize());
                PendingChunk::RunLength {
                    symbol: status,
                    count: 1,
                }
            }
        });
    }

    if let Some(last) = pending {
        chunks.push(last.finalize());
    }
    chunks.reverse();
    chunks
}

fn get_padding(len: usize) -> usize {
    if len % 4 == 0 {
        0
    } else {
        4 - (len % 4)
    }
}

impl MarshalSize for TransportLayerCc {
    fn marshal_size(&self) -> usize {
        let statuses = self.symbols();
        let chunks_len = pack_chunks(&statuses).len() * 2;
        let deltas_len: usize = statuses.iter().map(|s| s.delta_size()).sum();
        let len = HEADER_LENGTH + chunks_len + deltas_len;
        len + get_padding(len)
    }
}

impl Marshal for TransportLayerCc {
    fn marshal_to(&self, mut buf: &mut [u8]) -> Result<usize> {
        let len = self.marshal_size();
        if buf.len() < len {
            return Err(Error::WrongMarshalSize);
        }

        buf.put_u16(self.base_sequence_number);
        buf.put_u16(self.recv_deltas.len() as u16);
        buf.put_uint(u64::from(self.reference_time) & 0xFF_FFFF, 3);
        buf.put_u8(self.fb_pkt_count);

        let statuses = self.symbols();
        let mut written = HEADER_LENGTH;
        for chunk in pack_chunks(&statuses) {
            buf.put_u16(chunk.as_u16());
            written += 2;
        }

        for delta_us in self.recv_deltas.iter().flatten() {
            let scaled = delta_us / TYPE_TCC_DELTA_SCALE_FACTOR;
            if (0..=0xff).contains(&scaled) {
                buf.put_u8(scaled as u8);
                written += 1;
            } else {
                let clamped = scaled.clamp(i64::from(i16::MIN), i64::from(i16::MAX));
                if clamped != scaled {
                    log::warn!(
                        "receive delta {delta_us}us exceeds the signed 16-bit range, clamping"
                    );
                }
                buf.put_i16(clamped as i16);
                written += 2;
            }
        }

        for _ in 0..get_padding(written) {
            buf.put_u8(0);
            written += 1;
        }

        Ok(written)
    }
}

impl Unmarshal for TransportLayerCc {
    fn unmarshal<B>(raw_packet: &mut B) -> Result<Self>
    where
        B: Buf,
    {
        if raw_packet.remaining() < HEADER_LENGTH {
            return Err(Error::PacketTooShort);
        }

        let base_sequence_number = raw_packet.get_u16();
        let packet_status_count = raw_packet.get_u16();
        let reference_time = raw_packet.get_uint(3) as u32;
        let fb_pkt_count = raw_packet.get_u8();

        let mut consumed = HEADER_LENGTH;
        let mut statuses = Vec::with_capacity(packet_status_count as usize);
        while statuses.len() < packet_status_count as usize {
            let remaining = packet_status_count as usize - statuses.len();
            let chunk = PacketStatusChunk::unmarshal(raw_packet)?;
            consumed += 2;
            match chunk {
                PacketStatusChunk::RunLengthChunk(rlc) => {
                    let take = (rlc.run_length as usize).min(remaining);
                    statuses.extend(std::iter::repeat(rlc.packet_status_symbol).take(take));
                }
                PacketStatusChunk::StatusVectorChunk(svc) => {
                    // The final chunk may carry trailing zero symbols past
                    // the status count; drop them.
                    statuses.extend(svc.symbol_list.into_iter().take(remaining));
                }
            }
        }

        let mut recv_deltas = Vec::with_capacity(statuses.len());
        for status in &statuses {
            let size = status.delta_size();
            if raw_packet.remaining() < size {
                return Err(Error::PacketTooShort);
            }
            consumed += size;
            match status {
                SymbolTypeTcc::PacketReceivedSmallDelta => {
                    let raw = i64::from(raw_packet.get_u8());
                    recv_deltas.push(Some(raw * TYPE_TCC_DELTA_SCALE_FACTOR));
                }
                SymbolTypeTcc::PacketReceivedLargeDelta => {
                    let raw = i64::from(raw_packet.get_i16());
                    recv_deltas.push(Some(raw * TYPE_TCC_DELTA_SCALE_FACTOR));
                }
                _ => recv_deltas.push(None),
            }
        }

        let padding = get_padding(consumed).min(raw_packet.remaining());
        raw_packet.advance(padding);

        Ok(TransportLayerCc {
            base_sequence_number,
            packet_status_count,
            reference_time,
            fb_pkt_count,
            recv_deltas,
        })
    }
}
