use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, PartialEq, Eq, Clone)]
#[non_exhaustive]
pub enum Error {
    //Jitter buffer errors
    /// The jitter buffer cannot operate without a configured latency.
    #[error("latency is not set")]
    ErrLatencyNotSet,
    /// The jitter buffer cannot compute transit times without a clock rate.
    #[error("clock rate is not set")]
    ErrClockRateNotSet,
    /// Packet index is at or below the store's water mark.
    #[error("packet arrived too late")]
    ErrLatePacket,
    /// Packet index is already buffered.
    #[error("packet is a duplicate")]
    ErrDuplicatePacket,

    //TWCC feedback errors
    /// Wrong marshal size.
    #[error("Wrong marshal size")]
    WrongMarshalSize,
    /// Payload shorter than its fixed header or a receive delta.
    #[error("Packet too short")]
    PacketTooShort,
    /// Chunk stream ended before the packet status count was satisfied.
    #[error("Packet status chunk must be 2 bytes")]
    PacketStatusChunkLength,

    //RTP errors
    #[error("buffer too small")]
    ErrBufferTooSmall,
}
