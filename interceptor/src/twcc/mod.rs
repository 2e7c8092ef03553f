//! Transport-wide congestion control, receive side.
//!
//! [`TwccReceiver`] watches inbound RTP packets for the transport-wide
//! sequence-number header extension, records their arrival times in a
//! [`PacketInfoStore`], and periodically turns the accumulated window into
//! a [`rtcp::transport_feedbacks::transport_layer_cc::TransportLayerCc`]
//! feedback payload.

mod packet_info;
pub mod receiver;

pub use packet_info::{FeedbackWindow, PacketInfoStore};
pub use receiver::{TwccReceiver, TwccReceiverBuilder};

/// The URI for the transport-wide CC RTP header extension.
pub const TRANSPORT_CC_URI: &str =
    "http://www.ietf.org/id/draft-holmer-rmcat-transport-wide-cc-extensions-01";
