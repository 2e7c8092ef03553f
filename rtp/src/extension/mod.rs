pub mod transport_cc_extension;
