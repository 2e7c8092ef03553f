pub mod transport_layer_cc;
