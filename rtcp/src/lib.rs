#![warn(rust_2018_idioms)]

pub mod transport_feedbacks;
