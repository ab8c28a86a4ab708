// FLV output module

mod writer;

pub use writer::*;
