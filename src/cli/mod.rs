pub mod fakesensor;
pub mod harness;
pub mod info;
