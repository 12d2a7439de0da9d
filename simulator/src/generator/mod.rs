pub mod probes;
pub mod profile;
pub mod spectrum;
