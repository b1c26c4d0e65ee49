pub mod config_cmd;
#[cfg(feature = "simulate")]
pub mod simulate;
