pub mod cache;
pub mod models;
pub mod mute;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;
