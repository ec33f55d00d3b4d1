//! Common types shared across the WeChat publishing crates

mod secret;

pub use secret::Secret;
