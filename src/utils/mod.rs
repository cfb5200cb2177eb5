pub mod sanitize;
pub mod secret;

pub use secret::Secret;
