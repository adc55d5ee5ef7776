//! Common types shared by the key pool, the inference transport and the
//! smoke-check service.

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
