//! Canopy conversion subsystem
//!
//! Moves values between caller types and the plain data stored in a node
//! tree.
//!
//! - [`Converter`]: swappable strategy (normalization + coercion candidates)
//! - [`convert`]: decode stored data as a requested type
//! - [`to_storable`]: encode a caller value as storable data
//!
//! # Example
//!
//! ```rust
//! use canopy_convert::{convert, LenientConverter};
//! use serde_json::json;
//!
//! let port: u16 = convert(&LenientConverter, json!("8080")).unwrap();
//! assert_eq!(port, 8080);
//! ```

#![warn(missing_docs)]

mod converter;
mod error;

pub use converter::{convert, to_storable, Converter, LenientConverter, StrictConverter};
pub use error::ConversionError;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
