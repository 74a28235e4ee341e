//! Canopy Node - mutable configuration tree engine
//!
//! The common in-memory representation that format codecs and client code
//! manipulate:
//! - Four value variants: null, scalar, list and map
//! - Virtual nodes that materialize deep paths only when written
//! - Automatic promotion of parent variants on attach
//! - Deep copy and value-preserving merge
//! - Safe concurrent mutation of one tree from many threads
//!
//! # Example
//!
//! ```rust
//! use canopy_node::prelude::*;
//! use serde_json::json;
//!
//! let tree = Tree::new();
//! let root = tree.root();
//!
//! let port = root.node(["server", "port"]);
//! assert!(port.is_virtual());
//! port.set(&8080).unwrap();
//!
//! root.node(["server", "hosts"]).append_child().set("a.example").unwrap();
//! assert_eq!(root.get(), json!({"server": {"port": 8080, "hosts": ["a.example"]}}));
//! ```

#![warn(unreachable_pub)]
#![warn(missing_docs)]

mod arena;
pub mod error;
mod key;
mod merge;
mod node;
pub mod path;
mod shape;
mod tree;
mod value;

pub use arena::NodeId;
pub use error::{require, NodeError, Result};
pub use key::Key;
pub use node::{Node, TreeNode};
pub use path::{NodePath, PathError};
pub use shape::Shape;
pub use tree::{Tree, TreeConfig};
pub use value::ValueKind;

pub use canopy_convert::{ConversionError, Converter, LenientConverter, StrictConverter};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with node trees
    pub use crate::{Key, Node, NodePath, Tree, TreeConfig, TreeNode, ValueKind};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
