//! # meridian-store
//!
//! In-memory hierarchical key-path tree of typed values. All other components
//! read and write the replicated document exclusively through [`ValueStore`].
//!
//! Writes auto-vivify intermediate mappings. A write that fails leaves the
//! tree untouched: intermediates are only created below the deepest existing
//! mapping, and every shape check that can fail runs against values that
//! already existed.
//!
//! # Examples
//!
//! ```
//! use meridian_core::{KeyPath, Value};
//! use meridian_store::ValueStore;
//!
//! let mut store = ValueStore::new();
//! let status = KeyPath::parse("users.alice.status").unwrap();
//! store.set(&status, Value::from("online")).unwrap();
//!
//! assert_eq!(store.get(&status), Some(&Value::from("online")));
//! assert!(store.get(&KeyPath::parse("users.bob").unwrap()).is_none());
//! ```

mod store;

pub use store::ValueStore;
