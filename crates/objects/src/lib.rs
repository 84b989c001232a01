//! Content-addressed object storage.
//!
//! Objects are blobs named by the lowercase hex MD5 of their content and
//! laid out as `<root>/<first-two-hex>/<full-hex>`. The store never deletes
//! or rewrites an object; identical content fetched from different servers
//! converges on a single file.

pub mod error;
pub mod store;
pub mod writer;

pub use error::{StoreError, StoreResult};
pub use store::{ObjectMeta, ObjectStore, hash_from_etag, is_hash};
pub use writer::ObjectWriter;
