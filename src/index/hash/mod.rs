pub mod bucket_page;
pub mod directory_page;
pub mod error;
pub mod key;
pub mod table;

pub use bucket_page::HashBucket;
pub use directory_page::{HashDirectory, DIRECTORY_ARRAY_SIZE, MAX_GLOBAL_DEPTH};
pub use error::HashIndexError;
pub use key::{FixedLenCodec, KeyHasher, XxKeyHasher};
pub use table::ExtendibleHashTable;
