pub mod embedding_http;
pub mod fs_obj;
pub mod kv_redb;
pub mod postgres;

pub use embedding_http::HttpEmbeddingProvider;
pub use fs_obj::FsObjStore;
pub use kv_redb::RedbKvStore;
pub use postgres::{PgRelStore, PgVecStore};
