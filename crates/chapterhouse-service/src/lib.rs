//! Chapter purchase and access control for chapterhouse.
//!
//! [`CommerceService`] answers whether a reader may open a chapter, sells
//! chapters (singly, in batches, or as a whole book), and reports what a
//! reader has bought.
//!
//! - **Access**: free chapters, then chapter purchase rows, then whole-book purchases
//! - **Purchases**: wallet charge and ledger write, with refund if the write fails
//! - **Catalog**: per-book chapter lists with the viewer's purchase flags
//! - **Cache**: post-commit invalidation of cached pages (in-process or Redis)
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use chapterhouse_core::{Book, Chapter, UserId, Viewer};
//! use chapterhouse_service::{CommerceConfig, CommerceService, MemoryCache};
//! use chapterhouse_store::{MemoryStore, Store};
//! use chapterhouse_wallet::MemoryWallet;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(MemoryStore::new());
//! let wallet = Arc::new(MemoryWallet::new());
//! let service = CommerceService::new(
//!     store.clone(),
//!     wallet.clone(),
//!     Arc::new(MemoryCache::new()),
//!     CommerceConfig::default(),
//! );
//!
//! let book = Book::new("Dune", "Frank Herbert");
//! let chapter = Chapter::paid(book.id, 1, "Desert", 299);
//! store.put_book(&book)?;
//! store.put_chapter(&chapter)?;
//!
//! let user_id = UserId::generate();
//! wallet.set_balance(user_id, 1_000).await;
//!
//! service.purchase_chapter(user_id, &chapter.id).await?;
//! assert!(service.can_access_chapter(Viewer::Authenticated(user_id), &chapter.id)?);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod access;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod history;
pub mod purchase;
pub mod service;
pub mod telemetry;

pub use cache::{Cache, CacheCoordinator, CacheError, CacheKeys, Invalidation, MemoryCache};
#[cfg(feature = "redis-cache")]
pub use cache::RedisCache;
pub use config::CommerceConfig;
pub use error::ServiceError;
pub use history::PurchaseHistory;
pub use purchase::BatchReceipt;
pub use service::CommerceService;
