//! Query cache over the Flora API client
//!
//! `FloraStore` wraps a [`flora_api::FloraClient`]. Reads are cached per
//! full parameter tuple ([`QueryKey`]) and provide [`CacheTag`]s; mutations
//! go straight to the server and, on success, mark every entry providing a
//! matching tag as stale so the next read refetches it.
//!
//! ```no_run
//! use flora_api::{ClientOptions, FloraClient, PlantStatus};
//! use flora_store::{FloraStore, StoreOptions};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = FloraClient::new("http://localhost:3000".parse()?, ClientOptions::default())?;
//! let store = FloraStore::new(client, StoreOptions::default());
//!
//! let active = store.plants(1, Some(PlantStatus::Active)).await?;
//! store.set_plant_status(active.items[0].id, PlantStatus::Inactive).await?;
//! // Refetched: the status change invalidated every plant list
//! let active = store.plants(1, Some(PlantStatus::Active)).await?;
//! # Ok(())
//! # }
//! ```

mod filter;
mod store;
mod tags;
mod types;

pub use filter::PlantQuery;
pub use store::FloraStore;
pub use tags::{CacheTag, TagKind, TagScope};
pub use types::{
    CacheStats, Cacheable, CachedValue, Fetch, QueryKey, QueryStatus, RefetchReport,
    StoreOptions,
};
