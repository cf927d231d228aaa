//! Rust client for the Flora plant identification backend
//!
//! Typed bindings for the identification, catalog (plants, families,
//! taxonomies), chat and usage endpoints of a single backend base URL.
//!
//! # Example
//!
//! ```no_run
//! use flora_api::{ClientOptions, FloraClient, ImageUpload, PlantListParams};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = FloraClient::new("http://localhost:3000".parse()?, ClientOptions::default())?;
//!
//! let image = ImageUpload::from_path("leaf.jpg").await?;
//! let ident = client.identify_image(image).await?;
//! if let Some(best) = ident.api_response.as_ref().and_then(|r| r.best_suggestion()) {
//!     println!("{} ({}%)", best.plant_name, best.percent());
//! }
//!
//! let plants = client.list_plants(&PlantListParams { page: 1, ..Default::default() }).await?;
//! println!("{} plants", plants.total);
//! # Ok(())
//! # }
//! ```
//!
//! # Endpoints
//!
//! - `POST /identificaciones`, `GET /identificaciones[/{id}]`
//! - `GET|POST /plantas`, `GET|PUT /plantas/{id}`, `PATCH /plantas/{id}/estado`
//! - `GET|POST /familias`, `PUT /familias/{id}`, `PATCH /familias/{id}/estado`
//! - `GET|POST /taxonomias`, `PUT /taxonomias/{id}`
//! - `POST /chat/conversaciones`, `GET /chat/conversaciones/{id}`,
//!   `POST /chat/conversaciones/{id}/mensajes`, `GET /chat/conversaciones/{id}/historial`
//! - `GET /uso`

mod client;
mod error;
pub mod pagination;
mod types;
mod upload;

#[cfg(any(test, feature = "test-util"))]
pub mod fake;

pub use client::{ClientOptions, FamilyListContract, FloraClient};
pub use error::{ApiError, Result};
pub use pagination::Pagination;
pub use reqwest::StatusCode;
pub use types::{
    ApiImage, CanUseCredits, Conversation, CreditWindow, Family, FamilyListParams,
    FamilySummary, HistoryParams, Identification, IdentificationSummary, IdentifyApiResponse,
    ImageUpload, Message, MessageExchange, NewFamily, NewPlant, NewTaxonomy, Page, Plant,
    PlantDetails, PlantListParams, PlantStatus, PlantTaxonomy, PlantUpdate, Role,
    SimilarImage, StartConversation, StructuredName, Suggestion, SuggestionTaxonomy, Taxonomy,
    UsageSnapshot, WikiDescription,
};
