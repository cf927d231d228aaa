//! Data types for Flora API requests and responses
//!
//! The backend uses Spanish field names on the wire; the Rust side uses
//! English names with serde renames.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A page of results, normalized by the client so `page` and `limit` are
/// always populated even when the server only sends `items` and `total`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub limit: u32,
}

impl<T> Page<T> {
    /// Build a page whose metadata is derived from the array alone
    pub fn from_full_list(items: Vec<T>) -> Self {
        let len = items.len();
        Self {
            items,
            total: len as u64,
            page: 1,
            limit: len as u32,
        }
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Family {
    pub id: u64,
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "descripcion", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "estado")]
    pub active: bool,
    #[serde(rename = "creadoEn")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "actualizadoEn")]
    pub updated_at: DateTime<Utc>,
}

/// Family fields embedded in a plant's nested taxonomy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilySummary {
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "descripcion", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Taxonomy {
    pub id: u64,
    #[serde(rename = "reino", default, skip_serializing_if = "Option::is_none")]
    pub kingdom: Option<String>,
    #[serde(rename = "filo", default, skip_serializing_if = "Option::is_none")]
    pub phylum: Option<String>,
    #[serde(rename = "clase", default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    #[serde(rename = "orden", default, skip_serializing_if = "Option::is_none")]
    pub order: Option<String>,
    #[serde(rename = "genero", default, skip_serializing_if = "Option::is_none")]
    pub genus: Option<String>,
    #[serde(rename = "especie", default, skip_serializing_if = "Option::is_none")]
    pub species: Option<String>,
    #[serde(rename = "rango", default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<String>,
    #[serde(rename = "familiaId")]
    pub family_id: u64,
}

impl Taxonomy {
    /// "Genus species" label used in pickers
    pub fn label(&self) -> String {
        [self.genus.as_deref(), self.species.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlantTaxonomy {
    #[serde(flatten)]
    pub taxonomy: Taxonomy,
    #[serde(rename = "familia", default, skip_serializing_if = "Option::is_none")]
    pub family: Option<FamilySummary>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlantStatus {
    #[serde(rename = "ACTIVA")]
    Active,
    #[serde(rename = "INACTIVA")]
    Inactive,
}

impl PlantStatus {
    pub fn as_wire(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVA",
            Self::Inactive => "INACTIVA",
        }
    }
}

impl fmt::Display for PlantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_wire())
    }
}

impl FromStr for PlantStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ACTIVA" | "ACTIVE" => Ok(Self::Active),
            "INACTIVA" | "INACTIVE" => Ok(Self::Inactive),
            other => Err(format!("unknown plant status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plant {
    pub id: u64,
    #[serde(rename = "nombreCientifico")]
    pub scientific_name: String,
    #[serde(rename = "nombresComunes", default)]
    pub common_names: Vec<String>,
    #[serde(rename = "estado")]
    pub status: PlantStatus,
    #[serde(rename = "taxonomiaId")]
    pub taxonomy_id: u64,
    #[serde(rename = "familiaId", default, skip_serializing_if = "Option::is_none")]
    pub family_id: Option<u64>,
    #[serde(rename = "creadoEn")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "actualizadoEn")]
    pub updated_at: DateTime<Utc>,
    #[serde(rename = "imagenes", default)]
    pub images: Vec<String>,
    /// Denormalized copy, read-only convenience
    #[serde(rename = "taxonomia", default, skip_serializing_if = "Option::is_none")]
    pub taxonomy: Option<PlantTaxonomy>,
}

impl Plant {
    /// Case-insensitive substring match on the scientific name or any common name.
    ///
    /// `needle` must already be lowercased.
    pub fn matches_lowercase(&self, needle: &str) -> bool {
        self.scientific_name.to_lowercase().contains(needle)
            || self
                .common_names
                .iter()
                .any(|name| name.to_lowercase().contains(needle))
    }

    /// Family name from the nested taxonomy, when the server sent one
    pub fn family_name(&self) -> Option<&str> {
        self.taxonomy
            .as_ref()
            .and_then(|t| t.family.as_ref())
            .map(|f| f.name.as_str())
    }

    /// True when both the flat and nested family ids are present and disagree.
    pub fn has_family_mismatch(&self) -> bool {
        match (self.family_id, self.taxonomy.as_ref()) {
            (Some(flat), Some(nested)) => flat != nested.taxonomy.family_id,
            _ => false,
        }
    }
}

/// Fields for `POST /plantas` (sent as multipart)
#[derive(Debug, Clone)]
pub struct NewPlant {
    pub scientific_name: String,
    pub common_names: Vec<String>,
    pub taxonomy_id: u64,
    pub family_id: Option<u64>,
    pub image: Option<ImageUpload>,
}

/// Body for `PUT /plantas/{id}`; images are not changed by updates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlantUpdate {
    #[serde(rename = "nombreCientifico")]
    pub scientific_name: String,
    #[serde(rename = "nombresComunes")]
    pub common_names: Vec<String>,
    #[serde(rename = "taxonomiaId")]
    pub taxonomy_id: u64,
    #[serde(rename = "familiaId", default, skip_serializing_if = "Option::is_none")]
    pub family_id: Option<u64>,
}

/// Body for family create/update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewFamily {
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "descripcion", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Body for taxonomy create/update
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewTaxonomy {
    #[serde(rename = "familiaId")]
    pub family_id: u64,
    #[serde(rename = "reino", default, skip_serializing_if = "Option::is_none")]
    pub kingdom: Option<String>,
    #[serde(rename = "filo", default, skip_serializing_if = "Option::is_none")]
    pub phylum: Option<String>,
    #[serde(rename = "clase", default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    #[serde(rename = "orden", default, skip_serializing_if = "Option::is_none")]
    pub order: Option<String>,
    #[serde(rename = "genero", default, skip_serializing_if = "Option::is_none")]
    pub genus: Option<String>,
    #[serde(rename = "especie", default, skip_serializing_if = "Option::is_none")]
    pub species: Option<String>,
    #[serde(rename = "rango", default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PlantListParams {
    pub page: u32,
    pub status: Option<PlantStatus>,
    /// Applied client-side to the fetched page, never sent to the server
    pub query: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FamilyListParams {
    pub query: String,
    pub page: u32,
}

impl FamilyListParams {
    /// The request actually sent: trimmed query, page at least 1
    pub fn normalized(&self) -> Self {
        Self {
            query: self.query.trim().to_string(),
            page: self.page.max(1),
        }
    }
}

// ---------------------------------------------------------------------------
// Identification
// ---------------------------------------------------------------------------

/// An image to upload, as multipart file content
#[derive(Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl fmt::Debug for ImageUpload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageUpload")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiImage {
    pub url: String,
    #[serde(default)]
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SuggestionTaxonomy {
    pub kingdom: Option<String>,
    pub phylum: Option<String>,
    pub class: Option<String>,
    pub order: Option<String>,
    pub family: Option<String>,
    pub genus: Option<String>,
    pub species: Option<String>,
    pub rank: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredName {
    pub genus: Option<String>,
    pub species: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WikiDescription {
    pub value: String,
    pub citation: Option<String>,
    pub license_url: Option<String>,
    pub license_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlantDetails {
    pub url: Option<String>,
    pub language: Option<String>,
    #[serde(default)]
    pub taxonomy: SuggestionTaxonomy,
    #[serde(default)]
    pub common_names: Vec<String>,
    pub scientific_name: Option<String>,
    pub structured_name: Option<StructuredName>,
    pub wiki_description: Option<WikiDescription>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarImage {
    pub id: String,
    pub url: String,
    pub similarity: f64,
    pub citation: Option<String>,
    pub url_small: Option<String>,
    pub license_url: Option<String>,
    pub license_name: Option<String>,
}

/// One candidate species within an identification result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub id: u64,
    #[serde(default)]
    pub confirmed: bool,
    pub plant_name: String,
    pub probability: f64,
    #[serde(default)]
    pub plant_details: Option<PlantDetails>,
    #[serde(default)]
    pub similar_images: Vec<SimilarImage>,
}

impl Suggestion {
    /// Probability as a percentage with two decimals, e.g. "87.35"
    pub fn percent(&self) -> String {
        format!("{:.2}", self.probability * 100.0)
    }

    pub fn common_names(&self) -> &[String] {
        self.plant_details
            .as_ref()
            .map(|d| d.common_names.as_slice())
            .unwrap_or(&[])
    }
}

/// The third-party identification payload, passed through by the backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentifyApiResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub images: Vec<ApiImage>,
    #[serde(default)]
    pub is_plant: Option<bool>,
    #[serde(default)]
    pub suggestions: Vec<Suggestion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

impl IdentifyApiResponse {
    pub fn best_suggestion(&self) -> Option<&Suggestion> {
        self.suggestions.first()
    }

    pub fn other_suggestions(&self) -> &[Suggestion] {
        self.suggestions.get(1..).unwrap_or(&[])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identification {
    pub id: u64,
    #[serde(rename = "imagenBase64", default, skip_serializing_if = "Option::is_none")]
    pub image_base64: Option<String>,
    #[serde(rename = "confianza")]
    pub confidence: f64,
    #[serde(rename = "respuestaApi", default)]
    pub api_response: Option<IdentifyApiResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    #[serde(rename = "creadaEn")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "planta", default, skip_serializing_if = "Option::is_none")]
    pub plant: Option<Plant>,
    #[serde(rename = "taxonomia", default, skip_serializing_if = "Option::is_none")]
    pub taxonomy: Option<Taxonomy>,
    #[serde(rename = "familia", default, skip_serializing_if = "Option::is_none")]
    pub family: Option<Family>,
}

/// Row in the identification list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentificationSummary {
    pub id: u64,
    #[serde(rename = "confianza")]
    pub confidence: f64,
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "USUARIO", alias = "USER")]
    User,
    #[serde(rename = "BOT")]
    Bot,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => f.write_str("USER"),
            Self::Bot => f.write_str("BOT"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: u64,
    #[serde(rename = "conversacionId")]
    pub conversation_id: u64,
    pub role: Role,
    pub content: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: u64,
    pub identification_id: String,
    pub secret: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub credits_used: f64,
    #[serde(default)]
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartConversation {
    pub identification_id: String,
    pub secret: String,
}

/// The persisted user message and the bot's reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageExchange {
    pub user_message: Message,
    pub bot_message: Message,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HistoryParams {
    pub conversation_id: u64,
    pub page: u32,
    pub limit: u32,
}

impl HistoryParams {
    pub const DEFAULT_LIMIT: u32 = 25;

    pub fn first_page(conversation_id: u64) -> Self {
        Self {
            conversation_id,
            page: 1,
            limit: Self::DEFAULT_LIMIT,
        }
    }

    /// Page at least 1; a zero limit means the default
    pub fn normalized(&self) -> Self {
        Self {
            conversation_id: self.conversation_id,
            page: self.page.max(1),
            limit: if self.limit == 0 {
                Self::DEFAULT_LIMIT
            } else {
                self.limit
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Usage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreditWindow {
    pub day: Option<f64>,
    pub week: Option<f64>,
    pub month: Option<f64>,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanUseCredits {
    pub value: bool,
    pub reason: Option<String>,
}

/// Point-in-time view of the identification provider's credit counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    pub active: bool,
    pub credit_limits: CreditWindow,
    pub used: CreditWindow,
    pub can_use_credits: CanUseCredits,
    pub remaining: CreditWindow,
}
