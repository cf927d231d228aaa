//! Flora backend HTTP client

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};
use url::Url;

use crate::error::{ApiError, Result};
use crate::types::*;

/// How the family list endpoint shapes its response.
///
/// Deployed backends disagree: some return a `{items, total, page, limit}`
/// envelope, older ones return a bare array of every matching family.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FamilyListContract {
    #[default]
    ServerPaginated,
    /// Bare array; `total`, `page` and `limit` are derived from its length
    ClientFabricated,
}

impl FromStr for FamilyListContract {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "server" | "server-paginated" => Ok(Self::ServerPaginated),
            "client" | "client-fabricated" | "array" => Ok(Self::ClientFabricated),
            other => Err(format!("unknown family list contract: {}", other)),
        }
    }
}

impl fmt::Display for FamilyListContract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ServerPaginated => f.write_str("server"),
            Self::ClientFabricated => f.write_str("client"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    /// Request timeout; `None` keeps the transport default
    pub timeout: Option<Duration>,
    pub family_list_contract: FamilyListContract,
}

/// Client for the Flora backend
///
/// One instance talks to one base URL. Every call is a single request with
/// no retry; failures are returned to the caller as [`ApiError`].
#[derive(Clone)]
pub struct FloraClient {
    http: reqwest::Client,
    base_url: String,
    family_list_contract: FamilyListContract,
}

impl FloraClient {
    /// Page size the plant list endpoint uses
    pub const PLANT_PAGE_SIZE: u32 = 25;
    /// Page size the family list endpoint uses when it does not say
    pub const FAMILY_PAGE_SIZE: u32 = 25;

    pub fn new(base_url: Url, options: ClientOptions) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = options.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build()?;

        Ok(Self {
            http,
            base_url: base_url.as_str().trim_end_matches('/').to_string(),
            family_list_contract: options.family_list_contract,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // -- Identifications ---------------------------------------------------

    /// Upload an image for identification (multipart field `image`)
    pub async fn identify_image(&self, image: ImageUpload) -> Result<Identification> {
        if image.bytes.is_empty() {
            return Err(ApiError::invalid("image file is empty"));
        }

        let file_name = image.file_name.clone();
        let part = Part::bytes(image.bytes)
            .file_name(image.file_name)
            .mime_str(&image.content_type)?;
        let form = Form::new().part("image", part);

        let path = "/identificaciones";
        let ident: Identification = self
            .execute(self.request(Method::POST, path).multipart(form), path)
            .await?;
        info!(id = ident.id, file = %file_name, confidence = ident.confidence, "Image identified");
        Ok(ident)
    }

    pub async fn list_identifications(
        &self,
        page: u32,
        limit: u32,
    ) -> Result<Page<IdentificationSummary>> {
        let path = format!("/identificaciones?page={}&limit={}", page, limit);
        let mut result: Page<IdentificationSummary> = self.get(&path).await?;
        normalize_page(&mut result, page, limit);
        Ok(result)
    }

    pub async fn get_identification(&self, id: u64) -> Result<Identification> {
        self.get(&format!("/identificaciones/{}", id)).await
    }

    // -- Plants ------------------------------------------------------------

    /// Fetch one page of plants.
    ///
    /// Only `page` and `status` reach the server; `params.query` is ignored
    /// here and applied by callers to the fetched page.
    pub async fn list_plants(&self, params: &PlantListParams) -> Result<Page<Plant>> {
        let page = params.page.max(1);
        let mut path = format!("/plantas?q=&page={}", page);
        if let Some(status) = params.status {
            path.push_str(&format!("&estado={}", status.as_wire()));
        }

        let mut result: Page<Plant> = self.get(&path).await?;
        result.page = page;
        result.limit = Self::PLANT_PAGE_SIZE;
        Ok(result)
    }

    pub async fn get_plant(&self, id: u64) -> Result<Plant> {
        self.get(&format!("/plantas/{}", id)).await
    }

    /// Create a plant (multipart, optional image under `imagen`)
    pub async fn create_plant(&self, plant: NewPlant) -> Result<Plant> {
        if plant.scientific_name.trim().is_empty() {
            return Err(ApiError::invalid("scientific name is required"));
        }

        let mut form = Form::new()
            .text("nombreCientifico", plant.scientific_name.trim().to_string())
            .text(
                "nombresComunes",
                serde_json::to_string(&clean_names(&plant.common_names))?,
            )
            .text("taxonomiaId", plant.taxonomy_id.to_string());
        if let Some(family_id) = plant.family_id {
            form = form.text("familiaId", family_id.to_string());
        }
        if let Some(image) = plant.image {
            let part = Part::bytes(image.bytes)
                .file_name(image.file_name)
                .mime_str(&image.content_type)?;
            form = form.part("imagen", part);
        }

        let path = "/plantas";
        let created: Plant = self
            .execute(self.request(Method::POST, path).multipart(form), path)
            .await?;
        info!(id = created.id, name = %created.scientific_name, "Plant created");
        Ok(created)
    }

    pub async fn update_plant(&self, id: u64, update: &PlantUpdate) -> Result<Plant> {
        let path = format!("/plantas/{}", id);
        let updated: Plant = self.send_json(Method::PUT, &path, update).await?;
        info!(id, "Plant updated");
        Ok(updated)
    }

    pub async fn set_plant_status(&self, id: u64, status: PlantStatus) -> Result<()> {
        let path = format!("/plantas/{}/estado", id);
        self.send_json_no_content(Method::PATCH, &path, &json!({ "estado": status }))
            .await?;
        info!(id, status = %status, "Plant status changed");
        Ok(())
    }

    // -- Families ----------------------------------------------------------

    pub async fn list_families(&self, params: &FamilyListParams) -> Result<Page<Family>> {
        let FamilyListParams { query, page } = params.normalized();
        let path = format!("/familias?q={}&page={}", urlencoding::encode(&query), page);

        match self.family_list_contract {
            FamilyListContract::ServerPaginated => {
                let mut result: Page<Family> = self.get(&path).await?;
                normalize_page(&mut result, page, Self::FAMILY_PAGE_SIZE);
                Ok(result)
            }
            FamilyListContract::ClientFabricated => {
                let items: Vec<Family> = self.get(&path).await?;
                Ok(Page::from_full_list(items))
            }
        }
    }

    pub async fn create_family(&self, family: &NewFamily) -> Result<Family> {
        let created: Family = self.send_json(Method::POST, "/familias", family).await?;
        info!(id = created.id, name = %created.name, "Family created");
        Ok(created)
    }

    pub async fn update_family(&self, id: u64, family: &NewFamily) -> Result<Family> {
        let body = with_id(id, family)?;
        let updated: Family = self
            .send_json(Method::PUT, &format!("/familias/{}", id), &body)
            .await?;
        info!(id, "Family updated");
        Ok(updated)
    }

    pub async fn set_family_status(&self, id: u64, active: bool) -> Result<()> {
        let path = format!("/familias/{}/estado", id);
        self.send_json_no_content(Method::PATCH, &path, &json!({ "estado": active }))
            .await?;
        info!(id, active, "Family status changed");
        Ok(())
    }

    // -- Taxonomies --------------------------------------------------------

    /// All taxonomies, or only those of `family_id`
    pub async fn list_taxonomies(&self, family_id: Option<u64>) -> Result<Vec<Taxonomy>> {
        let path = match family_id {
            Some(id) => format!("/taxonomias?familiaId={}", id),
            None => "/taxonomias".to_string(),
        };
        self.get(&path).await
    }

    pub async fn create_taxonomy(&self, taxonomy: &NewTaxonomy) -> Result<Taxonomy> {
        let created: Taxonomy = self.send_json(Method::POST, "/taxonomias", taxonomy).await?;
        info!(id = created.id, family_id = created.family_id, "Taxonomy created");
        Ok(created)
    }

    pub async fn update_taxonomy(&self, id: u64, taxonomy: &NewTaxonomy) -> Result<Taxonomy> {
        let body = with_id(id, taxonomy)?;
        let updated: Taxonomy = self
            .send_json(Method::PUT, &format!("/taxonomias/{}", id), &body)
            .await?;
        info!(id, "Taxonomy updated");
        Ok(updated)
    }

    // -- Chat --------------------------------------------------------------

    pub async fn start_conversation(&self, request: &StartConversation) -> Result<Conversation> {
        if request.identification_id.trim().is_empty() || request.secret.trim().is_empty() {
            return Err(ApiError::invalid(
                "identification id and secret are both required",
            ));
        }

        let conversation: Conversation = self
            .send_json(Method::POST, "/chat/conversaciones", request)
            .await?;
        info!(
            conversation_id = conversation.id,
            identification_id = %request.identification_id,
            "Conversation started"
        );
        Ok(conversation)
    }

    pub async fn send_message(&self, conversation_id: u64, content: &str) -> Result<MessageExchange> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ApiError::invalid("message content must not be empty"));
        }

        let path = format!("/chat/conversaciones/{}/mensajes", conversation_id);
        self.send_json(Method::POST, &path, &json!({ "content": content }))
            .await
    }

    pub async fn get_conversation(&self, id: u64) -> Result<Conversation> {
        self.get(&format!("/chat/conversaciones/{}", id)).await
    }

    pub async fn get_history(&self, params: &HistoryParams) -> Result<Page<Message>> {
        let HistoryParams {
            conversation_id,
            page,
            limit,
        } = params.normalized();
        let path = format!(
            "/chat/conversaciones/{}/historial?page={}&limit={}",
            conversation_id, page, limit
        );
        let mut result: Page<Message> = self.get(&path).await?;
        normalize_page(&mut result, page, limit);
        Ok(result)
    }

    // -- Usage -------------------------------------------------------------

    pub async fn get_usage(&self) -> Result<UsageSnapshot> {
        self.get("/uso").await
    }

    // -- Plumbing ----------------------------------------------------------

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        debug!(%method, path, "Flora request");
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .header("Accept", "application/json")
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.execute(self.request(Method::GET, path), path).await
    }

    async fn send_json<B, T>(&self, method: Method, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.execute(self.request(method, path).json(body), path)
            .await
    }

    async fn send_json_no_content<B>(&self, method: Method, path: &str, body: &B) -> Result<()>
    where
        B: Serialize + ?Sized,
    {
        let response = self.request(method, path).json(body).send().await?;
        check_status(response, path).await?;
        Ok(())
    }

    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder, path: &str) -> Result<T> {
        let response = request.send().await?;
        let response = check_status(response, path).await?;
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

async fn check_status(response: Response, path: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    debug!(status = %status, path, "Flora request failed");
    Err(ApiError::from_response(status, strip_query(path), &body))
}

fn strip_query(path: &str) -> &str {
    path.split('?').next().unwrap_or(path)
}

fn normalize_page<T>(page: &mut Page<T>, requested_page: u32, limit: u32) {
    if page.page == 0 {
        page.page = requested_page;
    }
    if page.limit == 0 {
        page.limit = limit;
    }
}

fn clean_names(names: &[String]) -> Vec<String> {
    names
        .iter()
        .map(|n| n.trim())
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .collect()
}

/// Update bodies carry the id alongside the fields
fn with_id<T: Serialize>(id: u64, body: &T) -> Result<serde_json::Value> {
    let mut value = serde_json::to_value(body)?;
    if let serde_json::Value::Object(map) = &mut value {
        map.insert("id".to_string(), json!(id));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeBackend;
    use crate::pagination::Pagination;

    async fn client_for(backend: &FakeBackend) -> FloraClient {
        FloraClient::new(backend.base_url(), ClientOptions::default()).unwrap()
    }

    #[test]
    fn test_family_contract_parse() {
        assert_eq!(
            "server".parse::<FamilyListContract>(),
            Ok(FamilyListContract::ServerPaginated)
        );
        assert_eq!(
            "Client".parse::<FamilyListContract>(),
            Ok(FamilyListContract::ClientFabricated)
        );
        assert!("both".parse::<FamilyListContract>().is_err());
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let url = Url::parse("http://localhost:3000/api/").unwrap();
        let client = FloraClient::new(url, ClientOptions::default()).unwrap();
        assert_eq!(client.base_url(), "http://localhost:3000/api");
    }

    #[test]
    fn test_clean_names_drops_blanks() {
        let names = vec![" Dog rose ".to_string(), "".to_string(), "  ".to_string()];
        assert_eq!(clean_names(&names), vec!["Dog rose".to_string()]);
    }

    #[test]
    fn test_with_id_merges() {
        let body = NewFamily {
            name: "Rosaceae".into(),
            description: None,
        };
        let value = with_id(4, &body).unwrap();
        assert_eq!(value["id"], 4);
        assert_eq!(value["nombre"], "Rosaceae");
    }

    #[tokio::test]
    async fn test_identify_image_multipart() {
        let backend = FakeBackend::spawn().await;
        let client = client_for(&backend).await;

        let ident = client
            .identify_image(ImageUpload::new("leaf.jpg", "image/jpeg", vec![1, 2, 3]))
            .await
            .unwrap();

        assert_eq!(ident.id, 42);
        let api = ident.api_response.unwrap();
        assert_eq!(api.access_token.as_deref(), Some("abc123"));
        assert_eq!(backend.hits("POST /identificaciones"), 1);
    }

    #[tokio::test]
    async fn test_identify_rejects_non_image_server_side() {
        let backend = FakeBackend::spawn().await;
        let client = client_for(&backend).await;

        let err = client
            .identify_image(ImageUpload::new("notes.txt", "text/plain", b"hi".to_vec()))
            .await
            .unwrap_err();

        match err {
            ApiError::Validation { status, message } => {
                assert_eq!(status, Some(reqwest::StatusCode::UNPROCESSABLE_ENTITY));
                assert_eq!(message, "file must be an image");
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_identify_rejects_empty_file_without_request() {
        let backend = FakeBackend::spawn().await;
        let client = client_for(&backend).await;

        let err = client
            .identify_image(ImageUpload::new("leaf.jpg", "image/jpeg", vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation { status: None, .. }));
        assert_eq!(backend.hits("POST /identificaciones"), 0);
    }

    #[tokio::test]
    async fn test_list_plants_does_not_send_query() {
        let backend = FakeBackend::spawn().await;
        let client = client_for(&backend).await;

        let page = client
            .list_plants(&PlantListParams {
                page: 1,
                status: Some(PlantStatus::Active),
                query: Some("rosa".into()),
            })
            .await
            .unwrap();

        assert_eq!(page.limit, FloraClient::PLANT_PAGE_SIZE);
        assert_eq!(page.page, 1);
        assert!(page.items.iter().all(|p| p.status == PlantStatus::Active));
        assert_eq!(backend.last_query("GET /plantas").as_deref(), Some("q=&page=1&estado=ACTIVA"));
    }

    #[tokio::test]
    async fn test_get_plant_not_found() {
        let backend = FakeBackend::spawn().await;
        let client = client_for(&backend).await;

        let err = client.get_plant(999).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound { ref path } if path == "/plantas/999"));
    }

    #[tokio::test]
    async fn test_create_and_update_plant() {
        let backend = FakeBackend::spawn().await;
        let client = client_for(&backend).await;

        let created = client
            .create_plant(NewPlant {
                scientific_name: " Quercus robur ".into(),
                common_names: vec!["English oak".into(), " ".into()],
                taxonomy_id: 2,
                family_id: Some(2),
                image: Some(ImageUpload::new("oak.png", "image/png", vec![9, 9])),
            })
            .await
            .unwrap();
        assert_eq!(created.scientific_name, "Quercus robur");
        assert_eq!(created.common_names, vec!["English oak".to_string()]);
        assert_eq!(created.images.len(), 1);

        let updated = client
            .update_plant(
                created.id,
                &PlantUpdate {
                    scientific_name: "Quercus petraea".into(),
                    common_names: vec!["Sessile oak".into()],
                    taxonomy_id: 2,
                    family_id: Some(2),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.scientific_name, "Quercus petraea");
        assert_eq!(updated.images, created.images);
    }

    #[tokio::test]
    async fn test_set_plant_status() {
        let backend = FakeBackend::spawn().await;
        let client = client_for(&backend).await;

        client.set_plant_status(1, PlantStatus::Inactive).await.unwrap();
        let plant = client.get_plant(1).await.unwrap();
        assert_eq!(plant.status, PlantStatus::Inactive);
    }

    #[tokio::test]
    async fn test_list_families_server_paginated() {
        let backend = FakeBackend::spawn().await;
        let client = client_for(&backend).await;

        let page = client
            .list_families(&FamilyListParams {
                query: "rosa".into(),
                page: 1,
            })
            .await
            .unwrap();

        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].name, "Rosaceae");
        assert_eq!(page.total, 1);
        assert_eq!(page.page, 1);
    }

    #[tokio::test]
    async fn test_family_last_page_without_limit() {
        let backend = FakeBackend::spawn().await;
        backend.omit_family_limit();
        let client = client_for(&backend).await;
        for n in 0..24 {
            client
                .create_family(&NewFamily {
                    name: format!("Family {}", n),
                    description: None,
                })
                .await
                .unwrap();
        }

        let last = client
            .list_families(&FamilyListParams {
                query: String::new(),
                page: 2,
            })
            .await
            .unwrap();
        assert_eq!(last.items.len(), 2);
        assert_eq!(last.total, 27);
        assert_eq!(last.limit, FloraClient::FAMILY_PAGE_SIZE);

        let pagination = Pagination::new(last.page, last.total, last.limit);
        assert_eq!(pagination.page_count(), 2);
        assert_eq!(pagination.change_page(5), None);
        assert_eq!(pagination.prev(), Some(1));
    }

    #[tokio::test]
    async fn test_list_families_client_fabricated() {
        let backend = FakeBackend::spawn().await;
        backend.set_families_as_array(true);
        let client = FloraClient::new(
            backend.base_url(),
            ClientOptions {
                timeout: None,
                family_list_contract: FamilyListContract::ClientFabricated,
            },
        )
        .unwrap();

        let page = client
            .list_families(&FamilyListParams {
                query: String::new(),
                page: 1,
            })
            .await
            .unwrap();

        assert_eq!(page.items.len(), 3);
        assert_eq!(page.total, page.items.len() as u64);
        assert_eq!(page.limit, 3);
    }

    #[tokio::test]
    async fn test_contract_mismatch_is_decode_error() {
        let backend = FakeBackend::spawn().await;
        backend.set_families_as_array(true);
        let client = client_for(&backend).await;

        let err = client
            .list_families(&FamilyListParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
    }

    #[tokio::test]
    async fn test_list_taxonomies_scoped() {
        let backend = FakeBackend::spawn().await;
        let client = client_for(&backend).await;

        let all = client.list_taxonomies(None).await.unwrap();
        let scoped = client.list_taxonomies(Some(1)).await.unwrap();
        assert!(all.len() > scoped.len());
        assert!(scoped.iter().all(|t| t.family_id == 1));
    }

    #[tokio::test]
    async fn test_start_conversation_requires_both_fields() {
        let backend = FakeBackend::spawn().await;
        let client = client_for(&backend).await;

        let err = client
            .start_conversation(&StartConversation {
                identification_id: "42".into(),
                secret: "  ".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation { .. }));
        assert_eq!(backend.hits("POST /chat/conversaciones"), 0);
    }

    #[tokio::test]
    async fn test_start_conversation_bad_secret() {
        let backend = FakeBackend::spawn().await;
        let client = client_for(&backend).await;

        let err = client
            .start_conversation(&StartConversation {
                identification_id: "42".into(),
                secret: "expired".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Auth { .. }));
        assert_eq!(err.user_message(), "invalid or expired secret");
    }

    #[tokio::test]
    async fn test_chat_round_trip() {
        let backend = FakeBackend::spawn().await;
        let client = client_for(&backend).await;

        let conversation = client
            .start_conversation(&StartConversation {
                identification_id: "42".into(),
                secret: "abc123".into(),
            })
            .await
            .unwrap();
        assert!(conversation.messages.is_empty());

        let exchange = client
            .send_message(conversation.id, "  Is it edible?  ")
            .await
            .unwrap();
        assert_eq!(exchange.user_message.content, "Is it edible?");
        assert_eq!(exchange.bot_message.role, Role::Bot);

        let fetched = client.get_conversation(conversation.id).await.unwrap();
        assert_eq!(fetched.messages.len(), 2);

        let history = client
            .get_history(&HistoryParams::first_page(conversation.id))
            .await
            .unwrap();
        assert_eq!(history.total, 2);
        assert_eq!(history.limit, HistoryParams::DEFAULT_LIMIT);
    }

    #[tokio::test]
    async fn test_send_empty_message_rejected() {
        let backend = FakeBackend::spawn().await;
        let client = client_for(&backend).await;

        let err = client.send_message(1, "   ").await.unwrap_err();
        assert!(matches!(err, ApiError::Validation { status: None, .. }));
    }

    #[tokio::test]
    async fn test_get_usage() {
        let backend = FakeBackend::spawn().await;
        let client = client_for(&backend).await;

        let usage = client.get_usage().await.unwrap();
        assert!(usage.active);
        assert_eq!(usage.credit_limits.total, 100.0);
        assert_eq!(usage.remaining.total, 58.0);
    }

    #[tokio::test]
    async fn test_network_error() {
        // Port 9 (discard) on localhost is not listening in test environments
        let url = Url::parse("http://127.0.0.1:9").unwrap();
        let client = FloraClient::new(
            url,
            ClientOptions {
                timeout: Some(Duration::from_secs(2)),
                ..Default::default()
            },
        )
        .unwrap();

        let err = client.get_usage().await.unwrap_err();
        assert!(matches!(err, ApiError::Network(_)));
    }
}
