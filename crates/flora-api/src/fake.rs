//! In-process fake of the Flora backend for tests
//!
//! Serves the same routes as the real backend from in-memory fixtures and
//! records how many times each `METHOD /path` was hit, so callers can assert
//! on cache hits and refetches. Individual routes can be told to fail.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};

use axum::extract::{Multipart, Path, Query, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use url::Url;

use crate::client::FloraClient;
use crate::types::*;

type Shared = Arc<FakeState>;

pub struct FakeBackend {
    addr: SocketAddr,
    state: Shared,
}

impl FakeBackend {
    /// Bind to an ephemeral localhost port and serve in the background
    pub async fn spawn() -> Self {
        let state = Arc::new(FakeState::new());
        let router = router(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake backend");
        let addr = listener.local_addr().expect("fake backend address");
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        Self { addr, state }
    }

    pub fn base_url(&self) -> Url {
        Url::parse(&format!("http://{}", self.addr)).expect("fake backend url")
    }

    /// Number of requests seen for `"METHOD /path"`, e.g. `"GET /plantas"`
    pub fn hits(&self, route: &str) -> usize {
        lock(&self.state.hits).get(route).copied().unwrap_or(0)
    }

    /// Raw query string of the latest request to `route`
    pub fn last_query(&self, route: &str) -> Option<String> {
        lock(&self.state.queries).get(route).cloned()
    }

    /// Make the next `times` requests to `route` fail with `status`
    pub fn fail_route(&self, route: &str, status: StatusCode, times: usize) {
        lock(&self.state.failures).insert(route.to_string(), (status, times));
    }

    /// Serve `/familias` as a bare array instead of a page envelope
    pub fn set_families_as_array(&self, as_array: bool) {
        lock(&self.state.data).families_as_array = as_array;
    }

    /// Replace the identification returned by `POST /identificaciones`
    pub fn set_identification(&self, identification: Value) {
        lock(&self.state.data).identification = identification;
    }

    /// Leave `limit` out of `/familias` page envelopes
    pub fn omit_family_limit(&self) {
        lock(&self.state.data).family_limit_in_body = false;
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct FakeState {
    data: Mutex<FakeData>,
    hits: Mutex<HashMap<String, usize>>,
    queries: Mutex<HashMap<String, String>>,
    failures: Mutex<HashMap<String, (StatusCode, usize)>>,
}

impl FakeState {
    fn new() -> Self {
        Self {
            data: Mutex::new(FakeData::seeded()),
            hits: Mutex::new(HashMap::new()),
            queries: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
        }
    }

    fn injected_failure(&self, route: &str) -> Option<StatusCode> {
        let mut failures = lock(&self.failures);
        let (status, remaining) = failures.get_mut(route)?;
        if *remaining == 0 {
            return None;
        }
        *remaining -= 1;
        Some(*status)
    }
}

struct FakeData {
    families: Vec<Family>,
    taxonomies: Vec<Taxonomy>,
    plants: Vec<Plant>,
    conversations: Vec<Conversation>,
    identification: Value,
    families_as_array: bool,
    family_limit_in_body: bool,
    next_id: u64,
}

fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0)
        .single()
        .unwrap_or_default()
}

fn family(id: u64, name: &str) -> Family {
    Family {
        id,
        name: name.to_string(),
        description: None,
        active: true,
        created_at: epoch(),
        updated_at: epoch(),
    }
}

fn taxonomy(id: u64, family_id: u64, genus: &str, species: &str) -> Taxonomy {
    Taxonomy {
        id,
        kingdom: Some("Plantae".to_string()),
        phylum: None,
        class: None,
        order: None,
        genus: Some(genus.to_string()),
        species: Some(species.to_string()),
        rank: Some("species".to_string()),
        family_id,
    }
}

fn plant(id: u64, name: &str, common: &[&str], status: PlantStatus, taxonomy_id: u64, family_id: u64) -> Plant {
    Plant {
        id,
        scientific_name: name.to_string(),
        common_names: common.iter().map(|s| s.to_string()).collect(),
        status,
        taxonomy_id,
        family_id: Some(family_id),
        created_at: epoch(),
        updated_at: epoch(),
        images: vec![],
        taxonomy: None,
    }
}

impl FakeData {
    fn seeded() -> Self {
        Self {
            families: vec![
                family(1, "Rosaceae"),
                family(2, "Fagaceae"),
                family(3, "Asteraceae"),
            ],
            taxonomies: vec![
                taxonomy(1, 1, "Rosa", "canina"),
                taxonomy(2, 2, "Quercus", "robur"),
                taxonomy(3, 1, "Malus", "domestica"),
            ],
            plants: vec![
                plant(1, "Rosa canina", &["Dog rose", "Escaramujo"], PlantStatus::Active, 1, 1),
                plant(2, "Quercus robur", &["English oak"], PlantStatus::Active, 2, 2),
                plant(3, "Malus domestica", &["Apple", "Manzano"], PlantStatus::Inactive, 3, 1),
            ],
            conversations: vec![],
            identification: default_identification(),
            families_as_array: false,
            family_limit_in_body: true,
            next_id: 100,
        }
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

fn default_identification() -> Value {
    json!({
        "id": 42,
        "confianza": 0.9135,
        "creadaEn": "2024-05-01T10:00:00Z",
        "respuestaApi": {
            "id": "pid-42",
            "images": [{ "url": "https://plant.id/media/42.jpg", "file_name": "42.jpg" }],
            "is_plant": true,
            "access_token": "abc123",
            "suggestions": [
                {
                    "id": 1,
                    "confirmed": false,
                    "plant_name": "Rosa canina",
                    "probability": 0.9135,
                    "plant_details": {
                        "common_names": ["Dog rose"],
                        "taxonomy": { "family": "Rosaceae", "genus": "Rosa", "species": "Rosa canina" }
                    }
                },
                { "id": 2, "confirmed": false, "plant_name": "Rosa rubiginosa", "probability": 0.0412 }
            ]
        }
    })
}

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn router(state: Shared) -> Router {
    Router::new()
        .route("/identificaciones", post(identify).get(list_identifications))
        .route("/identificaciones/{id}", get(get_identification))
        .route("/plantas", get(list_plants).post(create_plant))
        .route("/plantas/{id}", get(get_plant).put(update_plant))
        .route("/plantas/{id}/estado", patch(set_plant_status))
        .route("/familias", get(list_families).post(create_family))
        .route("/familias/{id}", axum::routing::put(update_family))
        .route("/familias/{id}/estado", patch(set_family_status))
        .route("/taxonomias", get(list_taxonomies).post(create_taxonomy))
        .route("/taxonomias/{id}", axum::routing::put(update_taxonomy))
        .route("/chat/conversaciones", post(start_conversation))
        .route("/chat/conversaciones/{id}", get(get_conversation))
        .route("/chat/conversaciones/{id}/mensajes", post(send_message))
        .route("/chat/conversaciones/{id}/historial", get(get_history))
        .route("/uso", get(usage))
        .layer(middleware::from_fn_with_state(state.clone(), record))
        .with_state(state)
}

async fn record(State(state): State<Shared>, req: Request, next: Next) -> Response {
    let route = format!("{} {}", req.method(), req.uri().path());
    *lock(&state.hits).entry(route.clone()).or_insert(0) += 1;
    if let Some(query) = req.uri().query() {
        lock(&state.queries).insert(route.clone(), query.to_string());
    }

    if let Some(status) = state.injected_failure(&route) {
        return error(status, "injected failure");
    }
    next.run(req).await
}

// -- Identifications -------------------------------------------------------

async fn identify(State(state): State<Shared>, mut multipart: Multipart) -> Response {
    let mut saw_image = false;
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() != Some("image") {
            continue;
        }
        let is_image = field
            .content_type()
            .map(|ct| ct.starts_with("image/"))
            .unwrap_or(false);
        if !is_image {
            return error(StatusCode::UNPROCESSABLE_ENTITY, "file must be an image");
        }
        saw_image = true;
    }

    if !saw_image {
        return error(StatusCode::BAD_REQUEST, "image field is required");
    }
    Json(lock(&state.data).identification.clone()).into_response()
}

#[derive(Deserialize)]
struct PageQuery {
    page: Option<u32>,
    limit: Option<u32>,
}

async fn list_identifications(State(state): State<Shared>, Query(_q): Query<PageQuery>) -> Response {
    let data = lock(&state.data);
    let id = data.identification["id"].as_u64().unwrap_or(0);
    let confidence = data.identification["confianza"].as_f64().unwrap_or(0.0);
    Json(json!({ "items": [{ "id": id, "confianza": confidence }], "total": 1 })).into_response()
}

async fn get_identification(State(state): State<Shared>, Path(id): Path<u64>) -> Response {
    let data = lock(&state.data);
    if data.identification["id"].as_u64() == Some(id) {
        Json(data.identification.clone()).into_response()
    } else {
        error(StatusCode::NOT_FOUND, "identification not found")
    }
}

// -- Plants ----------------------------------------------------------------

const PLANT_PAGE_SIZE: usize = 25;

#[derive(Deserialize)]
struct PlantQuery {
    page: Option<u32>,
    estado: Option<PlantStatus>,
}

async fn list_plants(State(state): State<Shared>, Query(q): Query<PlantQuery>) -> Response {
    let data = lock(&state.data);
    let matching: Vec<&Plant> = data
        .plants
        .iter()
        .filter(|p| q.estado.map(|s| s == p.status).unwrap_or(true))
        .collect();
    let page = q.page.unwrap_or(1).max(1) as usize;
    let items: Vec<&Plant> = matching
        .iter()
        .skip((page - 1) * PLANT_PAGE_SIZE)
        .take(PLANT_PAGE_SIZE)
        .copied()
        .collect();
    Json(json!({ "items": items, "total": matching.len() })).into_response()
}

async fn get_plant(State(state): State<Shared>, Path(id): Path<u64>) -> Response {
    match lock(&state.data).plants.iter().find(|p| p.id == id) {
        Some(p) => Json(p).into_response(),
        None => error(StatusCode::NOT_FOUND, "plant not found"),
    }
}

async fn create_plant(State(state): State<Shared>, mut multipart: Multipart) -> Response {
    let mut fields: HashMap<String, String> = HashMap::new();
    let mut image: Option<String> = None;
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or_default().to_string();
        if name == "imagen" {
            image = field.file_name().map(|f| format!("/uploads/{}", f));
            continue;
        }
        if let Ok(text) = field.text().await {
            fields.insert(name, text);
        }
    }

    let Some(name) = fields.get("nombreCientifico").filter(|n| !n.is_empty()) else {
        return error(StatusCode::BAD_REQUEST, "nombreCientifico is required");
    };
    let common: Vec<String> = fields
        .get("nombresComunes")
        .and_then(|s| serde_json::from_str(s).ok())
        .unwrap_or_default();
    let Some(taxonomy_id) = fields.get("taxonomiaId").and_then(|s| s.parse().ok()) else {
        return error(StatusCode::BAD_REQUEST, "taxonomiaId is required");
    };

    let mut data = lock(&state.data);
    let id = data.next_id();
    let created = Plant {
        id,
        scientific_name: name.clone(),
        common_names: common,
        status: PlantStatus::Active,
        taxonomy_id,
        family_id: fields.get("familiaId").and_then(|s| s.parse().ok()),
        created_at: epoch(),
        updated_at: epoch(),
        images: image.into_iter().collect(),
        taxonomy: None,
    };
    data.plants.push(created.clone());
    (StatusCode::CREATED, Json(created)).into_response()
}

async fn update_plant(
    State(state): State<Shared>,
    Path(id): Path<u64>,
    Json(update): Json<PlantUpdate>,
) -> Response {
    let mut data = lock(&state.data);
    let Some(plant) = data.plants.iter_mut().find(|p| p.id == id) else {
        return error(StatusCode::NOT_FOUND, "plant not found");
    };
    plant.scientific_name = update.scientific_name;
    plant.common_names = update.common_names;
    plant.taxonomy_id = update.taxonomy_id;
    plant.family_id = update.family_id;
    plant.updated_at = epoch() + Duration::hours(1);
    Json(plant.clone()).into_response()
}

#[derive(Deserialize)]
struct PlantStatusBody {
    estado: PlantStatus,
}

async fn set_plant_status(
    State(state): State<Shared>,
    Path(id): Path<u64>,
    Json(body): Json<PlantStatusBody>,
) -> Response {
    let mut data = lock(&state.data);
    match data.plants.iter_mut().find(|p| p.id == id) {
        Some(p) => {
            p.status = body.estado;
            StatusCode::NO_CONTENT.into_response()
        }
        None => error(StatusCode::NOT_FOUND, "plant not found"),
    }
}

// -- Families --------------------------------------------------------------

#[derive(Deserialize)]
struct FamilyQuery {
    q: Option<String>,
    page: Option<u32>,
}

async fn list_families(State(state): State<Shared>, Query(q): Query<FamilyQuery>) -> Response {
    let data = lock(&state.data);
    let needle = q.q.unwrap_or_default().to_lowercase();
    let items: Vec<&Family> = data
        .families
        .iter()
        .filter(|f| needle.is_empty() || f.name.to_lowercase().contains(&needle))
        .collect();

    if data.families_as_array {
        return Json(items).into_response();
    }

    let page = q.page.unwrap_or(1).max(1);
    let limit = FloraClient::FAMILY_PAGE_SIZE;
    let total = items.len();
    let items: Vec<&Family> = items
        .into_iter()
        .skip((page as usize - 1) * limit as usize)
        .take(limit as usize)
        .collect();
    let mut body = json!({ "items": items, "total": total, "page": page });
    if data.family_limit_in_body {
        body["limit"] = json!(limit);
    }
    Json(body).into_response()
}

async fn create_family(State(state): State<Shared>, Json(body): Json<NewFamily>) -> Response {
    if body.name.trim().is_empty() {
        return error(StatusCode::BAD_REQUEST, "nombre is required");
    }
    let mut data = lock(&state.data);
    let id = data.next_id();
    let mut created = family(id, &body.name);
    created.description = body.description;
    data.families.push(created.clone());
    (StatusCode::CREATED, Json(created)).into_response()
}

async fn update_family(
    State(state): State<Shared>,
    Path(id): Path<u64>,
    Json(body): Json<NewFamily>,
) -> Response {
    let mut data = lock(&state.data);
    match data.families.iter_mut().find(|f| f.id == id) {
        Some(f) => {
            f.name = body.name;
            f.description = body.description;
            Json(f.clone()).into_response()
        }
        None => error(StatusCode::NOT_FOUND, "family not found"),
    }
}

#[derive(Deserialize)]
struct FamilyStatusBody {
    estado: bool,
}

async fn set_family_status(
    State(state): State<Shared>,
    Path(id): Path<u64>,
    Json(body): Json<FamilyStatusBody>,
) -> Response {
    let mut data = lock(&state.data);
    match data.families.iter_mut().find(|f| f.id == id) {
        Some(f) => {
            f.active = body.estado;
            StatusCode::NO_CONTENT.into_response()
        }
        None => error(StatusCode::NOT_FOUND, "family not found"),
    }
}

// -- Taxonomies ------------------------------------------------------------

#[derive(Deserialize)]
struct TaxonomyQuery {
    #[serde(rename = "familiaId")]
    family_id: Option<u64>,
}

async fn list_taxonomies(State(state): State<Shared>, Query(q): Query<TaxonomyQuery>) -> Response {
    let data = lock(&state.data);
    let items: Vec<&Taxonomy> = data
        .taxonomies
        .iter()
        .filter(|t| q.family_id.map(|f| f == t.family_id).unwrap_or(true))
        .collect();
    Json(items).into_response()
}

async fn create_taxonomy(State(state): State<Shared>, Json(body): Json<NewTaxonomy>) -> Response {
    let mut data = lock(&state.data);
    if !data.families.iter().any(|f| f.id == body.family_id) {
        return error(StatusCode::BAD_REQUEST, "familiaId does not exist");
    }
    let id = data.next_id();
    let created = Taxonomy {
        id,
        kingdom: body.kingdom,
        phylum: body.phylum,
        class: body.class,
        order: body.order,
        genus: body.genus,
        species: body.species,
        rank: body.rank,
        family_id: body.family_id,
    };
    data.taxonomies.push(created.clone());
    (StatusCode::CREATED, Json(created)).into_response()
}

async fn update_taxonomy(
    State(state): State<Shared>,
    Path(id): Path<u64>,
    Json(body): Json<NewTaxonomy>,
) -> Response {
    let mut data = lock(&state.data);
    match data.taxonomies.iter_mut().find(|t| t.id == id) {
        Some(t) => {
            t.kingdom = body.kingdom;
            t.phylum = body.phylum;
            t.class = body.class;
            t.order = body.order;
            t.genus = body.genus;
            t.species = body.species;
            t.rank = body.rank;
            t.family_id = body.family_id;
            Json(t.clone()).into_response()
        }
        None => error(StatusCode::NOT_FOUND, "taxonomy not found"),
    }
}

// -- Chat ------------------------------------------------------------------

async fn start_conversation(
    State(state): State<Shared>,
    Json(body): Json<StartConversation>,
) -> Response {
    if body.secret == "expired" {
        return error(StatusCode::UNAUTHORIZED, "invalid or expired secret");
    }
    let mut data = lock(&state.data);
    let id = data.next_id();
    let conversation = Conversation {
        id,
        identification_id: body.identification_id,
        secret: body.secret,
        created_at: epoch(),
        credits_used: 0.0,
        messages: vec![],
    };
    data.conversations.push(conversation.clone());
    (StatusCode::CREATED, Json(conversation)).into_response()
}

#[derive(Deserialize)]
struct SendBody {
    content: String,
}

async fn send_message(
    State(state): State<Shared>,
    Path(id): Path<u64>,
    Json(body): Json<SendBody>,
) -> Response {
    if body.content.trim().is_empty() {
        return error(StatusCode::BAD_REQUEST, "content must not be empty");
    }
    let mut data = lock(&state.data);
    let user_id = data.next_id();
    let bot_id = data.next_id();
    let Some(conversation) = data.conversations.iter_mut().find(|c| c.id == id) else {
        return error(StatusCode::NOT_FOUND, "conversation not found");
    };

    let message = |id: u64, role: Role, content: String| Message {
        id,
        conversation_id: conversation.id,
        role,
        content,
        created_at: epoch() + Duration::seconds(id as i64),
    };
    let user_message = message(user_id, Role::User, body.content.clone());
    let bot_message = message(bot_id, Role::Bot, format!("You asked: {}", body.content));
    conversation.messages.push(user_message.clone());
    conversation.messages.push(bot_message.clone());
    conversation.credits_used += 0.5;

    Json(MessageExchange {
        user_message,
        bot_message,
    })
    .into_response()
}

async fn get_conversation(State(state): State<Shared>, Path(id): Path<u64>) -> Response {
    match lock(&state.data).conversations.iter().find(|c| c.id == id) {
        Some(c) => Json(c).into_response(),
        None => error(StatusCode::NOT_FOUND, "conversation not found"),
    }
}

async fn get_history(
    State(state): State<Shared>,
    Path(id): Path<u64>,
    Query(q): Query<PageQuery>,
) -> Response {
    let data = lock(&state.data);
    let Some(conversation) = data.conversations.iter().find(|c| c.id == id) else {
        return error(StatusCode::NOT_FOUND, "conversation not found");
    };
    let page = q.page.unwrap_or(1).max(1) as usize;
    let limit = q.limit.unwrap_or(25).max(1) as usize;
    let items: Vec<&Message> = conversation
        .messages
        .iter()
        .skip((page - 1) * limit)
        .take(limit)
        .collect();
    Json(json!({ "items": items, "total": conversation.messages.len() })).into_response()
}

// -- Usage -----------------------------------------------------------------

async fn usage() -> Response {
    Json(json!({
        "active": true,
        "credit_limits": { "day": null, "week": null, "month": 100, "total": 100 },
        "used": { "day": 2, "week": 10, "month": 42, "total": 42 },
        "can_use_credits": { "value": true, "reason": null },
        "remaining": { "day": null, "week": null, "month": 58, "total": 58 }
    }))
    .into_response()
}
