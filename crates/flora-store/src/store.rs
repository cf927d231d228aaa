//! Cached reads and invalidating mutations over `FloraClient`

use crate::filter::PlantQuery;
use crate::tags::{CacheTag, TagKind};
use crate::types::*;
use flora_api::{
    Conversation, Family, FamilyListParams, FloraClient, HistoryParams, Identification,
    IdentificationSummary, ImageUpload, Message, MessageExchange, NewFamily, NewPlant,
    NewTaxonomy, Page, Plant, PlantListParams, PlantStatus, PlantUpdate, Result,
    StartConversation, Taxonomy, UsageSnapshot,
};
use moka::future::Cache;
use moka::Expiry;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Freshness {
    Fresh,
    Stale,
    Failed(String),
}

struct CacheEntry {
    value: CachedValue,
    tags: Vec<CacheTag>,
    ttl: Option<Duration>,
    freshness: Mutex<Freshness>,
}

impl CacheEntry {
    fn freshness(&self) -> Freshness {
        self.freshness
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn set_freshness(&self, freshness: Freshness) {
        *self
            .freshness
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = freshness;
    }

    fn is_fresh(&self) -> bool {
        self.freshness() == Freshness::Fresh
    }
}

/// Entries carry their own lifetime; `None` means no expiry.
struct EntryExpiry;

impl Expiry<QueryKey, Arc<CacheEntry>> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &QueryKey,
        value: &Arc<CacheEntry>,
        _created_at: Instant,
    ) -> Option<Duration> {
        value.ttl
    }

    fn expire_after_update(
        &self,
        _key: &QueryKey,
        value: &Arc<CacheEntry>,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        value.ttl
    }
}

/// Shared query cache. Construct once and pass by reference (or `Arc`).
pub struct FloraStore {
    client: FloraClient,
    cache: Cache<QueryKey, Arc<CacheEntry>>,
    usage_ttl: Duration,
    /// Bumped on every invalidation so in-flight fetches can detect it
    generation: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl FloraStore {
    pub fn new(client: FloraClient, options: StoreOptions) -> Self {
        let cache = Cache::builder()
            .max_capacity(options.max_capacity)
            .expire_after(EntryExpiry)
            .build();

        Self {
            client,
            cache,
            usage_ttl: options.usage_ttl,
            generation: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.run_pending_tasks().await;
        CacheStats {
            entries: self.cache.entry_count(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    // -- Identifications ---------------------------------------------------

    pub async fn identifications(
        &self,
        page: u32,
        limit: u32,
    ) -> Result<Page<IdentificationSummary>> {
        let key = QueryKey::Identifications { page, limit };
        self.cached(key, self.client.list_identifications(page, limit))
            .await
    }

    pub async fn identification(&self, id: u64) -> Result<Identification> {
        self.cached(
            QueryKey::Identification(id),
            self.client.get_identification(id),
        )
        .await
    }

    /// Upload an image for identification.
    ///
    /// The backend may create catalog rows while enriching the result, so
    /// every catalog list is invalidated along with the identifications.
    pub async fn identify(&self, image: ImageUpload) -> Result<Identification> {
        let identification = self.client.identify_image(image).await?;
        self.invalidate(&[
            CacheTag::all(TagKind::Identification),
            CacheTag::all(TagKind::Plant),
            CacheTag::all(TagKind::Family),
            CacheTag::all(TagKind::Taxonomy),
        ]);
        Ok(identification)
    }

    // -- Plants ------------------------------------------------------------

    pub async fn plants(&self, page: u32, status: Option<PlantStatus>) -> Result<Page<Plant>> {
        let page = page.max(1);
        let params = PlantListParams {
            page,
            status,
            query: None,
        };
        self.cached(
            QueryKey::Plants { page, status },
            self.client.list_plants(&params),
        )
        .await
    }

    /// Cached page for `(page, status)` filtered by the free-text query
    pub async fn search_plants(&self, params: &PlantListParams) -> Result<Page<Plant>> {
        let page = self.plants(params.page, params.status).await?;
        let query = PlantQuery::new(params.query.as_deref().unwrap_or_default());
        Ok(query.apply(page))
    }

    pub async fn plant(&self, id: u64) -> Result<Plant> {
        self.cached(QueryKey::Plant(id), self.client.get_plant(id))
            .await
    }

    /// Plant detail for an edit form; skipped until an id is selected
    pub async fn plant_for_edit(&self, id: Option<u64>) -> Result<Fetch<Plant>> {
        match id {
            Some(id) => self.plant(id).await.map(Fetch::Ready),
            None => Ok(Fetch::Skipped),
        }
    }

    pub async fn create_plant(&self, plant: NewPlant) -> Result<Plant> {
        let created = self.client.create_plant(plant).await?;
        self.invalidate(&[CacheTag::all(TagKind::Plant)]);
        Ok(created)
    }

    pub async fn update_plant(&self, id: u64, update: &PlantUpdate) -> Result<Plant> {
        let updated = self.client.update_plant(id, update).await?;
        self.invalidate(&[
            CacheTag::id(TagKind::Plant, id),
            CacheTag::list(TagKind::Plant),
        ]);
        Ok(updated)
    }

    pub async fn set_plant_status(&self, id: u64, status: PlantStatus) -> Result<()> {
        self.client.set_plant_status(id, status).await?;
        self.invalidate(&[CacheTag::all(TagKind::Plant)]);
        Ok(())
    }

    // -- Families ----------------------------------------------------------

    pub async fn families(&self, params: &FamilyListParams) -> Result<Page<Family>> {
        let params = params.normalized();
        let key = QueryKey::Families {
            query: params.query.clone(),
            page: params.page,
        };
        self.cached(key, self.client.list_families(&params)).await
    }

    pub async fn create_family(&self, family: &NewFamily) -> Result<Family> {
        let created = self.client.create_family(family).await?;
        self.invalidate(&[CacheTag::all(TagKind::Family)]);
        Ok(created)
    }

    pub async fn update_family(&self, id: u64, family: &NewFamily) -> Result<Family> {
        let updated = self.client.update_family(id, family).await?;
        self.invalidate(&[CacheTag::all(TagKind::Family)]);
        Ok(updated)
    }

    pub async fn set_family_status(&self, id: u64, active: bool) -> Result<()> {
        self.client.set_family_status(id, active).await?;
        self.invalidate(&[CacheTag::all(TagKind::Family)]);
        Ok(())
    }

    // -- Taxonomies --------------------------------------------------------

    /// All taxonomies, or only those of one family
    pub async fn taxonomies(&self, family_id: Option<u64>) -> Result<Vec<Taxonomy>> {
        self.cached(
            QueryKey::Taxonomies { family_id },
            self.client.list_taxonomies(family_id),
        )
        .await
    }

    /// Taxonomy picker scoped to a family; skipped until a family is chosen
    pub async fn taxonomies_for_family(
        &self,
        family_id: Option<u64>,
    ) -> Result<Fetch<Vec<Taxonomy>>> {
        match family_id {
            Some(id) => self.taxonomies(Some(id)).await.map(Fetch::Ready),
            None => Ok(Fetch::Skipped),
        }
    }

    pub async fn create_taxonomy(&self, taxonomy: &NewTaxonomy) -> Result<Taxonomy> {
        let created = self.client.create_taxonomy(taxonomy).await?;
        self.invalidate(&[CacheTag::all(TagKind::Taxonomy)]);
        Ok(created)
    }

    pub async fn update_taxonomy(&self, id: u64, taxonomy: &NewTaxonomy) -> Result<Taxonomy> {
        let updated = self.client.update_taxonomy(id, taxonomy).await?;
        self.invalidate(&[CacheTag::all(TagKind::Taxonomy)]);
        Ok(updated)
    }

    // -- Chat --------------------------------------------------------------

    pub async fn start_conversation(&self, request: &StartConversation) -> Result<Conversation> {
        let conversation = self.client.start_conversation(request).await?;
        self.invalidate(&[CacheTag::all(TagKind::Conversation)]);
        Ok(conversation)
    }

    pub async fn send_message(&self, conversation_id: u64, content: &str) -> Result<MessageExchange> {
        let exchange = self.client.send_message(conversation_id, content).await?;
        self.invalidate(&[
            CacheTag::id(TagKind::Conversation, conversation_id),
            CacheTag::all(TagKind::Message),
        ]);
        Ok(exchange)
    }

    pub async fn conversation(&self, id: u64) -> Result<Conversation> {
        self.cached(QueryKey::Conversation(id), self.client.get_conversation(id))
            .await
    }

    pub async fn history(&self, params: &HistoryParams) -> Result<Page<Message>> {
        let params = params.normalized();
        let key = QueryKey::History {
            conversation_id: params.conversation_id,
            page: params.page,
            limit: params.limit,
        };
        self.cached(key, self.client.get_history(&params)).await
    }

    // -- Usage -------------------------------------------------------------

    /// Credit usage snapshot, cached for the configured usage TTL
    pub async fn usage(&self) -> Result<UsageSnapshot> {
        self.cached(QueryKey::Usage, self.client.get_usage()).await
    }

    // -- Cache control -----------------------------------------------------

    /// Mark every entry providing a tag matched by `tags` as stale.
    ///
    /// Stale entries keep their value for `peek` but are refetched on the
    /// next read or by `refetch_stale`.
    pub fn invalidate(&self, tags: &[CacheTag]) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        let mut marked = 0usize;
        for (_key, entry) in self.cache.iter() {
            let matched = entry
                .tags
                .iter()
                .any(|provided| tags.iter().any(|t| t.invalidates(provided)));
            if matched && entry.is_fresh() {
                entry.set_freshness(Freshness::Stale);
                marked += 1;
            }
        }
        let tags: Vec<String> = tags.iter().map(ToString::to_string).collect();
        debug!(?tags, marked, "Invalidated cache entries");
    }

    pub async fn status(&self, key: &QueryKey) -> QueryStatus {
        match self.cache.get(key).await {
            None => QueryStatus::Missing,
            Some(entry) => match entry.freshness() {
                Freshness::Fresh => QueryStatus::Fresh,
                Freshness::Stale => QueryStatus::Stale,
                Freshness::Failed(message) => QueryStatus::StaleWithError(message),
            },
        }
    }

    /// Last stored value for `key`, fresh or not, without fetching
    pub async fn peek<T: Cacheable>(&self, key: &QueryKey) -> Option<T> {
        let entry = self.cache.get(key).await?;
        T::from_cached(&entry.value)
    }

    /// Refetch every stale entry.
    ///
    /// Failures are logged and recorded on the entry, which keeps serving
    /// its last good value through `peek`.
    pub async fn refetch_stale(&self) -> RefetchReport {
        let stale: Vec<QueryKey> = self
            .cache
            .iter()
            .filter(|(_, entry)| !entry.is_fresh())
            .map(|(key, _)| (*key).clone())
            .collect();

        let mut report = RefetchReport::default();
        for key in stale {
            let generation = self.generation.load(Ordering::Acquire);
            match self.load(&key).await {
                Ok(value) => {
                    self.store(key, value, generation).await;
                    report.refreshed += 1;
                }
                Err(e) => {
                    warn!(?key, error = %e, "Background refetch failed, keeping last value");
                    self.record_failure(&key, e.user_message()).await;
                    report.failed += 1;
                }
            }
        }
        report
    }

    async fn cached<T, F>(&self, key: QueryKey, fetch: F) -> Result<T>
    where
        T: Cacheable,
        F: Future<Output = Result<T>>,
    {
        if let Some(entry) = self.cache.get(&key).await {
            if entry.is_fresh() {
                if let Some(value) = T::from_cached(&entry.value) {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    debug!(?key, "Cache hit");
                    return Ok(value);
                }
            }
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!(?key, "Cache miss");

        let generation = self.generation.load(Ordering::Acquire);
        match fetch.await {
            Ok(value) => {
                self.store(key, value.clone().into_cached(), generation)
                    .await;
                Ok(value)
            }
            Err(e) => {
                self.record_failure(&key, e.user_message()).await;
                Err(e)
            }
        }
    }

    /// Issue the request behind `key` without touching the cache
    async fn load(&self, key: &QueryKey) -> Result<CachedValue> {
        Ok(match key.clone() {
            QueryKey::Identifications { page, limit } => self
                .client
                .list_identifications(page, limit)
                .await?
                .into_cached(),
            QueryKey::Identification(id) => self.client.get_identification(id).await?.into_cached(),
            QueryKey::Plants { page, status } => self
                .client
                .list_plants(&PlantListParams {
                    page,
                    status,
                    query: None,
                })
                .await?
                .into_cached(),
            QueryKey::Plant(id) => self.client.get_plant(id).await?.into_cached(),
            QueryKey::Families { query, page } => self
                .client
                .list_families(&FamilyListParams { query, page })
                .await?
                .into_cached(),
            QueryKey::Taxonomies { family_id } => {
                self.client.list_taxonomies(family_id).await?.into_cached()
            }
            QueryKey::Conversation(id) => self.client.get_conversation(id).await?.into_cached(),
            QueryKey::History {
                conversation_id,
                page,
                limit,
            } => self
                .client
                .get_history(&HistoryParams {
                    conversation_id,
                    page,
                    limit,
                })
                .await?
                .into_cached(),
            QueryKey::Usage => self.client.get_usage().await?.into_cached(),
        })
    }

    /// Store a fetched value. If an invalidation ran while the request was
    /// in flight the response may predate the mutation, so it is kept but
    /// stored as stale.
    async fn store(&self, key: QueryKey, value: CachedValue, generation: u64) {
        let freshness = if self.generation.load(Ordering::Acquire) == generation {
            Freshness::Fresh
        } else {
            info!(?key, "Invalidated during fetch, storing as stale");
            Freshness::Stale
        };
        let ttl = match key {
            QueryKey::Usage => Some(self.usage_ttl),
            _ => None,
        };
        let entry = CacheEntry {
            tags: value.provided_tags(&key),
            value,
            ttl,
            freshness: Mutex::new(freshness),
        };
        self.cache.insert(key, Arc::new(entry)).await;
    }

    async fn record_failure(&self, key: &QueryKey, message: String) {
        if let Some(entry) = self.cache.get(key).await {
            entry.set_freshness(Freshness::Failed(message));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flora_api::fake::FakeBackend;
    use flora_api::{ApiError, ClientOptions, StatusCode};

    async fn setup() -> (FakeBackend, FloraStore) {
        setup_with(StoreOptions::default()).await
    }

    async fn setup_with(options: StoreOptions) -> (FakeBackend, FloraStore) {
        let backend = FakeBackend::spawn().await;
        let client = FloraClient::new(backend.base_url(), ClientOptions::default()).unwrap();
        (backend, FloraStore::new(client, options))
    }

    fn new_plant(name: &str) -> NewPlant {
        NewPlant {
            scientific_name: name.to_string(),
            common_names: vec!["Test".to_string()],
            taxonomy_id: 1,
            family_id: Some(1),
            image: None,
        }
    }

    #[tokio::test]
    async fn test_second_read_is_served_from_cache() {
        let (backend, store) = setup().await;

        let first = store.plants(1, None).await.unwrap();
        let second = store.plants(1, None).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(backend.hits("GET /plantas"), 1);
        let stats = store.cache_stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
    }

    #[tokio::test]
    async fn test_distinct_parameters_are_distinct_entries() {
        let (backend, store) = setup().await;

        store.plants(1, None).await.unwrap();
        store.plants(1, Some(PlantStatus::Active)).await.unwrap();
        store.plants(1, Some(PlantStatus::Active)).await.unwrap();

        assert_eq!(backend.hits("GET /plantas"), 2);
    }

    #[tokio::test]
    async fn test_equivalent_requests_share_an_entry() {
        let (backend, store) = setup().await;

        store.plants(0, None).await.unwrap();
        store.plants(1, None).await.unwrap();
        assert_eq!(backend.hits("GET /plantas"), 1);

        let padded = FamilyListParams {
            query: " rosa ".to_string(),
            page: 0,
        };
        let plain = FamilyListParams {
            query: "rosa".to_string(),
            page: 1,
        };
        store.families(&padded).await.unwrap();
        store.families(&plain).await.unwrap();
        assert_eq!(backend.hits("GET /familias"), 1);

        let history = HistoryParams {
            conversation_id: 7,
            page: 0,
            limit: 0,
        };
        assert_eq!(history.normalized(), HistoryParams::first_page(7));
        assert_eq!(store.cache_stats().await.entries, 2);
    }

    #[tokio::test]
    async fn test_create_plant_refetches_every_plant_list() {
        let (backend, store) = setup().await;
        let all = store.plants(1, None).await.unwrap();
        store.plants(1, Some(PlantStatus::Active)).await.unwrap();
        assert_eq!(backend.hits("GET /plantas"), 2);

        store.create_plant(new_plant("Betula pendula")).await.unwrap();
        assert_eq!(
            store.status(&QueryKey::Plants { page: 1, status: None }).await,
            QueryStatus::Stale
        );

        let refreshed = store.plants(1, None).await.unwrap();
        store.plants(1, Some(PlantStatus::Active)).await.unwrap();
        assert_eq!(backend.hits("GET /plantas"), 4);
        assert_eq!(refreshed.total, all.total + 1);
        assert!(refreshed
            .items
            .iter()
            .any(|p| p.scientific_name == "Betula pendula"));
    }

    #[tokio::test]
    async fn test_update_plant_refetches_detail_and_list() {
        let (backend, store) = setup().await;
        store.plants(1, None).await.unwrap();
        let plant = store.plant(2).await.unwrap();
        store.plant(1).await.unwrap();

        let update = PlantUpdate {
            scientific_name: plant.scientific_name.clone(),
            common_names: vec!["Pedunculate oak".to_string()],
            taxonomy_id: plant.taxonomy_id,
            family_id: plant.family_id,
        };
        store.update_plant(2, &update).await.unwrap();

        assert_eq!(store.status(&QueryKey::Plant(2)).await, QueryStatus::Stale);
        assert_eq!(store.status(&QueryKey::Plant(1)).await, QueryStatus::Fresh);

        let detail = store.plant(2).await.unwrap();
        assert_eq!(detail.common_names, vec!["Pedunculate oak".to_string()]);
        let list = store.plants(1, None).await.unwrap();
        let listed = list.items.iter().find(|p| p.id == 2).unwrap();
        assert_eq!(listed.common_names, vec!["Pedunculate oak".to_string()]);

        assert_eq!(backend.hits("GET /plantas/2"), 2);
        assert_eq!(backend.hits("GET /plantas/1"), 1);
        assert_eq!(backend.hits("GET /plantas"), 2);
    }

    #[tokio::test]
    async fn test_status_change_moves_plant_between_filtered_lists() {
        let (_backend, store) = setup().await;
        let active = store.plants(1, Some(PlantStatus::Active)).await.unwrap();
        assert!(active.items.iter().any(|p| p.id == 1));

        store
            .set_plant_status(1, PlantStatus::Inactive)
            .await
            .unwrap();

        let active = store.plants(1, Some(PlantStatus::Active)).await.unwrap();
        assert!(!active.items.iter().any(|p| p.id == 1));
        let inactive = store.plants(1, Some(PlantStatus::Inactive)).await.unwrap();
        assert!(inactive.items.iter().any(|p| p.id == 1));
    }

    #[tokio::test]
    async fn test_family_mutation_leaves_plant_lists_fresh() {
        let (backend, store) = setup().await;
        store.plants(1, None).await.unwrap();
        store.families(&FamilyListParams::default()).await.unwrap();

        store
            .create_family(&NewFamily {
                name: "Betulaceae".to_string(),
                description: None,
            })
            .await
            .unwrap();

        store.plants(1, None).await.unwrap();
        let families = store.families(&FamilyListParams::default()).await.unwrap();
        assert_eq!(backend.hits("GET /plantas"), 1);
        assert_eq!(backend.hits("GET /familias"), 2);
        assert!(families.items.iter().any(|f| f.name == "Betulaceae"));
    }

    #[tokio::test]
    async fn test_identify_invalidates_catalog() {
        let (backend, store) = setup().await;
        store.plants(1, None).await.unwrap();
        store.taxonomies(None).await.unwrap();
        store.identifications(1, 10).await.unwrap();

        let image = ImageUpload::new("leaf.jpg", "image/jpeg", vec![1, 2, 3]);
        store.identify(image).await.unwrap();

        for key in [
            QueryKey::Plants { page: 1, status: None },
            QueryKey::Taxonomies { family_id: None },
            QueryKey::Identifications { page: 1, limit: 10 },
        ] {
            assert_eq!(store.status(&key).await, QueryStatus::Stale);
        }
        store.plants(1, None).await.unwrap();
        assert_eq!(backend.hits("GET /plantas"), 2);
    }

    #[tokio::test]
    async fn test_failed_mutation_invalidates_nothing() {
        let (backend, store) = setup().await;
        store.plants(1, None).await.unwrap();
        backend.fail_route("PATCH /plantas/1/estado", StatusCode::INTERNAL_SERVER_ERROR, 1);

        let err = store
            .set_plant_status(1, PlantStatus::Inactive)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Server { .. }));
        assert_eq!(
            store.status(&QueryKey::Plants { page: 1, status: None }).await,
            QueryStatus::Fresh
        );
    }

    #[tokio::test]
    async fn test_dependent_queries_skip_without_request() {
        let (backend, store) = setup().await;

        assert!(store.plant_for_edit(None).await.unwrap().is_skipped());
        assert!(store.taxonomies_for_family(None).await.unwrap().is_skipped());
        assert_eq!(backend.hits("GET /taxonomias"), 0);
        assert_eq!(store.cache_stats().await.misses, 0);

        let scoped = store
            .taxonomies_for_family(Some(1))
            .await
            .unwrap()
            .ready()
            .unwrap();
        assert!(!scoped.is_empty());
        assert!(scoped.iter().all(|t| t.family_id == 1));
        assert_eq!(backend.last_query("GET /taxonomias").as_deref(), Some("familiaId=1"));

        let plant = store.plant_for_edit(Some(3)).await.unwrap().ready().unwrap();
        assert_eq!(plant.scientific_name, "Malus domestica");
    }

    #[tokio::test]
    async fn test_search_filters_cached_page() {
        let (backend, store) = setup().await;

        let params = PlantListParams {
            page: 1,
            status: None,
            query: Some("OAK".to_string()),
        };
        let found = store.search_plants(&params).await.unwrap();
        assert_eq!(found.items.len(), 1);
        assert_eq!(found.items[0].scientific_name, "Quercus robur");
        assert_eq!(found.total, 3);

        let params = PlantListParams {
            query: Some("manzano".to_string()),
            ..params
        };
        let found = store.search_plants(&params).await.unwrap();
        assert_eq!(found.items[0].id, 3);
        assert_eq!(backend.hits("GET /plantas"), 1);
    }

    #[tokio::test]
    async fn test_refetch_failure_keeps_last_good_value() {
        let (backend, store) = setup().await;
        let key = QueryKey::Plants { page: 1, status: None };
        let original = store.plants(1, None).await.unwrap();

        store.invalidate(&[CacheTag::all(TagKind::Plant)]);
        backend.fail_route("GET /plantas", StatusCode::SERVICE_UNAVAILABLE, 1);

        let report = store.refetch_stale().await;
        assert_eq!(report, RefetchReport { refreshed: 0, failed: 1 });
        assert!(matches!(
            store.status(&key).await,
            QueryStatus::StaleWithError(_)
        ));
        assert_eq!(store.peek::<Page<Plant>>(&key).await, Some(original.clone()));

        let report = store.refetch_stale().await;
        assert_eq!(report, RefetchReport { refreshed: 1, failed: 0 });
        assert_eq!(store.status(&key).await, QueryStatus::Fresh);
    }

    #[tokio::test]
    async fn test_read_error_propagates() {
        let (backend, store) = setup().await;
        backend.fail_route("GET /plantas", StatusCode::BAD_GATEWAY, 1);

        let err = store.plants(1, None).await.unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::BAD_GATEWAY));
        assert_eq!(
            store.status(&QueryKey::Plants { page: 1, status: None }).await,
            QueryStatus::Missing
        );

        let err = store.plant(999).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_usage_expires_after_ttl() {
        let (backend, store) = setup_with(StoreOptions {
            usage_ttl: Duration::from_millis(200),
            ..StoreOptions::default()
        })
        .await;

        let usage = store.usage().await.unwrap();
        store.usage().await.unwrap();
        assert_eq!(backend.hits("GET /uso"), 1);
        assert_eq!(usage.remaining.total, 58.0);

        tokio::time::sleep(Duration::from_millis(400)).await;
        store.usage().await.unwrap();
        assert_eq!(backend.hits("GET /uso"), 2);
    }

    #[tokio::test]
    async fn test_send_message_refreshes_conversation_and_history() {
        let (backend, store) = setup().await;
        let conversation = store
            .start_conversation(&StartConversation {
                identification_id: "42".to_string(),
                secret: "abc123".to_string(),
            })
            .await
            .unwrap();
        let id = conversation.id;

        assert!(store.conversation(id).await.unwrap().messages.is_empty());
        let history = store.history(&HistoryParams::first_page(id)).await.unwrap();
        assert_eq!(history.total, 0);

        store.send_message(id, "Is it edible?").await.unwrap();

        let messages = store.conversation(id).await.unwrap().messages;
        assert_eq!(messages.len(), 2);
        let history = store.history(&HistoryParams::first_page(id)).await.unwrap();
        assert_eq!(history.total, 2);
        assert_eq!(backend.hits(&format!("GET /chat/conversaciones/{}", id)), 2);
    }
}
