// ── Caching decorator ──
//
// Read-through moka caches for the slow-moving collections (registrations,
// accounts, scanners, users). Entries expire a fixed time after they were
// written. Registration mutations going through this layer patch the cached
// registration set in place and clear the account cache; callers always
// receive owned copies, never the cached values themselves.
//
// Every mutation bumps a counter. A registration set carries the counter
// value it is current with, so a load that was in flight while a mutation
// landed is discarded and fetched again rather than kept for a full TTL.

use std::collections::HashSet;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use footprint_api::models::{
    Account, ExtendMessage, Paginated, Registration, RegistrationCreate, RegistrationEdit,
    RegistrationLight, ReportType, Scan, ScanRef, ScanStatus, ScanSurfaceEntry, Scanner,
    ScheduleAction, Task, TaskEdit, User,
};
use footprint_api::{Error, FootprintClient, GenerationDate, ScanSurfaceBatcher};
use moka::future::Cache;
use tokio::sync::RwLock;
use tracing::debug;

use crate::config::CacheConfig;

/// Key standing in for "no category" / "every user".
pub const DEFAULT_CATEGORY: &str = "*";

/// Times a stale registration set is refetched before it is served anyway.
const STALE_RELOADS: u32 = 2;

/// The cached registration set and the mutation count it reflects.
#[derive(Debug)]
struct Registrations {
    mutations: u64,
    set: HashSet<RegistrationLight>,
}

type RegistrationSet = Arc<RwLock<Registrations>>;

fn build_cache<K, V>(name: &'static str, ttl: Duration, max_capacity: u64) -> Cache<K, V>
where
    K: Hash + Eq + Send + Sync + std::fmt::Debug + 'static,
    V: Clone + Send + Sync + 'static,
{
    Cache::builder()
        .max_capacity(max_capacity)
        .time_to_live(ttl)
        .eviction_listener(move |key, _value, cause| {
            debug!(cache = name, ?key, ?cause, "evicted");
        })
        .build()
}

/// A [`FootprintClient`] that caches the listings of `C`.
pub struct CachingClient<C> {
    inner: C,
    registrations: Cache<&'static str, RegistrationSet>,
    /// Registration mutations seen by this layer.
    mutations: AtomicU64,
    /// Keyed by the account acted for; `None` is the caller's own.
    accounts: Cache<Option<i64>, Arc<HashSet<Account>>>,
    scanners: Cache<Option<i64>, Arc<Vec<Scanner>>>,
    users: Cache<&'static str, Arc<Vec<User>>>,
}

impl<C: FootprintClient> CachingClient<C> {
    pub fn new(inner: C, config: &CacheConfig) -> Self {
        let capacity = config.max_capacity;
        Self {
            inner,
            registrations: build_cache("registrations", config.registrations_ttl, capacity),
            mutations: AtomicU64::new(0),
            accounts: build_cache("accounts", config.accounts_ttl, capacity),
            scanners: build_cache("scanners", config.scanners_ttl, capacity),
            users: build_cache("users", config.users_ttl, capacity),
        }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// Drop every cached entry.
    pub fn invalidate_all(&self) {
        self.registrations.invalidate_all();
        self.accounts.invalidate_all();
        self.scanners.invalidate_all();
        self.users.invalidate_all();
    }

    /// Whether the account cache currently holds nothing.
    pub async fn is_account_cache_empty(&self) -> bool {
        self.accounts.run_pending_tasks().await;
        self.accounts.iter().next().is_none()
    }

    /// Count one registration mutation and apply `patch` to the cached set,
    /// if one is loaded. A set loaded before the mutation but not yet
    /// cached is caught by its stale counter on the next listing.
    async fn record_mutation(&self, patch: impl FnOnce(&mut HashSet<RegistrationLight>)) {
        let mutations = self.mutations.fetch_add(1, Ordering::AcqRel) + 1;
        if let Some(cached) = self.registrations.get(&DEFAULT_CATEGORY).await {
            let mut cached = cached.write().await;
            if cached.mutations + 1 == mutations {
                patch(&mut cached.set);
                cached.mutations = mutations;
            }
        }
        self.forget_accounts();
    }

    fn forget_accounts(&self) {
        debug!("invalidating account cache");
        self.accounts.invalidate_all();
    }
}

impl<C: FootprintClient> FootprintClient for CachingClient<C> {
    // ── Session ──────────────────────────────────────────────────────

    async fn login(&self) -> Result<(), Error> {
        self.inner.login().await
    }

    fn batcher(&self) -> &ScanSurfaceBatcher {
        self.inner.batcher()
    }

    // ── Pages ────────────────────────────────────────────────────────

    async fn registrations_page(
        &self,
        category: Option<&str>,
        page: u32,
        page_size: u32,
    ) -> Result<Paginated<RegistrationLight>, Error> {
        self.inner
            .registrations_page(category, page, page_size)
            .await
    }

    async fn accounts_page(
        &self,
        account_id: Option<i64>,
        page: u32,
        page_size: u32,
    ) -> Result<Paginated<Account>, Error> {
        self.inner.accounts_page(account_id, page, page_size).await
    }

    async fn scan_surface_page(
        &self,
        scanner_id: Option<i64>,
        text_filter: Option<&str>,
        account_id: Option<i64>,
        page: u32,
    ) -> Result<Paginated<ScanSurfaceEntry>, Error> {
        self.inner
            .scan_surface_page(scanner_id, text_filter, account_id, page)
            .await
    }

    // ── Registrations ────────────────────────────────────────────────

    async fn list_registrations(
        &self,
        category: Option<&str>,
    ) -> Result<HashSet<RegistrationLight>, Error> {
        if category.is_some_and(|c| c != DEFAULT_CATEGORY) {
            return self.inner.list_registrations(category).await;
        }
        let mut reloads = 0;
        loop {
            let cached = self
                .registrations
                .try_get_with(DEFAULT_CATEGORY, async {
                    let mutations = self.mutations.load(Ordering::Acquire);
                    let set = self.inner.list_registrations(None).await?;
                    Ok::<_, Error>(Arc::new(RwLock::new(Registrations { mutations, set })))
                })
                .await
                .map_err(Arc::unwrap_or_clone)?;
            let snapshot = cached.read().await;
            if snapshot.mutations == self.mutations.load(Ordering::Acquire)
                || reloads == STALE_RELOADS
            {
                return Ok(snapshot.set.clone());
            }
            drop(snapshot);
            debug!(reloads, "registration set predates a mutation, reloading");
            self.registrations.invalidate(&DEFAULT_CATEGORY).await;
            reloads += 1;
        }
    }

    async fn create_registration(
        &self,
        request: &RegistrationCreate,
    ) -> Result<Registration, Error> {
        let created = self.inner.create_registration(request).await?;
        self.record_mutation(|set| {
            set.insert(created.to_light());
        })
        .await;
        Ok(created)
    }

    async fn update_registration(
        &self,
        registration_id: i64,
        edit: &RegistrationEdit,
    ) -> Result<Registration, Error> {
        let updated = self.inner.update_registration(registration_id, edit).await?;
        self.record_mutation(|set| {
            if set.iter().any(|r| r.id == updated.id) {
                set.retain(|r| r.id != updated.id);
                set.insert(updated.to_light());
            }
        })
        .await;
        Ok(updated)
    }

    async fn delete_registration(&self, registration: &RegistrationLight) -> Result<(), Error> {
        self.inner.delete_registration(registration).await?;
        self.record_mutation(|set| set.retain(|r| r.id != registration.id)).await;
        Ok(())
    }

    // ── Accounts & users ─────────────────────────────────────────────

    async fn list_accounts(&self, account_id: Option<i64>) -> Result<HashSet<Account>, Error> {
        let accounts = self
            .accounts
            .try_get_with(account_id, async {
                Ok::<_, Error>(Arc::new(self.inner.list_accounts(account_id).await?))
            })
            .await
            .map_err(Arc::unwrap_or_clone)?;
        Ok(HashSet::clone(&accounts))
    }

    async fn list_users(&self) -> Result<Vec<User>, Error> {
        let users = self
            .users
            .try_get_with(DEFAULT_CATEGORY, async {
                Ok::<_, Error>(Arc::new(self.inner.list_users().await?))
            })
            .await
            .map_err(Arc::unwrap_or_clone)?;
        Ok(Vec::clone(&users))
    }

    // ── Scanners & scan surface ──────────────────────────────────────

    async fn get_scanners(&self, account_id: Option<i64>) -> Result<Vec<Scanner>, Error> {
        let scanners = self
            .scanners
            .try_get_with(account_id, async {
                Ok::<_, Error>(Arc::new(self.inner.get_scanners(account_id).await?))
            })
            .await
            .map_err(Arc::unwrap_or_clone)?;
        Ok(Vec::clone(&scanners))
    }

    async fn extend_scan_surface(
        &self,
        message: &ExtendMessage,
        no_scan: bool,
        account_id: Option<i64>,
    ) -> Result<Vec<ScanRef>, Error> {
        self.inner
            .extend_scan_surface(message, no_scan, account_id)
            .await
    }

    async fn delete_scan_surface_entry(
        &self,
        entry: &ScanSurfaceEntry,
        delete_assets: bool,
        account_id: Option<i64>,
    ) -> Result<(), Error> {
        self.inner
            .delete_scan_surface_entry(entry, delete_assets, account_id)
            .await
    }

    async fn rescan(&self, account_id: Option<i64>) -> Result<Vec<ScanRef>, Error> {
        self.inner.rescan(account_id).await
    }

    async fn rescan_scanner(
        &self,
        scanner_id: i64,
        account_id: Option<i64>,
    ) -> Result<ScanRef, Error> {
        self.inner.rescan_scanner(scanner_id, account_id).await
    }

    async fn scan_status(&self, account_id: Option<i64>) -> Result<ScanStatus, Error> {
        self.inner.scan_status(account_id).await
    }

    async fn scan(&self, scan_id: &str, account_id: Option<i64>) -> Result<Scan, Error> {
        self.inner.scan(scan_id, account_id).await
    }

    // ── Reports ──────────────────────────────────────────────────────

    async fn report_timestamps(
        &self,
        report_type: ReportType,
        account_id: Option<i64>,
    ) -> Result<Vec<String>, Error> {
        self.inner.report_timestamps(report_type, account_id).await
    }

    async fn report_json(
        &self,
        generated: GenerationDate,
        report_type: ReportType,
        account_id: Option<i64>,
    ) -> Result<String, Error> {
        self.inner
            .report_json(generated, report_type, account_id)
            .await
    }

    // ── Scheduled tasks ──────────────────────────────────────────────

    async fn list_scheduled_tasks(
        &self,
        scanner_id: Option<&str>,
        account_id: Option<i64>,
    ) -> Result<Vec<Task>, Error> {
        self.inner
            .list_scheduled_tasks(scanner_id, account_id)
            .await
    }

    async fn update_schedule(
        &self,
        task_id: &str,
        action: ScheduleAction,
        account_id: Option<i64>,
    ) -> Result<Task, Error> {
        self.inner
            .update_schedule(task_id, action, account_id)
            .await
    }

    async fn edit_task(
        &self,
        task_id: &str,
        edit: &TaskEdit,
        account_id: Option<i64>,
    ) -> Result<Task, Error> {
        self.inner.edit_task(task_id, edit, account_id).await
    }
}
