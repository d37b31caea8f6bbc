// The client contract shared by every layer of the stack
//
// `FootprintClient` is implemented by the bare `HttpClient` and by each
// decorator wrapping another `FootprintClient`. Primitive methods map to a
// single remote call (or a single page of one). Derived methods are built
// from primitives here, once, and behave the same through any stack.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use futures_util::future::try_join_all;
use tracing::{debug, info};

use crate::batch::ScanSurfaceBatcher;
use crate::error::Error;
use crate::generation_date::GenerationDate;
use crate::models::{
    Account, Cvr, ExtendMessage, Paginated, Registration, RegistrationCreate, RegistrationEdit,
    RegistrationLight, ReportType, ScanRef, ScanStatus, ScanSurfaceEntry, Scan, Scanner,
    ScheduleAction, SignupData, Task, TaskEdit, User,
};
use crate::pagination::{MAX_PAGE_SIZE, Paginator};

/// Role name of users that are associated with every new registration.
pub const GLOBAL_ADMIN_ROLE: &str = "Global Admin";

/// A report whose body is fetched only when asked for.
pub struct LazyReport<'a, C: ?Sized> {
    client: &'a C,
    generated: GenerationDate,
    report_type: ReportType,
    account_id: Option<i64>,
}

impl<C: ?Sized> fmt::Debug for LazyReport<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyReport")
            .field("generated", &self.generated)
            .field("report_type", &self.report_type)
            .field("account_id", &self.account_id)
            .finish_non_exhaustive()
    }
}

impl<C: FootprintClient + ?Sized> LazyReport<'_, C> {
    pub fn generated(&self) -> GenerationDate {
        self.generated
    }

    pub fn report_type(&self) -> ReportType {
        self.report_type
    }

    /// Fetch and decode the report.
    pub async fn retrieve(&self) -> Result<Cvr, Error> {
        self.client
            .report(self.generated, self.report_type, self.account_id)
            .await
    }

    /// Fetch the report as raw (merged) JSON.
    pub async fn retrieve_json(&self) -> Result<String, Error> {
        self.client
            .report_json(self.generated, self.report_type, self.account_id)
            .await
    }
}

/// Operations against the Footprint service.
///
/// `account_id` arguments select the tenant an operation acts on; `None`
/// means the caller's own account.
pub trait FootprintClient: Send + Sync {
    // ── Session ──────────────────────────────────────────────────────

    /// Establish (or re-establish) an authenticated session.
    fn login(&self) -> impl Future<Output = Result<(), Error>> + Send;

    /// The batcher used to split scan-surface updates.
    fn batcher(&self) -> &ScanSurfaceBatcher;

    // ── Pages ────────────────────────────────────────────────────────

    fn registrations_page(
        &self,
        category: Option<&str>,
        page: u32,
        page_size: u32,
    ) -> impl Future<Output = Result<Paginated<RegistrationLight>, Error>> + Send;

    fn accounts_page(
        &self,
        account_id: Option<i64>,
        page: u32,
        page_size: u32,
    ) -> impl Future<Output = Result<Paginated<Account>, Error>> + Send;

    fn scan_surface_page(
        &self,
        scanner_id: Option<i64>,
        text_filter: Option<&str>,
        account_id: Option<i64>,
        page: u32,
    ) -> impl Future<Output = Result<Paginated<ScanSurfaceEntry>, Error>> + Send;

    // ── Registrations ────────────────────────────────────────────────

    /// Every registration, optionally restricted to a category.
    fn list_registrations(
        &self,
        category: Option<&str>,
    ) -> impl Future<Output = Result<HashSet<RegistrationLight>, Error>> + Send {
        async move {
            debug!("retrieving registrations");
            Paginator::envelope(|page| self.registrations_page(category, page, MAX_PAGE_SIZE))
                .fetch_all_unordered()
                .await
        }
    }

    fn create_registration(
        &self,
        request: &RegistrationCreate,
    ) -> impl Future<Output = Result<Registration, Error>> + Send;

    fn update_registration(
        &self,
        registration_id: i64,
        edit: &RegistrationEdit,
    ) -> impl Future<Output = Result<Registration, Error>> + Send;

    fn delete_registration(
        &self,
        registration: &RegistrationLight,
    ) -> impl Future<Output = Result<(), Error>> + Send;

    // ── Accounts & users ─────────────────────────────────────────────

    /// Every account visible to the caller.
    fn list_accounts(
        &self,
        account_id: Option<i64>,
    ) -> impl Future<Output = Result<HashSet<Account>, Error>> + Send {
        async move {
            debug!("retrieving accounts");
            Paginator::envelope(|page| self.accounts_page(account_id, page, MAX_PAGE_SIZE))
                .fetch_all_unordered()
                .await
        }
    }

    fn list_users(&self) -> impl Future<Output = Result<Vec<User>, Error>> + Send;

    // ── Scanners & scan surface ──────────────────────────────────────

    /// The default cloud scanner plus any internal scanners.
    fn get_scanners(
        &self,
        account_id: Option<i64>,
    ) -> impl Future<Output = Result<Vec<Scanner>, Error>> + Send;

    /// Add one batch of targets to the scan surface.
    fn extend_scan_surface(
        &self,
        message: &ExtendMessage,
        no_scan: bool,
        account_id: Option<i64>,
    ) -> impl Future<Output = Result<Vec<ScanRef>, Error>> + Send;

    fn delete_scan_surface_entry(
        &self,
        entry: &ScanSurfaceEntry,
        delete_assets: bool,
        account_id: Option<i64>,
    ) -> impl Future<Output = Result<(), Error>> + Send;

    /// Rescan the whole scan surface with every scanner.
    fn rescan(
        &self,
        account_id: Option<i64>,
    ) -> impl Future<Output = Result<Vec<ScanRef>, Error>> + Send;

    /// Rescan the part of the scan surface owned by one scanner.
    fn rescan_scanner(
        &self,
        scanner_id: i64,
        account_id: Option<i64>,
    ) -> impl Future<Output = Result<ScanRef, Error>> + Send;

    fn scan_status(
        &self,
        account_id: Option<i64>,
    ) -> impl Future<Output = Result<ScanStatus, Error>> + Send;

    fn scan(
        &self,
        scan_id: &str,
        account_id: Option<i64>,
    ) -> impl Future<Output = Result<Scan, Error>> + Send;

    // ── Reports ──────────────────────────────────────────────────────

    /// Generation timestamps of every report of `report_type`.
    fn report_timestamps(
        &self,
        report_type: ReportType,
        account_id: Option<i64>,
    ) -> impl Future<Output = Result<Vec<String>, Error>> + Send;

    /// One report as JSON, with its technical report filled in.
    fn report_json(
        &self,
        generated: GenerationDate,
        report_type: ReportType,
        account_id: Option<i64>,
    ) -> impl Future<Output = Result<String, Error>> + Send;

    // ── Scheduled tasks ──────────────────────────────────────────────

    fn list_scheduled_tasks(
        &self,
        scanner_id: Option<&str>,
        account_id: Option<i64>,
    ) -> impl Future<Output = Result<Vec<Task>, Error>> + Send;

    fn update_schedule(
        &self,
        task_id: &str,
        action: ScheduleAction,
        account_id: Option<i64>,
    ) -> impl Future<Output = Result<Task, Error>> + Send;

    fn edit_task(
        &self,
        task_id: &str,
        edit: &TaskEdit,
        account_id: Option<i64>,
    ) -> impl Future<Output = Result<Task, Error>> + Send;

    // ━━ Derived operations ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    // ── Registrations ────────────────────────────────────────────────

    /// Return the registration for `label`, creating it if there is none.
    fn find_or_create_registration(
        &self,
        label: &str,
        description: &str,
    ) -> impl Future<Output = Result<RegistrationLight, Error>> + Send {
        async move {
            if let Some(existing) = self.registration_for_label(label).await? {
                return Ok(existing);
            }
            let created = self.create_registration_for_label(label, description).await?;
            Ok(created.to_light())
        }
    }

    /// The lowest-id registration whose label is a prefix of `label`.
    ///
    /// Note the asymmetric match: an existing `acme` is returned for
    /// `acme-eu`.
    fn registration_for_label(
        &self,
        label: &str,
    ) -> impl Future<Output = Result<Option<RegistrationLight>, Error>> + Send {
        async move {
            let mut registrations: Vec<_> =
                self.list_registrations(None).await?.into_iter().collect();
            registrations.sort_by_key(|r| r.id);
            Ok(registrations
                .into_iter()
                .find(|r| label.starts_with(r.label.as_str())))
        }
    }

    /// Create a fully-managed registration shared with every active global
    /// admin.
    fn create_registration_for_label(
        &self,
        label: &str,
        description: &str,
    ) -> impl Future<Output = Result<Registration, Error>> + Send {
        async move {
            info!(label, description, "registering account");
            let request = self.fully_managed_registration(label, description).await?;
            self.create_registration(&request).await
        }
    }

    /// The create request for a fully-managed registration of `label`.
    fn fully_managed_registration(
        &self,
        label: &str,
        description: &str,
    ) -> impl Future<Output = Result<RegistrationCreate, Error>> + Send {
        async move {
            let admins = self.active_global_admin_ids().await?;
            Ok(RegistrationCreate::fully_managed(
                label,
                description,
                SignupData::default(),
                admins,
            ))
        }
    }

    fn active_global_admin_ids(&self) -> impl Future<Output = Result<Vec<i64>, Error>> + Send {
        async move {
            Ok(self
                .list_users()
                .await?
                .into_iter()
                .filter(|u| u.is_active && u.role.as_deref() == Some(GLOBAL_ADMIN_ROLE))
                .map(|u| u.id)
                .collect())
        }
    }

    // ── Accounts ─────────────────────────────────────────────────────

    fn find_account_with_name(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<Option<Account>, Error>> + Send {
        async move {
            Ok(self
                .list_accounts(None)
                .await?
                .into_iter()
                .find(|a| a.name == name))
        }
    }

    /// Account id for the account named `label`.
    ///
    /// Only reliable once the matching registration is active.
    fn label_to_account_id(&self, label: &str) -> impl Future<Output = Result<i64, Error>> + Send {
        async move {
            self.find_account_with_name(label)
                .await?
                .map(|a| a.id)
                .ok_or_else(|| Error::NotFound {
                    entity: "account",
                    key: label.to_owned(),
                })
        }
    }

    fn registration_to_account_id(
        &self,
        registration: &RegistrationLight,
    ) -> impl Future<Output = Result<i64, Error>> + Send {
        self.label_to_account_id(&registration.label)
    }

    // ── Scanners & scan surface ──────────────────────────────────────

    fn default_cloud_scanner(
        &self,
        account_id: Option<i64>,
    ) -> impl Future<Output = Result<Scanner, Error>> + Send {
        async move {
            self.get_scanners(account_id)
                .await?
                .into_iter()
                .find(|s| s.is_default_cloud_scanner)
                .ok_or_else(|| Error::NotFound {
                    entity: "default cloud scanner",
                    key: account_id.map_or_else(|| "own account".into(), |id| id.to_string()),
                })
        }
    }

    /// Scanner ids keyed by label. On a label collision the larger (newer)
    /// id wins.
    fn scanner_id_by_label(
        &self,
        account_id: Option<i64>,
    ) -> impl Future<Output = Result<HashMap<String, i64>, Error>> + Send {
        async move {
            let mut ids = HashMap::new();
            for scanner in self.get_scanners(account_id).await? {
                ids.entry(scanner.label)
                    .and_modify(|id: &mut i64| *id = (*id).max(scanner.id))
                    .or_insert(scanner.id);
            }
            Ok(ids)
        }
    }

    /// Scan-surface entries in service order.
    fn scan_surface(
        &self,
        scanner_id: Option<i64>,
        text_filter: Option<&str>,
        account_id: Option<i64>,
    ) -> impl Future<Output = Result<Vec<ScanSurfaceEntry>, Error>> + Send {
        async move {
            debug!(?scanner_id, ?account_id, "retrieving scan surface");
            Paginator::envelope(|page| {
                self.scan_surface_page(scanner_id, text_filter, account_id, page)
            })
            .fetch_all()
            .await
        }
    }

    /// The scan surface of every scanner an account has, deduplicated.
    fn account_scan_surface(
        &self,
        account_id: Option<i64>,
    ) -> impl Future<Output = Result<HashSet<ScanSurfaceEntry>, Error>> + Send {
        async move {
            let scanner_ids: Vec<i64> = self
                .get_scanners(account_id)
                .await?
                .into_iter()
                .map(|s| s.id)
                .collect();
            let surfaces = try_join_all(
                scanner_ids
                    .into_iter()
                    .map(|id| self.scan_surface(Some(id), None, account_id)),
            )
            .await?;
            Ok(surfaces.into_iter().flatten().collect())
        }
    }

    /// Add targets to the scan surface, splitting them into as many extend
    /// requests as the batcher requires.
    ///
    /// Returns the distinct scans the service started.
    fn update_scan_surface(
        &self,
        targets: &[String],
        scanners: &[i64],
        no_scan: bool,
        account_id: Option<i64>,
    ) -> impl Future<Output = Result<Vec<ScanRef>, Error>> + Send {
        async move {
            let batches = self.batcher().prepare_batches(targets)?;
            debug!(batches = batches.len(), "updating scan surface");

            let mut seen = HashSet::new();
            let mut started = Vec::new();
            for mut batch in batches {
                batch.scanners = scanners.to_vec();
                for scan in self.extend_scan_surface(&batch, no_scan, account_id).await? {
                    if seen.insert(scan.clone()) {
                        started.push(scan);
                    }
                }
            }
            Ok(started)
        }
    }

    // ── Reports ──────────────────────────────────────────────────────

    /// Every report of `report_type`, oldest first, fetched on demand.
    ///
    /// Two reports sharing a generation timestamp is an error.
    fn reports(
        &self,
        report_type: ReportType,
        account_id: Option<i64>,
    ) -> impl Future<Output = Result<BTreeMap<GenerationDate, LazyReport<'_, Self>>, Error>> + Send
    {
        async move {
            let mut reports = BTreeMap::new();
            for raw in self.report_timestamps(report_type, account_id).await? {
                let generated: GenerationDate = raw.parse()?;
                let lazy = LazyReport {
                    client: self,
                    generated,
                    report_type,
                    account_id,
                };
                if reports.insert(generated, lazy).is_some() {
                    return Err(Error::DuplicateReport { timestamp: raw });
                }
            }
            Ok(reports)
        }
    }

    fn snapshot_reports(
        &self,
        account_id: Option<i64>,
    ) -> impl Future<Output = Result<BTreeMap<GenerationDate, LazyReport<'_, Self>>, Error>> + Send
    {
        self.reports(ReportType::Snapshot, account_id)
    }

    fn report(
        &self,
        generated: GenerationDate,
        report_type: ReportType,
        account_id: Option<i64>,
    ) -> impl Future<Output = Result<Cvr, Error>> + Send {
        async move {
            let json = self.report_json(generated, report_type, account_id).await?;
            serde_json::from_str(&json).map_err(|e| Error::Deserialization {
                message: format!("report {generated}: {e}"),
                body: json,
            })
        }
    }

    /// The most recent snapshot report, if the account has any.
    fn latest_report(
        &self,
        account_id: Option<i64>,
    ) -> impl Future<Output = Result<Option<Cvr>, Error>> + Send {
        async move {
            let reports = self.snapshot_reports(account_id).await?;
            match reports.last_key_value() {
                Some((_, latest)) => latest.retrieve().await.map(Some),
                None => Ok(None),
            }
        }
    }

    // ── Scheduled tasks ──────────────────────────────────────────────

    fn enable_task(
        &self,
        task_id: &str,
        account_id: Option<i64>,
    ) -> impl Future<Output = Result<Task, Error>> + Send {
        self.update_schedule(task_id, ScheduleAction::Enable, account_id)
    }

    fn disable_task(
        &self,
        task_id: &str,
        account_id: Option<i64>,
    ) -> impl Future<Output = Result<Task, Error>> + Send {
        self.update_schedule(task_id, ScheduleAction::Disable, account_id)
    }

    fn reset_task(
        &self,
        task_id: &str,
        account_id: Option<i64>,
    ) -> impl Future<Output = Result<Task, Error>> + Send {
        self.update_schedule(task_id, ScheduleAction::Reset, account_id)
    }

    fn start_task(
        &self,
        task_id: &str,
        account_id: Option<i64>,
    ) -> impl Future<Output = Result<Task, Error>> + Send {
        self.update_schedule(task_id, ScheduleAction::Start, account_id)
    }

    fn stop_task(
        &self,
        task_id: &str,
        account_id: Option<i64>,
    ) -> impl Future<Output = Result<Task, Error>> + Send {
        self.update_schedule(task_id, ScheduleAction::Stop, account_id)
    }
}
