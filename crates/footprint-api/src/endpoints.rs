// `FootprintClient` over plain HTTP
//
// One resource call per method. Paths are relative to the base URL; the
// page envelope is the service's `{page, totalPages, totalCount, items}`.

use serde_json::{Value, json};
use tracing::debug;

use crate::batch::ScanSurfaceBatcher;
use crate::client::{HttpClient, Query, decode};
use crate::contract::FootprintClient;
use crate::error::Error;
use crate::generation_date::GenerationDate;
use crate::models::{
    Account, ExtendMessage, Paginated, Registration, RegistrationCreate, RegistrationEdit,
    RegistrationLight, ReportType, Scan, ScanRef, ScanStatus, ScanSurfaceEntry, Scanner,
    ScheduleAction, Task, TaskEdit, User,
};

const TECHNICAL_REPORT: &str = "technicalReport";

impl HttpClient {
    /// Fetch one report and, when its technical report came back empty,
    /// fetch that separately and splice it in.
    async fn merged_report_json(
        &self,
        generated: GenerationDate,
        report_type: ReportType,
        account_id: Option<i64>,
    ) -> Result<String, Error> {
        let query = Query::new()
            .with("timestamp", generated)
            .with("reportType", report_type)
            .account(account_id);

        let primary = self.get_text("console/cvr/", &query).await?;
        let mut report: Value = decode(primary.clone())?;

        let needs_technical = report
            .get(TECHNICAL_REPORT)
            .and_then(Value::as_array)
            .is_none_or(Vec::is_empty);
        if !needs_technical {
            return Ok(primary);
        }

        debug!(%generated, "fetching technical report separately");
        let technical: Value = self
            .get("console/cvr/", &query.with("isTechnicalReport", true))
            .await?;

        if let (Some(report), Some(section)) =
            (report.as_object_mut(), technical.get(TECHNICAL_REPORT))
        {
            report.insert(TECHNICAL_REPORT.to_owned(), section.clone());
        }

        serde_json::to_string(&report).map_err(|e| Error::Deserialization {
            message: format!("re-encoding merged report: {e}"),
            body: primary,
        })
    }
}

impl FootprintClient for HttpClient {
    // ── Session ──────────────────────────────────────────────────────

    async fn login(&self) -> Result<(), Error> {
        self.authenticate().await
    }

    fn batcher(&self) -> &ScanSurfaceBatcher {
        self.scan_batcher()
    }

    // ── Pages ────────────────────────────────────────────────────────

    async fn registrations_page(
        &self,
        category: Option<&str>,
        page: u32,
        page_size: u32,
    ) -> Result<Paginated<RegistrationLight>, Error> {
        let query = Query::new()
            .maybe("category", category)
            .with("page", page)
            .with("pageSize", page_size);
        self.get("admin/registrations/light/", &query).await
    }

    async fn accounts_page(
        &self,
        account_id: Option<i64>,
        page: u32,
        page_size: u32,
    ) -> Result<Paginated<Account>, Error> {
        let query = Query::new()
            .with("page", page)
            .with("pageSize", page_size)
            .account(account_id);
        self.get("common/accounts/", &query).await
    }

    async fn scan_surface_page(
        &self,
        scanner_id: Option<i64>,
        text_filter: Option<&str>,
        account_id: Option<i64>,
        page: u32,
    ) -> Result<Paginated<ScanSurfaceEntry>, Error> {
        let query = Query::new()
            .with("page", page)
            .maybe("scannerId", scanner_id)
            .maybe("textFilter", text_filter)
            .account(account_id);
        self.get("console/scan-surface/", &query).await
    }

    // ── Registrations ────────────────────────────────────────────────

    async fn create_registration(
        &self,
        request: &RegistrationCreate,
    ) -> Result<Registration, Error> {
        // The service creates registrations with PUT and edits them with POST.
        self.put("admin/registrations/", &Query::new(), request).await
    }

    async fn update_registration(
        &self,
        registration_id: i64,
        edit: &RegistrationEdit,
    ) -> Result<Registration, Error> {
        self.post(
            &format!("admin/registrations/{registration_id}/"),
            &Query::new(),
            edit,
        )
        .await
    }

    async fn delete_registration(&self, registration: &RegistrationLight) -> Result<(), Error> {
        self.delete(
            &format!("admin/registrations/{}/", registration.id),
            &Query::new(),
        )
        .await
    }

    // ── Accounts & users ─────────────────────────────────────────────

    async fn list_users(&self) -> Result<Vec<User>, Error> {
        self.get("admin/users/", &Query::new()).await
    }

    // ── Scanners & scan surface ──────────────────────────────────────

    async fn get_scanners(&self, account_id: Option<i64>) -> Result<Vec<Scanner>, Error> {
        self.get(
            "console/scan-surface/scanners/",
            &Query::new().account(account_id),
        )
        .await
    }

    async fn extend_scan_surface(
        &self,
        message: &ExtendMessage,
        no_scan: bool,
        account_id: Option<i64>,
    ) -> Result<Vec<ScanRef>, Error> {
        let query = Query::new()
            .with("isNoScanRequest", no_scan)
            .account(account_id);
        self.post("console/scan-surface/", &query, message).await
    }

    async fn delete_scan_surface_entry(
        &self,
        entry: &ScanSurfaceEntry,
        delete_assets: bool,
        account_id: Option<i64>,
    ) -> Result<(), Error> {
        let query = Query::new()
            .with("deleteAssets", delete_assets)
            .account(account_id);
        self.delete(&format!("console/scan-surface/entry/{}/", entry.id), &query)
            .await
    }

    async fn rescan(&self, account_id: Option<i64>) -> Result<Vec<ScanRef>, Error> {
        self.patch(
            "console/scan-surface/rescan/",
            &Query::new().account(account_id),
            &json!({}),
        )
        .await
    }

    async fn rescan_scanner(
        &self,
        scanner_id: i64,
        account_id: Option<i64>,
    ) -> Result<ScanRef, Error> {
        self.patch(
            &format!("console/scan-surface/rescan/{scanner_id}/"),
            &Query::new().account(account_id),
            &json!({}),
        )
        .await
    }

    async fn scan_status(&self, account_id: Option<i64>) -> Result<ScanStatus, Error> {
        self.get("console/status/scan/", &Query::new().account(account_id))
            .await
    }

    async fn scan(&self, scan_id: &str, account_id: Option<i64>) -> Result<Scan, Error> {
        self.get(
            &format!("console/scans/{scan_id}/"),
            &Query::new().account(account_id),
        )
        .await
    }

    // ── Reports ──────────────────────────────────────────────────────

    async fn report_timestamps(
        &self,
        report_type: ReportType,
        account_id: Option<i64>,
    ) -> Result<Vec<String>, Error> {
        let query = Query::new()
            .with("reportType", report_type)
            .account(account_id);
        self.get("console/cvr/dates/", &query).await
    }

    async fn report_json(
        &self,
        generated: GenerationDate,
        report_type: ReportType,
        account_id: Option<i64>,
    ) -> Result<String, Error> {
        self.merged_report_json(generated, report_type, account_id)
            .await
    }

    // ── Scheduled tasks ──────────────────────────────────────────────

    async fn list_scheduled_tasks(
        &self,
        scanner_id: Option<&str>,
        account_id: Option<i64>,
    ) -> Result<Vec<Task>, Error> {
        let query = Query::new()
            .maybe("scannerId", scanner_id)
            .account(account_id);
        self.get("console/scheduler/", &query).await
    }

    async fn update_schedule(
        &self,
        task_id: &str,
        action: ScheduleAction,
        account_id: Option<i64>,
    ) -> Result<Task, Error> {
        self.post(
            &format!("console/scheduler/{task_id}/{action}/"),
            &Query::new().account(account_id),
            &json!({}),
        )
        .await
    }

    async fn edit_task(
        &self,
        task_id: &str,
        edit: &TaskEdit,
        account_id: Option<i64>,
    ) -> Result<Task, Error> {
        self.post(
            &format!("console/scheduler/{task_id}/"),
            &Query::new().account(account_id),
            edit,
        )
        .await
    }
}
