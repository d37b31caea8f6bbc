// ── Retry decorator ──
//
// Wraps every primitive of an inner `FootprintClient` in a Fibonacci
// backoff loop. Expired sessions (401/403) trigger one fresh login per
// expiry, however many callers hit the expiry at once; timeouts just wait.
// Everything else surfaces on the first failure.

use std::sync::atomic::{AtomicU64, Ordering};

use footprint_api::models::{
    Account, ExtendMessage, Paginated, Registration, RegistrationCreate, RegistrationEdit,
    RegistrationLight, ReportType, Scan, ScanRef, ScanStatus, ScanSurfaceEntry, Scanner,
    ScheduleAction, Task, TaskEdit, User,
};
use footprint_api::{Error, FootprintClient, GenerationDate, ScanSurfaceBatcher};
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

use crate::config::RetryPolicy;

/// A [`FootprintClient`] that retries transient failures of `C`.
pub struct RetryClient<C> {
    inner: C,
    policy: RetryPolicy,
    /// Serializes re-logins.
    relogin: Mutex<()>,
    /// Bumped after every successful login through this layer.
    epoch: AtomicU64,
}

impl<C: FootprintClient> RetryClient<C> {
    pub fn new(inner: C, policy: RetryPolicy) -> Self {
        Self {
            inner,
            policy,
            relogin: Mutex::new(()),
            epoch: AtomicU64::new(0),
        }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Log in again unless someone already did since `seen` was read.
    async fn reauthenticate(&self, seen: u64) -> Result<(), Error> {
        let _guard = self.relogin.lock().await;
        if self.epoch.load(Ordering::Acquire) != seen {
            debug!("session already renewed by a concurrent caller");
            return Ok(());
        }
        self.inner.login().await?;
        self.epoch.fetch_add(1, Ordering::AcqRel);
        debug!("session renewed");
        Ok(())
    }

    async fn attempt<T, F, Fut>(&self, operation: &'static str, call: F) -> Result<T, Error>
    where
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = Result<T, Error>> + Send,
        T: Send,
    {
        let started = Instant::now();
        let mut retry = 0_u32;
        loop {
            let epoch = self.epoch.load(Ordering::Acquire);
            let error = match call().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => e,
            };

            retry += 1;
            if started.elapsed() >= self.policy.max_elapsed {
                warn!(operation, attempts = retry, error = %error, "giving up");
                return Err(error);
            }

            if error.is_auth_expired() {
                match self.reauthenticate(epoch).await {
                    Ok(()) => {}
                    Err(e) if !e.is_retryable() => return Err(e),
                    Err(e) => warn!(operation, error = %e, "re-login failed, will retry"),
                }
            }

            let delay = self.policy.delay(retry);
            warn!(operation, retry, ?delay, error = %error, "retrying");
            sleep(delay).await;
        }
    }
}

impl<C: FootprintClient> FootprintClient for RetryClient<C> {
    // ── Session ──────────────────────────────────────────────────────

    async fn login(&self) -> Result<(), Error> {
        self.attempt("login", || self.inner.login()).await?;
        self.epoch.fetch_add(1, Ordering::AcqRel);
        Ok(())
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
        self.attempt("registrations_page", || {
            self.inner.registrations_page(category, page, page_size)
        })
        .await
    }

    async fn accounts_page(
        &self,
        account_id: Option<i64>,
        page: u32,
        page_size: u32,
    ) -> Result<Paginated<Account>, Error> {
        self.attempt("accounts_page", || {
            self.inner.accounts_page(account_id, page, page_size)
        })
        .await
    }

    async fn scan_surface_page(
        &self,
        scanner_id: Option<i64>,
        text_filter: Option<&str>,
        account_id: Option<i64>,
        page: u32,
    ) -> Result<Paginated<ScanSurfaceEntry>, Error> {
        self.attempt("scan_surface_page", || {
            self.inner
                .scan_surface_page(scanner_id, text_filter, account_id, page)
        })
        .await
    }

    // ── Registrations ────────────────────────────────────────────────

    async fn create_registration(
        &self,
        request: &RegistrationCreate,
    ) -> Result<Registration, Error> {
        self.attempt("create_registration", || {
            self.inner.create_registration(request)
        })
        .await
    }

    async fn update_registration(
        &self,
        registration_id: i64,
        edit: &RegistrationEdit,
    ) -> Result<Registration, Error> {
        self.attempt("update_registration", || {
            self.inner.update_registration(registration_id, edit)
        })
        .await
    }

    async fn delete_registration(&self, registration: &RegistrationLight) -> Result<(), Error> {
        self.attempt("delete_registration", || {
            self.inner.delete_registration(registration)
        })
        .await
    }

    // ── Accounts & users ─────────────────────────────────────────────

    async fn list_users(&self) -> Result<Vec<User>, Error> {
        self.attempt("list_users", || self.inner.list_users()).await
    }

    // ── Scanners & scan surface ──────────────────────────────────────

    async fn get_scanners(&self, account_id: Option<i64>) -> Result<Vec<Scanner>, Error> {
        self.attempt("get_scanners", || self.inner.get_scanners(account_id))
            .await
    }

    async fn extend_scan_surface(
        &self,
        message: &ExtendMessage,
        no_scan: bool,
        account_id: Option<i64>,
    ) -> Result<Vec<ScanRef>, Error> {
        self.attempt("extend_scan_surface", || {
            self.inner.extend_scan_surface(message, no_scan, account_id)
        })
        .await
    }

    async fn delete_scan_surface_entry(
        &self,
        entry: &ScanSurfaceEntry,
        delete_assets: bool,
        account_id: Option<i64>,
    ) -> Result<(), Error> {
        self.attempt("delete_scan_surface_entry", || {
            self.inner
                .delete_scan_surface_entry(entry, delete_assets, account_id)
        })
        .await
    }

    async fn rescan(&self, account_id: Option<i64>) -> Result<Vec<ScanRef>, Error> {
        self.attempt("rescan", || self.inner.rescan(account_id)).await
    }

    async fn rescan_scanner(
        &self,
        scanner_id: i64,
        account_id: Option<i64>,
    ) -> Result<ScanRef, Error> {
        self.attempt("rescan_scanner", || {
            self.inner.rescan_scanner(scanner_id, account_id)
        })
        .await
    }

    async fn scan_status(&self, account_id: Option<i64>) -> Result<ScanStatus, Error> {
        self.attempt("scan_status", || self.inner.scan_status(account_id))
            .await
    }

    async fn scan(&self, scan_id: &str, account_id: Option<i64>) -> Result<Scan, Error> {
        self.attempt("scan", || self.inner.scan(scan_id, account_id))
            .await
    }

    // ── Reports ──────────────────────────────────────────────────────

    async fn report_timestamps(
        &self,
        report_type: ReportType,
        account_id: Option<i64>,
    ) -> Result<Vec<String>, Error> {
        self.attempt("report_timestamps", || {
            self.inner.report_timestamps(report_type, account_id)
        })
        .await
    }

    async fn report_json(
        &self,
        generated: GenerationDate,
        report_type: ReportType,
        account_id: Option<i64>,
    ) -> Result<String, Error> {
        self.attempt("report_json", || {
            self.inner.report_json(generated, report_type, account_id)
        })
        .await
    }

    // ── Scheduled tasks ──────────────────────────────────────────────

    async fn list_scheduled_tasks(
        &self,
        scanner_id: Option<&str>,
        account_id: Option<i64>,
    ) -> Result<Vec<Task>, Error> {
        self.attempt("list_scheduled_tasks", || {
            self.inner.list_scheduled_tasks(scanner_id, account_id)
        })
        .await
    }

    async fn update_schedule(
        &self,
        task_id: &str,
        action: ScheduleAction,
        account_id: Option<i64>,
    ) -> Result<Task, Error> {
        self.attempt("update_schedule", || {
            self.inner.update_schedule(task_id, action, account_id)
        })
        .await
    }

    async fn edit_task(
        &self,
        task_id: &str,
        edit: &TaskEdit,
        account_id: Option<i64>,
    ) -> Result<Task, Error> {
        self.attempt("edit_task", || self.inner.edit_task(task_id, edit, account_id))
            .await
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::*;

    /// Refuses every call with one fixed status and counts what it saw.
    struct Refusing {
        status: u16,
        batcher: ScanSurfaceBatcher,
        calls: AtomicU32,
        logins: AtomicU32,
    }

    impl Refusing {
        fn new(status: u16) -> Self {
            Self {
                status,
                batcher: ScanSurfaceBatcher::default(),
                calls: AtomicU32::new(0),
                logins: AtomicU32::new(0),
            }
        }

        fn refuse<T>(&self) -> Result<T, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::Api {
                status: self.status,
                message: "refused".into(),
            })
        }
    }

    impl FootprintClient for Refusing {
        async fn login(&self) -> Result<(), Error> {
            self.logins.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn batcher(&self) -> &ScanSurfaceBatcher {
            &self.batcher
        }

        async fn registrations_page(
            &self,
            _: Option<&str>,
            _: u32,
            _: u32,
        ) -> Result<Paginated<RegistrationLight>, Error> {
            self.refuse()
        }

        async fn accounts_page(
            &self,
            _: Option<i64>,
            _: u32,
            _: u32,
        ) -> Result<Paginated<Account>, Error> {
            self.refuse()
        }

        async fn scan_surface_page(
            &self,
            _: Option<i64>,
            _: Option<&str>,
            _: Option<i64>,
            _: u32,
        ) -> Result<Paginated<ScanSurfaceEntry>, Error> {
            self.refuse()
        }

        async fn create_registration(&self, _: &RegistrationCreate) -> Result<Registration, Error> {
            self.refuse()
        }

        async fn update_registration(
            &self,
            _: i64,
            _: &RegistrationEdit,
        ) -> Result<Registration, Error> {
            self.refuse()
        }

        async fn delete_registration(&self, _: &RegistrationLight) -> Result<(), Error> {
            self.refuse()
        }

        async fn list_users(&self) -> Result<Vec<User>, Error> {
            self.refuse()
        }

        async fn get_scanners(&self, _: Option<i64>) -> Result<Vec<Scanner>, Error> {
            self.refuse()
        }

        async fn extend_scan_surface(
            &self,
            _: &ExtendMessage,
            _: bool,
            _: Option<i64>,
        ) -> Result<Vec<ScanRef>, Error> {
            self.refuse()
        }

        async fn delete_scan_surface_entry(
            &self,
            _: &ScanSurfaceEntry,
            _: bool,
            _: Option<i64>,
        ) -> Result<(), Error> {
            self.refuse()
        }

        async fn rescan(&self, _: Option<i64>) -> Result<Vec<ScanRef>, Error> {
            self.refuse()
        }

        async fn rescan_scanner(&self, _: i64, _: Option<i64>) -> Result<ScanRef, Error> {
            self.refuse()
        }

        async fn scan_status(&self, _: Option<i64>) -> Result<ScanStatus, Error> {
            self.refuse()
        }

        async fn scan(&self, _: &str, _: Option<i64>) -> Result<Scan, Error> {
            self.refuse()
        }

        async fn report_timestamps(
            &self,
            _: ReportType,
            _: Option<i64>,
        ) -> Result<Vec<String>, Error> {
            self.refuse()
        }

        async fn report_json(
            &self,
            _: GenerationDate,
            _: ReportType,
            _: Option<i64>,
        ) -> Result<String, Error> {
            self.refuse()
        }

        async fn list_scheduled_tasks(
            &self,
            _: Option<&str>,
            _: Option<i64>,
        ) -> Result<Vec<Task>, Error> {
            self.refuse()
        }

        async fn update_schedule(
            &self,
            _: &str,
            _: ScheduleAction,
            _: Option<i64>,
        ) -> Result<Task, Error> {
            self.refuse()
        }

        async fn edit_task(&self, _: &str, _: &TaskEdit, _: Option<i64>) -> Result<Task, Error> {
            self.refuse()
        }
    }

    fn policy(unit_ms: u64, ceiling_ms: u64) -> RetryPolicy {
        RetryPolicy {
            backoff_unit: Duration::from_millis(unit_ms),
            max_elapsed: Duration::from_millis(ceiling_ms),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn spends_the_whole_budget() {
        let client = RetryClient::new(Refusing::new(401), policy(100, 300));

        let started = Instant::now();
        let err = client.scan_status(None).await.unwrap_err();

        // Failures at 0, 100, 200 and 400ms; the last one is past the ceiling.
        assert_eq!(err.status(), Some(401));
        assert_eq!(client.inner().calls.load(Ordering::SeqCst), 4);
        assert_eq!(client.inner().logins.load(Ordering::SeqCst), 3);
        assert_eq!(started.elapsed(), Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn default_policy_makes_four_attempts() {
        let client = RetryClient::new(Refusing::new(403), RetryPolicy::default());

        let started = Instant::now();
        client.list_users().await.unwrap_err();

        assert_eq!(client.inner().calls.load(Ordering::SeqCst), 4);
        assert_eq!(started.elapsed(), Duration::from_secs(240));
    }

    #[tokio::test(start_paused = true)]
    async fn other_failures_are_final() {
        let client = RetryClient::new(Refusing::new(500), policy(100, 300));

        let started = Instant::now();
        let err = client.rescan(None).await.unwrap_err();

        assert_eq!(err.status(), Some(500));
        assert_eq!(client.inner().calls.load(Ordering::SeqCst), 1);
        assert_eq!(client.inner().logins.load(Ordering::SeqCst), 0);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }
}
