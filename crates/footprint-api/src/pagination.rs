// Generic page walker
//
// Knows nothing about any particular resource: it is handed a page-fetch
// closure plus four accessors (page number, total pages, total count,
// items) and walks pages 1..=total_pages. Page 1 is always fetched first to
// learn how many pages there are.

use std::collections::HashSet;
use std::hash::Hash;
use std::time::Instant;

use futures_util::future::try_join_all;
use tracing::debug;

use crate::error::Error;
use crate::models::Paginated;

/// Page size used by listings that fetch everything.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Walks every page of a paginated resource.
///
/// `fetch` receives a 1-based page number. Any failing page aborts the walk
/// and its error is returned; partial results are dropped.
pub struct Paginator<P, V, F> {
    fetch: F,
    page_no: fn(&P) -> u32,
    total_pages: fn(&P) -> u32,
    total_count: fn(&P) -> u64,
    items: fn(P) -> Vec<V>,
}

impl<V, F, Fut> Paginator<Paginated<V>, V, F>
where
    F: Fn(u32) -> Fut,
    Fut: Future<Output = Result<Paginated<V>, Error>>,
{
    /// Paginator over the service's standard `{page, totalPages, totalCount,
    /// items}` envelope.
    pub fn envelope(fetch: F) -> Self {
        Self::new(
            fetch,
            |p| p.page,
            |p| p.total_pages,
            |p| p.total_count,
            |p| p.items,
        )
    }
}

impl<P, V, F, Fut> Paginator<P, V, F>
where
    F: Fn(u32) -> Fut,
    Fut: Future<Output = Result<P, Error>>,
{
    pub fn new(
        fetch: F,
        page_no: fn(&P) -> u32,
        total_pages: fn(&P) -> u32,
        total_count: fn(&P) -> u64,
        items: fn(P) -> Vec<V>,
    ) -> Self {
        Self {
            fetch,
            page_no,
            total_pages,
            total_count,
            items,
        }
    }

    /// Fetch every page in order and concatenate the items.
    pub async fn fetch_all(&self) -> Result<Vec<V>, Error> {
        let started = Instant::now();
        let first = (self.fetch)(1).await?;
        let total_pages = (self.total_pages)(&first);
        let capacity = usize::try_from((self.total_count)(&first)).unwrap_or(0);

        let mut all = Vec::with_capacity(capacity);
        self.absorb(&mut all, first, total_pages, started);

        for page in 2..=total_pages {
            let next = (self.fetch)(page).await?;
            self.check(page, total_pages, &next)?;
            self.absorb(&mut all, next, total_pages, started);
        }

        Ok(all)
    }

    /// Fetch page 1, then every remaining page concurrently, and union the
    /// items. Items repeated across pages collapse.
    pub async fn fetch_all_unordered(&self) -> Result<HashSet<V>, Error>
    where
        V: Eq + Hash,
    {
        let started = Instant::now();
        let first = (self.fetch)(1).await?;
        let total_pages = (self.total_pages)(&first);
        let capacity = usize::try_from((self.total_count)(&first)).unwrap_or(0);

        let mut all = HashSet::with_capacity(capacity);
        self.absorb(&mut all, first, total_pages, started);

        let rest = try_join_all((2..=total_pages).map(|page| {
            let fut = (self.fetch)(page);
            async move { fut.await.map(|p| (page, p)) }
        }))
        .await?;

        for (page, next) in rest {
            self.check(page, total_pages, &next)?;
            self.absorb(&mut all, next, total_pages, started);
        }

        Ok(all)
    }

    fn check(&self, page: u32, expected: u32, fetched: &P) -> Result<(), Error> {
        let actual = (self.total_pages)(fetched);
        if actual == expected {
            Ok(())
        } else {
            Err(Error::InconsistentPagination {
                page,
                expected,
                actual,
            })
        }
    }

    fn absorb<C: Extend<V>>(&self, all: &mut C, page: P, total_pages: u32, started: Instant) {
        let page_no = (self.page_no)(&page);
        let items = (self.items)(page);
        let percent = if total_pages == 0 {
            100
        } else {
            u64::from(page_no.min(total_pages)) * 100 / u64::from(total_pages)
        };
        debug!(
            "page {page_no}/{total_pages} ({} items) in {:?} ({percent}%)",
            items.len(),
            started.elapsed()
        );
        all.extend(items);
    }
}
