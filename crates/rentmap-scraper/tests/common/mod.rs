//! In-memory results site used to drive the crawl without a browser.
//!
//! A [`FakeSite`] is a list of pages, each holding listing cards and a
//! pagination bar. [`FakeLauncher`] hands out sessions that all share one
//! [`SessionLog`], so tests can inspect what the crawl did after the
//! session has been consumed.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use rentmap_core::Coordinate;
use rentmap_geocoder::{GeocodeError, Geocoder};
use rentmap_scraper::{
    poll_until_settled, ListingSelectors, PageDriver, PageError, SessionLauncher, SettleSample,
};

pub const SEARCH_URL: &str = "https://suumo.example/chintai/ichiran/?ar=030";
pub const NEXT: &str = "次へ";
const SETTLE_POLL: Duration = Duration::from_millis(5);

// ---------------------------------------------------------------------------
// Site model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct FakeCard {
    /// Selector → text for card-level fields (title, address, prices…).
    fields: HashMap<String, String>,
    /// Texts of the first unit row's cells. `None` means no unit row.
    cells: Option<Vec<String>>,
    detail_url: Option<String>,
    image_url: Option<String>,
}

impl FakeCard {
    #[must_use]
    pub fn without_field(mut self, selector: &str) -> Self {
        self.fields.remove(selector);
        self
    }

    #[must_use]
    pub fn with_field(mut self, selector: &str, text: &str) -> Self {
        self.fields.insert(selector.to_owned(), text.to_owned());
        self
    }

    #[must_use]
    pub fn with_image(mut self, url: &str) -> Self {
        self.image_url = Some(url.to_owned());
        self
    }

    #[must_use]
    pub fn without_detail_link(mut self) -> Self {
        self.detail_url = None;
        self
    }

    #[must_use]
    pub fn without_unit_rows(mut self) -> Self {
        self.cells = None;
        self
    }

    #[must_use]
    pub fn with_cells(mut self, cells: &[&str]) -> Self {
        self.cells = Some(cells.iter().map(|c| (*c).to_owned()).collect());
        self
    }
}

/// A complete card with every required field present and no image.
pub fn card(title: &str, address: &str) -> FakeCard {
    let s = ListingSelectors::default();
    let mut fields = HashMap::new();
    fields.insert(s.title, format!("\n    {title}\n  "));
    fields.insert(s.address, format!(" {address} "));
    fields.insert(s.rent, "8.5万円".to_owned());
    fields.insert(s.administrative_expenses, "5000円".to_owned());
    fields.insert(s.deposit, "8.5万円".to_owned());
    fields.insert(s.gratuity, "-".to_owned());
    fields.insert(s.floor_plan, "1LDK".to_owned());
    fields.insert(s.area, "35.2m2".to_owned());
    FakeCard {
        fields,
        cells: Some(vec![
            String::new(),
            String::new(),
            "\n 3階 \n".to_owned(),
            String::new(),
            "詳細を見る".to_owned(),
        ]),
        detail_url: Some(format!(
            "https://suumo.example/chintai/jnc_{}/",
            title.replace(' ', "_")
        )),
        image_url: None,
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakePage {
    pub cards: Vec<FakeCard>,
    pub pagination: Vec<String>,
    /// When set, settling on this page after a click times out.
    pub never_settles: bool,
    /// Settle polls during which a click onto this page still shows the
    /// previous page, as a browser does before navigation starts.
    pub lagging_polls: usize,
}

#[derive(Debug, Clone, Default)]
pub struct FakeSite {
    pub pages: Vec<FakePage>,
}

impl FakeSite {
    /// Builds a site whose pagination bar lists every page number and a
    /// next link on all but the last page.
    pub fn paginated(pages: Vec<Vec<FakeCard>>) -> Self {
        let total = pages.len();
        let pages = pages
            .into_iter()
            .enumerate()
            .map(|(i, cards)| {
                let mut pagination: Vec<String> = (1..=total).map(|n| n.to_string()).collect();
                if i + 1 < total {
                    pagination.push(NEXT.to_owned());
                }
                FakePage {
                    cards,
                    pagination,
                    ..FakePage::default()
                }
            })
            .collect();
        Self { pages }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeElement {
    Card { page: usize, card: usize },
    Row { page: usize, card: usize },
    Cell { page: usize, card: usize, cell: usize },
    DetailLink { page: usize, card: usize },
    Image { page: usize, card: usize },
    Field { page: usize, card: usize, selector: String },
    PageLink { page: usize, index: usize },
}

impl FakeElement {
    fn page(&self) -> usize {
        match self {
            Self::Card { page, .. }
            | Self::Row { page, .. }
            | Self::Cell { page, .. }
            | Self::DetailLink { page, .. }
            | Self::Image { page, .. }
            | Self::Field { page, .. }
            | Self::PageLink { page, .. } => *page,
        }
    }
}

/// Everything a session did, shared between the launcher and its sessions.
#[derive(Debug, Default)]
pub struct SessionLog {
    pub launches: usize,
    pub closes: usize,
    pub gotos: Vec<String>,
    /// Zero-based page index each time a page became current.
    pub visited: Vec<usize>,
    pub clicks: usize,
    /// Settle polls answered while the previous page was still showing.
    pub stale_polls: usize,
    current: Option<usize>,
    /// Click target not shown yet, with the polls left before it is.
    pending: Option<(usize, usize)>,
}

pub struct FakeSession {
    site: Arc<FakeSite>,
    log: Arc<Mutex<SessionLog>>,
    selectors: ListingSelectors,
    closed: Mutex<bool>,
}

impl FakeSession {
    pub fn new(site: FakeSite) -> Self {
        Self::shared(Arc::new(site), Arc::new(Mutex::new(SessionLog::default())))
    }

    fn shared(site: Arc<FakeSite>, log: Arc<Mutex<SessionLog>>) -> Self {
        Self {
            site,
            log,
            selectors: ListingSelectors::default(),
            closed: Mutex::new(false),
        }
    }

    pub fn log(&self) -> std::sync::MutexGuard<'_, SessionLog> {
        self.log.lock().unwrap()
    }

    fn current(&self) -> Result<usize, PageError> {
        if *self.closed.lock().unwrap() {
            return Err(PageError::Closed);
        }
        self.log
            .lock()
            .unwrap()
            .current
            .ok_or_else(|| PageError::Browser("no page loaded".to_owned()))
    }

    fn live(&self, element: &FakeElement) -> Result<usize, PageError> {
        let current = self.current()?;
        if element.page() != current {
            return Err(PageError::Browser("stale element handle".to_owned()));
        }
        Ok(current)
    }

    fn card(&self, page: usize, card: usize) -> &FakeCard {
        &self.site.pages[page].cards[card]
    }

    /// One settle observation; a lagging click target becomes current once
    /// its polls run out.
    fn settle_sample(&self, ready_selector: &str) -> SettleSample {
        let mut log = self.log.lock().unwrap();
        let replaced = match log.pending {
            Some((target, left)) if left > 0 => {
                log.pending = Some((target, left - 1));
                log.stale_polls += 1;
                false
            }
            Some((target, _)) => {
                log.pending = None;
                log.current = Some(target);
                log.visited.push(target);
                true
            }
            None => true,
        };
        let Some(page) = log.current else {
            return SettleSample {
                replaced,
                ready_count: 0,
            };
        };
        let data = &self.site.pages[page];
        let ready_count = if !replaced || data.never_settles {
            0
        } else if ready_selector == self.selectors.container {
            data.cards.len()
        } else {
            1
        };
        SettleSample {
            replaced,
            ready_count,
        }
    }
}

#[async_trait]
impl PageDriver for FakeSession {
    type Element = FakeElement;

    async fn goto(&self, url: &str) -> Result<(), PageError> {
        if *self.closed.lock().unwrap() {
            return Err(PageError::Closed);
        }
        if self.site.pages.is_empty() {
            return Err(PageError::Browser(format!("net::ERR_NAME_NOT_RESOLVED at {url}")));
        }
        let mut log = self.log.lock().unwrap();
        log.gotos.push(url.to_owned());
        log.pending = None;
        log.current = Some(0);
        log.visited.push(0);
        Ok(())
    }

    async fn query_all(
        &self,
        scope: Option<&FakeElement>,
        selector: &str,
    ) -> Result<Vec<FakeElement>, PageError> {
        let s = &self.selectors;
        let Some(scope) = scope else {
            let page = self.current()?;
            let data = &self.site.pages[page];
            if selector == s.container {
                return Ok((0..data.cards.len())
                    .map(|card| FakeElement::Card { page, card })
                    .collect());
            }
            if selector == s.pagination_links {
                return Ok((0..data.pagination.len())
                    .map(|index| FakeElement::PageLink { page, index })
                    .collect());
            }
            return Ok(Vec::new());
        };

        let page = self.live(scope)?;
        let found = match scope {
            FakeElement::Card { card, .. } => {
                let c = self.card(page, *card);
                if selector == s.unit_rows {
                    c.cells
                        .iter()
                        .map(|_| FakeElement::Row { page, card: *card })
                        .collect()
                } else if selector == s.image {
                    c.image_url
                        .iter()
                        .map(|_| FakeElement::Image { page, card: *card })
                        .collect()
                } else if c.fields.contains_key(selector) {
                    vec![FakeElement::Field {
                        page,
                        card: *card,
                        selector: selector.to_owned(),
                    }]
                } else {
                    Vec::new()
                }
            }
            FakeElement::Row { card, .. } if selector == s.cells => {
                let count = self.card(page, *card).cells.as_ref().map_or(0, Vec::len);
                (0..count)
                    .map(|cell| FakeElement::Cell {
                        page,
                        card: *card,
                        cell,
                    })
                    .collect()
            }
            FakeElement::Cell { card, cell, .. } if selector == s.detail_link => {
                let c = self.card(page, *card);
                let last = c.cells.as_ref().map_or(0, Vec::len).saturating_sub(1);
                if *cell == last && c.detail_url.is_some() {
                    vec![FakeElement::DetailLink { page, card: *card }]
                } else {
                    Vec::new()
                }
            }
            _ => Vec::new(),
        };
        Ok(found)
    }

    async fn read_text(&self, element: &FakeElement) -> Result<String, PageError> {
        let page = self.live(element)?;
        let text = match element {
            FakeElement::Field { card, selector, .. } => {
                self.card(page, *card).fields[selector].clone()
            }
            FakeElement::Cell { card, cell, .. } => self
                .card(page, *card)
                .cells
                .as_ref()
                .and_then(|cells| cells.get(*cell))
                .cloned()
                .unwrap_or_default(),
            FakeElement::PageLink { index, .. } => {
                format!("\n\t{}\n", self.site.pages[page].pagination[*index])
            }
            _ => String::new(),
        };
        Ok(text)
    }

    async fn read_property(
        &self,
        element: &FakeElement,
        name: &str,
    ) -> Result<Option<String>, PageError> {
        let page = self.live(element)?;
        Ok(match (element, name) {
            (FakeElement::DetailLink { card, .. }, "href") => {
                self.card(page, *card).detail_url.clone()
            }
            (FakeElement::Image { card, .. }, "src") => self.card(page, *card).image_url.clone(),
            _ => None,
        })
    }

    async fn click(&self, element: &FakeElement) -> Result<(), PageError> {
        let page = self.live(element)?;
        let FakeElement::PageLink { index, .. } = element else {
            return Ok(());
        };
        let label = &self.site.pages[page].pagination[*index];
        let target = if label == NEXT {
            page + 1
        } else {
            label
                .parse::<usize>()
                .map_err(|_| PageError::Browser(format!("unknown link {label}")))?
                - 1
        };
        if target >= self.site.pages.len() {
            return Err(PageError::Browser(format!("no page {}", target + 1)));
        }
        let lag = self.site.pages[target].lagging_polls;
        let mut log = self.log.lock().unwrap();
        log.clicks += 1;
        if lag > 0 {
            log.pending = Some((target, lag));
        } else {
            log.current = Some(target);
            log.visited.push(target);
        }
        Ok(())
    }

    async fn await_settled(&self, ready_selector: &str, timeout: Duration) -> Result<(), PageError> {
        self.current()?;
        poll_until_settled(ready_selector, timeout, SETTLE_POLL, || async {
            self.settle_sample(ready_selector)
        })
        .await
    }

    async fn close(&self) -> Result<(), PageError> {
        let mut closed = self.closed.lock().unwrap();
        if !*closed {
            *closed = true;
            self.log.lock().unwrap().closes += 1;
        }
        Ok(())
    }
}

/// Launches [`FakeSession`]s over one shared site and log.
pub struct FakeLauncher {
    site: Arc<FakeSite>,
    log: Arc<Mutex<SessionLog>>,
    fail_launch: bool,
}

impl FakeLauncher {
    pub fn new(site: FakeSite) -> Self {
        Self {
            site: Arc::new(site),
            log: Arc::new(Mutex::new(SessionLog::default())),
            fail_launch: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_launch: true,
            ..Self::new(FakeSite::default())
        }
    }

    pub fn log(&self) -> std::sync::MutexGuard<'_, SessionLog> {
        self.log.lock().unwrap()
    }
}

#[async_trait]
impl SessionLauncher for FakeLauncher {
    type Session = FakeSession;

    async fn launch(&self) -> Result<FakeSession, PageError> {
        if self.fail_launch {
            return Err(PageError::Launch("no chromium executable found".to_owned()));
        }
        self.log.lock().unwrap().launches += 1;
        Ok(FakeSession::shared(Arc::clone(&self.site), Arc::clone(&self.log)))
    }
}

// ---------------------------------------------------------------------------
// Geocoder
// ---------------------------------------------------------------------------

pub const TOKYO_STATION: Coordinate = Coordinate::new(35.681_236, 139.767_125);

/// Answers from a fixed address table and counts calls per address.
pub struct TableGeocoder {
    table: HashMap<String, Coordinate>,
    calls: Mutex<HashMap<String, usize>>,
    total: AtomicUsize,
    delay: Duration,
}

impl TableGeocoder {
    pub fn new(entries: &[(&str, Coordinate)]) -> Self {
        Self {
            table: entries
                .iter()
                .map(|(a, c)| ((*a).to_owned(), *c))
                .collect(),
            calls: Mutex::new(HashMap::new()),
            total: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls_for(&self, address: &str) -> usize {
        self.calls.lock().unwrap().get(address).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Geocoder for TableGeocoder {
    async fn geocode(&self, address: &str) -> Result<Coordinate, GeocodeError> {
        self.total.fetch_add(1, Ordering::SeqCst);
        *self
            .calls
            .lock()
            .unwrap()
            .entry(address.to_owned())
            .or_default() += 1;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.table
            .get(address)
            .copied()
            .ok_or_else(|| GeocodeError::NoMatch {
                address: address.to_owned(),
            })
    }
}

/// A point `meters` due north of `origin`.
pub fn north_of(origin: Coordinate, meters: f64) -> Coordinate {
    let d_lat = (meters / 1000.0 / rentmap_core::EARTH_RADIUS_KM).to_degrees();
    origin.offset(d_lat, 0.0)
}
