//! Listing extraction from one search-results page.
//!
//! Each card is a `ul.l-cassetteitem > li` element holding the building
//! details and a table of rentable units. Only the first unit row of a card
//! is read; cards listing several units yield a single listing.

use futures::future::join_all;

use rentmap_core::{normalize_text, ListingDraft};

use crate::error::{ExtractionError, PageError};
use crate::page::PageDriver;

/// CSS selectors and labels for the listing site's markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingSelectors {
    pub container: String,
    pub unit_rows: String,
    pub cells: String,
    /// Zero-based cell index of the floor label within a unit row.
    pub stairs_cell: usize,
    /// Searched within the last cell of the unit row.
    pub detail_link: String,
    pub image: String,
    pub title: String,
    pub address: String,
    pub rent: String,
    pub administrative_expenses: String,
    pub deposit: String,
    pub gratuity: String,
    pub floor_plan: String,
    pub area: String,
    pub pagination_links: String,
    pub next_label: String,
}

impl Default for ListingSelectors {
    fn default() -> Self {
        Self {
            container: "ul.l-cassetteitem > li".to_owned(),
            unit_rows: ".cassetteitem_other > tbody > tr".to_owned(),
            cells: "td".to_owned(),
            stairs_cell: 2,
            detail_link: "a".to_owned(),
            image: ".js-linkImage".to_owned(),
            title: "div.cassetteitem_content-title".to_owned(),
            address: ".cassetteitem_detail-col1".to_owned(),
            rent: ".cassetteitem_other-emphasis".to_owned(),
            administrative_expenses: ".cassetteitem_price--administration".to_owned(),
            deposit: ".cassetteitem_price--deposit".to_owned(),
            gratuity: ".cassetteitem_price--gratuity".to_owned(),
            floor_plan: ".cassetteitem_madori".to_owned(),
            area: ".cassetteitem_menseki".to_owned(),
            pagination_links: "p.pagination-parts > a".to_owned(),
            next_label: "次へ".to_owned(),
        }
    }
}

/// Everything read from one results page.
pub struct ExtractedPage<E> {
    /// One entry per card, in document order.
    pub listings: Vec<Result<ListingDraft, ExtractionError>>,
    /// The pagination control leading to the following page, if any.
    pub next_control: Option<E>,
    /// Largest page number shown in the pagination bar.
    pub pages_hint: Option<usize>,
}

impl<E> ExtractedPage<E> {
    /// Splits off the successfully extracted drafts, logging each failed
    /// card. Returns the drafts and the number of cards skipped.
    pub fn take_drafts(&mut self, page: usize) -> (Vec<ListingDraft>, usize) {
        let mut drafts = Vec::with_capacity(self.listings.len());
        let mut skipped = 0;
        for (index, result) in std::mem::take(&mut self.listings).into_iter().enumerate() {
            match result {
                Ok(draft) => drafts.push(draft),
                Err(e) => {
                    skipped += 1;
                    tracing::warn!(page, card = index + 1, error = %e, "skipping listing");
                }
            }
        }
        (drafts, skipped)
    }
}

/// Reads every listing card on the current page together with the page's
/// pagination state.
///
/// Cards are read concurrently; the result keeps document order. A card
/// missing a required field becomes an `Err` entry without affecting the
/// others.
///
/// # Errors
///
/// Returns [`PageError`] only when the page itself cannot be queried.
pub async fn extract_page<D>(
    driver: &D,
    selectors: &ListingSelectors,
) -> Result<ExtractedPage<D::Element>, PageError>
where
    D: PageDriver + ?Sized,
{
    let cards = driver.query_all(None, &selectors.container).await?;
    let listings = join_all(
        cards
            .iter()
            .map(|card| extract_card(driver, card, selectors)),
    )
    .await;

    let (next_control, pages_hint) = read_pagination(driver, selectors).await?;

    Ok(ExtractedPage {
        listings,
        next_control,
        pages_hint,
    })
}

/// Returns the pagination link whose text is the "next" label, if present.
///
/// # Errors
///
/// Returns [`PageError`] when the pagination links cannot be queried or read.
pub async fn find_next_control<D>(
    driver: &D,
    selectors: &ListingSelectors,
) -> Result<Option<D::Element>, PageError>
where
    D: PageDriver + ?Sized,
{
    Ok(read_pagination(driver, selectors).await?.0)
}

/// Scans the pagination bar in order for the "next" control and the largest
/// numeric page label.
async fn read_pagination<D>(
    driver: &D,
    selectors: &ListingSelectors,
) -> Result<(Option<D::Element>, Option<usize>), PageError>
where
    D: PageDriver + ?Sized,
{
    let mut next_control = None;
    let mut pages_hint: Option<usize> = None;
    for link in driver.query_all(None, &selectors.pagination_links).await? {
        let label = normalize_text(&driver.read_text(&link).await?);
        if let Ok(n) = label.parse::<usize>() {
            pages_hint = Some(pages_hint.map_or(n, |max| max.max(n)));
        } else if next_control.is_none() && label == selectors.next_label {
            next_control = Some(link);
        }
    }
    Ok((next_control, pages_hint))
}

async fn extract_card<D>(
    driver: &D,
    card: &D::Element,
    selectors: &ListingSelectors,
) -> Result<ListingDraft, ExtractionError>
where
    D: PageDriver + ?Sized,
{
    let row = driver
        .query_one(Some(card), &selectors.unit_rows)
        .await?
        .ok_or(ExtractionError::MissingField { field: "unit row" })?;
    let cells = driver.query_all(Some(&row), &selectors.cells).await?;

    let stairs_cell = cells
        .get(selectors.stairs_cell)
        .ok_or(ExtractionError::MissingField { field: "stairs" })?;
    let stairs = normalize_text(&driver.read_text(stairs_cell).await?);

    let detail_url = match cells.last() {
        Some(cell) => match driver.query_one(Some(cell), &selectors.detail_link).await? {
            Some(link) => driver.read_property(&link, "href").await?,
            None => None,
        },
        None => None,
    }
    .filter(|href| !href.trim().is_empty())
    .ok_or(ExtractionError::MissingField { field: "detail link" })?;

    let image_url = match driver.query_one(Some(card), &selectors.image).await? {
        Some(img) => driver.read_property(&img, "src").await?.unwrap_or_default(),
        None => String::new(),
    };

    Ok(ListingDraft {
        stairs,
        detail_url,
        image_url,
        title: required_text(driver, card, &selectors.title, "title").await?,
        address: required_text(driver, card, &selectors.address, "address").await?,
        rent: required_text(driver, card, &selectors.rent, "rent").await?,
        administrative_expenses: optional_text(driver, card, &selectors.administrative_expenses)
            .await?,
        deposit: optional_text(driver, card, &selectors.deposit).await?,
        gratuity: optional_text(driver, card, &selectors.gratuity).await?,
        floor_plan: required_text(driver, card, &selectors.floor_plan, "floor plan").await?,
        area: required_text(driver, card, &selectors.area, "area").await?,
    })
}

async fn required_text<D>(
    driver: &D,
    card: &D::Element,
    selector: &str,
    field: &'static str,
) -> Result<String, ExtractionError>
where
    D: PageDriver + ?Sized,
{
    let element = driver
        .query_one(Some(card), selector)
        .await?
        .ok_or(ExtractionError::MissingField { field })?;
    Ok(normalize_text(&driver.read_text(&element).await?))
}

async fn optional_text<D>(
    driver: &D,
    card: &D::Element,
    selector: &str,
) -> Result<String, ExtractionError>
where
    D: PageDriver + ?Sized,
{
    match driver.query_one(Some(card), selector).await? {
        Some(element) => Ok(normalize_text(&driver.read_text(&element).await?)),
        None => Ok(String::new()),
    }
}
