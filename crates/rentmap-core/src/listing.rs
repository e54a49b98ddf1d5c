use serde::{Deserialize, Serialize};

use crate::geo::Coordinate;

/// A rental listing as read off a result page, before its address is resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingDraft {
    /// Floor the unit is on, e.g. `"3階"`.
    pub stairs: String,
    /// Absolute URL of the listing's detail page.
    pub detail_url: String,
    /// Thumbnail URL; empty when the card has no image.
    pub image_url: String,
    pub title: String,
    pub address: String,
    pub rent: String,
    pub administrative_expenses: String,
    pub deposit: String,
    pub gratuity: String,
    /// Layout label such as `"1LDK"`.
    pub floor_plan: String,
    pub area: String,
}

impl ListingDraft {
    /// Attaches a resolved coordinate, producing a map-ready [`Listing`].
    #[must_use]
    pub fn locate(self, coordinate: Coordinate) -> Listing {
        Listing {
            stairs: self.stairs,
            detail_url: self.detail_url,
            image_url: self.image_url,
            title: self.title,
            address: self.address,
            coordinate,
            rent: self.rent,
            administrative_expenses: self.administrative_expenses,
            deposit: self.deposit,
            gratuity: self.gratuity,
            floor_plan: self.floor_plan,
            area: self.area,
        }
    }
}

/// A listing with a resolved coordinate.
///
/// Listings have no stable identity; two listings are considered to collide
/// when their coordinates are bit-for-bit equal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    pub stairs: String,
    pub detail_url: String,
    pub image_url: String,
    pub title: String,
    pub address: String,
    pub coordinate: Coordinate,
    pub rent: String,
    pub administrative_expenses: String,
    pub deposit: String,
    pub gratuity: String,
    pub floor_plan: String,
    pub area: String,
}

/// Trims `raw` and collapses every internal whitespace run into one space.
///
/// Scraped `textContent` carries the page's indentation and line breaks;
/// this keeps field values and address cache keys stable.
#[must_use]
pub fn normalize_text(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}
