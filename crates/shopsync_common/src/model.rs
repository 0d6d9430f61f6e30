use std::fmt::Display;
use std::iter::Sum;
use std::ops::Add;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{ChannelId, ItemId, ProductId};

/// Non-negative amount of money, held in minor units (cents).
///
/// On the wire prices are decimal numbers in major units (`12.5`), so the
/// serde impls convert at the boundary. Keeping minor units internally makes
/// aggregate sums exact.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Price(u64);

impl Price {
    pub const ZERO: Self = Price(0);

    pub const fn from_minor(minor: u64) -> Self {
        Price(minor)
    }

    /// Converts a decimal major-unit amount, rounding to the nearest cent.
    /// Returns `None` for negative or non-finite input.
    pub fn from_major(major: f64) -> Option<Self> {
        if !major.is_finite() || major < 0.0 {
            return None;
        }
        Some(Price((major * 100.0).round() as u64))
    }

    pub const fn minor(self) -> u64 {
        self.0
    }

    pub fn major(self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Price of `quantity` units.
    pub const fn times(self, quantity: u32) -> Self {
        Price(self.0.saturating_mul(quantity as u64))
    }
}

impl Add for Price {
    type Output = Price;

    fn add(self, rhs: Self) -> Self::Output {
        Price(self.0.saturating_add(rhs.0))
    }
}

impl Sum for Price {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Price::ZERO, Add::add)
    }
}

impl Display for Price {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl Serialize for Price {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.major())
    }
}

impl<'de> Deserialize<'de> for Price {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let major = f64::deserialize(deserializer)?;
        Price::from_major(major)
            .ok_or_else(|| D::Error::custom(format!("price must be a non-negative number, got {major}")))
    }
}

/// Which server-side collection a store mirrors.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CollectionKind {
    Cart,
    Wishlist,
}

impl CollectionKind {
    /// Path segment used by the REST endpoints.
    pub fn path_segment(self) -> &'static str {
        match self {
            CollectionKind::Cart => "cart",
            CollectionKind::Wishlist => "wishlist",
        }
    }
}

impl Display for CollectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.path_segment())
    }
}

/// Supplementary paid option attached to an item (gift wrap, extended
/// warranty, installation...).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct AttachedService {
    pub title: String,
    pub price: Price,
}

/// One entry of a cart or wishlist.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CollectionItem {
    pub id: ItemId,
    pub product_id: ProductId,
    #[serde(default)]
    pub title: String,
    #[serde(rename = "price")]
    pub unit_price: Price,
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<AttachedService>,
}

impl CollectionItem {
    /// `unit_price × quantity`; attached services are accounted separately.
    pub fn line_price(&self) -> Price {
        self.unit_price.times(self.quantity)
    }

    pub fn service_price(&self) -> Price {
        self.service
            .as_ref()
            .map_or(Price::ZERO, |service| service.price.times(self.quantity))
    }
}

/// Product data sent with an "add" intent.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NewItem {
    pub product_id: ProductId,
    pub title: String,
    #[serde(rename = "price")]
    pub unit_price: Price,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<AttachedService>,
}

impl NewItem {
    pub fn new(product_id: impl Into<ProductId>, title: impl Into<String>, unit_price: Price) -> Self {
        Self {
            product_id: product_id.into(),
            title: title.into(),
            unit_price,
            service: None,
        }
    }

    pub fn with_service(mut self, service: AttachedService) -> Self {
        self.service = Some(service);
        self
    }

    /// Materializes the product as a collection entry with a provisional id.
    pub fn into_item(self, quantity: u32) -> CollectionItem {
        CollectionItem {
            id: ItemId::provisional(&self.product_id),
            product_id: self.product_id,
            title: self.title,
            unit_price: self.unit_price,
            quantity,
            service: self.service,
        }
    }
}

/// Canonical collection state returned by the server.
///
/// Servers report totals under different names (`totalQuantity` for carts,
/// `productsCount` for wishlists); both are accepted. Missing totals are
/// derived from the items.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSnapshot {
    #[serde(default)]
    pub items: Vec<CollectionItem>,
    #[serde(default, alias = "productsCount", skip_serializing_if = "Option::is_none")]
    pub total_quantity: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_price: Option<Price>,
}

impl CollectionSnapshot {
    pub fn from_items(items: Vec<CollectionItem>) -> Self {
        Self {
            items,
            total_quantity: None,
            total_price: None,
        }
    }

    pub fn with_total_price(mut self, total_price: Price) -> Self {
        self.total_price = Some(total_price);
        self
    }

    pub fn with_total_quantity(mut self, total_quantity: u64) -> Self {
        self.total_quantity = Some(total_quantity);
        self
    }
}

/// Per-channel unread count returned by the bulk seed endpoint.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSummary {
    pub channel_id: ChannelId,
    #[serde(default)]
    pub unread_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_converts_major_units() {
        assert_eq!(Price::from_major(10.0), Some(Price::from_minor(1000)));
        assert_eq!(Price::from_major(0.1 + 0.2), Some(Price::from_minor(30)));
        assert_eq!(Price::from_major(-1.0), None);
        assert_eq!(Price::from_major(f64::NAN), None);
        assert_eq!(Price::from_minor(1205).to_string(), "12.05");
    }

    #[test]
    fn price_rejects_negative_json() {
        let err = serde_json::from_str::<Price>("-3.5").unwrap_err();
        assert!(err.to_string().contains("non-negative"));
        let ok: Price = serde_json::from_str("3").unwrap();
        assert_eq!(ok, Price::from_minor(300));
    }

    #[test]
    fn snapshot_accepts_products_count_alias() {
        let json = r#"{
            "items": [{"id": "i1", "productId": "p1", "title": "Lamp", "price": 10.5, "quantity": 2}],
            "productsCount": 2,
            "totalPrice": 21
        }"#;
        let snapshot: CollectionSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.total_quantity, Some(2));
        assert_eq!(snapshot.total_price, Some(Price::from_minor(2100)));
        assert_eq!(snapshot.items[0].unit_price, Price::from_minor(1050));
        assert_eq!(snapshot.items[0].service, None);
    }

    #[test]
    fn snapshot_totals_are_optional() {
        let snapshot: CollectionSnapshot = serde_json::from_str(r#"{"items": []}"#).unwrap();
        assert_eq!(snapshot, CollectionSnapshot::default());
    }

    #[test]
    fn service_price_scales_with_quantity() {
        let item = NewItem::new("p1", "Chair", Price::from_minor(5000))
            .with_service(AttachedService {
                title: "Assembly".into(),
                price: Price::from_minor(700),
            })
            .into_item(3);
        assert_eq!(item.line_price(), Price::from_minor(15000));
        assert_eq!(item.service_price(), Price::from_minor(2100));
        assert!(item.id.is_provisional());
    }
}
