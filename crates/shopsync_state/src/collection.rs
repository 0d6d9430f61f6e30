use serde::Serialize;
use shopsync_common::{CollectionItem, CollectionKind, CollectionSnapshot, ItemId, NewItem, Price};
use tracing::{trace, warn};

/// Aggregates derived from the items of a collection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionTotals {
    /// Number of distinct entries.
    pub item_count: usize,
    /// Sum of quantities.
    pub total_quantity: u64,
    /// Sum of `unit_price × quantity`.
    pub total_price: Price,
    /// Sum of attached service prices × quantity.
    pub service_price: Price,
}

impl CollectionTotals {
    pub fn derive(items: &[CollectionItem]) -> Self {
        Self {
            item_count: items.len(),
            total_quantity: items.iter().map(|item| u64::from(item.quantity)).sum(),
            total_price: items.iter().map(CollectionItem::line_price).sum(),
            service_price: items.iter().map(CollectionItem::service_price).sum(),
        }
    }
}

/// Every way a [`CollectionStore`] can change.
#[derive(Clone, Debug, PartialEq)]
pub enum CollectionAction {
    SetLoading(bool),
    SetError(Option<String>),
    /// Overwrite with a server snapshot.
    Replace(CollectionSnapshot),
    /// Optimistically add `quantity` units of a product.
    LocalAdd { item: NewItem, quantity: u32 },
    /// Optimistically remove up to `quantity` units of an entry.
    LocalRemove { item_id: ItemId, quantity: u32 },
    Clear,
}

/// Client-side copy of one cart or wishlist.
///
/// Totals are private and recomputed inside every operation that touches the
/// items, so they cannot drift from the item set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionStore {
    kind: CollectionKind,
    items: Vec<CollectionItem>,
    totals: CollectionTotals,
    loading: bool,
    error: Option<String>,
}

impl CollectionStore {
    pub fn new(kind: CollectionKind) -> Self {
        Self {
            kind,
            items: Vec::new(),
            totals: CollectionTotals::default(),
            loading: false,
            error: None,
        }
    }

    pub fn kind(&self) -> CollectionKind {
        self.kind
    }

    pub fn items(&self) -> &[CollectionItem] {
        &self.items
    }

    pub fn item(&self, item_id: &ItemId) -> Option<&CollectionItem> {
        self.items.iter().find(|item| &item.id == item_id)
    }

    pub fn totals(&self) -> CollectionTotals {
        self.totals
    }

    pub fn total_quantity(&self) -> u64 {
        self.totals.total_quantity
    }

    pub fn total_price(&self) -> Price {
        self.totals.total_price
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn apply(&mut self, action: CollectionAction) {
        match action {
            CollectionAction::SetLoading(loading) => self.set_loading(loading),
            CollectionAction::SetError(error) => self.set_error(error),
            CollectionAction::Replace(snapshot) => self.replace_collection(snapshot),
            CollectionAction::LocalAdd { item, quantity } => self.apply_local_add(item, quantity),
            CollectionAction::LocalRemove { item_id, quantity } => {
                self.apply_local_remove(&item_id, quantity)
            }
            CollectionAction::Clear => self.clear(),
        }
    }

    pub fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
    }

    /// Record (or clear) the last failure. Recording one ends any loading state.
    pub fn set_error(&mut self, error: Option<String>) {
        if error.is_some() {
            self.loading = false;
        }
        self.error = error;
    }

    /// Adopt the server's canonical state.
    ///
    /// Totals reported by the server win over derived ones. Entries with a
    /// zero quantity are dropped since a present item always has at least one
    /// unit.
    pub fn replace_collection(&mut self, snapshot: CollectionSnapshot) {
        let CollectionSnapshot {
            mut items,
            total_quantity,
            total_price,
        } = snapshot;

        items.retain(|item| {
            if item.quantity == 0 {
                trace!("[{}] dropping zero-quantity item {} from snapshot", self.kind, item.id);
            }
            item.quantity > 0
        });

        let mut totals = CollectionTotals::derive(&items);
        if let Some(reported) = total_quantity {
            if reported != totals.total_quantity {
                warn!(
                    "[{}] server reported quantity {} but items sum to {}",
                    self.kind, reported, totals.total_quantity
                );
            }
            totals.total_quantity = reported;
        }
        if let Some(reported) = total_price {
            if reported != totals.total_price {
                warn!(
                    "[{}] server reported total {} but items sum to {}",
                    self.kind, reported, totals.total_price
                );
            }
            totals.total_price = reported;
        }

        self.items = items;
        self.totals = totals;
        self.loading = false;
        self.error = None;
    }

    /// Add `quantity` units, merging into the entry for the same product when
    /// one exists. Adding zero units does nothing.
    pub fn apply_local_add(&mut self, item: NewItem, quantity: u32) {
        if quantity == 0 {
            return;
        }

        match self
            .items
            .iter_mut()
            .find(|existing| existing.product_id == item.product_id)
        {
            Some(existing) => {
                existing.quantity = existing.quantity.saturating_add(quantity);
            }
            None => self.items.push(item.into_item(quantity)),
        }

        self.recompute();
    }

    /// Remove up to `quantity` units; the entry disappears when none are left.
    /// Unknown ids are ignored.
    pub fn apply_local_remove(&mut self, item_id: &ItemId, quantity: u32) {
        let Some(index) = self.items.iter().position(|item| &item.id == item_id) else {
            trace!("[{}] local remove of unknown item {}", self.kind, item_id);
            return;
        };

        let item = &mut self.items[index];
        item.quantity -= quantity.min(item.quantity);
        if item.quantity == 0 {
            self.items.remove(index);
        }

        self.recompute();
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.totals = CollectionTotals::default();
    }

    fn recompute(&mut self) {
        self.totals = CollectionTotals::derive(&self.items);
    }
}

impl Default for CollectionStore {
    fn default() -> Self {
        Self::new(CollectionKind::Cart)
    }
}
