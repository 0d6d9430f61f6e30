use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

use shopsync_common::{CollectionKind, CollectionSnapshot, ItemId, NewItem, Session};
use shopsync_state::{CollectionStore, StoreHandle};
use tracing::{debug, error, warn};

use crate::error::RemoteError;
use crate::settings::{ReconcilePolicy, SyncSettings};
use crate::traits::RemoteSyncClient;

/// Kind of request tracked while in flight.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MutationKind {
    Fetch,
    Add,
    Remove,
    Clear,
}

/// How a dispatched mutation ended.
///
/// None of these are fatal; failures have already been recorded in the
/// store's error field and healed where possible.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MutationOutcome {
    /// The server accepted the request and its state is now in the store.
    Reconciled,
    /// A newer request for the same collection was issued while this one was
    /// in flight, so its response was not applied.
    Superseded,
    /// Nothing to do (e.g. removing everything of an absent item).
    Skipped,
    /// The request failed and the store was reloaded from the server.
    Resynced { error: String },
    /// The request failed and so did the reload.
    Failed { error: String },
}

/// Applies user intents to a collection optimistically and reconciles with
/// the server.
///
/// Each call patches the store immediately, awaits the remote call, then
/// either replaces the store with the server snapshot or, on failure, records
/// the error and reloads the whole collection. There is no algebraic
/// rollback: the store is always healed to server state.
///
/// Requests are versioned per dispatcher. With
/// [`ReconcilePolicy::LatestRequestOnly`] a response is only applied when no
/// newer request was issued after it.
pub struct OptimisticMutationDispatcher {
    kind: CollectionKind,
    session: Rc<Session>,
    store: StoreHandle<CollectionStore>,
    remote: Rc<dyn RemoteSyncClient>,
    policy: ReconcilePolicy,
    latest_version: Cell<u64>,
    in_flight: RefCell<BTreeMap<u64, MutationKind>>,
}

impl OptimisticMutationDispatcher {
    pub fn new(
        session: Rc<Session>,
        store: StoreHandle<CollectionStore>,
        remote: Rc<dyn RemoteSyncClient>,
        settings: &SyncSettings,
    ) -> Self {
        let kind = store.read(CollectionStore::kind);
        Self {
            kind,
            session,
            store,
            remote,
            policy: settings.reconcile,
            latest_version: Cell::new(0),
            in_flight: RefCell::new(BTreeMap::new()),
        }
    }

    pub fn kind(&self) -> CollectionKind {
        self.kind
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn store(&self) -> &StoreHandle<CollectionStore> {
        &self.store
    }

    /// Number of requests awaiting a response.
    pub fn pending(&self) -> usize {
        self.in_flight.borrow().len()
    }

    /// Load the collection from the server.
    pub async fn fetch(&self) -> MutationOutcome {
        let version = self.begin(MutationKind::Fetch);
        self.store.update(|store| store.set_loading(true));

        let result = self.remote.fetch_collection(&self.session, self.kind).await;
        self.finish(version);

        match result {
            Ok(snapshot) => self.replace(version, snapshot),
            Err(err) if self.is_superseded(version) => {
                debug!("[{}] ignoring failed fetch v{}: {}", self.kind, version, err);
                MutationOutcome::Superseded
            }
            Err(err) => {
                error!("[{}] fetch for {} failed: {}", self.kind, self.session.user_id, err);
                let error = err.to_string();
                self.store.update(|store| store.set_error(Some(error.clone())));
                MutationOutcome::Failed { error }
            }
        }
    }

    /// Add `quantity` units of a product.
    pub async fn add(&self, item: NewItem, quantity: u32) -> MutationOutcome {
        if quantity == 0 {
            return MutationOutcome::Skipped;
        }
        let version = self.begin(MutationKind::Add);
        debug!(
            "[{}] v{} add {} x{}",
            self.kind, version, item.product_id, quantity
        );
        self.store
            .update(|store| store.apply_local_add(item.clone(), quantity));

        let result = self
            .remote
            .add_to_collection(&self.session, self.kind, &item, quantity)
            .await;
        self.reconcile(version, result).await
    }

    /// Remove up to `quantity` units of an entry.
    pub async fn remove(&self, item_id: &ItemId, quantity: u32) -> MutationOutcome {
        let version = self.begin(MutationKind::Remove);
        debug!("[{}] v{} remove {} x{}", self.kind, version, item_id, quantity);
        if item_id.is_provisional() {
            debug!(
                "[{}] {} has not been confirmed by the server yet; the request will likely fail and resync",
                self.kind, item_id
            );
        }
        self.store
            .update(|store| store.apply_local_remove(item_id, quantity));

        let result = self
            .remote
            .remove_from_collection(&self.session, self.kind, item_id, quantity)
            .await;
        self.reconcile(version, result).await
    }

    /// Remove every unit of an entry, whatever its quantity.
    pub async fn remove_all(&self, item_id: &ItemId) -> MutationOutcome {
        let quantity = self
            .store
            .read(|store| store.item(item_id).map(|item| item.quantity));
        match quantity {
            Some(quantity) => self.remove(item_id, quantity).await,
            None => MutationOutcome::Skipped,
        }
    }

    /// Empty the collection.
    pub async fn clear(&self) -> MutationOutcome {
        let version = self.begin(MutationKind::Clear);
        debug!("[{}] v{} clear", self.kind, version);
        self.store.update(CollectionStore::clear);

        let result = self.remote.clear_collection(&self.session, self.kind).await;
        self.finish(version);

        match result {
            Ok(()) if self.is_superseded(version) => MutationOutcome::Superseded,
            Ok(()) => {
                self.store.update(|store| {
                    store.set_loading(false);
                    store.set_error(None);
                });
                MutationOutcome::Reconciled
            }
            Err(err) => self.recover(version, err).await,
        }
    }

    async fn reconcile(
        &self,
        version: u64,
        result: Result<CollectionSnapshot, RemoteError>,
    ) -> MutationOutcome {
        self.finish(version);
        match result {
            Ok(snapshot) => self.replace(version, snapshot),
            Err(err) => self.recover(version, err).await,
        }
    }

    fn replace(&self, version: u64, snapshot: CollectionSnapshot) -> MutationOutcome {
        if self.is_superseded(version) {
            debug!(
                "[{}] dropping response to v{}; v{} is newer",
                self.kind,
                version,
                self.latest_version.get()
            );
            return MutationOutcome::Superseded;
        }
        self.store.update(|store| store.replace_collection(snapshot));
        MutationOutcome::Reconciled
    }

    /// Record the failure and reload the collection from the server.
    ///
    /// The error stays visible after a successful reload so the UI can tell
    /// the user their change did not go through.
    async fn recover(&self, version: u64, err: RemoteError) -> MutationOutcome {
        let error = err.to_string();
        warn!(
            "[{}] v{} failed for {}: {}; resynchronizing",
            self.kind, version, self.session.user_id, error
        );
        self.store.update(|store| store.set_error(Some(error.clone())));

        if self.is_superseded(version) {
            debug!("[{}] v{} superseded; newer request will heal the store", self.kind, version);
            return MutationOutcome::Superseded;
        }

        let resync = self.begin(MutationKind::Fetch);
        self.store.update(|store| store.set_loading(true));
        let result = self.remote.fetch_collection(&self.session, self.kind).await;
        self.finish(resync);

        match result {
            Ok(_) if self.is_superseded(resync) => MutationOutcome::Superseded,
            Ok(snapshot) => {
                self.store.update(|store| {
                    store.replace_collection(snapshot);
                    store.set_error(Some(error.clone()));
                });
                MutationOutcome::Resynced { error }
            }
            Err(resync_err) => {
                error!(
                    "[{}] resync after v{} failed: {}",
                    self.kind, version, resync_err
                );
                let error = resync_err.to_string();
                self.store.update(|store| store.set_error(Some(error.clone())));
                MutationOutcome::Failed { error }
            }
        }
    }

    fn begin(&self, kind: MutationKind) -> u64 {
        let version = self.latest_version.get() + 1;
        self.latest_version.set(version);
        self.in_flight.borrow_mut().insert(version, kind);
        version
    }

    fn finish(&self, version: u64) {
        self.in_flight.borrow_mut().remove(&version);
    }

    fn is_superseded(&self, version: u64) -> bool {
        match self.policy {
            ReconcilePolicy::LatestRequestOnly => version != self.latest_version.get(),
            ReconcilePolicy::LastResponseWins => false,
        }
    }
}
