//! Cloud sync engine.
//!
//! Local data is authoritative. Every local mutation is followed by a
//! fire-and-forget remote operation carried by the [`SyncOutbox`]; full
//! uploads (`push_all`) and downloads (`pull_all`) are run by the user or by
//! the background connectivity loop. There are no retries: a failed remote
//! operation is logged, recorded in the status and the sync log, and the next
//! full push repairs the mirror.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::SyncSettings;
use crate::error::{PosError, PosResult};
use crate::models::{
    CostCategory, Drink, IncomeCategory, LedgerEntry, LedgerKind, Order, OrderStatus,
};
use crate::storage::{now_iso, LocalData, Storage};
use crate::store::Store;
use crate::tables::{assemble_orders, CloudApi};

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Sync status shown by the UI and emitted as the `sync_status` event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub is_online: bool,
    pub last_sync: Option<String>,
    pub syncing: bool,
    pub error: Option<String>,
}

/// Shared status of the sync engine.
pub struct SyncState {
    pub is_running: Arc<AtomicBool>,
    status: Mutex<SyncStatus>,
}

impl SyncState {
    pub fn new(last_sync: Option<String>) -> Self {
        Self {
            is_running: Arc::new(AtomicBool::new(false)),
            status: Mutex::new(SyncStatus {
                last_sync,
                ..SyncStatus::default()
            }),
        }
    }

    pub fn snapshot(&self) -> SyncStatus {
        self.status
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    fn update(&self, f: impl FnOnce(&mut SyncStatus)) {
        match self.status.lock() {
            Ok(mut status) => f(&mut status),
            Err(e) => warn!("sync status lock poisoned: {e}"),
        }
    }

    /// Returns the previous online flag.
    fn set_online(&self, online: bool) -> bool {
        let mut previous = false;
        self.update(|s| {
            previous = s.is_online;
            s.is_online = online;
        });
        previous
    }

    /// Claim the `syncing` flag. Returns `false` when a full sync is already
    /// running.
    fn begin_sync(&self) -> bool {
        let mut claimed = false;
        self.update(|s| {
            if !s.syncing {
                s.syncing = true;
                s.error = None;
                claimed = true;
            }
        });
        claimed
    }
}

/// Outcome of a manual push or pull.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub success: bool,
    pub message: String,
}

impl SyncReport {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Outbox
// ---------------------------------------------------------------------------

/// A remote operation queued after a local mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOp {
    UpsertDrinks(Vec<Drink>),
    DeleteDrink(String),
    SaveOrder(Order),
    UpdateOrderStatus { order_id: String, status: OrderStatus },
    DeleteOrder(String),
    SaveCost(LedgerEntry<CostCategory>),
    DeleteCost(String),
    SaveExtraIncome(LedgerEntry<IncomeCategory>),
    DeleteExtraIncome(String),
}

impl SyncOp {
    pub fn name(&self) -> &'static str {
        match self {
            Self::UpsertDrinks(_) => "upsert_drinks",
            Self::DeleteDrink(_) => "delete_drink",
            Self::SaveOrder(_) => "save_order",
            Self::UpdateOrderStatus { .. } => "update_order_status",
            Self::DeleteOrder(_) => "delete_order",
            Self::SaveCost(_) => "save_cost",
            Self::DeleteCost(_) => "delete_cost",
            Self::SaveExtraIncome(_) => "save_extra_income",
            Self::DeleteExtraIncome(_) => "delete_extra_income",
        }
    }
}

/// Maps a ledger category to the outbox operations of its collection.
pub trait LedgerSync: LedgerKind {
    fn save_op(entry: LedgerEntry<Self>) -> SyncOp;
    fn delete_op(id: String) -> SyncOp;
}

impl LedgerSync for CostCategory {
    fn save_op(entry: LedgerEntry<Self>) -> SyncOp {
        SyncOp::SaveCost(entry)
    }

    fn delete_op(id: String) -> SyncOp {
        SyncOp::DeleteCost(id)
    }
}

impl LedgerSync for IncomeCategory {
    fn save_op(entry: LedgerEntry<Self>) -> SyncOp {
        SyncOp::SaveExtraIncome(entry)
    }

    fn delete_op(id: String) -> SyncOp {
        SyncOp::DeleteExtraIncome(id)
    }
}

/// Sending half of the outbox queue.
#[derive(Clone)]
pub struct SyncOutbox {
    tx: mpsc::UnboundedSender<SyncOp>,
}

impl SyncOutbox {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SyncOp>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn send(&self, op: SyncOp) {
        let name = op.name();
        if self.tx.send(op).is_err() {
            warn!(operation = name, "sync outbox closed, operation dropped");
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

type StatusSink = Box<dyn Fn(&SyncStatus) + Send + Sync>;

pub struct SyncEngine {
    state: SyncState,
    cloud: RwLock<Option<CloudApi>>,
    store: Arc<Store>,
    settings: SyncSettings,
    on_status: Option<StatusSink>,
}

impl SyncEngine {
    pub fn new(store: Arc<Store>, cloud: Option<CloudApi>, settings: SyncSettings) -> Self {
        let last_sync = store.storage().last_sync();
        Self {
            state: SyncState::new(last_sync),
            cloud: RwLock::new(cloud),
            store,
            settings,
            on_status: None,
        }
    }

    /// Called with the new status after every remote outcome.
    pub fn with_status_sink(mut self, sink: impl Fn(&SyncStatus) + Send + Sync + 'static) -> Self {
        self.on_status = Some(Box::new(sink));
        self
    }

    pub fn status(&self) -> SyncStatus {
        self.state.snapshot()
    }

    pub fn is_configured(&self) -> bool {
        self.cloud().is_some()
    }

    fn cloud(&self) -> Option<CloudApi> {
        self.cloud.read().ok().and_then(|c| c.clone())
    }

    /// Swap the remote client after the credentials changed. `None` turns
    /// remote sync off.
    pub fn set_cloud(&self, cloud: Option<CloudApi>) {
        let configured = cloud.is_some();
        match self.cloud.write() {
            Ok(mut guard) => *guard = cloud,
            Err(e) => warn!("cloud client lock poisoned: {e}"),
        }
        if !configured {
            self.state.set_online(false);
        }
        info!(configured, "Cloud backend client replaced");
        self.emit();
    }

    fn storage(&self) -> &Storage {
        self.store.storage()
    }

    fn emit(&self) {
        if let Some(sink) = &self.on_status {
            sink(&self.state.snapshot());
        }
    }

    fn mark_synced(&self) {
        let now = now_iso();
        if let Err(e) = self.storage().set_last_sync(&now) {
            warn!(error = %e, "Failed to persist last sync time");
        }
        self.state.update(|s| {
            s.last_sync = Some(now);
            s.error = None;
        });
    }

    // -- Outbox ---------------------------------------------------------------

    /// Apply queued operations in order until every sender is gone.
    pub async fn run_outbox(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<SyncOp>) {
        info!("Sync outbox worker started");
        while let Some(op) = rx.recv().await {
            self.handle_op(op).await;
        }
        info!("Sync outbox worker stopped");
    }

    async fn handle_op(&self, op: SyncOp) {
        let name = op.name();
        let Some(cloud) = self.cloud() else {
            debug!(operation = name, "cloud sync not configured, kept local only");
            return;
        };
        if !self.state.snapshot().is_online {
            info!(operation = name, "offline, remote operation dropped");
            return;
        }

        let result = apply_op(&cloud, op).await;
        match &result {
            Ok(()) => {
                debug!(operation = name, "remote operation applied");
                self.mark_synced();
            }
            Err(e) => {
                warn!(operation = name, error = %e, "remote operation failed");
                let message = e.to_string();
                self.state.update(|s| s.error = Some(message));
            }
        }
        self.storage()
            .record_sync_outcome(name, &result.map_err(|e| e.to_string()));
        self.emit();
    }

    // -- Full push / pull ----------------------------------------------------

    /// Guard shared by manual and scheduled full syncs.
    fn start_full_sync(&self) -> Result<CloudApi, PosError> {
        let cloud = self
            .cloud()
            .ok_or(PosError::NotConfigured("no backend URL or anon key"))?;
        if !self.state.snapshot().is_online {
            return Err(PosError::Offline);
        }
        if !self.state.begin_sync() {
            return Err(PosError::Invalid("a sync is already in progress".into()));
        }
        self.emit();
        Ok(cloud)
    }

    fn finish_full_sync(&self, operation: &str, result: PosResult<()>) -> PosResult<()> {
        match &result {
            Ok(()) => self.mark_synced(),
            Err(e) => {
                let message = e.to_string();
                self.state.update(|s| s.error = Some(message));
            }
        }
        self.state.update(|s| s.syncing = false);
        let logged = result.as_ref().map(|_| ()).map_err(|e| e.to_string());
        self.storage().record_sync_outcome(operation, &logged);
        self.emit();
        result
    }

    /// Upload every local collection.
    pub async fn push_all(&self) -> SyncReport {
        let cloud = match self.start_full_sync() {
            Ok(c) => c,
            Err(e) => {
                info!(error = %e, "Full push skipped");
                return SyncReport::failed(e.to_string());
            }
        };
        info!("Full push started");
        let result = self.upload_everything(&cloud).await;
        match self.finish_full_sync("push_all", result) {
            Ok(()) => {
                info!("Full push complete");
                SyncReport::ok("Local data uploaded to the cloud")
            }
            Err(e) => {
                warn!(error = %e, "Full push failed");
                SyncReport::failed(format!("Upload failed: {e}"))
            }
        }
    }

    async fn upload_everything(&self, cloud: &CloudApi) -> PosResult<()> {
        let data = self.storage().all_local_data()?;
        if !data.drinks.is_empty() {
            cloud.upsert_drinks(&data.drinks).await?;
        }
        for order in &data.orders {
            cloud.upsert_order(order).await?;
        }
        cloud.upsert_order_items(&data.orders).await?;
        for cost in &data.costs {
            cloud.upsert_ledger(cost).await?;
        }
        for income in &data.extra_incomes {
            cloud.upsert_ledger(income).await?;
        }
        debug!(
            drinks = data.drinks.len(),
            orders = data.orders.len(),
            costs = data.costs.len(),
            extra_incomes = data.extra_incomes.len(),
            "uploaded local collections"
        );
        Ok(())
    }

    /// Replace the local collections with the cloud copy.
    pub async fn pull_all(&self) -> SyncReport {
        let cloud = match self.start_full_sync() {
            Ok(c) => c,
            Err(e) => {
                info!(error = %e, "Full pull skipped");
                return SyncReport::failed(e.to_string());
            }
        };
        info!("Full pull started");
        let result = self.download_everything(&cloud).await;
        match self.finish_full_sync("pull_all", result) {
            Ok(()) => {
                info!("Full pull complete");
                SyncReport::ok("Cloud data downloaded")
            }
            Err(e) => {
                warn!(error = %e, "Full pull failed");
                SyncReport::failed(format!("Download failed: {e}"))
            }
        }
    }

    async fn download_everything(&self, cloud: &CloudApi) -> PosResult<()> {
        let (drinks, orders, items, costs, extra_incomes) = tokio::try_join!(
            cloud.get_drinks(),
            cloud.get_orders(),
            cloud.get_order_items(),
            cloud.get_ledger::<CostCategory>(),
            cloud.get_ledger::<IncomeCategory>(),
        )?;

        // An empty remote menu never wipes the local one.
        let drinks = if drinks.is_empty() {
            self.storage().get_drinks()?
        } else {
            drinks
        };
        let data = LocalData {
            drinks,
            orders: assemble_orders(orders, items),
            costs,
            extra_incomes,
        };
        self.storage().replace_all(&data)?;
        self.store.replace_from_pull(&data)?;
        info!(
            drinks = data.drinks.len(),
            orders = data.orders.len(),
            costs = data.costs.len(),
            extra_incomes = data.extra_incomes.len(),
            "local collections replaced from cloud"
        );
        Ok(())
    }

    // -- Connectivity --------------------------------------------------------

    /// Probe the backend and record the result. Returns `true` on an
    /// offline -> online transition.
    pub async fn probe(&self) -> bool {
        let online = match self.cloud() {
            Some(cloud) => cloud.ping().await,
            None => false,
        };
        let was_online = self.state.set_online(online);
        if was_online != online {
            if online {
                info!("Cloud backend reachable");
            } else {
                info!("Cloud backend unreachable; remote operations are dropped until it returns");
            }
            self.emit();
        }
        online && !was_online
    }

    /// First-launch download. Runs once per installation; later launches
    /// keep the local data as is.
    pub async fn init_auto_sync(&self) {
        if !self.is_configured() {
            debug!("cloud sync not configured, skipping initial pull");
            return;
        }
        if self.storage().sync_initialized() {
            debug!("initial cloud pull already done");
            return;
        }
        self.probe().await;
        let report = self.pull_all().await;
        if report.success {
            if let Err(e) = self.storage().mark_sync_initialized() {
                warn!(error = %e, "Failed to persist the sync-initialized flag");
            }
            info!("Initial cloud pull complete");
        } else {
            warn!(message = %report.message, "Initial cloud pull failed; retried on next launch");
        }
    }

    /// Background loop: probe connectivity, push everything shortly after
    /// the backend comes back, and push periodically while online.
    pub async fn run_connectivity_loop(self: Arc<Self>) {
        if self.state.is_running.swap(true, Ordering::SeqCst) {
            warn!("Connectivity loop already running");
            return;
        }
        info!(
            probe_secs = self.settings.probe_interval.as_secs(),
            push_secs = self.settings.push_interval.as_secs(),
            "Connectivity loop started"
        );

        let mut probe_tick = tokio::time::interval(self.settings.probe_interval);
        let mut push_tick = tokio::time::interval(self.settings.push_interval);
        // The first tick of an interval fires immediately; the first periodic
        // push waits a full period.
        push_tick.tick().await;

        while self.state.is_running.load(Ordering::SeqCst) {
            tokio::select! {
                _ = probe_tick.tick() => {
                    if self.probe().await {
                        tokio::time::sleep(self.settings.reconnect_delay).await;
                        let report = self.push_all().await;
                        debug!(success = report.success, "push after reconnect");
                    }
                }
                _ = push_tick.tick() => {
                    let status = self.state.snapshot();
                    if status.is_online && !status.syncing {
                        let report = self.push_all().await;
                        debug!(success = report.success, "periodic push");
                    }
                }
            }
        }
        info!("Connectivity loop stopped");
    }

    pub fn stop(&self) {
        self.state.is_running.store(false, Ordering::SeqCst);
    }
}

async fn apply_op(cloud: &CloudApi, op: SyncOp) -> PosResult<()> {
    match op {
        SyncOp::UpsertDrinks(drinks) => cloud.upsert_drinks(&drinks).await,
        SyncOp::DeleteDrink(id) => cloud.delete_drink(&id).await,
        SyncOp::SaveOrder(order) => cloud.save_order(&order).await,
        SyncOp::UpdateOrderStatus { order_id, status } => {
            cloud.update_order_status(&order_id, status).await
        }
        SyncOp::DeleteOrder(id) => cloud.delete_order(&id).await,
        SyncOp::SaveCost(entry) => cloud.upsert_ledger(&entry).await,
        SyncOp::DeleteCost(id) => cloud.delete_ledger::<CostCategory>(&id).await,
        SyncOp::SaveExtraIncome(entry) => cloud.upsert_ledger(&entry).await,
        SyncOp::DeleteExtraIncome(id) => cloud.delete_ledger::<IncomeCategory>(&id).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::memory::MemoryBackend;
    use crate::models::{IceLevel, SugarLevel};
    use crate::storage::memory_storage;
    use crate::store::Action;
    use crate::tables::{TABLE_DRINKS, TABLE_ORDERS, TABLE_ORDER_ITEMS};
    use chrono::{DateTime, NaiveDate, Utc};
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::sleep;

    struct Harness {
        backend: Arc<MemoryBackend>,
        engine: Arc<SyncEngine>,
        store: Arc<Store>,
        rx: mpsc::UnboundedReceiver<SyncOp>,
    }

    fn harness() -> Harness {
        let backend = Arc::new(MemoryBackend::default());
        let (outbox, rx) = SyncOutbox::channel();
        let storage = memory_storage().with_outbox(outbox);
        let store = Arc::new(Store::load(storage).unwrap());
        let engine = Arc::new(SyncEngine::new(
            store.clone(),
            Some(CloudApi::new(backend.clone())),
            SyncSettings::default(),
        ));
        Harness {
            backend,
            engine,
            store,
            rx,
        }
    }

    impl Harness {
        async fn drain(&mut self) {
            while let Ok(op) = self.rx.try_recv() {
                self.engine.handle_op(op).await;
            }
        }
    }

    fn place_order(store: &Store) -> Order {
        store
            .add_drink_to_cart("coffee", 2, SugarLevel::Half, IceLevel::Less)
            .unwrap();
        let state = store.dispatch(Action::SubmitOrder).unwrap();
        state.orders[0].clone()
    }

    #[tokio::test]
    async fn test_outbox_applies_operations_when_online() {
        let mut h = harness();
        assert!(h.engine.probe().await);
        let order = place_order(&h.store);
        h.drain().await;

        assert_eq!(h.backend.rows(TABLE_DRINKS).len(), 8);
        assert_eq!(h.backend.rows(TABLE_ORDERS)[0]["id"], order.id.as_str());
        assert_eq!(h.backend.rows(TABLE_ORDER_ITEMS).len(), 1);

        let status = h.engine.status();
        assert!(status.last_sync.is_some());
        assert!(status.error.is_none());
        assert_eq!(h.store.storage().last_sync(), status.last_sync);
    }

    #[tokio::test]
    async fn test_outbox_drops_operations_while_offline() {
        let mut h = harness();
        h.backend.set_offline(true);
        assert!(!h.engine.probe().await);
        place_order(&h.store);
        h.drain().await;

        assert!(h.backend.calls().is_empty());
        assert!(h.engine.status().last_sync.is_none());
    }

    #[tokio::test]
    async fn test_outbox_failure_is_recorded() {
        let mut h = harness();
        h.engine.probe().await;
        h.backend.fail_on(TABLE_ORDERS);
        place_order(&h.store);
        h.drain().await;

        let status = h.engine.status();
        assert!(status.error.as_deref().unwrap_or("").contains("HTTP 500"));
        let log = h.store.storage().recent_sync_log(10).unwrap();
        assert_eq!(log[0]["operation"], "save_order");
        assert_eq!(log[0]["success"], false);
    }

    #[tokio::test]
    async fn test_push_all_uploads_everything() {
        let mut h = harness();
        place_order(&h.store);
        h.store
            .storage()
            .save_ledger_entry(&LedgerEntry {
                id: "c1".into(),
                name: "Milk".into(),
                amount: 40.0,
                category: CostCategory::Ingredients,
                date: NaiveDate::from_ymd_opt(2026, 10, 1).unwrap(),
                description: None,
                created_at: Utc::now(),
            })
            .unwrap();
        while h.rx.try_recv().is_ok() {}

        let rejected = h.engine.push_all().await;
        assert!(!rejected.success);
        assert!(h.backend.calls().is_empty());

        h.engine.probe().await;
        let report = h.engine.push_all().await;
        assert!(report.success, "{}", report.message);
        assert_eq!(h.backend.rows(TABLE_DRINKS).len(), 8);
        assert_eq!(h.backend.rows(TABLE_ORDERS).len(), 1);
        assert_eq!(h.backend.rows(TABLE_ORDER_ITEMS).len(), 1);
        assert_eq!(h.backend.rows("costs").len(), 1);

        let status = h.engine.status();
        assert!(!status.syncing);
        assert!(status.last_sync.is_some());
    }

    #[tokio::test]
    async fn test_push_all_failure_sets_error() {
        let h = harness();
        h.engine.probe().await;
        h.backend.fail_on(TABLE_DRINKS);
        let report = h.engine.push_all().await;
        assert!(!report.success);
        assert!(report.message.starts_with("Upload failed"));
        let status = h.engine.status();
        assert!(!status.syncing);
        assert!(status.error.is_some());
    }

    #[tokio::test]
    async fn test_pull_all_replaces_local_collections() {
        let h = harness();
        place_order(&h.store);
        h.backend.seed(
            TABLE_DRINKS,
            vec![json!({"id": "matcha", "name": "Matcha", "price": 22, "category": "Tea",
                        "created_at": "2026-01-01T00:00:00Z"})],
        );
        h.backend.seed(
            TABLE_ORDERS,
            vec![json!({"id": "r1", "total": "44", "status": "completed",
                        "timestamp": "2026-10-02T03:04:05Z", "order_number": "042"})],
        );
        h.backend.seed(
            TABLE_ORDER_ITEMS,
            vec![json!({"id": "ri1", "order_id": "r1", "drink_id": "matcha",
                        "drink_name": "Matcha", "price": 22, "quantity": 2,
                        "sugar": "none", "ice": "none", "subtotal": 44})],
        );

        h.engine.probe().await;
        let report = h.engine.pull_all().await;
        assert!(report.success, "{}", report.message);

        let local = h.store.storage().all_local_data().unwrap();
        assert_eq!(local.drinks.len(), 1);
        assert_eq!(local.orders.len(), 1);
        assert_eq!(local.orders[0].items[0].quantity, 2);

        let snapshot = h.store.snapshot();
        assert_eq!(snapshot.drinks[0].id, "matcha");
        assert_eq!(snapshot.orders[0].order_number, "042");
    }

    #[tokio::test]
    async fn test_pull_reads_timestamps_without_offset() {
        let h = harness();
        h.backend.seed(
            TABLE_ORDERS,
            vec![
                json!({"id": "r1", "total": 18, "status": "pending",
                       "timestamp": "2026-10-02T03:04:05", "order_number": "001"}),
                json!({"id": "r2", "total": 18, "status": "completed",
                       "timestamp": "2026-10-03 08:00:00+00", "order_number": "002"}),
            ],
        );
        h.engine.probe().await;
        let report = h.engine.pull_all().await;
        assert!(report.success, "{}", report.message);

        let orders = h.store.snapshot().orders;
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].id, "r2");
        let expected: DateTime<Utc> = "2026-10-02T03:04:05Z".parse().unwrap();
        assert_eq!(orders[1].timestamp, expected);
    }

    #[tokio::test]
    async fn test_pull_with_unreadable_rows_keeps_local_data() {
        let h = harness();
        let order = place_order(&h.store);
        h.backend.seed(
            TABLE_ORDERS,
            vec![
                json!({"id": "r1", "total": 18, "status": "pending",
                       "timestamp": "2026-10-02T03:04:05Z", "order_number": "001"}),
                json!({"id": "r2", "total": 18, "timestamp": "last tuesday",
                       "order_number": "002"}),
            ],
        );
        h.engine.probe().await;
        let report = h.engine.pull_all().await;
        assert!(!report.success);
        assert!(report.message.contains("rows in orders"), "{}", report.message);

        let local = h.store.storage().all_local_data().unwrap();
        assert_eq!(local.orders.len(), 1);
        assert_eq!(local.orders[0].id, order.id);
        assert_eq!(local.drinks.len(), 8);
        assert_eq!(h.store.snapshot().orders[0].id, order.id);

        let status = h.engine.status();
        assert!(!status.syncing);
        assert!(status.error.is_some());
        assert!(!h.store.storage().sync_initialized());
    }

    #[tokio::test]
    async fn test_pull_keeps_local_menu_when_remote_is_empty() {
        let h = harness();
        h.engine.probe().await;
        assert!(h.engine.pull_all().await.success);
        assert_eq!(h.store.snapshot().drinks.len(), 8);
    }

    #[tokio::test]
    async fn test_full_sync_is_exclusive() {
        let h = harness();
        h.engine.probe().await;
        assert!(h.engine.state.begin_sync());
        let report = h.engine.pull_all().await;
        assert!(!report.success);
        assert!(report.message.contains("already in progress"));
    }

    #[tokio::test]
    async fn test_init_auto_sync_runs_once() {
        let h = harness();
        h.engine.init_auto_sync().await;
        assert!(h.store.storage().sync_initialized());
        let calls = h.backend.calls().len();
        assert!(calls >= 5);

        h.engine.init_auto_sync().await;
        assert_eq!(h.backend.calls().len(), calls);
    }

    #[tokio::test]
    async fn test_unconfigured_engine_stays_offline() {
        let h = harness();
        h.engine.set_cloud(None);
        assert!(!h.engine.probe().await);
        let report = h.engine.push_all().await;
        assert!(!report.success);
        assert!(report.message.contains("not configured"));
    }

    #[tokio::test]
    async fn test_status_sink_receives_updates() {
        let backend = Arc::new(MemoryBackend::default());
        let store = Arc::new(Store::load(memory_storage()).unwrap());
        let seen = Arc::new(Mutex::new(Vec::<SyncStatus>::new()));
        let sink = seen.clone();
        let engine = SyncEngine::new(
            store,
            Some(CloudApi::new(backend)),
            SyncSettings::default(),
        )
        .with_status_sink(move |s| sink.lock().unwrap().push(s.clone()));

        engine.probe().await;
        engine.push_all().await;

        let seen = seen.lock().unwrap();
        assert!(seen[0].is_online);
        assert!(seen.iter().any(|s| s.syncing));
        assert!(!seen.last().unwrap().syncing);
    }

    #[tokio::test]
    async fn test_outbox_worker_runs_until_senders_are_dropped() {
        let backend = Arc::new(MemoryBackend::default());
        let store = Arc::new(Store::load(memory_storage()).unwrap());
        let engine = Arc::new(SyncEngine::new(
            store,
            Some(CloudApi::new(backend.clone())),
            SyncSettings::default(),
        ));
        engine.probe().await;

        let (outbox, rx) = SyncOutbox::channel();
        let worker = tokio::spawn(engine.clone().run_outbox(rx));
        outbox.send(SyncOp::DeleteDrink("coffee".into()));
        outbox.send(SyncOp::UpdateOrderStatus {
            order_id: "o-1".into(),
            status: OrderStatus::Completed,
        });
        drop(outbox);

        tokio::time::timeout(Duration::from_secs(5), worker)
            .await
            .expect("worker should stop once the outbox is dropped")
            .unwrap();
        assert_eq!(
            backend.calls(),
            vec!["delete drinks id=coffee", "update orders id=o-1"]
        );
        assert!(engine.status().last_sync.is_some());
    }

    fn drink_pushes(backend: &MemoryBackend) -> usize {
        backend
            .calls()
            .iter()
            .filter(|c| c.as_str() == "upsert drinks x8")
            .count()
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_triggers_a_delayed_push() {
        let h = harness();
        h.backend.set_offline(true);
        let running = tokio::spawn(h.engine.clone().run_connectivity_loop());

        sleep(Duration::from_millis(500)).await;
        assert!(!h.engine.status().is_online);
        assert_eq!(drink_pushes(&h.backend), 0);

        // Back online; noticed on the next 15 s check, pushed 1 s later.
        h.backend.set_offline(false);
        sleep(Duration::from_secs(15)).await;
        assert!(h.engine.status().is_online);
        assert_eq!(drink_pushes(&h.backend), 0);

        sleep(Duration::from_secs(1)).await;
        assert_eq!(drink_pushes(&h.backend), 1);

        h.engine.stop();
        running.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_push_only_while_online() {
        let h = harness();
        let running = tokio::spawn(h.engine.clone().run_connectivity_loop());

        // Online at start counts as a reconnect.
        sleep(Duration::from_millis(1500)).await;
        assert_eq!(drink_pushes(&h.backend), 1);

        sleep(Duration::from_secs(300)).await;
        assert_eq!(drink_pushes(&h.backend), 2);

        h.backend.set_offline(true);
        sleep(Duration::from_secs(300)).await;
        assert!(!h.engine.status().is_online);
        assert_eq!(drink_pushes(&h.backend), 2);

        h.engine.stop();
        running.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_connectivity_loop_runs_once_and_stops() {
        let h = harness();
        let running = tokio::spawn(h.engine.clone().run_connectivity_loop());
        sleep(Duration::from_millis(10)).await;
        assert!(h.engine.state.is_running.load(Ordering::SeqCst));

        // A second loop returns straight away.
        tokio::time::timeout(
            Duration::from_millis(1),
            h.engine.clone().run_connectivity_loop(),
        )
        .await
        .expect("second loop should return immediately");

        h.engine.stop();
        tokio::time::timeout(Duration::from_secs(30), running)
            .await
            .expect("loop should stop after the next tick")
            .unwrap();
        assert!(!h.engine.state.is_running.load(Ordering::SeqCst));
    }

    #[test]
    fn test_sync_status_serializes_camel_case() {
        let value = serde_json::to_value(SyncStatus {
            is_online: true,
            last_sync: Some("2026-10-01T00:00:00.000Z".into()),
            syncing: false,
            error: None,
        })
        .unwrap();
        assert_eq!(value["isOnline"], true);
        assert_eq!(value["lastSync"], "2026-10-01T00:00:00.000Z");
        assert!(value["error"].is_null());
    }
}
