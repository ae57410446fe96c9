//! Reconciliation coordinator: event loop, contact refresh worker, publisher
//!
//! ```text
//! engine events ──┐
//!                 ├─> event loop ─> TxLedger ─────────┐
//! contact signals ┘        │                          ├─> Debouncer ─> TxListView
//!                          └─> RefreshGate ─> ContactResolver ┘
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{ContactSignal, CoordinatorError, Debouncer, RefreshGate};
use crate::config::Config;
use crate::contacts::resolver::contact_in;
use crate::contacts::{ContactResolver, RefreshOutcome, ResolveError};
use crate::engine::{WalletEngine, WalletEvent};
use crate::ledger::{TxLedger, TxListView};
use crate::model::{ContactDirectory, ContactIdentity, ContactKey, Tx};
use crate::phonebook::{ContactPermission, PhoneBookProvider};
use crate::storage::ContactStore;

/// State shared by the event loop, the refresh worker and the publisher.
struct Shared {
    session_id: String,
    engine: Arc<dyn WalletEngine>,
    ledger: TxLedger,
    resolver: ContactResolver,
    gate: RefreshGate,
    debouncer: Debouncer,
    torn_down: AtomicBool,
    degraded: AtomicBool,
    required_confirmations: AtomicU64,
    view: watch::Sender<Arc<TxListView>>,
    publications: AtomicU64,
    hide_unnamed: bool,
}

impl Shared {
    /// Rebuilds the ledger from the engine. On failure the old buckets stay
    /// and the view is marked degraded.
    fn refresh_ledger(&self) -> bool {
        match self.ledger.refresh_all(self.engine.as_ref()) {
            Ok(()) => {
                if self.degraded.swap(false, Ordering::SeqCst) {
                    info!(session = %self.session_id, "Ledger recovered");
                }
                true
            }
            Err(e) => {
                self.degraded.store(true, Ordering::SeqCst);
                error!(session = %self.session_id, error = %e, "Ledger refresh failed, keeping stale view");
                false
            }
        }
    }

    fn publish(&self) {
        let directory = self.resolver.snapshot();
        let view = self.ledger.render().enrich(
            |tx| contact_in(&directory, tx),
            self.required_confirmations.load(Ordering::SeqCst),
            self.degraded.load(Ordering::SeqCst),
        );
        let n = self.publications.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(
            pending = view.pending.len(),
            settled = view.settled.len(),
            publication = n,
            "Publishing transaction view"
        );
        self.view.send_replace(Arc::new(view));
    }
}

/// Starts a refresh worker unless one is already running.
fn request_contact_refresh(shared: &Arc<Shared>) {
    if !shared.gate.request() {
        debug!("Contact pass in flight, folding request into it");
        return;
    }
    let shared = Arc::clone(shared);
    tokio::spawn(async move {
        loop {
            while shared.gate.begin_pass() {
                match shared.resolver.refresh(&shared.torn_down).await {
                    RefreshOutcome::Committed => shared.debouncer.signal(),
                    RefreshOutcome::Unchanged | RefreshOutcome::Discarded => {}
                }
            }
            if !shared.gate.release() {
                break;
            }
        }
    });
}

pub struct Coordinator {
    shared: Arc<Shared>,
    signal_buffer: usize,
}

impl Coordinator {
    pub fn new(
        engine: Arc<dyn WalletEngine>,
        provider: Arc<dyn PhoneBookProvider>,
        store: Arc<ContactStore>,
        permission: ContactPermission,
        config: &Config,
    ) -> Self {
        let resolver = ContactResolver::new(
            Arc::clone(&engine),
            provider,
            permission,
            store,
            config.contacts.persist_directory,
        );
        let (view, _) = watch::channel(Arc::new(TxListView {
            required_confirmations: config.ledger.default_required_confirmations,
            ..Default::default()
        }));

        let shared = Shared {
            session_id: config.session.id.clone(),
            engine,
            ledger: TxLedger::new(),
            resolver,
            gate: RefreshGate::new(),
            debouncer: Debouncer::new(Duration::from_millis(config.coordinator.debounce_ms)),
            torn_down: AtomicBool::new(false),
            degraded: AtomicBool::new(false),
            required_confirmations: AtomicU64::new(config.ledger.default_required_confirmations),
            view,
            publications: AtomicU64::new(0),
            hide_unnamed: config.contacts.hide_unnamed_phone_contacts,
        };
        Self {
            shared: Arc::new(shared),
            signal_buffer: config.coordinator.signal_buffer.max(1),
        }
    }

    /// Performs the cold start and spawns the event loop and the publisher.
    pub fn start(self, events: broadcast::Receiver<WalletEvent>) -> CoordinatorHandle {
        let shared = self.shared;
        let (signals_tx, signals_rx) = mpsc::channel(self.signal_buffer);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        match shared.engine.required_confirmation_count() {
            Ok(count) => shared.required_confirmations.store(count, Ordering::SeqCst),
            Err(e) => warn!(
                error = %e,
                fallback = shared.required_confirmations.load(Ordering::SeqCst),
                "Using configured confirmation count"
            ),
        }
        shared.refresh_ledger();
        shared.debouncer.signal();
        request_contact_refresh(&shared);
        info!(session = %shared.session_id, "Coordinator started");

        let publisher = {
            let shared = Arc::clone(&shared);
            let debouncer = shared.debouncer.clone();
            let shutdown = shutdown_rx.clone();
            tokio::spawn(async move { debouncer.run(shutdown, || shared.publish()).await })
        };
        let event_loop = tokio::spawn(run_event_loop(
            Arc::clone(&shared),
            events,
            signals_rx,
            shutdown_rx,
        ));

        CoordinatorHandle {
            shared,
            signals: signals_tx,
            shutdown: shutdown_tx,
            tasks: vec![event_loop, publisher],
        }
    }
}

async fn run_event_loop(
    shared: Arc<Shared>,
    mut events: broadcast::Receiver<WalletEvent>,
    mut signals: mpsc::Receiver<ContactSignal>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            event = events.recv() => match event {
                Ok(event) => handle_event(&shared, event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event stream lagged, rebuilding ledger");
                    shared.refresh_ledger();
                    shared.debouncer.signal();
                    request_contact_refresh(&shared);
                }
                Err(RecvError::Closed) => {
                    info!("Event stream closed");
                    break;
                }
            },
            Some(signal) = signals.recv() => {
                retry_if_degraded(&shared);
                handle_signal(&shared, signal);
            }
        }
    }
    debug!(session = %shared.session_id, "Event loop stopped");
}

fn retry_if_degraded(shared: &Arc<Shared>) {
    if shared.degraded.load(Ordering::SeqCst) && shared.refresh_ledger() {
        shared.debouncer.signal();
    }
}

fn handle_event(shared: &Arc<Shared>, event: WalletEvent) {
    debug!(event = event.name(), "Wallet event");
    match event {
        WalletEvent::Updated => {
            shared.refresh_ledger();
            shared.debouncer.signal();
            request_contact_refresh(shared);
        }
        WalletEvent::TxSendSuccessful(id) => {
            retry_if_degraded(shared);
            match shared.ledger.on_send_success(id, shared.engine.as_ref()) {
                Ok(signal) if signal.is_notify() => shared.debouncer.signal(),
                Ok(_) => {}
                Err(e) => {
                    shared.degraded.store(true, Ordering::SeqCst);
                    error!(tx_id = %id, error = %e, "Ledger refresh after send failed");
                    shared.debouncer.signal();
                }
            }
        }
        event => {
            retry_if_degraded(shared);
            if shared.ledger.apply(&event).is_notify() {
                shared.debouncer.signal();
            }
            request_contact_refresh(shared);
        }
    }
}

fn handle_signal(shared: &Arc<Shared>, signal: ContactSignal) {
    debug!(?signal, "Contact signal");
    match signal {
        ContactSignal::PhoneBookChanged => request_contact_refresh(shared),
        ContactSignal::PermissionGranted => {
            shared.resolver.permission().grant();
            request_contact_refresh(shared);
        }
    }
}

/// Owned access to a running coordinator.
pub struct CoordinatorHandle {
    shared: Arc<Shared>,
    signals: mpsc::Sender<ContactSignal>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl CoordinatorHandle {
    pub fn tx_view(&self) -> watch::Receiver<Arc<TxListView>> {
        self.shared.view.subscribe()
    }

    pub fn latest_view(&self) -> Arc<TxListView> {
        self.shared.view.borrow().clone()
    }

    pub fn contacts(&self) -> watch::Receiver<Arc<ContactDirectory>> {
        self.shared.resolver.subscribe()
    }

    pub fn directory(&self) -> Arc<ContactDirectory> {
        self.shared.resolver.snapshot()
    }

    /// Directory entries for display, honouring the unnamed-contact filter.
    pub fn visible_contacts(&self) -> Vec<ContactIdentity> {
        self.directory()
            .visible(self.shared.hide_unnamed)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn ledger(&self) -> &TxLedger {
        &self.shared.ledger
    }

    /// Number of views published since start.
    pub fn publication_count(&self) -> u64 {
        self.shared.publications.load(Ordering::SeqCst)
    }

    pub fn is_refreshing_contacts(&self) -> bool {
        self.shared.gate.is_in_flight()
    }

    pub fn contact_for_transaction(&self, tx: &Tx) -> ContactIdentity {
        self.shared.resolver.contact_for_transaction(tx)
    }

    pub async fn signal(&self, signal: ContactSignal) -> Result<(), CoordinatorError> {
        self.signals
            .send(signal)
            .await
            .map_err(|_| CoordinatorError::Stopped)
    }

    /// Grants the contacts permission. A pass runs only if it was not
    /// already granted.
    pub fn grant_contact_permission(&self) -> bool {
        let newly = self.shared.resolver.permission().grant();
        if newly {
            info!("Contact permission granted");
            request_contact_refresh(&self.shared);
        }
        newly
    }

    pub async fn link_contacts(
        &self,
        address: &str,
        phone_contact_id: &str,
    ) -> Result<ContactIdentity, ResolveError> {
        let merged = self
            .shared
            .resolver
            .link_contacts(address, phone_contact_id)
            .await?;
        self.shared.debouncer.signal();
        Ok(merged)
    }

    pub async fn unlink_contact(
        &self,
        address: &str,
    ) -> Result<(ContactIdentity, ContactIdentity), ResolveError> {
        let halves = self.shared.resolver.unlink_contact(address).await?;
        self.shared.debouncer.signal();
        Ok(halves)
    }

    /// Toggles the favorite flag and schedules the phone-book write-back.
    pub async fn toggle_favorite(&self, key: &ContactKey) -> Result<ContactIdentity, ResolveError> {
        let entry = self.shared.resolver.toggle_favorite(key).await?;
        self.after_phone_edit(&entry);
        Ok(entry)
    }

    pub async fn update_contact_info(
        &self,
        entry: &ContactIdentity,
        alias: &str,
    ) -> Result<ContactIdentity, ResolveError> {
        let updated = self.shared.resolver.update_contact_info(entry, alias).await?;
        self.after_phone_edit(&updated);
        Ok(updated)
    }

    pub async fn delete_contact(&self, key: &ContactKey) -> Result<ContactIdentity, ResolveError> {
        let removed = self.shared.resolver.delete_contact(key).await?;
        self.shared.debouncer.signal();
        Ok(removed)
    }

    fn after_phone_edit(&self, entry: &ContactIdentity) {
        self.shared.debouncer.signal();
        if entry.phone_half().is_some_and(|p| p.dirty) {
            request_contact_refresh(&self.shared);
        }
    }

    /// Stops both loops. A contact pass still running completes but its
    /// result is dropped.
    pub async fn shutdown(self) {
        self.shared.torn_down.store(true, Ordering::SeqCst);
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Coordinator task ended abnormally");
            }
        }
        info!(session = %self.shared.session_id, "Coordinator stopped");
    }
}
