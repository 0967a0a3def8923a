//! Family-scoped change-feed fan-out.
//!
//! One bus per family scope, with an owned lifecycle: constructed on scope
//! activation, torn down on family switch or auth loss. Incoming change
//! records are classified by source table into six channels and delivered
//! synchronously to that channel's listeners, in registration order.
//!
//! Character and member-profile tables are not family-scoped at the
//! transport level; their events are routed through an ordered worker that
//! consults an async membership lookup first, so the lookup can never
//! block dispatch on the other channels or reorder its own.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use guildhall_core::change::{ChangeAction, ChangeEvent, SourceTable};
use guildhall_core::ids::{FamilyId, MemberId};

/// Resolves whether a member belongs to the bus's family scope.
#[async_trait]
pub trait ScopeLookup: Send + Sync {
    async fn member_in_family(&self, family: &FamilyId, member: &MemberId) -> bool;
}

/// Callback registered on a bus channel.
pub type Listener = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

struct ChannelRegistry {
    listeners: Mutex<Vec<(u64, Listener)>>,
}

impl ChannelRegistry {
    fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
        }
    }

    fn add(&self, id: u64, listener: Listener) {
        self.lock().push((id, listener));
    }

    fn remove(&self, id: u64) {
        self.lock().retain(|(listener_id, _)| *listener_id != id);
    }

    fn clear(&self) {
        self.lock().clear();
    }

    fn len(&self) -> usize {
        self.lock().len()
    }

    /// Deliver to a snapshot of the current listeners, in registration
    /// order. Listeners may unsubscribe (themselves or others) while the
    /// snapshot is being walked.
    fn dispatch(&self, event: &ChangeEvent) {
        let snapshot: Vec<Listener> = self
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in snapshot {
            listener(event);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(u64, Listener)>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle returned by [`EventBus::subscribe`]. Unsubscribing is idempotent
/// and safe to call from inside a listener during dispatch.
pub struct ListenerHandle {
    registry: Arc<ChannelRegistry>,
    id: u64,
}

impl ListenerHandle {
    pub fn unsubscribe(&self) {
        self.registry.remove(self.id);
    }
}

fn channel_index(table: SourceTable) -> usize {
    match table {
        SourceTable::QuestInstances => 0,
        SourceTable::QuestTemplates => 1,
        SourceTable::Characters => 2,
        SourceTable::Rewards => 3,
        SourceTable::RewardRedemptions => 4,
        SourceTable::MemberProfiles => 5,
    }
}

/// The realtime fan-out for one family scope.
pub struct EventBus {
    family_id: FamilyId,
    registries: [Arc<ChannelRegistry>; 6],
    next_listener_id: AtomicU64,
    last_event: RwLock<Option<ChangeEvent>>,
    dropped: Arc<AtomicUsize>,
    scoped_senders: Mutex<Vec<(SourceTable, mpsc::UnboundedSender<ChangeEvent>)>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl EventBus {
    /// Create the bus for one family scope and start its scope-filter
    /// workers. Must be called inside a tokio runtime.
    pub fn new(family_id: FamilyId, lookup: Arc<dyn ScopeLookup>) -> Arc<Self> {
        let bus = Arc::new(Self {
            family_id,
            registries: std::array::from_fn(|_| Arc::new(ChannelRegistry::new())),
            next_listener_id: AtomicU64::new(0),
            last_event: RwLock::new(None),
            dropped: Arc::new(AtomicUsize::new(0)),
            scoped_senders: Mutex::new(Vec::new()),
            workers: Mutex::new(Vec::new()),
            pump: Mutex::new(None),
        });

        for table in SourceTable::ALL {
            if !table.needs_scope_lookup() {
                continue;
            }
            let (tx, rx) = mpsc::unbounded_channel();
            let worker = tokio::spawn(scope_worker(
                bus.family_id.clone(),
                Arc::clone(&lookup),
                Arc::clone(&bus.registries[channel_index(table)]),
                Arc::clone(&bus.dropped),
                rx,
            ));
            lock(&bus.scoped_senders).push((table, tx));
            lock(&bus.workers).push(worker);
        }

        bus
    }

    /// Register a listener on one channel. Listeners on the same channel
    /// fire in registration order.
    pub fn subscribe(
        &self,
        channel: SourceTable,
        listener: impl Fn(&ChangeEvent) + Send + Sync + 'static,
    ) -> ListenerHandle {
        let registry = Arc::clone(&self.registries[channel_index(channel)]);
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        registry.add(id, Arc::new(listener));
        ListenerHandle { registry, id }
    }

    /// Classify and fan out one change record.
    pub fn handle_event(&self, event: ChangeEvent) {
        let Some(table) = event.source_table() else {
            debug!(table = %event.table, "ignoring change for unknown table");
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        };

        // Some transport configurations only deliver partial row images on
        // delete; without an identity the event cannot be applied safely.
        if event.action == ChangeAction::Delete && event.old_record_id().is_none() {
            warn!(table = %event.table, "dropping DELETE with no old-record id");
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }

        *self
            .last_event
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(event.clone());

        if table.needs_scope_lookup() {
            let senders = lock(&self.scoped_senders);
            if let Some((_, tx)) = senders.iter().find(|(t, _)| *t == table) {
                let _ = tx.send(event);
            }
            return;
        }

        self.registries[channel_index(table)].dispatch(&event);
    }

    /// Pump a change-event stream into the bus, replacing any previous
    /// pump. Events are not buffered across reconnects: after a teardown
    /// and re-attach, consumers reconcile via a full reload.
    pub fn attach(self: &Arc<Self>, stream: impl Stream<Item = ChangeEvent> + Send + 'static) {
        let bus = Arc::clone(self);
        let handle = tokio::spawn(async move {
            futures::pin_mut!(stream);
            while let Some(event) = stream.next().await {
                bus.handle_event(event);
            }
            debug!("change feed ended");
        });
        if let Some(previous) = lock_pump(&self.pump).replace(handle) {
            previous.abort();
        }
    }

    /// Tear the bus down: stop the pump and workers, drop all listeners.
    pub fn shutdown(&self) {
        if let Some(pump) = lock_pump(&self.pump).take() {
            pump.abort();
        }
        for worker in lock(&self.workers).drain(..) {
            worker.abort();
        }
        lock(&self.scoped_senders).clear();
        for registry in &self.registries {
            registry.clear();
        }
    }

    pub fn family_id(&self) -> &FamilyId {
        &self.family_id
    }

    /// Most recent event accepted for dispatch, for diagnostics.
    pub fn last_event(&self) -> Option<ChangeEvent> {
        self.last_event
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Count of events dropped by classification or malformed-event
    /// policy.
    pub fn dropped_events(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn listener_count(&self, channel: SourceTable) -> usize {
        self.registries[channel_index(channel)].len()
    }
}

impl Drop for EventBus {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn lock<T>(mutex: &Mutex<Vec<T>>) -> std::sync::MutexGuard<'_, Vec<T>> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn lock_pump(mutex: &Mutex<Option<JoinHandle<()>>>) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Ordered delivery for one scope-checked channel. A single consumer per
/// channel keeps arrival order while the membership lookup awaits.
async fn scope_worker(
    family: FamilyId,
    lookup: Arc<dyn ScopeLookup>,
    registry: Arc<ChannelRegistry>,
    dropped: Arc<AtomicUsize>,
    mut rx: mpsc::UnboundedReceiver<ChangeEvent>,
) {
    while let Some(event) = rx.recv().await {
        let owner = event.owning_member_id().map(MemberId::from);
        match owner {
            Some(member) => {
                if lookup.member_in_family(&family, &member).await {
                    registry.dispatch(&event);
                } else {
                    debug!(table = %event.table, "change outside family scope");
                    dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
            // Partial images (some DELETEs) cannot be scope-checked;
            // deliver them and let consumers no-op on unknown ids.
            None => registry.dispatch(&event),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    struct OpenLookup;

    #[async_trait]
    impl ScopeLookup for OpenLookup {
        async fn member_in_family(&self, _family: &FamilyId, _member: &MemberId) -> bool {
            true
        }
    }

    /// Lookup with an artificial delay and a fixed allow-list.
    struct SlowLookup {
        allowed: Vec<MemberId>,
        delay: Duration,
    }

    #[async_trait]
    impl ScopeLookup for SlowLookup {
        async fn member_in_family(&self, _family: &FamilyId, member: &MemberId) -> bool {
            tokio::time::sleep(self.delay).await;
            self.allowed.contains(member)
        }
    }

    fn family() -> FamilyId {
        FamilyId::from("fam-1")
    }

    fn quest_event(id: &str) -> ChangeEvent {
        ChangeEvent::insert(
            SourceTable::QuestInstances,
            json!({"id": id, "family_id": "fam-1"}),
        )
    }

    fn character_event(id: &str, member: &str) -> ChangeEvent {
        ChangeEvent::update(
            SourceTable::Characters,
            json!({"id": id, "member_id": member}),
            None,
        )
    }

    #[tokio::test]
    async fn test_listeners_fire_in_registration_order() {
        let bus = EventBus::new(family(), Arc::new(OpenLookup));
        let seen = Arc::new(Mutex::new(Vec::new()));

        for label in ["first", "second", "third"] {
            let seen = Arc::clone(&seen);
            bus.subscribe(SourceTable::QuestInstances, move |_event| {
                seen.lock().unwrap().push(label);
            });
        }

        bus.handle_event(quest_event("q1"));
        assert_eq!(*seen.lock().unwrap(), ["first", "second", "third"]);
        assert_eq!(bus.listener_count(SourceTable::QuestInstances), 3);
    }

    #[tokio::test]
    async fn test_unsubscribe_is_idempotent_and_safe_during_dispatch() {
        let bus = EventBus::new(family(), Arc::new(OpenLookup));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let second_handle: Arc<Mutex<Option<ListenerHandle>>> = Arc::new(Mutex::new(None));

        {
            let seen = Arc::clone(&seen);
            let second_handle = Arc::clone(&second_handle);
            bus.subscribe(SourceTable::QuestInstances, move |_| {
                seen.lock().unwrap().push("first");
                // Unsubscribe the other listener mid-dispatch.
                if let Some(handle) = second_handle.lock().unwrap().as_ref() {
                    handle.unsubscribe();
                    handle.unsubscribe();
                }
            });
        }
        {
            let seen = Arc::clone(&seen);
            let handle = bus.subscribe(SourceTable::QuestInstances, move |_| {
                seen.lock().unwrap().push("second");
            });
            *second_handle.lock().unwrap() = Some(handle);
        }

        // The dispatch snapshot still includes the second listener.
        bus.handle_event(quest_event("q1"));
        assert_eq!(*seen.lock().unwrap(), ["first", "second"]);

        // It is gone for subsequent events.
        bus.handle_event(quest_event("q2"));
        assert_eq!(*seen.lock().unwrap(), ["first", "second", "first"]);
    }

    #[tokio::test]
    async fn test_malformed_delete_is_dropped() {
        let bus = EventBus::new(family(), Arc::new(OpenLookup));
        let calls = Arc::new(AtomicUsize::new(0));
        {
            let calls = Arc::clone(&calls);
            bus.subscribe(SourceTable::QuestInstances, move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
            });
        }

        bus.handle_event(ChangeEvent::delete(SourceTable::QuestInstances, json!({})));

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(bus.dropped_events(), 1);
        assert!(bus.last_event().is_none(), "malformed events never reach diagnostics state");
    }

    #[tokio::test]
    async fn test_unknown_table_is_dropped() {
        let bus = EventBus::new(family(), Arc::new(OpenLookup));
        let event = ChangeEvent {
            action: ChangeAction::Insert,
            table: "mystery_table".to_string(),
            record: json!({"id": "x"}),
            old_record: None,
        };
        bus.handle_event(event);
        assert_eq!(bus.dropped_events(), 1);
    }

    #[tokio::test]
    async fn test_scoped_channel_filters_by_family_and_keeps_order() {
        let lookup = SlowLookup {
            allowed: vec![MemberId::from("hero-a"), MemberId::from("hero-b")],
            delay: Duration::from_millis(10),
        };
        let bus = EventBus::new(family(), Arc::new(lookup));
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = Arc::clone(&seen);
            bus.subscribe(SourceTable::Characters, move |event| {
                seen.lock()
                    .unwrap()
                    .push(event.record_id().unwrap_or_default().to_string());
            });
        }

        bus.handle_event(character_event("char-1", "hero-a"));
        bus.handle_event(character_event("char-2", "stranger"));
        bus.handle_event(character_event("char-3", "hero-b"));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(*seen.lock().unwrap(), ["char-1", "char-3"]);
        assert_eq!(bus.dropped_events(), 1);
    }

    #[tokio::test]
    async fn test_scoped_lookup_does_not_block_other_channels() {
        let lookup = SlowLookup {
            allowed: vec![MemberId::from("hero-a")],
            delay: Duration::from_millis(100),
        };
        let bus = EventBus::new(family(), Arc::new(lookup));
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = Arc::clone(&seen);
            bus.subscribe(SourceTable::Characters, move |_| {
                seen.lock().unwrap().push("character");
            });
        }
        {
            let seen = Arc::clone(&seen);
            bus.subscribe(SourceTable::QuestInstances, move |_| {
                seen.lock().unwrap().push("quest");
            });
        }

        // The character event enters its worker queue first, but the quest
        // event must not wait behind its lookup.
        bus.handle_event(character_event("char-1", "hero-a"));
        bus.handle_event(quest_event("q1"));
        assert_eq!(*seen.lock().unwrap(), ["quest"]);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(*seen.lock().unwrap(), ["quest", "character"]);
    }

    #[tokio::test]
    async fn test_attach_and_shutdown() {
        let bus = EventBus::new(family(), Arc::new(OpenLookup));
        let calls = Arc::new(AtomicUsize::new(0));
        {
            let calls = Arc::clone(&calls);
            bus.subscribe(SourceTable::QuestInstances, move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
            });
        }

        let (tx, rx) = tokio::sync::broadcast::channel(16);
        bus.attach(crate::stream::broadcast_to_stream(rx));

        tx.send(quest_event("q1")).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        bus.shutdown();
        let _ = tx.send(quest_event("q2"));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1, "no delivery after teardown");
        assert_eq!(bus.listener_count(SourceTable::QuestInstances), 0);
    }
}
