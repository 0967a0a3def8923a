//! # Guildhall Realtime
//!
//! Change-feed fan-out and network readiness gating.
//!
//! The backing store pushes row-level change notifications for the whole
//! family; this crate classifies them into per-table channels, fans them
//! out to registered listeners, and gates the first network call until
//! the host transport is actually ready.
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use guildhall_core::SourceTable;
//! use guildhall_realtime::{EventBus, ReadinessGate, TransportProfile};
//!
//! let gate = ReadinessGate::new(TransportProfile::Constrained);
//! let bus = EventBus::new(family_id, scope_lookup);
//!
//! let handle = bus.subscribe(SourceTable::QuestInstances, |event| {
//!     println!("quest change: {:?}", event.action);
//! });
//!
//! gate.notify_loaded();           // host load-complete signal
//! gate.wait_ready().await;        // safe to issue the first fetch
//! bus.attach(store.subscribe_changes(&family_id).await?);
//! # Ok::<(), guildhall_core::GuildError>(())
//! ```

pub mod bus;
pub mod gate;
pub mod stream;

pub use bus::{EventBus, Listener, ListenerHandle, ScopeLookup};
pub use gate::{ReadinessGate, TransportProfile};
pub use stream::broadcast_to_stream;
