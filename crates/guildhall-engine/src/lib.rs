//! # Guildhall Engine
//!
//! Store access, mutation coordination, and the reactive quest board.
//!
//! This crate turns the pure rules in `guildhall-core` and the fan-out in
//! `guildhall-realtime` into a working client engine: a
//! [`FamilySession`] owns one family scope, its [`QuestBoard`] holds the
//! deduplicated snapshot and derived views, and its [`QuestCoordinator`]
//! executes role-validated actions against the remote store with
//! reload-on-settle reconciliation.
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use guildhall_core::{Actor, FamilyId};
//! use guildhall_engine::{FamilySession, MemoryStore};
//! use guildhall_realtime::TransportProfile;
//!
//! let store = Arc::new(MemoryStore::new());
//! let session = FamilySession::new(
//!     FamilyId::from("fam-1"),
//!     Actor::hero("hero-a"),
//!     store,
//!     TransportProfile::Constrained,
//! );
//!
//! session.gate().notify_loaded();     // host load-complete signal
//! session.activate().await?;          // initial load + feed attach
//!
//! session.coordinator().pickup(&quest_id).await?;
//! for quest in session.board().claimable_family() {
//!     println!("{}", quest.title);
//! }
//! # Ok::<(), guildhall_core::GuildError>(())
//! ```

pub mod board;
pub mod coordinator;
pub mod memory_store;
pub mod retry;
pub mod session;
pub mod single_flight;
pub mod store;

pub use board::{BoardSubscription, QuestBoard, ReloadOutcome};
pub use coordinator::QuestCoordinator;
pub use memory_store::MemoryStore;
pub use retry::{with_backoff, RetryPolicy};
pub use session::FamilySession;
pub use single_flight::{Admission, FetchGuard, Generation};
pub use store::{ChangeStream, QuestStore};
