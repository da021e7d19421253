//! Outbound product-update notifications to the ordering service, plus the
//! outbox that holds batches the notifier could not deliver.

pub mod facade;
pub mod models;
pub mod outbox;
pub mod relay;

pub use facade::{OrderNotifier, ProductOrderFacade};
pub use models::ProductUpdate;
pub use outbox::{MemoryOutbox, NotificationOutbox, OutboxEntry, PgOutbox};
pub use relay::{OutboxRelay, RelaySummary};
