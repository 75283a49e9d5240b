//! Delivery of grid events to persistence.
//!
//! The grid never waits on storage. Hosts drain its queued events and pass
//! them to [`dispatch`] (inline) or [`spawn_dispatch`] (detached blocking
//! task). Every outcome ends up on a [`NotificationSink`].

use log::warn;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use crate::batch::{RowUpdate, ValidationError};
use crate::grid::{ChangedRow, GridEvent};
use crate::saving::{BatchStore, StoreError};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("request rejected: {0}")]
    Rejected(String),
}

/// Where the grid's column order and edits are persisted
pub trait PersistenceGateway {
    fn reorder_columns(&self, order: &[String]) -> Result<(), GatewayError>;

    /// Returns the number of rows written
    fn save_rows(&self, rows: &[ChangedRow]) -> Result<usize, GatewayError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    #[default]
    Default,
    Destructive,
}

/// A transient message for the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub description: String,
    pub variant: Variant,
}

impl Notification {
    pub fn success(title: impl Into<String>, description: impl Into<String>) -> Self {
        Notification {
            title: title.into(),
            description: description.into(),
            variant: Variant::Default,
        }
    }

    pub fn error(description: impl Into<String>) -> Self {
        Notification {
            title: "Error".to_string(),
            description: description.into(),
            variant: Variant::Destructive,
        }
    }

    pub fn is_error(&self) -> bool {
        self.variant == Variant::Destructive
    }
}

pub trait NotificationSink {
    fn notify(&self, notification: Notification);
}

impl NotificationSink for UnboundedSender<Notification> {
    fn notify(&self, notification: Notification) {
        if self.send(notification).is_err() {
            warn!("notification dropped: receiver is gone");
        }
    }
}

impl NotificationSink for Mutex<Vec<Notification>> {
    fn notify(&self, notification: Notification) {
        self.lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(notification);
    }
}

/// Sends each event to the gateway in order and reports every outcome
///
/// Returns the number of events that failed. Nothing is retried or rolled
/// back.
pub fn dispatch<G, S>(events: Vec<GridEvent>, gateway: &G, sink: &S) -> usize
where
    G: PersistenceGateway + ?Sized,
    S: NotificationSink + ?Sized,
{
    let mut failures = 0;
    for event in events {
        let notification = match event {
            GridEvent::ColumnsReordered(order) => match gateway.reorder_columns(&order) {
                Ok(()) => Notification::success("Success", "Column order updated"),
                Err(e) => {
                    failures += 1;
                    Notification::error(format!("Failed to update column order: {}", e))
                }
            },
            GridEvent::SaveRequested(rows) => match gateway.save_rows(&rows) {
                Ok(count) => Notification::success(
                    "Success",
                    format!("{} row{} updated", count, if count == 1 { "" } else { "s" }),
                ),
                Err(e) => {
                    failures += 1;
                    Notification::error(format!("Failed to save changes: {}", e))
                }
            },
        };
        sink.notify(notification);
    }
    failures
}

/// Runs [`dispatch`] on a blocking tokio task without waiting for it
pub fn spawn_dispatch<G, S>(events: Vec<GridEvent>, gateway: G, sink: S) -> JoinHandle<usize>
where
    G: PersistenceGateway + Send + 'static,
    S: NotificationSink + Send + 'static,
{
    tokio::task::spawn_blocking(move || dispatch(events, &gateway, &sink))
}

/// Gateway writing to one batch of a [`BatchStore`]
#[derive(Debug, Clone)]
pub struct StoreGateway {
    store: BatchStore,
    user: String,
    batch_id: u64,
}

impl StoreGateway {
    pub fn new(store: BatchStore, user: impl Into<String>, batch_id: u64) -> Self {
        StoreGateway {
            store,
            user: user.into(),
            batch_id,
        }
    }
}

impl PersistenceGateway for StoreGateway {
    fn reorder_columns(&self, order: &[String]) -> Result<(), GatewayError> {
        self.store
            .reorder_columns(&self.user, self.batch_id, order)?;
        Ok(())
    }

    fn save_rows(&self, rows: &[ChangedRow]) -> Result<usize, GatewayError> {
        let updates = rows
            .iter()
            .map(|row| RowUpdate::from_grid_row(row.fields.clone()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.store.update_rows(&self.user, updates)?)
    }
}
