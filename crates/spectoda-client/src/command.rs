//! Queued commands
//!
//! Each command owns a [`Deferred`] result slot. A slot settles at most once:
//! whichever of the drain loop, a coalescing decision or the caller's timeout
//! guard gets there first wins, and every later settle is ignored.

use bytes::Bytes;
use parking_lot::Mutex;
use spectoda_connector::{ConnectedInfo, DeviceInfo, SelectedInfo, SelectionCriteria};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

use crate::error::{ClientError, Result};

/// Resolve-once result slot shared between a command and its caller
pub(crate) struct Deferred<T> {
    slot: Arc<Mutex<Option<oneshot::Sender<Result<T>>>>>,
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> Deferred<T> {
    pub(crate) fn new() -> (Self, oneshot::Receiver<Result<T>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                slot: Arc::new(Mutex::new(Some(tx))),
            },
            rx,
        )
    }

    /// Settle the slot, returning false when it was already settled
    pub(crate) fn settle(&self, result: Result<T>) -> bool {
        match self.slot.lock().take() {
            // The receiver may be gone; the slot still counts as settled
            Some(tx) => {
                let _ = tx.send(result);
                true
            }
            None => false,
        }
    }

    pub(crate) fn resolve(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    pub(crate) fn reject(&self, error: ClientError) -> bool {
        self.settle(Err(error))
    }

    pub(crate) fn is_settled(&self) -> bool {
        self.slot.lock().is_none()
    }

    pub(crate) fn same_as(&self, other: &Deferred<T>) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }
}

/// A unit of work for the drain loop
pub(crate) enum Command {
    Execute {
        payload: Bytes,
        /// Coalescing key; a newer execute with the same key replaces this one
        key: Option<String>,
        done: Deferred<()>,
    },
    Deliver {
        payload: Bytes,
        timeout: Duration,
        done: Deferred<()>,
    },
    Transmit {
        payload: Bytes,
        timeout: Duration,
        done: Deferred<()>,
    },
    UserSelect {
        criteria: Vec<SelectionCriteria>,
        timeout: Duration,
        done: Deferred<SelectedInfo>,
    },
    AutoSelect {
        criteria: Vec<SelectionCriteria>,
        scan_duration: Duration,
        timeout: Duration,
        done: Deferred<SelectedInfo>,
    },
    Selected {
        done: Deferred<Option<SelectedInfo>>,
    },
    Unselect {
        done: Deferred<()>,
    },
    Scan {
        criteria: Vec<SelectionCriteria>,
        scan_duration: Duration,
        done: Deferred<Vec<DeviceInfo>>,
    },
    Connect {
        timeout: Duration,
        done: Deferred<ConnectedInfo>,
    },
    Connected {
        done: Deferred<Option<ConnectedInfo>>,
    },
    Disconnect {
        done: Deferred<()>,
    },
    Request {
        payload: Bytes,
        read_response: bool,
        timeout: Duration,
        done: Deferred<Option<Bytes>>,
    },
    SetClock {
        clock: u64,
        done: Deferred<()>,
    },
    GetClock {
        done: Deferred<u64>,
    },
    FirmwareUpdate {
        firmware: Bytes,
        done: Deferred<()>,
    },
    DestroyConnector {
        done: Deferred<()>,
    },
}

impl Command {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Command::Execute { .. } => "execute",
            Command::Deliver { .. } => "deliver",
            Command::Transmit { .. } => "transmit",
            Command::UserSelect { .. } => "user_select",
            Command::AutoSelect { .. } => "auto_select",
            Command::Selected { .. } => "selected",
            Command::Unselect { .. } => "unselect",
            Command::Scan { .. } => "scan",
            Command::Connect { .. } => "connect",
            Command::Connected { .. } => "connected",
            Command::Disconnect { .. } => "disconnect",
            Command::Request { .. } => "request",
            Command::SetClock { .. } => "set_clock",
            Command::GetClock { .. } => "get_clock",
            Command::FirmwareUpdate { .. } => "firmware_update",
            Command::DestroyConnector { .. } => "destroy_connector",
        }
    }

    /// Reject the command without dispatching it
    pub(crate) fn reject(self, error: ClientError) {
        match self {
            Command::Execute { done, .. }
            | Command::Deliver { done, .. }
            | Command::Transmit { done, .. }
            | Command::Unselect { done }
            | Command::Disconnect { done }
            | Command::SetClock { done, .. }
            | Command::FirmwareUpdate { done, .. }
            | Command::DestroyConnector { done } => {
                done.reject(error);
            }
            Command::UserSelect { done, .. } | Command::AutoSelect { done, .. } => {
                done.reject(error);
            }
            Command::Selected { done } => {
                done.reject(error);
            }
            Command::Scan { done, .. } => {
                done.reject(error);
            }
            Command::Connect { done, .. } => {
                done.reject(error);
            }
            Command::Connected { done } => {
                done.reject(error);
            }
            Command::Request { done, .. } => {
                done.reject(error);
            }
            Command::GetClock { done } => {
                done.reject(error);
            }
        }
    }
}
