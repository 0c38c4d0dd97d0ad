//! Cached dashboard views for one connected wallet.

use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use log::{debug, info};
use parking_lot::RwLock;
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::handlers::{self, Notification};
use crate::ledger::Ledger;
use crate::services::directory::{AccessDirectory, Mutation};
use crate::services::views::{FileEntry, SharedEntry};

#[derive(Debug, Clone, Default)]
pub struct DashboardViews {
    pub owned: Vec<FileEntry>,
    pub shared_with_me: Vec<SharedEntry>,
    pub shared_by_me: Vec<SharedEntry>,
    pub refreshed_at: Option<DateTime<Utc>>,
    pub last_notification: Option<Notification>,
}

type Loaded = (Vec<FileEntry>, Vec<SharedEntry>, Vec<SharedEntry>);

async fn load<L: Ledger>(directory: &AccessDirectory<L>) -> Result<Loaded> {
    tokio::try_join!(
        directory.list_owned_files(),
        directory.list_shared_with_me(),
        directory.list_shared_by_me(),
    )
}

fn apply(state: &RwLock<DashboardViews>, loaded: Result<Loaded>) -> bool {
    let mut views = state.write();
    match loaded {
        Ok((owned, shared_with_me, shared_by_me)) => {
            debug!(
                "dashboard refreshed: {} owned, {} shared with me, {} shared by me",
                owned.len(),
                shared_with_me.len(),
                shared_by_me.len()
            );
            views.owned = owned;
            views.shared_with_me = shared_with_me;
            views.shared_by_me = shared_by_me;
            views.refreshed_at = Some(Utc::now());
            true
        }
        Err(e) => {
            views.last_notification = Some(handlers::notify_error("refresh", &e));
            false
        }
    }
}

pub struct Dashboard<L: Ledger> {
    directory: Arc<AccessDirectory<L>>,
    state: Arc<RwLock<DashboardViews>>,
}

impl<L: Ledger + 'static> Dashboard<L> {
    pub fn new(directory: Arc<AccessDirectory<L>>) -> Self {
        Self { directory, state: Arc::new(RwLock::new(DashboardViews::default())) }
    }

    pub fn directory(&self) -> &AccessDirectory<L> {
        &self.directory
    }

    pub fn views(&self) -> DashboardViews {
        self.state.read().clone()
    }

    /// Reloads all three views. Returns false when the reload failed; the
    /// failure is kept as the last notification and earlier views stay.
    pub async fn refresh(&self) -> bool {
        let loaded = load(&*self.directory).await;
        apply(&self.state, loaded)
    }

    /// Reloads in the background. The task only holds a weak reference to
    /// the cached views, so a result arriving after the dashboard is dropped
    /// is discarded and the task yields false.
    pub fn spawn_refresh(&self) -> JoinHandle<bool> {
        let directory = Arc::clone(&self.directory);
        let state: Weak<RwLock<DashboardViews>> = Arc::downgrade(&self.state);
        tokio::spawn(async move {
            let loaded = load(&*directory).await;
            match state.upgrade() {
                Some(state) => apply(&state, loaded),
                None => {
                    debug!("dashboard dropped before refresh completed");
                    false
                }
            }
        })
    }

    /// Records the outcome of a mutation and reloads the views when it took
    /// effect. The mutation has already been read back by the directory.
    pub async fn after_mutation<T>(&self, action: &str, result: &Result<Mutation<T>>) -> Notification {
        let notification = handlers::notify(action, result);
        info!("{}", notification);
        self.state.write().last_notification = Some(notification.clone());
        if result.is_ok() {
            self.refresh().await;
        }
        notification
    }
}
