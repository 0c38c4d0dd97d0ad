pub mod dashboard;
pub mod directory;
pub mod pending;
pub mod upload;
pub mod views;

pub use dashboard::{Dashboard, DashboardViews};
pub use directory::{AccessDirectory, ClientSettings, Mutation, TxOutcome};
pub use pending::{OpClass, PendingGuard, PendingOps};
pub use upload::UploadManifest;
pub use views::{FileEntry, SharedEntry};
