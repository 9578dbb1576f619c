pub mod queue;
pub mod store;

pub use queue::{DrainReport, PendingScreenshot, ScreenshotQueue};
pub use store::{ArtifactListing, ArtifactStore, StoredScreenshot};
