pub mod browser;
pub mod coordinator;
pub mod discovery;
pub mod extractor;
pub mod snapshot;
pub mod traits;

pub use browser::{ChromeLauncher, ChromeSession};
pub use coordinator::{ScrapeCoordinator, ScrapeReport};
pub use discovery::LinkDiscovery;
pub use extractor::DetailExtractor;
pub use traits::{RenderedPage, SessionFactory};
