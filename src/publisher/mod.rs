pub mod api;
pub mod dead_letter;
pub mod object_store;

pub use api::{publish_to_api, ApiClient, ListingApi, PublishSummary};
pub use dead_letter::DeadLetterStore;
pub use object_store::{publish_to_object_store, upload_raw_batch, ObjectPublishOptions, ObjectStore};
