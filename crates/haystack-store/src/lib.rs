mod store;

pub use store::{sanitize_model_id, JsonFileStore};
