mod local;

pub use local::LocalStore;
pub(crate) use local::{read_json, write_json};
