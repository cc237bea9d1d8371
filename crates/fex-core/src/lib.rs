pub mod document;
pub mod error;
pub mod fs;
pub mod net;
pub mod resources;

pub use document::{DescriptionEntry, Descriptions, Document, MetaData, Parameters};
pub use error::{Error, Result};
pub use fs::{ensure_dir, write_text};
pub use net::find_open_port;
pub use resources::{http_client, load_local, load_url, FileReference};
