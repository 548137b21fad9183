pub mod migrate;
pub mod status;
pub mod version;

pub use migrate::Migrate;
pub use status::Status;
pub use version::Version;
