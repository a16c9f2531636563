// Library exports shared by the CLI and other consumers

pub mod logging;
pub mod state;
pub mod transport;
pub mod version;

pub use state::{AppConfig, AppState, StateError};
pub use transport::{HttpTransport, HttpTransportError};
pub use version::build_info;
