mod bootstrap;
mod logging;
mod server;

pub use bootstrap::build_context;
pub use logging::initialize as initialize_logging;
pub use server::{exit_on_fatal, router};
