pub mod headers;
pub mod logging;

pub use headers::build_request_headers;
pub use logging::{init, truncate_text};
