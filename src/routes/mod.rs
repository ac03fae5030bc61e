mod fallback;

pub use fallback::{method_not_allowed, not_found, preflight, text_response};
