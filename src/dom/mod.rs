pub mod document;

pub use document::{install_host_document, DomElement, HostDocument, TimerReport, DOM_PRELUDE_JS};
pub(crate) use document::{call_method, js_error_message, js_str, js_to_string};
