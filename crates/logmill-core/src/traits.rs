use serde_json::{Map, Value};

use crate::log_entry::ErrorDetail;

/// Seam for error-code libraries whose values are logged as structured payloads
///
/// Implementors expose their code, classification and custom fields; the
/// encoder flattens them into the event via [`StructuredError::detail`].
pub trait StructuredError {
    /// Numeric error code
    fn code(&self) -> i64;

    /// Default text of the code
    fn code_message(&self) -> &str;

    /// Error category label (system, business, ...)
    fn error_type(&self) -> &str;

    /// Component or service that produced the error
    fn service(&self) -> &str;

    fn success(&self) -> bool {
        false
    }

    /// Custom fields attached to the error
    fn fields(&self) -> Map<String, Value> {
        Map::new()
    }

    /// Message overriding the code's default text
    fn message(&self) -> Option<&str> {
        None
    }

    fn detail(&self) -> ErrorDetail {
        ErrorDetail {
            code: self.code(),
            code_msg: self.code_message().to_string(),
            err_type: self.error_type().to_string(),
            service: self.service().to_string(),
            success: self.success(),
            fields: self.fields(),
            message: self
                .message()
                .filter(|m| !m.is_empty())
                .map(str::to_string),
        }
    }
}
