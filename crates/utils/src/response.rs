use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Envelope every rota API endpoint wraps its payload in.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(default)]
    pub message: Option<String>,
    /// Machine-readable failure reason, e.g. `LEAVE_COLLISION`
    #[serde(default)]
    pub error_code: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            error_code: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message.into()),
            error_code: None,
        }
    }

    pub fn error_with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message.into()),
            error_code: Some(code.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn into_data(self) -> Option<T> {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_with_code_round_trip() {
        let resp: ApiResponse<()> = ApiResponse::error_with_code("LEAVE_COLLISION", "overlaps");
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error_code"], "LEAVE_COLLISION");
    }

    #[test]
    fn test_missing_optional_fields_default() {
        let resp: ApiResponse<i32> = serde_json::from_str(r#"{"success":true,"data":7}"#).unwrap();
        assert!(resp.is_success());
        assert_eq!(resp.message, None);
        assert_eq!(resp.into_data(), Some(7));
    }
}
