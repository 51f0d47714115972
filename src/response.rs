//! Response envelopes: every endpoint answers `{code, message, data}`,
//! paged queries add a `page` block.

use serde::Serialize;

pub const CODE_OK: u16 = 200;
pub const CODE_ERROR: u16 = 500;

#[derive(Serialize, Debug)]
pub struct ApiResult<T> {
    pub code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResult<T> {
    pub fn success(data: T) -> Self {
        ApiResult {
            code: CODE_OK,
            message: "success".into(),
            data: Some(data),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ApiResult {
            code: CODE_ERROR,
            message: message.into(),
            data: None,
        }
    }
}

/// Pagination metadata echoed back on `selectPage`.
#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub page_size: u64,
    pub current_page: u64,
    pub total: u64,
}

#[derive(Serialize, Debug)]
pub struct PageResult<T> {
    pub code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    pub page: Page,
}

impl<T: Serialize> PageResult<T> {
    pub fn success(data: T, page: Page) -> Self {
        PageResult {
            code: CODE_OK,
            message: "success".into(),
            data: Some(data),
            page,
        }
    }
}
