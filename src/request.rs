//! Request envelopes for the generic endpoints.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::AppError;

/// Single-parameter body: `{ "param": ... }`.
#[derive(Deserialize, Debug)]
pub struct BaseRequest<T> {
    pub param: T,
}

/// Entity-plus-condition body for conditional updates:
/// `{ "entity": {...}, "param": { query } }`.
#[derive(Deserialize, Debug)]
pub struct MapRequest<T> {
    pub entity: Map<String, Value>,
    pub param: T,
}

/// Paged query body: `{ "pageNum": 1, "pageSize": 20, "param": { query } }`.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest<T> {
    pub page_num: u64,
    pub page_size: u64,
    pub param: T,
}

impl<T> PageRequest<T> {
    pub const MAX_PAGE_SIZE: u64 = 1000;

    /// Page bounds are checked before any storage call.
    pub fn validate(&self) -> Result<(), AppError> {
        let mut messages = Vec::new();
        if self.page_num < 1 {
            messages.push("pageNum must be at least 1".to_string());
        }
        if self.page_size < 1 {
            messages.push("pageSize must be at least 1".to_string());
        }
        if self.page_size > Self::MAX_PAGE_SIZE {
            messages.push(format!("pageSize must be at most {}", Self::MAX_PAGE_SIZE));
        }
        // The row offset is pageNum * pageSize at most; anything that cannot
        // be represented is out of range.
        if self.page_num.checked_mul(self.page_size.max(1)).is_none() {
            messages.push("pageNum is out of range".to_string());
        }
        if messages.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(messages.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_request_bounds() {
        let ok = PageRequest {
            page_num: 1,
            page_size: 20,
            param: (),
        };
        assert!(ok.validate().is_ok());

        let bad = PageRequest {
            page_num: 0,
            page_size: 2000,
            param: (),
        };
        let err = bad.validate().unwrap_err().to_string();
        assert!(err.contains("pageNum must be at least 1"));
        assert!(err.contains("; "));
        assert!(err.contains("pageSize must be at most 1000"));
    }

    #[test]
    fn page_request_rejects_overflowing_offset() {
        let huge = PageRequest {
            page_num: u64::MAX,
            page_size: 20,
            param: (),
        };
        let err = huge.validate().unwrap_err().to_string();
        assert!(err.contains("pageNum is out of range"));
    }
}
