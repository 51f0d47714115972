//! Envelope field filling applied ahead of each storage write.

use chrono::Utc;
use std::sync::Arc;

use crate::id::IdGenerator;
use crate::record::{Record, NORMAL_ALIVE};

/// Hook that completes a record's envelope fields before it is written.
pub trait RepositoryHandler: Send + Sync {
    /// Fill before INSERT. Must leave the record with a usable id.
    fn insert_fill(&self, record: &mut Record);

    /// Fill before any UPDATE.
    fn update_fill(&self, record: &mut Record);
}

/// Default fill policy.
///
/// On insert: generate an id when the caller supplied none, default `normal`
/// to alive, stamp `version` with the row id and `update_time` with now. The
/// version always tracks the id on insert, even when the caller sent one.
///
/// On update: stamp a fresh `version` only when the caller supplied none, and
/// always refresh `update_time`.
pub struct DefaultRepositoryHandler {
    ids: Arc<dyn IdGenerator>,
}

impl DefaultRepositoryHandler {
    pub fn new(ids: Arc<dyn IdGenerator>) -> Self {
        DefaultRepositoryHandler { ids }
    }
}

impl RepositoryHandler for DefaultRepositoryHandler {
    fn insert_fill(&self, record: &mut Record) {
        let id = match record.id() {
            Some(id) => id,
            None => {
                let id = self.ids.next_id();
                record.set_id(id);
                id
            }
        };
        if record.normal().is_none() {
            record.set_normal(NORMAL_ALIVE);
        }
        record.set_version(id);
        record.set_update_time(Utc::now());
    }

    fn update_fill(&self, record: &mut Record) {
        if record.version().is_none() {
            record.set_version(self.ids.next_id());
        }
        record.set_update_time(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::SnowflakeIdGenerator;
    use serde_json::json;

    fn handler() -> DefaultRepositoryHandler {
        DefaultRepositoryHandler::new(Arc::new(SnowflakeIdGenerator::new(1)))
    }

    #[test]
    fn insert_fill_generates_missing_envelope() {
        let mut record = Record::new();
        record.set("name", json!("a"));
        handler().insert_fill(&mut record);
        let id = record.id().unwrap();
        assert_eq!(record.normal(), Some(NORMAL_ALIVE));
        assert_eq!(record.version(), Some(id));
        assert!(record.update_time().is_some());
    }

    #[test]
    fn insert_fill_keeps_caller_id_and_normal() {
        let mut record = Record::new();
        record.set_id(42);
        record.set_normal(0);
        handler().insert_fill(&mut record);
        assert_eq!(record.id(), Some(42));
        assert_eq!(record.normal(), Some(0));
        // version follows the id regardless of what the caller sent
        assert_eq!(record.version(), Some(42));
    }

    #[test]
    fn update_fill_respects_caller_version() {
        let mut record = Record::new();
        record.set_version(7);
        handler().update_fill(&mut record);
        assert_eq!(record.version(), Some(7));
        assert!(record.update_time().is_some());

        let mut record = Record::new();
        handler().update_fill(&mut record);
        assert!(record.version().is_some());
    }
}
