// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory session store that counts pairing-code writes.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use switchboard_core::{ConnectionStatus, SessionRecord, SessionStore, SwitchboardError};

/// A [`SessionStore`] backed by a map, with the same no-op-on-absent
/// semantics as the SQLite store.
pub struct CountingSessionStore {
    rows: Mutex<HashMap<String, SessionRecord>>,
    pairing_code_writes: AtomicU32,
}

impl CountingSessionStore {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(HashMap::new()),
            pairing_code_writes: AtomicU32::new(0),
        }
    }

    pub fn session(&self, id: &str) -> Option<SessionRecord> {
        self.rows.lock().unwrap().get(id).cloned()
    }

    /// Writes that stored a code; clears are not counted.
    pub fn pairing_code_writes(&self) -> u32 {
        self.pairing_code_writes.load(Ordering::SeqCst)
    }

    fn update(&self, id: &str, apply: impl FnOnce(&mut SessionRecord)) {
        if let Some(row) = self.rows.lock().unwrap().get_mut(id) {
            apply(row);
            row.updated_at = Utc::now();
        }
    }
}

impl Default for CountingSessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for CountingSessionStore {
    async fn upsert_session(&self, record: &SessionRecord) -> Result<(), SwitchboardError> {
        let mut rows = self.rows.lock().unwrap();
        let created_at = rows.get(&record.id).map(|r| r.created_at);
        let mut record = record.clone();
        if let Some(created_at) = created_at {
            record.created_at = created_at;
        }
        record.updated_at = Utc::now();
        rows.insert(record.id.clone(), record);
        Ok(())
    }

    async fn get_session(&self, id: &str) -> Result<Option<SessionRecord>, SwitchboardError> {
        Ok(self.session(id))
    }

    async fn list_sessions(&self) -> Result<Vec<SessionRecord>, SwitchboardError> {
        let mut rows: Vec<SessionRecord> = self.rows.lock().unwrap().values().cloned().collect();
        rows.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(rows)
    }

    async fn delete_session(&self, id: &str) -> Result<bool, SwitchboardError> {
        Ok(self.rows.lock().unwrap().remove(id).is_some())
    }

    async fn set_status(
        &self,
        id: &str,
        status: ConnectionStatus,
        last_error: Option<&str>,
    ) -> Result<(), SwitchboardError> {
        self.update(id, |row| {
            row.status = status;
            row.last_error = last_error.map(str::to_string);
        });
        Ok(())
    }

    async fn set_pairing_code(
        &self,
        id: &str,
        code: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), SwitchboardError> {
        if code.is_some() {
            self.pairing_code_writes.fetch_add(1, Ordering::SeqCst);
        }
        self.update(id, |row| {
            row.pairing_code = code.map(str::to_string);
            row.pairing_expires_at = expires_at;
        });
        Ok(())
    }

    async fn set_device_identity(
        &self,
        id: &str,
        device_identity: Option<&str>,
    ) -> Result<(), SwitchboardError> {
        self.update(id, |row| {
            row.device_identity = device_identity.map(str::to_string);
        });
        Ok(())
    }

    async fn touch_last_seen(&self, id: &str, at: DateTime<Utc>) -> Result<(), SwitchboardError> {
        self.update(id, |row| row.last_seen_at = Some(at));
        Ok(())
    }
}
