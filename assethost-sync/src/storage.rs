//! Storage collaborator contract and an in-process implementation.

use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

use assethost_core::Variant;

use crate::error::StorageError;

/// `max-age` for every uploaded object: ten years.
pub const CACHE_MAX_AGE_SECS: i64 = 10 * 365 * 24 * 60 * 60;

/// Canned ACL applied on upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acl {
    PublicRead,
}

/// HTTP headers stored with an uploaded object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectHeaders {
    pub content_type: String,
    pub cache_control: String,
    pub expires: DateTime<Utc>,
    pub content_encoding: Option<String>,
}

impl ObjectHeaders {
    /// Headers for an object of `content_type` uploaded at `now`.
    pub fn for_upload(content_type: &str, variant: Variant, now: DateTime<Utc>) -> Self {
        Self {
            content_type: content_type.to_owned(),
            cache_control: format!("max-age={CACHE_MAX_AGE_SECS}"),
            expires: now + Duration::days(365),
            content_encoding: match variant {
                Variant::Gzip => Some("gzip".to_owned()),
                Variant::Plain => None,
            },
        }
    }

    /// `Expires` in IMF-fixdate form, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`.
    pub fn http_expires(&self) -> String {
        self.expires.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
    }

    /// Header name → value, as sent on the wire.
    pub fn to_map(&self) -> BTreeMap<&'static str, String> {
        let mut map = BTreeMap::new();
        map.insert("Content-Type", self.content_type.clone());
        map.insert("Cache-Control", self.cache_control.clone());
        map.insert("Expires", self.http_expires());
        if let Some(encoding) = &self.content_encoding {
            map.insert("Content-Encoding", encoding.clone());
        }
        map
    }
}

/// Object-storage operations the reconciler depends on.
pub trait Storage {
    /// Every key starting with `prefix` (`""` lists the whole bucket).
    fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

    fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        headers: &ObjectHeaders,
        acl: Acl,
    ) -> Result<(), StorageError>;

    fn delete(&self, key: &str) -> Result<(), StorageError>;
}

// ---------------------------------------------------------------------------
// MemoryStorage
// ---------------------------------------------------------------------------

/// An object held by [`MemoryStorage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub headers: ObjectHeaders,
    pub acl: Acl,
}

/// In-process bucket. Counts calls so callers can assert on traffic.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    objects: Mutex<BTreeMap<String, StoredObject>>,
    calls: Mutex<CallLog>,
    fail_puts: bool,
}

/// Mutating calls seen by a [`MemoryStorage`], in order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CallLog {
    pub puts: Vec<String>,
    pub deletes: Vec<String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// A bucket pre-populated with `keys` (empty bodies).
    pub fn with_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let headers = ObjectHeaders::for_upload("application/octet-stream", Variant::Plain, Utc::now());
        let objects = keys
            .into_iter()
            .map(|k| {
                (
                    k.into(),
                    StoredObject {
                        bytes: Vec::new(),
                        headers: headers.clone(),
                        acl: Acl::PublicRead,
                    },
                )
            })
            .collect();
        Self {
            objects: Mutex::new(objects),
            ..Self::default()
        }
    }

    /// Make every `put` fail, for error-path tests.
    pub fn failing_puts(mut self) -> Self {
        self.fail_puts = true;
        self
    }

    pub fn keys(&self) -> Vec<String> {
        lock(&self.objects).keys().cloned().collect()
    }

    pub fn get(&self, key: &str) -> Option<StoredObject> {
        lock(&self.objects).get(key).cloned()
    }

    pub fn calls(&self) -> CallLog {
        lock(&self.calls).clone()
    }

    /// Forget recorded calls; objects are kept.
    pub fn clear_calls(&self) {
        *lock(&self.calls) = CallLog::default();
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Storage for MemoryStorage {
    fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        Ok(lock(&self.objects)
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        headers: &ObjectHeaders,
        acl: Acl,
    ) -> Result<(), StorageError> {
        if self.fail_puts {
            return Err(StorageError::Put {
                key: key.to_owned(),
                source: "access denied".into(),
            });
        }
        lock(&self.calls).puts.push(key.to_owned());
        lock(&self.objects).insert(
            key.to_owned(),
            StoredObject {
                bytes,
                headers: headers.clone(),
                acl,
            },
        );
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        lock(&self.calls).deletes.push(key.to_owned());
        lock(&self.objects).remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn gzip_headers_carry_encoding() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let headers = ObjectHeaders::for_upload("text/css", Variant::Gzip, now);
        let map = headers.to_map();
        assert_eq!(map["Content-Type"], "text/css");
        assert_eq!(map["Cache-Control"], "max-age=315360000");
        assert_eq!(map["Content-Encoding"], "gzip");
        assert_eq!(map["Expires"], "Sat, 01 Mar 2025 12:00:00 GMT");
    }

    #[test]
    fn plain_headers_have_no_encoding() {
        let headers = ObjectHeaders::for_upload("image/png", Variant::Plain, Utc::now());
        assert!(!headers.to_map().contains_key("Content-Encoding"));
    }

    #[test]
    fn memory_list_filters_by_prefix() {
        let storage = MemoryStorage::with_keys(["gz/a.js", "b.png", "gzz/c"]);
        assert_eq!(storage.list("gz/").unwrap(), vec!["gz/a.js"]);
        assert_eq!(storage.list("").unwrap().len(), 3);
    }

    #[test]
    fn memory_records_calls() {
        let storage = MemoryStorage::new();
        let headers = ObjectHeaders::for_upload("text/plain", Variant::Plain, Utc::now());
        storage.put("k", b"v".to_vec(), &headers, Acl::PublicRead).unwrap();
        storage.delete("k").unwrap();
        let calls = storage.calls();
        assert_eq!(calls.puts, vec!["k"]);
        assert_eq!(calls.deletes, vec!["k"]);
        assert!(storage.keys().is_empty());
    }
}
