//! Remote cache tier seam.
//!
//! The middle tier is an injected trait object; a concrete adapter (Redis or
//! otherwise) lives outside this crate. The tiered cache treats every remote
//! fault as a miss, so adapters are free to fail loudly.

use crate::cache::types::CacheError;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// A networked key/value store used as the middle cache tier.
///
/// Object-safe by construction: implementations return boxed futures, so the
/// tiered cache can hold `Arc<dyn RemoteStore>`.
pub trait RemoteStore: Send + Sync {
    /// Fetches the value for `key`, `Ok(None)` on a clean miss.
    fn get<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Vec<u8>>, CacheError>> + Send + 'a>>;

    /// Stores `value` under `key` with the given TTL.
    fn set<'a>(
        &'a self,
        key: &'a str,
        value: &'a [u8],
        ttl: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<(), CacheError>> + Send + 'a>>;

    /// Removes every key this cache owns.
    fn clear<'a>(&'a self) -> Pin<Box<dyn Future<Output = Result<(), CacheError>> + Send + 'a>>;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// In-memory [`RemoteStore`] fake. TTLs are recorded but not enforced;
    /// tests that need expiry drive the disk or memory tier instead.
    #[derive(Default)]
    pub struct FakeRemote {
        pub entries: Mutex<HashMap<String, Vec<u8>>>,
        pub fail: AtomicBool,
    }

    impl FakeRemote {
        pub fn failing(&self, fail: bool) {
            self.fail.store(fail, Ordering::SeqCst);
        }

        fn check(&self) -> Result<(), CacheError> {
            if self.fail.load(Ordering::SeqCst) {
                Err(CacheError::Remote("connection refused".into()))
            } else {
                Ok(())
            }
        }
    }

    impl RemoteStore for FakeRemote {
        fn get<'a>(
            &'a self,
            key: &'a str,
        ) -> Pin<Box<dyn Future<Output = Result<Option<Vec<u8>>, CacheError>> + Send + 'a>>
        {
            Box::pin(async move {
                self.check()?;
                Ok(self.entries.lock().unwrap().get(key).cloned())
            })
        }

        fn set<'a>(
            &'a self,
            key: &'a str,
            value: &'a [u8],
            _ttl: Duration,
        ) -> Pin<Box<dyn Future<Output = Result<(), CacheError>> + Send + 'a>> {
            Box::pin(async move {
                self.check()?;
                self.entries
                    .lock()
                    .unwrap()
                    .insert(key.to_string(), value.to_vec());
                Ok(())
            })
        }

        fn clear<'a>(
            &'a self,
        ) -> Pin<Box<dyn Future<Output = Result<(), CacheError>> + Send + 'a>> {
            Box::pin(async move {
                self.check()?;
                self.entries.lock().unwrap().clear();
                Ok(())
            })
        }
    }
}
