use std::future::Future;

use anyhow::Result;
use serde_json::Value;

/// Key-value store the engine persists site state through.
///
/// Operations are independent; there are no transactions across keys and
/// no ordering guarantee between concurrent writers.
pub trait Storage: Clone + Send + Sync + 'static {
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<Value>>> + Send;

    fn set(&self, key: &str, value: Value) -> impl Future<Output = Result<()>> + Send;

    fn remove(&self, key: &str) -> impl Future<Output = Result<()>> + Send;
}

#[cfg(test)]
pub use memory::MemoryStorage;

#[cfg(test)]
mod memory {
    use std::{
        collections::HashMap,
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
    };

    use anyhow::{bail, Result};
    use serde_json::Value;
    use tokio::sync::Mutex;

    use super::Storage;

    /// In-process store with switchable failure injection.
    #[derive(Clone, Default)]
    pub struct MemoryStorage {
        entries: Arc<Mutex<HashMap<String, Value>>>,
        failing: Arc<AtomicBool>,
    }

    impl MemoryStorage {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn fail_requests(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }

        fn check(&self) -> Result<()> {
            if self.failing.load(Ordering::SeqCst) {
                bail!("storage unavailable");
            }
            Ok(())
        }
    }

    impl Storage for MemoryStorage {
        async fn get(&self, key: &str) -> Result<Option<Value>> {
            self.check()?;
            Ok(self.entries.lock().await.get(key).cloned())
        }

        async fn set(&self, key: &str, value: Value) -> Result<()> {
            self.check()?;
            self.entries.lock().await.insert(key.to_string(), value);
            Ok(())
        }

        async fn remove(&self, key: &str) -> Result<()> {
            self.check()?;
            self.entries.lock().await.remove(key);
            Ok(())
        }
    }
}
