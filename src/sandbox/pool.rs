//! Environment Pool - keyed cache of live sandboxes
//!
//! At most one environment exists per (session, mode). Environments are
//! created lazily on first acquire and reused across turns until they are
//! released explicitly, reaped for idleness, or the pool shuts down.
//!
//! # Single-flight creation
//!
//! ```text
//! acquire(k) ──► map lock ──► slot(k) ──► slot lock ──┬─ Ready(h)  → return h
//!                (brief)                  (held while  ├─ Empty     → create, store, return
//!                                          creating)   └─ Retired   → slot was released, retry
//! ```
//!
//! Concurrent acquires for the same key queue on the slot lock, so only the
//! first one creates; the rest observe `Ready`. Different keys only share the
//! brief map lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, info_span, warn, Instrument};

use super::backend::{BackendError, CreateSandbox, SandboxBackend};
use super::handle::{EnvKey, EnvironmentHandle};
use crate::metrics::{ENVIRONMENT_CREATE_DURATION, POOL_LIVE_ENVIRONMENTS};
use crate::mode::Mode;
use crate::skills::SkillsSource;

/// Configuration for the environment pool
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Pre-built template per mode; modes without one get on-demand setup
    pub templates: HashMap<Mode, String>,
    /// Secrets exposed to executed code as environment variables
    pub secrets: HashMap<String, String>,
    /// Wall-clock cap for one code execution
    pub execution_timeout: Duration,
    /// Wall-clock cap for on-demand package installation
    pub setup_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            templates: HashMap::new(),
            secrets: HashMap::new(),
            execution_timeout: Duration::from_secs(60),
            setup_timeout: Duration::from_secs(300),
        }
    }
}

/// Error type for pool operations
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("Failed to create environment for {key}: {source}")]
    Create {
        key: EnvKey,
        #[source]
        source: BackendError,
    },
}

/// Statistics about the pool state
#[derive(Debug, Clone)]
pub struct PoolStats {
    /// Number of live environments
    pub live_count: usize,
    /// Keys of the live environments
    pub keys: Vec<EnvKey>,
    /// Slots in the map, including ones still creating
    pub slot_count: usize,
}

enum SlotState {
    Empty,
    Ready(Arc<EnvironmentHandle>),
    Retired,
}

type Slot = Arc<Mutex<SlotState>>;

/// Thread-safe keyed pool of execution environments
pub struct EnvironmentPool {
    backend: Arc<dyn SandboxBackend>,
    skills: Arc<SkillsSource>,
    config: PoolConfig,
    slots: Mutex<HashMap<EnvKey, Slot>>,
}

impl EnvironmentPool {
    /// Create a new pool
    ///
    /// # Arguments
    /// * `backend` - remote sandbox service
    /// * `skills` - source of the package manifest used for on-demand setup
    /// * `config` - templates, secrets and timeouts
    pub fn new(backend: Arc<dyn SandboxBackend>, skills: Arc<SkillsSource>, config: PoolConfig) -> Self {
        Self {
            backend,
            skills,
            config,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Return the environment for `(session_id, mode)`, creating it if needed
    pub async fn acquire(&self, session_id: &str, mode: Mode) -> Result<Arc<EnvironmentHandle>, PoolError> {
        let key = EnvKey::new(session_id, mode);

        loop {
            let slot = {
                let mut slots = self.slots.lock().await;
                Arc::clone(
                    slots
                        .entry(key.clone())
                        .or_insert_with(|| Arc::new(Mutex::new(SlotState::Empty))),
                )
            };

            let mut state = slot.lock().await;
            if let SlotState::Ready(handle) = &*state {
                return Ok(Arc::clone(handle));
            }
            if matches!(*state, SlotState::Retired) {
                continue;
            }

            let handle = match self.create(&key).await {
                Ok(handle) => Arc::new(handle),
                Err(e) => {
                    // waiters queued on this slot retry against a fresh one
                    *state = SlotState::Retired;
                    self.forget_slot(&key, &slot).await;
                    return Err(e);
                }
            };
            *state = SlotState::Ready(Arc::clone(&handle));
            drop(state);
            self.update_gauge().await;
            return Ok(handle);
        }
    }

    /// Tear down the environment for `(session_id, mode)`
    ///
    /// Returns `false` when no environment was registered for the key. Waits
    /// for an in-flight creation on the same key before destroying it.
    pub async fn release(&self, session_id: &str, mode: Mode) -> bool {
        self.release_key(&EnvKey::new(session_id, mode)).await
    }

    /// Release every mode of a session
    pub async fn release_session(&self, session_id: &str) -> usize {
        let mut released = 0;
        for mode in Mode::ALL {
            if self.release(session_id, mode).await {
                released += 1;
            }
        }
        released
    }

    async fn release_key(&self, key: &EnvKey) -> bool {
        let slot = match self.slots.lock().await.remove(key) {
            Some(slot) => slot,
            None => return false,
        };

        let previous = {
            let mut state = slot.lock().await;
            std::mem::replace(&mut *state, SlotState::Retired)
        };
        self.update_gauge().await;

        match previous {
            SlotState::Ready(handle) => {
                if let Err(e) = handle.destroy().await {
                    warn!(env = %key, sandbox_id = handle.sandbox_id(), error = %e, "Failed to destroy sandbox");
                }
                info!(env = %key, sandbox_id = handle.sandbox_id(), age_secs = handle.age().as_secs(), "Environment released");
                true
            }
            SlotState::Empty | SlotState::Retired => false,
        }
    }

    /// Release every ready environment idle for longer than `max_idle`
    ///
    /// Environments borrowed by a running request are never reaped, however
    /// long they have been idle.
    pub async fn reap_idle(&self, max_idle: Duration) -> usize {
        let candidates: Vec<(EnvKey, Slot)> = {
            let slots = self.slots.lock().await;
            slots.iter().map(|(k, s)| (k.clone(), Arc::clone(s))).collect()
        };

        let mut reaped = 0;
        for (key, slot) in candidates {
            // a slot that is busy creating is not idle
            let handle = match slot.try_lock() {
                Ok(mut state) => {
                    let expired = matches!(
                        &*state,
                        SlotState::Ready(h) if Arc::strong_count(h) == 1 && h.idle_for() > max_idle
                    );
                    if !expired {
                        continue;
                    }
                    self.forget_slot(&key, &slot).await;
                    match std::mem::replace(&mut *state, SlotState::Retired) {
                        SlotState::Ready(handle) => handle,
                        SlotState::Empty | SlotState::Retired => continue,
                    }
                }
                Err(_) => continue,
            };

            self.update_gauge().await;
            if let Err(e) = handle.destroy().await {
                warn!(env = %key, sandbox_id = handle.sandbox_id(), error = %e, "Failed to destroy sandbox");
            }
            info!(env = %key, sandbox_id = handle.sandbox_id(), idle_secs = handle.idle_for().as_secs(), "Reaped idle environment");
            reaped += 1;
        }
        reaped
    }

    /// Drop `slot` from the map if it is still the one registered for `key`
    async fn forget_slot(&self, key: &EnvKey, slot: &Slot) {
        let mut slots = self.slots.lock().await;
        if slots.get(key).is_some_and(|current| Arc::ptr_eq(current, slot)) {
            slots.remove(key);
        }
    }

    /// Current pool statistics
    pub async fn stats(&self) -> PoolStats {
        let slots: Vec<(EnvKey, Slot)> = {
            let slots = self.slots.lock().await;
            slots.iter().map(|(k, s)| (k.clone(), Arc::clone(s))).collect()
        };
        let slot_count = slots.len();

        let mut keys = Vec::new();
        for (key, slot) in slots {
            if let Ok(state) = slot.try_lock() {
                if matches!(&*state, SlotState::Ready(_)) {
                    keys.push(key);
                }
            }
        }
        keys.sort();

        PoolStats {
            live_count: keys.len(),
            keys,
            slot_count,
        }
    }

    /// Graceful shutdown: destroy every environment
    pub async fn shutdown(&self) {
        info!("Shutting down environment pool");
        let keys: Vec<EnvKey> = self.slots.lock().await.keys().cloned().collect();
        for key in keys {
            self.release_key(&key).await;
        }
        POOL_LIVE_ENVIRONMENTS.set(0.0);
    }

    /// Start the background idle reaper
    pub fn start_reaper(pool: Arc<EnvironmentPool>, max_idle: Duration, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
            loop {
                ticker.tick().await;
                let reaped = pool.reap_idle(max_idle).await;
                if reaped > 0 {
                    info!(reaped, "Idle reaper pass complete");
                }
            }
        })
    }

    async fn create(&self, key: &EnvKey) -> Result<EnvironmentHandle, PoolError> {
        let span = info_span!("environment_create", env = %key, otel.name = "environment_create");

        async {
            let start = Instant::now();
            let template = self.config.templates.get(&key.mode).cloned();
            let source = if template.is_some() { "template" } else { "setup" };

            let request = CreateSandbox {
                template,
                env_vars: self.config.secrets.clone(),
                metadata: HashMap::from([
                    ("session_id".to_string(), key.session_id.clone()),
                    ("mode".to_string(), key.mode.to_string()),
                ]),
            };

            let sandbox_id = self
                .backend
                .create(&request)
                .await
                .map_err(|source| PoolError::Create {
                    key: key.clone(),
                    source,
                })?;

            let handle = EnvironmentHandle::new(
                key.clone(),
                sandbox_id,
                Arc::clone(&self.backend),
                self.config.execution_timeout,
            );

            if request.template.is_none() {
                self.install_packages(&handle).await;
            }

            ENVIRONMENT_CREATE_DURATION
                .with_label_values(&[key.mode.as_str(), source])
                .observe(start.elapsed().as_secs_f64());
            info!(
                env = %key,
                sandbox_id = handle.sandbox_id(),
                source,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "Environment created"
            );
            Ok(handle)
        }
        .instrument(span)
        .await
    }

    /// On-demand setup for sandboxes without a pre-built template
    ///
    /// Failures are logged; the environment is still usable and the model will
    /// see import errors if a package is really missing.
    async fn install_packages(&self, handle: &EnvironmentHandle) {
        let packages = self.skills.packages().await;
        if packages.is_empty() {
            return;
        }

        let code = install_script(&packages);
        let result = tokio::time::timeout(
            self.config.setup_timeout,
            self.backend_run(handle, &code),
        )
        .await;

        match result {
            Ok(Ok(Some(error))) => {
                warn!(env = %handle.key(), error = %error, "Package installation reported an error")
            }
            Ok(Ok(None)) => info!(env = %handle.key(), count = packages.len(), "Installed packages"),
            Ok(Err(e)) => warn!(env = %handle.key(), error = %e, "Package installation failed"),
            Err(_) => warn!(env = %handle.key(), "Package installation timed out"),
        }
    }

    async fn backend_run(&self, handle: &EnvironmentHandle, code: &str) -> Result<Option<String>, BackendError> {
        let output = self
            .backend
            .run(handle.sandbox_id(), code, self.config.setup_timeout)
            .await?;
        Ok(output.error.map(|e| format!("{}: {}", e.name, e.value)))
    }

    async fn update_gauge(&self) {
        let live = self.stats().await.live_count;
        POOL_LIVE_ENVIRONMENTS.set(live as f64);
    }
}

/// Python snippet that pip-installs `packages` quietly
pub fn install_script(packages: &[String]) -> String {
    let list = packages
        .iter()
        .map(|p| format!("{:?}", p))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "import subprocess, sys\n\
         _r = subprocess.run([sys.executable, \"-m\", \"pip\", \"install\", \"--quiet\", {}], capture_output=True, text=True)\n\
         if _r.returncode != 0:\n    raise RuntimeError(_r.stderr[-2000:])\n",
        list
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_script_quotes_packages() {
        let script = install_script(&["pandas>=2".to_string(), "scikit-learn".to_string()]);
        assert!(script.contains("\"--quiet\", \"pandas>=2\", \"scikit-learn\"]"));
        assert!(script.starts_with("import subprocess, sys\n"));
    }
}
