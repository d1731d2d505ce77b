//! Remote execution environments
//!
//! - `backend` - the [`SandboxBackend`] seam to the remote sandbox service
//! - `remote` - HTTP implementation of that seam
//! - `handle` - one live sandbox and its execute / write-file operations
//! - `pool` - keyed single-flight cache of handles with idle reaping

pub mod backend;
pub mod handle;
pub mod pool;
pub mod remote;

pub use backend::{BackendError, CreateSandbox, RunOutput, SandboxBackend};
pub use handle::{upload_path, EnvKey, EnvironmentHandle, ExecutionOutcome, WriteFileError, UPLOAD_DIR};
pub use pool::{EnvironmentPool, PoolConfig, PoolError, PoolStats};
pub use remote::RemoteSandboxClient;
