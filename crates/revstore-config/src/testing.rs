//! Test environment abstraction for isolated testing.
//!
//! Provides `TestEnvironment` to manage:
//! - A temporary repository root
//! - A source directory for files to ingest
//! - An output directory for checkouts
//!
//! # Usage
//!
//! ```ignore
//! use revstore_config::testing::TestEnvironment;
//!
//! #[test]
//! fn test_something() {
//!     let env = TestEnvironment::new().unwrap();
//!     let src = env.create_source("report.pdf", b"%PDF").unwrap();
//!     // env.repo_root, env.output_dir are isolated per test
//! }
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use tempfile::TempDir;

/// Atomic counter for unique test IDs
static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Isolated test environment with unique paths
pub struct TestEnvironment {
    /// Temporary directory (dropped on cleanup)
    _temp_dir: TempDir,
    /// Repository root, created empty
    pub repo_root: PathBuf,
    /// Where test payloads are written before ingestion
    pub source_dir: PathBuf,
    /// Checkout destination
    pub output_dir: PathBuf,
    /// Unique test ID
    pub test_id: u32,
}

impl TestEnvironment {
    /// Create a new isolated test environment
    pub fn new() -> anyhow::Result<Self> {
        let test_id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();

        let repo_root = root.join("repo");
        let source_dir = root.join("src");
        let output_dir = root.join("out");

        std::fs::create_dir_all(&repo_root)?;
        std::fs::create_dir_all(&source_dir)?;
        std::fs::create_dir_all(&output_dir)?;

        Ok(Self {
            _temp_dir: temp_dir,
            repo_root,
            source_dir,
            output_dir,
            test_id,
        })
    }

    /// Path inside the environment that is guaranteed not to exist.
    pub fn missing_path(&self, name: &str) -> PathBuf {
        self._temp_dir
            .path()
            .join(format!("missing-{}-{}", self.test_id, name))
    }

    /// Create a source file with content
    pub fn create_source(&self, relative_path: &str, content: &[u8]) -> anyhow::Result<PathBuf> {
        let path = self.source_dir.join(relative_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content)?;
        Ok(path)
    }

    /// Config pointing at this environment's repository root.
    pub fn config(&self) -> crate::Config {
        let mut cfg = crate::Config::default();
        cfg.repository.repository_path = self.repo_root.clone();
        cfg
    }
}

impl Default for TestEnvironment {
    fn default() -> Self {
        Self::new().expect("Failed to create test environment")
    }
}
