pub mod builders;
pub mod fake_task_builder;
pub mod recording_sink;

use std::path::Path;
use std::sync::{Arc, Once};

use buildforge::errors::Result;
use buildforge::fs::mock::MockFileSystem;
use buildforge::fs::FileSystem;
use buildforge::project::ProjectInstance;
use tracing_subscriber::{fmt, EnvFilter};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout.
#[allow(dead_code)]
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// Where [`load_project`] puts its project file.
pub const PROJECT_PATH: &str = "/src/app/app.proj";

/// Mock file system holding one project file at [`PROJECT_PATH`].
pub fn mock_fs_with_project(toml: &str) -> Arc<MockFileSystem> {
    let fs = Arc::new(MockFileSystem::new());
    fs.add_file(PROJECT_PATH, toml);
    fs
}

/// Load and evaluate a project written in TOML, with no global properties.
pub fn load_project(toml: &str) -> Result<Arc<ProjectInstance>> {
    let fs: Arc<dyn FileSystem> = mock_fs_with_project(toml);
    let project = ProjectInstance::load(fs, Path::new(PROJECT_PATH), Default::default(), None)?;
    Ok(Arc::new(project))
}
