//! Test doubles for the pipeline's external capabilities.
//!
//! Enabled for unit tests and behind the `testing` feature, so integration
//! tests can drive the executor, batch converter and service without pandoc.
//!
//! # Example
//!
//! ```rust,ignore
//! use docconv_core::testing::{MockEngine, MockStep};
//!
//! let engine = MockEngine::writing(vec![b'x'; 80]);
//! engine.push_step(MockStep::Fail("pandoc crashed".into()));
//!
//! // First call fails, later calls write 80 bytes to the output path.
//! ```

mod mock_engine;
mod mock_fs;

pub use mock_engine::{MockEngine, MockStep};
pub use mock_fs::{MockLister, MockProbe};

use std::sync::{Mutex, MutexGuard};

/// Lock ignoring poisoning; a panicking test should not cascade into others.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Fixture helpers.
pub mod fixtures {
    use std::path::{Path, PathBuf};

    /// Markdown body of roughly `paragraphs * 60` bytes.
    pub fn markdown(title: &str, paragraphs: usize) -> String {
        let mut doc = format!("# {}\n\n", title);
        for i in 1..=paragraphs {
            doc.push_str(&format!(
                "Paragraph {} with enough words to look like prose.\n\n",
                i
            ));
        }
        doc
    }

    /// Write `contents` to `dir/name`, creating parent directories.
    pub fn write_file(dir: &Path, name: &str, contents: impl AsRef<[u8]>) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create fixture dir");
        }
        std::fs::write(&path, contents).expect("write fixture");
        path
    }
}
