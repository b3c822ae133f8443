//! Key pairs written to a temporary directory.

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A private/public PEM pair on disk.
///
/// The directory and both files are removed when this value is dropped, so
/// keep it alive for as long as the paths are in use.
pub struct KeyPairFiles {
    dir: TempDir,
    private_key: PathBuf,
    public_key: PathBuf,
}

impl KeyPairFiles {
    /// Write `private_pem` and `public_pem` to `private.pem` / `public.pem`.
    pub fn write(private_pem: &str, public_pem: &str) -> anyhow::Result<Self> {
        let dir = tempfile::tempdir()?;
        let private_key = dir.path().join("private.pem");
        let public_key = dir.path().join("public.pem");

        fs::write(&private_key, private_pem)?;
        fs::write(&public_key, public_pem)?;

        Ok(Self {
            dir,
            private_key,
            public_key,
        })
    }

    pub fn private_key(&self) -> &Path {
        &self.private_key
    }

    pub fn public_key(&self) -> &Path {
        &self.public_key
    }

    /// A path inside the temporary directory that does not exist.
    pub fn missing_file(&self) -> PathBuf {
        self.dir.path().join("does-not-exist.pem")
    }
}
