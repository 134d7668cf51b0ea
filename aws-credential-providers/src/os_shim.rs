/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Abstractions for testing code that interacts with the operating system:
//! - Reading environment variables
//! - Reading process-level system properties
//! - Reading from and writing to the file system

use std::collections::HashMap;
use std::env::VarError;
use std::ffi::OsString;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, RwLock};

/// File system abstraction
///
/// Simple abstraction enabling in-memory mocking of the file system
///
/// # Example
/// Construct a file system which delegates to `tokio::fs`:
/// ```rust
/// let fs = aws_credential_providers::os_shim::Fs::real();
/// ```
///
/// Construct an in-memory file system for testing:
/// ```rust
/// use std::collections::HashMap;
/// let fs = aws_credential_providers::os_shim::Fs::from_map({
///     let mut map: HashMap<String, Vec<u8>> = HashMap::new();
///     map.insert("/home/.aws/sso/cache/abc.json".to_string(), "{}".into());
///     map
/// });
/// ```
#[derive(Clone)]
pub struct Fs(Arc<fs::Inner>);

impl Default for Fs {
    fn default() -> Self {
        Fs::real()
    }
}

impl fmt::Debug for Fs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.as_ref() {
            fs::Inner::Real => f.write_str("Fs::Real"),
            fs::Inner::Fake(_) => f.write_str("Fs::Fake"),
        }
    }
}

impl Fs {
    /// Create a file system that delegates to the real file system
    pub fn real() -> Self {
        Fs(Arc::new(fs::Inner::Real))
    }

    /// Create an in-memory file system from a map of raw paths to contents
    pub fn from_raw_map(fs: HashMap<OsString, Vec<u8>>) -> Self {
        Fs(Arc::new(fs::Inner::Fake(RwLock::new(fs))))
    }

    /// Create an in-memory file system from a map of paths to contents
    pub fn from_map(data: HashMap<String, impl Into<Vec<u8>>>) -> Self {
        let fs = data
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self::from_raw_map(fs)
    }

    /// Create an in-memory file system from a slice of `(path, contents)` tuples
    pub fn from_slice<'a>(files: &[(&'a str, &'a str)]) -> Self {
        let fs: HashMap<String, String> = files
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self::from_map(fs)
    }

    /// Read the entire contents of a file
    pub async fn read_to_end(&self, path: impl AsRef<Path>) -> std::io::Result<Vec<u8>> {
        use fs::Inner;
        let path = path.as_ref();
        match self.0.as_ref() {
            Inner::Real => tokio::fs::read(path).await,
            Inner::Fake(fs) => fs
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .get(path.as_os_str())
                .cloned()
                .ok_or_else(|| std::io::ErrorKind::NotFound.into()),
        }
    }

    /// Write a slice as the entire contents of a file.
    ///
    /// This is equivalent to `std::fs::write`. Parent directories are created on the real
    /// file system.
    pub async fn write(
        &self,
        path: impl AsRef<Path>,
        contents: impl AsRef<[u8]>,
    ) -> std::io::Result<()> {
        use fs::Inner;
        let path = path.as_ref();
        match self.0.as_ref() {
            Inner::Real => {
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(path, contents).await
            }
            Inner::Fake(fs) => {
                fs.write()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .insert(path.as_os_str().to_owned(), contents.as_ref().to_vec());
                Ok(())
            }
        }
    }

    /// Returns the contents of every file in a fake file system
    ///
    /// Returns `None` for the real file system.
    pub fn fake_contents(&self) -> Option<HashMap<OsString, Vec<u8>>> {
        match self.0.as_ref() {
            fs::Inner::Real => None,
            fs::Inner::Fake(fs) => Some(
                fs.read()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .clone(),
            ),
        }
    }
}

mod fs {
    use std::collections::HashMap;
    use std::ffi::OsString;
    use std::sync::RwLock;

    pub(super) enum Inner {
        Real,
        Fake(RwLock<HashMap<OsString, Vec<u8>>>),
    }
}

/// Environment variable abstraction
///
/// Environment variables are global to a process, and, as such, are difficult to test with a multi-
/// threaded test runner like Rust's. This enables loading environment variables either from the
/// actual process environment ([`std::env::var`](std::env::var)) or from a hash map.
///
/// Process environments are cheap to clone:
/// - Faked process environments are wrapped in an internal Arc
/// - Real process environments are pointer-sized
#[derive(Clone)]
pub struct Env(Arc<env::Inner>);

impl Default for Env {
    fn default() -> Self {
        Self::real()
    }
}

impl fmt::Debug for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.as_ref() {
            env::Inner::Real => f.write_str("Env::Real"),
            env::Inner::Fake(_) => f.write_str("Env::Fake"),
        }
    }
}

impl Env {
    /// Retrieve a value for the given `k`
    pub fn get(&self, k: &str) -> Result<String, VarError> {
        use env::Inner;
        match self.0.as_ref() {
            Inner::Real => std::env::var(k),
            Inner::Fake(map) => map.get(k).cloned().ok_or(VarError::NotPresent),
        }
    }

    /// Retrieve a value for `k`, treating empty or whitespace-only values as unset
    pub fn get_non_blank(&self, k: &str) -> Option<String> {
        self.get(k).ok().filter(|value| !value.trim().is_empty())
    }

    /// Create a fake process environment from a slice of tuples.
    ///
    /// # Example
    /// ```rust
    /// use aws_credential_providers::os_shim::Env;
    /// let mock_env = Env::from_slice(&[
    ///     ("HOME", "/home/myname"),
    ///     ("AWS_REGION", "us-west-2")
    /// ]);
    /// assert_eq!(mock_env.get("HOME").unwrap(), "/home/myname");
    /// ```
    pub fn from_slice<'a>(vars: &[(&'a str, &'a str)]) -> Self {
        use env::Inner;
        Self(Arc::new(Inner::Fake(
            vars.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )))
    }

    /// Create a process environment that uses the real process environment
    ///
    /// Calls will be delegated to [`std::env::var`](std::env::var).
    pub fn real() -> Self {
        Self(Arc::new(env::Inner::Real))
    }
}

impl From<HashMap<String, String>> for Env {
    fn from(hash_map: HashMap<String, String>) -> Self {
        Self(Arc::new(env::Inner::Fake(hash_map)))
    }
}

mod env {
    use std::collections::HashMap;

    pub(super) enum Inner {
        Real,
        Fake(HashMap<String, String>),
    }
}

/// Process-level system properties
///
/// A key/value store that lives alongside the environment, keyed with dotted names such as
/// `aws.accessKeyId`. Rust processes have no built-in property store, so properties are supplied
/// by the embedding application. The default is empty.
#[derive(Clone, Default)]
pub struct SystemProperties(Arc<HashMap<String, String>>);

impl fmt::Debug for SystemProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.0.keys().collect();
        keys.sort();
        f.debug_struct("SystemProperties")
            .field("keys", &keys)
            .finish()
    }
}

impl SystemProperties {
    /// Create system properties from a slice of tuples
    pub fn from_slice<'a>(props: &[(&'a str, &'a str)]) -> Self {
        Self(Arc::new(
            props
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        ))
    }

    /// Retrieve the property `k`
    pub fn get(&self, k: &str) -> Option<&str> {
        self.0.get(k).map(String::as_str)
    }
}

impl From<HashMap<String, String>> for SystemProperties {
    fn from(props: HashMap<String, String>) -> Self {
        Self(Arc::new(props))
    }
}

#[cfg(test)]
mod test {
    use crate::os_shim::{Env, Fs, SystemProperties};
    use std::env::VarError;

    #[test]
    fn env_works() {
        let env = Env::from_slice(&[("FOO", "BAR"), ("BLANK", "  ")]);
        assert_eq!(env.get("FOO").unwrap(), "BAR");
        assert_eq!(
            env.get("OTHER").expect_err("no present"),
            VarError::NotPresent
        );
        assert_eq!(None, env.get_non_blank("BLANK"));
    }

    #[test]
    fn system_properties_work() {
        let props = SystemProperties::from_slice(&[("aws.accessKeyId", "akid")]);
        assert_eq!(Some("akid"), props.get("aws.accessKeyId"));
        assert_eq!(None, SystemProperties::default().get("aws.accessKeyId"));
    }

    #[tokio::test]
    async fn fake_fs_records_writes() {
        let fs = Fs::from_slice(&[("/tmp/a", "hello")]);
        assert_eq!(b"hello".to_vec(), fs.read_to_end("/tmp/a").await.unwrap());
        fs.read_to_end("/tmp/b").await.expect_err("missing file");

        fs.write("/tmp/b", "world").await.expect("fake write");
        assert_eq!(b"world".to_vec(), fs.read_to_end("/tmp/b").await.unwrap());
        assert_eq!(2, fs.fake_contents().unwrap().len());
    }
}
