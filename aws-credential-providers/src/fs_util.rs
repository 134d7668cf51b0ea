/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Home directory resolution shared by the SSO cache and profile-configured file paths.

use crate::os_shim::Env;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum Os {
    Windows,
    NotWindows,
}

impl Os {
    pub(crate) fn real() -> Self {
        match std::env::consts::OS {
            "windows" => Os::Windows,
            _ => Os::NotWindows,
        }
    }
}

/// Resolve a home directory given a set of environment variables
pub(crate) fn home_dir(env: &Env, os: Os) -> Option<String> {
    if let Ok(home) = env.get("HOME") {
        tracing::debug!(src = "HOME", "loaded home directory");
        return Some(home);
    }

    if os == Os::Windows {
        if let Ok(home) = env.get("USERPROFILE") {
            tracing::debug!(src = "USERPROFILE", "loaded home directory");
            return Some(home);
        }

        let home_drive = env.get("HOMEDRIVE");
        let home_path = env.get("HOMEPATH");
        tracing::debug!(src = "HOMEDRIVE/HOMEPATH", "loaded home directory");
        if let (Ok(mut drive), Ok(path)) = (home_drive, home_path) {
            drive.push_str(&path);
            return Some(drive);
        }
    }
    None
}

/// Replace a leading `~` component with the home directory
pub(crate) fn expand_home(path: impl AsRef<Path>, env: &Env, os: Os) -> PathBuf {
    let path = path.as_ref();
    let mut components = path.components();
    match components.next() {
        Some(Component::Normal(s)) if s == "~" => {
            let mut expanded = match home_dir(env, os) {
                Some(dir) => {
                    tracing::debug!(home = ?dir, "performing home directory substitution");
                    PathBuf::from(dir)
                }
                None => {
                    tracing::warn!(
                        "could not determine home directory but home expansion was requested"
                    );
                    PathBuf::new()
                }
            };
            for component in components {
                expanded.push(component);
            }
            expanded
        }
        // paths that don't begin with `~` came from the target platform and keep their separators
        _ => path.into(),
    }
}

#[cfg(test)]
mod test {
    use super::{expand_home, home_dir, Os};
    use crate::os_shim::Env;

    #[test]
    fn home_from_windows_drive_and_path() {
        let env = Env::from_slice(&[("HOMEDRIVE", "C:"), ("HOMEPATH", "\\Users\\name")]);
        assert_eq!(
            Some("C:\\Users\\name".to_string()),
            home_dir(&env, Os::Windows)
        );
        assert_eq!(None, home_dir(&env, Os::NotWindows));
    }

    #[test]
    #[cfg(not(windows))]
    fn only_expand_home_prefix() {
        let env = Env::from_slice(&[("HOME", "/user/foo")]);
        assert_eq!(
            "/user/foo/.aws/token",
            expand_home("~/.aws/token", &env, Os::NotWindows)
                .to_str()
                .unwrap()
        );
        assert_eq!(
            "/tmp/~/token",
            expand_home("/tmp/~/token", &env, Os::NotWindows)
                .to_str()
                .unwrap()
        );
    }
}
