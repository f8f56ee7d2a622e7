// SPDX-License-Identifier: MIT OR Apache-2.0
//! Child environment derivation: the parent's variables with extra entries
//! prepended to the executable search path.

use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

/// Name of the executable search-path variable.
pub const PATH_VAR: &str = "PATH";

/// Separator between entries of the search-path variable on this platform.
#[cfg(windows)]
pub const PATH_SEPARATOR: &str = ";";
/// Separator between entries of the search-path variable on this platform.
#[cfg(not(windows))]
pub const PATH_SEPARATOR: &str = ":";

/// The complete environment handed to one child process.
///
/// Derived once per run and never written back to the calling process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EffectiveEnvironment {
    vars: BTreeMap<OsString, OsString>,
}

impl EffectiveEnvironment {
    /// Copy `base` and prepend `extra_paths`, in order, to its search path.
    ///
    /// Duplicate entries are kept. When `base` has no search-path variable
    /// the result holds just the joined extra entries.
    pub fn derive<I, K, V>(base: I, extra_paths: &[PathBuf]) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<OsString>,
        V: Into<OsString>,
    {
        derive_with(base, extra_paths, PATH_SEPARATOR, cfg!(windows))
    }

    /// [`derive`](Self::derive) from this process's current environment.
    pub fn from_current(extra_paths: &[PathBuf]) -> Self {
        Self::derive(std::env::vars_os(), extra_paths)
    }

    /// Value of `key`, if set.
    pub fn get(&self, key: impl AsRef<OsStr>) -> Option<&OsStr> {
        self.vars.get(key.as_ref()).map(OsString::as_os_str)
    }

    /// Value of the search-path variable, matched the way this platform
    /// matches it.
    pub fn search_path(&self) -> Option<&OsStr> {
        let key = find_path_key(&self.vars, cfg!(windows))?;
        self.get(key)
    }

    /// Iterate over `(name, value)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&OsStr, &OsStr)> {
        self.vars.iter().map(|(k, v)| (k.as_os_str(), v.as_os_str()))
    }

    /// Number of variables.
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// `true` if no variables are set.
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

fn find_path_key(vars: &BTreeMap<OsString, OsString>, case_insensitive: bool) -> Option<OsString> {
    vars.keys()
        .find(|k| {
            if case_insensitive {
                k.to_str().is_some_and(|s| s.eq_ignore_ascii_case(PATH_VAR))
            } else {
                k.as_os_str() == OsStr::new(PATH_VAR)
            }
        })
        .cloned()
}

fn join_entries<'a>(entries: impl IntoIterator<Item = &'a Path>, sep: &str) -> OsString {
    let mut joined = OsString::new();
    for (i, entry) in entries.into_iter().enumerate() {
        if i > 0 {
            joined.push(sep);
        }
        joined.push(entry);
    }
    joined
}

pub(crate) fn derive_with<I, K, V>(
    base: I,
    extra_paths: &[PathBuf],
    sep: &str,
    case_insensitive: bool,
) -> EffectiveEnvironment
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<OsString>,
    V: Into<OsString>,
{
    let mut vars: BTreeMap<OsString, OsString> = base
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect();
    if extra_paths.is_empty() {
        return EffectiveEnvironment { vars };
    }

    let mut value = join_entries(extra_paths.iter().map(PathBuf::as_path), sep);
    let key = match find_path_key(&vars, case_insensitive) {
        Some(key) => {
            if let Some(original) = vars.get(&key) {
                value.push(sep);
                value.push(original);
            }
            key
        }
        None => OsString::from(PATH_VAR),
    };
    vars.insert(key, value);
    EffectiveEnvironment { vars }
}
