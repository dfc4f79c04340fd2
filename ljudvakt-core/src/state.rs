//! Debounced, escaped key-value persistence for policy decisions.
//!
//! Each [`State`] is backed by one file under the user state directory,
//! written in a keyfile grammar: a single `[<name>]` section followed by
//! `escaped-key=value` lines. Keys may contain any character; a small
//! `\`-escape table keeps them on one line.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::Error;
use crate::properties::Properties;

/// Default debounce for [`State::save_after_timeout`].
pub const DEFAULT_SAVE_TIMEOUT: Duration = Duration::from_millis(1000);

const ESCAPE: char = '\\';

/// A named, process-local key-value store persisted to disk.
pub struct State {
    name: String,
    location: PathBuf,
    timeout: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl State {
    /// A state stored at `$XDG_STATE_HOME/wireplumber/<name>`
    /// (`$HOME/.local/state` when the variable is unset).
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let location = state_dir().join(&name);
        Self::at(name, location)
    }

    /// A state stored under an explicit base directory.
    pub fn with_base_dir(name: impl Into<String>, base: impl Into<PathBuf>) -> Self {
        let name = name.into();
        let location = base.into().join(&name);
        Self::at(name, location)
    }

    fn at(name: String, location: PathBuf) -> Self {
        Self {
            name,
            location,
            timeout: DEFAULT_SAVE_TIMEOUT,
            pending: Mutex::new(None),
        }
    }

    /// Overrides the debounce used by [`Self::save_after_timeout`].
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Writes all entries, replacing any prior contents.
    ///
    /// The write goes through a temporary file and a rename, so concurrent
    /// readers see either the old or the new contents, never a torn file.
    pub fn save(&self, props: &Properties) -> Result<(), Error> {
        info!(name = %self.name, location = %self.location.display(), "saving state");
        write_keyfile(&self.name, &self.location, props)
    }

    /// Schedules a save after the debounce timeout.
    ///
    /// Calling again before the timer fires cancels and restarts it with the
    /// newly supplied properties: consecutive calls collapse into a single
    /// write carrying the last bag. The bag is held by reference (cheap
    /// clone), not deep-copied; callers must not mutate it after handoff.
    ///
    /// Must be called from within a tokio runtime.
    pub fn save_after_timeout(&self, props: Properties) {
        let mut pending = self.pending.lock();
        if let Some(task) = pending.take() {
            task.abort();
        }

        let name = self.name.clone();
        let location = self.location.clone();
        let timeout = self.timeout;
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Err(error) = write_keyfile(&name, &location, &props) {
                warn!(name = %name, %error, "deferred state save failed");
            }
        }));
    }

    /// Reads the current on-disk state.
    ///
    /// Never fails: on any read or parse problem an empty bag is returned,
    /// as if no state had been stored.
    pub fn load(&self) -> Properties {
        let Ok(text) = fs::read_to_string(&self.location) else {
            return Properties::new();
        };

        let mut props = Properties::new();
        let mut in_section = false;
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some(section) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                in_section = section == self.name;
                continue;
            }
            if !in_section {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                let _ = props.set(unescape_key(key), value);
            }
        }
        props
    }

    /// Removes the on-disk file.
    pub fn clear(&self) {
        if let Err(error) = fs::remove_file(&self.location) {
            warn!(location = %self.location.display(), %error, "failed to remove state file");
        }
    }
}

impl Drop for State {
    fn drop(&mut self) {
        if let Some(task) = self.pending.lock().take() {
            task.abort();
        }
    }
}

/// Resolves the state directory, without creating it.
fn state_dir() -> PathBuf {
    let base = std::env::var_os("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            let home = std::env::var_os("HOME").map(PathBuf::from).unwrap_or_default();
            home.join(".local").join("state")
        });
    base.join("wireplumber")
}

#[cfg(unix)]
fn create_dir_private(dir: &Path) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().recursive(true).mode(0o700).create(dir)
}

#[cfg(not(unix))]
fn create_dir_private(dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)
}

fn write_keyfile(name: &str, location: &Path, props: &Properties) -> Result<(), Error> {
    if let Some(dir) = location.parent() {
        if !dir.exists() {
            create_dir_private(dir)?;
        }
    }

    let mut text = String::new();
    text.push('[');
    text.push_str(name);
    text.push_str("]\n");
    for (key, value) in props.iter() {
        text.push_str(&escape_key(key));
        text.push('=');
        text.push_str(value);
        text.push('\n');
    }

    let tmp = location.with_extension("tmp");
    fs::write(&tmp, text)?;
    fs::rename(&tmp, location)?;
    Ok(())
}

/// Escapes a key for the on-disk grammar.
fn escape_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for c in key.chars() {
        match c {
            ESCAPE => out.push_str("\\\\"),
            ' ' => out.push_str("\\s"),
            '=' => out.push_str("\\e"),
            '[' => out.push_str("\\o"),
            ']' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

/// Inverse of [`escape_key`]; unrecognised escape sequences pass through
/// literally.
fn unescape_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut chars = key.chars();
    while let Some(c) = chars.next() {
        if c != ESCAPE {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(ESCAPE) => out.push(ESCAPE),
            Some('s') => out.push(' '),
            Some('e') => out.push('='),
            Some('o') => out.push('['),
            Some('c') => out.push(']'),
            Some(other) => {
                out.push(ESCAPE);
                out.push(other);
            }
            None => out.push(ESCAPE),
        }
    }
    out
}
