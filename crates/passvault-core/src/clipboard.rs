//! Clipboard backends used by the session for copy-and-clear.

use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;
use zeroize::Zeroizing;

use crate::error::{VaultError, VaultResult};

/// Somewhere a secret can be placed for pasting, and wiped from again
pub trait ClipboardBackend: Send {
    fn set_text(&mut self, text: &str) -> VaultResult<()>;

    fn clear(&mut self) -> VaultResult<()>;
}

/// Process-local clipboard. Clones share the same contents, so a test can
/// keep a handle after giving one to the session.
#[derive(Debug, Clone, Default)]
pub struct MemoryClipboard {
    contents: Arc<Mutex<Option<Zeroizing<String>>>>,
}

impl MemoryClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current contents (`None` when empty)
    pub fn contents(&self) -> Option<String> {
        self.contents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|text| String::clone(text))
    }
}

impl ClipboardBackend for MemoryClipboard {
    fn set_text(&mut self, text: &str) -> VaultResult<()> {
        *self.contents.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(Zeroizing::new(text.to_string()));
        Ok(())
    }

    fn clear(&mut self) -> VaultResult<()> {
        *self.contents.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

const NO_ARGS: &[&str] = &[];
const XCLIP_ARGS: &[&str] = &["-selection", "clipboard"];
const XSEL_ARGS: &[&str] = &["--clipboard", "--input"];

/// System clipboard driven through the platform's copy utility
#[derive(Debug, Clone)]
pub struct CommandClipboard {
    program: &'static str,
    args: &'static [&'static str],
}

impl CommandClipboard {
    /// Pick the copy utility for this platform, if one is installed
    pub fn detect() -> Option<Self> {
        let mut candidates: Vec<(&'static str, &'static [&'static str])> = Vec::new();
        if cfg!(target_os = "macos") {
            candidates.push(("pbcopy", NO_ARGS));
        } else if cfg!(target_os = "windows") {
            candidates.push(("clip", NO_ARGS));
        } else {
            if std::env::var_os("WAYLAND_DISPLAY").is_some() {
                candidates.push(("wl-copy", NO_ARGS));
            }
            candidates.push(("xclip", XCLIP_ARGS));
            candidates.push(("xsel", XSEL_ARGS));
        }

        candidates
            .into_iter()
            .find(|(program, _)| is_installed(program))
            .map(|(program, args)| Self { program, args })
    }

    pub fn program(&self) -> &str {
        self.program
    }

    fn pipe(&self, text: &str) -> VaultResult<()> {
        let mut child = Command::new(self.program)
            .args(self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| VaultError::Clipboard(format!("{}: {}", self.program, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(text.as_bytes())
                .map_err(|e| VaultError::Clipboard(e.to_string()))?;
        }

        let status = child
            .wait()
            .map_err(|e| VaultError::Clipboard(e.to_string()))?;
        if !status.success() {
            return Err(VaultError::Clipboard(format!(
                "{} exited with {}",
                self.program, status
            )));
        }

        debug!("Clipboard updated via {}", self.program);
        Ok(())
    }
}

impl ClipboardBackend for CommandClipboard {
    fn set_text(&mut self, text: &str) -> VaultResult<()> {
        self.pipe(text)
    }

    fn clear(&mut self) -> VaultResult<()> {
        self.pipe("")
    }
}

fn is_installed(program: &str) -> bool {
    let Some(paths) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&paths).any(|dir| {
        dir.join(program).is_file() || dir.join(format!("{program}.exe")).is_file()
    })
}
