//! Purpose: Resolve CLI host flags into a concrete `ReportHost`.
//! Exports: `HostSelection`, `open_host`, `resolve_token_value`.
//! Role: Keeps `main.rs` free of token-file and fixture plumbing.
//! Invariants: A fixture wins over a host url so offline runs never reach the network.
//! Invariants: Token files are trimmed and must not be empty.
use std::path::{Path, PathBuf};
use std::sync::Arc;

use reportpager::api::{Error, ErrorKind, MemoryHost, RemoteHost, ReportHost};

#[derive(Clone, Debug, Default)]
pub(crate) struct HostSelection {
    pub(crate) host_url: Option<String>,
    pub(crate) fixture: Option<PathBuf>,
    pub(crate) token: Option<String>,
}

pub(crate) fn open_host(selection: HostSelection) -> Result<Arc<dyn ReportHost>, Error> {
    if let Some(path) = selection.fixture {
        tracing::debug!(fixture = %path.display(), "using fixture host");
        return Ok(Arc::new(MemoryHost::from_path(&path)?));
    }
    let Some(url) = selection.host_url else {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("no report host configured")
            .with_hint("Pass --host-url (or set REPORTPAGER_HOST_URL), or --fixture for offline runs."));
    };
    let mut host = RemoteHost::new(url)?;
    if let Some(token) = selection.token {
        host = host.with_token(token);
    }
    tracing::debug!(host = %host.base_url(), "using remote host");
    Ok(Arc::new(host))
}

pub(crate) fn resolve_token_value(
    token: Option<String>,
    token_file: Option<PathBuf>,
    flag: &str,
) -> Result<Option<String>, Error> {
    if token.is_some() && token_file.is_some() {
        return Err(Error::new(ErrorKind::Usage)
            .with_message(format!("--{flag} cannot be combined with --{flag}-file"))
            .with_hint(format!("Use --{flag}-file for safer handling, or pass --{flag} for local/dev use.")));
    }
    if let Some(path) = token_file {
        return read_token_file(&path).map(Some);
    }
    Ok(token)
}

fn read_token_file(path: &Path) -> Result<String, Error> {
    let raw = std::fs::read_to_string(path).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message(format!("failed to read token file {}", path.display()))
            .with_source(err)
    })?;
    let token = raw.trim().to_string();
    if token.is_empty() {
        return Err(Error::new(ErrorKind::Usage)
            .with_message(format!("token file {} is empty", path.display())));
    }
    Ok(token)
}
