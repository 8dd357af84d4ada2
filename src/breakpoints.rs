//! Breakpoint synchronization.
//!
//! The frontend declares the complete breakpoint set of one file at a time.
//! Every declaration replaces what the backend holds for that file: the
//! previously registered ids are deleted and each requested line is
//! inserted again. If the target is running it is paused for the update and
//! resumed afterwards.

use std::collections::HashMap;

use mibridge_dap::{Breakpoint, Source, SourceBreakpoint};

use crate::backend::{BreakpointInfo, BreakpointOptions, MiBackend};
use crate::error::BridgeError;
use crate::session::SessionContext;

/// A breakpoint the backend accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakpointRecord {
    /// Source file the frontend declared it in.
    pub source_path: String,
    /// Requested line.
    pub line: i64,
    /// Condition expression.
    pub condition: Option<String>,
    /// Backend breakpoint number.
    pub backend_id: i64,
}

/// Registered breakpoints keyed by source path.
///
/// Ids whose removal the backend refused stay listed as orphans of their
/// path until a later declaration removes them.
#[derive(Debug, Default)]
pub struct BreakpointStore {
    by_path: HashMap<String, Vec<BreakpointRecord>>,
    orphans: HashMap<String, Vec<i64>>,
}

impl BreakpointStore {
    /// Records for `path`, in declaration order.
    pub fn get(&self, path: &str) -> &[BreakpointRecord] {
        self.by_path.get(path).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Backend ids held for `path`: its records first, then its orphans.
    pub fn backend_ids(&self, path: &str) -> Vec<i64> {
        let orphans = self.orphans.get(path).map(Vec::as_slice).unwrap_or(&[]);
        self.get(path)
            .iter()
            .map(|r| r.backend_id)
            .chain(orphans.iter().copied())
            .collect()
    }

    /// Replace the records of `path` and forget its orphans.
    pub fn replace(&mut self, path: &str, records: Vec<BreakpointRecord>) {
        self.orphans.remove(path);
        if records.is_empty() {
            self.by_path.remove(path);
        } else {
            self.by_path.insert(path.to_string(), records);
        }
    }

    /// Remember backend ids of `path` that are still set but no longer
    /// declared.
    pub fn orphan(&mut self, path: &str, ids: Vec<i64>) {
        if !ids.is_empty() {
            self.orphans.entry(path.to_string()).or_default().extend(ids);
        }
    }

    /// Total number of records.
    pub fn len(&self) -> usize {
        self.by_path.values().map(Vec::len).sum()
    }

    /// Whether no breakpoint is registered.
    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }
}

/// Make the backend's breakpoints in `source_path` match `desired`.
///
/// Individual insert failures come back as unverified entries; a failure
/// to pause the target fails the whole request. With `verify_resolved`
/// unset, every accepted breakpoint is reported verified.
pub async fn set_breakpoints(
    backend: &dyn MiBackend,
    ctx: &mut SessionContext,
    source_path: &str,
    desired: &[SourceBreakpoint],
    verify_resolved: bool,
) -> Result<Vec<Breakpoint>, BridgeError> {
    let resume_owed = if ctx.run_state.is_running() {
        backend.pause().await?;
        true
    } else {
        false
    };

    let stale = ctx.breakpoints.backend_ids(source_path);
    let mut leftover = Vec::new();
    if !stale.is_empty() {
        if let Err(e) = backend.remove_breakpoints(&stale).await {
            tracing::warn!("failed to remove breakpoints {stale:?} in {source_path}: {e}");
            leftover.clone_from(&stale);
        }
    }

    let mut records = Vec::with_capacity(desired.len());
    let mut results = Vec::with_capacity(desired.len());
    for bp in desired {
        let location = format!("{source_path}:{}", bp.line);
        let options = BreakpointOptions {
            is_pending: true,
            condition: bp.condition.clone().filter(|c| !c.trim().is_empty()),
        };
        match backend.add_breakpoint(&location, options.clone()).await {
            Ok(info) => {
                results.push(accepted(source_path, bp.line, &info, verify_resolved));
                records.push(BreakpointRecord {
                    source_path: source_path.to_string(),
                    line: bp.line,
                    condition: options.condition,
                    backend_id: info.id,
                });
            }
            Err(e) => {
                tracing::warn!("failed to insert breakpoint at {location}: {e}");
                results.push(Breakpoint {
                    id: None,
                    verified: false,
                    message: Some(e.to_string()),
                    source: Some(source(source_path)),
                    line: Some(bp.line),
                });
            }
        }
    }
    tracing::debug!(
        "{source_path}: {} breakpoint(s) registered, {} replaced",
        records.len(),
        stale.len()
    );
    ctx.breakpoints.replace(source_path, records);
    ctx.breakpoints.orphan(source_path, leftover);

    if resume_owed {
        if let Err(e) = backend.resume_all_inferiors(false).await {
            tracing::warn!("failed to resume after breakpoint update: {e}");
        }
    }

    Ok(results)
}

fn accepted(source_path: &str, line: i64, info: &BreakpointInfo, verify_resolved: bool) -> Breakpoint {
    let resolved = info.pending.is_none();
    let verified = resolved || !verify_resolved;
    Breakpoint {
        id: Some(info.id),
        verified,
        message: (!verified).then(|| "location not yet resolved".to_string()),
        source: Some(source(source_path)),
        line: Some(info.line.unwrap_or(line)),
    }
}

fn source(path: &str) -> Source {
    let name = std::path::Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned());
    Source {
        name,
        path: Some(path.to_string()),
    }
}
