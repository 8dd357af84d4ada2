//! Variable and watch trees.
//!
//! Everything the frontend can expand is backed by a backend watch. The
//! locals scope is rebuilt from scratch on every request, evaluations are
//! cached per (thread, frame, expression), and all watches are dropped
//! whenever a new stack trace is requested.

use std::collections::HashMap;

use mibridge_dap::{
    DataBreakpointAccessType, DataBreakpointInfoArguments, DataBreakpointInfoResponseBody,
    EvaluateArguments, EvaluateResponseBody, Scope, Source, StackFrame, StackTraceArguments,
    Variable,
};

use crate::backend::{DetailLevel, FrameContext, FrameRange, MiBackend, MiFrame, Watch};
use crate::error::BridgeError;
use crate::handles::{self, GLOBAL_PREFIX, LOCALS_PATH};
use crate::run_state::{decode_frame_id, encode_frame_id};
use crate::session::SessionContext;

/// A backend watch the bridge owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEntry {
    /// Backend watch id.
    pub id: String,
    /// Watched expression.
    pub expression: String,
    /// Frame level it was created in.
    pub frame_level: i64,
    /// Thread it was created in; `None` for global evaluations.
    pub thread_id: Option<i64>,
    /// Last known value.
    pub value: String,
    /// Last known type.
    pub type_name: String,
    /// Last known child count.
    pub child_count: u32,
}

impl WatchEntry {
    fn new(watch: Watch, context: Option<FrameContext>) -> Self {
        Self {
            id: watch.id,
            expression: watch.expression,
            frame_level: context.map_or(0, |c| c.frame_level),
            thread_id: context.and_then(|c| c.thread_id),
            value: watch.value,
            type_name: watch.type_name,
            child_count: watch.child_count,
        }
    }

    /// Handle path for this watch.
    fn path(&self) -> String {
        if self.thread_id.is_none() {
            format!("{GLOBAL_PREFIX}{}", self.id)
        } else {
            self.id.clone()
        }
    }
}

/// Key under which evaluations are cached.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct EvalKey {
    thread_id: Option<i64>,
    frame_level: i64,
    expression: String,
}

/// Watches created for the locals scope and for evaluations.
#[derive(Debug, Default)]
pub struct WatchTable {
    locals: Vec<WatchEntry>,
    evaluations: HashMap<EvalKey, WatchEntry>,
}

impl WatchTable {
    /// Number of live watches.
    pub fn len(&self) -> usize {
        self.locals.len() + self.evaluations.len()
    }

    /// Whether no watch is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Backend id of the cached evaluation watch for the key, if any.
    pub fn evaluation_id(
        &self,
        thread_id: Option<i64>,
        frame_level: i64,
        expression: &str,
    ) -> Option<&str> {
        self.evaluations
            .get(&EvalKey {
                thread_id,
                frame_level,
                expression: expression.to_string(),
            })
            .map(|w| w.id.as_str())
    }

    fn take_locals(&mut self) -> Vec<WatchEntry> {
        std::mem::take(&mut self.locals)
    }

    fn take_all(&mut self) -> Vec<WatchEntry> {
        let mut all = std::mem::take(&mut self.locals);
        all.extend(self.evaluations.drain().map(|(_, w)| w));
        all
    }
}

async fn remove_watches(backend: &dyn MiBackend, watches: Vec<WatchEntry>) {
    for watch in watches {
        if let Err(e) = backend.remove_watch(&watch.id).await {
            tracing::debug!("failed to remove watch {}: {e}", watch.id);
        }
    }
}

/// Drop every watch the bridge owns.
pub async fn purge_watches(backend: &dyn MiBackend, ctx: &mut SessionContext) {
    let watches = ctx.watches.take_all();
    if !watches.is_empty() {
        tracing::debug!("purging {} watch(es)", watches.len());
    }
    remove_watches(backend, watches).await;
}

/// Frames of `args.thread_id`. Purges all watches first.
pub async fn stack_trace(
    backend: &dyn MiBackend,
    ctx: &mut SessionContext,
    args: &StackTraceArguments,
) -> Result<Vec<StackFrame>, BridgeError> {
    purge_watches(backend, ctx).await;

    let low = args.start_frame.unwrap_or(0).max(0);
    let range = FrameRange {
        low_frame: Some(low),
        high_frame: args.levels.filter(|&l| l > 0).map(|l| low + l - 1),
    };
    let frames = backend.get_stack_frames(range).await?;
    Ok(frames
        .into_iter()
        .map(|frame| to_stack_frame(args.thread_id, frame))
        .collect())
}

fn to_stack_frame(thread_id: i64, frame: MiFrame) -> StackFrame {
    let name = frame
        .function
        .or(frame.address)
        .unwrap_or_else(|| "??".to_string());
    let source = match (frame.fullname, frame.filename) {
        (None, None) => None,
        (fullname, filename) => Some(Source {
            name: filename.clone().or_else(|| fullname.clone()),
            path: fullname.or(filename),
        }),
    };
    StackFrame {
        id: encode_frame_id(thread_id, frame.level),
        name,
        source,
        line: frame.line.unwrap_or(0),
        column: 0,
    }
}

/// Select the frame behind `frame_id` and hand out its locals scope.
pub fn scopes(ctx: &mut SessionContext, frame_id: i64) -> Vec<Scope> {
    let (thread_id, level) = decode_frame_id(frame_id);
    ctx.run_state.select_frame(thread_id, level);
    vec![Scope {
        name: "Locals".to_string(),
        variables_reference: ctx.handles.create(LOCALS_PATH),
        expensive: false,
    }]
}

/// Rows for `reference`. Unknown references and backend failures yield
/// an empty list.
pub async fn variables(
    backend: &dyn MiBackend,
    ctx: &mut SessionContext,
    reference: i64,
) -> Vec<Variable> {
    let Some(path) = ctx.handles.get(reference).map(str::to_string) else {
        tracing::debug!("variables: stale reference {reference}");
        return Vec::new();
    };
    if path == LOCALS_PATH {
        locals(backend, ctx).await
    } else {
        children(backend, ctx, &path).await
    }
}

async fn locals(backend: &dyn MiBackend, ctx: &mut SessionContext) -> Vec<Variable> {
    let previous = ctx.watches.take_locals();
    remove_watches(backend, previous).await;

    let context = FrameContext {
        frame_level: ctx.run_state.current_frame_level(),
        thread_id: ctx.run_state.current_thread_id(),
    };
    let listing = match backend
        .get_stack_frame_variables(DetailLevel::All, context)
        .await
    {
        Ok(listing) => listing,
        Err(e) => {
            tracing::warn!("failed to list frame variables: {e}");
            return Vec::new();
        }
    };

    let mut rows = Vec::with_capacity(listing.args.len() + listing.locals.len());
    for var in listing.args.into_iter().chain(listing.locals) {
        match backend.add_watch(&var.name, Some(context)).await {
            Ok(watch) => {
                let entry = WatchEntry::new(watch, Some(context));
                let reference = if entry.child_count > 0 {
                    ctx.handles.create(&entry.path())
                } else {
                    0
                };
                rows.push(Variable {
                    name: var.name,
                    value: entry.value.clone(),
                    variable_type: Some(entry.type_name.clone()),
                    variables_reference: reference,
                });
                ctx.watches.locals.push(entry);
            }
            Err(e) => {
                tracing::debug!("no watch for local {}: {e}", var.name);
                rows.push(Variable {
                    name: var.name,
                    value: var.value.unwrap_or_default(),
                    variable_type: var.type_name,
                    variables_reference: 0,
                });
            }
        }
    }
    rows
}

async fn children(backend: &dyn MiBackend, ctx: &mut SessionContext, path: &str) -> Vec<Variable> {
    let watch_id = handles::watch_id_of(path);
    let prefix = if handles::is_global_path(path) {
        GLOBAL_PREFIX
    } else {
        ""
    };
    let children = match backend.get_watch_children(watch_id, DetailLevel::All).await {
        Ok(children) => children,
        Err(e) => {
            tracing::warn!("failed to list children of {watch_id}: {e}");
            return Vec::new();
        }
    };
    children
        .into_iter()
        .map(|child| {
            let reference = if child.child_count > 0 {
                ctx.handles.create(&format!("{prefix}{}", child.id))
            } else {
                0
            };
            Variable {
                name: child.expression,
                value: child.value,
                variable_type: Some(child.type_name),
                variables_reference: reference,
            }
        })
        .collect()
}

/// Evaluate an expression for the frontend.
///
/// `repl` input goes to the debugger console verbatim. Everything else
/// is evaluated through a cached watch; an expression the backend cannot
/// evaluate yields a null result rather than an error.
pub async fn evaluate(
    backend: &dyn MiBackend,
    ctx: &mut SessionContext,
    args: &EvaluateArguments,
) -> Result<EvaluateResponseBody, BridgeError> {
    if args.context.as_deref() == Some("repl") {
        let output = backend.exec_native_command(&args.expression).await?;
        return Ok(EvaluateResponseBody {
            result: Some(output),
            result_type: None,
            variables_reference: 0,
        });
    }

    let context = match args.frame_id {
        Some(frame_id) => {
            let (thread_id, frame_level) = decode_frame_id(frame_id);
            Some(FrameContext {
                frame_level,
                thread_id: Some(thread_id),
            })
        }
        None => ctx
            .run_state
            .current_thread_id()
            .map(|thread_id| FrameContext {
                frame_level: ctx.run_state.current_frame_level(),
                thread_id: Some(thread_id),
            }),
    };
    let key = EvalKey {
        thread_id: context.and_then(|c| c.thread_id),
        frame_level: context.map_or(0, |c| c.frame_level),
        expression: args.expression.clone(),
    };

    let entry = match ctx.watches.evaluations.remove(&key) {
        Some(existing) => refresh(backend, existing).await,
        None => match backend.add_watch(&args.expression, context).await {
            Ok(watch) => Some(WatchEntry::new(watch, context)),
            Err(e) => {
                tracing::debug!("cannot evaluate '{}': {e}", args.expression);
                None
            }
        },
    };

    let Some(entry) = entry else {
        return Ok(EvaluateResponseBody {
            result: None,
            result_type: None,
            variables_reference: 0,
        });
    };
    let reference = if entry.child_count > 0 {
        ctx.handles.create(&entry.path())
    } else {
        0
    };
    let body = EvaluateResponseBody {
        result: Some(entry.value.clone()),
        result_type: Some(entry.type_name.clone()),
        variables_reference: reference,
    };
    ctx.watches.evaluations.insert(key, entry);
    Ok(body)
}

/// Re-query a cached watch. A watch the backend no longer knows, or one
/// that went out of scope, is dropped.
async fn refresh(backend: &dyn MiBackend, mut entry: WatchEntry) -> Option<WatchEntry> {
    match backend.update_watch(&entry.id, DetailLevel::All).await {
        Ok(changes) => {
            let changes: Vec<_> = changes.into_iter().filter(|c| c.id == entry.id).collect();
            if changes.iter().any(|c| !c.in_scope) {
                tracing::debug!("watch {} left scope", entry.id);
                remove_watches(backend, vec![entry]).await;
                return None;
            }
            for change in changes {
                if let Some(value) = change.value {
                    entry.value = value;
                }
                if let Some(type_name) = change.new_type {
                    entry.type_name = type_name;
                }
                if let Some(count) = change.new_child_count {
                    entry.child_count = count;
                }
            }
            Some(entry)
        }
        Err(e) => {
            tracing::debug!("watch {} could not be refreshed: {e}", entry.id);
            remove_watches(backend, vec![entry]).await;
            None
        }
    }
}

/// Whether a data breakpoint can be placed on `args.name`.
///
/// Only entities evaluated outside any frame qualify: children of a global
/// watch, or a bare name with no container reference.
pub fn data_breakpoint_info(
    ctx: &SessionContext,
    args: &DataBreakpointInfoArguments,
) -> DataBreakpointInfoResponseBody {
    let global = match args.variables_reference {
        None | Some(0) => !args.name.is_empty(),
        Some(reference) => ctx
            .handles
            .get(reference)
            .is_some_and(handles::is_global_path),
    };
    if global {
        DataBreakpointInfoResponseBody {
            data_id: Some(args.name.clone()),
            description: args.name.clone(),
            access_types: Some(vec![DataBreakpointAccessType::Read]),
            can_persist: Some(true),
        }
    } else {
        DataBreakpointInfoResponseBody {
            data_id: None,
            description: "Only global variables can be watched".to_string(),
            access_types: None,
            can_persist: None,
        }
    }
}
