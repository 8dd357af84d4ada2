//! Scripted in-memory backend for unit tests.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::backend::{
    BackendResult, BreakpointInfo, BreakpointOptions, DetailLevel, FrameContext, FrameRange,
    FrameVariables, MiBackend, MiFrame, RemoteMode, ThreadInfo, Watch, WatchChange,
};
use crate::error::BackendError;

/// Backend state the tests script and inspect.
#[derive(Debug, Default)]
pub(crate) struct MockState {
    pub calls: Vec<String>,
    pub failures: HashMap<String, VecDeque<String>>,
    pub next_breakpoint: i64,
    pub breakpoints: BTreeMap<i64, String>,
    pub pending_locations: Vec<String>,
    pub next_watch: u32,
    pub watches: BTreeMap<String, Watch>,
    pub values: HashMap<String, (String, String, u32)>,
    pub children: HashMap<String, Vec<Watch>>,
    pub frame_vars: FrameVariables,
    pub frames: Vec<MiFrame>,
    pub threads: ThreadInfo,
    pub native_output: String,
    pub delays: HashMap<String, Duration>,
    pub out_of_scope: HashSet<String>,
}

#[derive(Debug, Default)]
pub(crate) struct MockBackend {
    state: Mutex<MockState>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next call of `op` fail with `message`.
    pub fn fail(&self, op: &str, message: &str) {
        self.with(|s| {
            s.failures
                .entry(op.to_string())
                .or_default()
                .push_back(message.to_string())
        });
    }

    /// Make every call of `op` take `delay` before it is recorded.
    pub fn delay(&self, op: &str, delay: Duration) {
        self.with(|s| s.delays.insert(op.to_string(), delay));
    }

    /// Report the watch on `expression` as out of scope on its next update.
    pub fn leave_scope(&self, expression: &str) {
        self.with(|s| s.out_of_scope.insert(expression.to_string()));
    }

    async fn stall(&self, op: &str) {
        let delay = self.with(|s| s.delays.get(op).copied());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    /// Every call so far, as `op arg…`.
    pub fn calls(&self) -> Vec<String> {
        self.with(|s| s.calls.clone())
    }

    /// Operation names only.
    pub fn ops(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .map(|c| c.split(' ').next().unwrap_or_default().to_string())
            .collect()
    }

    pub fn count(&self, op: &str) -> usize {
        self.ops().iter().filter(|o| *o == op).count()
    }

    pub fn live_breakpoints(&self) -> Vec<String> {
        self.with(|s| s.breakpoints.values().cloned().collect())
    }

    pub fn live_watches(&self) -> Vec<String> {
        self.with(|s| s.watches.keys().cloned().collect())
    }

    pub fn set_value(&self, expression: &str, value: &str, type_name: &str, child_count: u32) {
        self.with(|s| {
            s.values.insert(
                expression.to_string(),
                (value.to_string(), type_name.to_string(), child_count),
            )
        });
    }

    fn record(&self, op: &str, detail: String) -> BackendResult<()> {
        self.with(|s| {
            if detail.is_empty() {
                s.calls.push(op.to_string());
            } else {
                s.calls.push(format!("{op} {detail}"));
            }
            match s.failures.get_mut(op).and_then(VecDeque::pop_front) {
                Some(message) => Err(BackendError::rejected(op, message)),
                None => Ok(()),
            }
        })
    }
}

#[async_trait]
impl MiBackend for MockBackend {
    async fn start(&self, debugger_path: Option<&str>, args: &[String]) -> BackendResult<()> {
        let mut detail = debugger_path.unwrap_or("gdb").to_string();
        for arg in args {
            detail.push(' ');
            detail.push_str(arg);
        }
        self.record("start", detail)
    }

    async fn environment_cd(&self, dir: &str) -> BackendResult<()> {
        self.record("environment_cd", dir.to_string())
    }

    async fn set_executable_file(&self, path: &str) -> BackendResult<()> {
        self.record("set_executable_file", path.to_string())
    }

    async fn connect_to_remote_target(&self, address: &str, mode: RemoteMode) -> BackendResult<()> {
        self.record(
            "connect_to_remote_target",
            format!("{address} {}", mode.as_str()),
        )
    }

    async fn resume_inferior(&self) -> BackendResult<()> {
        self.record("resume_inferior", String::new())
    }

    async fn start_inferior(&self) -> BackendResult<()> {
        self.record("start_inferior", String::new())
    }

    async fn target_attach(&self, pid: i64) -> BackendResult<()> {
        self.record("target_attach", pid.to_string())
    }

    async fn target_file_put(&self, from: &str, to: &str) -> BackendResult<()> {
        self.record("target_file_put", format!("{from} {to}"))
    }

    async fn exec_native_command(&self, command: &str) -> BackendResult<String> {
        self.record("exec_native_command", command.to_string())?;
        Ok(self.with(|s| s.native_output.clone()))
    }

    async fn interpreter_exec(&self, command: &str) -> BackendResult<()> {
        self.record("interpreter_exec", command.to_string())
    }

    async fn pause(&self) -> BackendResult<()> {
        self.record("pause", String::new())
    }

    async fn add_breakpoint(
        &self,
        location: &str,
        options: BreakpointOptions,
    ) -> BackendResult<BreakpointInfo> {
        let detail = match &options.condition {
            Some(condition) => format!("{location} if {condition}"),
            None => location.to_string(),
        };
        self.stall("add_breakpoint").await;
        self.record("add_breakpoint", detail)?;
        Ok(self.with(|s| {
            s.next_breakpoint += 1;
            let id = s.next_breakpoint;
            s.breakpoints.insert(id, location.to_string());
            let pending = s.pending_locations.iter().any(|p| p == location);
            let (file, line) = location.rsplit_once(':').unwrap_or((location, "0"));
            BreakpointInfo {
                id,
                pending: pending.then(|| location.to_string()),
                fullname: (!pending).then(|| file.to_string()),
                line: if pending { None } else { line.parse().ok() },
            }
        }))
    }

    async fn remove_breakpoints(&self, ids: &[i64]) -> BackendResult<()> {
        let detail = ids.iter().map(i64::to_string).collect::<Vec<_>>().join(",");
        self.record("remove_breakpoints", detail)?;
        self.with(|s| {
            for id in ids {
                s.breakpoints.remove(id);
            }
        });
        Ok(())
    }

    async fn get_threads(&self) -> BackendResult<ThreadInfo> {
        self.record("get_threads", String::new())?;
        Ok(self.with(|s| s.threads.clone()))
    }

    async fn get_stack_frames(&self, range: FrameRange) -> BackendResult<Vec<MiFrame>> {
        self.record(
            "get_stack_frames",
            format!("{:?} {:?}", range.low_frame, range.high_frame),
        )?;
        Ok(self.with(|s| {
            s.frames
                .iter()
                .filter(|f| range.low_frame.map_or(true, |low| f.level >= low))
                .filter(|f| range.high_frame.map_or(true, |high| f.level <= high))
                .cloned()
                .collect()
        }))
    }

    async fn get_stack_frame_variables(
        &self,
        _detail: DetailLevel,
        context: FrameContext,
    ) -> BackendResult<FrameVariables> {
        self.record(
            "get_stack_frame_variables",
            format!("{:?} {}", context.thread_id, context.frame_level),
        )?;
        Ok(self.with(|s| s.frame_vars.clone()))
    }

    async fn add_watch(
        &self,
        expression: &str,
        _context: Option<FrameContext>,
    ) -> BackendResult<Watch> {
        self.record("add_watch", expression.to_string())?;
        Ok(self.with(|s| {
            s.next_watch += 1;
            let (value, type_name, child_count) = s
                .values
                .get(expression)
                .cloned()
                .unwrap_or_else(|| ("0".to_string(), "int".to_string(), 0));
            let watch = Watch {
                id: format!("var{}", s.next_watch),
                expression: expression.to_string(),
                value,
                type_name,
                child_count,
            };
            s.watches.insert(watch.id.clone(), watch.clone());
            watch
        }))
    }

    async fn update_watch(&self, id: &str, _detail: DetailLevel) -> BackendResult<Vec<WatchChange>> {
        self.record("update_watch", id.to_string())?;
        Ok(self.with(|s| {
            let Some(watch) = s.watches.get(id).cloned() else {
                return Vec::new();
            };
            if s.out_of_scope.contains(&watch.expression) {
                return vec![WatchChange {
                    id: id.to_string(),
                    value: None,
                    in_scope: false,
                    new_type: None,
                    new_child_count: None,
                }];
            }
            let Some((value, type_name, child_count)) = s.values.get(&watch.expression).cloned()
            else {
                return Vec::new();
            };
            if value == watch.value && type_name == watch.type_name && child_count == watch.child_count {
                return Vec::new();
            }
            let change = WatchChange {
                id: id.to_string(),
                value: Some(value.clone()),
                in_scope: true,
                new_type: (type_name != watch.type_name).then(|| type_name.clone()),
                new_child_count: (child_count != watch.child_count).then_some(child_count),
            };
            s.watches.insert(
                id.to_string(),
                Watch {
                    value,
                    type_name,
                    child_count,
                    ..watch
                },
            );
            vec![change]
        }))
    }

    async fn get_watch_children(&self, id: &str, _detail: DetailLevel) -> BackendResult<Vec<Watch>> {
        self.record("get_watch_children", id.to_string())?;
        Ok(self.with(|s| s.children.get(id).cloned().unwrap_or_default()))
    }

    async fn remove_watch(&self, id: &str) -> BackendResult<()> {
        self.record("remove_watch", id.to_string())?;
        self.with(|s| s.watches.remove(id));
        Ok(())
    }

    async fn resume_all_inferiors(&self, reverse: bool) -> BackendResult<()> {
        self.record("resume_all_inferiors", reverse.to_string())
    }

    async fn step_over_line(&self, thread_id: i64) -> BackendResult<()> {
        self.record("step_over_line", thread_id.to_string())
    }

    async fn step_into_line(&self, thread_id: i64) -> BackendResult<()> {
        self.record("step_into_line", thread_id.to_string())
    }

    async fn step_out(&self, thread_id: i64) -> BackendResult<()> {
        self.record("step_out", thread_id.to_string())
    }

    async fn end(&self, force: bool) -> BackendResult<()> {
        self.record("end", force.to_string())
    }
}
