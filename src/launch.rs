//! Launch and attach sequencing.
//!
//! Both requests run the same short-circuiting pipeline: start the
//! debugger, wait for the frontend to finish configuring and for the
//! debugger to come up, load the program, optionally connect to a remote
//! stub, then run or attach to the inferior. Any failure is reported to the
//! user and ends the session with a single `terminated` event.

use mibridge_config::HandshakeConfig;
use mibridge_dap::{AttachRequestArguments, FileTransfer, LaunchRequestArguments};
use tokio::sync::Mutex;

use crate::backend::{MiBackend, RemoteMode};
use crate::error::BridgeError;
use crate::events::{BridgeEvent, EventSink};
use crate::progress::ProgressManager;
use crate::session::SessionContext;
use crate::signal::Signal;

/// Remote target settings of a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotePlan {
    /// `host:port` or device of the stub.
    pub address: Option<String>,
    /// `remote` or `extended-remote`.
    pub mode: Option<String>,
    /// Program path on the target, defaulting to the local program.
    pub exec_file: Option<String>,
    /// Files to upload before starting.
    pub transfers: Vec<FileTransfer>,
}

/// How the inferior is brought up at the end of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartKind {
    /// Run the program.
    Launch,
    /// Attach to a running process.
    Attach {
        /// Process to attach to.
        pid: Option<i64>,
    },
}

/// Everything the pipeline needs, taken from launch or attach arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    /// Launch or attach.
    pub kind: StartKind,
    /// Local program path.
    pub program: Option<String>,
    /// Program arguments.
    pub program_args: Vec<String>,
    /// Debugger executable override.
    pub debugger_path: Option<String>,
    /// Extra debugger arguments.
    pub debugger_args: Vec<String>,
    /// Working directory for the debugger.
    pub cwd: Option<String>,
    /// Remote target, if any.
    pub remote: Option<RemotePlan>,
}

impl LaunchPlan {
    /// Plan for a `launch` request.
    pub fn from_launch(args: LaunchRequestArguments) -> Self {
        Self {
            kind: StartKind::Launch,
            program: args.program,
            program_args: args.args,
            debugger_path: args.debugger_path,
            debugger_args: args.debugger_args,
            cwd: args.cwd,
            remote: args.remote.map(|r| RemotePlan {
                address: r.address,
                mode: r.mode,
                exec_file: r.exec_file,
                transfers: r.transfers,
            }),
        }
    }

    /// Plan for an `attach` request.
    pub fn from_attach(args: AttachRequestArguments) -> Self {
        Self {
            kind: StartKind::Attach {
                pid: args.process_id,
            },
            program: args.program,
            program_args: Vec::new(),
            debugger_path: args.debugger_path,
            debugger_args: args.debugger_args,
            cwd: args.cwd,
            remote: args.remote.map(|r| RemotePlan {
                address: r.address,
                mode: r.mode,
                exec_file: r.exec_file,
                transfers: r.transfers,
            }),
        }
    }
}

/// Result of a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchOutcome {
    /// The inferior is running or attached.
    Started,
    /// The pipeline stopped early; the session has been terminated.
    Failed(String),
}

/// Runs one [`LaunchPlan`] against a backend.
pub struct LaunchOrchestrator<'a> {
    pub(crate) backend: &'a dyn MiBackend,
    pub(crate) session: &'a Mutex<SessionContext>,
    pub(crate) events: &'a EventSink,
    pub(crate) progress: &'a ProgressManager,
    pub(crate) configuration_done: &'a Signal,
    pub(crate) session_started: &'a Signal,
    pub(crate) handshake: &'a HandshakeConfig,
}

impl LaunchOrchestrator<'_> {
    /// Run the pipeline to completion or to its first failure.
    pub async fn run(&self, plan: &LaunchPlan) -> LaunchOutcome {
        match self.steps(plan).await {
            Ok(()) => {
                tracing::info!("debuggee started");
                LaunchOutcome::Started
            }
            Err(e) => {
                let message = e.to_string();
                self.fail(&message).await;
                LaunchOutcome::Failed(message)
            }
        }
    }

    async fn steps(&self, plan: &LaunchPlan) -> Result<(), BridgeError> {
        let debugger_path = plan.debugger_path.as_deref();
        self.backend.start(debugger_path, &plan.debugger_args).await?;
        self.events.emit(BridgeEvent::Initialized);

        if !self
            .configuration_done
            .wait(self.handshake.configuration_done_timeout())
            .await
        {
            tracing::warn!("no configurationDone within timeout, proceeding");
        }
        if !self
            .session_started
            .wait(self.handshake.session_started_timeout())
            .await
        {
            tracing::warn!("debugger did not report session start within timeout, proceeding");
        }

        if let Some(cwd) = &plan.cwd {
            self.backend.environment_cd(cwd).await?;
        }

        match (&plan.program, plan.kind) {
            (Some(program), _) => self.backend.set_executable_file(program).await?,
            (None, StartKind::Launch) => {
                return Err(BridgeError::Configuration(
                    "no program given to launch".to_string(),
                ))
            }
            (None, StartKind::Attach { .. }) => {}
        }
        if !plan.program_args.is_empty() {
            let quoted: Vec<String> = plan.program_args.iter().map(|a| quote_arg(a)).collect();
            let command = format!("set args {}", quoted.join(" "));
            self.backend.exec_native_command(&command).await?;
        }

        if let Some(remote) = &plan.remote {
            let done = self.connect_remote(plan, remote).await?;
            if done {
                return Ok(());
            }
        }

        match plan.kind {
            StartKind::Launch => self.backend.start_inferior().await?,
            StartKind::Attach { pid: Some(pid) } => self.backend.target_attach(pid).await?,
            StartKind::Attach { pid: None } => {
                return Err(BridgeError::Configuration(
                    "no process id given to attach to".to_string(),
                ))
            }
        }
        Ok(())
    }

    /// Connect to the stub. Returns `true` when the connection already
    /// left the inferior running.
    async fn connect_remote(&self, plan: &LaunchPlan, remote: &RemotePlan) -> Result<bool, BridgeError> {
        let address = remote
            .address
            .as_deref()
            .filter(|a| !a.trim().is_empty())
            .ok_or_else(|| BridgeError::Configuration("remote target has no address".to_string()))?;
        let mode_name = remote.mode.as_deref().unwrap_or("remote");
        let mode = RemoteMode::parse(mode_name).ok_or_else(|| {
            BridgeError::Configuration(format!("unknown remote mode '{mode_name}'"))
        })?;

        tracing::info!("connecting to {address} ({})", mode.as_str());
        self.backend.connect_to_remote_target(address, mode).await?;

        match mode {
            RemoteMode::Remote => {
                self.backend.resume_inferior().await?;
                Ok(true)
            }
            RemoteMode::ExtendedRemote => {
                for transfer in &remote.transfers {
                    self.upload(transfer).await;
                }
                if let Some(exec_file) = remote.exec_file.as_ref().or(plan.program.as_ref()) {
                    self.backend
                        .interpreter_exec(&format!("set remote exec-file {exec_file}"))
                        .await?;
                }
                Ok(false)
            }
        }
    }

    /// Upload one file under its own progress sequence. Failures end the
    /// sequence with an error message and do not stop the pipeline.
    async fn upload(&self, transfer: &FileTransfer) {
        let session = self.progress.begin(format!("Uploading {}", transfer.from), false);
        session.update(Some(format!("{} -> {}", transfer.from, transfer.to)), None);
        match self.backend.target_file_put(&transfer.from, &transfer.to).await {
            Ok(()) => session.finish(format!("Uploaded {}", transfer.to)),
            Err(e) => {
                tracing::warn!("upload of {} failed: {e}", transfer.from);
                session.finish(format!("Failed to upload {}: {e}", transfer.from));
            }
        }
    }

    async fn fail(&self, message: &str) {
        tracing::error!("launch failed: {message}");
        self.events.report_failure(message);
        if let Err(e) = self.backend.end(false).await {
            tracing::debug!("debugger shutdown after failed launch: {e}");
        }
        let mut ctx = self.session.lock().await;
        ctx.run_state.set_ended();
        if ctx.claim_termination() {
            self.events.emit(BridgeEvent::Terminated);
        }
    }
}

/// Quote one program argument for the debugger's shell-style argument
/// line. Arguments made only of safe characters pass through unchanged.
fn quote_arg(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', "'\\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockBackend;
    use mibridge_config::ProgressConfig;
    use mibridge_dap::RemoteArguments;
    use tokio::sync::mpsc::UnboundedReceiver;

    struct Fixture {
        backend: MockBackend,
        session: Mutex<SessionContext>,
        events: EventSink,
        rx: UnboundedReceiver<BridgeEvent>,
        progress: ProgressManager,
        configuration_done: Signal,
        session_started: Signal,
        handshake: HandshakeConfig,
    }

    impl Fixture {
        fn new() -> Self {
            let (events, rx) = EventSink::channel();
            let progress = ProgressManager::new(events.clone(), ProgressConfig::default());
            let configuration_done = Signal::new();
            configuration_done.fire();
            let session_started = Signal::new();
            session_started.fire();
            Self {
                backend: MockBackend::new(),
                session: Mutex::new(SessionContext::new()),
                events,
                rx,
                progress,
                configuration_done,
                session_started,
                handshake: HandshakeConfig::default(),
            }
        }

        async fn run(&self, plan: &LaunchPlan) -> LaunchOutcome {
            LaunchOrchestrator {
                backend: &self.backend,
                session: &self.session,
                events: &self.events,
                progress: &self.progress,
                configuration_done: &self.configuration_done,
                session_started: &self.session_started,
                handshake: &self.handshake,
            }
            .run(plan)
            .await
        }

        fn events(&mut self) -> Vec<BridgeEvent> {
            std::iter::from_fn(|| self.rx.try_recv().ok()).collect()
        }
    }

    fn launch_plan(program: &str) -> LaunchPlan {
        LaunchPlan::from_launch(LaunchRequestArguments {
            program: Some(program.into()),
            args: Vec::new(),
            cwd: None,
            debugger_path: None,
            debugger_args: Vec::new(),
            remote: None,
        })
    }

    fn with_remote(mut plan: LaunchPlan, mode: &str, transfers: Vec<FileTransfer>) -> LaunchPlan {
        plan.remote = Some(RemotePlan {
            address: Some("localhost:2345".into()),
            mode: Some(mode.into()),
            exec_file: None,
            transfers,
        });
        plan
    }

    fn terminated_count(events: &[BridgeEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, BridgeEvent::Terminated))
            .count()
    }

    #[tokio::test]
    async fn local_launch_runs_every_step_in_order() {
        let mut fx = Fixture::new();
        let mut plan = launch_plan("/bin/app");
        plan.cwd = Some("/work".into());
        plan.program_args = vec!["--verbose".into(), "input.txt".into()];

        assert_eq!(fx.run(&plan).await, LaunchOutcome::Started);
        assert_eq!(
            fx.backend.calls(),
            vec![
                "start gdb",
                "environment_cd /work",
                "set_executable_file /bin/app",
                "exec_native_command set args --verbose input.txt",
                "start_inferior",
            ]
        );
        let events = fx.events();
        assert!(matches!(events[0], BridgeEvent::Initialized));
        assert_eq!(terminated_count(&events), 0);
    }

    #[tokio::test]
    async fn program_arguments_keep_their_boundaries() {
        let mut fx = Fixture::new();
        let mut plan = launch_plan("/bin/app");
        plan.program_args = vec!["a b".into(), "it's".into(), "".into(), "plain".into()];

        assert_eq!(fx.run(&plan).await, LaunchOutcome::Started);
        assert!(fx
            .backend
            .calls()
            .contains(&r"exec_native_command set args 'a b' 'it'\''s' '' plain".to_string()));
    }

    #[test]
    fn quote_arg_leaves_safe_arguments_alone() {
        assert_eq!(quote_arg("--level=3"), "--level=3");
        assert_eq!(quote_arg("/tmp/in.txt"), "/tmp/in.txt");
        assert_eq!(quote_arg("$HOME"), "'$HOME'");
    }

    #[tokio::test]
    async fn exec_file_failure_aborts_and_terminates_once() {
        let mut fx = Fixture::new();
        fx.backend.fail("set_executable_file", "/bin/app: No such file or directory.");
        let plan = with_remote(launch_plan("/bin/app"), "extended-remote", Vec::new());

        let outcome = fx.run(&plan).await;

        assert!(matches!(outcome, LaunchOutcome::Failed(msg) if msg.contains("No such file")));
        assert_eq!(fx.backend.count("connect_to_remote_target"), 0);
        assert_eq!(fx.backend.count("start_inferior"), 0);
        assert_eq!(fx.backend.calls().last().map(String::as_str), Some("end false"));

        let events = fx.events();
        assert_eq!(terminated_count(&events), 1);
        assert!(events.iter().any(|e| matches!(e, BridgeEvent::Output(_))));
        assert!(events.iter().any(|e| matches!(e, BridgeEvent::Host(_))));
        assert!(fx.session.lock().await.run_state.is_ended());
    }

    #[tokio::test]
    async fn plain_remote_resumes_and_skips_start() {
        let fx = Fixture::new();
        let transfers = vec![FileTransfer {
            from: "a".into(),
            to: "b".into(),
        }];
        let plan = with_remote(launch_plan("/bin/app"), "remote", transfers);

        assert_eq!(fx.run(&plan).await, LaunchOutcome::Started);
        let ops = fx.backend.ops();
        assert_eq!(
            &ops[ops.len() - 2..],
            &["connect_to_remote_target", "resume_inferior"]
        );
        assert_eq!(fx.backend.count("target_file_put"), 0);
        assert_eq!(fx.backend.count("interpreter_exec"), 0);
        assert_eq!(fx.backend.count("start_inferior"), 0);
    }

    #[tokio::test]
    async fn extended_remote_transfers_fail_independently() {
        let mut fx = Fixture::new();
        fx.backend.fail("target_file_put", "Remote I/O error: Permission denied");
        let transfers = vec![
            FileTransfer {
                from: "/build/app".into(),
                to: "/opt/app".into(),
            },
            FileTransfer {
                from: "/build/libx.so".into(),
                to: "/opt/libx.so".into(),
            },
        ];
        let plan = with_remote(launch_plan("/build/app"), "extended-remote", transfers);

        assert_eq!(fx.run(&plan).await, LaunchOutcome::Started);
        let calls = fx.backend.calls();
        assert!(calls.contains(&"target_file_put /build/app /opt/app".to_string()));
        assert!(calls.contains(&"target_file_put /build/libx.so /opt/libx.so".to_string()));
        assert!(calls.contains(&"interpreter_exec set remote exec-file /build/app".to_string()));
        assert_eq!(calls.last().map(String::as_str), Some("start_inferior"));

        let events = fx.events();
        let starts: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                BridgeEvent::ProgressStart(s) => Some(s.progress_id.clone()),
                _ => None,
            })
            .collect();
        let ends: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                BridgeEvent::ProgressEnd(end) => Some((end.progress_id.clone(), end.message.clone())),
                _ => None,
            })
            .collect();
        assert_eq!(starts.len(), 2);
        assert_ne!(starts[0], starts[1]);
        assert_eq!(ends.len(), 2);
        assert_eq!(ends[0].0, starts[0]);
        assert!(ends[0].1.as_deref().unwrap().starts_with("Failed to upload"));
        assert!(ends[1].1.as_deref().unwrap().starts_with("Uploaded"));
        assert_eq!(terminated_count(&events), 0);
    }

    #[tokio::test]
    async fn extended_remote_prefers_exec_file_override() {
        let fx = Fixture::new();
        let mut plan = with_remote(launch_plan("/build/app"), "extended-remote", Vec::new());
        if let Some(remote) = plan.remote.as_mut() {
            remote.exec_file = Some("/opt/app".into());
        }
        fx.run(&plan).await;
        assert!(fx
            .backend
            .calls()
            .contains(&"interpreter_exec set remote exec-file /opt/app".to_string()));
    }

    #[tokio::test]
    async fn unknown_mode_is_a_configuration_error() {
        let mut fx = Fixture::new();
        let plan = with_remote(launch_plan("/bin/app"), "serial", Vec::new());

        let outcome = fx.run(&plan).await;
        assert!(matches!(outcome, LaunchOutcome::Failed(msg) if msg.contains("serial")));
        assert_eq!(fx.backend.count("connect_to_remote_target"), 0);
        assert_eq!(terminated_count(&fx.events()), 1);
    }

    #[tokio::test]
    async fn missing_address_is_a_configuration_error() {
        let mut fx = Fixture::new();
        let mut plan = with_remote(launch_plan("/bin/app"), "remote", Vec::new());
        if let Some(remote) = plan.remote.as_mut() {
            remote.address = None;
        }
        assert!(matches!(fx.run(&plan).await, LaunchOutcome::Failed(_)));
        assert_eq!(terminated_count(&fx.events()), 1);
    }

    #[tokio::test]
    async fn start_failure_terminates() {
        let mut fx = Fixture::new();
        fx.backend.fail("start_inferior", "During startup program exited with code 127.");
        assert!(matches!(
            fx.run(&launch_plan("/bin/app")).await,
            LaunchOutcome::Failed(_)
        ));
        assert_eq!(terminated_count(&fx.events()), 1);
    }

    #[tokio::test]
    async fn attach_ends_with_target_attach() {
        let fx = Fixture::new();
        let plan = LaunchPlan::from_attach(AttachRequestArguments {
            process_id: Some(4242),
            program: None,
            cwd: None,
            debugger_path: Some("/usr/bin/gdb-multiarch".into()),
            debugger_args: Vec::new(),
            remote: None,
        });
        assert_eq!(fx.run(&plan).await, LaunchOutcome::Started);
        assert_eq!(
            fx.backend.calls(),
            vec!["start /usr/bin/gdb-multiarch", "target_attach 4242"]
        );
    }

    #[tokio::test]
    async fn attach_without_pid_fails() {
        let mut fx = Fixture::new();
        let plan = LaunchPlan::from_attach(AttachRequestArguments {
            process_id: None,
            program: Some("/bin/app".into()),
            cwd: None,
            debugger_path: None,
            debugger_args: Vec::new(),
            remote: None,
        });
        assert!(matches!(fx.run(&plan).await, LaunchOutcome::Failed(_)));
        assert_eq!(terminated_count(&fx.events()), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn handshake_timeouts_proceed() {
        let mut fx = Fixture::new();
        fx.configuration_done = Signal::new();
        fx.session_started = Signal::new();
        assert_eq!(fx.run(&launch_plan("/bin/app")).await, LaunchOutcome::Started);
        assert_eq!(fx.backend.count("start_inferior"), 1);
    }

    #[test]
    fn launch_plan_from_arguments() {
        let plan = LaunchPlan::from_launch(LaunchRequestArguments {
            program: Some("/bin/app".into()),
            args: vec!["-x".into()],
            cwd: None,
            debugger_path: None,
            debugger_args: Vec::new(),
            remote: Some(RemoteArguments {
                address: Some("board:3333".into()),
                mode: Some("extended-remote".into()),
                exec_file: None,
                transfers: Vec::new(),
            }),
        });
        assert_eq!(plan.kind, StartKind::Launch);
        assert_eq!(plan.program_args, vec!["-x".to_string()]);
        assert_eq!(
            plan.remote.unwrap().address.as_deref(),
            Some("board:3333")
        );
    }
}
