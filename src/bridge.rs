//! The bridge: one debug session between a frontend and a backend.
//!
//! [`Bridge`] owns the backend handle and the [`SessionContext`], exposes
//! one method per frontend request, and routes backend events into state
//! changes and frontend notifications.

use std::sync::Arc;

use mibridge_config::Config;
use mibridge_dap::{
    bridge_capabilities, AttachRequestArguments, CancelArguments, Capabilities,
    ContinueResponseBody, ContinuedEventBody, DataBreakpointInfoArguments,
    DataBreakpointInfoResponseBody, DisconnectArguments, EvaluateArguments, EvaluateResponseBody,
    ExitedEventBody, InitializeRequestArguments, LaunchRequestArguments, OutputEventBody,
    ScopesArguments, ScopesResponseBody, SetBreakpointsArguments, SetBreakpointsResponseBody, StackTraceArguments,
    StackTraceResponseBody, StoppedEventBody, TerminateThreadsArguments, Thread, ThreadArguments,
    ThreadsResponseBody, VariablesArguments, VariablesResponseBody,
};
use tokio::sync::{mpsc, Mutex};

use crate::backend::{BackendEvent, MiBackend, MiThread};
use crate::breakpoints;
use crate::error::BridgeError;
use crate::events::{BridgeEvent, EventSink};
use crate::launch::{LaunchOrchestrator, LaunchOutcome, LaunchPlan};
use crate::progress::ProgressManager;
use crate::run_state::StopOutcome;
use crate::session::SessionContext;
use crate::signal::Signal;
use crate::variables;

/// Handle to a bridge session. Cheap to clone; clones share the session.
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<Inner>,
}

struct Inner {
    backend: Arc<dyn MiBackend>,
    session: Mutex<SessionContext>,
    events: EventSink,
    progress: ProgressManager,
    configuration_done: Signal,
    session_started: Signal,
    config: Config,
}

impl Bridge {
    /// Create a bridge driving `backend`. Frontend notifications arrive on
    /// the returned receiver.
    pub fn new(
        backend: Arc<dyn MiBackend>,
        config: Config,
    ) -> (Self, mpsc::UnboundedReceiver<BridgeEvent>) {
        let (events, rx) = EventSink::channel();
        let progress = ProgressManager::new(events.clone(), config.progress.clone());
        let bridge = Self {
            inner: Arc::new(Inner {
                backend,
                session: Mutex::new(SessionContext::new()),
                events,
                progress,
                configuration_done: Signal::new(),
                session_started: Signal::new(),
                config,
            }),
        };
        (bridge, rx)
    }

    fn backend(&self) -> &dyn MiBackend {
        self.inner.backend.as_ref()
    }

    async fn ensure_active(&self) -> Result<(), BridgeError> {
        self.inner.session.lock().await.run_state.ensure_active()
    }

    // -----------------------------------------------------------------------
    // Backend events
    // -----------------------------------------------------------------------

    /// Consume backend events in arrival order until the channel closes.
    pub async fn run_backend_events(&self, mut rx: mpsc::UnboundedReceiver<BackendEvent>) {
        while let Some(event) = rx.recv().await {
            self.route_backend_event(event).await;
        }
        tracing::debug!("backend event stream closed");
    }

    /// Apply one backend event.
    pub async fn route_backend_event(&self, event: BackendEvent) {
        tracing::debug!("backend event: {event:?}");
        match event {
            BackendEvent::SessionStarted => self.inner.session_started.fire(),
            BackendEvent::ConsoleOutput(text) => {
                self.inner.events.emit(BridgeEvent::Output(OutputEventBody {
                    category: Some("console".into()),
                    output: text,
                }));
            }
            BackendEvent::TargetRunning => {
                let mut ctx = self.inner.session.lock().await;
                if ctx.run_state.is_ended() {
                    return;
                }
                ctx.run_state.set_running();
                if let Some(thread_id) = ctx.run_state.current_thread_id() {
                    self.inner.events.emit(BridgeEvent::Continued(ContinuedEventBody {
                        thread_id,
                        all_threads_continued: Some(true),
                    }));
                }
            }
            BackendEvent::TargetStopped { reason, thread_id }
            | BackendEvent::BreakpointHit { reason, thread_id }
            | BackendEvent::SignalReceived { reason, thread_id } => {
                let mut ctx = self.inner.session.lock().await;
                let ctx = &mut *ctx;
                match ctx
                    .run_state
                    .set_stopped(&reason, thread_id, &mut ctx.handles)
                {
                    Some(StopOutcome::Stopped {
                        reason,
                        thread_id,
                        description,
                    }) => {
                        self.inner.events.emit(BridgeEvent::Stopped(StoppedEventBody {
                            reason,
                            description,
                            thread_id,
                            all_threads_stopped: Some(true),
                        }));
                    }
                    Some(StopOutcome::Ended { exit_code }) => {
                        tracing::info!("debuggee exited with {exit_code:?}");
                        if let Some(exit_code) = exit_code {
                            self.inner
                                .events
                                .emit(BridgeEvent::Exited(ExitedEventBody { exit_code }));
                        }
                        if ctx.claim_termination() {
                            self.inner.events.emit(BridgeEvent::Terminated);
                        }
                    }
                    None => {}
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Session lifecycle
    // -----------------------------------------------------------------------

    /// `initialize`
    pub fn initialize(&self, args: InitializeRequestArguments) -> Capabilities {
        tracing::info!(
            "initialize from {} (adapter {:?}, progress reporting {:?})",
            args.client_name
                .as_deref()
                .or(args.client_id.as_deref())
                .unwrap_or("unknown client"),
            args.adapter_id,
            args.supports_progress_reporting,
        );
        bridge_capabilities()
    }

    /// `launch`
    pub async fn launch(&self, args: LaunchRequestArguments) -> Result<LaunchOutcome, BridgeError> {
        self.ensure_active().await?;
        Ok(self.run_pipeline(LaunchPlan::from_launch(args)).await)
    }

    /// `attach`
    pub async fn attach(&self, args: AttachRequestArguments) -> Result<LaunchOutcome, BridgeError> {
        self.ensure_active().await?;
        Ok(self.run_pipeline(LaunchPlan::from_attach(args)).await)
    }

    async fn run_pipeline(&self, plan: LaunchPlan) -> LaunchOutcome {
        let inner = &self.inner;
        LaunchOrchestrator {
            backend: inner.backend.as_ref(),
            session: &inner.session,
            events: &inner.events,
            progress: &inner.progress,
            configuration_done: &inner.configuration_done,
            session_started: &inner.session_started,
            handshake: &inner.config.handshake,
        }
        .run(&plan)
        .await
    }

    /// `configurationDone`
    pub fn configuration_done(&self) {
        self.inner.configuration_done.fire();
    }

    /// `disconnect`: pause a running target, then force the debugger down.
    pub async fn disconnect(&self, args: DisconnectArguments) {
        let mut ctx = self.inner.session.lock().await;
        tracing::info!("disconnect (terminate_debuggee={:?})", args.terminate_debuggee);
        if ctx.run_state.is_running() {
            if let Err(e) = self.backend().pause().await {
                tracing::warn!("pause before disconnect failed: {e}");
            }
        }
        if let Err(e) = self.backend().end(true).await {
            tracing::warn!("debugger shutdown failed: {e}");
        }
        ctx.run_state.set_ended();
    }

    // -----------------------------------------------------------------------
    // Breakpoints
    // -----------------------------------------------------------------------

    /// `setBreakpoints`
    pub async fn set_breakpoints(
        &self,
        args: SetBreakpointsArguments,
    ) -> Result<SetBreakpointsResponseBody, BridgeError> {
        let path = args
            .source
            .path
            .clone()
            .ok_or_else(|| BridgeError::InvalidArguments("source has no path".to_string()))?;
        let mut ctx = self.inner.session.lock().await;
        ctx.run_state.ensure_active()?;
        let breakpoints = breakpoints::set_breakpoints(
            self.backend(),
            &mut ctx,
            &path,
            &args.breakpoints,
            self.inner.config.breakpoints.verify_resolved,
        )
        .await?;
        Ok(SetBreakpointsResponseBody { breakpoints })
    }

    /// `dataBreakpointInfo`
    pub async fn data_breakpoint_info(
        &self,
        args: DataBreakpointInfoArguments,
    ) -> DataBreakpointInfoResponseBody {
        let ctx = self.inner.session.lock().await;
        variables::data_breakpoint_info(&ctx, &args)
    }

    // -----------------------------------------------------------------------
    // Inspection
    // -----------------------------------------------------------------------

    /// `threads`
    pub async fn threads(&self) -> Result<ThreadsResponseBody, BridgeError> {
        self.ensure_active().await?;
        let info = self.backend().get_threads().await?;
        let mut threads = Vec::with_capacity(info.all.len() + 1);
        if let Some(current) = &info.current {
            if !info.all.iter().any(|t| t.id == current.id) {
                threads.push(to_thread(current));
            }
        }
        threads.extend(info.all.iter().map(to_thread));
        Ok(ThreadsResponseBody { threads })
    }

    /// `stackTrace`
    pub async fn stack_trace(
        &self,
        args: StackTraceArguments,
    ) -> Result<StackTraceResponseBody, BridgeError> {
        let mut ctx = self.inner.session.lock().await;
        ctx.run_state.ensure_active()?;
        let stack_frames = variables::stack_trace(self.backend(), &mut ctx, &args).await?;
        let total_frames = Some(stack_frames.len() as i64);
        Ok(StackTraceResponseBody {
            stack_frames,
            total_frames,
        })
    }

    /// `scopes`
    pub async fn scopes(&self, args: ScopesArguments) -> Result<ScopesResponseBody, BridgeError> {
        let mut ctx = self.inner.session.lock().await;
        ctx.run_state.ensure_active()?;
        Ok(ScopesResponseBody {
            scopes: variables::scopes(&mut ctx, args.frame_id),
        })
    }

    /// `variables`
    pub async fn variables(
        &self,
        args: VariablesArguments,
    ) -> Result<VariablesResponseBody, BridgeError> {
        let mut ctx = self.inner.session.lock().await;
        ctx.run_state.ensure_active()?;
        let variables =
            variables::variables(self.backend(), &mut ctx, args.variables_reference).await;
        Ok(VariablesResponseBody { variables })
    }

    /// `evaluate`
    pub async fn evaluate(
        &self,
        args: EvaluateArguments,
    ) -> Result<EvaluateResponseBody, BridgeError> {
        let mut ctx = self.inner.session.lock().await;
        ctx.run_state.ensure_active()?;
        variables::evaluate(self.backend(), &mut ctx, &args).await
    }

    // -----------------------------------------------------------------------
    // Execution control
    // -----------------------------------------------------------------------

    /// `continue`
    pub async fn resume(&self, _args: ThreadArguments) -> Result<ContinueResponseBody, BridgeError> {
        self.ensure_active().await?;
        self.backend().resume_all_inferiors(false).await?;
        Ok(ContinueResponseBody {
            all_threads_continued: true,
        })
    }

    /// `reverseContinue`
    pub async fn reverse_continue(&self, _args: ThreadArguments) -> Result<(), BridgeError> {
        self.ensure_active().await?;
        self.backend().resume_all_inferiors(true).await?;
        Ok(())
    }

    /// `next`
    pub async fn next(&self, args: ThreadArguments) -> Result<(), BridgeError> {
        self.ensure_active().await?;
        self.backend().step_over_line(args.thread_id).await?;
        Ok(())
    }

    /// `stepIn`
    pub async fn step_in(&self, args: ThreadArguments) -> Result<(), BridgeError> {
        self.ensure_active().await?;
        self.backend().step_into_line(args.thread_id).await?;
        Ok(())
    }

    /// `stepOut`
    pub async fn step_out(&self, args: ThreadArguments) -> Result<(), BridgeError> {
        self.ensure_active().await?;
        self.backend().step_out(args.thread_id).await?;
        Ok(())
    }

    /// `pause`
    pub async fn pause(&self, _args: ThreadArguments) -> Result<(), BridgeError> {
        self.ensure_active().await?;
        self.backend().pause().await?;
        Ok(())
    }

    /// `terminateThreads`. The debugger cannot kill single threads, so the
    /// whole inferior is killed and its exit arrives as a normal stop.
    pub async fn terminate_threads(&self, args: TerminateThreadsArguments) -> Result<(), BridgeError> {
        self.ensure_active().await?;
        tracing::info!("terminating threads {:?}", args.thread_ids);
        self.backend().interpreter_exec("kill").await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Progress
    // -----------------------------------------------------------------------

    /// Custom `runProgress`: start a simulated sequence, returning its id.
    pub fn run_progress(&self) -> String {
        let (id, _task) = self.inner.progress.run_progress();
        id
    }

    /// `cancel`. Only progress sequences can be cancelled; a request id is
    /// accepted and ignored.
    pub fn cancel(&self, args: CancelArguments) {
        if let Some(progress_id) = &args.progress_id {
            self.inner.progress.cancel(progress_id);
        }
        if let Some(request_id) = args.request_id {
            tracing::debug!("cancel of request {request_id} ignored");
        }
    }
}

fn to_thread(thread: &MiThread) -> Thread {
    Thread {
        id: thread.id,
        name: thread
            .name
            .clone()
            .unwrap_or_else(|| thread.target_id.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MiStopReason, ThreadInfo};
    use crate::mock::MockBackend;
    use mibridge_dap::{Source, SourceBreakpoint, StopReason};

    fn bridge() -> (Bridge, Arc<MockBackend>, mpsc::UnboundedReceiver<BridgeEvent>) {
        let backend = Arc::new(MockBackend::new());
        let (bridge, rx) = Bridge::new(backend.clone(), Config::default());
        (bridge, backend, rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<BridgeEvent>) -> Vec<BridgeEvent> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    fn stop(reason: MiStopReason) -> BackendEvent {
        BackendEvent::TargetStopped {
            reason,
            thread_id: Some(1),
        }
    }

    fn thread(id: i64) -> MiThread {
        MiThread {
            id,
            target_id: format!("Thread 0x{id:x} (LWP {id})"),
            name: None,
        }
    }

    #[tokio::test]
    async fn breakpoint_hit_emits_stopped() {
        let (bridge, _backend, mut rx) = bridge();
        bridge.route_backend_event(BackendEvent::TargetRunning).await;
        bridge
            .route_backend_event(BackendEvent::BreakpointHit {
                reason: MiStopReason::BreakpointHit,
                thread_id: Some(2),
            })
            .await;

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1, "no continued event without a known thread");
        match &events[0] {
            BridgeEvent::Stopped(body) => {
                assert_eq!(body.reason, StopReason::Breakpoint);
                assert_eq!(body.thread_id, Some(2));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn running_after_a_stop_emits_continued() {
        let (bridge, _backend, mut rx) = bridge();
        bridge.route_backend_event(stop(MiStopReason::EndSteppingRange)).await;
        bridge.route_backend_event(BackendEvent::TargetRunning).await;

        let events = drain(&mut rx);
        assert!(matches!(
            &events[1],
            BridgeEvent::Continued(body) if body.thread_id == 1
        ));
    }

    #[tokio::test]
    async fn exit_emits_exited_and_one_terminated_never_stopped() {
        let (bridge, _backend, mut rx) = bridge();
        bridge
            .route_backend_event(stop(MiStopReason::Exited { exit_code: Some(3) }))
            .await;
        bridge.route_backend_event(stop(MiStopReason::ExitedNormally)).await;
        bridge.route_backend_event(stop(MiStopReason::BreakpointHit)).await;

        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], BridgeEvent::Exited(body) if body.exit_code == 3));
        assert!(matches!(events[1], BridgeEvent::Terminated));
    }

    #[tokio::test]
    async fn signal_without_thread_is_reported() {
        let (bridge, _backend, mut rx) = bridge();
        bridge
            .route_backend_event(BackendEvent::SignalReceived {
                reason: MiStopReason::SignalReceived {
                    signal: Some("SIGSEGV".into()),
                },
                thread_id: None,
            })
            .await;
        match drain(&mut rx).as_slice() {
            [BridgeEvent::Stopped(body)] => {
                assert_eq!(body.reason, StopReason::Exception);
                assert_eq!(body.description.as_deref(), Some("SIGSEGV"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn console_output_is_forwarded() {
        let (bridge, _backend, mut rx) = bridge();
        bridge
            .route_backend_event(BackendEvent::ConsoleOutput("Reading symbols...\n".into()))
            .await;
        assert!(matches!(
            drain(&mut rx).as_slice(),
            [BridgeEvent::Output(body)] if body.output == "Reading symbols...\n"
        ));
    }

    #[tokio::test]
    async fn session_started_fires_signal() {
        let (bridge, _backend, _rx) = bridge();
        bridge.route_backend_event(BackendEvent::SessionStarted).await;
        assert!(bridge.inner.session_started.is_fired());
    }

    #[tokio::test]
    async fn backend_event_loop_processes_in_order() {
        let (bridge, _backend, mut rx) = bridge();
        let (tx, events_rx) = mpsc::unbounded_channel();
        tx.send(BackendEvent::ConsoleOutput("a".into())).unwrap();
        tx.send(stop(MiStopReason::BreakpointHit)).unwrap();
        tx.send(BackendEvent::ConsoleOutput("b".into())).unwrap();
        drop(tx);

        bridge.run_backend_events(events_rx).await;

        let names: Vec<_> = drain(&mut rx).iter().map(BridgeEvent::name).collect();
        assert_eq!(names, vec!["output", "stopped", "output"]);
    }

    #[tokio::test]
    async fn requests_after_exit_are_rejected() {
        let (bridge, backend, _rx) = bridge();
        bridge.route_backend_event(stop(MiStopReason::ExitedNormally)).await;

        let err = bridge.threads().await.unwrap_err();
        assert!(matches!(err, BridgeError::SessionEnded));
        assert!(bridge
            .next(ThreadArguments { thread_id: 1 })
            .await
            .is_err());
        assert_eq!(backend.count("get_threads"), 0);
        assert_eq!(backend.count("step_over_line"), 0);

        // Bookkeeping still works.
        bridge.configuration_done();
        let info = bridge
            .data_breakpoint_info(DataBreakpointInfoArguments {
                variables_reference: None,
                name: "g".into(),
            })
            .await;
        assert!(info.data_id.is_some());
    }

    #[tokio::test]
    async fn threads_include_current_once() {
        let (bridge, backend, _rx) = bridge();
        backend.with(|s| {
            s.threads = ThreadInfo {
                current: Some(thread(1)),
                all: vec![thread(1), thread(2)],
            }
        });
        let body = bridge.threads().await.unwrap();
        let ids: Vec<_> = body.threads.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(body.threads[0].name, "Thread 0x1 (LWP 1)");
    }

    #[tokio::test]
    async fn set_breakpoints_requires_a_path() {
        let (bridge, _backend, _rx) = bridge();
        let err = bridge
            .set_breakpoints(SetBreakpointsArguments {
                source: Source {
                    name: Some("main.c".into()),
                    path: None,
                },
                breakpoints: vec![SourceBreakpoint {
                    line: 1,
                    condition: None,
                }],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn stop_invalidates_scope_references() {
        let (bridge, backend, _rx) = bridge();
        let scopes = bridge.scopes(ScopesArguments { frame_id: 10_000 }).await.unwrap();
        let reference = scopes.scopes[0].variables_reference;

        bridge.route_backend_event(stop(MiStopReason::EndSteppingRange)).await;
        let rows = bridge
            .variables(VariablesArguments {
                variables_reference: reference,
            })
            .await
            .unwrap();

        assert!(rows.variables.is_empty());
        assert_eq!(backend.count("get_stack_frame_variables"), 0);
    }

    #[tokio::test]
    async fn flow_control_forwards_thread() {
        let (bridge, backend, _rx) = bridge();
        let args = ThreadArguments { thread_id: 4 };
        bridge.resume(args.clone()).await.unwrap();
        bridge.reverse_continue(args.clone()).await.unwrap();
        bridge.next(args.clone()).await.unwrap();
        bridge.step_in(args.clone()).await.unwrap();
        bridge.step_out(args.clone()).await.unwrap();
        bridge.pause(args).await.unwrap();
        assert_eq!(
            backend.calls(),
            vec![
                "resume_all_inferiors false",
                "resume_all_inferiors true",
                "step_over_line 4",
                "step_into_line 4",
                "step_out 4",
                "pause",
            ]
        );
    }

    #[tokio::test]
    async fn terminate_threads_kills_inferior() {
        let (bridge, backend, _rx) = bridge();
        bridge
            .terminate_threads(TerminateThreadsArguments {
                thread_ids: vec![2],
            })
            .await
            .unwrap();
        assert_eq!(backend.calls(), vec!["interpreter_exec kill"]);
    }

    #[tokio::test]
    async fn disconnect_pauses_running_target_then_ends() {
        let (bridge, backend, _rx) = bridge();
        bridge.route_backend_event(BackendEvent::TargetRunning).await;
        bridge
            .disconnect(DisconnectArguments {
                restart: None,
                terminate_debuggee: Some(true),
            })
            .await;
        assert_eq!(backend.calls(), vec!["pause", "end true"]);
        assert!(matches!(bridge.threads().await, Err(BridgeError::SessionEnded)));
    }

    #[tokio::test]
    async fn backend_failure_becomes_request_error() {
        let (bridge, backend, _rx) = bridge();
        backend.fail("step_over_line", "The program is not being run.");
        let err = bridge.next(ThreadArguments { thread_id: 1 }).await.unwrap_err();
        assert!(err.to_string().contains("The program is not being run."));
    }

    #[tokio::test(start_paused = true)]
    async fn launch_waits_for_configuration_done() {
        let (bridge, backend, mut rx) = bridge();
        let launching = {
            let bridge = bridge.clone();
            tokio::spawn(async move {
                bridge
                    .launch(LaunchRequestArguments {
                        program: Some("/bin/app".into()),
                        args: Vec::new(),
                        cwd: None,
                        debugger_path: None,
                        debugger_args: Vec::new(),
                        remote: None,
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;
        bridge.configuration_done();
        bridge.route_backend_event(BackendEvent::SessionStarted).await;

        assert_eq!(launching.await.unwrap().unwrap(), LaunchOutcome::Started);
        assert_eq!(backend.count("start_inferior"), 1);
        assert!(matches!(drain(&mut rx).first(), Some(BridgeEvent::Initialized)));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_reaches_progress_sequence() {
        let (bridge, _backend, mut rx) = bridge();
        let id = bridge.run_progress();
        bridge
            .cancel(CancelArguments {
                request_id: None,
                progress_id: Some(id.clone()),
            });
        tokio::time::sleep(std::time::Duration::from_secs(10)).await;

        let ends: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                BridgeEvent::ProgressEnd(end) => Some(end),
                _ => None,
            })
            .collect();
        assert_eq!(ends.len(), 1);
        assert_eq!(ends[0].progress_id, id);
        assert_eq!(ends[0].message.as_deref(), Some("Cancelled"));
    }
}
