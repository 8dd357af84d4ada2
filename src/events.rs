//! Notifications the bridge sends to the frontend.

use mibridge_dap::{
    ContinuedEventBody, Event, ExitedEventBody, HostMessageEventBody, HostSeverity, OutputEventBody,
    ProgressEndEventBody, ProgressStartEventBody, ProgressUpdateEventBody, StoppedEventBody,
    TerminatedEventBody,
};
use serde::Serialize;
use tokio::sync::mpsc;

/// Name of the custom event carrying host-level notices.
pub const HOST_MESSAGE_EVENT: &str = "mibridge/hostMessage";

/// A frontend notification.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    /// The bridge is ready for configuration requests.
    Initialized,
    /// The target stopped.
    Stopped(StoppedEventBody),
    /// The target resumed.
    Continued(ContinuedEventBody),
    /// The debuggee exited.
    Exited(ExitedEventBody),
    /// The debug session is over.
    Terminated,
    /// Console text.
    Output(OutputEventBody),
    /// A progress sequence began.
    ProgressStart(ProgressStartEventBody),
    /// A progress sequence advanced.
    ProgressUpdate(ProgressUpdateEventBody),
    /// A progress sequence finished.
    ProgressEnd(ProgressEndEventBody),
    /// A notice for the editor host.
    Host(HostMessageEventBody),
}

impl BridgeEvent {
    /// DAP event name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Initialized => "initialized",
            Self::Stopped(_) => "stopped",
            Self::Continued(_) => "continued",
            Self::Exited(_) => "exited",
            Self::Terminated => "terminated",
            Self::Output(_) => "output",
            Self::ProgressStart(_) => "progressStart",
            Self::ProgressUpdate(_) => "progressUpdate",
            Self::ProgressEnd(_) => "progressEnd",
            Self::Host(_) => HOST_MESSAGE_EVENT,
        }
    }

    /// Convert into a wire event.
    pub fn into_event(self) -> Result<Event, serde_json::Error> {
        let name = self.name();
        let body = match self {
            Self::Initialized => None,
            Self::Stopped(body) => Some(to_body(&body)?),
            Self::Continued(body) => Some(to_body(&body)?),
            Self::Exited(body) => Some(to_body(&body)?),
            Self::Terminated => Some(to_body(&TerminatedEventBody::default())?),
            Self::Output(body) => Some(to_body(&body)?),
            Self::ProgressStart(body) => Some(to_body(&body)?),
            Self::ProgressUpdate(body) => Some(to_body(&body)?),
            Self::ProgressEnd(body) => Some(to_body(&body)?),
            Self::Host(body) => Some(to_body(&body)?),
        };
        Ok(Event::new(name, body))
    }
}

fn to_body<T: Serialize>(body: &T) -> Result<serde_json::Value, serde_json::Error> {
    serde_json::to_value(body)
}

/// Sending half of the frontend event stream.
///
/// Sends never fail from the caller's point of view: once the frontend
/// side is gone there is nobody left to notify.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<BridgeEvent>,
}

impl EventSink {
    /// A sink and the receiver that drains it.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<BridgeEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue `event` for the frontend.
    pub fn emit(&self, event: BridgeEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("frontend event dropped, receiver closed");
        }
    }

    /// Append a line to the debug console.
    pub fn console(&self, text: impl Into<String>) {
        let mut output = text.into();
        if !output.ends_with('\n') {
            output.push('\n');
        }
        self.emit(BridgeEvent::Output(OutputEventBody {
            category: Some("console".into()),
            output,
        }));
    }

    /// Raise a notice in the editor host.
    pub fn host(&self, severity: HostSeverity, message: impl Into<String>) {
        self.emit(BridgeEvent::Host(HostMessageEventBody {
            severity,
            message: message.into(),
        }));
    }

    /// Report a user-visible failure on both the console and the host.
    pub fn report_failure(&self, message: &str) {
        self.console(message);
        self.host(HostSeverity::Error, message);
    }
}
