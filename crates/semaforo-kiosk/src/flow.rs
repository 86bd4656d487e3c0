//! Decision request flow.
//!
//! Turns a button press into exactly one decision request and, when the
//! service answers, exactly one command on the current link:
//!
//! ```text
//! ButtonPressed ─► "PROCESANDO..." + clear QR ─► GET decision
//!                     ├─ ok    ─► show QR + status ─► link.send_command(result_command)
//!                     └─ error ─► error status (no command)
//! ErrorOccurred ─► connection bar "ERROR DE CONEXIÓN"
//! RawLine       ─► logged only
//! ```
//!
//! Requests run on the async runtime, never on a link worker's thread, and
//! the command write is pushed to the blocking pool because it shares the
//! endpoint lock with the worker's blocking reads.

use semaforo_core::{DeviceEvent, ResultCommand, StatusMessage};
use semaforo_hardware::Link;
use semaforo_network::{DecisionError, DecisionService};
use tokio::sync::{mpsc, watch};
use tokio::task;
use tracing::{debug, info, warn};

use crate::display::{DisplayUpdate, PresentationSink};

/// What a single request cycle ended with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowOutcome {
    /// The service decided; `delivered` is the link's answer.
    Relayed {
        command: ResultCommand,
        delivered: bool,
    },

    /// The request failed; nothing was sent to the device.
    Failed(DecisionError),
}

impl FlowOutcome {
    pub fn is_relayed(&self) -> bool {
        matches!(self, Self::Relayed { .. })
    }
}

/// Reacts to device events and relays decisions.
pub struct DecisionFlow<S, P> {
    service: S,
    sink: P,
    links: watch::Receiver<Option<Link>>,
}

impl<S: DecisionService, P: PresentationSink> DecisionFlow<S, P> {
    /// `links` is usually [`ConnectionSupervisor::links`](semaforo_hardware::ConnectionSupervisor::links).
    pub fn new(service: S, sink: P, links: watch::Receiver<Option<Link>>) -> Self {
        sink.update(DisplayUpdate::Status(StatusMessage::Waiting));
        Self {
            service,
            sink,
            links,
        }
    }

    pub fn sink(&self) -> &P {
        &self.sink
    }

    /// React to one device event.
    ///
    /// Returns the request outcome for `ButtonPressed`, `None` otherwise.
    pub async fn handle_event(&self, event: DeviceEvent) -> Option<FlowOutcome> {
        match event {
            DeviceEvent::ButtonPressed => {
                info!("Button pressed");
                Some(self.trigger().await)
            }
            DeviceEvent::ErrorOccurred(message) => {
                warn!(message = %message, "Device reported an error");
                self.sink.update(DisplayUpdate::LinkError(message));
                None
            }
            DeviceEvent::RawLine(line) => {
                debug!(line = %line, "Unclassified device line");
                None
            }
        }
    }

    /// Run one request cycle, as if the button had been pressed.
    pub async fn trigger(&self) -> FlowOutcome {
        self.sink
            .update(DisplayUpdate::Status(StatusMessage::Processing));
        self.sink.update(DisplayUpdate::ClearQr);

        let decision = match self.service.request_decision().await {
            Ok(decision) => decision,
            Err(e) => {
                self.sink.update(DisplayUpdate::Status(e.status_message()));
                return FlowOutcome::Failed(e);
            }
        };

        match decision.qr_image.clone() {
            Some(image) => {
                self.sink.update(DisplayUpdate::QrImage(image));
                self.sink.update(DisplayUpdate::Status(decision.status()));
            }
            None => {
                warn!("Decision arrived without a usable QR image");
                self.sink
                    .update(DisplayUpdate::Status(StatusMessage::ImageError));
            }
        }

        let command = decision.result_command;
        let delivered = self.relay(&command).await;

        FlowOutcome::Relayed { command, delivered }
    }

    /// Consume device events until every sender is gone.
    pub async fn run(&self, mut events: mpsc::Receiver<DeviceEvent>) {
        while let Some(event) = events.recv().await {
            self.handle_event(event).await;
        }
        debug!("Device event channel closed");
    }

    async fn relay(&self, command: &ResultCommand) -> bool {
        let Some(link) = self.links.borrow().clone() else {
            warn!(command = command.as_wire(), "No link, command not sent");
            return false;
        };

        let wire = command.as_wire().to_string();
        let delivered = task::spawn_blocking(move || link.send_command(&wire))
            .await
            .unwrap_or_else(|e| {
                warn!("Command task failed: {}", e);
                false
            });

        if !delivered {
            warn!(command = command.as_wire(), "Command not delivered");
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::RecordingSink;
    use semaforo_hardware::FallbackLink;
    use semaforo_network::Decision;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Service answering from a fixed script.
    struct Scripted {
        answer: Mutex<semaforo_network::Result<Decision>>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(answer: semaforo_network::Result<Decision>) -> Self {
            Self {
                answer: Mutex::new(answer),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl DecisionService for Scripted {
        async fn request_decision(&self) -> semaforo_network::Result<Decision> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer.lock().unwrap().clone()
        }
    }

    fn decision(command: ResultCommand, image: Option<Vec<u8>>) -> Decision {
        Decision {
            is_green: true,
            qr_image: image,
            result_command: command,
        }
    }

    fn fallback() -> watch::Receiver<Option<Link>> {
        let (_tx, rx) = watch::channel(Some(Link::Fallback(FallbackLink::new())));
        rx
    }

    #[tokio::test]
    async fn test_starts_waiting() {
        let sink = RecordingSink::new();
        let _flow = DecisionFlow::new(
            Scripted::new(Err(DecisionError::Timeout)),
            sink.clone(),
            fallback(),
        );
        assert_eq!(sink.statuses(), vec![StatusMessage::Waiting]);
    }

    #[tokio::test]
    async fn test_button_press_relays_decision() {
        let sink = RecordingSink::new();
        let flow = DecisionFlow::new(
            Scripted::new(Ok(decision(ResultCommand::PoliceSiren, Some(vec![1, 2])))),
            sink.clone(),
            fallback(),
        );

        let outcome = flow.handle_event(DeviceEvent::ButtonPressed).await;

        assert_eq!(
            outcome,
            Some(FlowOutcome::Relayed {
                command: ResultCommand::PoliceSiren,
                delivered: true,
            })
        );
        assert_eq!(
            sink.updates(),
            vec![
                DisplayUpdate::Status(StatusMessage::Waiting),
                DisplayUpdate::Status(StatusMessage::Processing),
                DisplayUpdate::ClearQr,
                DisplayUpdate::QrImage(vec![1, 2]),
                DisplayUpdate::Status(StatusMessage::PoliceControl),
            ]
        );
    }

    #[tokio::test]
    async fn test_failure_shows_error_and_sends_nothing() {
        let sink = RecordingSink::new();
        let flow = DecisionFlow::new(
            Scripted::new(Err(DecisionError::Rejected)),
            sink.clone(),
            fallback(),
        );

        let outcome = flow.trigger().await;

        assert_eq!(outcome, FlowOutcome::Failed(DecisionError::Rejected));
        assert!(!outcome.is_relayed());
        assert_eq!(sink.last_status(), Some(StatusMessage::ServerError));
    }

    #[tokio::test]
    async fn test_missing_image_still_relays() {
        let sink = RecordingSink::new();
        let flow = DecisionFlow::new(
            Scripted::new(Ok(decision(ResultCommand::SuccessGreen, None))),
            sink.clone(),
            fallback(),
        );

        let outcome = flow.trigger().await;

        assert!(outcome.is_relayed());
        assert_eq!(sink.last_status(), Some(StatusMessage::ImageError));
        assert!(
            !sink
                .updates()
                .iter()
                .any(|u| matches!(u, DisplayUpdate::QrImage(_)))
        );
    }

    #[tokio::test]
    async fn test_no_link_means_not_delivered() {
        let (_tx, links) = watch::channel(None);
        let flow = DecisionFlow::new(
            Scripted::new(Ok(decision(ResultCommand::SuccessGreen, Some(vec![0])))),
            RecordingSink::new(),
            links,
        );

        assert_eq!(
            flow.trigger().await,
            FlowOutcome::Relayed {
                command: ResultCommand::SuccessGreen,
                delivered: false,
            }
        );
    }

    #[tokio::test]
    async fn test_error_event_updates_connection_bar() {
        let sink = RecordingSink::new();
        let service = Scripted::new(Err(DecisionError::Timeout));
        let flow = DecisionFlow::new(service, sink.clone(), fallback());

        let outcome = flow
            .handle_event(DeviceEvent::ErrorOccurred("ERROR: unplugged".to_string()))
            .await;

        assert_eq!(outcome, None);
        assert_eq!(
            sink.updates().last(),
            Some(&DisplayUpdate::LinkError("ERROR: unplugged".to_string()))
        );
        assert_eq!(flow.service.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_raw_lines_are_ignored() {
        let sink = RecordingSink::new();
        let flow = DecisionFlow::new(
            Scripted::new(Err(DecisionError::Timeout)),
            sink.clone(),
            fallback(),
        );

        assert_eq!(
            flow.handle_event(DeviceEvent::RawLine("hello".to_string()))
                .await,
            None
        );
        assert_eq!(sink.updates().len(), 1);
        assert_eq!(flow.service.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_run_processes_events_in_order() {
        let sink = RecordingSink::new();
        let flow = DecisionFlow::new(
            Scripted::new(Ok(decision(ResultCommand::Error, Some(vec![9])))),
            sink.clone(),
            fallback(),
        );

        let (tx, rx) = mpsc::channel(8);
        tx.send(DeviceEvent::ButtonPressed).await.unwrap();
        tx.send(DeviceEvent::RawLine("noise".to_string()))
            .await
            .unwrap();
        tx.send(DeviceEvent::ButtonPressed).await.unwrap();
        drop(tx);

        flow.run(rx).await;

        assert_eq!(flow.service.calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            sink.statuses(),
            vec![
                StatusMessage::Waiting,
                StatusMessage::Processing,
                StatusMessage::Stop,
                StatusMessage::Processing,
                StatusMessage::Stop,
            ]
        );
    }
}
