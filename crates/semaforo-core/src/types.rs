use crate::{
    Result,
    constants::{
        BUTTON_PRESSED_TOKEN, CMD_ERROR, CMD_POLICE_SIREN, CMD_RESET, CMD_SUCCESS_GREEN,
        CMD_SUCCESS_YELLOW, ERROR_MARKER,
    },
    error::Error,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Serial endpoint name as reported by the host (`COM3`, `/dev/ttyACM0`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint(String);

impl Endpoint {
    /// Create a new endpoint name.
    ///
    /// Surrounding whitespace is trimmed.
    ///
    /// # Errors
    /// Returns `Error::InvalidEndpoint` if the name is empty.
    pub fn new(name: &str) -> Result<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidEndpoint(name.to_string()));
        }
        Ok(Endpoint(name.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Endpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Endpoint::new(s)
    }
}

/// A classified line received from the device.
///
/// Events are produced by the link worker's read loop in wire order and
/// consumed by exactly one subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum DeviceEvent {
    /// The physical request button was pressed.
    ButtonPressed,

    /// The device, or the link to it, reported an error.
    ErrorOccurred(String),

    /// Any other line, passed through verbatim.
    RawLine(String),
}

impl DeviceEvent {
    /// Classify one line of device input.
    ///
    /// The line is trimmed first. Blank lines produce no event. An exact
    /// `BUTTON_PRESSED` is a button press, any line containing `ERROR` is an
    /// error, everything else is a raw line.
    ///
    /// # Examples
    ///
    /// ```
    /// use semaforo_core::DeviceEvent;
    ///
    /// assert_eq!(DeviceEvent::from_line("BUTTON_PRESSED\r\n"), Some(DeviceEvent::ButtonPressed));
    /// assert_eq!(
    ///     DeviceEvent::from_line("LED ERROR 3"),
    ///     Some(DeviceEvent::ErrorOccurred("LED ERROR 3".to_string()))
    /// );
    /// assert_eq!(DeviceEvent::from_line("   "), None);
    /// ```
    pub fn from_line(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            None
        } else if line == BUTTON_PRESSED_TOKEN {
            Some(Self::ButtonPressed)
        } else if line.contains(ERROR_MARKER) {
            Some(Self::ErrorOccurred(line.to_string()))
        } else {
            Some(Self::RawLine(line.to_string()))
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::ErrorOccurred(_))
    }
}

/// Connection state owned by the supervisor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionState {
    /// No link; initial and shutdown state.
    Disconnected,

    /// A search cycle is running.
    Searching { attempt: u32 },

    /// A link worker owns this endpoint.
    Connected { endpoint: Endpoint },

    /// No hardware; commands go to the fallback link.
    SimulatedMode,

    /// Automatic search exhausted its attempts; only a manual connect leaves this state.
    AwaitingManual { attempts: u32 },
}

impl ConnectionState {
    /// Text for the connection bar of the kiosk screen.
    pub fn label(&self) -> String {
        match self {
            Self::Disconnected | Self::AwaitingManual { .. } => "PULSE CONECTAR".to_string(),
            Self::Searching { attempt } => format!("BUSCANDO... ({attempt})"),
            Self::Connected { endpoint } => format!("CONECTADO: {endpoint}"),
            Self::SimulatedMode => "MODO SIMULACIÓN".to_string(),
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::Disconnected | Self::AwaitingManual { .. })
    }

    /// Check if a transition to the target state is valid.
    ///
    /// Every state may fall back to `Disconnected` on shutdown; everything
    /// else goes through `Searching`.
    ///
    /// ```
    /// use semaforo_core::ConnectionState;
    ///
    /// let searching = ConnectionState::Searching { attempt: 1 };
    /// assert!(ConnectionState::Disconnected.can_transition_to(&searching));
    /// assert!(!ConnectionState::Disconnected.can_transition_to(&ConnectionState::SimulatedMode));
    /// ```
    pub fn can_transition_to(&self, target: &ConnectionState) -> bool {
        matches!(
            (self, target),
            // Shutdown and manual connect are always allowed
            (_, ConnectionState::Disconnected | ConnectionState::Searching { .. })
            // A search ends in one of its outcomes
            | (
                ConnectionState::Searching { .. },
                ConnectionState::Connected { .. }
                    | ConnectionState::SimulatedMode
                    | ConnectionState::AwaitingManual { .. }
            )
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Searching { attempt } => write!(f, "Searching({attempt})"),
            Self::Connected { endpoint } => write!(f, "Connected({endpoint})"),
            Self::SimulatedMode => write!(f, "SimulatedMode"),
            Self::AwaitingManual { attempts } => write!(f, "AwaitingManual({attempts})"),
        }
    }
}

/// Command relayed to the device after a decision.
///
/// Unknown server-provided commands are kept verbatim in `Other`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ResultCommand {
    #[default]
    SuccessGreen,
    SuccessYellow,
    PoliceSiren,
    Error,
    Reset,
    Other(String),
}

impl ResultCommand {
    /// The literal written to the serial line.
    pub fn as_wire(&self) -> &str {
        match self {
            Self::SuccessGreen => CMD_SUCCESS_GREEN,
            Self::SuccessYellow => CMD_SUCCESS_YELLOW,
            Self::PoliceSiren => CMD_POLICE_SIREN,
            Self::Error => CMD_ERROR,
            Self::Reset => CMD_RESET,
            Self::Other(raw) => raw,
        }
    }

    /// Status message shown for this decision.
    pub fn status(&self) -> StatusMessage {
        match self {
            Self::SuccessGreen => StatusMessage::Green,
            Self::SuccessYellow => StatusMessage::Amber,
            Self::PoliceSiren => StatusMessage::PoliceControl,
            Self::Error => StatusMessage::Stop,
            Self::Reset | Self::Other(_) => StatusMessage::Signal(self.as_wire().to_string()),
        }
    }
}

impl From<&str> for ResultCommand {
    fn from(raw: &str) -> Self {
        match raw {
            CMD_SUCCESS_GREEN => Self::SuccessGreen,
            CMD_SUCCESS_YELLOW => Self::SuccessYellow,
            CMD_POLICE_SIREN => Self::PoliceSiren,
            CMD_ERROR => Self::Error,
            CMD_RESET => Self::Reset,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for ResultCommand {
    fn from(raw: String) -> Self {
        match Self::from(raw.as_str()) {
            Self::Other(_) => Self::Other(raw),
            known => known,
        }
    }
}

impl From<ResultCommand> for String {
    fn from(command: ResultCommand) -> Self {
        match command {
            ResultCommand::Other(raw) => raw,
            known => known.as_wire().to_string(),
        }
    }
}

impl fmt::Display for ResultCommand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// Color family of a status message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusTone {
    Neutral,
    Green,
    Amber,
    Blue,
    Red,
    Grey,
}

/// Message shown in the status bar of the kiosk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusMessage {
    Waiting,
    Processing,
    Green,
    Amber,
    PoliceControl,
    Stop,
    Signal(String),
    ServerError,
    HttpError(u16),
    ConnectionError,
    ImageError,
}

impl StatusMessage {
    pub fn text(&self) -> String {
        match self {
            Self::Waiting => "ESPERANDO PULSACIÓN".to_string(),
            Self::Processing => "PROCESANDO...".to_string(),
            Self::Green => "¡VERDE! PUEDE PASAR".to_string(),
            Self::Amber => "¡ÁMBAR! PRECAUCIÓN".to_string(),
            Self::PoliceControl => "¡CONTROL POLICIAL!".to_string(),
            Self::Stop => "¡STOP! PROHIBIDO".to_string(),
            Self::Signal(command) => format!("SEÑAL: {command}"),
            Self::ServerError => "ERROR DE SERVIDOR".to_string(),
            Self::HttpError(code) => format!("ERROR {code}"),
            Self::ConnectionError => "ERROR DE CONEXIÓN".to_string(),
            Self::ImageError => "ERROR DE IMAGEN".to_string(),
        }
    }

    pub fn tone(&self) -> StatusTone {
        match self {
            Self::Waiting | Self::Processing => StatusTone::Neutral,
            Self::Green => StatusTone::Green,
            Self::Amber => StatusTone::Amber,
            Self::PoliceControl => StatusTone::Blue,
            Self::Signal(_) => StatusTone::Grey,
            Self::Stop
            | Self::ServerError
            | Self::HttpError(_)
            | Self::ConnectionError
            | Self::ImageError => StatusTone::Red,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Self::ServerError | Self::HttpError(_) | Self::ConnectionError | Self::ImageError
        )
    }
}

impl fmt::Display for StatusMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_endpoint_trims_and_rejects_empty() {
        assert_eq!(Endpoint::new(" COM3 ").unwrap().as_str(), "COM3");
        assert!(Endpoint::new("").is_err());
        assert!(Endpoint::new("   ").is_err());
        assert!("/dev/ttyACM0".parse::<Endpoint>().is_ok());
    }

    #[rstest]
    #[case("BUTTON_PRESSED", Some(DeviceEvent::ButtonPressed))]
    #[case("  BUTTON_PRESSED\r\n", Some(DeviceEvent::ButtonPressed))]
    #[case("BUTTON_PRESSED_TWICE", Some(DeviceEvent::RawLine("BUTTON_PRESSED_TWICE".into())))]
    #[case("ERROR: relay stuck", Some(DeviceEvent::ErrorOccurred("ERROR: relay stuck".into())))]
    #[case("SENSOR_ERROR", Some(DeviceEvent::ErrorOccurred("SENSOR_ERROR".into())))]
    #[case("error lowercase", Some(DeviceEvent::RawLine("error lowercase".into())))]
    #[case("SEMAFOROSONG_READY", Some(DeviceEvent::RawLine("SEMAFOROSONG_READY".into())))]
    #[case("", None)]
    #[case(" \t\r\n", None)]
    fn test_device_event_classification(#[case] line: &str, #[case] expected: Option<DeviceEvent>) {
        assert_eq!(DeviceEvent::from_line(line), expected);
    }

    #[rstest]
    #[case("SUCCESS_GREEN", ResultCommand::SuccessGreen, StatusMessage::Green)]
    #[case("SUCCESS_YELLOW", ResultCommand::SuccessYellow, StatusMessage::Amber)]
    #[case("POLICE_SIREN", ResultCommand::PoliceSiren, StatusMessage::PoliceControl)]
    #[case("ERROR", ResultCommand::Error, StatusMessage::Stop)]
    #[case("RESET", ResultCommand::Reset, StatusMessage::Signal("RESET".into()))]
    #[case("BLINK_FAST", ResultCommand::Other("BLINK_FAST".into()), StatusMessage::Signal("BLINK_FAST".into()))]
    fn test_result_command_mapping(
        #[case] raw: &str,
        #[case] command: ResultCommand,
        #[case] status: StatusMessage,
    ) {
        let parsed = ResultCommand::from(raw);
        assert_eq!(parsed, command);
        assert_eq!(parsed.as_wire(), raw);
        assert_eq!(parsed.status(), status);
    }

    #[test]
    fn test_result_command_serde_is_verbatim() {
        let json = serde_json::to_string(&ResultCommand::SuccessYellow).unwrap();
        assert_eq!(json, "\"SUCCESS_YELLOW\"");

        let other: ResultCommand = serde_json::from_str("\"Custom Cmd\"").unwrap();
        assert_eq!(other, ResultCommand::Other("Custom Cmd".to_string()));
        assert_eq!(String::from(other), "Custom Cmd");
    }

    #[test]
    fn test_connection_state_labels() {
        let endpoint = Endpoint::new("COM5").unwrap();
        assert_eq!(
            ConnectionState::Connected { endpoint }.label(),
            "CONECTADO: COM5"
        );
        assert_eq!(ConnectionState::SimulatedMode.label(), "MODO SIMULACIÓN");
        assert_eq!(ConnectionState::Disconnected.label(), "PULSE CONECTAR");
        assert_eq!(
            ConnectionState::AwaitingManual { attempts: 6 }.label(),
            "PULSE CONECTAR"
        );
        assert_eq!(
            ConnectionState::Searching { attempt: 2 }.label(),
            "BUSCANDO... (2)"
        );
    }

    #[test]
    fn test_connection_state_predicates() {
        assert!(ConnectionState::Disconnected.is_disconnected());
        assert!(ConnectionState::AwaitingManual { attempts: 6 }.is_disconnected());
        assert!(!ConnectionState::SimulatedMode.is_disconnected());
        assert!(!ConnectionState::SimulatedMode.is_connected());
    }

    #[test]
    fn test_connection_state_transitions() {
        let connected = ConnectionState::Connected {
            endpoint: Endpoint::new("COM5").unwrap(),
        };
        let searching = ConnectionState::Searching { attempt: 1 };

        assert!(ConnectionState::Disconnected.can_transition_to(&searching));
        assert!(searching.can_transition_to(&ConnectionState::Searching { attempt: 2 }));
        assert!(searching.can_transition_to(&connected));
        assert!(searching.can_transition_to(&ConnectionState::SimulatedMode));
        assert!(connected.can_transition_to(&searching));
        assert!(connected.can_transition_to(&ConnectionState::Disconnected));

        assert!(!ConnectionState::Disconnected.can_transition_to(&connected));
        assert!(!ConnectionState::Disconnected.can_transition_to(&ConnectionState::SimulatedMode));
        assert!(!connected.can_transition_to(&ConnectionState::SimulatedMode));
        assert!(
            !ConnectionState::AwaitingManual { attempts: 6 }
                .can_transition_to(&ConnectionState::SimulatedMode)
        );
    }

    #[test]
    fn test_status_messages() {
        assert_eq!(StatusMessage::HttpError(500).text(), "ERROR 500");
        assert_eq!(StatusMessage::Amber.tone(), StatusTone::Amber);
        assert_eq!(StatusMessage::PoliceControl.tone(), StatusTone::Blue);
        assert!(StatusMessage::ConnectionError.is_error());
        assert!(!StatusMessage::Stop.is_error());
        assert_eq!(StatusMessage::Stop.tone(), StatusTone::Red);
    }
}
