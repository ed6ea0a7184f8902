//! Adapter lifecycle states and events

use std::fmt;
use std::sync::Mutex;

/// Lifecycle state of an adapter
///
/// Start walks `Idle → PreUp → Applying → WaitingHandshake → Routing → Dns →
/// PostUp → Up`. Stop walks `Up → UndoRouting → PreDown → Closing → PostDown →
/// Down`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdapterState {
    Idle,
    PreUp,
    Applying,
    WaitingHandshake,
    Routing,
    Dns,
    PostUp,
    Up,
    UndoRouting,
    PreDown,
    Closing,
    PostDown,
    Down,
}

impl AdapterState {
    /// Check if the adapter is on its way up or up
    pub fn is_starting(&self) -> bool {
        matches!(
            self,
            AdapterState::PreUp
                | AdapterState::Applying
                | AdapterState::WaitingHandshake
                | AdapterState::Routing
                | AdapterState::Dns
                | AdapterState::PostUp
        )
    }

    /// Check if the adapter is being torn down
    pub fn is_stopping(&self) -> bool {
        matches!(
            self,
            AdapterState::UndoRouting
                | AdapterState::PreDown
                | AdapterState::Closing
                | AdapterState::PostDown
        )
    }

    /// Get a human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            AdapterState::Idle => "Idle",
            AdapterState::PreUp => "Running pre-up hooks...",
            AdapterState::Applying => "Applying configuration...",
            AdapterState::WaitingHandshake => "Waiting for handshake...",
            AdapterState::Routing => "Routing...",
            AdapterState::Dns => "Configuring DNS...",
            AdapterState::PostUp => "Running post-up hooks...",
            AdapterState::Up => "Up",
            AdapterState::UndoRouting => "Removing DNS and routing...",
            AdapterState::PreDown => "Running pre-down hooks...",
            AdapterState::Closing => "Closing...",
            AdapterState::PostDown => "Running post-down hooks...",
            AdapterState::Down => "Down",
        }
    }
}

impl fmt::Display for AdapterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Events emitted while adapters change state
#[derive(Debug, Clone, PartialEq)]
pub enum AdapterEvent {
    /// State changed
    StateChanged {
        /// Native interface name, empty before allocation
        interface: String,
        old: AdapterState,
        new: AdapterState,
    },

    /// An interface slot was allocated or reused
    Allocated {
        name: String,
        native_name: String,
        reused: bool,
    },

    /// The gating peer completed its first handshake
    Handshake {
        interface: String,
        public_key: String,
    },

    /// The default route moved onto or off a tunnel
    DefaultGateway {
        interface: String,
        active: bool,
    },

    /// A step failed without aborting the current operation
    StepFailed {
        interface: String,
        state: AdapterState,
        message: String,
    },
}

/// Event handler trait for receiving adapter events
pub trait EventHandler: Send + Sync {
    /// Handle an adapter event
    fn on_event(&self, event: AdapterEvent);
}

/// Simple event handler that logs events
pub struct LoggingEventHandler;

impl EventHandler for LoggingEventHandler {
    fn on_event(&self, event: AdapterEvent) {
        match event {
            AdapterEvent::StateChanged { interface, old, new } => {
                log::debug!("{}: {} -> {}", interface, old, new);
            }
            AdapterEvent::Allocated {
                name,
                native_name,
                reused,
            } => {
                if reused {
                    log::info!("Using existing {} ({})", name, native_name);
                } else {
                    log::info!("Created {} ({})", name, native_name);
                }
            }
            AdapterEvent::Handshake {
                interface,
                public_key,
            } => {
                log::info!("Handshake from {} on {}", public_key, interface);
            }
            AdapterEvent::DefaultGateway { interface, active } => {
                if active {
                    log::info!("Default route now through {}", interface);
                } else {
                    log::info!("Default route restored from {}", interface);
                }
            }
            AdapterEvent::StepFailed {
                interface,
                state,
                message,
            } => {
                log::error!("{} failed on {}: {}", state, interface, message);
            }
        }
    }
}

/// Event handler that keeps every event, for inspection in tests
#[derive(Default)]
pub struct RecordingEventHandler {
    events: Mutex<Vec<AdapterEvent>>,
}

impl RecordingEventHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events seen so far
    pub fn events(&self) -> Vec<AdapterEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// The sequence of states entered, in order
    pub fn states(&self) -> Vec<AdapterState> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                AdapterEvent::StateChanged { new, .. } => Some(new),
                _ => None,
            })
            .collect()
    }
}

impl EventHandler for RecordingEventHandler {
    fn on_event(&self, event: AdapterEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
