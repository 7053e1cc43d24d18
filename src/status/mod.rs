//! Derived status indicators for the page header.
//!
//! These are pure functions of the poller's [`ConnectionState`] and the
//! latest snapshot flags; they hold no state of their own.

use chrono::{DateTime, TimeZone};

use crate::poller::ConnectionState;

pub const CONNECTED_COLOR: &str = "#28ae5f";
pub const DISCONNECTED_COLOR: &str = "#d82121";
/// Dependent links use a calmer colour: their absence is not a fault.
pub const LINK_DOWN_COLOR: &str = "#3889ab";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorState {
    Connected,
    Disconnected,
}

/// A label and colour for one header indicator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Indicator {
    pub state: IndicatorState,
    pub label: String,
    pub color: &'static str,
}

impl Indicator {
    pub fn is_connected(&self) -> bool {
        self.state == IndicatorState::Connected
    }
}

fn labelled(name: &str, connected: bool) -> String {
    let word = if connected { "Connected" } else { "Disconnected" };
    format!("● {name} {word}")
}

/// Telemetry connection health, driven by the consecutive failure count.
pub fn connection_indicator(name: &str, connection: &ConnectionState, threshold: u32) -> Indicator {
    let connected = connection.is_healthy(threshold);
    Indicator {
        state: if connected {
            IndicatorState::Connected
        } else {
            IndicatorState::Disconnected
        },
        label: labelled(name, connected),
        color: if connected { CONNECTED_COLOR } else { DISCONNECTED_COLOR },
    }
}

/// Whether a dependent link (e.g. the DUST simulator) is usable: the data
/// must report it connected and our own reads must be healthy.
pub fn link_connected(flag: bool, connection: &ConnectionState, threshold: u32) -> bool {
    flag && connection.is_healthy(threshold)
}

pub fn link_indicator(
    name: &str,
    flag: bool,
    connection: &ConnectionState,
    threshold: u32,
) -> Indicator {
    let connected = link_connected(flag, connection, threshold);
    Indicator {
        state: if connected {
            IndicatorState::Connected
        } else {
            IndicatorState::Disconnected
        },
        label: labelled(name, connected),
        color: if connected { CONNECTED_COLOR } else { LINK_DOWN_COLOR },
    }
}

/// Wall clock in 24-hour `HH:MM:SS`.
pub fn clock_text<Tz: TimeZone>(now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    now.format("%H:%M:%S").to_string()
}
