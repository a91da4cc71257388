//! Values stored by the sample web surface
//!
//! The demo cache mixes timestamps, eviction messages and the change signals
//! that drive invalidation, so values are a small closed enum.

use std::fmt;

use chrono::{DateTime, Local};

use crate::cache::{Cache, ChangeSignal};

/// Cache type shared by every handler.
pub type DemoCache = Cache<String, DemoValue>;

#[derive(Debug, Clone)]
pub enum DemoValue {
    /// A point in time captured when the entry was created
    Time(DateTime<Local>),
    /// Free-form text, used for eviction messages
    Text(String),
    /// A signal kept in the cache so a later request can fire it
    Signal(ChangeSignal),
}

impl DemoValue {
    pub fn as_time(&self) -> Option<DateTime<Local>> {
        match self {
            DemoValue::Time(time) => Some(*time),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            DemoValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_signal(&self) -> Option<&ChangeSignal> {
        match self {
            DemoValue::Signal(signal) => Some(signal),
            _ => None,
        }
    }
}

impl fmt::Display for DemoValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DemoValue::Time(time) => write!(f, "{}", time.format("%H:%M:%S%.3f")),
            DemoValue::Text(text) => f.write_str(text),
            DemoValue::Signal(signal) => write!(f, "signal #{}", signal.id()),
        }
    }
}

impl From<&str> for DemoValue {
    fn from(text: &str) -> Self {
        DemoValue::Text(text.to_string())
    }
}

impl From<String> for DemoValue {
    fn from(text: String) -> Self {
        DemoValue::Text(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_accessors_match_variant() {
        let now = Local::now();
        let time = DemoValue::Time(now);
        let text = DemoValue::from("hello");
        let signal = DemoValue::Signal(ChangeSignal::new());

        assert_eq!(time.as_time(), Some(now));
        assert!(time.as_text().is_none());
        assert_eq!(text.as_text(), Some("hello"));
        assert!(text.as_signal().is_none());
        assert!(signal.as_signal().is_some());
        assert!(signal.as_time().is_none());
    }

    #[test]
    fn test_display() {
        let time = Local.with_ymd_and_hms(2024, 5, 1, 13, 4, 5).unwrap();
        assert_eq!(DemoValue::Time(time).to_string(), "13:04:05.000");
        assert_eq!(DemoValue::from("message".to_string()).to_string(), "message");

        let signal = ChangeSignal::new();
        assert_eq!(
            DemoValue::Signal(signal.clone()).to_string(),
            format!("signal #{}", signal.id())
        );
    }
}
