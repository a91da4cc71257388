//! Request DTOs for the sample web surface
//!
//! Defines the structure of incoming query strings.

use serde::Deserialize;

/// Query string of the check endpoints (`GET /dependency`, `GET /cancel`)
///
/// # Fields
/// - `cancel`: When greater than zero, the stored change signal is fired
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckQuery {
    #[serde(default)]
    pub cancel: Option<u32>,
}

impl CheckQuery {
    /// Returns true if the caller asked for the stored signal to fire.
    pub fn wants_cancel(&self) -> bool {
        self.cancel.is_some_and(|id| id > 0)
    }
}
