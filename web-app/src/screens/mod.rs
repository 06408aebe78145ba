//! State of the two screens, kept apart from rendering so every transition can
//! be driven and checked without a browser.

use log::warn;
use rocket::{request::FlashMessage, response::Flash};
use serde::{Deserialize, Serialize};

pub mod entry;
pub mod export;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Success,
    Error,
}

impl NotificationKind {
    fn as_str(self) -> &'static str {
        match self {
            NotificationKind::Success => "success",
            NotificationKind::Error => "error",
        }
    }
}

/// A transient message shown to the user once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub title: String,
    pub description: String,
}

impl Notification {
    pub fn success(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::Success,
            title: title.into(),
            description: description.into(),
        }
    }

    pub fn error(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::Error,
            title: title.into(),
            description: description.into(),
        }
    }

    /// Carries the notification over a redirect in Rocket's flash cookie.
    pub fn flash<R>(&self, responder: R) -> Flash<R> {
        let message = serde_json::to_string(self).unwrap_or_else(|e| {
            warn!("Could not encode notification, sending its title only: {e}");
            self.title.clone()
        });
        Flash::new(responder, self.kind.as_str(), message)
    }

    pub fn from_flash(flash: &FlashMessage<'_>) -> Self {
        serde_json::from_str(flash.message()).unwrap_or_else(|_| Self {
            kind: if flash.kind() == "success" {
                NotificationKind::Success
            } else {
                NotificationKind::Error
            },
            title: flash.message().into(),
            description: String::new(),
        })
    }
}
