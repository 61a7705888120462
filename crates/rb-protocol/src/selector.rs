//! Event selectors and subscription items
//!
//! A selector is either an exact event code or a group selector. Group
//! selectors place the group in the high byte and set the low 24 bits to
//! all ones:
//!
//! ```text
//! selector = ((group & 0xFF) << 24) | 0x00FF_FFFF
//! ```
//!
//! A group selector matches every event code with the same high byte. An
//! exact code whose low 24 bits happen to be all ones reads as a group
//! selector; event numbering should avoid that value.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::message::EventCode;

/// Low bits that mark a selector as a group wildcard
pub const GROUP_WILDCARD: u32 = 0x00FF_FFFF;

/// Bit offset of the group byte inside an event code
pub const GROUP_SHIFT: u32 = 24;

/// Exact event code or group wildcard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Selector(pub u32);

impl Selector {
    /// Selector matching exactly one event code
    pub fn event(code: EventCode) -> Self {
        Self(code)
    }

    /// Selector matching every event of a group
    pub fn group(group: u8) -> Self {
        Self(((group as u32) << GROUP_SHIFT) | GROUP_WILDCARD)
    }

    /// Group selector covering the given event code
    pub fn group_of(code: EventCode) -> Self {
        Self::group((code >> GROUP_SHIFT) as u8)
    }

    /// Build an event code from a group and an index within it
    pub fn make_event(group: u8, index: u32) -> EventCode {
        ((group as u32) << GROUP_SHIFT) | (index & GROUP_WILDCARD)
    }

    /// Raw wire value
    pub fn as_u32(&self) -> u32 {
        self.0
    }

    /// Whether the low 24 bits are wildcarded
    pub fn is_group(&self) -> bool {
        self.0 & GROUP_WILDCARD == GROUP_WILDCARD
    }

    /// The group byte
    pub fn group_id(&self) -> u8 {
        (self.0 >> GROUP_SHIFT) as u8
    }

    /// Whether an event code falls under this selector
    pub fn matches(&self, code: EventCode) -> bool {
        if self.is_group() {
            (code >> GROUP_SHIFT) == (self.0 >> GROUP_SHIFT)
        } else {
            code == self.0
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_group() {
            write!(f, "group:{:#04x}", self.group_id())
        } else {
            write!(f, "event:{}", self.0)
        }
    }
}

impl From<EventCode> for Selector {
    fn from(code: EventCode) -> Self {
        Self(code)
    }
}

/// Treat an empty topic as no topic
pub fn normalize_topic(topic: Option<&str>) -> Option<String> {
    match topic {
        Some(t) if !t.is_empty() => Some(t.to_string()),
        _ => None,
    }
}

/// One entry of a subscribe or unsubscribe request
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscribeItem {
    /// Event or group selector
    pub selector: Selector,
    /// Topic filter; `None` only matches un-topicked events
    pub topic: Option<String>,
}

impl SubscribeItem {
    /// Subscribe to one event code
    pub fn event(code: EventCode, topic: Option<&str>) -> Self {
        Self {
            selector: Selector::event(code),
            topic: normalize_topic(topic),
        }
    }

    /// Subscribe to a whole group
    pub fn group(group: u8, topic: Option<&str>) -> Self {
        Self {
            selector: Selector::group(group),
            topic: normalize_topic(topic),
        }
    }

    /// Copy with the topic normalised
    pub fn normalized(&self) -> Self {
        Self {
            selector: self.selector,
            topic: normalize_topic(self.topic.as_deref()),
        }
    }
}
