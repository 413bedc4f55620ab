//! Declarative platform rule format
//!
//! This is the shape the browser's rule-management API accepts for
//! dynamic rules. Only the subset Interzept emits or reads back is
//! modelled.

use serde::{Deserialize, Serialize};

/// Smallest ID the platform accepts.
pub const PLATFORM_ID_MIN: u32 = 1;
/// Largest ID Interzept will ever use.
pub const PLATFORM_ID_MAX: u32 = 10_000;

// =============================================================================
// Resource Types
// =============================================================================

bitflags::bitflags! {
    /// Resource types a platform rule condition applies to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ResourceType: u16 {
        const MAIN_FRAME = 1 << 0;
        const SUB_FRAME = 1 << 1;
        const XMLHTTPREQUEST = 1 << 2;
        const SCRIPT = 1 << 3;
        const STYLESHEET = 1 << 4;
        const IMAGE = 1 << 5;
        const FONT = 1 << 6;
        const MEDIA = 1 << 7;
        const WEBSOCKET = 1 << 8;
        const PING = 1 << 9;
        const OTHER = 1 << 10;

        /// main_frame + sub_frame
        const DOCUMENT = Self::MAIN_FRAME.bits() | Self::SUB_FRAME.bits();
    }
}

const RESOURCE_TYPE_NAMES: &[(ResourceType, &str)] = &[
    (ResourceType::XMLHTTPREQUEST, "xmlhttprequest"),
    (ResourceType::MAIN_FRAME, "main_frame"),
    (ResourceType::SUB_FRAME, "sub_frame"),
    (ResourceType::SCRIPT, "script"),
    (ResourceType::STYLESHEET, "stylesheet"),
    (ResourceType::IMAGE, "image"),
    (ResourceType::FONT, "font"),
    (ResourceType::MEDIA, "media"),
    (ResourceType::WEBSOCKET, "websocket"),
    (ResourceType::PING, "ping"),
    (ResourceType::OTHER, "other"),
];

impl ResourceType {
    /// Parse a platform resource type name.
    pub fn from_platform_name(s: &str) -> Option<Self> {
        RESOURCE_TYPE_NAMES
            .iter()
            .find(|(_, name)| *name == s)
            .map(|(ty, _)| *ty)
    }

    /// Platform names of every type in the mask, XHR first.
    pub fn names(self) -> Vec<&'static str> {
        RESOURCE_TYPE_NAMES
            .iter()
            .filter(|(ty, _)| self.contains(*ty))
            .map(|(_, name)| *name)
            .collect()
    }
}

// =============================================================================
// Rule
// =============================================================================

/// A rule as installed on the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformRule {
    pub id: u32,
    pub priority: u32,
    pub condition: Condition,
    pub action: Action,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub url_filter: String,
    pub resource_types: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Action {
    Redirect {
        redirect: Redirect,
    },
    /// Read back from the platform; never emitted by the translator.
    ModifyHeaders {
        #[serde(rename = "requestHeaders", default, skip_serializing_if = "Vec::is_empty")]
        request_headers: Vec<HeaderInfo>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redirect {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderInfo {
    pub header: String,
    pub operation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl PlatformRule {
    /// Redirect target, if this is a redirect rule.
    pub fn redirect_url(&self) -> Option<&str> {
        match &self.action {
            Action::Redirect { redirect } => Some(&redirect.url),
            Action::ModifyHeaders { .. } => None,
        }
    }
}
