//! Event Kinds
//!
//! Static table of event kinds the gateway understands, and the subset that is
//! actually emitted today. Tenants subscribe by kind name; `All` matches every kind.

use std::collections::HashSet;
use std::sync::LazyLock;

/// Subscription wildcard.
pub const ALL_EVENTS: &str = "All";

/// Kind used for inbound and outbound chat messages.
pub const MESSAGE_EVENT: &str = "Message";

/// Event kinds that are implemented and emitted.
pub const ACTIVE_EVENT_TYPES: &[&str] = &[
    // Messages and Communication
    "Message",
    "MessageSent",
    "Receipt",
    // Connection and Session
    "Connected",
    "Disconnected",
    "ConnectFailure",
    "LoggedOut",
    "StreamReplaced",
    "PairSuccess",
    "QR",
    // Privacy and Settings
    "PushNameSetting",
    // Synchronization and State
    "AppState",
    "AppStateSyncComplete",
    "HistorySync",
    // Calls (logging only)
    "CallOffer",
    "CallAccept",
    "CallTerminate",
    "CallOfferNotice",
    "CallRelayLatency",
    // Presence and Activity
    "Presence",
    "ChatPresence",
    "All",
];

/// Every event kind a tenant may subscribe to, including ones not emitted yet.
pub const SUPPORTED_EVENT_TYPES: &[&str] = &[
    // Messages and Communication
    "Message",
    "MessageSent",
    "UndecryptableMessage",
    "Receipt",
    "MediaRetry",
    "ReadReceipt",
    // Groups and Contacts
    "GroupInfo",
    "JoinedGroup",
    "Picture",
    "BlocklistChange",
    "Blocklist",
    // Connection and Session
    "Connected",
    "Disconnected",
    "ConnectFailure",
    "KeepAliveRestored",
    "KeepAliveTimeout",
    "LoggedOut",
    "ClientOutdated",
    "TemporaryBan",
    "StreamError",
    "StreamReplaced",
    "PairSuccess",
    "PairError",
    "QR",
    "QRScannedWithoutMultidevice",
    // Privacy and Settings
    "PrivacySettings",
    "PushNameSetting",
    "UserAbout",
    // Synchronization and State
    "AppState",
    "AppStateSyncComplete",
    "HistorySync",
    "OfflineSyncCompleted",
    "OfflineSyncPreview",
    // Calls
    "CallOffer",
    "CallAccept",
    "CallTerminate",
    "CallOfferNotice",
    "CallRelayLatency",
    // Presence and Activity
    "Presence",
    "ChatPresence",
    // Identity
    "IdentityChange",
    // Errors
    "CATRefreshError",
    // Newsletter
    "NewsletterJoin",
    "NewsletterLeave",
    "NewsletterMuteChange",
    "NewsletterLiveUpdate",
    // Facebook/Meta Bridge
    "FBMessage",
    "All",
];

static SUPPORTED: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| SUPPORTED_EVENT_TYPES.iter().copied().collect());

static ACTIVE: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| ACTIVE_EVENT_TYPES.iter().copied().collect());

/// Whether `kind` is a known event kind.
pub fn is_valid_event_type(kind: &str) -> bool {
    SUPPORTED.contains(kind)
}

/// Whether `kind` is actually emitted.
pub fn is_active_event_type(kind: &str) -> bool {
    ACTIVE.contains(kind)
}

/// Whether a subscription list covers `kind`.
pub fn subscribes<S: AsRef<str>>(subscribed: &[S], kind: &str) -> bool {
    subscribed
        .iter()
        .any(|s| s.as_ref() == kind || s.as_ref() == ALL_EVENTS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_is_subset_of_supported() {
        for kind in ACTIVE_EVENT_TYPES {
            assert!(is_valid_event_type(kind), "{kind} missing from supported");
        }
    }

    #[test]
    fn not_yet_implemented_kinds_are_valid_but_inactive() {
        assert!(is_valid_event_type("GroupInfo"));
        assert!(!is_active_event_type("GroupInfo"));
        assert!(is_active_event_type(MESSAGE_EVENT));
    }

    #[test]
    fn unknown_kind_rejected() {
        assert!(!is_valid_event_type("message"));
        assert!(!is_valid_event_type(""));
    }

    #[test]
    fn wildcard_subscription() {
        assert!(subscribes(&["All"], "Presence"));
        assert!(subscribes(&["Message", "Receipt"], "Receipt"));
        assert!(!subscribes(&["Message"], "Receipt"));
        assert!(!subscribes::<&str>(&[], "Message"));
    }
}
