//! Attribute conventions shared by the resolver, mutator, reconciler and
//! binding table.

/// Stable id attribute carried by server-rendered elements.
pub const STABLE_ID_ATTR: &str = "data-dj-id";

/// Identity key used by the reconciler for keyed matching.
pub const IDENTITY_ATTR: &str = "id";

/// Marks a container whose subtree is owned by the caller.
pub const UPDATE_ATTR: &str = "dj-update";
pub const UPDATE_IGNORE: &str = "ignore";

/// Prefix of declarative event bindings (`dj-click="increment"`).
pub const EVENT_ATTR_PREFIX: &str = "dj-";

/// Prefix of binding parameters (`dj-value-id="7"`).
pub const EVENT_VALUE_PREFIX: &str = "dj-value-";

/// `dj-*` attributes that configure behaviour instead of naming an event.
/// A `.modifier` suffix (`dj-loading.disable`) belongs to its directive.
pub const DIRECTIVE_ATTRS: &[&str] = &[
    "dj-update",
    "dj-model",
    "dj-loading",
    "dj-target",
    "dj-confirm",
    "dj-debounce",
    "dj-throttle",
    "dj-hook",
    "dj-key",
    "dj-root",
    "dj-view",
    "dj-patch",
    "dj-transition",
    "dj-stream",
    "dj-stream-mode",
    "dj-offline",
    "dj-offline-show",
    "dj-offline-hide",
    "dj-offline-disable",
    "dj-if",
    "dj-upload",
    "dj-upload-drop",
    "dj-upload-preview",
    "dj-upload-progress",
    "dj-poll-interval",
    "dj-longpress-duration",
    "dj-swipe-threshold",
];

/// Conditional-block markers are emitted as `dj-if--<n>`.
const CONDITIONAL_PREFIX: &str = "dj-if--";

/// Live form-control value.
pub const VALUE_ATTR: &str = "value";

/// Keys that must never become attribute names or parameter keys.
pub const UNSAFE_KEYS: &[&str] = &["__proto__", "constructor", "prototype"];

/// Containers whose text nodes are all significant.
pub const WHITESPACE_PRESERVING: &[&str] = &["pre", "textarea", "script", "style"];

/// Elements whose `value` is user-editable.
pub const FORM_CONTROLS: &[&str] = &["input", "textarea", "select"];

pub fn is_unsafe_key(key: &str) -> bool {
    UNSAFE_KEYS.contains(&key)
}

pub fn is_directive(key: &str) -> bool {
    let name = key.split('.').next().unwrap_or(key);
    DIRECTIVE_ATTRS.contains(&name) || key.starts_with(CONDITIONAL_PREFIX)
}

pub fn preserves_whitespace(tag: &str) -> bool {
    WHITESPACE_PRESERVING
        .iter()
        .any(|t| t.eq_ignore_ascii_case(tag))
}

pub fn is_form_control(tag: &str) -> bool {
    FORM_CONTROLS.iter().any(|t| t.eq_ignore_ascii_case(tag))
}

/// Whitespace-only text is pruned by the server and elided during resolution.
pub fn is_blank(text: &str) -> bool {
    text.chars().all(char::is_whitespace)
}
