use ulid::Ulid;

/// Generates a prefixed, ULID-backed identifier.
///
/// # Examples
/// ```
/// let id = parley_common::id::prefixed_ulid("usr");
/// assert!(id.starts_with("usr_"));
/// ```
pub fn prefixed_ulid(prefix: &str) -> String {
    format!("{}_{}", prefix, Ulid::new())
}

/// Well-known ID prefixes.
pub mod prefix {
    pub const USER: &str = "usr";
    pub const SESSION: &str = "gw";
    pub const SERVER: &str = "srv";
    pub const CHANNEL: &str = "ch";
    pub const THREAD: &str = "thr";
    pub const MESSAGE: &str = "msg";
    pub const NOTIFICATION: &str = "ntf";
}
