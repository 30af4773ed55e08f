//! The header collection: an ordered, multi-valued header map plus a set of
//! names a security interceptor can *claim* to prevent later mutation.
//! Grounded in the claim mechanism sketched in the design notes — "a small
//! set of reserved names... implement as a separate set in the header
//! collection rather than via inheritance."

use http::{HeaderMap, HeaderName, HeaderValue};

use crate::error::FrameworkError;

/// Mutable header state for one in-flight [`crate::task::Task`]. Not
/// `Clone`; owned exclusively by the task for the lifetime of the request.
#[derive(Default)]
pub struct Headers {
    map: HeaderMap,
    claimed: std::collections::HashSet<HeaderName>,
}

impl Headers {
    pub fn new() -> Self {
        Headers::default()
    }

    /// Replaces all values for `name` with the single `value`. Fails if
    /// `name` has been claimed by another component.
    pub fn set(&mut self, name: HeaderName, value: HeaderValue) -> Result<(), FrameworkError> {
        self.check_not_claimed(&name)?;
        self.map.remove(&name);
        self.map.insert(name, value);
        Ok(())
    }

    /// Appends `value` to the list of values already recorded for `name`
    /// (used for repeatable headers, notably `Set-Cookie`).
    pub fn append(&mut self, name: HeaderName, value: HeaderValue) -> Result<(), FrameworkError> {
        self.check_not_claimed(&name)?;
        self.map.append(name, value);
        Ok(())
    }

    pub fn get(&self, name: &HeaderName) -> Option<&HeaderValue> {
        self.map.get(name)
    }

    pub fn get_all(&self, name: &HeaderName) -> impl Iterator<Item = &HeaderValue> {
        self.map.get_all(name).iter()
    }

    pub fn remove(&mut self, name: &HeaderName) -> Result<(), FrameworkError> {
        self.check_not_claimed(name)?;
        self.map.remove(name);
        Ok(())
    }

    /// Reserves `name` against further mutation by anyone other than the
    /// component holding the claim. There is no way to release a claim: it
    /// lasts for the lifetime of the task, matching the security
    /// interceptors this exists for (framing protection, CSP, and so on).
    pub fn claim(&mut self, name: HeaderName) {
        self.claimed.insert(name);
    }

    pub fn is_claimed(&self, name: &HeaderName) -> bool {
        self.claimed.contains(name)
    }

    /// Appends a `Set-Cookie` header for `cookie_header_value` (the fully
    /// formatted `name=value; attr=...` string). Rejects an empty or
    /// malformed cookie name; cookie *value* and attribute validation beyond
    /// that is explicitly out of scope.
    pub fn set_cookie(&mut self, name: &str, cookie_header_value: HeaderValue) -> Result<(), FrameworkError> {
        if !is_valid_cookie_name(name) {
            return Err(FrameworkError::invariant(format!(
                "invalid cookie name {name:?}"
            )));
        }
        self.append(http::header::SET_COOKIE, cookie_header_value)
    }

    fn check_not_claimed(&self, name: &HeaderName) -> Result<(), FrameworkError> {
        if self.claimed.contains(name) {
            return Err(FrameworkError::invariant(format!(
                "header {name} is claimed and cannot be mutated"
            )));
        }
        Ok(())
    }

    pub fn as_map(&self) -> &HeaderMap {
        &self.map
    }

    pub fn iter(&self) -> impl Iterator<Item = (&HeaderName, &HeaderValue)> {
        self.map.iter()
    }
}

/// A cookie name is a `token` per RFC 6265 §4.1.1: one or more characters,
/// none of them CTLs, space, or a separator.
fn is_valid_cookie_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_graphic() && !matches!(b, b'(' | b')' | b'<' | b'>' | b'@' | b',' | b';' | b':' | b'\\' | b'"' | b'/' | b'[' | b']' | b'?' | b'=' | b'{' | b'}'))
}
