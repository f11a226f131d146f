//! Guarded view over response headers.
//!
//! Once `Connection: close` has been forced on a response, no writer may
//! replace or extend it with a non-close value. Writes that would do so fail
//! with [`HeaderConflict`] instead of being silently dropped or applied.

use axum::http::{
    header::{self, HeaderName, HeaderValue},
    HeaderMap,
};
use thiserror::Error;

/// A write tried to override a forced `Connection: close`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Connection count exceeded, close is forced (attempted `Connection: {attempted}`)")]
pub struct HeaderConflict {
    /// The rejected header value.
    pub attempted: String,
}

/// Mutable header view with an optional forced-close lock.
#[derive(Debug)]
pub struct ResponseHeaders<'a> {
    headers: &'a mut HeaderMap,
    close_forced: bool,
}

impl<'a> ResponseHeaders<'a> {
    pub fn new(headers: &'a mut HeaderMap) -> Self {
        Self {
            headers,
            close_forced: false,
        }
    }

    pub fn is_close_forced(&self) -> bool {
        self.close_forced
    }

    /// Impose `Connection: close` and lock the connection header.
    ///
    /// Fails if a non-close `Connection` value is already present, since that
    /// value was written by someone expecting the connection to stay open.
    pub fn force_close(&mut self) -> Result<(), HeaderConflict> {
        if let Some(existing) = self
            .headers
            .get_all(header::CONNECTION)
            .iter()
            .find(|v| !is_close(v))
        {
            return Err(HeaderConflict {
                attempted: String::from_utf8_lossy(existing.as_bytes()).into_owned(),
            });
        }

        self.headers
            .insert(header::CONNECTION, HeaderValue::from_static("close"));
        self.close_forced = true;
        Ok(())
    }

    /// Insert a header, replacing previous values.
    pub fn insert(
        &mut self,
        name: HeaderName,
        value: HeaderValue,
    ) -> Result<Option<HeaderValue>, HeaderConflict> {
        self.check(&name, &value)?;
        Ok(self.headers.insert(name, value))
    }

    /// Append a header value, keeping previous values.
    pub fn append(&mut self, name: HeaderName, value: HeaderValue) -> Result<(), HeaderConflict> {
        self.check(&name, &value)?;
        self.headers.append(name, value);
        Ok(())
    }

    pub fn get(&self, name: &HeaderName) -> Option<&HeaderValue> {
        self.headers.get(name)
    }

    fn check(&self, name: &HeaderName, value: &HeaderValue) -> Result<(), HeaderConflict> {
        if self.close_forced && *name == header::CONNECTION && !is_close(value) {
            return Err(HeaderConflict {
                attempted: String::from_utf8_lossy(value.as_bytes()).into_owned(),
            });
        }
        Ok(())
    }
}

fn is_close(value: &HeaderValue) -> bool {
    value.as_bytes().eq_ignore_ascii_case(b"close")
}
