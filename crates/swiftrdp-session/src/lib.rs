#![doc = include_str!("../README.md")]
#![allow(clippy::arithmetic_side_effects)] // FIXME: remove

#[macro_use]
extern crate tracing;

#[macro_use]
mod macros;

pub mod encoder;
pub mod envelope;
pub mod fast_path;
pub mod input;

mod context;

use core::fmt;

pub use context::SessionContext;

pub type SessionResult<T> = Result<T, SessionError>;

#[non_exhaustive]
#[derive(Debug)]
pub enum SessionErrorKind {
    Encode(swiftrdp_core::EncodeError),
    Decode(swiftrdp_core::DecodeError),
    /// The peer broke the protocol (bad fragmentation transition, over-size
    /// update, event gated by an unannounced feature, ...).
    Protocol(&'static str),
    /// Signature mismatch or a failing cryptographic primitive.
    Crypto(&'static str),
    /// Bulk decompression or video codec failure.
    Codec,
    /// A consumer was required but none is registered.
    Declined(&'static str),
    Reason(String),
    General,
    Custom,
}

impl fmt::Display for SessionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            SessionErrorKind::Encode(_) => write!(f, "encode error"),
            SessionErrorKind::Decode(_) => write!(f, "decode error"),
            SessionErrorKind::Protocol(description) => write!(f, "protocol violation: {description}"),
            SessionErrorKind::Crypto(description) => write!(f, "crypto failure: {description}"),
            SessionErrorKind::Codec => write!(f, "codec failure"),
            SessionErrorKind::Declined(what) => write!(f, "no consumer registered for {what}"),
            SessionErrorKind::Reason(description) => write!(f, "reason: {description}"),
            SessionErrorKind::General => write!(f, "general error"),
            SessionErrorKind::Custom => write!(f, "custom error"),
        }
    }
}

impl std::error::Error for SessionErrorKind {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self {
            SessionErrorKind::Encode(e) => Some(e),
            SessionErrorKind::Decode(e) => Some(e),
            _ => None,
        }
    }
}

pub type SessionError = swiftrdp_error::Error<SessionErrorKind>;

pub trait SessionErrorExt {
    fn encode(error: swiftrdp_core::EncodeError) -> Self;
    fn decode(error: swiftrdp_core::DecodeError) -> Self;
    fn protocol(context: &'static str, description: &'static str) -> Self;
    fn crypto(context: &'static str, description: &'static str) -> Self;
    fn codec<E>(context: &'static str, e: E) -> Self
    where
        E: std::error::Error + Sync + Send + 'static;
    fn declined(what: &'static str) -> Self;
    fn general(context: &'static str) -> Self;
    fn reason(context: &'static str, reason: impl Into<String>) -> Self;
    fn custom<E>(context: &'static str, e: E) -> Self
    where
        E: std::error::Error + Sync + Send + 'static;
}

impl SessionErrorExt for SessionError {
    fn encode(error: swiftrdp_core::EncodeError) -> Self {
        Self::new("encode error", SessionErrorKind::Encode(error))
    }

    fn decode(error: swiftrdp_core::DecodeError) -> Self {
        Self::new("decode error", SessionErrorKind::Decode(error))
    }

    fn protocol(context: &'static str, description: &'static str) -> Self {
        Self::new(context, SessionErrorKind::Protocol(description))
    }

    fn crypto(context: &'static str, description: &'static str) -> Self {
        Self::new(context, SessionErrorKind::Crypto(description))
    }

    fn codec<E>(context: &'static str, e: E) -> Self
    where
        E: std::error::Error + Sync + Send + 'static,
    {
        Self::new(context, SessionErrorKind::Codec).with_source(e)
    }

    fn declined(what: &'static str) -> Self {
        Self::new("dispatch", SessionErrorKind::Declined(what))
    }

    fn general(context: &'static str) -> Self {
        Self::new(context, SessionErrorKind::General)
    }

    fn reason(context: &'static str, reason: impl Into<String>) -> Self {
        Self::new(context, SessionErrorKind::Reason(reason.into()))
    }

    fn custom<E>(context: &'static str, e: E) -> Self
    where
        E: std::error::Error + Sync + Send + 'static,
    {
        Self::new(context, SessionErrorKind::Custom).with_source(e)
    }
}

/// What a consumer callback did with an update or input event.
///
/// Default trait methods report `Unhandled`; the dispatcher turns that into
/// success or [`SessionErrorKind::Declined`] depending on
/// [`SessionContext::deactivate_client_decoding`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackStatus {
    Handled,
    Unhandled,
}

pub type CallbackResult = SessionResult<CallbackStatus>;
