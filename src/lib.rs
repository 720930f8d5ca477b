/*
 * Copyright Stalwart Labs Ltd. See the COPYING
 * file at the top-level directory of this distribution.
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

//! # simple-email
//!
//! _simple-email_ is a small library to compose e-mail messages and hand them
//! to an SMTP server for delivery. It includes the following features:
//!
//! - Builds **MIME** messages (_RFC 2045 - 2049_) with a text body and any
//!   number of binary attachments, using [`mail-builder`](https://crates.io/crates/mail-builder).
//! - Accepts recipients as a single address, a comma separated list or a
//!   sequence of addresses.
//! - Simple Mail Transfer Protocol (**SMTP**; _RFC 5321_) submission with
//!   **STARTTLS** (_RFC 3207_) or implicit TLS.
//! - SMTP Authentication (_RFC 4954_) using CRAM-MD5, LOGIN or PLAIN, from
//!   most secure to least secure.
//! - Blocking API with an additive async variant (requires Tokio).
//!
//! ## Usage Example
//!
//! ```rust
//!     // Credentials are supplied by the caller, never hard-coded.
//!     let client = EmailClient::new(
//!         std::env::var("SMTP_LOGIN")?,
//!         std::env::var("SMTP_PASSWORD")?,
//!         "smtp.office365.com",
//!         587,
//!     );
//!
//!     let mut email = Email::new(
//!         client.login(),
//!         "jane@example.com, james@example.com",
//!         "Quarterly report",
//!         "Please find the report attached.",
//!     )
//!     .with_cc("finance@example.com");
//!
//!     email.add_attachment(b"1,2,3".to_vec(), "numbers.csv");
//!     email.add_attachment_from_path("/reports/q3.pdf")?;
//!
//!     client.send(&email)?;
//! ```
//!
//! ## License
//!
//! Licensed under either of
//!
//!  * Apache License, Version 2.0 ([LICENSE-APACHE](LICENSE-APACHE) or <http://www.apache.org/licenses/LICENSE-2.0>)
//!  * MIT license ([LICENSE-MIT](LICENSE-MIT) or <http://opensource.org/licenses/MIT>)
//!
//! at your option.
//!

pub mod client;
pub mod email;
pub mod smtp;

use std::{fmt::Display, hash::Hash, path::PathBuf, time::Duration};

pub use client::EmailClient;
pub use email::{Attachment, BodyType, Email, Recipients};
pub use mail_builder;
pub use smtp::message::{Address, IntoMessage, Message, Parameters};
use smtp_proto::Response;
use tokio_rustls::TlsConnector;

#[derive(Debug)]
pub enum Error {
    /// I/O error
    Io(std::io::Error),

    /// TLS error
    Tls(Box<rustls::Error>),

    /// Attachment file could not be read.
    FileAccess(PathBuf, std::io::Error),

    /// Message could not be encoded.
    Encode(std::io::Error),

    /// Base64 decode error
    Base64(base64::DecodeError),

    /// SMTP authentication error.
    Auth(smtp::auth::Error),

    /// Failure parsing SMTP reply
    UnparseableReply,

    /// Unexpected SMTP reply.
    UnexpectedReply(Response<String>),

    /// SMTP authentication failure.
    AuthenticationFailed(Response<String>),

    /// The server refused the sender, a recipient or the message contents.
    Rejected(Response<String>),

    /// Invalid TLS name provided.
    InvalidTLSName,

    /// Missing message sender.
    MissingMailFrom,

    /// Missing message recipients.
    MissingRcptTo,

    /// Address or envelope parameter containing line breaks.
    InvalidAddress(String),

    /// The server does no support any of the available authentication methods.
    UnsupportedAuthMechanism,

    /// Connection timeout.
    Timeout,

    /// STARTTLS not available
    MissingStartTls,

    /// Blocking send called from within a Tokio runtime.
    BlockingInRuntime,
}

/// Broad classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// An attachment path does not exist or is not readable.
    FileAccess,
    /// The server is unreachable, the TLS handshake failed or the session
    /// broke down before the message was handed over.
    Connection,
    /// The server rejected the credentials.
    Authentication,
    /// The server rejected the message after authentication.
    Delivery,
    /// The message is missing its sender or recipients, or cannot be encoded.
    InvalidMessage,
}

pub type Result<T> = std::result::Result<T, Error>;

/// SMTP client session over an established stream.
pub struct SmtpClient<T> {
    pub stream: T,
    pub timeout: Duration,
}

/// Connection parameters for opening an [`SmtpClient`] session.
#[derive(Clone)]
pub struct SmtpClientBuilder<T: AsRef<str> + PartialEq + Eq + Hash> {
    pub timeout: Duration,
    pub tls_connector: TlsConnector,
    pub tls_hostname: T,
    pub tls_implicit: bool,
    pub credentials: Option<Credentials<T>>,
    pub addr: String,
    pub local_host: String,
}

/// SMTP login and password.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Credentials<T: AsRef<str> + PartialEq + Eq + Hash> {
    pub username: T,
    pub secret: T,
}

impl Error {
    /// Classifies this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::FileAccess(..) => ErrorKind::FileAccess,
            Error::Io(_)
            | Error::Tls(_)
            | Error::UnparseableReply
            | Error::UnexpectedReply(_)
            | Error::InvalidTLSName
            | Error::Timeout
            | Error::MissingStartTls
            | Error::BlockingInRuntime => ErrorKind::Connection,
            Error::Auth(_)
            | Error::Base64(_)
            | Error::AuthenticationFailed(_)
            | Error::UnsupportedAuthMechanism => ErrorKind::Authentication,
            Error::Rejected(_) => ErrorKind::Delivery,
            Error::Encode(_)
            | Error::MissingMailFrom
            | Error::MissingRcptTo
            | Error::InvalidAddress(_) => ErrorKind::InvalidMessage,
        }
    }

    /// The server reply that caused this error, if any.
    pub fn reply(&self) -> Option<&Response<String>> {
        match self {
            Error::UnexpectedReply(reply)
            | Error::AuthenticationFailed(reply)
            | Error::Rejected(reply) => Some(reply),
            _ => None,
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) | Error::FileAccess(_, err) | Error::Encode(err) => Some(err),
            Error::Tls(err) => Some(err.as_ref()),
            Error::Base64(err) => Some(err),
            _ => None,
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {e}"),
            Error::Tls(e) => write!(f, "TLS error: {e}"),
            Error::FileAccess(path, e) => {
                write!(f, "Failed to read attachment {}: {e}", path.display())
            }
            Error::Encode(e) => write!(f, "Failed to encode message: {e}"),
            Error::Base64(e) => write!(f, "Base64 decode error: {e}"),
            Error::Auth(e) => write!(f, "SMTP authentication error: {e}"),
            Error::UnparseableReply => write!(f, "Unparseable SMTP reply"),
            Error::UnexpectedReply(e) => {
                write!(f, "Unexpected reply: {} {}", e.code, e.message)
            }
            Error::AuthenticationFailed(e) => {
                write!(f, "Authentication failed: {} {}", e.code, e.message)
            }
            Error::Rejected(e) => write!(f, "Message rejected: {} {}", e.code, e.message),
            Error::InvalidTLSName => write!(f, "Invalid TLS name provided"),
            Error::MissingMailFrom => write!(f, "Missing message sender"),
            Error::MissingRcptTo => write!(f, "Missing message recipients"),
            Error::InvalidAddress(addr) => write!(f, "Invalid address {addr:?}"),
            Error::UnsupportedAuthMechanism => write!(
                f,
                "The server does no support any of the available authentication methods"
            ),
            Error::Timeout => write!(f, "Connection timeout"),
            Error::MissingStartTls => write!(f, "STARTTLS extension unavailable"),
            Error::BlockingInRuntime => write!(
                f,
                "Blocking send called from within an async runtime, use send_async"
            ),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<base64::DecodeError> for Error {
    fn from(err: base64::DecodeError) -> Self {
        Error::Base64(err)
    }
}

impl From<smtp::auth::Error> for Error {
    fn from(err: smtp::auth::Error) -> Self {
        Error::Auth(err)
    }
}
