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

use std::{
    path::Path,
    sync::{
        atomic::{AtomicU64, Ordering},
        OnceLock,
    },
    time::{SystemTime, UNIX_EPOCH},
};

use mail_builder::{
    headers::{address::Address, date::Date, raw::Raw, HeaderType},
    mime::MimePart,
    MessageBuilder,
};

static COUNTER: AtomicU64 = AtomicU64::new(0);

/// Recipient list as accepted by [`Email::new`] and [`Email::with_cc`].
///
/// A single string may hold several comma separated addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipients {
    Single(String),
    List(Vec<String>),
}

/// Content type of the message body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyType {
    #[default]
    Plain,
    Html,
}

/// A file attached to an [`Email`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    filename: String,
    content_type: String,
    data: Vec<u8>,
}

/// An e-mail message with a text body and any number of attachments.
///
/// Date and Message-ID are fixed when the message is created and the encoded
/// form is kept until the message changes, so serializing the same message
/// twice yields the same bytes.
#[derive(Debug, Clone)]
pub struct Email {
    from_addr: String,
    to_addr: Vec<String>,
    cc: Vec<String>,
    subject: String,
    body: String,
    body_type: BodyType,
    attachments: Vec<Attachment>,
    date: i64,
    message_id: String,
    rendered: OnceLock<Vec<u8>>,
}

impl Recipients {
    /// Splits, trims and drops empty entries, keeping the original order.
    pub fn normalize(self) -> Vec<String> {
        match self {
            Recipients::Single(addrs) => addrs
                .split(',')
                .map(str::trim)
                .filter(|addr| !addr.is_empty())
                .map(String::from)
                .collect(),
            Recipients::List(addrs) => addrs
                .into_iter()
                .map(|addr| addr.trim().to_string())
                .filter(|addr| !addr.is_empty())
                .collect(),
        }
    }
}

impl From<&str> for Recipients {
    fn from(addrs: &str) -> Self {
        Recipients::Single(addrs.to_string())
    }
}

impl From<String> for Recipients {
    fn from(addrs: String) -> Self {
        Recipients::Single(addrs)
    }
}

impl From<&String> for Recipients {
    fn from(addrs: &String) -> Self {
        Recipients::Single(addrs.clone())
    }
}

impl From<Vec<String>> for Recipients {
    fn from(addrs: Vec<String>) -> Self {
        Recipients::List(addrs)
    }
}

impl From<Vec<&str>> for Recipients {
    fn from(addrs: Vec<&str>) -> Self {
        Recipients::List(addrs.into_iter().map(String::from).collect())
    }
}

impl From<&[&str]> for Recipients {
    fn from(addrs: &[&str]) -> Self {
        Recipients::List(addrs.iter().map(|addr| addr.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Recipients {
    fn from(addrs: [&str; N]) -> Self {
        Recipients::List(addrs.iter().map(|addr| addr.to_string()).collect())
    }
}

impl BodyType {
    pub fn content_type(&self) -> &'static str {
        match self {
            BodyType::Plain => "text/plain",
            BodyType::Html => "text/html",
        }
    }
}

impl Attachment {
    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl Email {
    /// Create a new message.
    pub fn new(
        from_addr: impl Into<String>,
        to_addr: impl Into<Recipients>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let token = format!(
            "{:x}{:x}{:04x}",
            now.as_secs(),
            now.subsec_nanos(),
            COUNTER.fetch_add(1, Ordering::Relaxed)
        );

        Email {
            from_addr: from_addr.into(),
            to_addr: to_addr.into().normalize(),
            cc: Vec::new(),
            subject: subject.into(),
            body: body.into(),
            body_type: BodyType::default(),
            attachments: Vec::new(),
            date: now.as_secs() as i64,
            message_id: format!(
                "{token}@{}",
                gethostname::gethostname().to_str().unwrap_or("localhost")
            ),
            rendered: OnceLock::new(),
        }
    }

    /// Set the carbon copy recipients.
    pub fn with_cc(mut self, cc: impl Into<Recipients>) -> Self {
        self.cc = cc.into().normalize();
        self.rendered = OnceLock::new();
        self
    }

    /// Set the body content type.
    pub fn body_type(mut self, body_type: BodyType) -> Self {
        self.body_type = body_type;
        self.rendered = OnceLock::new();
        self
    }

    pub fn from_addr(&self) -> &str {
        &self.from_addr
    }

    pub fn to_addr(&self) -> &[String] {
        &self.to_addr
    }

    pub fn cc(&self) -> &[String] {
        &self.cc
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    /// Attach binary content as `application/octet-stream`.
    pub fn add_attachment(
        &mut self,
        data: impl Into<Vec<u8>>,
        filename: impl Into<String>,
    ) -> &mut Self {
        self.add_typed_attachment(data, filename, "application/octet-stream")
    }

    /// Attach binary content with an explicit MIME type.
    pub fn add_typed_attachment(
        &mut self,
        data: impl Into<Vec<u8>>,
        filename: impl Into<String>,
        content_type: impl Into<String>,
    ) -> &mut Self {
        self.attachments.push(Attachment {
            filename: filename.into(),
            content_type: content_type.into(),
            data: data.into(),
        });
        self.rendered = OnceLock::new();
        self
    }

    /// Attach the contents of a file, named after the last component of `path`.
    pub fn add_attachment_from_path(&mut self, path: impl AsRef<Path>) -> crate::Result<&mut Self> {
        let path = path.as_ref();
        let filename = path
            .file_name()
            .ok_or_else(|| {
                crate::Error::FileAccess(
                    path.to_path_buf(),
                    std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no file name"),
                )
            })?
            .to_string_lossy()
            .into_owned();
        let data = std::fs::read(path)
            .map_err(|err| crate::Error::FileAccess(path.to_path_buf(), err))?;

        log::debug!("Attaching {} ({} bytes)", path.display(), data.len());

        Ok(self.add_attachment(data, filename))
    }

    /// Encodes the message as a `multipart/mixed` MIME document.
    pub fn serialize(&self) -> crate::Result<Vec<u8>> {
        if let Some(rendered) = self.rendered.get() {
            return Ok(rendered.clone());
        }

        let rendered = self.encode()?;
        Ok(self.rendered.get_or_init(|| rendered).clone())
    }

    fn encode(&self) -> crate::Result<Vec<u8>> {
        if let Some(addr) = std::iter::once(&self.from_addr)
            .chain(&self.to_addr)
            .chain(&self.cc)
            .find(|addr| addr.contains(['\r', '\n']))
        {
            return Err(crate::Error::InvalidAddress(addr.clone()));
        }

        let mut parts = Vec::with_capacity(self.attachments.len() + 1);
        parts.push(MimePart::new(
            self.body_type.content_type(),
            self.body.as_str(),
        ));
        for attachment in &self.attachments {
            parts.push(
                MimePart::new(
                    attachment.content_type.as_str(),
                    attachment.data.as_slice(),
                )
                .attachment(attachment.filename.as_str()),
            );
        }

        let mut builder = MessageBuilder::new()
            .header("From", address_header(std::slice::from_ref(&self.from_addr)))
            .header("To", address_header(&self.to_addr));
        if !self.cc.is_empty() {
            builder = builder.header("Cc", address_header(&self.cc));
        }

        builder
            .subject(self.subject.as_str())
            .date(Date::new(self.date))
            .message_id(self.message_id.as_str())
            .body(MimePart::new("multipart/mixed", parts))
            .write_to_vec()
            .map_err(crate::Error::Encode)
    }

    /// Sender address for the SMTP envelope.
    pub fn envelope_from(&self) -> &str {
        envelope_address(&self.from_addr)
    }

    /// Every To and Cc address for the SMTP envelope, in order.
    pub fn envelope_recipients(&self) -> impl Iterator<Item = &str> {
        self.to_addr
            .iter()
            .chain(self.cc.iter())
            .map(|addr| envelope_address(addr))
            .filter(|addr| !addr.is_empty())
    }
}

/// ASCII address lists are written as given, anything else goes through
/// `mail-builder` so display names get RFC 2047 encoded.
fn address_header(addrs: &[String]) -> HeaderType<'_> {
    if addrs.iter().all(|addr| addr.is_ascii()) {
        Raw::new(addrs.join(", ")).into()
    } else {
        Address::new_list(
            addrs
                .iter()
                .map(|addr| Address::new_address(display_name(addr), envelope_address(addr)))
                .collect(),
        )
        .into()
    }
}

fn display_name(addr: &str) -> Option<&str> {
    addr.split_once('<')
        .map(|(name, _)| name.trim().trim_matches('"').trim())
        .filter(|name| !name.is_empty())
}

/// Strips the display name from `Name <user@domain>`.
fn envelope_address(addr: &str) -> &str {
    match addr.split_once('<') {
        Some((_, addr)) => addr.split('>').next().unwrap_or(addr).trim(),
        None => addr.trim(),
    }
}
