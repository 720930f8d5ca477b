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

use std::{borrow::Cow, collections::HashMap, fmt::Display};

use tokio::io::{AsyncRead, AsyncWrite};

use crate::{Email, SmtpClient};

/// A serialized message together with its SMTP envelope.
#[derive(Debug, Default, Clone)]
pub struct Message<'x> {
    pub mail_from: Address<'x>,
    pub rcpt_to: Vec<Address<'x>>,
    pub body: Cow<'x, [u8]>,
}

/// Envelope address with optional ESMTP parameters (`SIZE`, `NOTIFY`, ...).
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Address<'x> {
    pub email: Cow<'x, str>,
    pub parameters: Parameters<'x>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Parameters<'x> {
    pub params: HashMap<Cow<'x, str>, Option<Cow<'x, str>>>,
}

impl<'x> Message<'x> {
    /// Create a new message
    pub fn new<T, U, V>(from: T, to: U, body: V) -> Self
    where
        T: Into<Address<'x>>,
        U: IntoIterator<Item = T>,
        V: Into<Cow<'x, [u8]>>,
    {
        Message {
            mail_from: from.into(),
            rcpt_to: to.into_iter().map(Into::into).collect(),
            body: body.into(),
        }
    }

    /// Create a new empty message.
    pub fn empty() -> Self {
        Message::default()
    }

    /// Set the sender of the message.
    pub fn from(mut self, address: impl Into<Address<'x>>) -> Self {
        self.mail_from = address.into();
        self
    }

    /// Add a message recipient.
    pub fn to(mut self, address: impl Into<Address<'x>>) -> Self {
        self.rcpt_to.push(address.into());
        self
    }

    /// Set the message body.
    pub fn body(mut self, body: impl Into<Cow<'x, [u8]>>) -> Self {
        self.body = body.into();
        self
    }
}

impl<'x> From<&'x str> for Address<'x> {
    fn from(email: &'x str) -> Self {
        Address {
            email: email.into(),
            parameters: Parameters::default(),
        }
    }
}

impl<'x> From<String> for Address<'x> {
    fn from(email: String) -> Self {
        Address {
            email: email.into(),
            parameters: Parameters::default(),
        }
    }
}

impl<'x> Address<'x> {
    pub fn new(email: impl Into<Cow<'x, str>>, parameters: Parameters<'x>) -> Self {
        Address {
            email: email.into(),
            parameters,
        }
    }
}

impl<'x> Parameters<'x> {
    pub fn new() -> Self {
        Self {
            params: HashMap::new(),
        }
    }

    /// Adds a `KEY=value` parameter.
    pub fn param(mut self, key: impl Into<Cow<'x, str>>, value: impl Into<Cow<'x, str>>) -> Self {
        self.params.insert(key.into(), Some(value.into()));
        self
    }

    /// Adds a parameter without a value, such as `SMTPUTF8`.
    pub fn keyword(mut self, key: impl Into<Cow<'x, str>>) -> Self {
        self.params.insert(key.into(), None);
        self
    }
}

impl<'x> Display for Parameters<'x> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (key, value) in &self.params {
            f.write_str(" ")?;
            f.write_str(key)?;
            if let Some(value) = value {
                f.write_str("=")?;
                f.write_str(value)?;
            }
        }
        Ok(())
    }
}

pub trait IntoMessage<'x> {
    fn into_message(self) -> crate::Result<Message<'x>>;
}

impl<'x> IntoMessage<'x> for Message<'x> {
    fn into_message(self) -> crate::Result<Message<'x>> {
        Ok(self)
    }
}

impl<'x> IntoMessage<'x> for &'x Email {
    fn into_message(self) -> crate::Result<Message<'x>> {
        let mail_from = self.envelope_from();
        if mail_from.is_empty() {
            return Err(crate::Error::MissingMailFrom);
        }

        let rcpt_to = self
            .envelope_recipients()
            .map(Address::from)
            .collect::<Vec<_>>();
        if rcpt_to.is_empty() {
            return Err(crate::Error::MissingRcptTo);
        }

        Ok(Message {
            mail_from: mail_from.into(),
            rcpt_to,
            // Rejects addresses that would break the header block
            body: self.serialize()?.into(),
        })
    }
}

impl<T: AsyncRead + AsyncWrite + Unpin> SmtpClient<T> {
    /// Sends a message to the server. Either every recipient is accepted
    /// and the message is queued, or the transaction fails as a whole.
    pub async fn send<'x>(&mut self, message: impl IntoMessage<'x>) -> crate::Result<()> {
        let message = message.into_message()?;

        self.mail_from(message.mail_from.email.as_ref(), &message.mail_from.parameters)
            .await?;
        for rcpt in &message.rcpt_to {
            self.rcpt_to(rcpt.email.as_ref(), &rcpt.parameters).await?;
        }
        self.data(message.body.as_ref()).await?;

        log::debug!(
            "Message from {} accepted for {} recipient(s)",
            message.mail_from.email,
            message.rcpt_to.len()
        );

        Ok(())
    }
}
