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

use std::time::Duration;

use crate::{Credentials, Email, IntoMessage, SmtpClientBuilder};

/// Sends [`Email`] messages through an authenticated SMTP server.
///
/// Holds connection parameters only. Every call to [`EmailClient::send`]
/// opens its own connection, upgrades it to TLS, authenticates, submits the
/// message and disconnects, so a single client can be shared between threads.
///
/// ```rust
///     let client = EmailClient::new(login, password, "smtp.office365.com", 587);
///     client.send(&email)?;
/// ```
#[derive(Clone)]
pub struct EmailClient {
    builder: SmtpClientBuilder<String>,
}

impl EmailClient {
    /// Stores the credentials and endpoint, no connection is made.
    pub fn new(
        login: impl Into<String>,
        password: impl Into<String>,
        host: impl Into<String>,
        port: u16,
    ) -> Self {
        EmailClient {
            builder: SmtpClientBuilder::new(host.into(), port)
                .credentials(Credentials::new(login.into(), password.into())),
        }
    }

    /// Sets the timeout for each network operation.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.builder = self.builder.timeout(timeout);
        self
    }

    /// Connect with implicit TLS (usually port 465) instead of STARTTLS.
    pub fn implicit_tls(mut self, implicit_tls: bool) -> Self {
        self.builder = self.builder.implicit_tls(implicit_tls);
        self
    }

    /// Accept any server certificate. Only meant for test servers.
    pub fn allow_invalid_certs(mut self) -> Self {
        self.builder = self.builder.allow_invalid_certs();
        self
    }

    /// Sets the name announced in EHLO, defaults to the local hostname.
    pub fn helo_host(mut self, host: impl Into<String>) -> Self {
        self.builder = self.builder.helo_host(host);
        self
    }

    pub fn login(&self) -> &str {
        self.builder
            .credentials
            .as_ref()
            .map_or("", |credentials| credentials.username.as_str())
    }

    pub fn host(&self) -> &str {
        &self.builder.tls_hostname
    }

    /// Sends a message, blocking until the server has accepted it for every
    /// recipient or the session failed.
    ///
    /// Fails with [`crate::Error::BlockingInRuntime`] when called from within
    /// a Tokio runtime, use [`EmailClient::send_async`] there.
    pub fn send(&self, email: &Email) -> crate::Result<()> {
        self.send_message(email)
    }

    /// Async version of [`EmailClient::send`].
    pub async fn send_async(&self, email: &Email) -> crate::Result<()> {
        self.send_message_async(email).await
    }

    /// Sends anything convertible into a [`crate::Message`], such as a message with
    /// an envelope that differs from its headers, ESMTP parameters or an
    /// already encoded body.
    pub fn send_message<'x>(&self, message: impl IntoMessage<'x>) -> crate::Result<()> {
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(crate::Error::BlockingInRuntime);
        }

        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?
            .block_on(self.send_message_async(message))
    }

    /// Async version of [`EmailClient::send_message`].
    pub async fn send_message_async<'x>(
        &self,
        message: impl IntoMessage<'x>,
    ) -> crate::Result<()> {
        // Fail on a bad envelope before touching the network
        let message = message.into_message()?;

        let mut client = self.builder.connect().await?;
        client.send(message).await?;

        // The message is queued at this point, a failed QUIT is not an error
        if let Err(err) = client.quit().await {
            log::debug!("QUIT failed after delivery: {err}");
        }

        Ok(())
    }
}
