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

//! In-process SMTP server used by the test suite.
//!
//! Listens on `127.0.0.1` with an OS-assigned port and a self-signed
//! certificate, speaks just enough ESMTP to run a submission session
//! (EHLO, STARTTLS, AUTH PLAIN/LOGIN, MAIL, RCPT, DATA, QUIT) and reports
//! what each connection sent once it closes.

use std::{sync::Arc, time::Duration};

use base64::{engine::general_purpose::STANDARD, Engine};
use rcgen::generate_simple_self_signed;
use rustls::pki_types::PrivatePkcs8KeyDer;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    sync::mpsc,
    task::JoinHandle,
};
use tokio_rustls::TlsAcceptor;

use crate::{smtp::AssertReply, SmtpClient};

#[derive(Clone)]
pub(crate) struct FakeServerConfig {
    pub username: &'static str,
    pub password: &'static str,
    /// Mechanisms advertised in the EHLO reply, space separated.
    pub auth_mechanisms: &'static str,
    pub starttls: bool,
    pub implicit_tls: bool,
    /// Recipient refused with a 550 reply.
    pub reject_rcpt: Option<&'static str>,
    /// Refuse every message after DATA.
    pub reject_data: bool,
}

impl Default for FakeServerConfig {
    fn default() -> Self {
        FakeServerConfig {
            username: "user",
            password: "pass",
            auth_mechanisms: "PLAIN",
            starttls: true,
            implicit_tls: false,
            reject_rcpt: None,
            reject_data: false,
        }
    }
}

/// Everything a single client connection sent.
#[derive(Debug, Default)]
pub(crate) struct Transcript {
    pub commands: Vec<String>,
    pub messages: Vec<Vec<u8>>,
    pub used_tls: bool,
}

impl Transcript {
    pub fn has_command(&self, prefix: &str) -> bool {
        self.commands
            .iter()
            .any(|cmd| cmd.to_ascii_uppercase().starts_with(prefix))
    }
}

pub(crate) struct FakeSmtpServer {
    port: u16,
    transcripts: mpsc::UnboundedReceiver<Transcript>,
    handle: JoinHandle<()>,
}

enum Outcome {
    Closed,
    StartTls,
}

impl FakeSmtpServer {
    pub async fn start(config: FakeServerConfig) -> Self {
        #[cfg(feature = "ring")]
        let _ = rustls::crypto::ring::default_provider().install_default();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let cert =
            generate_simple_self_signed(vec!["127.0.0.1".to_string(), "localhost".to_string()])
                .unwrap();
        let key_der = PrivatePkcs8KeyDer::from(cert.key_pair.serialize_der());
        let tls_config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(vec![cert.cert.der().clone()], key_der.into())
            .unwrap();
        let acceptor = TlsAcceptor::from(Arc::new(tls_config));

        let (tx, transcripts) = mpsc::unbounded_channel();
        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let acceptor = acceptor.clone();
                let config = config.clone();
                let tx = tx.clone();
                tokio::spawn(async move {
                    let mut transcript = Transcript::default();
                    let _ = handle_connection(stream, acceptor, &config, &mut transcript).await;
                    let _ = tx.send(transcript);
                });
            }
        });

        FakeSmtpServer {
            port,
            transcripts,
            handle,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Waits for the next connection to finish and returns what it sent.
    pub async fn next_transcript(&mut self) -> Transcript {
        tokio::time::timeout(Duration::from_secs(10), self.transcripts.recv())
            .await
            .unwrap()
            .unwrap()
    }

    /// Opens a cleartext session, already past the greeting.
    pub async fn connect_plain(&self) -> SmtpClient<TcpStream> {
        let mut client = SmtpClient {
            stream: TcpStream::connect(("127.0.0.1", self.port)).await.unwrap(),
            timeout: Duration::from_secs(10),
        };
        client
            .read()
            .await
            .unwrap()
            .assert_positive_completion()
            .unwrap();
        client
    }
}

impl Drop for FakeSmtpServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn handle_connection(
    stream: TcpStream,
    acceptor: TlsAcceptor,
    config: &FakeServerConfig,
    transcript: &mut Transcript,
) -> std::io::Result<()> {
    if config.implicit_tls {
        let mut reader = BufReader::new(acceptor.accept(stream).await?);
        transcript.used_tls = true;
        write_reply(&mut reader, "220 fake.test ESMTP ready\r\n").await?;
        session(&mut reader, config, transcript, true).await?;
        return Ok(());
    }

    let mut reader = BufReader::new(stream);
    write_reply(&mut reader, "220 fake.test ESMTP ready\r\n").await?;
    if let Outcome::StartTls = session(&mut reader, config, transcript, false).await? {
        let mut reader = BufReader::new(acceptor.accept(reader.into_inner()).await?);
        transcript.used_tls = true;
        session(&mut reader, config, transcript, true).await?;
    }
    Ok(())
}

async fn session<S: AsyncRead + AsyncWrite + Unpin>(
    reader: &mut BufReader<S>,
    config: &FakeServerConfig,
    transcript: &mut Transcript,
    tls_active: bool,
) -> std::io::Result<Outcome> {
    let mut authenticated = false;

    loop {
        let Some(line) = read_line(reader).await? else {
            return Ok(Outcome::Closed);
        };
        transcript.commands.push(line.clone());
        let command = line.to_ascii_uppercase();

        let reply = if command.starts_with("EHLO ") {
            let mut reply = "250-fake.test greets you\r\n".to_string();
            if config.starttls && !tls_active {
                reply.push_str("250-STARTTLS\r\n");
            }
            if !config.auth_mechanisms.is_empty() {
                reply.push_str(&format!("250-AUTH {}\r\n", config.auth_mechanisms));
            }
            reply.push_str("250 8BITMIME\r\n");
            reply
        } else if command == "STARTTLS" && config.starttls && !tls_active {
            write_reply(reader, "220 2.0.0 Ready to start TLS\r\n").await?;
            return Ok(Outcome::StartTls);
        } else if let Some(payload) = command.strip_prefix("AUTH PLAIN ") {
            // Decode from the original line, the payload is case sensitive
            let payload = &line[line.len() - payload.len()..];
            let decoded = STANDARD.decode(payload).unwrap_or_default();
            authenticated =
                decoded == format!("\u{0}{}\u{0}{}", config.username, config.password).as_bytes();
            auth_reply(authenticated)
        } else if command == "AUTH LOGIN" {
            write_reply(reader, "334 VXNlcm5hbWU6\r\n").await?;
            let username = read_line(reader).await?.unwrap_or_default();
            transcript.commands.push(username.clone());
            write_reply(reader, "334 UGFzc3dvcmQ6\r\n").await?;
            let password = read_line(reader).await?.unwrap_or_default();
            transcript.commands.push(password.clone());
            authenticated = STANDARD.decode(username).unwrap_or_default()
                == config.username.as_bytes()
                && STANDARD.decode(password).unwrap_or_default() == config.password.as_bytes();
            auth_reply(authenticated)
        } else if command.starts_with("AUTH ") {
            "504 5.5.4 Unrecognized authentication type\r\n".to_string()
        } else if command.starts_with("MAIL FROM:") {
            if authenticated || config.auth_mechanisms.is_empty() {
                "250 2.1.0 Sender OK\r\n".to_string()
            } else {
                "530 5.7.0 Authentication required\r\n".to_string()
            }
        } else if command.starts_with("RCPT TO:") {
            match config.reject_rcpt {
                Some(rcpt) if line.contains(rcpt) => {
                    "550 5.1.1 Mailbox unavailable\r\n".to_string()
                }
                _ => "250 2.1.5 Recipient OK\r\n".to_string(),
            }
        } else if command == "DATA" {
            write_reply(reader, "354 Start mail input; end with <CRLF>.<CRLF>\r\n").await?;
            transcript.messages.push(read_data(reader).await?);
            if config.reject_data {
                "554 5.6.0 Message content rejected\r\n".to_string()
            } else {
                "250 2.0.0 Queued\r\n".to_string()
            }
        } else if command == "RSET" {
            "250 2.0.0 OK\r\n".to_string()
        } else if command == "QUIT" {
            write_reply(reader, "221 2.0.0 Bye\r\n").await?;
            return Ok(Outcome::Closed);
        } else {
            "500 5.5.1 Unrecognized command\r\n".to_string()
        };

        write_reply(reader, &reply).await?;
    }
}

fn auth_reply(authenticated: bool) -> String {
    if authenticated {
        "235 2.7.0 Authentication successful\r\n".to_string()
    } else {
        "535 5.7.8 Authentication credentials invalid\r\n".to_string()
    }
}

async fn read_line<S: AsyncRead + AsyncWrite + Unpin>(
    reader: &mut BufReader<S>,
) -> std::io::Result<Option<String>> {
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        Ok(None)
    } else {
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }
}

/// Reads a DATA payload up to the terminating dot, undoing dot-stuffing.
async fn read_data<S: AsyncRead + AsyncWrite + Unpin>(
    reader: &mut BufReader<S>,
) -> std::io::Result<Vec<u8>> {
    let mut message = Vec::new();
    loop {
        let mut line = Vec::new();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        if line == b".\r\n" {
            return Ok(message);
        }
        let line = line.strip_prefix(b".").unwrap_or(line.as_slice());
        message.extend_from_slice(line);
    }
}

async fn write_reply<S: AsyncRead + AsyncWrite + Unpin>(
    reader: &mut BufReader<S>,
    reply: &str,
) -> std::io::Result<()> {
    reader.get_mut().write_all(reply.as_bytes()).await?;
    reader.get_mut().flush().await
}
