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

use std::{fmt::Display, hash::Hash};

use base64::{engine::general_purpose::STANDARD, Engine};
#[cfg(feature = "cram-md5")]
use smtp_proto::AUTH_CRAM_MD5;
use smtp_proto::{EhloResponse, AUTH_LOGIN, AUTH_PLAIN};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::{Credentials, SmtpClient};

/// Mechanisms in order of preference, most secure first.
#[cfg(feature = "cram-md5")]
const MECHANISMS: [u64; 3] = [AUTH_CRAM_MD5, AUTH_LOGIN, AUTH_PLAIN];
#[cfg(not(feature = "cram-md5"))]
const MECHANISMS: [u64; 2] = [AUTH_LOGIN, AUTH_PLAIN];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    InvalidChallenge,
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidChallenge => write!(f, "Invalid challenge received."),
        }
    }
}

impl<T: AsRef<str> + PartialEq + Eq + Hash> Credentials<T> {
    /// Creates a new `Credentials` instance.
    pub fn new(username: T, secret: T) -> Credentials<T> {
        Credentials { username, secret }
    }

    pub(crate) fn encode(&self, mechanism: u64, challenge: &str) -> crate::Result<String> {
        let username = self.username.as_ref();
        let secret = self.secret.as_ref();

        Ok(STANDARD.encode(
            match mechanism {
                AUTH_PLAIN => format!("\u{0}{username}\u{0}{secret}"),

                AUTH_LOGIN => {
                    let challenge = STANDARD.decode(challenge)?;
                    let prompts = |prompt: &[u8]| {
                        challenge
                            .get(..prompt.len())
                            .is_some_and(|start| start.eq_ignore_ascii_case(prompt))
                    };

                    // "Username" without the space is what Google sends
                    let answer = if prompts(b"user name") || prompts(b"username") {
                        username
                    } else if prompts(b"password") {
                        secret
                    } else {
                        return Err(Error::InvalidChallenge.into());
                    };
                    answer.to_string()
                }

                #[cfg(feature = "cram-md5")]
                AUTH_CRAM_MD5 => {
                    let mut secret_opad: Vec<u8> = vec![0x5c; 64];
                    let mut secret_ipad: Vec<u8> = vec![0x36; 64];

                    if secret.len() < 64 {
                        for (pos, byte) in secret.as_bytes().iter().enumerate() {
                            secret_opad[pos] = *byte ^ 0x5c;
                            secret_ipad[pos] = *byte ^ 0x36;
                        }
                    } else {
                        for (pos, byte) in md5::compute(secret.as_bytes()).iter().enumerate() {
                            secret_opad[pos] = *byte ^ 0x5c;
                            secret_ipad[pos] = *byte ^ 0x36;
                        }
                    }

                    secret_ipad.extend_from_slice(&STANDARD.decode(challenge)?);
                    secret_opad.extend_from_slice(&md5::compute(&secret_ipad).0);

                    format!("{username} {:x}", md5::compute(&secret_opad))
                }

                _ => return Err(crate::Error::UnsupportedAuthMechanism),
            }
            .as_bytes(),
        ))
    }
}

impl<T: AsRef<str> + PartialEq + Eq + Hash> From<(T, T)> for Credentials<T> {
    fn from(credentials: (T, T)) -> Self {
        Credentials {
            username: credentials.0,
            secret: credentials.1,
        }
    }
}

fn mechanism_name(mechanism: u64) -> &'static str {
    match mechanism {
        AUTH_PLAIN => "PLAIN",
        AUTH_LOGIN => "LOGIN",
        #[cfg(feature = "cram-md5")]
        AUTH_CRAM_MD5 => "CRAM-MD5",
        _ => "",
    }
}

impl<T: AsyncRead + AsyncWrite + Unpin> SmtpClient<T> {
    /// Authenticates with the first mechanism advertised by the server,
    /// trying them from most secure to least secure.
    pub async fn authenticate<U>(
        &mut self,
        credentials: &Credentials<U>,
        capabilities: &EhloResponse<String>,
    ) -> crate::Result<&mut Self>
    where
        U: AsRef<str> + PartialEq + Eq + Hash,
    {
        let mut last_reply = None;

        for mechanism in MECHANISMS {
            if capabilities.auth_mechanisms & mechanism == 0 {
                continue;
            }

            log::debug!(
                "Authenticating as {} using {}",
                credentials.username.as_ref(),
                mechanism_name(mechanism)
            );

            match self.auth(mechanism, credentials).await {
                Ok(_) => return Ok(self),
                Err(crate::Error::UnexpectedReply(reply)) => {
                    // 535: credentials are wrong, other mechanisms will not help
                    let rejected = reply.code == 535;
                    last_reply = Some(reply);
                    if rejected {
                        break;
                    }
                }
                Err(crate::Error::UnsupportedAuthMechanism) => (),
                Err(err) => return Err(err),
            }
        }

        match last_reply {
            Some(reply) => Err(crate::Error::AuthenticationFailed(reply)),
            None => Err(crate::Error::UnsupportedAuthMechanism),
        }
    }

    pub(crate) async fn auth<U>(
        &mut self,
        mechanism: u64,
        credentials: &Credentials<U>,
    ) -> crate::Result<()>
    where
        U: AsRef<str> + PartialEq + Eq + Hash,
    {
        let mut reply = if mechanism == AUTH_PLAIN {
            self.cmd(format!("AUTH PLAIN {}\r\n", credentials.encode(mechanism, "")?).as_bytes())
                .await?
        } else {
            self.cmd(format!("AUTH {}\r\n", mechanism_name(mechanism)).as_bytes())
                .await?
        };

        for _ in 0..3 {
            match reply.code {
                334 => {
                    reply = self
                        .cmd(
                            format!("{}\r\n", credentials.encode(mechanism, &reply.message)?)
                                .as_bytes(),
                        )
                        .await?;
                }
                235 => {
                    return Ok(());
                }
                _ => {
                    return Err(crate::Error::UnexpectedReply(reply));
                }
            }
        }

        Err(crate::Error::UnexpectedReply(reply))
    }
}
