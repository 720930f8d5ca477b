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

use std::{io, sync::Arc};

use rustls::{
    client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
    crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider},
    ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme,
};
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};
use tokio::net::TcpStream;
use tokio_rustls::{client::TlsStream, TlsConnector};

use crate::{Error, SmtpClient};

use super::AssertReply;

impl SmtpClient<TcpStream> {
    /// Upgrade the connection to TLS.
    pub async fn start_tls(
        mut self,
        tls_connector: &TlsConnector,
        hostname: &str,
    ) -> crate::Result<SmtpClient<TlsStream<TcpStream>>> {
        self.cmd(b"STARTTLS\r\n")
            .await?
            .assert_positive_completion()?;

        self.into_tls(tls_connector, hostname).await
    }

    /// Runs the TLS handshake over the current connection.
    pub async fn into_tls(
        self,
        tls_connector: &TlsConnector,
        hostname: &str,
    ) -> crate::Result<SmtpClient<TlsStream<TcpStream>>> {
        log::debug!("Starting TLS handshake with {hostname}");

        let server_name = ServerName::try_from(hostname)
            .map_err(|_| Error::InvalidTLSName)?
            .to_owned();
        let stream = tokio::time::timeout(
            self.timeout,
            tls_connector.connect(server_name, self.stream),
        )
        .await
        .map_err(|_| Error::Timeout)?
        .map_err(handshake_error)?;

        Ok(SmtpClient {
            stream,
            timeout: self.timeout,
        })
    }
}

/// Keeps rustls failures (bad certificate, protocol mismatch) distinguishable
/// from plain socket errors.
fn handshake_error(err: io::Error) -> Error {
    let kind = err.kind();
    match err.into_inner() {
        Some(inner) => match inner.downcast::<rustls::Error>() {
            Ok(err) => Error::Tls(err),
            Err(err) => Error::Io(io::Error::new(kind, err)),
        },
        None => Error::Io(kind.into()),
    }
}

/// Builds a connector trusting the Mozilla root store, or any certificate
/// at all when `allow_invalid_certs` is set.
pub fn build_tls_connector(allow_invalid_certs: bool) -> TlsConnector {
    let mut root_cert_store = RootCertStore::empty();
    root_cert_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let mut config = ClientConfig::builder()
        .with_root_certificates(root_cert_store)
        .with_no_client_auth();

    if allow_invalid_certs {
        let verifier = AnyServerCert(config.crypto_provider().clone());
        config.dangerous().set_certificate_verifier(Arc::new(verifier));
    }

    TlsConnector::from(Arc::new(config))
}

/// Skips certificate chain and name validation. Handshake signatures are
/// still checked with the provider's algorithms.
#[derive(Debug)]
struct AnyServerCert(Arc<CryptoProvider>);

impl ServerCertVerifier for AnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

#[cfg(test)]
mod test {
    use crate::{Error, ErrorKind};

    use super::build_tls_connector;

    #[tokio::test]
    async fn untrusted_certificate() {
        let server = crate::smtp::fake::FakeSmtpServer::start(Default::default()).await;

        let mut client = server.connect_plain().await;
        client.ehlo("client.test").await.unwrap();
        let err = client
            .start_tls(&build_tls_connector(false), "127.0.0.1")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::Tls(_)), "{err}");
        assert_eq!(err.kind(), ErrorKind::Connection);
    }

    #[tokio::test]
    async fn invalid_certificate_allowed() {
        let server = crate::smtp::fake::FakeSmtpServer::start(Default::default()).await;

        let mut client = server.connect_plain().await;
        client.ehlo("client.test").await.unwrap();
        let mut client = client
            .start_tls(&build_tls_connector(true), "127.0.0.1")
            .await
            .unwrap();
        assert!(client.ehlo("client.test").await.is_ok());
    }

    #[tokio::test]
    async fn invalid_tls_name() {
        let server = crate::smtp::fake::FakeSmtpServer::start(Default::default()).await;

        let client = server.connect_plain().await;
        assert!(matches!(
            client
                .into_tls(&build_tls_connector(true), "not a host name")
                .await,
            Err(Error::InvalidTLSName)
        ));
    }
}
