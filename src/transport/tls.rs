//! TLS transport and the lazily built, shared TLS client context

use crate::common::ClientIdentifier;
use crate::errors::{ErrorContext, Result, SwarmError};
use crate::message::TopicMessage;
use crate::transport::lines::{LineConnection, connect_tcp};
use crate::transport::{Transport, TransportKind};

use async_trait::async_trait;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::{ClientConfig, RootCertStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::OnceCell;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tracing::info;

/// Crypto provider used for every TLS context in the crate
pub fn crypto_provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

/// Parse PEM-encoded certificates from a file
pub fn load_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let pem = std::fs::read(path)
        .with_config_context(&format!("Cannot read certificates from {}", path.display()))?;
    let certs = CertificateDer::pem_slice_iter(&pem)
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_config_context(&format!("Invalid certificate PEM in {}", path.display()))?;
    if certs.is_empty() {
        return Err(SwarmError::config(format!(
            "No certificates found in {}",
            path.display()
        )));
    }
    Ok(certs)
}

/// Parse a PEM-encoded private key from a file
pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let pem = std::fs::read(path)
        .with_config_context(&format!("Cannot read private key from {}", path.display()))?;
    PrivateKeyDer::from_pem_slice(&pem)
        .with_config_context(&format!("Invalid private key PEM in {}", path.display()))
}

/// Client-side TLS context shared by every SSL session of a run.
///
/// Built on first use and never rebuilt; concurrent first users wait for the
/// single initialization and all observe the same instance.
pub struct TlsContext {
    ca_file: Option<PathBuf>,
    config: OnceCell<Arc<ClientConfig>>,
}

impl TlsContext {
    pub fn new(ca_file: Option<PathBuf>) -> Self {
        Self {
            ca_file,
            config: OnceCell::new(),
        }
    }

    pub async fn client_config(&self) -> Result<Arc<ClientConfig>> {
        self.config
            .get_or_try_init(|| async { self.build().map(Arc::new) })
            .await
            .cloned()
    }

    pub fn is_initialized(&self) -> bool {
        self.config.initialized()
    }

    fn build(&self) -> Result<ClientConfig> {
        let mut roots = RootCertStore::empty();
        match &self.ca_file {
            Some(path) => {
                for cert in load_certificates(path)? {
                    roots.add(cert).with_config_context(&format!(
                        "Rejected CA certificate from {}",
                        path.display()
                    ))?;
                }
                info!("Built TLS context with roots from {}", path.display());
            }
            None => {
                roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
                info!("Built TLS context with the webpki root set");
            }
        }

        let config = ClientConfig::builder_with_provider(crypto_provider())
            .with_safe_default_protocol_versions()?
            .with_root_certificates(roots)
            .with_no_client_auth();
        Ok(config)
    }
}

/// Newline-framed session connection over TLS
pub struct SslTransport {
    host: String,
    port: u16,
    queue_size: usize,
    context: Arc<TlsContext>,
    lines: LineConnection<TlsStream<TcpStream>>,
}

impl SslTransport {
    pub fn new(host: String, port: u16, queue_size: usize, context: Arc<TlsContext>) -> Self {
        Self {
            host,
            port,
            queue_size,
            context,
            lines: LineConnection::new(TransportKind::Ssl),
        }
    }
}

#[async_trait]
impl Transport for SslTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Ssl
    }

    async fn open(&mut self) -> Result<ClientIdentifier> {
        let config = self.context.client_config().await?;
        let server_name = ServerName::try_from(self.host.as_str())
            .map(|name| name.to_owned())
            .with_connection_context(&format!("Invalid TLS server name '{}'", self.host))?;

        let stream = connect_tcp(&self.host, self.port).await?;
        let tls_stream = TlsConnector::from(config)
            .connect(server_name, stream)
            .await
            .with_connection_context(&format!(
                "TLS handshake with {}:{} failed",
                self.host, self.port
            ))?;

        let peer = format!("ssl://{}:{}", self.host, self.port);
        self.lines.open(tls_stream, self.queue_size, peer).await
    }

    async fn subscribe(&mut self, topic: &str) -> Result<()> {
        self.lines.subscribe(topic).await
    }

    async fn unsubscribe(&mut self, topic: &str) -> Result<()> {
        self.lines.unsubscribe(topic).await
    }

    async fn send(&mut self, topic: &str, data: &str) -> Result<()> {
        self.lines.send(topic, data).await
    }

    async fn recv(&mut self) -> Result<Option<TopicMessage>> {
        self.lines.recv().await
    }

    async fn close(&mut self) -> Result<()> {
        self.lines.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_context_built_once_under_concurrent_first_use() {
        let context = Arc::new(TlsContext::new(None));
        assert!(!context.is_initialized());

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let context = Arc::clone(&context);
            tasks.push(tokio::spawn(async move { context.client_config().await }));
        }

        let mut configs = Vec::new();
        for task in tasks {
            configs.push(task.await.unwrap().unwrap());
        }

        assert!(context.is_initialized());
        assert!(configs.iter().all(|c| Arc::ptr_eq(c, &configs[0])));
    }

    #[tokio::test]
    async fn test_missing_ca_file_is_configuration_error() {
        let context = TlsContext::new(Some(PathBuf::from("/no/such/ca.pem")));
        let result = context.client_config().await;
        assert!(matches!(result, Err(SwarmError::Configuration(_))));
        assert!(!context.is_initialized());
    }

    #[tokio::test]
    async fn test_open_without_server_is_connection_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut transport = SslTransport::new(
            "localhost".to_string(),
            port,
            4,
            Arc::new(TlsContext::new(None)),
        );
        assert!(matches!(
            transport.open().await,
            Err(SwarmError::Connection(_))
        ));
        assert!(transport.recv().await.is_err());
    }
}
