//! gRPC transport to the onboarding manager
//!
//! The two services are called through `tonic::client::Grpc` with a prost codec
//! and fixed method paths. All connections are TLS with the platform CA.

use crate::error::OnboardingError;
use crate::proto::{
    CREATE_NODES_PATH, CreateNodesRequest, CreateNodesResponse, ONBOARD_NODE_STREAM_PATH,
    OnboardNodeStreamRequest, OnboardNodeStreamResponse,
};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::client::Grpc;
use tonic::codec::{ProstCodec, Streaming};
use tonic::codegen::http::uri::PathAndQuery;
use tonic::metadata::MetadataValue;
use tonic::transport::{Certificate, Channel, ClientTlsConfig};
use tracing::debug;

/// Outbound requests buffered on the registration stream
const STREAM_BUFFER: usize = 4;

/// Open a TLS channel to `host:port` trusting only `ca_pem`
pub async fn connect(host: &str, port: u16, ca_pem: &[u8]) -> Result<Channel, OnboardingError> {
    let tls = ClientTlsConfig::new()
        .ca_certificate(Certificate::from_pem(ca_pem))
        .domain_name(host);
    let uri = format!("https://{host}:{port}");
    debug!("Connecting to {}", uri);
    let channel = Channel::from_shared(uri)
        .map_err(|e| OnboardingError::InvalidConfig(format!("invalid onboarding endpoint {host}:{port}: {e}")))?
        .tls_config(tls)?
        .connect()
        .await?;
    Ok(channel)
}

async fn ready(grpc: &mut Grpc<Channel>) -> Result<(), OnboardingError> {
    grpc.ready()
        .await
        .map_err(|e| OnboardingError::Status(tonic::Status::unknown(format!("Service was not ready: {e}"))))
}

/// One side of the registration stream, as seen by the device
#[async_trait::async_trait]
pub trait RegistrationStream: Send {
    async fn send(&mut self, request: OnboardNodeStreamRequest) -> Result<(), OnboardingError>;

    /// Next response, or `None` once the server closed the stream
    async fn recv(&mut self) -> Result<Option<OnboardNodeStreamResponse>, OnboardingError>;
}

/// `OnboardNodeStream` over a live channel
///
/// The call itself is opened on the first `recv`, after the first request has
/// been queued, so the server has something to answer when headers are awaited.
#[derive(Debug)]
pub struct GrpcRegistrationStream {
    tx: mpsc::Sender<OnboardNodeStreamRequest>,
    pending: Option<(Grpc<Channel>, ReceiverStream<OnboardNodeStreamRequest>)>,
    inbound: Option<Streaming<OnboardNodeStreamResponse>>,
}

impl GrpcRegistrationStream {
    pub fn new(channel: Channel) -> Self {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        Self {
            tx,
            pending: Some((Grpc::new(channel), ReceiverStream::new(rx))),
            inbound: None,
        }
    }

    async fn inbound(&mut self) -> Result<&mut Streaming<OnboardNodeStreamResponse>, OnboardingError> {
        if let Some((mut grpc, outbound)) = self.pending.take() {
            ready(&mut grpc).await?;
            let codec: ProstCodec<OnboardNodeStreamRequest, OnboardNodeStreamResponse> = ProstCodec::default();
            let response = grpc
                .streaming(
                    tonic::Request::new(outbound),
                    PathAndQuery::from_static(ONBOARD_NODE_STREAM_PATH),
                    codec,
                )
                .await?;
            self.inbound = Some(response.into_inner());
        }
        self.inbound
            .as_mut()
            .ok_or_else(|| OnboardingError::protocol("registration stream is not open"))
    }
}

#[async_trait::async_trait]
impl RegistrationStream for GrpcRegistrationStream {
    async fn send(&mut self, request: OnboardNodeStreamRequest) -> Result<(), OnboardingError> {
        self.tx
            .send(request)
            .await
            .map_err(|_closed| OnboardingError::protocol("registration stream closed"))
    }

    async fn recv(&mut self) -> Result<Option<OnboardNodeStreamResponse>, OnboardingError> {
        Ok(self.inbound().await?.message().await?)
    }
}

/// Registers a device through the interactive service
#[async_trait::async_trait]
pub trait NodeRegistrar: Send + Sync {
    async fn create_nodes(&self, request: CreateNodesRequest) -> Result<CreateNodesResponse, OnboardingError>;
}

/// `CreateNodes` authenticated with a bearer token
#[derive(Debug, Clone)]
pub struct GrpcNodeRegistrar {
    host: String,
    port: u16,
    ca_pem: Vec<u8>,
    token: String,
}

impl GrpcNodeRegistrar {
    pub fn new(host: String, port: u16, ca_pem: Vec<u8>, token: String) -> Self {
        Self {
            host,
            port,
            ca_pem,
            token,
        }
    }
}

#[async_trait::async_trait]
impl NodeRegistrar for GrpcNodeRegistrar {
    async fn create_nodes(&self, request: CreateNodesRequest) -> Result<CreateNodesResponse, OnboardingError> {
        let channel = connect(&self.host, self.port, &self.ca_pem).await?;
        let mut grpc = Grpc::new(channel);
        ready(&mut grpc).await?;

        let mut request = tonic::Request::new(request);
        let bearer = MetadataValue::try_from(format!("Bearer {}", self.token))
            .map_err(|e| OnboardingError::Auth(format!("access token is not a valid header value: {e}")))?;
        request.metadata_mut().insert("authorization", bearer);

        let codec: ProstCodec<CreateNodesRequest, CreateNodesResponse> = ProstCodec::default();
        let response = grpc
            .unary(request, PathAndQuery::from_static(CREATE_NODES_PATH), codec)
            .await?;
        Ok(response.into_inner())
    }
}
