use async_trait::async_trait;
use tonic::transport::{Certificate, Channel, ClientTlsConfig};

use crate::error::SwapError;
use crate::proto::lnnode::v1 as pb;
use crate::proto::lnnode::v1::lightning_node_client::LightningNodeClient;

/// `preimage` is set exactly when the payment settled.
#[derive(Debug, Clone)]
pub struct PayOutcome {
    pub preimage: Option<[u8; 32]>,
    pub payment_error: String,
}

#[async_trait]
pub trait LightningClient: Send + Sync {
    async fn pay(&self, payment_request: &str) -> Result<PayOutcome, SwapError>;
}

#[derive(Debug, Clone)]
pub struct GrpcLightningNode {
    client: LightningNodeClient<Channel>,
}

impl GrpcLightningNode {
    /// Literal `\n` sequences in `ca_pem` are unescaped so the certificate
    /// can come from a single-line environment variable.
    pub async fn connect(endpoint: String, ca_pem: Option<String>) -> Result<Self, SwapError> {
        let mut endpoint = Channel::from_shared(endpoint.clone())
            .map_err(|e| SwapError::LightningUnavailable(format!("invalid endpoint {endpoint}: {e}")))?;

        if let Some(pem) = ca_pem {
            let pem = pem.replace("\\n", "\n");
            let tls = ClientTlsConfig::new().ca_certificate(Certificate::from_pem(pem));
            endpoint = endpoint
                .tls_config(tls)
                .map_err(|e| SwapError::LightningUnavailable(format!("configure tls: {e}")))?;
        }

        let channel = endpoint
            .connect()
            .await
            .map_err(|e| SwapError::LightningUnavailable(format!("connect lightning node: {e}")))?;

        Ok(Self {
            client: LightningNodeClient::new(channel),
        })
    }
}

#[async_trait]
impl LightningClient for GrpcLightningNode {
    async fn pay(&self, payment_request: &str) -> Result<PayOutcome, SwapError> {
        let mut client = self.client.clone();
        let resp = client
            .pay_invoice(pb::PayInvoiceRequest {
                payment_request: payment_request.to_string(),
            })
            .await
            .map_err(|e| SwapError::LightningUnavailable(format!("pay invoice: {e}")))?
            .into_inner();

        let preimage = if resp.preimage.is_empty() {
            None
        } else {
            let bytes: [u8; 32] = resp.preimage.as_slice().try_into().map_err(|_| {
                SwapError::LightningUnavailable(format!(
                    "node returned a {}-byte preimage",
                    resp.preimage.len()
                ))
            })?;
            Some(bytes)
        };

        Ok(PayOutcome {
            preimage,
            payment_error: resp.payment_error,
        })
    }
}
