use std::str::FromStr as _;

use bitcoin::Address;
use subtle::ConstantTimeEq as _;
use tonic::{Request, Response, Status};

use crate::error::SwapError;
use crate::proto::subswap::v1 as pb;
use crate::swap::PolicyRejection;
use crate::swap::engine::{SwapEngine, SwapPaymentOutcome};

/// Thin gRPC boundary: bearer auth, parameter unpacking, outcome mapping.
pub struct SwapService {
    engine: SwapEngine,
    token: String,
}

impl SwapService {
    pub fn new(engine: SwapEngine, token: String) -> Self {
        Self { engine, token }
    }

    fn authorize<T>(&self, request: &Request<T>) -> Result<(), Status> {
        let presented = request
            .metadata()
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        let Some(presented) = presented else {
            return Err(Status::permission_denied("not authorized"));
        };
        if presented.as_bytes().ct_eq(self.token.as_bytes()).unwrap_u8() != 1 {
            return Err(Status::permission_denied("not authorized"));
        }
        Ok(())
    }
}

fn status_from_swap_error(err: SwapError) -> Status {
    let message = err.to_string();
    match err {
        SwapError::InvalidInput(_) => Status::invalid_argument(message),
        SwapError::Duplicate => Status::already_exists(message),
        SwapError::UnknownSwap => Status::not_found(message),
        SwapError::NoUtxos | SwapError::InsufficientFunds => Status::failed_precondition(message),
        SwapError::ChainUnavailable(_)
        | SwapError::StoreUnavailable(_)
        | SwapError::LightningUnavailable(_) => Status::unavailable(message),
        SwapError::Internal(_) => Status::internal(message),
    }
}

fn rejection_code(rejection: PolicyRejection) -> pb::get_swap_payment_response::SwapError {
    use pb::get_swap_payment_response::SwapError as Code;
    match rejection {
        PolicyRejection::FundsExceedLimit => Code::FundsExceedLimit,
        PolicyRejection::TxTooSmall => Code::TxTooSmall,
        PolicyRejection::InvoiceAmountMismatch => Code::InvoiceAmountMismatch,
        PolicyRejection::SwapExpired => Code::SwapExpired,
    }
}

#[tonic::async_trait]
impl pb::submarine_swapper_server::SubmarineSwapper for SwapService {
    async fn sub_swap_service_init(
        &self,
        request: Request<pb::SubSwapServiceInitRequest>,
    ) -> Result<Response<pb::SubSwapServiceInitResponse>, Status> {
        self.authorize(&request)?;
        let req = request.into_inner();

        let created = self
            .engine
            .init(&req.pubkey, &req.hash)
            .map_err(status_from_swap_error)?;

        Ok(Response::new(pb::SubSwapServiceInitResponse {
            address: created.address.to_string(),
            pubkey: created.swapper_pubkey.to_vec(),
            lock_height: created.lock_height,
            script: created.script,
        }))
    }

    async fn unspent_amount(
        &self,
        request: Request<pb::UnspentAmountRequest>,
    ) -> Result<Response<pb::UnspentAmountResponse>, Status> {
        self.authorize(&request)?;
        let req = request.into_inner();

        let report = self
            .engine
            .unspent_amount(&req.hash)
            .await
            .map_err(status_from_swap_error)?;

        let utxos = report
            .utxos
            .iter()
            .map(|u| pb::unspent_amount_response::Utxo {
                block_height: u.block_height,
                amount: u.value as i64,
                txid: u.txid.to_string(),
                index: u.vout,
            })
            .collect();

        Ok(Response::new(pb::UnspentAmountResponse {
            amount: report.total_sat as i64,
            lock_height: report.lock_height,
            utxos,
        }))
    }

    async fn get_swap_payment(
        &self,
        request: Request<pb::GetSwapPaymentRequest>,
    ) -> Result<Response<pb::GetSwapPaymentResponse>, Status> {
        self.authorize(&request)?;
        let req = request.into_inner();

        let dest_address = if req.address.trim().is_empty() {
            None
        } else {
            let address = Address::from_str(req.address.trim())
                .map_err(|e| Status::invalid_argument(format!("invalid address: {e}")))?
                .require_network(self.engine.network())
                .map_err(|_| Status::invalid_argument("address network mismatch"))?;
            Some(address)
        };

        let outcome = self
            .engine
            .get_swap_payment(&req.payment_request, dest_address)
            .await
            .map_err(status_from_swap_error)?;

        let resp = match outcome {
            SwapPaymentOutcome::Rejected { rejection, detail } => pb::GetSwapPaymentResponse {
                funds_exceeded_limit: true,
                payment_error: detail,
                swap_error: rejection_code(rejection) as i32,
                txid: String::new(),
            },
            SwapPaymentOutcome::PaymentFailed { payment_error } => pb::GetSwapPaymentResponse {
                funds_exceeded_limit: false,
                payment_error,
                swap_error: pb::get_swap_payment_response::SwapError::NoError as i32,
                txid: String::new(),
            },
            SwapPaymentOutcome::Redeemed {
                txid,
                payment_error,
            } => pb::GetSwapPaymentResponse {
                funds_exceeded_limit: false,
                payment_error,
                swap_error: pb::get_swap_payment_response::SwapError::NoError as i32,
                txid,
            },
        };

        Ok(Response::new(resp))
    }
}
