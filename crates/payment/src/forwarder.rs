//! Forwarding request encoding and verification
//!
//! Payers sign an EIP-712 `ForwardRequest` on the `MinimalForwarder` domain
//! whose `data` is a `pay(token, receiver, amount, feeBps)` call on the payment
//! gateway contract. The gateway re-checks that request before relaying it.

use crate::calculator::{basis_points_of, FeeCalculator};
use alloy::primitives::{keccak256, Address, Bytes, PrimitiveSignature as Signature, U256};
use alloy::sol;
use alloy::sol_types::{Eip712Domain, SolCall, SolStruct};
use std::borrow::Cow;
use tracing::warn;
use types::{FeeError, ForwardRequestBody, PaylisError, Result, SubmitMeta, SubmitRequest};

sol! {
    #[derive(Debug, PartialEq, Eq)]
    struct ForwardRequest {
        address from;
        address to;
        uint256 value;
        uint256 gas;
        uint256 nonce;
        bytes data;
    }

    #[derive(Debug, PartialEq, Eq)]
    interface IMinimalForwarder {
        function execute(ForwardRequest calldata req, bytes calldata signature)
            external
            payable
            returns (bool, bytes memory);
    }

    #[derive(Debug, PartialEq, Eq)]
    interface IPaymentGateway {
        function pay(address token, address receiver, uint256 amount, uint256 feeBps) external;
    }
}

/// EIP-712 domain of a forwarder deployment
pub fn forwarder_domain(
    name: &str,
    version: &str,
    chain_id: u64,
    verifying_contract: Address,
) -> Eip712Domain {
    Eip712Domain::new(
        Some(Cow::Owned(name.to_string())),
        Some(Cow::Owned(version.to_string())),
        Some(U256::from(chain_id)),
        Some(verifying_contract),
        None,
    )
}

impl From<&ForwardRequestBody> for ForwardRequest {
    fn from(body: &ForwardRequestBody) -> Self {
        Self {
            from: body.from,
            to: body.to,
            value: body.value,
            gas: body.gas,
            nonce: body.nonce,
            data: body.data.clone(),
        }
    }
}

/// Require the signature to recover to `request.from`
pub fn verify_signature(
    request: &ForwardRequest,
    signature: &[u8],
    domain: &Eip712Domain,
) -> Result<()> {
    let signature = Signature::from_raw(signature)
        .map_err(|e| PaylisError::Validation(format!("Malformed signature: {}", e)))?;

    let hash = request.eip712_signing_hash(domain);
    let signer = signature
        .recover_address_from_prehash(&hash)
        .map_err(|e| PaylisError::Validation(format!("Unrecoverable signature: {}", e)))?;

    if signer != request.from {
        return Err(PaylisError::Validation(format!(
            "Signature signer {} does not match request sender {}",
            signer, request.from
        )));
    }

    Ok(())
}

/// Decode the inner `pay(...)` call of a forwarding request
pub fn decode_payment_call(data: &[u8]) -> Result<IPaymentGateway::payCall> {
    IPaymentGateway::payCall::abi_decode(data, true)
        .map_err(|e| PaylisError::Validation(format!("Request data is not a payment call: {}", e)))
}

/// Calldata for `execute(req, signature)` on the forwarder
pub fn encode_execute_call(request: ForwardRequest, signature: Bytes) -> Bytes {
    IMinimalForwarder::executeCall {
        req: request,
        signature,
    }
    .abi_encode()
    .into()
}

/// Deduplication key of a signed payload, `0x`-prefixed keccak256 of the calldata
pub fn idempotency_key(calldata: &[u8]) -> String {
    keccak256(calldata).to_string()
}

/// Cross-check the signed payment against the submitted bookkeeping data
pub fn verify_payment_matches(call: &IPaymentGateway::payCall, meta: &SubmitMeta) -> Result<()> {
    if call.token != meta.token {
        return Err(PaylisError::Validation(format!(
            "Signed token {} does not match {}",
            call.token, meta.token
        )));
    }

    if call.receiver != meta.receiver {
        return Err(PaylisError::Validation(format!(
            "Signed receiver {} does not match {}",
            call.receiver, meta.receiver
        )));
    }

    if call.amount != meta.amount {
        return Err(PaylisError::Validation(format!(
            "Signed amount {} does not match {}",
            call.amount, meta.amount
        )));
    }

    Ok(())
}

/// Require the signed `feeBps` to be the basis point figure of `expected_fee`.
///
/// `submitted_fee` is the payer's own fee figure; a disagreement is logged
/// but the signed basis points decide.
pub fn verify_fee(
    call: &IPaymentGateway::payCall,
    expected_fee: U256,
    submitted_fee: Option<U256>,
) -> Result<()> {
    let expected_bps = basis_points_of(expected_fee, call.amount)?;
    if call.feeBps != U256::from(expected_bps) {
        return Err(FeeError::FeeMismatch {
            signed: call.feeBps.to_string(),
            expected: expected_bps.to_string(),
        }
        .into());
    }

    if let Some(fee) = submitted_fee {
        if fee != expected_fee {
            warn!(
                submitted = %fee,
                expected = %expected_fee,
                amount = %call.amount,
                "Submitted fee differs from quote, signed basis points are authoritative"
            );
        }
    }

    Ok(())
}

/// A verified submission ready for the relayer
#[derive(Debug, Clone)]
pub struct PreparedSubmission {
    /// `execute(req, signature)` calldata
    pub calldata: Bytes,
    pub idempotency_key: String,
    pub payment: IPaymentGateway::payCall,
}

/// Verifies submissions against one forwarder deployment
#[derive(Debug, Clone)]
pub struct ForwarderVerifier {
    domain: Eip712Domain,
    payment_gateway: Address,
}

impl ForwarderVerifier {
    pub fn new(domain: Eip712Domain, payment_gateway: Address) -> Self {
        Self {
            domain,
            payment_gateway,
        }
    }

    pub fn domain(&self) -> &Eip712Domain {
        &self.domain
    }

    /// Verify a submission priced by the live fee schedule
    pub fn prepare(
        &self,
        submission: &SubmitRequest,
        calculator: &FeeCalculator,
    ) -> Result<PreparedSubmission> {
        let prepared = self.verify_request(submission)?;
        let quote = calculator.compute_fee(prepared.payment.amount, &prepared.payment.token)?;
        verify_fee(&prepared.payment, quote.total_fee, submission.meta.fee)?;
        Ok(prepared)
    }

    /// Check sender, target, signature and bookkeeping data, and produce the
    /// forwarder calldata. The fee is left to the caller.
    pub fn verify_request(&self, submission: &SubmitRequest) -> Result<PreparedSubmission> {
        let request = ForwardRequest::from(&submission.request);

        if request.from != submission.meta.from {
            return Err(PaylisError::Validation(format!(
                "Request sender {} does not match {}",
                request.from, submission.meta.from
            )));
        }

        if request.to != self.payment_gateway {
            return Err(PaylisError::Validation(format!(
                "Request target {} is not the payment gateway",
                request.to
            )));
        }

        verify_signature(&request, &submission.signature, &self.domain)?;

        let payment = decode_payment_call(&request.data)?;
        verify_payment_matches(&payment, &submission.meta)?;

        let calldata = encode_execute_call(request, submission.signature.clone());
        let idempotency_key = idempotency_key(&calldata);

        Ok(PreparedSubmission {
            calldata,
            idempotency_key,
            payment,
        })
    }
}
