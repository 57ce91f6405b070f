//! Predefined functions served by the gateway instead of plain forwarding
use alloy::primitives::{Address, Bytes, U128, U256, U64};
use serde::Deserialize;
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

use crate::contract::{self, TxRequest};
use crate::crypto::ec_recover_hex;
use crate::gateway::GatewayError;
use crate::jsonrpc::{RpcRequest, RpcResponse};
use crate::nonce_manager::SigningCoordinator;
use crate::rpc_manager::RpcClient;

/// Units accepted by `eth_getBalance`, with their decimal exponent
const BALANCE_UNITS: &[(&str, u8)] = &[
    ("wei", 0),
    ("kwei", 3),
    ("mwei", 6),
    ("gwei", 9),
    ("szabo", 12),
    ("finney", 15),
    ("ether", 18),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Predefined {
    /// `eth_getBalance` with an optional unit as third param
    GetBalance,
    /// `eth_sendTransaction` signed by the gateway key
    SendTransaction,
    /// `personal_ecRecover`
    EcRecover,
    /// `gateway_signerAddress`
    SignerAddress,
}

impl Predefined {
    pub const ALL: [Predefined; 4] = [
        Predefined::GetBalance,
        Predefined::SendTransaction,
        Predefined::EcRecover,
        Predefined::SignerAddress,
    ];

    pub fn lookup(method: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|entry| entry.method() == method)
    }

    pub fn method(&self) -> &'static str {
        match self {
            Predefined::GetBalance => "eth_getBalance",
            Predefined::SendTransaction => "eth_sendTransaction",
            Predefined::EcRecover => "personal_ecRecover",
            Predefined::SignerAddress => "gateway_signerAddress",
        }
    }
}

/// Transaction object of `eth_sendTransaction`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendTransactionParams {
    from: Option<Address>,
    to: Option<Address>,
    data: Option<Bytes>,
    input: Option<Bytes>,
    value: Option<U256>,
    gas: Option<U64>,
    gas_price: Option<U128>,
}

pub struct PredefinedTable {
    client: Arc<RpcClient>,
    coordinator: Arc<SigningCoordinator>,
    default_gas_limit: u64,
}

impl PredefinedTable {
    pub fn new(client: Arc<RpcClient>, coordinator: Arc<SigningCoordinator>, default_gas_limit: u64) -> Self {
        Self {
            client,
            coordinator,
            default_gas_limit,
        }
    }

    pub async fn dispatch(&self, entry: Predefined, request: RpcRequest) -> Result<RpcResponse, GatewayError> {
        debug!(method = entry.method(), "Dispatching predefined function");
        match entry {
            Predefined::GetBalance => self.get_balance(request).await,
            Predefined::SendTransaction => self.send_transaction(request).await,
            Predefined::EcRecover => ec_recover(request),
            Predefined::SignerAddress => {
                let address = self.coordinator.address().await?;
                Ok(RpcResponse::success(request.id, json!(address)))
            }
        }
    }

    async fn get_balance(&self, mut request: RpcRequest) -> Result<RpcResponse, GatewayError> {
        let decimals = if request.params.len() > 2 {
            let unit = request.params.remove(2);
            match unit {
                Value::String(name) if name.is_empty() => None,
                Value::String(name) => Some(unit_decimals(&name).ok_or_else(|| {
                    GatewayError::InvalidParams(format!("unknown unit: {}", name))
                })?),
                other => {
                    return Err(GatewayError::InvalidParams(format!(
                        "unit must be a string, got {}",
                        other
                    )))
                }
            }
        } else {
            None
        };

        let mut response = self.client.generic_rpc(&request).await?;

        if let (Some(decimals), false) = (decimals, response.is_error()) {
            let converted = response
                .result
                .as_ref()
                .and_then(Value::as_str)
                .and_then(|hex| format_balance(hex, decimals));
            if let Some(converted) = converted {
                response.result = Some(Value::String(converted));
            }
        }
        Ok(response)
    }

    async fn send_transaction(&self, request: RpcRequest) -> Result<RpcResponse, GatewayError> {
        let object = request
            .params
            .first()
            .cloned()
            .ok_or_else(|| GatewayError::InvalidParams("missing transaction object".to_string()))?;
        let params: SendTransactionParams = serde_json::from_value(object)
            .map_err(|e| GatewayError::InvalidParams(format!("transaction object: {}", e)))?;

        let signer = self.coordinator.address().await?;
        if let Some(from) = params.from.filter(|from| *from != signer) {
            return Err(GatewayError::InvalidParams(format!(
                "from {} does not match gateway signer {}",
                from, signer
            )));
        }

        let tx = TxRequest {
            to: params.to,
            data: params.data.or(params.input).unwrap_or_default(),
            value: params.value.unwrap_or_default(),
            gas_limit: params.gas.map(|g| g.to::<u64>()),
            gas_price: params.gas_price.map(|p| p.to::<u128>()),
        };

        let mut response = contract::send_transaction_with_sign(
            Arc::clone(&self.client),
            &self.coordinator,
            tx,
            self.default_gas_limit,
        )
        .await?;
        response.id = request.id;
        Ok(response)
    }
}

fn ec_recover(request: RpcRequest) -> Result<RpcResponse, GatewayError> {
    let (data, signature) = match request.params.as_slice() {
        [Value::String(data), Value::String(signature), ..] => (data, signature),
        _ => {
            return Err(GatewayError::InvalidParams(
                "expected [data, signature] hex strings".to_string(),
            ))
        }
    };

    let address = ec_recover_hex(data, signature).map_err(|e| GatewayError::InvalidParams(e.to_string()))?;
    Ok(RpcResponse::success(request.id, json!(address)))
}

fn unit_decimals(name: &str) -> Option<u8> {
    BALANCE_UNITS
        .iter()
        .find(|(unit, _)| unit.eq_ignore_ascii_case(name))
        .map(|(_, decimals)| *decimals)
}

/// Convert a hex wei quantity into a decimal string in the given unit,
/// trailing fractional zeros trimmed
pub fn format_balance(hex_wei: &str, decimals: u8) -> Option<String> {
    if !hex_wei.starts_with("0x") && !hex_wei.starts_with("0X") {
        return None;
    }
    let wei = U256::from_str(hex_wei).ok()?;
    if decimals == 0 {
        return Some(wei.to_string());
    }

    let base = U256::from(10u64).pow(U256::from(decimals));
    let whole = wei / base;
    let fraction = wei % base;
    if fraction.is_zero() {
        return Some(whole.to_string());
    }

    let fraction = format!("{:0>width$}", fraction.to_string(), width = decimals as usize);
    Some(format!("{}.{}", whole, fraction.trim_end_matches('0')))
}
