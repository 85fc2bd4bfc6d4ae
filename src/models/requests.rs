//! The five posting request shapes handed to the engine by the business
//! transaction layer. Branch and user identifiers are passed through as
//! opaque audit metadata only.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MomoTransactionType {
    #[serde(rename = "cash-in")]
    CashIn,
    #[serde(rename = "cash-out")]
    CashOut,
}

impl MomoTransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MomoTransactionType::CashIn => "cash-in",
            MomoTransactionType::CashOut => "cash-out",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MomoPostingRequest {
    pub transaction_id: String,
    #[serde(rename = "type")]
    pub transaction_type: MomoTransactionType,
    pub amount: Decimal,
    pub fee: Decimal,
    pub provider: String,
    pub phone_number: String,
    pub customer_name: String,
    #[serde(default)]
    pub reference: Option<String>,
    pub processed_by: String,
    pub branch_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PowerPostingRequest {
    pub transaction_id: String,
    pub meter_number: String,
    pub provider: String,
    pub amount: Decimal,
    pub fee: Decimal,
    pub customer_name: String,
    #[serde(default)]
    pub reference: Option<String>,
    pub processed_by: String,
    pub branch_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EzwichTransactionType {
    Withdrawal,
    CardIssuance,
}

impl EzwichTransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EzwichTransactionType::Withdrawal => "withdrawal",
            EzwichTransactionType::CardIssuance => "card_issuance",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EzwichPostingRequest {
    pub transaction_id: String,
    #[serde(rename = "type")]
    pub transaction_type: EzwichTransactionType,
    pub amount: Decimal,
    pub fee: Decimal,
    pub card_number: String,
    pub customer_name: String,
    #[serde(default)]
    pub reference: Option<String>,
    pub processed_by: String,
    pub branch_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchOperation {
    Create,
    Update,
    Delete,
}

impl BatchOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchOperation::Create => "create",
            BatchOperation::Update => "update",
            BatchOperation::Delete => "delete",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardBatchPostingRequest {
    pub operation: BatchOperation,
    pub batch_id: String,
    pub batch_code: String,
    pub quantity_received: i64,
    #[serde(default)]
    pub old_quantity: Option<i64>,
    pub unit_cost: Decimal,
    pub user_id: String,
    pub branch_id: String,
}
