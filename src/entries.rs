//! Entry generators: pure functions mapping a typed posting request to a
//! candidate set of debit/credit lines. Generators resolve account codes
//! through the chart configuration but never write to the ledger.

use rust_decimal::Decimal;
use serde_json::json;
use thiserror::Error;

use crate::chart::ChartConfig;
use crate::models::requests::{
    BatchOperation, CardBatchPostingRequest, EzwichPostingRequest, EzwichTransactionType,
    MomoPostingRequest, MomoTransactionType, PowerPostingRequest,
};
use crate::models::EntryDraft;

#[derive(Debug, Error, PartialEq)]
pub enum GeneratorError {
    #[error("unknown {domain} provider: {provider}")]
    UnknownProvider {
        domain: &'static str,
        provider: String,
    },

    #[error("amount must be positive, got {0}")]
    InvalidAmount(Decimal),

    #[error("fee must be non-negative, got {0}")]
    NegativeFee(Decimal),

    #[error("quantity must be non-negative, got {0}")]
    InvalidQuantity(i64),

    #[error("{operation} operation requires {field}")]
    MissingField {
        operation: &'static str,
        field: &'static str,
    },
}

/// Mobile-money cash-in / cash-out.
///
/// Cash-in moves the amount from the till into the provider float (we now
/// hold more e-float, less cash); cash-out is the mirror image. A non-zero
/// fee moves from the till into the provider's fee-revenue account.
pub fn momo_entries(
    chart: &ChartConfig,
    req: &MomoPostingRequest,
) -> Result<Vec<EntryDraft>, GeneratorError> {
    check_amount_and_fee(req.amount, req.fee)?;
    let accounts = chart
        .resolve_momo(&req.provider)
        .ok_or_else(|| GeneratorError::UnknownProvider {
            domain: "momo",
            provider: req.provider.clone(),
        })?;
    let till = chart.cash_till_account.as_str();

    let desc = format!(
        "MoMo {} - {} - {}",
        req.transaction_type.as_str(),
        req.provider,
        req.customer_name
    );
    let meta = json!({
        "provider": req.provider,
        "phoneNumber": req.phone_number,
        "branchId": req.branch_id,
    });

    let mut entries = match req.transaction_type {
        MomoTransactionType::CashIn => vec![
            EntryDraft::debit(&accounts.float_account, req.amount, &desc).with_metadata(meta.clone()),
            EntryDraft::credit(till, req.amount, &desc).with_metadata(meta.clone()),
        ],
        MomoTransactionType::CashOut => vec![
            EntryDraft::debit(till, req.amount, &desc).with_metadata(meta.clone()),
            EntryDraft::credit(&accounts.float_account, req.amount, &desc).with_metadata(meta.clone()),
        ],
    };

    if req.fee > Decimal::ZERO {
        let fee_desc = format!("MoMo fee - {} - {}", req.provider, req.customer_name);
        entries.push(EntryDraft::debit(till, req.fee, &fee_desc).with_metadata(meta.clone()));
        entries.push(EntryDraft::credit(&accounts.fee_account, req.fee, &fee_desc).with_metadata(meta));
    }

    Ok(entries)
}

/// Power (prepaid electricity) sale: the customer pays amount + fee in cash,
/// the amount is drawn down from the provider float, the fee is revenue.
pub fn power_entries(
    chart: &ChartConfig,
    req: &PowerPostingRequest,
) -> Result<Vec<EntryDraft>, GeneratorError> {
    check_amount_and_fee(req.amount, req.fee)?;
    let accounts = chart
        .resolve_power(&req.provider)
        .ok_or_else(|| GeneratorError::UnknownProvider {
            domain: "power",
            provider: req.provider.clone(),
        })?;
    let till = chart.cash_till_account.as_str();

    let desc = format!(
        "Power sale - {} - meter {}",
        req.provider, req.meter_number
    );
    let meta = json!({
        "provider": req.provider,
        "meterNumber": req.meter_number,
        "branchId": req.branch_id,
    });

    let mut entries = vec![
        EntryDraft::debit(till, req.amount + req.fee, &desc).with_metadata(meta.clone()),
        EntryDraft::credit(&accounts.float_account, req.amount, &desc).with_metadata(meta.clone()),
    ];
    if req.fee > Decimal::ZERO {
        let fee_desc = format!("Power fee - {} - meter {}", req.provider, req.meter_number);
        entries.push(EntryDraft::credit(&accounts.fee_account, req.fee, &fee_desc).with_metadata(meta));
    }

    Ok(entries)
}

/// E-Zwich withdrawal or card issuance.
pub fn ezwich_entries(
    chart: &ChartConfig,
    req: &EzwichPostingRequest,
) -> Result<Vec<EntryDraft>, GeneratorError> {
    check_amount_and_fee(req.amount, req.fee)?;
    let till = chart.cash_till_account.as_str();
    let accounts = &chart.ezwich;

    let meta = json!({
        "cardNumber": req.card_number,
        "branchId": req.branch_id,
    });

    match req.transaction_type {
        EzwichTransactionType::Withdrawal => {
            let desc = format!("E-Zwich withdrawal - {}", req.customer_name);
            let mut entries = vec![
                EntryDraft::debit(&accounts.float_account, req.amount, &desc).with_metadata(meta.clone()),
                EntryDraft::credit(till, req.amount, &desc).with_metadata(meta.clone()),
            ];
            if req.fee > Decimal::ZERO {
                let fee_desc = format!("E-Zwich withdrawal fee - {}", req.customer_name);
                entries.push(EntryDraft::debit(till, req.fee, &fee_desc).with_metadata(meta.clone()));
                entries.push(
                    EntryDraft::credit(&accounts.fee_account, req.fee, &fee_desc).with_metadata(meta),
                );
            }
            Ok(entries)
        }
        EzwichTransactionType::CardIssuance => {
            // The amount is the fee charged for the card.
            let desc = format!("E-Zwich card issuance - {}", req.customer_name);
            Ok(vec![
                EntryDraft::debit(till, req.amount, &desc).with_metadata(meta.clone()),
                EntryDraft::credit(&accounts.card_issuance_fee_account, req.amount, &desc)
                    .with_metadata(meta),
            ])
        }
    }
}

/// Card-batch inventory movements. An update with no quantity change (or a
/// zero-value batch) yields an empty set, which callers treat as a skip.
pub fn card_batch_entries(
    chart: &ChartConfig,
    req: &CardBatchPostingRequest,
) -> Result<Vec<EntryDraft>, GeneratorError> {
    if req.quantity_received < 0 {
        return Err(GeneratorError::InvalidQuantity(req.quantity_received));
    }
    if req.unit_cost < Decimal::ZERO {
        return Err(GeneratorError::InvalidAmount(req.unit_cost));
    }
    let accounts = &chart.card_batch;
    let meta = json!({
        "batchId": req.batch_id,
        "batchCode": req.batch_code,
        "branchId": req.branch_id,
    });

    match req.operation {
        BatchOperation::Create => {
            let value = Decimal::from(req.quantity_received) * req.unit_cost;
            if value.is_zero() {
                return Ok(Vec::new());
            }
            let desc = format!(
                "Card batch received - {} ({} cards)",
                req.batch_code, req.quantity_received
            );
            Ok(vec![
                EntryDraft::debit(&accounts.inventory_account, value, &desc).with_metadata(meta.clone()),
                EntryDraft::credit(&accounts.payable_account, value, &desc).with_metadata(meta),
            ])
        }
        BatchOperation::Update => {
            let old = req.old_quantity.ok_or(GeneratorError::MissingField {
                operation: "update",
                field: "oldQuantity",
            })?;
            if old < 0 {
                return Err(GeneratorError::InvalidQuantity(old));
            }
            let diff = req.quantity_received - old;
            let value = Decimal::from(diff.abs()) * req.unit_cost;
            if value.is_zero() {
                return Ok(Vec::new());
            }
            let desc = format!(
                "Card batch adjusted - {} ({} -> {} cards)",
                req.batch_code, old, req.quantity_received
            );
            if diff > 0 {
                Ok(vec![
                    EntryDraft::debit(&accounts.inventory_account, value, &desc)
                        .with_metadata(meta.clone()),
                    EntryDraft::credit(&accounts.adjustment_account, value, &desc).with_metadata(meta),
                ])
            } else {
                Ok(vec![
                    EntryDraft::debit(&accounts.adjustment_account, value, &desc)
                        .with_metadata(meta.clone()),
                    EntryDraft::credit(&accounts.inventory_account, value, &desc).with_metadata(meta),
                ])
            }
        }
        BatchOperation::Delete => {
            // Reverses the original create for the full received quantity.
            let value = Decimal::from(req.quantity_received) * req.unit_cost;
            if value.is_zero() {
                return Ok(Vec::new());
            }
            let desc = format!(
                "Card batch removed - {} ({} cards)",
                req.batch_code, req.quantity_received
            );
            Ok(vec![
                EntryDraft::debit(&accounts.payable_account, value, &desc).with_metadata(meta.clone()),
                EntryDraft::credit(&accounts.inventory_account, value, &desc).with_metadata(meta),
            ])
        }
    }
}

fn check_amount_and_fee(amount: Decimal, fee: Decimal) -> Result<(), GeneratorError> {
    if amount <= Decimal::ZERO {
        return Err(GeneratorError::InvalidAmount(amount));
    }
    if fee < Decimal::ZERO {
        return Err(GeneratorError::NegativeFee(fee));
    }
    Ok(())
}
