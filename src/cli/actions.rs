use anyhow::Result;

use super::ui;
use crate::core::ledger::TransactionReceipt;
use crate::core::units::{amount_to_display, format_amount, format_start_date};
use crate::engine::Engine;
use crate::submit::NewAgreement;

fn print_receipt(action: &str, receipt: &TransactionReceipt) {
    let block = receipt
        .block_number
        .map_or_else(|| "pending".to_string(), |b| b.to_string());
    println!(
        "{} {} (block {})",
        ui::style_text(action, ui::StyleType::TotalLabel),
        receipt.transaction_hash,
        block
    );
}

pub async fn create(engine: &Engine, terms: NewAgreement) -> Result<()> {
    let pb = ui::new_spinner("Submitting agreement...");
    let result = engine.submit(&terms).await;
    pb.finish_and_clear();
    let agreement = result?;

    println!(
        "{} {}",
        ui::style_text("Created agreement", ui::StyleType::TotalLabel),
        ui::style_text(&agreement.agreement_id, ui::StyleType::TotalValue)
    );
    println!(
        "  {} tokens per year to {}, active since {}",
        format_amount(amount_to_display(agreement.annual_amount), 2),
        agreement.receiver,
        format_start_date(agreement.start_date)
    );
    engine.shutdown().await;
    Ok(())
}

pub async fn supply(engine: &Engine, agreement_id: &str, amount: u128) -> Result<()> {
    let pb = ui::new_spinner("Supplying funds...");
    let result = engine.supply(agreement_id, amount).await;
    pb.finish_and_clear();
    print_receipt("Supplied", &result?);
    Ok(())
}

pub async fn withdraw(engine: &Engine, agreement_id: &str) -> Result<()> {
    let pb = ui::new_spinner("Withdrawing funds...");
    let result = engine.withdraw(agreement_id).await;
    pb.finish_and_clear();
    print_receipt("Withdrew", &result?);
    Ok(())
}
