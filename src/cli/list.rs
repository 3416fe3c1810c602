use anyhow::Result;
use comfy_table::{Cell, CellAlignment};

use super::ui;
use crate::core::agreement::Agreement;
use crate::core::units::{amount_to_display, format_amount, format_start_date};
use crate::engine::Engine;

fn agreement_row(agreement: &Agreement) -> Vec<Cell> {
    let start = if agreement.start_date == 0 {
        ui::na_cell(false)
    } else {
        Cell::new(format_start_date(agreement.start_date))
    };
    vec![
        Cell::new(&agreement.agreement_id),
        Cell::new(&agreement.payor),
        Cell::new(&agreement.receiver),
        ui::amount_cell(amount_to_display(agreement.annual_amount), 2),
        start,
        Cell::new(format!("{:.2}%", agreement.interest_rate * 100.0))
            .set_alignment(CellAlignment::Right),
        Cell::new(&agreement.description),
    ]
}

pub fn render_agreements(agreements: &[Agreement]) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Agreement"),
        ui::header_cell("Payor"),
        ui::header_cell("Receiver"),
        ui::header_cell("Annual"),
        ui::header_cell("Active Since"),
        ui::header_cell("Rate"),
        ui::header_cell("Description"),
    ]);

    for agreement in agreements {
        table.add_row(agreement_row(agreement));
    }

    let mut output = format!(
        "{}\n\n",
        ui::style_text("Agreements", ui::StyleType::Title)
    );
    output.push_str(&table.to_string());

    let total: rust_decimal::Decimal = agreements
        .iter()
        .map(|a| amount_to_display(a.annual_amount))
        .sum();
    output.push_str(&format!(
        "\n\n{} {}",
        ui::style_text(&format!("Total annual ({}):", agreements.len()), ui::StyleType::TotalLabel),
        ui::style_text(&format_amount(total, 2), ui::StyleType::TotalValue)
    ));
    output
}

pub async fn run(engine: &Engine) -> Result<()> {
    let pb = ui::new_spinner("Loading agreements...");
    let agreements = engine.list().await;
    pb.finish_and_clear();

    if agreements.is_empty() {
        println!(
            "{}",
            ui::style_text("No agreements found", ui::StyleType::Subtle)
        );
        return Ok(());
    }
    println!("{}", render_agreements(&agreements));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_agreements() {
        let agreement = Agreement {
            agreement_id: "4".to_string(),
            payor: "0xpayor".to_string(),
            receiver: "0xreceiver".to_string(),
            annual_amount: 1_500 * 10_u128.pow(18),
            start_date: 1_700_000_000,
            interest_rate: 0.04,
            description: "QmDoc".to_string(),
        };

        let row: Vec<String> = agreement_row(&agreement)
            .iter()
            .map(|c| c.content())
            .collect();
        assert_eq!(
            row,
            vec![
                "4",
                "0xpayor",
                "0xreceiver",
                "1,500.00",
                "2023-11-14 22:13:20 UTC",
                "4.00%",
                "QmDoc",
            ]
        );

        let output = console::strip_ansi_codes(&render_agreements(&[agreement])).to_string();
        assert!(output.contains("Total annual (1): 1,500.00"));
    }

    #[test]
    fn test_unresolved_start_date_is_not_shown_as_epoch() {
        let agreement = Agreement {
            agreement_id: "5".to_string(),
            payor: String::new(),
            receiver: String::new(),
            annual_amount: 0,
            start_date: 0,
            interest_rate: 0.0,
            description: String::new(),
        };
        assert_eq!(agreement_row(&agreement)[4].content(), "N/A");
    }
}
