use anyhow::Result;
use chrono::{DateTime, Utc};
use comfy_table::{Cell, CellAlignment, Color};
use futures::future::join_all;
use std::time::Duration;
use tracing::{debug, info};

use super::ui;
use crate::core::config::DisplayConfig;
use crate::core::units::{amount_to_display, format_amount, format_start_date};
use crate::engine::{AgreementView, Engine};

/// Which agreements to watch.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchTarget {
    /// Every agreement found in the ledger history.
    All,
    /// Only these ids, fetched one by one.
    Ids(Vec<String>),
}

fn reconciliation_cell(view: &AgreementView, now: DateTime<Utc>) -> Cell {
    let snapshot = &view.snapshot;
    let age = snapshot
        .last_reconciled_at
        .map(|at| (now - at).num_seconds().max(0));
    let text = match (age, snapshot.consecutive_failures) {
        (None, 0) => "pending".to_string(),
        (None, n) => format!("never ({n} failed)"),
        (Some(secs), 0) => format!("{secs}s ago"),
        (Some(secs), n) => format!("{secs}s ago, stale ({n} failed)"),
    };
    let cell = Cell::new(text).set_alignment(CellAlignment::Right);
    if snapshot.consecutive_failures > 0 {
        cell.fg(Color::Red)
    } else {
        cell
    }
}

fn view_row(view: &AgreementView, display: &DisplayConfig, now: DateTime<Utc>) -> Vec<Cell> {
    let agreement = &view.agreement;
    let snapshot = &view.snapshot;
    vec![
        Cell::new(&agreement.agreement_id),
        Cell::new(&agreement.payor),
        ui::amount_cell(amount_to_display(agreement.annual_amount), 2),
        Cell::new(format_start_date(agreement.start_date)),
        ui::amount_cell(
            amount_to_display(snapshot.principal_accrued),
            display.principal_digits,
        ),
        ui::amount_cell(
            amount_to_display(snapshot.interest_accrued),
            display.interest_digits,
        ),
        ui::format_optional_cell(snapshot.on_chain_owed, |owed| {
            format_amount(amount_to_display(owed), display.principal_digits)
        }),
        ui::format_optional_cell(snapshot.on_chain_interest, |interest| {
            format_amount(amount_to_display(interest), display.interest_digits)
        }),
        reconciliation_cell(view, now),
    ]
}

pub fn render_views(views: &[AgreementView], display: &DisplayConfig, now: DateTime<Utc>) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Agreement"),
        ui::header_cell("Payor"),
        ui::header_cell("Annual"),
        ui::header_cell("Active Since"),
        ui::header_cell("Accrued"),
        ui::header_cell("Compounded"),
        ui::header_cell("On-chain Owed"),
        ui::header_cell("On-chain Interest"),
        ui::header_cell("Reconciled"),
    ]);

    for view in views {
        table.add_row(view_row(view, display, now));
    }

    let mut output = format!(
        "{} {}\n\n",
        ui::style_text("Watching", ui::StyleType::Title),
        ui::style_text(
            &format!("{} agreement(s), press Ctrl-C to stop", views.len()),
            ui::StyleType::Subtle
        )
    );
    output.push_str(&table.to_string());

    if let Some(err) = views.iter().find_map(|v| v.snapshot.last_error.as_deref()) {
        output.push_str(&format!(
            "\n\n{}",
            ui::style_text(&format!("Last ledger error: {err}"), ui::StyleType::Error)
        ));
    }
    output
}

/// Starts the ticks, redraws the table every `refresh` until Ctrl-C or
/// until `duration` elapses, then cancels every tick group.
pub async fn run(
    engine: &Engine,
    target: WatchTarget,
    display: &DisplayConfig,
    refresh: Duration,
    duration: Option<Duration>,
) -> Result<()> {
    let pb = ui::new_spinner("Loading agreements...");
    let started = match &target {
        WatchTarget::All => Ok(engine.activate().await.len()),
        WatchTarget::Ids(ids) => join_all(ids.iter().map(|id| engine.track(id)))
            .await
            .into_iter()
            .collect::<Result<Vec<_>>>()
            .map(|tracked| tracked.len()),
    };
    pb.finish_and_clear();
    match started {
        Ok(count) => info!(count, "Started watching"),
        Err(err) => {
            engine.shutdown().await;
            return Err(err);
        }
    }

    let term = console::Term::stdout();
    let deadline = duration.map(|d| tokio::time::Instant::now() + d);
    let mut redraw = tokio::time::interval(refresh);
    loop {
        tokio::select! {
            _ = redraw.tick() => {
                let views = engine.views().await;
                clear_terminal(&term);
                println!("{}", render_views(&views, display, Utc::now()));
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            _ = sleep_until(deadline) => break,
        }
    }

    engine.shutdown().await;
    ui::print_separator();
    println!("{}", ui::style_text("Stopped watching", ui::StyleType::Subtle));
    Ok(())
}

fn clear_terminal(term: &console::Term) {
    if !term.is_term() {
        return;
    }
    if let Err(err) = term.clear_screen() {
        debug!(error = %err, "Failed to clear terminal");
    }
}

async fn sleep_until(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::agreement::{AccrualSnapshot, Agreement};
    use chrono::TimeZone;

    fn view(snapshot: AccrualSnapshot) -> AgreementView {
        AgreementView {
            agreement: Agreement {
                agreement_id: "1".to_string(),
                payor: "0xpayor".to_string(),
                receiver: "0xreceiver".to_string(),
                annual_amount: 100_000 * 10_u128.pow(18),
                start_date: 1_700_000_000,
                interest_rate: 0.04,
                description: String::new(),
            },
            snapshot,
        }
    }

    fn plain(text: String) -> String {
        console::strip_ansi_codes(&text).to_string()
    }

    fn contents(cells: Vec<Cell>) -> Vec<String> {
        cells.iter().map(|c| c.content()).collect()
    }

    #[test]
    fn test_row_for_fresh_snapshot() {
        let now = Utc.timestamp_opt(1_700_000_012, 0).unwrap();
        let fresh = view(AccrualSnapshot {
            principal_accrued: 31_688_087_814_028_950,
            interest_accrued: 31_688_087_814_028_951,
            on_chain_owed: Some(35_585_162_410_681_240),
            on_chain_interest: Some(1),
            last_reconciled_at: Some(Utc.timestamp_opt(1_700_000_010, 0).unwrap()),
            ..Default::default()
        });

        let row = contents(view_row(&fresh, &DisplayConfig::default(), now));
        assert_eq!(
            row,
            vec![
                "1",
                "0xpayor",
                "100,000.00",
                "2023-11-14 22:13:20 UTC",
                "0.03169",
                "0.0316880878",
                "0.03559",
                "0.0000000000",
                "2s ago",
            ]
        );

        let output = plain(render_views(&[fresh], &DisplayConfig::default(), now));
        assert!(!output.contains("Last ledger error"));
    }

    #[test]
    fn test_row_shows_staleness() {
        let now = Utc.timestamp_opt(1_700_000_030, 0).unwrap();
        let stale = view(AccrualSnapshot {
            on_chain_owed: Some(5),
            last_reconciled_at: Some(Utc.timestamp_opt(1_700_000_010, 0).unwrap()),
            consecutive_failures: 3,
            last_error: Some("connection refused".to_string()),
            ..Default::default()
        });
        let pending = view(AccrualSnapshot::default());

        let stale_row = contents(view_row(&stale, &DisplayConfig::default(), now));
        assert_eq!(stale_row[8], "20s ago, stale (3 failed)");
        let pending_row = contents(view_row(&pending, &DisplayConfig::default(), now));
        assert_eq!(pending_row[6], "N/A");
        assert_eq!(pending_row[8], "pending");

        let output = plain(render_views(&[stale, pending], &DisplayConfig::default(), now));
        assert!(output.contains("Last ledger error: connection refused"));
    }

    #[test]
    fn test_clear_terminal_skips_redirected_output() {
        let term = console::Term::buffered_stdout();
        clear_terminal(&term);
        term.flush().unwrap();
    }
}
