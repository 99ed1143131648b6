//! UI utilities for pretty printing

use bizsync_core::accounting::AccountBalance;
use bizsync_core::integrity::{HealthReport, HealthScore, Severity};
use chrono::NaiveDate;
use colored::Colorize;

pub fn print_health_report(report: &HealthReport) {
    let score = format!("{:?}", report.health_score).to_uppercase();
    let score = match report.health_score {
        HealthScore::Excellent => score.bright_green(),
        HealthScore::Fair => score.bright_yellow(),
        HealthScore::Poor => score.yellow(),
        HealthScore::Critical => score.bright_red(),
    };

    println!("{}", "Health Report".bright_cyan().bold());
    println!();
    println!("  {:<28} {}", "Score:".bright_green(), score.bold());
    println!("  {:<28} {}", "Foreign key violations:".bright_green(), report.foreign_key_violations);
    println!("  {:<28} {}", "Business rule violations:".bright_green(), report.business_rule_violations);
    println!(
        "  {:<28} {} (debits {} / credits {})",
        "Trial balance:".bright_green(),
        if report.trial_balance.is_balanced { "balanced" } else { "UNBALANCED" },
        report.trial_balance.total_debits,
        report.trial_balance.total_credits
    );
    println!(
        "  {:<28} {} ({} records checked)",
        "Audit chain:".bright_green(),
        if report.audit_chain.is_valid { "intact" } else { "BROKEN" },
        report.audit_chain.records_checked
    );

    if report.violations.is_empty() {
        println!();
        return;
    }

    println!();
    println!("  {}", "Violations:".bright_yellow().bold());
    for v in &report.violations {
        let severity = format!("{:?}", v.severity).to_lowercase();
        let severity = match v.severity {
            Severity::Critical => severity.bright_red(),
            Severity::High => severity.red(),
            Severity::Medium => severity.yellow(),
            Severity::Low => severity.normal(),
        };
        println!("  [{:<8}] {:<32} {}", severity, v.rule, v.details);
    }
    println!();
}

pub fn print_trial_balance(balances: &[AccountBalance], as_of: Option<NaiveDate>) {
    let title = match as_of {
        Some(date) => format!("Trial Balance as of {}", date),
        None => "Trial Balance".to_string(),
    };
    println!("{}", title.bright_cyan().bold());
    println!();
    println!("  {:<6} {:<28} {:>14} {:>14} {:>14}", "Code", "Account", "Debits", "Credits", "Balance");
    for b in balances {
        println!(
            "  {:<6} {:<28} {:>14} {:>14} {:>14}",
            b.code,
            b.name,
            b.total_debits.to_string(),
            b.total_credits.to_string(),
            b.balance.to_string()
        );
    }
    println!();
}

pub fn print_error(msg: &str) {
    println!("{} {}", "✗".bright_red(), msg.red());
}

pub fn print_success(msg: &str) {
    println!("{} {}", "✓".bright_green(), msg.bright_green());
}

pub fn print_info(msg: &str) {
    println!("{} {}", "ℹ".bright_blue(), msg);
}
