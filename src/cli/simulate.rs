//! What-if simulator command

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use dialoguer::{theme::ColorfulTheme, Input};

use crate::pipeline::{PipelineConfig, RawField};
use crate::report::display_simulation;
use crate::utils::{print_banner, print_info, print_step_header, print_success};

use super::args::SimulateArgs;
use super::score::load_context;

/// Days per month used to derive monthly revenue and expense.
const DAYS_PER_MONTH: f64 = 30.0;

/// One prompted input with its allowed range and default.
struct Slider {
    field: RawField,
    label: &'static str,
    min: f64,
    max: f64,
    default: f64,
}

const SLIDERS: [Slider; 12] = [
    Slider { field: RawField::RevenuePerDay, label: "Revenue per day", min: 1_000.0, max: 100_000.0, default: 25_000.0 },
    Slider { field: RawField::ExpensePerDay, label: "Expense per day", min: 500.0, max: 80_000.0, default: 18_000.0 },
    Slider { field: RawField::CreditScore, label: "Credit score", min: 300.0, max: 900.0, default: 675.0 },
    Slider { field: RawField::DebtToRevenueRatio, label: "Debt to revenue ratio", min: 0.0, max: 0.5, default: 0.10 },
    Slider { field: RawField::EmiObligation, label: "EMI obligation", min: 0.0, max: 500_000.0, default: 50_000.0 },
    Slider { field: RawField::OdRequired, label: "OD required", min: 10_000.0, max: 2_000_000.0, default: 300_000.0 },
    Slider { field: RawField::OdUtilization, label: "OD utilization", min: 0.0, max: 1.0, default: 0.50 },
    Slider { field: RawField::CashInflow, label: "Cash inflow", min: 50_000.0, max: 5_000_000.0, default: 500_000.0 },
    Slider { field: RawField::CashOutflow, label: "Cash outflow", min: 30_000.0, max: 4_000_000.0, default: 350_000.0 },
    Slider { field: RawField::InventoryDays, label: "Inventory days", min: 0.0, max: 120.0, default: 35.0 },
    Slider { field: RawField::ReceivableDays, label: "Receivable days", min: 0.0, max: 120.0, default: 40.0 },
    Slider { field: RawField::PayableDays, label: "Payable days", min: 0.0, max: 120.0, default: 30.0 },
];

/// Fill in the fields the interactive prompts derive rather than ask for.
pub fn complete_inputs(values: &mut HashMap<String, f64>) {
    let get = |values: &HashMap<String, f64>, field: RawField| {
        values.get(field.column_name()).copied()
    };

    if let Some(revenue) = get(values, RawField::RevenuePerDay) {
        values
            .entry(RawField::MonthlyRevenue.column_name().to_string())
            .or_insert(revenue * DAYS_PER_MONTH);
    }
    if let Some(expense) = get(values, RawField::ExpensePerDay) {
        values
            .entry(RawField::MonthlyExpense.column_name().to_string())
            .or_insert(expense * DAYS_PER_MONTH);
    }
    if let (Some(inventory), Some(receivable), Some(payable)) = (
        get(values, RawField::InventoryDays),
        get(values, RawField::ReceivableDays),
        get(values, RawField::PayableDays),
    ) {
        values
            .entry(RawField::CashConversionCycle.column_name().to_string())
            .or_insert(inventory + receivable - payable);
    }
}

/// The simulator's starting business.
pub fn default_inputs() -> HashMap<String, f64> {
    let mut values: HashMap<String, f64> = SLIDERS
        .iter()
        .map(|s| (s.field.column_name().to_string(), s.default))
        .collect();
    complete_inputs(&mut values);
    values
}

fn prompt_inputs() -> Result<HashMap<String, f64>> {
    let theme = ColorfulTheme::default();
    let mut values = HashMap::new();

    for slider in &SLIDERS {
        let (min, max) = (slider.min, slider.max);
        let value: f64 = Input::with_theme(&theme)
            .with_prompt(format!("{} [{} - {}]", slider.label, min, max))
            .default(slider.default)
            .validate_with(move |v: &f64| -> Result<(), String> {
                if (min..=max).contains(v) {
                    Ok(())
                } else {
                    Err(format!("must be between {} and {}", min, max))
                }
            })
            .interact_text()?;
        values.insert(slider.field.column_name().to_string(), value);
    }

    complete_inputs(&mut values);
    Ok(values)
}

fn read_inputs(path: &Path) -> Result<HashMap<String, f64>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read simulator input: {}", path.display()))?;
    let values: HashMap<String, f64> = serde_json::from_str(&text)
        .with_context(|| format!("Simulator input must be a JSON object of numbers: {}", path.display()))?;
    Ok(values)
}

pub fn run_simulate(args: &SimulateArgs, config: PipelineConfig) -> Result<()> {
    if !args.json {
        print_banner(env!("CARGO_PKG_VERSION"));
        print_step_header(1, "Load Artifacts");
    }
    let context = load_context(&args.artifacts, &config)?;
    if !args.json {
        print_success(&format!("Artifact set {}", context.fit_id()));
    }

    let values = match &args.input {
        Some(path) => read_inputs(path)?,
        None => {
            if !args.json {
                print_step_header(2, "Business Profile");
                print_info("Press Enter to keep a default value");
            }
            prompt_inputs()?
        }
    };

    let result = context
        .simulate(&values)
        .context("Simulation failed")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        display_simulation(&result);
    }
    Ok(())
}
