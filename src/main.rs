use std::collections::BTreeMap;
use std::path::PathBuf;

use alco_var::cache::ModelCache;
use alco_var::config::Config;
use alco_var::{
    analyze_stationarity, backtest_with_lag, fit_var, forecast, granger_causality, load_panel,
    select_lag_order, what_if_with_lag, CausalityResult, FittedVarModel, ForecastResult, IcKind,
    LagOrderSelection, StationarityReport, TimeSeriesPanel,
};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "alco_var")]
#[command(version, about = "VAR forecasting of per-capita alcohol consumption", long_about = None)]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Consumption CSV (overrides data.path from the config)
    #[arg(short, long)]
    data: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Print results as JSON instead of tables
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full analysis: stationarity, lags, fits, forecast, causality (default)
    Pipeline,
    /// ADF tests on levels and first differences
    Stationarity,
    /// Information-criteria table for candidate lag orders (on differences)
    Lags {
        #[arg(long)]
        max_lag: Option<usize>,
    },
    /// Fit a VAR on levels and forecast ahead
    Forecast {
        #[arg(long)]
        lag_order: Option<usize>,
        #[arg(long)]
        steps: Option<usize>,
        /// Variables to model (default: all)
        #[arg(long, value_delimiter = ',')]
        variables: Vec<String>,
    },
    /// Pairwise Granger causality on first differences
    Causality {
        #[arg(long)]
        lag: Option<usize>,
        /// Variables to test (default: all)
        #[arg(long, value_delimiter = ',')]
        variables: Vec<String>,
    },
    /// Train up to a cutoff year and score the forecast on later years
    Backtest {
        #[arg(long)]
        cutoff: Option<i32>,
        #[arg(long)]
        lag_order: Option<usize>,
        /// Variables to model (default: all)
        #[arg(long, value_delimiter = ',')]
        variables: Vec<String>,
    },
    /// Override last-year values and compare against the baseline forecast
    WhatIf {
        /// Override as VAR=VALUE, repeatable
        #[arg(long = "set", value_parser = parse_override)]
        overrides: Vec<(String, f64)>,
        #[arg(long)]
        steps: Option<usize>,
        #[arg(long)]
        lag_order: Option<usize>,
        /// Variables to model (default: all)
        #[arg(long, value_delimiter = ',')]
        variables: Vec<String>,
    },
}

fn parse_override(raw: &str) -> Result<(String, f64), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected VAR=VALUE, got '{raw}'"))?;
    let value: f64 = value
        .trim()
        .parse()
        .map_err(|e| format!("invalid value in '{raw}': {e}"))?;
    Ok((name.trim().to_string(), value))
}

/// Panel limited to `variables`, or the whole panel when none are named.
fn restrict(panel: &TimeSeriesPanel, variables: &[String]) -> Result<TimeSeriesPanel> {
    if variables.is_empty() {
        return Ok(panel.clone());
    }
    panel
        .select(variables)
        .with_context(|| format!("invalid variable selection {variables:?}"))
}

fn setup_logging(config: &Config, cli: &Cli) {
    let level = cli.log_level.as_deref().unwrap_or(&config.logging.level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => Config::default(),
    };
    setup_logging(&config, &cli);

    let Some(data_path) = cli.data.clone().or_else(|| config.data.path.clone()) else {
        bail!("no input data: pass --data or set data.path in the config");
    };
    let panel = load_panel(&data_path, &config.data.ingest_options())
        .with_context(|| format!("failed to prepare {}", data_path.display()))?;
    info!(
        years = panel.len(),
        first = panel.first_year().unwrap_or_default(),
        last = panel.last_year().unwrap_or_default(),
        "data loaded"
    );

    let out = Output { json: cli.json };
    match cli.command.unwrap_or(Commands::Pipeline) {
        Commands::Pipeline => run_pipeline(&panel, &config, &out),
        Commands::Stationarity => {
            let (_, report) = analyze_stationarity(&panel)?;
            out.stationarity(&report);
            Ok(())
        }
        Commands::Lags { max_lag } => {
            let diff = panel.difference();
            let sel = select_lag_order(&diff, max_lag.unwrap_or(config.model.max_lag))?;
            out.lags(&sel);
            Ok(())
        }
        Commands::Forecast {
            lag_order,
            steps,
            variables,
        } => {
            let panel = restrict(&panel, &variables)?;
            let model = fit_var(&panel, lag_order.unwrap_or(config.model.lag_order))?;
            let fc = forecast(&model, steps.unwrap_or(config.model.forecast_steps))?;
            out.forecast("forecast", &fc);
            Ok(())
        }
        Commands::Causality { lag, variables } => {
            let diff = panel.difference();
            let variables = if variables.is_empty() {
                diff.variables().to_vec()
            } else {
                variables
            };
            let res = granger_causality(
                &diff,
                &variables,
                lag.unwrap_or(config.model.causality_lag),
            )?;
            out.causality(&res);
            Ok(())
        }
        Commands::Backtest {
            cutoff,
            lag_order,
            variables,
        } => {
            let Some(cutoff) = cutoff.or(config.backtest.cutoff) else {
                bail!("no cutoff year: pass --cutoff or set backtest.cutoff");
            };
            run_backtest(
                &restrict(&panel, &variables)?,
                cutoff,
                lag_order.unwrap_or(config.model.lag_order),
                &out,
            )
        }
        Commands::WhatIf {
            overrides,
            steps,
            lag_order,
            variables,
        } => {
            let overrides: BTreeMap<String, f64> = if overrides.is_empty() {
                config.what_if.overrides.clone()
            } else {
                overrides.into_iter().collect()
            };
            run_what_if(
                &restrict(&panel, &variables)?,
                &overrides,
                steps.unwrap_or_else(|| config.what_if_steps()),
                lag_order.unwrap_or(config.model.lag_order),
                &out,
            )
        }
    }
}

fn run_pipeline(panel: &TimeSeriesPanel, config: &Config, out: &Output) -> Result<()> {
    let cache = ModelCache::new();

    let (diff, report) = analyze_stationarity(panel).context("stationarity analysis failed")?;
    out.stationarity(&report);
    if report.differencing_required() && !report.differenced_all_stationary() {
        warn!("some series remain non-stationary after one difference");
    }
    out.matrix("correlation of differences", diff.variables(), &diff.correlation());

    let sel = select_lag_order(&diff, config.model.max_lag).context("lag selection failed")?;
    out.lags(&sel);

    let diff_model = cache.get_or_fit(&diff, config.model.lag_order)?;
    out.model(&diff_model);

    let level_model = cache.get_or_fit(panel, config.model.lag_order)?;
    let fc = forecast(&level_model, config.model.forecast_steps)?;
    out.forecast("level forecast", &fc);

    let variables = diff.variables().to_vec();
    let causality = granger_causality(&diff, &variables, config.model.causality_lag)?;
    out.causality(&causality);

    if let Some(cutoff) = config.backtest.cutoff {
        run_backtest(panel, cutoff, config.model.lag_order, out)?;
    }
    if !config.what_if.overrides.is_empty() {
        run_what_if(
            panel,
            &config.what_if.overrides,
            config.what_if_steps(),
            config.model.lag_order,
            out,
        )?;
    }
    Ok(())
}

fn run_backtest(panel: &TimeSeriesPanel, cutoff: i32, lag: usize, out: &Output) -> Result<()> {
    let res = backtest_with_lag(panel, cutoff, lag)
        .with_context(|| format!("backtest at cutoff {cutoff} failed"))?;
    if out.json {
        out.emit(json!({
            "backtest": {
                "cutoff": res.cutoff,
                "forecast": res.forecast.panel.records(),
                "actuals": res.actuals.records(),
                "accuracy": res.accuracy,
            }
        }));
    } else {
        out.forecast(&format!("backtest forecast (trained to {cutoff})"), &res.forecast);
        println!("{:<10} {:>12} {:>12}", "variable", "RMSE", "MAE");
        for acc in &res.accuracy {
            println!("{:<10} {:>12.4} {:>12.4}", acc.variable, acc.rmse, acc.mae);
        }
    }
    Ok(())
}

fn run_what_if(
    panel: &TimeSeriesPanel,
    overrides: &BTreeMap<String, f64>,
    steps: usize,
    lag: usize,
    out: &Output,
) -> Result<()> {
    if overrides.is_empty() {
        warn!("no overrides given; scenario equals baseline");
    }
    let res = what_if_with_lag(panel, overrides, steps, lag).context("what-if run failed")?;
    if out.json {
        out.emit(json!({
            "what_if": {
                "overrides": overrides,
                "baseline": res.baseline.panel.records(),
                "scenario": res.scenario.panel.records(),
            }
        }));
    } else {
        out.forecast("what-if baseline", &res.baseline);
        out.forecast("what-if scenario", &res.scenario);
    }
    Ok(())
}

struct Output {
    json: bool,
}

impl Output {
    fn emit(&self, value: Value) {
        match serde_json::to_string_pretty(&value) {
            Ok(text) => println!("{text}"),
            Err(e) => warn!(error = %e, "failed to serialise output"),
        }
    }

    fn stationarity(&self, report: &StationarityReport) {
        if self.json {
            self.emit(json!({ "stationarity": report }));
            return;
        }
        println!("\nStationarity (ADF, constant)");
        println!(
            "{:<10} {:>10} {:>8} {:>10} {:>8}",
            "variable", "level t", "p", "diff t", "p"
        );
        for s in &report.series {
            println!(
                "{:<10} {:>10.4} {:>8.4} {:>10.4} {:>8.4}",
                s.variable, s.level.statistic, s.level.p_value, s.differenced.statistic,
                s.differenced.p_value
            );
        }
    }

    fn matrix(&self, title: &str, names: &[String], m: &ndarray::Array2<f64>) {
        if self.json {
            let rows: Vec<Vec<f64>> = m.rows().into_iter().map(|r| r.to_vec()).collect();
            self.emit(json!({ title: { "variables": names, "values": rows } }));
            return;
        }
        println!("\n{title}");
        print!("{:<10}", "");
        for n in names {
            print!(" {:>8}", n);
        }
        println!();
        for (name, row) in names.iter().zip(m.rows()) {
            print!("{:<10}", name);
            for v in row {
                print!(" {:>8.3}", v);
            }
            println!();
        }
    }

    fn lags(&self, sel: &LagOrderSelection) {
        if self.json {
            self.emit(json!({ "lag_selection": sel }));
            return;
        }
        println!("\nLag order selection ({} observations)", sel.n_obs);
        println!(
            "{:<5} {:>12} {:>12} {:>12} {:>12}",
            "lag", "AIC", "BIC", "FPE", "HQIC"
        );
        for row in &sel.table {
            println!(
                "{:<5} {:>12.4} {:>12.4} {:>12.4e} {:>12.4}",
                row.lag, row.aic, row.bic, row.fpe, row.hqic
            );
        }
        let picks: Vec<String> = IcKind::ALL
            .iter()
            .map(|&k| format!("{}={}", k.label(), sel.selected(k)))
            .collect();
        println!("selected: {}", picks.join(" "));
    }

    fn model(&self, model: &FittedVarModel) {
        let irf = model.impulse_responses(10);
        if self.json {
            let coefs: Vec<Vec<Vec<f64>>> = model
                .coefficients()
                .iter()
                .map(|a| a.rows().into_iter().map(|r| r.to_vec()).collect())
                .collect();
            let responses: Vec<Vec<Vec<f64>>> = irf
                .iter()
                .map(|a| a.rows().into_iter().map(|r| r.to_vec()).collect())
                .collect();
            self.emit(json!({
                "model": {
                    "lag_order": model.lag_order(),
                    "variables": model.variables(),
                    "intercept": model.intercept().to_vec(),
                    "coefficients": coefs,
                    "information_criteria": model.information_criteria(),
                    "impulse_responses": responses,
                }
            }));
            return;
        }
        println!("\n{model}");
        println!("Impulse responses (response <- shock)");
        for (h, phi) in irf.iter().enumerate() {
            let cells: Vec<String> = phi.iter().map(|v| format!("{v:.3}")).collect();
            println!("  h={h:<2} {}", cells.join(" "));
        }
    }

    fn forecast(&self, title: &str, fc: &ForecastResult) {
        if self.json {
            self.emit(json!({ title: fc.panel.records() }));
            return;
        }
        println!("\n{title} (VAR({}))", fc.lag_order);
        print!("{:<6}", "year");
        for v in fc.variables() {
            print!(" {:>10}", v);
        }
        println!();
        for (year, row) in fc.years().iter().zip(fc.panel.values().rows()) {
            print!("{:<6}", year);
            for v in row {
                print!(" {:>10.4}", v);
            }
            println!();
        }
    }

    fn causality(&self, res: &CausalityResult) {
        if self.json {
            let p_values: Vec<Value> = res
                .p_values
                .iter()
                .map(|((c, e), p)| json!({ "cause": c, "effect": e, "p_value": p }))
                .collect();
            let failures: Vec<Value> = res
                .failures
                .iter()
                .map(|((c, e), err)| json!({ "cause": c, "effect": e, "error": err.to_string() }))
                .collect();
            self.emit(json!({
                "causality": { "max_lag": res.max_lag, "p_values": p_values, "failures": failures }
            }));
            return;
        }
        println!("\nGranger causality (lag {}), p-values", res.max_lag);
        for ((cause, effect), p) in &res.p_values {
            let mark = if *p < alco_var::SIGNIFICANCE_LEVEL { "*" } else { "" };
            println!("  {cause:>8} -> {effect:<8} {p:.4}{mark}");
        }
        for err in res.failures.values() {
            println!("  {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn panel() -> TimeSeriesPanel {
        TimeSeriesPanel::from_columns(
            vec![2000, 2001, 2002],
            &[
                ("wine", vec![1.0, 2.0, 3.0]),
                ("beer", vec![10.0, 11.0, 13.0]),
                ("vodka", vec![5.0, 4.0, 4.5]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_restrict_selects_named_variables_in_order() {
        let sub = restrict(&panel(), &["vodka".to_string(), "wine".to_string()]).unwrap();
        assert_eq!(sub.variables(), &["vodka", "wine"]);
        assert_eq!(sub.values()[[1, 0]], 4.0);
        assert_eq!(restrict(&panel(), &[]).unwrap(), panel());
        assert!(restrict(&panel(), &["cider".to_string()]).is_err());
    }

    #[test]
    fn test_variables_flag_parses_comma_list() {
        let cli = Cli::try_parse_from([
            "alco_var",
            "forecast",
            "--variables",
            "wine,beer",
            "--steps",
            "2",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Forecast {
                variables, steps, ..
            }) => {
                assert_eq!(variables, vec!["wine", "beer"]);
                assert_eq!(steps, Some(2));
            }
            _ => panic!("expected forecast subcommand"),
        }
    }

    #[test]
    fn test_parse_override() {
        assert_eq!(parse_override("wine=7.5").unwrap(), ("wine".to_string(), 7.5));
        assert!(parse_override("wine").is_err());
        assert!(parse_override("wine=abc").is_err());
    }
}
