use factorlab_core::format::{escape_html, fmt_money, fmt_money_cents, fmt_percent, fmt_ratio};
use factorlab_core::series::{drawdown_series, worst_drawdown};
use factorlab_core::{EquityPoint, RunMetrics};

const EQUITY_WIDTH: u32 = 1040;
const EQUITY_HEIGHT: u32 = 340;
const DRAWDOWN_WIDTH: u32 = 1040;
const DRAWDOWN_HEIGHT: u32 = 260;
pub const CHART_PADDING: f64 = 16.0;

/// Transaction cost per 100% one-way turnover, as a fraction.
const COST_PER_TURNOVER: f64 = 0.001;

/// Everything the tearsheet shows about one run.
#[derive(Debug, Clone)]
pub struct ReportInput<'a> {
    pub run_name: &'a str,
    pub strategy_id: &'a str,
    pub start_date: &'a str,
    pub end_date: &'a str,
    /// ISO-8601 generation time.
    pub generated_at: &'a str,
    pub metrics: &'a RunMetrics,
    pub equity_curve: &'a [EquityPoint],
}

/// Scale `points` into an SVG polyline `points` attribute for a `width` x
/// `height` box, leaving `pad` on every side.
///
/// A flat series is drawn along the bottom edge.
pub fn make_polyline(points: &[f64], width: f64, height: f64, pad: f64) -> String {
    if points.is_empty() {
        return String::new();
    }
    let min = points.iter().copied().fold(f64::INFINITY, f64::min);
    let max = points.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let y_span = if max - min == 0.0 { 1.0 } else { max - min };
    let x_span = points.len().saturating_sub(1).max(1) as f64;

    points
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let x = pad + (i as f64 / x_span) * (width - pad * 2.0);
            let y = height - pad - ((v - min) / y_span) * (height - pad * 2.0);
            format!("{x:.2},{y:.2}")
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn kpi(label: &str, value: String) -> String {
    format!(
        r#"<div class="kpi"><div class="label">{label}</div><div class="value">{value}</div></div>"#
    )
}

/// Render the full standalone tearsheet document.
pub fn build_report_html(input: &ReportInput<'_>) -> String {
    let metrics = input.metrics;
    let curve = input.equity_curve;

    let drawdown = drawdown_series(curve);
    let portfolio: Vec<f64> = curve.iter().map(|pt| pt.portfolio).collect();
    let benchmark: Vec<f64> = curve.iter().map(|pt| pt.benchmark).collect();

    let (eq_w, eq_h) = (EQUITY_WIDTH, EQUITY_HEIGHT);
    let (dd_w, dd_h) = (DRAWDOWN_WIDTH, DRAWDOWN_HEIGHT);
    let portfolio_line = make_polyline(&portfolio, eq_w as f64, eq_h as f64, CHART_PADDING);
    let benchmark_line = make_polyline(&benchmark, eq_w as f64, eq_h as f64, CHART_PADDING);
    let drawdown_line = make_polyline(&drawdown, dd_w as f64, dd_h as f64, CHART_PADDING);

    let start_nav = curve.first().map(|pt| pt.portfolio).unwrap_or(0.0);
    let end_nav = curve.last().map(|pt| pt.portfolio).unwrap_or(0.0);
    let benchmark_end = curve.last().map(|pt| pt.benchmark).unwrap_or(0.0);

    let kpis = [
        kpi("CAGR", fmt_percent(metrics.cagr, 1)),
        kpi("Sharpe", fmt_ratio(metrics.sharpe, 2)),
        kpi("Max Drawdown", fmt_percent(metrics.max_drawdown, 1)),
        kpi("Volatility", fmt_percent(metrics.volatility, 1)),
        kpi("Win Rate", fmt_percent(metrics.win_rate, 1)),
        kpi("Profit Factor", fmt_ratio(metrics.profit_factor, 2)),
        kpi("Turnover", fmt_percent(metrics.turnover, 1)),
        kpi("Calmar", fmt_ratio(metrics.calmar, 2)),
    ]
    .join("\n      ");

    let run_name = escape_html(input.run_name);

    format!(
        r##"<!doctype html>
<html lang="en">
<head>
  <meta charset="UTF-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1.0" />
  <title>FactorLab Report - {run_name}</title>
  <style>{style}</style>
</head>
<body>
  <div class="wrap">
    <h1>Strategy Tearsheet</h1>
    <div class="meta">
      <p><strong>Run:</strong> {run_name}</p>
      <p><strong>Strategy:</strong> {strategy}</p>
      <p><strong>Window:</strong> {start} to {end}</p>
      <p><strong>Generated:</strong> {generated}</p>
    </div>

    <h2>KPIs</h2>
    <div class="grid">
      {kpis}
    </div>

    <h2>Equity Curve vs SPY</h2>
    <div class="panel">
      <div class="legend">
        <span><i class="dot" style="background: var(--portfolio)"></i>Portfolio</span>
        <span><i class="dot" style="background: var(--benchmark)"></i>SPY (Benchmark)</span>
      </div>
      <svg viewBox="0 0 {eq_w} {eq_h}" width="{eq_w}" height="{eq_h}" role="img" aria-label="Equity curve chart">
        <rect x="0" y="0" width="{eq_w}" height="{eq_h}" fill="#ffffff" />
        <polyline fill="none" stroke="var(--benchmark)" stroke-width="2" points="{benchmark_line}" />
        <polyline fill="none" stroke="var(--portfolio)" stroke-width="3" points="{portfolio_line}" />
      </svg>
      <p><strong>Start NAV:</strong> {start_nav} | <strong>End NAV:</strong> {end_nav}</p>
      <p><strong>Benchmark End:</strong> {benchmark_end} | <strong>Net P&amp;L:</strong> {net_pnl}</p>
    </div>

    <h2>Drawdown</h2>
    <div class="panel">
      <svg viewBox="0 0 {dd_w} {dd_h}" width="{dd_w}" height="{dd_h}" role="img" aria-label="Drawdown chart">
        <rect x="0" y="0" width="{dd_w}" height="{dd_h}" fill="#ffffff" />
        <polyline fill="none" stroke="var(--drawdown)" stroke-width="2.5" points="{drawdown_line}" />
      </svg>
      <p><strong>Worst Drawdown:</strong> {worst}</p>
    </div>

    <h2>Turnover and Cost Assumptions</h2>
    <div class="panel">
      <ul>
        <li>Turnover shown is average one-way turnover per rebalance period.</li>
        <li>Default transaction cost assumption for interpretation: 10 bps per 100% one-way turnover.</li>
        <li>Illustrative annualized cost drag: {cost_drag} (turnover x 10 bps).</li>
        <li>No explicit market impact or slippage model is applied in this MVP report.</li>
      </ul>
    </div>

    <h2>Limitations</h2>
    <div class="panel">
      <ul>
        <li>Backtest outputs are historical simulations and not investment advice.</li>
        <li>Corporate actions, borrow costs, taxes, and liquidity constraints may not be fully modeled.</li>
        <li>Survivorship bias and look-ahead bias controls depend on the underlying data pipeline.</li>
        <li>Use out-of-sample validation and stress testing before deployment.</li>
      </ul>
    </div>
  </div>
</body>
</html>"##,
        style = REPORT_STYLE,
        strategy = escape_html(input.strategy_id),
        start = escape_html(input.start_date),
        end = escape_html(input.end_date),
        generated = escape_html(input.generated_at),
        start_nav = fmt_money(start_nav),
        end_nav = fmt_money(end_nav),
        benchmark_end = fmt_money(benchmark_end),
        net_pnl = fmt_money_cents(end_nav - start_nav),
        worst = fmt_percent(worst_drawdown(&drawdown), 1),
        cost_drag = fmt_percent(metrics.turnover * COST_PER_TURNOVER, 2),
    )
}

const REPORT_STYLE: &str = r#"
    :root {
      --bg: #ffffff;
      --text: #0f172a;
      --muted: #475569;
      --border: #e2e8f0;
      --panel: #f8fafc;
      --portfolio: #0f766e;
      --benchmark: #2563eb;
      --drawdown: #b91c1c;
    }
    * { box-sizing: border-box; }
    body {
      margin: 0;
      padding: 32px;
      background: var(--bg);
      color: var(--text);
      font-family: "SF Mono", "Menlo", "Consolas", monospace;
      line-height: 1.45;
    }
    .wrap { max-width: 1080px; margin: 0 auto; }
    h1 { font-size: 24px; margin: 0 0 8px; }
    h2 { font-size: 18px; margin: 28px 0 12px; }
    p { margin: 4px 0; color: var(--muted); }
    .meta { padding: 14px; border: 1px solid var(--border); background: var(--panel); border-radius: 10px; }
    .grid {
      display: grid;
      grid-template-columns: repeat(4, minmax(0, 1fr));
      gap: 10px;
    }
    .kpi {
      border: 1px solid var(--border);
      border-radius: 10px;
      padding: 12px;
      background: #fff;
    }
    .kpi .label { font-size: 11px; letter-spacing: 0.08em; text-transform: uppercase; color: var(--muted); }
    .kpi .value { font-size: 20px; margin-top: 4px; color: var(--text); }
    .panel {
      border: 1px solid var(--border);
      border-radius: 10px;
      padding: 12px;
      background: #fff;
    }
    .legend { display: flex; gap: 18px; font-size: 12px; color: var(--muted); margin-bottom: 8px; }
    .legend span { display: inline-flex; align-items: center; gap: 6px; }
    .dot { width: 10px; height: 10px; border-radius: 99px; display: inline-block; }
    ul { margin: 8px 0 0 18px; color: var(--muted); }
    li { margin: 6px 0; }
    @media (max-width: 900px) {
      body { padding: 18px; }
      .grid { grid-template-columns: repeat(2, minmax(0, 1fr)); }
      svg { width: 100%; height: auto; }
    }
  "#;
