use clap::Args;
use std::path::PathBuf;
use tax_revenue::config::AppConfig;
use tax_revenue::error::AppError;
use tax_revenue::etl::domain::{CompositionRow, TaxToGdpRow};
use tax_revenue::etl::gold::{GoldSnapshot, GoldStore};
use tax_revenue::etl::query::MetricFilter;

#[derive(Args, Debug, Default)]
pub(crate) struct PreviewArgs {
    /// Gold store directory (defaults to ETL_GOLD_DIR)
    #[arg(long)]
    pub(crate) gold_dir: Option<PathBuf>,
    /// Country name or code, case-insensitive
    #[arg(long)]
    pub(crate) country: Option<String>,
    /// ISO3 code, case-insensitive
    #[arg(long)]
    pub(crate) iso3: Option<String>,
    /// Exact year
    #[arg(long)]
    pub(crate) year: Option<i32>,
    /// Also print the composition shares of each country-year
    #[arg(long)]
    pub(crate) composition: bool,
}

pub(crate) fn run_preview(args: PreviewArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let gold_dir = args.gold_dir.unwrap_or(config.pipeline.gold_dir);
    let store = GoldStore::new(gold_dir, config.pipeline.gold_retain);
    let snapshot = store.load()?.ok_or(AppError::DatasetNotBuilt)?;

    let filter = MetricFilter {
        country: args.country,
        iso3: args.iso3,
        year: args.year,
    };
    for line in render_preview(&snapshot, &filter, args.composition) {
        println!("{line}");
    }
    Ok(())
}

pub(crate) fn render_preview(
    snapshot: &GoldSnapshot,
    filter: &MetricFilter,
    with_composition: bool,
) -> Vec<String> {
    let manifest = &snapshot.manifest;
    let mut lines = vec![format!(
        "Gold generation {} built {}",
        manifest.generation,
        manifest.built_at.format("%Y-%m-%d %H:%M UTC")
    )];
    if let Some(snapshot_timestamp) = manifest.snapshot_timestamp {
        lines.push(format!(
            "Source snapshot {}",
            snapshot_timestamp.format("%Y-%m-%d %H:%M UTC")
        ));
    }

    let rows = filter.tax_to_gdp(&snapshot.tax_to_gdp);
    if rows.is_empty() {
        lines.push("No rows match the given filters.".to_string());
        return lines;
    }

    let shares = filter.composition(&snapshot.composition);
    lines.push(format!("{:<20} {:<4} {:>4} {:>10}", "Country", "ISO3", "Year", "Tax/GDP %"));
    for row in &rows {
        lines.push(format_ratio(row));
        if with_composition {
            lines.extend(
                shares
                    .iter()
                    .filter(|share| share.iso3 == row.iso3 && share.year == row.year)
                    .map(|share| format_share(share, manifest.share_precision)),
            );
        }
    }
    lines
}

fn format_ratio(row: &TaxToGdpRow) -> String {
    format!(
        "{:<20} {:<4} {:>4} {:>10.1}",
        row.country, row.iso3, row.year, row.tax_to_gdp
    )
}

fn format_share(share: &CompositionRow, precision: u32) -> String {
    format!(
        "    {:<30} {:>8.*}%",
        share.tax_code.label(),
        precision as usize,
        share.share_pct
    )
}
