use anyhow::Result;
use chartwalk_core::ChartConfig;
use chartwalk_emr::{assemble_diffs, Artifact};
use tracing::info;

use crate::cli::{ChartArgs, OutputArgs, RangeArgs};

pub struct DiffOptions {
    pub reverse: bool,
    pub min_segments: Option<usize>,
}

pub fn run(
    config: &ChartConfig,
    chart: &ChartArgs,
    range: &RangeArgs,
    options: DiffOptions,
    output: &OutputArgs,
) -> Result<()> {
    let mut config = config.clone();
    config.diff.reverse |= options.reverse;
    if let Some(min_segments) = options.min_segments {
        config.diff.min_segments = min_segments;
    }

    let range = super::date_range(range)?;
    let mut fetcher = super::connect(chart)?;
    let report = assemble_diffs(&mut fetcher, &chart.chart, Some(&range), &config)?;
    for skipped in &report.skipped {
        info!(
            author = %skipped.author,
            visit = %skipped.id,
            "note left out with {} of {} segments",
            skipped.present,
            skipped.required
        );
    }

    let [start, end] = super::range_parts(&range);
    let order = if config.diff.reverse { "rev" } else { "" };
    let title = format!("{} note changes {start} to {end}", chart.chart);
    super::emit(
        output,
        &[&chart.chart, "diff", &start, &end, order],
        &title,
        Artifact::Diffs(&report),
    )?;
    Ok(())
}
