use anyhow::Result;
use chartwalk_core::ChartConfig;
use chartwalk_emr::{collect_diagnoses, Artifact};

use crate::cli::{ChartArgs, OutputArgs, RangeArgs};

pub fn run(config: &ChartConfig, chart: &ChartArgs, range: &RangeArgs, output: &OutputArgs) -> Result<()> {
    let range = super::date_range(range)?;
    let mut fetcher = super::connect(chart)?;
    let index = collect_diagnoses(&mut fetcher, &chart.chart, Some(&range), config)?;

    let [start, end] = super::range_parts(&range);
    let title = format!("{} diagnoses {start} to {end}", chart.chart);
    super::emit(
        output,
        &[&chart.chart, "diag", &start, &end],
        &title,
        Artifact::Index(&index),
    )?;
    Ok(())
}
