use anyhow::Result;
use chartwalk_core::ChartConfig;
use chartwalk_emr::{encounter_ids, list_visits, select_visits, Artifact, VisitClass};

use crate::cli::{ChartArgs, OutputArgs, RangeArgs};

const ALL_CLASSES: [VisitClass; 3] = [
    VisitClass::Outpatient,
    VisitClass::Inpatient,
    VisitClass::Emergency,
];

pub fn run(config: &ChartConfig, chart: &ChartArgs, range: &RangeArgs, output: &OutputArgs) -> Result<()> {
    let range = super::date_range(range)?;
    let mut fetcher = super::connect(chart)?;
    let visits = list_visits(&mut fetcher, &chart.chart, config)?;
    let in_range: Vec<_> = select_visits(&visits, &ALL_CLASSES, Some(&range))
        .into_iter()
        .cloned()
        .collect();
    let grouped = encounter_ids(&in_range);

    let [start, end] = super::range_parts(&range);
    let title = format!("{} encounters {start} to {end}", chart.chart);
    super::emit(
        output,
        &[&chart.chart, "enct", &start, &end],
        &title,
        Artifact::Encounters(&grouped),
    )?;
    Ok(())
}
