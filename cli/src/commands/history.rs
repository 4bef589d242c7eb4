use anyhow::{bail, Result};
use chartwalk_core::ChartConfig;
use chartwalk_emr::{collect_history, since, Artifact, RecordKind};

use crate::cli::{ChartArgs, OutputArgs, StayArgs};

/// Kinds read from the ICU flow sheets and handover notes.
pub const ICU_KINDS: [RecordKind; 9] = [
    RecordKind::Temperature,
    RecordKind::HeartRate,
    RecordKind::RespiratoryRate,
    RecordKind::SystolicBp,
    RecordKind::DiastolicBp,
    RecordKind::Surgery,
    RecordKind::Respiration,
    RecordKind::Imaging,
    RecordKind::Vaccination,
];

pub fn run_icu(
    config: &ChartConfig,
    chart: &ChartArgs,
    stay: &StayArgs,
    kind: RecordKind,
    output: &OutputArgs,
) -> Result<()> {
    if !ICU_KINDS.contains(&kind) {
        bail!("{kind} is not recorded on the ICU sheets");
    }
    run(config, chart, stay, kind, &["icu", kind.slug()], output)
}

pub fn run(
    config: &ChartConfig,
    chart: &ChartArgs,
    stay: &StayArgs,
    kind: RecordKind,
    label: &[&str],
    output: &OutputArgs,
) -> Result<()> {
    let mut fetcher = super::connect(chart)?;
    let records = collect_history(&mut fetcher, &stay.encounter, kind, config, stay.all_pages)?;
    let records = since(records, stay.since);

    let mut parts = vec![chart.chart.as_str(), stay.encounter.as_str()];
    parts.extend_from_slice(label);
    let title = format!("{} {} {kind}", chart.chart, stay.encounter);
    super::emit(output, &parts, &title, Artifact::Timeline(&records))?;
    Ok(())
}
