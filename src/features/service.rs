//! Turns raw appointment rows into model features and labels.
//!
//! Steps run in a fixed order: drop identifiers, parse both timestamps,
//! derive the day difference and clamp it, derive weekday and month from the
//! appointment timestamp, drop the timestamps, binarize the label.

use std::time::Instant;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};
use log::{info, warn};

use crate::common::error::{DataError, NoShowError, NoShowResult};
use crate::common::time;
use crate::data::domain::{ColumnRole, RawSchema, RawTable};

use super::domain::{
    Column, FeatureTable, Label, APPOINTMENT_DAY_OF_WEEK, APPOINTMENT_MONTH,
    DIFF_APPOINTMENT_SCHEDULED,
};

const SECONDS_PER_DAY: i64 = 86_400;

/// Label value meaning the patient showed up.
const ATTENDED: &str = "No";

#[derive(Clone, Debug)]
struct Layout {
    /// Feature columns as (name, raw index, role), in file order.
    features: Vec<(String, usize, ColumnRole)>,
    scheduled: (String, usize),
    appointment: (String, usize),
    label: (String, usize),
}

/// Validated mapping from a raw schema onto a concrete header.
#[derive(Clone, Debug)]
pub struct FeatureBuilder {
    schema: RawSchema,
    header: Vec<String>,
    layout: Layout,
}

impl FeatureBuilder {
    /// Check every declared column against `header` once.
    pub fn new(schema: RawSchema, header: &[String]) -> NoShowResult<Self> {
        let layout = resolve(&schema, header)?;
        Ok(Self {
            schema,
            header: header.to_vec(),
            layout,
        })
    }

    pub fn for_table(schema: RawSchema, table: &RawTable) -> NoShowResult<Self> {
        Self::new(schema, table.header())
    }

    /// Derive the feature table and labels from `table`.
    pub fn build(&self, table: &RawTable) -> NoShowResult<(FeatureTable, Vec<Label>)> {
        let start = Instant::now();
        let rebound;
        let layout = if table.header() == self.header.as_slice() {
            &self.layout
        } else {
            rebound = resolve(&self.schema, table.header())?;
            &rebound
        };
        let rows = table.rows();

        let mut columns = Vec::with_capacity(layout.features.len() + 3);
        for (name, idx, role) in &layout.features {
            let cells = rows.iter().map(|r| r.get(*idx).unwrap_or_default());
            let column = match role {
                ColumnRole::Numeric => {
                    let mut unparsed = 0usize;
                    let values = cells
                        .map(|cell| {
                            cell.trim().parse::<f64>().unwrap_or_else(|_| {
                                unparsed += 1;
                                f64::NAN
                            })
                        })
                        .collect();
                    if unparsed > 0 {
                        warn!("{unparsed} non-numeric cells in column {name} kept as NaN");
                    }
                    Column::numeric(name.clone(), values)
                }
                _ => Column::categorical(name.clone(), cells.map(String::from).collect()),
            };
            columns.push(column);
        }

        let scheduled = parse_column(table, &layout.scheduled)?;
        let appointment = parse_column(table, &layout.appointment)?;

        let mut other_negatives = 0usize;
        let diff: Vec<f64> = scheduled
            .iter()
            .zip(&appointment)
            .map(|(s, a)| {
                let days = (*a - *s).num_seconds().div_euclid(SECONDS_PER_DAY);
                match days {
                    -1 => 0.0,
                    d if d < 0 => {
                        other_negatives += 1;
                        d as f64
                    }
                    d => d as f64,
                }
            })
            .collect();
        if other_negatives > 0 {
            warn!(
                "{other_negatives} rows have an appointment more than one day before scheduling; left unclamped"
            );
        }
        columns.push(Column::numeric(DIFF_APPOINTMENT_SCHEDULED, diff));
        columns.push(Column::numeric(
            APPOINTMENT_DAY_OF_WEEK,
            appointment
                .iter()
                .map(|a| f64::from(a.weekday().num_days_from_monday()))
                .collect(),
        ));
        columns.push(Column::numeric(
            APPOINTMENT_MONTH,
            appointment.iter().map(|a| f64::from(a.month())).collect(),
        ));

        let label_idx = layout.label.1;
        let labels = rows
            .iter()
            .map(|r| binarize(r.get(label_idx).unwrap_or_default()))
            .collect();

        let features = FeatureTable::new(columns)?;
        info!(
            "built {} feature rows x {} columns in {} ms",
            features.n_rows(),
            features.n_cols(),
            time::elapsed_ms(start)
        );
        Ok((features, labels))
    }
}

/// `"No"` maps to 0, every other value to 1.
pub fn binarize(value: &str) -> Label {
    if value == ATTENDED {
        0
    } else {
        1
    }
}

/// Parse an ISO-like timestamp; values without an offset are taken as UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn parse_column(table: &RawTable, column: &(String, usize)) -> NoShowResult<Vec<DateTime<Utc>>> {
    let (name, idx) = column;
    table
        .rows()
        .iter()
        .enumerate()
        .map(|(row, record)| {
            let cell = record.get(*idx).unwrap_or_default();
            parse_timestamp(cell).ok_or_else(|| {
                NoShowError::from(DataError::MalformedTimestamp {
                    column: name.clone(),
                    row,
                    value: cell.to_string(),
                })
            })
        })
        .collect()
}

fn resolve(schema: &RawSchema, header: &[String]) -> NoShowResult<Layout> {
    let position = |name: &str| -> NoShowResult<usize> {
        header
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| DataError::UnknownColumn(name.to_string()).into())
    };
    let single = |role: ColumnRole, what: &str| -> NoShowResult<(String, usize)> {
        let decl = schema
            .with_role(role)
            .next()
            .ok_or_else(|| DataError::UnknownColumn(format!("<{what}>")))?;
        Ok((decl.name.clone(), position(&decl.name)?))
    };

    let mut features = Vec::new();
    for decl in schema.columns() {
        let idx = position(&decl.name)?;
        if matches!(decl.role, ColumnRole::Numeric | ColumnRole::Categorical) {
            features.push((decl.name.clone(), idx, decl.role));
        }
    }
    features.sort_by_key(|(_, idx, _)| *idx);

    Ok(Layout {
        features,
        scheduled: single(ColumnRole::ScheduledTimestamp, "scheduled timestamp")?,
        appointment: single(ColumnRole::AppointmentTimestamp, "appointment timestamp")?,
        label: single(ColumnRole::Label, "label")?,
    })
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::data::domain::{ColumnDecl, RawRecord};
    use crate::features::domain::ColumnData;

    const HEADER: [&str; 15] = [
        "",
        "PatientId",
        "AppointmentID",
        "Gender",
        "ScheduledDay",
        "AppointmentDay",
        "Age",
        "Neighbourhood",
        "Scholarship",
        "Hipertension",
        "Diabetes",
        "Alcoholism",
        "Handcap",
        "SMS_received",
        "No-show",
    ];

    fn row(scheduled: &str, appointment: &str, label: &str) -> RawRecord {
        RawRecord::new(
            [
                "0", "29872499824296", "5642903", "F", scheduled, appointment, "62",
                "JARDIM DA PENHA", "0", "1", "0", "0", "0", "0", label,
            ]
            .iter()
            .map(|c| c.to_string())
            .collect(),
        )
    }

    fn table(rows: Vec<RawRecord>) -> RawTable {
        RawTable::new(HEADER.iter().map(|h| h.to_string()).collect(), rows).unwrap()
    }

    fn numeric<'a>(features: &'a FeatureTable, name: &str) -> &'a [f64] {
        match &features.column(name).unwrap().data {
            ColumnData::Numeric(v) => v,
            ColumnData::Categorical(_) => panic!("{name} is categorical"),
        }
    }

    #[test]
    fn derives_features_for_a_reference_row() {
        let raw = table(vec![row("2016-04-27T18:38:08Z", "2016-04-29T00:00:00Z", "No")]);
        let builder = FeatureBuilder::for_table(RawSchema::appointments(), &raw).unwrap();
        let (features, labels) = builder.build(&raw).unwrap();

        assert_eq!(
            features.names(),
            vec![
                "Gender",
                "Age",
                "Neighbourhood",
                "Scholarship",
                "Hipertension",
                "Diabetes",
                "Alcoholism",
                "Handcap",
                "SMS_received",
                DIFF_APPOINTMENT_SCHEDULED,
                APPOINTMENT_DAY_OF_WEEK,
                APPOINTMENT_MONTH,
            ]
        );
        // 1 day 5 h 21 min floors to 1 day; 2016-04-29 was a Friday.
        assert_eq!(numeric(&features, DIFF_APPOINTMENT_SCHEDULED), &[1.0]);
        assert_eq!(numeric(&features, APPOINTMENT_DAY_OF_WEEK), &[4.0]);
        assert_eq!(numeric(&features, APPOINTMENT_MONTH), &[4.0]);
        assert_eq!(labels, vec![0]);
    }

    #[test]
    fn same_day_rounding_is_clamped_to_zero() {
        let raw = table(vec![row("2016-04-29T18:38:08Z", "2016-04-29T00:00:00Z", "Yes")]);
        let builder = FeatureBuilder::for_table(RawSchema::appointments(), &raw).unwrap();
        let (features, labels) = builder.build(&raw).unwrap();
        assert_eq!(numeric(&features, DIFF_APPOINTMENT_SCHEDULED), &[0.0]);
        assert_eq!(labels, vec![1]);
    }

    #[test]
    fn larger_negative_differences_pass_through() {
        let raw = table(vec![row("2016-05-03T08:00:00Z", "2016-04-29T00:00:00Z", "No")]);
        let builder = FeatureBuilder::for_table(RawSchema::appointments(), &raw).unwrap();
        let (features, _) = builder.build(&raw).unwrap();
        assert_eq!(numeric(&features, DIFF_APPOINTMENT_SCHEDULED), &[-5.0]);
    }

    #[test]
    fn missing_declared_column_fails_at_construction() {
        let header: Vec<String> = HEADER
            .iter()
            .filter(|h| **h != "Age")
            .map(|h| h.to_string())
            .collect();
        let err = FeatureBuilder::new(RawSchema::appointments(), &header).unwrap_err();
        assert!(matches!(err, NoShowError::Data(DataError::UnknownColumn(c)) if c == "Age"));
    }

    #[test]
    fn schema_without_label_is_rejected() {
        let schema = RawSchema::new(vec![
            ColumnDecl::new("ScheduledDay", ColumnRole::ScheduledTimestamp),
            ColumnDecl::new("AppointmentDay", ColumnRole::AppointmentTimestamp),
        ]);
        let header: Vec<String> = HEADER.iter().map(|h| h.to_string()).collect();
        assert!(FeatureBuilder::new(schema, &header).is_err());
    }

    #[test]
    fn malformed_timestamp_reports_row() {
        let raw = table(vec![
            row("2016-04-27T18:38:08Z", "2016-04-29T00:00:00Z", "No"),
            row("yesterday", "2016-04-29T00:00:00Z", "No"),
        ]);
        let builder = FeatureBuilder::for_table(RawSchema::appointments(), &raw).unwrap();
        let err = builder.build(&raw).unwrap_err();
        assert!(matches!(
            err,
            NoShowError::Data(DataError::MalformedTimestamp { row: 1, ref column, .. })
                if column == "ScheduledDay"
        ));
    }

    #[test]
    fn label_mapping_is_total() {
        assert_eq!(binarize("No"), 0);
        assert_eq!(binarize("Yes"), 1);
        assert_eq!(binarize("no"), 1);
        assert_eq!(binarize(""), 1);
    }

    #[test]
    fn timestamp_formats() {
        let expected = parse_timestamp("2016-04-29T00:00:00Z").unwrap();
        assert_eq!(parse_timestamp("2016-04-29 00:00:00"), Some(expected));
        assert_eq!(parse_timestamp("2016-04-29T00:00:00"), Some(expected));
        assert_eq!(parse_timestamp("2016-04-29"), Some(expected));
        assert_eq!(parse_timestamp("29/04/2016"), None);
    }

    prop_compose! {
        fn appointment_row()(
            day in 0i64..730,
            lead_secs in -86_399i64..(120 * 86_400),
            label in prop_oneof![Just("No".to_string()), Just("Yes".to_string()), "[a-zA-Z]{0,4}"],
        ) -> RawRecord {
            let base = NaiveDate::from_ymd_opt(2015, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap().and_utc();
            let appointment = base + chrono::Duration::days(day);
            let scheduled = appointment - chrono::Duration::seconds(lead_secs);
            row(&scheduled.to_rfc3339(), &appointment.to_rfc3339(), &label)
        }
    }

    proptest! {
        #[test]
        fn derived_features_stay_in_range(rows in proptest::collection::vec(appointment_row(), 1..40)) {
            let raw = table(rows);
            let builder = FeatureBuilder::for_table(RawSchema::appointments(), &raw).unwrap();
            let (features, labels) = builder.build(&raw).unwrap();

            prop_assert!(features.column("ScheduledDay").is_none());
            prop_assert!(features.column("AppointmentDay").is_none());
            prop_assert!(numeric(&features, DIFF_APPOINTMENT_SCHEDULED).iter().all(|d| *d >= 0.0));
            prop_assert!(numeric(&features, APPOINTMENT_DAY_OF_WEEK).iter().all(|d| (0.0..=6.0).contains(d)));
            prop_assert!(numeric(&features, APPOINTMENT_MONTH).iter().all(|m| (1.0..=12.0).contains(m)));
            prop_assert_eq!(labels.len(), raw.len());
            for (record, label) in raw.rows().iter().zip(&labels) {
                let expected = if record.get(14) == Some("No") { 0 } else { 1 };
                prop_assert_eq!(*label, expected);
            }

            let (again, again_labels) = builder.build(&raw).unwrap();
            prop_assert_eq!(again, features);
            prop_assert_eq!(again_labels, labels);
        }
    }
}
