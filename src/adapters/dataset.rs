//! CSV training data.
//!
//! Column layout, one row per patient:
//!
//! `PatientID, Age, Gender, HR, O2Sat, Temp, SBP, MAP, DBP, Resp, WBC,
//! Platelets, Creatinine, Lactate, SepsisLabel`
//!
//! `PatientID`, `Age`, `Gender` and `SepsisLabel` may be empty. Gender is
//! encoded as 1 = male, 0 = female. Column order in the file does not matter
//! when reading; headers are matched by name.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::{BaseMeasurement, Demographics, Gender, LabeledRecord, PatientRecord};
use crate::{Result, SepsisError};

/// One dataset row: a patient and, for training data, the outcome.
#[derive(Debug, Clone)]
pub struct DatasetRecord {
    pub patient: PatientRecord,
    pub label: Option<bool>,
}

impl DatasetRecord {
    #[must_use]
    pub fn labeled(patient: PatientRecord, label: bool) -> Self {
        Self {
            patient,
            label: Some(label),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CsvRow {
    #[serde(rename = "PatientID", default)]
    patient_id: Option<String>,
    #[serde(rename = "Age", default)]
    age: Option<f64>,
    #[serde(rename = "Gender", default)]
    gender: Option<u8>,
    #[serde(rename = "HR")]
    heart_rate: f64,
    #[serde(rename = "O2Sat")]
    o2_sat: f64,
    #[serde(rename = "Temp")]
    temperature: f64,
    #[serde(rename = "SBP")]
    sbp: f64,
    #[serde(rename = "MAP")]
    map: f64,
    #[serde(rename = "DBP")]
    dbp: f64,
    #[serde(rename = "Resp")]
    resp_rate: f64,
    #[serde(rename = "WBC")]
    wbc: f64,
    #[serde(rename = "Platelets")]
    platelets: f64,
    #[serde(rename = "Creatinine")]
    creatinine: f64,
    #[serde(rename = "Lactate")]
    lactate: f64,
    #[serde(rename = "SepsisLabel", default)]
    label: Option<u8>,
}

impl CsvRow {
    fn into_record(self, line: usize) -> Result<DatasetRecord> {
        let measurement = BaseMeasurement {
            heart_rate: self.heart_rate,
            temperature: self.temperature,
            resp_rate: self.resp_rate,
            o2_sat: self.o2_sat,
            sbp: self.sbp,
            dbp: self.dbp,
            map: self.map,
            wbc: self.wbc,
            platelets: self.platelets,
            creatinine: self.creatinine,
            lactate: self.lactate,
        };
        measurement
            .ensure_finite()
            .map_err(|e| SepsisError::Dataset(format!("line {line}: {e}")))?;

        let gender = match self.gender {
            None => None,
            Some(code) => Some(Gender::from_code(code).ok_or_else(|| {
                SepsisError::Dataset(format!("line {line}: unknown gender code {code}"))
            })?),
        };
        let label = match self.label {
            None => None,
            Some(0) => Some(false),
            Some(1) => Some(true),
            Some(other) => {
                return Err(SepsisError::Dataset(format!(
                    "line {line}: SepsisLabel must be 0 or 1, got {other}"
                )))
            }
        };

        Ok(DatasetRecord {
            patient: PatientRecord {
                id: self.patient_id.filter(|id| !id.is_empty()),
                measurement,
                demographics: Demographics {
                    age: self.age,
                    gender,
                },
            },
            label,
        })
    }

    fn from_record(record: &DatasetRecord) -> Self {
        let m = &record.patient.measurement;
        let d = &record.patient.demographics;
        Self {
            patient_id: record.patient.id.clone(),
            age: d.age,
            gender: d.gender.map(Gender::code),
            heart_rate: m.heart_rate,
            o2_sat: m.o2_sat,
            temperature: m.temperature,
            sbp: m.sbp,
            map: m.map,
            dbp: m.dbp,
            resp_rate: m.resp_rate,
            wbc: m.wbc,
            platelets: m.platelets,
            creatinine: m.creatinine,
            lactate: m.lactate,
            label: record.label.map(u8::from),
        }
    }
}

fn csv_error(e: csv::Error) -> SepsisError {
    SepsisError::Dataset(e.to_string())
}

/// Read every row from a CSV source.
///
/// # Errors
/// Returns [`SepsisError::Dataset`] for a missing column, an unparsable or
/// non-finite value, or an invalid gender/label code.
pub fn read_from<R: Read>(reader: R) -> Result<Vec<DatasetRecord>> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut records = Vec::new();
    for (i, row) in rdr.deserialize::<CsvRow>().enumerate() {
        // Header is line 1.
        let row = row.map_err(csv_error)?;
        records.push(row.into_record(i + 2)?);
    }
    Ok(records)
}

/// Read a CSV file.
///
/// # Errors
/// See [`read_from`]; also fails if the file cannot be opened.
pub fn read_csv<P: AsRef<Path>>(path: P) -> Result<Vec<DatasetRecord>> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let records = read_from(file)?;
    tracing::info!("Read {} records from {:?}", records.len(), path);
    Ok(records)
}

/// Write rows with the standard header.
///
/// # Errors
/// Returns [`SepsisError::Dataset`] if a row cannot be written.
pub fn write_to<W: Write>(writer: W, records: &[DatasetRecord]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for record in records {
        wtr.serialize(CsvRow::from_record(record)).map_err(csv_error)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write a CSV file, replacing any existing one.
///
/// # Errors
/// See [`write_to`]; also fails if the file cannot be created.
pub fn write_csv<P: AsRef<Path>>(path: P, records: &[DatasetRecord]) -> Result<()> {
    let path = path.as_ref();
    write_to(File::create(path)?, records)?;
    tracing::info!("Wrote {} records to {:?}", records.len(), path);
    Ok(())
}

/// Training view of a dataset. Every row must carry a label.
///
/// # Errors
/// Returns [`SepsisError::Dataset`] naming the first unlabeled row.
pub fn labeled_records(records: &[DatasetRecord]) -> Result<Vec<LabeledRecord>> {
    records
        .iter()
        .enumerate()
        .map(|(i, r)| {
            r.label
                .map(|label| LabeledRecord::new(r.patient.measurement, label))
                .ok_or_else(|| SepsisError::Dataset(format!("record {i} has no SepsisLabel")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::measurement::fixtures;

    const SAMPLE: &str = "\
PatientID,Age,Gender,HR,O2Sat,Temp,SBP,MAP,DBP,Resp,WBC,Platelets,Creatinine,Lactate,SepsisLabel
P0001,54,1,75,98,36.8,125,92,75,14,7.2,240,0.9,1.1,0
P0002,71,0,118,89,38.8,85,63,52,26,16.5,95,2.3,4.2,1
";

    #[test]
    fn test_reads_standard_columns() {
        let records = read_from(SAMPLE.as_bytes()).expect("Should parse");
        assert_eq!(records.len(), 2);

        let first = &records[0];
        assert_eq!(first.patient.id.as_deref(), Some("P0001"));
        assert_eq!(first.patient.measurement, fixtures::stable());
        assert_eq!(first.patient.demographics.gender, Some(Gender::Male));
        assert_eq!(first.label, Some(false));

        let second = &records[1];
        assert_eq!(second.patient.measurement, fixtures::septic());
        assert_eq!(second.patient.demographics.age, Some(71.0));
        assert_eq!(second.label, Some(true));
    }

    #[test]
    fn test_optional_columns_may_be_absent() {
        let csv = "HR,O2Sat,Temp,SBP,MAP,DBP,Resp,WBC,Platelets,Creatinine,Lactate\n\
                   75,98,36.8,125,92,75,14,7.2,240,0.9,1.1\n";
        let records = read_from(csv.as_bytes()).unwrap();
        assert_eq!(records[0].label, None);
        assert_eq!(records[0].patient.id, None);
        assert!(labeled_records(&records).is_err());
    }

    #[test]
    fn test_missing_column_is_dataset_error() {
        let csv = "HR,O2Sat\n75,98\n";
        assert!(matches!(read_from(csv.as_bytes()), Err(SepsisError::Dataset(_))));
    }

    #[test]
    fn test_non_finite_value_names_the_line() {
        let csv = SAMPLE.replace("P0002,71,0,118", "P0002,71,0,NaN");
        match read_from(csv.as_bytes()) {
            Err(SepsisError::Dataset(msg)) => assert!(msg.contains("line 3"), "{msg}"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_invalid_label_is_rejected() {
        let csv = SAMPLE.replace("1.1,0\n", "1.1,2\n");
        assert!(matches!(read_from(csv.as_bytes()), Err(SepsisError::Dataset(_))));
    }

    #[test]
    fn test_write_then_read_preserves_records() {
        let records = read_from(SAMPLE.as_bytes()).unwrap();
        let mut buf = Vec::new();
        write_to(&mut buf, &records).unwrap();

        let text = String::from_utf8(buf.clone()).unwrap();
        assert!(text.starts_with("PatientID,Age,Gender,HR,O2Sat,Temp"));

        let back = read_from(buf.as_slice()).unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(back[1].patient.measurement, records[1].patient.measurement);
        assert_eq!(back[1].label, Some(true));
    }

    #[test]
    fn test_labeled_records() {
        let records = read_from(SAMPLE.as_bytes()).unwrap();
        let labeled = labeled_records(&records).unwrap();
        assert_eq!(labeled.len(), 2);
        assert!(!labeled[0].label);
        assert!(labeled[1].label);
    }
}
