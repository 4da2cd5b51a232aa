//! Manifest CSV files.
//!
//! Columns are positional:
//! `pulsar,utc_obs,project_id,band,duration,ephemeris_path,template_path`.
//! The last two are optional. A first row whose first field is `pulsar` is a
//! header and is skipped.

use std::path::Path;

use meerpipe_types::{Band, ObsUtc, ObservationJob};

use crate::error::{PipelineError, Result};

const COLUMNS: [&str; 7] = [
    "pulsar",
    "utc_obs",
    "project_id",
    "band",
    "duration",
    "ephemeris_path",
    "template_path",
];

/// One manifest row.
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestRow {
    pub pulsar: String,
    pub utc: ObsUtc,
    pub project_id: String,
    pub band: Band,
    pub duration_secs: f64,
    pub ephemeris: Option<String>,
    pub template: Option<String>,
}

/// A row that could not be parsed. The rest of the file is unaffected.
#[derive(Debug)]
pub struct InvalidRow {
    pub line: u64,
    pub error: PipelineError,
}

/// The parsed rows of a manifest plus the ones that were rejected.
#[derive(Debug, Default)]
pub struct Manifest {
    pub rows: Vec<ManifestRow>,
    pub invalid: Vec<InvalidRow>,
}

/// Read every row of a manifest file.
///
/// Only an unreadable file is an error; a malformed row is reported in
/// [`Manifest::invalid`] with its line number.
pub fn read_manifest(path: &Path) -> Result<Manifest> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .from_path(path)
        .map_err(|e| PipelineError::Selection(format!("cannot read manifest {}: {e}", path.display())))?;

    let mut manifest = Manifest::default();
    for (i, record) in reader.records().enumerate() {
        let invalid = |line: u64, reason: String| InvalidRow {
            line,
            error: PipelineError::Selection(format!("{} line {line}: {reason}", path.display())),
        };
        let record = match record {
            Ok(record) => record,
            Err(e) if matches!(e.kind(), csv::ErrorKind::Io(_)) => {
                return Err(PipelineError::Selection(format!(
                    "cannot read manifest {}: {e}",
                    path.display()
                )));
            }
            Err(e) => {
                let line = e.position().map(|p| p.line()).unwrap_or(i as u64 + 1);
                manifest
                    .invalid
                    .push(invalid(line, format!("malformed record: {e}")));
                continue;
            }
        };
        let line = record.position().map(|p| p.line()).unwrap_or(i as u64 + 1);

        if i == 0 && record.get(0).is_some_and(|f| f.eq_ignore_ascii_case("pulsar")) {
            continue;
        }
        if record.iter().all(str::is_empty) {
            continue;
        }

        match parse_row(&record) {
            Ok(row) => manifest.rows.push(row),
            Err(reason) => manifest.invalid.push(invalid(line, reason)),
        }
    }
    Ok(manifest)
}

fn parse_row(record: &csv::StringRecord) -> std::result::Result<ManifestRow, String> {
    if record.len() < 5 || record.len() > COLUMNS.len() {
        return Err(format!(
            "expected 5 to {} fields, found {}",
            COLUMNS.len(),
            record.len()
        ));
    }
    let field = |i: usize| record.get(i).unwrap_or("");

    let pulsar = field(0);
    if pulsar.is_empty() {
        return Err("empty pulsar name".to_string());
    }
    let utc = ObsUtc::parse(field(1)).map_err(|e| e.to_string())?;
    let duration_secs: f64 = field(4)
        .parse()
        .map_err(|_| format!("duration '{}' is not a number", field(4)))?;
    if !duration_secs.is_finite() || duration_secs <= 0.0 {
        return Err(format!("duration must be positive, got {duration_secs}"));
    }
    let optional = |i: usize| record.get(i).filter(|v| !v.is_empty()).map(str::to_string);

    Ok(ManifestRow {
        pulsar: pulsar.to_string(),
        utc,
        project_id: field(2).to_string(),
        band: Band::from(field(3).to_string()),
        duration_secs,
        ephemeris: optional(5),
        template: optional(6),
    })
}

/// Write resolved jobs in manifest form, header row included.
pub fn write_manifest(path: &Path, jobs: &[ObservationJob]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| PipelineError::Selection(format!("cannot write {}: {e}", path.display())))?;
    let to_err = |e: csv::Error| PipelineError::Selection(format!("cannot write {}: {e}", path.display()));

    writer.write_record(COLUMNS).map_err(to_err)?;
    for job in jobs {
        writer
            .write_record([
                job.pulsar.clone(),
                job.utc.to_string(),
                job.project_code.clone(),
                job.band.to_string(),
                job.duration_secs.to_string(),
                job.ephemeris.display().to_string(),
                job.template.display().to_string(),
            ])
            .map_err(to_err)?;
    }
    writer.flush().map_err(|e| PipelineError::io(path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join("jobs.csv");
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_read_row_without_header() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "J0437-4715,2021-01-01-00:00:00,P001,UHF,64,/eph/J0437.par,/tmpl/J0437.std\n",
        );
        let rows = read_manifest(&path).unwrap().rows;
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.pulsar, "J0437-4715");
        assert_eq!(row.band, Band::Uhf);
        assert_eq!(row.duration_secs, 64.0);
        assert_eq!(row.ephemeris.as_deref(), Some("/eph/J0437.par"));
        assert_eq!(row.template.as_deref(), Some("/tmpl/J0437.std"));
    }

    #[test]
    fn test_header_row_skipped_and_optional_columns() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "pulsar,utc_obs,project_id,band,duration\n\
             J1909-3744,2021-02-01-00:00:00,PTA,LBAND,256\n\
             J1909-3744,2021-02-02-00:00:00,PTA,LBAND,128,,\n",
        );
        let rows = read_manifest(&path).unwrap().rows;
        assert_eq!(rows.len(), 2);
        assert!(rows[0].ephemeris.is_none());
        assert!(rows[1].template.is_none());
    }

    #[test]
    fn test_malformed_row_rejected_alone() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "J0437-4715,2021-01-01-00:00:00,P001,UHF,64\n\
             J1909-3744,not-a-time,PTA,LBAND,256\n\
             J1713+0747,2021-03-01-00:00:00,PTA,LBAND,128\n",
        );
        let manifest = read_manifest(&path).unwrap();
        let pulsars: Vec<&str> = manifest.rows.iter().map(|r| r.pulsar.as_str()).collect();
        assert_eq!(pulsars, vec!["J0437-4715", "J1713+0747"]);

        assert_eq!(manifest.invalid.len(), 1);
        let invalid = &manifest.invalid[0];
        assert_eq!(invalid.line, 2);
        assert!(matches!(invalid.error, PipelineError::Selection(_)));
        assert!(invalid.error.to_string().contains("line 2"), "{}", invalid.error);
    }

    #[test]
    fn test_short_row_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "J1909-3744,2021-02-01-00:00:00,PTA\n");
        let manifest = read_manifest(&path).unwrap();
        assert!(manifest.rows.is_empty());
        assert_eq!(manifest.invalid.len(), 1);
    }

    #[test]
    fn test_nonpositive_duration_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "J1909-3744,2021-02-01-00:00:00,PTA,LBAND,0\n");
        let manifest = read_manifest(&path).unwrap();
        assert!(manifest.invalid[0].error.to_string().contains("positive"));
    }

    #[test]
    fn test_missing_file_is_error() {
        let dir = TempDir::new().unwrap();
        let err = read_manifest(&dir.path().join("absent.csv")).unwrap_err();
        assert!(matches!(err, PipelineError::Selection(_)));
    }

    #[test]
    fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let job = ObservationJob {
            pulsar: "J0437-4715".into(),
            utc: ObsUtc::parse("2021-01-01-00:00:00").unwrap(),
            project_code: "PTA".into(),
            band: Band::LBand,
            duration_secs: 64.0,
            ephemeris: "/eph/PTA/J0437-4715.par".into(),
            template: "/tmpl/PTA/LBAND/J0437-4715.std".into(),
        };
        let path = dir.path().join("processing_jobs.csv");
        write_manifest(&path, &[job.clone()]).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("pulsar,utc_obs,"));

        let rows = read_manifest(&path).unwrap().rows;
        assert_eq!(rows[0].utc, job.utc);
        assert_eq!(rows[0].ephemeris.as_deref(), Some("/eph/PTA/J0437-4715.par"));
    }
}
