//! Timing residuals from `tempo2`.
//!
//! The `.tim` file is run through `tempo2 -output general2` without fitting.
//! Residual lines are tagged with `BLAH` so they can be picked out of the
//! rest of tempo2's chatter. Column layout of the written files is fixed;
//! downstream portals parse them positionally.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use meerpipe_config::ToolsConfig;

use crate::command::ToolCommand;
use crate::error::{PipelineError, Result};

const LINE_TAG: &str = "BLAH";
const GENERAL2_FORMAT: &str = "{bat} {post} {err} {freq} {post_phase} BLAH\n";

const MJD_J2000: f64 = 51544.5;
const DAYS_PER_YEAR: f64 = 365.25;

/// One residual, in seconds unless noted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Residual {
    pub mjd: f64,
    pub doy: f64,
    pub res: f64,
    /// Residual in turns of phase.
    pub res_phase: f64,
    pub err: f64,
    pub err_phase: f64,
    /// Observing frequency, MHz.
    pub freq: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResidualStats {
    pub count: usize,
    pub weighted_mean: f64,
    pub weighted_rms: f64,
}

pub fn tempo2_command(tools: &ToolsConfig, ephemeris: &Path, tim: &Path) -> Result<ToolCommand> {
    ToolCommand::new(&tools.tempo2)
        .args(["-nofit", "-set", "START", "40000", "-set", "FINISH", "99999"])
        .args(["-output", "general2", "-s", GENERAL2_FORMAT])
        .args(["-nobs", "1000000", "-npsr", "1", "-f"])
        .input(ephemeris)?
        .input(tim)
}

/// Parse the tagged lines of tempo2's general2 output.
///
/// Each tagged line carries `mjd residual error(µs) freq residual_phase`.
pub fn parse_general2(output: &str) -> Result<Vec<Residual>> {
    output
        .lines()
        .filter(|line| line.contains(LINE_TAG))
        .map(parse_line)
        .collect()
}

fn parse_line(line: &str) -> Result<Residual> {
    let bad = || PipelineError::ToolOutput {
        tool: "tempo2".to_string(),
        message: format!("unparseable residual line: {}", line.trim()),
    };
    let fields: Vec<f64> = line
        .split_whitespace()
        .take(5)
        .map(|f| f.parse::<f64>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|_| bad())?;
    let [mjd, res, err_us, freq, res_phase] = fields[..] else {
        return Err(bad());
    };
    let err = err_us * 1e-6;

    Ok(Residual {
        mjd,
        doy: day_of_year(mjd),
        res,
        res_phase,
        err,
        err_phase: phase_error(res, err, res_phase),
        freq,
    })
}

/// Fractional day of the Julian year an MJD falls in.
pub fn day_of_year(mjd: f64) -> f64 {
    let jyear = 2000.0 + (mjd - MJD_J2000) / DAYS_PER_YEAR;
    DAYS_PER_YEAR * jyear.rem_euclid(1.0)
}

/// Error in phase units, scaled by the residual's seconds-to-phase ratio.
pub fn phase_error(res: f64, err: f64, res_phase: f64) -> f64 {
    if res == 0.0 {
        return 0.0;
    }
    (res_phase / res) * err
}

/// Weighted mean and RMS with weights `1 / err²`.
pub fn weighted_stats(residuals: &[Residual]) -> Option<ResidualStats> {
    let (mut sw, mut swr, mut swr2) = (0.0, 0.0, 0.0);
    for r in residuals.iter().filter(|r| r.err > 0.0) {
        let w = 1.0 / (r.err * r.err);
        sw += w;
        swr += w * r.res;
        swr2 += w * r.res * r.res;
    }
    if sw == 0.0 {
        return None;
    }
    Some(ResidualStats {
        count: residuals.len(),
        weighted_mean: swr / sw,
        weighted_rms: (swr2 / sw).sqrt(),
    })
}

/// Write `{stem}_res.txt` and `{stem}_res_comp.txt` into `dir`.
///
/// Columns: mjd, doy, res, res_phase, err, err_phase, freq.
pub fn write_residual_files(
    dir: &Path,
    stem: &str,
    residuals: &[Residual],
) -> Result<(PathBuf, PathBuf)> {
    let mut raw = String::new();
    let mut comp = String::new();
    for r in residuals {
        let _ = writeln!(
            raw,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            r.mjd, r.doy, r.res, r.res_phase, r.err, r.err_phase, r.freq
        );
        let _ = writeln!(
            comp,
            "{:12.6}\t{:9.6}\t{}\t{}\t{}\t{}\t{:9.4}",
            r.mjd,
            r.doy,
            sci(r.res, 4),
            sci(r.res_phase, 4),
            sci(r.err, 2),
            sci(r.err_phase, 2),
            r.freq
        );
    }

    let raw_path = dir.join(format!("{stem}_res.txt"));
    let comp_path = dir.join(format!("{stem}_res_comp.txt"));
    fs::write(&raw_path, raw).map_err(|e| PipelineError::io(&raw_path, e))?;
    fs::write(&comp_path, comp).map_err(|e| PipelineError::io(&comp_path, e))?;
    Ok((raw_path, comp_path))
}

/// Scientific notation with a signed, two-digit exponent (`1.2346e-05`).
fn sci(value: f64, precision: usize) -> String {
    let s = format!("{value:.precision$e}");
    let Some((mantissa, exp)) = s.split_once('e') else {
        return s;
    };
    let (sign, digits) = match exp.strip_prefix('-') {
        Some(d) => ('-', d),
        None => ('+', exp),
    };
    format!("{mantissa}e{sign}{digits:0>2}")
}
