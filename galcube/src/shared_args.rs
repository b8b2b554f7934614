use clap::Parser;
use std::path::PathBuf;

use crate::config::BeamInfo;
use crate::generator::{CancelToken, GenerateOptions};
use crate::profile::VerticalProfileKind;

/// Parse a beam string in format "bmin,bmaj,bpa"
pub fn parse_beam(s: &str) -> Result<BeamInfo, String> {
    let parts: Vec<&str> = s.split(',').collect();
    if parts.len() != 3 {
        return Err("Beam must be in format 'bmin,bmaj,bpa'".to_string());
    }

    let bmin = parts[0]
        .trim()
        .parse::<f64>()
        .map_err(|_| "Invalid bmin value".to_string())?;
    let bmaj = parts[1]
        .trim()
        .parse::<f64>()
        .map_err(|_| "Invalid bmaj value".to_string())?;
    let bpa = parts[2]
        .trim()
        .parse::<f64>()
        .map_err(|_| "Invalid bpa value".to_string())?;

    let beam = BeamInfo::new(bmin, bmaj, bpa);
    beam.validate().map_err(|e| e.to_string())?;
    Ok(beam)
}

/// Parse a vertical profile name: "exponential" or "sech2"
pub fn parse_vertical(s: &str) -> Result<VerticalProfileKind, String> {
    match s.to_ascii_lowercase().as_str() {
        "exponential" | "exp" => Ok(VerticalProfileKind::Exponential),
        "sech2" => Ok(VerticalProfileKind::Sech2),
        other => Err(format!(
            "Unknown vertical profile '{other}', expected exponential or sech2"
        )),
    }
}

/// Common arguments shared by every cube-generating command
#[derive(Parser, Debug, Clone)]
pub struct SharedCubeArgs {
    /// Number of cubes to generate
    #[arg(long, default_value_t = 1)]
    pub n_cubes: usize,

    /// Number of galaxies per system, primary included
    #[arg(long, default_value_t = 1)]
    pub n_gals: usize,

    /// Batch seed; omit for fresh random draws on every run
    #[arg(long)]
    pub seed: Option<u64>,

    /// Beam as "bmin,bmaj,bpa" (FWHM in spatial units, PA in degrees); "0,0,0" disables it
    #[arg(long, value_parser = parse_beam)]
    pub beam: Option<BeamInfo>,

    /// Vertical disk profile (exponential or sech2)
    #[arg(long, default_value = "exponential", value_parser = parse_vertical)]
    pub vertical: VerticalProfileKind,

    /// Write the metadata of every cube to this JSON file
    #[arg(long)]
    pub summary_json: Option<PathBuf>,

    /// Generate cubes serially instead of in parallel
    #[arg(long, default_value_t = false)]
    pub serial: bool,
}

impl SharedCubeArgs {
    /// Execution options for the requested mode
    pub fn generate_options(&self) -> GenerateOptions {
        GenerateOptions {
            parallel: !self.serial,
            cancel: CancelToken::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_beam() {
        assert_eq!(parse_beam("3, 4, 30"), Ok(BeamInfo::new(3.0, 4.0, 30.0)));
        assert_eq!(parse_beam("0,0,0"), Ok(BeamInfo::none()));
        assert!(parse_beam("3,4").is_err());
        assert!(parse_beam("5,4,0").is_err());
        assert!(parse_beam("a,4,0").is_err());
    }

    #[test]
    fn test_parse_vertical() {
        assert_eq!(parse_vertical("Sech2"), Ok(VerticalProfileKind::Sech2));
        assert_eq!(parse_vertical("exp"), Ok(VerticalProfileKind::Exponential));
        assert!(parse_vertical("gaussian").is_err());
    }

    #[test]
    fn test_shared_args_flatten() {
        #[derive(Parser)]
        struct Args {
            #[command(flatten)]
            shared: SharedCubeArgs,
        }

        let args = Args::parse_from([
            "test", "--n-cubes", "4", "--seed", "9", "--beam", "2,3,10", "--serial",
        ]);
        assert_eq!(args.shared.n_cubes, 4);
        assert_eq!(args.shared.seed, Some(9));
        assert_eq!(args.shared.beam, Some(BeamInfo::new(2.0, 3.0, 10.0)));
        assert!(!args.shared.generate_options().parallel);
        assert_eq!(args.shared.vertical, VerticalProfileKind::Exponential);
    }
}
