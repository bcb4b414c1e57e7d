use time::macros::format_description;
use tracing_subscriber::fmt::time::LocalTime;
use tracing_subscriber::EnvFilter;

pub fn setup_logging(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let timer = LocalTime::new(format_description!(
        "[year]-[month]-[day] [hour]:[minute]:[second]"
    ));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(timer)
        .with_target(false)
        .init();
}

pub fn format_number(num: usize) -> String {
    let digits = num.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

pub fn validate_args(args: &crate::args::Args) -> anyhow::Result<()> {
    if let Some(workers) = args.workers {
        if workers == 0 {
            anyhow::bail!("--workers must be greater than 0");
        }
    }

    if let (Some(start), Some(end)) = (args.start, args.end) {
        if start > end {
            anyhow::bail!("--start ({}) cannot be after --end ({})", start, end);
        }
    }

    let is_kml = args
        .input
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("kml"));
    if !is_kml {
        anyhow::bail!("The file '{}' is not a KML file", args.input.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::Args;
    use clap::Parser;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1234567), "1,234,567");
    }

    #[test]
    fn test_validate_args() {
        assert!(validate_args(&Args::parse_from(["placemap", "trip.kml"])).is_ok());
        assert!(validate_args(&Args::parse_from(["placemap", "trip.KML"])).is_ok());
        assert!(validate_args(&Args::parse_from(["placemap", "trip.csv"])).is_err());
        assert!(validate_args(&Args::parse_from(["placemap", "-w", "0"])).is_err());
        assert!(validate_args(&Args::parse_from([
            "placemap",
            "--start",
            "10.01.2024",
            "--end",
            "01.01.2024"
        ]))
        .is_err());
    }
}
