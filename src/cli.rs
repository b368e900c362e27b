//! Command-line interface definitions.
//!
//! Every option can also come from the environment.

use clap::Parser;

/// Collect booking, blog, and receipt reviews for one or more businesses.
///
/// # Examples
///
/// ```sh
/// # Two businesses, default settings
/// review_harvest -j ./json 1234567 7654321
///
/// # Custom settings file, Hangul-only blog bodies
/// review_harvest -j ./json -c harvest.yaml --korean-only 1234567
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Business ids to collect reviews for
    #[arg(required = true)]
    pub entity_ids: Vec<String>,

    /// Output directory for the per-source JSON files
    #[arg(short, long)]
    pub json_output_dir: String,

    /// Optional path to a YAML settings file
    #[arg(short, long, env = "REVIEW_HARVEST_CONFIG")]
    pub config: Option<String>,

    /// Keep only Hangul text in extracted blog post bodies
    #[arg(long, env = "REVIEW_HARVEST_KOREAN_ONLY")]
    pub korean_only: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from([
            "review_harvest",
            "--json-output-dir",
            "./json",
            "1234567",
            "7654321",
        ]);

        assert_eq!(cli.json_output_dir, "./json");
        assert_eq!(cli.entity_ids, vec!["1234567", "7654321"]);
        assert!(!cli.korean_only);
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_cli_short_flags() {
        let cli = Cli::parse_from([
            "review_harvest",
            "-j",
            "/tmp/json",
            "-c",
            "/tmp/harvest.yaml",
            "--korean-only",
            "42",
        ]);

        assert_eq!(cli.json_output_dir, "/tmp/json");
        assert_eq!(cli.config.as_deref(), Some("/tmp/harvest.yaml"));
        assert!(cli.korean_only);
        assert_eq!(cli.entity_ids, vec!["42"]);
    }

    #[test]
    fn test_cli_requires_an_entity_id() {
        assert!(Cli::try_parse_from(["review_harvest", "-j", "./json"]).is_err());
    }
}
