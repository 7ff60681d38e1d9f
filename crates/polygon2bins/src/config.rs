use clap::Parser;
use std::path::PathBuf;

/// `polygon2bins` - Split a GSHHS polygon file into a binned shoreline database.
///
/// Writes `<prefix>.bin`, `<prefix>.seg`, `<prefix>.pt` and `<prefix>.par`.
#[derive(Parser, Debug, Clone)]
#[command(name = "polygon2bins", version, about, long_about = None)]
pub struct Config {
    /// GSHHS binary polygon file.
    pub polygons: PathBuf,

    /// Bin size in degrees: 1, 2, 5, 10 or 20.
    pub bin_size: u32,

    /// Node-level raster with one node per bin corner.
    ///
    /// Must have exactly (360/bin_size + 1) x (180/bin_size + 1) nodes.
    pub nodes: PathBuf,

    /// Output prefix; the four files are `<prefix>.<ext>`.
    pub prefix: PathBuf,

    /// Read the written files back and check them.
    #[arg(long)]
    pub verify: bool,

    /// Log progress every N polygons.
    #[arg(long, env = "POLYGON2BINS_LOG_EVERY", default_value_t = 10_000)]
    pub log_every: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positional_order() {
        let cfg = Config::try_parse_from(["polygon2bins", "gshhs_f.b", "5", "nodes.nlvl", "out/bins_f", "--verify"])
            .unwrap();

        assert_eq!(cfg.polygons, PathBuf::from("gshhs_f.b"));
        assert_eq!(cfg.bin_size, 5);
        assert_eq!(cfg.nodes, PathBuf::from("nodes.nlvl"));
        assert_eq!(cfg.prefix, PathBuf::from("out/bins_f"));
        assert!(cfg.verify);
    }

    #[test]
    fn missing_arguments_fail() {
        assert!(Config::try_parse_from(["polygon2bins", "gshhs_f.b", "5"]).is_err());
        assert!(Config::try_parse_from(["polygon2bins", "gshhs_f.b", "five", "n", "p"]).is_err());
    }
}
