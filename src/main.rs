//! Nodal - circuit simulator command line
//!
//! Runs one analysis on a JSON netlist and prints the results as JSON.
//!
//! # Usage
//!
//! ```bash
//! nodal divider.json dc
//! nodal rc.json tran --stop 5m --points 100 --probe out
//! nodal rc.json ac --source V1 --start 1 --stop 100k --per-decade 20
//! RUST_LOG=nodal_core=debug nodal rc.json tran --stop 5m
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use nodal_core::{
    error::{NodalError, Result},
    parse_number, AcRequest, Circuit, Netlist, Simulator, SimulatorConfig, TransientRequest,
};

/// Circuit simulator: DC, transient and AC analysis of JSON netlists
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the netlist file (.json)
    #[arg(value_name = "NETLIST")]
    netlist: PathBuf,

    /// Relative tolerance
    #[arg(long, global = true, value_parser = engineering)]
    reltol: Option<f64>,

    /// LTE tolerance multiplier for transient step control
    #[arg(long, global = true, value_parser = engineering)]
    lte_rel: Option<f64>,

    /// Pretty-print the JSON output
    #[arg(long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    analysis: Analysis,
}

#[derive(Subcommand, Debug)]
enum Analysis {
    /// DC operating point
    Dc,

    /// Transient analysis
    Tran {
        /// Start time in seconds
        #[arg(long, default_value = "0", value_parser = engineering)]
        start: f64,

        /// Stop time in seconds
        #[arg(long, value_parser = engineering)]
        stop: f64,

        /// Minimum number of points per source period
        #[arg(long, default_value_t = 100)]
        points: usize,

        /// Node whose accuracy is always checked (repeatable)
        #[arg(long = "probe", value_name = "NODE")]
        probes: Vec<String>,

        /// Start from zero instead of the DC operating point
        #[arg(long)]
        no_dc: bool,
    },

    /// Small-signal AC sweep
    Ac {
        /// Name of the source to excite
        #[arg(long)]
        source: String,

        /// Start frequency in Hz
        #[arg(long, value_parser = engineering)]
        start: f64,

        /// Stop frequency in Hz
        #[arg(long, value_parser = engineering)]
        stop: f64,

        /// Points per decade
        #[arg(long, default_value_t = 10)]
        per_decade: usize,
    },
}

/// Accept numbers in engineering notation, e.g. `10k` or `5m`.
fn engineering(text: &str) -> std::result::Result<f64, String> {
    parse_number(text).ok_or_else(|| format!("'{}' is not a number", text))
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let text = std::fs::read_to_string(&args.netlist).map_err(|source| NodalError::FileReadError {
        path: args.netlist.display().to_string(),
        source,
    })?;

    let mut config = SimulatorConfig::new();
    if let Some(reltol) = args.reltol {
        config = config.with_reltol(reltol);
    }
    if let Some(lte_rel) = args.lte_rel {
        config = config.with_lte_rel(lte_rel);
    }

    let netlist = Netlist::from_json(&text)?;
    let circuit = Circuit::from_netlist(&netlist)?;
    let mut simulator = Simulator::with_config(circuit, config)?;

    let output = match args.analysis {
        Analysis::Dc => serde_json::to_value(simulator.dc()?)?,
        Analysis::Tran {
            start,
            stop,
            points,
            probes,
            no_dc,
        } => {
            let request = TransientRequest::new(points, start, stop)
                .with_probes(probes)
                .skip_initial_dc(no_dc);
            serde_json::to_value(simulator.transient(&request)?)?
        }
        Analysis::Ac {
            source,
            start,
            stop,
            per_decade,
        } => {
            let request = AcRequest::new(per_decade, start, stop, source);
            serde_json::to_value(simulator.ac(&request)?)?
        }
    };

    let json = if args.pretty {
        serde_json::to_string_pretty(&output)?
    } else {
        serde_json::to_string(&output)?
    };
    println!("{}", json);

    Ok(())
}
