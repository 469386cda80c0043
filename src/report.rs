//! Plain text reports of a fit and CSV export of traces.

use std::{
    fmt,
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use itertools::Itertools;
use tracing::{info, warn};

use crate::{
    data::{ColumnSummary, DataSummary},
    summary::{credible_interval, gelman_rubin, summarize, ChainSummary, QUANTILE_PROBS},
    trace::{Chain, Param, Trace},
};

/// R-hat values above this are reported as a convergence problem.
pub const RHAT_WARNING_THRESHOLD: f64 = 1.1;

fn write_column(f: &mut fmt::Formatter<'_>, name: &str, col: &ColumnSummary) -> fmt::Result {
    writeln!(
        f,
        "{:>8} {:>10.3} {:>10.3} {:>10.3} {:>10.3} {:>10.3} {:>10.3} {:>10.3}",
        name,
        col.mean,
        col.sd,
        col.min,
        col.first_quartile,
        col.median,
        col.third_quartile,
        col.max
    )
}

impl fmt::Display for DataSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} observations", self.n)?;
        writeln!(
            f,
            "{:>8} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10}",
            "", "mean", "sd", "min", "25%", "50%", "75%", "max"
        )?;
        write_column(f, "height", &self.height)?;
        write_column(f, "weight", &self.weight)?;
        write!(f, "correlation: {:.4}", self.correlation)
    }
}

/// Two tables in the usual MCMC summary layout: moments with standard
/// errors, then quantiles.
impl fmt::Display for ChainSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "chain {}, {} draws", self.chain_id, self.num_draws)?;
        writeln!(
            f,
            "{:>6} {:>12} {:>12} {:>12} {:>12} {:>10}",
            "", "mean", "sd", "naive se", "ts se", "ess"
        )?;
        for p in &self.params {
            writeln!(
                f,
                "{:>6} {:>12.4} {:>12.4} {:>12.4} {:>12.4} {:>10.1}",
                p.param, p.mean, p.sd, p.naive_se, p.time_series_se, p.ess
            )?;
        }
        let header = QUANTILE_PROBS
            .iter()
            .map(|prob| format!("{:>12}", format!("{:.1}%", prob * 100.)))
            .join(" ");
        write!(f, "{:>6} {}", "", header)?;
        for p in &self.params {
            let row = p.quantiles.iter().map(|q| format!("{:>12.4}", q)).join(" ");
            write!(f, "\n{:>6} {}", p.param, row)?;
        }
        Ok(())
    }
}

/// R-hat of every parameter.
///
/// Parameters above [`RHAT_WARNING_THRESHOLD`] are logged as warnings.
pub fn convergence(trace: &Trace) -> crate::Result<Vec<(Param, f64)>> {
    Param::ALL
        .iter()
        .map(|&param| {
            let rhat = gelman_rubin(trace, param)?;
            if rhat > RHAT_WARNING_THRESHOLD {
                warn!(
                    param = param.name(),
                    rhat,
                    "Chains disagree, the sampler may not have converged"
                );
            }
            Ok((param, rhat))
        })
        .collect()
}

/// Everything printed about a posterior sample.
#[derive(Debug, Clone, PartialEq)]
pub struct PosteriorReport {
    pub level: f64,
    pub chains: Vec<ChainSummary>,
    /// Summary of all chains concatenated.
    pub pooled: ChainSummary,
    /// Credible intervals of the pooled draws at `level`.
    pub intervals: Vec<(Param, (f64, f64))>,
    /// Only available for at least two chains with two draws each.
    pub rhat: Option<Vec<(Param, f64)>>,
}

impl PosteriorReport {
    pub fn new(trace: &Trace, level: f64) -> crate::Result<Self> {
        let chains = trace.chains.iter().map(summarize).collect::<crate::Result<Vec<_>>>()?;
        let pooled_chain = trace.pooled();
        let pooled = summarize(&pooled_chain)?;
        let intervals = Param::ALL
            .iter()
            .map(|&param| Ok((param, credible_interval(&pooled_chain, param, level)?)))
            .collect::<crate::Result<Vec<_>>>()?;
        let rhat = if trace.num_chains() > 1 && trace.chains.iter().all(|c| c.len() > 1) {
            Some(convergence(trace)?)
        } else {
            None
        };
        Ok(PosteriorReport {
            level,
            chains,
            pooled,
            intervals,
            rhat,
        })
    }
}

impl fmt::Display for PosteriorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.chains.len() > 1 {
            for chain in &self.chains {
                writeln!(f, "{}\n", chain)?;
            }
            writeln!(f, "all chains")?;
        }
        writeln!(f, "{}\n", self.pooled)?;
        writeln!(f, "{:.1}% credible intervals", self.level * 100.)?;
        for (param, (low, high)) in &self.intervals {
            writeln!(f, "{:>6} [{:.4}, {:.4}]", param, low, high)?;
        }
        if let Some(rhat) = &self.rhat {
            write!(f, "R-hat")?;
            for (param, value) in rhat {
                write!(f, "  {} = {:.4}", param, value)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

fn write_chain(path: &Path, chain: &Chain) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("Failed to create CSV file: {:?}", path))?;
    let mut writer = BufWriter::new(file);
    writeln!(writer, "iteration,a,b,s")?;
    for (idx, draw) in chain.iter().enumerate() {
        writeln!(writer, "{},{},{},{}", idx + 1, draw.a, draw.b, draw.s)?;
    }
    writer
        .flush()
        .with_context(|| format!("Failed to write CSV file: {:?}", path))
}

/// Write one `chain_{id}.csv` file per chain into `output_dir`.
///
/// Values are written with full precision, so reading a file back gives the
/// exact draws.
pub fn write_trace_csv<P: AsRef<Path>>(trace: &Trace, output_dir: P) -> Result<Vec<PathBuf>> {
    let output_dir = output_dir.as_ref();
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory: {:?}", output_dir))?;

    let paths = trace
        .chains
        .iter()
        .map(|chain| {
            let path = output_dir.join(format!("chain_{}.csv", chain.chain_id));
            write_chain(&path, chain)?;
            Ok(path)
        })
        .collect::<Result<Vec<_>>>()?;
    info!(files = paths.len(), dir = ?output_dir, "Wrote trace");
    Ok(paths)
}
