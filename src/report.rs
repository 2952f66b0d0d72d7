//! Output formatting for both sweeps.
//!
//! Text output is tab-delimited and written as results arrive. JSON output
//! is a single document for the concurrency sweep and one object per line
//! for the scatter sweep.

use std::io::{self, Write};

use serde::Serialize;

use crate::stats::{LatencySummary, Sample};

/// Output format selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Tab-delimited text.
    #[default]
    Text,
    /// Machine-readable JSON.
    Json,
}

/// Result of one (key count, concurrency) configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Cell {
    pub concurrency: usize,
    pub median_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<LatencySummary>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Row {
    pub keys: usize,
    pub cells: Vec<Cell>,
}

/// Everything the concurrency sweep measured.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConcurrencyReport {
    pub pool_size: usize,
    pub cycles: usize,
    pub concurrency_levels: Vec<usize>,
    pub rows: Vec<Row>,
    pub deleted: u64,
}

/// Prints the concurrency table, streaming cells in text mode.
pub struct TablePrinter<W: Write> {
    out: W,
    format: OutputFormat,
    report: ConcurrencyReport,
}

impl<W: Write> TablePrinter<W> {
    pub fn new(out: W, format: OutputFormat) -> Self {
        Self { out, format, report: ConcurrencyReport::default() }
    }

    pub fn begin(&mut self, pool_size: usize, cycles: usize, levels: &[usize]) -> io::Result<()> {
        self.report.pool_size = pool_size;
        self.report.cycles = cycles;
        self.report.concurrency_levels = levels.to_vec();
        if self.format == OutputFormat::Text {
            writeln!(self.out, "Holding {pool_size} keys")?;
            write!(self.out, "keys")?;
            for c in levels {
                write!(self.out, "\tc={c}")?;
            }
            writeln!(self.out)?;
            self.out.flush()?;
        }
        Ok(())
    }

    pub fn begin_row(&mut self, keys: usize) -> io::Result<()> {
        self.report.rows.push(Row { keys, cells: Vec::new() });
        if self.format == OutputFormat::Text {
            write!(self.out, "{keys}")?;
            self.out.flush()?;
        }
        Ok(())
    }

    pub fn cell(&mut self, cell: Cell) -> io::Result<()> {
        if let Some(row) = self.report.rows.last_mut() {
            row.cells.push(cell);
        }
        if self.format == OutputFormat::Text {
            write!(self.out, "\t{:.3}", cell.median_ms)?;
            self.out.flush()?;
        }
        Ok(())
    }

    pub fn end_row(&mut self) -> io::Result<()> {
        if self.format == OutputFormat::Text {
            writeln!(self.out)?;
        }
        Ok(())
    }

    pub fn finish(mut self, deleted: u64) -> io::Result<(W, ConcurrencyReport)> {
        self.report.deleted = deleted;
        match self.format {
            OutputFormat::Text => writeln!(self.out, "Deleted {deleted} test keys")?,
            OutputFormat::Json => {
                serde_json::to_writer_pretty(&mut self.out, &self.report)?;
                writeln!(self.out)?;
            }
        }
        self.out.flush()?;
        Ok((self.out, self.report))
    }
}

/// Gnuplot wrapping for scatter output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GnuplotOptions {
    pub enabled: bool,
    /// Raw script lines inserted before the fit, unvalidated.
    pub extra: Vec<String>,
}

#[derive(Serialize)]
struct ScatterPoint {
    keys: usize,
    ms: f64,
}

/// Writes scatter samples as they arrive.
pub struct ScatterPrinter<W: Write> {
    out: W,
    format: OutputFormat,
    gnuplot: GnuplotOptions,
    concurrency: usize,
    written: usize,
}

impl<W: Write> ScatterPrinter<W> {
    pub fn new(out: W, format: OutputFormat, gnuplot: GnuplotOptions, concurrency: usize) -> Self {
        Self { out, format, gnuplot, concurrency, written: 0 }
    }

    fn plotting(&self) -> bool {
        self.gnuplot.enabled && self.format == OutputFormat::Text
    }

    pub fn begin(&mut self) -> io::Result<()> {
        if self.plotting() {
            writeln!(self.out, "$DATABLOCK << EOD")?;
        }
        Ok(())
    }

    pub fn sample(&mut self, sample: &Sample) -> io::Result<()> {
        match self.format {
            OutputFormat::Text => writeln!(self.out, "{}\t{:.3}", sample.key_count, sample.millis())?,
            OutputFormat::Json => {
                let point = ScatterPoint { keys: sample.key_count, ms: sample.millis() };
                serde_json::to_writer(&mut self.out, &point)?;
                writeln!(self.out)?;
            }
        }
        self.written += 1;
        Ok(())
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn finish(mut self) -> io::Result<W> {
        if self.plotting() {
            let out = &mut self.out;
            writeln!(out, "EOD")?;
            writeln!(out, "set fit nolog")?;
            writeln!(out, "set fit quiet")?;
            writeln!(out, "set term pngcairo size 1280, 1024 font \"sans,16\"")?;
            writeln!(out, "set xlabel \"key count\"")?;
            writeln!(out, "set ylabel \"time (ms)\"")?;
            for line in &self.gnuplot.extra {
                writeln!(out, "{line}")?;
            }
            writeln!(out, "f(x) = a*x+b")?;
            writeln!(out, "fit f(x) $DATABLOCK via a,b")?;
            writeln!(
                out,
                "plot $DATABLOCK title \"mget (c={})\", f(x) with lines lw 3 title sprintf(\"y = %0.6fx + %0.6f\", a, b)",
                self.concurrency
            )?;
        }
        self.out.flush()?;
        Ok(self.out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn text(buf: Vec<u8>) -> String {
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn table_text_layout() {
        let mut p = TablePrinter::new(Vec::new(), OutputFormat::Text);
        p.begin(50_000, 5, &[1, 2]).unwrap();
        p.begin_row(1).unwrap();
        p.cell(Cell { concurrency: 1, median_ms: 0.12345, summary: None }).unwrap();
        p.cell(Cell { concurrency: 2, median_ms: 1.5, summary: None }).unwrap();
        p.end_row().unwrap();
        let (out, report) = p.finish(50_000).unwrap();
        assert_eq!(
            text(out),
            "Holding 50000 keys\nkeys\tc=1\tc=2\n1\t0.123\t1.500\nDeleted 50000 test keys\n"
        );
        assert_eq!(report.rows[0].cells.len(), 2);
    }

    #[test]
    fn table_json_is_one_document() {
        let mut p = TablePrinter::new(Vec::new(), OutputFormat::Json);
        p.begin(10, 3, &[4]).unwrap();
        p.begin_row(5).unwrap();
        p.cell(Cell { concurrency: 4, median_ms: 2.0, summary: None }).unwrap();
        p.end_row().unwrap();
        let (out, _) = p.finish(10).unwrap();
        let doc: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(doc["concurrency_levels"], serde_json::json!([4]));
        assert_eq!(doc["rows"][0]["keys"], 5);
        assert_eq!(doc["rows"][0]["cells"][0]["median_ms"], 2.0);
        assert_eq!(doc["deleted"], 10);
    }

    #[test]
    fn scatter_lines_and_gnuplot_wrapper() {
        let gnuplot = GnuplotOptions { enabled: true, extra: vec!["set output 'x.png'".into()] };
        let mut p = ScatterPrinter::new(Vec::new(), OutputFormat::Text, gnuplot, 4);
        p.begin().unwrap();
        p.sample(&Sample { key_count: 10, elapsed: Duration::from_micros(1500) }).unwrap();
        assert_eq!(p.written(), 1);
        let out = text(p.finish().unwrap());
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "$DATABLOCK << EOD");
        assert_eq!(lines[1], "10\t1.500");
        assert_eq!(lines[2], "EOD");
        let extra = lines.iter().position(|l| *l == "set output 'x.png'").unwrap();
        let fit = lines.iter().position(|l| *l == "f(x) = a*x+b").unwrap();
        assert!(extra < fit);
        assert!(lines.last().unwrap().starts_with("plot $DATABLOCK title \"mget (c=4)\""));
    }

    #[test]
    fn scatter_json_lines() {
        let mut p = ScatterPrinter::new(Vec::new(), OutputFormat::Json, GnuplotOptions::default(), 1);
        p.begin().unwrap();
        p.sample(&Sample { key_count: 3, elapsed: Duration::from_millis(2) }).unwrap();
        let out = text(p.finish().unwrap());
        let v: serde_json::Value = serde_json::from_str(out.trim()).unwrap();
        assert_eq!(v["keys"], 3);
        assert_eq!(v["ms"], 2.0);
    }
}
