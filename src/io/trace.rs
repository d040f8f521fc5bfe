//! CSV trace output: one row per retained MCMC sample.

use std::io::Write;

use crate::errors::Error;
use crate::tree::species::SpeciesTree;

/// Streaming trace writer: headers are written once, from the species
/// tree's current shape, and each sample is appended as it's produced
/// rather than buffered in memory.
pub struct TraceWriter<W: Write> {
    writer: csv::Writer<W>,
    header_written: bool,
}

impl<W: Write> TraceWriter<W> {
    pub fn new(inner: W) -> Self {
        TraceWriter {
            writer: csv::WriterBuilder::new().from_writer(inner),
            header_written: false,
        }
    }

    fn write_header(&mut self, species_tree: &SpeciesTree) -> Result<(), Error> {
        let mut header = vec!["iteration".to_string(), "logl".to_string(), "logpr".to_string()];
        for node in &species_tree.nodes {
            let label = node.label.clone().unwrap_or_else(|| format!("node{}", node.node_index));
            if node.theta.is_some() {
                header.push(format!("theta_{}", label));
            }
            if !node.is_tip() {
                header.push(format!("tau_{}", label));
            }
        }
        self.writer.write_record(&header)?;
        self.header_written = true;
        Ok(())
    }

    /// Append one sample row: the current iteration count, total log-
    /// likelihood and log-prior across loci, then every population's theta
    /// and every internal node's tau in tree order.
    pub fn write_sample(
        &mut self,
        iteration: usize,
        logl: f64,
        logpr: f64,
        species_tree: &SpeciesTree,
    ) -> Result<(), Error> {
        if !self.header_written {
            self.write_header(species_tree)?;
        }
        let mut row = vec![iteration.to_string(), logl.to_string(), logpr.to_string()];
        for node in &species_tree.nodes {
            if let Some(theta) = node.theta {
                row.push(theta.to_string());
            }
            if !node.is_tip() {
                row.push(node.tau.to_string());
            }
        }
        self.writer.write_record(&row)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), Error> {
        self.writer.flush().map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_header_then_one_row_per_sample() {
        let mut tree = SpeciesTree::from_newick("(A);").unwrap();
        tree.nodes[0].theta = Some(0.01);
        tree.allocate_loci(1);

        let mut buf = Vec::new();
        {
            let mut writer = TraceWriter::new(&mut buf);
            writer.write_sample(1, -10.0, -2.0, &tree).unwrap();
            writer.write_sample(2, -9.5, -2.1, &tree).unwrap();
            writer.flush().unwrap();
        }
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("theta_A"));
        assert!(lines[1].starts_with("1,"));
    }
}
