//! Sequence alignment input: PHYLIP (sequential or interleaved) and FASTA,
//! filtered through the nucleotide ambiguity map and compressed into site
//! patterns with integer weights.

use std::collections::HashMap;
use std::path::Path;

use crate::errors::Error;
use crate::likelihood::maps::{NT_MAP, VALID_JC69};

/// One locus's raw alignment: parallel vectors of taxon label and sequence.
pub struct Alignment {
    pub labels: Vec<String>,
    pub sequences: Vec<String>,
}

pub fn parse(path: &Path, contents: &str) -> Result<Alignment, Error> {
    let trimmed = contents.trim_start();
    if trimmed.starts_with('>') {
        parse_fasta(path, contents)
    } else {
        parse_phylip(path, contents)
    }
}

fn parse_fasta(path: &Path, contents: &str) -> Result<Alignment, Error> {
    let mut labels = Vec::new();
    let mut sequences: Vec<String> = Vec::new();
    for (line_no, raw_line) in contents.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(label) = line.strip_prefix('>') {
            labels.push(label.trim().to_string());
            sequences.push(String::new());
        } else {
            let seq = sequences.last_mut().ok_or_else(|| Error::InputParse {
                path: path.to_path_buf(),
                line: line_no + 1,
                msg: "sequence data before any '>' header".to_string(),
            })?;
            seq.push_str(line);
        }
    }
    check_equal_lengths(path, &labels, &sequences)?;
    Ok(Alignment { labels, sequences })
}

fn parse_phylip(path: &Path, contents: &str) -> Result<Alignment, Error> {
    let mut lines = contents.lines().map(str::trim).filter(|l| !l.is_empty());
    let header = lines.next().ok_or_else(|| Error::InputParse {
        path: path.to_path_buf(),
        line: 1,
        msg: "empty PHYLIP file".to_string(),
    })?;
    let mut header_fields = header.split_whitespace();
    let ntax: usize = header_fields
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| Error::InputParse {
            path: path.to_path_buf(),
            line: 1,
            msg: "expected 'ntax nchar' header".to_string(),
        })?;
    let nchar: usize = header_fields
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| Error::InputParse {
            path: path.to_path_buf(),
            line: 1,
            msg: "expected 'ntax nchar' header".to_string(),
        })?;

    let mut labels = Vec::with_capacity(ntax);
    let mut sequences: Vec<String> = vec![String::new(); ntax];

    // first block always carries labels
    for seq in sequences.iter_mut().take(ntax) {
        let line = lines.next().ok_or_else(|| Error::InputParse {
            path: path.to_path_buf(),
            line: 0,
            msg: "PHYLIP file truncated before all taxa were read".to_string(),
        })?;
        let (label, rest) = split_phylip_label(line);
        labels.push(label.to_string());
        seq.push_str(&rest.replace(char::is_whitespace, ""));
    }

    // interleaved continuation blocks: ntax more lines per block, no labels,
    // repeated until every sequence reaches nchar.
    while sequences.iter().any(|s| s.len() < nchar) {
        for seq in sequences.iter_mut() {
            match lines.next() {
                Some(line) => seq.push_str(&line.replace(char::is_whitespace, "")),
                None => break,
            }
        }
        if lines.clone().next().is_none() && sequences.iter().any(|s| s.len() < nchar) {
            break;
        }
    }

    for (label, seq) in labels.iter().zip(sequences.iter()) {
        if seq.len() != nchar {
            return Err(Error::UnevenAlignment {
                locus: label.clone(),
                expected: nchar,
                found: seq.len(),
            });
        }
    }

    check_equal_lengths(path, &labels, &sequences)?;
    Ok(Alignment { labels, sequences })
}

fn split_phylip_label(line: &str) -> (&str, &str) {
    match line.find(char::is_whitespace) {
        Some(i) => (&line[..i], &line[i..]),
        None => (line, ""),
    }
}

fn check_equal_lengths(path: &Path, labels: &[String], sequences: &[String]) -> Result<(), Error> {
    let expected = sequences.first().map(|s| s.len()).unwrap_or(0);
    for (label, seq) in labels.iter().zip(sequences.iter()) {
        if seq.len() != expected {
            return Err(Error::UnevenAlignment {
                locus: label.clone(),
                expected,
                found: seq.len(),
            });
        }
    }
    let _ = path;
    Ok(())
}

/// Convert an alignment's raw characters into 4-bit ambiguity codes,
/// optionally dropping sites with any non-JC69-valid character
/// (`cleandata`), then compress identical columns into patterns with
/// integer weights.
pub fn compress(alignment: &Alignment, cleandata: bool) -> Result<(Vec<Vec<u8>>, Vec<f64>), Error> {
    let ntax = alignment.sequences.len();
    let nchar = alignment.sequences.first().map(|s| s.len()).unwrap_or(0);

    let mut codes = vec![vec![0u8; nchar]; ntax];
    for (i, seq) in alignment.sequences.iter().enumerate() {
        for (j, byte) in seq.bytes().enumerate() {
            let code = NT_MAP[byte as usize];
            if code == 0 {
                return Err(Error::IllegalCharacter {
                    byte,
                    context: format!("{} site {}", alignment.labels[i], j + 1),
                });
            }
            codes[i][j] = code;
        }
    }

    let kept_sites: Vec<usize> = (0..nchar)
        .filter(|&j| !cleandata || (0..ntax).all(|i| VALID_JC69[codes[i][j] as usize]))
        .collect();

    let mut pattern_index: HashMap<Vec<u8>, usize> = HashMap::new();
    let mut patterns: Vec<Vec<u8>> = Vec::new();
    let mut weights: Vec<f64> = Vec::new();
    for &j in &kept_sites {
        let column: Vec<u8> = (0..ntax).map(|i| codes[i][j]).collect();
        match pattern_index.get(&column) {
            Some(&idx) => weights[idx] += 1.0,
            None => {
                pattern_index.insert(column.clone(), patterns.len());
                patterns.push(column);
                weights.push(1.0);
            }
        }
    }

    let mut tip_codes = vec![Vec::with_capacity(patterns.len()); ntax];
    for pattern in &patterns {
        for (i, &code) in pattern.iter().enumerate() {
            tip_codes[i].push(code);
        }
    }

    Ok((tip_codes, weights))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn parses_fasta() {
        let text = ">a\nACGT\n>b\nACGA\n";
        let aln = parse(&PathBuf::from("x.fa"), text).unwrap();
        assert_eq!(aln.labels, vec!["a", "b"]);
        assert_eq!(aln.sequences, vec!["ACGT", "ACGA"]);
    }

    #[test]
    fn parses_sequential_phylip() {
        let text = "2 4\na ACGT\nb ACGA\n";
        let aln = parse(&PathBuf::from("x.phy"), text).unwrap();
        assert_eq!(aln.labels, vec!["a", "b"]);
        assert_eq!(aln.sequences, vec!["ACGT", "ACGA"]);
    }

    #[test]
    fn parses_interleaved_phylip() {
        let text = "2 8\na ACGT\nb ACGA\n\nACGT\nACGA\n";
        let aln = parse(&PathBuf::from("x.phy"), text).unwrap();
        assert_eq!(aln.sequences, vec!["ACGTACGT", "ACGAACGA"]);
    }

    #[test]
    fn compress_merges_identical_columns() {
        let aln = Alignment {
            labels: vec!["a".into(), "b".into()],
            sequences: vec!["AAC".into(), "AAG".into()],
        };
        let (tip_codes, weights) = compress(&aln, false).unwrap();
        // sites 0 and 1 are identical columns (A,A); site 2 differs (C,G)
        assert_eq!(weights.len(), 2);
        assert!((weights.iter().sum::<f64>() - 3.0).abs() < 1e-12);
        assert_eq!(tip_codes.len(), 2);
    }

    #[test]
    fn illegal_character_is_rejected() {
        let aln = Alignment {
            labels: vec!["a".into()],
            sequences: vec!["ACJT".into()],
        };
        let err = compress(&aln, false).unwrap_err();
        assert!(matches!(err, Error::IllegalCharacter { .. }));
    }

    #[test]
    fn cleandata_drops_ambiguous_sites() {
        let aln = Alignment {
            labels: vec!["a".into(), "b".into()],
            sequences: vec!["AN".into(), "AC".into()],
        };
        let (tip_codes, weights) = compress(&aln, true).unwrap();
        // the second site has an N, so only the first site survives
        assert_eq!(weights.len(), 1);
        assert_eq!(tip_codes[0].len(), 1);
    }
}
