//! Nodal displacement reader for CalculiX `.frd` result files.
//!
//! Only the ASCII `DISP` result blocks are read. A block starts with a
//! ` -4  DISP` header, lists one ` -1` record per node with fixed-width
//! fields (node id in 10 columns, values in 12) and ends with ` -3`.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

/// Displacements of the last `DISP` block in a file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Displacements {
    /// Number of `DISP` blocks seen (one per output increment)
    pub blocks: usize,
    pub values: BTreeMap<u32, [f64; 3]>,
}

impl Displacements {
    pub fn from_file(path: impl AsRef<Path>) -> io::Result<Self> {
        Self::from_reader(BufReader::new(File::open(path)?))
    }

    pub fn from_reader<R: BufRead>(reader: R) -> io::Result<Self> {
        let mut result = Displacements::default();
        let mut in_disp = false;

        for line in reader.lines() {
            let line = line?;
            let trimmed = line.trim_start();
            if let Some(rest) = trimmed.strip_prefix("-4") {
                in_disp = rest.trim_start().starts_with("DISP");
                if in_disp {
                    result.blocks += 1;
                    result.values.clear();
                }
                continue;
            }
            if trimmed.starts_with("-3") {
                in_disp = false;
                continue;
            }
            if in_disp
                && let Some(record) = trimmed.strip_prefix("-1")
                && let Some((node, values)) = parse_record(record)
            {
                result.values.insert(node, values);
            }
        }
        Ok(result)
    }

    /// Largest displacement magnitude and the node carrying it.
    pub fn max_magnitude(&self) -> Option<(u32, f64)> {
        self.values
            .iter()
            .map(|(node, [x, y, z])| (*node, (x * x + y * y + z * z).sqrt()))
            .fold(None, |best, (node, magnitude)| match best {
                Some((_, m)) if m >= magnitude => best,
                _ => Some((node, magnitude)),
            })
    }
}

// Fixed-width first, whitespace-separated as a fallback for files written
// by other tools.
fn parse_record(record: &str) -> Option<(u32, [f64; 3])> {
    if record.len() >= 10 + 3 * 12 && record.is_ascii() {
        let node = record[..10].trim().parse().ok();
        let field = |i: usize| record[10 + 12 * i..22 + 12 * i].trim().parse::<f64>().ok();
        if let (Some(node), Some(x), Some(y), Some(z)) = (node, field(0), field(1), field(2)) {
            return Some((node, [x, y, z]));
        }
    }
    let mut parts = record.split_whitespace();
    let node = parts.next()?.parse().ok()?;
    let mut values = [0.0; 3];
    for value in &mut values {
        *value = parts.next()?.parse().ok()?;
    }
    Some((node, values))
}
