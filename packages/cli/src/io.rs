//! Gzipped JSON-lines input and output.
//!
//! Each line of the input file is one serialized [`Region`] with identity,
//! geometry, and base counts set; derived fields may be absent and default
//! to zero. The output file carries the same records with every derived
//! field populated.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use seg_map_models::{CensusYear, Region, grouping_from_code};

/// Reads all regions from a gzipped JSON-lines file.
///
/// Raw statistical-area codes are normalized against `year`'s ungrouped
/// sentinel, so downstream stages only ever see real codes.
///
/// # Errors
///
/// Returns an [`io::Error`] for file or decompression failures and for
/// malformed JSON lines.
pub fn read_regions(path: &Path, year: CensusYear) -> io::Result<Vec<Region>> {
    let reader = BufReader::new(GzDecoder::new(File::open(path)?));

    let mut regions = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let mut region: Region = serde_json::from_str(&line)?;
        region.grouping = region
            .grouping
            .as_deref()
            .and_then(|code| grouping_from_code(code, year));
        regions.push(region);
    }

    log::info!("Read {} regions from {}", regions.len(), path.display());
    Ok(regions)
}

/// Writes regions to a gzipped JSON-lines file, one record per line.
///
/// # Errors
///
/// Returns an [`io::Error`] for file, serialization, or compression
/// failures.
pub fn write_regions(path: &Path, regions: &[Region]) -> io::Result<()> {
    let mut writer = BufWriter::new(GzEncoder::new(File::create(path)?, Compression::default()));

    for region in regions {
        serde_json::to_writer(&mut writer, region)?;
        writer.write_all(b"\n")?;
    }
    writer.into_inner()?.finish()?;

    log::info!("Wrote {} regions to {}", regions.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_file(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("seg_map_cli_{name}_{}.jsonl.gz", std::process::id()))
    }

    #[test]
    fn written_regions_read_back_with_sentinels_normalized() {
        let mut grouped = Region::with_counts("a", -83.0, 42.3, 1000, 100, 800);
        grouped.grouping = Some("35620".to_string());
        let mut sentinel = Region::with_counts("b", -83.1, 42.4, 500, 50, 400);
        sentinel.grouping = Some("99999".to_string());

        let path = temp_file("round_trip");
        write_regions(&path, &[grouped.clone(), sentinel]).unwrap();
        let read = read_regions(&path, CensusYear::Y2010).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(read.len(), 2);
        assert_eq!(read[0], grouped);
        // The 2010 sentinel code means "ungrouped".
        assert_eq!(read[1].grouping, None);
    }

    #[test]
    fn missing_derived_fields_default_to_zero() {
        let line = r#"{"state":"Michigan","stateId":"26","county":"163","name":"t1","lon":-83.0,"lat":42.3,"totalPop":1000,"blackOnlyPop":100,"whiteOnlyPop":800}"#;
        let region: Region = serde_json::from_str(line).unwrap();
        assert_eq!(region.grouping, None);
        assert_eq!(region.neighborhood_pop, 0);
        assert!((region.p_black).abs() < f64::EPSILON);
    }

    #[test]
    fn malformed_line_is_an_error() {
        let path = temp_file("malformed");
        {
            let mut enc = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
            enc.write_all(b"{not json}\n").unwrap();
            enc.finish().unwrap();
        }
        let result = read_regions(&path, CensusYear::Y2010);
        std::fs::remove_file(&path).unwrap();
        assert!(result.is_err());
    }
}
